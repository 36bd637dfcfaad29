use crate::cartridges::{CartBus, MbcDriver};
use crate::error::{Error, Result};

// 32kB cart with no banking hardware. Bank 0 is fixed at 0000-3FFF and
// bank 1 at 4000-7FFF; a single RAM bank, if present, sits at A000-BFFF.
pub struct NoMbc;

impl MbcDriver for NoMbc {
    fn switch_rom_bank(&self, _cart: &mut dyn CartBus, bank: u16) -> Result<()> {
        if bank > 1 {
            return Err(Error::RomBankRange(bank));
        }
        Ok(())
    }

    fn switch_ram_bank(&self, _cart: &mut dyn CartBus, bank: u8) -> Result<()> {
        if bank != 0 {
            return Err(Error::RamBankRange(bank));
        }
        Ok(())
    }
}
