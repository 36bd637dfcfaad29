// Transfer pak driver.
//
// The transfer pak maps a Game Boy cartridge into the pak address space:
//
//  A000        aperture bank select (0-3); which 4000h byte slice of the
//              cart's 16-bit space appears in the window below
//  B000        access mode; reads report cart presence in the last byte
//              (80h), writes of 01h/00h switch cart power
//  C000-FFFF   cart window; forwarded to bank*4000h + offset
//
// Cart banking (the MBC inside the cartridge) layers on top of the
// aperture: reaching ROM bank n means writing the MBC's bank registers
// through the window, then reading 4000-7FFF through it.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use log::{debug, info, warn};

use crate::cartridges::{self, CartBus, GbHeader, HEADER_SIZE};
use crate::controller::Controller;
use crate::error::{Error, Result};

// Transfer pak ID reported by the 0x8000 probe.
pub const ACCESSORY_ID: u8 = 0x84;

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;

// Pak-space registers.
const REG_APERTURE_BANK: u16 = 0xA000;
const REG_ACCESS_MODE: u16 = 0xB000;
const CART_WINDOW_BASE: u16 = 0xC000;

// Cart-space RAM window and enable register.
const RAM_WINDOW_BASE: u16 = 0xA000;
const RAM_WINDOW_END: u16 = 0xC000;
const RAM_ENABLE_VALUE: u8 = 0x0A;

pub struct TransferPak<'a, C> {
    pad: &'a mut Controller<C>,
    cart_powered: bool,
    // Cache of the pak's aperture register, populated only after a
    // successful write. A fresh driver always issues the first select.
    last_aperture_bank: Option<u8>,
    header: Option<GbHeader>,
}

impl<'a, C: Read + Write> TransferPak<'a, C> {
    pub fn new(pad: &'a mut Controller<C>) -> TransferPak<'a, C> {
        TransferPak {
            pad,
            cart_powered: false,
            last_aperture_bank: None,
            header: None,
        }
    }

    pub fn probe(&mut self) -> Result<bool> {
        self.pad.check_accessory_id(ACCESSORY_ID)
    }

    // Header stored by the last successful load_header call.
    pub fn header(&self) -> Option<&GbHeader> {
        self.header.as_ref()
    }

    // Split a cart address into the aperture bank exposing it and the pak
    // address inside the window.
    pub fn translate_cart_addr(address: u16) -> (u8, u16) {
        let bank = (address / 0x4000) as u8;
        let pak_addr = CART_WINDOW_BASE + address % 0x4000;
        (bank, pak_addr)
    }

    // Check if a cartridge is seated in the pak.
    pub fn cart_present(&mut self) -> Result<bool> {
        let check_mode = self.pad.pak_read(REG_ACCESS_MODE)?;
        debug!("check mode: {:02x?}", check_mode);
        Ok(check_mode[31] == 0x80)
    }

    // Switch cartridge power.
    pub fn cart_enable(&mut self, enable: bool) -> Result<()> {
        let value = if enable { 0x01 } else { 0x00 };
        self.pad.pak_write(REG_ACCESS_MODE, &[value; 32])?;
        self.cart_powered = enable;
        Ok(())
    }

    // Switch access to the cart's external RAM on or off.
    pub fn cart_enable_ram(&mut self, enable: bool) -> Result<()> {
        let header = self.header.as_ref().ok_or(Error::NoHeader)?;
        if header.ram_size() == 0 {
            return Err(Error::NoRam);
        }
        let value = if enable { RAM_ENABLE_VALUE } else { 0x00 };
        self.cart_write(0x0000, &[value; 32])
    }

    fn switch_aperture_bank(&mut self, bank: u8) -> Result<()> {
        if self.last_aperture_bank == Some(bank) {
            debug!("skip redundant bank switch to bank {}", bank);
            return Ok(());
        }
        debug!("switching to address bank {}", bank);
        self.pad.pak_write(REG_APERTURE_BANK, &[bank; 32])?;
        self.last_aperture_bank = Some(bank);
        Ok(())
    }

    fn check_cart_access(&self, address: u16) -> Result<()> {
        if !self.cart_powered {
            return Err(Error::CartNotPowered);
        }
        if address & 0x1F != 0 {
            return Err(Error::BadPayload("cart address must be a multiple of 32"));
        }
        Ok(())
    }

    // Read 32 bytes from a cart address, switching the aperture as needed.
    pub fn cart_read(&mut self, address: u16) -> Result<[u8; 32]> {
        self.check_cart_access(address)?;
        let (bank, pak_addr) = Self::translate_cart_addr(address);
        self.switch_aperture_bank(bank)?;
        self.pad.pak_read(pak_addr)
    }

    // Write 32 bytes to a cart address, switching the aperture as needed.
    pub fn cart_write(&mut self, address: u16, data: &[u8; 32]) -> Result<()> {
        self.check_cart_access(address)?;
        let (bank, pak_addr) = Self::translate_cart_addr(address);
        self.switch_aperture_bank(bank)?;
        self.pad.pak_write(pak_addr, data)?;
        Ok(())
    }

    // Read and parse the cartridge header. With `verify` the boot logo and
    // header checksum are checked and a failure reports `false` without
    // storing the header.
    pub fn load_header(&mut self, verify: bool) -> Result<bool> {
        let mut data = Vec::with_capacity(96);
        for address in [0x0100u16, 0x0120, 0x0140] {
            data.extend_from_slice(&self.cart_read(address)?);
        }
        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&data[..HEADER_SIZE]);
        let header = GbHeader::parse(raw);

        if verify && !header.verify_logo() {
            debug!("boot logo check failed");
            return Ok(false);
        }
        if verify && !header.verify_checksum() {
            debug!("header checksum failed");
            return Ok(false);
        }

        self.header = Some(header);
        Ok(true)
    }

    // Select a ROM bank through the cart's MBC.
    pub fn switch_rom_bank(&mut self, bank: u16) -> Result<()> {
        let kind = self.header.as_ref().ok_or(Error::NoHeader)?.mbc_kind();
        let mbc = cartridges::mbc_driver(kind)?;
        mbc.switch_rom_bank(self, bank)
    }

    // Select a RAM bank through the cart's MBC.
    pub fn switch_ram_bank(&mut self, bank: u8) -> Result<()> {
        let kind = self.header.as_ref().ok_or(Error::NoHeader)?.mbc_kind();
        let mbc = cartridges::mbc_driver(kind)?;
        mbc.switch_ram_bank(self, bank)
    }

    // Dump the cartridge ROM banks to a file in ascending bank order.
    pub fn dump_rom(&mut self, path: impl AsRef<Path>, mut progress: impl FnMut(u64)) -> Result<()> {
        let rom_size = self.header.as_ref().ok_or(Error::NoHeader)?.rom_size();
        if rom_size == 0 {
            warn!("no ROM banks to dump");
            return Ok(());
        }

        // Probe the MBC before powering the cart so an unsupported mapper
        // aborts before the output file exists. The cart is still off, so a
        // power error from the register writes counts as a pass.
        match self.switch_rom_bank(1) {
            Err(err @ (Error::UnsupportedMbc(_) | Error::NotImplemented(_))) => {
                warn!("{}, aborting ROM dump", err);
                return Ok(());
            }
            _ => {}
        }

        let n_banks = rom_size / ROM_BANK_SIZE;
        let mut file = File::create(&path)?;
        info!("dumping {} ROM banks to {}", n_banks, path.as_ref().display());

        self.cart_enable(true)?;
        let result = self.read_rom_banks(&mut file, n_banks, &mut progress);
        self.finish_powered_session(result)
    }

    fn read_rom_banks(
        &mut self,
        file: &mut File,
        n_banks: usize,
        progress: &mut impl FnMut(u64),
    ) -> Result<()> {
        let mut done: u64 = 0;
        for bank in 0..n_banks {
            let window = if bank == 0 {
                // Bank 0 is always visible at 0000-3FFF.
                0x0000u16..0x4000
            } else {
                self.switch_rom_bank(bank as u16)?;
                0x4000u16..0x8000
            };
            for address in window.step_by(32) {
                let chunk = self.cart_read(address)?;
                file.write_all(&chunk)?;
                done += 32;
                progress(done);
            }
        }
        Ok(())
    }

    // Dump the cartridge's battery RAM banks to a file in ascending bank
    // order.
    pub fn dump_ram(&mut self, path: impl AsRef<Path>, mut progress: impl FnMut(u64)) -> Result<()> {
        let ram_size = self.header.as_ref().ok_or(Error::NoHeader)?.ram_size();
        if ram_size == 0 {
            warn!("no RAM to dump");
            return Ok(());
        }

        match self.switch_ram_bank(0) {
            Err(err @ (Error::UnsupportedMbc(_) | Error::NotImplemented(_))) => {
                warn!("{}, aborting RAM dump", err);
                return Ok(());
            }
            _ => {}
        }

        let n_banks = ram_size / RAM_BANK_SIZE;
        let mut file = File::create(&path)?;
        info!("dumping {} RAM banks to {}", n_banks, path.as_ref().display());

        self.cart_enable(true)?;
        let result = self.read_ram_session(&mut file, n_banks, &mut progress);
        self.finish_powered_session(result)
    }

    fn read_ram_session(
        &mut self,
        file: &mut File,
        n_banks: usize,
        progress: &mut impl FnMut(u64),
    ) -> Result<()> {
        self.cart_enable_ram(true)?;
        let result = self.read_ram_banks(file, n_banks, progress);
        match result {
            Ok(()) => self.cart_enable_ram(false),
            Err(err) => {
                let _ = self.cart_enable_ram(false);
                Err(err)
            }
        }
    }

    fn read_ram_banks(
        &mut self,
        file: &mut File,
        n_banks: usize,
        progress: &mut impl FnMut(u64),
    ) -> Result<()> {
        let mut done: u64 = 0;
        for bank in 0..n_banks {
            self.switch_ram_bank(bank as u8)?;
            for address in (RAM_WINDOW_BASE..RAM_WINDOW_END).step_by(32) {
                let chunk = self.cart_read(address)?;
                file.write_all(&chunk)?;
                done += 32;
                progress(done);
            }
        }
        Ok(())
    }

    // Power the cart back down on every exit path; a pending error wins
    // over a failed power-off.
    fn finish_powered_session(&mut self, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => self.cart_enable(false),
            Err(err) => {
                let _ = self.cart_enable(false);
                Err(err)
            }
        }
    }
}

impl<'a, C: Read + Write> CartBus for TransferPak<'a, C> {
    fn cart_read(&mut self, address: u16) -> Result<[u8; 32]> {
        TransferPak::cart_read(self, address)
    }

    fn cart_write(&mut self, address: u16, data: &[u8; 32]) -> Result<()> {
        TransferPak::cart_write(self, address, data)
    }
}
