use std::io::{Read, Write};

use crate::controller::Controller;
use crate::error::Result;

// Rumble pak ID reported by the 0x8000 probe.
pub const ACCESSORY_ID: u8 = 0x80;

// Motor control register in the pak address space.
const REG_MOTOR: u16 = 0xC000;

pub struct RumblePak<'a, C> {
    pad: &'a mut Controller<C>,
}

impl<'a, C: Read + Write> RumblePak<'a, C> {
    pub fn new(pad: &'a mut Controller<C>) -> RumblePak<'a, C> {
        RumblePak { pad }
    }

    pub fn probe(&mut self) -> Result<bool> {
        self.pad.check_accessory_id(ACCESSORY_ID)
    }

    // Start or stop the rumble motor.
    pub fn set_rumble(&mut self, on: bool) -> Result<()> {
        let value = if on { 0x01 } else { 0x00 };
        self.pad.pak_write(REG_MOTOR, &[value; 32])?;
        Ok(())
    }
}
