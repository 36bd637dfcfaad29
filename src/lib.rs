//! Host-side library for a JoyBus-to-UART controller bridge.
//!
//! The bridge forwards JoyBus command frames to an N64 controller and relays
//! the responses back over a length-framed UART link. On top of that pipe
//! this crate layers the pak address/data CRC disciplines, the accessory
//! probe handshake, the transfer pak's power and aperture registers, and the
//! Game Boy cartridge banking needed to dump ROM and save RAM through it.
//!
//! The library never opens a serial port itself; callers hand the
//! [`Controller`] any blocking byte channel implementing `Read + Write`.

pub mod accessories;
pub mod cartridges;
pub mod controller;
pub mod crc;
pub mod error;
pub mod framing;

#[cfg(test)]
mod testutil;

pub use crate::controller::Controller;
pub use crate::error::{Error, Result};
