use std::io;

use thiserror::Error;

use crate::cartridges::MbcKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("outgoing frame too long ({0} bytes)")]
    FrameTooLong(usize),
    #[error("unexpected response length {0}")]
    BadLength(usize),
    #[error("data CRC mismatch (received {received:#04x}, calculated {calculated:#04x})")]
    BadCrc { received: u8, calculated: u8 },
    #[error("invalid pak request: {0}")]
    BadPayload(&'static str),
    #[error("cart not powered on")]
    CartNotPowered,
    #[error("cartridge has no RAM")]
    NoRam,
    #[error("cartridge header not loaded")]
    NoHeader,
    #[error("bank switching not supported for {0}")]
    UnsupportedMbc(MbcKind),
    #[error("{0}")]
    NotImplemented(&'static str),
    #[error("ROM bank {0} out of range")]
    RomBankRange(u16),
    #[error("RAM bank {0} out of range")]
    RamBankRange(u8),
    #[error(transparent)]
    Io(#[from] io::Error),
}
