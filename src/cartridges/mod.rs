mod mbc1;
mod mbc3;
mod mbc5;
mod none;

use std::fmt;

use crate::error::{Error, Result};

// MD5 of the 48 byte Nintendo boot logo bitmap at cart 0x104-0x133. The
// boot ROM locks up when these bytes are wrong, so every licensed cart
// carries the identical bitmap; a fixed-value digest comparison is all the
// verification needed.
const LOGO_MD5: [u8; 16] = [
    0x86, 0x61, 0xCE, 0x8A, 0x0E, 0xBE, 0xDE, 0x95, 0xE8, 0xA1, 0x31, 0xA0, 0xAA, 0x17, 0x17, 0xF6,
];

// Length of the header image assembled from cart reads at 0x100, 0x120 and
// 0x140, truncated to the 0x100-0x14F information area.
pub const HEADER_SIZE: usize = 80;

// Memory bank controller family, from the cartridge-type byte at 0x147.
//  00h  ROM ONLY                 13h  MBC3+RAM+BATTERY
//  01h  MBC1                     19h  MBC5
//  02h  MBC1+RAM                 1Ah  MBC5+RAM
//  03h  MBC1+RAM+BATTERY         1Bh  MBC5+RAM+BATTERY
//  05h  MBC2                     1Ch  MBC5+RUMBLE
//  06h  MBC2+BATTERY             1Dh  MBC5+RUMBLE+RAM
//  08h  ROM+RAM                  1Eh  MBC5+RUMBLE+RAM+BATTERY
//  09h  ROM+RAM+BATTERY          20h  MBC6
//  0Bh-0Dh  MMM01 variants       22h  MBC7+SENSOR+RUMBLE+RAM+BATTERY
//  0Fh-13h  MBC3 variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcKind {
    NoMbc,
    Mbc1,
    Mbc2,
    Mmm01,
    Mbc3,
    Mbc5,
    Mbc6,
    Mbc7,
    Unknown,
}

impl MbcKind {
    pub fn from_cartridge_type(value: u8) -> MbcKind {
        match value {
            0x00 | 0x08 | 0x09 => MbcKind::NoMbc,
            0x01..=0x03 => MbcKind::Mbc1,
            0x05 | 0x06 => MbcKind::Mbc2,
            0x0B..=0x0D => MbcKind::Mmm01,
            0x0F..=0x13 => MbcKind::Mbc3,
            0x19..=0x1E => MbcKind::Mbc5,
            0x20 => MbcKind::Mbc6,
            0x22 => MbcKind::Mbc7,
            _ => MbcKind::Unknown,
        }
    }
}

impl fmt::Display for MbcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MbcKind::NoMbc => "NO_MBC",
            MbcKind::Mbc1 => "MBC1",
            MbcKind::Mbc2 => "MBC2",
            MbcKind::Mmm01 => "MMM01",
            MbcKind::Mbc3 => "MBC3",
            MbcKind::Mbc5 => "MBC5",
            MbcKind::Mbc6 => "MBC6",
            MbcKind::Mbc7 => "MBC7",
            MbcKind::Unknown => "unknown MBC",
        };
        f.write_str(name)
    }
}

// Cart-facing bus: 32-byte-aligned reads and writes into the cartridge's
// 16-bit address space.
pub trait CartBus {
    fn cart_read(&mut self, address: u16) -> Result<[u8; 32]>;
    fn cart_write(&mut self, address: u16, data: &[u8; 32]) -> Result<()>;
}

// Banking state machine for one MBC family. Drivers are stateless; every
// register write goes through the cart bus.
pub trait MbcDriver {
    fn switch_rom_bank(&self, cart: &mut dyn CartBus, bank: u16) -> Result<()>;
    fn switch_ram_bank(&self, cart: &mut dyn CartBus, bank: u8) -> Result<()>;
}

// Look up the banking driver for an MBC family.
pub fn mbc_driver(kind: MbcKind) -> Result<&'static dyn MbcDriver> {
    match kind {
        MbcKind::NoMbc => Ok(&none::NoMbc),
        MbcKind::Mbc1 => Ok(&mbc1::Mbc1),
        MbcKind::Mbc3 => Ok(&mbc3::Mbc3),
        MbcKind::Mbc5 => Ok(&mbc5::Mbc5),
        other => Err(Error::UnsupportedMbc(other)),
    }
}

// Parsed cartridge information area.
//
// Carts that predate the CGB use the manufacturer-code and CGB-flag bytes
// as the tail of a 16 character title; the parser folds them back in and
// leaves those fields empty in that case.
pub struct GbHeader {
    raw: [u8; HEADER_SIZE],
    pub entry_code: [u8; 4],
    pub logo_data: [u8; 48],
    pub title: Vec<u8>,
    pub manufacturer_code: Option<[u8; 4]>,
    pub cgb_flag: Option<u8>,
    pub new_licensee_code: [u8; 2],
    pub sgb_flag: u8,
    pub cartridge_type: u8,
    pub rom_size_code: u8,
    pub ram_size_code: u8,
    pub region_code: u8,
    pub old_licensee_code: u8,
    pub mask_rom_version: u8,
    pub header_checksum: u8,
    pub global_checksum: u16,
}

impl GbHeader {
    pub fn parse(raw: [u8; HEADER_SIZE]) -> GbHeader {
        let mut entry_code = [0u8; 4];
        entry_code.copy_from_slice(&raw[0x00..0x04]);
        let mut logo_data = [0u8; 48];
        logo_data.copy_from_slice(&raw[0x04..0x34]);

        let mut title = raw[0x34..0x3F].to_vec();
        let mut manufacturer = [0u8; 4];
        manufacturer.copy_from_slice(&raw[0x3F..0x43]);
        let mut manufacturer_code = Some(manufacturer);
        let mut cgb_flag = Some(raw[0x43]);

        if !matches!(raw[0x43], 0x80 | 0xC0) {
            // Pre-CGB cart: these bytes are the rest of the title.
            title.extend_from_slice(&raw[0x3F..0x44]);
            manufacturer_code = None;
            cgb_flag = None;
        }

        GbHeader {
            raw,
            entry_code,
            logo_data,
            title,
            manufacturer_code,
            cgb_flag,
            new_licensee_code: [raw[0x44], raw[0x45]],
            sgb_flag: raw[0x46],
            cartridge_type: raw[0x47],
            rom_size_code: raw[0x48],
            ram_size_code: raw[0x49],
            region_code: raw[0x4A],
            old_licensee_code: raw[0x4B],
            mask_rom_version: raw[0x4C],
            header_checksum: raw[0x4D],
            global_checksum: u16::from_be_bytes([raw[0x4E], raw[0x4F]]),
        }
    }

    // Title as printable text, stopping at the first NUL pad byte.
    pub fn title(&self) -> String {
        self.title
            .iter()
            .take_while(|&&byte| byte != 0)
            .map(|&byte| byte as char)
            .collect()
    }

    // Check the boot logo bitmap against its known digest.
    pub fn verify_logo(&self) -> bool {
        md5::compute(&self.raw[0x04..0x34]).0 == LOGO_MD5
    }

    // Check the 8 bit header checksum over bytes 0x134-0x14C:
    //  x=0: FOR i=0134h TO 014Ch: x=x-MEM[i]-1: NEXT
    pub fn verify_checksum(&self) -> bool {
        let mut checksum: u8 = 0;
        for &byte in &self.raw[0x34..0x4D] {
            checksum = checksum.wrapping_sub(byte).wrapping_sub(1);
        }
        checksum == self.header_checksum
    }

    // ROM size in bytes, "32KB shl N". Codes past 8 are not reachable
    // through the supported MBCs and map to zero.
    pub fn rom_size(&self) -> usize {
        match self.rom_size_code {
            code @ 0..=8 => 0x8000 << code,
            _ => 0,
        }
    }

    // External RAM size in bytes.
    pub fn ram_size(&self) -> usize {
        match self.ram_size_code {
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x2_0000,
            0x05 => 0x1_0000,
            _ => 0,
        }
    }

    pub fn mbc_kind(&self) -> MbcKind {
        MbcKind::from_cartridge_type(self.cartridge_type)
    }
}
