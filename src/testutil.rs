// Test doubles: a fake bridge that frames like the real one and emulates a
// controller pak or a transfer pak with a banked cartridge behind it.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use crate::cartridges::{CartBus, MbcKind};
use crate::controller::{CMD_INFO, CMD_INFO_RESET, CMD_PAK_READ, CMD_PAK_WRITE, CMD_STATE};
use crate::crc::{data_crc_lookup, extract_addr};
use crate::error::Result;

// The boot logo bitmap every licensed cart carries at 0x104-0x133.
pub const BOOT_LOGO: [u8; 48] = [
    0xCE, 0xED, 0x66, 0x66, 0xCC, 0x0D, 0x00, 0x0B, 0x03, 0x73, 0x00, 0x83, 0x00, 0x0C, 0x00, 0x0D,
    0x00, 0x08, 0x11, 0x1F, 0x88, 0x89, 0x00, 0x0E, 0xDC, 0xCC, 0x6E, 0xE6, 0xDD, 0xDD, 0xD9, 0x99,
    0xBB, 0xBB, 0x67, 0x63, 0x6E, 0x0E, 0xEC, 0xCC, 0xDD, 0xDC, 0x99, 0x9F, 0xBB, 0xB9, 0x33, 0x3E,
];

// Records MBC register writes for driver tests.
pub struct RecorderBus {
    pub writes: Vec<(u16, u8)>,
}

impl RecorderBus {
    pub fn new() -> RecorderBus {
        RecorderBus { writes: Vec::new() }
    }
}

impl CartBus for RecorderBus {
    fn cart_read(&mut self, _address: u16) -> Result<[u8; 32]> {
        Ok([0x00; 32])
    }

    fn cart_write(&mut self, address: u16, data: &[u8; 32]) -> Result<()> {
        self.writes.push((address, data[0]));
        Ok(())
    }
}

// Cartridge model with just enough MBC behavior for the banking drivers:
// register writes move the visible ROM/RAM banks the way the silicon does.
pub struct FakeCart {
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    cartridge_type: u8,
    rom_bank: usize,
    ram_bank: usize,
    ram_enabled: bool,
    bank_mode: u8,
    pub rom_bank_writes: usize,
    pub ram_enable_writes: usize,
    pub ram_disable_writes: usize,
}

impl FakeCart {
    pub fn new(cartridge_type: u8, rom_size_code: u8, ram_size_code: u8) -> FakeCart {
        let rom_len = 0x8000usize << rom_size_code;
        let mut rom: Vec<u8> = (0..rom_len).map(|i| (i ^ (i >> 8) ^ (i >> 16)) as u8).collect();

        // Information area: logo, title, type and size codes, checksum.
        rom[0x100..0x150].fill(0);
        rom[0x104..0x134].copy_from_slice(&BOOT_LOGO);
        rom[0x134..0x13C].copy_from_slice(b"FAKECART");
        rom[0x147] = cartridge_type;
        rom[0x148] = rom_size_code;
        rom[0x149] = ram_size_code;
        let mut checksum: u8 = 0;
        for &byte in &rom[0x134..0x14D] {
            checksum = checksum.wrapping_sub(byte).wrapping_sub(1);
        }
        rom[0x14D] = checksum;

        let ram_len = match ram_size_code {
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x2_0000,
            0x05 => 0x1_0000,
            _ => 0,
        };
        let ram = (0..ram_len).map(|i| (i ^ 0x5A ^ (i >> 9)) as u8).collect();

        FakeCart {
            rom,
            ram,
            cartridge_type,
            rom_bank: 1,
            ram_bank: 0,
            ram_enabled: false,
            bank_mode: 0,
            rom_bank_writes: 0,
            ram_enable_writes: 0,
            ram_disable_writes: 0,
        }
    }

    fn read(&self, address: u16) -> u8 {
        match address {
            0x0000..=0x3FFF => self.rom[usize::from(address)],
            0x4000..=0x7FFF => {
                let index = self.rom_bank * 0x4000 + usize::from(address) - 0x4000;
                self.rom[index % self.rom.len()]
            }
            0xA000..=0xBFFF => {
                if self.ram_enabled && !self.ram.is_empty() {
                    let index = self.ram_bank * 0x2000 + usize::from(address) - 0xA000;
                    self.ram[index % self.ram.len()]
                } else {
                    0xFF
                }
            }
            _ => 0x00,
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        let kind = MbcKind::from_cartridge_type(self.cartridge_type);
        match (kind, address) {
            (_, 0x0000..=0x1FFF) => {
                let enable = value & 0x0F == 0x0A;
                if enable {
                    self.ram_enable_writes += 1;
                } else {
                    self.ram_disable_writes += 1;
                }
                self.ram_enabled = enable;
            }
            (MbcKind::Mbc1, 0x2000..=0x3FFF) => {
                let n = value & 0x1F;
                self.rom_bank = usize::from(if n == 0 { 1 } else { n });
                self.rom_bank_writes += 1;
            }
            (MbcKind::Mbc3, 0x2000..=0x3FFF) => {
                let n = value & 0x7F;
                self.rom_bank = usize::from(if n == 0 { 1 } else { n });
                self.rom_bank_writes += 1;
            }
            (MbcKind::Mbc5, 0x2000..=0x2FFF) => {
                self.rom_bank = (self.rom_bank & 0x100) | usize::from(value);
                self.rom_bank_writes += 1;
            }
            (MbcKind::Mbc5, 0x3000..=0x3FFF) => {
                self.rom_bank = (self.rom_bank & 0x0FF) | (usize::from(value & 0x01) << 8);
            }
            (MbcKind::Mbc1, 0x4000..=0x5FFF) => {
                if self.bank_mode == 0x01 {
                    self.ram_bank = usize::from(value & 0x03);
                }
            }
            (MbcKind::Mbc3, 0x4000..=0x5FFF) => self.ram_bank = usize::from(value & 0x03),
            (MbcKind::Mbc5, 0x4000..=0x5FFF) => self.ram_bank = usize::from(value & 0x0F),
            (MbcKind::Mbc1, 0x6000..=0x7FFF) => self.bank_mode = value & 0x01,
            _ => {}
        }
    }
}

// Transfer pak model: probe latch, access-mode register, aperture bank and
// the cart window.
pub struct FakeTpak {
    pub cart: Option<FakeCart>,
    probe: u8,
    access_mode: u8,
    aperture_bank: u8,
    pub aperture_writes: usize,
}

impl FakeTpak {
    pub fn access_mode(&self) -> u8 {
        self.access_mode
    }

    fn pak_read(&self, address: u16) -> [u8; 32] {
        match address {
            0x8000 => {
                if self.probe == 0x84 {
                    [0x84; 32]
                } else {
                    [0x00; 32]
                }
            }
            0xB000 => {
                let mut data = [0u8; 32];
                if self.cart.is_some() {
                    data[31] = 0x80;
                }
                data
            }
            0xC000..=0xFFFF => {
                if self.access_mode != 0x01 {
                    return [0x00; 32];
                }
                match &self.cart {
                    Some(cart) => {
                        let base =
                            u32::from(self.aperture_bank) * 0x4000 + u32::from(address - 0xC000);
                        let mut data = [0u8; 32];
                        for (i, byte) in data.iter_mut().enumerate() {
                            *byte = cart.read((base + i as u32) as u16);
                        }
                        data
                    }
                    None => [0xFF; 32],
                }
            }
            _ => [0x00; 32],
        }
    }

    fn pak_write(&mut self, address: u16, data: &[u8; 32]) {
        match address {
            0x8000 => self.probe = data[31],
            0xA000 => {
                self.aperture_bank = data[0] & 0x03;
                self.aperture_writes += 1;
            }
            0xB000 => self.access_mode = data[0],
            0xC000..=0xFFFF => {
                if self.access_mode != 0x01 {
                    return;
                }
                let base = u32::from(self.aperture_bank) * 0x4000 + u32::from(address - 0xC000);
                if let Some(cart) = &mut self.cart {
                    cart.write(base as u16, data[0]);
                }
            }
            _ => {}
        }
    }
}

enum FakePak {
    Cpak { memory: Vec<u8> },
    Tpak(FakeTpak),
}

// Byte channel that behaves like the bridge: buffers outgoing command
// frames, executes them against the modeled pak and queues framed replies.
pub struct FakeBridge {
    pak: FakePak,
    pending: Vec<u8>,
    outbox: VecDeque<u8>,
    pub joyport_status: u8,
    // Corrupt the CRC of the next read response for this address.
    pub corrupt_once: Option<u16>,
    // Every pak write seen, as (address, fill byte).
    pub pak_writes: Vec<(u16, u8)>,
}

impl FakeBridge {
    pub fn with_cpak(memory: Vec<u8>) -> FakeBridge {
        FakeBridge::new(FakePak::Cpak { memory })
    }

    pub fn with_tpak(cart: Option<FakeCart>) -> FakeBridge {
        FakeBridge::new(FakePak::Tpak(FakeTpak {
            cart,
            probe: 0x00,
            access_mode: 0x00,
            aperture_bank: 0x00,
            aperture_writes: 0,
        }))
    }

    fn new(pak: FakePak) -> FakeBridge {
        FakeBridge {
            pak,
            pending: Vec::new(),
            outbox: VecDeque::new(),
            joyport_status: 1,
            corrupt_once: None,
            pak_writes: Vec::new(),
        }
    }

    pub fn tpak_ref(&self) -> &FakeTpak {
        match &self.pak {
            FakePak::Tpak(tpak) => tpak,
            FakePak::Cpak { .. } => panic!("fake bridge does not model a transfer pak"),
        }
    }

    fn pak_read(&self, address: u16) -> [u8; 32] {
        match &self.pak {
            FakePak::Cpak { memory } => {
                let mut data = [0u8; 32];
                if usize::from(address) + 32 <= memory.len() {
                    data.copy_from_slice(&memory[usize::from(address)..usize::from(address) + 32]);
                }
                data
            }
            FakePak::Tpak(tpak) => tpak.pak_read(address),
        }
    }

    fn pak_write(&mut self, address: u16, data: &[u8; 32]) {
        match &mut self.pak {
            FakePak::Cpak { memory } => {
                if usize::from(address) + 32 <= memory.len() {
                    memory[usize::from(address)..usize::from(address) + 32].copy_from_slice(data);
                }
            }
            FakePak::Tpak(tpak) => tpak.pak_write(address, data),
        }
    }

    fn handle_cmd(&mut self, cmd: &[u8]) -> Vec<u8> {
        match cmd[0] {
            CMD_INFO | CMD_INFO_RESET => vec![0x05, 0x00, self.joyport_status],
            CMD_STATE => vec![0x00, 0x00, 0x00, 0x00],
            CMD_PAK_READ => {
                let (address, _) = extract_addr([cmd[1], cmd[2]]);
                let chunk = self.pak_read(address);
                let mut crc = data_crc_lookup(&chunk);
                if self.corrupt_once == Some(address) {
                    self.corrupt_once = None;
                    crc ^= 0xFF;
                }
                let mut response = chunk.to_vec();
                response.push(crc);
                response
            }
            CMD_PAK_WRITE => {
                let (address, _) = extract_addr([cmd[1], cmd[2]]);
                let mut data = [0u8; 32];
                data.copy_from_slice(&cmd[3..35]);
                self.pak_writes.push((address, data[0]));
                self.pak_write(address, &data);
                vec![data_crc_lookup(&data)]
            }
            _ => Vec::new(),
        }
    }

    fn process_pending(&mut self) {
        loop {
            let Some(&len) = self.pending.first() else {
                return;
            };
            let frame_len = 1 + usize::from(len);
            if self.pending.len() < frame_len {
                return;
            }
            let cmd: Vec<u8> = self.pending[1..frame_len].to_vec();
            self.pending.drain(..frame_len);

            let response = self.handle_cmd(&cmd);
            self.outbox
                .extend([0xAA, 0x55, cmd.len() as u8, response.len() as u8]);
            self.outbox.extend(cmd.iter().copied());
            self.outbox.extend(response.iter().copied());
        }
    }
}

impl Read for FakeBridge {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.outbox.pop_front() {
            Some(byte) => {
                buf[0] = byte;
                Ok(1)
            }
            // Running dry means the host expects a reply it never asked
            // for; fail loudly instead of letting the retry loop spin.
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "fake bridge has nothing to send",
            )),
        }
    }
}

impl Write for FakeBridge {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        self.process_pending();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
