use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use log::{debug, info, warn};

use crate::crc::{data_crc_lookup, pack_addr};
use crate::error::{Error, Result};
use crate::framing;

// Recognized JoyBus commands
pub const CMD_INFO: u8 = 0x00;
pub const CMD_STATE: u8 = 0x01;
pub const CMD_PAK_READ: u8 = 0x02;
pub const CMD_PAK_WRITE: u8 = 0x03;
pub const CMD_INFO_RESET: u8 = 0xFF;

// Joyport status: accessory present and ready.
pub const JOYPORT_PAK_READY: u8 = 1;
// Joyport status: accessory just inserted, retry later.
pub const JOYPORT_PAK_INSERTED: u8 = 3;

// Controller pak flash size.
pub const CPAK_SIZE: u32 = 0x8000;

// CRC failures on a flaky pak connector usually clear up within a couple of
// reads; past this many the link is considered broken.
const PAK_READ_ATTEMPTS: u32 = 8;

// Client for one controller behind the bridge. Owns the serial channel for
// the session; every command blocks until its echo and response have been
// consumed, so issuance order equals bus order.
pub struct Controller<C> {
    channel: C,
}

impl<C: Read + Write> Controller<C> {
    pub fn new(channel: C) -> Controller<C> {
        Controller { channel }
    }

    fn send_cmd(&mut self, cmd: &[u8]) -> Result<Vec<u8>> {
        framing::send_cmd(&mut self.channel, cmd)
    }

    #[cfg(test)]
    pub(crate) fn channel_ref(&self) -> &C {
        &self.channel
    }

    // Send INFO (or INFO_RESET) and parse the pad type and joyport status.
    pub fn pad_query(&mut self, reset: bool) -> Result<(u16, u8)> {
        let cmd_id = if reset { CMD_INFO_RESET } else { CMD_INFO };
        let response = self.send_cmd(&[cmd_id])?;
        if response.len() != 3 {
            return Err(Error::BadLength(response.len()));
        }
        let pad_type = u16::from_le_bytes([response[0], response[1]]);
        Ok((pad_type, response[2]))
    }

    // Poll the raw button/axis state.
    pub fn poll_state(&mut self) -> Result<Vec<u8>> {
        self.send_cmd(&[CMD_STATE])
    }

    // Read a 32 byte chunk from the pak address space, verifying the data
    // CRC appended to the response.
    pub fn pak_read(&mut self, address: u16) -> Result<[u8; 32]> {
        let packed = pack_addr(address)?;
        let response = self.send_cmd(&[CMD_PAK_READ, packed[0], packed[1]])?;
        if response.len() != 33 {
            return Err(Error::BadLength(response.len()));
        }

        let mut chunk = [0u8; 32];
        chunk.copy_from_slice(&response[..32]);

        let received = response[32];
        let calculated = data_crc_lookup(&chunk);
        if received != calculated {
            return Err(Error::BadCrc {
                received,
                calculated,
            });
        }

        Ok(chunk)
    }

    // Write a 32 byte chunk to the pak address space. The bridge's status
    // reply is returned as-is; its length is not fixed by the protocol.
    pub fn pak_write(&mut self, address: u16, data: &[u8; 32]) -> Result<Vec<u8>> {
        let packed = pack_addr(address)?;
        let mut cmd = Vec::with_capacity(framing::MAX_FRAME_LEN);
        cmd.push(CMD_PAK_WRITE);
        cmd.extend_from_slice(&packed);
        cmd.extend_from_slice(data);
        self.send_cmd(&cmd)
    }

    // Probe the accessory slot for a pak with the given ID: reset the
    // detect latch with 0xFE, write the candidate ID and read it back.
    pub fn check_accessory_id(&mut self, accessory_id: u8) -> Result<bool> {
        self.pak_write(0x8000, &[0xFE; 32])?;
        let reset_response = self.pak_read(0x8000)?;
        debug!("accessory reset response: {:02x?}", reset_response);

        self.pak_write(0x8000, &[accessory_id; 32])?;
        let response = self.pak_read(0x8000)?;
        debug!("accessory ID check: {:02x?}", response);

        Ok(response[31] == accessory_id)
    }

    // Dump the 32 KiB controller pak flash to a file, retrying windows
    // that fail their data CRC.
    pub fn dump_cpak(
        &mut self,
        path: impl AsRef<Path>,
        mut progress: impl FnMut(u64),
    ) -> Result<()> {
        let (_pad_type, joyport_status) = self.pad_query(true)?;
        if joyport_status == JOYPORT_PAK_INSERTED {
            warn!("pak just inserted, please retry");
            return Ok(());
        } else if joyport_status != JOYPORT_PAK_READY {
            warn!("no pak detected");
            return Ok(());
        }

        info!("dumping controller pak to {}", path.as_ref().display());
        let mut file = File::create(path)?;

        let mut done: u64 = 0;
        for address in (0..CPAK_SIZE).step_by(32) {
            let chunk = self.pak_read_retry(address as u16)?;
            debug!("{:04x}: {:02x?}", address, chunk);
            file.write_all(&chunk)?;
            done += 32;
            progress(done);
        }

        Ok(())
    }

    fn pak_read_retry(&mut self, address: u16) -> Result<[u8; 32]> {
        let mut attempts = 0;
        loop {
            match self.pak_read(address) {
                Err(err @ Error::BadCrc { .. }) => {
                    attempts += 1;
                    if attempts == PAK_READ_ATTEMPTS {
                        return Err(err);
                    }
                    warn!("retrying address {:04x}", address);
                }
                other => return other,
            }
        }
    }
}
