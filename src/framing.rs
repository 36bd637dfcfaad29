// UART framing between host and bridge.
//
// Host frames are a bare length prefix followed by the payload. The bridge
// answers every command with
//
//     magic   : AA 55
//     cmd_len : u8
//     resp_len: u8
//     echo    : [u8; cmd_len]
//     response: [u8; resp_len]
//
// The `AA 55` pair is a resync magic: the bridge may emit partial frames on
// startup, and hunting for the magic realigns the stream after any byte
// loss. The command echo lets passive sniffers reconstruct the exchange.

use std::io::{self, Read, Write};

use log::debug;

use crate::error::{Error, Result};

// Longest command the bridge accepts: opcode, packed address and a 32 byte
// write payload.
pub const MAX_FRAME_LEN: usize = 35;

const SYNC_MAGIC: [u8; 2] = [0xAA, 0x55];

// Write one length-prefixed command frame.
pub fn send_frame<C: Write>(channel: &mut C, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(Error::FrameTooLong(payload.len()));
    }
    channel.write_all(&[payload.len() as u8])?;
    channel.write_all(payload)?;
    channel.flush()?;
    Ok(())
}

fn retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    )
}

// Blocking single-byte read. Zero-byte reads and timeouts are retried; the
// protocol has no timeout of its own.
fn read_byte<C: Read>(channel: &mut C) -> Result<u8> {
    let mut buf = [0u8; 1];
    loop {
        match channel.read(&mut buf) {
            Ok(0) => continue,
            Ok(_) => return Ok(buf[0]),
            Err(err) if retryable(&err) => continue,
            Err(err) => return Err(err.into()),
        }
    }
}

fn read_exact<C: Read>(channel: &mut C, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match channel.read(&mut buf[filled..]) {
            Ok(0) => continue,
            Ok(n) => filled += n,
            Err(err) if retryable(&err) => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

// Hunt for the `AA 55` magic, then read one bridge frame. Returns the
// command echo and the controller's response.
pub fn sync_recv<C: Read>(channel: &mut C) -> Result<(Vec<u8>, Vec<u8>)> {
    loop {
        let byte = read_byte(channel)?;
        if byte != SYNC_MAGIC[0] {
            debug!("out of sync: {:02x}", byte);
            continue;
        }
        let byte = read_byte(channel)?;
        if byte != SYNC_MAGIC[1] {
            debug!("out of sync after magic: {:02x}", byte);
            continue;
        }

        let cmd_len = usize::from(read_byte(channel)?);
        let resp_len = usize::from(read_byte(channel)?);

        let mut echo = vec![0u8; cmd_len];
        read_exact(channel, &mut echo)?;
        let mut response = vec![0u8; resp_len];
        read_exact(channel, &mut response)?;

        return Ok((echo, response));
    }
}

// Send one command and block for the bridge's reply, discarding the echo.
pub fn send_cmd<C: Read + Write>(channel: &mut C, cmd: &[u8]) -> Result<Vec<u8>> {
    send_frame(channel, cmd)?;
    let (_echo, response) = sync_recv(channel)?;
    Ok(response)
}
