use std::io::{self, Write};
use std::process;
use std::thread;
use std::time::Duration;

use argparse::{ArgumentParser, Store, StoreTrue};
use log::info;

use joybridge::accessories::{RumblePak, TransferPak};
use joybridge::controller::{CMD_INFO, CMD_INFO_RESET, CMD_PAK_READ, CMD_PAK_WRITE, CMD_STATE, CPAK_SIZE};
use joybridge::crc::extract_addr;
use joybridge::{framing, Controller, Result};

type Port = Box<dyn serialport::SerialPort>;

enum Mode {
    Poll,
    DumpCpak(String),
    TestRumble,
    TestTransfer,
    DumpRom(String),
    DumpRam(String),
    Sniff,
}

fn main() {
    let mut port_name = String::new();
    let mut baudrate: u32 = 1_500_000;
    let mut verbose = false;
    let mut dump_cpak = String::new();
    let mut test_rumble = false;
    let mut test_transfer = false;
    let mut dump_rom = String::new();
    let mut dump_ram = String::new();
    let mut sniff = false;
    {
        let mut arg_parser = ArgumentParser::new();
        arg_parser.set_description("JoyBus controller bridge host");
        arg_parser.refer(&mut baudrate).add_option(
            &["-b", "--baudrate"],
            Store,
            "Serial baudrate (Default: 1500000)",
        );
        arg_parser.refer(&mut verbose).add_option(
            &["-v", "--verbose"],
            StoreTrue,
            "Enable debug logging",
        );
        arg_parser.refer(&mut dump_cpak).add_option(
            &["--dump-cpak"],
            Store,
            "File to dump controller pak memory to",
        );
        arg_parser.refer(&mut test_rumble).add_option(
            &["--test-rumble"],
            StoreTrue,
            "Pulse the rumble pak motor",
        );
        arg_parser.refer(&mut test_transfer).add_option(
            &["--test-transfer"],
            StoreTrue,
            "Probe the transfer pak and read the cart header",
        );
        arg_parser.refer(&mut dump_rom).add_option(
            &["--dump-rom"],
            Store,
            "File to dump transfer pak cart ROM to",
        );
        arg_parser.refer(&mut dump_ram).add_option(
            &["--dump-ram"],
            Store,
            "File to dump transfer pak cart RAM to",
        );
        arg_parser.refer(&mut sniff).add_option(
            &["--sniff"],
            StoreTrue,
            "Passively decode bridge traffic instead of sending commands",
        );
        arg_parser
            .refer(&mut port_name)
            .add_argument("port", Store, "Serial port of the bridge")
            .required();
        arg_parser.parse_args_or_exit();
    }

    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    // The modes are mutually exclusive.
    let mut modes = Vec::new();
    if !dump_cpak.is_empty() {
        modes.push(Mode::DumpCpak(dump_cpak));
    }
    if test_rumble {
        modes.push(Mode::TestRumble);
    }
    if test_transfer {
        modes.push(Mode::TestTransfer);
    }
    if !dump_rom.is_empty() {
        modes.push(Mode::DumpRom(dump_rom));
    }
    if !dump_ram.is_empty() {
        modes.push(Mode::DumpRam(dump_ram));
    }
    if sniff {
        modes.push(Mode::Sniff);
    }
    if modes.len() > 1 {
        eprintln!("joybridge: choose at most one mode");
        process::exit(2);
    }
    let mode = modes.pop().unwrap_or(Mode::Poll);

    if let Err(err) = run(&port_name, baudrate, mode) {
        eprintln!("joybridge: {}", err);
        process::exit(1);
    }
}

fn run(port_name: &str, baudrate: u32, mode: Mode) -> Result<()> {
    let port = serialport::new(port_name, baudrate)
        .timeout(Duration::from_secs(2))
        .open()
        .map_err(io::Error::from)?;
    info!("opened {}", port_name);

    match mode {
        Mode::Sniff => sniff_loop(port),
        mode => {
            let mut pad = Controller::new(port);
            let (pad_type, joyport_status) = pad.pad_query(true)?;
            println!("pad type: {:04x}, joyport status: {:02x}", pad_type, joyport_status);

            match mode {
                Mode::Poll => poll_loop(&mut pad),
                Mode::DumpCpak(path) => {
                    pad.dump_cpak(&path, progress_printer(u64::from(CPAK_SIZE)))?;
                    finish_progress();
                    Ok(())
                }
                Mode::TestRumble => rumble_test(&mut pad),
                Mode::TestTransfer => transfer_test(&mut pad),
                Mode::DumpRom(path) => dump_rom(&mut pad, &path),
                Mode::DumpRam(path) => dump_ram(&mut pad, &path),
                Mode::Sniff => unreachable!(),
            }
        }
    }
}

fn poll_loop(pad: &mut Controller<Port>) -> Result<()> {
    loop {
        let state = pad.poll_state()?;
        println!("state: {}", hex_bytes(&state));
        thread::sleep(Duration::from_millis(1));
    }
}

fn rumble_test(pad: &mut Controller<Port>) -> Result<()> {
    let mut rumble = RumblePak::new(pad);
    let present = rumble.probe()?;
    println!("rumble pak present: {}", present);

    if present {
        rumble.set_rumble(true)?;
        thread::sleep(Duration::from_secs(1));
        rumble.set_rumble(false)?;
    }
    Ok(())
}

fn transfer_test(pad: &mut Controller<Port>) -> Result<()> {
    let mut tpak = TransferPak::new(pad);
    let present = tpak.probe()?;
    println!("transfer pak present: {}", present);
    if !present {
        return Ok(());
    }

    if !tpak.cart_present()? {
        println!("no cartridge in transfer pak");
        return Ok(());
    }

    tpak.cart_enable(true)?;
    let loaded = tpak.load_header(true);
    let powered_off = tpak.cart_enable(false);

    if !loaded? {
        println!("cartridge header failed verification");
        return powered_off;
    }
    powered_off?;

    if let Some(header) = tpak.header() {
        println!("title: {}", header.title());
        println!("mbc: {} (type {:#04x})", header.mbc_kind(), header.cartridge_type);
        println!("rom size: {} bytes", header.rom_size());
        println!("ram size: {} bytes", header.ram_size());
    }
    Ok(())
}

// Probe, read the header and hand the pak to one of the dump pipelines.
fn prepare_tpak<'a>(pad: &'a mut Controller<Port>) -> Result<Option<TransferPak<'a, Port>>> {
    let mut tpak = TransferPak::new(pad);
    if !tpak.probe()? {
        println!("no transfer pak detected");
        return Ok(None);
    }
    if !tpak.cart_present()? {
        println!("no cartridge in transfer pak");
        return Ok(None);
    }

    tpak.cart_enable(true)?;
    let loaded = tpak.load_header(true);
    let powered_off = tpak.cart_enable(false);
    if !loaded? {
        println!("cartridge header failed verification");
        return powered_off.map(|_| None);
    }
    powered_off?;
    Ok(Some(tpak))
}

fn dump_rom(pad: &mut Controller<Port>, path: &str) -> Result<()> {
    let Some(mut tpak) = prepare_tpak(pad)? else {
        return Ok(());
    };
    let total = tpak.header().map(|h| h.rom_size() as u64).unwrap_or(0);
    tpak.dump_rom(path, progress_printer(total))?;
    finish_progress();
    Ok(())
}

fn dump_ram(pad: &mut Controller<Port>, path: &str) -> Result<()> {
    let Some(mut tpak) = prepare_tpak(pad)? else {
        return Ok(());
    };
    let total = tpak.header().map(|h| h.ram_size() as u64).unwrap_or(0);
    tpak.dump_ram(path, progress_printer(total))?;
    finish_progress();
    Ok(())
}

fn sniff_loop(mut port: Port) -> Result<()> {
    loop {
        let (cmd, response) = framing::sync_recv(&mut port)?;
        if cmd.is_empty() {
            continue;
        }
        match cmd[0] {
            // State polling is spammy; info frames carry nothing to decode.
            CMD_INFO | CMD_INFO_RESET | CMD_STATE => {}
            CMD_PAK_READ if cmd.len() >= 3 => {
                let (address, crc) = extract_addr([cmd[1], cmd[2]]);
                println!("read cmd: {:04x} (addr CRC-5 {:02x})", address, crc);
                println!("  response: {}", hex_bytes(&response));
            }
            CMD_PAK_WRITE if cmd.len() >= 3 => {
                let (address, crc) = extract_addr([cmd[1], cmd[2]]);
                println!("write cmd: {:04x} (addr CRC-5 {:02x})", address, crc);
                println!("  {}", hex_bytes(&cmd[3..]));
                println!("  response: {}", hex_bytes(&response));
            }
            other => println!("unknown cmd {:02x}", other),
        }
    }
}

fn progress_printer(total: u64) -> impl FnMut(u64) {
    move |done| {
        print!("\r{} / {} bytes", done, total);
        let _ = io::stdout().flush();
    }
}

fn finish_progress() {
    println!();
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<Vec<_>>()
        .join(" ")
}
