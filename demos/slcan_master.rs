//! Configure one drive over an SLCAN adapter and run a SYNC driven process
//! data loop with it.
//!
//! Usage: slcan_master [PORT] [NODE]

use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use canopen_simple::master::io::Master;
use canopen_simple::slcan::{Bitrate, SlcanBus};
use canopen_simple::{node, CanBus, Clock, Emergency, EmergencySink, NmtCommand, NmtTarget, Received};

const CYCLE: Duration = Duration::from_millis(10);

/// Read the identity object and set up the PDO mapping of the drive:
/// status word, actual position and actual current go out on the transmit
/// PDO, control word and target position come in on the receive PDO.
fn configure<B, C, S>(master: &mut Master<B, C, S>, id: u8) -> Result<()>
where
    B: CanBus,
    B::Error: Send + Sync + 'static,
    C: Clock,
    S: EmergencySink,
{
    for (subindex, name) in [(1, "vendor-id"), (2, "product code"), (3, "revision"), (4, "serial")] {
        let value: u32 = master
            .sdo_read(id, 0x1018, subindex)
            .with_context(|| format!("reading {}", name))?;
        println!("{}: {:#x}", name, value);
    }

    let settings: &[(u16, u8, u32)] = &[
        (0x1800, 0x01, 0xc000_0180 | u32::from(id)), // invalidate TPDO1
        (0x1a00, 0x00, 0),
        (0x1a00, 0x01, 0x6041_0010), // status word
        (0x1a00, 0x02, 0x6064_0020), // position actual
        (0x1a00, 0x03, 0x6078_0010), // current actual
        (0x1a00, 0x00, 3),
        (0x1800, 0x02, 1), // transmit on every SYNC
        (0x1800, 0x01, 0x4000_0180 | u32::from(id)),
        (0x1400, 0x01, 0xc000_0200 | u32::from(id)), // invalidate RPDO1
        (0x1600, 0x00, 0),
        (0x1600, 0x01, 0x6040_0010), // control word
        (0x1600, 0x02, 0x60c1_0120), // target position
        (0x1600, 0x00, 2),
        (0x1400, 0x02, 1),
        (0x1400, 0x01, 0x4000_0200 | u32::from(id)),
    ];
    for &(index, subindex, value) in settings {
        master
            .sdo_write(id, index, subindex, value)
            .with_context(|| format!("writing {:04x}:{:02x}", index, subindex))?;
    }
    // interpolated position mode
    master.sdo_write(id, 0x6060, 0x00, 7i8)?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| "/dev/ttyACM0".to_string());
    let id: u8 = match args.next() {
        Some(id) => id.parse().context("invalid node id")?,
        None => 127,
    };

    let serial = serialport::new(&port, 115_200)
        .timeout(Duration::from_millis(5))
        .open()
        .with_context(|| format!("failed to open {}", port))?;
    let mut bus = SlcanBus::new(serial);
    bus.open(Bitrate::Kbit500)?;

    let start = Instant::now();
    let clock = move || start.elapsed().as_millis() as u32;
    let on_emergency = |emcy: &Emergency| {
        println!(
            "EMCY node {} code {:#06x} register {:#04x} {:02x?}",
            emcy.node, emcy.error_code, emcy.error_register, emcy.manufacturer
        )
    };
    let mut master = Master::new(bus, clock, on_emergency);

    master.nmt_request(NmtTarget::All, NmtCommand::ResetNode)?;
    master.wait_boot(id).context("node didn't boot")?;
    configure(&mut master, id)?;
    master.nmt_request(node(id), NmtCommand::Operational)?;

    let mut target: i32 = 0;
    loop {
        let cycle_start = Instant::now();
        master.sync()?;

        let actual = loop {
            match master.receive_process_data(id)? {
                Received::ProcessData(data) if data.len() == 8 => break Some(data),
                Received::ProcessData(data) => bail!("unexpected PDO length {}", data.len()),
                _ if cycle_start.elapsed() >= CYCLE => break None,
                _ => {}
            }
        };

        if let Some(data) = actual {
            let status = u16::from_le_bytes([data[0], data[1]]);
            let position = i32::from_le_bytes([data[2], data[3], data[4], data[5]]);
            let current = i16::from_le_bytes([data[6], data[7]]);
            println!("status {:#06x} position {} current {}", status, position, current);
            target = position;
        }

        let mut out = [0; 6];
        out[0..2].copy_from_slice(&0x000fu16.to_le_bytes());
        out[2..6].copy_from_slice(&target.to_le_bytes());
        master.send_process_data(id, &out)?;

        if let Some(rest) = CYCLE.checked_sub(cycle_start.elapsed()) {
            sleep(rest);
        }
    }
}
