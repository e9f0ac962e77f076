mod common;

use std::thread;
use std::time::{Duration, Instant};

use canopen_simple::master::io::{Error, Master};
use canopen_simple::{node, CanBus, NmtCommand, NmtTarget, Received};

use common::sync::{BusInterface, Disconnected, SharedBus};
use common::{emergency_log, init_logger, SimNode};

const NODE: u8 = 12;

fn master_main_loop(io: BusInterface) -> Result<Vec<u8>, Error<Disconnected>> {
    let start = Instant::now();
    let clock = move || start.elapsed().as_millis() as u32;
    let (log, sink) = emergency_log();
    let mut master = Master::new(io, clock, sink);

    master.nmt_request(NmtTarget::All, NmtCommand::ResetNode)?;
    master.wait_boot(NODE)?;
    assert_eq!(master.sdo_read::<u32>(NODE, 0x1018, 0x01)?, 0x123);
    master.sdo_write(NODE, 0x1017, 0x00, 100u16)?;
    assert_eq!(master.sdo_read::<u16>(NODE, 0x1017, 0x00)?, 100);
    assert!(matches!(
        master.sdo_write(NODE, 0x1000, 0x00, 0u32),
        Err(Error::Abort { .. })
    ));
    master.nmt_request(node(NODE), NmtCommand::Operational)?;

    let mut received = Vec::new();
    for cycle in 0..5u8 {
        master.send_process_data(NODE, &[cycle, 0xaa])?;
        master.sync()?;
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match master.receive_process_data(NODE)? {
                Received::ProcessData(data) => {
                    assert_eq!(data[1], 0xaa);
                    received.push(data[0]);
                    break;
                }
                _ if Instant::now() > deadline => panic!("no process data in cycle {}", cycle),
                _ => thread::yield_now(),
            }
        }
    }
    assert_eq!(log.borrow().len(), 1);
    assert_eq!(log.borrow()[0].node, NODE);
    Ok(received)
}

fn node_main_loop(mut io: BusInterface, mut node: SimNode) {
    loop {
        match io.receive() {
            Ok(Some(frame)) => {
                for response in node.handle(&frame) {
                    if io.send(&response).is_err() {
                        return;
                    }
                }
            }
            Ok(None) => {}
            Err(Disconnected) => return,
        }
    }
}

#[test]
fn chat() {
    init_logger();
    let bus = SharedBus::new();
    let master_if = bus.new_master_interface();
    let node_if = bus.new_node_interface();

    let mut sim = SimNode::new(NODE);
    sim.emcy_on_sync = Some([0x00, 0x10, 0x01, 0, 0, 0, 0, 0]);
    let node_thread = thread::spawn(move || node_main_loop(node_if, sim));
    let master_thread = thread::spawn(move || master_main_loop(master_if));

    let result = master_thread.join();
    bus.disconnect();
    node_thread.join().unwrap();

    assert_eq!(result.unwrap().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn disconnected_bus() {
    let bus = SharedBus::new();
    let master_if = bus.new_master_interface();
    bus.disconnect();

    let (_, sink) = emergency_log();
    let mut master = Master::new(master_if, || 0u32, sink);
    assert!(matches!(
        master.wait_boot(NODE),
        Err(Error::Transport {
            error: Disconnected
        })
    ));
}
