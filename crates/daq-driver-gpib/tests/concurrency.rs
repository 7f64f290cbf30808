//! Adapter calls from many threads, devices and boards never overlap.
//!
//! Board indices 70-79.

mod common;

use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::Duration;

use common::{addr, mock_board};
use daq_driver_gpib::mock::{Instrument, MockBus, Op};
use daq_driver_gpib::{Board, DeviceOptions, Options};

#[test]
fn devices_on_one_board_are_serialized() {
    let (bus, board) = mock_board(70, Options::new());
    bus.set_call_delay(Duration::from_millis(2));
    let pads = [1, 2, 3, 4];
    for pad in pads {
        bus.add_instrument(addr(pad), Instrument::new());
    }
    let devices: Vec<_> = pads
        .iter()
        .map(|&pad| board.open_device(addr(pad), &DeviceOptions::new()).unwrap())
        .collect();

    thread::scope(|s| {
        for dev in &devices {
            s.spawn(move || {
                for i in 0..10 {
                    dev.write(format!("VOLT {i}\n").as_bytes()).unwrap();
                    dev.serial_poll().unwrap();
                }
            });
        }
    });

    assert_eq!(bus.overlaps(), 0);
    assert_eq!(bus.calls(Op::Write), 40);
    for pad in pads {
        assert_eq!(bus.writes(addr(pad)).len(), 10);
    }
}

#[test]
fn boards_sharing_an_adapter_are_serialized() {
    let bus = Arc::new(MockBus::new());
    bus.set_call_delay(Duration::from_millis(1));
    bus.add_instrument(addr(5), Instrument::new());
    let first = Board::open_with_bus(71, Options::new(), bus.clone()).unwrap();
    let second = Board::open_with_bus(72, Options::new(), bus.clone()).unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..5 {
                assert!(first.enumerate().unwrap().contains(&5));
            }
        });
        s.spawn(|| {
            let dev = second.open_device(addr(5), &DeviceOptions::new()).unwrap();
            for _ in 0..20 {
                dev.trigger().unwrap();
                second.bus_lines().unwrap();
            }
        });
    });

    assert_eq!(bus.overlaps(), 0);
    assert_eq!(bus.triggers(addr(5)), 20);
}

#[test]
fn concurrent_opens_of_one_address_admit_exactly_one() {
    let (bus, board) = mock_board(73, Options::new());
    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| board.open_device(addr(11), &DeviceOptions::new())))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let opened = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(opened, 1);
    assert_eq!(bus.calls(Op::Open), 1);
    assert_eq!(bus.calls(Op::RemoteEnable), 1);
}

#[test]
fn callbacks_may_call_back_into_the_board() {
    let bus = Arc::new(MockBus::new());
    bus.add_instrument(addr(8), Instrument::new());
    let slot: Arc<OnceLock<Weak<Board>>> = Arc::new(OnceLock::new());
    let lines = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let log_slot = Arc::clone(&slot);
    let sink = Arc::clone(&lines);
    let activity_slot = Arc::clone(&slot);
    let options = Options::new()
        .logger(move |line: &str| {
            if let Some(board) = log_slot.get().and_then(Weak::upgrade) {
                let open = board.active_devices().len();
                board.bus_lines().unwrap();
                sink.lock().push(format!("{line} [{open} open]"));
            }
        })
        .activity(move |_busy| {
            if let Some(board) = activity_slot.get().and_then(Weak::upgrade) {
                board.active_devices();
            }
        });
    let board = Arc::new(Board::open_with_bus(74, options, bus.clone()).unwrap());
    slot.set(Arc::downgrade(&board)).unwrap();

    let dev = board.open_device(addr(8), &DeviceOptions::new()).unwrap();
    assert_eq!(board.enumerate().unwrap(), vec![8]);
    dev.close().unwrap();

    let lines = lines.lock();
    assert!(lines[0].starts_with("Opened address 8 (8/0) on board 74"), "{}", lines[0]);
    assert!(lines[0].ends_with("[1 open]"));
    assert!(lines.iter().any(|l| l == "Found device at address 8 on board 74 [1 open]"));
    assert_eq!(lines.last().unwrap(), "Closing address 8 [1 open]");
}
