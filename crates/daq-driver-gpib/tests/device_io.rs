//! Device I/O against the mock adapter.
//!
//! Board indices 30-49.

mod common;

use std::io::{BufRead, BufReader, Read, Write};
use std::time::Duration;

use common::{addr, mock_board, Recorder};
use daq_driver_gpib::mock::{Fault, Instrument, Op};
use daq_driver_gpib::{DeviceOptions, ErrorCode, GpibError, Options};

#[test]
fn write_then_read_query() {
    let rec = Recorder::new();
    let (bus, board) = mock_board(30, rec.options());
    bus.add_instrument(
        addr(22),
        Instrument::new().respond("HEWLETT-PACKARD,34401A,0,10-5-2\n"),
    );
    let dmm = board.open_device(addr(22), &DeviceOptions::new()).unwrap();
    rec.reset();

    assert_eq!(dmm.write(b"*IDN?\n").unwrap(), 6);
    assert_eq!(bus.writes(addr(22)), vec![b"*IDN?\n".to_vec()]);

    let mut buf = [0u8; 128];
    let n = dmm.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"HEWLETT-PACKARD,34401A,0,10-5-2\n");

    let lines = rec.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("Wrote \"*IDN?\\n\" in "), "{}", lines[0]);
    assert!(lines[0].ends_with(" to address 22"));
    assert!(lines[1].starts_with("Read \"HEWLETT-PACKARD,34401A,0,10-5-2\\n\" in "));
    assert!(lines[1].ends_with(" from address 22"));
    assert_eq!(rec.activity(), vec![true, false, true, false]);
}

#[test]
fn read_count_comes_from_the_count_register() {
    let (bus, board) = mock_board(31, Options::new());
    bus.add_instrument(addr(4), Instrument::new().respond("0123456789"));
    let dev = board.open_device(addr(4), &DeviceOptions::new()).unwrap();

    let mut buf = [0u8; 4];
    assert_eq!(dev.read(&mut buf).unwrap(), 4);
    assert_eq!(&buf, b"0123");
    assert_eq!(dev.read(&mut buf).unwrap(), 4);
    assert_eq!(dev.read(&mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"89");
}

#[test]
fn long_payloads_are_shortened_in_logs() {
    let rec = Recorder::new();
    let (bus, board) = mock_board(32, rec.options());
    bus.add_instrument(addr(6), Instrument::new());
    let dev = board.open_device(addr(6), &DeviceOptions::new()).unwrap();

    let data = vec![b'x'; 100];
    dev.write(&data).unwrap();
    let line = rec.last_line();
    assert!(
        line.starts_with(&format!("Wrote \"{}\"...(100 bytes total) in ", "x".repeat(40))),
        "{line}"
    );
}

#[test]
fn operations_after_close_never_reach_hardware() {
    let (bus, board) = mock_board(33, Options::new());
    bus.add_instrument(addr(9), Instrument::new().respond("data"));
    let dev = board.open_device(addr(9), &DeviceOptions::new()).unwrap();
    dev.close().unwrap();
    let calls = bus.total_calls();

    let mut buf = [0u8; 8];
    assert_eq!(dev.read(&mut buf), Err(GpibError::AlreadyClosed));
    assert_eq!(dev.write(b"x"), Err(GpibError::AlreadyClosed));
    assert_eq!(dev.clear(), Err(GpibError::AlreadyClosed));
    assert_eq!(dev.trigger(), Err(GpibError::AlreadyClosed));
    assert_eq!(dev.serial_poll(), Err(GpibError::AlreadyClosed));
    assert_eq!(
        dev.set_timeout(Duration::from_secs(1)),
        Err(GpibError::AlreadyClosed)
    );
    assert_eq!(dev.close(), Err(GpibError::AlreadyClosed));

    assert_eq!(bus.total_calls(), calls);
    assert_eq!(bus.calls(Op::Read), 0);
    assert_eq!(bus.calls(Op::Write), 0);
}

#[test]
fn closed_device_skips_activity_callback() {
    let rec = Recorder::new();
    let (_bus, board) = mock_board(34, rec.options());
    let dev = board.open_device(addr(9), &DeviceOptions::new()).unwrap();
    dev.close().unwrap();
    rec.reset();

    assert!(dev.trigger().is_err());
    assert!(rec.activity().is_empty());
    assert!(rec.lines().is_empty());
}

#[test]
fn timeout_is_reported_as_timeout() {
    let rec = Recorder::new();
    let (bus, board) = mock_board(35, rec.options());
    bus.add_instrument(addr(12), Instrument::new());
    let dev = board.open_device(addr(12), &DeviceOptions::new()).unwrap();

    // Nothing queued: the talker never answers.
    let mut buf = [0u8; 16];
    let err = dev.read(&mut buf).unwrap_err();
    assert_eq!(err, GpibError::Timeout);
    assert!(err.is_timeout());
    assert_eq!(
        rec.last_line(),
        format!(
            "Failed to read from address 12 device {}: timed out",
            dev.descriptor()
        )
    );
}

#[test]
fn hardware_errors_are_decoded() {
    let (bus, board) = mock_board(36, Options::new());
    bus.add_instrument(addr(12), Instrument::new().silent());
    let dev = board.open_device(addr(12), &DeviceOptions::new()).unwrap();

    assert_eq!(
        dev.write(b"*RST\n"),
        Err(GpibError::Hardware {
            code: ErrorCode::Enol
        })
    );

    bus.set_fault(Op::Trigger, Fault::errno(ErrorCode::Efso, 5));
    assert_eq!(
        dev.trigger(),
        Err(GpibError::System {
            code: ErrorCode::Efso,
            errno: 5
        })
    );
}

#[test]
fn set_timeout_applies_to_this_device_only() {
    let rec = Recorder::new();
    let (bus, board) = mock_board(37, rec.options());
    let a = board.open_device(addr(1), &DeviceOptions::new()).unwrap();
    let b = board.open_device(addr(2), &DeviceOptions::new()).unwrap();

    a.set_timeout(Duration::from_millis(2)).unwrap();
    assert_eq!(a.timeout(), Duration::from_millis(2));
    assert_eq!(bus.descriptor_timeout(a.descriptor()).unwrap().raw(), 6);
    assert_eq!(bus.descriptor_timeout(b.descriptor()).unwrap().raw(), 13);
    assert_eq!(b.timeout(), Duration::from_secs(10));
    assert_eq!(rec.last_line(), "Setting timeout to 2ms on address 1");
}

#[test]
fn failed_set_timeout_keeps_old_value() {
    let (bus, board) = mock_board(38, Options::new());
    let dev = board.open_device(addr(1), &DeviceOptions::new()).unwrap();
    bus.set_fault(Op::SetTimeout, Fault::code(ErrorCode::Earg));

    assert!(dev.set_timeout(Duration::from_secs(1)).is_err());
    assert_eq!(dev.timeout(), Duration::from_secs(10));
}

#[test]
fn trigger_and_serial_poll() {
    let rec = Recorder::new();
    let (bus, board) = mock_board(39, rec.options());
    bus.add_instrument(addr(15), Instrument::new().status_byte(0x50));
    let dev = board.open_device(addr(15), &DeviceOptions::new()).unwrap();

    dev.trigger().unwrap();
    assert_eq!(bus.triggers(addr(15)), 1);
    assert_eq!(rec.last_line(), "Triggering device at address 15");

    assert_eq!(dev.serial_poll().unwrap(), 0x50);
    let line = rec.last_line();
    assert!(line.starts_with("Polled status 50 in "), "{line}");
    assert!(line.ends_with(" from address 15"));
}

#[test]
fn io_traits_compose_with_buffered_readers() {
    let (bus, board) = mock_board(40, Options::new());
    bus.add_instrument(addr(22), Instrument::new().respond("  KEITHLEY,2000\r\n"));
    let dmm = board.open_device(addr(22), &DeviceOptions::new()).unwrap();

    writeln!(&dmm, "*IDN?").unwrap();
    assert_eq!(bus.writes(addr(22)).concat(), b"*IDN?\n");

    let mut line = String::new();
    BufReader::new(&dmm).read_line(&mut line).unwrap();
    assert_eq!(line.trim_matches(&[' ', '\r', '\n'][..]), "KEITHLEY,2000");
}

#[test]
fn io_errors_keep_their_kind() {
    let (bus, board) = mock_board(41, Options::new());
    bus.add_instrument(addr(3), Instrument::new());
    let mut dev = board.open_device(addr(3), &DeviceOptions::new()).unwrap();

    let mut buf = [0u8; 4];
    let err = Read::read(&mut dev, &mut buf).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);

    dev.close().unwrap();
    let err = Write::write(&mut dev, b"x").unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotConnected);
}
