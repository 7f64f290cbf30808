//! Listener discovery.
//!
//! Board indices 60-69.

mod common;

use common::{addr, mock_board, Recorder};
use daq_driver_gpib::mock::{Fault, Instrument, Op};
use daq_driver_gpib::{enumerate, BusLines, ErrorCode, GpibError, Options};

#[test]
fn finds_listeners_in_ascending_order() {
    let rec = Recorder::new();
    let (bus, board) = mock_board(60, rec.options());
    for pad in [22, 3, 9] {
        bus.add_instrument(addr(pad), Instrument::new());
    }
    bus.add_instrument(addr(17), Instrument::new().silent());
    rec.reset();

    assert_eq!(board.enumerate().unwrap(), vec![3, 9, 22]);
    assert_eq!(bus.calls(Op::InterfaceClear), 1);
    assert_eq!(bus.calls(Op::Listen), 30);

    let lines = rec.lines();
    assert_eq!(lines[0], "Found device at address 3 on board 60");
    assert!(lines[3].starts_with("Found 3 devices in "), "{}", lines[3]);
    assert!(lines[3].ends_with(" on board 60"));
    assert_eq!(rec.activity(), vec![true, false]);
}

#[test]
fn controller_address_is_never_probed() {
    let (bus, board) = mock_board(61, Options::new());
    bus.add_instrument(addr(0), Instrument::new());
    bus.add_instrument(addr(30), Instrument::new());
    assert_eq!(enumerate(&board).unwrap(), vec![30]);
}

#[test]
fn empty_bus_yields_no_addresses() {
    let (_bus, board) = mock_board(62, Options::new());
    assert!(board.enumerate().unwrap().is_empty());
}

#[test]
fn unsupported_without_ndac_and_no_probes() {
    let rec = Recorder::new();
    let (bus, board) = mock_board(63, rec.options());
    bus.set_lines([BusLines::VALID_NRFD | BusLines::VALID_EOI]);

    assert_eq!(board.enumerate(), Err(GpibError::EnumNotSupported));
    assert_eq!(bus.calls(Op::Listen), 0);
    assert_eq!(rec.last_line(), "Board 63 does not support monitoring NDAC");
}

#[test]
fn probe_error_aborts_without_partial_results() {
    let rec = Recorder::new();
    let (bus, board) = mock_board(64, rec.options());
    bus.add_instrument(addr(4), Instrument::new());
    bus.add_instrument(addr(20), Instrument::new());
    bus.set_probe_fault(15, Fault::code(ErrorCode::Ebus));

    assert_eq!(
        board.enumerate(),
        Err(GpibError::Hardware {
            code: ErrorCode::Ebus
        })
    );
    assert_eq!(bus.calls(Op::Listen), 15, "scan stops at the failing address");
    assert_eq!(
        rec.last_line(),
        "Failed to enumerate board 64 address 15: EBUS"
    );
}

#[test]
fn interface_clear_failure_is_returned() {
    let (bus, board) = mock_board(65, Options::new());
    bus.set_fault(Op::InterfaceClear, Fault::code(ErrorCode::Esac));

    assert_eq!(
        board.enumerate(),
        Err(GpibError::Hardware {
            code: ErrorCode::Esac
        })
    );
    assert_eq!(bus.calls(Op::Lines), 0);
}

#[test]
fn line_query_failure_is_returned() {
    let (bus, board) = mock_board(66, Options::new());
    bus.set_fault(Op::Lines, Fault::Timeout);
    assert_eq!(board.enumerate(), Err(GpibError::Timeout));
    assert_eq!(bus.calls(Op::Listen), 0);
}
