//! Bus enumeration.

use std::time::Instant;

use tracing::debug;

use crate::address::MAX_PRIMARY;
use crate::board::Board;
use crate::error::{GpibError, Result};
use crate::gate;
use crate::options::millis;
use crate::status::BusLines;

/// Return the primary addresses of all listeners on `board`, ascending.
///
/// Sends Interface Clear first: some older instruments left addressed as
/// talker start writing to the bus as soon as anything else is addressed to
/// listen, which would corrupt the scan. Address 0 is the controller and is
/// never probed. The gate is held for the whole scan.
///
/// # Errors
///
/// - [`GpibError::EnumNotSupported`] if the board cannot observe NDAC
/// - the first failing adapter call; no partial results are returned
pub fn enumerate(board: &Board) -> Result<Vec<u32>> {
    let options = board.options();
    let index = board.index();
    let busy = options.busy();
    let started = Instant::now();

    let scanned = scan(board);
    drop(busy);

    // Log only once the gate is released, so a logger may use the bus.
    let found = match scanned {
        Ok(found) => found,
        Err(failure) => {
            let err = match failure {
                ScanFailure::InterfaceClear(err) => {
                    options.log(format_args!("Board {} returned ibsic error: {}", index, err));
                    err
                }
                ScanFailure::Lines(err) => {
                    options.log(format_args!(
                        "Board {} returned iblines error: {}",
                        index, err
                    ));
                    err
                }
                ScanFailure::NoNdac => {
                    options.log(format_args!(
                        "Board {} does not support monitoring NDAC",
                        index
                    ));
                    GpibError::EnumNotSupported
                }
                ScanFailure::Probe(pad, err) => {
                    options.log(format_args!(
                        "Failed to enumerate board {} address {}: {}",
                        index, pad, err
                    ));
                    err
                }
            };
            return Err(err);
        }
    };

    for pad in &found {
        options.log(format_args!(
            "Found device at address {} on board {}",
            pad, index
        ));
    }
    debug!(board = index, found = ?found, "Enumeration complete");
    options.log(format_args!(
        "Found {} devices in {:?} on board {}",
        found.len(),
        millis(started.elapsed()),
        index
    ));
    Ok(found)
}

enum ScanFailure {
    InterfaceClear(GpibError),
    Lines(GpibError),
    NoNdac,
    Probe(u32, GpibError),
}

/// The scan itself, under the gate from start to finish.
fn scan(board: &Board) -> std::result::Result<Vec<u32>, ScanFailure> {
    let ud = board.ud();
    let mut guard = gate::acquire(board.bus());

    guard
        .status(|b| b.ibsic(ud))
        .into_result()
        .map_err(ScanFailure::InterfaceClear)?;

    let lines = guard
        .call(|b| b.iblines(ud))
        .into_result()
        .map_err(ScanFailure::Lines)?;
    if !lines.contains(BusLines::VALID_NDAC) {
        return Err(ScanFailure::NoNdac);
    }

    let mut found = Vec::new();
    for pad in 1..=MAX_PRIMARY {
        let listening = guard
            .call(|b| b.ibln(ud, pad as i32, 0))
            .into_result()
            .map_err(|err| ScanFailure::Probe(pad, err))?;
        if listening {
            found.push(pad);
        }
    }
    Ok(found)
}
