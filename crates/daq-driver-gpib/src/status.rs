//! Status word decoding.
//!
//! Every adapter call returns an `ibsta` status word. When the `ERR` bit is
//! set the cause lives in `iberr`, and for system errors `ibcnt` carries
//! `errno`. Those registers are captured by the bus gate right after the
//! call (see [`crate::gate`]) and handed to [`decode`] as a [`Registers`]
//! snapshot, so decoding is a pure function of its inputs.

use bitflags::bitflags;

use crate::error::{ErrorCode, GpibError, Result};

bitflags! {
    /// The `ibsta` status word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Status: i32 {
        /// Device clear state
        const DCAS = gpib_sys::DCAS as i32;
        /// Device trigger state
        const DTAS = gpib_sys::DTAS as i32;
        /// Interface is addressed as listener
        const LACS = gpib_sys::LACS as i32;
        /// Interface is addressed as talker
        const TACS = gpib_sys::TACS as i32;
        /// Attention is asserted
        const ATN = gpib_sys::ATN as i32;
        /// Interface is controller-in-charge
        const CIC = gpib_sys::CIC as i32;
        /// Remote state
        const REM = gpib_sys::REM as i32;
        /// Lockout state
        const LOK = gpib_sys::LOK as i32;
        /// I/O is complete
        const CMPL = gpib_sys::CMPL as i32;
        /// DCAS, DTAS or IFC has occurred
        const EVENT = gpib_sys::EVENT as i32;
        /// Board serial polled by bus master
        const SPOLL = gpib_sys::SPOLL as i32;
        /// Device requesting service
        const RQS = gpib_sys::RQS as i32;
        /// SRQ is asserted
        const SRQI = gpib_sys::SRQI as i32;
        /// EOI or EOS encountered
        const END = gpib_sys::END as i32;
        /// Time limit exceeded
        const TIMO = gpib_sys::TIMO as i32;
        /// Call terminated on error
        const ERR = gpib_sys::ERR as i32;
    }
}

bitflags! {
    /// Bus control line word returned by `iblines`.
    ///
    /// The low byte says which lines the board can observe, the high byte
    /// holds their state. A state bit is meaningless unless its valid bit is set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BusLines: u16 {
        const VALID_DAV = gpib_sys::ValidDAV as u16;
        const VALID_NDAC = gpib_sys::ValidNDAC as u16;
        const VALID_NRFD = gpib_sys::ValidNRFD as u16;
        const VALID_IFC = gpib_sys::ValidIFC as u16;
        const VALID_REN = gpib_sys::ValidREN as u16;
        const VALID_SRQ = gpib_sys::ValidSRQ as u16;
        const VALID_ATN = gpib_sys::ValidATN as u16;
        const VALID_EOI = gpib_sys::ValidEOI as u16;
        const DAV = gpib_sys::BusDAV as u16;
        const NDAC = gpib_sys::BusNDAC as u16;
        const NRFD = gpib_sys::BusNRFD as u16;
        const IFC = gpib_sys::BusIFC as u16;
        const REN = gpib_sys::BusREN as u16;
        const SRQ = gpib_sys::BusSRQ as u16;
        const ATN = gpib_sys::BusATN as u16;
        const EOI = gpib_sys::BusEOI as u16;
    }
}

/// Snapshot of the auxiliary registers taken immediately after a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Registers {
    /// `iberr`: error code, meaningful only when `ERR` is set
    pub iberr: i32,
    /// `ibcntl`: bytes transferred, or `errno` after `EDVR`/`EFSO`
    pub ibcnt: i64,
}

impl Registers {
    /// Bytes transferred by the last call, clamped to zero.
    pub fn count(&self) -> usize {
        usize::try_from(self.ibcnt).unwrap_or(0)
    }
}

/// Decode a status word into success or a typed failure.
///
/// `TIMO` takes precedence over `ERR`. For `EDVR` and `EFSO` the `errno`
/// captured in `ibcnt` is attached.
pub fn decode(status: Status, registers: &Registers) -> Result<()> {
    if status.contains(Status::TIMO) {
        return Err(GpibError::Timeout);
    }
    if status.contains(Status::ERR) {
        let code = ErrorCode::from_raw(registers.iberr);
        if code.carries_errno() {
            return Err(GpibError::System {
                code,
                errno: registers.ibcnt as i32,
            });
        }
        return Err(GpibError::Hardware { code });
    }
    Ok(())
}

const STATUS_NAMES: [(Status, &str); 16] = [
    (Status::DCAS, "DCAS"),
    (Status::DTAS, "DTAS"),
    (Status::LACS, "LACS"),
    (Status::TACS, "TACS"),
    (Status::ATN, "ATN"),
    (Status::CIC, "CIC"),
    (Status::REM, "REM"),
    (Status::LOK, "LOK"),
    (Status::CMPL, "CMPL"),
    (Status::EVENT, "EVENT"),
    (Status::SPOLL, "SPOLL"),
    (Status::RQS, "RQS"),
    (Status::SRQI, "SRQI"),
    (Status::END, "END"),
    (Status::TIMO, "TIMO"),
    (Status::ERR, "ERR"),
];

/// Render the set status bits, most significant first, space separated.
pub fn format_status(status: Status) -> String {
    STATUS_NAMES
        .iter()
        .rev()
        .filter(|(bit, _)| status.contains(*bit))
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(" ")
}

const LINE_NAMES: [(BusLines, BusLines, &str, &str); 8] = [
    (BusLines::VALID_EOI, BusLines::EOI, "eoi", "EOI"),
    (BusLines::VALID_ATN, BusLines::ATN, "atn", "ATN"),
    (BusLines::VALID_SRQ, BusLines::SRQ, "srq", "SRQ"),
    (BusLines::VALID_REN, BusLines::REN, "ren", "REN"),
    (BusLines::VALID_IFC, BusLines::IFC, "ifc", "IFC"),
    (BusLines::VALID_NRFD, BusLines::NRFD, "nrfd", "NRFD"),
    (BusLines::VALID_NDAC, BusLines::NDAC, "ndac", "NDAC"),
    (BusLines::VALID_DAV, BusLines::DAV, "dav", "DAV"),
];

/// Render the bus control lines in human-readable form.
///
/// The raw word in hex comes first, then each observable line: lowercase
/// when deasserted, uppercase when asserted. Returns `"unavailable"` when
/// the board cannot observe any line.
pub fn format_bus_lines(lines: BusLines) -> String {
    let observable: Vec<&str> = LINE_NAMES
        .iter()
        .filter(|(valid, ..)| lines.contains(*valid))
        .map(|(_, bit, low, high)| if lines.contains(*bit) { *high } else { *low })
        .collect();

    if observable.is_empty() {
        return "unavailable".to_string();
    }

    let mut parts = Vec::with_capacity(observable.len() + 1);
    let raw = format!("{:x}", lines.bits());
    parts.push(raw.as_str());
    parts.extend(observable);
    parts.join(" ")
}
