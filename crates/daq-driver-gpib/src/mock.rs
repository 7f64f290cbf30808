//! In-memory GPIB adapter for tests and demos.
//!
//! [`MockBus`] behaves like the C library as far as this crate can observe:
//! every call overwrites one shared set of `ibsta`/`iberr`/`ibcnt`
//! registers, board-level calls take the board index as descriptor, and
//! device descriptors are handed out from 16 upwards.
//!
//! Instruments are attached at an [`Address`] and answer reads from a queue
//! of canned responses. Faults can be injected per operation, and listener
//! probes can fail per primary address. Each call is counted, and calls that
//! overlap in time are recorded so tests can prove the gate serializes them.
//!
//! ```
//! use daq_driver_gpib::mock::{Instrument, MockBus};
//! use daq_driver_gpib::Address;
//!
//! let bus = MockBus::new();
//! bus.add_instrument(
//!     Address::primary_only(22).unwrap(),
//!     Instrument::new().respond("HEWLETT-PACKARD,34401A,0,10-5-2\n"),
//! );
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::address::Address;
use crate::bus::GpibBus;
use crate::error::ErrorCode;
use crate::status::{BusLines, Status};
use crate::timeout::TimeoutCode;

/// First descriptor handed out by [`GpibBus::ibdev`].
const FIRST_UD: i32 = 16;

/// Adapter operations, for fault injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Op {
    /// `ibdev`
    Open,
    /// `ibonl`
    Online,
    /// `ibrd`
    Read,
    /// `ibwrt`
    Write,
    /// `ibclr`
    Clear,
    /// `ibtrg`
    Trigger,
    /// `ibrsp`
    SerialPoll,
    /// `iblines`
    Lines,
    /// `ibsic`
    InterfaceClear,
    /// `ibsre`
    RemoteEnable,
    /// `ibtmo`
    SetTimeout,
    /// `ibln`
    Listen,
    /// `ibvers`
    Version,
}

/// How an injected fault shows up in the registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `TIMO` (with `ERR`/`EABO`, as linux-gpib reports it)
    Timeout,
    /// `ERR` with `iberr = code`; `errno` lands in `ibcnt`
    Error {
        /// Error code
        code: ErrorCode,
        /// OS error for `EDVR`/`EFSO`
        errno: Option<i32>,
    },
    /// The call fails without flagging `ERR`. Only meaningful for `ibdev`,
    /// which then returns -1 with a clean status word.
    Silent,
}

impl Fault {
    /// An error code without errno.
    pub fn code(code: ErrorCode) -> Self {
        Self::Error { code, errno: None }
    }

    /// An error code carrying an OS errno.
    pub fn errno(code: ErrorCode, errno: i32) -> Self {
        Self::Error {
            code,
            errno: Some(errno),
        }
    }
}

/// A simulated instrument.
#[derive(Debug, Clone)]
pub struct Instrument {
    responses: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    status_byte: u8,
    listening: bool,
    clears: usize,
    triggers: usize,
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            responses: VecDeque::new(),
            writes: Vec::new(),
            status_byte: 0,
            listening: true,
            clears: 0,
            triggers: 0,
        }
    }
}

impl Instrument {
    /// A listening instrument with nothing to say.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a later read.
    #[must_use]
    pub fn respond(mut self, data: impl AsRef<[u8]>) -> Self {
        self.responses.push_back(data.as_ref().to_vec());
        self
    }

    /// Status byte returned by serial polls.
    #[must_use]
    pub fn status_byte(mut self, spr: u8) -> Self {
        self.status_byte = spr;
        self
    }

    /// Do not answer listener probes.
    #[must_use]
    pub fn silent(mut self) -> Self {
        self.listening = false;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Descriptor {
    address: u16,
    timeout: TimeoutCode,
    eos: i32,
}

#[derive(Debug)]
struct State {
    instruments: BTreeMap<u16, Instrument>,
    descriptors: BTreeMap<i32, Descriptor>,
    next_ud: i32,
    lines: VecDeque<BusLines>,
    faults: HashMap<Op, Fault>,
    probe_faults: BTreeMap<i32, Fault>,
    calls: HashMap<Op, usize>,
    remote: BTreeMap<i32, bool>,
    version: String,
    call_delay: Duration,
    ibsta: Status,
    iberr: i32,
    ibcnt: i64,
}

impl State {
    fn complete(&mut self, status: Status, count: i64) -> Status {
        self.ibsta = status;
        self.ibcnt = count;
        status
    }

    fn ok(&mut self, count: i64) -> Status {
        self.complete(Status::CMPL, count)
    }

    fn fail(&mut self, fault: Fault) -> Status {
        match fault {
            Fault::Timeout => {
                self.iberr = ErrorCode::Eabo.to_raw();
                self.complete(Status::TIMO | Status::ERR | Status::CMPL, 0)
            }
            Fault::Error { code, errno } => {
                self.iberr = code.to_raw();
                self.complete(Status::ERR | Status::CMPL, i64::from(errno.unwrap_or(0)))
            }
            Fault::Silent => self.complete(Status::CMPL, 0),
        }
    }

    fn injected(&self, op: Op) -> Option<Fault> {
        self.faults.get(&op).copied()
    }

    fn descriptor(&self, ud: i32) -> Option<Descriptor> {
        self.descriptors.get(&ud).copied()
    }

    fn current_lines(&mut self) -> BusLines {
        if self.lines.len() > 1 {
            self.lines.pop_front().unwrap_or_default()
        } else {
            self.lines.front().copied().unwrap_or_default()
        }
    }
}

/// Simulated adapter. See the [module docs](self).
#[derive(Debug)]
pub struct MockBus {
    state: Mutex<State>,
    in_call: AtomicBool,
    overlaps: AtomicUsize,
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks a call in progress for overlap detection.
struct InCall<'a>(&'a MockBus);

impl Drop for InCall<'_> {
    fn drop(&mut self) {
        self.0.in_call.store(false, Ordering::SeqCst);
    }
}

impl MockBus {
    /// An empty bus whose boards can observe every control line, all
    /// deasserted.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                instruments: BTreeMap::new(),
                descriptors: BTreeMap::new(),
                next_ud: FIRST_UD,
                lines: VecDeque::from([BusLines::from_bits_retain(gpib_sys::ValidALL as u16)]),
                faults: HashMap::new(),
                probe_faults: BTreeMap::new(),
                calls: HashMap::new(),
                remote: BTreeMap::new(),
                version: "4.3.6".to_string(),
                call_delay: Duration::ZERO,
                ibsta: Status::empty(),
                iberr: 0,
                ibcnt: 0,
            }),
            in_call: AtomicBool::new(false),
            overlaps: AtomicUsize::new(0),
        }
    }

    /// Attach an instrument, replacing any at the same address.
    pub fn add_instrument(&self, address: Address, instrument: Instrument) {
        self.state.lock().instruments.insert(address.raw(), instrument);
    }

    /// Queue another response on an attached instrument.
    pub fn queue_response(&self, address: Address, data: impl AsRef<[u8]>) {
        if let Some(inst) = self.state.lock().instruments.get_mut(&address.raw()) {
            inst.responses.push_back(data.as_ref().to_vec());
        }
    }

    /// Everything written to the instrument at `address`.
    pub fn writes(&self, address: Address) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .instruments
            .get(&address.raw())
            .map(|inst| inst.writes.clone())
            .unwrap_or_default()
    }

    /// Device clears received by the instrument at `address`.
    pub fn clears(&self, address: Address) -> usize {
        self.state
            .lock()
            .instruments
            .get(&address.raw())
            .map_or(0, |inst| inst.clears)
    }

    /// Triggers received by the instrument at `address`.
    pub fn triggers(&self, address: Address) -> usize {
        self.state
            .lock()
            .instruments
            .get(&address.raw())
            .map_or(0, |inst| inst.triggers)
    }

    /// Line words returned by successive `iblines` calls. The last one
    /// sticks.
    pub fn set_lines(&self, sequence: impl IntoIterator<Item = BusLines>) {
        let mut lines: VecDeque<BusLines> = sequence.into_iter().collect();
        if lines.is_empty() {
            lines.push_back(BusLines::empty());
        }
        self.state.lock().lines = lines;
    }

    /// Make every call of `op` fail until cleared.
    pub fn set_fault(&self, op: Op, fault: Fault) {
        self.state.lock().faults.insert(op, fault);
    }

    /// Remove an injected fault.
    pub fn clear_fault(&self, op: Op) {
        self.state.lock().faults.remove(&op);
    }

    /// Make listener probes at primary address `pad` fail.
    pub fn set_probe_fault(&self, pad: u32, fault: Fault) {
        self.state.lock().probe_faults.insert(pad as i32, fault);
    }

    /// Hold every call for `delay`, widening the window for overlaps.
    pub fn set_call_delay(&self, delay: Duration) {
        self.state.lock().call_delay = delay;
    }

    /// How often `op` was called.
    pub fn calls(&self, op: Op) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Calls of any operation.
    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }

    /// Calls that started while another call was still running.
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    /// Whether remote enable is asserted on `board`.
    pub fn remote_enabled(&self, board: u32) -> bool {
        self.state
            .lock()
            .remote
            .get(&(board as i32))
            .copied()
            .unwrap_or(false)
    }

    /// Descriptors currently online.
    pub fn open_descriptors(&self) -> usize {
        self.state.lock().descriptors.len()
    }

    /// Timeout code currently set on a descriptor.
    pub fn descriptor_timeout(&self, ud: i32) -> Option<TimeoutCode> {
        self.state.lock().descriptor(ud).map(|d| d.timeout)
    }

    /// End-of-string mode a descriptor was opened with.
    pub fn descriptor_eos(&self, ud: i32) -> Option<i32> {
        self.state.lock().descriptor(ud).map(|d| d.eos)
    }

    fn enter(&self, op: Op) -> InCall<'_> {
        if self.in_call.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let delay = {
            let mut state = self.state.lock();
            *state.calls.entry(op).or_insert(0) += 1;
            state.call_delay
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        InCall(self)
    }

    /// Run a call against the instrument behind a device descriptor.
    fn with_instrument(
        &self,
        op: Op,
        ud: i32,
        f: impl FnOnce(&mut Instrument) -> Result<i64, Fault>,
    ) -> Status {
        let _call = self.enter(op);
        let mut state = self.state.lock();
        if let Some(fault) = state.injected(op) {
            return state.fail(fault);
        }
        let Some(desc) = state.descriptor(ud) else {
            return state.fail(Fault::code(ErrorCode::Earg));
        };
        let outcome = match state.instruments.get_mut(&desc.address) {
            Some(inst) => f(inst),
            None => Err(Fault::code(ErrorCode::Enol)),
        };
        match outcome {
            Ok(count) => state.ok(count),
            Err(fault) => state.fail(fault),
        }
    }

    /// Run a board-level call.
    fn board_call(&self, op: Op, f: impl FnOnce(&mut State)) -> Status {
        let _call = self.enter(op);
        let mut state = self.state.lock();
        if let Some(fault) = state.injected(op) {
            return state.fail(fault);
        }
        f(&mut state);
        state.ok(0)
    }
}

impl GpibBus for MockBus {
    fn ibdev(
        &self,
        _board: i32,
        pad: i32,
        sad: i32,
        timeout: TimeoutCode,
        _send_eoi: bool,
        eos: i32,
    ) -> i32 {
        let _call = self.enter(Op::Open);
        let mut state = self.state.lock();
        if let Some(fault) = state.injected(Op::Open) {
            state.fail(fault);
            return -1;
        }
        let ud = state.next_ud;
        state.next_ud += 1;
        state.descriptors.insert(
            ud,
            Descriptor {
                address: gpib_sys::MakeAddr(pad as u32, sad as u32),
                timeout,
                eos,
            },
        );
        state.ok(0);
        ud
    }

    fn ibonl(&self, ud: i32, online: bool) -> Status {
        let _call = self.enter(Op::Online);
        let mut state = self.state.lock();
        if let Some(fault) = state.injected(Op::Online) {
            return state.fail(fault);
        }
        if state.descriptor(ud).is_none() {
            return state.fail(Fault::code(ErrorCode::Earg));
        }
        if !online {
            state.descriptors.remove(&ud);
        }
        state.ok(0)
    }

    fn ibrd(&self, ud: i32, buf: &mut [u8]) -> Status {
        let status = self.with_instrument(Op::Read, ud, |inst| {
            let Some(mut response) = inst.responses.pop_front() else {
                return Err(Fault::Timeout);
            };
            let n = response.len().min(buf.len());
            buf[..n].copy_from_slice(&response[..n]);
            if n < response.len() {
                inst.responses.push_front(response.split_off(n));
            }
            Ok(n as i64)
        });
        if status == Status::CMPL {
            let mut state = self.state.lock();
            let ended = state
                .descriptor(ud)
                .and_then(|d| state.instruments.get(&d.address))
                .is_some_and(|inst| inst.responses.is_empty());
            if ended {
                state.ibsta |= Status::END;
                return state.ibsta;
            }
        }
        status
    }

    fn ibwrt(&self, ud: i32, data: &[u8]) -> Status {
        self.with_instrument(Op::Write, ud, |inst| {
            if !inst.listening {
                return Err(Fault::code(ErrorCode::Enol));
            }
            inst.writes.push(data.to_vec());
            Ok(data.len() as i64)
        })
    }

    fn ibclr(&self, ud: i32) -> Status {
        self.with_instrument(Op::Clear, ud, |inst| {
            inst.clears += 1;
            Ok(0)
        })
    }

    fn ibtrg(&self, ud: i32) -> Status {
        self.with_instrument(Op::Trigger, ud, |inst| {
            inst.triggers += 1;
            Ok(0)
        })
    }

    fn ibrsp(&self, ud: i32) -> (Status, u8) {
        let mut spr = 0;
        let status = self.with_instrument(Op::SerialPoll, ud, |inst| {
            spr = inst.status_byte;
            Ok(0)
        });
        (status, spr)
    }

    fn iblines(&self, _ud: i32) -> (Status, BusLines) {
        let mut lines = BusLines::empty();
        let status = self.board_call(Op::Lines, |state| lines = state.current_lines());
        (status, lines)
    }

    fn ibsic(&self, _ud: i32) -> Status {
        self.board_call(Op::InterfaceClear, |_| {})
    }

    fn ibsre(&self, ud: i32, enable: bool) -> Status {
        self.board_call(Op::RemoteEnable, |state| {
            state.remote.insert(ud, enable);
        })
    }

    fn ibtmo(&self, ud: i32, timeout: TimeoutCode) -> Status {
        let _call = self.enter(Op::SetTimeout);
        let mut state = self.state.lock();
        if let Some(fault) = state.injected(Op::SetTimeout) {
            return state.fail(fault);
        }
        match state.descriptors.get_mut(&ud) {
            Some(desc) => {
                desc.timeout = timeout;
                state.ok(0)
            }
            None => state.fail(Fault::code(ErrorCode::Earg)),
        }
    }

    fn ibln(&self, _ud: i32, pad: i32, sad: i32) -> (Status, bool) {
        let _call = self.enter(Op::Listen);
        let mut state = self.state.lock();
        if let Some(fault) = state
            .injected(Op::Listen)
            .or_else(|| state.probe_faults.get(&pad).copied())
        {
            return (state.fail(fault), false);
        }
        let key = gpib_sys::MakeAddr(pad as u32, sad as u32);
        let found = state
            .instruments
            .get(&key)
            .is_some_and(|inst| inst.listening);
        (state.ok(0), found)
    }

    fn ibvers(&self) -> String {
        let _call = self.enter(Op::Version);
        self.state.lock().version.clone()
    }

    fn ibsta(&self) -> Status {
        self.state.lock().ibsta
    }

    fn iberr(&self) -> i32 {
        self.state.lock().iberr
    }

    fn ibcnt(&self) -> i64 {
        self.state.lock().ibcnt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(pad: u32) -> Address {
        Address::primary_only(pad).unwrap()
    }

    #[test]
    fn test_read_consumes_responses() {
        let bus = MockBus::new();
        bus.add_instrument(addr(5), Instrument::new().respond("abcdef"));
        let ud = bus.ibdev(0, 5, 0, TimeoutCode::NONE, true, 0);
        assert_eq!(ud, FIRST_UD);

        let mut buf = [0u8; 4];
        let status = bus.ibrd(ud, &mut buf);
        assert_eq!(status, Status::CMPL);
        assert_eq!(bus.ibcnt(), 4);
        assert_eq!(&buf, b"abcd");

        let status = bus.ibrd(ud, &mut buf);
        assert!(status.contains(Status::END));
        assert_eq!(bus.ibcnt(), 2);
        assert_eq!(&buf[..2], b"ef");

        // Nothing left to say: the talker times out.
        assert!(bus.ibrd(ud, &mut buf).contains(Status::TIMO));
    }

    #[test]
    fn test_fault_sets_registers() {
        let bus = MockBus::new();
        bus.set_fault(Op::Lines, Fault::errno(ErrorCode::Edvr, 5));
        let (status, _) = bus.iblines(0);
        assert!(status.contains(Status::ERR));
        assert_eq!(bus.iberr(), 0);
        assert_eq!(bus.ibcnt(), 5);

        bus.clear_fault(Op::Lines);
        let (status, lines) = bus.iblines(0);
        assert_eq!(status, Status::CMPL);
        assert_eq!(lines.bits(), 0xff);
    }

    #[test]
    fn test_line_sequence_last_sticks() {
        let bus = MockBus::new();
        bus.set_lines([BusLines::VALID_NRFD | BusLines::NRFD, BusLines::VALID_NRFD]);
        assert_eq!(bus.iblines(0).1, BusLines::VALID_NRFD | BusLines::NRFD);
        assert_eq!(bus.iblines(0).1, BusLines::VALID_NRFD);
        assert_eq!(bus.iblines(0).1, BusLines::VALID_NRFD);
        assert_eq!(bus.calls(Op::Lines), 3);
    }

    #[test]
    fn test_offline_releases_descriptor() {
        let bus = MockBus::new();
        let ud = bus.ibdev(0, 1, 0, TimeoutCode::MAX, true, 0);
        assert_eq!(bus.open_descriptors(), 1);
        assert_eq!(bus.ibonl(ud, false), Status::CMPL);
        assert_eq!(bus.open_descriptors(), 0);
        assert!(bus.ibonl(ud, false).contains(Status::ERR));
        assert_eq!(bus.iberr(), ErrorCode::Earg.to_raw());
    }
}
