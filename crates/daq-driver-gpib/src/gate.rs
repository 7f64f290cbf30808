//! Process-wide serialization of adapter calls.
//!
//! The adapter's `ibsta`/`iberr`/`ibcnt` registers are per-process globals
//! overwritten by the next call from *any* thread. Every call therefore runs
//! under one process-wide lock, and the registers are copied out before that
//! lock is released. This holds across devices and across boards; a
//! per-device lock would not be enough.
//!
//! Lock order: a device's operation lock, then its state lock, then a
//! board's active-set lock, then this gate. The gate is never held while
//! acquiring any of the others, and no loggers or activity callbacks run
//! while the gate or an active-set lock is held.

use parking_lot::{Mutex, MutexGuard};

use crate::bus::GpibBus;
use crate::error::Result;
use crate::status::{decode, Registers, Status};

static GATE: Mutex<()> = Mutex::new(());

/// Result of one adapter call plus the registers it left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completed<T> {
    /// Status word returned by the call
    pub status: Status,
    /// Registers read back while the gate was still held
    pub registers: Registers,
    /// Call-specific output
    pub value: T,
}

impl<T> Completed<T> {
    /// Decode the status, yielding the call's output on success.
    pub fn into_result(self) -> Result<T> {
        decode(self.status, &self.registers)?;
        Ok(self.value)
    }

    /// Whether the status word carries neither `TIMO` nor `ERR`.
    pub fn is_ok(&self) -> bool {
        decode(self.status, &self.registers).is_ok()
    }
}

/// Exclusive access to the adapter for a sequence of calls.
///
/// Holding a guard blocks every other adapter call in the process. Not
/// reentrant: acquiring a second guard on the same thread deadlocks.
pub struct BusGuard<'a> {
    bus: &'a dyn GpibBus,
    _lock: MutexGuard<'static, ()>,
}

impl<'a> BusGuard<'a> {
    /// Run one adapter call and snapshot the registers it left behind.
    pub fn call<T>(&mut self, f: impl FnOnce(&dyn GpibBus) -> (Status, T)) -> Completed<T> {
        let (status, value) = f(self.bus);
        let registers = Registers {
            iberr: self.bus.iberr(),
            ibcnt: self.bus.ibcnt(),
        };
        Completed {
            status,
            registers,
            value,
        }
    }

    /// Run a call that only returns a status word.
    pub fn status(&mut self, f: impl FnOnce(&dyn GpibBus) -> Status) -> Completed<()> {
        self.call(|bus| (f(bus), ()))
    }
}

/// Block until the gate is free and take it.
pub fn acquire(bus: &dyn GpibBus) -> BusGuard<'_> {
    BusGuard {
        bus,
        _lock: GATE.lock(),
    }
}

/// Run a single adapter call under the gate.
pub fn with_lock<T>(
    bus: &dyn GpibBus,
    f: impl FnOnce(&dyn GpibBus) -> (Status, T),
) -> Completed<T> {
    acquire(bus).call(f)
}
