//! The hardware adapter seam.
//!
//! [`GpibBus`] mirrors the subset of the traditional linux-gpib API this crate
//! uses. Implementations are **not** expected to be reentrant: the register
//! accessors report whatever the most recent call left behind, so callers go
//! through [`crate::gate`] which serializes calls process-wide and snapshots
//! the registers before releasing the lock.
//!
//! [`LinuxGpib`] is the real implementation over `gpib-sys`; the mock in
//! [`crate::mock`] implements the same contract in memory.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_long, c_short};

use crate::status::{BusLines, Status};
use crate::timeout::TimeoutCode;

/// Blocking calls into a GPIB adapter library.
///
/// Board-level calls (`ibsic`, `ibsre`, `iblines`, `ibln`) take the board
/// index as their descriptor.
pub trait GpibBus: Send + Sync {
    /// Open a device descriptor. Returns -1 on failure.
    fn ibdev(
        &self,
        board: i32,
        pad: i32,
        sad: i32,
        timeout: TimeoutCode,
        send_eoi: bool,
        eos: i32,
    ) -> i32;

    /// Take a descriptor online or offline. Offline releases it.
    fn ibonl(&self, ud: i32, online: bool) -> Status;

    /// Read into `buf`. The byte count lands in `ibcnt`.
    fn ibrd(&self, ud: i32, buf: &mut [u8]) -> Status;

    /// Write `data`. The byte count lands in `ibcnt`.
    fn ibwrt(&self, ud: i32, data: &[u8]) -> Status;

    /// Send Selected Device Clear.
    fn ibclr(&self, ud: i32) -> Status;

    /// Send Group Execute Trigger.
    fn ibtrg(&self, ud: i32) -> Status;

    /// Serial poll, returning the status byte.
    fn ibrsp(&self, ud: i32) -> (Status, u8);

    /// Query the bus control lines.
    fn iblines(&self, ud: i32) -> (Status, BusLines);

    /// Pulse Interface Clear.
    fn ibsic(&self, ud: i32) -> Status;

    /// Assert or release Remote Enable.
    fn ibsre(&self, ud: i32, enable: bool) -> Status;

    /// Change the I/O timeout of a descriptor.
    fn ibtmo(&self, ud: i32, timeout: TimeoutCode) -> Status;

    /// Probe for a listener at `pad`/`sad`.
    fn ibln(&self, ud: i32, pad: i32, sad: i32) -> (Status, bool);

    /// Library version string.
    fn ibvers(&self) -> String;

    /// Status word left by the most recent call.
    fn ibsta(&self) -> Status;

    /// Error code left by the most recent call.
    fn iberr(&self) -> i32;

    /// Count (or errno) left by the most recent call.
    fn ibcnt(&self) -> i64;
}

/// The linux-gpib user-space library.
///
/// Without the `hardware` feature the underlying symbols are placeholders
/// that panic when called, so only construct this on machines with
/// linux-gpib installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxGpib;

fn status(raw: c_int) -> Status {
    Status::from_bits_retain(raw)
}

#[allow(unsafe_code)]
impl GpibBus for LinuxGpib {
    fn ibdev(
        &self,
        board: i32,
        pad: i32,
        sad: i32,
        timeout: TimeoutCode,
        send_eoi: bool,
        eos: i32,
    ) -> i32 {
        // SAFETY: plain integer arguments
        unsafe { gpib_sys::ibdev(board, pad, sad, timeout.raw(), c_int::from(send_eoi), eos) }
    }

    fn ibonl(&self, ud: i32, online: bool) -> Status {
        // SAFETY: plain integer arguments
        status(unsafe { gpib_sys::ibonl(ud, c_int::from(online)) })
    }

    fn ibrd(&self, ud: i32, buf: &mut [u8]) -> Status {
        // SAFETY: buf is valid for writes of buf.len() bytes for the whole call
        status(unsafe { gpib_sys::ibrd(ud, buf.as_mut_ptr().cast(), buf.len() as c_long) })
    }

    fn ibwrt(&self, ud: i32, data: &[u8]) -> Status {
        // SAFETY: data is valid for reads of data.len() bytes for the whole call
        status(unsafe { gpib_sys::ibwrt(ud, data.as_ptr().cast(), data.len() as c_long) })
    }

    fn ibclr(&self, ud: i32) -> Status {
        // SAFETY: plain integer argument
        status(unsafe { gpib_sys::ibclr(ud) })
    }

    fn ibtrg(&self, ud: i32) -> Status {
        // SAFETY: plain integer argument
        status(unsafe { gpib_sys::ibtrg(ud) })
    }

    fn ibrsp(&self, ud: i32) -> (Status, u8) {
        let mut spr: c_char = 0;
        // SAFETY: spr is a valid, writable c_char
        let sta = unsafe { gpib_sys::ibrsp(ud, &mut spr) };
        (status(sta), spr as u8)
    }

    fn iblines(&self, ud: i32) -> (Status, BusLines) {
        let mut lines: c_short = 0;
        // SAFETY: lines is a valid, writable c_short
        let sta = unsafe { gpib_sys::iblines(ud, &mut lines) };
        (status(sta), BusLines::from_bits_retain(lines as u16))
    }

    fn ibsic(&self, ud: i32) -> Status {
        // SAFETY: plain integer argument
        status(unsafe { gpib_sys::ibsic(ud) })
    }

    fn ibsre(&self, ud: i32, enable: bool) -> Status {
        // SAFETY: plain integer arguments
        status(unsafe { gpib_sys::ibsre(ud, c_int::from(enable)) })
    }

    fn ibtmo(&self, ud: i32, timeout: TimeoutCode) -> Status {
        // SAFETY: plain integer arguments
        status(unsafe { gpib_sys::ibtmo(ud, timeout.raw()) })
    }

    fn ibln(&self, ud: i32, pad: i32, sad: i32) -> (Status, bool) {
        let mut found: c_short = 0;
        // SAFETY: found is a valid, writable c_short
        let sta = unsafe { gpib_sys::ibln(ud, pad, sad, &mut found) };
        (status(sta), found != 0)
    }

    fn ibvers(&self) -> String {
        let mut version: *mut c_char = std::ptr::null_mut();
        // SAFETY: ibvers stores a pointer to a static string owned by the library
        unsafe {
            gpib_sys::ibvers(&mut version);
            if version.is_null() {
                "unknown".to_string()
            } else {
                CStr::from_ptr(version).to_string_lossy().into_owned()
            }
        }
    }

    fn ibsta(&self) -> Status {
        // SAFETY: the library's volatile global; reads are serialized by the gate
        status(unsafe { std::ptr::read_volatile(std::ptr::addr_of!(gpib_sys::ibsta)) })
    }

    fn iberr(&self) -> i32 {
        // SAFETY: as above
        unsafe { std::ptr::read_volatile(std::ptr::addr_of!(gpib_sys::iberr)) }
    }

    fn ibcnt(&self) -> i64 {
        // SAFETY: as above
        unsafe { std::ptr::read_volatile(std::ptr::addr_of!(gpib_sys::ibcntl)) as i64 }
    }
}
