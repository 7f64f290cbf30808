//! Low-level FFI bindings for the linux-gpib library.
//!
//! This crate provides raw, unsafe bindings to `libgpib`, the user-space
//! interface to the linux-gpib kernel drivers for IEEE-488 controller boards
//! (NI PCI-GPIB, Agilent 82357B, Keithley KUSB-488 and others).
//!
//! # The status registers
//!
//! Every traditional `ib*` call updates three process-global variables:
//! `ibsta` (status bitmask), `iberr` (error code when `ERR` is set) and
//! `ibcnt`/`ibcntl` (bytes transferred, or `errno` after `EDVR`/`EFSO`).
//! They are overwritten by the next call from *any* thread, so callers must
//! serialize calls and read the registers before releasing their lock.
//!
//! # Safety
//!
//! All functions in this crate are `unsafe` as they are direct FFI bindings.
//! For a safe wrapper, use the `daq-driver-gpib` crate instead.
//!
//! # Features
//!
//! - `gpib-sdk`: Generate bindings from the system `<gpib/ib.h>` header.
//!   Without this feature, pre-defined bindings are used for cross-compilation.
//!
//! # Example (unsafe)
//!
//! ```no_run
//! use gpib_sys::*;
//!
//! unsafe {
//!     let ud = ibdev(0, 22, 0, T10s as i32, 1, 0);
//!     if ud >= 0 {
//!         let cmd = b"*IDN?\n";
//!         ibwrt(ud, cmd.as_ptr().cast(), cmd.len() as _);
//!         ibonl(ud, 0);
//!     }
//! }
//! ```

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(dead_code)]
#![allow(clippy::all)]

// Include the generated bindings
include!(concat!(env!("OUT_DIR"), "/bindings.rs"));

/// Sentinel terminating address lists in the 488.2 API (static in ib.h).
pub const NOADDR: Addr4882_t = 0xffff;

/// Combine a primary and secondary address (the `MakeAddr` macro).
#[inline]
pub fn MakeAddr(pad: u32, sad: u32) -> Addr4882_t {
    ((pad & 0xff) | ((sad & 0xff) << 8)) as Addr4882_t
}

/// Extract the primary address (the `GetPAD` macro).
#[inline]
pub fn GetPAD(address: Addr4882_t) -> u32 {
    address as u32 & 0xff
}

/// Extract the secondary address (the `GetSAD` macro).
#[inline]
pub fn GetSAD(address: Addr4882_t) -> u32 {
    (address as u32 >> 8) & 0xff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_constants() {
        assert_eq!(TIMO, 0x4000);
        assert_eq!(ERR, 0x8000);
        assert_eq!(CMPL, 0x100);
    }

    #[test]
    fn test_error_constants() {
        assert_eq!(EDVR, 0);
        assert_eq!(EFSO, 12);
        assert_eq!(ETAB, 20);
    }

    #[test]
    fn test_address_packing() {
        let addr = MakeAddr(22, 0x60);
        assert_eq!(GetPAD(addr), 22);
        assert_eq!(GetSAD(addr), 0x60);
        assert_eq!(MakeAddr(5, 0), 5);
    }

    #[test]
    fn test_line_constants() {
        assert_eq!(ValidNDAC, 0x02);
        assert_eq!(BusNRFD, 0x0400);
        assert_eq!(ValidALL, 0xff);
    }
}
