//! Safe Rust driver for GPIB (IEEE-488) instruments.
//!
//! This crate coordinates access to instruments behind linux-gpib controller
//! boards. It wraps the low-level FFI bindings from `gpib-sys` with typed
//! errors, RAII session management and a process-wide serialization gate.
//!
//! # Why a global gate
//!
//! linux-gpib reports the outcome of every call through the process-global
//! `ibsta`, `iberr` and `ibcnt` registers, which the next call from any
//! thread overwrites. Every adapter call in this crate runs under one
//! process-wide lock and the registers are read back before it is released,
//! so devices on different boards and threads never see each other's
//! results. See [`gate`].
//!
//! # Architecture
//!
//! - [`Board`] - a controller board; at most one per index in the process
//! - [`Device`] - one open session with an instrument, borrowed from its board
//! - [`enumerate()`] - listener discovery on a board
//! - [`GpibBus`] - the adapter seam, implemented by [`LinuxGpib`] and
//!   [`mock::MockBus`]
//! - [`Options`] / [`DeviceOptions`] - timeouts, read terminator, diagnostic
//!   logger and activity callback
//! - [`GpibConfig`] - TOML and environment configuration
//!
//! # Example
//!
//! ```no_run
//! use std::io::{BufRead, BufReader, Write};
//! use daq_driver_gpib::{Address, Board, DeviceOptions, Options, TracingLogger};
//!
//! # fn example() -> anyhow::Result<()> {
//! let board = Board::open(0, Options::new().logger(TracingLogger))?;
//! let dmm = board.open_device(Address::primary_only(22)?, &DeviceOptions::new())?;
//!
//! writeln!(&dmm, "*IDN?")?;
//! let mut line = String::new();
//! BufReader::new(&dmm).read_line(&mut line)?;
//! println!("{}", line.trim());
//!
//! dmm.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `hardware`: link against the installed linux-gpib. Without it the crate
//!   builds anywhere and [`LinuxGpib`] panics when called; use
//!   [`mock::MockBus`] instead.

pub mod address;
pub mod board;
pub mod bus;
pub mod config;
pub mod device;
pub mod enumerate;
pub mod error;
pub mod gate;
pub mod mock;
pub mod options;
pub mod registry;
pub mod status;
pub mod timeout;

pub use address::Address;
pub use board::Board;
pub use bus::{GpibBus, LinuxGpib};
pub use config::GpibConfig;
pub use device::Device;
pub use enumerate::enumerate;
pub use error::{ErrorCode, GpibError, Result};
pub use options::{format_payload, ActivityFn, DeviceOptions, Logger, Options, TracingLogger};
pub use status::{decode, format_bus_lines, format_status, BusLines, Registers, Status};
pub use timeout::{quantize, TimeoutCode};
