//! Device sessions.
//!
//! A [`Device`] owns one descriptor returned by `ibdev`. Every operation
//! checks that the device is still open before touching hardware, brackets
//! the hardware work with the activity callback, runs the adapter call under
//! the bus gate and logs the outcome.

use std::fmt;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::address::Address;
use crate::board::Board;
use crate::bus::GpibBus;
use crate::error::{GpibError, Result};
use crate::gate;
use crate::options::{format_payload, millis, Options};
use crate::status::{BusLines, Status};
use crate::timeout::quantize;

/// Poll interval while waiting for a cleared device to become ready.
pub const CLEAR_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Wait after a clear when the board cannot observe NRFD.
pub const CLEAR_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct DeviceState {
    closed: bool,
    timeout: Duration,
}

/// An open session with one instrument.
///
/// Methods take `&self` and may be called from several threads; they are
/// serialized per device, and adapter calls are serialized process-wide.
/// The accessors never wait for an operation in progress. Dropping an open
/// device closes it.
pub struct Device<'b> {
    board: &'b Board,
    address: Address,
    ud: i32,
    options: Options,
    /// Held for the duration of each operation.
    op: Mutex<()>,
    /// Only ever locked briefly.
    state: Mutex<DeviceState>,
}

impl fmt::Debug for Device<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("board", &self.board.index())
            .field("address", &self.address)
            .field("ud", &self.ud)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl<'b> Device<'b> {
    pub(crate) fn new(board: &'b Board, address: Address, ud: i32, options: Options) -> Self {
        let timeout = options.get_timeout();
        Self {
            board,
            address,
            ud,
            options,
            op: Mutex::new(()),
            state: Mutex::new(DeviceState {
                closed: false,
                timeout,
            }),
        }
    }

    /// The device address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The board this device was opened on.
    pub fn board(&self) -> &'b Board {
        self.board
    }

    /// The adapter descriptor.
    pub fn descriptor(&self) -> i32 {
        self.ud
    }

    /// The requested timeout (before rounding up to an adapter value).
    pub fn timeout(&self) -> Duration {
        self.state.lock().timeout
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Run one status-only adapter call under the gate and decode it.
    fn call(&self, f: impl FnOnce(&dyn GpibBus) -> Status) -> Result<()> {
        gate::with_lock(self.board.bus(), |b| (f(b), ())).into_result()
    }

    /// Start an operation: wait for any other one on this device to finish,
    /// then check the device is still open.
    fn begin(&self) -> Result<MutexGuard<'_, ()>> {
        let op = self.op.lock();
        if self.state.lock().closed {
            return Err(GpibError::AlreadyClosed);
        }
        Ok(op)
    }

    /// Read into `buf`, returning the number of bytes transferred.
    ///
    /// The read ends on EOI, on the configured terminator, or when `buf` is
    /// full, whichever comes first.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let _op = self.begin()?;
        let _busy = self.options.busy();

        let started = Instant::now();
        let done = gate::with_lock(self.board.bus(), |b| (b.ibrd(self.ud, buf), ()));
        let took = millis(started.elapsed());

        let n = done.registers.count().min(buf.len());
        if let Err(err) = done.into_result() {
            self.options.log(format_args!(
                "Failed to read from address {} device {}: {}",
                self.address.raw(),
                self.ud,
                err
            ));
            return Err(err);
        }
        self.options.log(format_args!(
            "Read {} in {:?} from address {}",
            format_payload(&buf[..n]),
            took,
            self.address.raw()
        ));
        Ok(n)
    }

    /// Write `data`, returning the number of bytes transferred.
    ///
    /// The last byte is sent with EOI asserted.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        let _op = self.begin()?;
        let _busy = self.options.busy();

        let started = Instant::now();
        let done = gate::with_lock(self.board.bus(), |b| (b.ibwrt(self.ud, data), ()));
        let took = millis(started.elapsed());

        let n = done.registers.count();
        if let Err(err) = done.into_result() {
            self.options.log(format_args!(
                "Failed to write to address {} device {}: {}",
                self.address.raw(),
                self.ud,
                err
            ));
            return Err(err);
        }
        self.options.log(format_args!(
            "Wrote {} in {:?} to address {}",
            format_payload(data),
            took,
            self.address.raw()
        ));
        Ok(n)
    }

    /// Change the I/O timeout for later operations on this device.
    ///
    /// Rounded up to the next value the adapter supports; zero disables
    /// timeouts.
    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        let _op = self.begin()?;
        let _busy = self.options.busy();

        self.options.log(format_args!(
            "Setting timeout to {:?} on address {}",
            timeout,
            self.address.raw()
        ));
        let code = quantize(timeout);
        if let Err(err) = self.call(|b| b.ibtmo(self.ud, code)) {
            self.options.log(format_args!(
                "Failed to set timeout on address {} device {}: {}",
                self.address.raw(),
                self.ud,
                err
            ));
            return Err(err);
        }
        self.state.lock().timeout = timeout;
        debug!(ud = self.ud, %code, "Changed device timeout");
        Ok(())
    }

    /// Send Selected Device Clear and wait until the device is ready for
    /// data again.
    ///
    /// Readiness is NRFD released on the bus, polled every 50 ms. Boards that
    /// cannot observe NRFD get a fixed 1 s grace period instead. The wait
    /// gives up with [`GpibError::Timeout`] after the device timeout; a zero
    /// timeout waits indefinitely.
    pub fn clear(&self) -> Result<()> {
        let _op = self.begin()?;
        let _busy = self.options.busy();

        self.options.log(format_args!(
            "Clearing device at address {}",
            self.address.raw()
        ));
        if let Err(err) = self.call(|b| b.ibclr(self.ud)) {
            self.options
                .log(format_args!("Failed to clear device {}: {}", self.ud, err));
            return Err(err);
        }

        // Some instruments time out on a write issued right after a clear.
        let cleared = Instant::now();
        loop {
            thread::sleep(CLEAR_POLL_INTERVAL);
            let lines = match gate::with_lock(self.board.bus(), |b| b.iblines(self.board.ud()))
                .into_result()
            {
                Ok(lines) => lines,
                Err(err) => {
                    self.options.log(format_args!(
                        "Failed to monitor iblines after clearing device {}: {}",
                        self.ud, err
                    ));
                    return Err(err);
                }
            };
            if !lines.contains(BusLines::VALID_NRFD) {
                thread::sleep(CLEAR_GRACE);
                break;
            }
            if !lines.contains(BusLines::NRFD) {
                break;
            }
            let timeout = self.timeout();
            if !timeout.is_zero() && cleared.elapsed() > timeout {
                self.options
                    .log(format_args!("Timed out after clearing device {}", self.ud));
                return Err(GpibError::Timeout);
            }
        }
        debug!(ud = self.ud, elapsed = ?cleared.elapsed(), "Device ready after clear");
        Ok(())
    }

    /// Send Group Execute Trigger.
    pub fn trigger(&self) -> Result<()> {
        let _op = self.begin()?;
        let _busy = self.options.busy();

        self.options.log(format_args!(
            "Triggering device at address {}",
            self.address.raw()
        ));
        if let Err(err) = self.call(|b| b.ibtrg(self.ud)) {
            self.options.log(format_args!(
                "Failed to trigger address {} device {}: {}",
                self.address.raw(),
                self.ud,
                err
            ));
            return Err(err);
        }
        Ok(())
    }

    /// Serial poll the device for its status byte.
    pub fn serial_poll(&self) -> Result<u8> {
        let _op = self.begin()?;
        let _busy = self.options.busy();

        let started = Instant::now();
        let done = gate::with_lock(self.board.bus(), |b| b.ibrsp(self.ud));
        let took = millis(started.elapsed());

        match done.into_result() {
            Ok(spr) => {
                self.options.log(format_args!(
                    "Polled status {:02X} in {:?} from address {}",
                    spr,
                    took,
                    self.address.raw()
                ));
                Ok(spr)
            }
            Err(err) => {
                self.options.log(format_args!(
                    "Failed to poll address {} device {}: {}",
                    self.address.raw(),
                    self.ud,
                    err
                ));
                Err(err)
            }
        }
    }

    /// Take the device offline and release remote enable if it was the last
    /// one open on the board.
    ///
    /// The device counts as closed as soon as this is called, even if it
    /// fails. A [`GpibError::RemoteDisableFailed`] leaves the device closed
    /// and the board's remote state unknown.
    pub fn close(&self) -> Result<()> {
        let _op = self.begin()?;
        let busy = self.options.busy();

        self.state.lock().closed = true;
        self.options
            .log(format_args!("Closing address {}", self.address.raw()));

        // Remote enable follows the active set, so both change under its lock.
        let active = self.board.deactivate(self.address);
        let offline = self.call(|b| b.ibonl(self.ud, false));
        let disabled = match offline {
            Ok(()) if active.is_empty() => self.call(|b| b.ibsre(self.board.ud(), false)),
            _ => Ok(()),
        };
        drop(active);
        drop(busy);

        if let Err(err) = offline {
            self.options.log(format_args!(
                "Failed to close address {} device {}: {}",
                self.address.raw(),
                self.ud,
                err
            ));
            return Err(err);
        }
        if let Err(err) = disabled {
            self.options.log(format_args!(
                "Failed to disable remote mode on board {}",
                self.board.index()
            ));
            return Err(GpibError::RemoteDisableFailed {
                board: self.board.index(),
                source: Box::new(err),
            });
        }
        debug!(board = self.board.index(), address = %self.address, ud = self.ud, "Closed device");
        Ok(())
    }
}

impl Drop for Device<'_> {
    fn drop(&mut self) {
        if self.state.get_mut().closed {
            return;
        }
        if let Err(err) = self.close() {
            warn!(
                board = self.board.index(),
                address = %self.address,
                error = %err,
                "Error closing GPIB device"
            );
        }
    }
}

impl io::Read for &Device<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Device::read(*self, buf).map_err(io::Error::from)
    }
}

impl io::Read for Device<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Device::read(self, buf).map_err(io::Error::from)
    }
}

impl io::Write for &Device<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Device::write(*self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Write for Device<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Device::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
