//! GPIB interface boards.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::address::Address;
use crate::bus::{GpibBus, LinuxGpib};
use crate::device::Device;
use crate::error::{GpibError, Result};
use crate::gate;
use crate::options::{DeviceOptions, Options};
use crate::registry;
use crate::status::{decode, format_bus_lines, BusLines, Status};
use crate::timeout::{quantize, TimeoutCode};

/// A GPIB interface board acting as controller-in-charge.
///
/// At most one `Board` exists per index in the process. Devices opened on
/// the board borrow it, so the board outlives all of them; dropping the
/// board releases its index.
///
/// Remote enable is asserted when the first device is opened and released
/// when the last one is closed.
pub struct Board {
    index: u32,
    bus: Arc<dyn GpibBus>,
    options: Options,
    version: String,
    active: Mutex<BTreeSet<Address>>,
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Board")
            .field("index", &self.index)
            .field("version", &self.version)
            .field("options", &self.options)
            .field("active", &*self.active.lock())
            .finish()
    }
}

impl Board {
    /// Open board `index` (`/dev/gpib<index>`) through linux-gpib.
    ///
    /// # Errors
    ///
    /// Returns [`GpibError::AlreadyInUse`] if another live `Board` holds the
    /// same index.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use daq_driver_gpib::{Address, Board, DeviceOptions, Options};
    ///
    /// let board = Board::open(0, Options::new())?;
    /// let dmm = board.open_device(Address::primary_only(22)?, &DeviceOptions::new())?;
    /// dmm.write(b"*IDN?\n")?;
    /// # Ok::<(), daq_driver_gpib::GpibError>(())
    /// ```
    pub fn open(index: u32, options: Options) -> Result<Self> {
        Self::open_with_bus(index, options, Arc::new(LinuxGpib))
    }

    /// Open board `index` on an arbitrary adapter.
    pub fn open_with_bus(index: u32, options: Options, bus: Arc<dyn GpibBus>) -> Result<Self> {
        registry::claim(index)?;
        let version = gate::acquire(bus.as_ref())
            .call(|b| (Status::empty(), b.ibvers()))
            .value;
        options.log(format_args!(
            "Opened board {} with version {}",
            index, version
        ));
        Ok(Self {
            index,
            bus,
            options,
            version,
            active: Mutex::new(BTreeSet::new()),
        })
    }

    /// The board index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Library version reported when the board was opened.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Board-level default options.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Addresses of the devices currently open, in ascending order.
    pub fn active_devices(&self) -> Vec<Address> {
        self.active.lock().iter().copied().collect()
    }

    /// Open a device at `address`, applying `overrides` on top of the
    /// board's options.
    ///
    /// # Errors
    ///
    /// - [`GpibError::InvalidConfig`] if the read terminator is longer than
    ///   one character
    /// - [`GpibError::AddressInUse`] if a device at `address` is already open
    /// - [`GpibError::RemoteEnableFailed`] if this would be the first device
    ///   and remote enable could not be asserted
    /// - the decoded adapter error, or [`GpibError::OpenFailed`], if `ibdev`
    ///   fails
    pub fn open_device(&self, address: Address, overrides: &DeviceOptions) -> Result<Device<'_>> {
        let options = self.options.merge(overrides);
        let eos = options.eos_mode()?;
        if self.active.lock().contains(&address) {
            return Err(GpibError::AddressInUse(address));
        }

        // No lock is held while callbacks run.
        let busy = options.busy();
        let (pad, sad) = (address.primary(), address.secondary());
        let timeout = quantize(options.get_timeout());
        let opened = {
            let mut active = self.active.lock();
            // Another thread may have opened the address since the check above.
            if active.contains(&address) {
                Err(GpibError::AddressInUse(address))
            } else {
                let opened = self.open_locked(active.is_empty(), pad, sad, timeout, eos);
                if opened.is_ok() {
                    active.insert(address);
                }
                opened
            }
        };
        drop(busy);

        let ud = match opened {
            Ok(ud) => ud,
            Err(err) => {
                match &err {
                    GpibError::AddressInUse(_) => {}
                    GpibError::RemoteEnableFailed { .. } => options.log(format_args!(
                        "Failed to enable remote mode on board {}",
                        self.index
                    )),
                    GpibError::OpenFailed => options.log(format_args!(
                        "Failed to open address {} ({}/{}) on board {}: unknown error",
                        address.raw(),
                        pad,
                        sad,
                        self.index
                    )),
                    err => options.log(format_args!(
                        "Failed to open address {} ({}/{}) on board {}: {}",
                        address.raw(),
                        pad,
                        sad,
                        self.index,
                        err
                    )),
                }
                return Err(err);
            }
        };

        debug!(board = self.index, address = %address, ud, %timeout, "Opened device");
        options.log(format_args!(
            "Opened address {} ({}/{}) on board {} as device {}",
            address.raw(),
            pad,
            sad,
            self.index,
            ud
        ));
        Ok(Device::new(self, address, ud, options))
    }

    /// Assert remote enable if `first`, then `ibdev`. Runs under the
    /// active-set lock.
    fn open_locked(
        &self,
        first: bool,
        pad: u32,
        sad: u32,
        timeout: TimeoutCode,
        eos: i32,
    ) -> Result<i32> {
        let mut guard = gate::acquire(self.bus.as_ref());
        if first {
            guard
                .status(|b| b.ibsre(self.ud(), true))
                .into_result()
                .map_err(|err| GpibError::RemoteEnableFailed {
                    board: self.index,
                    source: Box::new(err),
                })?;
        }
        let opened = guard.call(|b| {
            let ud = b.ibdev(self.ud(), pad as i32, sad as i32, timeout, true, eos);
            (b.ibsta(), ud)
        });
        if opened.value >= 0 {
            return Ok(opened.value);
        }
        match decode(opened.status, &opened.registers) {
            Err(err) => Err(err),
            Ok(()) => Err(GpibError::OpenFailed),
        }
    }

    /// Query the bus control lines.
    pub fn bus_lines(&self) -> Result<BusLines> {
        gate::with_lock(self.bus.as_ref(), |b| b.iblines(self.ud())).into_result()
    }

    /// Bus control lines in human-readable form, or the error text if the
    /// query failed.
    pub fn bus_lines_string(&self) -> String {
        match self.bus_lines() {
            Ok(lines) => format_bus_lines(lines),
            Err(err) => err.to_string(),
        }
    }

    /// Scan primary addresses 1-30 for listeners. See [`crate::enumerate()`].
    pub fn enumerate(&self) -> Result<Vec<u32>> {
        crate::enumerate::enumerate(self)
    }

    /// Descriptor for board-level calls.
    pub(crate) fn ud(&self) -> i32 {
        self.index as i32
    }

    pub(crate) fn bus(&self) -> &dyn GpibBus {
        self.bus.as_ref()
    }

    /// Forget `address`. Returns the lock so the caller can finish
    /// board-level bookkeeping before anyone else opens a device.
    pub(crate) fn deactivate(
        &self,
        address: Address,
    ) -> parking_lot::MutexGuard<'_, BTreeSet<Address>> {
        let mut active = self.active.lock();
        active.remove(&address);
        active
    }
}

impl Drop for Board {
    fn drop(&mut self) {
        registry::release(self.index);
    }
}
