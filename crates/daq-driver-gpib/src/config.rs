//! File and environment configuration.
//!
//! A [`GpibConfig`] names one board and one device on it. It is loaded from
//! a TOML file, then overridden by environment variables prefixed `GPIB_`:
//!
//! ```toml
//! board = 0
//! address = 22
//! timeout_ms = 3000
//! read_eos = "\n"
//! log = true
//! ```
//!
//! `GPIB_ADDRESS=9` would then select address 9 instead. Without a file,
//! [`GpibConfig::merged_with_env`] layers the environment over defaults.

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::address::{Address, MAX_PRIMARY, SECONDARY_RANGE};
use crate::error::{GpibError, Result};
use crate::options::{Options, TracingLogger};

/// Board and device selection plus session options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpibConfig {
    /// Board index (`/dev/gpib<board>`)
    #[serde(default)]
    pub board: u32,
    /// Primary address of the device (0-30)
    pub address: u32,
    /// Secondary address, 0 for none
    #[serde(default)]
    pub secondary: u32,
    /// I/O timeout in milliseconds; 0 disables timeouts
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Read terminator; empty terminates on EOI only
    #[serde(default)]
    pub read_eos: String,
    /// Log bus traffic through `tracing`
    #[serde(default)]
    pub log: bool,
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl GpibConfig {
    /// A configuration for `address` on board 0 with default options.
    pub fn new(address: u32) -> Self {
        Self {
            board: 0,
            address,
            secondary: 0,
            timeout_ms: default_timeout_ms(),
            read_eos: String::new(),
            log: false,
        }
    }

    /// Load from a TOML file, overridden by `GPIB_*` environment variables.
    ///
    /// A missing file is not an error as long as the environment supplies
    /// the required fields.
    pub fn load_from<P: AsRef<Path>>(path: P) -> std::result::Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("GPIB_"))
            .extract()
    }

    /// Use `self` as defaults and layer a TOML file and the environment on top.
    pub fn merged_with_file<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> std::result::Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(self))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("GPIB_"))
            .extract()
    }

    /// Use `self` as defaults and layer the `GPIB_*` environment on top.
    pub fn merged_with_env(&self) -> std::result::Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(self))
            .merge(Env::prefixed("GPIB_"))
            .extract()
    }

    /// Check ranges before any hardware is touched.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.address > MAX_PRIMARY {
            return Err(format!(
                "Invalid address {}. Must be 0-{}",
                self.address, MAX_PRIMARY
            ));
        }
        if self.secondary != 0 && !SECONDARY_RANGE.contains(&self.secondary) {
            return Err(format!(
                "Invalid secondary address {:#x}. Must be 0 or {:#x}-{:#x}",
                self.secondary,
                SECONDARY_RANGE.start(),
                SECONDARY_RANGE.end()
            ));
        }
        if self.read_eos.len() > 1 {
            return Err(format!(
                "Invalid read_eos {:?}. Must be empty or a single character",
                self.read_eos
            ));
        }
        Ok(())
    }

    /// The configured device address.
    pub fn device_address(&self) -> Result<Address> {
        Address::new(self.address, self.secondary)
    }

    /// The configured timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Board options built from this configuration.
    pub fn options(&self) -> Result<Options> {
        self.validate().map_err(GpibError::InvalidConfig)?;
        let options = Options::new()
            .timeout(self.timeout())
            .read_eos(self.read_eos.clone());
        Ok(if self.log {
            options.logger(TracingLogger)
        } else {
            options
        })
    }
}
