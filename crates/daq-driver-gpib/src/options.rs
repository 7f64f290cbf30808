//! Board and device options, the diagnostic logger and the activity hook.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::{GpibError, Result};

/// Default I/O timeout for new boards.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Payloads longer than this are shortened in log lines.
pub const MAX_LOG_DATA: usize = 60;

/// How much of the tail of [`MAX_LOG_DATA`] is dropped when shortening.
const MIN_LOG_HIDE: usize = 20;

/// Sink for human-readable diagnostic lines.
///
/// Lines arrive fully formatted, one per call.
pub trait Logger: Send + Sync {
    /// Write one line.
    fn log(&self, line: &str);
}

impl<F> Logger for F
where
    F: Fn(&str) + Send + Sync,
{
    fn log(&self, line: &str) {
        self(line)
    }
}

/// Forwards diagnostic lines to `tracing` at INFO under the `gpib` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, line: &str) {
        info!(target: "gpib", "{}", line);
    }
}

/// Callback told `true` when bus activity starts and `false` when it ends.
pub type ActivityFn = Arc<dyn Fn(bool) + Send + Sync>;

/// Options shared by a board and the devices opened on it.
#[derive(Clone)]
pub struct Options {
    timeout: Duration,
    read_eos: String,
    logger: Option<Arc<dyn Logger>>,
    activity: Option<ActivityFn>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            read_eos: String::new(),
            logger: None,
            activity: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("timeout", &self.timeout)
            .field("read_eos", &self.read_eos)
            .field("logger", &self.logger.is_some())
            .field("activity", &self.activity.is_some())
            .finish()
    }
}

impl Options {
    /// Options with a 10 s timeout, EOI read termination and no hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the I/O timeout. Rounded up to a supported value when applied;
    /// zero disables timeouts.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Terminate reads on this character as well as on EOI. Empty means
    /// EOI only; anything longer than one byte is rejected when a device
    /// is opened.
    #[must_use]
    pub fn read_eos(mut self, eos: impl Into<String>) -> Self {
        self.read_eos = eos.into();
        self
    }

    /// Log bus traffic in human-readable form.
    ///
    /// The logger and the activity callback may call back into the board,
    /// but not into the device whose operation they report on.
    #[must_use]
    pub fn logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Notify `f` of bus activity, e.g. to drive an indicator lamp.
    #[must_use]
    pub fn activity(mut self, f: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.activity = Some(Arc::new(f));
        self
    }

    /// The configured timeout.
    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    /// The configured read terminator.
    pub fn get_read_eos(&self) -> &str {
        &self.read_eos
    }

    /// Apply per-device overrides; set fields in `overrides` win.
    pub fn merge(&self, overrides: &DeviceOptions) -> Self {
        let mut merged = self.clone();
        if let Some(timeout) = overrides.timeout {
            merged.timeout = timeout;
        }
        if let Some(eos) = &overrides.read_eos {
            merged.read_eos.clone_from(eos);
        }
        if let Some(logger) = &overrides.logger {
            merged.logger = Some(Arc::clone(logger));
        }
        if let Some(activity) = &overrides.activity {
            merged.activity = Some(Arc::clone(activity));
        }
        merged
    }

    /// The `ibdev` end-of-string mode for the read terminator.
    pub(crate) fn eos_mode(&self) -> Result<i32> {
        match self.read_eos.as_bytes() {
            [] => Ok(0),
            [c] => Ok((gpib_sys::BIN | gpib_sys::REOS) as i32 | i32::from(*c)),
            _ => Err(GpibError::InvalidConfig(
                "invalid read eos: must be a single character".to_string(),
            )),
        }
    }

    pub(crate) fn log(&self, args: fmt::Arguments<'_>) {
        if let Some(logger) = &self.logger {
            logger.log(&args.to_string());
        }
    }

    pub(crate) fn busy(&self) -> ActivityGuard {
        ActivityGuard::new(self.activity.clone())
    }
}

/// Per-device overrides of the board's [`Options`].
#[derive(Clone, Default)]
pub struct DeviceOptions {
    timeout: Option<Duration>,
    read_eos: Option<String>,
    logger: Option<Arc<dyn Logger>>,
    activity: Option<ActivityFn>,
}

impl fmt::Debug for DeviceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceOptions")
            .field("timeout", &self.timeout)
            .field("read_eos", &self.read_eos)
            .field("logger", &self.logger.is_some())
            .field("activity", &self.activity.is_some())
            .finish()
    }
}

impl DeviceOptions {
    /// No overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the read terminator.
    #[must_use]
    pub fn read_eos(mut self, eos: impl Into<String>) -> Self {
        self.read_eos = Some(eos.into());
        self
    }

    /// Override the logger.
    #[must_use]
    pub fn logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Override the activity callback.
    #[must_use]
    pub fn activity(mut self, f: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.activity = Some(Arc::new(f));
        self
    }
}

/// Brackets bus activity: `true` on creation, `false` on drop, including
/// when the operation fails or unwinds.
pub(crate) struct ActivityGuard(Option<ActivityFn>);

impl ActivityGuard {
    fn new(activity: Option<ActivityFn>) -> Self {
        if let Some(f) = &activity {
            f(true);
        }
        Self(activity)
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        if let Some(f) = &self.0 {
            f(false);
        }
    }
}

/// Render a payload for a log line: quoted, and shortened to a 40-byte
/// prefix plus the total length when longer than 60 bytes.
pub fn format_payload(data: &[u8]) -> String {
    if data.len() > MAX_LOG_DATA {
        let shown = &data[..MAX_LOG_DATA - MIN_LOG_HIDE];
        return format!(
            "{:?}...({} bytes total)",
            String::from_utf8_lossy(shown),
            data.len()
        );
    }
    format!("{:?}", String::from_utf8_lossy(data))
}

/// Elapsed time truncated to whole milliseconds, for log lines.
pub(crate) fn millis(elapsed: Duration) -> Duration {
    Duration::from_millis(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}
