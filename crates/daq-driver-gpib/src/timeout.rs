//! Timeout quantization.
//!
//! The adapter only understands a fixed ladder of timeout codes. A requested
//! duration is rounded *up* to the next ladder value so an operation never
//! times out sooner than asked.

use std::fmt;
use std::time::Duration;

/// A timeout code accepted by `ibdev` and `ibtmo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeoutCode(i32);

/// Ascending (limit, code) ladder. Anything above the last limit maps to
/// [`TimeoutCode::MAX`].
const LADDER: [(Duration, TimeoutCode); 17] = [
    (Duration::ZERO, TimeoutCode::NONE),
    (Duration::from_micros(10), TimeoutCode(gpib_sys::T10us as i32)),
    (Duration::from_micros(30), TimeoutCode(gpib_sys::T30us as i32)),
    (Duration::from_micros(100), TimeoutCode(gpib_sys::T100us as i32)),
    (Duration::from_micros(300), TimeoutCode(gpib_sys::T300us as i32)),
    (Duration::from_millis(1), TimeoutCode(gpib_sys::T1ms as i32)),
    (Duration::from_millis(3), TimeoutCode(gpib_sys::T3ms as i32)),
    (Duration::from_millis(10), TimeoutCode(gpib_sys::T10ms as i32)),
    (Duration::from_millis(30), TimeoutCode(gpib_sys::T30ms as i32)),
    (Duration::from_millis(100), TimeoutCode(gpib_sys::T100ms as i32)),
    (Duration::from_millis(300), TimeoutCode(gpib_sys::T300ms as i32)),
    (Duration::from_secs(1), TimeoutCode(gpib_sys::T1s as i32)),
    (Duration::from_secs(3), TimeoutCode(gpib_sys::T3s as i32)),
    (Duration::from_secs(10), TimeoutCode(gpib_sys::T10s as i32)),
    (Duration::from_secs(30), TimeoutCode(gpib_sys::T30s as i32)),
    (Duration::from_secs(100), TimeoutCode(gpib_sys::T100s as i32)),
    (Duration::from_secs(300), TimeoutCode(gpib_sys::T300s as i32)),
];

impl TimeoutCode {
    /// Timeouts disabled (`TNONE`).
    pub const NONE: Self = Self(gpib_sys::TNONE as i32);

    /// The longest supported timeout (`T1000s`).
    pub const MAX: Self = Self(gpib_sys::T1000s as i32);

    /// The raw code passed to the adapter.
    pub fn raw(self) -> i32 {
        self.0
    }

    /// The duration this code stands for. `NONE` yields zero.
    pub fn duration(self) -> Duration {
        LADDER
            .iter()
            .find(|(_, code)| *code == self)
            .map(|(limit, _)| *limit)
            .unwrap_or(Duration::from_secs(1000))
    }
}

impl fmt::Display for TimeoutCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::NONE {
            write!(f, "TNONE")
        } else {
            write!(f, "T{:?}", self.duration())
        }
    }
}

/// Return the smallest supported timeout not shorter than `d`.
///
/// Zero disables timeouts; anything longer than 300 s is clamped to 1000 s.
pub fn quantize(d: Duration) -> TimeoutCode {
    LADDER
        .iter()
        .find(|(limit, _)| d <= *limit)
        .map(|(_, code)| *code)
        .unwrap_or(TimeoutCode::MAX)
}
