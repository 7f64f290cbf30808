//! Error types for GPIB operations.
//!
//! Hardware failures are decoded exactly once, at the call site, from the
//! status word and the error/count registers captured under the bus lock.
//! Precondition failures (closed device, duplicate address, duplicate board,
//! bad configuration) are raised before any hardware call is made.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::address::Address;

/// Result type alias for GPIB operations.
pub type Result<T> = std::result::Result<T, GpibError>;

/// Errors that can occur when working with GPIB boards and devices.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GpibError {
    /// The operation exceeded its configured time limit (`TIMO` was set).
    #[error("timed out")]
    Timeout,

    /// The adapter reported an error code.
    #[error("{code}")]
    Hardware { code: ErrorCode },

    /// The adapter reported a system or file-system error along with `errno`.
    #[error("{code}: {}", os_error(.errno))]
    System { code: ErrorCode, errno: i32 },

    /// Another live `Board` already owns this index.
    #[error("board in use: {0}")]
    AlreadyInUse(u32),

    /// The device was closed earlier.
    #[error("already closed")]
    AlreadyClosed,

    /// A device is already open at this address on the board.
    #[error("device already in use: {0}")]
    AddressInUse(Address),

    /// Options failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Primary or secondary address out of range.
    #[error(
        "invalid address {primary}/{secondary}: primary must be 0-30, secondary 0 or 0x60-0x7e"
    )]
    InvalidAddress { primary: u32, secondary: u32 },

    /// The board cannot observe NDAC, so listeners cannot be detected.
    #[error("board does not support monitoring NDAC")]
    EnumNotSupported,

    /// Remote mode could not be enabled before opening the first device.
    #[error("failed to enable remote mode on board {board}: {source}")]
    RemoteEnableFailed {
        board: u32,
        #[source]
        source: Box<GpibError>,
    },

    /// Remote mode could not be disabled after closing the last device.
    #[error("failed to disable remote mode on board {board}: {source}")]
    RemoteDisableFailed {
        board: u32,
        #[source]
        source: Box<GpibError>,
    },

    /// `ibdev` returned an invalid descriptor without flagging an error.
    #[error("ibdev failed without setting an error")]
    OpenFailed,
}

fn os_error(errno: &i32) -> io::Error {
    io::Error::from_raw_os_error(*errno)
}

impl GpibError {
    /// Check if this error is a timeout, which callers may retry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Check if this error was raised before touching hardware.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::AlreadyInUse(_)
                | Self::AlreadyClosed
                | Self::AddressInUse(_)
                | Self::InvalidConfig(_)
                | Self::InvalidAddress { .. }
        )
    }

    /// The adapter error code, if this error came from one.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Hardware { code } | Self::System { code, .. } => Some(*code),
            Self::RemoteEnableFailed { source, .. } | Self::RemoteDisableFailed { source, .. } => {
                source.error_code()
            }
            _ => None,
        }
    }
}

impl From<GpibError> for io::Error {
    fn from(err: GpibError) -> Self {
        let kind = match &err {
            GpibError::Timeout => io::ErrorKind::TimedOut,
            GpibError::AlreadyClosed => io::ErrorKind::NotConnected,
            GpibError::InvalidConfig(_) | GpibError::InvalidAddress { .. } => {
                io::ErrorKind::InvalidInput
            }
            GpibError::AlreadyInUse(_) | GpibError::AddressInUse(_) => io::ErrorKind::AddrInUse,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

/// Error codes reported in `iberr` when `ERR` is set in the status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// System error; `ibcnt` holds `errno`.
    Edvr,
    /// Board is not controller-in-charge.
    Ecic,
    /// No listeners on the bus.
    Enol,
    /// Controller-in-charge but not addressed before I/O.
    Eadr,
    /// Bad argument to function call.
    Earg,
    /// Board is not system controller.
    Esac,
    /// I/O operation was aborted.
    Eabo,
    /// Non-existent board (interface offline).
    Eneb,
    /// DMA hardware error.
    Edma,
    /// New I/O attempted with old I/O in progress.
    Eoip,
    /// No capability for intended operation.
    Ecap,
    /// File system operation error; `ibcnt` holds `errno`.
    Efso,
    /// Bus error.
    Ebus,
    /// Lost serial poll bytes.
    Estb,
    /// SRQ stuck on.
    Esrq,
    /// Table overflow.
    Etab,
    /// A code this driver does not know about.
    Unknown(i32),
}

impl ErrorCode {
    /// Convert from a raw `iberr` value.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            r if r == gpib_sys::EDVR as i32 => Self::Edvr,
            r if r == gpib_sys::ECIC as i32 => Self::Ecic,
            r if r == gpib_sys::ENOL as i32 => Self::Enol,
            r if r == gpib_sys::EADR as i32 => Self::Eadr,
            r if r == gpib_sys::EARG as i32 => Self::Earg,
            r if r == gpib_sys::ESAC as i32 => Self::Esac,
            r if r == gpib_sys::EABO as i32 => Self::Eabo,
            r if r == gpib_sys::ENEB as i32 => Self::Eneb,
            r if r == gpib_sys::EDMA as i32 => Self::Edma,
            r if r == gpib_sys::EOIP as i32 => Self::Eoip,
            r if r == gpib_sys::ECAP as i32 => Self::Ecap,
            r if r == gpib_sys::EFSO as i32 => Self::Efso,
            r if r == gpib_sys::EBUS as i32 => Self::Ebus,
            r if r == gpib_sys::ESTB as i32 => Self::Estb,
            r if r == gpib_sys::ESRQ as i32 => Self::Esrq,
            r if r == gpib_sys::ETAB as i32 => Self::Etab,
            other => Self::Unknown(other),
        }
    }

    /// Convert to the raw `iberr` value.
    pub fn to_raw(self) -> i32 {
        match self {
            Self::Edvr => gpib_sys::EDVR as i32,
            Self::Ecic => gpib_sys::ECIC as i32,
            Self::Enol => gpib_sys::ENOL as i32,
            Self::Eadr => gpib_sys::EADR as i32,
            Self::Earg => gpib_sys::EARG as i32,
            Self::Esac => gpib_sys::ESAC as i32,
            Self::Eabo => gpib_sys::EABO as i32,
            Self::Eneb => gpib_sys::ENEB as i32,
            Self::Edma => gpib_sys::EDMA as i32,
            Self::Eoip => gpib_sys::EOIP as i32,
            Self::Ecap => gpib_sys::ECAP as i32,
            Self::Efso => gpib_sys::EFSO as i32,
            Self::Ebus => gpib_sys::EBUS as i32,
            Self::Estb => gpib_sys::ESTB as i32,
            Self::Esrq => gpib_sys::ESRQ as i32,
            Self::Etab => gpib_sys::ETAB as i32,
            Self::Unknown(raw) => raw,
        }
    }

    /// Whether `ibcnt` carries an OS `errno` for this code.
    pub fn carries_errno(self) -> bool {
        matches!(self, Self::Edvr | Self::Efso)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Edvr => write!(f, "EDVR"),
            Self::Ecic => write!(f, "ECIC"),
            Self::Enol => write!(f, "ENOL"),
            Self::Eadr => write!(f, "EADR"),
            Self::Earg => write!(f, "EARG"),
            Self::Esac => write!(f, "ESAC"),
            Self::Eabo => write!(f, "EABO"),
            Self::Eneb => write!(f, "ENEB"),
            Self::Edma => write!(f, "EDMA"),
            Self::Eoip => write!(f, "EOIP"),
            Self::Ecap => write!(f, "ECAP"),
            Self::Efso => write!(f, "EFSO"),
            Self::Ebus => write!(f, "EBUS"),
            Self::Estb => write!(f, "ESTB"),
            Self::Esrq => write!(f, "ESRQ"),
            Self::Etab => write!(f, "ETAB"),
            Self::Unknown(raw) => write!(f, "UNKNOWN({})", raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_round_trip_for_known_codes() {
        for raw in [0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 14, 15, 16, 20] {
            let code = ErrorCode::from_raw(raw);
            assert!(!matches!(code, ErrorCode::Unknown(_)), "code {raw}");
            assert_eq!(code.to_raw(), raw);
        }
    }

    #[test]
    fn test_unknown_codes_are_preserved() {
        assert_eq!(ErrorCode::from_raw(9), ErrorCode::Unknown(9));
        assert_eq!(ErrorCode::from_raw(13).to_string(), "UNKNOWN(13)");
    }

    #[test]
    fn test_error_display() {
        let err = GpibError::Hardware {
            code: ErrorCode::Enol,
        };
        assert_eq!(err.to_string(), "ENOL");
        assert_eq!(GpibError::Timeout.to_string(), "timed out");

        let err = GpibError::System {
            code: ErrorCode::Edvr,
            errno: 2,
        };
        assert!(err.to_string().starts_with("EDVR: "));
    }

    #[test]
    fn test_io_error_kinds() {
        let io_err: io::Error = GpibError::Timeout.into();
        assert_eq!(io_err.kind(), io::ErrorKind::TimedOut);

        let io_err: io::Error = GpibError::AlreadyClosed.into();
        assert_eq!(io_err.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn test_nested_error_code() {
        let err = GpibError::RemoteEnableFailed {
            board: 0,
            source: Box::new(GpibError::Hardware {
                code: ErrorCode::Esac,
            }),
        };
        assert_eq!(err.error_code(), Some(ErrorCode::Esac));
        assert!(!err.is_precondition());
        assert!(GpibError::AlreadyClosed.is_precondition());
    }
}
