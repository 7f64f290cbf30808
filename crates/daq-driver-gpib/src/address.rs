//! GPIB device addressing.

use std::fmt;

use crate::error::{GpibError, Result};

/// Highest valid primary address. 31 is reserved for UNL/UNT.
pub const MAX_PRIMARY: u32 = 30;

/// Range of valid secondary addresses (0 means "none").
pub const SECONDARY_RANGE: std::ops::RangeInclusive<u32> = 0x60..=0x7e;

/// A GPIB device address: primary address plus optional secondary address.
///
/// Packed the way linux-gpib's `MakeAddr` packs them, so the value of an
/// address without a secondary equals its primary address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u16);

impl Address {
    /// Combine a primary and secondary address.
    ///
    /// # Errors
    ///
    /// Returns [`GpibError::InvalidAddress`] if the primary address is above 30
    /// or the secondary address is neither 0 nor within 0x60-0x7e.
    pub fn new(primary: u32, secondary: u32) -> Result<Self> {
        if primary > MAX_PRIMARY || (secondary != 0 && !SECONDARY_RANGE.contains(&secondary)) {
            return Err(GpibError::InvalidAddress { primary, secondary });
        }
        Ok(Self(gpib_sys::MakeAddr(primary, secondary)))
    }

    /// An address with no secondary part.
    pub fn primary_only(primary: u32) -> Result<Self> {
        Self::new(primary, 0)
    }

    /// The primary address (0-30).
    pub fn primary(self) -> u32 {
        gpib_sys::GetPAD(self.0)
    }

    /// The secondary address, or 0 if none.
    pub fn secondary(self) -> u32 {
        gpib_sys::GetSAD(self.0)
    }

    /// The packed 488.2 representation.
    pub fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.secondary() {
            0 => write!(f, "{}", self.primary()),
            sad => write!(f, "{}/{}", self.primary(), sad),
        }
    }
}
