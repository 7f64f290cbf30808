//! Process-wide table of claimed board indices.
//!
//! Uses its own lock, never the bus gate, so claiming a board cannot
//! deadlock against an in-flight adapter call.

use std::collections::BTreeSet;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{GpibError, Result};

static BOARDS: Mutex<BTreeSet<u32>> = Mutex::new(BTreeSet::new());

/// Claim a board index. Fails if another live board holds it.
pub fn claim(index: u32) -> Result<()> {
    let mut boards = BOARDS.lock();
    if !boards.insert(index) {
        return Err(GpibError::AlreadyInUse(index));
    }
    debug!(board = index, "Claimed board");
    Ok(())
}

/// Release a board index. Releasing an unclaimed index is a no-op.
pub fn release(index: u32) {
    if BOARDS.lock().remove(&index) {
        debug!(board = index, "Released board");
    }
}

/// Whether a board index is currently claimed.
pub fn is_claimed(index: u32) -> bool {
    BOARDS.lock().contains(&index)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Indices 900+ are reserved for these tests; the registry is shared by
    // every test in the process.

    #[test]
    fn test_double_claim_fails() {
        claim(900).unwrap();
        assert_eq!(claim(900), Err(GpibError::AlreadyInUse(900)));
        release(900);
    }

    #[test]
    fn test_claim_after_release() {
        claim(901).unwrap();
        assert!(is_claimed(901));
        release(901);
        assert!(!is_claimed(901));
        claim(901).unwrap();
        release(901);
    }

    #[test]
    fn test_release_unclaimed_is_noop() {
        release(902);
        assert!(!is_claimed(902));
    }
}
