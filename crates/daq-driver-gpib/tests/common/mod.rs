//! Shared helpers for the mock-backed integration tests.
//!
//! The board registry is process-wide and tests run in parallel, so every
//! test must open its own board index.

#![allow(dead_code)]

use std::sync::Arc;

use daq_driver_gpib::mock::MockBus;
use daq_driver_gpib::{Address, Board, Options};
use parking_lot::Mutex;

pub fn addr(pad: u32) -> Address {
    Address::primary_only(pad).unwrap()
}

/// A board on a fresh mock bus.
pub fn mock_board(index: u32, options: Options) -> (Arc<MockBus>, Board) {
    let bus = Arc::new(MockBus::new());
    let board = Board::open_with_bus(index, options, bus.clone()).unwrap();
    (bus, board)
}

/// Collects diagnostic lines and activity edges.
#[derive(Clone, Default)]
pub struct Recorder {
    pub lines: Arc<Mutex<Vec<String>>>,
    pub activity: Arc<Mutex<Vec<bool>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Board options wired to this recorder.
    pub fn options(&self) -> Options {
        let lines = Arc::clone(&self.lines);
        let activity = Arc::clone(&self.activity);
        Options::new()
            .logger(move |line: &str| lines.lock().push(line.to_string()))
            .activity(move |busy| activity.lock().push(busy))
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn last_line(&self) -> String {
        self.lines.lock().last().cloned().unwrap_or_default()
    }

    pub fn activity(&self) -> Vec<bool> {
        self.activity.lock().clone()
    }

    pub fn reset(&self) {
        self.lines.lock().clear();
        self.activity.lock().clear();
    }
}
