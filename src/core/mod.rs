// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/squadpulse

//! Core module - engine, session clock and event bus

mod engine;
mod scheduler;
mod event_bus;

pub use engine::Engine;
pub use scheduler::{ClockState, SessionClock};
pub use event_bus::{Event, EventBus, WearableEvent};

use serde::{Deserialize, Serialize};

/// Snapshot of the monitoring state for status displays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_active: bool,
    pub athletes: usize,
    pub connected: usize,
    pub ticks: u64,
}
