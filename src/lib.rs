// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/squadpulse

//! SquadPulse - Team Heart-Rate Monitoring
//!
//! Live wearable telemetry for a coaching staff:
//! - Pairs chest straps over Bluetooth LE (or simulated straps for demos)
//! - Smooths every athlete's heart rate into a rolling average
//! - Buckets session time into four heart-rate zones, one second per tick
//! - Persists the roster snapshot and restores it on the next launch
//! - Role-based views for coach, athlete and specialist
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                    Wearables Engine                       │
//! ├───────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐               │
//! │  │  Device  │ → │  Roster  │ ← │ Session  │               │
//! │  │ Manager  │   │  Store   │   │  Clock   │               │
//! │  └──────────┘   └──────────┘   └──────────┘               │
//! │       ↑              ↓              ↓                     │
//! │  ┌──────────┐   ┌──────────┐   ┌──────────────────────┐   │
//! │  │ HR       │   │ Database │   │      Event Bus       │   │
//! │  │ Streams  │   │          │   │                      │   │
//! │  └──────────┘   └──────────┘   └──────────────────────┘   │
//! └───────────────────────────────────────────────────────────┘
//! ```

pub mod core;
pub mod sensors;
pub mod roster;
pub mod zones;
pub mod views;
pub mod config;
pub mod db;
pub mod error;

// Re-exports for convenience
pub use config::Config;
pub use crate::core::{Engine, EventBus, SessionClock, SessionSummary};
pub use sensors::{DeviceManager, HeartRateStream, StreamFactory};
pub use roster::{Athlete, AthleteConfig, AthleteId, RosterStore};
pub use zones::{classify, Zone, ZoneBoundaries, ZoneRange};
pub use views::{Role, TeamRow, ViewMode};
pub use db::{Database, KeyValueStore, RosterPersistence};
pub use error::{Result, WearablesError};

/// SquadPulse version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// SquadPulse name
pub const NAME: &str = "SquadPulse";
