// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/squadpulse

//! Error taxonomy for the wearables core

use thiserror::Error;

/// Errors raised by roster, device and persistence operations.
///
/// `Validation` and `NotFound` are caller bugs and propagate immediately.
/// `Connection` and `Persistence` are environmental; they are isolated to
/// one athlete or one write and never stop the session clock.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WearablesError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Athlete not found: {0}")]
    NotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Monitoring session already active")]
    SessionAlreadyActive,

    #[error("Malformed heart rate measurement: {0}")]
    Decode(String),
}

impl WearablesError {
    /// True for errors caused by the environment rather than by the caller.
    pub fn is_environmental(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Persistence(_))
    }
}

impl From<rusqlite::Error> for WearablesError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for WearablesError {
    fn from(e: serde_json::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

/// Result alias used across the core.
pub type Result<T> = std::result::Result<T, WearablesError>;
