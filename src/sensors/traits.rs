// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/squadpulse

//! Heart-rate stream traits and common types

use std::sync::atomic::{AtomicU64, Ordering};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// Samples buffered per stream before the producer waits
pub const SAMPLE_BUFFER: usize = 256;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Stream operational status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamStatus {
    Disconnected,
    Connecting,
    Streaming,
    Error,
}

/// Identifies one live subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// A live subscription: decoded bpm values arrive on `samples` in order.
/// The channel closes when the source goes away.
#[derive(Debug)]
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub samples: mpsc::Receiver<u16>,
}

/// Source of heart-rate samples for one athlete
#[async_trait]
pub trait HeartRateStream: Send + Sync {
    /// Human-readable device label
    fn label(&self) -> &str;

    /// Get current status
    fn status(&self) -> StreamStatus;

    /// Pair with the source and start delivering samples.
    ///
    /// Fails with `WearablesError::Connection` when pairing does not complete.
    async fn subscribe(&mut self) -> Result<Subscription>;

    /// Stop delivery and release the source
    async fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Result<()>;
}

/// Builds a fresh stream for each pairing attempt
pub trait StreamFactory: Send + Sync {
    fn create(&self, label: &str) -> Box<dyn HeartRateStream>;
}

impl<F> StreamFactory for F
where
    F: Fn(&str) -> Box<dyn HeartRateStream> + Send + Sync,
{
    fn create(&self, label: &str) -> Box<dyn HeartRateStream> {
        self(label)
    }
}
