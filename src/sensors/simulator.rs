// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/squadpulse

//! Heart-rate simulator for demo/testing

use async_trait::async_trait;
use rand::prelude::*;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::traits::{HeartRateStream, StreamFactory, StreamStatus, Subscription, SubscriptionHandle, SAMPLE_BUFFER};
use crate::config::DeviceConfig;
use crate::error::{Result, WearablesError};

/// Shortest sample interval a simulated strap runs at
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Shape of the synthetic signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    pub interval: Duration,
    pub resting_bpm: f64,
    pub peak_bpm: f64,
    pub noise_bpm: f64,
    /// Length of one rest/effort cycle
    pub cycle: Duration,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            resting_bpm: 75.0,
            peak_bpm: 175.0,
            noise_bpm: 3.0,
            cycle: Duration::from_secs(240),
        }
    }
}

impl From<&DeviceConfig> for SimulationSettings {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.sample_interval_ms.max(1)),
            resting_bpm: config.resting_bpm,
            peak_bpm: config.peak_bpm,
            noise_bpm: config.noise_bpm,
            cycle: Duration::from_secs(config.cycle_secs.max(1)),
        }
    }
}

#[derive(Debug, Clone)]
enum Signal {
    Synthetic { seed: Option<u64> },
    Scripted(Vec<u16>),
    Unreachable(String),
}

/// Simulated strap emitting samples on a timer
pub struct SimulatedHeartRate {
    label: String,
    status: StreamStatus,
    settings: SimulationSettings,
    signal: Signal,
    session: Option<(SubscriptionHandle, JoinHandle<()>)>,
}

impl SimulatedHeartRate {
    /// Interval-training style signal with gaussian noise
    pub fn new(label: &str, settings: SimulationSettings) -> Self {
        Self::with_signal(label, settings, Signal::Synthetic { seed: None })
    }

    /// Deterministic synthetic signal
    pub fn seeded(label: &str, settings: SimulationSettings, seed: u64) -> Self {
        Self::with_signal(label, settings, Signal::Synthetic { seed: Some(seed) })
    }

    /// Replay fixed samples, one per interval, then end the stream
    pub fn scripted(label: &str, samples: Vec<u16>, interval: Duration) -> Self {
        let settings = SimulationSettings {
            interval,
            ..SimulationSettings::default()
        };
        Self::with_signal(label, settings, Signal::Scripted(samples))
    }

    /// A strap that never pairs
    pub fn unreachable(label: &str, cause: &str) -> Self {
        Self::with_signal(label, SimulationSettings::default(), Signal::Unreachable(cause.to_string()))
    }

    fn with_signal(label: &str, mut settings: SimulationSettings, signal: Signal) -> Self {
        settings.interval = settings.interval.max(MIN_INTERVAL);
        Self {
            label: label.to_string(),
            status: StreamStatus::Disconnected,
            settings,
            signal,
            session: None,
        }
    }
}

/// Synthetic bpm at `elapsed` into the session
fn synthetic_bpm(settings: &SimulationSettings, elapsed: Duration, noise: f64) -> u16 {
    let phase = 2.0 * PI * elapsed.as_secs_f64() / settings.cycle.as_secs_f64().max(1e-3);
    // 0 at rest, 1 at peak effort
    let effort = 0.5 - 0.5 * phase.cos();
    let bpm = settings.resting_bpm + (settings.peak_bpm - settings.resting_bpm) * effort + noise;
    bpm.round().clamp(30.0, 240.0) as u16
}

async fn run_synthetic(settings: SimulationSettings, seed: Option<u64>, tx: mpsc::Sender<u16>) {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let noise = Normal::new(0.0, settings.noise_bpm.max(0.0)).ok();
    let mut ticker = tokio::time::interval(settings.interval);
    let mut elapsed = Duration::ZERO;

    loop {
        ticker.tick().await;
        let jitter = noise.map(|n| n.sample(&mut rng)).unwrap_or(0.0);
        if tx.send(synthetic_bpm(&settings, elapsed, jitter)).await.is_err() {
            break;
        }
        elapsed += settings.interval;
    }
}

async fn run_scripted(samples: Vec<u16>, interval: Duration, tx: mpsc::Sender<u16>) {
    let mut ticker = tokio::time::interval(interval);
    for bpm in samples {
        ticker.tick().await;
        if tx.send(bpm).await.is_err() {
            break;
        }
    }
}

#[async_trait]
impl HeartRateStream for SimulatedHeartRate {
    fn label(&self) -> &str {
        &self.label
    }

    fn status(&self) -> StreamStatus {
        self.status
    }

    async fn subscribe(&mut self) -> Result<Subscription> {
        if let Some((_, task)) = self.session.take() {
            task.abort();
        }

        let (tx, samples) = mpsc::channel(SAMPLE_BUFFER);
        let task = match self.signal.clone() {
            Signal::Unreachable(cause) => {
                self.status = StreamStatus::Error;
                return Err(WearablesError::Connection(cause));
            }
            Signal::Synthetic { seed } => tokio::spawn(run_synthetic(self.settings, seed, tx)),
            Signal::Scripted(values) => tokio::spawn(run_scripted(values, self.settings.interval, tx)),
        };

        let handle = SubscriptionHandle::next();
        self.session = Some((handle, task));
        self.status = StreamStatus::Streaming;
        debug!("Simulated strap {} streaming", self.label);

        Ok(Subscription { handle, samples })
    }

    async fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Result<()> {
        if self.session.as_ref().map(|(h, _)| *h) != Some(handle) {
            return Ok(());
        }
        if let Some((_, task)) = self.session.take() {
            task.abort();
        }
        self.status = StreamStatus::Disconnected;
        Ok(())
    }
}

/// Creates synthetic streams with shared settings
pub struct SimulatedStreamFactory {
    settings: SimulationSettings,
}

impl SimulatedStreamFactory {
    pub fn new(settings: SimulationSettings) -> Self {
        Self { settings }
    }
}

impl StreamFactory for SimulatedStreamFactory {
    fn create(&self, label: &str) -> Box<dyn HeartRateStream> {
        Box::new(SimulatedHeartRate::new(label, self.settings))
    }
}
