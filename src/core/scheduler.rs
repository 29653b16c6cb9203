// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/squadpulse

//! Session clock - fixed-tick zone-time accrual

use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::event_bus::{EventBus, WearableEvent};
use crate::error::{Result, WearablesError};
use crate::roster::RosterStore;
use crate::sensors::DeviceManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockState {
    Idle,
    Running,
}

struct ClockInner {
    state: ClockState,
    generation: u64,
    ticks: u64,
    task: Option<JoinHandle<()>>,
}

/// Drives zone-time accrual while a monitoring session is active.
///
/// Every tick credits one second to the zone of each athlete's latest
/// sample, whatever the real spacing between ticks. Ticks run under the
/// clock lock and `stop` takes the same lock, so no tick lands after `stop`
/// has returned.
pub struct SessionClock {
    inner: Arc<Mutex<ClockInner>>,
    roster: Arc<RosterStore>,
    devices: Arc<DeviceManager>,
    events: Arc<EventBus>,
    period: Duration,
}

impl SessionClock {
    pub fn new(roster: Arc<RosterStore>, devices: Arc<DeviceManager>, events: Arc<EventBus>, period: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner {
                state: ClockState::Idle,
                generation: 0,
                ticks: 0,
                task: None,
            })),
            roster,
            devices,
            events,
            period: period.max(Duration::from_millis(1)),
        }
    }

    /// Begin ticking. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state == ClockState::Running {
            debug!("Session start ignored: already running");
            return Err(WearablesError::SessionAlreadyActive);
        }

        inner.generation += 1;
        inner.state = ClockState::Running;

        let generation = inner.generation;
        let shared = self.inner.clone();
        let roster = self.roster.clone();
        let period = self.period;
        inner.task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !tick(&shared, generation, &roster) {
                    break;
                }
            }
        }));
        drop(inner);

        self.events.publish(WearableEvent::SessionStarted);
        info!("Monitoring session started (tick every {:?})", self.period);
        Ok(())
    }

    /// End the session and release every device. Stopping while idle is a no-op.
    pub async fn stop(&self) {
        let task = {
            let mut inner = self.inner.lock();
            if inner.state == ClockState::Idle {
                return;
            }
            inner.state = ClockState::Idle;
            inner.task.take()
        };
        if let Some(task) = task {
            task.abort();
        }

        self.events.publish(WearableEvent::SessionEnded);
        let released = self.devices.disconnect_all().await;
        info!("Monitoring session ended, {} devices released", released);
    }

    pub fn state(&self) -> ClockState {
        self.inner.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == ClockState::Running
    }

    /// Ticks applied since the clock was created
    pub fn ticks(&self) -> u64 {
        self.inner.lock().ticks
    }
}

impl Drop for SessionClock {
    fn drop(&mut self) {
        if let Some(task) = self.inner.lock().task.take() {
            task.abort();
        }
    }
}

/// Apply one tick if the session that scheduled it is still running
fn tick(inner: &Mutex<ClockInner>, generation: u64, roster: &RosterStore) -> bool {
    let mut inner = inner.lock();
    if inner.state != ClockState::Running || inner.generation != generation {
        return false;
    }
    roster.accrue_tick();
    inner.ticks += 1;
    true
}
