// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/squadpulse

//! Event bus for UI consumers

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::roster::AthleteId;
use crate::zones::Zone;

/// Something a view may want to re-render for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WearableEvent {
    SampleRecorded { athlete_id: AthleteId, bpm: u16, avg_hr: u16 },
    ZoneTick { accrued: Vec<(AthleteId, Option<Zone>)> },
    AthleteConnected { athlete_id: AthleteId },
    AthleteDisconnected { athlete_id: AthleteId },
    ConnectionFailed { athlete_id: Option<AthleteId>, cause: String },
    PersistenceFailed { cause: String },
    SessionStarted,
    SessionEnded,
}

/// Sequenced event wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: WearableEvent,
}

/// Broadcast pub/sub. Publishing never blocks and never fails; events are
/// dropped when nobody listens.
pub struct EventBus {
    event_tx: broadcast::Sender<Event>,
    event_counter: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));

        Self {
            event_tx,
            event_counter: AtomicU64::new(0),
        }
    }

    pub fn publish_sample(&self, athlete_id: &AthleteId, bpm: u16, avg_hr: u16) {
        self.publish(WearableEvent::SampleRecorded {
            athlete_id: athlete_id.clone(),
            bpm,
            avg_hr,
        });
    }

    pub fn publish_tick(&self, accrued: &[(AthleteId, Option<Zone>)]) {
        self.publish(WearableEvent::ZoneTick {
            accrued: accrued.to_vec(),
        });
    }

    pub fn publish_connected(&self, athlete_id: &AthleteId) {
        self.publish(WearableEvent::AthleteConnected {
            athlete_id: athlete_id.clone(),
        });
    }

    pub fn publish_disconnected(&self, athlete_id: &AthleteId) {
        self.publish(WearableEvent::AthleteDisconnected {
            athlete_id: athlete_id.clone(),
        });
    }

    pub fn publish_connection_failure(&self, athlete_id: Option<&AthleteId>, cause: &str) {
        self.publish(WearableEvent::ConnectionFailed {
            athlete_id: athlete_id.cloned(),
            cause: cause.to_string(),
        });
    }

    pub fn publish_persistence_failure(&self, cause: &str) {
        self.publish(WearableEvent::PersistenceFailed {
            cause: cause.to_string(),
        });
    }

    pub fn publish(&self, payload: WearableEvent) {
        let id = self.event_counter.fetch_add(1, Ordering::Relaxed);
        let event = Event {
            id,
            timestamp: Utc::now(),
            payload,
        };
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
