// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/squadpulse

//! Roster state store - tracked athletes and their rolling metrics

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::EventBus;
use crate::db::{RosterPersistence, SnapshotWriter};
use crate::error::{Result, WearablesError};
use crate::zones::{Zone, ZoneBoundaries};

/// Weight kept from the previous average on each new sample
const AVG_RETAIN: f64 = 0.8;

/// Opaque athlete identifier, stable for the lifetime of the roster entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AthleteId(String);

impl AthleteId {
    pub fn generate() -> Self {
        Self(format!("p_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AthleteId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AthleteId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for AthleteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Seconds accumulated in each zone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInZones {
    pub z1: u64,
    pub z2: u64,
    pub z3: u64,
    pub z4: u64,
}

impl TimeInZones {
    pub fn get(&self, zone: Zone) -> u64 {
        match zone {
            Zone::Z1 => self.z1,
            Zone::Z2 => self.z2,
            Zone::Z3 => self.z3,
            Zone::Z4 => self.z4,
        }
    }

    pub fn increment(&mut self, zone: Zone) {
        let counter = match zone {
            Zone::Z1 => &mut self.z1,
            Zone::Z2 => &mut self.z2,
            Zone::Z3 => &mut self.z3,
            Zone::Z4 => &mut self.z4,
        };
        *counter = counter.saturating_add(1);
    }

    pub fn total(&self) -> u64 {
        self.z1 + self.z2 + self.z3 + self.z4
    }
}

/// A tracked athlete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Athlete {
    pub id: AthleteId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(rename = "sensorId", default, skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<String>,
    #[serde(default)]
    pub connected: bool,
    #[serde(rename = "currentHR", default, skip_serializing_if = "Option::is_none")]
    pub current_hr: Option<u16>,
    #[serde(rename = "avgHR", default, skip_serializing_if = "Option::is_none")]
    pub avg_hr: Option<u16>,
    #[serde(rename = "maxHR", default, skip_serializing_if = "Option::is_none")]
    pub max_hr: Option<u16>,
    #[serde(rename = "zonesBoundaries", default)]
    pub zone_boundaries: ZoneBoundaries,
    #[serde(rename = "timeInZones", default)]
    pub time_in_zones: TimeInZones,
}

impl Athlete {
    /// Zone of the latest sample; an absent sample counts as 0 bpm
    pub fn current_zone(&self) -> Option<Zone> {
        self.zone_boundaries.classify(self.current_hr.unwrap_or(0))
    }

    fn apply_sample(&mut self, bpm: u16) {
        self.current_hr = Some(bpm);
        self.avg_hr = Some(smoothed_average(self.avg_hr, bpm));
    }
}

/// Exponential average: the first sample (or a zero average) seeds it,
/// later samples move it by 20%.
pub fn smoothed_average(previous: Option<u16>, bpm: u16) -> u16 {
    match previous {
        Some(avg) if avg > 0 => {
            let next = f64::from(avg) * AVG_RETAIN + f64::from(bpm) * (1.0 - AVG_RETAIN);
            next.round() as u16
        }
        _ => bpm,
    }
}

/// Input for adding an athlete
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AthleteConfig {
    pub name: String,
    pub nickname: Option<String>,
    pub sensor_id: Option<String>,
    pub max_hr: Option<u16>,
    pub zone_boundaries: Option<ZoneBoundaries>,
}

impl AthleteConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    pub fn with_sensor_id(mut self, sensor_id: impl Into<String>) -> Self {
        self.sensor_id = Some(sensor_id.into());
        self
    }

    pub fn with_max_hr(mut self, max_hr: u16) -> Self {
        self.max_hr = Some(max_hr);
        self
    }

    pub fn with_zones(mut self, zones: ZoneBoundaries) -> Self {
        self.zone_boundaries = Some(zones);
        self
    }

    /// Reject configs that cannot become a roster entry
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(WearablesError::Validation("athlete name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Owns the roster.
///
/// Every operation holds the roster lock for its whole duration and encodes
/// the snapshot before releasing it, so snapshots queue in mutation order.
/// The write itself happens on the snapshot writer; a failed write is
/// logged and reported on the event bus but never rolls back the in-memory
/// change.
pub struct RosterStore {
    athletes: Mutex<Vec<Athlete>>,
    writer: SnapshotWriter,
    default_zones: ZoneBoundaries,
    events: Arc<EventBus>,
}

impl RosterStore {
    pub fn new(persistence: RosterPersistence, default_zones: ZoneBoundaries, events: Arc<EventBus>) -> Self {
        Self {
            athletes: Mutex::new(Vec::new()),
            writer: SnapshotWriter::spawn(persistence, events.clone()),
            default_zones,
            events,
        }
    }

    /// Build a store from the persisted snapshot.
    ///
    /// No stream survives a restart, so restored athletes start disconnected.
    pub fn restore(persistence: RosterPersistence, default_zones: ZoneBoundaries, events: Arc<EventBus>) -> Self {
        let mut athletes = persistence.load();
        let mut seen = std::collections::HashSet::new();
        athletes.retain(|a| {
            let fresh = seen.insert(a.id.clone());
            if !fresh {
                warn!("Dropping duplicate athlete id {} from snapshot", a.id);
            }
            fresh
        });
        for athlete in &mut athletes {
            athlete.connected = false;
        }
        info!("Restored roster with {} athletes", athletes.len());

        Self {
            athletes: Mutex::new(athletes),
            writer: SnapshotWriter::spawn(persistence, events.clone()),
            default_zones,
            events,
        }
    }

    pub fn add_athlete(&self, config: AthleteConfig) -> Result<Athlete> {
        config.validate()?;

        let zone_boundaries = config.zone_boundaries.unwrap_or(self.default_zones);
        let athlete = Athlete {
            id: AthleteId::generate(),
            name: config.name,
            nickname: config.nickname,
            sensor_id: config.sensor_id,
            connected: false,
            current_hr: None,
            avg_hr: None,
            max_hr: config.max_hr.or(Some(zone_boundaries.z4.max)),
            zone_boundaries,
            time_in_zones: TimeInZones::default(),
        };

        let mut athletes = self.athletes.lock();
        athletes.push(athlete.clone());
        let seq = self.persist(&athletes);
        drop(athletes);
        self.writer.wait_for(seq);

        info!("Added athlete {} ({})", athlete.name, athlete.id);
        Ok(athlete)
    }

    /// Apply a bpm sample and return the new average
    pub fn record_sample(&self, id: &AthleteId, bpm: u16) -> Result<u16> {
        let mut athletes = self.athletes.lock();
        let athlete = find_mut(&mut athletes, id)?;
        athlete.apply_sample(bpm);
        let avg = athlete.avg_hr.unwrap_or(bpm);
        self.persist(&athletes);
        drop(athletes);

        self.events.publish_sample(id, bpm, avg);
        Ok(avg)
    }

    /// Add one second to `zone`; `None` leaves the counters untouched
    pub fn increment_zone_time(&self, id: &AthleteId, zone: Option<Zone>) -> Result<()> {
        let mut athletes = self.athletes.lock();
        let athlete = find_mut(&mut athletes, id)?;
        let Some(zone) = zone else {
            return Ok(());
        };
        athlete.time_in_zones.increment(zone);
        self.persist(&athletes);
        Ok(())
    }

    /// One session tick: classify every athlete's latest sample and accrue.
    ///
    /// Runs under a single lock so a tick is never observed half-applied.
    pub fn accrue_tick(&self) -> Vec<(AthleteId, Option<Zone>)> {
        let mut athletes = self.athletes.lock();
        let mut accrued = Vec::with_capacity(athletes.len());
        let mut changed = false;

        for athlete in athletes.iter_mut() {
            let zone = athlete.current_zone();
            if let Some(zone) = zone {
                athlete.time_in_zones.increment(zone);
                changed = true;
            }
            accrued.push((athlete.id.clone(), zone));
        }

        if changed {
            self.persist(&athletes);
        }
        drop(athletes);

        self.events.publish_tick(&accrued);
        accrued
    }

    pub fn set_connected(&self, id: &AthleteId, connected: bool) -> Result<()> {
        let mut athletes = self.athletes.lock();
        let athlete = find_mut(&mut athletes, id)?;
        if athlete.connected == connected {
            return Ok(());
        }
        athlete.connected = connected;
        self.persist(&athletes);
        drop(athletes);

        if connected {
            self.events.publish_connected(id);
        } else {
            self.events.publish_disconnected(id);
        }
        Ok(())
    }

    /// Clear the connected flag of every athlete not in `live`
    pub fn mark_disconnected_except(&self, live: &HashSet<AthleteId>) {
        let mut athletes = self.athletes.lock();
        let mut cleared = Vec::new();
        for athlete in athletes.iter_mut().filter(|a| a.connected && !live.contains(&a.id)) {
            athlete.connected = false;
            cleared.push(athlete.id.clone());
        }
        if !cleared.is_empty() {
            self.persist(&athletes);
        }
        drop(athletes);

        for id in &cleared {
            self.events.publish_disconnected(id);
        }
    }

    /// Snapshot of the roster in insertion order
    pub fn list(&self) -> Vec<Athlete> {
        self.athletes.lock().clone()
    }

    pub fn get(&self, id: &AthleteId) -> Option<Athlete> {
        self.athletes.lock().iter().find(|a| &a.id == id).cloned()
    }

    pub fn contains(&self, id: &AthleteId) -> bool {
        self.athletes.lock().iter().any(|a| &a.id == id)
    }

    pub fn len(&self) -> usize {
        self.athletes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.athletes.lock().is_empty()
    }

    /// Block until every queued snapshot has been written
    pub fn flush(&self) {
        self.writer.flush();
    }

    /// Queue a snapshot of `athletes`; returns its sequence number, or 0
    /// when it could not be encoded
    fn persist(&self, athletes: &[Athlete]) -> u64 {
        match RosterPersistence::encode(athletes) {
            Ok(json) => self.writer.submit(json),
            Err(e) => {
                warn!("Roster snapshot for '{}' not encoded: {}", self.writer.key(), e);
                self.events.publish_persistence_failure(&e.to_string());
                0
            }
        }
    }
}

fn find_mut<'a>(athletes: &'a mut [Athlete], id: &AthleteId) -> Result<&'a mut Athlete> {
    athletes
        .iter_mut()
        .find(|a| &a.id == id)
        .ok_or_else(|| WearablesError::NotFound(id.to_string()))
}
