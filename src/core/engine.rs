// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/squadpulse

//! Main wearables engine - wires roster, devices and session clock

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::warn;

use super::event_bus::{Event, EventBus};
use super::scheduler::SessionClock;
use super::SessionSummary;
use crate::config::Config;
use crate::db::{self, KeyValueStore, RosterPersistence};
use crate::error::Result;
use crate::roster::{Athlete, AthleteConfig, AthleteId, RosterStore};
use crate::sensors::{self, DeviceManager, StreamFactory, SubscriptionHandle};
use crate::views::TeamRow;

/// The coach-facing wearables core
pub struct Engine {
    pub config: Arc<Config>,
    events: Arc<EventBus>,
    roster: Arc<RosterStore>,
    devices: Arc<DeviceManager>,
    clock: SessionClock,
    factory: Arc<dyn StreamFactory>,
}

impl Engine {
    /// Build the engine on an explicit store and stream source, restoring
    /// the persisted roster.
    pub fn new(config: Config, store: Arc<dyn KeyValueStore>, factory: Arc<dyn StreamFactory>) -> Self {
        let config = Arc::new(config);
        let events = Arc::new(EventBus::new(config.events.capacity));
        let persistence = RosterPersistence::new(store, config.storage.roster_key.clone());
        let roster = Arc::new(RosterStore::restore(persistence, config.zones.boundaries(), events.clone()));
        let devices = Arc::new(DeviceManager::new(roster.clone(), events.clone()));
        let clock = SessionClock::new(
            roster.clone(),
            devices.clone(),
            events.clone(),
            Duration::from_millis(config.session.tick_interval_ms),
        );

        Self {
            config,
            events,
            roster,
            devices,
            clock,
            factory,
        }
    }

    /// Open the configured store and the configured stream source
    pub async fn open(config: Config) -> Result<Self> {
        let store = db::open_store(&config.storage)?;
        let factory = sensors::stream_factory(&config.devices).await?;
        Ok(Self::new(config, store, factory))
    }

    pub fn start_session(&self) -> Result<()> {
        self.clock.start()
    }

    /// Stop the clock, release every device and wait for the roster
    /// snapshot to reach storage
    pub async fn end_session(&self) {
        self.clock.stop().await;
        let roster = self.roster.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || roster.flush()).await {
            warn!("Waiting for roster snapshot failed: {}", e);
        }
    }

    /// Pair a strap and add the player once it streams
    pub async fn add_player(&self, config: AthleteConfig) -> Result<Athlete> {
        self.devices.pair(config, self.factory.as_ref()).await
    }

    pub async fn reconnect(&self, id: &AthleteId) -> Result<SubscriptionHandle> {
        self.devices.connect(id, self.factory.as_ref()).await
    }

    pub fn players(&self) -> Vec<Athlete> {
        self.roster.list()
    }

    pub fn team_rows(&self) -> Vec<TeamRow> {
        let default_max = self.config.roster.default_max_hr;
        self.roster
            .list()
            .iter()
            .map(|a| TeamRow::from_athlete(a, default_max))
            .collect()
    }

    pub fn summary(&self) -> SessionSummary {
        let athletes = self.roster.list();
        SessionSummary {
            session_active: self.clock.is_running(),
            athletes: athletes.len(),
            connected: athletes.iter().filter(|a| a.connected).count(),
            ticks: self.clock.ticks(),
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe_events()
    }

    pub fn roster(&self) -> &Arc<RosterStore> {
        &self.roster
    }

    pub fn devices(&self) -> &Arc<DeviceManager> {
        &self.devices
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }
}
