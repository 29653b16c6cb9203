// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/squadpulse

//! An athlete's own devices, one card per vendor

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::sensors::{HeartRateStream, StreamFactory, SubscriptionHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vendor {
    Polar,
    Garmin,
    Oura,
    Whoop,
}

impl Vendor {
    pub const ALL: [Vendor; 4] = [Vendor::Polar, Vendor::Garmin, Vendor::Oura, Vendor::Whoop];

    /// Case-insensitive vendor lookup
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(value.trim()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Vendor::Polar => "Polar",
            Vendor::Garmin => "Garmin",
            Vendor::Oura => "Oura",
            Vendor::Whoop => "Whoop",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    #[default]
    Waiting,
    Connecting,
    Connected { device: String },
    Failed { cause: String },
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Waiting => write!(f, "Waiting for connection..."),
            DeviceStatus::Connecting => write!(f, "Connecting..."),
            DeviceStatus::Connected { device } => write!(f, "Connected: {}", device),
            DeviceStatus::Failed { cause } => write!(f, "Error: {}", cause),
        }
    }
}

/// What one vendor card shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCard {
    pub vendor: Vendor,
    pub status: DeviceStatus,
    pub last_bpm: Option<u16>,
}

#[derive(Default)]
struct Slot {
    status: DeviceStatus,
    last_bpm: Option<u16>,
    link: Option<(Box<dyn HeartRateStream>, SubscriptionHandle, JoinHandle<()>)>,
}

/// Personal device panel. Samples here never touch the team roster.
pub struct PersonalPanel {
    factory: Arc<dyn StreamFactory>,
    slots: Arc<Mutex<HashMap<Vendor, Slot>>>,
}

impl PersonalPanel {
    pub fn new(factory: Arc<dyn StreamFactory>) -> Self {
        Self {
            factory,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Pair a device for `vendor`, replacing any earlier one
    pub async fn connect(&self, vendor: Vendor) -> Result<()> {
        let previous = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(vendor).or_default();
            slot.status = DeviceStatus::Connecting;
            slot.link.take()
        };
        if let Some(link) = previous {
            release(vendor, link).await;
        }

        let mut stream = self.factory.create(vendor.name());
        let subscription = match stream.subscribe().await {
            Ok(sub) => sub,
            Err(e) => {
                warn!("{} pairing failed: {}", vendor, e);
                self.slots.lock().entry(vendor).or_default().status = DeviceStatus::Failed { cause: e.to_string() };
                return Err(e);
            }
        };

        let device = match stream.label() {
            "" => "HR Sensor".to_string(),
            name => name.to_string(),
        };
        info!("{} paired with {}", vendor, device);

        let handle = subscription.handle;
        let mut samples = subscription.samples;
        let slots = self.slots.clone();
        let pump = tokio::spawn(async move {
            while let Some(bpm) = samples.recv().await {
                if let Some(slot) = slots.lock().get_mut(&vendor) {
                    slot.last_bpm = Some(bpm);
                }
            }
            debug!("{} stream ended", vendor);
        });

        let mut slots = self.slots.lock();
        let slot = slots.entry(vendor).or_default();
        slot.status = DeviceStatus::Connected { device };
        slot.link = Some((stream, handle, pump));
        Ok(())
    }

    pub fn card(&self, vendor: Vendor) -> DeviceCard {
        let slots = self.slots.lock();
        match slots.get(&vendor) {
            Some(slot) => DeviceCard {
                vendor,
                status: slot.status.clone(),
                last_bpm: slot.last_bpm,
            },
            None => DeviceCard {
                vendor,
                status: DeviceStatus::Waiting,
                last_bpm: None,
            },
        }
    }

    /// All vendor cards in display order
    pub fn cards(&self) -> Vec<DeviceCard> {
        Vendor::ALL.iter().map(|v| self.card(*v)).collect()
    }

    pub async fn disconnect_all(&self) {
        let links: Vec<_> = self
            .slots
            .lock()
            .iter_mut()
            .filter_map(|(vendor, slot)| slot.link.take().map(|link| (*vendor, link)))
            .collect();
        for (vendor, link) in links {
            release(vendor, link).await;
        }
    }
}

impl Drop for PersonalPanel {
    fn drop(&mut self) {
        for slot in self.slots.lock().values() {
            if let Some((_, _, pump)) = &slot.link {
                pump.abort();
            }
        }
    }
}

async fn release(vendor: Vendor, link: (Box<dyn HeartRateStream>, SubscriptionHandle, JoinHandle<()>)) {
    let (mut stream, handle, pump) = link;
    pump.abort();
    if let Err(e) = stream.unsubscribe(handle).await {
        warn!("Releasing {} failed: {}", vendor, e);
    }
}
