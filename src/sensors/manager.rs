// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/squadpulse

//! Device lifecycle manager - pairs streams with roster entries

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::traits::{HeartRateStream, StreamFactory, Subscription, SubscriptionHandle};
use crate::core::EventBus;
use crate::error::{Result, WearablesError};
use crate::roster::{Athlete, AthleteConfig, AthleteId, RosterStore};

struct LiveConnection {
    generation: u64,
    handle: SubscriptionHandle,
    stream: Box<dyn HeartRateStream>,
    pump: JoinHandle<()>,
}

type ConnectionMap = Arc<Mutex<HashMap<AthleteId, LiveConnection>>>;

/// Owns every live stream, keyed by athlete.
///
/// An athlete is flagged connected exactly while an entry exists here.
pub struct DeviceManager {
    roster: Arc<RosterStore>,
    events: Arc<EventBus>,
    connections: ConnectionMap,
    generation: AtomicU64,
}

impl DeviceManager {
    pub fn new(roster: Arc<RosterStore>, events: Arc<EventBus>) -> Self {
        Self {
            roster,
            events,
            connections: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Add-player flow: pair first, commit the roster entry only once the
    /// stream is live.
    pub async fn pair(&self, config: AthleteConfig, factory: &dyn StreamFactory) -> Result<Athlete> {
        config.validate()?;

        let mut stream = factory.create(&config.name);
        let subscription = match stream.subscribe().await {
            Ok(sub) => sub,
            Err(e) => {
                warn!("Pairing for {} failed: {}", config.name, e);
                self.events.publish_connection_failure(None, &e.to_string());
                return Err(e);
            }
        };

        let athlete = match self.roster.add_athlete(config) {
            Ok(athlete) => athlete,
            Err(e) => {
                if let Err(close) = stream.unsubscribe(subscription.handle).await {
                    debug!("Teardown after rejected athlete failed: {}", close);
                }
                return Err(e);
            }
        };

        self.install(&athlete.id, stream, subscription)?;
        info!("Paired {} ({})", athlete.name, athlete.id);
        self.roster
            .get(&athlete.id)
            .ok_or_else(|| WearablesError::NotFound(athlete.id.to_string()))
    }

    /// (Re)connect an athlete already on the roster
    pub async fn connect(&self, id: &AthleteId, factory: &dyn StreamFactory) -> Result<SubscriptionHandle> {
        let athlete = self
            .roster
            .get(id)
            .ok_or_else(|| WearablesError::NotFound(id.to_string()))?;

        let mut stream = factory.create(athlete.sensor_id.as_deref().unwrap_or(&athlete.name));
        let subscription = match stream.subscribe().await {
            Ok(sub) => sub,
            Err(e) => {
                warn!("Connecting {} failed: {}", id, e);
                self.events.publish_connection_failure(Some(id), &e.to_string());
                return Err(e);
            }
        };

        let handle = subscription.handle;
        self.install(id, stream, subscription)?;
        info!("Connected {} ({})", athlete.name, id);
        Ok(handle)
    }

    /// Register a live stream for `id`, releasing any stream it replaces.
    ///
    /// The connected flag only changes under the connections lock, so it
    /// always agrees with the map.
    fn install(&self, id: &AthleteId, stream: Box<dyn HeartRateStream>, subscription: Subscription) -> Result<()> {
        // Insert under the lock that the pump takes on exit, so a stream that
        // ends immediately still finds its own entry to remove.
        let mut connections = self.connections.lock();
        self.roster.set_connected(id, true)?;

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let Subscription { handle, mut samples } = subscription;
        let roster = self.roster.clone();
        let map = self.connections.clone();
        let athlete = id.clone();
        let pump = tokio::spawn(async move {
            while let Some(bpm) = samples.recv().await {
                if let Err(e) = roster.record_sample(&athlete, bpm) {
                    warn!("Sample for {} rejected: {}", athlete, e);
                    break;
                }
            }

            let ended = {
                let mut connections = map.lock();
                match connections.get(&athlete) {
                    Some(conn) if conn.generation == generation => {
                        if let Err(e) = roster.set_connected(&athlete, false) {
                            debug!("Marking {} disconnected: {}", athlete, e);
                        }
                        connections.remove(&athlete)
                    }
                    _ => None,
                }
            };
            if let Some(conn) = ended {
                info!("Stream for {} ended", athlete);
                let mut stream = conn.stream;
                if let Err(e) = stream.unsubscribe(conn.handle).await {
                    debug!("Releasing ended stream for {}: {}", athlete, e);
                }
            }
        });

        let replaced = connections.insert(
            id.clone(),
            LiveConnection {
                generation,
                handle,
                stream,
                pump,
            },
        );
        drop(connections);

        if let Some(previous) = replaced {
            debug!("Replacing live stream for {}", id);
            tokio::spawn(teardown(id.clone(), previous));
        }
        Ok(())
    }

    /// Tear down one athlete's stream
    pub async fn disconnect(&self, id: &AthleteId) -> Result<()> {
        let conn = self.connections.lock().remove(id);
        if let Some(conn) = conn {
            teardown(id.clone(), conn).await;
        }

        // A pairing that landed during teardown keeps its flag
        let connections = self.connections.lock();
        if connections.contains_key(id) {
            return Ok(());
        }
        self.roster.set_connected(id, false)
    }

    /// Tear down every live stream, then clear the flag of every athlete
    /// left without one.
    ///
    /// A failing teardown is logged and does not stop the rest. Returns the
    /// number of streams released.
    pub async fn disconnect_all(&self) -> usize {
        let drained: Vec<_> = self.connections.lock().drain().collect();
        let count = drained.len();

        for (id, conn) in drained {
            teardown(id, conn).await;
        }

        {
            let connections = self.connections.lock();
            let live: HashSet<AthleteId> = connections.keys().cloned().collect();
            self.roster.mark_disconnected_except(&live);
        }
        if count > 0 {
            info!("Disconnected {} devices", count);
        }
        count
    }

    pub fn is_connected(&self, id: &AthleteId) -> bool {
        self.connections.lock().contains_key(id)
    }

    pub fn connected_count(&self) -> usize {
        self.connections.lock().len()
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        for conn in self.connections.lock().values() {
            conn.pump.abort();
        }
    }
}

async fn teardown(id: AthleteId, conn: LiveConnection) {
    conn.pump.abort();
    let mut stream = conn.stream;
    if let Err(e) = stream.unsubscribe(conn.handle).await {
        warn!("Teardown of {} ({}) failed: {}", id, stream.label(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, RosterPersistence};
    use crate::sensors::ble::fake::{FailAt, FakePlatform};
    use crate::sensors::ble::BleStreamFactory;
    use crate::sensors::heart_rate::encode_measurement;
    use crate::sensors::simulator::SimulatedHeartRate;
    use crate::sensors::StreamStatus;
    use crate::zones::ZoneBoundaries;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn setup() -> (Arc<RosterStore>, DeviceManager) {
        let events = Arc::new(EventBus::new(256));
        let roster = Arc::new(RosterStore::new(
            RosterPersistence::new(Arc::new(MemoryStore::new()), "players"),
            ZoneBoundaries::default(),
            events.clone(),
        ));
        let manager = DeviceManager::new(roster.clone(), events);
        (roster, manager)
    }

    fn scripted(samples: Vec<u16>) -> impl Fn(&str) -> Box<dyn HeartRateStream> {
        move |label: &str| -> Box<dyn HeartRateStream> {
            Box::new(SimulatedHeartRate::scripted(label, samples.clone(), Duration::from_secs(1)))
        }
    }

    fn unreachable(label: &str) -> Box<dyn HeartRateStream> {
        Box::new(SimulatedHeartRate::unreachable(label, "user cancelled pairing"))
    }

    /// Stream that pairs but cannot be torn down cleanly
    struct StubbornStrap {
        status: StreamStatus,
        tx: Option<tokio::sync::mpsc::Sender<u16>>,
    }

    #[async_trait]
    impl HeartRateStream for StubbornStrap {
        fn label(&self) -> &str {
            "stubborn"
        }

        fn status(&self) -> StreamStatus {
            self.status
        }

        async fn subscribe(&mut self) -> Result<Subscription> {
            let (tx, samples) = tokio::sync::mpsc::channel(4);
            self.tx = Some(tx);
            self.status = StreamStatus::Streaming;
            Ok(Subscription {
                handle: SubscriptionHandle::next(),
                samples,
            })
        }

        async fn unsubscribe(&mut self, _handle: SubscriptionHandle) -> Result<()> {
            Err(WearablesError::Connection("GATT server busy".to_string()))
        }
    }

    fn stubborn(_label: &str) -> Box<dyn HeartRateStream> {
        Box::new(StubbornStrap {
            status: StreamStatus::Disconnected,
            tx: None,
        })
    }

    /// Stream whose teardown takes `delay` and records that it happened
    struct SlowStrap {
        delay: Duration,
        released: Arc<AtomicBool>,
        tx: Option<tokio::sync::mpsc::Sender<u16>>,
    }

    #[async_trait]
    impl HeartRateStream for SlowStrap {
        fn label(&self) -> &str {
            "slow"
        }

        fn status(&self) -> StreamStatus {
            if self.tx.is_some() {
                StreamStatus::Streaming
            } else {
                StreamStatus::Disconnected
            }
        }

        async fn subscribe(&mut self) -> Result<Subscription> {
            let (tx, samples) = tokio::sync::mpsc::channel(4);
            self.tx = Some(tx);
            Ok(Subscription {
                handle: SubscriptionHandle::next(),
                samples,
            })
        }

        async fn unsubscribe(&mut self, _handle: SubscriptionHandle) -> Result<()> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.tx = None;
            self.released.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn slow_strap(delay: Duration, released: Arc<AtomicBool>) -> Box<dyn HeartRateStream> {
        Box::new(SlowStrap {
            delay,
            released,
            tx: None,
        })
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pair_commits_connected_athlete() {
        let (roster, manager) = setup();
        let factory = scripted(vec![120, 130]);

        let alice = manager.pair(AthleteConfig::new("Alice"), &factory).await.unwrap();
        assert!(alice.connected);
        assert!(manager.is_connected(&alice.id));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        settle().await;
        let a = roster.get(&alice.id).unwrap();
        assert_eq!(a.current_hr, Some(130));
        assert_eq!(a.avg_hr, Some(122));
    }

    #[tokio::test]
    async fn test_failed_pairing_creates_nothing() {
        let (roster, manager) = setup();

        let err = manager.pair(AthleteConfig::new("Bob"), &unreachable).await.unwrap_err();
        assert!(matches!(err, WearablesError::Connection(_)));
        assert!(roster.is_empty());
        assert_eq!(manager.connected_count(), 0);
    }

    #[tokio::test]
    async fn test_pair_validates_before_pairing() {
        let (roster, manager) = setup();
        let err = manager.pair(AthleteConfig::new(""), &unreachable).await.unwrap_err();
        assert!(matches!(err, WearablesError::Validation(_)));
        assert!(roster.is_empty());
    }

    #[tokio::test]
    async fn test_failure_for_b_does_not_disturb_a() {
        let (roster, manager) = setup();
        let platform = Arc::new(FakePlatform::new(FailAt::Nothing));
        let live = BleStreamFactory::new(platform.clone());

        let a = manager.pair(AthleteConfig::new("A"), &live).await.unwrap();
        let strap = platform.sender().unwrap();
        strap.send(encode_measurement(101)).await.unwrap();
        settle().await;

        let failing = BleStreamFactory::new(Arc::new(FakePlatform::new(FailAt::Service)));
        assert!(manager.pair(AthleteConfig::new("B"), &failing).await.is_err());

        strap.send(encode_measurement(142)).await.unwrap();
        settle().await;

        let list = roster.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, a.id);
        assert_eq!(list[0].current_hr, Some(142));
        assert!(list[0].connected);
    }

    #[tokio::test]
    async fn test_connect_unknown_athlete() {
        let (_, manager) = setup();
        let err = manager
            .connect(&AthleteId::from("p_missing"), &scripted(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, WearablesError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_existing_athlete() {
        let (roster, manager) = setup();
        let a = roster.add_athlete(AthleteConfig::new("Ana").with_sensor_id("H10-9")).unwrap();

        let err = manager.connect(&a.id, &unreachable).await.unwrap_err();
        assert!(matches!(err, WearablesError::Connection(_)));
        assert!(!roster.get(&a.id).unwrap().connected);

        manager.connect(&a.id, &scripted(vec![95; 10])).await.unwrap();
        assert!(roster.get(&a.id).unwrap().connected);
        tokio::time::sleep(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(roster.get(&a.id).unwrap().current_hr, Some(95));
    }

    #[tokio::test]
    async fn test_disconnect_all_with_nothing_connected() {
        let (roster, manager) = setup();
        roster.add_athlete(AthleteConfig::new("Solo")).unwrap();

        assert_eq!(manager.disconnect_all().await, 0);
        assert!(roster.list().iter().all(|a| !a.connected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_all_survives_failing_teardown() {
        let (roster, manager) = setup();
        manager.pair(AthleteConfig::new("Stubborn"), &stubborn).await.unwrap();
        manager.pair(AthleteConfig::new("Fine"), &scripted(vec![100; 100])).await.unwrap();
        assert_eq!(manager.connected_count(), 2);

        assert_eq!(manager.disconnect_all().await, 2);
        assert_eq!(manager.connected_count(), 0);
        assert!(roster.list().iter().all(|a| !a.connected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_end_marks_disconnected() {
        let (roster, manager) = setup();
        let a = manager.pair(AthleteConfig::new("Short"), &scripted(vec![110, 111])).await.unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        settle().await;

        assert!(!manager.is_connected(&a.id));
        let stored = roster.get(&a.id).unwrap();
        assert!(!stored.connected);
        assert_eq!(stored.current_hr, Some(111));
    }

    #[tokio::test]
    async fn test_disconnect_single() {
        let (roster, manager) = setup();
        let platform = Arc::new(FakePlatform::new(FailAt::Nothing));
        let a = manager.pair(AthleteConfig::new("A"), &BleStreamFactory::new(platform.clone())).await.unwrap();

        manager.disconnect(&a.id).await.unwrap();
        assert!(!manager.is_connected(&a.id));
        assert!(!roster.get(&a.id).unwrap().connected);
        assert!(platform.sender().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pairing_during_disconnect_all_stays_connected() {
        let (roster, manager) = setup();
        let manager = Arc::new(manager);
        let released = Arc::new(AtomicBool::new(false));
        let slow = {
            let released = released.clone();
            move |_: &str| slow_strap(Duration::from_secs(2), released.clone())
        };
        let a = manager.pair(AthleteConfig::new("A"), &slow).await.unwrap();

        let teardown = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.disconnect_all().await })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!released.load(Ordering::SeqCst));

        let b = manager.pair(AthleteConfig::new("B"), &scripted(vec![100; 100])).await.unwrap();
        assert_eq!(teardown.await.unwrap(), 1);

        assert!(released.load(Ordering::SeqCst));
        assert!(manager.is_connected(&b.id));
        assert!(roster.get(&b.id).unwrap().connected);
        assert!(!manager.is_connected(&a.id));
        assert!(!roster.get(&a.id).unwrap().connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_releases_replaced_stream() {
        let (roster, manager) = setup();
        let a = roster.add_athlete(AthleteConfig::new("Ana")).unwrap();

        let first_released = Arc::new(AtomicBool::new(false));
        let mut first = slow_strap(Duration::ZERO, first_released.clone());
        let subscription = first.subscribe().await.unwrap();
        manager.install(&a.id, first, subscription).unwrap();

        let second_released = Arc::new(AtomicBool::new(false));
        let mut second = slow_strap(Duration::ZERO, second_released.clone());
        let subscription = second.subscribe().await.unwrap();
        manager.install(&a.id, second, subscription).unwrap();
        settle().await;

        assert!(first_released.load(Ordering::SeqCst));
        assert!(!second_released.load(Ordering::SeqCst));
        assert_eq!(manager.connected_count(), 1);
        assert!(roster.get(&a.id).unwrap().connected);
    }

    #[tokio::test]
    async fn test_disconnect_unknown_athlete() {
        let (_, manager) = setup();
        let err = manager.disconnect(&AthleteId::from("p_missing")).await.unwrap_err();
        assert!(matches!(err, WearablesError::NotFound(_)));
    }
}
