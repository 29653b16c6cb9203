// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/squadpulse

//! Live heart-rate stream over a platform Bluetooth LE capability.
//!
//! The platform (a browser bridge, a native BLE stack) is an external
//! collaborator; this module only consumes the GATT surface below.

use std::sync::Arc;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::heart_rate::{decode_measurement, HEART_RATE_MEASUREMENT, HEART_RATE_SERVICE};
use super::traits::{HeartRateStream, StreamFactory, StreamStatus, Subscription, SubscriptionHandle, SAMPLE_BUFFER};
use crate::error::{Result, WearablesError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BleError {
    #[error("No device offering the requested service was found")]
    DeviceNotFound,

    #[error("Pairing cancelled by user")]
    Cancelled,

    #[error("GATT error: {0}")]
    Gatt(String),

    #[error("Peer disconnected")]
    Disconnected,

    #[error("Bluetooth unavailable: {0}")]
    Unavailable(String),
}

impl From<BleError> for WearablesError {
    fn from(e: BleError) -> Self {
        WearablesError::Connection(e.to_string())
    }
}

/// Request a device offering a service
#[async_trait]
pub trait BlePlatform: Send + Sync {
    async fn request_device(&self, service: Uuid) -> std::result::Result<Box<dyn BleDevice>, BleError>;
}

/// A chosen peripheral
#[async_trait]
pub trait BleDevice: Send + Sync {
    fn name(&self) -> Option<String>;

    fn is_connected(&self) -> bool;

    async fn gatt_connect(&mut self) -> std::result::Result<Box<dyn GattServer>, BleError>;

    async fn disconnect(&mut self) -> std::result::Result<(), BleError>;
}

#[async_trait]
pub trait GattServer: Send + Sync {
    async fn primary_service(&self, service: Uuid) -> std::result::Result<Box<dyn GattService>, BleError>;
}

#[async_trait]
pub trait GattService: Send + Sync {
    async fn characteristic(&self, characteristic: Uuid) -> std::result::Result<Box<dyn GattCharacteristic>, BleError>;
}

#[async_trait]
pub trait GattCharacteristic: Send + Sync {
    /// Start notifications; each received value arrives as raw bytes
    async fn start_notifications(&mut self) -> std::result::Result<mpsc::Receiver<Vec<u8>>, BleError>;

    async fn stop_notifications(&mut self) -> std::result::Result<(), BleError>;
}

struct LiveSession {
    handle: SubscriptionHandle,
    device: Box<dyn BleDevice>,
    characteristic: Box<dyn GattCharacteristic>,
    decoder: JoinHandle<()>,
}

/// Heart-rate stream backed by a strap's Heart Rate Measurement notifications
pub struct BleHeartRateStream {
    label: String,
    platform: Arc<dyn BlePlatform>,
    status: StreamStatus,
    session: Option<LiveSession>,
}

impl BleHeartRateStream {
    pub fn new(label: &str, platform: Arc<dyn BlePlatform>) -> Self {
        Self {
            label: label.to_string(),
            platform,
            status: StreamStatus::Disconnected,
            session: None,
        }
    }

    async fn open(&mut self) -> std::result::Result<(Box<dyn BleDevice>, Box<dyn GattCharacteristic>, mpsc::Receiver<Vec<u8>>), BleError> {
        let mut device = self.platform.request_device(HEART_RATE_SERVICE).await?;
        if let Some(name) = device.name() {
            self.label = name;
        }

        let notifications = async {
            let server = device.gatt_connect().await?;
            let service = server.primary_service(HEART_RATE_SERVICE).await?;
            let mut characteristic = service.characteristic(HEART_RATE_MEASUREMENT).await?;
            let raw = characteristic.start_notifications().await?;
            Ok::<_, BleError>((characteristic, raw))
        }
        .await;

        match notifications {
            Ok((characteristic, raw)) => Ok((device, characteristic, raw)),
            Err(e) => {
                if device.is_connected() {
                    if let Err(close) = device.disconnect().await {
                        debug!("Disconnect after failed pairing of {}: {}", self.label, close);
                    }
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl HeartRateStream for BleHeartRateStream {
    fn label(&self) -> &str {
        &self.label
    }

    fn status(&self) -> StreamStatus {
        self.status
    }

    async fn subscribe(&mut self) -> Result<Subscription> {
        if let Some(handle) = self.session.as_ref().map(|s| s.handle) {
            if let Err(e) = self.unsubscribe(handle).await {
                debug!("Previous session of {} did not close cleanly: {}", self.label, e);
            }
        }

        self.status = StreamStatus::Connecting;
        let (device, characteristic, mut raw) = match self.open().await {
            Ok(parts) => parts,
            Err(e) => {
                self.status = StreamStatus::Error;
                warn!("Pairing failed for {}: {}", self.label, e);
                return Err(e.into());
            }
        };

        let (tx, samples) = mpsc::channel(SAMPLE_BUFFER);
        let label = self.label.clone();
        let decoder = tokio::spawn(async move {
            while let Some(value) = raw.recv().await {
                match decode_measurement(&value) {
                    Ok(bpm) => {
                        if tx.send(bpm).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Dropping measurement from {}: {}", label, e),
                }
            }
            debug!("Notification stream from {} ended", label);
        });

        let handle = SubscriptionHandle::next();
        self.session = Some(LiveSession {
            handle,
            device,
            characteristic,
            decoder,
        });
        self.status = StreamStatus::Streaming;
        info!("Streaming heart rate from {}", self.label);

        Ok(Subscription { handle, samples })
    }

    async fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Result<()> {
        if self.session.as_ref().map(|s| s.handle) != Some(handle) {
            return Ok(());
        }
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        let LiveSession {
            mut device,
            mut characteristic,
            decoder,
            ..
        } = session;

        decoder.abort();
        self.status = StreamStatus::Disconnected;

        let stopped = characteristic.stop_notifications().await;
        let closed = if device.is_connected() {
            device.disconnect().await
        } else {
            Ok(())
        };

        stopped.and(closed).map_err(WearablesError::from)
    }
}

/// Creates live streams on one platform
pub struct BleStreamFactory {
    platform: Arc<dyn BlePlatform>,
}

impl BleStreamFactory {
    pub fn new(platform: Arc<dyn BlePlatform>) -> Self {
        Self { platform }
    }
}

impl StreamFactory for BleStreamFactory {
    fn create(&self, label: &str) -> Box<dyn HeartRateStream> {
        Box::new(BleHeartRateStream::new(label, self.platform.clone()))
    }
}


#[cfg(test)]
mod tests {
    use super::fake::{FailAt, FakePlatform};
    use super::*;
    use crate::sensors::heart_rate::encode_measurement;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_stream_decodes_notifications() {
        let platform = Arc::new(FakePlatform::new(FailAt::Nothing));
        let mut stream = BleHeartRateStream::new("strap", platform.clone());

        let mut sub = stream.subscribe().await.unwrap();
        assert_eq!(stream.status(), StreamStatus::Streaming);
        assert_eq!(stream.label(), "Polar H10 1A2B");

        let tx = platform.sender().unwrap();
        tx.send(encode_measurement(88)).await.unwrap();
        tx.send(vec![0x01]).await.unwrap();
        tx.send(vec![0x01, 0x2C, 0x01]).await.unwrap();

        assert_eq!(sub.samples.recv().await, Some(88));
        assert_eq!(sub.samples.recv().await, Some(300));
    }

    #[tokio::test]
    async fn test_pairing_failures_are_connection_errors() {
        for fail_at in [FailAt::RequestDevice, FailAt::Cancelled, FailAt::Service, FailAt::Notifications] {
            let platform = Arc::new(FakePlatform::new(fail_at));
            let mut stream = BleHeartRateStream::new("strap", platform.clone());

            let err = stream.subscribe().await.unwrap_err();
            assert!(matches!(err, WearablesError::Connection(_)), "{:?}", fail_at);
            assert_eq!(stream.status(), StreamStatus::Error);
            assert!(!platform.connected.load(Ordering::SeqCst));
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_tears_down_link() {
        let platform = Arc::new(FakePlatform::new(FailAt::Nothing));
        let mut stream = BleHeartRateStream::new("strap", platform.clone());
        let mut sub = stream.subscribe().await.unwrap();
        assert!(platform.connected.load(Ordering::SeqCst));

        stream.unsubscribe(sub.handle).await.unwrap();
        assert!(!platform.connected.load(Ordering::SeqCst));
        assert_eq!(stream.status(), StreamStatus::Disconnected);
        assert_eq!(sub.samples.recv().await, None);

        // a stale handle is a no-op
        stream.unsubscribe(sub.handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_unsubscribe_reports_teardown_error() {
        let mut platform = FakePlatform::new(FailAt::Nothing);
        platform.disconnect_fails = true;
        let platform = Arc::new(platform);
        let mut stream = BleHeartRateStream::new("strap", platform.clone());
        let sub = stream.subscribe().await.unwrap();

        let err = stream.unsubscribe(sub.handle).await.unwrap_err();
        assert!(matches!(err, WearablesError::Connection(_)));
        assert_eq!(stream.status(), StreamStatus::Disconnected);
    }
}
