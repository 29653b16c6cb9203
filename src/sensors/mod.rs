// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/squadpulse

//! Sensor module - heart-rate streams, BLE transport and simulation

mod manager;
mod traits;
mod simulator;
pub mod ble;
pub mod heart_rate;

#[cfg(feature = "ble")]
pub mod btle;

pub use manager::DeviceManager;
pub use traits::{HeartRateStream, StreamFactory, StreamStatus, Subscription, SubscriptionHandle, SAMPLE_BUFFER};
pub use simulator::{SimulatedHeartRate, SimulatedStreamFactory, SimulationSettings};
pub use ble::{BleError, BleHeartRateStream, BlePlatform, BleStreamFactory};
pub use heart_rate::{decode_measurement, HEART_RATE_MEASUREMENT, HEART_RATE_SERVICE};

use std::sync::Arc;
use tracing::info;

use crate::config::DeviceConfig;
use crate::error::Result;

/// Stream source for the configured device mode: simulated straps, or
/// live straps on the first local Bluetooth adapter.
pub async fn stream_factory(config: &DeviceConfig) -> Result<Arc<dyn StreamFactory>> {
    if config.simulated {
        info!("Using simulated straps");
        return Ok(Arc::new(SimulatedStreamFactory::new(config.into())));
    }
    live_factory(config).await
}

#[cfg(feature = "ble")]
async fn live_factory(config: &DeviceConfig) -> Result<Arc<dyn StreamFactory>> {
    let window = std::time::Duration::from_millis(config.scan_window_ms.max(100));
    let platform = btle::BtleplugPlatform::first_adapter(window).await?;
    info!("Using live straps (scan window {:?})", window);
    Ok(Arc::new(BleStreamFactory::new(Arc::new(platform))))
}

#[cfg(not(feature = "ble"))]
async fn live_factory(_config: &DeviceConfig) -> Result<Arc<dyn StreamFactory>> {
    Err(crate::error::WearablesError::Connection(
        "live straps need a build with the `ble` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_simulated_factory_streams() {
        let factory = stream_factory(&DeviceConfig::default()).await.unwrap();
        let mut strap = factory.create("Polar");
        let mut sub = strap.subscribe().await.unwrap();
        assert!(sub.samples.recv().await.is_some());
        strap.unsubscribe(sub.handle).await.unwrap();
    }

    #[cfg(not(feature = "ble"))]
    #[tokio::test]
    async fn test_live_factory_needs_ble_feature() {
        let config = DeviceConfig {
            simulated: false,
            ..DeviceConfig::default()
        };
        let err = stream_factory(&config).await.err().unwrap();
        assert!(err.to_string().contains("`ble` feature"));
    }
}
