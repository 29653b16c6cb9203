// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/squadpulse

//! Native Bluetooth LE central backed by btleplug

use std::time::Duration;
use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, Service};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::ble::{BleDevice, BleError, BlePlatform, GattCharacteristic, GattServer, GattService};
use super::traits::SAMPLE_BUFFER;

fn gatt(e: btleplug::Error) -> BleError {
    BleError::Gatt(e.to_string())
}

/// First local adapter; each pairing scans for `scan_window` and takes the
/// first peripheral advertising the requested service.
pub struct BtleplugPlatform {
    adapter: Adapter,
    scan_window: Duration,
}

impl BtleplugPlatform {
    pub async fn first_adapter(scan_window: Duration) -> Result<Self, BleError> {
        let manager = Manager::new()
            .await
            .map_err(|e| BleError::Unavailable(e.to_string()))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| BleError::Unavailable(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| BleError::Unavailable("no Bluetooth adapter found".to_string()))?;

        if let Ok(info) = adapter.adapter_info().await {
            info!("Using Bluetooth adapter {}", info);
        }
        Ok(Self { adapter, scan_window })
    }

    async fn advertises(peripheral: &Peripheral, service: Uuid) -> Option<Option<String>> {
        match peripheral.properties().await {
            Ok(Some(props)) if props.services.contains(&service) => Some(props.local_name),
            _ => None,
        }
    }
}

#[async_trait]
impl BlePlatform for BtleplugPlatform {
    async fn request_device(&self, service: Uuid) -> Result<Box<dyn BleDevice>, BleError> {
        self.adapter
            .start_scan(ScanFilter { services: vec![service] })
            .await
            .map_err(gatt)?;
        tokio::time::sleep(self.scan_window).await;

        let peripherals = self.adapter.peripherals().await.map_err(gatt);
        if let Err(e) = self.adapter.stop_scan().await {
            debug!("Stopping scan: {}", e);
        }

        for peripheral in peripherals? {
            if let Some(name) = Self::advertises(&peripheral, service).await {
                debug!("Found heart-rate peripheral {:?}", name);
                return Ok(Box::new(BtleplugDevice {
                    peripheral,
                    name,
                    connected: false,
                }));
            }
        }
        Err(BleError::DeviceNotFound)
    }
}

struct BtleplugDevice {
    peripheral: Peripheral,
    name: Option<String>,
    connected: bool,
}

#[async_trait]
impl BleDevice for BtleplugDevice {
    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn gatt_connect(&mut self) -> Result<Box<dyn GattServer>, BleError> {
        self.peripheral.connect().await.map_err(gatt)?;
        self.connected = true;
        self.peripheral.discover_services().await.map_err(gatt)?;
        Ok(Box::new(BtleplugServer {
            peripheral: self.peripheral.clone(),
        }))
    }

    async fn disconnect(&mut self) -> Result<(), BleError> {
        self.connected = false;
        self.peripheral.disconnect().await.map_err(gatt)
    }
}

struct BtleplugServer {
    peripheral: Peripheral,
}

#[async_trait]
impl GattServer for BtleplugServer {
    async fn primary_service(&self, service: Uuid) -> Result<Box<dyn GattService>, BleError> {
        let found = self
            .peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == service)
            .ok_or_else(|| BleError::Gatt(format!("service {} not offered", service)))?;
        Ok(Box::new(BtleplugService {
            peripheral: self.peripheral.clone(),
            service: found,
        }))
    }
}

struct BtleplugService {
    peripheral: Peripheral,
    service: Service,
}

#[async_trait]
impl GattService for BtleplugService {
    async fn characteristic(&self, characteristic: Uuid) -> Result<Box<dyn GattCharacteristic>, BleError> {
        let found = self
            .service
            .characteristics
            .iter()
            .find(|c| c.uuid == characteristic)
            .cloned()
            .ok_or_else(|| BleError::Gatt(format!("characteristic {} not offered", characteristic)))?;
        Ok(Box::new(BtleplugCharacteristic {
            peripheral: self.peripheral.clone(),
            characteristic: found,
            forward: None,
        }))
    }
}

struct BtleplugCharacteristic {
    peripheral: Peripheral,
    characteristic: Characteristic,
    forward: Option<JoinHandle<()>>,
}

#[async_trait]
impl GattCharacteristic for BtleplugCharacteristic {
    async fn start_notifications(&mut self) -> Result<mpsc::Receiver<Vec<u8>>, BleError> {
        let mut notifications = self.peripheral.notifications().await.map_err(gatt)?;
        self.peripheral.subscribe(&self.characteristic).await.map_err(gatt)?;

        let (tx, rx) = mpsc::channel(SAMPLE_BUFFER);
        let uuid = self.characteristic.uuid;
        self.forward = Some(tokio::spawn(async move {
            while let Some(note) = notifications.next().await {
                if note.uuid == uuid && tx.send(note.value).await.is_err() {
                    break;
                }
            }
        }));
        Ok(rx)
    }

    async fn stop_notifications(&mut self) -> Result<(), BleError> {
        if let Some(forward) = self.forward.take() {
            forward.abort();
        }
        self.peripheral.unsubscribe(&self.characteristic).await.map_err(gatt)
    }
}

impl Drop for BtleplugCharacteristic {
    fn drop(&mut self) {
        if let Some(forward) = self.forward.take() {
            forward.abort();
        }
    }
}
