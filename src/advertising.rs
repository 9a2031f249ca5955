use std::{fmt, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::info;
use uuid::Uuid;

use crate::{gatt::GattService, peripheral::PeripheralManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseMode {
    LowPower,
    Balanced,
    LowLatency,
}

impl AdvertiseMode {
    pub fn interval(self) -> Duration {
        match self {
            AdvertiseMode::LowPower => Duration::from_millis(1000),
            AdvertiseMode::Balanced => Duration::from_millis(250),
            AdvertiseMode::LowLatency => Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPowerLevel {
    UltraLow,
    Low,
    Medium,
    High,
}

impl TxPowerLevel {
    pub fn dbm(self) -> i16 {
        match self {
            TxPowerLevel::UltraLow => -21,
            TxPowerLevel::Low => -15,
            TxPowerLevel::Medium => -7,
            TxPowerLevel::High => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertiseSettings {
    pub mode: AdvertiseMode,
    pub connectable: bool,
    /// `None` advertises until stopped.
    pub timeout: Option<Duration>,
    pub tx_power: TxPowerLevel,
}

/// Contents of one advertising packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertiseData {
    pub service_uuids: Vec<Uuid>,
    pub include_tx_power: bool,
    pub include_device_name: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementConfig {
    pub settings: AdvertiseSettings,
    pub advertise_data: AdvertiseData,
    pub scan_response: AdvertiseData,
}

impl AdvertisementConfig {
    /// Connectable advertisement for `service`, with the device name in the scan response.
    pub fn for_service(service: Uuid) -> Self {
        AdvertisementConfig {
            settings: AdvertiseSettings {
                mode: AdvertiseMode::Balanced,
                connectable: true,
                timeout: None,
                tx_power: TxPowerLevel::Medium,
            },
            advertise_data: AdvertiseData {
                service_uuids: vec![service],
                include_tx_power: true,
                include_device_name: false,
            },
            scan_response: AdvertiseData {
                include_device_name: true,
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvertiseError {
    DataTooLarge,
    TooManyAdvertisers,
    AlreadyStarted,
    FeatureUnsupported,
    InternalError(String),
}

impl fmt::Display for AdvertiseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            AdvertiseError::DataTooLarge => write!(f, "advertisement data too large"),
            AdvertiseError::TooManyAdvertisers => write!(f, "no advertising instance available"),
            AdvertiseError::AlreadyStarted => write!(f, "advertising already started"),
            AdvertiseError::FeatureUnsupported => write!(f, "advertising not supported"),
            AdvertiseError::InternalError(ref e) => write!(f, "internal error: {}", e),
        }
    }
}

impl std::error::Error for AdvertiseError {}

pub struct AdvertisingController {
    peripheral: Arc<dyn PeripheralManager>,
}

impl AdvertisingController {
    pub fn new(peripheral: Arc<dyn PeripheralManager>) -> Self {
        AdvertisingController { peripheral }
    }

    /// Start advertising `service`. There is no retry, the outcome comes back as a callback.
    pub fn start(&self, service: &GattService) -> Result<AdvertisementConfig> {
        let config = AdvertisementConfig::for_service(service.uuid);
        info!("starting advertising for service `{}`", service.uuid);
        self.peripheral
            .start_advertising(&config)
            .context("failed to request advertising")?;
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        gatt::{uuid16, ServiceId},
        test_util::RecordingPeripheral,
    };

    #[test]
    fn config_shape() {
        let uuid = uuid16(0x180D);
        let config = AdvertisementConfig::for_service(uuid);

        assert!(config.settings.connectable);
        assert_eq!(config.settings.timeout, None);
        assert_eq!(config.settings.mode, AdvertiseMode::Balanced);
        assert_eq!(config.settings.tx_power, TxPowerLevel::Medium);

        assert_eq!(config.advertise_data.service_uuids, vec![uuid]);
        assert!(config.advertise_data.include_tx_power);
        assert!(!config.advertise_data.include_device_name);

        assert!(config.scan_response.include_device_name);
        assert!(config.scan_response.service_uuids.is_empty());
    }

    #[test]
    fn start_issues_single_request() {
        let peripheral = Arc::new(RecordingPeripheral::default());
        let controller = AdvertisingController::new(peripheral.clone());
        let service = GattService::build(ServiceId(0x20), uuid16(0x1805))
            .finish()
            .unwrap();

        let config = controller.start(&service).unwrap();

        let advertised = peripheral.advertised();
        assert_eq!(advertised, vec![config]);
        assert_eq!(advertised[0].advertise_data.service_uuids, vec![uuid16(0x1805)]);
    }

    #[test]
    fn power_and_interval() {
        assert_eq!(TxPowerLevel::Medium.dbm(), -7);
        assert_eq!(AdvertiseMode::Balanced.interval(), Duration::from_millis(250));
    }
}
