use std::{
    future::Future,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Context, Result};
use log::info;
use tokio::sync::{mpsc::UnboundedReceiver, OnceCell};

use crate::{
    advertising::{AdvertisementConfig, AdvertisingController},
    bluetooth::BluezPeripheral,
    config::Config,
    dispatch::GattDispatcher,
    gatt::ServiceId,
    peripheral::{deliver, PeripheralEvent, PeripheralManager},
    registry::ServiceRegistry,
    service::ServiceHandler,
    services::{CurrentTimeService, DeviceInformationService, HeartRateService},
};

pub const DEVICE_INFORMATION_ID: ServiceId = ServiceId(0x0010);
pub const CURRENT_TIME_ID: ServiceId = ServiceId(0x0020);
pub const HEART_RATE_ID: ServiceId = ServiceId(0x0030);

/// A GATT server with the device information, current time and heart rate services,
/// advertising the heart rate service.
pub struct BluetoothServer {
    dispatcher: GattDispatcher,
    advertisement: AdvertisementConfig,
    events: Mutex<Option<UnboundedReceiver<PeripheralEvent>>>,
}

impl BluetoothServer {
    /// Set up the services on `peripheral` and start advertising.
    ///
    /// `events` must be the callback stream of `peripheral`, it is consumed by [`Self::run`].
    pub fn new(
        peripheral: Arc<dyn PeripheralManager>,
        events: UnboundedReceiver<PeripheralEvent>,
        config: &Config,
    ) -> Result<Self> {
        peripheral
            .remove_all_services()
            .context("failed to clear services")?;

        let dis = Arc::new(DeviceInformationService::new(
            DEVICE_INFORMATION_ID,
            &config.manufacturer,
            &config.model,
        )?);
        let cts = Arc::new(CurrentTimeService::new(CURRENT_TIME_ID, peripheral.clone())?);
        let hrs = Arc::new(HeartRateService::new(
            HEART_RATE_ID,
            config.sensor_location,
            peripheral.clone(),
        )?);
        let handlers: [Arc<dyn ServiceHandler>; 3] = [dis, cts, hrs.clone()];

        let mut registry = ServiceRegistry::new();
        for handler in handlers {
            registry.register(handler.service().id, handler)?;
        }
        for handler in registry.handlers() {
            peripheral
                .add_service(handler.service())
                .with_context(|| format!("failed to add service `{}`", handler.service().uuid))?;
        }

        let advertisement = AdvertisingController::new(peripheral.clone()).start(hrs.service())?;

        Ok(BluetoothServer {
            dispatcher: GattDispatcher::new(registry),
            advertisement,
            events: Mutex::new(Some(events)),
        })
    }

    pub fn dispatcher(&self) -> &GattDispatcher {
        &self.dispatcher
    }

    pub fn advertisement(&self) -> &AdvertisementConfig {
        &self.advertisement
    }

    /// Deliver peripheral callbacks one by one until the peripheral goes away.
    ///
    /// Only one call can run per server.
    pub async fn run(&self) -> Result<()> {
        let events = self
            .events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let mut events = events.ok_or_else(|| anyhow!("server is already running"))?;

        info!("entering server loop");
        while let Some(event) = events.recv().await {
            deliver(&self.dispatcher, event);
        }
        info!("peripheral closed, leaving server loop");
        Ok(())
    }
}

/// Holder for a lazily started server.
///
/// Concurrent first calls to [`ServerCell::get_or_start`] start exactly one server, the others
/// wait for it. A started server is never torn down.
pub struct ServerCell {
    cell: OnceCell<BluetoothServer>,
}

impl ServerCell {
    pub const fn new() -> Self {
        ServerCell {
            cell: OnceCell::const_new(),
        }
    }

    pub fn get(&self) -> Option<&BluetoothServer> {
        self.cell.get()
    }

    pub async fn get_or_start<F, Fut>(&self, start: F) -> Result<&BluetoothServer>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<BluetoothServer>>,
    {
        self.cell.get_or_try_init(start).await
    }
}

impl Default for ServerCell {
    fn default() -> Self {
        Self::new()
    }
}

static INSTANCE: ServerCell = ServerCell::new();

/// The process wide server on the BlueZ peripheral, started on first use.
///
/// `config` is only used by the call which starts the server.
pub async fn instance(config: &Config) -> Result<&'static BluetoothServer> {
    INSTANCE
        .get_or_start(|| async move {
            let (peripheral, events) = BluezPeripheral::connect(config)
                .await
                .context("failed to connect to bluetooth")?;
            BluetoothServer::new(Arc::new(peripheral), events, config)
        })
        .await
}
