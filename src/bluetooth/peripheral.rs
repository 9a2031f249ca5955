use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use anyhow::{anyhow, Context, Result};
use bluer::{adv::AdvertisementHandle, gatt::local::ApplicationHandle, Adapter, Session};
use log::{error, info, warn};
use tokio::sync::{
    broadcast,
    mpsc::{self, UnboundedReceiver, UnboundedSender},
};

use super::{
    advertisement::{advertise_error, to_bluer},
    application::{self, ValueSenders},
    devices, EventSender,
};
use crate::{
    advertising::{AdvertiseError, AdvertisementConfig},
    config::Config,
    gatt::{CharacteristicId, CharacteristicRef, GattService, GattStatus, Property},
    peripheral::{PeripheralEvent, PeripheralManager},
};

/// Pending notifications per subscriber before old values are dropped.
const NOTIFY_BACKLOG: usize = 16;

enum Command {
    AddService(GattService, ValueSenders),
    RemoveAllServices,
    StartAdvertising(AdvertisementConfig),
}

/// Peripheral manager on top of the BlueZ daemon.
///
/// Requests are handed to a driver task which talks to BlueZ and reports the outcome through
/// the event stream returned by [`BluezPeripheral::connect`].
pub struct BluezPeripheral {
    _session: Session,
    commands: UnboundedSender<Command>,
    values: Mutex<HashMap<CharacteristicId, broadcast::Sender<Vec<u8>>>>,
}

impl BluezPeripheral {
    pub async fn connect(config: &Config) -> Result<(Self, UnboundedReceiver<PeripheralEvent>)> {
        let session = Session::new().await?;
        let adapter = match config.adapter {
            Some(ref name) => session.adapter(name)?,
            None => session.default_adapter().await?,
        };
        adapter.set_powered(true).await?;
        // the alias is what gets advertised as local name
        adapter
            .set_alias(config.device_name.clone())
            .await
            .context("failed to set adapter name")?;

        info!(
            "running on bluetooth adapter `{}` with address `{}`",
            adapter.name(),
            adapter.address().await?,
        );
        match adapter.supported_advertising_instances().await {
            Ok(0) => error!("adapter `{}` does not support advertising", adapter.name()),
            Ok(_) => {}
            Err(e) => warn!("could not query advertising support: {}", e),
        }

        let (events, events_recv) = mpsc::unbounded_channel();
        let (commands, commands_recv) = mpsc::unbounded_channel();

        tokio::spawn(devices::watch(adapter.clone(), events.clone()));
        let driver = Driver {
            adapter,
            device_name: config.device_name.clone(),
            events,
            services: Vec::new(),
            application: None,
            advertisement: None,
        };
        tokio::spawn(driver.run(commands_recv));

        Ok((
            BluezPeripheral {
                _session: session,
                commands,
                values: Mutex::new(HashMap::new()),
            },
            events_recv,
        ))
    }

    fn values(&self) -> MutexGuard<'_, HashMap<CharacteristicId, broadcast::Sender<Vec<u8>>>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("bluetooth driver quit"))
    }
}

impl PeripheralManager for BluezPeripheral {
    fn add_service(&self, service: &GattService) -> Result<()> {
        let mut senders = ValueSenders::new();
        for c in service.characteristics.iter() {
            if c.properties.intersects(Property::Notify | Property::Indicate) {
                senders.insert(c.id, broadcast::channel(NOTIFY_BACKLOG).0);
            }
        }
        self.values()
            .extend(senders.iter().map(|(id, x)| (*id, x.clone())));
        self.send(Command::AddService(service.clone(), senders))
    }

    fn remove_all_services(&self) -> Result<()> {
        self.values().clear();
        self.send(Command::RemoveAllServices)
    }

    fn start_advertising(&self, config: &AdvertisementConfig) -> Result<()> {
        self.send(Command::StartAdvertising(config.clone()))
    }

    fn notify(&self, characteristic: &CharacteristicRef, value: &[u8]) -> bool {
        match self.values().get(&characteristic.id) {
            // fails if there are no notify sessions
            Some(x) => x.send(value.to_vec()).is_ok(),
            None => {
                warn!("`{}` does not support notifications", characteristic.uuid);
                false
            }
        }
    }
}

struct Driver {
    adapter: Adapter,
    device_name: String,
    events: EventSender,
    services: Vec<(GattService, ValueSenders)>,
    application: Option<ApplicationHandle>,
    advertisement: Option<AdvertisementHandle>,
}

impl Driver {
    async fn run(mut self, mut commands: UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::AddService(service, senders) => self.add_service(service, senders).await,
                Command::RemoveAllServices => {
                    self.services.clear();
                    self.application = None;
                }
                Command::StartAdvertising(config) => self.start_advertising(config).await,
            }
        }

        if self.advertisement.take().is_some() {
            self.send(PeripheralEvent::AdvertisingStopped);
        }
    }

    fn send(&self, event: PeripheralEvent) {
        // the server loop is gone, nobody left to tell
        self.events.send(event).ok();
    }

    /// BlueZ takes a whole application at once, so every added service registers the
    /// application again.
    async fn add_service(&mut self, service: GattService, senders: ValueSenders) {
        let id = service.id;
        let uuid = service.uuid;
        self.services.push((service, senders));

        self.application = None;
        let app = application::build(&self.services, &self.events);
        let status = match self.adapter.serve_gatt_application(app).await {
            Ok(x) => {
                self.application = Some(x);
                GattStatus::Success
            }
            Err(e) => {
                error!("failed to register service `{}`: {}", uuid, e);
                self.services.pop();
                if !self.services.is_empty() {
                    let app = application::build(&self.services, &self.events);
                    match self.adapter.serve_gatt_application(app).await {
                        Ok(x) => self.application = Some(x),
                        Err(e) => error!("failed to restore services: {}", e),
                    }
                }
                GattStatus::InsufficientResources
            }
        };
        self.send(PeripheralEvent::ServiceAdded {
            status,
            service: id,
        });
    }

    async fn start_advertising(&mut self, config: AdvertisementConfig) {
        if self.advertisement.is_some() {
            self.send(PeripheralEvent::AdvertiseFailure(
                AdvertiseError::AlreadyStarted,
            ));
            return;
        }
        let adv = to_bluer(&config, &self.device_name);
        match self.adapter.advertise(adv).await {
            Ok(x) => {
                self.advertisement = Some(x);
                self.send(PeripheralEvent::AdvertisingStarted(config));
            }
            Err(e) => self.send(PeripheralEvent::AdvertiseFailure(advertise_error(e))),
        }
    }
}
