//! Routing of peripheral callbacks to the service which owns the attribute.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::{
    advertising::{AdvertiseError, AdvertisementConfig},
    gatt::{
        Central, CharacteristicRef, DescriptorRef, GattStatus, ReadResponse, ServiceId,
    },
    peripheral::PeripheralCallback,
    registry::ServiceRegistry,
    service::ServiceHandler,
};

pub struct GattDispatcher {
    registry: ServiceRegistry,
}

impl GattDispatcher {
    pub fn new(registry: ServiceRegistry) -> Self {
        GattDispatcher { registry }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    fn characteristic_handler(
        &self,
        characteristic: &CharacteristicRef,
    ) -> Option<&Arc<dyn ServiceHandler>> {
        let handler = characteristic
            .service
            .and_then(|id| self.registry.lookup(id));
        if handler.is_none() {
            warn!(
                "no service handles characteristic `{}` ({:?})",
                characteristic.uuid, characteristic.service
            );
        }
        handler
    }

    fn descriptor_handler(&self, descriptor: &DescriptorRef) -> Option<&Arc<dyn ServiceHandler>> {
        let service = descriptor_service(descriptor);
        let handler = self.registry.lookup(service);
        if handler.is_none() {
            warn!(
                "no service handles descriptor `{}` of {}",
                descriptor.uuid, service
            );
        }
        handler
    }
}

/// Resolve the service a descriptor belongs to.
///
/// # Panics
///
/// Panics if the descriptor has no characteristic or the characteristic has no service. The
/// platform always builds descriptors inside a characteristic inside a service, so a missing link
/// is a bug in the peripheral backend.
fn descriptor_service(descriptor: &DescriptorRef) -> ServiceId {
    let characteristic = match descriptor.characteristic {
        Some(ref x) => x,
        None => panic!("descriptor `{}` has no characteristic", descriptor.uuid),
    };
    match characteristic.service {
        Some(x) => x,
        None => panic!("characteristic `{}` has no service", characteristic.uuid),
    }
}

impl PeripheralCallback for GattDispatcher {
    fn on_service_added(&self, status: GattStatus, service: ServiceId) {
        if status.is_success() {
            info!("added {}", service);
        } else {
            error!("failed to add {}: {}", service, status);
        }
    }

    fn on_characteristic_read(
        &self,
        central: &Central,
        characteristic: &CharacteristicRef,
    ) -> ReadResponse {
        debug!("{} reads `{}`", central, characteristic.uuid);
        match self.characteristic_handler(characteristic) {
            Some(x) => x.on_characteristic_read(central, characteristic),
            None => ReadResponse::not_supported(),
        }
    }

    fn on_characteristic_write(
        &self,
        central: &Central,
        characteristic: &CharacteristicRef,
        value: &[u8],
    ) -> GattStatus {
        debug!("{} writes {:x?} to `{}`", central, value, characteristic.uuid);
        match self.characteristic_handler(characteristic) {
            Some(x) => x.on_characteristic_write(central, characteristic, value),
            None => GattStatus::RequestNotSupported,
        }
    }

    fn on_characteristic_write_completed(
        &self,
        central: &Central,
        characteristic: &CharacteristicRef,
        value: &[u8],
    ) {
        if let Some(x) = self.characteristic_handler(characteristic) {
            x.on_characteristic_write_completed(central, characteristic, value)
        }
    }

    fn on_descriptor_read(&self, central: &Central, descriptor: &DescriptorRef) -> ReadResponse {
        debug!("{} reads descriptor `{}`", central, descriptor.uuid);
        match self.descriptor_handler(descriptor) {
            Some(x) => x.on_descriptor_read(central, descriptor),
            None => ReadResponse::not_supported(),
        }
    }

    fn on_descriptor_write(
        &self,
        central: &Central,
        descriptor: &DescriptorRef,
        value: &[u8],
    ) -> GattStatus {
        debug!(
            "{} writes {:x?} to descriptor `{}`",
            central, value, descriptor.uuid
        );
        match self.descriptor_handler(descriptor) {
            Some(x) => x.on_descriptor_write(central, descriptor, value),
            None => GattStatus::RequestNotSupported,
        }
    }

    fn on_notifying_enabled(&self, central: &Central, characteristic: &CharacteristicRef) {
        debug!("{} enabled notifications for `{}`", central, characteristic.uuid);
        if let Some(x) = self.characteristic_handler(characteristic) {
            x.on_notifying_enabled(central, characteristic)
        }
    }

    fn on_notifying_disabled(&self, central: &Central, characteristic: &CharacteristicRef) {
        debug!("{} disabled notifications for `{}`", central, characteristic.uuid);
        if let Some(x) = self.characteristic_handler(characteristic) {
            x.on_notifying_disabled(central, characteristic)
        }
    }

    fn on_notification_sent(
        &self,
        central: &Central,
        value: &[u8],
        characteristic: &CharacteristicRef,
        status: GattStatus,
    ) {
        if let Some(x) = self.characteristic_handler(characteristic) {
            x.on_notification_sent(central, value, characteristic, status)
        }
    }

    fn on_central_connected(&self, central: &Central) {
        info!("central {} connected", central);
        for handler in self.registry.handlers() {
            handler.on_central_connected(central);
        }
    }

    fn on_central_disconnected(&self, central: &Central) {
        info!("central {} disconnected", central);
        for handler in self.registry.handlers() {
            handler.on_central_disconnected(central);
        }
    }

    fn on_advertising_started(&self, config: &AdvertisementConfig) {
        info!(
            "advertising started for {:?}",
            config.advertise_data.service_uuids
        );
    }

    fn on_advertise_failure(&self, error: &AdvertiseError) {
        error!("advertising failed: {}", error);
    }

    fn on_advertising_stopped(&self) {
        info!("advertising stopped");
    }
}
