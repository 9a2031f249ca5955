//! Recording doubles for the peripheral manager and for service handlers.

use std::sync::Mutex;

use anyhow::Result;
use bluer::Address;
use uuid::Uuid;

use crate::{
    advertising::AdvertisementConfig,
    gatt::{
        Central, CharacteristicId, CharacteristicRef, DescriptorId, DescriptorRef, GattService,
        GattStatus, ReadResponse, ServiceId,
    },
    peripheral::PeripheralManager,
    service::ServiceHandler,
};

pub fn central(n: u8) -> Central {
    Central::new(Address::new([0xC0, 0, 0, 0, 0, n]))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    RemoveAll,
    Add(ServiceId),
    Advertise(AdvertisementConfig),
}

#[derive(Default)]
pub struct RecordingPeripheral {
    ops: Mutex<Vec<Op>>,
    notified: Mutex<Vec<(CharacteristicRef, Vec<u8>)>>,
}

impl RecordingPeripheral {
    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    pub fn advertised(&self) -> Vec<AdvertisementConfig> {
        self.ops()
            .into_iter()
            .filter_map(|x| match x {
                Op::Advertise(x) => Some(x),
                _ => None,
            })
            .collect()
    }

    pub fn notified(&self) -> Vec<(CharacteristicRef, Vec<u8>)> {
        self.notified.lock().unwrap().clone()
    }
}

impl PeripheralManager for RecordingPeripheral {
    fn add_service(&self, service: &GattService) -> Result<()> {
        self.ops.lock().unwrap().push(Op::Add(service.id));
        Ok(())
    }

    fn remove_all_services(&self) -> Result<()> {
        self.ops.lock().unwrap().push(Op::RemoveAll);
        Ok(())
    }

    fn start_advertising(&self, config: &AdvertisementConfig) -> Result<()> {
        self.ops.lock().unwrap().push(Op::Advertise(config.clone()));
        Ok(())
    }

    fn notify(&self, characteristic: &CharacteristicRef, value: &[u8]) -> bool {
        self.notified
            .lock()
            .unwrap()
            .push((characteristic.clone(), value.to_vec()));
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CharacteristicRead(CharacteristicId),
    CharacteristicWrite(CharacteristicId, Vec<u8>),
    WriteCompleted(CharacteristicId, Vec<u8>),
    DescriptorRead(DescriptorId),
    DescriptorWrite(DescriptorId, Vec<u8>),
    NotifyingEnabled(CharacteristicId),
    NotifyingDisabled(CharacteristicId),
    NotificationSent(CharacteristicId, GattStatus),
    Connected(Central),
    Disconnected(Central),
}

/// Handler which accepts everything and records each call.
///
/// Reads answer with the low byte of the attribute handle.
pub struct RecordingHandler {
    service: GattService,
    calls: Mutex<Vec<Call>>,
}

impl RecordingHandler {
    pub fn new(id: ServiceId, uuid: Uuid) -> Self {
        RecordingHandler {
            service: GattService::build(id, uuid).finish().unwrap(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ServiceHandler for RecordingHandler {
    fn service(&self) -> &GattService {
        &self.service
    }

    fn on_characteristic_read(
        &self,
        _central: &Central,
        characteristic: &CharacteristicRef,
    ) -> ReadResponse {
        self.push(Call::CharacteristicRead(characteristic.id));
        ReadResponse::success(vec![self.service.id.0 as u8])
    }

    fn on_characteristic_write(
        &self,
        _central: &Central,
        characteristic: &CharacteristicRef,
        value: &[u8],
    ) -> GattStatus {
        self.push(Call::CharacteristicWrite(characteristic.id, value.to_vec()));
        GattStatus::Success
    }

    fn on_characteristic_write_completed(
        &self,
        _central: &Central,
        characteristic: &CharacteristicRef,
        value: &[u8],
    ) {
        self.push(Call::WriteCompleted(characteristic.id, value.to_vec()));
    }

    fn on_descriptor_read(&self, _central: &Central, descriptor: &DescriptorRef) -> ReadResponse {
        self.push(Call::DescriptorRead(descriptor.id));
        ReadResponse::success(vec![descriptor.id.0 as u8])
    }

    fn on_descriptor_write(
        &self,
        _central: &Central,
        descriptor: &DescriptorRef,
        value: &[u8],
    ) -> GattStatus {
        self.push(Call::DescriptorWrite(descriptor.id, value.to_vec()));
        GattStatus::Success
    }

    fn on_notifying_enabled(&self, _central: &Central, characteristic: &CharacteristicRef) {
        self.push(Call::NotifyingEnabled(characteristic.id));
    }

    fn on_notifying_disabled(&self, _central: &Central, characteristic: &CharacteristicRef) {
        self.push(Call::NotifyingDisabled(characteristic.id));
    }

    fn on_notification_sent(
        &self,
        _central: &Central,
        _value: &[u8],
        characteristic: &CharacteristicRef,
        status: GattStatus,
    ) {
        self.push(Call::NotificationSent(characteristic.id, status));
    }

    fn on_central_connected(&self, central: &Central) {
        self.push(Call::Connected(*central));
    }

    fn on_central_disconnected(&self, central: &Central) {
        self.push(Call::Disconnected(*central));
    }
}
