//! Translation of our service definitions into a BlueZ GATT application whose request handlers
//! forward into the peripheral event stream.

use std::collections::HashMap;

use bluer::gatt::{
    local::{
        Application, Characteristic as BlueCharacteristic, CharacteristicNotifier,
        CharacteristicNotify, CharacteristicNotifyMethod, CharacteristicRead,
        CharacteristicWrite, CharacteristicWriteMethod, Descriptor as BlueDescriptor,
        DescriptorRead, DescriptorWrite, ReqError, ReqResult, Service as BlueService,
    },
    WriteOp,
};
use bluer::Address;
use futures::FutureExt;
use log::{debug, warn};
use tokio::sync::{broadcast, oneshot};

use super::{req_error, EventSender};
use crate::{
    gatt::{
        Central, Characteristic, CharacteristicId, CharacteristicRef, DescriptorRef,
        GattService, GattStatus, Property, ReadResponse, CCCD_UUID,
    },
    peripheral::PeripheralEvent,
};

pub type ValueSenders = HashMap<CharacteristicId, broadcast::Sender<Vec<u8>>>;

pub fn build(services: &[(GattService, ValueSenders)], events: &EventSender) -> Application {
    Application {
        services: services
            .iter()
            .map(|(service, senders)| build_service(service, senders, events))
            .collect(),
        ..Default::default()
    }
}

fn build_service(
    service: &GattService,
    senders: &ValueSenders,
    events: &EventSender,
) -> BlueService {
    BlueService {
        uuid: service.uuid,
        primary: service.primary,
        characteristics: service
            .characteristics
            .iter()
            .map(|c| build_characteristic(service, c, senders.get(&c.id), events))
            .collect(),
        ..Default::default()
    }
}

fn build_characteristic(
    service: &GattService,
    characteristic: &Characteristic,
    values: Option<&broadcast::Sender<Vec<u8>>>,
    events: &EventSender,
) -> BlueCharacteristic {
    let chr = service.characteristic_ref(characteristic);
    let props = characteristic.properties;

    let read = props
        .contains(Property::Read)
        .then(|| characteristic_read(chr.clone(), events.clone()));
    let write = props
        .intersects(Property::Write | Property::WriteWithoutResponse)
        .then(|| {
            let without_response = props.contains(Property::WriteWithoutResponse);
            characteristic_write(chr.clone(), without_response, events.clone())
        });
    let notify = values.map(|values| CharacteristicNotify {
        notify: props.contains(Property::Notify),
        indicate: props.contains(Property::Indicate),
        method: notify_method(chr.clone(), values.clone(), events.clone()),
        ..Default::default()
    });

    BlueCharacteristic {
        uuid: characteristic.uuid,
        broadcast: props.contains(Property::Broadcast),
        read,
        write,
        notify,
        descriptors: characteristic
            .descriptors
            .iter()
            // BlueZ manages the client configuration itself
            .filter(|d| d.uuid != CCCD_UUID)
            .map(|d| {
                let desc = service.descriptor_ref(characteristic, d);
                BlueDescriptor {
                    uuid: d.uuid,
                    read: d.readable.then(|| descriptor_read(desc.clone(), events.clone())),
                    write: d.writable.then(|| descriptor_write(desc.clone(), events.clone())),
                    ..Default::default()
                }
            })
            .collect(),
        ..Default::default()
    }
}

fn read_result(res: ReadResponse) -> ReqResult<Vec<u8>> {
    if res.status.is_success() {
        Ok(res.value.unwrap_or_default())
    } else {
        Err(req_error(res.status))
    }
}

fn write_result(status: GattStatus) -> ReqResult<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(req_error(status))
    }
}

/// Send a request into the event stream and wait for the server's answer.
async fn request<T>(
    events: &EventSender,
    event: impl FnOnce(oneshot::Sender<T>) -> PeripheralEvent,
) -> ReqResult<T> {
    let (reply, recv) = oneshot::channel();
    events.send(event(reply)).map_err(|_| {
        warn!("bluetooth request while the server is not running");
        ReqError::Failed
    })?;
    recv.await.map_err(|_| ReqError::Failed)
}

fn characteristic_read(
    characteristic: CharacteristicRef,
    events: EventSender,
) -> CharacteristicRead {
    CharacteristicRead {
        read: true,
        fun: Box::new(move |req| {
            let characteristic = characteristic.clone();
            let events = events.clone();
            async move {
                let res = request(&events, |reply| PeripheralEvent::CharacteristicRead {
                    central: Central::new(req.device_address),
                    characteristic,
                    offset: req.offset,
                    reply,
                })
                .await?;
                read_result(res)
            }
            .boxed()
        }),
        ..Default::default()
    }
}

fn characteristic_write(
    characteristic: CharacteristicRef,
    without_response: bool,
    events: EventSender,
) -> CharacteristicWrite {
    CharacteristicWrite {
        write: true,
        write_without_response: without_response,
        method: CharacteristicWriteMethod::Fun(Box::new(move |value, req| {
            let characteristic = characteristic.clone();
            let events = events.clone();
            async move {
                if req.offset != 0 {
                    return Err(ReqError::NotSupported);
                }
                if let WriteOp::Command = req.op_type {
                    debug!("write command from {}", req.device_address);
                }
                let central = Central::new(req.device_address);
                let status = request(&events, |reply| PeripheralEvent::CharacteristicWrite {
                    central,
                    characteristic: characteristic.clone(),
                    value: value.clone(),
                    reply,
                })
                .await?;
                if status.is_success() {
                    events
                        .send(PeripheralEvent::CharacteristicWriteCompleted {
                            central,
                            characteristic,
                            value,
                        })
                        .ok();
                }
                write_result(status)
            }
            .boxed()
        })),
        ..Default::default()
    }
}

fn descriptor_read(descriptor: DescriptorRef, events: EventSender) -> DescriptorRead {
    DescriptorRead {
        read: true,
        fun: Box::new(move |req| {
            let descriptor = descriptor.clone();
            let events = events.clone();
            async move {
                let res = request(&events, |reply| PeripheralEvent::DescriptorRead {
                    central: Central::new(req.device_address),
                    descriptor,
                    offset: req.offset,
                    reply,
                })
                .await?;
                read_result(res)
            }
            .boxed()
        }),
        ..Default::default()
    }
}

fn descriptor_write(descriptor: DescriptorRef, events: EventSender) -> DescriptorWrite {
    DescriptorWrite {
        write: true,
        fun: Box::new(move |value, req| {
            let descriptor = descriptor.clone();
            let events = events.clone();
            async move {
                if req.offset != 0 {
                    return Err(ReqError::NotSupported);
                }
                let status = request(&events, |reply| PeripheralEvent::DescriptorWrite {
                    central: Central::new(req.device_address),
                    descriptor,
                    value,
                    reply,
                })
                .await?;
                write_result(status)
            }
            .boxed()
        }),
        ..Default::default()
    }
}

fn notify_method(
    characteristic: CharacteristicRef,
    values: broadcast::Sender<Vec<u8>>,
    events: EventSender,
) -> CharacteristicNotifyMethod {
    CharacteristicNotifyMethod::Fun(Box::new(move |notifier| {
        let session = notify_session(
            notifier,
            values.subscribe(),
            characteristic.clone(),
            events.clone(),
        );
        async move {
            tokio::spawn(session);
        }
        .boxed()
    }))
}

/// Forward values to one subscriber until it unsubscribes.
///
/// BlueZ doesn't tell which central started a notify session, those are reported with the
/// `00:00:00:00:00:00` address.
async fn notify_session(
    mut notifier: CharacteristicNotifier,
    mut values: broadcast::Receiver<Vec<u8>>,
    characteristic: CharacteristicRef,
    events: EventSender,
) {
    let central = Central::new(Address::any());
    events
        .send(PeripheralEvent::NotifyingEnabled {
            central,
            characteristic: characteristic.clone(),
        })
        .ok();

    loop {
        let value = tokio::select! {
            x = values.recv() => x,
            _ = notifier.stopped() => break,
        };
        let value = match value {
            Ok(x) => x,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("skipped {} notifications for `{}`", n, characteristic.uuid);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let status = match notifier.notify(value.clone()).await {
            Ok(()) => GattStatus::Success,
            Err(e) => {
                warn!("failed to notify `{}`: {}", characteristic.uuid, e);
                GattStatus::UnlikelyError
            }
        };
        events
            .send(PeripheralEvent::NotificationSent {
                central,
                value,
                characteristic: characteristic.clone(),
                status,
            })
            .ok();
        if !status.is_success() {
            break;
        }
    }

    events
        .send(PeripheralEvent::NotifyingDisabled {
            central,
            characteristic,
        })
        .ok();
}
