//! The boundary between the server and the bluetooth platform.
//!
//! A [`PeripheralManager`] accepts requests (register services, advertise, notify). Everything the
//! platform reports back, including requests from remote centrals, arrives as a
//! [`PeripheralEvent`] which is fed into a [`PeripheralCallback`] by [`deliver`].

use anyhow::Result;
use log::trace;
use tokio::sync::oneshot;

use crate::{
    advertising::{AdvertiseError, AdvertisementConfig},
    gatt::{
        Central, CharacteristicRef, DescriptorRef, GattService, GattStatus, ReadResponse,
        ServiceId,
    },
};

pub trait PeripheralManager: Send + Sync {
    /// Queue a service for registration. The outcome is reported with
    /// [`PeripheralEvent::ServiceAdded`].
    fn add_service(&self, service: &GattService) -> Result<()>;

    fn remove_all_services(&self) -> Result<()>;

    /// Request advertising. The outcome is reported with [`PeripheralEvent::AdvertisingStarted`]
    /// or [`PeripheralEvent::AdvertiseFailure`].
    fn start_advertising(&self, config: &AdvertisementConfig) -> Result<()>;

    /// Send a new value to every central which enabled notifications on the characteristic.
    /// Returns false if nobody is subscribed.
    fn notify(&self, characteristic: &CharacteristicRef, value: &[u8]) -> bool;
}

/// The callbacks a peripheral manager delivers.
///
/// The default bodies are what the platform does when the application doesn't care.
pub trait PeripheralCallback {
    fn on_service_added(&self, _status: GattStatus, _service: ServiceId) {}

    fn on_characteristic_read(
        &self,
        _central: &Central,
        _characteristic: &CharacteristicRef,
    ) -> ReadResponse {
        ReadResponse::not_supported()
    }

    fn on_characteristic_write(
        &self,
        _central: &Central,
        _characteristic: &CharacteristicRef,
        _value: &[u8],
    ) -> GattStatus {
        GattStatus::RequestNotSupported
    }

    fn on_characteristic_write_completed(
        &self,
        _central: &Central,
        _characteristic: &CharacteristicRef,
        _value: &[u8],
    ) {
    }

    fn on_descriptor_read(&self, _central: &Central, _descriptor: &DescriptorRef) -> ReadResponse {
        ReadResponse::not_supported()
    }

    fn on_descriptor_write(
        &self,
        _central: &Central,
        _descriptor: &DescriptorRef,
        _value: &[u8],
    ) -> GattStatus {
        GattStatus::RequestNotSupported
    }

    fn on_notifying_enabled(&self, _central: &Central, _characteristic: &CharacteristicRef) {}

    fn on_notifying_disabled(&self, _central: &Central, _characteristic: &CharacteristicRef) {}

    fn on_notification_sent(
        &self,
        _central: &Central,
        _value: &[u8],
        _characteristic: &CharacteristicRef,
        _status: GattStatus,
    ) {
    }

    fn on_central_connected(&self, _central: &Central) {}

    fn on_central_disconnected(&self, _central: &Central) {}

    fn on_advertising_started(&self, _config: &AdvertisementConfig) {}

    fn on_advertise_failure(&self, _error: &AdvertiseError) {}

    fn on_advertising_stopped(&self) {}
}

#[derive(Debug)]
pub enum PeripheralEvent {
    ServiceAdded {
        status: GattStatus,
        service: ServiceId,
    },
    CharacteristicRead {
        central: Central,
        characteristic: CharacteristicRef,
        offset: u16,
        reply: oneshot::Sender<ReadResponse>,
    },
    CharacteristicWrite {
        central: Central,
        characteristic: CharacteristicRef,
        value: Vec<u8>,
        reply: oneshot::Sender<GattStatus>,
    },
    CharacteristicWriteCompleted {
        central: Central,
        characteristic: CharacteristicRef,
        value: Vec<u8>,
    },
    DescriptorRead {
        central: Central,
        descriptor: DescriptorRef,
        offset: u16,
        reply: oneshot::Sender<ReadResponse>,
    },
    DescriptorWrite {
        central: Central,
        descriptor: DescriptorRef,
        value: Vec<u8>,
        reply: oneshot::Sender<GattStatus>,
    },
    NotifyingEnabled {
        central: Central,
        characteristic: CharacteristicRef,
    },
    NotifyingDisabled {
        central: Central,
        characteristic: CharacteristicRef,
    },
    NotificationSent {
        central: Central,
        value: Vec<u8>,
        characteristic: CharacteristicRef,
        status: GattStatus,
    },
    CentralConnected(Central),
    CentralDisconnected(Central),
    AdvertisingStarted(AdvertisementConfig),
    AdvertiseFailure(AdvertiseError),
    AdvertisingStopped,
}

/// Hand a single event to `callback`, answering the platform if the event expects an answer.
pub fn deliver<C: PeripheralCallback + ?Sized>(callback: &C, event: PeripheralEvent) {
    trace!("delivering {:?}", event);
    match event {
        PeripheralEvent::ServiceAdded { status, service } => {
            callback.on_service_added(status, service)
        }
        PeripheralEvent::CharacteristicRead {
            central,
            characteristic,
            offset,
            reply,
        } => {
            let res = callback
                .on_characteristic_read(&central, &characteristic)
                .at_offset(offset);
            // The requester might have timed out, nothing to do about that.
            reply.send(res).ok();
        }
        PeripheralEvent::CharacteristicWrite {
            central,
            characteristic,
            value,
            reply,
        } => {
            let status = callback.on_characteristic_write(&central, &characteristic, &value);
            reply.send(status).ok();
        }
        PeripheralEvent::CharacteristicWriteCompleted {
            central,
            characteristic,
            value,
        } => callback.on_characteristic_write_completed(&central, &characteristic, &value),
        PeripheralEvent::DescriptorRead {
            central,
            descriptor,
            offset,
            reply,
        } => {
            let res = callback
                .on_descriptor_read(&central, &descriptor)
                .at_offset(offset);
            reply.send(res).ok();
        }
        PeripheralEvent::DescriptorWrite {
            central,
            descriptor,
            value,
            reply,
        } => {
            let status = callback.on_descriptor_write(&central, &descriptor, &value);
            reply.send(status).ok();
        }
        PeripheralEvent::NotifyingEnabled {
            central,
            characteristic,
        } => callback.on_notifying_enabled(&central, &characteristic),
        PeripheralEvent::NotifyingDisabled {
            central,
            characteristic,
        } => callback.on_notifying_disabled(&central, &characteristic),
        PeripheralEvent::NotificationSent {
            central,
            value,
            characteristic,
            status,
        } => callback.on_notification_sent(&central, &value, &characteristic, status),
        PeripheralEvent::CentralConnected(central) => callback.on_central_connected(&central),
        PeripheralEvent::CentralDisconnected(central) => {
            callback.on_central_disconnected(&central)
        }
        PeripheralEvent::AdvertisingStarted(config) => callback.on_advertising_started(&config),
        PeripheralEvent::AdvertiseFailure(error) => callback.on_advertise_failure(&error),
        PeripheralEvent::AdvertisingStopped => callback.on_advertising_stopped(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gatt::{CharacteristicId, DescriptorId, ServiceId};
    use bluer::Address;
    use uuid::Uuid;

    struct Defaults;
    impl PeripheralCallback for Defaults {}

    struct Fixed;
    impl PeripheralCallback for Fixed {
        fn on_characteristic_read(&self, _: &Central, _: &CharacteristicRef) -> ReadResponse {
            ReadResponse::success(b"hello".to_vec())
        }

        fn on_descriptor_read(&self, _: &Central, _: &DescriptorRef) -> ReadResponse {
            ReadResponse::success(b"abc".to_vec())
        }

        fn on_characteristic_write(
            &self,
            _: &Central,
            _: &CharacteristicRef,
            value: &[u8],
        ) -> GattStatus {
            if value.is_empty() {
                GattStatus::InvalidAttributeValueLength
            } else {
                GattStatus::Success
            }
        }
    }

    fn characteristic() -> CharacteristicRef {
        CharacteristicRef {
            id: CharacteristicId(3),
            uuid: Uuid::nil(),
            service: Some(ServiceId(1)),
        }
    }

    fn central() -> Central {
        Central::new(Address::new([1, 2, 3, 4, 5, 6]))
    }

    #[test]
    fn default_callbacks_reject() {
        let (reply, mut recv) = oneshot::channel();
        deliver(
            &Defaults,
            PeripheralEvent::CharacteristicRead {
                central: central(),
                characteristic: characteristic(),
                offset: 0,
                reply,
            },
        );
        assert_eq!(recv.try_recv().unwrap(), ReadResponse::not_supported());

        let (reply, mut recv) = oneshot::channel();
        deliver(
            &Defaults,
            PeripheralEvent::CharacteristicWrite {
                central: central(),
                characteristic: characteristic(),
                value: vec![1],
                reply,
            },
        );
        assert_eq!(recv.try_recv().unwrap(), GattStatus::RequestNotSupported);
    }

    #[test]
    fn replies_are_sent() {
        let (reply, mut recv) = oneshot::channel();
        deliver(
            &Fixed,
            PeripheralEvent::CharacteristicRead {
                central: central(),
                characteristic: characteristic(),
                offset: 3,
                reply,
            },
        );
        assert_eq!(recv.try_recv().unwrap(), ReadResponse::success(b"lo".to_vec()));

        let (reply, mut recv) = oneshot::channel();
        deliver(
            &Fixed,
            PeripheralEvent::CharacteristicWrite {
                central: central(),
                characteristic: characteristic(),
                value: vec![],
                reply,
            },
        );
        assert_eq!(
            recv.try_recv().unwrap(),
            GattStatus::InvalidAttributeValueLength
        );
    }

    #[test]
    fn descriptor_reads_honor_offset() {
        let read = |offset| {
            let (reply, mut recv) = oneshot::channel();
            deliver(
                &Fixed,
                PeripheralEvent::DescriptorRead {
                    central: central(),
                    descriptor: DescriptorRef {
                        id: DescriptorId(4),
                        uuid: Uuid::nil(),
                        characteristic: Some(characteristic()),
                    },
                    offset,
                    reply,
                },
            );
            recv.try_recv().unwrap()
        };

        assert_eq!(read(0), ReadResponse::success(b"abc".to_vec()));
        assert_eq!(read(1), ReadResponse::success(b"bc".to_vec()));
        assert_eq!(read(3), ReadResponse::success(Vec::new()));
        assert_eq!(read(4), ReadResponse::new(GattStatus::InvalidOffset, None));
    }

    #[test]
    fn dropped_requester_is_ignored() {
        let (reply, recv) = oneshot::channel();
        drop(recv);
        deliver(
            &Fixed,
            PeripheralEvent::CharacteristicWrite {
                central: central(),
                characteristic: characteristic(),
                value: vec![1],
                reply,
            },
        );
    }
}
