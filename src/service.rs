use crate::gatt::{
    Central, CharacteristicRef, DescriptorRef, GattService, GattStatus, ReadResponse,
};

/// A GATT service implementation.
///
/// Every method has a default which answers like the platform would when a request is not
/// handled, so a service only needs to implement the requests its attributes support.
/// Calls arrive one at a time from the server's event loop.
pub trait ServiceHandler: Send + Sync {
    /// The attribute tree this handler serves.
    fn service(&self) -> &GattService;

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

    /// Called after a write accepted by `on_characteristic_write` has been answered.
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
}
