//! BlueZ backed peripheral manager.

use bluer::gatt::local::ReqError;
use tokio::sync::mpsc::UnboundedSender;

use crate::{gatt::GattStatus, peripheral::PeripheralEvent};

mod advertisement;
mod application;
mod devices;

mod peripheral;
pub use peripheral::BluezPeripheral;

type EventSender = UnboundedSender<PeripheralEvent>;

/// Closest BlueZ error for a failed request.
fn req_error(status: GattStatus) -> ReqError {
    match status {
        GattStatus::ReadNotPermitted | GattStatus::WriteNotPermitted => ReqError::NotPermitted,
        GattStatus::InsufficientAuthentication
        | GattStatus::InsufficientAuthorization
        | GattStatus::InsufficientEncryption => ReqError::NotAuthorized,
        GattStatus::InvalidAttributeValueLength => ReqError::InvalidValueLength,
        GattStatus::RequestNotSupported => ReqError::NotSupported,
        GattStatus::ProcedureInProgress => ReqError::InProgress,
        _ => ReqError::Failed,
    }
}
