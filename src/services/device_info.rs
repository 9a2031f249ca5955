use anyhow::Result;

use crate::{
    gatt::{uuid16, Central, CharacteristicRef, GattService, Property, ReadResponse, ServiceId},
    service::ServiceHandler,
};

const SERVICE_UUID: uuid::Uuid = uuid16(0x180A);
const MANUFACTURER_NAME_UUID: uuid::Uuid = uuid16(0x2A29);
const MODEL_NUMBER_UUID: uuid::Uuid = uuid16(0x2A24);

/// Device Information Service: static manufacturer and model strings.
pub struct DeviceInformationService {
    service: GattService,
    manufacturer: String,
    model: String,
}

impl DeviceInformationService {
    pub fn new(id: ServiceId, manufacturer: &str, model: &str) -> Result<Self> {
        let service = GattService::build(id, SERVICE_UUID)
            .characteristic(MANUFACTURER_NAME_UUID, Property::Read.into())
            .characteristic(MODEL_NUMBER_UUID, Property::Read.into())
            .finish()?;
        Ok(DeviceInformationService {
            service,
            manufacturer: manufacturer.to_string(),
            model: model.to_string(),
        })
    }
}

impl ServiceHandler for DeviceInformationService {
    fn service(&self) -> &GattService {
        &self.service
    }

    fn on_characteristic_read(
        &self,
        _central: &Central,
        characteristic: &CharacteristicRef,
    ) -> ReadResponse {
        match characteristic.uuid {
            MANUFACTURER_NAME_UUID => ReadResponse::success(self.manufacturer.as_bytes()),
            MODEL_NUMBER_UUID => ReadResponse::success(self.model.as_bytes()),
            _ => ReadResponse::not_supported(),
        }
    }
}
