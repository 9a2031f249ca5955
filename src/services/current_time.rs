use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::Result;
use uuid::Uuid;

use super::PeriodicNotifier;
use crate::{
    gatt::{
        uuid16, Central, CharacteristicRef, GattService, GattStatus, Property, ReadResponse,
        ServiceId,
    },
    peripheral::PeripheralManager,
    service::ServiceHandler,
};

const SERVICE_UUID: Uuid = uuid16(0x1805);
const CURRENT_TIME_UUID: Uuid = uuid16(0x2A2B);
const LOCAL_TIME_INFORMATION_UUID: Uuid = uuid16(0x2A0F);

/// Current Time Service, reporting UTC.
pub struct CurrentTimeService {
    service: GattService,
    notifier: PeriodicNotifier,
}

impl CurrentTimeService {
    pub fn new(id: ServiceId, peripheral: Arc<dyn PeripheralManager>) -> Result<Self> {
        let mut builder = GattService::build(id, SERVICE_UUID);
        let current_time =
            builder.add_characteristic(CURRENT_TIME_UUID, Property::Read | Property::Notify);
        let service = builder
            .characteristic(LOCAL_TIME_INFORMATION_UUID, Property::Read.into())
            .finish()?;
        let notifier = PeriodicNotifier::new(
            peripheral,
            current_time,
            Duration::from_secs(1),
            Arc::new(|| encode_current_time(SystemTime::now())),
        );
        Ok(CurrentTimeService { service, notifier })
    }
}

impl ServiceHandler for CurrentTimeService {
    fn service(&self) -> &GattService {
        &self.service
    }

    fn on_characteristic_read(
        &self,
        _central: &Central,
        characteristic: &CharacteristicRef,
    ) -> ReadResponse {
        match characteristic.uuid {
            CURRENT_TIME_UUID => ReadResponse::success(encode_current_time(SystemTime::now())),
            // UTC without daylight saving
            LOCAL_TIME_INFORMATION_UUID => ReadResponse::success(vec![0, 0]),
            _ => ReadResponse::not_supported(),
        }
    }

    fn on_characteristic_write(
        &self,
        _central: &Central,
        characteristic: &CharacteristicRef,
        _value: &[u8],
    ) -> GattStatus {
        match characteristic.uuid {
            CURRENT_TIME_UUID | LOCAL_TIME_INFORMATION_UUID => GattStatus::WriteNotPermitted,
            _ => GattStatus::RequestNotSupported,
        }
    }

    fn on_notifying_enabled(&self, central: &Central, characteristic: &CharacteristicRef) {
        if characteristic.uuid == CURRENT_TIME_UUID {
            self.notifier.subscribe(central);
        }
    }

    fn on_notifying_disabled(&self, central: &Central, characteristic: &CharacteristicRef) {
        if characteristic.uuid == CURRENT_TIME_UUID {
            self.notifier.unsubscribe(central);
        }
    }

    fn on_central_disconnected(&self, central: &Central) {
        self.notifier.unsubscribe_all(central);
    }
}

/// Days since the unix epoch to (year, month, day).
fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}

/// Encode `time` as an Exact Time 256 value with adjust reason.
fn encode_current_time(time: SystemTime) -> Vec<u8> {
    let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = since_epoch.as_secs() as i64;
    let days = secs.div_euclid(86_400);
    let secs_of_day = secs.rem_euclid(86_400);
    let (year, month, day) = civil_from_days(days);
    // 1970-01-01 was a thursday, monday = 1
    let day_of_week = ((days + 3).rem_euclid(7) + 1) as u8;
    let fractions256 = (since_epoch.subsec_millis() * 256 / 1000) as u8;

    let mut res = Vec::with_capacity(10);
    res.extend_from_slice(&(year as u16).to_le_bytes());
    res.push(month);
    res.push(day);
    res.push((secs_of_day / 3600) as u8);
    res.push((secs_of_day / 60 % 60) as u8);
    res.push((secs_of_day % 60) as u8);
    res.push(day_of_week);
    res.push(fractions256);
    // adjust reason
    res.push(0);
    res
}
