use std::{
    sync::{
        atomic::{AtomicU16, AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use log::info;
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

pub const SERVICE_UUID: Uuid = uuid16(0x180D);
const MEASUREMENT_UUID: Uuid = uuid16(0x2A37);
const BODY_SENSOR_LOCATION_UUID: Uuid = uuid16(0x2A38);
const CONTROL_POINT_UUID: Uuid = uuid16(0x2A39);

const RESET_ENERGY_EXPENDED: u8 = 0x01;

const FLAG_VALUE_U16: u8 = 0x01;
const FLAG_ENERGY_EXPENDED: u8 = 0x08;

/// Simulated heart rate sensor.
///
/// The measurement cycles through a fixed range, energy expended goes up by one kJ per
/// measurement until a central resets it through the control point.
pub struct HeartRateService {
    service: GattService,
    sensor_location: u8,
    state: Arc<SensorState>,
    notifier: PeriodicNotifier,
}

#[derive(Default)]
struct SensorState {
    beat: AtomicU32,
    energy: AtomicU16,
}

impl SensorState {
    fn measure(&self) -> Vec<u8> {
        let beat = self.beat.fetch_add(1, Ordering::Relaxed);
        let energy = self.energy.fetch_add(1, Ordering::Relaxed);
        encode_measurement(80 + (beat % 20) as u16, Some(energy))
    }
}

fn encode_measurement(bpm: u16, energy_expended: Option<u16>) -> Vec<u8> {
    let mut flags = 0;
    let mut res = vec![0];
    if let Ok(bpm) = u8::try_from(bpm) {
        res.push(bpm);
    } else {
        flags |= FLAG_VALUE_U16;
        res.extend_from_slice(&bpm.to_le_bytes());
    }
    if let Some(energy) = energy_expended {
        flags |= FLAG_ENERGY_EXPENDED;
        res.extend_from_slice(&energy.to_le_bytes());
    }
    res[0] = flags;
    res
}

impl HeartRateService {
    pub fn new(
        id: ServiceId,
        sensor_location: u8,
        peripheral: Arc<dyn PeripheralManager>,
    ) -> Result<Self> {
        let mut builder = GattService::build(id, SERVICE_UUID);
        let measurement = builder.add_characteristic(MEASUREMENT_UUID, Property::Notify.into());
        let service = builder
            .characteristic(BODY_SENSOR_LOCATION_UUID, Property::Read.into())
            .characteristic(CONTROL_POINT_UUID, Property::Write.into())
            .finish()?;
        let state = Arc::new(SensorState::default());
        let notifier_state = state.clone();
        let notifier = PeriodicNotifier::new(
            peripheral,
            measurement,
            Duration::from_secs(1),
            Arc::new(move || notifier_state.measure()),
        );
        Ok(HeartRateService {
            service,
            sensor_location,
            state,
            notifier,
        })
    }
}

impl ServiceHandler for HeartRateService {
    fn service(&self) -> &GattService {
        &self.service
    }

    fn on_characteristic_read(
        &self,
        _central: &Central,
        characteristic: &CharacteristicRef,
    ) -> ReadResponse {
        match characteristic.uuid {
            BODY_SENSOR_LOCATION_UUID => ReadResponse::success(vec![self.sensor_location]),
            _ => ReadResponse::not_supported(),
        }
    }

    fn on_characteristic_write(
        &self,
        _central: &Central,
        characteristic: &CharacteristicRef,
        value: &[u8],
    ) -> GattStatus {
        if characteristic.uuid != CONTROL_POINT_UUID {
            return GattStatus::RequestNotSupported;
        }
        match value {
            [RESET_ENERGY_EXPENDED] => GattStatus::Success,
            [_] => GattStatus::ValueNotAllowed,
            _ => GattStatus::InvalidAttributeValueLength,
        }
    }

    fn on_characteristic_write_completed(
        &self,
        central: &Central,
        characteristic: &CharacteristicRef,
        value: &[u8],
    ) {
        if characteristic.uuid == CONTROL_POINT_UUID && value == [RESET_ENERGY_EXPENDED] {
            info!("{} reset energy expended", central);
            self.state.energy.store(0, Ordering::Relaxed);
        }
    }

    fn on_notifying_enabled(&self, central: &Central, characteristic: &CharacteristicRef) {
        if characteristic.uuid == self.notifier.characteristic().uuid {
            self.notifier.subscribe(central);
        }
    }

    fn on_notifying_disabled(&self, central: &Central, characteristic: &CharacteristicRef) {
        if characteristic.uuid == self.notifier.characteristic().uuid {
            self.notifier.unsubscribe(central);
        }
    }

    fn on_central_disconnected(&self, central: &Central) {
        self.notifier.unsubscribe_all(central);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::{central, RecordingPeripheral};

    fn hrs() -> (HeartRateService, Arc<RecordingPeripheral>) {
        let peripheral = Arc::new(RecordingPeripheral::default());
        (
            HeartRateService::new(ServiceId(0x30), 1, peripheral.clone()).unwrap(),
            peripheral,
        )
    }

    #[test]
    fn measurement_encoding() {
        assert_eq!(encode_measurement(72, None), vec![0x00, 72]);
        assert_eq!(encode_measurement(300, None), vec![0x01, 0x2C, 0x01]);
        assert_eq!(
            encode_measurement(90, Some(0x0102)),
            vec![0x08, 90, 0x02, 0x01]
        );
    }

    #[test]
    fn control_point() {
        let (hrs, _) = hrs();
        let cp = hrs.service().characteristic(CONTROL_POINT_UUID).unwrap();
        let c = central(1);

        assert_eq!(hrs.on_characteristic_write(&c, &cp, &[2]), GattStatus::ValueNotAllowed);
        assert_eq!(
            hrs.on_characteristic_write(&c, &cp, &[1, 1]),
            GattStatus::InvalidAttributeValueLength
        );

        hrs.state.measure();
        hrs.state.measure();
        assert_eq!(hrs.state.energy.load(Ordering::Relaxed), 2);
        assert_eq!(hrs.on_characteristic_write(&c, &cp, &[1]), GattStatus::Success);
        hrs.on_characteristic_write_completed(&c, &cp, &[1]);
        assert_eq!(hrs.state.energy.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn sensor_location() {
        let (hrs, _) = hrs();
        let location = hrs
            .service()
            .characteristic(BODY_SENSOR_LOCATION_UUID)
            .unwrap();
        assert_eq!(
            hrs.on_characteristic_read(&central(1), &location),
            ReadResponse::success(vec![1])
        );
        let measurement = hrs.service().characteristic(MEASUREMENT_UUID).unwrap();
        assert_eq!(
            hrs.on_characteristic_read(&central(1), &measurement),
            ReadResponse::not_supported()
        );
    }

    #[tokio::test]
    async fn notifies_measurements() {
        let (hrs, peripheral) = hrs();
        let measurement = hrs.service().characteristic(MEASUREMENT_UUID).unwrap();

        hrs.on_notifying_enabled(&central(1), &measurement);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let notified = peripheral.notified();
        assert_eq!(notified[0], (measurement.clone(), vec![0x08, 80, 0, 0]));

        hrs.on_notifying_disabled(&central(1), &measurement);
        assert!(!hrs.notifier.is_notifying());
    }

    #[tokio::test]
    async fn second_session_keeps_notifying() {
        let (hrs, _) = hrs();
        let measurement = hrs.service().characteristic(MEASUREMENT_UUID).unwrap();
        let any = Central::new(bluer::Address::any());

        hrs.on_notifying_enabled(&any, &measurement);
        hrs.on_notifying_enabled(&any, &measurement);
        hrs.on_notifying_disabled(&any, &measurement);
        assert!(hrs.notifier.is_notifying());

        hrs.on_central_disconnected(&any);
        assert!(!hrs.notifier.is_notifying());
    }
}
