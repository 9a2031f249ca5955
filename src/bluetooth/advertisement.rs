use bluer::{
    adv::{Advertisement, Feature, Type},
    ErrorKind,
};

use crate::advertising::{AdvertiseError, AdvertisementConfig};

/// Translate an advertisement request for BlueZ.
///
/// BlueZ decides itself which packet carries what. The local name ends up in the scan response
/// when the advertising packet is full, which it is with a 128 bit service uuid.
pub fn to_bluer(config: &AdvertisementConfig, device_name: &str) -> Advertisement {
    let settings = &config.settings;
    let data = &config.advertise_data;
    let scan = &config.scan_response;

    let mut system_includes = std::collections::BTreeSet::new();
    if data.include_tx_power || scan.include_tx_power {
        system_includes.insert(Feature::TxPower);
    }

    let include_name = data.include_device_name || scan.include_device_name;

    Advertisement {
        advertisement_type: if settings.connectable {
            Type::Peripheral
        } else {
            Type::Broadcast
        },
        service_uuids: data
            .service_uuids
            .iter()
            .chain(scan.service_uuids.iter())
            .copied()
            .collect(),
        discoverable: Some(settings.connectable),
        local_name: include_name.then(|| device_name.to_string()),
        system_includes,
        timeout: settings.timeout,
        min_interval: Some(settings.mode.interval()),
        max_interval: Some(settings.mode.interval()),
        tx_power: Some(settings.tx_power.dbm()),
        ..Default::default()
    }
}

pub fn advertise_error(e: bluer::Error) -> AdvertiseError {
    match e.kind {
        ErrorKind::NotSupported => AdvertiseError::FeatureUnsupported,
        ErrorKind::AlreadyExists => AdvertiseError::AlreadyStarted,
        ErrorKind::InvalidLength => AdvertiseError::DataTooLarge,
        _ => AdvertiseError::InternalError(e.to_string()),
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::gatt::uuid16;

    #[test]
    fn connectable_with_name() {
        let uuid = uuid16(0x180D);
        let adv = to_bluer(&AdvertisementConfig::for_service(uuid), "watch");

        assert!(matches!(adv.advertisement_type, Type::Peripheral));
        assert_eq!(adv.service_uuids.into_iter().collect::<Vec<_>>(), vec![uuid]);
        assert_eq!(adv.local_name.as_deref(), Some("watch"));
        assert_eq!(adv.discoverable, Some(true));
        assert_eq!(adv.timeout, None);
        assert_eq!(adv.min_interval, Some(Duration::from_millis(250)));
        assert_eq!(adv.tx_power, Some(-7));
        assert!(adv.system_includes.contains(&Feature::TxPower));
    }
}
