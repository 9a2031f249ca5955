use anyhow::Result;
use bluer::{Adapter, AdapterEvent, Address, DeviceEvent, DeviceProperty};
use futures::{pin_mut, StreamExt};
use log::{error, trace};

use super::EventSender;
use crate::{gatt::Central, peripheral::PeripheralEvent};

/// Report centrals connecting and disconnecting for as long as the adapter exists.
pub async fn watch(adapter: Adapter, events: EventSender) {
    if let Err(e) = watch_adapter(adapter, events).await {
        error!("stopped watching bluetooth connections: {:?}", e);
    }
}

async fn watch_adapter(adapter: Adapter, events: EventSender) -> Result<()> {
    for address in adapter.device_addresses().await? {
        watch_device(&adapter, address, &events)?;
    }

    let adapter_events = adapter.events().await?;
    pin_mut!(adapter_events);
    while let Some(evt) = adapter_events.next().await {
        if let AdapterEvent::DeviceAdded(address) = evt {
            watch_device(&adapter, address, &events)?;
        }
    }
    Ok(())
}

fn watch_device(adapter: &Adapter, address: Address, events: &EventSender) -> Result<()> {
    let device = adapter.device(address)?;
    let events = events.clone();
    trace!("watching device {}", address);

    tokio::spawn(async move {
        let central = Central::new(address);
        let mut connected = false;

        let device_events = match device.events().await {
            Ok(x) => x,
            Err(e) => {
                error!("can't watch device {}: {}", address, e);
                return;
            }
        };
        pin_mut!(device_events);

        if device.is_connected().await.unwrap_or(false) {
            connected = true;
            events.send(PeripheralEvent::CentralConnected(central)).ok();
        }

        while let Some(evt) = device_events.next().await {
            let now = match evt {
                DeviceEvent::PropertyChanged(DeviceProperty::Connected(x)) => x,
                _ => continue,
            };
            if now == connected {
                continue;
            }
            connected = now;
            let event = if connected {
                PeripheralEvent::CentralConnected(central)
            } else {
                PeripheralEvent::CentralDisconnected(central)
            };
            if events.send(event).is_err() {
                return;
            }
        }

        // device was removed
        if connected {
            events.send(PeripheralEvent::CentralDisconnected(central)).ok();
        }
    });
    Ok(())
}
