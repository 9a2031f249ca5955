//! The services this peripheral serves.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use log::{debug, error, trace};
use tokio::{runtime::Handle, task::JoinHandle};

use crate::{
    gatt::{Central, CharacteristicRef},
    peripheral::PeripheralManager,
};

mod current_time;
pub use current_time::CurrentTimeService;

mod device_info;
pub use device_info::DeviceInformationService;

mod heart_rate;
pub use heart_rate::HeartRateService;

type ValueFn = dyn Fn() -> Vec<u8> + Send + Sync;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // State behind these locks stays consistent even if a holder panicked.
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Sends a fresh value of a characteristic every `period` while at least one central is
/// subscribed.
///
/// Subscriptions are counted per central, one central may hold several notify sessions. BlueZ
/// reports every session as coming from [`bluer::Address::any`].
pub(crate) struct PeriodicNotifier {
    peripheral: Arc<dyn PeripheralManager>,
    characteristic: CharacteristicRef,
    period: Duration,
    value: Arc<ValueFn>,
    subscribers: Mutex<HashMap<Central, usize>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicNotifier {
    pub fn new(
        peripheral: Arc<dyn PeripheralManager>,
        characteristic: CharacteristicRef,
        period: Duration,
        value: Arc<ValueFn>,
    ) -> Self {
        PeriodicNotifier {
            peripheral,
            characteristic,
            period,
            value,
            subscribers: Mutex::new(HashMap::new()),
            task: Mutex::new(None),
        }
    }

    pub fn characteristic(&self) -> &CharacteristicRef {
        &self.characteristic
    }

    pub fn is_notifying(&self) -> bool {
        lock(&self.task).is_some()
    }

    pub fn subscribe(&self, central: &Central) {
        *lock(&self.subscribers).entry(*central).or_default() += 1;
        let mut task = lock(&self.task);
        if task.is_some() {
            return;
        }

        let runtime = match Handle::try_current() {
            Ok(x) => x,
            Err(e) => {
                error!("can't notify `{}`: {}", self.characteristic.uuid, e);
                return;
            }
        };
        debug!("start notifying `{}`", self.characteristic.uuid);

        let peripheral = self.peripheral.clone();
        let characteristic = self.characteristic.clone();
        let value = self.value.clone();
        let period = self.period;
        *task = Some(runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let value = value();
                if !peripheral.notify(&characteristic, &value) {
                    trace!("no subscribers for `{}`", characteristic.uuid);
                }
            }
        }));
    }

    /// End one notify session of `central`.
    pub fn unsubscribe(&self, central: &Central) {
        let mut subscribers = lock(&self.subscribers);
        let left = match subscribers.get_mut(central) {
            Some(x) => {
                *x -= 1;
                *x
            }
            None => return,
        };
        if left == 0 {
            subscribers.remove(central);
            self.stop_if_idle(&subscribers);
        }
    }

    /// Drop every session of `central`, used when it disconnects.
    pub fn unsubscribe_all(&self, central: &Central) {
        let mut subscribers = lock(&self.subscribers);
        if subscribers.remove(central).is_some() {
            self.stop_if_idle(&subscribers);
        }
    }

    fn stop_if_idle(&self, subscribers: &HashMap<Central, usize>) {
        if subscribers.is_empty() {
            if let Some(x) = lock(&self.task).take() {
                debug!("stop notifying `{}`", self.characteristic.uuid);
                x.abort();
            }
        }
    }
}

impl Drop for PeriodicNotifier {
    fn drop(&mut self) {
        if let Some(x) = lock(&self.task).take() {
            x.abort();
        }
    }
}
