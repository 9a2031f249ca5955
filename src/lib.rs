//! A BLE peripheral serving a set of GATT services.
//!
//! Callbacks from the bluetooth platform are routed by [`dispatch::GattDispatcher`] to the
//! [`service::ServiceHandler`] owning the attribute, see [`server::BluetoothServer`] for the
//! wiring.

use anyhow::{bail, Result};

pub mod advertising;
pub mod bluetooth;
pub mod config;
pub mod dispatch;
pub mod gatt;
pub mod peripheral;
pub mod registry;
pub mod server;
pub mod service;
pub mod services;

#[cfg(test)]
mod test_util;

/// Detach from the terminal. Must run before any threads are started.
pub fn deamonize() -> Result<()> {
    let res = unsafe { libc::fork() };
    match res {
        -1 => bail!("fork failed: {}", std::io::Error::last_os_error()),
        0 => {}
        _ => std::process::exit(0),
    }

    // the child is never a group leader, so this can't fail with EPERM
    let res = unsafe { libc::setsid() };
    if res == -1 {
        bail!("setsid failed: {}", std::io::Error::last_os_error());
    }
    Ok(())
}
