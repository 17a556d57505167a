use super::{
    is_accessory, is_android_vendor, switch_to_accessory, AccessoryEndpoints, BusLocation,
    UsbBackend, UsbConfig, UsbDeviceInfo, UsbError, UsbHandle,
};
use crate::transport::DeviceId;
use log::*;
use std::collections::HashSet;
use std::thread;

/// An accessory-mode device with its bulk interface claimed
pub struct OpenedDevice {
    pub info: UsbDeviceInfo,
    pub handle: Box<dyn UsbHandle>,
    pub endpoints: AccessoryEndpoints,
}

impl OpenedDevice {
    pub fn device_id(&self) -> DeviceId {
        match &self.info.serial {
            Some(serial) => DeviceId(format!("usb-{}", serial)),
            None => DeviceId(format!("usb-{}", self.info.location)),
        }
    }
}

#[derive(Default)]
pub struct DiscoveryReport {
    pub opened: Vec<OpenedDevice>,
    /// Devices that were asked to switch into accessory mode
    pub switched: usize,
    /// Accessory devices that could not be opened
    pub failed: usize,
}

/// Opens every accessory-mode device not in `known`, switching eligible
/// Android devices into accessory mode and rescanning after the settle delay.
pub fn discover(
    backend: &dyn UsbBackend,
    config: &UsbConfig,
    known: &HashSet<BusLocation>,
) -> Result<DiscoveryReport, UsbError> {
    let mut report = DiscoveryReport::default();
    let mut seen = known.clone();

    let devices = backend.devices()?;
    debug!("found {} usb devices", devices.len());

    for info in devices.iter().filter(|d| !seen.contains(&d.location)) {
        if is_accessory(info.vendor_id, info.product_id) {
            open_into(backend, config, info, &mut report);
        } else if is_android_vendor(info.vendor_id) {
            match switch_device(backend, config, info) {
                Ok(()) => report.switched += 1,
                Err(err) => debug!("device {} not switched: {}", info.location, err),
            }
        }
    }

    for opened in report.opened.iter() {
        seen.insert(opened.info.location);
    }

    if report.switched == 0 {
        return Ok(report);
    }

    info!(
        "switched {} devices to accessory mode, rescanning in {:?}",
        report.switched,
        config.settle_delay()
    );
    thread::sleep(config.settle_delay());

    for info in backend
        .devices()?
        .iter()
        .filter(|d| !seen.contains(&d.location) && is_accessory(d.vendor_id, d.product_id))
    {
        open_into(backend, config, info, &mut report);
    }

    Ok(report)
}

fn open_into(
    backend: &dyn UsbBackend,
    config: &UsbConfig,
    info: &UsbDeviceInfo,
    report: &mut DiscoveryReport,
) {
    match open_accessory(backend, config, info) {
        Ok(opened) => {
            info!("opened accessory {} at {}", opened.device_id(), info.location);
            report.opened.push(opened);
        }
        Err(err) => {
            warn!("failed to open accessory at {}: {}", info.location, err);
            report.failed += 1;
        }
    }
}

/// Opens the device and claims its accessory interface, retrying since
/// a just enumerated device may not be bound to its driver yet.
pub fn open_accessory(
    backend: &dyn UsbBackend,
    config: &UsbConfig,
    info: &UsbDeviceInfo,
) -> Result<OpenedDevice, UsbError> {
    let mut attempt = 1;

    loop {
        let result = backend.open(info).and_then(|mut handle| {
            let endpoints = handle.claim_accessory()?;
            Ok((handle, endpoints))
        });

        match result {
            Ok((handle, endpoints)) => {
                return Ok(OpenedDevice {
                    info: info.clone(),
                    handle,
                    endpoints,
                })
            }
            Err(err) if err.is_fatal() || attempt >= config.open_retries() => return Err(err),
            Err(err) => {
                debug!(
                    "open attempt {}/{} for {} failed: {}",
                    attempt,
                    config.open_retries(),
                    info.location,
                    err
                );
                attempt += 1;
                thread::sleep(config.open_retry_delay());
            }
        }
    }
}

fn switch_device(
    backend: &dyn UsbBackend,
    config: &UsbConfig,
    info: &UsbDeviceInfo,
) -> Result<(), UsbError> {
    let handle = backend.open(info)?;
    let version = switch_to_accessory(handle.as_ref(), config.identity(), config.control_timeout())?;

    info!(
        "switching {:04x}:{:04x} at {} to accessory mode (protocol v{})",
        info.vendor_id, info.product_id, info.location, version
    );

    Ok(())
}
