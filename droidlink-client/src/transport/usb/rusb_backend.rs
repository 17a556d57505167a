use super::{
    is_accessory, is_android_vendor, AccessoryEndpoints, BusLocation, UsbBackend, UsbDeviceInfo,
    UsbError, UsbHandle,
};
use log::*;
use rusb::{Context, DeviceHandle, Direction, TransferType, UsbContext};
use std::time::Duration;

/// Backend over libusb
pub struct RusbBackend {
    context: Context,
}

impl RusbBackend {
    pub fn new() -> Result<Self, UsbError> {
        Ok(Self {
            context: Context::new()?,
        })
    }
}

impl From<rusb::Error> for UsbError {
    fn from(err: rusb::Error) -> Self {
        match err {
            rusb::Error::Timeout => Self::Timeout,
            rusb::Error::NoDevice => Self::NoDevice,
            rusb::Error::Io => Self::Io,
            rusb::Error::Pipe => Self::Pipe,
            rusb::Error::Access => Self::Access,
            rusb::Error::Busy => Self::Busy,
            rusb::Error::NotFound => Self::NotFound("libusb entity".to_owned()),
            other => Self::Other(other.to_string()),
        }
    }
}

impl UsbBackend for RusbBackend {
    fn devices(&self) -> Result<Vec<UsbDeviceInfo>, UsbError> {
        let mut devices = vec![];

        for device in self.context.devices()?.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    trace!("skipping device without descriptor: {}", err);
                    continue;
                }
            };

            let (vendor_id, product_id) = (descriptor.vendor_id(), descriptor.product_id());

            // Only devices we may talk to are opened to read their serial
            let serial = if is_accessory(vendor_id, product_id) || is_android_vendor(vendor_id) {
                device
                    .open()
                    .and_then(|handle| handle.read_serial_number_string_ascii(&descriptor))
                    .ok()
            } else {
                None
            };

            devices.push(UsbDeviceInfo {
                location: BusLocation {
                    bus: device.bus_number(),
                    address: device.address(),
                },
                vendor_id,
                product_id,
                serial,
            });
        }

        Ok(devices)
    }

    fn open(&self, info: &UsbDeviceInfo) -> Result<Box<dyn UsbHandle>, UsbError> {
        let device = self
            .context
            .devices()?
            .iter()
            .find(|d| d.bus_number() == info.location.bus && d.address() == info.location.address)
            .ok_or_else(|| UsbError::NotFound(info.location.to_string()))?;

        let mut handle = device.open()?;

        if let Err(err) = handle.set_auto_detach_kernel_driver(true) {
            trace!("auto detach of kernel driver unsupported: {}", err);
        }

        Ok(Box::new(RusbHandle { handle }))
    }
}

struct RusbHandle {
    handle: DeviceHandle<Context>,
}

impl UsbHandle for RusbHandle {
    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        Ok(self
            .handle
            .read_control(request_type, request, value, index, buf, timeout)?)
    }

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError> {
        Ok(self
            .handle
            .write_control(request_type, request, value, index, buf, timeout)?)
    }

    fn claim_accessory(&mut self) -> Result<AccessoryEndpoints, UsbError> {
        let config = self.handle.device().active_config_descriptor()?;

        for interface in config.interfaces() {
            for descriptor in interface.descriptors() {
                let mut bulk_in = None;
                let mut bulk_out = None;

                for endpoint in descriptor.endpoint_descriptors() {
                    if endpoint.transfer_type() != TransferType::Bulk {
                        continue;
                    }

                    match endpoint.direction() {
                        Direction::In => bulk_in = bulk_in.or(Some(endpoint.address())),
                        Direction::Out => bulk_out = bulk_out.or(Some(endpoint.address())),
                    }
                }

                if let (Some(bulk_in), Some(bulk_out)) = (bulk_in, bulk_out) {
                    let interface = descriptor.interface_number();
                    self.handle.claim_interface(interface)?;

                    return Ok(AccessoryEndpoints {
                        interface,
                        bulk_in,
                        bulk_out,
                    });
                }
            }
        }

        Err(UsbError::NotFound("accessory bulk interface".to_owned()))
    }

    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize, UsbError> {
        Ok(self.handle.read_bulk(endpoint, buf, timeout)?)
    }

    fn write_bulk(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> Result<usize, UsbError> {
        Ok(self.handle.write_bulk(endpoint, buf, timeout)?)
    }
}
