use std::fmt::{self, Display};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum UsbError {
    #[error("usb transfer timed out")]
    Timeout,
    #[error("usb device is no longer present")]
    NoDevice,
    #[error("usb i/o error")]
    Io,
    #[error("usb endpoint stalled")]
    Pipe,
    #[error("usb access denied")]
    Access,
    #[error("usb resource busy")]
    Busy,
    #[error("usb entity not found: {0}")]
    NotFound(String),
    #[error("accessory protocol not supported (version {0})")]
    AccessoryUnsupported(u16),
    #[error("usb error: {0}")]
    Other(String),
}

impl UsbError {
    /// Errors after which the device handle is unusable
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::NoDevice => true,
            _ => false,
        }
    }

    /// Errors counted towards the consecutive error threshold
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::NoDevice => false,
            _ => true,
        }
    }
}

/// Identifies a device on the bus at enumeration time
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct BusLocation {
    pub bus: u8,
    pub address: u8,
}

impl Display for BusLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}:{:03}", self.bus, self.address)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct UsbDeviceInfo {
    pub location: BusLocation,
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial: Option<String>,
}

/// Bulk endpoint pair of the accessory interface
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct AccessoryEndpoints {
    pub interface: u8,
    pub bulk_in: u8,
    pub bulk_out: u8,
}

/// Enumerates and opens USB devices
pub trait UsbBackend: Send + Sync {
    fn devices(&self) -> Result<Vec<UsbDeviceInfo>, UsbError>;

    fn open(&self, device: &UsbDeviceInfo) -> Result<Box<dyn UsbHandle>, UsbError>;
}

/// An open device. Bulk transfers in both directions may run
/// concurrently from different threads.
pub trait UsbHandle: Send + Sync {
    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError>;

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize, UsbError>;

    /// Locates and claims the interface carrying the accessory bulk endpoints
    fn claim_accessory(&mut self) -> Result<AccessoryEndpoints, UsbError>;

    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration)
        -> Result<usize, UsbError>;

    fn write_bulk(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> Result<usize, UsbError>;
}
