use super::{UsbError, UsbHandle};
use byteorder::{ByteOrder, LittleEndian};
use log::*;
use std::time::Duration;

pub const GOOGLE_VENDOR_ID: u16 = 0x18D1;
pub const ACCESSORY_PRODUCT_IDS: std::ops::RangeInclusive<u16> = 0x2D00..=0x2D05;

pub const AOA_GET_PROTOCOL: u8 = 51;
pub const AOA_SEND_STRING: u8 = 52;
pub const AOA_START: u8 = 53;

const REQUEST_TYPE_VENDOR_IN: u8 = 0xC0;
const REQUEST_TYPE_VENDOR_OUT: u8 = 0x40;

/// Vendors whose devices are candidates for switching into accessory mode
const ANDROID_VENDOR_IDS: &[u16] = &[
    0x18D1, // Google
    0x04E8, // Samsung
    0x0BB4, // HTC
    0x22B8, // Motorola
    0x1004, // LG
    0x0FCE, // Sony
    0x12D1, // Huawei
    0x2717, // Xiaomi
    0x2A70, // OnePlus
    0x22D9, // Oppo
    0x2D95, // Vivo
    0x17EF, // Lenovo
    0x19D2, // ZTE
    0x0B05, // Asus
    0x1EBF, // Coolpad
    0x29A9, // Smartisan
];

pub fn is_accessory(vendor_id: u16, product_id: u16) -> bool {
    vendor_id == GOOGLE_VENDOR_ID && ACCESSORY_PRODUCT_IDS.contains(&product_id)
}

pub fn is_android_vendor(vendor_id: u16) -> bool {
    ANDROID_VENDOR_IDS.contains(&vendor_id)
}

/// Strings the host announces when switching a device into accessory mode
#[derive(Debug, Clone, PartialEq)]
pub struct AccessoryIdentity {
    pub manufacturer: String,
    pub model: String,
    pub description: String,
    pub version: String,
    pub uri: String,
    pub serial: String,
}

impl AccessoryIdentity {
    pub fn default() -> Self {
        Self {
            manufacturer: "Droidlink".to_owned(),
            model: "Droidlink Host".to_owned(),
            description: "Screen streaming and remote control host".to_owned(),
            version: "1.0".to_owned(),
            uri: "https://github.com/droidlink/droidlink".to_owned(),
            serial: "0000000000000001".to_owned(),
        }
    }

    /// The strings in the index order expected by SEND_STRING
    fn strings(&self) -> [&str; 6] {
        [
            &self.manufacturer[..],
            &self.model[..],
            &self.description[..],
            &self.version[..],
            &self.uri[..],
            &self.serial[..],
        ]
    }
}

pub fn get_protocol(handle: &dyn UsbHandle, timeout: Duration) -> Result<u16, UsbError> {
    let mut buff = [0u8; 2];

    let read = handle.read_control(
        REQUEST_TYPE_VENDOR_IN,
        AOA_GET_PROTOCOL,
        0,
        0,
        &mut buff,
        timeout,
    )?;

    if read < 2 {
        return Err(UsbError::Other(format!(
            "short accessory protocol response: {} bytes",
            read
        )));
    }

    Ok(LittleEndian::read_u16(&buff))
}

/// Sends the identity strings and the start request. The device
/// disconnects and re-enumerates with an accessory product id.
pub fn switch_to_accessory(
    handle: &dyn UsbHandle,
    identity: &AccessoryIdentity,
    timeout: Duration,
) -> Result<u16, UsbError> {
    let version = get_protocol(handle, timeout)?;

    if version < 1 {
        return Err(UsbError::AccessoryUnsupported(version));
    }

    for (index, value) in identity.strings().iter().enumerate() {
        let mut buff = value.as_bytes().to_vec();
        buff.push(0);

        handle.write_control(
            REQUEST_TYPE_VENDOR_OUT,
            AOA_SEND_STRING,
            0,
            index as u16,
            &buff,
            timeout,
        )?;
    }

    handle.write_control(REQUEST_TYPE_VENDOR_OUT, AOA_START, 0, 0, &[], timeout)?;
    debug!("sent accessory start request (protocol v{})", version);

    Ok(version)
}
