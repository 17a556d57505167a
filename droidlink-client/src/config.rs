use crate::stream::StreamFraming;
use anyhow::{Context, Error, Result};
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, env, fs, net::IpAddr, time::Duration};

const DEFAULT_CONTROL_PORT: u16 = 27183;
const DEFAULT_IDR_INTERVAL: u64 = 1000; // ms

/// Where the video and commands of the device travel
#[derive(PartialEq, Copy, Clone, Debug)]
pub enum ClientMode {
    Usb,
    Wifi,
    Hybrid,
}

impl ClientMode {
    pub fn uses_usb(&self) -> bool {
        *self != Self::Wifi
    }

    pub fn uses_wifi(&self) -> bool {
        *self != Self::Usb
    }
}

impl TryFrom<&str> for ClientMode {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let value = match value.to_ascii_lowercase().as_str() {
            "usb" => Self::Usb,
            "wifi" => Self::Wifi,
            "hybrid" => Self::Hybrid,
            _ => return Err(Error::msg(format!("invalid client mode: {}", value))),
        };

        Ok(value)
    }
}

#[derive(Serialize, Deserialize, PartialEq, Copy, Clone, Debug)]
#[serde(rename_all = "lowercase")]
pub enum PreferredTransport {
    Usb,
    Wifi,
}

/// One entry of the device list written by the discovery component
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct DeviceEntry {
    pub device_id: String,
    pub preferred_transport: PreferredTransport,
    #[serde(default)]
    pub ip: Option<IpAddr>,
    #[serde(default)]
    pub serial: Option<String>,
}

pub fn parse_device_list(json: &str) -> Result<Vec<DeviceEntry>> {
    let devices: Vec<DeviceEntry> =
        serde_json::from_str(json).context("could not parse device list")?;

    Ok(devices)
}

pub struct Config {
    mode: ClientMode,
    device_ip: Option<IpAddr>,
    control_port: u16,
    video_port: Option<u16>,
    usb_framing: StreamFraming,
    idr_request_interval: Duration,
    devices: Vec<DeviceEntry>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Reads the configuration through `var`, which returns the value of
    /// an environment variable if it is set
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mode = match var("DROIDLINK_MODE") {
            Some(mode) => ClientMode::try_from(mode.as_str())?,
            None => ClientMode::Wifi,
        };

        let devices = match var("DROIDLINK_DEVICES") {
            Some(path) => {
                let json = fs::read_to_string(&path)
                    .with_context(|| format!("could not read device list {}", path))?;
                parse_device_list(&json)?
            }
            None => vec![],
        };

        let device_ip = match var("DROIDLINK_DEVICE_IP") {
            Some(ip) => Some(
                ip.parse::<IpAddr>()
                    .with_context(|| format!("invalid DROIDLINK_DEVICE_IP: {}", ip))?,
            ),
            None => devices.iter().find_map(|device| device.ip),
        };

        if mode.uses_wifi() && device_ip.is_none() {
            return Err(Error::msg(
                "DROIDLINK_DEVICE_IP must be set for wifi and hybrid modes",
            ));
        }

        let control_port = parse_or(&var, "DROIDLINK_CONTROL_PORT", DEFAULT_CONTROL_PORT)?;

        let video_port = match var("DROIDLINK_VIDEO_PORT") {
            Some(port) => Some(
                port.parse::<u16>()
                    .with_context(|| format!("invalid DROIDLINK_VIDEO_PORT: {}", port))?,
            ),
            None => None,
        };

        let usb_framing = match var("DROIDLINK_USB_FRAMING") {
            Some(framing) => serde_json::from_value(serde_json::Value::String(
                framing.to_ascii_lowercase(),
            ))
            .with_context(|| format!("invalid DROIDLINK_USB_FRAMING: {}", framing))?,
            None => StreamFraming::AnnexB,
        };

        let idr_request_interval = Duration::from_millis(parse_or(
            &var,
            "DROIDLINK_IDR_INTERVAL_MS",
            DEFAULT_IDR_INTERVAL,
        )?);

        Ok(Self {
            mode,
            device_ip,
            control_port,
            video_port,
            usb_framing,
            idr_request_interval,
            devices,
        })
    }

    pub fn mode(&self) -> ClientMode {
        self.mode
    }

    pub fn device_ip(&self) -> Option<IpAddr> {
        self.device_ip
    }

    pub fn control_port(&self) -> u16 {
        self.control_port
    }

    pub fn video_port(&self) -> Option<u16> {
        self.video_port
    }

    pub fn usb_framing(&self) -> StreamFraming {
        self.usb_framing
    }

    pub fn idr_request_interval(&self) -> Duration {
        self.idr_request_interval
    }

    pub fn devices(&self) -> &[DeviceEntry] {
        &self.devices[..]
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(value) => value
            .parse::<T>()
            .with_context(|| format!("invalid {}: {}", name, value)),
        None => Ok(default),
    }
}
