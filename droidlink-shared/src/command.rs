use byteorder::{ByteOrder, LittleEndian};
use std::convert::TryFrom;
use thiserror::Error;

pub const CMD_TAP: u8 = 0x01;
pub const CMD_SWIPE: u8 = 0x02;
pub const CMD_LONG_PRESS: u8 = 0x03;
pub const CMD_KEY: u8 = 0x04;
pub const CMD_CLICK_BY_ID: u8 = 0x05;
pub const CMD_CLICK_BY_TEXT: u8 = 0x06;
pub const CMD_BACK: u8 = 0x07;
pub const CMD_HOME: u8 = 0x08;
pub const CMD_VIDEO_FPS: u8 = 0x10;
pub const CMD_VIDEO_ROUTE: u8 = 0x11;
pub const CMD_VIDEO_IDR: u8 = 0x12;
pub const CMD_PING: u8 = 0x20;
pub const CMD_ACK: u8 = 0x80;

/// Offset of the status byte within an ACK payload
pub const ACK_STATUS_OFFSET: usize = 0;

#[derive(Debug, PartialEq, Clone)]
pub enum Command {
    Tap {
        x: u16,
        y: u16,
    },
    Swipe {
        x1: u16,
        y1: u16,
        x2: u16,
        y2: u16,
        duration_ms: u32,
    },
    LongPress {
        x: u16,
        y: u16,
        duration_ms: u32,
    },
    Key(u32),
    ClickById(String),
    ClickByText(String),
    Back,
    Home,
    VideoFps(u8),
    VideoRoute(VideoRoute),
    VideoIdr,
    Ping,
    Ack(AckStatus),
}

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum AckStatus {
    Ok,
    Busy,
    Error(u8),
}

/// Which link the device should stream video over
#[derive(Debug, PartialEq, Copy, Clone)]
pub enum VideoRoute {
    Usb,
    Wifi,
    Both,
}

#[derive(Error, Debug, PartialEq)]
pub enum CommandParseError {
    #[error("unknown command type id: {0:#04x}")]
    UnknownType(u8),
    #[error("payload for command {0:#04x} is too short, expected {1} bytes but got {2}")]
    PayloadTooShort(u8, usize, usize),
    #[error("payload for command {0:#04x} is not valid utf-8")]
    InvalidText(u8),
    #[error("unknown video route: {0}")]
    UnknownRoute(u8),
}

impl Command {
    pub fn type_id(&self) -> u8 {
        match self {
            Self::Tap { .. } => CMD_TAP,
            Self::Swipe { .. } => CMD_SWIPE,
            Self::LongPress { .. } => CMD_LONG_PRESS,
            Self::Key(_) => CMD_KEY,
            Self::ClickById(_) => CMD_CLICK_BY_ID,
            Self::ClickByText(_) => CMD_CLICK_BY_TEXT,
            Self::Back => CMD_BACK,
            Self::Home => CMD_HOME,
            Self::VideoFps(_) => CMD_VIDEO_FPS,
            Self::VideoRoute(_) => CMD_VIDEO_ROUTE,
            Self::VideoIdr => CMD_VIDEO_IDR,
            Self::Ping => CMD_PING,
            Self::Ack(_) => CMD_ACK,
        }
    }

    /// Pings and acknowledgements are fire-and-forget,
    /// every other command is tracked until the peer acknowledges it.
    pub fn expects_ack(&self) -> bool {
        match self {
            Self::Ping | Self::Ack(_) => false,
            _ => true,
        }
    }

    pub fn serialise(&self) -> Vec<u8> {
        match self {
            Self::Tap { x, y } => {
                let mut buff = vec![0u8; 4];
                LittleEndian::write_u16(&mut buff[0..2], *x);
                LittleEndian::write_u16(&mut buff[2..4], *y);
                buff
            }
            Self::Swipe {
                x1,
                y1,
                x2,
                y2,
                duration_ms,
            } => {
                let mut buff = vec![0u8; 12];
                LittleEndian::write_u16(&mut buff[0..2], *x1);
                LittleEndian::write_u16(&mut buff[2..4], *y1);
                LittleEndian::write_u16(&mut buff[4..6], *x2);
                LittleEndian::write_u16(&mut buff[6..8], *y2);
                LittleEndian::write_u32(&mut buff[8..12], *duration_ms);
                buff
            }
            Self::LongPress { x, y, duration_ms } => {
                let mut buff = vec![0u8; 8];
                LittleEndian::write_u16(&mut buff[0..2], *x);
                LittleEndian::write_u16(&mut buff[2..4], *y);
                LittleEndian::write_u32(&mut buff[4..8], *duration_ms);
                buff
            }
            Self::Key(keycode) => {
                let mut buff = vec![0u8; 4];
                LittleEndian::write_u32(&mut buff[..], *keycode);
                buff
            }
            Self::ClickById(id) => id.as_bytes().to_vec(),
            Self::ClickByText(text) => text.as_bytes().to_vec(),
            Self::Back | Self::Home | Self::VideoIdr | Self::Ping => vec![],
            Self::VideoFps(fps) => vec![*fps],
            Self::VideoRoute(route) => vec![route.to_byte()],
            Self::Ack(status) => vec![status.to_byte()],
        }
    }

    pub fn deserialise(type_id: u8, payload: &[u8]) -> Result<Self, CommandParseError> {
        let command = match type_id {
            CMD_TAP => {
                expect_len(type_id, payload, 4)?;
                Self::Tap {
                    x: LittleEndian::read_u16(&payload[0..2]),
                    y: LittleEndian::read_u16(&payload[2..4]),
                }
            }
            CMD_SWIPE => {
                expect_len(type_id, payload, 12)?;
                Self::Swipe {
                    x1: LittleEndian::read_u16(&payload[0..2]),
                    y1: LittleEndian::read_u16(&payload[2..4]),
                    x2: LittleEndian::read_u16(&payload[4..6]),
                    y2: LittleEndian::read_u16(&payload[6..8]),
                    duration_ms: LittleEndian::read_u32(&payload[8..12]),
                }
            }
            CMD_LONG_PRESS => {
                expect_len(type_id, payload, 8)?;
                Self::LongPress {
                    x: LittleEndian::read_u16(&payload[0..2]),
                    y: LittleEndian::read_u16(&payload[2..4]),
                    duration_ms: LittleEndian::read_u32(&payload[4..8]),
                }
            }
            CMD_KEY => {
                expect_len(type_id, payload, 4)?;
                Self::Key(LittleEndian::read_u32(&payload[0..4]))
            }
            CMD_CLICK_BY_ID => Self::ClickById(parse_text(type_id, payload)?),
            CMD_CLICK_BY_TEXT => Self::ClickByText(parse_text(type_id, payload)?),
            CMD_BACK => Self::Back,
            CMD_HOME => Self::Home,
            CMD_VIDEO_FPS => {
                expect_len(type_id, payload, 1)?;
                Self::VideoFps(payload[0])
            }
            CMD_VIDEO_ROUTE => {
                expect_len(type_id, payload, 1)?;
                Self::VideoRoute(VideoRoute::try_from(payload[0])?)
            }
            CMD_VIDEO_IDR => Self::VideoIdr,
            CMD_PING => Self::Ping,
            CMD_ACK => {
                expect_len(type_id, payload, ACK_STATUS_OFFSET + 1)?;
                Self::Ack(AckStatus::from_byte(payload[ACK_STATUS_OFFSET]))
            }
            id => return Err(CommandParseError::UnknownType(id)),
        };

        Ok(command)
    }
}

fn expect_len(type_id: u8, payload: &[u8], len: usize) -> Result<(), CommandParseError> {
    if payload.len() < len {
        return Err(CommandParseError::PayloadTooShort(
            type_id,
            len,
            payload.len(),
        ));
    }

    Ok(())
}

fn parse_text(type_id: u8, payload: &[u8]) -> Result<String, CommandParseError> {
    String::from_utf8(payload.to_vec()).map_err(|_| CommandParseError::InvalidText(type_id))
}

impl AckStatus {
    pub fn from_byte(value: u8) -> Self {
        match value {
            0 => Self::Ok,
            1 => Self::Busy,
            code => Self::Error(code),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Busy => 1,
            Self::Error(code) => code,
        }
    }
}

impl VideoRoute {
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Usb => 0,
            Self::Wifi => 1,
            Self::Both => 2,
        }
    }
}

impl TryFrom<u8> for VideoRoute {
    type Error = CommandParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Usb),
            1 => Ok(Self::Wifi),
            2 => Ok(Self::Both),
            other => Err(CommandParseError::UnknownRoute(other)),
        }
    }
}
