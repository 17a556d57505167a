use super::FailedCommand;
use droidlink_shared::{AckStatus, SequenceNumber};
use std::fmt::{self, Display};
use std::time::Duration;

/// Identifies one physical or logical device connection
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0[..]
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum CloseReason {
    /// The device is gone from the bus
    NoDevice,
    /// Too many consecutive I/O or pipe errors
    TooManyErrors(u32),
    /// The peer closed the connection
    ConnectionClosed,
    /// The transport was stopped by its owner
    Stopped,
}

/// Receives the notifications of a transport session.
///
/// All callbacks run on the transport's own threads and outside any
/// of its locks, so implementations must be thread-safe.
pub trait TransportEvents: Send + Sync {
    fn on_ack(&self, _device: &DeviceId, _seq: SequenceNumber, _status: AckStatus, _latency: Duration) {
    }

    /// Bytes received that are not protocol packets, forwarded unmodified
    fn on_video_data(&self, device: &DeviceId, data: &[u8]);

    fn on_device_closed(&self, _device: &DeviceId, _reason: &CloseReason) {}

    fn on_command_failed(&self, _device: &DeviceId, _failed: &FailedCommand) {}
}
