use super::AccessoryIdentity;
use crate::transport::AckConfig;
use std::time::Duration;

const DEFAULT_OPEN_RETRIES: u32 = 5;
const DEFAULT_OPEN_RETRY_DELAY: u64 = 200; // ms
const DEFAULT_SETTLE_DELAY: u64 = 1500; // ms
const DEFAULT_CONTROL_TIMEOUT: u64 = 1000; // ms
const DEFAULT_WRITE_TIMEOUT: u64 = 1000; // ms
const DEFAULT_READ_TIMEOUT: u64 = 50; // ms
const DEFAULT_READ_BUFFER_SIZE: usize = 16384;
const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 10;
const DEFAULT_ERROR_BACKOFF: u64 = 50; // ms
const DEFAULT_JOIN_TIMEOUT: u64 = 3000; // ms

#[derive(Debug, Clone)]
pub struct UsbConfig {
    ack: AckConfig,

    identity: AccessoryIdentity,

    /// Attempts to open a freshly enumerated accessory, its driver binding can lag
    open_retries: u32,
    open_retry_delay: Duration,

    /// Delay between switching devices to accessory mode and rescanning the bus
    settle_delay: Duration,

    control_timeout: Duration,
    write_timeout: Duration,

    /// Bulk-in timeout of the receive threads, also bounds how long stopping takes
    read_timeout: Duration,
    read_buffer_size: usize,

    /// Consecutive I/O errors after which a device is considered disconnected
    max_consecutive_errors: u32,

    /// Pause of a receive thread after a transient error
    error_backoff: Duration,

    join_timeout: Duration,
}

impl UsbConfig {
    pub fn default() -> Self {
        Self {
            ack: AckConfig::default(),
            identity: AccessoryIdentity::default(),
            open_retries: DEFAULT_OPEN_RETRIES,
            open_retry_delay: Duration::from_millis(DEFAULT_OPEN_RETRY_DELAY),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY),
            control_timeout: Duration::from_millis(DEFAULT_CONTROL_TIMEOUT),
            write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT),
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            error_backoff: Duration::from_millis(DEFAULT_ERROR_BACKOFF),
            join_timeout: Duration::from_millis(DEFAULT_JOIN_TIMEOUT),
        }
    }

    pub fn ack(&self) -> &AckConfig {
        &self.ack
    }

    pub fn with_ack(mut self, value: AckConfig) -> Self {
        self.ack = value;

        self
    }

    pub fn identity(&self) -> &AccessoryIdentity {
        &self.identity
    }

    pub fn with_identity(mut self, value: AccessoryIdentity) -> Self {
        self.identity = value;

        self
    }

    pub fn open_retries(&self) -> u32 {
        self.open_retries
    }

    pub fn with_open_retries(mut self, value: u32) -> Self {
        assert!(value >= 1);
        self.open_retries = value;

        self
    }

    pub fn open_retry_delay(&self) -> Duration {
        self.open_retry_delay
    }

    pub fn with_open_retry_delay(mut self, value: Duration) -> Self {
        self.open_retry_delay = value;

        self
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn with_settle_delay(mut self, value: Duration) -> Self {
        self.settle_delay = value;

        self
    }

    pub fn control_timeout(&self) -> Duration {
        self.control_timeout
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    pub fn with_write_timeout(mut self, value: Duration) -> Self {
        self.write_timeout = value;

        self
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn with_read_timeout(mut self, value: Duration) -> Self {
        assert!(value > Duration::from_millis(0));
        self.read_timeout = value;

        self
    }

    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    pub fn with_read_buffer_size(mut self, value: usize) -> Self {
        assert!(value >= droidlink_shared::HEADER_SIZE);
        self.read_buffer_size = value;

        self
    }

    pub fn max_consecutive_errors(&self) -> u32 {
        self.max_consecutive_errors
    }

    pub fn with_max_consecutive_errors(mut self, value: u32) -> Self {
        assert!(value >= 1);
        self.max_consecutive_errors = value;

        self
    }

    pub fn error_backoff(&self) -> Duration {
        self.error_backoff
    }

    pub fn with_error_backoff(mut self, value: Duration) -> Self {
        self.error_backoff = value;

        self
    }

    pub fn join_timeout(&self) -> Duration {
        self.join_timeout
    }

    pub fn with_join_timeout(mut self, value: Duration) -> Self {
        self.join_timeout = value;

        self
    }
}
