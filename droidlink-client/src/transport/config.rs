use std::time::Duration;

const DEFAULT_ACK_TIMEOUT: u64 = 500; // ms
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BUSY_RETRY_INTERVAL: u64 = 50; // ms
const DEFAULT_MAX_BUSY_RETRIES: u32 = 5;

const DEFAULT_RECV_TIMEOUT: u64 = 100; // ms
const DEFAULT_JOIN_TIMEOUT: u64 = 3000; // ms
const DEFAULT_RECV_BUFFER_SIZE: usize = 65536;

const DEFAULT_CONNECT_TIMEOUT: u64 = 3000; // ms

/// Acknowledgement tracking of commands sent to a device
#[derive(Debug, Clone)]
pub struct AckConfig {
    /// Duration to wait for an ACK before resending the command
    ack_timeout: Duration,

    /// The number of resends before the command is reported as failed
    max_retries: u32,

    /// Delay before resending a command the device reported as busy
    busy_retry_interval: Duration,

    /// The number of busy resends before the command is reported as failed
    max_busy_retries: u32,
}

impl AckConfig {
    pub fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(DEFAULT_ACK_TIMEOUT),
            max_retries: DEFAULT_MAX_RETRIES,
            busy_retry_interval: Duration::from_millis(DEFAULT_BUSY_RETRY_INTERVAL),
            max_busy_retries: DEFAULT_MAX_BUSY_RETRIES,
        }
    }

    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    pub fn with_ack_timeout(mut self, value: Duration) -> Self {
        assert!(value > Duration::from_millis(0));
        self.ack_timeout = value;

        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn with_max_retries(mut self, value: u32) -> Self {
        self.max_retries = value;

        self
    }

    pub fn busy_retry_interval(&self) -> Duration {
        self.busy_retry_interval
    }

    pub fn with_busy_retry_interval(mut self, value: Duration) -> Self {
        self.busy_retry_interval = value;

        self
    }

    pub fn max_busy_retries(&self) -> u32 {
        self.max_busy_retries
    }

    pub fn with_max_busy_retries(mut self, value: u32) -> Self {
        self.max_busy_retries = value;

        self
    }
}

/// Command session over UDP. Non-protocol datagrams received on
/// the same socket are forwarded as video payload.
#[derive(Debug, Clone)]
pub struct UdpSessionConfig {
    ack: AckConfig,

    /// Read timeout of the receive loop, bounds how long stopping the session can block
    recv_timeout: Duration,

    /// Size of the datagram receive buffer
    recv_buffer_size: usize,

    join_timeout: Duration,
}

impl UdpSessionConfig {
    pub fn default() -> Self {
        Self {
            ack: AckConfig::default(),
            recv_timeout: Duration::from_millis(DEFAULT_RECV_TIMEOUT),
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
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

    pub fn recv_timeout(&self) -> Duration {
        self.recv_timeout
    }

    pub fn with_recv_timeout(mut self, value: Duration) -> Self {
        assert!(value > Duration::from_millis(0));
        self.recv_timeout = value;

        self
    }

    pub fn recv_buffer_size(&self) -> usize {
        self.recv_buffer_size
    }

    pub fn with_recv_buffer_size(mut self, value: usize) -> Self {
        assert!(value >= droidlink_shared::HEADER_SIZE);
        self.recv_buffer_size = value;

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

/// Video stream received over TCP in the VID0 framing
#[derive(Debug, Clone)]
pub struct TcpVideoConfig {
    connect_timeout: Duration,

    recv_timeout: Duration,

    recv_buffer_size: usize,

    join_timeout: Duration,
}

impl TcpVideoConfig {
    pub fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT),
            recv_timeout: Duration::from_millis(DEFAULT_RECV_TIMEOUT),
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            join_timeout: Duration::from_millis(DEFAULT_JOIN_TIMEOUT),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn with_connect_timeout(mut self, value: Duration) -> Self {
        assert!(value > Duration::from_millis(0));
        self.connect_timeout = value;

        self
    }

    pub fn recv_timeout(&self) -> Duration {
        self.recv_timeout
    }

    pub fn with_recv_timeout(mut self, value: Duration) -> Self {
        assert!(value > Duration::from_millis(0));
        self.recv_timeout = value;

        self
    }

    pub fn recv_buffer_size(&self) -> usize {
        self.recv_buffer_size
    }

    pub fn with_recv_buffer_size(mut self, value: usize) -> Self {
        assert!(value > 0);
        self.recv_buffer_size = value;

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
