use std::time::{Duration, Instant};

/// Counters kept per device session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
    pub acks_received: u64,
    pub commands_failed: u64,

    /// Smoothed round trip time between sending a command and receiving its ACK
    pub ack_latency: Duration,

    pub consecutive_errors: u32,
    pub total_errors: u64,
    pub last_received_at: Option<Instant>,
}

impl DeviceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&mut self, len: usize) {
        self.packets_sent += 1;
        self.bytes_sent += len as u64;
    }

    pub fn record_received(&mut self, len: usize, now: Instant) {
        self.packets_received += 1;
        self.bytes_received += len as u64;
        self.last_received_at = Some(now);
        self.consecutive_errors = 0;
    }

    pub fn record_ack(&mut self, latency: Duration) {
        self.acks_received += 1;

        // The latency estimate is kept by using a moving average
        // between the previous value and the new measurement.
        if self.ack_latency.as_nanos() == 0 {
            self.ack_latency = latency;
        } else {
            self.ack_latency = Duration::from_nanos(
                ((self.ack_latency.as_nanos() + latency.as_nanos()) / 2) as u64,
            );
        }
    }

    pub fn record_command_failed(&mut self) {
        self.commands_failed += 1;
    }

    /// Returns the number of consecutive errors including this one
    pub fn record_error(&mut self) -> u32 {
        self.consecutive_errors += 1;
        self.total_errors += 1;
        self.consecutive_errors
    }

    pub fn clear_errors(&mut self) {
        self.consecutive_errors = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_ack_first_measurement() {
        let mut stats = DeviceStats::new();

        stats.record_ack(Duration::from_millis(100));

        assert_eq!(stats.ack_latency, Duration::from_millis(100));
        assert_eq!(stats.acks_received, 1);
    }

    #[test]
    fn test_record_ack_average() {
        let mut stats = DeviceStats::new();
        stats.ack_latency = Duration::from_millis(150);

        stats.record_ack(Duration::from_millis(100));

        assert_eq!(stats.ack_latency, Duration::from_millis(125));
    }

    #[test]
    fn test_errors_reset_on_receive() {
        let mut stats = DeviceStats::new();

        assert_eq!(stats.record_error(), 1);
        assert_eq!(stats.record_error(), 2);

        stats.record_received(10, Instant::now());

        assert_eq!(stats.consecutive_errors, 0);
        assert_eq!(stats.total_errors, 2);
        assert_eq!(stats.bytes_received, 10);
        assert_eq!(stats.last_received_at.is_some(), true);
    }
}
