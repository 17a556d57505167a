use std::time::Duration;

const DEFAULT_SAMPLE_INTERVAL: u64 = 250; // ms
const DEFAULT_MAX_LATENCY: u64 = 300; // ms
const DEFAULT_MIN_PACKET_RATE: f64 = 15.0; // packets/s
const DEFAULT_MAX_ERRORS: u64 = 2; // per sample
const DEFAULT_CONGESTION_SAMPLES: u32 = 4;
const DEFAULT_RECOVERY_SAMPLES: u32 = 12;
const DEFAULT_COOLDOWN: u64 = 5000; // ms
const DEFAULT_JOIN_TIMEOUT: u64 = 3000; // ms

#[derive(Debug, Clone)]
pub struct ArbiterConfig {
    /// Cadence of the monitor thread
    sample_interval: Duration,

    /// A source whose last packet is older than this is congested
    max_latency: Duration,

    /// A source receiving fewer packets per second is congested
    min_packet_rate: f64,

    /// A source reporting more errors within one sample is congested
    max_errors: u64,

    /// Consecutive congested USB samples before switching to WiFi
    congestion_samples: u32,

    /// Consecutive healthy USB samples before switching back
    recovery_samples: u32,

    /// No further switch happens within this window after a switch
    cooldown: Duration,

    join_timeout: Duration,
}

impl ArbiterConfig {
    pub fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(DEFAULT_SAMPLE_INTERVAL),
            max_latency: Duration::from_millis(DEFAULT_MAX_LATENCY),
            min_packet_rate: DEFAULT_MIN_PACKET_RATE,
            max_errors: DEFAULT_MAX_ERRORS,
            congestion_samples: DEFAULT_CONGESTION_SAMPLES,
            recovery_samples: DEFAULT_RECOVERY_SAMPLES,
            cooldown: Duration::from_millis(DEFAULT_COOLDOWN),
            join_timeout: Duration::from_millis(DEFAULT_JOIN_TIMEOUT),
        }
    }

    pub fn sample_interval(&self) -> Duration {
        self.sample_interval
    }

    pub fn with_sample_interval(mut self, value: Duration) -> Self {
        assert!(value > Duration::from_millis(0));
        self.sample_interval = value;

        self
    }

    pub fn max_latency(&self) -> Duration {
        self.max_latency
    }

    pub fn with_max_latency(mut self, value: Duration) -> Self {
        self.max_latency = value;

        self
    }

    pub fn min_packet_rate(&self) -> f64 {
        self.min_packet_rate
    }

    pub fn with_min_packet_rate(mut self, value: f64) -> Self {
        assert!(value >= 0.0);
        self.min_packet_rate = value;

        self
    }

    pub fn max_errors(&self) -> u64 {
        self.max_errors
    }

    pub fn with_max_errors(mut self, value: u64) -> Self {
        self.max_errors = value;

        self
    }

    pub fn congestion_samples(&self) -> u32 {
        self.congestion_samples
    }

    pub fn with_congestion_samples(mut self, value: u32) -> Self {
        assert!(value > 0);
        self.congestion_samples = value;

        self
    }

    pub fn recovery_samples(&self) -> u32 {
        self.recovery_samples
    }

    pub fn with_recovery_samples(mut self, value: u32) -> Self {
        assert!(value > 0);
        self.recovery_samples = value;

        self
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn with_cooldown(mut self, value: Duration) -> Self {
        self.cooldown = value;

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_is_slower_than_congestion() {
        let config = ArbiterConfig::default();

        assert!(config.recovery_samples() > config.congestion_samples());
        assert!(config.cooldown() > config.sample_interval());
    }

    #[test]
    #[should_panic]
    fn test_zero_congestion_samples_rejected() {
        ArbiterConfig::default().with_congestion_samples(0);
    }
}
