use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Traffic counters of one video source, fed by its transport and
/// sampled by the arbiter on a fixed cadence.
#[derive(Debug, Clone)]
pub struct SourceMonitor {
    inner: Arc<Mutex<MonitorState>>,
}

#[derive(Debug)]
struct MonitorState {
    packets: u64,
    bytes: u64,
    errors: u64,
    last_packet_at: Option<Instant>,
    window_start: Instant,
}

/// One reading of a source's counters since the previous sample
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSample {
    pub packet_rate: f64,
    pub byte_rate: f64,
    /// Time since the last packet, `None` if no packet was ever received
    pub latency: Option<Duration>,
    pub errors: u64,
}

impl SourceMonitor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MonitorState {
                packets: 0,
                bytes: 0,
                errors: 0,
                last_packet_at: None,
                window_start: Instant::now(),
            })),
        }
    }

    pub fn record_packet(&self, len: usize) {
        self.record_packet_at(len, Instant::now());
    }

    pub fn record_packet_at(&self, len: usize, now: Instant) {
        let mut state = self.inner.lock().unwrap();
        state.packets += 1;
        state.bytes += len as u64;
        state.last_packet_at = Some(now);
    }

    pub fn record_error(&self) {
        self.inner.lock().unwrap().errors += 1;
    }

    /// Reads the counters accumulated since the previous sample and starts a new window
    pub fn sample(&self, now: Instant) -> SourceSample {
        let mut state = self.inner.lock().unwrap();

        let elapsed = now.saturating_duration_since(state.window_start).as_secs_f64();
        let (packet_rate, byte_rate) = if elapsed > 0.0 {
            (state.packets as f64 / elapsed, state.bytes as f64 / elapsed)
        } else {
            (0.0, 0.0)
        };

        let sample = SourceSample {
            packet_rate,
            byte_rate,
            latency: state
                .last_packet_at
                .map(|at| now.saturating_duration_since(at)),
            errors: state.errors,
        };

        state.packets = 0;
        state.bytes = 0;
        state.errors = 0;
        state.window_start = now;

        sample
    }

    /// Clears every counter, used when the transport restarts
    pub fn reset(&self) {
        let mut state = self.inner.lock().unwrap();
        state.packets = 0;
        state.bytes = 0;
        state.errors = 0;
        state.last_packet_at = None;
        state.window_start = Instant::now();
    }
}
