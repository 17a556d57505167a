use std::time::Duration;

const DEFAULT_DPB_SLOT_COUNT: usize = 17;
const DEFAULT_QUEUE_CAPACITY: usize = 32;
const DEFAULT_REORDER_DEPTH: usize = 2;
const DEFAULT_MAX_REORDER_FRAMES: usize = 16;
const DEFAULT_POLL_INTERVAL: u64 = 100; // ms
const DEFAULT_JOIN_TIMEOUT: u64 = 3000; // ms

#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Number of decoded picture buffer slots in the pool
    dpb_slot_count: usize,

    /// Access units waiting for the decode thread
    queue_capacity: usize,

    /// Reorder depth used when the SPS does not declare one
    default_reorder_depth: usize,

    /// Upper bound of the reorder buffer regardless of what the stream declares
    max_reorder_frames: usize,

    /// How long the decode thread waits on an empty queue before checking for shutdown
    poll_interval: Duration,

    join_timeout: Duration,
}

impl DecoderConfig {
    pub fn default() -> Self {
        Self {
            dpb_slot_count: DEFAULT_DPB_SLOT_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            default_reorder_depth: DEFAULT_REORDER_DEPTH,
            max_reorder_frames: DEFAULT_MAX_REORDER_FRAMES,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL),
            join_timeout: Duration::from_millis(DEFAULT_JOIN_TIMEOUT),
        }
    }

    pub fn dpb_slot_count(&self) -> usize {
        self.dpb_slot_count
    }

    pub fn with_dpb_slot_count(mut self, value: usize) -> Self {
        assert!(value > 0);
        self.dpb_slot_count = value;

        self
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn with_queue_capacity(mut self, value: usize) -> Self {
        assert!(value > 0);
        self.queue_capacity = value;

        self
    }

    pub fn default_reorder_depth(&self) -> usize {
        self.default_reorder_depth
    }

    pub fn with_default_reorder_depth(mut self, value: usize) -> Self {
        self.default_reorder_depth = value;

        self
    }

    pub fn max_reorder_frames(&self) -> usize {
        self.max_reorder_frames
    }

    pub fn with_max_reorder_frames(mut self, value: usize) -> Self {
        self.max_reorder_frames = value;

        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn with_poll_interval(mut self, value: Duration) -> Self {
        assert!(value > Duration::from_millis(0));
        self.poll_interval = value;

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
