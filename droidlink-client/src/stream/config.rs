const DEFAULT_MAX_NAL_SIZE: usize = 4 * 1024 * 1024;
const DEFAULT_MAX_VID0_FRAME_SIZE: usize = 256 * 1024;
const DEFAULT_MAX_VID0_BUFFER_SIZE: usize = 8 * 1024 * 1024;
const DEFAULT_MAX_FRAMES_PER_PASS: usize = 1024;
const DEFAULT_DEDUP_WINDOW: usize = 64;

#[derive(Debug, Clone)]
pub struct ReassemblyConfig {
    /// Largest NAL a fragmented unit or the Annex-B accumulator may grow to
    max_nal_size: usize,

    /// Largest RTP packet length accepted in a VID0 frame header
    max_vid0_frame_size: usize,

    /// Hard cap of the VID0 rolling buffer, exceeding it clears the buffer
    max_vid0_buffer_size: usize,

    /// Frames extracted per VID0 parse pass
    max_frames_per_pass: usize,

    /// Number of recent RTP sequence numbers remembered for dropping duplicates
    dedup_window: usize,
}

impl ReassemblyConfig {
    pub fn default() -> Self {
        Self {
            max_nal_size: DEFAULT_MAX_NAL_SIZE,
            max_vid0_frame_size: DEFAULT_MAX_VID0_FRAME_SIZE,
            max_vid0_buffer_size: DEFAULT_MAX_VID0_BUFFER_SIZE,
            max_frames_per_pass: DEFAULT_MAX_FRAMES_PER_PASS,
            dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }

    pub fn max_nal_size(&self) -> usize {
        self.max_nal_size
    }

    pub fn with_max_nal_size(mut self, value: usize) -> Self {
        assert!(value > 0);
        self.max_nal_size = value;

        self
    }

    pub fn max_vid0_frame_size(&self) -> usize {
        self.max_vid0_frame_size
    }

    pub fn with_max_vid0_frame_size(mut self, value: usize) -> Self {
        assert!(value > 0);
        self.max_vid0_frame_size = value;

        self
    }

    pub fn max_vid0_buffer_size(&self) -> usize {
        self.max_vid0_buffer_size
    }

    pub fn with_max_vid0_buffer_size(mut self, value: usize) -> Self {
        self.max_vid0_buffer_size = value;

        self
    }

    pub fn max_frames_per_pass(&self) -> usize {
        self.max_frames_per_pass
    }

    pub fn with_max_frames_per_pass(mut self, value: usize) -> Self {
        assert!(value > 0);
        self.max_frames_per_pass = value;

        self
    }

    pub fn dedup_window(&self) -> usize {
        self.dedup_window
    }

    pub fn with_dedup_window(mut self, value: usize) -> Self {
        self.dedup_window = value;

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReassemblyConfig::default();

        assert_eq!(config.max_nal_size(), DEFAULT_MAX_NAL_SIZE);
        assert_eq!(config.max_vid0_frame_size(), DEFAULT_MAX_VID0_FRAME_SIZE);
        assert_eq!(config.max_vid0_buffer_size(), DEFAULT_MAX_VID0_BUFFER_SIZE);
        assert_eq!(config.dedup_window(), DEFAULT_DEDUP_WINDOW);
    }
}
