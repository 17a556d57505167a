use super::VideoSource;
use crate::decoder::{DecodedFrame, FrameSink};
use std::sync::{Arc, Mutex};

/// Shared handle of the currently surfaced source
#[derive(Debug, Clone)]
pub struct ActiveSource {
    inner: Arc<Mutex<VideoSource>>,
}

impl ActiveSource {
    pub fn new(source: VideoSource) -> Self {
        Self {
            inner: Arc::new(Mutex::new(source)),
        }
    }

    pub fn get(&self) -> VideoSource {
        *self.inner.lock().unwrap()
    }

    pub fn set(&self, source: VideoSource) {
        *self.inner.lock().unwrap() = source;
    }

    pub fn is(&self, source: VideoSource) -> bool {
        self.get() == source
    }
}

/// Passes on the frames of one source only while it is the active one.
/// Both pipelines keep decoding, a switch only changes which frames surface.
pub struct ActiveSourceFilter {
    source: VideoSource,
    active: ActiveSource,
    inner: Arc<dyn FrameSink>,
}

impl ActiveSourceFilter {
    pub fn new(source: VideoSource, active: ActiveSource, inner: Arc<dyn FrameSink>) -> Self {
        Self {
            source,
            active,
            inner,
        }
    }
}

impl FrameSink for ActiveSourceFilter {
    fn on_frame(&self, frame: DecodedFrame) {
        if self.active.is(self.source) {
            self.inner.on_frame(frame);
        }
    }
}
