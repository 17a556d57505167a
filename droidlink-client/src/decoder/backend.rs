use super::DecoderError;
use log::*;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Opaque handle of a decoded image owned by the decode backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub u64);

/// Parameters a decode session is created with
#[derive(Debug, Clone, PartialEq)]
pub struct SessionParameters {
    pub width: u32,
    pub height: u32,
    pub profile_idc: u8,
    pub level_idc: u8,
    pub dpb_slot_count: usize,
    pub max_num_ref_frames: u32,
}

/// One picture submitted to the backend
#[derive(Debug)]
pub struct DecodeRequest<'a> {
    /// Complete Annex-B access unit
    pub annexb: &'a [u8],
    /// DPB slot the picture is decoded into
    pub slot: usize,
    /// Slots currently holding reference pictures
    pub references: &'a [usize],
    pub timestamp: u64,
}

/// The seam to the hardware decoder
pub trait VideoDecodeBackend: Send {
    fn create_session(&mut self, params: &SessionParameters) -> Result<(), DecoderError>;

    fn decode(&mut self, request: &DecodeRequest) -> Result<ImageHandle, DecoderError>;

    fn destroy_session(&mut self);
}

/// A picture in display order
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub image: ImageHandle,
    pub width: u32,
    pub height: u32,
    pub timestamp: u64,
    pub poc: i32,
}

/// Consumer of decoded frames. Invoked from the decode thread.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: DecodedFrame);
}

/// Stand-in backend which accepts every picture without decoding it.
/// Images are identified by slot and submission count.
#[derive(Debug, Default)]
pub struct NullDecodeBackend {
    session: Option<SessionParameters>,
    submitted: u64,
}

impl NullDecodeBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VideoDecodeBackend for NullDecodeBackend {
    fn create_session(&mut self, params: &SessionParameters) -> Result<(), DecoderError> {
        debug!(
            "null decode session {}x{} with {} slots",
            params.width, params.height, params.dpb_slot_count
        );
        self.session = Some(params.clone());
        Ok(())
    }

    fn decode(&mut self, request: &DecodeRequest) -> Result<ImageHandle, DecoderError> {
        if self.session.is_none() {
            return Err(DecoderError::NoSession);
        }

        self.submitted += 1;
        Ok(ImageHandle((self.submitted << 8) | request.slot as u64))
    }

    fn destroy_session(&mut self) {
        self.session = None;
    }
}

/// Collects frames in memory
#[derive(Clone, Default)]
pub struct FrameCollector {
    frames: Arc<Mutex<Vec<DecodedFrame>>>,
}

impl FrameCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<DecodedFrame> {
        self.frames.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for FrameCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameCollector({})", self.len())
    }
}

impl FrameSink for FrameCollector {
    fn on_frame(&self, frame: DecodedFrame) {
        self.frames.lock().unwrap().push(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_backend_requires_session() {
        let mut backend = NullDecodeBackend::new();
        let request = DecodeRequest {
            annexb: &[0, 0, 0, 1, 0x65],
            slot: 3,
            references: &[],
            timestamp: 0,
        };

        assert_eq!(backend.decode(&request).is_err(), true);

        backend
            .create_session(&SessionParameters {
                width: 640,
                height: 480,
                profile_idc: 66,
                level_idc: 30,
                dpb_slot_count: 4,
                max_num_ref_frames: 1,
            })
            .unwrap();

        assert_eq!(backend.decode(&request).unwrap(), ImageHandle((1 << 8) | 3));
    }
}
