use super::{
    mark_references, unmark_all_references, Acquired, DecodeJob, DecodeRequest, DecodedFrame,
    DecoderConfig, DecoderError, Dpb, FrameSink, PendingFrame, PocState, ReorderBuffer,
    SessionParameters, VideoDecodeBackend,
};
use crate::bitstream::{ParameterSets, Pps, SliceHeader, Sps};
use crate::stream::NalType;
use log::*;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecoderState {
    /// No decode session exists yet
    NoSession,
    /// A session exists, waiting for the first IDR
    SessionReady,
    Decoding,
    /// A gap was detected, non-IDR pictures are dropped until the next IDR
    Recovering,
}

/// What happened to one access unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodeOutcome {
    Decoded,
    Dropped,
    /// Dropped while waiting for an IDR, the peer should be asked for one
    NeedsIdr,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DecoderStats {
    pub decoded: u64,
    pub frames_emitted: u64,
    pub sessions_created: u64,
    pub parameter_updates: u64,
    pub dropped_awaiting_idr: u64,
    pub dropped_continuation_slices: u64,
    pub dropped_invalid_slices: u64,
    pub submit_failures: u64,
    pub frame_num_gaps: u64,
    pub evicted_non_reference: u64,
    pub forced_reference_evictions: u64,
    pub late_frames: u64,
}

/// Turns access units into display-ordered frames for one stream.
///
/// Owned by a single decode thread. Frames are handed to the sink from
/// `decode` and `flush`, the session holds no locks while doing so.
pub struct DecoderSession {
    config: DecoderConfig,
    backend: Box<dyn VideoDecodeBackend>,
    sink: Arc<dyn FrameSink>,
    state: DecoderState,
    session: Option<SessionParameters>,
    sets: ParameterSets,
    dpb: Dpb,
    poc: PocState,
    reorder: ReorderBuffer,
    prev_ref_frame_num: Option<u32>,
    stats: DecoderStats,
}

impl DecoderSession {
    pub fn new(
        config: DecoderConfig,
        backend: Box<dyn VideoDecodeBackend>,
        sink: Arc<dyn FrameSink>,
    ) -> Self {
        Self {
            dpb: Dpb::new(config.dpb_slot_count()),
            reorder: ReorderBuffer::new(config.default_reorder_depth(), config.max_reorder_frames()),
            config,
            backend,
            sink,
            state: DecoderState::NoSession,
            session: None,
            sets: ParameterSets::new(),
            poc: PocState::new(),
            prev_ref_frame_num: None,
            stats: DecoderStats::default(),
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn stats(&self) -> &DecoderStats {
        &self.stats
    }

    pub fn session_parameters(&self) -> Option<&SessionParameters> {
        self.session.as_ref()
    }

    pub fn dpb(&self) -> &Dpb {
        &self.dpb
    }

    pub fn reorder_depth(&self) -> usize {
        self.reorder.depth()
    }

    /// Decodes one access unit. Only a failure to create the decode
    /// session is returned as an error, the stream cannot continue
    /// until the caller resets it.
    pub fn decode(&mut self, job: &DecodeJob) -> Result<DecodeOutcome, DecoderError> {
        let unit = &job.unit;
        if unit.nals.is_empty() {
            return Ok(DecodeOutcome::Dropped);
        }

        for nal in unit.nals[..unit.nals.len() - 1].iter() {
            let changed = match nal.nal_type() {
                NalType::Sps => match Sps::from_nal(nal) {
                    Ok(sps) => self.sets.insert_sps(sps),
                    Err(err) => {
                        warn!("decoder ignoring invalid sps: {}", err);
                        false
                    }
                },
                NalType::Pps => match Pps::from_nal(nal) {
                    Ok(pps) => self.sets.insert_pps(pps),
                    Err(err) => {
                        warn!("decoder ignoring invalid pps: {}", err);
                        false
                    }
                },
                _ => false,
            };

            if changed {
                self.stats.parameter_updates += 1;
            }
        }

        let header = match SliceHeader::from_nal(unit.slice(), &self.sets) {
            Ok(header) => header,
            Err(err) => {
                debug!("dropping undecodable slice: {}", err);
                self.stats.dropped_invalid_slices += 1;
                return Ok(self.drop_picture());
            }
        };

        // Each submitted access unit is one picture
        if header.first_mb_in_slice != 0 {
            trace!("dropping continuation slice at mb {}", header.first_mb_in_slice);
            self.stats.dropped_continuation_slices += 1;
            return Ok(DecodeOutcome::Dropped);
        }

        let sps = match self.sets.active(header.pps_id) {
            Ok((sps, _)) => sps.clone(),
            Err(err) => {
                debug!("dropping slice without parameter sets: {}", err);
                self.stats.dropped_invalid_slices += 1;
                return Ok(self.drop_picture());
            }
        };

        if header.is_idr {
            let mut out = vec![];
            self.reorder.flush(&mut out);
            self.emit(out);

            self.ensure_session(&sps)?;
            unmark_all_references(&mut self.dpb);
            self.poc.reset();
            self.reorder
                .set_depth(sps.reorder_depth(self.config.default_reorder_depth()));
        } else {
            match self.state {
                DecoderState::Decoding => {}
                _ => {
                    self.stats.dropped_awaiting_idr += 1;
                    return Ok(DecodeOutcome::NeedsIdr);
                }
            }

            if self.has_frame_num_gap(&sps, &header) {
                warn!(
                    "frame_num gap after {:?} at {}, recovering",
                    self.prev_ref_frame_num, header.frame_num
                );
                self.stats.frame_num_gaps += 1;
                self.stats.dropped_awaiting_idr += 1;
                self.state = DecoderState::Recovering;
                return Ok(DecodeOutcome::NeedsIdr);
            }

            if header.has_mmco5() {
                // POC restarts at 0, everything pending is shown first
                let mut out = vec![];
                self.reorder.flush(&mut out);
                self.emit(out);
            }
        }

        let slot = match self.dpb.acquire() {
            Acquired::Free(slot) => slot,
            Acquired::EvictedNonReference(slot) => {
                self.stats.evicted_non_reference += 1;
                self.reorder.remove(slot);
                slot
            }
            Acquired::ForcedReference(slot) => {
                self.stats.forced_reference_evictions += 1;
                self.reorder.remove(slot);
                slot
            }
        };

        let poc = self.poc.compute(&sps, &header);

        let annexb = unit.to_annexb();
        let references = self.dpb.reference_slots();
        let request = DecodeRequest {
            annexb: &annexb,
            slot,
            references: &references,
            timestamp: job.timestamp,
        };

        let image = match self.backend.decode(&request) {
            Ok(image) => image,
            Err(err) => {
                warn!("failed to decode picture {}: {}", poc, err);
                self.stats.submit_failures += 1;
                self.dpb.release(slot);
                return Ok(DecodeOutcome::Dropped);
            }
        };

        {
            let picture = self.dpb.slot_mut(slot);
            picture.frame_num = header.frame_num;
            picture.poc = poc;
            picture.image = Some(image);
            picture.awaiting_output = true;
        }

        mark_references(&mut self.dpb, slot, &header, &sps);

        if header.is_reference() {
            self.prev_ref_frame_num = Some(if header.has_mmco5() { 0 } else { header.frame_num });
        }

        self.state = DecoderState::Decoding;
        self.stats.decoded += 1;

        let mut out = vec![];
        let frame = PendingFrame {
            slot,
            poc,
            timestamp: job.timestamp,
        };

        if !self.reorder.insert(frame, &mut out) {
            self.stats.late_frames += 1;
            self.dpb.mark_output(slot);
        }

        self.emit(out);

        Ok(DecodeOutcome::Decoded)
    }

    /// Emits every picture still held for reordering, used on stream stop
    pub fn flush(&mut self) {
        let mut out = vec![];
        self.reorder.flush(&mut out);
        self.emit(out);
    }

    /// Destroys the decode session and forgets all stream state
    pub fn reset(&mut self) {
        if self.session.take().is_some() {
            self.backend.destroy_session();
        }

        self.sets.clear();
        self.clear_pictures();
        self.state = DecoderState::NoSession;
    }

    fn drop_picture(&mut self) -> DecodeOutcome {
        match self.state {
            DecoderState::Decoding => DecodeOutcome::Dropped,
            _ => DecodeOutcome::NeedsIdr,
        }
    }

    fn has_frame_num_gap(&self, sps: &Sps, header: &SliceHeader) -> bool {
        if sps.gaps_in_frame_num_allowed {
            return false;
        }

        match self.prev_ref_frame_num {
            Some(prev) => {
                header.frame_num != prev && header.frame_num != (prev + 1) % sps.max_frame_num()
            }
            None => false,
        }
    }

    /// Creates the decode session, or recreates it when the stream's
    /// parameters no longer match
    fn ensure_session(&mut self, sps: &Sps) -> Result<(), DecoderError> {
        let params = SessionParameters {
            width: sps.width(),
            height: sps.height(),
            profile_idc: sps.profile_idc,
            level_idc: sps.level_idc,
            dpb_slot_count: self.config.dpb_slot_count(),
            max_num_ref_frames: sps.max_num_ref_frames,
        };

        if self.session.as_ref() == Some(&params) {
            return Ok(());
        }

        if self.session.take().is_some() {
            info!("stream parameters changed, recreating decode session");
            self.backend.destroy_session();
        }

        self.clear_pictures();

        if let Err(err) = self.backend.create_session(&params) {
            error!("failed to create decode session: {}", err);
            self.state = DecoderState::NoSession;
            return Err(err);
        }

        info!(
            "decode session created for {}x{} profile {} level {}",
            params.width, params.height, params.profile_idc, params.level_idc
        );

        self.session = Some(params);
        self.state = DecoderState::SessionReady;
        self.stats.sessions_created += 1;

        Ok(())
    }

    fn clear_pictures(&mut self) {
        self.dpb.clear();
        self.reorder.clear();
        self.poc.reset();
        self.prev_ref_frame_num = None;
    }

    fn emit(&mut self, frames: Vec<PendingFrame>) {
        let (width, height) = match &self.session {
            Some(params) => (params.width, params.height),
            None => (0, 0),
        };

        for frame in frames {
            let image = self.dpb.slot(frame.slot).image;
            self.dpb.mark_output(frame.slot);

            let image = match image {
                Some(image) => image,
                None => continue,
            };

            self.stats.frames_emitted += 1;
            self.sink.on_frame(DecodedFrame {
                image,
                width,
                height,
                timestamp: frame.timestamp,
                poc: frame.poc,
            });
        }
    }
}

impl fmt::Debug for DecoderSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderSession")
            .field("state", &self.state)
            .field("session", &self.session)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Drop for DecoderSession {
    fn drop(&mut self) {
        if self.session.take().is_some() {
            self.backend.destroy_session();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::test_support::{TestPps, TestSlice, TestSps};
    use crate::bitstream::AccessUnit;
    use crate::decoder::{FrameCollector, ImageHandle, NullDecodeBackend};

    fn session(collector: &FrameCollector) -> DecoderSession {
        DecoderSession::new(
            DecoderConfig::default(),
            Box::new(NullDecodeBackend::new()),
            Arc::new(collector.clone()),
        )
    }

    fn idr_job(sps: &TestSps, slice: TestSlice, timestamp: u64) -> DecodeJob {
        DecodeJob {
            unit: AccessUnit {
                nals: vec![sps.build(), TestPps::new(0, sps.id).build(), slice.build()],
                is_idr: true,
                synthesized: false,
            },
            timestamp,
        }
    }

    fn job(slice: TestSlice, timestamp: u64) -> DecodeJob {
        DecodeJob {
            unit: AccessUnit {
                nals: vec![slice.build()],
                is_idr: false,
                synthesized: false,
            },
            timestamp,
        }
    }

    fn pocs(collector: &FrameCollector) -> Vec<i32> {
        collector.frames().iter().map(|f| f.poc).collect()
    }

    #[test]
    fn test_non_idr_before_session_dropped() {
        let collector = FrameCollector::new();
        let mut session = session(&collector);
        let sps = TestSps::new(640, 480);

        let outcome = session.decode(&job(TestSlice::p(&sps, 1), 0)).unwrap();

        assert_eq!(outcome, DecodeOutcome::NeedsIdr);
        assert_eq!(session.state(), DecoderState::NoSession);
        assert_eq!(collector.is_empty(), true);
    }

    #[test]
    fn test_idr_creates_session_and_emits() {
        let collector = FrameCollector::new();
        let mut session = session(&collector);
        let sps = TestSps::new(640, 480);

        let outcome = session
            .decode(&idr_job(&sps, TestSlice::idr(&sps), 10))
            .unwrap();

        assert_eq!(outcome, DecodeOutcome::Decoded);
        assert_eq!(session.state(), DecoderState::Decoding);
        assert_eq!(session.stats().sessions_created, 1);
        // baseline without VUI does not reorder
        assert_eq!(session.reorder_depth(), 0);

        let frames = collector.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!((frames[0].width, frames[0].height), (640, 480));
        assert_eq!(frames[0].timestamp, 10);
        assert_eq!(frames[0].poc, 0);
    }

    #[test]
    fn test_frames_emitted_in_poc_order() {
        let collector = FrameCollector::new();
        let mut session = session(&collector);
        let sps = TestSps::new(640, 480)
            .with_poc_type(0)
            .with_reorder_frames(1);

        session
            .decode(&idr_job(&sps, TestSlice::idr(&sps).with_poc_lsb(0), 0))
            .unwrap();
        session
            .decode(&job(TestSlice::p(&sps, 1).with_poc_lsb(4), 1))
            .unwrap();
        session
            .decode(&job(TestSlice::b(&sps, 2).with_poc_lsb(2), 2))
            .unwrap();
        session.flush();

        assert_eq!(pocs(&collector), vec![0, 2, 4]);
        assert_eq!(
            collector.frames().iter().map(|f| f.timestamp).collect::<Vec<_>>(),
            vec![0, 2, 1]
        );
    }

    #[test]
    fn test_frame_num_gap_recovers_on_idr() {
        let collector = FrameCollector::new();
        let mut session = session(&collector);
        let sps = TestSps::new(640, 480);

        session.decode(&idr_job(&sps, TestSlice::idr(&sps), 0)).unwrap();
        session.decode(&job(TestSlice::p(&sps, 1), 1)).unwrap();

        assert_eq!(
            session.decode(&job(TestSlice::p(&sps, 3), 3)).unwrap(),
            DecodeOutcome::NeedsIdr
        );
        assert_eq!(session.state(), DecoderState::Recovering);
        assert_eq!(session.stats().frame_num_gaps, 1);

        assert_eq!(
            session.decode(&job(TestSlice::p(&sps, 4), 4)).unwrap(),
            DecodeOutcome::NeedsIdr
        );

        session.decode(&idr_job(&sps, TestSlice::idr(&sps), 5)).unwrap();
        assert_eq!(session.state(), DecoderState::Decoding);
        assert_eq!(
            session.decode(&job(TestSlice::p(&sps, 1), 6)).unwrap(),
            DecodeOutcome::Decoded
        );

        assert_eq!(
            collector.frames().iter().map(|f| f.timestamp).collect::<Vec<_>>(),
            vec![0, 1, 5, 6]
        );
    }

    #[test]
    fn test_frame_num_wraps_without_gap() {
        let collector = FrameCollector::new();
        let mut session = session(&collector);
        let sps = TestSps::new(640, 480);

        session.decode(&idr_job(&sps, TestSlice::idr(&sps), 0)).unwrap();
        for frame_num in 1..16 {
            session
                .decode(&job(TestSlice::p(&sps, frame_num), frame_num as u64))
                .unwrap();
        }

        assert_eq!(
            session.decode(&job(TestSlice::p(&sps, 0), 16)).unwrap(),
            DecodeOutcome::Decoded
        );
        assert_eq!(session.stats().frame_num_gaps, 0);
        assert_eq!(collector.len(), 17);
    }

    #[test]
    fn test_continuation_slice_dropped() {
        let collector = FrameCollector::new();
        let mut session = session(&collector);
        let sps = TestSps::new(640, 480);

        session.decode(&idr_job(&sps, TestSlice::idr(&sps), 0)).unwrap();
        let outcome = session
            .decode(&job(TestSlice::p(&sps, 1).with_first_mb(40), 1))
            .unwrap();

        assert_eq!(outcome, DecodeOutcome::Dropped);
        assert_eq!(session.stats().dropped_continuation_slices, 1);
        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn test_parameter_change_recreates_session() {
        let collector = FrameCollector::new();
        let mut session = session(&collector);
        let small = TestSps::new(640, 480);
        let large = TestSps::new(1280, 720);

        session.decode(&idr_job(&small, TestSlice::idr(&small), 0)).unwrap();
        session.decode(&idr_job(&small, TestSlice::idr(&small), 1)).unwrap();
        assert_eq!(session.stats().sessions_created, 1);

        session.decode(&idr_job(&large, TestSlice::idr(&large), 2)).unwrap();
        assert_eq!(session.stats().sessions_created, 2);
        assert_eq!(session.session_parameters().unwrap().width, 1280);

        let frames = collector.frames();
        assert_eq!((frames[2].width, frames[2].height), (1280, 720));
    }

    #[test]
    fn test_dpb_stays_bounded_under_long_gop() {
        let collector = FrameCollector::new();
        let mut session = session(&collector);
        let sps = TestSps::new(640, 480).with_max_num_ref_frames(2);

        session.decode(&idr_job(&sps, TestSlice::idr(&sps), 0)).unwrap();
        for i in 1..100u32 {
            session
                .decode(&job(TestSlice::p(&sps, i % 16), i as u64))
                .unwrap();
        }

        assert_eq!(session.dpb().reference_slots().len(), 2);
        assert_eq!(session.stats().forced_reference_evictions, 0);
        assert_eq!(collector.len(), 100);
    }

    #[test]
    fn test_idr_reuses_reference_slots() {
        let collector = FrameCollector::new();
        let mut session = DecoderSession::new(
            DecoderConfig::default().with_dpb_slot_count(4),
            Box::new(NullDecodeBackend::new()),
            Arc::new(collector.clone()),
        );
        let sps = TestSps::new(640, 480).with_max_num_ref_frames(4);

        session.decode(&idr_job(&sps, TestSlice::idr(&sps), 0)).unwrap();
        for frame_num in 1..4 {
            session
                .decode(&job(TestSlice::p(&sps, frame_num), frame_num as u64))
                .unwrap();
        }
        assert_eq!(session.dpb().reference_slots().len(), 4);

        session.decode(&idr_job(&sps, TestSlice::idr(&sps), 4)).unwrap();

        assert_eq!(session.stats().forced_reference_evictions, 0);
        assert_eq!(session.stats().evicted_non_reference, 0);
        assert_eq!(session.dpb().reference_slots().len(), 1);
        assert_eq!(collector.len(), 5);
    }

    struct FailingBackend {
        fail_create: bool,
    }

    impl VideoDecodeBackend for FailingBackend {
        fn create_session(&mut self, _: &SessionParameters) -> Result<(), DecoderError> {
            if self.fail_create {
                Err(DecoderError::SessionCreation("no device".to_owned()))
            } else {
                Ok(())
            }
        }

        fn decode(&mut self, _: &DecodeRequest) -> Result<ImageHandle, DecoderError> {
            Err(DecoderError::Submit("device lost".to_owned()))
        }

        fn destroy_session(&mut self) {}
    }

    #[test]
    fn test_session_creation_failure_is_fatal() {
        let collector = FrameCollector::new();
        let mut session = DecoderSession::new(
            DecoderConfig::default(),
            Box::new(FailingBackend { fail_create: true }),
            Arc::new(collector.clone()),
        );
        let sps = TestSps::new(640, 480);

        let result = session.decode(&idr_job(&sps, TestSlice::idr(&sps), 0));

        assert_eq!(result.is_err(), true);
        assert_eq!(session.state(), DecoderState::NoSession);
    }

    #[test]
    fn test_submit_failure_drops_picture() {
        let collector = FrameCollector::new();
        let mut session = DecoderSession::new(
            DecoderConfig::default(),
            Box::new(FailingBackend { fail_create: false }),
            Arc::new(collector.clone()),
        );
        let sps = TestSps::new(640, 480);

        let outcome = session
            .decode(&idr_job(&sps, TestSlice::idr(&sps), 0))
            .unwrap();

        assert_eq!(outcome, DecodeOutcome::Dropped);
        assert_eq!(session.stats().submit_failures, 1);
        assert_eq!(session.dpb().resident(), 0);
        assert_eq!(collector.is_empty(), true);
    }

    #[test]
    fn test_missing_pps_is_undecodable() {
        let collector = FrameCollector::new();
        let mut session = session(&collector);
        let sps = TestSps::new(640, 480);

        let unit = AccessUnit {
            nals: vec![sps.build(), TestSlice::idr(&sps).with_pps_id(3).build()],
            is_idr: true,
            synthesized: false,
        };
        let outcome = session.decode(&DecodeJob { unit, timestamp: 0 }).unwrap();

        assert_eq!(outcome, DecodeOutcome::NeedsIdr);
        assert_eq!(session.stats().dropped_invalid_slices, 1);
    }
}
