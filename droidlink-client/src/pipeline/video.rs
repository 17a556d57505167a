use super::{IdrRequests, PipelineConfig};
use crate::bitstream::{AccessUnit, BitstreamValidator, ValidatorStats};
use crate::decoder::{
    DecodeJob, DecoderWorker, Enqueued, FrameSink, IdrRequester, VideoDecodeBackend,
    WorkerSnapshot,
};
use crate::stream::{NalUnit, ReassemblyStats, StreamReassembler};
use crate::transport::{CloseReason, DeviceId, TransportEvents};
use anyhow::Result;
use droidlink_shared::{AckStatus, SequenceNumber};
use log::*;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStats {
    pub bytes: u64,
    pub access_units: u64,
    pub queue_dropped: u64,
    pub queue_flushed: u64,
    pub idr_requested: u64,
    pub idr_sent: u64,
    pub reassembly: ReassemblyStats,
    pub validator: ValidatorStats,
    pub decoder: WorkerSnapshot,
}

struct Ingest {
    reassembler: StreamReassembler,
    validator: BitstreamValidator,
    bytes: u64,
    access_units: u64,
    queue_dropped: u64,
    queue_flushed: u64,
    finished: bool,
}

/// Reassembly, validation and decoding of the video of one source.
///
/// Bytes are pushed from the transport's receive thread, decoding runs on
/// the pipeline's own decode thread.
pub struct VideoPipeline {
    device: DeviceId,
    started: Instant,
    ingest: Mutex<Ingest>,
    idr: Arc<IdrRequests>,
    worker: Mutex<DecoderWorker>,
}

impl VideoPipeline {
    pub fn start(
        device: DeviceId,
        config: PipelineConfig,
        backend: Box<dyn VideoDecodeBackend>,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Self> {
        let idr = Arc::new(IdrRequests::new(config.idr_request_interval()));

        let worker = DecoderWorker::start(
            device.to_string(),
            config.decoder().clone(),
            backend,
            sink,
            Arc::clone(&idr) as Arc<dyn IdrRequester>,
        )?;

        info!(
            "video pipeline for {} started with {:?} framing",
            device,
            config.framing()
        );

        Ok(Self {
            device,
            started: Instant::now(),
            ingest: Mutex::new(Ingest {
                reassembler: StreamReassembler::new(config.framing(), config.reassembly()),
                validator: BitstreamValidator::new(config.validator().clone()),
                bytes: 0,
                access_units: 0,
                queue_dropped: 0,
                queue_flushed: 0,
                finished: false,
            }),
            idr,
            worker: Mutex::new(worker),
        })
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Feeds bytes as received from the transport
    pub fn ingest(&self, data: &[u8]) {
        let units = {
            let mut ingest = self.ingest.lock().unwrap();
            if ingest.finished {
                return;
            }

            ingest.bytes += data.len() as u64;
            let output = ingest.reassembler.push(data);

            if output.request_idr {
                self.idr.request();
            }

            validate(&mut ingest, output.nals)
        };

        self.submit(units);
    }

    /// Flushes the stream and stops the decode thread once the queued
    /// pictures are decoded
    pub fn finish(&self) {
        let units = {
            let mut ingest = self.ingest.lock().unwrap();
            if ingest.finished {
                return;
            }

            ingest.finished = true;
            let output = ingest.reassembler.finish();
            validate(&mut ingest, output.nals)
        };

        self.submit(units);
        self.worker.lock().unwrap().stop();

        info!("video pipeline for {} finished", self.device);
    }

    /// Returns true if an IDR should now be requested from the device,
    /// see `IdrRequests::take`
    pub fn take_idr_request(&self) -> bool {
        self.idr.take(Instant::now())
    }

    pub fn request_idr(&self) {
        self.idr.request();
    }

    pub fn stats(&self) -> PipelineStats {
        let (idr_requested, idr_sent) = self.idr.counts();
        let decoder = self.worker.lock().unwrap().snapshot();
        let ingest = self.ingest.lock().unwrap();

        PipelineStats {
            bytes: ingest.bytes,
            access_units: ingest.access_units,
            queue_dropped: ingest.queue_dropped,
            queue_flushed: ingest.queue_flushed,
            idr_requested,
            idr_sent,
            reassembly: ingest.reassembler.stats(),
            validator: ingest.validator.stats().clone(),
            decoder,
        }
    }

    fn timestamp(&self) -> u64 {
        self.started.elapsed().as_micros() as u64
    }

    fn submit(&self, units: Vec<AccessUnit>) {
        if units.is_empty() {
            return;
        }

        let timestamp = self.timestamp();
        let results = {
            let worker = self.worker.lock().unwrap();
            units
                .into_iter()
                .map(|unit| worker.submit(DecodeJob { unit, timestamp }))
                .collect::<Vec<_>>()
        };

        let mut ingest = self.ingest.lock().unwrap();
        for result in results {
            match result {
                Enqueued::Queued => {}
                Enqueued::FlushedForIdr(count) => ingest.queue_flushed += count as u64,
                Enqueued::Dropped => ingest.queue_dropped += 1,
            }
        }
    }
}

fn validate(ingest: &mut Ingest, nals: Vec<NalUnit>) -> Vec<AccessUnit> {
    let mut units = vec![];

    for nal in nals {
        if let Some(unit) = ingest.validator.process(nal) {
            ingest.access_units += 1;
            units.push(unit);
        }
    }

    units
}

impl TransportEvents for VideoPipeline {
    fn on_ack(&self, device: &DeviceId, seq: SequenceNumber, status: AckStatus, latency: Duration) {
        trace!("{} acked {:?} with {:?} after {:?}", device, seq, status, latency);
    }

    fn on_video_data(&self, _device: &DeviceId, data: &[u8]) {
        self.ingest(data);
    }

    fn on_device_closed(&self, device: &DeviceId, reason: &CloseReason) {
        info!("video source {} closed: {:?}", device, reason);
        self.finish();
    }
}

impl Drop for VideoPipeline {
    fn drop(&mut self) {
        self.finish();
    }
}
