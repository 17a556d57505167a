use super::VideoPipeline;
use crate::transport::{CloseReason, DeviceId, FailedCommand, TransportEvents};
use anyhow::Result;
use droidlink_shared::{AckStatus, SequenceNumber};
use log::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Creates the pipeline of a device the first time it sends video
pub type PipelineFactory = Box<dyn Fn(&DeviceId) -> Result<VideoPipeline> + Send + Sync>;

/// Routes the video of a multi-device transport to one pipeline per device
pub struct PipelineRouter {
    factory: PipelineFactory,
    pipelines: Mutex<HashMap<DeviceId, Arc<VideoPipeline>>>,
}

impl PipelineRouter {
    pub fn new(factory: PipelineFactory) -> Self {
        Self {
            factory,
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    pub fn pipeline(&self, device: &DeviceId) -> Option<Arc<VideoPipeline>> {
        self.pipelines.lock().unwrap().get(device).cloned()
    }

    pub fn pipelines(&self) -> Vec<Arc<VideoPipeline>> {
        self.pipelines.lock().unwrap().values().cloned().collect()
    }

    /// Devices whose pipeline wants an IDR now
    pub fn take_idr_requests(&self) -> Vec<DeviceId> {
        self.pipelines()
            .into_iter()
            .filter(|pipeline| pipeline.take_idr_request())
            .map(|pipeline| pipeline.device().clone())
            .collect()
    }

    /// Finishes and forgets every pipeline
    pub fn finish_all(&self) {
        let pipelines = self
            .pipelines
            .lock()
            .unwrap()
            .drain()
            .map(|(_, pipeline)| pipeline)
            .collect::<Vec<_>>();

        for pipeline in pipelines {
            pipeline.finish();
        }
    }

    fn pipeline_or_create(&self, device: &DeviceId) -> Option<Arc<VideoPipeline>> {
        let mut pipelines = self.pipelines.lock().unwrap();

        if let Some(pipeline) = pipelines.get(device) {
            return Some(Arc::clone(pipeline));
        }

        match (self.factory)(device) {
            Ok(pipeline) => {
                let pipeline = Arc::new(pipeline);
                pipelines.insert(device.clone(), Arc::clone(&pipeline));
                Some(pipeline)
            }
            Err(err) => {
                error!("failed to start video pipeline for {}: {}", device, err);
                None
            }
        }
    }
}

impl TransportEvents for PipelineRouter {
    fn on_ack(&self, device: &DeviceId, seq: SequenceNumber, status: AckStatus, latency: Duration) {
        trace!("{} acked {:?} with {:?} after {:?}", device, seq, status, latency);
    }

    fn on_video_data(&self, device: &DeviceId, data: &[u8]) {
        if let Some(pipeline) = self.pipeline_or_create(device) {
            pipeline.ingest(data);
        }
    }

    fn on_device_closed(&self, device: &DeviceId, reason: &CloseReason) {
        info!("device {} closed: {:?}", device, reason);

        let pipeline = self.pipelines.lock().unwrap().remove(device);
        if let Some(pipeline) = pipeline {
            pipeline.finish();
        }
    }

    fn on_command_failed(&self, device: &DeviceId, failed: &FailedCommand) {
        warn!("command to {} failed: {:?}", device, failed);
    }
}
