use crate::bitstream::ValidatorConfig;
use crate::decoder::DecoderConfig;
use crate::stream::{ReassemblyConfig, StreamFraming};
use std::time::Duration;

const DEFAULT_IDR_REQUEST_INTERVAL: u64 = 1000; // ms

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    framing: StreamFraming,
    reassembly: ReassemblyConfig,
    validator: ValidatorConfig,
    decoder: DecoderConfig,

    /// Minimum time between two IDR requests sent to the device
    idr_request_interval: Duration,
}

impl PipelineConfig {
    pub fn default() -> Self {
        Self {
            framing: StreamFraming::Rtp,
            reassembly: ReassemblyConfig::default(),
            validator: ValidatorConfig::default(),
            decoder: DecoderConfig::default(),
            idr_request_interval: Duration::from_millis(DEFAULT_IDR_REQUEST_INTERVAL),
        }
    }

    pub fn framing(&self) -> StreamFraming {
        self.framing
    }

    pub fn with_framing(mut self, value: StreamFraming) -> Self {
        self.framing = value;

        self
    }

    pub fn reassembly(&self) -> &ReassemblyConfig {
        &self.reassembly
    }

    pub fn with_reassembly(mut self, value: ReassemblyConfig) -> Self {
        self.reassembly = value;

        self
    }

    pub fn validator(&self) -> &ValidatorConfig {
        &self.validator
    }

    pub fn with_validator(mut self, value: ValidatorConfig) -> Self {
        self.validator = value;

        self
    }

    pub fn decoder(&self) -> &DecoderConfig {
        &self.decoder
    }

    pub fn with_decoder(mut self, value: DecoderConfig) -> Self {
        self.decoder = value;

        self
    }

    pub fn idr_request_interval(&self) -> Duration {
        self.idr_request_interval
    }

    pub fn with_idr_request_interval(mut self, value: Duration) -> Self {
        self.idr_request_interval = value;

        self
    }
}
