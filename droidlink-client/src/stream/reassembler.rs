use super::{
    AnnexBAccumulator, AnnexBStats, DepacketizerStats, H264Depacketizer, NalUnit,
    ReassemblyConfig, RtpPacket, Vid0FrameBuffer, Vid0Stats,
};
use log::*;
use serde::{Deserialize, Serialize};

/// How video bytes arrive from a source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamFraming {
    /// One RTP packet per datagram
    Rtp,
    /// RTP packets wrapped in VID0 frames on a byte stream
    Vid0,
    /// Raw Annex-B elementary stream
    AnnexB,
}

#[derive(Debug, Default, PartialEq)]
pub struct ReassemblyOutput {
    pub nals: Vec<NalUnit>,
    pub request_idr: bool,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReassemblyStats {
    pub rtp_errors: u64,
    pub rtp: DepacketizerStats,
    pub vid0: Vid0Stats,
    pub annexb: AnnexBStats,
}

/// Turns the bytes of one video source into NAL units
#[derive(Debug)]
pub struct StreamReassembler {
    framing: StreamFraming,
    depacketizer: H264Depacketizer,
    vid0: Vid0FrameBuffer,
    annexb: AnnexBAccumulator,
    rtp_errors: u64,
}

impl StreamReassembler {
    pub fn new(framing: StreamFraming, config: &ReassemblyConfig) -> Self {
        Self {
            framing,
            depacketizer: H264Depacketizer::new(config),
            vid0: Vid0FrameBuffer::new(config),
            annexb: AnnexBAccumulator::new(config),
            rtp_errors: 0,
        }
    }

    pub fn framing(&self) -> StreamFraming {
        self.framing
    }

    pub fn push(&mut self, data: &[u8]) -> ReassemblyOutput {
        let mut output = ReassemblyOutput::default();

        match self.framing {
            StreamFraming::Rtp => self.push_rtp(data, &mut output),
            StreamFraming::Vid0 => {
                for frame in self.vid0.push(data) {
                    self.push_rtp(&frame, &mut output);
                }
            }
            StreamFraming::AnnexB => {
                output.request_idr = self.annexb.push(data, &mut output.nals);
            }
        }

        output
    }

    /// Flushes buffered state at the end of the stream
    pub fn finish(&mut self) -> ReassemblyOutput {
        let mut output = ReassemblyOutput::default();

        if self.framing == StreamFraming::AnnexB {
            self.annexb.finish(&mut output.nals);
        }

        self.depacketizer.reset();
        self.vid0.clear();

        output
    }

    pub fn stats(&self) -> ReassemblyStats {
        ReassemblyStats {
            rtp_errors: self.rtp_errors,
            rtp: self.depacketizer.stats().clone(),
            vid0: self.vid0.stats().clone(),
            annexb: self.annexb.stats().clone(),
        }
    }

    fn push_rtp(&mut self, data: &[u8], output: &mut ReassemblyOutput) {
        match RtpPacket::parse(data) {
            Ok(packet) => {
                if self.depacketizer.push(&packet, &mut output.nals) {
                    output.request_idr = true;
                }
            }
            Err(err) => {
                debug!("dropping invalid rtp packet: {}", err);
                self.rtp_errors += 1;
            }
        }
    }
}
