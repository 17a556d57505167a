use super::{NalType, NalUnit, ReassemblyConfig, RtpPacket};
use byteorder::{BigEndian, ByteOrder};
use log::*;
use std::collections::VecDeque;

const FU_START: u8 = 0x80;
const FU_END: u8 = 0x40;

/// In-progress fragmented NAL
#[derive(Debug, PartialEq)]
pub struct FuAAssembly {
    /// Reconstructed NAL header followed by the fragment payloads received so far
    data: Vec<u8>,
    start_seq: u16,
    last_seq: u16,
}

#[derive(Debug, PartialEq)]
enum FuState {
    Idle,
    Assembling(FuAAssembly),
    /// The current unit lost a fragment, its remaining fragments are ignored
    Abandoned,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DepacketizerStats {
    pub packets: u64,
    pub duplicates: u64,
    /// Discontinuities in the RTP sequence, counted for every packet type
    pub gaps: u64,
    pub nals: u64,
    pub fu_a_abandoned: u64,
    pub malformed: u64,
}

/// Turns RTP payloads (single NAL, STAP-A, FU-A) into NAL units
#[derive(Debug)]
pub struct H264Depacketizer {
    max_nal_size: usize,
    dedup_window: usize,
    state: FuState,
    last_seq: Option<u16>,
    recent: VecDeque<u16>,
    stats: DepacketizerStats,
}

impl H264Depacketizer {
    pub fn new(config: &ReassemblyConfig) -> Self {
        Self {
            max_nal_size: config.max_nal_size(),
            dedup_window: config.dedup_window(),
            state: FuState::Idle,
            last_seq: None,
            recent: VecDeque::new(),
            stats: DepacketizerStats::default(),
        }
    }

    pub fn stats(&self) -> &DepacketizerStats {
        &self.stats
    }

    pub fn is_assembling(&self) -> bool {
        match self.state {
            FuState::Assembling(_) => true,
            _ => false,
        }
    }

    /// Appends the NAL units completed by this packet to `out`.
    /// Returns true if data was lost and an IDR should be requested.
    pub fn push(&mut self, packet: &RtpPacket, out: &mut Vec<NalUnit>) -> bool {
        let seq = packet.sequence_number;

        if self.is_duplicate(seq) {
            self.stats.duplicates += 1;
            trace!("dropping duplicate rtp packet {}", seq);
            return false;
        }

        self.stats.packets += 1;

        if let Some(last) = self.last_seq {
            if seq != last.wrapping_add(1) {
                self.stats.gaps += 1;
                debug!("rtp sequence gap: {} -> {}", last, seq);
            }
        }
        self.last_seq = Some(seq);

        let payload = packet.payload;
        if payload.is_empty() {
            self.stats.malformed += 1;
            return false;
        }

        let before = out.len();
        let request_idr = match NalType::from_header(payload[0]) {
            NalType::FuA => self.push_fu_a(seq, payload, out),
            NalType::StapA => self.interrupt_fu_a() | self.push_stap_a(payload, out),
            NalType::Other(id) if id == 0 || id > 23 => {
                debug!("unsupported rtp payload structure: {}", id);
                self.stats.malformed += 1;
                false
            }
            _ => {
                let interrupted = self.interrupt_fu_a();
                out.extend(NalUnit::from_slice(payload));
                interrupted
            }
        };

        self.stats.nals += (out.len() - before) as u64;

        request_idr
    }

    /// Drops any partial fragmented unit
    pub fn reset(&mut self) {
        self.state = FuState::Idle;
        self.last_seq = None;
        self.recent.clear();
    }

    fn is_duplicate(&mut self, seq: u16) -> bool {
        if self.dedup_window == 0 {
            return false;
        }

        if self.recent.contains(&seq) {
            return true;
        }

        if self.recent.len() >= self.dedup_window {
            self.recent.pop_front();
        }
        self.recent.push_back(seq);

        false
    }

    /// A non-fragment packet arrived while a unit was being assembled
    fn interrupt_fu_a(&mut self) -> bool {
        match std::mem::replace(&mut self.state, FuState::Idle) {
            FuState::Assembling(assembly) => {
                warn!(
                    "fu-a unit started at {} interrupted, abandoning",
                    assembly.start_seq
                );
                self.stats.fu_a_abandoned += 1;
                true
            }
            _ => false,
        }
    }

    fn abandon(&mut self, reason: &str) -> bool {
        if let FuState::Assembling(assembly) = &self.state {
            warn!(
                "abandoning fu-a unit started at {} (last {}): {}",
                assembly.start_seq, assembly.last_seq, reason
            );
        }

        self.state = FuState::Abandoned;
        self.stats.fu_a_abandoned += 1;

        true
    }

    fn push_fu_a(&mut self, seq: u16, payload: &[u8], out: &mut Vec<NalUnit>) -> bool {
        if payload.len() < 2 {
            self.stats.malformed += 1;
            return false;
        }

        let indicator = payload[0];
        let fu_header = payload[1];
        let fragment = &payload[2..];
        let is_start = fu_header & FU_START != 0;
        let is_end = fu_header & FU_END != 0;

        let mut request_idr = false;

        if is_start {
            if let FuState::Assembling(_) = self.state {
                request_idr = self.abandon("new unit started before end fragment");
            }

            let mut data = Vec::with_capacity(fragment.len() + 1);
            data.push((indicator & 0xE0) | (fu_header & 0x1F));
            data.extend_from_slice(fragment);

            self.state = FuState::Assembling(FuAAssembly {
                data,
                start_seq: seq,
                last_seq: seq,
            });
        } else {
            let max_nal_size = self.max_nal_size;

            let result = match &mut self.state {
                FuState::Idle => Err("continuation fragment without start"),
                FuState::Abandoned => return false,
                FuState::Assembling(assembly) => {
                    if seq != assembly.last_seq.wrapping_add(1) {
                        Err("fragment sequence gap")
                    } else if assembly.data.len() + fragment.len() > max_nal_size {
                        Err("unit exceeds byte cap")
                    } else {
                        assembly.data.extend_from_slice(fragment);
                        assembly.last_seq = seq;
                        Ok(())
                    }
                }
            };

            if let Err(reason) = result {
                return self.abandon(reason);
            }
        }

        if is_end {
            if let FuState::Assembling(assembly) = std::mem::replace(&mut self.state, FuState::Idle)
            {
                out.extend(NalUnit::new(assembly.data));
            }
        }

        request_idr
    }

    fn push_stap_a(&mut self, payload: &[u8], out: &mut Vec<NalUnit>) -> bool {
        let mut offset = 1;

        while offset < payload.len() {
            if offset + 2 > payload.len() {
                self.stats.malformed += 1;
                break;
            }

            let size = BigEndian::read_u16(&payload[offset..offset + 2]) as usize;
            offset += 2;

            if size == 0 || offset + size > payload.len() {
                debug!("stap-a aggregate with invalid nal size {}", size);
                self.stats.malformed += 1;
                break;
            }

            out.extend(NalUnit::from_slice(&payload[offset..offset + size]));
            offset += size;
        }

        false
    }
}
