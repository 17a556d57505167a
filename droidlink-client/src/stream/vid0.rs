use super::ReassemblyConfig;
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use log::*;

pub const VID0_MAGIC: &[u8; 4] = b"VID0";
pub const VID0_HEADER_SIZE: usize = 8;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Vid0Stats {
    pub frames: u64,
    pub resyncs: u64,
    pub invalid_lengths: u64,
    pub overflows: u64,
    pub bytes_discarded: u64,
}

/// Rolling buffer extracting `"VID0" | len (u32 BE) | rtp packet` frames
/// from a byte stream delivered in arbitrary chunks.
#[derive(Debug)]
pub struct Vid0FrameBuffer {
    buffer: Vec<u8>,
    max_frame_size: usize,
    max_buffer_size: usize,
    max_frames_per_pass: usize,
    stats: Vid0Stats,
}

impl Vid0FrameBuffer {
    pub fn new(config: &ReassemblyConfig) -> Self {
        Self {
            buffer: vec![],
            max_frame_size: config.max_vid0_frame_size(),
            max_buffer_size: config.max_vid0_buffer_size(),
            max_frames_per_pass: config.max_frames_per_pass(),
            stats: Vid0Stats::default(),
        }
    }

    pub fn stats(&self) -> &Vid0Stats {
        &self.stats
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Appends the chunk and returns the frames it completed
    pub fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(data);

        let frames = self.parse_pass();

        if self.buffer.len() > self.max_buffer_size {
            warn!(
                "vid0 buffer grew to {} bytes, clearing",
                self.buffer.len()
            );
            self.stats.overflows += 1;
            self.stats.bytes_discarded += self.buffer.len() as u64;
            self.buffer.clear();
        }

        frames
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn parse_pass(&mut self) -> Vec<Vec<u8>> {
        let mut frames = vec![];
        let mut cursor = 0;

        while frames.len() < self.max_frames_per_pass {
            let remaining = &self.buffer[cursor..];
            if remaining.len() < VID0_HEADER_SIZE {
                if !remaining.is_empty() && !VID0_MAGIC.starts_with(&remaining[..remaining.len().min(4)]) {
                    cursor += self.resync(cursor);
                    continue;
                }
                break;
            }

            if &remaining[..4] != VID0_MAGIC {
                cursor += self.resync(cursor);
                continue;
            }

            let len = BigEndian::read_u32(&remaining[4..8]) as usize;
            if len == 0 || len > self.max_frame_size {
                debug!("invalid vid0 frame length: {}", len);
                self.stats.invalid_lengths += 1;
                // Skip the magic so the next pass searches for a fresh one
                cursor += 1;
                self.stats.bytes_discarded += 1;
                continue;
            }

            if remaining.len() < VID0_HEADER_SIZE + len {
                break;
            }

            frames.push(remaining[VID0_HEADER_SIZE..VID0_HEADER_SIZE + len].to_vec());
            cursor += VID0_HEADER_SIZE + len;
            self.stats.frames += 1;
        }

        self.buffer.drain(..cursor);

        frames
    }

    /// Returns how many bytes to skip to reach the next candidate magic.
    /// A trailing partial magic is kept for the next chunk.
    fn resync(&mut self, cursor: usize) -> usize {
        let remaining = &self.buffer[cursor..];

        let skip = match remaining[1..].windows(4).position(|w| w == VID0_MAGIC) {
            Some(pos) => pos + 1,
            None => {
                let tail = (1..remaining.len().min(4))
                    .rev()
                    .find(|&n| VID0_MAGIC.starts_with(&remaining[remaining.len() - n..]))
                    .unwrap_or(0);
                remaining.len() - tail
            }
        };

        trace!("vid0 resync skipping {} bytes", skip);
        self.stats.resyncs += 1;
        self.stats.bytes_discarded += skip as u64;

        skip
    }
}

/// Wraps one RTP packet in a VID0 frame
pub fn encode_vid0(packet: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(VID0_HEADER_SIZE + packet.len());

    out.extend_from_slice(VID0_MAGIC);
    out.write_u32::<BigEndian>(packet.len() as u32).unwrap();
    out.extend_from_slice(packet);

    out
}
