use super::{NalUnit, ReassemblyConfig};
use log::*;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct AnnexBStats {
    pub nals: u64,
    pub overflows: u64,
    pub bytes_discarded: u64,
}

/// Splits an Annex-B byte stream on start codes.
/// A NAL is emitted once the start code following it has been seen.
#[derive(Debug)]
pub struct AnnexBAccumulator {
    /// Bytes after the last start code, or unsynchronised input
    pending: Vec<u8>,
    synced: bool,
    /// Offset from which the next start code search resumes
    scan_from: usize,
    max_nal_size: usize,
    stats: AnnexBStats,
}

/// Position of a `00 00 01` start code.
/// `code_start` includes a leading zero of a four byte code.
#[derive(Debug, PartialEq, Clone, Copy)]
struct StartCode {
    code_start: usize,
    payload_start: usize,
}

fn find_start_code(data: &[u8], from: usize) -> Option<StartCode> {
    let mut i = from;

    while i + 3 <= data.len() {
        // No start code can begin at i, i + 1 or i + 2
        if data[i + 2] > 1 {
            i += 3;
            continue;
        }

        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            let code_start = if i > 0 && data[i - 1] == 0 { i - 1 } else { i };

            return Some(StartCode {
                code_start,
                payload_start: i + 3,
            });
        }

        i += 1;
    }

    None
}

fn trim_trailing_zeros(data: &[u8]) -> &[u8] {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);

    &data[..end]
}

impl AnnexBAccumulator {
    pub fn new(config: &ReassemblyConfig) -> Self {
        Self {
            pending: vec![],
            synced: false,
            scan_from: 0,
            max_nal_size: config.max_nal_size(),
            stats: AnnexBStats::default(),
        }
    }

    pub fn stats(&self) -> &AnnexBStats {
        &self.stats
    }

    /// Appends the NAL units completed by this chunk to `out`.
    /// Returns true if a pending NAL outgrew the size cap and was dropped.
    pub fn push(&mut self, data: &[u8], out: &mut Vec<NalUnit>) -> bool {
        self.pending.extend_from_slice(data);

        if !self.synced {
            match find_start_code(&self.pending, 0) {
                Some(code) => {
                    self.stats.bytes_discarded += code.code_start as u64;
                    self.pending.drain(..code.payload_start);
                    self.synced = true;
                    self.scan_from = 0;
                }
                None => {
                    // Keep a possible partial start code
                    let discard = self.pending.len().saturating_sub(3);
                    self.pending.drain(..discard);
                    self.stats.bytes_discarded += discard as u64;
                    return false;
                }
            }
        }

        while let Some(next) = find_start_code(&self.pending, self.scan_from) {
            self.emit(next.code_start, out);
            self.pending.drain(..next.payload_start);
            self.scan_from = 0;
        }

        if self.pending.len() > self.max_nal_size {
            warn!(
                "no start code within {} bytes, dropping pending nal",
                self.max_nal_size
            );
            self.stats.overflows += 1;
            self.stats.bytes_discarded += self.pending.len() as u64;
            self.pending.clear();
            self.synced = false;
            self.scan_from = 0;
            return true;
        }

        self.scan_from = self.pending.len().saturating_sub(2);

        false
    }

    /// Emits the pending NAL at end of stream
    pub fn finish(&mut self, out: &mut Vec<NalUnit>) {
        if self.synced {
            self.emit(self.pending.len(), out);
        }

        self.pending.clear();
        self.synced = false;
        self.scan_from = 0;
    }

    fn emit(&mut self, end: usize, out: &mut Vec<NalUnit>) {
        if let Some(nal) = NalUnit::from_slice(trim_trailing_zeros(&self.pending[..end])) {
            self.stats.nals += 1;
            out.push(nal);
        }
    }
}
