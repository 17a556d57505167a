use log::*;

/// A decoded picture waiting for its turn in display order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingFrame {
    pub slot: usize,
    pub poc: i32,
    pub timestamp: u64,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReorderStats {
    pub emitted: u64,
    /// Frames emitted early because the declared depth exceeds the size bound
    pub forced: u64,
    /// Frames arriving with a POC behind the last emitted one
    pub late: u64,
    pub flushes: u64,
}

/// Holds decoded pictures until no smaller POC can still arrive.
///
/// `depth` is the number of pictures the stream may reorder, a picture is
/// released once more than `depth` pictures are pending. The buffer never
/// grows past `max_size` regardless of the declared depth.
#[derive(Debug)]
pub struct ReorderBuffer {
    depth: usize,
    /// The depth asked for before clamping to `max_size`
    declared_depth: usize,
    max_size: usize,
    pending: Vec<PendingFrame>,
    last_emitted_poc: Option<i32>,
    stats: ReorderStats,
}

impl ReorderBuffer {
    pub fn new(depth: usize, max_size: usize) -> Self {
        let mut buffer = Self {
            depth: 0,
            declared_depth: 0,
            max_size,
            pending: vec![],
            last_emitted_poc: None,
            stats: ReorderStats::default(),
        };
        buffer.set_depth(depth);

        buffer
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Changes the reorder depth, pictures beyond the new depth are released
    /// on the next insert
    pub fn set_depth(&mut self, depth: usize) {
        if depth > self.max_size {
            debug!(
                "reorder depth {} exceeds the bound of {}, clamping",
                depth, self.max_size
            );
        }

        self.declared_depth = depth;
        self.depth = depth.min(self.max_size);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn stats(&self) -> &ReorderStats {
        &self.stats
    }

    /// Adds a decoded picture and appends every picture now due to `out`
    /// in POC order. Returns false if the picture was dropped because a
    /// later picture has already been emitted, the caller owns its slot again.
    pub fn insert(&mut self, frame: PendingFrame, out: &mut Vec<PendingFrame>) -> bool {
        if let Some(last) = self.last_emitted_poc {
            if frame.poc < last {
                warn!(
                    "dropping late frame with poc {} after poc {} was shown",
                    frame.poc, last
                );
                self.stats.late += 1;
                return false;
            }
        }

        let position = self
            .pending
            .iter()
            .position(|p| p.poc > frame.poc)
            .unwrap_or(self.pending.len());
        self.pending.insert(position, frame);

        while self.pending.len() > self.depth {
            if self.pending.len() <= self.declared_depth {
                self.stats.forced += 1;
            }

            self.emit_first(out);
        }

        true
    }

    /// Emits every pending picture in POC order and forgets the last
    /// emitted POC, used on IDR and stream stop
    pub fn flush(&mut self, out: &mut Vec<PendingFrame>) {
        if !self.pending.is_empty() {
            self.stats.flushes += 1;
        }

        while !self.pending.is_empty() {
            self.emit_first(out);
        }

        self.last_emitted_poc = None;
    }

    /// Forgets a pending picture whose slot was reclaimed
    pub fn remove(&mut self, slot: usize) -> Option<PendingFrame> {
        let position = self.pending.iter().position(|p| p.slot == slot)?;

        Some(self.pending.remove(position))
    }

    /// Drops everything without emitting
    pub fn clear(&mut self) {
        self.pending.clear();
        self.last_emitted_poc = None;
    }

    fn emit_first(&mut self, out: &mut Vec<PendingFrame>) {
        let frame = self.pending.remove(0);
        self.last_emitted_poc = Some(frame.poc);
        self.stats.emitted += 1;
        out.push(frame);
    }
}
