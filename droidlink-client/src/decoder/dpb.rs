use super::ImageHandle;
use log::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reference {
    Unused,
    ShortTerm,
    LongTerm(u32),
}

/// One decoded picture buffer slot
#[derive(Debug, Clone, PartialEq)]
pub struct DpbSlot {
    pub frame_num: u32,
    pub poc: i32,
    pub reference: Reference,
    /// Held by the reorder stage until emitted
    pub awaiting_output: bool,
    pub image: Option<ImageHandle>,
    /// Position in decoding order, used for LRU eviction
    decode_order: u64,
}

impl DpbSlot {
    fn empty() -> Self {
        Self {
            frame_num: 0,
            poc: 0,
            reference: Reference::Unused,
            awaiting_output: false,
            image: None,
            decode_order: 0,
        }
    }

    pub fn is_reference(&self) -> bool {
        self.reference != Reference::Unused
    }

    pub fn is_short_term(&self) -> bool {
        self.reference == Reference::ShortTerm
    }

    pub fn long_term_frame_idx(&self) -> Option<u32> {
        match self.reference {
            Reference::LongTerm(idx) => Some(idx),
            _ => None,
        }
    }

    pub fn in_use(&self) -> bool {
        self.is_reference() || self.awaiting_output
    }
}

/// How a slot was obtained
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Acquired {
    Free(usize),
    /// A non-reference picture still waiting for output was evicted
    EvictedNonReference(usize),
    /// The pool held only references, the one with the smallest POC was unmarked
    ForcedReference(usize),
}

impl Acquired {
    pub fn slot(self) -> usize {
        match self {
            Self::Free(slot) | Self::EvictedNonReference(slot) | Self::ForcedReference(slot) => slot,
        }
    }
}

/// Fixed pool of picture slots addressed by index
#[derive(Debug)]
pub struct Dpb {
    slots: Vec<DpbSlot>,
    decode_counter: u64,
}

impl Dpb {
    pub fn new(slot_count: usize) -> Self {
        assert!(slot_count > 0);

        Self {
            slots: vec![DpbSlot::empty(); slot_count],
            decode_counter: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> &DpbSlot {
        &self.slots[index]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut DpbSlot {
        &mut self.slots[index]
    }

    pub fn slots(&self) -> impl Iterator<Item = (usize, &DpbSlot)> {
        self.slots.iter().enumerate()
    }

    pub fn resident(&self) -> usize {
        self.slots.iter().filter(|s| s.in_use()).count()
    }

    pub fn reference_slots(&self) -> Vec<usize> {
        self.slots()
            .filter(|(_, s)| s.is_reference())
            .map(|(i, _)| i)
            .collect()
    }

    /// Picks a slot for a new picture: a free one, else the oldest
    /// non-reference picture, else the reference with the smallest POC.
    /// The returned slot is reset and stamped with the next decode order.
    pub fn acquire(&mut self) -> Acquired {
        let acquired = if let Some(index) = self.slots.iter().position(|s| !s.in_use()) {
            Acquired::Free(index)
        } else if let Some((index, _)) = self
            .slots()
            .filter(|(_, s)| !s.is_reference())
            .min_by_key(|(_, s)| s.decode_order)
        {
            debug!("dpb full, evicting non-reference slot {}", index);
            Acquired::EvictedNonReference(index)
        } else {
            let (index, _) = self
                .slots()
                .min_by_key(|(_, s)| s.poc)
                .unwrap_or((0, &self.slots[0]));
            warn!("dpb holds only references, unmarking slot {}", index);
            Acquired::ForcedReference(index)
        };

        self.decode_counter += 1;
        let slot = &mut self.slots[acquired.slot()];
        *slot = DpbSlot::empty();
        slot.decode_order = self.decode_counter;

        acquired
    }

    /// Drops the reference marking, freeing the slot unless it awaits output
    pub fn unmark(&mut self, index: usize) {
        self.slots[index].reference = Reference::Unused;
    }

    /// The picture left the reorder stage
    pub fn mark_output(&mut self, index: usize) {
        self.slots[index].awaiting_output = false;
    }

    /// Releases the slot completely, used when a decode fails
    pub fn release(&mut self, index: usize) {
        self.slots[index] = DpbSlot::empty();
    }

    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = DpbSlot::empty();
        }
    }
}
