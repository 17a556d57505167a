use super::{Dpb, Reference};
use crate::bitstream::{DecRefPicMarking, Mmco, SliceHeader, Sps};
use log::*;

/// Applies the decoded reference picture marking process (8.2.5) for the
/// picture just decoded into `current`. Returns the number of other
/// pictures which lost their reference marking.
pub fn mark_references(dpb: &mut Dpb, current: usize, header: &SliceHeader, sps: &Sps) -> usize {
    if !header.is_reference() {
        return 0;
    }

    if header.is_idr {
        let unmarked = unmark_all_except(dpb, current);

        let long_term = match header.dec_ref_pic_marking {
            Some(DecRefPicMarking::Idr {
                long_term_reference,
                ..
            }) => long_term_reference,
            _ => false,
        };

        dpb.slot_mut(current).reference = if long_term {
            Reference::LongTerm(0)
        } else {
            Reference::ShortTerm
        };

        return unmarked;
    }

    let mut unmarked = 0;
    let mut current_long_term = false;

    match &header.dec_ref_pic_marking {
        Some(DecRefPicMarking::Adaptive(ops)) => {
            for op in ops.iter() {
                let (count, to_long_term) = apply_mmco(dpb, current, header.frame_num, sps, op);
                unmarked += count;
                current_long_term |= to_long_term;
            }
        }
        _ => unmarked += sliding_window(dpb, current, header.frame_num, sps),
    }

    if !current_long_term {
        dpb.slot_mut(current).reference = Reference::ShortTerm;
    }

    if header.has_mmco5() {
        // The picture is treated as frame_num 0 from here on
        dpb.slot_mut(current).frame_num = 0;
    }

    unmarked
}

/// FrameNumWrap of a short-term reference relative to the current picture (8.2.4.1)
fn frame_num_wrap(frame_num: u32, current_frame_num: u32, max_frame_num: u32) -> i64 {
    if frame_num > current_frame_num {
        frame_num as i64 - max_frame_num as i64
    } else {
        frame_num as i64
    }
}

fn short_term_by_pic_num(
    dpb: &Dpb,
    current: usize,
    current_frame_num: u32,
    sps: &Sps,
    pic_num: i64,
) -> Option<usize> {
    dpb.slots()
        .filter(|(index, slot)| *index != current && slot.is_short_term())
        .find(|(_, slot)| {
            frame_num_wrap(slot.frame_num, current_frame_num, sps.max_frame_num()) == pic_num
        })
        .map(|(index, _)| index)
}

fn long_term_by_idx(dpb: &Dpb, current: usize, idx: u32) -> Option<usize> {
    dpb.slots()
        .filter(|(index, _)| *index != current)
        .find(|(_, slot)| slot.long_term_frame_idx() == Some(idx))
        .map(|(index, _)| index)
}

/// Unmarks every reference ahead of an IDR so their slots can be reused
/// for the IDR itself. Returns the number of pictures unmarked.
pub fn unmark_all_references(dpb: &mut Dpb) -> usize {
    let references = dpb.reference_slots();

    for index in references.iter() {
        dpb.unmark(*index);
    }

    references.len()
}

fn unmark_all_except(dpb: &mut Dpb, current: usize) -> usize {
    let others = dpb
        .reference_slots()
        .into_iter()
        .filter(|index| *index != current)
        .collect::<Vec<_>>();

    for index in others.iter() {
        dpb.unmark(*index);
    }

    others.len()
}

/// Unmarks the short-term reference with the smallest FrameNumWrap while
/// the reference count is at the stream's limit (8.2.5.3)
fn sliding_window(dpb: &mut Dpb, current: usize, current_frame_num: u32, sps: &Sps) -> usize {
    let max_refs = sps.max_num_ref_frames.max(1) as usize;
    let mut unmarked = 0;

    loop {
        let references = dpb
            .slots()
            .filter(|(index, slot)| *index != current && slot.is_reference())
            .count();

        if references < max_refs {
            break;
        }

        let oldest = dpb
            .slots()
            .filter(|(index, slot)| *index != current && slot.is_short_term())
            .min_by_key(|(_, slot)| {
                frame_num_wrap(slot.frame_num, current_frame_num, sps.max_frame_num())
            })
            .map(|(index, _)| index);

        match oldest {
            Some(index) => {
                trace!("sliding window unmarking slot {}", index);
                dpb.unmark(index);
                unmarked += 1;
            }
            // Only long-term references left, nothing the window may remove
            None => break,
        }
    }

    unmarked
}

/// Returns the number of unmarked pictures and whether the current
/// picture became a long-term reference
fn apply_mmco(
    dpb: &mut Dpb,
    current: usize,
    current_frame_num: u32,
    sps: &Sps,
    op: &Mmco,
) -> (usize, bool) {
    let curr_pic_num = current_frame_num as i64;

    match *op {
        Mmco::UnmarkShortTerm {
            difference_of_pic_nums,
        } => {
            let pic_num = curr_pic_num - difference_of_pic_nums as i64;

            match short_term_by_pic_num(dpb, current, current_frame_num, sps, pic_num) {
                Some(index) => {
                    dpb.unmark(index);
                    (1, false)
                }
                None => {
                    debug!("mmco 1 names unknown pic num {}", pic_num);
                    (0, false)
                }
            }
        }
        Mmco::UnmarkLongTerm { long_term_pic_num } => {
            match long_term_by_idx(dpb, current, long_term_pic_num) {
                Some(index) => {
                    dpb.unmark(index);
                    (1, false)
                }
                None => {
                    debug!("mmco 2 names unknown long term pic num {}", long_term_pic_num);
                    (0, false)
                }
            }
        }
        Mmco::ShortTermToLongTerm {
            difference_of_pic_nums,
            long_term_frame_idx,
        } => {
            let pic_num = curr_pic_num - difference_of_pic_nums as i64;
            let target = match short_term_by_pic_num(dpb, current, current_frame_num, sps, pic_num)
            {
                Some(index) => index,
                None => {
                    debug!("mmco 3 names unknown pic num {}", pic_num);
                    return (0, false);
                }
            };

            let mut unmarked = 0;
            if let Some(holder) = long_term_by_idx(dpb, current, long_term_frame_idx) {
                dpb.unmark(holder);
                unmarked += 1;
            }

            dpb.slot_mut(target).reference = Reference::LongTerm(long_term_frame_idx);
            (unmarked, false)
        }
        Mmco::MaxLongTermIndex {
            max_long_term_frame_idx_plus1,
        } => {
            // plus1 of 0 means no long-term index is allowed
            let above = dpb
                .slots()
                .filter(|(index, _)| *index != current)
                .filter(|(_, slot)| match slot.long_term_frame_idx() {
                    Some(idx) => idx + 1 > max_long_term_frame_idx_plus1,
                    None => false,
                })
                .map(|(index, _)| index)
                .collect::<Vec<_>>();

            for index in above.iter() {
                dpb.unmark(*index);
            }

            (above.len(), false)
        }
        Mmco::UnmarkAll => (unmark_all_except(dpb, current), false),
        Mmco::CurrentToLongTerm {
            long_term_frame_idx,
        } => {
            let mut unmarked = 0;
            if let Some(holder) = long_term_by_idx(dpb, current, long_term_frame_idx) {
                dpb.unmark(holder);
                unmarked += 1;
            }

            dpb.slot_mut(current).reference = Reference::LongTerm(long_term_frame_idx);
            (unmarked, true)
        }
    }
}
