use crate::bitstream::{SliceHeader, Sps};

/// Picture order count derivation state (8.2.1) for frame coding
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PocState {
    prev_poc_msb: i32,
    prev_poc_lsb: i32,
    prev_frame_num_offset: i32,
    prev_frame_num: u32,
    /// The previous picture carried memory_management_control_operation 5
    prev_has_mmco5: bool,
}

impl PocState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Returns the POC of the picture and advances the state
    pub fn compute(&mut self, sps: &Sps, header: &SliceHeader) -> i32 {
        let (top, bottom) = match sps.pic_order_cnt_type {
            0 => self.compute_type0(sps, header),
            1 => self.compute_type1(sps, header),
            _ => self.compute_type2(sps, header),
        };

        let mut poc = top.min(bottom);

        if header.has_mmco5() {
            // The picture is treated as having POC 0 after the reset (8.2.1)
            let temp = poc;
            let top_after = top - temp;
            poc = 0;

            self.prev_poc_msb = 0;
            self.prev_poc_lsb = top_after;
            self.prev_frame_num_offset = 0;
            self.prev_frame_num = 0;
            self.prev_has_mmco5 = true;
        } else {
            self.prev_has_mmco5 = false;
        }

        poc
    }

    fn compute_type0(&mut self, sps: &Sps, header: &SliceHeader) -> (i32, i32) {
        if header.is_idr {
            self.prev_poc_msb = 0;
            self.prev_poc_lsb = 0;
        }

        let max_lsb = sps.max_pic_order_cnt_lsb() as i32;
        let lsb = header.pic_order_cnt_lsb as i32;
        let (prev_msb, prev_lsb) = (self.prev_poc_msb, self.prev_poc_lsb);

        let msb = if lsb < prev_lsb && prev_lsb - lsb >= max_lsb / 2 {
            prev_msb + max_lsb
        } else if lsb > prev_lsb && lsb - prev_lsb > max_lsb / 2 {
            prev_msb - max_lsb
        } else {
            prev_msb
        };

        let top = msb + lsb;
        let bottom = top + header.delta_pic_order_cnt_bottom;

        // Only reference pictures update the prediction
        if header.is_reference() {
            self.prev_poc_msb = msb;
            self.prev_poc_lsb = lsb;
        }

        (top, bottom)
    }

    fn frame_num_offset(&mut self, sps: &Sps, header: &SliceHeader) -> i32 {
        let prev_offset = if self.prev_has_mmco5 {
            0
        } else {
            self.prev_frame_num_offset
        };

        let offset = if header.is_idr {
            0
        } else if self.prev_frame_num > header.frame_num {
            prev_offset.wrapping_add(sps.max_frame_num() as i32)
        } else {
            prev_offset
        };

        self.prev_frame_num_offset = offset;
        self.prev_frame_num = header.frame_num;

        offset
    }

    // SPS offsets may take any 32 bit value, sums wrap instead of overflowing
    fn compute_type1(&mut self, sps: &Sps, header: &SliceHeader) -> (i32, i32) {
        let frame_num_offset = self.frame_num_offset(sps, header);
        let cycle_len = sps.offset_for_ref_frame.len() as i32;

        let mut abs_frame_num = if cycle_len != 0 {
            frame_num_offset.wrapping_add(header.frame_num as i32)
        } else {
            0
        };

        if !header.is_reference() && abs_frame_num > 0 {
            abs_frame_num -= 1;
        }

        let sum = |offsets: &[i32]| offsets.iter().fold(0i32, |acc, o| acc.wrapping_add(*o));

        let mut expected = 0i32;
        if abs_frame_num > 0 {
            let cycle_count = (abs_frame_num - 1) / cycle_len;
            let frame_num_in_cycle = ((abs_frame_num - 1) % cycle_len) as usize;
            let delta_per_cycle = sum(&sps.offset_for_ref_frame);

            expected = cycle_count
                .wrapping_mul(delta_per_cycle)
                .wrapping_add(sum(&sps.offset_for_ref_frame[..=frame_num_in_cycle]));
        }

        if !header.is_reference() {
            expected = expected.wrapping_add(sps.offset_for_non_ref_pic);
        }

        let top = expected.wrapping_add(header.delta_pic_order_cnt[0]);
        let bottom = top
            .wrapping_add(sps.offset_for_top_to_bottom_field)
            .wrapping_add(header.delta_pic_order_cnt[1]);

        (top, bottom)
    }

    fn compute_type2(&mut self, sps: &Sps, header: &SliceHeader) -> (i32, i32) {
        let frame_num_offset = self.frame_num_offset(sps, header);

        let abs_frame_num = frame_num_offset.wrapping_add(header.frame_num as i32);

        let poc = if header.is_idr {
            0
        } else if !header.is_reference() {
            abs_frame_num.wrapping_mul(2).wrapping_sub(1)
        } else {
            abs_frame_num.wrapping_mul(2)
        };

        (poc, poc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::test_support::{TestPps, TestSlice, TestSps};
    use crate::bitstream::{ParameterSets, Pps};

    fn setup(sps: &TestSps) -> (Sps, ParameterSets) {
        let parsed = Sps::from_nal(&sps.build()).unwrap();
        let mut sets = ParameterSets::new();
        sets.insert_sps(parsed.clone());
        sets.insert_pps(Pps::from_nal(&TestPps::new(0, 0).build()).unwrap());
        (parsed, sets)
    }

    fn poc_of(state: &mut PocState, sps: &Sps, sets: &ParameterSets, slice: TestSlice) -> i32 {
        let header = SliceHeader::from_nal(&slice.build(), sets).unwrap();
        state.compute(sps, &header)
    }

    #[test]
    fn test_type0_lsb_wraparound() {
        let test_sps = TestSps::new(640, 480).with_poc_type(0);
        let (sps, sets) = setup(&test_sps);
        let mut state = PocState::new();

        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::idr(&test_sps).with_poc_lsb(0)), 0);
        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::p(&test_sps, 1).with_poc_lsb(100)), 100);
        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::p(&test_sps, 2).with_poc_lsb(200)), 200);
        // max lsb is 256, 4 after 200 means the msb advanced
        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::p(&test_sps, 3).with_poc_lsb(4)), 260);
        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::b(&test_sps, 4).with_poc_lsb(254)), 254);
        // a jump of more than half the range backwards from 0
        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::idr(&test_sps).with_poc_lsb(0)), 0);
        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::p(&test_sps, 1).with_poc_lsb(200)), -56);
    }

    #[test]
    fn test_type0_idr_resets() {
        let test_sps = TestSps::new(640, 480).with_poc_type(0);
        let (sps, sets) = setup(&test_sps);
        let mut state = PocState::new();

        poc_of(&mut state, &sps, &sets, TestSlice::idr(&test_sps).with_poc_lsb(0));
        poc_of(&mut state, &sps, &sets, TestSlice::p(&test_sps, 1).with_poc_lsb(100));
        poc_of(&mut state, &sps, &sets, TestSlice::p(&test_sps, 2).with_poc_lsb(200));
        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::p(&test_sps, 3).with_poc_lsb(4)), 260);

        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::idr(&test_sps).with_poc_lsb(2)), 2);
    }

    #[test]
    fn test_type1_expected_deltas() {
        let test_sps = TestSps::new(640, 480)
            .with_poc_type(1)
            .with_offsets_for_ref_frame(vec![4]);
        let (sps, sets) = setup(&test_sps);
        let mut state = PocState::new();

        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::idr(&test_sps)), 0);
        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::p(&test_sps, 1)), 4);
        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::p(&test_sps, 2)), 8);
        // non-reference: abs frame num 2, expected 8 plus offset_for_non_ref_pic (-2)
        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::b(&test_sps, 3)), 6);
        assert_eq!(
            poc_of(&mut state, &sps, &sets, TestSlice::p(&test_sps, 3).with_delta_poc(1)),
            13
        );
    }

    #[test]
    fn test_type1_extreme_offsets_wrap() {
        let test_sps = TestSps::new(640, 480)
            .with_poc_type(1)
            .with_offsets_for_ref_frame(vec![1 << 30, 1 << 30]);
        let (sps, sets) = setup(&test_sps);
        let mut state = PocState::new();

        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::idr(&test_sps)), 0);
        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::p(&test_sps, 1)), 1 << 30);
        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::p(&test_sps, 2)), i32::MIN);
        // a whole cycle wraps to i32::MIN, plus the first offset
        assert_eq!(
            poc_of(&mut state, &sps, &sets, TestSlice::p(&test_sps, 3)),
            i32::MIN + (1 << 30)
        );
    }

    #[test]
    fn test_type2_follows_frame_num() {
        let test_sps = TestSps::new(640, 480);
        let (sps, sets) = setup(&test_sps);
        let mut state = PocState::new();

        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::idr(&test_sps)), 0);
        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::p(&test_sps, 1)), 2);
        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::non_ref_p(&test_sps, 2)), 3);
        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::p(&test_sps, 2)), 4);
    }

    #[test]
    fn test_type2_frame_num_wrap() {
        // log2_max_frame_num is 4
        let test_sps = TestSps::new(640, 480);
        let (sps, sets) = setup(&test_sps);
        let mut state = PocState::new();

        poc_of(&mut state, &sps, &sets, TestSlice::idr(&test_sps));
        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::p(&test_sps, 15)), 30);
        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::p(&test_sps, 0)), 32);
    }

    #[test]
    fn test_mmco5_resets() {
        use crate::bitstream::Mmco;

        let test_sps = TestSps::new(640, 480);
        let (sps, sets) = setup(&test_sps);
        let mut state = PocState::new();

        poc_of(&mut state, &sps, &sets, TestSlice::idr(&test_sps));
        poc_of(&mut state, &sps, &sets, TestSlice::p(&test_sps, 1));
        let reset = TestSlice::p(&test_sps, 2).with_mmco(vec![Mmco::UnmarkAll]);

        assert_eq!(poc_of(&mut state, &sps, &sets, reset), 0);
        assert_eq!(poc_of(&mut state, &sps, &sets, TestSlice::p(&test_sps, 1)), 2);
    }
}
