//! Builders producing real H.264 parameter sets and slice headers for tests

use super::Mmco;
use crate::stream::{add_emulation_prevention, NalUnit};

/// MSB-first bit writer with Exp-Golomb support
#[derive(Debug, Default)]
pub struct BitWriter {
    data: Vec<u8>,
    bits: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bit(&mut self, bit: bool) {
        if self.bits % 8 == 0 {
            self.data.push(0);
        }

        if bit {
            let last = self.data.len() - 1;
            self.data[last] |= 0x80 >> (self.bits % 8);
        }

        self.bits += 1;
    }

    pub fn write_bits(&mut self, value: u32, count: u8) {
        for i in (0..count).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    pub fn write_ue(&mut self, value: u32) {
        let coded = value as u64 + 1;
        let len = 64 - coded.leading_zeros() as u8;

        for _ in 0..len - 1 {
            self.write_bit(false);
        }

        for i in (0..len).rev() {
            self.write_bit((coded >> i) & 1 == 1);
        }
    }

    pub fn write_se(&mut self, value: i32) {
        let coded = if value > 0 {
            (value as u32) * 2 - 1
        } else {
            (-(value as i64) as u32) * 2
        };

        self.write_ue(coded);
    }

    /// Appends the rbsp stop bit and alignment zeros
    pub fn finish(mut self) -> Vec<u8> {
        self.write_bit(true);
        while self.bits % 8 != 0 {
            self.write_bit(false);
        }

        self.data
    }
}

fn build_nal(header: u8, rbsp: Vec<u8>) -> NalUnit {
    let mut data = vec![header];
    data.extend(add_emulation_prevention(&rbsp));

    NalUnit::new(data).unwrap()
}

#[derive(Debug, Clone)]
pub struct TestSps {
    pub id: u32,
    pub profile_idc: u8,
    pub width: u32,
    pub height: u32,
    pub log2_max_frame_num: u32,
    pub poc_type: u32,
    pub log2_max_poc_lsb: u32,
    pub offset_for_non_ref_pic: i32,
    pub offsets_for_ref_frame: Vec<i32>,
    pub max_num_ref_frames: u32,
    pub reorder_frames: Option<u32>,
}

impl TestSps {
    /// Baseline profile, POC type 2, four reference frames
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            id: 0,
            profile_idc: 66,
            width,
            height,
            log2_max_frame_num: 4,
            poc_type: 2,
            log2_max_poc_lsb: 8,
            offset_for_non_ref_pic: -2,
            offsets_for_ref_frame: vec![2],
            max_num_ref_frames: 4,
            reorder_frames: None,
        }
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    pub fn with_profile(mut self, profile_idc: u8) -> Self {
        self.profile_idc = profile_idc;
        self
    }

    pub fn with_poc_type(mut self, poc_type: u32) -> Self {
        self.poc_type = poc_type;
        self
    }

    pub fn with_offsets_for_ref_frame(mut self, offsets: Vec<i32>) -> Self {
        self.offsets_for_ref_frame = offsets;
        self
    }

    pub fn with_max_num_ref_frames(mut self, count: u32) -> Self {
        self.max_num_ref_frames = count;
        self
    }

    pub fn with_reorder_frames(mut self, count: u32) -> Self {
        self.reorder_frames = Some(count);
        self
    }

    pub fn build(&self) -> NalUnit {
        let mut w = BitWriter::new();

        w.write_bits(self.profile_idc as u32, 8);
        w.write_bits(0, 8);
        w.write_bits(40, 8);
        w.write_ue(self.id);

        if self.profile_idc == 100 {
            // 4:2:0, 8 bit, no transform bypass, no scaling matrix
            w.write_ue(1);
            w.write_ue(0);
            w.write_ue(0);
            w.write_bit(false);
            w.write_bit(false);
        }

        w.write_ue(self.log2_max_frame_num - 4);
        w.write_ue(self.poc_type);
        match self.poc_type {
            0 => w.write_ue(self.log2_max_poc_lsb - 4),
            1 => {
                w.write_bit(false);
                w.write_se(self.offset_for_non_ref_pic);
                w.write_se(0);
                w.write_ue(self.offsets_for_ref_frame.len() as u32);
                for offset in self.offsets_for_ref_frame.iter() {
                    w.write_se(*offset);
                }
            }
            _ => {}
        }

        w.write_ue(self.max_num_ref_frames);
        w.write_bit(false);

        let width_mbs = (self.width + 15) / 16;
        let height_mbs = (self.height + 15) / 16;
        w.write_ue(width_mbs - 1);
        w.write_ue(height_mbs - 1);
        // frame_mbs_only_flag, direct_8x8_inference_flag
        w.write_bit(true);
        w.write_bit(true);

        let crop_right = width_mbs * 16 - self.width;
        let crop_bottom = height_mbs * 16 - self.height;
        if crop_right > 0 || crop_bottom > 0 {
            w.write_bit(true);
            w.write_ue(0);
            w.write_ue(crop_right / 2);
            w.write_ue(0);
            w.write_ue(crop_bottom / 2);
        } else {
            w.write_bit(false);
        }

        match self.reorder_frames {
            Some(reorder) => {
                w.write_bit(true);
                // aspect ratio, overscan, video signal, chroma loc, timing, hrd x2
                for _ in 0..7 {
                    w.write_bit(false);
                }
                // pic_struct_present_flag
                w.write_bit(false);
                // bitstream_restriction_flag
                w.write_bit(true);
                w.write_bit(true);
                w.write_ue(2);
                w.write_ue(1);
                w.write_ue(16);
                w.write_ue(16);
                w.write_ue(reorder);
                w.write_ue(self.max_num_ref_frames);
            }
            None => w.write_bit(false),
        }

        build_nal(0x67, w.finish())
    }
}

#[derive(Debug, Clone)]
pub struct TestPps {
    pub id: u32,
    pub sps_id: u32,
    pub bottom_field_pic_order: bool,
}

impl TestPps {
    pub fn new(id: u32, sps_id: u32) -> Self {
        Self {
            id,
            sps_id,
            bottom_field_pic_order: false,
        }
    }

    pub fn with_bottom_field_pic_order(mut self, value: bool) -> Self {
        self.bottom_field_pic_order = value;
        self
    }

    pub fn build(&self) -> NalUnit {
        let mut w = BitWriter::new();

        w.write_ue(self.id);
        w.write_ue(self.sps_id);
        // entropy_coding_mode_flag
        w.write_bit(false);
        w.write_bit(self.bottom_field_pic_order);
        // num_slice_groups_minus1, num_ref_idx_l0/l1_default_active_minus1
        w.write_ue(0);
        w.write_ue(0);
        w.write_ue(0);
        // weighted_pred_flag, weighted_bipred_idc
        w.write_bit(false);
        w.write_bits(0, 2);
        // pic_init_qp_minus26, pic_init_qs_minus26, chroma_qp_index_offset
        w.write_se(0);
        w.write_se(0);
        w.write_se(0);
        // deblocking_filter_control_present, constrained_intra_pred, redundant_pic_cnt_present
        w.write_bit(true);
        w.write_bit(false);
        w.write_bit(false);

        build_nal(0x68, w.finish())
    }
}

#[derive(Debug, Clone)]
pub struct TestSlice {
    sps: TestSps,
    idr: bool,
    nal_ref_idc: u8,
    slice_type: u32,
    pps_id: u32,
    first_mb: u32,
    frame_num: u32,
    poc_lsb: u32,
    delta_poc: i32,
    long_term_reference: bool,
    mmco: Option<Vec<Mmco>>,
}

impl TestSlice {
    fn new(sps: &TestSps, idr: bool, nal_ref_idc: u8, slice_type: u32, frame_num: u32) -> Self {
        Self {
            sps: sps.clone(),
            idr,
            nal_ref_idc,
            slice_type,
            pps_id: 0,
            first_mb: 0,
            frame_num,
            poc_lsb: 0,
            delta_poc: 0,
            long_term_reference: false,
            mmco: None,
        }
    }

    pub fn idr(sps: &TestSps) -> Self {
        Self::new(sps, true, 3, 7, 0)
    }

    /// Reference P slice
    pub fn p(sps: &TestSps, frame_num: u32) -> Self {
        Self::new(sps, false, 2, 5, frame_num)
    }

    /// Non-reference P slice
    pub fn non_ref_p(sps: &TestSps, frame_num: u32) -> Self {
        Self::new(sps, false, 0, 5, frame_num)
    }

    /// Non-reference B slice
    pub fn b(sps: &TestSps, frame_num: u32) -> Self {
        Self::new(sps, false, 0, 6, frame_num)
    }

    pub fn with_pps_id(mut self, pps_id: u32) -> Self {
        self.pps_id = pps_id;
        self
    }

    pub fn with_first_mb(mut self, first_mb: u32) -> Self {
        self.first_mb = first_mb;
        self
    }

    pub fn with_poc_lsb(mut self, poc_lsb: u32) -> Self {
        self.poc_lsb = poc_lsb;
        self
    }

    pub fn with_delta_poc(mut self, delta: i32) -> Self {
        self.delta_poc = delta;
        self
    }

    pub fn with_long_term_reference(mut self, value: bool) -> Self {
        self.long_term_reference = value;
        self
    }

    pub fn with_mmco(mut self, ops: Vec<Mmco>) -> Self {
        self.mmco = Some(ops);
        self
    }

    pub fn build(&self) -> NalUnit {
        let mut w = BitWriter::new();

        w.write_ue(self.first_mb);
        w.write_ue(self.slice_type);
        w.write_ue(self.pps_id);
        w.write_bits(self.frame_num, self.sps.log2_max_frame_num as u8);

        if self.idr {
            w.write_ue(0);
        }

        match self.sps.poc_type {
            0 => w.write_bits(self.poc_lsb, self.sps.log2_max_poc_lsb as u8),
            1 => w.write_se(self.delta_poc),
            _ => {}
        }

        let slice_type = self.slice_type % 5;
        if slice_type == 1 {
            // direct_spatial_mv_pred_flag
            w.write_bit(true);
        }

        if slice_type == 0 || slice_type == 1 {
            // num_ref_idx_active_override_flag, ref_pic_list_modification_flag_l0
            w.write_bit(false);
            w.write_bit(false);
            if slice_type == 1 {
                w.write_bit(false);
            }
        }

        if self.nal_ref_idc != 0 {
            if self.idr {
                w.write_bit(false);
                w.write_bit(self.long_term_reference);
            } else {
                match &self.mmco {
                    Some(ops) => {
                        w.write_bit(true);
                        for op in ops {
                            write_mmco(&mut w, op);
                        }
                        w.write_ue(0);
                    }
                    None => w.write_bit(false),
                }
            }
        }

        // slice_qp_delta and a token of slice data
        w.write_se(0);
        w.write_bits(0b1011, 4);

        let nal_type = if self.idr { 5 } else { 1 };
        build_nal((self.nal_ref_idc << 5) | nal_type, w.finish())
    }
}

fn write_mmco(w: &mut BitWriter, op: &Mmco) {
    match op {
        Mmco::UnmarkShortTerm {
            difference_of_pic_nums,
        } => {
            w.write_ue(1);
            w.write_ue(difference_of_pic_nums - 1);
        }
        Mmco::UnmarkLongTerm { long_term_pic_num } => {
            w.write_ue(2);
            w.write_ue(*long_term_pic_num);
        }
        Mmco::ShortTermToLongTerm {
            difference_of_pic_nums,
            long_term_frame_idx,
        } => {
            w.write_ue(3);
            w.write_ue(difference_of_pic_nums - 1);
            w.write_ue(*long_term_frame_idx);
        }
        Mmco::MaxLongTermIndex {
            max_long_term_frame_idx_plus1,
        } => {
            w.write_ue(4);
            w.write_ue(*max_long_term_frame_idx_plus1);
        }
        Mmco::UnmarkAll => w.write_ue(5),
        Mmco::CurrentToLongTerm {
            long_term_frame_idx,
        } => {
            w.write_ue(6);
            w.write_ue(*long_term_frame_idx);
        }
    }
}
