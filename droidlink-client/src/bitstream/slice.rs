use super::{BitReader, BitstreamError, ParameterSets, Pps, Sps};
use crate::stream::{NalType, NalUnit};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SliceType {
    P,
    B,
    I,
    Sp,
    Si,
}

impl SliceType {
    fn from_id(id: u32) -> Result<Self, BitstreamError> {
        Ok(match id % 5 {
            0 => Self::P,
            1 => Self::B,
            2 => Self::I,
            3 => Self::Sp,
            4 => Self::Si,
            _ => return Err(BitstreamError::InvalidValue("slice_type", id as i64)),
        })
    }

    fn is_intra(self) -> bool {
        self == Self::I || self == Self::Si
    }
}

/// Memory management control operation (7.4.3.3)
#[derive(Debug, Clone, PartialEq)]
pub enum Mmco {
    /// 1
    UnmarkShortTerm { difference_of_pic_nums: u32 },
    /// 2
    UnmarkLongTerm { long_term_pic_num: u32 },
    /// 3
    ShortTermToLongTerm {
        difference_of_pic_nums: u32,
        long_term_frame_idx: u32,
    },
    /// 4
    MaxLongTermIndex { max_long_term_frame_idx_plus1: u32 },
    /// 5
    UnmarkAll,
    /// 6
    CurrentToLongTerm { long_term_frame_idx: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecRefPicMarking {
    Idr {
        no_output_of_prior_pics: bool,
        long_term_reference: bool,
    },
    SlidingWindow,
    Adaptive(Vec<Mmco>),
}

/// Slice header fields (7.3.3) through `dec_ref_pic_marking`
#[derive(Debug, Clone, PartialEq)]
pub struct SliceHeader {
    pub nal_ref_idc: u8,
    pub is_idr: bool,
    pub first_mb_in_slice: u32,
    pub slice_type: SliceType,
    pub pps_id: u32,
    pub frame_num: u32,
    pub field_pic: bool,
    pub bottom_field: bool,
    pub idr_pic_id: Option<u32>,
    pub pic_order_cnt_lsb: u32,
    pub delta_pic_order_cnt_bottom: i32,
    pub delta_pic_order_cnt: [i32; 2],
    /// `None` for non-reference pictures
    pub dec_ref_pic_marking: Option<DecRefPicMarking>,
}

/// Reads the leading `first_mb_in_slice`, `slice_type` and `pic_parameter_set_id`
pub fn peek_pps_id(nal: &NalUnit) -> Result<u32, BitstreamError> {
    if !nal.nal_type().is_vcl() {
        return Err(BitstreamError::UnexpectedNalType("slice"));
    }

    let rbsp = nal.rbsp();
    let mut r = BitReader::new(&rbsp);
    r.read_ue()?;
    r.read_ue()?;

    r.read_ue_max("pic_parameter_set_id", 255)
}

impl SliceHeader {
    pub fn from_nal(nal: &NalUnit, sets: &ParameterSets) -> Result<Self, BitstreamError> {
        let nal_type = nal.nal_type();
        if nal_type != NalType::Slice && nal_type != NalType::Idr {
            return Err(BitstreamError::UnexpectedNalType("slice"));
        }

        let rbsp = nal.rbsp();
        let mut r = BitReader::new(&rbsp);

        let first_mb_in_slice = r.read_ue()?;
        let slice_type = SliceType::from_id(r.read_ue_max("slice_type", 9)?)?;
        let pps_id = r.read_ue_max("pic_parameter_set_id", 255)?;
        let (sps, pps) = sets.active(pps_id)?;

        Self::parse_remaining(
            &mut r,
            nal,
            sps,
            pps,
            first_mb_in_slice,
            slice_type,
            pps_id,
        )
    }

    fn parse_remaining(
        r: &mut BitReader,
        nal: &NalUnit,
        sps: &Sps,
        pps: &Pps,
        first_mb_in_slice: u32,
        slice_type: SliceType,
        pps_id: u32,
    ) -> Result<Self, BitstreamError> {
        let is_idr = nal.is_idr();
        let nal_ref_idc = nal.nal_ref_idc();

        if sps.separate_colour_plane {
            // colour_plane_id
            r.skip_bits(2)?;
        }

        let frame_num = r.read_bits(sps.log2_max_frame_num as u8)?;

        let mut field_pic = false;
        let mut bottom_field = false;
        if !sps.frame_mbs_only {
            field_pic = r.read_flag()?;
            if field_pic {
                bottom_field = r.read_flag()?;
            }
        }

        let idr_pic_id = if is_idr {
            Some(r.read_ue_max("idr_pic_id", 65535)?)
        } else {
            None
        };

        let mut pic_order_cnt_lsb = 0;
        let mut delta_pic_order_cnt_bottom = 0;
        let mut delta_pic_order_cnt = [0; 2];

        if sps.pic_order_cnt_type == 0 {
            pic_order_cnt_lsb = r.read_bits(sps.log2_max_pic_order_cnt_lsb as u8)?;
            if pps.bottom_field_pic_order_in_frame_present && !field_pic {
                delta_pic_order_cnt_bottom = r.read_se()?;
            }
        }

        if sps.pic_order_cnt_type == 1 && !sps.delta_pic_order_always_zero {
            delta_pic_order_cnt[0] = r.read_se()?;
            if pps.bottom_field_pic_order_in_frame_present && !field_pic {
                delta_pic_order_cnt[1] = r.read_se()?;
            }
        }

        if pps.redundant_pic_cnt_present {
            r.read_ue()?;
        }

        if slice_type == SliceType::B {
            // direct_spatial_mv_pred_flag
            r.skip_bits(1)?;
        }

        let mut num_ref_idx_l0_active = pps.num_ref_idx_l0_default_active;
        let mut num_ref_idx_l1_active = pps.num_ref_idx_l1_default_active;

        if matches!(slice_type, SliceType::P | SliceType::Sp | SliceType::B) && r.read_flag()? {
            num_ref_idx_l0_active = r.read_ue_max("num_ref_idx_l0_active_minus1", 31)? + 1;
            if slice_type == SliceType::B {
                num_ref_idx_l1_active = r.read_ue_max("num_ref_idx_l1_active_minus1", 31)? + 1;
            }
        }

        if !slice_type.is_intra() {
            skip_ref_pic_list_modification(r)?;
            if slice_type == SliceType::B {
                skip_ref_pic_list_modification(r)?;
            }
        }

        let has_weights = (pps.weighted_pred && matches!(slice_type, SliceType::P | SliceType::Sp))
            || (pps.weighted_bipred_idc == 1 && slice_type == SliceType::B);
        if has_weights {
            skip_pred_weight_table(
                r,
                sps.chroma_array_type(),
                num_ref_idx_l0_active,
                if slice_type == SliceType::B {
                    Some(num_ref_idx_l1_active)
                } else {
                    None
                },
            )?;
        }

        let dec_ref_pic_marking = if nal_ref_idc != 0 {
            Some(parse_dec_ref_pic_marking(r, is_idr)?)
        } else {
            None
        };

        Ok(Self {
            nal_ref_idc,
            is_idr,
            first_mb_in_slice,
            slice_type,
            pps_id,
            frame_num,
            field_pic,
            bottom_field,
            idr_pic_id,
            pic_order_cnt_lsb,
            delta_pic_order_cnt_bottom,
            delta_pic_order_cnt,
            dec_ref_pic_marking,
        })
    }

    pub fn is_reference(&self) -> bool {
        self.nal_ref_idc != 0
    }

    /// Whether this slice carries memory_management_control_operation 5
    pub fn has_mmco5(&self) -> bool {
        match &self.dec_ref_pic_marking {
            Some(DecRefPicMarking::Adaptive(ops)) => ops.contains(&Mmco::UnmarkAll),
            _ => false,
        }
    }
}

fn skip_ref_pic_list_modification(r: &mut BitReader) -> Result<(), BitstreamError> {
    if !r.read_flag()? {
        return Ok(());
    }

    // Bounded by the maximum list size plus the terminator
    for _ in 0..=32 {
        match r.read_ue()? {
            0 | 1 | 2 => {
                r.read_ue()?;
            }
            3 => return Ok(()),
            other => {
                return Err(BitstreamError::InvalidValue(
                    "modification_of_pic_nums_idc",
                    other as i64,
                ))
            }
        }
    }

    Err(BitstreamError::InvalidValue("ref_pic_list_modification", 33))
}

fn skip_pred_weight_table(
    r: &mut BitReader,
    chroma_array_type: u32,
    l0_count: u32,
    l1_count: Option<u32>,
) -> Result<(), BitstreamError> {
    // luma_log2_weight_denom
    r.read_ue()?;
    if chroma_array_type != 0 {
        r.read_ue()?;
    }

    for count in Some(l0_count).into_iter().chain(l1_count) {
        for _ in 0..count {
            if r.read_flag()? {
                r.read_se()?;
                r.read_se()?;
            }

            if chroma_array_type != 0 && r.read_flag()? {
                for _ in 0..4 {
                    r.read_se()?;
                }
            }
        }
    }

    Ok(())
}

fn parse_dec_ref_pic_marking(r: &mut BitReader, is_idr: bool) -> Result<DecRefPicMarking, BitstreamError> {
    if is_idr {
        return Ok(DecRefPicMarking::Idr {
            no_output_of_prior_pics: r.read_flag()?,
            long_term_reference: r.read_flag()?,
        });
    }

    if !r.read_flag()? {
        return Ok(DecRefPicMarking::SlidingWindow);
    }

    let mut ops = vec![];

    loop {
        let op = match r.read_ue()? {
            0 => break,
            1 => Mmco::UnmarkShortTerm {
                difference_of_pic_nums: r.read_ue()?.saturating_add(1),
            },
            2 => Mmco::UnmarkLongTerm {
                long_term_pic_num: r.read_ue()?,
            },
            3 => Mmco::ShortTermToLongTerm {
                difference_of_pic_nums: r.read_ue()?.saturating_add(1),
                long_term_frame_idx: r.read_ue()?,
            },
            4 => Mmco::MaxLongTermIndex {
                max_long_term_frame_idx_plus1: r.read_ue()?,
            },
            5 => Mmco::UnmarkAll,
            6 => Mmco::CurrentToLongTerm {
                long_term_frame_idx: r.read_ue()?,
            },
            other => {
                return Err(BitstreamError::InvalidValue(
                    "memory_management_control_operation",
                    other as i64,
                ))
            }
        };

        ops.push(op);

        if ops.len() > 66 {
            return Err(BitstreamError::InvalidValue("mmco count", ops.len() as i64));
        }
    }

    Ok(DecRefPicMarking::Adaptive(ops))
}
