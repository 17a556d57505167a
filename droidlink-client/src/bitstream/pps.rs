use super::{BitReader, BitstreamError};
use crate::stream::{NalType, NalUnit};

const MAX_PPS_ID: u32 = 255;
const MAX_SPS_ID: u32 = 31;

/// Picture parameter set (7.3.2.2), fields up to `redundant_pic_cnt_present_flag`
#[derive(Debug, Clone, PartialEq)]
pub struct Pps {
    pub id: u32,
    pub sps_id: u32,
    pub entropy_coding_mode: bool,
    pub bottom_field_pic_order_in_frame_present: bool,
    pub num_ref_idx_l0_default_active: u32,
    pub num_ref_idx_l1_default_active: u32,
    pub weighted_pred: bool,
    pub weighted_bipred_idc: u32,
    pub pic_init_qp: i32,
    pub chroma_qp_index_offset: i32,
    pub deblocking_filter_control_present: bool,
    pub constrained_intra_pred: bool,
    pub redundant_pic_cnt_present: bool,
}

impl Pps {
    pub fn from_nal(nal: &NalUnit) -> Result<Self, BitstreamError> {
        if nal.nal_type() != NalType::Pps {
            return Err(BitstreamError::UnexpectedNalType("pps"));
        }

        Self::parse(&nal.rbsp())
    }

    pub fn parse(rbsp: &[u8]) -> Result<Self, BitstreamError> {
        let mut r = BitReader::new(rbsp);

        let id = r.read_ue_max("pic_parameter_set_id", MAX_PPS_ID)?;
        let sps_id = r.read_ue_max("seq_parameter_set_id", MAX_SPS_ID)?;
        let entropy_coding_mode = r.read_flag()?;
        let bottom_field_pic_order_in_frame_present = r.read_flag()?;

        if r.read_ue()? != 0 {
            return Err(BitstreamError::Unsupported("slice groups"));
        }

        let num_ref_idx_l0_default_active = r.read_ue_max("num_ref_idx_l0_default_active_minus1", 31)? + 1;
        let num_ref_idx_l1_default_active = r.read_ue_max("num_ref_idx_l1_default_active_minus1", 31)? + 1;
        let weighted_pred = r.read_flag()?;
        let weighted_bipred_idc = r.read_bits(2)?;
        let pic_init_qp = 26 + r.read_se()?;
        // pic_init_qs_minus26
        r.read_se()?;
        let chroma_qp_index_offset = r.read_se()?;
        let deblocking_filter_control_present = r.read_flag()?;
        let constrained_intra_pred = r.read_flag()?;
        let redundant_pic_cnt_present = r.read_flag()?;

        Ok(Self {
            id,
            sps_id,
            entropy_coding_mode,
            bottom_field_pic_order_in_frame_present,
            num_ref_idx_l0_default_active,
            num_ref_idx_l1_default_active,
            weighted_pred,
            weighted_bipred_idc,
            pic_init_qp,
            chroma_qp_index_offset,
            deblocking_filter_control_present,
            constrained_intra_pred,
            redundant_pic_cnt_present,
        })
    }
}
