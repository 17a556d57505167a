use super::{BitReader, BitstreamError};
use crate::stream::{NalType, NalUnit};
use log::*;

const MAX_SPS_ID: u32 = 31;
const MAX_OFFSET_FOR_REF_FRAMES: u32 = 255;
const MAX_MBS: u32 = 1024;

/// Profiles carrying chroma format, bit depth and scaling matrices
const HIGH_PROFILES: [u8; 13] = [100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134, 135];

const BASELINE_PROFILE: u8 = 66;
const HIGH_PROFILE: u8 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct FrameCropping {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

/// The bitstream restriction part of the VUI
#[derive(Debug, Clone, PartialEq)]
pub struct VuiParameters {
    pub max_num_reorder_frames: Option<u32>,
    pub max_dec_frame_buffering: Option<u32>,
}

/// Sequence parameter set (7.3.2.1.1)
#[derive(Debug, Clone, PartialEq)]
pub struct Sps {
    pub profile_idc: u8,
    pub constraint_flags: u8,
    pub level_idc: u8,
    pub id: u32,
    pub chroma_format_idc: u32,
    pub separate_colour_plane: bool,
    pub bit_depth_luma: u32,
    pub bit_depth_chroma: u32,
    pub log2_max_frame_num: u32,
    pub pic_order_cnt_type: u32,
    pub log2_max_pic_order_cnt_lsb: u32,
    pub delta_pic_order_always_zero: bool,
    pub offset_for_non_ref_pic: i32,
    pub offset_for_top_to_bottom_field: i32,
    pub offset_for_ref_frame: Vec<i32>,
    pub max_num_ref_frames: u32,
    pub gaps_in_frame_num_allowed: bool,
    pub pic_width_in_mbs: u32,
    pub pic_height_in_map_units: u32,
    pub frame_mbs_only: bool,
    pub mb_adaptive_frame_field: bool,
    pub direct_8x8_inference: bool,
    pub cropping: Option<FrameCropping>,
    pub vui: Option<VuiParameters>,
}

impl Sps {
    pub fn from_nal(nal: &NalUnit) -> Result<Self, BitstreamError> {
        if nal.nal_type() != NalType::Sps {
            return Err(BitstreamError::UnexpectedNalType("sps"));
        }

        Self::parse(&nal.rbsp())
    }

    /// Parses the RBSP following the NAL header
    pub fn parse(rbsp: &[u8]) -> Result<Self, BitstreamError> {
        let mut r = BitReader::new(rbsp);

        let profile_idc = r.read_bits(8)? as u8;
        let constraint_flags = r.read_bits(8)? as u8;
        let level_idc = r.read_bits(8)? as u8;
        let id = r.read_ue_max("seq_parameter_set_id", MAX_SPS_ID)?;

        let mut chroma_format_idc = 1;
        let mut separate_colour_plane = false;
        let mut bit_depth_luma = 8;
        let mut bit_depth_chroma = 8;

        if HIGH_PROFILES.contains(&profile_idc) {
            chroma_format_idc = r.read_ue_max("chroma_format_idc", 3)?;
            if chroma_format_idc == 3 {
                separate_colour_plane = r.read_flag()?;
            }

            bit_depth_luma = r.read_ue_max("bit_depth_luma_minus8", 6)? + 8;
            bit_depth_chroma = r.read_ue_max("bit_depth_chroma_minus8", 6)? + 8;
            // qpprime_y_zero_transform_bypass_flag
            r.skip_bits(1)?;

            if r.read_flag()? {
                let count = if chroma_format_idc == 3 { 12 } else { 8 };
                for i in 0..count {
                    if r.read_flag()? {
                        skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                    }
                }
            }
        }

        let log2_max_frame_num = r.read_ue_max("log2_max_frame_num_minus4", 12)? + 4;
        let pic_order_cnt_type = r.read_ue_max("pic_order_cnt_type", 2)?;

        let mut log2_max_pic_order_cnt_lsb = 0;
        let mut delta_pic_order_always_zero = false;
        let mut offset_for_non_ref_pic = 0;
        let mut offset_for_top_to_bottom_field = 0;
        let mut offset_for_ref_frame = vec![];

        match pic_order_cnt_type {
            0 => {
                log2_max_pic_order_cnt_lsb = r.read_ue_max("log2_max_pic_order_cnt_lsb_minus4", 12)? + 4;
            }
            1 => {
                delta_pic_order_always_zero = r.read_flag()?;
                offset_for_non_ref_pic = r.read_se()?;
                offset_for_top_to_bottom_field = r.read_se()?;

                let count = r.read_ue_max("num_ref_frames_in_pic_order_cnt_cycle", MAX_OFFSET_FOR_REF_FRAMES)?;
                for _ in 0..count {
                    offset_for_ref_frame.push(r.read_se()?);
                }
            }
            _ => {}
        }

        let max_num_ref_frames = r.read_ue_max("max_num_ref_frames", 16)?;
        let gaps_in_frame_num_allowed = r.read_flag()?;
        let pic_width_in_mbs = r.read_ue_max("pic_width_in_mbs_minus1", MAX_MBS - 1)? + 1;
        let pic_height_in_map_units =
            r.read_ue_max("pic_height_in_map_units_minus1", MAX_MBS - 1)? + 1;
        let frame_mbs_only = r.read_flag()?;

        let mb_adaptive_frame_field = if !frame_mbs_only { r.read_flag()? } else { false };
        let direct_8x8_inference = r.read_flag()?;

        let cropping = if r.read_flag()? {
            Some(FrameCropping {
                left: r.read_ue()?,
                right: r.read_ue()?,
                top: r.read_ue()?,
                bottom: r.read_ue()?,
            })
        } else {
            None
        };

        let vui = if r.read_flag()? {
            match VuiParameters::parse(&mut r) {
                Ok(vui) => Some(vui),
                Err(err) => {
                    debug!("ignoring unparsable vui: {}", err);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            profile_idc,
            constraint_flags,
            level_idc,
            id,
            chroma_format_idc,
            separate_colour_plane,
            bit_depth_luma,
            bit_depth_chroma,
            log2_max_frame_num,
            pic_order_cnt_type,
            log2_max_pic_order_cnt_lsb,
            delta_pic_order_always_zero,
            offset_for_non_ref_pic,
            offset_for_top_to_bottom_field,
            offset_for_ref_frame,
            max_num_ref_frames,
            gaps_in_frame_num_allowed,
            pic_width_in_mbs,
            pic_height_in_map_units,
            frame_mbs_only,
            mb_adaptive_frame_field,
            direct_8x8_inference,
            cropping,
            vui,
        })
    }

    /// ChromaArrayType
    pub fn chroma_array_type(&self) -> u32 {
        if self.separate_colour_plane {
            0
        } else {
            self.chroma_format_idc
        }
    }

    pub fn max_frame_num(&self) -> u32 {
        1 << self.log2_max_frame_num
    }

    pub fn max_pic_order_cnt_lsb(&self) -> u32 {
        1 << self.log2_max_pic_order_cnt_lsb
    }

    /// Width in pixels after cropping
    pub fn width(&self) -> u32 {
        let (crop_unit_x, _) = self.crop_units();
        let crop = self
            .cropping
            .as_ref()
            .map_or(0, |c| c.left.saturating_add(c.right).saturating_mul(crop_unit_x));

        (self.pic_width_in_mbs * 16).saturating_sub(crop)
    }

    /// Height in pixels after cropping
    pub fn height(&self) -> u32 {
        let (_, crop_unit_y) = self.crop_units();
        let crop = self
            .cropping
            .as_ref()
            .map_or(0, |c| c.top.saturating_add(c.bottom).saturating_mul(crop_unit_y));
        let frame_height_in_mbs = (2 - self.frame_mbs_only as u32) * self.pic_height_in_map_units;

        (frame_height_in_mbs * 16).saturating_sub(crop)
    }

    fn crop_units(&self) -> (u32, u32) {
        let field_factor = 2 - self.frame_mbs_only as u32;

        let (sub_width, sub_height) = match self.chroma_array_type() {
            0 => return (1, field_factor),
            1 => (2, 2),
            2 => (2, 1),
            _ => (1, 1),
        };

        (sub_width, sub_height * field_factor)
    }

    /// Number of pictures the reorder stage has to hold back
    pub fn reorder_depth(&self, default_depth: usize) -> usize {
        if let Some(depth) = self.vui.as_ref().and_then(|v| v.max_num_reorder_frames) {
            return depth as usize;
        }

        if self.profile_idc == BASELINE_PROFILE {
            return 0;
        }

        // Constrained high, constraint_set4 and constraint_set5 both set
        if self.profile_idc == HIGH_PROFILE && self.constraint_flags & 0x0C == 0x0C {
            return 0;
        }

        default_depth
    }

    /// DPB capacity in frames the stream expects
    pub fn max_dec_frame_buffering(&self) -> u32 {
        self.vui
            .as_ref()
            .and_then(|v| v.max_dec_frame_buffering)
            .unwrap_or(self.max_num_ref_frames)
            .max(self.max_num_ref_frames)
            .max(1)
    }
}

fn skip_scaling_list(r: &mut BitReader, size: usize) -> Result<(), BitstreamError> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;

    for _ in 0..size {
        if next_scale != 0 {
            let delta = r.read_se()?;
            next_scale = (last_scale + delta + 256).rem_euclid(256);
        }

        if next_scale != 0 {
            last_scale = next_scale;
        }
    }

    Ok(())
}

fn skip_hrd_parameters(r: &mut BitReader) -> Result<(), BitstreamError> {
    let cpb_count = r.read_ue_max("cpb_cnt_minus1", 31)? + 1;
    // bit_rate_scale, cpb_size_scale
    r.skip_bits(8)?;

    for _ in 0..cpb_count {
        r.read_ue()?;
        r.read_ue()?;
        r.skip_bits(1)?;
    }

    // initial_cpb_removal_delay_length_minus1, cpb_removal_delay_length_minus1,
    // dpb_output_delay_length_minus1, time_offset_length
    r.skip_bits(20)
}

impl VuiParameters {
    /// Parses the VUI (E.1.1), keeping only the bitstream restriction
    fn parse(r: &mut BitReader) -> Result<Self, BitstreamError> {
        if r.read_flag()? {
            let aspect_ratio_idc = r.read_bits(8)?;
            if aspect_ratio_idc == 255 {
                // sar_width, sar_height
                r.skip_bits(32)?;
            }
        }

        if r.read_flag()? {
            // overscan_appropriate_flag
            r.skip_bits(1)?;
        }

        if r.read_flag()? {
            // video_format, video_full_range_flag
            r.skip_bits(4)?;
            if r.read_flag()? {
                // colour_primaries, transfer_characteristics, matrix_coefficients
                r.skip_bits(24)?;
            }
        }

        if r.read_flag()? {
            r.read_ue()?;
            r.read_ue()?;
        }

        if r.read_flag()? {
            // num_units_in_tick, time_scale, fixed_frame_rate_flag
            r.skip_bits(65)?;
        }

        let nal_hrd = r.read_flag()?;
        if nal_hrd {
            skip_hrd_parameters(r)?;
        }

        let vcl_hrd = r.read_flag()?;
        if vcl_hrd {
            skip_hrd_parameters(r)?;
        }

        if nal_hrd || vcl_hrd {
            // low_delay_hrd_flag
            r.skip_bits(1)?;
        }

        // pic_struct_present_flag
        r.skip_bits(1)?;

        let mut vui = Self {
            max_num_reorder_frames: None,
            max_dec_frame_buffering: None,
        };

        if r.read_flag()? {
            // motion_vectors_over_pic_boundaries_flag
            r.skip_bits(1)?;
            for _ in 0..4 {
                r.read_ue()?;
            }

            vui.max_num_reorder_frames = Some(r.read_ue_max("max_num_reorder_frames", 16)?);
            vui.max_dec_frame_buffering = Some(r.read_ue_max("max_dec_frame_buffering", 16)?);
        }

        Ok(vui)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::TestSps;
    use super::*;

    #[test]
    fn test_parse_baseline_sps() {
        let nal = TestSps::new(1080, 2400).build();

        let sps = Sps::from_nal(&nal).unwrap();

        assert_eq!(sps.profile_idc, 66);
        assert_eq!(sps.width(), 1080);
        assert_eq!(sps.height(), 2400);
        assert_eq!(sps.pic_order_cnt_type, 2);
        assert_eq!(sps.reorder_depth(2), 0);
        assert_eq!(sps.vui, None);
    }

    #[test]
    fn test_parse_cropped_sps() {
        // 1080p is coded as 1088 lines and cropped by 8
        let nal = TestSps::new(1920, 1080).build();

        let sps = Sps::from_nal(&nal).unwrap();

        assert_eq!(sps.pic_height_in_map_units, 68);
        assert_eq!(sps.cropping.as_ref().map(|c| c.bottom), Some(4));
        assert_eq!(sps.height(), 1080);
    }

    #[test]
    fn test_parse_high_profile_with_vui() {
        let nal = TestSps::new(720, 1280)
            .with_profile(100)
            .with_poc_type(0)
            .with_reorder_frames(2)
            .build();

        let sps = Sps::from_nal(&nal).unwrap();

        assert_eq!(sps.profile_idc, 100);
        assert_eq!(sps.chroma_format_idc, 1);
        assert_eq!(sps.log2_max_pic_order_cnt_lsb, 8);
        assert_eq!(
            sps.vui,
            Some(VuiParameters {
                max_num_reorder_frames: Some(2),
                max_dec_frame_buffering: Some(4),
            })
        );
        assert_eq!(sps.reorder_depth(0), 2);
        assert_eq!(sps.width(), 720);
        assert_eq!(sps.height(), 1280);
    }

    #[test]
    fn test_parse_poc_type_1() {
        let nal = TestSps::new(640, 480)
            .with_poc_type(1)
            .with_offsets_for_ref_frame(vec![2, -1])
            .build();

        let sps = Sps::from_nal(&nal).unwrap();

        assert_eq!(sps.pic_order_cnt_type, 1);
        assert_eq!(sps.offset_for_ref_frame, vec![2, -1]);
        assert_eq!(sps.offset_for_non_ref_pic, -2);
    }

    #[test]
    fn test_reject_wrong_nal_type() {
        let nal = NalUnit::from_slice(&[0x68, 0xCE]).unwrap();

        assert_eq!(
            Sps::from_nal(&nal),
            Err(BitstreamError::UnexpectedNalType("sps"))
        );
    }

    #[test]
    fn test_truncated_sps() {
        assert_eq!(Sps::parse(&[66, 0]).is_err(), true);
    }
}
