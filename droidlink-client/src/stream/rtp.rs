use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::io::Write;
use thiserror::Error;

pub const RTP_VERSION: u8 = 2;
pub const RTP_FIXED_HEADER_SIZE: usize = 12;

#[derive(Error, Debug, PartialEq)]
pub enum RtpParseError {
    #[error("received rtp packet is too small: {0}")]
    BufferTooSmall(usize),
    #[error("unsupported rtp version: {0}")]
    UnsupportedVersion(u8),
    #[error("rtp header of {0} bytes overruns packet of {1} bytes")]
    HeaderOverrun(usize, usize),
    #[error("invalid rtp padding length: {0}")]
    InvalidPadding(usize),
}

/// An RTP packet borrowing its payload from the receive buffer
#[derive(Debug, PartialEq, Clone)]
pub struct RtpPacket<'a> {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrcs: Vec<u32>,
    /// Profile id and data of the header extension, if present
    pub extension: Option<(u16, &'a [u8])>,
    pub payload: &'a [u8],
}

impl<'a> RtpPacket<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, RtpParseError> {
        if data.len() < RTP_FIXED_HEADER_SIZE {
            return Err(RtpParseError::BufferTooSmall(data.len()));
        }

        let version = data[0] >> 6;
        if version != RTP_VERSION {
            return Err(RtpParseError::UnsupportedVersion(version));
        }

        let has_padding = data[0] & 0x20 != 0;
        let has_extension = data[0] & 0x10 != 0;
        let csrc_count = (data[0] & 0x0F) as usize;
        let marker = data[1] & 0x80 != 0;
        let payload_type = data[1] & 0x7F;
        let sequence_number = BigEndian::read_u16(&data[2..4]);
        let timestamp = BigEndian::read_u32(&data[4..8]);
        let ssrc = BigEndian::read_u32(&data[8..12]);

        let mut offset = RTP_FIXED_HEADER_SIZE + csrc_count * 4;
        if data.len() < offset {
            return Err(RtpParseError::HeaderOverrun(offset, data.len()));
        }

        let csrcs = data[RTP_FIXED_HEADER_SIZE..offset]
            .chunks(4)
            .map(BigEndian::read_u32)
            .collect();

        let extension = if has_extension {
            if data.len() < offset + 4 {
                return Err(RtpParseError::HeaderOverrun(offset + 4, data.len()));
            }

            let profile = BigEndian::read_u16(&data[offset..offset + 2]);
            let words = BigEndian::read_u16(&data[offset + 2..offset + 4]) as usize;
            let start = offset + 4;
            offset = start + words * 4;

            if data.len() < offset {
                return Err(RtpParseError::HeaderOverrun(offset, data.len()));
            }

            Some((profile, &data[start..offset]))
        } else {
            None
        };

        let mut end = data.len();
        if has_padding {
            let padding = data[end - 1] as usize;

            if padding == 0 || offset + padding > end {
                return Err(RtpParseError::InvalidPadding(padding));
            }

            end -= padding;
        }

        Ok(Self {
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrcs,
            extension,
            payload: &data[offset..end],
        })
    }
}

/// Serialises a minimal RTP packet (no CSRCs, extension or padding)
pub fn build_rtp_packet(
    sequence_number: u16,
    timestamp: u32,
    ssrc: u32,
    payload_type: u8,
    marker: bool,
    payload: &[u8],
) -> Vec<u8> {
    let mut buff = Vec::with_capacity(RTP_FIXED_HEADER_SIZE + payload.len());

    buff.write_u8(RTP_VERSION << 6).unwrap();
    buff.write_u8(((marker as u8) << 7) | (payload_type & 0x7F))
        .unwrap();
    buff.write_u16::<BigEndian>(sequence_number).unwrap();
    buff.write_u32::<BigEndian>(timestamp).unwrap();
    buff.write_u32::<BigEndian>(ssrc).unwrap();
    buff.write_all(payload).unwrap();

    buff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_packet() {
        let raw = build_rtp_packet(1000, 90000, 0xDEADBEEF, 96, true, &[0x65, 1, 2]);

        let packet = RtpPacket::parse(&raw).unwrap();

        assert_eq!(packet.sequence_number, 1000);
        assert_eq!(packet.timestamp, 90000);
        assert_eq!(packet.ssrc, 0xDEADBEEF);
        assert_eq!(packet.payload_type, 96);
        assert_eq!(packet.marker, true);
        assert_eq!(packet.payload, &[0x65, 1, 2]);
    }

    #[test]
    fn test_parse_csrc_and_extension() {
        let mut raw = vec![0x80 | 0x10 | 0x02, 96, 0, 7, 0, 0, 0, 1, 0, 0, 0, 2];
        raw.extend_from_slice(&[0, 0, 0, 0xA, 0, 0, 0, 0xB]);
        raw.extend_from_slice(&[0xBE, 0xDE, 0, 1, 9, 9, 9, 9]);
        raw.extend_from_slice(&[0x41, 0xAA]);

        let packet = RtpPacket::parse(&raw).unwrap();

        assert_eq!(packet.csrcs, vec![0xA, 0xB]);
        assert_eq!(packet.extension, Some((0xBEDE, &[9u8, 9, 9, 9][..])));
        assert_eq!(packet.payload, &[0x41, 0xAA]);
    }

    #[test]
    fn test_parse_padding() {
        let mut raw = build_rtp_packet(1, 0, 0, 96, false, &[0x41, 0xAA, 0, 0, 3]);
        raw[0] |= 0x20;

        assert_eq!(RtpPacket::parse(&raw).unwrap().payload, &[0x41, 0xAA]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            RtpPacket::parse(&[0x80, 96, 0]),
            Err(RtpParseError::BufferTooSmall(3))
        );
        assert_eq!(
            RtpPacket::parse(&[0x40, 96, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
            Err(RtpParseError::UnsupportedVersion(1))
        );
        assert_eq!(
            RtpPacket::parse(&[0x83, 96, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
            Err(RtpParseError::HeaderOverrun(24, 12))
        );

        let mut padded = build_rtp_packet(1, 0, 0, 96, false, &[0x41, 9]);
        padded[0] |= 0x20;
        assert_eq!(
            RtpPacket::parse(&padded),
            Err(RtpParseError::InvalidPadding(9))
        );
    }
}
