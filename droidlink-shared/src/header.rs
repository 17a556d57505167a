use super::SequenceNumber;
use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Reads as "DLNK" on the wire
pub const PROTOCOL_MAGIC: u32 = 0x4B4E_4C44;
pub const PROTOCOL_VERSION: u8 = 1;

/// Total packed size of the packet header in bytes
pub const HEADER_SIZE: usize = 4 + 1 + 1 + 4 + 4;

/// Largest payload a well-formed packet may declare
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Fixed little-endian header shared by every command, video-control and ack packet:
/// `magic(4) | version(1) | cmd(1) | seq(4) | payload_len(4)`
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct PacketHeader {
    pub magic: u32,
    pub version: u8,
    pub cmd: u8,
    pub seq: SequenceNumber,
    pub payload_len: u32,
}

#[derive(Error, Debug, PartialEq)]
pub enum HeaderParseError {
    #[error("received header is too small: {0}")]
    BufferTooSmall(usize),
    #[error("header magic mismatch: {0:#010x}")]
    MagicMismatch(u32),
    #[error("unsupported protocol version: {0}")]
    VersionMismatch(u8),
    #[error("declared payload length {0} exceeds the limit of {1} bytes")]
    PayloadTooLarge(u32, usize),
}

impl PacketHeader {
    pub fn new(cmd: u8, seq: SequenceNumber, payload_len: u32) -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            cmd,
            seq,
            payload_len,
        }
    }

    pub fn parse(data: &[u8]) -> Result<PacketHeader, HeaderParseError> {
        if data.len() < HEADER_SIZE {
            return Err(HeaderParseError::BufferTooSmall(data.len()));
        }

        let magic = LittleEndian::read_u32(&data[0..4]);
        if magic != PROTOCOL_MAGIC {
            return Err(HeaderParseError::MagicMismatch(magic));
        }

        let version = data[4];
        if version != PROTOCOL_VERSION {
            return Err(HeaderParseError::VersionMismatch(version));
        }

        let cmd = data[5];
        let seq = SequenceNumber(LittleEndian::read_u32(&data[6..10]));
        let payload_len = LittleEndian::read_u32(&data[10..14]);

        if payload_len as usize > MAX_PAYLOAD_SIZE {
            return Err(HeaderParseError::PayloadTooLarge(
                payload_len,
                MAX_PAYLOAD_SIZE,
            ));
        }

        Ok(PacketHeader {
            magic,
            version,
            cmd,
            seq,
            payload_len,
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buff = [0u8; HEADER_SIZE];

        LittleEndian::write_u32(&mut buff[0..4], self.magic);
        buff[4] = self.version;
        buff[5] = self.cmd;
        LittleEndian::write_u32(&mut buff[6..10], self.seq.0);
        LittleEndian::write_u32(&mut buff[10..14], self.payload_len);

        buff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        let raw_data = [
            0x44, 0x4C, 0x4E, 0x4B, 1, 0x01, 0x0A, 0, 0, 0, 0x04, 0, 0, 0,
        ];

        let header = PacketHeader::parse(&raw_data).unwrap();

        assert_eq!(header.magic, PROTOCOL_MAGIC);
        assert_eq!(header.version, 1);
        assert_eq!(header.cmd, 0x01);
        assert_eq!(header.seq, SequenceNumber(10));
        assert_eq!(header.payload_len, 4);
    }

    #[test]
    fn test_parse_header_too_short() {
        assert_eq!(
            PacketHeader::parse(&[0x44, 0x4C, 0x4E]),
            Err(HeaderParseError::BufferTooSmall(3))
        );
    }

    #[test]
    fn test_parse_header_magic_mismatch() {
        // An Annex-B start code followed by an SPS
        let raw_data = [0, 0, 0, 1, 0x67, 0x42, 0, 0x1f, 0, 0, 0, 0, 0, 0];

        assert_eq!(
            PacketHeader::parse(&raw_data),
            Err(HeaderParseError::MagicMismatch(0x0100_0000))
        );
    }

    #[test]
    fn test_parse_header_version_mismatch() {
        let mut raw_data = PacketHeader::new(0x01, SequenceNumber(1), 0).to_bytes();
        raw_data[4] = 9;

        assert_eq!(
            PacketHeader::parse(&raw_data),
            Err(HeaderParseError::VersionMismatch(9))
        );
    }

    #[test]
    fn test_parse_header_payload_too_large() {
        let raw_data = PacketHeader::new(0x06, SequenceNumber(1), u32::MAX).to_bytes();

        assert_eq!(
            PacketHeader::parse(&raw_data),
            Err(HeaderParseError::PayloadTooLarge(u32::MAX, MAX_PAYLOAD_SIZE))
        );
    }

    #[test]
    fn test_header_to_bytes() {
        let header = PacketHeader::new(0x80, SequenceNumber(0x0102_0304), 1);

        assert_eq!(
            header.to_bytes(),
            [0x44, 0x4C, 0x4E, 0x4B, 1, 0x80, 4, 3, 2, 1, 1, 0, 0, 0]
        );
    }
}
