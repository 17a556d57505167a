use super::{
    AckStatus, Command, CommandParseError, HeaderParseError, PacketHeader, SequenceNumber,
    HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{Cursor, Write};
use thiserror::Error;

#[derive(Debug, PartialEq, Clone)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Vec<u8>,
}

#[derive(Error, Debug, PartialEq)]
pub enum PacketParseError {
    #[error("failed to parse packet header: {0}")]
    Header(#[from] HeaderParseError),
    #[error("packet payload length mismatch, expected {0} != actual {1}")]
    PayloadLengthMismatch(usize, usize),
}

#[derive(Error, Debug, PartialEq)]
pub enum PacketBuildError {
    #[error("command payload of {0} bytes exceeds the limit of {1} bytes")]
    PayloadTooLarge(usize, usize),
}

/// The result of inspecting a buffer received on a channel that
/// multiplexes protocol packets with raw video bytes.
#[derive(Debug, PartialEq)]
pub enum Frame<'a> {
    /// A well-formed protocol packet
    Protocol(Packet),
    /// Bytes that do not carry the protocol header, forwarded untouched
    Opaque(&'a [u8]),
    /// Bytes that carry the protocol header but have a broken length field
    Malformed(PacketParseError),
}

impl Packet {
    pub fn parse(data: &[u8]) -> Result<Packet, PacketParseError> {
        let header = PacketHeader::parse(data)?;

        let payload_end = HEADER_SIZE + header.payload_len as usize;

        if data.len() < payload_end {
            return Err(PacketParseError::PayloadLengthMismatch(
                header.payload_len as usize,
                data.len() - HEADER_SIZE,
            ));
        }

        Ok(Packet {
            header,
            payload: data[HEADER_SIZE..payload_end].to_vec(),
        })
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let buff = Vec::with_capacity(self.len());

        let mut cursor = Cursor::new(buff);
        cursor.write_u32::<LittleEndian>(self.header.magic).unwrap();
        cursor.write_u8(self.header.version).unwrap();
        cursor.write_u8(self.header.cmd).unwrap();
        cursor.write_u32::<LittleEndian>(self.header.seq.0).unwrap();
        cursor
            .write_u32::<LittleEndian>(self.header.payload_len)
            .unwrap();
        cursor.write_all(self.payload.as_slice()).unwrap();

        cursor.into_inner()
    }

    pub fn len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    pub fn seq(&self) -> SequenceNumber {
        self.header.seq
    }

    pub fn command(&self) -> Result<Command, CommandParseError> {
        Command::deserialise(self.header.cmd, self.payload.as_slice())
    }

    /// Returns the acknowledged status if this packet is an ACK
    pub fn ack_status(&self) -> Option<AckStatus> {
        match self.command() {
            Ok(Command::Ack(status)) => Some(status),
            _ => None,
        }
    }
}

/// Decides whether a received buffer is a protocol packet or opaque payload.
/// Header magic or version mismatches mean the bytes belong to the video
/// stream sharing the channel, they are not an error.
pub fn classify(data: &[u8]) -> Frame {
    match Packet::parse(data) {
        Ok(packet) => Frame::Protocol(packet),
        Err(PacketParseError::Header(HeaderParseError::BufferTooSmall(_)))
        | Err(PacketParseError::Header(HeaderParseError::MagicMismatch(_)))
        | Err(PacketParseError::Header(HeaderParseError::VersionMismatch(_))) => {
            Frame::Opaque(data)
        }
        Err(err) => Frame::Malformed(err),
    }
}

/// Assigns strictly increasing sequence numbers to outgoing packets of one session.
#[derive(Debug)]
pub struct PacketBuilder {
    next_seq: SequenceNumber,
}

impl PacketBuilder {
    /// Starts at a random sequence number so ACKs left over from a
    /// previous session are never matched.
    pub fn new() -> Self {
        Self::starting_at(SequenceNumber(rand::random::<u32>()))
    }

    pub fn starting_at(seq: SequenceNumber) -> Self {
        Self { next_seq: seq }
    }

    /// The sequence number the next built packet will carry
    pub fn peek_seq(&self) -> SequenceNumber {
        self.next_seq
    }

    /// The sequence number of the most recently built packet
    pub fn last_issued(&self) -> SequenceNumber {
        SequenceNumber(self.next_seq.0.wrapping_sub(1))
    }

    pub fn build(&mut self, command: &Command) -> Result<Packet, PacketBuildError> {
        let payload = command.serialise();

        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(PacketBuildError::PayloadTooLarge(
                payload.len(),
                MAX_PAYLOAD_SIZE,
            ));
        }

        let seq = self.next_seq;
        self.next_seq = self.next_seq.next();

        Ok(Packet {
            header: PacketHeader::new(command.type_id(), seq, payload.len() as u32),
            payload,
        })
    }

    /// Builds an ACK echoing the sequence number of the acknowledged packet.
    /// Does not consume a sequence number.
    pub fn ack(seq: SequenceNumber, status: AckStatus) -> Packet {
        let payload = Command::Ack(status).serialise();

        Packet {
            header: PacketHeader::new(Command::Ack(status).type_id(), seq, payload.len() as u32),
            payload,
        }
    }
}
