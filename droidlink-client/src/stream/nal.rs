use std::fmt;

pub const ANNEXB_START_CODE: [u8; 4] = [0, 0, 0, 1];

/// H.264 NAL unit types (Table 7-1) plus the RTP payload structures
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum NalType {
    Slice,
    SliceDataA,
    SliceDataB,
    SliceDataC,
    Idr,
    Sei,
    Sps,
    Pps,
    AccessUnitDelimiter,
    EndOfSequence,
    EndOfStream,
    Filler,
    StapA,
    FuA,
    Other(u8),
}

impl NalType {
    pub fn from_header(header: u8) -> Self {
        match header & 0x1F {
            1 => Self::Slice,
            2 => Self::SliceDataA,
            3 => Self::SliceDataB,
            4 => Self::SliceDataC,
            5 => Self::Idr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::AccessUnitDelimiter,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::Filler,
            24 => Self::StapA,
            28 => Self::FuA,
            other => Self::Other(other),
        }
    }

    pub fn id(self) -> u8 {
        match self {
            Self::Slice => 1,
            Self::SliceDataA => 2,
            Self::SliceDataB => 3,
            Self::SliceDataC => 4,
            Self::Idr => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::AccessUnitDelimiter => 9,
            Self::EndOfSequence => 10,
            Self::EndOfStream => 11,
            Self::Filler => 12,
            Self::StapA => 24,
            Self::FuA => 28,
            Self::Other(id) => id,
        }
    }

    /// Slices carrying picture data
    pub fn is_vcl(self) -> bool {
        match self {
            Self::Slice | Self::SliceDataA | Self::SliceDataB | Self::SliceDataC | Self::Idr => {
                true
            }
            _ => false,
        }
    }

    pub fn is_parameter_set(self) -> bool {
        self == Self::Sps || self == Self::Pps
    }
}

/// One NAL unit as it appears in the elementary stream, header byte
/// included and emulation prevention bytes still in place.
#[derive(PartialEq, Clone)]
pub struct NalUnit {
    data: Vec<u8>,
}

impl NalUnit {
    /// Returns `None` for an empty buffer
    pub fn new(data: Vec<u8>) -> Option<Self> {
        if data.is_empty() {
            return None;
        }

        Some(Self { data })
    }

    pub fn from_slice(data: &[u8]) -> Option<Self> {
        Self::new(data.to_vec())
    }

    pub fn header(&self) -> u8 {
        self.data[0]
    }

    pub fn nal_type(&self) -> NalType {
        NalType::from_header(self.header())
    }

    pub fn nal_ref_idc(&self) -> u8 {
        (self.header() >> 5) & 0x03
    }

    pub fn forbidden_bit(&self) -> bool {
        self.header() & 0x80 != 0
    }

    pub fn is_idr(&self) -> bool {
        self.nal_type() == NalType::Idr
    }

    pub fn is_reference(&self) -> bool {
        self.nal_ref_idc() != 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// The payload after the header with emulation prevention bytes removed
    pub fn rbsp(&self) -> Vec<u8> {
        strip_emulation_prevention(&self.data[1..])
    }

    /// Appends the NAL with a four byte start code
    pub fn write_annexb(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&ANNEXB_START_CODE);
        out.extend_from_slice(&self.data[..]);
    }
}

impl fmt::Debug for NalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NalUnit")
            .field("type", &self.nal_type())
            .field("ref_idc", &self.nal_ref_idc())
            .field("len", &self.data.len())
            .finish()
    }
}

/// Removes the 0x03 byte of every `00 00 03` sequence
pub fn strip_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0;

    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }

        if byte == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }

        out.push(byte);
    }

    out
}

/// Inserts emulation prevention bytes so the payload contains no start code
pub fn add_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 64);
    let mut zeros = 0;

    for &byte in data {
        if zeros >= 2 && byte <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }

        if byte == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }

        out.push(byte);
    }

    out
}

/// Concatenates the NAL units into one Annex-B buffer
pub fn to_annexb<'a>(nals: impl IntoIterator<Item = &'a NalUnit>) -> Vec<u8> {
    let mut out = vec![];

    for nal in nals {
        nal.write_annexb(&mut out);
    }

    out
}
