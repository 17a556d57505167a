use thiserror::Error;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum BitstreamError {
    #[error("unexpected end of data at bit {0}")]
    EndOfData(usize),
    #[error("exp-golomb code too long at bit {0}")]
    ExpGolombOverflow(usize),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, i64),
    #[error("unsupported bitstream feature: {0}")]
    Unsupported(&'static str),
    #[error("nal unit is not a {0}")]
    UnexpectedNalType(&'static str),
    #[error("unknown pps id: {0}")]
    MissingPps(u32),
    #[error("unknown sps id: {0}")]
    MissingSps(u32),
}
