use super::BitstreamError;

/// MSB-first reader over an RBSP with Exp-Golomb support
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Position in bits
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn bits_remaining(&self) -> usize {
        self.data.len() * 8 - self.pos
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.pos % 8 == 0
    }

    pub fn read_bit(&mut self) -> Result<u8, BitstreamError> {
        if self.pos >= self.data.len() * 8 {
            return Err(BitstreamError::EndOfData(self.pos));
        }

        let byte = self.data[self.pos / 8];
        let bit = (byte >> (7 - (self.pos % 8))) & 1;
        self.pos += 1;

        Ok(bit)
    }

    pub fn read_flag(&mut self) -> Result<bool, BitstreamError> {
        Ok(self.read_bit()? == 1)
    }

    /// Reads up to 32 bits as an unsigned integer
    pub fn read_bits(&mut self, count: u8) -> Result<u32, BitstreamError> {
        assert!(count <= 32);

        if self.bits_remaining() < count as usize {
            return Err(BitstreamError::EndOfData(self.pos));
        }

        let mut value = 0u32;
        for _ in 0..count {
            value = (value << 1) | self.read_bit()? as u32;
        }

        Ok(value)
    }

    pub fn skip_bits(&mut self, count: usize) -> Result<(), BitstreamError> {
        if self.bits_remaining() < count {
            return Err(BitstreamError::EndOfData(self.pos));
        }

        self.pos += count;
        Ok(())
    }

    /// ue(v)
    pub fn read_ue(&mut self) -> Result<u32, BitstreamError> {
        let mut leading_zeros = 0u8;

        while self.read_bit()? == 0 {
            leading_zeros += 1;

            if leading_zeros > 31 {
                return Err(BitstreamError::ExpGolombOverflow(self.pos));
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        let suffix = self.read_bits(leading_zeros)? as u64;
        let value = (1u64 << leading_zeros) - 1 + suffix;

        if value > u32::MAX as u64 {
            return Err(BitstreamError::ExpGolombOverflow(self.pos));
        }

        Ok(value as u32)
    }

    /// se(v)
    pub fn read_se(&mut self) -> Result<i32, BitstreamError> {
        let code = self.read_ue()? as i64;

        let value = if code % 2 == 1 {
            (code + 1) / 2
        } else {
            -(code / 2)
        };

        Ok(value as i32)
    }

    /// ue(v) constrained to `0..=max`
    pub fn read_ue_max(&mut self, field: &'static str, max: u32) -> Result<u32, BitstreamError> {
        let value = self.read_ue()?;

        if value > max {
            return Err(BitstreamError::InvalidValue(field, value as i64));
        }

        Ok(value)
    }

    /// Whether anything other than the rbsp trailing bits remains
    pub fn more_rbsp_data(&self) -> bool {
        let last_set = match self.data.iter().rposition(|&b| b != 0) {
            Some(index) => index * 8 + 7 - self.data[index].trailing_zeros() as usize,
            None => return false,
        };

        self.pos < last_set
    }
}
