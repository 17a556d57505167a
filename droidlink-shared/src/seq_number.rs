use std::fmt::Display;
use std::{cmp, ops};

/// Represents a wrapping u32 used for tracking the order of packets
/// sent within one device session.
#[derive(Debug, PartialEq, Copy, Clone, Hash, Eq)]
pub struct SequenceNumber(pub u32);

impl SequenceNumber {
    pub fn next(self) -> Self {
        self + SequenceNumber(1)
    }

    /// The number of steps required to advance from `other` to `self`
    pub fn distance_from(self, other: Self) -> u32 {
        self.0.wrapping_sub(other.0)
    }
}

/// Sequence numbers will wrap after exceeding 32-bit space
impl ops::Add<SequenceNumber> for SequenceNumber {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }
}

/// We implement comparisons of sequence numbers based on the following logic
/// For two sequence numbers A and B, A is greater than B if their difference > 0 and < 2^31
/// A is less than B if their difference is > -2^31 and < 0
///
/// This does not support sorting of sequence numbers, it determines
/// if one sequence number is more "advanced" than another while considering the potential to wrap.
/// Hence the following cases:
///  - Seq(2) > Seq(1)
///  - Seq(0) > Seq(u32::MAX)
impl cmp::PartialOrd for SequenceNumber {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        if self.0 == other.0 {
            return Some(cmp::Ordering::Equal);
        }

        if self.0 > other.0 {
            if self.0 - other.0 < u32::MAX / 2 {
                Some(cmp::Ordering::Greater)
            } else {
                Some(cmp::Ordering::Less)
            }
        } else if other.0 - self.0 < u32::MAX / 2 {
            Some(cmp::Ordering::Less)
        } else {
            Some(cmp::Ordering::Greater)
        }
    }
}

impl Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}
