use super::{BitstreamError, Pps, Sps};
use std::collections::HashMap;

/// SPS and PPS tables indexed by id
#[derive(Debug, Default, Clone)]
pub struct ParameterSets {
    sps: HashMap<u32, Sps>,
    pps: HashMap<u32, Pps>,
}

impl ParameterSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the table changed
    pub fn insert_sps(&mut self, sps: Sps) -> bool {
        if self.sps.get(&sps.id) == Some(&sps) {
            return false;
        }

        self.sps.insert(sps.id, sps);
        true
    }

    /// Returns true if the table changed
    pub fn insert_pps(&mut self, pps: Pps) -> bool {
        if self.pps.get(&pps.id) == Some(&pps) {
            return false;
        }

        self.pps.insert(pps.id, pps);
        true
    }

    pub fn sps(&self, id: u32) -> Option<&Sps> {
        self.sps.get(&id)
    }

    pub fn pps(&self, id: u32) -> Option<&Pps> {
        self.pps.get(&id)
    }

    /// Resolves the PPS and the SPS it refers to
    pub fn active(&self, pps_id: u32) -> Result<(&Sps, &Pps), BitstreamError> {
        let pps = self.pps(pps_id).ok_or(BitstreamError::MissingPps(pps_id))?;
        let sps = self.sps(pps.sps_id).ok_or(BitstreamError::MissingSps(pps.sps_id))?;

        Ok((sps, pps))
    }

    pub fn is_empty(&self) -> bool {
        self.sps.is_empty() && self.pps.is_empty()
    }

    pub fn clear(&mut self) {
        self.sps.clear();
        self.pps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{TestPps, TestSps};
    use super::*;

    #[test]
    fn test_active_requires_both_sets() {
        let mut sets = ParameterSets::new();

        assert_eq!(sets.active(0).err(), Some(BitstreamError::MissingPps(0)));

        sets.insert_pps(Pps::from_nal(&TestPps::new(0, 2).build()).unwrap());
        assert_eq!(sets.active(0).err(), Some(BitstreamError::MissingSps(2)));

        sets.insert_sps(Sps::from_nal(&TestSps::new(640, 480).with_id(2).build()).unwrap());
        assert_eq!(sets.active(0).is_ok(), true);
    }

    #[test]
    fn test_insert_reports_changes() {
        let mut sets = ParameterSets::new();
        let sps = Sps::from_nal(&TestSps::new(640, 480).build()).unwrap();

        assert_eq!(sets.insert_sps(sps.clone()), true);
        assert_eq!(sets.insert_sps(sps), false);
        assert_eq!(
            sets.insert_sps(Sps::from_nal(&TestSps::new(1280, 720).build()).unwrap()),
            true
        );
    }
}
