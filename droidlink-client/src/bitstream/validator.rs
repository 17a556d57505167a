use super::{peek_pps_id, Pps, Sps, ValidatorConfig};
use crate::stream::{to_annexb, NalType, NalUnit};
use log::*;
use std::collections::HashMap;

/// Last known good SPS or PPS
#[derive(Debug, Clone, PartialEq)]
pub struct CachedParameterSet {
    pub nal: NalUnit,
    /// The SPS id, for a PPS the id of the SPS it refers to
    pub sps_id: u32,
    /// Cropped picture size, SPS only
    pub dimensions: Option<(u32, u32)>,
}

/// One picture ready for the decoder with the parameter sets it needs
#[derive(Debug, Clone, PartialEq)]
pub struct AccessUnit {
    pub nals: Vec<NalUnit>,
    pub is_idr: bool,
    /// Whether cached parameter sets were inserted ahead of the IDR
    pub synthesized: bool,
}

impl AccessUnit {
    pub fn to_annexb(&self) -> Vec<u8> {
        to_annexb(self.nals.iter())
    }

    /// The slice NAL, always last
    pub fn slice(&self) -> &NalUnit {
        &self.nals[self.nals.len() - 1]
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValidatorStats {
    pub sps_accepted: u64,
    pub sps_rejected: u64,
    pub pps_cached: u64,
    pub pps_invalid: u64,
    pub dropped_ungated: u64,
    pub dropped_undecodable: u64,
    pub dropped_unsupported: u64,
    pub idr_synthesized: u64,
    pub ignored: u64,
}

/// Gates the NAL stream on a sane SPS and groups NALs into access units
#[derive(Debug)]
pub struct BitstreamValidator {
    config: ValidatorConfig,
    sps: HashMap<u32, CachedParameterSet>,
    pps: HashMap<u32, CachedParameterSet>,
    /// Parameter sets received since the last picture, the latest per type and id
    pending: Vec<(NalType, u32, NalUnit)>,
    gate_open: bool,
    dimensions: Option<(u32, u32)>,
    stats: ValidatorStats,
}

impl BitstreamValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            sps: HashMap::new(),
            pps: HashMap::new(),
            pending: vec![],
            gate_open: false,
            dimensions: None,
            stats: ValidatorStats::default(),
        }
    }

    pub fn stats(&self) -> &ValidatorStats {
        &self.stats
    }

    /// Whether a valid SPS has been seen since the last rejected one
    pub fn is_gate_open(&self) -> bool {
        self.gate_open
    }

    pub fn cached_sps(&self, id: u32) -> Option<&CachedParameterSet> {
        self.sps.get(&id)
    }

    pub fn cached_pps(&self, id: u32) -> Option<&CachedParameterSet> {
        self.pps.get(&id)
    }

    /// Dimensions of the most recently accepted SPS
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    pub fn process(&mut self, nal: NalUnit) -> Option<AccessUnit> {
        match nal.nal_type() {
            NalType::Sps => {
                self.on_sps(nal);
                None
            }
            NalType::Pps => {
                self.on_pps(nal);
                None
            }
            NalType::Slice | NalType::Idr => self.on_slice(nal),
            NalType::SliceDataA | NalType::SliceDataB | NalType::SliceDataC => {
                self.stats.dropped_unsupported += 1;
                None
            }
            _ => {
                self.stats.ignored += 1;
                None
            }
        }
    }

    /// Forgets cached parameter sets, the gate closes until the next valid SPS
    pub fn reset(&mut self) {
        self.sps.clear();
        self.pps.clear();
        self.pending.clear();
        self.gate_open = false;
        self.dimensions = None;
    }

    fn on_sps(&mut self, nal: NalUnit) {
        let sps = match Sps::from_nal(&nal) {
            Ok(sps) => sps,
            Err(err) => {
                warn!("rejecting unparsable sps: {}", err);
                self.reject_sps(None);
                return;
            }
        };

        let (width, height) = (sps.width(), sps.height());
        if !self.config.accepts(width, height) {
            warn!("rejecting sps {} with size {}x{}", sps.id, width, height);
            self.reject_sps(Some(sps.id));
            return;
        }

        if !self.gate_open {
            info!("accepted sps {} with size {}x{}", sps.id, width, height);
        }

        self.stats.sps_accepted += 1;
        self.gate_open = true;
        self.dimensions = Some((width, height));
        self.sps.insert(
            sps.id,
            CachedParameterSet {
                nal: nal.clone(),
                sps_id: sps.id,
                dimensions: Some((width, height)),
            },
        );
        self.push_pending(sps.id, nal);
    }

    fn reject_sps(&mut self, id: Option<u32>) {
        self.stats.sps_rejected += 1;
        self.gate_open = false;

        if let Some(id) = id {
            self.sps.remove(&id);
        }

        self.pending.retain(|(kind, _, _)| *kind != NalType::Sps);
    }

    fn push_pending(&mut self, id: u32, nal: NalUnit) {
        let kind = nal.nal_type();

        self.pending
            .retain(|(pending_kind, pending_id, _)| *pending_kind != kind || *pending_id != id);
        self.pending.push((kind, id, nal));
    }

    fn on_pps(&mut self, nal: NalUnit) {
        let pps = match Pps::from_nal(&nal) {
            Ok(pps) => pps,
            Err(err) => {
                debug!("dropping unparsable pps: {}", err);
                self.stats.pps_invalid += 1;
                return;
            }
        };

        self.stats.pps_cached += 1;
        self.pps.insert(
            pps.id,
            CachedParameterSet {
                nal: nal.clone(),
                sps_id: pps.sps_id,
                dimensions: None,
            },
        );
        self.push_pending(pps.id, nal);
    }

    fn on_slice(&mut self, nal: NalUnit) -> Option<AccessUnit> {
        if !self.gate_open {
            self.stats.dropped_ungated += 1;
            return None;
        }

        let pps_id = match peek_pps_id(&nal) {
            Ok(id) => id,
            Err(err) => {
                debug!("dropping slice with unreadable header: {}", err);
                self.stats.dropped_undecodable += 1;
                return None;
            }
        };

        let (sps, pps) = match self.pps.get(&pps_id) {
            Some(pps) => match self.sps.get(&pps.sps_id) {
                Some(sps) => (sps, pps),
                None => {
                    debug!("pps {} refers to unknown sps {}", pps_id, pps.sps_id);
                    self.stats.dropped_undecodable += 1;
                    return None;
                }
            },
            None => {
                debug!("slice refers to unknown pps {}", pps_id);
                self.stats.dropped_undecodable += 1;
                return None;
            }
        };

        let pending = std::mem::replace(&mut self.pending, vec![])
            .into_iter()
            .map(|(_, _, nal)| nal)
            .collect::<Vec<_>>();
        let is_idr = nal.is_idr();
        let mut synthesized = false;

        let nals = if is_idr {
            let has_sps = pending.iter().any(|n| n == &sps.nal);
            let has_pps = pending.iter().any(|n| n == &pps.nal);

            if !has_sps || !has_pps {
                trace!("prepending cached parameter sets to idr");
                synthesized = true;
                self.stats.idr_synthesized += 1;
            }

            let mut nals = pending
                .into_iter()
                .filter(|n| n != &sps.nal && n != &pps.nal)
                .collect::<Vec<_>>();
            nals.push(sps.nal.clone());
            nals.push(pps.nal.clone());
            nals.push(nal);
            nals
        } else {
            let mut nals = pending;
            nals.push(nal);
            nals
        };

        Some(AccessUnit {
            nals,
            is_idr,
            synthesized,
        })
    }
}
