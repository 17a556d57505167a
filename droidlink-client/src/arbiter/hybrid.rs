use super::ArbiterConfig;
use crate::transport::SourceSample;
use log::*;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::time::Instant;

/// Which transport's video is surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoSource {
    Usb,
    Wifi,
}

impl Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usb => write!(f, "usb"),
            Self::Wifi => write!(f, "wifi"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSwitch {
    pub from: VideoSource,
    pub to: VideoSource,
    pub reason: String,
}

/// The arbiter's rolling view of both sources
#[derive(Debug, Clone, PartialEq)]
pub struct BandwidthState {
    pub usb: Option<SourceSample>,
    pub wifi: Option<SourceSample>,
    /// Consecutive congested USB samples while on USB
    pub congestion: u32,
    /// Consecutive healthy USB samples while on WiFi
    pub recovery: u32,
    pub last_switch: Option<Instant>,
    pub switches: u64,
    /// Switches which were due but fell within the cooldown
    pub suppressed: u64,
}

impl BandwidthState {
    fn new() -> Self {
        Self {
            usb: None,
            wifi: None,
            congestion: 0,
            recovery: 0,
            last_switch: None,
            switches: 0,
            suppressed: 0,
        }
    }
}

/// Picks the surfaced video source from the USB and WiFi counters with
/// hysteresis and a cooldown between switches
#[derive(Debug)]
pub struct HybridArbiter {
    config: ArbiterConfig,
    active: VideoSource,
    state: BandwidthState,
}

impl HybridArbiter {
    /// Starts on USB
    pub fn new(config: ArbiterConfig) -> Self {
        Self {
            config,
            active: VideoSource::Usb,
            state: BandwidthState::new(),
        }
    }

    pub fn active(&self) -> VideoSource {
        self.active
    }

    pub fn state(&self) -> &BandwidthState {
        &self.state
    }

    /// Returns why the sample counts as congested, `None` if healthy
    pub fn congestion_reason(&self, sample: &SourceSample) -> Option<String> {
        match sample.latency {
            None => return Some("no packets received".to_owned()),
            Some(latency) if latency > self.config.max_latency() => {
                return Some(format!("no packet for {}ms", latency.as_millis()))
            }
            _ => {}
        }

        if sample.packet_rate < self.config.min_packet_rate() {
            return Some(format!("packet rate {:.1}/s", sample.packet_rate));
        }

        if sample.errors > self.config.max_errors() {
            return Some(format!("{} errors", sample.errors));
        }

        None
    }

    /// Feeds one sample of both sources. Returns the switch if one happened,
    /// the caller notifies listeners outside of any lock.
    pub fn tick(
        &mut self,
        usb: SourceSample,
        wifi: SourceSample,
        now: Instant,
    ) -> Option<SourceSwitch> {
        let usb_problem = self.congestion_reason(&usb);
        let wifi_problem = self.congestion_reason(&wifi);
        self.state.usb = Some(usb);
        self.state.wifi = Some(wifi);

        let (to, reason) = match self.active {
            VideoSource::Usb => {
                self.state.recovery = 0;

                let problem = match usb_problem {
                    Some(problem) => problem,
                    None => {
                        self.state.congestion = 0;
                        return None;
                    }
                };

                self.state.congestion = self.state.congestion.saturating_add(1);
                if self.state.congestion < self.config.congestion_samples() {
                    return None;
                }

                // Moving to a source which is itself silent shows nothing
                if let Some(wifi_problem) = wifi_problem {
                    trace!("usb congested ({}) but wifi unusable ({})", problem, wifi_problem);
                    return None;
                }

                (
                    VideoSource::Wifi,
                    format!(
                        "usb congested for {} samples: {}",
                        self.state.congestion, problem
                    ),
                )
            }
            VideoSource::Wifi => {
                self.state.congestion = 0;

                if usb_problem.is_some() {
                    self.state.recovery = 0;
                    return None;
                }

                self.state.recovery = self.state.recovery.saturating_add(1);
                if self.state.recovery < self.config.recovery_samples() {
                    return None;
                }

                (
                    VideoSource::Usb,
                    format!("usb healthy for {} samples", self.state.recovery),
                )
            }
        };

        if let Some(last_switch) = self.state.last_switch {
            if now.saturating_duration_since(last_switch) < self.config.cooldown() {
                trace!("switch to {} suppressed by cooldown", to);
                self.state.suppressed += 1;
                return None;
            }
        }

        let switch = SourceSwitch {
            from: self.active,
            to,
            reason,
        };

        info!("switching video source {} -> {}: {}", switch.from, switch.to, switch.reason);

        self.active = to;
        self.state.congestion = 0;
        self.state.recovery = 0;
        self.state.last_switch = Some(now);
        self.state.switches += 1;

        Some(switch)
    }

    /// Forgets all counters and returns to USB, used when the transports restart
    pub fn reset(&mut self) {
        self.active = VideoSource::Usb;
        self.state = BandwidthState::new();
    }
}
