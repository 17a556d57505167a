use super::AckConfig;
use droidlink_shared::{AckStatus, SequenceNumber};
use log::*;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A command awaiting acknowledgement from the device
#[derive(Debug, Clone)]
pub struct PendingAck {
    pub seq: SequenceNumber,
    pub command: u8,
    /// The serialised packet, resent as-is
    pub packet: Vec<u8>,
    /// Time of the latest transmission
    pub sent_at: Instant,
    pub retries: u32,
    busy_retries: u32,
    resend_at: Instant,
    busy: bool,
}

#[derive(Debug, PartialEq, Clone)]
pub enum AckOutcome {
    Completed(Duration),
    /// The device asked us to try again, a fast resend is scheduled
    Busy,
    Failed(FailedCommand),
    /// No outstanding command carries this sequence number
    Unknown,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FailedCommand {
    pub seq: SequenceNumber,
    pub command: u8,
    pub reason: FailReason,
}

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum FailReason {
    NoAck(u32),
    BusyExhausted(u32),
    Rejected(u8),
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct SweepResult {
    pub resend: Vec<(SequenceNumber, Vec<u8>)>,
    pub failed: Vec<FailedCommand>,
}

/// Tracks commands sent on one device session until their ACK arrives
/// or the retry budget is exhausted.
#[derive(Debug)]
pub struct AckTracker {
    config: AckConfig,
    pending: HashMap<SequenceNumber, PendingAck>,
}

impl AckTracker {
    pub fn new(config: AckConfig) -> Self {
        Self {
            config,
            pending: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn get(&self, seq: SequenceNumber) -> Option<&PendingAck> {
        self.pending.get(&seq)
    }

    pub fn on_sent(&mut self, seq: SequenceNumber, command: u8, packet: Vec<u8>, now: Instant) {
        self.pending.insert(
            seq,
            PendingAck {
                seq,
                command,
                packet,
                sent_at: now,
                retries: 0,
                busy_retries: 0,
                resend_at: now + self.config.ack_timeout(),
                busy: false,
            },
        );
    }

    pub fn on_ack(&mut self, seq: SequenceNumber, status: AckStatus, now: Instant) -> AckOutcome {
        let pending = match self.pending.get_mut(&seq) {
            Some(pending) => pending,
            None => {
                debug!("received ack for unknown {}", seq);
                return AckOutcome::Unknown;
            }
        };

        match status {
            AckStatus::Ok => {
                let latency = now.saturating_duration_since(pending.sent_at);
                self.pending.remove(&seq);
                AckOutcome::Completed(latency)
            }
            AckStatus::Busy if pending.busy_retries < self.config.max_busy_retries() => {
                pending.busy_retries += 1;
                pending.busy = true;
                pending.resend_at = now + self.config.busy_retry_interval();
                trace!("{} busy, resending in {:?}", seq, self.config.busy_retry_interval());
                AckOutcome::Busy
            }
            AckStatus::Busy => {
                let busy_retries = pending.busy_retries;
                let command = pending.command;
                self.pending.remove(&seq);
                warn!("{} still busy after {} resends", seq, busy_retries);
                AckOutcome::Failed(FailedCommand {
                    seq,
                    command,
                    reason: FailReason::BusyExhausted(busy_retries),
                })
            }
            AckStatus::Error(code) => {
                let command = pending.command;
                self.pending.remove(&seq);
                warn!("{} rejected by device with status {}", seq, code);
                AckOutcome::Failed(FailedCommand {
                    seq,
                    command,
                    reason: FailReason::Rejected(code),
                })
            }
        }
    }

    /// Collects commands whose resend time has passed. Busy resends do not
    /// consume the retry budget, timeouts do. A command is resent exactly
    /// `max_retries` times before it is reported as failed.
    pub fn sweep(&mut self, now: Instant) -> SweepResult {
        let mut result = SweepResult::default();
        let ack_timeout = self.config.ack_timeout();
        let max_retries = self.config.max_retries();

        let mut due = self
            .pending
            .values()
            .filter(|p| p.resend_at <= now)
            .map(|p| p.seq)
            .collect::<Vec<_>>();
        due.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        for seq in due {
            let pending = match self.pending.get_mut(&seq) {
                Some(pending) => pending,
                None => continue,
            };

            if pending.busy {
                pending.busy = false;
            } else if pending.retries < max_retries {
                pending.retries += 1;
                debug!("resending {} (retry {}/{})", seq, pending.retries, max_retries);
            } else {
                let command = pending.command;
                let retries = pending.retries;
                self.pending.remove(&seq);
                warn!("no ack for {} after {} retries", seq, retries);
                result.failed.push(FailedCommand {
                    seq,
                    command,
                    reason: FailReason::NoAck(retries),
                });
                continue;
            }

            pending.sent_at = now;
            pending.resend_at = now + ack_timeout;
            result.resend.push((seq, pending.packet.clone()));
        }

        result
    }

    /// The earliest instant at which `sweep` has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.resend_at).min()
    }

    /// Stops tracking a command without reporting it
    pub fn forget(&mut self, seq: SequenceNumber) -> bool {
        self.pending.remove(&seq).is_some()
    }

    /// Drops all outstanding commands, returning them as failed
    pub fn clear(&mut self) -> Vec<SequenceNumber> {
        self.pending.drain().map(|(seq, _)| seq).collect()
    }
}
