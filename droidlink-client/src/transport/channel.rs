use super::{AckConfig, AckOutcome, AckTracker, DeviceStats, FailedCommand};
use droidlink_shared::{AckStatus, Command, Packet, PacketBuildError, PacketBuilder, SequenceNumber};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// A serialised packet ready for the wire
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Outgoing {
    pub(crate) seq: SequenceNumber,
    pub(crate) bytes: Vec<u8>,
    /// Command type of a first send awaiting an ACK
    pub(crate) ack_command: Option<u8>,
}

/// What the receive path reports after matching an ACK
#[derive(Debug, PartialEq)]
pub(crate) enum AckEvent {
    Acked(SequenceNumber, AckStatus, Duration),
    Failed(FailedCommand),
}

/// The send-side state of one device session: sequence assignment,
/// FIFO send queue, outstanding ACKs and counters. Always accessed
/// under the owning session's lock, never across blocking I/O.
#[derive(Debug)]
pub(crate) struct DeviceChannel {
    builder: PacketBuilder,
    queue: VecDeque<Outgoing>,
    acks: AckTracker,
    stats: DeviceStats,
}

impl DeviceChannel {
    pub(crate) fn new(config: AckConfig) -> Self {
        Self::with_builder(config, PacketBuilder::new())
    }

    pub(crate) fn with_builder(config: AckConfig, builder: PacketBuilder) -> Self {
        Self {
            builder,
            queue: VecDeque::new(),
            acks: AckTracker::new(config),
            stats: DeviceStats::new(),
        }
    }

    /// Assigns the next sequence number and appends the packet to the send queue
    pub(crate) fn enqueue(&mut self, command: &Command) -> Result<SequenceNumber, PacketBuildError> {
        let packet = self.builder.build(command)?;
        let seq = packet.seq();

        self.queue.push_back(Outgoing {
            seq,
            bytes: packet.to_vec(),
            ack_command: Some(command.type_id()).filter(|_| command.expects_ack()),
        });

        Ok(seq)
    }

    /// Queues a packet which is not part of the command sequence, eg an ACK
    pub(crate) fn enqueue_raw(&mut self, packet: &Packet) {
        self.queue.push_back(Outgoing {
            seq: packet.seq(),
            bytes: packet.to_vec(),
            ack_command: None,
        });
    }

    pub(crate) fn has_outgoing(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Drains the send queue followed by any resends which are due.
    /// First sends are tracked for an ACK from here, the caller writes
    /// them right away and reports a failed write with `record_send_failed`.
    pub(crate) fn take_outgoing(&mut self, now: Instant) -> (Vec<Outgoing>, Vec<FailedCommand>) {
        let mut outgoing = self.queue.drain(..).collect::<Vec<_>>();

        for packet in outgoing.iter() {
            if let Some(command) = packet.ack_command {
                self.acks.on_sent(packet.seq, command, packet.bytes.clone(), now);
            }
        }

        let swept = self.acks.sweep(now);

        outgoing.extend(swept.resend.into_iter().map(|(seq, bytes)| Outgoing {
            seq,
            bytes,
            ack_command: None,
        }));

        for _ in swept.failed.iter() {
            self.stats.record_command_failed();
        }

        (outgoing, swept.failed)
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.acks.next_deadline()
    }

    pub(crate) fn record_sent(&mut self, len: usize) {
        self.stats.record_sent(len);
        self.stats.clear_errors();
    }

    /// Stops waiting for the ACK of a first send that never reached the wire,
    /// a failed resend stays tracked and is retried
    pub(crate) fn record_send_failed(&mut self, packet: &Outgoing) {
        if packet.ack_command.is_some() {
            self.acks.forget(packet.seq);
        }
    }

    pub(crate) fn record_received(&mut self, len: usize, now: Instant) {
        self.stats.record_received(len, now);
    }

    /// Returns the number of consecutive errors including this one
    pub(crate) fn record_error(&mut self) -> u32 {
        self.stats.record_error()
    }

    pub(crate) fn handle_ack(
        &mut self,
        seq: SequenceNumber,
        status: AckStatus,
        now: Instant,
    ) -> Option<AckEvent> {
        match self.acks.on_ack(seq, status, now) {
            AckOutcome::Completed(latency) => {
                self.stats.record_ack(latency);
                Some(AckEvent::Acked(seq, status, latency))
            }
            AckOutcome::Busy => Some(AckEvent::Acked(seq, status, Duration::from_millis(0))),
            AckOutcome::Failed(failed) => {
                self.stats.record_command_failed();
                Some(AckEvent::Failed(failed))
            }
            AckOutcome::Unknown => None,
        }
    }

    pub(crate) fn pending_acks(&self) -> usize {
        self.acks.len()
    }

    pub(crate) fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    /// Drops queued packets and outstanding ACKs
    pub(crate) fn close(&mut self) {
        self.queue.clear();
        self.acks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> DeviceChannel {
        DeviceChannel::with_builder(
            AckConfig::default()
                .with_ack_timeout(Duration::from_millis(100))
                .with_max_retries(2),
            PacketBuilder::starting_at(SequenceNumber(100)),
        )
    }

    #[test]
    fn test_enqueue_assigns_fifo_sequence() {
        let mut channel = channel();
        let now = Instant::now();

        channel.enqueue(&Command::Back).unwrap();
        channel.enqueue(&Command::Home).unwrap();
        assert_eq!(channel.pending_acks(), 0);

        let (outgoing, failed) = channel.take_outgoing(now);

        assert_eq!(
            outgoing.iter().map(|o| o.seq).collect::<Vec<_>>(),
            vec![SequenceNumber(100), SequenceNumber(101)]
        );
        assert_eq!(failed, vec![]);
        assert_eq!(channel.has_outgoing(), false);
        assert_eq!(channel.pending_acks(), 2);
    }

    #[test]
    fn test_ping_not_tracked() {
        let mut channel = channel();

        channel.enqueue(&Command::Ping).unwrap();
        channel.take_outgoing(Instant::now());

        assert_eq!(channel.pending_acks(), 0);
    }

    #[test]
    fn test_take_outgoing_includes_due_resends() {
        let mut channel = channel();
        let now = Instant::now();

        channel.enqueue(&Command::Key(3)).unwrap();
        let (first, _) = channel.take_outgoing(now);

        let (resend, _) = channel.take_outgoing(now + Duration::from_millis(100));

        assert_eq!(resend.len(), 1);
        assert_eq!(resend[0].seq, first[0].seq);
        assert_eq!(resend[0].bytes, first[0].bytes);
        assert_eq!(resend[0].ack_command, None);
    }

    #[test]
    fn test_handle_ack_records_latency() {
        let mut channel = channel();
        let now = Instant::now();

        let seq = channel.enqueue(&Command::Back).unwrap();
        channel.take_outgoing(now);

        assert_eq!(
            channel.handle_ack(seq, AckStatus::Ok, now + Duration::from_millis(8)),
            Some(AckEvent::Acked(seq, AckStatus::Ok, Duration::from_millis(8)))
        );
        assert_eq!(channel.stats().ack_latency, Duration::from_millis(8));
        assert_eq!(channel.handle_ack(seq, AckStatus::Ok, now), None);
    }

    #[test]
    fn test_latency_excludes_queue_time() {
        let mut channel = channel();
        let queued_at = Instant::now();
        let sent_at = queued_at + Duration::from_millis(50);

        let seq = channel.enqueue(&Command::Back).unwrap();
        assert_eq!(channel.handle_ack(seq, AckStatus::Ok, queued_at), None);

        channel.take_outgoing(sent_at);

        assert_eq!(
            channel.handle_ack(seq, AckStatus::Ok, sent_at + Duration::from_millis(8)),
            Some(AckEvent::Acked(seq, AckStatus::Ok, Duration::from_millis(8)))
        );
    }

    #[test]
    fn test_failed_first_send_is_not_resent() {
        let mut channel = channel();
        let now = Instant::now();

        channel.enqueue(&Command::Home).unwrap();
        let (outgoing, _) = channel.take_outgoing(now);
        assert_eq!(channel.pending_acks(), 1);

        channel.record_send_failed(&outgoing[0]);
        assert_eq!(channel.pending_acks(), 0);

        let (resend, failed) = channel.take_outgoing(now + Duration::from_millis(500));
        assert_eq!(resend, vec![]);
        assert_eq!(failed, vec![]);
    }

    #[test]
    fn test_failed_resend_stays_tracked() {
        let mut channel = channel();
        let now = Instant::now();

        channel.enqueue(&Command::Home).unwrap();
        channel.take_outgoing(now);
        let (resend, _) = channel.take_outgoing(now + Duration::from_millis(100));

        channel.record_send_failed(&resend[0]);
        assert_eq!(channel.pending_acks(), 1);
    }
}
