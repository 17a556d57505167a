use super::{
    join_with_timeout, AckEvent, DeviceChannel, DeviceId, DeviceStats, SourceMonitor,
    TransportEvents, UdpSessionConfig,
};
use anyhow::{Error, Result};
use droidlink_shared::{classify, Command, Frame, SequenceNumber};
use log::*;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const IDLE_WAIT: u64 = 100; // ms
const ERROR_BACKOFF: u64 = 10; // ms

/// Command/ACK session with one device over UDP. Datagrams that do not
/// carry the protocol header are RTP video and go to the video callback.
pub struct UdpCommandSession {
    device: DeviceId,
    config: UdpSessionConfig,
    shared: Arc<Shared>,
    monitor: SourceMonitor,
    threads: Vec<JoinHandle<()>>,
}

struct Shared {
    running: AtomicBool,
    channel: Mutex<DeviceChannel>,
    wake: Condvar,
}

impl UdpCommandSession {
    /// Binds a local socket and starts exchanging packets with `peer`
    pub fn connect(
        device: DeviceId,
        local: SocketAddr,
        peer: SocketAddr,
        config: UdpSessionConfig,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(local)?;
        socket.connect(peer)?;

        Self::start(device, socket, config, events)
    }

    /// Starts the session over an already connected socket
    pub fn start(
        device: DeviceId,
        socket: UdpSocket,
        config: UdpSessionConfig,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Self> {
        socket.set_read_timeout(Some(config.recv_timeout()))?;
        let socket = Arc::new(socket);

        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            channel: Mutex::new(DeviceChannel::new(config.ack().clone())),
            wake: Condvar::new(),
        });

        let mut session = Self {
            device: device.clone(),
            config: config.clone(),
            shared: Arc::clone(&shared),
            monitor: SourceMonitor::new(),
            threads: vec![],
        };

        let send_thread = {
            let (device, socket, shared, events) = (
                device.clone(),
                Arc::clone(&socket),
                Arc::clone(&shared),
                Arc::clone(&events),
            );

            thread::Builder::new()
                .name(format!("udp-send-{}", device))
                .spawn(move || send_loop(device, socket, shared, events))
        };

        match send_thread {
            Ok(handle) => session.threads.push(handle),
            Err(err) => {
                session.stop();
                return Err(Error::msg(format!("failed to spawn send thread: {}", err)));
            }
        }

        let recv_thread = {
            let monitor = session.monitor.clone();
            let recv_buffer_size = config.recv_buffer_size();

            thread::Builder::new()
                .name(format!("udp-recv-{}", device))
                .spawn(move || {
                    recv_loop(device, socket, shared, events, monitor, recv_buffer_size)
                })
        };

        match recv_thread {
            Ok(handle) => session.threads.push(handle),
            Err(err) => {
                session.stop();
                return Err(Error::msg(format!("failed to spawn recv thread: {}", err)));
            }
        }

        info!("udp session started for {}", session.device);

        Ok(session)
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Builds the command with the next sequence number and queues it for sending
    pub fn send_command(&self, command: &Command) -> Result<SequenceNumber> {
        if !self.is_running() {
            return Err(Error::msg("session is stopped"));
        }

        let seq = {
            let mut channel = self.shared.channel.lock().unwrap();
            channel.enqueue(command)?
        };

        self.shared.wake.notify_all();

        Ok(seq)
    }

    pub fn stats(&self) -> DeviceStats {
        self.shared.channel.lock().unwrap().stats().clone()
    }

    pub fn pending_acks(&self) -> usize {
        self.shared.channel.lock().unwrap().pending_acks()
    }

    pub fn monitor(&self) -> SourceMonitor {
        self.monitor.clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Stops both threads. The receive loop notices within one read timeout,
    /// any thread still blocked after the join timeout is detached.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.wake.notify_all();

        if self.threads.is_empty() {
            return;
        }

        for handle in self.threads.drain(..) {
            join_with_timeout(handle, self.config.join_timeout());
        }

        self.shared.channel.lock().unwrap().close();
        info!("udp session stopped for {}", self.device);
    }
}

impl Drop for UdpCommandSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn send_loop(
    device: DeviceId,
    socket: Arc<UdpSocket>,
    shared: Arc<Shared>,
    events: Arc<dyn TransportEvents>,
) {
    while shared.running.load(Ordering::SeqCst) {
        let (outgoing, failed) = {
            let mut channel = shared.channel.lock().unwrap();

            loop {
                if !shared.running.load(Ordering::SeqCst) || channel.has_outgoing() {
                    break;
                }

                let now = Instant::now();
                let wait = match channel.next_deadline() {
                    Some(deadline) if deadline <= now => break,
                    Some(deadline) => deadline - now,
                    None => Duration::from_millis(IDLE_WAIT),
                };

                channel = shared
                    .wake
                    .wait_timeout(channel, wait.min(Duration::from_millis(IDLE_WAIT)))
                    .unwrap()
                    .0;
            }

            channel.take_outgoing(Instant::now())
        };

        for packet in outgoing {
            match socket.send(&packet.bytes[..]) {
                Ok(len) => {
                    trace!("sent {} to {}", packet.seq, device);
                    shared.channel.lock().unwrap().record_sent(len);
                }
                Err(err) => {
                    warn!("failed to send {} to {}: {}", packet.seq, device, err);
                    let mut channel = shared.channel.lock().unwrap();
                    channel.record_send_failed(&packet);
                    channel.record_error();
                }
            }
        }

        for failed in failed {
            events.on_command_failed(&device, &failed);
        }
    }

    debug!("udp send loop for {} exited", device);
}

fn recv_loop(
    device: DeviceId,
    socket: Arc<UdpSocket>,
    shared: Arc<Shared>,
    events: Arc<dyn TransportEvents>,
    monitor: SourceMonitor,
    recv_buffer_size: usize,
) {
    let mut buff = vec![0u8; recv_buffer_size];

    while shared.running.load(Ordering::SeqCst) {
        let len = match socket.recv(&mut buff) {
            Ok(len) => len,
            Err(err) if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut => {
                continue
            }
            Err(err) => {
                let errors = shared.channel.lock().unwrap().record_error();
                monitor.record_error();
                debug!("recv error from {} ({} consecutive): {}", device, errors, err);
                thread::sleep(Duration::from_millis(ERROR_BACKOFF));
                continue;
            }
        };

        let now = Instant::now();

        match classify(&buff[..len]) {
            Frame::Protocol(packet) => {
                let event = match packet.ack_status() {
                    Some(status) => {
                        let mut channel = shared.channel.lock().unwrap();
                        channel.record_received(len, now);
                        channel.handle_ack(packet.seq(), status, now)
                    }
                    None => {
                        trace!("ignoring packet {:#04x} from {}", packet.header.cmd, device);
                        None
                    }
                };

                match event {
                    Some(AckEvent::Acked(seq, status, latency)) => {
                        events.on_ack(&device, seq, status, latency)
                    }
                    Some(AckEvent::Failed(failed)) => events.on_command_failed(&device, &failed),
                    None => {}
                }
            }
            Frame::Opaque(payload) => {
                shared.channel.lock().unwrap().record_received(len, now);
                monitor.record_packet_at(len, now);
                events.on_video_data(&device, payload);
            }
            Frame::Malformed(err) => {
                debug!("discarding malformed packet from {}: {}", device, err);
                monitor.record_error();
            }
        }
    }

    debug!("udp recv loop for {} exited", device);
}
