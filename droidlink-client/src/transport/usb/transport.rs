use super::{discover, AccessoryEndpoints, BusLocation, OpenedDevice, UsbBackend, UsbConfig, UsbError, UsbHandle};
use crate::transport::{
    join_with_timeout, AckEvent, CloseReason, DeviceChannel, DeviceId, DeviceStats,
    SourceMonitor, TransportEvents,
};
use anyhow::{Error, Result};
use droidlink_shared::{classify, Command, Frame, SequenceNumber};
use log::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const IDLE_WAIT: u64 = 100; // ms

/// Command and video transport over the Android accessory protocol.
///
/// One dispatcher thread drains the send queues of all devices, one
/// receive thread per device reads its bulk-in endpoint. The receive
/// endpoint multiplexes ACK packets and raw video bytes.
pub struct UsbTransport {
    backend: Arc<dyn UsbBackend>,
    config: UsbConfig,
    events: Arc<dyn TransportEvents>,
    shared: Arc<Shared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

struct Shared {
    running: AtomicBool,
    devices: Mutex<HashMap<DeviceId, DeviceSession>>,
    wake: Condvar,
    monitor: SourceMonitor,
    max_consecutive_errors: u32,
}

struct DeviceSession {
    location: BusLocation,
    handle: Arc<dyn UsbHandle>,
    endpoints: AccessoryEndpoints,
    channel: DeviceChannel,
    alive: Arc<AtomicBool>,
}

/// Packets of one device taken out of the map for sending
struct SendBatch {
    device: DeviceId,
    handle: Arc<dyn UsbHandle>,
    endpoint: u8,
    outgoing: Vec<crate::transport::Outgoing>,
    failed: Vec<crate::transport::FailedCommand>,
}

impl UsbTransport {
    /// Discovers and opens devices and starts the I/O threads.
    /// Fails if no accessory device could be opened.
    pub fn start(
        backend: Arc<dyn UsbBackend>,
        config: UsbConfig,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            devices: Mutex::new(HashMap::new()),
            wake: Condvar::new(),
            monitor: SourceMonitor::new(),
            max_consecutive_errors: config.max_consecutive_errors(),
        });

        let mut transport = Self {
            backend,
            config,
            events,
            shared,
            threads: Mutex::new(vec![]),
        };

        let dispatcher = {
            let (shared, events) = (Arc::clone(&transport.shared), Arc::clone(&transport.events));
            let write_timeout = transport.config.write_timeout();

            thread::Builder::new()
                .name("usb-dispatch".to_owned())
                .spawn(move || dispatch_loop(shared, events, write_timeout))
        };

        match dispatcher {
            Ok(handle) => transport.threads.lock().unwrap().push(handle),
            Err(err) => {
                error!("failed to spawn usb dispatcher: {}", err);
                return Err(Error::msg(format!("failed to spawn usb dispatcher: {}", err)));
            }
        }

        let opened = match transport.rescan() {
            Ok(opened) => opened,
            Err(err) => {
                transport.stop();
                return Err(err);
            }
        };

        if opened.is_empty() {
            transport.stop();
            error!("no usb accessory device could be opened");
            return Err(Error::msg("no usb accessory device could be opened"));
        }

        info!("usb transport started with {} devices", opened.len());

        Ok(transport)
    }

    /// Reruns discovery and starts receiving from newly opened devices.
    /// Devices already attached are left untouched.
    pub fn rescan(&self) -> Result<Vec<DeviceId>> {
        let known = self
            .shared
            .devices
            .lock()
            .unwrap()
            .values()
            .map(|d| d.location)
            .collect::<HashSet<_>>();

        let report = discover(self.backend.as_ref(), &self.config, &known)?;
        let mut added = vec![];

        for opened in report.opened {
            let device = opened.device_id();

            match self.attach(device.clone(), opened) {
                Ok(true) => added.push(device),
                Ok(false) => warn!("device {} is already attached, ignoring", device),
                Err(err) => error!("failed to attach {}: {}", device, err),
            }
        }

        Ok(added)
    }

    fn attach(&self, device: DeviceId, opened: OpenedDevice) -> Result<bool> {
        let handle: Arc<dyn UsbHandle> = Arc::from(opened.handle);
        let alive = Arc::new(AtomicBool::new(true));

        {
            let mut devices = self.shared.devices.lock().unwrap();

            if devices.contains_key(&device) {
                return Ok(false);
            }

            devices.insert(
                device.clone(),
                DeviceSession {
                    location: opened.info.location,
                    handle: Arc::clone(&handle),
                    endpoints: opened.endpoints,
                    channel: DeviceChannel::new(self.config.ack().clone()),
                    alive: Arc::clone(&alive),
                },
            );
        }

        let reader = {
            let reader = Reader {
                device: device.clone(),
                handle,
                endpoint: opened.endpoints.bulk_in,
                alive,
                shared: Arc::clone(&self.shared),
                events: Arc::clone(&self.events),
                read_timeout: self.config.read_timeout(),
                error_backoff: self.config.error_backoff(),
            };
            let buffer_size = self.config.read_buffer_size();

            thread::Builder::new()
                .name(format!("usb-recv-{}", device))
                .spawn(move || reader.run(buffer_size))
        };

        match reader {
            Ok(handle) => {
                self.threads.lock().unwrap().push(handle);
                Ok(true)
            }
            Err(err) => {
                self.shared.devices.lock().unwrap().remove(&device);
                Err(Error::msg(format!("failed to spawn receive thread: {}", err)))
            }
        }
    }

    /// Builds the command with the device's next sequence number and queues it
    pub fn send_command(&self, device: &DeviceId, command: &Command) -> Result<SequenceNumber> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return Err(Error::msg("usb transport is stopped"));
        }

        let seq = {
            let mut devices = self.shared.devices.lock().unwrap();
            let session = devices
                .get_mut(device)
                .ok_or_else(|| Error::msg(format!("unknown usb device: {}", device)))?;

            session.channel.enqueue(command)?
        };

        self.shared.wake.notify_all();

        Ok(seq)
    }

    pub fn devices(&self) -> Vec<DeviceId> {
        self.shared.devices.lock().unwrap().keys().cloned().collect()
    }

    pub fn stats(&self, device: &DeviceId) -> Option<DeviceStats> {
        self.shared
            .devices
            .lock()
            .unwrap()
            .get(device)
            .map(|d| d.channel.stats().clone())
    }

    /// Counters of the video bytes received across all devices
    pub fn monitor(&self) -> SourceMonitor {
        self.shared.monitor.clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.wake.notify_all();

        let threads = self.threads.lock().unwrap().drain(..).collect::<Vec<_>>();

        if threads.is_empty() {
            return;
        }

        for handle in threads {
            join_with_timeout(handle, self.config.join_timeout());
        }

        let closed = {
            let mut devices = self.shared.devices.lock().unwrap();
            devices
                .drain()
                .map(|(device, mut session)| {
                    session.alive.store(false, Ordering::SeqCst);
                    session.channel.close();
                    device
                })
                .collect::<Vec<_>>()
        };

        for device in closed {
            self.events.on_device_closed(&device, &CloseReason::Stopped);
        }

        info!("usb transport stopped");
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    /// Removes the device from the map. Returns false if it was already gone.
    fn disconnect(&self, events: &dyn TransportEvents, device: &DeviceId, reason: CloseReason) -> bool {
        let removed = self.devices.lock().unwrap().remove(device);

        let mut session = match removed {
            Some(session) => session,
            None => return false,
        };

        session.alive.store(false, Ordering::SeqCst);
        session.channel.close();
        warn!("usb device {} disconnected: {:?}", device, reason);
        events.on_device_closed(device, &reason);

        true
    }

    /// Counts the error against the device and disconnects it if fatal or
    /// past the consecutive error threshold. Returns whether it was disconnected.
    fn handle_error(&self, events: &dyn TransportEvents, device: &DeviceId, err: &UsbError) -> bool {
        if err.is_fatal() {
            return self.disconnect(events, device, CloseReason::NoDevice);
        }

        if !err.is_transient() {
            return false;
        }

        self.monitor.record_error();

        let errors = {
            let mut devices = self.devices.lock().unwrap();
            match devices.get_mut(device) {
                Some(session) => session.channel.record_error(),
                None => return true,
            }
        };

        debug!("usb error on {} ({} consecutive): {}", device, errors, err);

        if errors >= self.max_consecutive_errors {
            return self.disconnect(events, device, CloseReason::TooManyErrors(errors));
        }

        false
    }
}

fn dispatch_loop(shared: Arc<Shared>, events: Arc<dyn TransportEvents>, write_timeout: Duration) {
    while shared.running.load(Ordering::SeqCst) {
        let batches = {
            let mut devices = shared.devices.lock().unwrap();

            loop {
                if !shared.running.load(Ordering::SeqCst)
                    || devices.values().any(|d| d.channel.has_outgoing())
                {
                    break;
                }

                let now = Instant::now();
                let wait = match devices.values().filter_map(|d| d.channel.next_deadline()).min() {
                    Some(deadline) if deadline <= now => break,
                    Some(deadline) => (deadline - now).min(Duration::from_millis(IDLE_WAIT)),
                    None => Duration::from_millis(IDLE_WAIT),
                };

                devices = shared.wake.wait_timeout(devices, wait).unwrap().0;
            }

            let now = Instant::now();

            devices
                .iter_mut()
                .map(|(device, session)| {
                    let (outgoing, failed) = session.channel.take_outgoing(now);
                    SendBatch {
                        device: device.clone(),
                        handle: Arc::clone(&session.handle),
                        endpoint: session.endpoints.bulk_out,
                        outgoing,
                        failed,
                    }
                })
                .filter(|b| !b.outgoing.is_empty() || !b.failed.is_empty())
                .collect::<Vec<_>>()
        };

        for batch in batches {
            for failed in batch.failed.iter() {
                events.on_command_failed(&batch.device, failed);
            }

            for packet in batch.outgoing {
                match batch.handle.write_bulk(batch.endpoint, &packet.bytes[..], write_timeout) {
                    Ok(len) => {
                        trace!("sent {} to {}", packet.seq, batch.device);
                        if let Some(session) = shared.devices.lock().unwrap().get_mut(&batch.device) {
                            session.channel.record_sent(len);
                        }
                    }
                    Err(err) => {
                        debug!("failed to send {} to {}: {}", packet.seq, batch.device, err);
                        if let Some(session) = shared.devices.lock().unwrap().get_mut(&batch.device) {
                            session.channel.record_send_failed(&packet);
                        }
                        if shared.handle_error(events.as_ref(), &batch.device, &err) {
                            break;
                        }
                    }
                }
            }
        }
    }

    debug!("usb dispatcher exited");
}

struct Reader {
    device: DeviceId,
    handle: Arc<dyn UsbHandle>,
    endpoint: u8,
    alive: Arc<AtomicBool>,
    shared: Arc<Shared>,
    events: Arc<dyn TransportEvents>,
    read_timeout: Duration,
    error_backoff: Duration,
}

impl Reader {
    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst) && self.alive.load(Ordering::SeqCst)
    }

    fn run(self, buffer_size: usize) {
        let mut buff = vec![0u8; buffer_size];

        while self.is_running() {
            match self.handle.read_bulk(self.endpoint, &mut buff, self.read_timeout) {
                Ok(0) | Err(UsbError::Timeout) => continue,
                Ok(len) => self.handle_incoming(&buff[..len]),
                Err(err) => {
                    if self.shared.handle_error(self.events.as_ref(), &self.device, &err) {
                        break;
                    }

                    thread::sleep(self.error_backoff);
                }
            }
        }

        debug!("usb reader for {} exited", self.device);
    }

    fn handle_incoming(&self, data: &[u8]) {
        let now = Instant::now();

        match classify(data) {
            Frame::Protocol(packet) => {
                let status = match packet.ack_status() {
                    Some(status) => status,
                    None => {
                        trace!("ignoring packet {:#04x} from {}", packet.header.cmd, self.device);
                        return;
                    }
                };

                let event = {
                    let mut devices = self.shared.devices.lock().unwrap();
                    match devices.get_mut(&self.device) {
                        Some(session) => {
                            session.channel.record_received(data.len(), now);
                            session.channel.handle_ack(packet.seq(), status, now)
                        }
                        None => None,
                    }
                };

                match event {
                    Some(AckEvent::Acked(seq, status, latency)) => {
                        self.events.on_ack(&self.device, seq, status, latency)
                    }
                    Some(AckEvent::Failed(failed)) => {
                        self.events.on_command_failed(&self.device, &failed)
                    }
                    None => {}
                }
            }
            Frame::Opaque(payload) => {
                if let Some(session) = self.shared.devices.lock().unwrap().get_mut(&self.device) {
                    session.channel.record_received(payload.len(), now);
                }

                self.shared.monitor.record_packet_at(payload.len(), now);
                self.events.on_video_data(&self.device, payload);
            }
            Frame::Malformed(err) => {
                debug!("discarding malformed packet from {}: {}", self.device, err);
                self.shared.monitor.record_error();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::mock::{MockBackend, MockHandle};
    use super::*;
    use crate::transport::{AckConfig, FailedCommand};
    use droidlink_shared::{AckStatus, Packet, PacketBuilder};

    #[derive(Default)]
    struct Recorder {
        acks: Mutex<Vec<(DeviceId, SequenceNumber, AckStatus)>>,
        video: Mutex<Vec<(DeviceId, Vec<u8>)>>,
        closed: Mutex<Vec<(DeviceId, CloseReason)>>,
        failed: Mutex<Vec<FailedCommand>>,
    }

    impl TransportEvents for Recorder {
        fn on_ack(&self, device: &DeviceId, seq: SequenceNumber, status: AckStatus, _: Duration) {
            self.acks.lock().unwrap().push((device.clone(), seq, status));
        }

        fn on_video_data(&self, device: &DeviceId, data: &[u8]) {
            self.video.lock().unwrap().push((device.clone(), data.to_vec()));
        }

        fn on_device_closed(&self, device: &DeviceId, reason: &CloseReason) {
            self.closed.lock().unwrap().push((device.clone(), reason.clone()));
        }

        fn on_command_failed(&self, _: &DeviceId, failed: &FailedCommand) {
            self.failed.lock().unwrap().push(failed.clone());
        }
    }

    fn wait_for(cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(3);

        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for condition");
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn config() -> UsbConfig {
        UsbConfig::default()
            .with_settle_delay(Duration::from_millis(1))
            .with_open_retry_delay(Duration::from_millis(1))
            .with_read_timeout(Duration::from_millis(5))
            .with_error_backoff(Duration::from_millis(1))
    }

    fn start(backend: MockBackend, config: UsbConfig) -> (UsbTransport, Arc<Recorder>) {
        let events = Arc::new(Recorder::default());
        let transport = UsbTransport::start(Arc::new(backend), config, events.clone()).unwrap();

        (transport, events)
    }

    fn sent_packets(handle: &MockHandle) -> Vec<Packet> {
        handle
            .bulk_writes()
            .iter()
            .map(|raw| Packet::parse(raw).unwrap())
            .collect()
    }

    #[test]
    fn test_start_fails_without_devices() {
        let backend = MockBackend::new();
        backend.add_other(2, 0x046D, 0xC52B);

        let result = UsbTransport::start(
            Arc::new(backend),
            config(),
            Arc::new(Recorder::default()),
        );

        assert_eq!(result.is_err(), true);
    }

    #[test]
    fn test_send_command_and_receive_ack() {
        let backend = MockBackend::new();
        let handle = backend.add_accessory(3, "DEV1");
        let (mut transport, events) = start(backend, config());
        let device = DeviceId::new("usb-DEV1");

        let seq = transport.send_command(&device, &Command::Back).unwrap();

        wait_for(|| handle.bulk_writes().len() == 1);
        assert_eq!(sent_packets(&handle)[0].seq(), seq);

        handle.push_incoming(PacketBuilder::ack(seq, AckStatus::Ok).to_vec());

        wait_for(|| events.acks.lock().unwrap().len() == 1);
        assert_eq!(
            events.acks.lock().unwrap()[0],
            (device.clone(), seq, AckStatus::Ok)
        );
        assert_eq!(transport.stats(&device).unwrap().acks_received, 1);

        transport.stop();
    }

    #[test]
    fn test_video_bytes_forwarded_unmodified() {
        let backend = MockBackend::new();
        let handle = backend.add_accessory(3, "DEV1");
        let (mut transport, events) = start(backend, config());

        let video = vec![0u8, 0, 0, 1, 0x67, 0x42, 0xC0, 0x1F];
        handle.push_incoming(video.clone());

        wait_for(|| events.video.lock().unwrap().len() == 1);
        assert_eq!(
            events.video.lock().unwrap()[0],
            (DeviceId::new("usb-DEV1"), video)
        );

        transport.stop();
    }

    #[test]
    fn test_sequence_numbers_per_device_fifo() {
        let backend = MockBackend::new();
        let handle = backend.add_accessory(3, "DEV1");
        let (mut transport, _events) = start(backend, config());
        let device = DeviceId::new("usb-DEV1");

        let seqs = (0..5)
            .map(|i| transport.send_command(&device, &Command::Key(i)).unwrap())
            .collect::<Vec<_>>();

        wait_for(|| handle.bulk_writes().len() >= 5);

        let sent = sent_packets(&handle)
            .iter()
            .take(5)
            .map(|p| p.seq())
            .collect::<Vec<_>>();
        assert_eq!(sent, seqs);

        transport.stop();
    }

    #[test]
    fn test_unacknowledged_command_fails() {
        let backend = MockBackend::new();
        let handle = backend.add_accessory(3, "DEV1");
        let config = config().with_ack(
            AckConfig::default()
                .with_ack_timeout(Duration::from_millis(10))
                .with_max_retries(2),
        );
        let (mut transport, events) = start(backend, config);

        transport
            .send_command(&DeviceId::new("usb-DEV1"), &Command::Home)
            .unwrap();

        wait_for(|| events.failed.lock().unwrap().len() == 1);
        assert_eq!(handle.bulk_writes().len(), 3);

        transport.stop();
    }

    #[test]
    fn test_no_device_error_disconnects() {
        let backend = MockBackend::new();
        let handle = backend.add_accessory(3, "DEV1");
        let (mut transport, events) = start(backend, config());

        handle.unplug();

        wait_for(|| events.closed.lock().unwrap().len() == 1);
        assert_eq!(
            events.closed.lock().unwrap()[0],
            (DeviceId::new("usb-DEV1"), CloseReason::NoDevice)
        );
        assert_eq!(transport.devices().len(), 0);
        assert_eq!(
            transport
                .send_command(&DeviceId::new("usb-DEV1"), &Command::Back)
                .is_err(),
            true
        );

        transport.stop();
    }

    #[test]
    fn test_sustained_io_errors_disconnect() {
        let backend = MockBackend::new();
        let handle = backend.add_accessory(3, "DEV1");
        for _ in 0..3 {
            handle.push_error(UsbError::Pipe);
        }
        let (mut transport, events) = start(backend, config().with_max_consecutive_errors(3));

        wait_for(|| events.closed.lock().unwrap().len() == 1);
        assert_eq!(
            events.closed.lock().unwrap()[0].1,
            CloseReason::TooManyErrors(3)
        );

        transport.stop();
    }

    #[test]
    fn test_transient_errors_reset_by_traffic() {
        let backend = MockBackend::new();
        let handle = backend.add_accessory(3, "DEV1");
        handle.push_error(UsbError::Io);
        handle.push_error(UsbError::Io);
        handle.push_incoming(vec![1, 2, 3]);
        handle.push_error(UsbError::Io);
        handle.push_error(UsbError::Io);
        handle.push_incoming(vec![4, 5, 6]);
        let (mut transport, events) = start(backend, config().with_max_consecutive_errors(3));

        wait_for(|| events.video.lock().unwrap().len() == 2);
        assert_eq!(events.closed.lock().unwrap().len(), 0);
        assert_eq!(
            transport
                .stats(&DeviceId::new("usb-DEV1"))
                .unwrap()
                .total_errors,
            4
        );

        transport.stop();
    }

    #[test]
    fn test_rescan_attaches_new_devices_only() {
        let backend = Arc::new(MockBackend::new());
        backend.add_accessory(3, "DEV1");
        let events = Arc::new(Recorder::default());

        let mut transport =
            UsbTransport::start(backend.clone(), config(), events.clone()).unwrap();

        backend.add_accessory(4, "DEV2");
        let added = transport.rescan().unwrap();

        assert_eq!(added, vec![DeviceId::new("usb-DEV2")]);

        let mut devices = transport.devices();
        devices.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            devices,
            vec![DeviceId::new("usb-DEV1"), DeviceId::new("usb-DEV2")]
        );

        assert_eq!(transport.rescan().unwrap(), vec![]);

        transport.stop();
        assert_eq!(events.closed.lock().unwrap().len(), 2);
    }
}
