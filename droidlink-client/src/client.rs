use crate::arbiter::{
    ActiveSource, ActiveSourceFilter, ArbiterConfig, ArbiterMonitor, SourceSwitch,
    SwitchListener, VideoSource,
};
use crate::decoder::{FrameSink, VideoDecodeBackend};
use crate::pipeline::{PipelineConfig, PipelineRouter, VideoPipeline};
use crate::stream::StreamFraming;
use crate::transport::usb::{UsbBackend, UsbConfig, UsbTransport};
use crate::transport::{
    CloseReason, DeviceId, FailedCommand, SourceMonitor, TcpVideoConfig, TcpVideoSession,
    TransportEvents, UdpCommandSession, UdpSessionConfig,
};
use crate::{ClientMode, Config};
use anyhow::{Error, Result};
use droidlink_shared::{AckStatus, Command, SequenceNumber};
use log::*;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: u64 = 50; // ms
const RESCAN_INTERVAL: u64 = 2000; // ms

/// Creates a decode backend for each new video pipeline
pub type DecodeBackendFactory = Arc<dyn Fn() -> Box<dyn VideoDecodeBackend> + Send + Sync>;

/// Wires transports, video pipelines and the source arbiter together
/// according to the configured mode
pub struct Client {
    config: Config,
    decoders: DecodeBackendFactory,
    sink: Arc<dyn FrameSink>,
    usb_backend: Option<Arc<dyn UsbBackend>>,
    usb_config: UsbConfig,
    udp_config: UdpSessionConfig,
    tcp_config: TcpVideoConfig,
    arbiter_config: ArbiterConfig,
}

struct UsbLink {
    transport: UsbTransport,
    router: Arc<PipelineRouter>,
}

struct WifiLink {
    commands: UdpCommandSession,
    video: Option<TcpVideoSession>,
    pipeline: Arc<VideoPipeline>,
}

/// A running client, see `Client::start`
pub struct ClientSession {
    usb: Option<UsbLink>,
    wifi: Option<WifiLink>,
    arbiter: Option<ArbiterMonitor>,
}

impl Client {
    pub fn new(config: Config, decoders: DecodeBackendFactory, sink: Arc<dyn FrameSink>) -> Self {
        Self {
            config,
            decoders,
            sink,
            usb_backend: None,
            usb_config: UsbConfig::default(),
            udp_config: UdpSessionConfig::default(),
            tcp_config: TcpVideoConfig::default(),
            arbiter_config: ArbiterConfig::default(),
        }
    }

    pub fn with_usb_backend(mut self, backend: Arc<dyn UsbBackend>) -> Self {
        self.usb_backend = Some(backend);

        self
    }

    pub fn with_usb_config(mut self, value: UsbConfig) -> Self {
        self.usb_config = value;

        self
    }

    pub fn with_udp_config(mut self, value: UdpSessionConfig) -> Self {
        self.udp_config = value;

        self
    }

    pub fn with_tcp_config(mut self, value: TcpVideoConfig) -> Self {
        self.tcp_config = value;

        self
    }

    pub fn with_arbiter_config(mut self, value: ArbiterConfig) -> Self {
        self.arbiter_config = value;

        self
    }

    pub fn start(self) -> Result<ClientSession> {
        let mode = self.config.mode();
        let active = ActiveSource::new(match mode {
            ClientMode::Wifi => VideoSource::Wifi,
            _ => VideoSource::Usb,
        });

        let usb = if mode.uses_usb() {
            Some(self.start_usb(&active)?)
        } else {
            None
        };

        let wifi = if mode.uses_wifi() {
            Some(self.start_wifi(&active)?)
        } else {
            None
        };

        let arbiter = match (&usb, &wifi) {
            (Some(usb), Some(wifi)) => Some(ArbiterMonitor::start(
                self.arbiter_config.clone(),
                usb.transport.monitor(),
                wifi.monitor(),
                active,
                Some(Arc::new(LogSwitches) as Arc<dyn SwitchListener>),
            )?),
            _ => None,
        };

        info!("client started in {:?} mode", mode);

        Ok(ClientSession { usb, wifi, arbiter })
    }

    fn pipeline_config(&self, framing: StreamFraming) -> PipelineConfig {
        PipelineConfig::default()
            .with_framing(framing)
            .with_idr_request_interval(self.config.idr_request_interval())
    }

    fn filtered_sink(&self, source: VideoSource, active: &ActiveSource) -> Arc<dyn FrameSink> {
        Arc::new(ActiveSourceFilter::new(
            source,
            active.clone(),
            Arc::clone(&self.sink),
        ))
    }

    fn start_usb(&self, active: &ActiveSource) -> Result<UsbLink> {
        let backend = match &self.usb_backend {
            Some(backend) => Arc::clone(backend),
            None => return Err(Error::msg("usb mode requires a usb backend")),
        };

        let router = {
            let config = self.pipeline_config(self.config.usb_framing());
            let decoders = Arc::clone(&self.decoders);
            let sink = self.filtered_sink(VideoSource::Usb, active);

            Arc::new(PipelineRouter::new(Box::new(move |device: &DeviceId| {
                VideoPipeline::start(device.clone(), config.clone(), decoders(), Arc::clone(&sink))
            })))
        };

        let transport = UsbTransport::start(
            backend,
            self.usb_config.clone(),
            Arc::clone(&router) as Arc<dyn TransportEvents>,
        )?;

        Ok(UsbLink { transport, router })
    }

    fn start_wifi(&self, active: &ActiveSource) -> Result<WifiLink> {
        let ip = match self.config.device_ip() {
            Some(ip) => ip,
            None => return Err(Error::msg("wifi mode requires a device ip")),
        };

        let device = DeviceId::new(ip.to_string());
        let framing = match self.config.video_port() {
            Some(_) => StreamFraming::Vid0,
            None => StreamFraming::Rtp,
        };

        let pipeline = Arc::new(VideoPipeline::start(
            device.clone(),
            self.pipeline_config(framing),
            (self.decoders)(),
            self.filtered_sink(VideoSource::Wifi, active),
        )?);

        // RTP arrives on the command socket unless a VID0 stream is used
        let (command_events, video) = match self.config.video_port() {
            Some(port) => {
                let video = TcpVideoSession::connect(
                    device.clone(),
                    SocketAddr::new(ip, port),
                    self.tcp_config.clone(),
                    Arc::clone(&pipeline) as Arc<dyn TransportEvents>,
                )?;

                (Arc::new(CommandEvents) as Arc<dyn TransportEvents>, Some(video))
            }
            None => (Arc::clone(&pipeline) as Arc<dyn TransportEvents>, None),
        };

        let commands = UdpCommandSession::connect(
            device,
            SocketAddr::new(unspecified(ip), 0),
            SocketAddr::new(ip, self.config.control_port()),
            self.udp_config.clone(),
            command_events,
        )?;

        Ok(WifiLink {
            commands,
            video,
            pipeline,
        })
    }
}

fn unspecified(peer: IpAddr) -> IpAddr {
    match peer {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

impl WifiLink {
    fn monitor(&self) -> SourceMonitor {
        match &self.video {
            Some(video) => video.monitor(),
            None => self.commands.monitor(),
        }
    }

    fn is_running(&self) -> bool {
        let video_running = self.video.as_ref().map_or(true, |video| video.is_running());

        self.commands.is_running() && video_running
    }

    fn stop(&mut self) {
        if let Some(video) = self.video.as_mut() {
            video.stop();
        }
        self.commands.stop();
        self.pipeline.finish();
    }
}

impl ClientSession {
    pub fn is_running(&self) -> bool {
        let usb_running = self
            .usb
            .as_ref()
            .map_or(false, |usb| usb.transport.is_running());
        let wifi_running = self.wifi.as_ref().map_or(false, |wifi| wifi.is_running());

        usb_running || wifi_running
    }

    pub fn active_source(&self) -> Option<VideoSource> {
        self.arbiter.as_ref().map(|arbiter| arbiter.active())
    }

    /// Sends a command to every connected device. USB is preferred for
    /// devices reachable over both links.
    pub fn send_command(&self, command: &Command) -> Result<Vec<SequenceNumber>> {
        if let Some(usb) = &self.usb {
            let devices = usb.transport.devices();

            if !devices.is_empty() {
                return devices
                    .iter()
                    .map(|device| usb.transport.send_command(device, command))
                    .collect();
            }
        }

        match &self.wifi {
            Some(wifi) => Ok(vec![wifi.commands.send_command(command)?]),
            None => Err(Error::msg("no device is connected")),
        }
    }

    /// Forwards pending IDR requests of the pipelines to their devices
    pub fn poll_idr_requests(&self) {
        if let Some(usb) = &self.usb {
            for device in usb.router.take_idr_requests() {
                if let Err(err) = usb.transport.send_command(&device, &Command::VideoIdr) {
                    warn!("failed to request idr from {}: {}", device, err);
                }
            }
        }

        if let Some(wifi) = &self.wifi {
            if wifi.pipeline.take_idr_request() {
                if let Err(err) = wifi.commands.send_command(&Command::VideoIdr) {
                    warn!("failed to request idr from {}: {}", wifi.commands.device(), err);
                }
            }
        }
    }

    /// Attaches newly plugged USB devices. The arbiter starts over when
    /// USB comes back after all devices were gone.
    pub fn rescan_usb(&self) -> Result<Vec<DeviceId>> {
        let usb = match &self.usb {
            Some(usb) => usb,
            None => return Ok(vec![]),
        };

        let had_devices = !usb.transport.devices().is_empty();
        let opened = usb.transport.rescan()?;

        if !opened.is_empty() {
            info!("attached usb devices {:?}", opened);

            if !had_devices {
                if let Some(arbiter) = &self.arbiter {
                    arbiter.reset();
                }
            }
        }

        Ok(opened)
    }

    /// Polls IDR requests and rescans USB until every transport has stopped
    pub fn run(&mut self) {
        let mut last_rescan = Instant::now();

        while self.is_running() {
            self.poll_idr_requests();

            if self.usb.is_some()
                && last_rescan.elapsed() >= Duration::from_millis(RESCAN_INTERVAL)
            {
                if let Err(err) = self.rescan_usb() {
                    warn!("usb rescan failed: {}", err);
                }
                last_rescan = Instant::now();
            }

            thread::sleep(Duration::from_millis(POLL_INTERVAL));
        }

        info!("all transports stopped");
        self.stop();
    }

    pub fn stop(&mut self) {
        if let Some(mut arbiter) = self.arbiter.take() {
            arbiter.stop();
        }

        if let Some(mut usb) = self.usb.take() {
            usb.transport.stop();
            usb.router.finish_all();
        }

        if let Some(mut wifi) = self.wifi.take() {
            wifi.stop();
        }
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Events of a command socket which carries no video
struct CommandEvents;

impl TransportEvents for CommandEvents {
    fn on_ack(&self, device: &DeviceId, seq: SequenceNumber, status: AckStatus, latency: Duration) {
        debug!("{} acked {:?} with {:?} after {:?}", device, seq, status, latency);
    }

    fn on_video_data(&self, device: &DeviceId, data: &[u8]) {
        trace!("ignoring {} bytes on the command socket of {}", data.len(), device);
    }

    fn on_device_closed(&self, device: &DeviceId, reason: &CloseReason) {
        info!("command session of {} closed: {:?}", device, reason);
    }

    fn on_command_failed(&self, device: &DeviceId, failed: &FailedCommand) {
        warn!("command to {} failed: {:?}", device, failed);
    }
}

struct LogSwitches;

impl SwitchListener for LogSwitches {
    fn on_switch(&self, switch: &SourceSwitch) {
        info!(
            "video source switched from {} to {}: {}",
            switch.from, switch.to, switch.reason
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::test_support::{TestPps, TestSlice, TestSps};
    use crate::decoder::{FrameCollector, NullDecodeBackend};
    use crate::transport::usb::mock::MockBackend;
    use droidlink_shared::Packet;
    use std::net::UdpSocket;

    fn wait_for(cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(3);

        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for condition");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn usb_config() -> UsbConfig {
        UsbConfig::default()
            .with_settle_delay(Duration::from_millis(1))
            .with_open_retry_delay(Duration::from_millis(1))
            .with_read_timeout(Duration::from_millis(5))
    }

    fn decoders() -> DecodeBackendFactory {
        Arc::new(|| Box::new(NullDecodeBackend::new()) as Box<dyn VideoDecodeBackend>)
    }

    #[test]
    fn test_usb_mode_requires_backend() {
        let config = Config::from_vars(|name| match name {
            "DROIDLINK_MODE" => Some("usb".to_owned()),
            _ => None,
        })
        .unwrap();

        let client = Client::new(config, decoders(), Arc::new(FrameCollector::new()));

        assert!(client.start().is_err());
    }

    #[test]
    fn test_wifi_session_sends_commands() {
        let device = UdpSocket::bind("127.0.0.1:0").unwrap();
        device
            .set_read_timeout(Some(Duration::from_secs(3)))
            .unwrap();
        let port = device.local_addr().unwrap().port().to_string();

        let config = Config::from_vars(|name| match name {
            "DROIDLINK_DEVICE_IP" => Some("127.0.0.1".to_owned()),
            "DROIDLINK_CONTROL_PORT" => Some(port.clone()),
            _ => None,
        })
        .unwrap();

        let mut session = Client::new(config, decoders(), Arc::new(FrameCollector::new()))
            .start()
            .unwrap();

        assert_eq!(session.is_running(), true);
        assert_eq!(session.active_source(), None);
        assert_eq!(session.send_command(&Command::Back).unwrap().len(), 1);

        let mut buff = [0u8; 64];
        let (read, _) = device.recv_from(&mut buff).unwrap();
        assert!(read >= 14);

        session.stop();
        assert_eq!(session.is_running(), false);
    }

    #[test]
    fn test_usb_session_decodes_and_attaches_new_devices() {
        let backend = Arc::new(MockBackend::new());
        let handle = backend.add_accessory(3, "DEV1");

        let config = Config::from_vars(|name| match name {
            "DROIDLINK_MODE" => Some("usb".to_owned()),
            _ => None,
        })
        .unwrap();

        let frames = FrameCollector::new();
        let mut session = Client::new(config, decoders(), Arc::new(frames.clone()))
            .with_usb_backend(backend.clone())
            .with_usb_config(usb_config())
            .start()
            .unwrap();

        let sps = TestSps::new(1080, 2400);
        let nals = vec![
            sps.build().into_bytes(),
            TestPps::new(0, 0).build().into_bytes(),
            TestSlice::idr(&sps).build().into_bytes(),
            TestSlice::p(&sps, 1).build().into_bytes(),
            TestSlice::p(&sps, 2).build().into_bytes(),
            // access unit delimiter, terminates the last slice
            vec![0x09, 0xF0],
        ];
        for nal in nals {
            let mut chunk = vec![0, 0, 0, 1];
            chunk.extend_from_slice(&nal);
            handle.push_incoming(chunk);
        }

        wait_for(|| frames.len() == 3);
        assert_eq!(frames.frames()[0].width, 1080);

        session.send_command(&Command::Home).unwrap();
        wait_for(|| !handle.bulk_writes().is_empty());
        assert_eq!(
            Packet::parse(&handle.bulk_writes()[0]).unwrap().command().unwrap(),
            Command::Home
        );

        backend.add_accessory(4, "DEV2");
        assert_eq!(session.rescan_usb().unwrap(), vec![DeviceId::new("usb-DEV2")]);
        assert_eq!(session.send_command(&Command::Back).unwrap().len(), 2);

        session.stop();
        assert_eq!(session.is_running(), false);
    }
}
