use droidlink_client::{Client, ClientSession, Config, DecodeBackendFactory};
use droidlink_client::decoder::{FrameCollector, NullDecodeBackend, VideoDecodeBackend};
use droidlink_client::transport::{AckConfig, UdpSessionConfig};
use droidlink_shared::{AckStatus, Command, Packet, PacketBuilder};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

static INIT: Once = Once::new();

lazy_static! {
    static ref NEXT_PORT: Mutex<u16> = Mutex::new(28100);
}

pub fn init_logger() {
    INIT.call_once(|| {
        let _ = env_logger::Builder::from_default_env()
            .is_test(true)
            .try_init();
    });
}

/// A loopback port not handed out to any other test in this run
pub fn next_port() -> u16 {
    let mut port = NEXT_PORT.lock().unwrap();
    *port += 1;
    *port
}

pub fn wait_for(cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);

    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        thread::sleep(Duration::from_millis(10));
    }
}

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum AckPolicy {
    Ok,
    /// Answers BUSY to the first transmission of each command
    BusyOnce,
    Silent,
}

/// Plays the device side of the command protocol on a loopback UDP socket
pub struct SimulatedDevice {
    socket: Arc<UdpSocket>,
    peer: Arc<Mutex<Option<SocketAddr>>>,
    received: Arc<Mutex<Vec<Packet>>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SimulatedDevice {
    pub fn start(port: u16, policy: AckPolicy) -> Self {
        let socket = Arc::new(UdpSocket::bind(("127.0.0.1", port)).unwrap());
        socket
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();

        let peer = Arc::new(Mutex::new(None));
        let received = Arc::new(Mutex::new(vec![]));
        let running = Arc::new(AtomicBool::new(true));

        let thread = {
            let (socket, peer, received, running) = (
                Arc::clone(&socket),
                Arc::clone(&peer),
                Arc::clone(&received),
                Arc::clone(&running),
            );

            thread::spawn(move || {
                let mut seen = HashMap::new();
                let mut buff = [0u8; 2048];

                while running.load(Ordering::SeqCst) {
                    let (read, from) = match socket.recv_from(&mut buff) {
                        Ok(result) => result,
                        Err(_) => continue,
                    };

                    *peer.lock().unwrap() = Some(from);

                    let packet = match Packet::parse(&buff[..read]) {
                        Ok(packet) => packet,
                        Err(_) => continue,
                    };

                    let transmissions = seen.entry(packet.seq()).or_insert(0u32);
                    *transmissions += 1;

                    let status = match (policy, *transmissions) {
                        (AckPolicy::Silent, _) => None,
                        (AckPolicy::BusyOnce, 1) => Some(AckStatus::Busy),
                        _ => Some(AckStatus::Ok),
                    };

                    if let Some(status) = status {
                        let ack = PacketBuilder::ack(packet.seq(), status);
                        socket.send_to(&ack.to_vec(), from).unwrap();
                    }

                    received.lock().unwrap().push(packet);
                }
            })
        };

        Self {
            socket,
            peer,
            received,
            running,
            thread: Some(thread),
        }
    }

    pub fn port(&self) -> u16 {
        self.socket.local_addr().unwrap().port()
    }

    /// Address of the host, known once it has sent a packet
    pub fn peer(&self) -> Option<SocketAddr> {
        *self.peer.lock().unwrap()
    }

    pub fn received(&self) -> Vec<Packet> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_commands(&self) -> Vec<Command> {
        self.received()
            .iter()
            .filter_map(|packet| packet.command().ok())
            .collect()
    }

    /// Sends a datagram to the host, as the video stream does
    pub fn send_to_host(&self, data: &[u8]) {
        let peer = self.peer().expect("host has not sent anything yet");
        self.socket.send_to(data, peer).unwrap();
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(thread) = self.thread.take() {
            thread.join().unwrap();
        }
    }
}

pub fn wifi_config(vars: &[(&str, String)]) -> Config {
    let vars = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect::<HashMap<_, _>>();

    Config::from_vars(|name| match name {
        "DROIDLINK_DEVICE_IP" => Some("127.0.0.1".to_owned()),
        name => vars.get(name).cloned(),
    })
    .unwrap()
}

pub fn decoders() -> DecodeBackendFactory {
    Arc::new(|| Box::new(NullDecodeBackend::new()) as Box<dyn VideoDecodeBackend>)
}

pub fn fast_udp_config() -> UdpSessionConfig {
    UdpSessionConfig::default().with_ack(
        AckConfig::default()
            .with_ack_timeout(Duration::from_millis(50))
            .with_max_retries(2)
            .with_busy_retry_interval(Duration::from_millis(10)),
    )
}

pub fn start_wifi_client(config: Config, frames: &FrameCollector) -> ClientSession {
    Client::new(config, decoders(), Arc::new(frames.clone()))
        .with_udp_config(fast_udp_config())
        .start()
        .unwrap()
}
