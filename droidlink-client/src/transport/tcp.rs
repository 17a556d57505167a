use super::{join_with_timeout, CloseReason, DeviceId, SourceMonitor, TcpVideoConfig, TransportEvents};
use anyhow::{Error, Result};
use log::*;
use std::io::{ErrorKind, Read};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Receives the VID0 framed video stream of one device over TCP.
/// Bytes are forwarded to the video callback in arrival order and
/// chunking, deframing happens downstream.
pub struct TcpVideoSession {
    device: DeviceId,
    config: TcpVideoConfig,
    stream: TcpStream,
    running: Arc<AtomicBool>,
    monitor: SourceMonitor,
    thread: Option<JoinHandle<()>>,
}

impl TcpVideoSession {
    pub fn connect(
        device: DeviceId,
        addr: SocketAddr,
        config: TcpVideoConfig,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, config.connect_timeout())?;
        info!("connected to video stream of {} at {}", device, addr);

        Self::start(device, stream, config, events)
    }

    pub fn start(
        device: DeviceId,
        stream: TcpStream,
        config: TcpVideoConfig,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Self> {
        stream.set_read_timeout(Some(config.recv_timeout()))?;
        stream.set_nodelay(true)?;

        let running = Arc::new(AtomicBool::new(true));
        let monitor = SourceMonitor::new();

        let thread = {
            let reader = stream.try_clone()?;
            let (device, running, monitor) = (device.clone(), Arc::clone(&running), monitor.clone());
            let recv_buffer_size = config.recv_buffer_size();

            thread::Builder::new()
                .name(format!("tcp-recv-{}", device))
                .spawn(move || recv_loop(device, reader, running, events, monitor, recv_buffer_size))
                .map_err(|err| Error::msg(format!("failed to spawn recv thread: {}", err)))?
        };

        Ok(Self {
            device,
            config,
            stream,
            running,
            monitor,
            thread: Some(thread),
        })
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn monitor(&self) -> SourceMonitor {
        self.monitor.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Shuts the socket down to unblock the reader, then joins it with a bounded wait
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        let thread = match self.thread.take() {
            Some(thread) => thread,
            None => return,
        };

        if let Err(err) = self.stream.shutdown(Shutdown::Both) {
            debug!("failed to shutdown video stream of {}: {}", self.device, err);
        }

        join_with_timeout(thread, self.config.join_timeout());
        info!("video stream of {} stopped", self.device);
    }
}

impl Drop for TcpVideoSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn recv_loop(
    device: DeviceId,
    mut stream: TcpStream,
    running: Arc<AtomicBool>,
    events: Arc<dyn TransportEvents>,
    monitor: SourceMonitor,
    recv_buffer_size: usize,
) {
    let mut buff = vec![0u8; recv_buffer_size];

    while running.load(Ordering::SeqCst) {
        let len = match stream.read(&mut buff) {
            Ok(0) => {
                if running.swap(false, Ordering::SeqCst) {
                    info!("video stream of {} closed by peer", device);
                    events.on_device_closed(&device, &CloseReason::ConnectionClosed);
                }
                break;
            }
            Ok(len) => len,
            Err(err) if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut => {
                continue
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                if running.swap(false, Ordering::SeqCst) {
                    warn!("video stream of {} failed: {}", device, err);
                    monitor.record_error();
                    events.on_device_closed(&device, &CloseReason::ConnectionClosed);
                }
                break;
            }
        };

        monitor.record_packet_at(len, Instant::now());
        events.on_video_data(&device, &buff[..len]);
    }

    debug!("tcp recv loop for {} exited", device);
}
