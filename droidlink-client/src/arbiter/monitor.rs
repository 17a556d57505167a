use super::{ActiveSource, ArbiterConfig, BandwidthState, HybridArbiter, SourceSwitch, VideoSource};
use crate::transport::{join_with_timeout, SourceMonitor};
use anyhow::{Error, Result};
use log::*;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Notified after every source switch, from the monitor thread and
/// outside of the arbiter's lock
pub trait SwitchListener: Send + Sync {
    fn on_switch(&self, switch: &SourceSwitch);
}

struct Shared {
    arbiter: Mutex<HybridArbiter>,
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Samples the USB and WiFi monitors on a fixed cadence and drives the arbiter
pub struct ArbiterMonitor {
    config: ArbiterConfig,
    shared: Arc<Shared>,
    active: ActiveSource,
    usb: SourceMonitor,
    wifi: SourceMonitor,
    thread: Option<JoinHandle<()>>,
}

impl ArbiterMonitor {
    pub fn start(
        config: ArbiterConfig,
        usb: SourceMonitor,
        wifi: SourceMonitor,
        active: ActiveSource,
        listener: Option<Arc<dyn SwitchListener>>,
    ) -> Result<Self> {
        let arbiter = HybridArbiter::new(config.clone());
        active.set(arbiter.active());

        let shared = Arc::new(Shared {
            arbiter: Mutex::new(arbiter),
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });

        let thread = {
            let shared = Arc::clone(&shared);
            let (usb, wifi, active) = (usb.clone(), wifi.clone(), active.clone());
            let interval = config.sample_interval();

            thread::Builder::new()
                .name("arbiter".to_owned())
                .spawn(move || monitor_loop(shared, usb, wifi, active, listener, interval))
                .map_err(|err| Error::msg(format!("failed to spawn arbiter thread: {}", err)))?
        };

        info!("source arbiter started");

        Ok(Self {
            config,
            shared,
            active,
            usb,
            wifi,
            thread: Some(thread),
        })
    }

    pub fn active(&self) -> VideoSource {
        self.active.get()
    }

    pub fn state(&self) -> BandwidthState {
        self.shared.arbiter.lock().unwrap().state().clone()
    }

    /// Clears the arbiter and both monitors, used when the transports restart
    pub fn reset(&self) {
        let mut arbiter = self.shared.arbiter.lock().unwrap();
        arbiter.reset();
        self.active.set(arbiter.active());
        self.usb.reset();
        self.wifi.reset();
    }

    pub fn stop(&mut self) {
        *self.shared.stopped.lock().unwrap() = true;
        self.shared.wake.notify_all();

        if let Some(thread) = self.thread.take() {
            join_with_timeout(thread, self.config.join_timeout());
            info!("source arbiter stopped");
        }
    }
}

impl Drop for ArbiterMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn monitor_loop(
    shared: Arc<Shared>,
    usb: SourceMonitor,
    wifi: SourceMonitor,
    active: ActiveSource,
    listener: Option<Arc<dyn SwitchListener>>,
    interval: Duration,
) {
    // Starts the first window
    let now = Instant::now();
    usb.sample(now);
    wifi.sample(now);

    loop {
        {
            let stopped = shared.stopped.lock().unwrap();
            let (stopped, _) = shared
                .wake
                .wait_timeout_while(stopped, interval, |stopped| !*stopped)
                .unwrap();

            if *stopped {
                break;
            }
        }

        let now = Instant::now();
        let (usb_sample, wifi_sample) = (usb.sample(now), wifi.sample(now));

        let switch = {
            let mut arbiter = shared.arbiter.lock().unwrap();
            let switch = arbiter.tick(usb_sample, wifi_sample, now);
            active.set(arbiter.active());
            switch
        };

        if let (Some(switch), Some(listener)) = (switch, listener.as_ref()) {
            listener.on_switch(&switch);
        }
    }

    debug!("arbiter loop exited");
}
