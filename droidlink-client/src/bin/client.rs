use anyhow::Result;
use droidlink_client::decoder::{DecodedFrame, FrameSink, NullDecodeBackend, VideoDecodeBackend};
use droidlink_client::{Client, Config};
use env_logger;
use log::*;
use std::process::exit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Stands in for the presentation layer
struct LogFrames {
    frames: AtomicU64,
}

impl FrameSink for LogFrames {
    fn on_frame(&self, frame: DecodedFrame) {
        let count = self.frames.fetch_add(1, Ordering::Relaxed) + 1;

        if count % 300 == 1 {
            info!(
                "frame {} ({}x{}, poc {}, ts {})",
                count, frame.width, frame.height, frame.poc, frame.timestamp
            );
        }
    }
}

#[cfg(feature = "usb")]
fn with_libusb(client: Client) -> Client {
    match droidlink_client::transport::usb::RusbBackend::new() {
        Ok(backend) => client.with_usb_backend(Arc::new(backend)),
        Err(err) => {
            warn!("libusb is unavailable: {}", err);
            client
        }
    }
}

fn run() -> Result<()> {
    let config = Config::from_env()?;

    let client = Client::new(
        config,
        Arc::new(|| Box::new(NullDecodeBackend::new()) as Box<dyn VideoDecodeBackend>),
        Arc::new(LogFrames {
            frames: AtomicU64::new(0),
        }),
    );

    #[cfg(feature = "usb")]
    let client = with_libusb(client);

    let mut session = client.start()?;
    session.run();

    Ok(())
}

fn main() -> () {
    env_logger::init();

    match run() {
        Ok(()) => exit(0),
        Err(err) => {
            error!("Error occurred: {:?}", err);
            exit(1)
        }
    }
}
