use log::*;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const JOIN_POLL_INTERVAL: u64 = 10; // ms

/// Joins the thread, giving up after `timeout`. A thread that does not
/// finish in time is detached so shutdown never hangs.
/// Returns whether the thread was joined.
pub(crate) fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let name = handle.thread().name().unwrap_or("unnamed").to_owned();
    let deadline = Instant::now() + timeout;

    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("thread {} did not stop within {:?}, detaching", name, timeout);
            return false;
        }

        thread::sleep(Duration::from_millis(JOIN_POLL_INTERVAL));
    }

    if handle.join().is_err() {
        error!("thread {} panicked", name);
    }

    true
}
