use crate::decoder::IdrRequester;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct IdrState {
    pending: bool,
    last_sent: Option<Instant>,
    requested: u64,
    sent: u64,
}

/// Coalesces IDR requests from the reassembler and the decoder. The owner
/// of the command channel takes them at most once per interval.
#[derive(Debug)]
pub struct IdrRequests {
    interval: Duration,
    state: Mutex<IdrState>,
}

impl IdrRequests {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(IdrState {
                pending: false,
                last_sent: None,
                requested: 0,
                sent: 0,
            }),
        }
    }

    pub fn request(&self) {
        let mut state = self.state.lock().unwrap();
        state.pending = true;
        state.requested += 1;
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().unwrap().pending
    }

    /// Returns true if an IDR should be requested from the device now.
    /// A request within the interval stays pending until it has passed.
    pub fn take(&self, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap();

        if !state.pending {
            return false;
        }

        if let Some(last_sent) = state.last_sent {
            if now.saturating_duration_since(last_sent) < self.interval {
                return false;
            }
        }

        state.pending = false;
        state.last_sent = Some(now);
        state.sent += 1;

        true
    }

    /// (requested, sent)
    pub fn counts(&self) -> (u64, u64) {
        let state = self.state.lock().unwrap();
        (state.requested, state.sent)
    }
}

impl IdrRequester for IdrRequests {
    fn request_idr(&self) {
        self.request();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_to_take_without_request() {
        let requests = IdrRequests::new(Duration::from_secs(1));

        assert_eq!(requests.take(Instant::now()), false);
    }

    #[test]
    fn test_requests_coalesce_and_rate_limit() {
        let requests = IdrRequests::new(Duration::from_secs(1));
        let start = Instant::now();

        requests.request();
        requests.request();
        assert_eq!(requests.take(start), true);
        assert_eq!(requests.take(start), false);

        requests.request();
        assert_eq!(requests.take(start + Duration::from_millis(500)), false);
        assert_eq!(requests.is_pending(), true);
        assert_eq!(requests.take(start + Duration::from_secs(1)), true);

        assert_eq!(requests.counts(), (3, 2));
    }
}
