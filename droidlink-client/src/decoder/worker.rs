use super::{
    DecodeJob, DecodeOutcome, DecodeQueue, DecoderConfig, DecoderError, DecoderSession,
    DecoderState, DecoderStats, Enqueued, FrameSink, VideoDecodeBackend,
};
use crate::transport::join_with_timeout;
use log::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Asked for a fresh IDR whenever the decoder cannot continue without one.
/// Called from the decode thread.
pub trait IdrRequester: Send + Sync {
    fn request_idr(&self);
}

/// Ignores IDR requests, for streams without a control channel
#[derive(Debug, Default)]
pub struct NoIdrRequests;

impl IdrRequester for NoIdrRequests {
    fn request_idr(&self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSnapshot {
    pub state: DecoderState,
    pub stats: DecoderStats,
}

struct Shared {
    running: AtomicBool,
    queue: DecodeQueue,
    snapshot: Mutex<WorkerSnapshot>,
}

/// The decode thread of one stream. Drains the decode queue into a
/// `DecoderSession`, which owns the DPB exclusively.
pub struct DecoderWorker {
    name: String,
    config: DecoderConfig,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl DecoderWorker {
    pub fn start(
        name: impl Into<String>,
        config: DecoderConfig,
        backend: Box<dyn VideoDecodeBackend>,
        sink: Arc<dyn FrameSink>,
        idr: Arc<dyn IdrRequester>,
    ) -> Result<Self, DecoderError> {
        let name = name.into();
        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            queue: DecodeQueue::new(config.queue_capacity()),
            snapshot: Mutex::new(WorkerSnapshot {
                state: DecoderState::NoSession,
                stats: DecoderStats::default(),
            }),
        });

        let session = DecoderSession::new(config.clone(), backend, sink);

        let thread = {
            let shared = Arc::clone(&shared);
            let poll_interval = config.poll_interval();

            thread::Builder::new()
                .name(format!("decode-{}", name))
                .spawn(move || decode_loop(session, shared, idr, poll_interval))
                .map_err(|err| {
                    error!("failed to spawn decode thread: {}", err);
                    DecoderError::ThreadSpawn(err)
                })?
        };

        info!("decoder {} started", name);

        Ok(Self {
            name,
            config,
            shared,
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues an access unit for decoding
    pub fn submit(&self, job: DecodeJob) -> Enqueued {
        self.shared.queue.push(job)
    }

    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        self.shared.snapshot.lock().unwrap().clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Stops the decode thread once the queued jobs are decoded,
    /// waiting no longer than the join timeout
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.queue.close();

        if let Some(thread) = self.thread.take() {
            join_with_timeout(thread, self.config.join_timeout());
            info!("decoder {} stopped", self.name);
        }
    }
}

impl Drop for DecoderWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn decode_loop(
    mut session: DecoderSession,
    shared: Arc<Shared>,
    idr: Arc<dyn IdrRequester>,
    poll_interval: std::time::Duration,
) {
    loop {
        let job = match shared.queue.pop_timeout(poll_interval) {
            Some(job) => job,
            None if shared.queue.is_closed() => break,
            None => continue,
        };

        match session.decode(&job) {
            Ok(DecodeOutcome::NeedsIdr) => idr.request_idr(),
            Ok(_) => {}
            Err(err) => {
                // The session is recreated from the next IDR
                error!("decoder failed, resetting stream: {}", err);
                session.reset();
                idr.request_idr();
            }
        }

        let mut snapshot = shared.snapshot.lock().unwrap();
        snapshot.state = session.state();
        snapshot.stats = session.stats().clone();
    }

    session.flush();

    let mut snapshot = shared.snapshot.lock().unwrap();
    snapshot.state = session.state();
    snapshot.stats = session.stats().clone();

    debug!("decode loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::test_support::{TestPps, TestSlice, TestSps};
    use crate::bitstream::AccessUnit;
    use crate::decoder::{FrameCollector, NullDecodeBackend};
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct CountingRequester(AtomicUsize);

    impl IdrRequester for CountingRequester {
        fn request_idr(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn wait_for(cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(3);

        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for condition");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn worker(collector: &FrameCollector, requester: &Arc<CountingRequester>) -> DecoderWorker {
        DecoderWorker::start(
            "test",
            DecoderConfig::default().with_poll_interval(Duration::from_millis(10)),
            Box::new(NullDecodeBackend::new()),
            Arc::new(collector.clone()),
            requester.clone(),
        )
        .unwrap()
    }

    #[test]
    fn test_decodes_submitted_units() {
        let collector = FrameCollector::new();
        let requester = Arc::new(CountingRequester::default());
        let mut worker = worker(&collector, &requester);
        let sps = TestSps::new(640, 480);

        worker.submit(DecodeJob {
            unit: AccessUnit {
                nals: vec![sps.build(), TestPps::new(0, 0).build(), TestSlice::idr(&sps).build()],
                is_idr: true,
                synthesized: true,
            },
            timestamp: 1,
        });
        worker.submit(DecodeJob {
            unit: AccessUnit {
                nals: vec![TestSlice::p(&sps, 1).build()],
                is_idr: false,
                synthesized: false,
            },
            timestamp: 2,
        });

        wait_for(|| collector.len() == 2);
        worker.stop();

        let snapshot = worker.snapshot();
        assert_eq!(snapshot.state, DecoderState::Decoding);
        assert_eq!(snapshot.stats.decoded, 2);
        assert_eq!(requester.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_requests_idr_when_stream_starts_mid_gop() {
        let collector = FrameCollector::new();
        let requester = Arc::new(CountingRequester::default());
        let mut worker = worker(&collector, &requester);
        let sps = TestSps::new(640, 480);

        worker.submit(DecodeJob {
            unit: AccessUnit {
                nals: vec![TestSlice::p(&sps, 3).build()],
                is_idr: false,
                synthesized: false,
            },
            timestamp: 0,
        });

        wait_for(|| requester.0.load(Ordering::SeqCst) == 1);
        worker.stop();

        assert_eq!(collector.is_empty(), true);
        assert_eq!(worker.is_running(), false);
    }

    #[test]
    fn test_stop_is_prompt_when_idle() {
        let collector = FrameCollector::new();
        let requester = Arc::new(CountingRequester::default());
        let mut worker = worker(&collector, &requester);

        let started = Instant::now();
        worker.stop();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(worker.submit(DecodeJob {
            unit: AccessUnit {
                nals: vec![],
                is_idr: true,
                synthesized: false,
            },
            timestamp: 0,
        }), Enqueued::Dropped);
    }
}
