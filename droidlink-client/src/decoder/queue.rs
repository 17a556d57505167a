use crate::bitstream::AccessUnit;
use log::*;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// An access unit waiting for the decode thread
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeJob {
    pub unit: AccessUnit,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Enqueued {
    Queued,
    /// The queue was full, the stale jobs were discarded in favour of the IDR
    FlushedForIdr(usize),
    /// The queue was full or closed and the job was not an IDR
    Dropped,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct QueueStats {
    pub queued: u64,
    pub dropped: u64,
    pub flushed: u64,
}

#[derive(Debug)]
struct QueueState {
    jobs: VecDeque<DecodeJob>,
    closed: bool,
    stats: QueueStats,
}

/// Bounded FIFO between the reassembly side and the decode thread
#[derive(Debug)]
pub struct DecodeQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    available: Condvar,
}

impl DecodeQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);

        Self {
            capacity,
            state: Mutex::new(QueueState {
                jobs: VecDeque::with_capacity(capacity),
                closed: false,
                stats: QueueStats::default(),
            }),
            available: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&self, job: DecodeJob) -> Enqueued {
        let result = {
            let mut state = self.state.lock().unwrap();

            if state.closed {
                state.stats.dropped += 1;
                return Enqueued::Dropped;
            }

            if state.jobs.len() < self.capacity {
                state.jobs.push_back(job);
                state.stats.queued += 1;
                Enqueued::Queued
            } else if job.unit.is_idr {
                let flushed = state.jobs.len();
                state.jobs.clear();
                state.jobs.push_back(job);
                state.stats.flushed += flushed as u64;
                state.stats.queued += 1;
                Enqueued::FlushedForIdr(flushed)
            } else {
                state.stats.dropped += 1;
                Enqueued::Dropped
            }
        };

        match result {
            Enqueued::Dropped => trace!("decode queue full, dropping picture"),
            Enqueued::FlushedForIdr(count) => {
                debug!("decode queue full, flushed {} pictures for idr", count)
            }
            Enqueued::Queued => {}
        }

        self.available.notify_one();

        result
    }

    /// Waits up to `timeout` for the next job. Returns `None` on timeout
    /// or once the queue is closed and drained.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<DecodeJob> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();

        loop {
            if let Some(job) = state.jobs.pop_front() {
                return Some(job);
            }

            if state.closed {
                return None;
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }

            state = self.available.wait_timeout(state, deadline - now).unwrap().0;
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discards the waiting jobs, returns how many there were
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        let count = state.jobs.len();
        state.jobs.clear();
        count
    }

    /// Rejects further jobs and wakes the consumer
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn stats(&self) -> QueueStats {
        self.state.lock().unwrap().stats.clone()
    }
}
