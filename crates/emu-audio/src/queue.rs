//! Latency-bounded chunk queue between the producer and the device writer thread.
//!
//! The queue is a bounded crossbeam channel of owned chunks plus an atomic count of queued
//! *samples*, so the current latency can be read without touching the channel. The producer
//! keeps a receiver handle too: that is how it sheds the oldest chunk when the queue runs over
//! its latency budget.
//!
//! ## Budget
//! - **target**: after an enqueue the policy drops one extra chunk if the backlog is more than
//!   one chunk above this.
//! - **hard limit**: enqueue drops oldest chunks until the incoming chunk fits under it.
//!
//! The sample counter is eventually consistent with the channel contents: it is raised before a
//! chunk is offered and lowered after a chunk is taken out, so it can briefly over-report
//! during a concurrent enqueue, but never drifts.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};

use crate::config::{CHANNELS, PipelineTuning};
use crate::pcm::PcmChunk;
use crate::status::OutputStats;

/// Queued-sample budget derived from the device rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatencyBudget {
    pub target_samples: usize,
    pub hard_limit_samples: usize,
}

/// Compute the queue budget in **samples** for a device running at `rate_hz`.
///
/// Neither limit drops below what a single chunk (target) or two chunks (hard limit) need.
pub fn latency_budget(rate_hz: u32, tuning: &PipelineTuning) -> LatencyBudget {
    let per_second = rate_hz as u64 * CHANNELS as u64;
    let by_target = (per_second * tuning.target_latency_ms as u64 / 1000) as usize;
    let by_hard = (per_second * tuning.hard_latency_ms as u64 / 1000) as usize;
    let floor = tuning.chunk_samples();
    LatencyBudget {
        target_samples: by_target.max(floor),
        hard_limit_samples: by_hard.max(floor * 2),
    }
}

/// Bounded FIFO of PCM chunks with latency-driven shedding.
pub struct LatencyQueue {
    tx: Sender<PcmChunk>,
    rx: Receiver<PcmChunk>,
    queued_samples: AtomicUsize,
    budget: LatencyBudget,
    sample_rate: u32,
    offer_timeout: Duration,
    stats: Arc<OutputStats>,
    shed_since_log: AtomicU64,
    last_shed_log_ms: AtomicU64,
}

impl LatencyQueue {
    /// Create a queue for a device running at `sample_rate`.
    pub fn new(sample_rate: u32, tuning: &PipelineTuning, stats: Arc<OutputStats>) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(tuning.queue_capacity.max(1));
        Self {
            tx,
            rx,
            queued_samples: AtomicUsize::new(0),
            budget: latency_budget(sample_rate, tuning),
            sample_rate,
            offer_timeout: tuning.offer_timeout,
            stats,
            shed_since_log: AtomicU64::new(0),
            last_shed_log_ms: AtomicU64::new(0),
        }
    }

    pub fn budget(&self) -> LatencyBudget {
        self.budget
    }

    /// Queued samples (best-effort snapshot).
    pub fn queued_samples(&self) -> usize {
        self.queued_samples.load(Ordering::Acquire)
    }

    /// Queued audio in milliseconds at the device rate.
    pub fn queued_latency_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        let frames = (self.queued_samples() / CHANNELS) as u64;
        frames * 1000 / self.sample_rate as u64
    }

    /// Number of queued chunks.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Queue `chunk`, shedding the oldest audio to respect the latency budget.
    ///
    /// Waits at most the configured offer timeout for a free slot; when the queue stays full the
    /// oldest chunk is dropped and the insert retried once without waiting. Returns `false` if
    /// the chunk could not be queued.
    pub fn enqueue(&self, chunk: PcmChunk) -> bool {
        let incoming = chunk.len();
        if incoming == 0 {
            return false;
        }
        self.trim_for_latency(incoming);

        self.queued_samples.fetch_add(incoming, Ordering::AcqRel);
        let offered = match self.tx.send_timeout(chunk, self.offer_timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(chunk)) => {
                self.drop_oldest();
                self.tx.try_send(chunk).map_err(|e| match e {
                    TrySendError::Full(_) => "queue full",
                    TrySendError::Disconnected(_) => "queue disconnected",
                })
            }
            Err(SendTimeoutError::Disconnected(_)) => Err("queue disconnected"),
        };

        match offered {
            Ok(()) => true,
            Err(reason) => {
                self.decrease_queued(incoming);
                tracing::debug!(samples = incoming, reason, "chunk not queued");
                false
            }
        }
    }

    /// Take the oldest chunk, waiting at most `timeout`.
    pub fn dequeue(&self, timeout: Duration) -> Option<PcmChunk> {
        match self.rx.recv_timeout(timeout) {
            Ok(chunk) => {
                self.decrease_queued(chunk.len());
                Some(chunk)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drop every queued chunk and zero the counter.
    pub fn clear(&self) -> usize {
        let mut drained = 0;
        while self.rx.try_recv().is_ok() {
            drained += 1;
        }
        self.queued_samples.store(0, Ordering::Release);
        drained
    }

    /// Drop the oldest queued chunk. Returns `false` when the queue was empty.
    pub fn drop_oldest(&self) -> bool {
        let Ok(dropped) = self.rx.try_recv() else {
            return false;
        };
        self.decrease_queued(dropped.len());
        OutputStats::add(&self.stats.dropped_chunks, 1);
        self.shed_since_log.fetch_add(1, Ordering::Relaxed);
        self.log_shedding();
        true
    }

    fn trim_for_latency(&self, incoming: usize) {
        while self.queued_samples() + incoming > self.budget.hard_limit_samples {
            if !self.drop_oldest() {
                break;
            }
        }

        if self.queued_samples() > self.budget.target_samples + incoming {
            self.drop_oldest();
        }
    }

    fn decrease_queued(&self, amount: usize) {
        let _ = self
            .queued_samples
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(amount))
            });
    }

    fn log_shedding(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_millis(0))
            .as_millis() as u64;
        let last = self.last_shed_log_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) > 1000 {
            self.last_shed_log_ms.store(now, Ordering::Relaxed);
            let dropped = self.shed_since_log.swap(0, Ordering::Relaxed);
            tracing::debug!(
                dropped_chunks = dropped,
                queued_samples = self.queued_samples(),
                target_samples = self.budget.target_samples,
                hard_limit_samples = self.budget.hard_limit_samples,
                "audio queue shedding"
            );
        }
    }
}
