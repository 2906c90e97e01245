use std::sync::atomic::{AtomicU64, Ordering};

use emu_audio_types::{OutputStatus, PlaybackState};

/// Counters shared by the producer path, the writer thread and the device callback.
#[derive(Debug, Default)]
pub struct OutputStats {
    pub dropped_chunks: AtomicU64,
    pub smoothed_boundaries: AtomicU64,
    pub written_frames: AtomicU64,
    pub write_failures: AtomicU64,
    /// Frames of silence the device emitted because its buffer ran dry.
    pub underrun_frames: AtomicU64,
    pub underrun_events: AtomicU64,
}

/// Queue gauges captured together with the counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueueGauge {
    pub queued_samples: u64,
    pub queued_ms: u64,
    pub target_samples: u64,
    pub hard_limit_samples: u64,
}

impl OutputStats {
    pub fn add(counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    /// Return a snapshot suitable for overlays and logs.
    pub fn snapshot(&self, state: PlaybackState, gauge: QueueGauge) -> OutputStatus {
        OutputStatus {
            state,
            queued_samples: gauge.queued_samples,
            queued_ms: gauge.queued_ms,
            target_samples: gauge.target_samples,
            hard_limit_samples: gauge.hard_limit_samples,
            dropped_chunks: self.dropped_chunks.load(Ordering::Relaxed),
            smoothed_boundaries: self.smoothed_boundaries.load(Ordering::Relaxed),
            written_frames: self.written_frames.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            underrun_frames: self.underrun_frames.load(Ordering::Relaxed),
            underrun_events: self.underrun_events.load(Ordering::Relaxed),
        }
    }
}
