use std::time::Duration;

pub use emu_audio_types::{
    DEFAULT_BUFFER_FRAMES, DEFAULT_SAMPLE_RATE, MAX_BUFFER_FRAMES, MAX_SAMPLE_RATE,
    MIN_BUFFER_FRAMES, MIN_SAMPLE_RATE,
};

/// Output is always interleaved stereo.
pub const CHANNELS: usize = 2;

/// Tuning parameters shared by the resample/smooth/queue/writer stages.
#[derive(Clone, Debug)]
pub struct PipelineTuning {
    /// Frames per queued chunk.
    pub chunk_frames: usize,
    /// Max chunks held by the latency queue.
    pub queue_capacity: usize,
    /// Queue latency the shedding policy steers toward.
    pub target_latency_ms: u32,
    /// Queue latency that is never exceeded after an enqueue.
    pub hard_latency_ms: u32,
    /// Length of the crossfade ramp applied at a discontinuous chunk boundary.
    pub smooth_frames: usize,
    /// Per-channel amplitude jump that triggers the ramp.
    pub smooth_threshold: i32,
    /// Bounded wait for a free queue slot on enqueue.
    pub offer_timeout: Duration,
    /// Writer thread poll interval on an empty queue.
    pub poll_timeout: Duration,
    /// Start playback automatically once audio is first submitted after `init`.
    pub auto_start: bool,
}

impl Default for PipelineTuning {
    /// Defaults tuned for ~85 ms of queued audio with a 145 ms ceiling.
    fn default() -> Self {
        Self {
            chunk_frames: 640,
            queue_capacity: 32,
            target_latency_ms: 85,
            hard_latency_ms: 145,
            smooth_frames: 24,
            smooth_threshold: 8_000,
            offer_timeout: Duration::from_millis(2),
            poll_timeout: Duration::from_millis(2),
            auto_start: true,
        }
    }
}

impl PipelineTuning {
    /// Samples (not frames) in one full chunk.
    pub fn chunk_samples(&self) -> usize {
        self.chunk_frames.max(1) * CHANNELS
    }
}
