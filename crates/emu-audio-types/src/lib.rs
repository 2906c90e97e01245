use serde::{Deserialize, Serialize};

/// Lowest device sample rate accepted by the output (Hz).
pub const MIN_SAMPLE_RATE: u32 = 8_000;
/// Highest device sample rate accepted by the output (Hz).
pub const MAX_SAMPLE_RATE: u32 = 96_000;
/// Smallest device buffer accepted by the output (frames).
pub const MIN_BUFFER_FRAMES: u32 = 1_024;
/// Largest device buffer accepted by the output (frames).
pub const MAX_BUFFER_FRAMES: u32 = 65_536;
/// Default device sample rate (Hz).
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
/// Default device buffer size (frames).
pub const DEFAULT_BUFFER_FRAMES: u32 = 8_192;
/// Default strength of the smoothing filter (percent).
pub const DEFAULT_FILTER_LEVEL: u8 = 60;

/// Hardware sink configuration: fixed output rate plus device buffer size.
///
/// Changing either field requires the device to be reconfigured.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Requested device buffer size in frames.
    pub buffer_frames: u32,
}

impl DeviceConfig {
    /// Build a config with both values forced into their supported ranges.
    pub fn clamped(sample_rate: u32, buffer_frames: u32) -> Self {
        Self {
            sample_rate: sample_rate.clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE),
            buffer_frames: buffer_frames.clamp(MIN_BUFFER_FRAMES, MAX_BUFFER_FRAMES),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
        }
    }
}

/// Lifecycle state of the audio output.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum PlaybackState {
    /// No device is open.
    #[default]
    Uninitialized,
    /// Device configured, writer thread idle.
    Initialized(DeviceConfig),
    /// Writer thread is draining the queue into the device.
    Playing(DeviceConfig),
    /// Device open but paused; queued audio is kept.
    Paused(DeviceConfig),
}

impl PlaybackState {
    /// Device configuration for every state that holds an open device.
    pub fn device_config(&self) -> Option<DeviceConfig> {
        match self {
            PlaybackState::Uninitialized => None,
            PlaybackState::Initialized(cfg)
            | PlaybackState::Playing(cfg)
            | PlaybackState::Paused(cfg) => Some(*cfg),
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing(_))
    }
}

/// User-facing audio settings consumed by the output.
///
/// Persisted by the settings layer; every field falls back to its default when absent.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioSettings {
    /// Device sample rate in Hz.
    pub sample_rate: u32,
    /// Device buffer size in frames.
    pub buffer_frames: u32,
    /// Master volume in `0.0..=1.0`.
    pub volume: f32,
    /// Whether audio is produced at all.
    pub audio_enabled: bool,
    /// Whether the post-resample smoothing filter is active.
    pub filter_enabled: bool,
    /// Smoothing filter strength, `0..=100` (higher is smoother).
    pub filter_level: u8,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            volume: 1.0,
            audio_enabled: true,
            filter_enabled: true,
            filter_level: DEFAULT_FILTER_LEVEL,
        }
    }
}

impl AudioSettings {
    /// Return a copy with every value clamped into its supported range.
    pub fn sanitized(&self) -> Self {
        let device = DeviceConfig::clamped(self.sample_rate, self.buffer_frames);
        let volume = if self.volume.is_finite() {
            self.volume.clamp(0.0, 1.0)
        } else {
            1.0
        };
        Self {
            sample_rate: device.sample_rate,
            buffer_frames: device.buffer_frames,
            volume,
            audio_enabled: self.audio_enabled,
            filter_enabled: self.filter_enabled,
            filter_level: self.filter_level.min(100),
        }
    }

    /// Device part of the settings, clamped.
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig::clamped(self.sample_rate, self.buffer_frames)
    }
}

/// Point-in-time view of the output pipeline, suitable for overlays and logs.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputStatus {
    /// Current lifecycle state.
    pub state: PlaybackState,
    /// Samples (not frames) currently waiting in the latency queue.
    pub queued_samples: u64,
    /// Queued audio expressed in milliseconds at the device rate.
    pub queued_ms: u64,
    /// Queue size the shedding policy steers toward (samples).
    pub target_samples: u64,
    /// Queue size that is never exceeded after an enqueue (samples).
    pub hard_limit_samples: u64,
    /// Chunks dropped to keep latency bounded.
    pub dropped_chunks: u64,
    /// Chunk boundaries that were ramped to hide a discontinuity.
    pub smoothed_boundaries: u64,
    /// Frames handed to the device.
    pub written_frames: u64,
    /// Device writes that failed or returned nothing.
    pub write_failures: u64,
    /// Frames of silence emitted by the device because nothing was queued.
    pub underrun_frames: u64,
    /// Number of device callbacks that hit an underrun.
    pub underrun_events: u64,
}
