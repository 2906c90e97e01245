//! Hardware sink abstraction.
//!
//! The controller drives the device only through [`AudioSink`]: configuration and lifecycle
//! calls come from the controller under its lock, and `write` is called from the writer
//! thread alone. Implementations use interior mutability so one `Arc<dyn AudioSink>` can be
//! shared by both.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};

/// Format the device actually accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkConfig {
    pub sample_rate: u32,
    /// Device buffer size in frames; at least the requested size unless the device caps it.
    pub buffer_frames: u32,
}

/// A fixed-rate, 16-bit stereo PCM output device.
pub trait AudioSink: Send + Sync {
    /// Open (or reopen) the device for 16-bit stereo PCM at `sample_rate`.
    fn configure(&self, sample_rate: u32, buffer_frames: u32) -> Result<SinkConfig>;
    fn play(&self) -> Result<()>;
    fn pause(&self) -> Result<()>;
    /// Discard any audio buffered inside the device.
    fn flush(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    /// Close the device. `configure` must be called again before further use.
    fn release(&self) -> Result<()>;
    /// Write interleaved samples, blocking while the device buffer is full.
    ///
    /// Returns the number of samples accepted, which may be fewer than offered. `Ok(0)` means
    /// the device is not accepting audio right now (paused, stopped or released).
    fn write(&self, samples: &[i16]) -> Result<usize>;
    /// Device-side volume in `0.0..=1.0`.
    fn set_volume(&self, volume: f32) -> Result<()>;
}

/// Lifecycle calls recorded by [`CaptureSink`].
#[derive(Clone, Debug, PartialEq)]
pub enum SinkEvent {
    Configure { sample_rate: u32, buffer_frames: u32 },
    Play,
    Pause,
    Flush,
    Stop,
    Release,
    Volume(f32),
}

#[derive(Debug, Default)]
struct CaptureInner {
    config: Option<SinkConfig>,
    playing: bool,
    events: Vec<SinkEvent>,
    written: Vec<i16>,
    volume: f32,
    reject_configure: bool,
    fail_writes: bool,
    max_write: Option<usize>,
    write_delay: Option<Duration>,
}

/// In-memory sink that records everything written to it.
///
/// Used for dry runs and as the device double in tests. It can be told to reject
/// configuration, fail writes, accept only partial writes, or pace writes like real hardware.
#[derive(Debug)]
pub struct CaptureSink {
    inner: Mutex<CaptureInner>,
    cv: Condvar,
}

impl Default for CaptureSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CaptureInner {
                volume: 1.0,
                ..CaptureInner::default()
            }),
            cv: Condvar::new(),
        }
    }

    /// Accept at most `samples` per write call.
    pub fn with_max_write(self, samples: usize) -> Self {
        self.lock().max_write = Some(samples.max(1));
        self
    }

    /// Sleep this long in every write call that accepts data.
    pub fn with_write_delay(self, delay: Duration) -> Self {
        self.lock().write_delay = Some(delay);
        self
    }

    pub fn set_reject_configure(&self, reject: bool) {
        self.lock().reject_configure = reject;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn config(&self) -> Option<SinkConfig> {
        self.lock().config
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.lock().events.clone()
    }

    pub fn written(&self) -> Vec<i16> {
        self.lock().written.clone()
    }

    pub fn written_len(&self) -> usize {
        self.lock().written.len()
    }

    pub fn volume(&self) -> f32 {
        self.lock().volume
    }

    /// Block until at least `samples` have been written or `timeout` elapses.
    pub fn wait_for_written(&self, samples: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut g = self.lock();
        while g.written.len() < samples {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            g = match self.cv.wait_timeout(g, deadline - now) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, CaptureInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, event: SinkEvent) {
        self.lock().events.push(event);
    }
}

impl AudioSink for CaptureSink {
    fn configure(&self, sample_rate: u32, buffer_frames: u32) -> Result<SinkConfig> {
        let mut g = self.lock();
        g.events.push(SinkEvent::Configure { sample_rate, buffer_frames });
        if g.reject_configure {
            return Err(anyhow!("capture sink rejected {sample_rate} Hz / {buffer_frames} frames"));
        }
        let cfg = SinkConfig { sample_rate, buffer_frames };
        g.config = Some(cfg);
        g.playing = false;
        Ok(cfg)
    }

    fn play(&self) -> Result<()> {
        let mut g = self.lock();
        if g.config.is_none() {
            return Err(anyhow!("capture sink is not configured"));
        }
        g.playing = true;
        g.events.push(SinkEvent::Play);
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        let mut g = self.lock();
        g.playing = false;
        g.events.push(SinkEvent::Pause);
        drop(g);
        self.cv.notify_all();
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.record(SinkEvent::Flush);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut g = self.lock();
        g.playing = false;
        g.events.push(SinkEvent::Stop);
        Ok(())
    }

    fn release(&self) -> Result<()> {
        let mut g = self.lock();
        g.playing = false;
        g.config = None;
        g.events.push(SinkEvent::Release);
        Ok(())
    }

    fn write(&self, samples: &[i16]) -> Result<usize> {
        let delay = {
            let g = self.lock();
            if g.fail_writes {
                return Err(anyhow!("capture sink write failure"));
            }
            if !g.playing || samples.is_empty() {
                return Ok(0);
            }
            g.write_delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut g = self.lock();
        if !g.playing {
            return Ok(0);
        }
        let take = g.max_write.map_or(samples.len(), |m| m.min(samples.len()));
        g.written.extend_from_slice(&samples[..take]);
        drop(g);
        self.cv.notify_all();
        Ok(take)
    }

    fn set_volume(&self, volume: f32) -> Result<()> {
        let mut g = self.lock();
        g.volume = volume;
        g.events.push(SinkEvent::Volume(volume));
        Ok(())
    }
}
