//! Playback controller.
//!
//! [`AudioOutput`] owns the processing chain, the latency queue and a single writer thread,
//! and drives an [`AudioSink`] through its lifecycle:
//!
//! ```text
//! Uninitialized --init--> Initialized --start/resume--> Playing --pause--> Paused
//!                              ^                           |                 |
//!                              +----------- stop ----------+-----------------+
//! any initialized state --cleanup--> Uninitialized
//! ```
//!
//! Public operations take one coarse lock. The writer thread never takes it: it only reads the
//! `playing` flag, dequeues chunks and performs the blocking device write, so `stop`, `pause`
//! and `cleanup` can join it while holding the lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use emu_audio_types::{AudioSettings, DeviceConfig, OutputStatus, PlaybackState};

use crate::config::PipelineTuning;
use crate::pcm;
use crate::pipeline::{FilterSettings, ProcessingChain};
use crate::queue::LatencyQueue;
use crate::sink::AudioSink;
use crate::status::{OutputStats, QueueGauge};

/// State shared with the writer thread.
struct Shared {
    sink: Arc<dyn AudioSink>,
    stats: Arc<OutputStats>,
    playing: AtomicBool,
}

struct Inner {
    state: PlaybackState,
    volume: f32,
    audio_enabled: bool,
    filter: FilterSettings,
    chain: ProcessingChain,
    queue: Option<Arc<LatencyQueue>>,
    writer: Option<JoinHandle<()>>,
}

/// Real-time audio output for an emulator core.
///
/// The producer calls [`AudioOutput::submit`] once per emulated block; everything up to the
/// queue runs synchronously on the producer thread and never waits on the device.
pub struct AudioOutput {
    tuning: PipelineTuning,
    shared: Arc<Shared>,
    inner: Mutex<Inner>,
}

impl AudioOutput {
    pub fn new(sink: Arc<dyn AudioSink>, tuning: PipelineTuning) -> Self {
        Self::with_stats(sink, tuning, Arc::new(OutputStats::default()))
    }

    /// Create a controller that reports into `stats`, which may be shared with the sink.
    pub fn with_stats(
        sink: Arc<dyn AudioSink>,
        tuning: PipelineTuning,
        stats: Arc<OutputStats>,
    ) -> Self {
        let chain = ProcessingChain::new(&tuning);
        Self {
            shared: Arc::new(Shared {
                sink,
                stats,
                playing: AtomicBool::new(false),
            }),
            inner: Mutex::new(Inner {
                state: PlaybackState::Uninitialized,
                volume: 1.0,
                audio_enabled: true,
                filter: FilterSettings {
                    enabled: true,
                    level: emu_audio_types::DEFAULT_FILTER_LEVEL,
                },
                chain,
                queue: None,
                writer: None,
            }),
            tuning,
        }
    }

    pub fn stats(&self) -> Arc<OutputStats> {
        self.shared.stats.clone()
    }

    /// Open the device at `sample_rate` with a buffer of at least `buffer_frames`.
    ///
    /// Both values are clamped to the supported ranges. Re-initialising with the current
    /// configuration is a no-op in any initialized state; a different configuration tears
    /// the device down first. Returns `false` if the sink rejects the configuration.
    pub fn init(&self, sample_rate: u32, buffer_frames: u32) -> bool {
        let mut inner = self.lock();
        self.init_locked(&mut inner, DeviceConfig::clamped(sample_rate, buffer_frames))
    }

    pub fn start(&self) -> bool {
        let mut inner = self.lock();
        self.start_locked(&mut inner)
    }

    pub fn resume(&self) -> bool {
        let mut inner = self.lock();
        self.start_locked(&mut inner)
    }

    /// Stop the writer but keep the device open and the queued audio in place.
    pub fn pause(&self) -> bool {
        let mut inner = self.lock();
        let PlaybackState::Playing(cfg) = inner.state else {
            return false;
        };
        self.stop_writer(&mut inner);
        inner.state = PlaybackState::Paused(cfg);
        tracing::info!("playback paused");
        true
    }

    /// Stop playback, drop queued audio and flush the device. Ends in `Initialized`.
    pub fn stop(&self) -> bool {
        let mut inner = self.lock();
        let Some(cfg) = inner.state.device_config() else {
            return false;
        };
        self.stop_writer(&mut inner);
        self.drain(&mut inner);
        if let Err(e) = self.shared.sink.stop() {
            tracing::warn!("device stop failed: {e:#}");
        }
        inner.state = PlaybackState::Initialized(cfg);
        tracing::info!("playback stopped");
        true
    }

    /// Release the device. Ends in `Uninitialized`.
    pub fn cleanup(&self) -> bool {
        let mut inner = self.lock();
        self.cleanup_locked(&mut inner)
    }

    /// Process one producer block and queue it for playback.
    ///
    /// `samples` is interleaved stereo at `source_rate`, which may change between calls.
    /// Returns `true` if any audio was queued.
    pub fn submit(&self, samples: &[i16], source_rate: i32) -> bool {
        let mut inner = self.lock();
        let Some(cfg) = inner.state.device_config() else {
            return false;
        };
        if !inner.audio_enabled || samples.is_empty() {
            return false;
        }
        let Some(queue) = inner.queue.clone() else {
            return false;
        };

        let (volume, filter) = (inner.volume, inner.filter);
        let processed = inner
            .chain
            .process(samples, source_rate, cfg.sample_rate, volume, filter);

        let mut queued = false;
        for chunk in inner.chain.split(&processed) {
            if !inner.chain.enqueue(chunk, &queue, &self.shared.stats) {
                continue;
            }
            queued = true;
            if self.tuning.auto_start && matches!(inner.state, PlaybackState::Initialized(_)) {
                self.start_locked(&mut inner);
            }
        }
        queued
    }

    /// Drop queued audio, reset the DSP state and flush the device.
    pub fn clear(&self) {
        let mut inner = self.lock();
        if inner.state.device_config().is_some() {
            self.drain(&mut inner);
        }
    }

    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            1.0
        };
        let mut inner = self.lock();
        inner.volume = volume;
        if inner.state.device_config().is_some() {
            if let Err(e) = self.shared.sink.set_volume(volume) {
                tracing::warn!("device volume update failed: {e:#}");
            }
        }
    }

    pub fn volume(&self) -> f32 {
        self.lock().volume
    }

    pub fn set_filter_config(&self, enabled: bool, level: u8) {
        let mut inner = self.lock();
        inner.filter = FilterSettings {
            enabled,
            level: level.min(100),
        };
        if !enabled {
            inner.chain.reset_filter();
        }
    }

    /// Enable or disable audio output. Disabling drops queued audio and pauses playback.
    pub fn set_audio_enabled(&self, enabled: bool) {
        let mut inner = self.lock();
        if inner.audio_enabled == enabled {
            return;
        }
        inner.audio_enabled = enabled;
        tracing::info!(enabled, "audio output toggled");
        if enabled {
            return;
        }
        if let Some(queue) = &inner.queue {
            queue.clear();
        }
        inner.chain.reset();
        if let PlaybackState::Playing(cfg) = inner.state {
            self.stop_writer(&mut inner);
            inner.state = PlaybackState::Paused(cfg);
        }
    }

    pub fn is_audio_enabled(&self) -> bool {
        self.lock().audio_enabled
    }

    /// Apply a full settings value.
    ///
    /// The device is re-initialised only when its rate or buffer size changed; playback that
    /// was running before a re-initialisation is restarted.
    pub fn apply_settings(&self, settings: &AudioSettings) -> bool {
        let settings = settings.sanitized();
        self.set_volume(settings.volume);
        self.set_filter_config(settings.filter_enabled, settings.filter_level);
        self.set_audio_enabled(settings.audio_enabled);

        let mut inner = self.lock();
        let wanted = settings.device_config();
        if inner.state.device_config() == Some(wanted) {
            return true;
        }
        let was_playing = inner.state.is_playing();
        if !self.init_locked(&mut inner, wanted) {
            return false;
        }
        if was_playing {
            self.start_locked(&mut inner);
        }
        true
    }

    pub fn state(&self) -> PlaybackState {
        self.lock().state
    }

    pub fn is_playing(&self) -> bool {
        self.lock().state.is_playing()
    }

    /// Samples currently queued (best-effort snapshot).
    pub fn queued_samples(&self) -> usize {
        self.queue().map_or(0, |q| q.queued_samples())
    }

    pub fn queued_latency_ms(&self) -> u64 {
        self.queue().map_or(0, |q| q.queued_latency_ms())
    }

    pub fn queued_chunks(&self) -> usize {
        self.queue().map_or(0, |q| q.len())
    }

    pub fn status(&self) -> OutputStatus {
        let inner = self.lock();
        let gauge = inner.queue.as_ref().map_or_else(QueueGauge::default, |q| {
            let budget = q.budget();
            QueueGauge {
                queued_samples: q.queued_samples() as u64,
                queued_ms: q.queued_latency_ms(),
                target_samples: budget.target_samples as u64,
                hard_limit_samples: budget.hard_limit_samples as u64,
            }
        });
        self.shared.stats.snapshot(inner.state, gauge)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn queue(&self) -> Option<Arc<LatencyQueue>> {
        self.lock().queue.clone()
    }

    fn init_locked(&self, inner: &mut Inner, cfg: DeviceConfig) -> bool {
        match inner.state {
            PlaybackState::Initialized(current)
            | PlaybackState::Playing(current)
            | PlaybackState::Paused(current)
                if current == cfg =>
            {
                return true;
            }
            PlaybackState::Uninitialized => {}
            _ => {
                self.cleanup_locked(inner);
            }
        }

        let accepted = match self.shared.sink.configure(cfg.sample_rate, cfg.buffer_frames) {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!(
                    rate_hz = cfg.sample_rate,
                    buffer_frames = cfg.buffer_frames,
                    "audio device configuration failed: {e:#}"
                );
                return false;
            }
        };

        inner.queue = Some(Arc::new(LatencyQueue::new(
            cfg.sample_rate,
            &self.tuning,
            self.shared.stats.clone(),
        )));
        inner.chain.reset();
        if let Err(e) = self.shared.sink.set_volume(inner.volume) {
            tracing::warn!("device volume update failed: {e:#}");
        }
        inner.state = PlaybackState::Initialized(cfg);
        tracing::info!(
            rate_hz = cfg.sample_rate,
            buffer_frames = cfg.buffer_frames,
            device_buffer_frames = accepted.buffer_frames,
            "audio output initialized"
        );
        true
    }

    fn start_locked(&self, inner: &mut Inner) -> bool {
        let cfg = match inner.state {
            PlaybackState::Uninitialized => return false,
            PlaybackState::Playing(_) => return self.ensure_writer(inner),
            PlaybackState::Initialized(cfg) | PlaybackState::Paused(cfg) => cfg,
        };
        if !inner.audio_enabled {
            tracing::debug!("start ignored: audio disabled");
            return false;
        }
        if let Err(e) = self.shared.sink.play() {
            tracing::error!("audio device failed to start: {e:#}");
            return false;
        }
        self.shared.playing.store(true, Ordering::Release);
        if !self.ensure_writer(inner) {
            self.shared.playing.store(false, Ordering::Release);
            if let Err(e) = self.shared.sink.pause() {
                tracing::warn!("device pause failed: {e:#}");
            }
            return false;
        }
        inner.state = PlaybackState::Playing(cfg);
        tracing::info!(rate_hz = cfg.sample_rate, "playback started");
        true
    }

    /// Spawn the writer thread unless one is already running.
    fn ensure_writer(&self, inner: &mut Inner) -> bool {
        if inner.writer.as_ref().is_some_and(|h| !h.is_finished()) {
            return true;
        }
        if let Some(done) = inner.writer.take() {
            let _ = done.join();
        }
        let Some(queue) = inner.queue.clone() else {
            return false;
        };
        let shared = self.shared.clone();
        let poll = self.tuning.poll_timeout;
        match thread::Builder::new()
            .name("audio-writer".to_string())
            .spawn(move || run_writer(&queue, &shared, poll))
        {
            Ok(handle) => {
                inner.writer = Some(handle);
                true
            }
            Err(e) => {
                tracing::error!("failed to spawn audio writer: {e}");
                false
            }
        }
    }

    /// Clear `playing`, unblock the device write and join the writer.
    fn stop_writer(&self, inner: &mut Inner) {
        if self.shared.playing.swap(false, Ordering::AcqRel) {
            if let Err(e) = self.shared.sink.pause() {
                tracing::warn!("device pause failed: {e:#}");
            }
        }
        if let Some(handle) = inner.writer.take() {
            if handle.join().is_err() {
                tracing::error!("audio writer thread panicked");
            }
        }
    }

    fn drain(&self, inner: &mut Inner) {
        if let Some(queue) = &inner.queue {
            let dropped = queue.clear();
            tracing::debug!(chunks = dropped, "queue cleared");
        }
        inner.chain.reset();
        if let Err(e) = self.shared.sink.flush() {
            tracing::warn!("device flush failed: {e:#}");
        }
    }

    fn cleanup_locked(&self, inner: &mut Inner) -> bool {
        if inner.state == PlaybackState::Uninitialized {
            return false;
        }
        self.stop_writer(inner);
        if let Some(queue) = inner.queue.take() {
            queue.clear();
        }
        inner.chain.reset();
        if let Err(e) = self.shared.sink.release() {
            tracing::warn!("device release failed: {e:#}");
        }
        inner.state = PlaybackState::Uninitialized;
        tracing::info!("audio output released");
        true
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        let mut inner = self.lock();
        self.cleanup_locked(&mut inner);
    }
}

fn run_writer(queue: &LatencyQueue, shared: &Shared, poll: Duration) {
    tracing::debug!("audio writer started");
    while shared.playing.load(Ordering::Acquire) {
        if let Some(chunk) = queue.dequeue(poll) {
            write_chunk(shared, &chunk);
        }
    }
    tracing::debug!("audio writer stopped");
}

/// Write `chunk` to the device, looping over partial writes.
///
/// A failed or empty write abandons the rest of the chunk. Failures seen after playback was
/// stopped are shutdown, not errors.
fn write_chunk(shared: &Shared, chunk: &[i16]) {
    let mut offset = 0;
    while offset < chunk.len() && shared.playing.load(Ordering::Acquire) {
        match shared.sink.write(&chunk[offset..]) {
            Ok(0) => {
                if shared.playing.load(Ordering::Acquire) {
                    OutputStats::add(&shared.stats.write_failures, 1);
                    tracing::warn!(remaining = chunk.len() - offset, "device accepted no audio");
                }
                break;
            }
            Ok(n) => offset += n,
            Err(e) => {
                if shared.playing.load(Ordering::Acquire) {
                    OutputStats::add(&shared.stats.write_failures, 1);
                    tracing::warn!("device write failed: {e:#}");
                }
                break;
            }
        }
    }
    OutputStats::add(
        &shared.stats.written_frames,
        pcm::frame_count(&chunk[..offset]) as u64,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{CaptureSink, SinkEvent};
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(5);

    fn manual() -> PipelineTuning {
        PipelineTuning {
            auto_start: false,
            ..PipelineTuning::default()
        }
    }

    fn output(tuning: PipelineTuning) -> (Arc<CaptureSink>, AudioOutput) {
        let sink = Arc::new(CaptureSink::new());
        let out = AudioOutput::new(sink.clone(), tuning);
        (sink, out)
    }

    fn ramp(frames: usize) -> Vec<i16> {
        (0..frames)
            .flat_map(|i| {
                let s = ((i % 200) as i16) * 10;
                [s, -s]
            })
            .collect()
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn uninitialized_operations_are_noops() {
        let (sink, out) = output(manual());
        assert!(!out.start());
        assert!(!out.resume());
        assert!(!out.pause());
        assert!(!out.stop());
        assert!(!out.cleanup());
        assert!(!out.submit(&ramp(100), 44_100));
        assert_eq!(out.state(), PlaybackState::Uninitialized);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn init_clamps_and_configures_sink() {
        let (sink, out) = output(manual());
        assert!(out.init(200_000, 10));
        let cfg = DeviceConfig {
            sample_rate: 96_000,
            buffer_frames: 1_024,
        };
        assert_eq!(out.state(), PlaybackState::Initialized(cfg));
        assert_eq!(sink.config().map(|c| c.sample_rate), Some(96_000));
    }

    #[test]
    fn reinit_with_same_config_is_noop() {
        let (sink, out) = output(manual());
        assert!(out.init(44_100, 8_192));
        assert!(out.init(44_100, 8_192));
        let configures = sink
            .events()
            .iter()
            .filter(|e| matches!(e, SinkEvent::Configure { .. }))
            .count();
        assert_eq!(configures, 1);
    }

    #[test]
    fn reinit_with_new_config_releases_first() {
        let (sink, out) = output(manual());
        assert!(out.init(44_100, 8_192));
        assert!(out.init(48_000, 4_096));
        let events = sink.events();
        let release = events.iter().position(|e| *e == SinkEvent::Release);
        let second = events.iter().rposition(|e| {
            *e == SinkEvent::Configure {
                sample_rate: 48_000,
                buffer_frames: 4_096,
            }
        });
        assert!(release.is_some() && release < second);
        assert_eq!(out.state().device_config().map(|c| c.sample_rate), Some(48_000));
    }

    #[test]
    fn reinit_with_same_config_keeps_paused_output() {
        let (sink, out) = output(manual());
        assert!(out.init(44_100, 8_192));
        assert!(out.start());
        assert!(out.pause());
        assert!(out.submit(&ramp(640), 44_100));
        let queued = out.queued_samples();
        assert_eq!(queued, 1_280);

        assert!(out.init(44_100, 8_192));
        assert!(matches!(out.state(), PlaybackState::Paused(_)));
        assert_eq!(out.queued_samples(), queued);
        let configures = sink
            .events()
            .iter()
            .filter(|e| matches!(e, SinkEvent::Configure { .. }))
            .count();
        assert_eq!(configures, 1);
    }

    #[test]
    fn rejected_configuration_leaves_state_unchanged() {
        let (sink, out) = output(manual());
        sink.set_reject_configure(true);
        assert!(!out.init(44_100, 8_192));
        assert_eq!(out.state(), PlaybackState::Uninitialized);
        assert!(!out.start());
    }

    #[test]
    fn pause_resume_and_stop_follow_the_state_machine() {
        let (sink, out) = output(manual());
        assert!(out.init(44_100, 8_192));
        let cfg = out.state().device_config().unwrap();

        assert!(!out.pause());
        assert!(out.start());
        assert_eq!(out.state(), PlaybackState::Playing(cfg));
        assert!(sink.is_playing());

        assert!(out.pause());
        assert_eq!(out.state(), PlaybackState::Paused(cfg));
        assert!(!sink.is_playing());

        assert!(out.resume());
        assert_eq!(out.state(), PlaybackState::Playing(cfg));

        assert!(out.stop());
        assert_eq!(out.state(), PlaybackState::Initialized(cfg));
        let events = sink.events();
        assert!(events.contains(&SinkEvent::Flush));
        assert!(events.contains(&SinkEvent::Stop));

        assert!(out.cleanup());
        assert_eq!(out.state(), PlaybackState::Uninitialized);
        assert_eq!(sink.events().last(), Some(&SinkEvent::Release));
    }

    #[test]
    fn stop_from_paused_returns_to_initialized() {
        let (_sink, out) = output(manual());
        assert!(out.init(44_100, 8_192));
        assert!(out.start());
        assert!(out.pause());
        assert!(out.stop());
        assert!(matches!(out.state(), PlaybackState::Initialized(_)));
    }

    #[test]
    fn submit_queues_resampled_chunks() {
        let (_sink, out) = output(manual());
        out.set_filter_config(false, 0);
        assert!(out.init(44_100, 8_192));

        assert!(out.submit(&ramp(1_000), 32_768));
        // 999 source intervals at step 32768/44100.
        assert_eq!(out.queued_samples(), 2 * 1_345);
        assert_eq!(out.queued_chunks(), 3);
        assert_eq!(out.queued_latency_ms(), 1_345 * 1_000 / 44_100);
        assert!(matches!(out.state(), PlaybackState::Initialized(_)));
    }

    #[test]
    fn flooding_without_consumer_respects_hard_limit() {
        let (_sink, out) = output(manual());
        assert!(out.init(44_100, 8_192));
        for _ in 0..40 {
            out.submit(&ramp(640), 44_100);
            let status = out.status();
            assert!(status.queued_samples <= status.hard_limit_samples);
        }
        // Steady state: the target check sheds one chunk per submit above 7 chunks.
        let status = out.status();
        assert_eq!(status.hard_limit_samples, 12_789);
        assert_eq!(status.queued_samples, 7 * 1_280);
        assert_eq!(out.queued_chunks(), 7);
        assert_eq!(status.dropped_chunks, 33);
    }

    #[test]
    fn writer_plays_queued_audio_in_order() {
        let (sink, out) = output(manual());
        out.set_filter_config(false, 0);
        assert!(out.init(44_100, 8_192));
        let input = ramp(1_500);
        assert!(out.submit(&input, 44_100));
        assert!(out.start());

        assert!(sink.wait_for_written(input.len(), WAIT));
        assert_eq!(sink.written(), input);
        assert!(wait_until(|| out.status().written_frames == 1_500));
        assert!(out.stop());
    }

    #[test]
    fn partial_writes_are_completed() {
        let sink = Arc::new(CaptureSink::new().with_max_write(97));
        let out = AudioOutput::new(sink.clone(), manual());
        out.set_filter_config(false, 0);
        assert!(out.init(44_100, 8_192));
        assert!(out.start());

        let input = ramp(640);
        assert!(out.submit(&input, 44_100));
        assert!(sink.wait_for_written(input.len(), WAIT));
        assert_eq!(sink.written(), input);
        assert_eq!(out.status().write_failures, 0);
    }

    #[test]
    fn pause_returns_while_device_is_slow() {
        let sink = Arc::new(CaptureSink::new().with_write_delay(Duration::from_millis(5)));
        let out = AudioOutput::new(sink.clone(), manual());
        assert!(out.init(44_100, 8_192));
        for _ in 0..8 {
            out.submit(&ramp(640), 44_100);
        }
        assert!(out.start());
        assert!(sink.wait_for_written(1, WAIT));

        assert!(out.pause());
        let written = sink.written_len();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(sink.written_len(), written);
        assert!(out.queued_chunks() > 0);
    }

    #[test]
    fn write_failures_are_counted_and_playback_continues() {
        let (sink, out) = output(manual());
        assert!(out.init(44_100, 8_192));
        assert!(out.start());
        sink.set_fail_writes(true);

        assert!(out.submit(&ramp(640), 44_100));
        assert!(wait_until(|| out.status().write_failures >= 1));
        assert!(out.is_playing());

        sink.set_fail_writes(false);
        assert!(out.submit(&ramp(640), 44_100));
        assert!(sink.wait_for_written(1, WAIT));
    }

    #[test]
    fn auto_start_begins_playback_on_first_submit() {
        let (sink, out) = output(PipelineTuning::default());
        assert!(out.init(44_100, 8_192));
        assert!(out.submit(&ramp(640), 44_100));
        assert!(out.is_playing());
        assert!(sink.wait_for_written(1, WAIT));
    }

    #[test]
    fn auto_start_does_not_resume_paused_output() {
        let (_sink, out) = output(PipelineTuning::default());
        assert!(out.init(44_100, 8_192));
        assert!(out.start());
        assert!(out.pause());
        assert!(out.submit(&ramp(640), 44_100));
        assert!(matches!(out.state(), PlaybackState::Paused(_)));
    }

    #[test]
    fn disabling_audio_clears_and_pauses() {
        let (_sink, out) = output(manual());
        assert!(out.init(44_100, 8_192));
        assert!(out.submit(&ramp(640), 44_100));
        assert!(out.start());

        out.set_audio_enabled(false);
        assert!(!out.is_audio_enabled());
        assert!(matches!(out.state(), PlaybackState::Paused(_)));
        assert_eq!(out.queued_samples(), 0);
        assert!(!out.submit(&ramp(640), 44_100));
        assert!(!out.resume());

        out.set_audio_enabled(true);
        assert!(out.resume());
    }

    /// Submit silence at 32 kHz, run `between`, then submit a block that jumps well past the
    /// smoothing threshold. Returns the first queued frame of the second block and the
    /// smoothing count.
    fn head_after(between: impl FnOnce(&AudioOutput)) -> ((i16, i16), u64) {
        let (_sink, out) = output(manual());
        assert!(out.init(44_100, 8_192));
        assert!(out.submit(&vec![0; 2_000], 32_000));
        between(&out);

        let jump: Vec<i16> = (0..1_000).flat_map(|_| [12_000, -12_000]).collect();
        assert!(out.submit(&jump, 32_000));
        let queue = out.lock().queue.clone().unwrap();
        if out.queued_chunks() > 3 {
            // Nothing was cleared: skip the chunks of the first block.
            for _ in 0..3 {
                queue.dequeue(Duration::from_millis(1)).unwrap();
            }
        }
        let chunk = queue.dequeue(Duration::from_millis(1)).unwrap();
        ((chunk[0], chunk[1]), out.status().smoothed_boundaries)
    }

    #[test]
    fn continuing_stream_carries_dsp_state() {
        let (head, _) = head_after(|_| {});
        assert_ne!(head, (12_000, -12_000));
    }

    #[test]
    fn stop_resets_dsp_state() {
        let (head, smoothed) = head_after(|out| assert!(out.stop()));
        assert_eq!(head, (12_000, -12_000));
        assert_eq!(smoothed, 0);
    }

    #[test]
    fn clear_resets_dsp_state() {
        let (head, smoothed) = head_after(|out| out.clear());
        assert_eq!(head, (12_000, -12_000));
        assert_eq!(smoothed, 0);
    }

    #[test]
    fn disabling_audio_resets_dsp_state() {
        let (head, smoothed) = head_after(|out| {
            out.set_audio_enabled(false);
            out.set_audio_enabled(true);
        });
        assert_eq!(head, (12_000, -12_000));
        assert_eq!(smoothed, 0);
    }

    #[test]
    fn volume_is_clamped_and_forwarded() {
        let (sink, out) = output(manual());
        out.set_volume(0.25);
        assert!(out.init(44_100, 8_192));
        assert_eq!(sink.volume(), 0.25);
        out.set_volume(3.0);
        assert_eq!(out.volume(), 1.0);
        assert_eq!(sink.volume(), 1.0);
    }

    #[test]
    fn clear_drops_queue_and_flushes() {
        let (sink, out) = output(manual());
        assert!(out.init(44_100, 8_192));
        assert!(out.submit(&ramp(1_000), 22_050));
        assert!(out.queued_samples() > 0);
        out.clear();
        assert_eq!(out.queued_samples(), 0);
        assert_eq!(sink.events().last(), Some(&SinkEvent::Flush));
    }

    #[test]
    fn apply_settings_reinitializes_only_on_device_change() {
        let (sink, out) = output(manual());
        let mut settings = AudioSettings::default();
        assert!(out.apply_settings(&settings));
        assert!(out.start());

        settings.volume = 0.5;
        assert!(out.apply_settings(&settings));
        assert_eq!(sink.volume(), 0.5);
        assert!(out.is_playing());

        settings.sample_rate = 48_000;
        assert!(out.apply_settings(&settings));
        assert!(out.is_playing());
        assert_eq!(sink.config().map(|c| c.sample_rate), Some(48_000));
        let configures = sink
            .events()
            .iter()
            .filter(|e| matches!(e, SinkEvent::Configure { .. }))
            .count();
        assert_eq!(configures, 2);
    }

    #[test]
    fn drop_releases_the_device() {
        let (sink, out) = output(manual());
        assert!(out.init(44_100, 8_192));
        assert!(out.start());
        drop(out);
        assert_eq!(sink.events().last(), Some(&SinkEvent::Release));
        assert!(sink.config().is_none());
    }
}
