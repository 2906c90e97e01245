//! CPAL-backed [`AudioSink`].
//!
//! CPAL pulls audio from a real-time callback, while the controller's writer thread pushes
//! with a blocking write. [`DeviceRing`] sits between them: a bounded FIFO of `i16` samples
//! sized to the configured device buffer. `write` blocks while the ring is full, which gives
//! the writer thread the device's backpressure; the callback drains it without waiting and
//! fills any shortfall with silence.
//!
//! The `cpal::Stream` is created and dropped on a dedicated device thread because streams are
//! not `Send` on every platform. Lifecycle calls reach that thread over a command channel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Sender, bounded, unbounded};

use crate::config::CHANNELS;
use crate::device;
use crate::pcm::clip_f32;
use crate::sink::{AudioSink, SinkConfig};
use crate::status::OutputStats;

/// How long a blocked write sleeps before re-checking whether the ring still accepts audio.
const WRITE_WAIT: Duration = Duration::from_millis(20);

/// Bounded sample FIFO shared by the writer thread and the CPAL callback.
struct DeviceRing {
    inner: Mutex<RingInner>,
    cv: Condvar,
}

struct RingInner {
    queue: VecDeque<i16>,
    capacity: usize,
    accepting: bool,
}

impl DeviceRing {
    fn new() -> Self {
        Self {
            inner: Mutex::new(RingInner {
                queue: VecDeque::new(),
                capacity: 0,
                accepting: false,
            }),
            cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RingInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn reset(&self, capacity: usize) {
        let mut g = self.lock();
        g.queue.clear();
        g.queue.reserve(capacity);
        g.capacity = capacity;
        g.accepting = false;
        drop(g);
        self.cv.notify_all();
    }

    fn set_accepting(&self, accepting: bool) {
        self.lock().accepting = accepting;
        self.cv.notify_all();
    }

    fn clear(&self) {
        self.lock().queue.clear();
        self.cv.notify_all();
    }

    /// Push as many samples as fit, waiting while the ring is full.
    ///
    /// Returns 0 once the ring stops accepting audio.
    fn push_blocking(&self, samples: &[i16]) -> usize {
        let mut g = self.lock();
        while g.accepting && g.queue.len() >= g.capacity {
            g = match self.cv.wait_timeout(g, WRITE_WAIT) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        if !g.accepting {
            return 0;
        }
        let take = (g.capacity - g.queue.len()).min(samples.len());
        g.queue.extend(&samples[..take]);
        take
    }

    /// Move up to `out.len()` samples into `out` without waiting.
    fn pop_into(&self, out: &mut [i16]) -> usize {
        let mut g = self.lock();
        let take = g.queue.len().min(out.len());
        for (dst, src) in out.iter_mut().zip(g.queue.drain(..take)) {
            *dst = src;
        }
        drop(g);
        if take > 0 {
            self.cv.notify_all();
        }
        take
    }
}

enum DeviceCommand {
    Play(Sender<Result<()>>),
    Pause(Sender<Result<()>>),
    Release,
}

struct DeviceThread {
    cmd_tx: Sender<DeviceCommand>,
    join: thread::JoinHandle<()>,
}

/// Output sink playing through a CPAL device.
pub struct CpalSink {
    device_name: Option<String>,
    ring: Arc<DeviceRing>,
    volume_bits: Arc<AtomicU32>,
    stats: Arc<OutputStats>,
    thread: Mutex<Option<DeviceThread>>,
}

impl CpalSink {
    /// Create a sink for the device matching `device_name` (or the default device).
    ///
    /// Nothing is opened until [`AudioSink::configure`].
    pub fn new(device_name: Option<String>, stats: Arc<OutputStats>) -> Self {
        Self {
            device_name,
            ring: Arc::new(DeviceRing::new()),
            volume_bits: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            stats,
            thread: Mutex::new(None),
        }
    }

    fn device_thread(&self) -> MutexGuard<'_, Option<DeviceThread>> {
        self.thread.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn command(&self, make: impl FnOnce(Sender<Result<()>>) -> DeviceCommand) -> Result<()> {
        let guard = self.device_thread();
        let dev = guard.as_ref().ok_or_else(|| anyhow!("output device is not configured"))?;
        let (reply_tx, reply_rx) = bounded(1);
        dev.cmd_tx
            .send(make(reply_tx))
            .map_err(|_| anyhow!("output device thread is gone"))?;
        reply_rx
            .recv()
            .map_err(|_| anyhow!("output device thread is gone"))?
    }

    fn shutdown_thread(&self) {
        let Some(dev) = self.device_thread().take() else {
            return;
        };
        let _ = dev.cmd_tx.send(DeviceCommand::Release);
        if dev.join.join().is_err() {
            tracing::warn!("output device thread panicked");
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.ring.set_accepting(false);
        self.shutdown_thread();
    }
}

impl AudioSink for CpalSink {
    fn configure(&self, sample_rate: u32, buffer_frames: u32) -> Result<SinkConfig> {
        self.ring.set_accepting(false);
        self.shutdown_thread();

        let (ready_tx, ready_rx) = bounded::<Result<SinkConfig>>(1);
        let (cmd_tx, cmd_rx) = unbounded::<DeviceCommand>();
        let device_name = self.device_name.clone();
        let ring = self.ring.clone();
        let volume_bits = self.volume_bits.clone();
        let stats = self.stats.clone();

        let join = thread::Builder::new()
            .name("audio-device".to_string())
            .spawn(move || {
                let stream = match open_stream(
                    device_name.as_deref(),
                    sample_rate,
                    buffer_frames,
                    ring,
                    volume_bits,
                    stats,
                ) {
                    Ok((stream, cfg)) => {
                        let _ = ready_tx.send(Ok(cfg));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while let Ok(cmd) = cmd_rx.recv() {
                    match cmd {
                        DeviceCommand::Play(reply) => {
                            let _ = reply.send(stream.play().context("start output stream"));
                        }
                        DeviceCommand::Pause(reply) => {
                            let _ = reply.send(stream.pause().context("pause output stream"));
                        }
                        DeviceCommand::Release => break,
                    }
                }
                drop(stream);
                tracing::debug!("output stream released");
            })
            .context("spawn audio device thread")?;

        let cfg = match ready_rx.recv() {
            Ok(Ok(cfg)) => cfg,
            Ok(Err(e)) => {
                let _ = join.join();
                return Err(e);
            }
            Err(_) => {
                let _ = join.join();
                bail!("audio device thread exited during setup");
            }
        };

        self.ring.reset(cfg.buffer_frames as usize * CHANNELS);
        *self.device_thread() = Some(DeviceThread { cmd_tx, join });
        tracing::info!(
            rate_hz = cfg.sample_rate,
            buffer_frames = cfg.buffer_frames,
            "output device configured"
        );
        Ok(cfg)
    }

    fn play(&self) -> Result<()> {
        self.command(DeviceCommand::Play)?;
        self.ring.set_accepting(true);
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.ring.set_accepting(false);
        self.command(DeviceCommand::Pause)
    }

    fn flush(&self) -> Result<()> {
        self.ring.clear();
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.ring.set_accepting(false);
        self.ring.clear();
        self.command(DeviceCommand::Pause)
    }

    fn release(&self) -> Result<()> {
        self.ring.set_accepting(false);
        self.ring.clear();
        self.shutdown_thread();
        Ok(())
    }

    fn write(&self, samples: &[i16]) -> Result<usize> {
        Ok(self.ring.push_blocking(samples))
    }

    fn set_volume(&self, volume: f32) -> Result<()> {
        self.volume_bits
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
        Ok(())
    }
}

/// Open the device and build a paused output stream reading from `ring`.
fn open_stream(
    device_name: Option<&str>,
    sample_rate: u32,
    buffer_frames: u32,
    ring: Arc<DeviceRing>,
    volume_bits: Arc<AtomicU32>,
    stats: Arc<OutputStats>,
) -> Result<(cpal::Stream, SinkConfig)> {
    let host = cpal::default_host();
    let device = device::pick_device(&host, device_name)?;
    let supported = device::pick_output_config(&device, sample_rate)?;
    if supported.sample_rate() != sample_rate {
        bail!(
            "device does not support {sample_rate} Hz (closest: {} Hz)",
            supported.sample_rate()
        );
    }

    let mut stream_config: cpal::StreamConfig = supported.config();
    if let Some(buf) = device::pick_buffer_size(&supported, buffer_frames) {
        stream_config.buffer_size = buf;
    }
    let effective_frames = effective_buffer_frames(&stream_config.buffer_size, buffer_frames);

    tracing::info!(
        device = %device.description().map(|d| d.to_string()).unwrap_or_default(),
        rate_hz = stream_config.sample_rate,
        channels = stream_config.channels,
        sample_format = ?supported.sample_format(),
        buffer_size = ?stream_config.buffer_size,
        "opening output stream"
    );

    let stream = match supported.sample_format() {
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, ring, volume_bits, stats),
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, ring, volume_bits, stats),
        cpal::SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, ring, volume_bits, stats),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, ring, volume_bits, stats),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }?;
    stream.pause().context("pause new output stream")?;

    Ok((
        stream,
        SinkConfig {
            sample_rate,
            buffer_frames: effective_frames,
        },
    ))
}

/// Buffer size the device will actually run with: the fixed size CPAL was given, or the
/// request when the device picks its own.
fn effective_buffer_frames(buffer_size: &cpal::BufferSize, requested: u32) -> u32 {
    match buffer_size {
        cpal::BufferSize::Fixed(frames) => *frames,
        cpal::BufferSize::Default => requested,
    }
}

/// Type-specialized stream builder for CPAL sample formats.
///
/// The callback pulls whole stereo frames from `ring`, applies the device volume and maps
/// stereo onto the device channel layout (mono gets the average, extra channels repeat the
/// right channel).
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: Arc<DeviceRing>,
    volume_bits: Arc<AtomicU32>,
    stats: Arc<OutputStats>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<i16>,
{
    let channels_out = (config.channels as usize).max(1);
    let mut scratch: Vec<i16> = Vec::new();

    let err_fn = |err| tracing::warn!("output stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels_out;
            let needed = frames * CHANNELS;
            if scratch.len() < needed {
                scratch.resize(needed, 0);
            }
            let got_frames = ring.pop_into(&mut scratch[..needed]) / CHANNELS;
            let volume = f32::from_bits(volume_bits.load(Ordering::Relaxed));

            for (i, frame) in data.chunks_exact_mut(channels_out).enumerate() {
                let (l, r) = if i < got_frames {
                    (
                        clip_f32(scratch[i * CHANNELS] as f32 * volume),
                        clip_f32(scratch[i * CHANNELS + 1] as f32 * volume),
                    )
                } else {
                    (0, 0)
                };
                if channels_out == 1 {
                    let mono = ((l as i32 + r as i32) / 2) as i16;
                    frame[0] = <T as cpal::Sample>::from_sample::<i16>(mono);
                } else {
                    for (ch, out) in frame.iter_mut().enumerate() {
                        let s = if ch == 0 { l } else { r };
                        *out = <T as cpal::Sample>::from_sample::<i16>(s);
                    }
                }
            }

            if got_frames < frames {
                OutputStats::add(&stats.underrun_events, 1);
                OutputStats::add(&stats.underrun_frames, (frames - got_frames) as u64);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_rejects_writes_until_accepting() {
        let ring = DeviceRing::new();
        ring.reset(8);
        assert_eq!(ring.push_blocking(&[1, 2]), 0);
        ring.set_accepting(true);
        assert_eq!(ring.push_blocking(&[1, 2]), 2);
    }

    #[test]
    fn ring_write_is_partial_when_nearly_full() {
        let ring = DeviceRing::new();
        ring.reset(4);
        ring.set_accepting(true);
        assert_eq!(ring.push_blocking(&[1, 2, 3]), 3);
        assert_eq!(ring.push_blocking(&[4, 5, 6]), 1);

        let mut out = [0i16; 8];
        assert_eq!(ring.pop_into(&mut out), 4);
        assert_eq!(&out[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn full_ring_blocks_until_drained() {
        let ring = Arc::new(DeviceRing::new());
        ring.reset(2);
        ring.set_accepting(true);
        assert_eq!(ring.push_blocking(&[1, 2]), 2);

        let writer = {
            let ring = ring.clone();
            thread::spawn(move || ring.push_blocking(&[3, 4]))
        };
        thread::sleep(Duration::from_millis(30));
        let mut out = [0i16; 2];
        assert_eq!(ring.pop_into(&mut out), 2);
        assert_eq!(writer.join().unwrap(), 2);
    }

    #[test]
    fn blocked_write_returns_zero_when_paused() {
        let ring = Arc::new(DeviceRing::new());
        ring.reset(2);
        ring.set_accepting(true);
        ring.push_blocking(&[1, 2]);

        let writer = {
            let ring = ring.clone();
            thread::spawn(move || ring.push_blocking(&[3, 4]))
        };
        thread::sleep(Duration::from_millis(10));
        ring.set_accepting(false);
        assert_eq!(writer.join().unwrap(), 0);
    }

    #[test]
    fn clear_discards_buffered_audio() {
        let ring = DeviceRing::new();
        ring.reset(8);
        ring.set_accepting(true);
        ring.push_blocking(&[1, 2, 3, 4]);
        ring.clear();
        let mut out = [0i16; 4];
        assert_eq!(ring.pop_into(&mut out), 0);
    }

    #[test]
    fn effective_buffer_reports_device_capped_size() {
        assert_eq!(effective_buffer_frames(&cpal::BufferSize::Fixed(4_096), 8_192), 4_096);
        assert_eq!(effective_buffer_frames(&cpal::BufferSize::Fixed(8_192), 8_192), 8_192);
        assert_eq!(effective_buffer_frames(&cpal::BufferSize::Default, 8_192), 8_192);
    }

    #[test]
    fn unconfigured_sink_refuses_lifecycle_and_writes() {
        let sink = CpalSink::new(None, Arc::new(OutputStats::default()));
        assert!(sink.play().is_err());
        assert_eq!(sink.write(&[1, 2]).unwrap(), 0);
        assert!(sink.release().is_ok());
        sink.set_volume(2.0).unwrap();
        assert_eq!(f32::from_bits(sink.volume_bits.load(Ordering::Relaxed)), 1.0);
    }
}
