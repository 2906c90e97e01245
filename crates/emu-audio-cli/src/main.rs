//! emu-audio: drive the emulator audio output pipeline from the command line.
//!
//! ## Modes
//! - `devices`: list output devices.
//! - `tone`: run a synthetic core that submits one block per video frame, optionally with a
//!   drifting source rate, and log the queue status once per second.

mod cli;
mod settings;
mod tone;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use clap::Parser;
use emu_audio::config::PipelineTuning;
use emu_audio::device;
use emu_audio::output::CpalSink;
use emu_audio::sink::{AudioSink, CaptureSink};
use emu_audio::status::OutputStats;
use emu_audio::AudioOutput;
use emu_audio_types::AudioSettings;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,emu_audio=info")
        }))
        .init();

    match &args.cmd {
        cli::Command::Devices => list_devices(),
        cli::Command::Tone(opts) => {
            let settings = settings::resolve(&args)?;
            run_tone(&args, &settings, opts)
        }
    }
}

fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    for (i, d) in device::list_devices(&host)?.iter().enumerate() {
        let marker = if d.is_default { " (default)" } else { "" };
        println!("#{i}: {}{marker} [{}-{} Hz]", d.name, d.min_rate, d.max_rate);
    }
    Ok(())
}

fn run_tone(args: &cli::Args, settings: &AudioSettings, opts: &cli::ToneArgs) -> Result<()> {
    if opts.fps.is_nan() || opts.fps <= 0.0 {
        bail!("--fps must be positive");
    }

    let stats = Arc::new(OutputStats::default());
    let capture = opts.capture.then(|| Arc::new(CaptureSink::new()));
    let sink: Arc<dyn AudioSink> = match &capture {
        Some(capture) => capture.clone() as Arc<dyn AudioSink>,
        None => Arc::new(CpalSink::new(args.device.clone(), stats.clone())),
    };
    let output = AudioOutput::with_stats(sink, PipelineTuning::default(), stats);

    if !output.apply_settings(settings) {
        bail!(
            "audio device rejected {} Hz / {} frames",
            settings.sample_rate,
            settings.buffer_frames
        );
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        let _ = ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed));
    }

    tracing::info!(
        source_rate_hz = opts.source_rate,
        drift_hz = opts.drift_hz,
        device_rate_hz = settings.sample_rate,
        seconds = opts.seconds,
        capture = opts.capture,
        "tone started"
    );

    let mut source = tone::ToneSource::new(
        opts.waveform,
        opts.freq,
        opts.amplitude,
        opts.source_rate,
        opts.drift_hz,
    );
    let frame_period = Duration::from_secs_f64(1.0 / opts.fps);
    let total_blocks = (opts.seconds.max(0.0) * opts.fps).round() as u64;
    let started = Instant::now();
    let mut next_report = started + Duration::from_secs(1);

    for block_idx in 0..total_blocks {
        if stop.load(Ordering::Relaxed) {
            tracing::info!("interrupted");
            break;
        }
        let (block, rate) = source.next_block(opts.fps);
        output.submit(&block, rate);

        let now = Instant::now();
        if now >= next_report {
            report(&output, rate, opts.json)?;
            next_report += Duration::from_secs(1);
        }

        let deadline = started + frame_period.mul_f64((block_idx + 1) as f64);
        if let Some(wait) = deadline.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }
    }

    report(&output, source.current_rate(), opts.json)?;
    output.stop();
    output.cleanup();

    if let Some(capture) = capture {
        tracing::info!(frames = capture.written_len() / 2, "captured audio");
    }
    Ok(())
}

fn report(output: &AudioOutput, source_rate: i32, json: bool) -> Result<()> {
    let status = output.status();
    if json {
        println!("{}", serde_json::to_string(&status)?);
    }
    tracing::info!(
        source_rate_hz = source_rate,
        queued_ms = status.queued_ms,
        queued_samples = status.queued_samples,
        dropped_chunks = status.dropped_chunks,
        smoothed = status.smoothed_boundaries,
        written_frames = status.written_frames,
        write_failures = status.write_failures,
        underrun_frames = status.underrun_frames,
        "output status"
    );
    Ok(())
}
