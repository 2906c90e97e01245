use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "emu-audio", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Audio settings file (TOML). Flags below override its values.
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Use a specific output device by substring match
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Device sample rate in Hz (clamped to 8000..=96000)
    #[arg(long, global = true)]
    pub sample_rate: Option<u32>,

    /// Device buffer size in frames (clamped to 1024..=65536)
    #[arg(long, global = true)]
    pub buffer_frames: Option<u32>,

    /// Master volume, 0.0..=1.0
    #[arg(long, global = true)]
    pub volume: Option<f32>,

    /// Disable the post-resample smoothing filter
    #[arg(long, global = true)]
    pub no_filter: bool,

    /// Smoothing filter strength, 0..=100
    #[arg(long, global = true)]
    pub filter_level: Option<u8>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List output devices and exit
    Devices,

    /// Play a synthetic tone through the output pipeline, one block per video frame
    Tone(ToneArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ToneArgs {
    /// Rate the fake emulation core produces audio at
    #[arg(long, default_value_t = 32_768)]
    pub source_rate: i32,

    /// Peak deviation of the source rate, in Hz, swept slowly to mimic a variable core
    #[arg(long, default_value_t = 0.0)]
    pub drift_hz: f64,

    /// How long to run
    #[arg(long, default_value_t = 5.0)]
    pub seconds: f64,

    /// Tone frequency in Hz
    #[arg(long, default_value_t = 440.0)]
    pub freq: f64,

    /// Peak amplitude, 0.0..=1.0
    #[arg(long, default_value_t = 0.3)]
    pub amplitude: f64,

    #[arg(long, value_enum, default_value_t = Waveform::Square)]
    pub waveform: Waveform,

    /// Blocks submitted per second
    #[arg(long, default_value_t = 60.0)]
    pub fps: f64,

    /// Write into an in-memory sink instead of a sound device
    #[arg(long)]
    pub capture: bool,

    /// Print the per-second status as JSON lines on stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
}
