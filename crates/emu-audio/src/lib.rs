pub mod config;
pub mod controller;
pub mod device;
pub mod filter;
pub mod output;
pub mod pcm;
pub mod pipeline;
pub mod queue;
pub mod resample;
pub mod sink;
pub mod smooth;
pub mod status;

pub use controller::AudioOutput;
pub use emu_audio_types::{AudioSettings, DeviceConfig, OutputStatus, PlaybackState};
