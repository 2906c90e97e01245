//! Settings loading: an optional TOML file, then command-line overrides.

use std::path::Path;

use anyhow::{Context, Result};
use emu_audio_types::AudioSettings;

use crate::cli::Args;

pub fn load(path: &Path) -> Result<AudioSettings> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("read settings {:?}", path))?;
    parse(&raw).with_context(|| format!("parse settings {:?}", path))
}

fn parse(raw: &str) -> Result<AudioSettings> {
    Ok(toml::from_str::<AudioSettings>(raw)?)
}

/// Resolve the effective settings for this run.
pub fn resolve(args: &Args) -> Result<AudioSettings> {
    let mut settings = match &args.settings {
        Some(path) => load(path)?,
        None => AudioSettings::default(),
    };
    apply_overrides(&mut settings, args);
    Ok(settings.sanitized())
}

fn apply_overrides(settings: &mut AudioSettings, args: &Args) {
    if let Some(rate) = args.sample_rate {
        settings.sample_rate = rate;
    }
    if let Some(frames) = args.buffer_frames {
        settings.buffer_frames = frames;
    }
    if let Some(volume) = args.volume {
        settings.volume = volume;
    }
    if args.no_filter {
        settings.filter_enabled = false;
    }
    if let Some(level) = args.filter_level {
        settings.filter_level = level;
    }
}
