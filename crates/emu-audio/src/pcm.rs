//! Interleaved 16-bit stereo PCM helpers.
//!
//! A chunk is a plain `Vec<i16>` laid out as `L0, R0, L1, R1, ...`. Ownership of a chunk moves
//! with it through the pipeline; nothing keeps a second handle to a queued chunk.

use std::borrow::Cow;

use crate::config::CHANNELS;

/// A block of interleaved stereo samples.
pub type PcmChunk = Vec<i16>;

/// Volumes at or above this are treated as unity gain.
const UNITY_VOLUME: f32 = 0.999;

/// Saturate an integer sample into the 16-bit range.
#[inline]
pub fn clip_i16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Truncate a float sample toward zero and saturate it into the 16-bit range.
#[inline]
pub fn clip_f32(value: f32) -> i16 {
    clip_i16(value as i32)
}

/// Number of whole stereo frames in `samples`.
#[inline]
pub fn frame_count(samples: &[i16]) -> usize {
    samples.len() / CHANNELS
}

/// Scale samples by `volume`.
///
/// Unity gain borrows the input untouched.
pub fn apply_volume(samples: &[i16], volume: f32) -> Cow<'_, [i16]> {
    if volume >= UNITY_VOLUME {
        return Cow::Borrowed(samples);
    }
    let scale = volume.max(0.0);
    Cow::Owned(
        samples
            .iter()
            .map(|&s| clip_f32(s as f32 * scale))
            .collect(),
    )
}

/// Split interleaved samples into owned chunks of at most `chunk_frames` frames.
pub fn split_chunks(samples: &[i16], chunk_frames: usize) -> impl Iterator<Item = PcmChunk> + '_ {
    samples
        .chunks(chunk_frames.max(1) * CHANNELS)
        .map(|c| c.to_vec())
}
