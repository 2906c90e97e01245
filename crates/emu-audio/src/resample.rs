//! Streaming linear resampler for interleaved stereo `i16` audio.
//!
//! The emulation core hands over blocks of irregular length at a rate that can change from one
//! block to the next. To keep pitch steady across block seams the resampler carries its
//! fractional read position and the last input frame between calls, and treats that frame as a
//! one-frame prefix of the next block. The carried state is only reused while the
//! `(source, target)` rate pair stays the same.

use std::borrow::Cow;

use crate::config::CHANNELS;
use crate::pcm::clip_i16;

/// Largest phase value carried to the next call; keeps the phase inside `[0, 1)`.
const MAX_PHASE: f64 = 1.0 - f64::EPSILON;

/// State carried between calls of [`LinearResampler::process`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ResamplerState {
    /// Fractional position of the next output frame, relative to the carried frame.
    pub phase: f64,
    pub prev_left: i32,
    pub prev_right: i32,
    /// `false` forces the next call to start cold.
    pub has_prev_frame: bool,
    pub source_rate: i32,
    pub target_rate: i32,
}

/// Linear-interpolation resampler with phase and edge-frame continuity.
#[derive(Debug, Default)]
pub struct LinearResampler {
    state: ResamplerState,
}

impl LinearResampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ResamplerState {
        &self.state
    }

    /// Forget the carried phase and frame.
    pub fn reset(&mut self) {
        self.state = ResamplerState::default();
    }

    /// Resample `input` from `source_rate` to `target_rate`.
    ///
    /// Equal rates, or a non-positive source rate, bypass the stage and reset its state.
    /// Blocks shorter than two frames, or a non-positive target rate, are passed through
    /// without touching the state.
    pub fn process<'a>(
        &mut self,
        input: &'a [i16],
        source_rate: i32,
        target_rate: i32,
    ) -> Cow<'a, [i16]> {
        if source_rate == target_rate || source_rate <= 0 {
            self.reset();
            return Cow::Borrowed(input);
        }

        let in_frames = input.len() / CHANNELS;
        if in_frames < 2 || target_rate <= 0 {
            return Cow::Borrowed(input);
        }

        let st = self.state;
        let continuing = st.has_prev_frame
            && st.source_rate == source_rate
            && st.target_rate == target_rate;

        let virtual_frames = in_frames + usize::from(continuing);
        let last_index = virtual_frames - 1;
        let step = source_rate as f64 / target_rate as f64;
        let mut src_pos = if continuing { st.phase } else { 0.0 };

        // Frame `idx` on the virtual timeline; index 0 is the carried frame when continuing.
        let frame_at = |idx: usize| -> (i32, i32) {
            if continuing {
                if idx == 0 {
                    return (st.prev_left, st.prev_right);
                }
                let i = (idx - 1) * CHANNELS;
                (input[i] as i32, input[i + 1] as i32)
            } else {
                let i = idx * CHANNELS;
                (input[i] as i32, input[i + 1] as i32)
            }
        };

        let estimated_frames = (((virtual_frames as f64 - src_pos) / step) as usize + 2).max(1);
        let mut out = Vec::with_capacity(estimated_frames * CHANNELS);

        while src_pos + 1.0 < virtual_frames as f64 {
            let base = (src_pos as usize).min(virtual_frames - 2);
            let frac = src_pos - base as f64;

            let (l0, r0) = frame_at(base);
            let (l1, r1) = frame_at(base + 1);

            let l = (l0 as f64 + (l1 - l0) as f64 * frac) as i32;
            let r = (r0 as f64 + (r1 - r0) as f64 * frac) as i32;
            out.push(clip_i16(l));
            out.push(clip_i16(r));

            src_pos += step;
        }

        let tail = (in_frames - 1) * CHANNELS;
        self.state = ResamplerState {
            phase: (src_pos - last_index as f64).clamp(0.0, MAX_PHASE),
            prev_left: input[tail] as i32,
            prev_right: input[tail + 1] as i32,
            has_prev_frame: true,
            source_rate,
            target_rate,
        };

        tracing::trace!(
            in_frames,
            out_frames = out.len() / CHANNELS,
            continuing,
            "resampled block"
        );
        Cow::Owned(out)
    }
}
