//! Click suppression at chunk boundaries.
//!
//! Chunks can land next to each other with unrelated levels when the latency queue sheds
//! audio or when a resample seam rounds badly. If the first frame of a new chunk jumps away
//! from the last enqueued frame by at least the threshold on either channel, the head of the
//! new chunk is rewritten as a short linear ramp from the previous tail.

use crate::config::CHANNELS;
use crate::pcm::clip_i16;

/// Tail of the most recently enqueued chunk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoundaryState {
    pub has_tail: bool,
    pub tail_left: i32,
    pub tail_right: i32,
}

#[derive(Debug)]
pub struct BoundarySmoother {
    smooth_frames: usize,
    threshold: i32,
    state: BoundaryState,
}

impl BoundarySmoother {
    pub fn new(smooth_frames: usize, threshold: i32) -> Self {
        Self {
            smooth_frames: smooth_frames.max(1),
            threshold,
            state: BoundaryState::default(),
        }
    }

    pub fn state(&self) -> &BoundaryState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state = BoundaryState::default();
    }

    /// Ramp the head of `chunk` if it jumps away from the previous tail, then record its tail.
    ///
    /// Returns `true` when the chunk was modified. Chunks shorter than two frames are left
    /// alone and do not replace the recorded tail.
    pub fn apply(&mut self, chunk: &mut [i16]) -> bool {
        if chunk.len() < 2 * CHANNELS {
            return false;
        }

        let mut smoothed = false;
        if self.state.has_tail {
            let start_l = chunk[0] as i32;
            let start_r = chunk[1] as i32;
            let tail_l = self.state.tail_left;
            let tail_r = self.state.tail_right;

            let jump = (start_l - tail_l).abs() >= self.threshold
                || (start_r - tail_r).abs() >= self.threshold;

            if jump {
                let n = self.smooth_frames.min(chunk.len() / CHANNELS);
                for (i, frame) in chunk.chunks_exact_mut(CHANNELS).take(n).enumerate() {
                    let t = (i + 1) as f32 / n as f32;
                    let l = (tail_l as f32 + (start_l - tail_l) as f32 * t) as i32;
                    let r = (tail_r as f32 + (start_r - tail_r) as f32 * t) as i32;
                    frame[0] = clip_i16(l);
                    frame[1] = clip_i16(r);
                }
                smoothed = true;
                tracing::trace!(
                    tail_left = tail_l,
                    head_left = start_l,
                    frames = n,
                    "ramped chunk boundary"
                );
            }
        }

        let tail = chunk.len() - CHANNELS;
        self.state = BoundaryState {
            has_tail: true,
            tail_left: chunk[tail] as i32,
            tail_right: chunk[tail + 1] as i32,
        };
        smoothed
    }
}
