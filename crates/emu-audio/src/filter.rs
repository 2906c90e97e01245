//! Post-resample smoothing filter.
//!
//! A one-pole low-pass per channel. Its coefficient comes from a user-facing strength in
//! percent: higher levels give a lower cutoff.

use std::borrow::Cow;

use crate::config::CHANNELS;
use crate::pcm::clip_f32;

const ALPHA_AT_ZERO: f32 = 0.86;
const ALPHA_SPAN: f32 = 0.62;
const ALPHA_MIN: f32 = 0.08;
const ALPHA_MAX: f32 = 0.90;

/// Persistent per-channel accumulator.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FilterState {
    pub left: f32,
    pub right: f32,
    /// `false` makes the next sample seed the accumulator instead of being smoothed.
    pub ready: bool,
}

/// Smoothing coefficient for a strength in percent (clamped to `0..=100`).
pub fn alpha_for_level(level: u8) -> f32 {
    let strength = level.min(100) as f32 / 100.0;
    (ALPHA_AT_ZERO - strength * ALPHA_SPAN).clamp(ALPHA_MIN, ALPHA_MAX)
}

#[derive(Debug, Default)]
pub struct SmoothingFilter {
    state: FilterState,
}

impl SmoothingFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state = FilterState::default();
    }

    /// Filter interleaved stereo `input`.
    ///
    /// Disabled or empty input passes through unchanged and resets the accumulator, so a
    /// later re-enable starts cold.
    pub fn process<'a>(&mut self, input: &'a [i16], enabled: bool, level: u8) -> Cow<'a, [i16]> {
        if !enabled || input.is_empty() {
            self.reset();
            return Cow::Borrowed(input);
        }

        let alpha = alpha_for_level(level);
        let mut st = self.state;
        let mut out = Vec::with_capacity(input.len());

        for frame in input.chunks_exact(CHANNELS) {
            let in_l = frame[0] as f32;
            let in_r = frame[1] as f32;
            if st.ready {
                st.left += alpha * (in_l - st.left);
                st.right += alpha * (in_r - st.right);
            } else {
                st.left = in_l;
                st.right = in_r;
                st.ready = true;
            }
            out.push(clip_f32(st.left));
            out.push(clip_f32(st.right));
        }
        // A dangling sample of an incomplete frame is zeroed, keeping the length.
        if input.len() % CHANNELS != 0 {
            out.push(0);
        }

        self.state = st;
        Cow::Owned(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_follows_level_and_stays_bounded() {
        assert!((alpha_for_level(0) - 0.86).abs() < 1e-6);
        assert!((alpha_for_level(100) - 0.24).abs() < 1e-6);
        assert!((alpha_for_level(60) - 0.488).abs() < 1e-6);
        assert_eq!(alpha_for_level(255), alpha_for_level(100));
        for level in 0..=100u8 {
            let a = alpha_for_level(level);
            assert!((ALPHA_MIN..=ALPHA_MAX).contains(&a));
        }
    }

    #[test]
    fn disabled_filter_is_identity() {
        let mut f = SmoothingFilter::new();
        let input: Vec<i16> = (0..512).map(|i| ((i * 7919) % 65_536 - 32_768) as i16).collect();
        let out = f.process(&input, false, 100);
        assert_eq!(&*out, input.as_slice());
    }

    #[test]
    fn disabling_resets_state() {
        let mut f = SmoothingFilter::new();
        let _ = f.process(&[1_000, 1_000, 2_000, 2_000], true, 50);
        assert!(f.state().ready);
        let _ = f.process(&[1, 1], false, 50);
        assert_eq!(*f.state(), FilterState::default());
    }

    #[test]
    fn first_sample_is_not_smoothed() {
        let mut f = SmoothingFilter::new();
        let out = f.process(&[12_345, -12_345, 0, 0], true, 100);
        assert_eq!(out[0], 12_345);
        assert_eq!(out[1], -12_345);
        assert!(out[2] > 0 && out[2] < 12_345);
    }

    #[test]
    fn step_response_is_monotonic_without_overshoot() {
        let mut f = SmoothingFilter::new();
        let mut input = vec![0i16; 64];
        input.extend(std::iter::repeat([20_000i16, -20_000]).take(200).flatten());
        let out = f.process(&input, true, 80);

        let left: Vec<i16> = out.chunks(2).map(|c| c[0]).collect();
        let right: Vec<i16> = out.chunks(2).map(|c| c[1]).collect();
        for w in left.windows(2) {
            assert!(w[1] >= w[0]);
        }
        for w in right.windows(2) {
            assert!(w[1] <= w[0]);
        }
        assert!(left.iter().all(|&s| (0..=20_000).contains(&s)));
        assert!(right.iter().all(|&s| (-20_000..=0).contains(&s)));
        assert!(*left.last().unwrap() > 19_900);
    }

    #[test]
    fn state_carries_across_calls() {
        let mut whole = SmoothingFilter::new();
        let input: Vec<i16> = (0..400).map(|i| if i % 40 < 20 { 8_000 } else { -8_000 }).collect();
        let reference = whole.process(&input, true, 60).into_owned();

        let mut split = SmoothingFilter::new();
        let mut joined = split.process(&input[..200], true, 60).into_owned();
        joined.extend_from_slice(&split.process(&input[200..], true, 60));
        assert_eq!(joined, reference);
    }

    #[test]
    fn incomplete_trailing_frame_keeps_length() {
        let mut f = SmoothingFilter::new();
        let out = f.process(&[1_000, -1_000, 2_000], true, 60);
        assert_eq!(out.len(), 3);
        assert_eq!(&out[..2], &[1_000, -1_000]);
        assert_eq!(out[2], 0);
    }
}
