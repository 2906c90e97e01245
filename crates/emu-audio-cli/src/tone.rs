//! Synthetic "emulation core": produces one stereo block per video frame at a source rate that
//! can drift slowly around its nominal value.

use std::f64::consts::TAU;

use crate::cli::Waveform;

/// Period of the source-rate sweep.
const DRIFT_PERIOD_SECS: f64 = 8.0;

pub struct ToneSource {
    waveform: Waveform,
    freq: f64,
    amplitude: f64,
    base_rate: f64,
    drift_hz: f64,
    phase: f64,
    elapsed: f64,
    frame_carry: f64,
}

impl ToneSource {
    pub fn new(waveform: Waveform, freq: f64, amplitude: f64, base_rate: i32, drift_hz: f64) -> Self {
        Self {
            waveform,
            freq: freq.max(0.0),
            amplitude: amplitude.clamp(0.0, 1.0),
            base_rate: base_rate.max(1) as f64,
            drift_hz: drift_hz.abs(),
            phase: 0.0,
            elapsed: 0.0,
            frame_carry: 0.0,
        }
    }

    /// Source rate for the next block.
    pub fn current_rate(&self) -> i32 {
        let offset = self.drift_hz * (TAU * self.elapsed / DRIFT_PERIOD_SECS).sin();
        ((self.base_rate + offset).round() as i32).max(1)
    }

    /// Produce the block for one video frame and the rate it was generated at.
    pub fn next_block(&mut self, fps: f64) -> (Vec<i16>, i32) {
        let rate = self.current_rate();
        let exact = rate as f64 / fps + self.frame_carry;
        let frames = exact.floor().max(0.0) as usize;
        self.frame_carry = exact - frames as f64;

        let peak = self.amplitude * i16::MAX as f64;
        let step = self.freq / rate as f64;
        let mut out = Vec::with_capacity(frames * 2);
        for _ in 0..frames {
            let v = match self.waveform {
                Waveform::Sine => (self.phase * TAU).sin(),
                Waveform::Square if self.phase < 0.5 => 1.0,
                Waveform::Square => -1.0,
            };
            let s = (v * peak) as i16;
            out.push(s);
            out.push(s);
            self.phase = (self.phase + step).fract();
        }
        self.elapsed += 1.0 / fps;
        (out, rate)
    }
}
