//! Producer-side processing chain: volume → resample → smoothing filter → chunk split, with
//! boundary smoothing applied to each chunk as it is handed to the latency queue.

use crate::config::PipelineTuning;
use crate::filter::SmoothingFilter;
use crate::pcm::{self, PcmChunk};
use crate::queue::LatencyQueue;
use crate::resample::LinearResampler;
use crate::smooth::BoundarySmoother;
use crate::status::OutputStats;

/// Filter settings read on every submit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterSettings {
    pub enabled: bool,
    pub level: u8,
}

/// DSP state for one producer stream.
///
/// Resampler, boundary and filter state belong together: [`ProcessingChain::reset`] always
/// clears all three so unrelated audio segments are never glued together.
#[derive(Debug)]
pub struct ProcessingChain {
    resampler: LinearResampler,
    smoother: BoundarySmoother,
    filter: SmoothingFilter,
    chunk_frames: usize,
}

impl ProcessingChain {
    pub fn new(tuning: &PipelineTuning) -> Self {
        Self {
            resampler: LinearResampler::new(),
            smoother: BoundarySmoother::new(tuning.smooth_frames, tuning.smooth_threshold),
            filter: SmoothingFilter::new(),
            chunk_frames: tuning.chunk_frames.max(1),
        }
    }

    pub fn reset(&mut self) {
        self.resampler.reset();
        self.smoother.reset();
        self.filter.reset();
    }

    /// Drop only the filter accumulator (used when the filter gets disabled).
    pub fn reset_filter(&mut self) {
        self.filter.reset();
    }

    #[cfg(test)]
    pub(crate) fn resampler(&self) -> &LinearResampler {
        &self.resampler
    }

    #[cfg(test)]
    pub(crate) fn smoother(&self) -> &BoundarySmoother {
        &self.smoother
    }

    #[cfg(test)]
    pub(crate) fn filter(&self) -> &SmoothingFilter {
        &self.filter
    }

    /// Run volume, resampling and filtering over one producer block.
    pub fn process(
        &mut self,
        samples: &[i16],
        source_rate: i32,
        target_rate: u32,
        volume: f32,
        filter: FilterSettings,
    ) -> Vec<i16> {
        let scaled = pcm::apply_volume(samples, volume);
        let target_rate = i32::try_from(target_rate).unwrap_or(i32::MAX);
        let resampled = self.resampler.process(&scaled, source_rate, target_rate);
        self.filter
            .process(&resampled, filter.enabled, filter.level)
            .into_owned()
    }

    /// Split processed audio into chunks.
    pub fn split(&self, processed: &[i16]) -> Vec<PcmChunk> {
        pcm::split_chunks(processed, self.chunk_frames).collect()
    }

    /// Smooth the head of `chunk` against the last enqueued tail and hand it to `queue`.
    ///
    /// Smoothing runs before the queue's latency trimming, so the tail it compares against
    /// belongs to the last chunk *offered*, even if that chunk is shed later.
    pub fn enqueue(&mut self, mut chunk: PcmChunk, queue: &LatencyQueue, stats: &OutputStats) -> bool {
        if self.smoother.apply(&mut chunk) {
            OutputStats::add(&stats.smoothed_boundaries, 1);
        }
        queue.enqueue(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn sine(frames: usize, amplitude: f32, period: f32) -> Vec<i16> {
        (0..frames)
            .flat_map(|i| {
                let s = (amplitude * (i as f32 * std::f32::consts::TAU / period).sin()) as i16;
                [s, s]
            })
            .collect()
    }

    const OFF: FilterSettings = FilterSettings { enabled: false, level: 0 };

    #[test]
    fn same_rate_unity_volume_without_filter_is_identity() {
        let mut chain = ProcessingChain::new(&PipelineTuning::default());
        let input = sine(500, 10_000.0, 37.0);
        let out = chain.process(&input, 44_100, 44_100, 1.0, OFF);
        assert_eq!(out, input);
    }

    #[test]
    fn process_resamples_and_splits_into_bounded_chunks() {
        let tuning = PipelineTuning::default();
        let mut chain = ProcessingChain::new(&tuning);
        let input = sine(1_000, 8_000.0, 64.0);
        let out = chain.process(&input, 32_768, 44_100, 1.0, OFF);
        assert_eq!(out.len() / 2, 1_345);

        let chunks = chain.split(&out);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= 640 * 2));
        assert_eq!(chunks.iter().map(Vec::len).sum::<usize>(), out.len());
    }

    #[test]
    fn volume_is_applied_before_resampling() {
        let mut chain = ProcessingChain::new(&PipelineTuning::default());
        let input = vec![20_000i16; 200];
        let out = chain.process(&input, 22_050, 44_100, 0.5, OFF);
        assert!(out.iter().all(|&s| s == 10_000));
    }

    #[test]
    fn reset_clears_all_stage_state() {
        let tuning = PipelineTuning::default();
        let mut chain = ProcessingChain::new(&tuning);
        let q = LatencyQueue::new(44_100, &tuning, Arc::new(OutputStats::default()));
        let stats = OutputStats::default();

        let out = chain.process(
            &sine(300, 9_000.0, 50.0),
            32_000,
            44_100,
            1.0,
            FilterSettings { enabled: true, level: 60 },
        );
        for chunk in chain.split(&out) {
            chain.enqueue(chunk, &q, &stats);
        }
        assert!(chain.resampler().state().has_prev_frame);
        assert!(chain.smoother().state().has_tail);
        assert!(chain.filter().state().ready);

        chain.reset();
        assert!(!chain.resampler().state().has_prev_frame);
        assert!(!chain.smoother().state().has_tail);
        assert!(!chain.filter().state().ready);
    }

    #[test]
    fn enqueue_ramps_discontinuous_chunk() {
        let tuning = PipelineTuning::default();
        let mut chain = ProcessingChain::new(&tuning);
        let stats = OutputStats::default();
        let q = LatencyQueue::new(44_100, &tuning, Arc::new(OutputStats::default()));

        assert!(chain.enqueue(vec![0; 64], &q, &stats));
        assert!(chain.enqueue(vec![20_000; 64], &q, &stats));
        assert_eq!(
            stats.smoothed_boundaries.load(std::sync::atomic::Ordering::Relaxed),
            1
        );

        let _ = q.dequeue(Duration::from_millis(1));
        let ramped = q.dequeue(Duration::from_millis(1)).unwrap();
        assert!(ramped[0] > 0 && ramped[0] < 20_000);
        assert_eq!(ramped[62], 20_000);
    }
}
