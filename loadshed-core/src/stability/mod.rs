//! Grid-frequency stability tracking.
//!
//! [`StabilityEstimator`] keeps a fixed circular history of instantaneous
//! frequency readings together with the rate-of-change between consecutive
//! mains cycles, and condenses the newest entry into a [`StabilityVerdict`].
//! The estimator is not synchronized; the pipeline that owns it serializes
//! every call.

use core::fmt;

/// Number of samples retained by [`FrequencyHistory`].
pub const HISTORY_DEPTH: usize = 100;

/// Rate at which the frequency analyser digitizes the mains waveform.
pub const ANALYSER_SAMPLE_RATE_HZ: u32 = 16_000;

/// Highest frequency the analyser can report (one ADC sample per cycle).
pub const MAX_MEASURABLE_HZ: f32 = 16_000.0;

/// Default under-frequency threshold in Hz.
pub const DEFAULT_MIN_FREQUENCY_HZ: f32 = 49.0;

/// Default rate-of-change threshold in Hz/s.
pub const DEFAULT_ROC_THRESHOLD_HZ_PER_S: f32 = 10.0;

/// Default ceiling applied to rate-of-change magnitudes in Hz/s.
pub const DEFAULT_ROC_CEILING_HZ_PER_S: f32 = 100.0;

/// Instantaneous frequency reading in Hz.
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Default)]
pub struct FrequencySample(f32);

impl FrequencySample {
    /// Creates a sample, clamping NaN and negative readings to zero and
    /// oversized readings to [`MAX_MEASURABLE_HZ`].
    #[must_use]
    pub fn new(hz: f32) -> Self {
        if hz.is_nan() {
            return Self(0.0);
        }

        Self(hz.clamp(0.0, MAX_MEASURABLE_HZ))
    }

    /// Derives a sample from the analyser's per-cycle ADC sample count.
    ///
    /// Returns `None` for a zero count, which the analyser emits before it
    /// has locked onto a waveform.
    #[must_use]
    pub fn from_sample_count(count: u32) -> Option<Self> {
        if count == 0 {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let hz = ANALYSER_SAMPLE_RATE_HZ as f32 / count as f32;
        Some(Self::new(hz))
    }

    /// Returns the frequency in Hz.
    #[must_use]
    pub const fn hz(self) -> f32 {
        self.0
    }

    /// Returns the frequency in whole millihertz, saturating at `u32::MAX`.
    #[must_use]
    pub fn millihertz(self) -> u32 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let value = (self.0 * 1_000.0) as u32;
        value
    }
}

impl fmt::Display for FrequencySample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}Hz", self.0)
    }
}

/// Stability classification of the newest sample.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum StabilityVerdict {
    #[default]
    Stable,
    Unstable,
}

impl StabilityVerdict {
    /// Returns `true` when the verdict asks for loads to be shed.
    #[must_use]
    pub const fn is_unstable(self) -> bool {
        matches!(self, StabilityVerdict::Unstable)
    }

    /// Maps a manual volatility override onto a verdict.
    #[must_use]
    pub const fn from_volatile(make_volatile: bool) -> Self {
        if make_volatile {
            StabilityVerdict::Unstable
        } else {
            StabilityVerdict::Stable
        }
    }
}

impl fmt::Display for StabilityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StabilityVerdict::Stable => f.write_str("stable"),
            StabilityVerdict::Unstable => f.write_str("unstable"),
        }
    }
}

/// Thresholds used to classify samples.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StabilityConfig {
    min_frequency_hz: f32,
    roc_threshold_hz_per_s: f32,
    roc_ceiling: f32,
}

impl StabilityConfig {
    /// Creates a configuration with explicit thresholds.
    #[must_use]
    pub const fn new(min_frequency_hz: f32, roc_threshold_hz_per_s: f32, roc_ceiling: f32) -> Self {
        Self {
            min_frequency_hz,
            roc_threshold_hz_per_s,
            roc_ceiling,
        }
    }

    /// Returns the under-frequency threshold in Hz.
    #[must_use]
    pub const fn min_frequency_hz(&self) -> f32 {
        self.min_frequency_hz
    }

    /// Returns the rate-of-change threshold in Hz/s.
    #[must_use]
    pub const fn roc_threshold_hz_per_s(&self) -> f32 {
        self.roc_threshold_hz_per_s
    }

    /// Returns the rate-of-change clamp in Hz/s.
    #[must_use]
    pub const fn roc_ceiling(&self) -> f32 {
        self.roc_ceiling
    }

    /// Applies a runtime threshold change and returns the updated config.
    #[must_use]
    pub fn with_update(mut self, update: ThresholdUpdate) -> Self {
        match update {
            ThresholdUpdate::MinFrequency(hz) => {
                self.min_frequency_hz = FrequencySample::new(hz).hz();
            }
            ThresholdUpdate::RateOfChange(hz_per_s) => {
                self.roc_threshold_hz_per_s = if hz_per_s.is_nan() {
                    0.0
                } else {
                    hz_per_s.clamp(0.0, self.roc_ceiling)
                };
            }
        }
        self
    }
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_MIN_FREQUENCY_HZ,
            DEFAULT_ROC_THRESHOLD_HZ_PER_S,
            DEFAULT_ROC_CEILING_HZ_PER_S,
        )
    }
}

/// Runtime adjustment of one stability threshold.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ThresholdUpdate {
    /// New under-frequency threshold in Hz.
    MinFrequency(f32),
    /// New rate-of-change threshold in Hz/s.
    RateOfChange(f32),
}

impl fmt::Display for ThresholdUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdUpdate::MinFrequency(hz) => write!(f, "freq={hz:.2}Hz"),
            ThresholdUpdate::RateOfChange(roc) => write!(f, "roc={roc:.2}Hz/s"),
        }
    }
}

/// Circular buffer of samples paired with their rate-of-change.
///
/// The cursor names the slot written by the next sample. It starts at the
/// last slot, so the second sample ever stored already exercises the wrap
/// from `N - 1` to `0`.
#[derive(Clone, Debug)]
pub struct FrequencyHistory<const N: usize = HISTORY_DEPTH> {
    samples: [f32; N],
    roc: [f32; N],
    cursor: usize,
    written: usize,
}

impl<const N: usize> FrequencyHistory<N> {
    /// Creates an empty history.
    #[must_use]
    pub const fn new() -> Self {
        assert!(N > 1, "history needs at least two slots");
        Self {
            samples: [0.0; N],
            roc: [0.0; N],
            cursor: N - 1,
            written: 0,
        }
    }

    /// Slot the next sample will overwrite.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of samples stored, saturating at the capacity.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.written
    }

    /// Returns `true` before the first sample arrives.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Fixed capacity of the history.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Raw frequency stored at `index`.
    #[must_use]
    pub fn sample_at(&self, index: usize) -> Option<f32> {
        self.samples.get(index).copied()
    }

    /// Raw rate-of-change stored at `index`.
    #[must_use]
    pub fn roc_at(&self, index: usize) -> Option<f32> {
        self.roc.get(index).copied()
    }

    /// Newest `(frequency, rate-of-change)` pair.
    #[must_use]
    pub fn latest(&self) -> Option<(FrequencySample, f32)> {
        if self.is_empty() {
            return None;
        }

        let index = Self::predecessor(self.cursor);
        Some((FrequencySample(self.samples[index]), self.roc[index]))
    }

    /// Iterates stored pairs from the oldest to the newest.
    pub fn iter_oldest_first(&self) -> impl Iterator<Item = (FrequencySample, f32)> + '_ {
        let start = (self.cursor + N - self.written) % N;
        (0..self.written).map(move |offset| {
            let index = (start + offset) % N;
            (FrequencySample(self.samples[index]), self.roc[index])
        })
    }

    /// Stores `sample` at the cursor and returns its clamped rate-of-change.
    fn push(&mut self, sample: FrequencySample, ceiling: f32) -> f32 {
        let index = self.cursor;
        let previous = self.samples[Self::predecessor(index)];
        let current = sample.hz();

        let roc = rate_of_change(previous, current).clamp(-ceiling, ceiling);

        self.samples[index] = current;
        self.roc[index] = roc;
        self.cursor = (index + 1) % N;
        self.written = (self.written + 1).min(N);

        roc
    }

    const fn predecessor(index: usize) -> usize {
        if index == 0 { N - 1 } else { index - 1 }
    }
}

impl<const N: usize> Default for FrequencyHistory<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Frequency delta divided by the mean period of the two cycles, in Hz/s.
#[must_use]
pub fn rate_of_change(previous_hz: f32, current_hz: f32) -> f32 {
    let sum = previous_hz + current_hz;
    if sum <= 0.0 {
        return 0.0;
    }

    (current_hz - previous_hz) * 2.0 * current_hz * previous_hz / sum
}

/// Tracks the sample history and classifies each new reading.
#[derive(Clone, Debug)]
pub struct StabilityEstimator<const N: usize = HISTORY_DEPTH> {
    config: StabilityConfig,
    history: FrequencyHistory<N>,
    verdict: StabilityVerdict,
}

impl<const N: usize> StabilityEstimator<N> {
    /// Creates an estimator with the provided thresholds.
    #[must_use]
    pub const fn new(config: StabilityConfig) -> Self {
        Self {
            config,
            history: FrequencyHistory::new(),
            verdict: StabilityVerdict::Stable,
        }
    }

    /// Records a sample and returns the verdict for it.
    pub fn ingest(&mut self, sample: FrequencySample) -> StabilityVerdict {
        let roc = self.history.push(sample, self.config.roc_ceiling);
        self.verdict = self.classify(sample.hz(), roc);
        self.verdict
    }

    /// Most recent verdict (stable before any sample arrives).
    #[must_use]
    pub const fn verdict(&self) -> StabilityVerdict {
        self.verdict
    }

    /// Read-only access to the history.
    #[must_use]
    pub const fn history(&self) -> &FrequencyHistory<N> {
        &self.history
    }

    /// Active thresholds.
    #[must_use]
    pub const fn config(&self) -> &StabilityConfig {
        &self.config
    }

    /// Replaces one threshold. The cached verdict is left untouched until the
    /// next sample arrives.
    pub fn apply(&mut self, update: ThresholdUpdate) {
        self.config = self.config.with_update(update);
    }

    fn classify(&self, hz: f32, roc: f32) -> StabilityVerdict {
        if hz < self.config.min_frequency_hz || roc.abs() > self.config.roc_threshold_hz_per_s {
            StabilityVerdict::Unstable
        } else {
            StabilityVerdict::Stable
        }
    }
}

impl<const N: usize> Default for StabilityEstimator<N> {
    fn default() -> Self {
        Self::new(StabilityConfig::default())
    }
}
