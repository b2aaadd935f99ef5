use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::{AltimeterError, Result};

/// Windowed smoother over a stream's history.
///
/// Both histories are ordered oldest-first; the most recent raw sample is the
/// last element. `raw_history` is never empty when called by the fusion engine;
/// an empty history yields NaN.
pub trait SmoothingFilter: Send + Sync {
    fn apply(&self, raw_history: &VecDeque<f64>, filtered_history: &VecDeque<f64>) -> f64;

    /// Number of raw samples the filter needs before it stops bootstrapping.
    fn window_size(&self) -> usize;

    fn name(&self) -> &'static str;
}

/// Weighted moving average with weights normalized to sum to 1.
/// `weights[0]` applies to the most recent sample.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedMovingAverage {
    weights: Vec<f64>,
    filtered_window_size: usize,
}

impl WeightedMovingAverage {
    pub fn new(params: &MovingAverageParams) -> Result<Self> {
        let raw_window = params.raw_data_window_size.ok_or_else(|| {
            AltimeterError::Configuration("raw_data_window_size not found".to_string())
        })?;
        let filtered_window_size = params.filtered_data_window_size.ok_or_else(|| {
            AltimeterError::Configuration("filtered_data_window_size not found".to_string())
        })?;
        let weights = params
            .weights
            .as_ref()
            .ok_or_else(|| AltimeterError::Configuration("weights not found".to_string()))?;

        if raw_window == 0 {
            return Err(AltimeterError::Configuration(
                "raw_data_window_size must be at least 1".to_string(),
            ));
        }
        if weights.len() != raw_window {
            return Err(AltimeterError::Configuration(format!(
                "expected {} weights for raw_data_window_size {}, got {}",
                raw_window,
                raw_window,
                weights.len()
            )));
        }

        Ok(Self {
            weights: normalize_weights(weights)?,
            filtered_window_size,
        })
    }

    /// Uniform weights over `window` samples.
    pub fn uniform(window: usize) -> Result<Self> {
        Self::new(&MovingAverageParams::with_weights(vec![1.0; window]))
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn filtered_window_size(&self) -> usize {
        self.filtered_window_size
    }
}

impl SmoothingFilter for WeightedMovingAverage {
    fn apply(&self, raw_history: &VecDeque<f64>, _filtered_history: &VecDeque<f64>) -> f64 {
        if raw_history.len() < self.weights.len() {
            // Not enough data to fill the window yet
            return raw_history.back().copied().unwrap_or(f64::NAN);
        }
        raw_history
            .iter()
            .rev()
            .zip(self.weights.iter())
            .map(|(value, weight)| value * weight)
            .sum()
    }

    fn window_size(&self) -> usize {
        self.weights.len()
    }

    fn name(&self) -> &'static str {
        "moving_average"
    }
}

/// Hann-window smoothing over the last `window_size` samples.
/// Shorter histories use a Hann window of their own length.
#[derive(Clone, Debug)]
pub struct HannWindow {
    window_size: usize,
    // weights_by_len[n - 1] holds the normalized weights for n samples
    weights_by_len: Vec<Vec<f64>>,
}

impl HannWindow {
    pub fn new(window_size: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(AltimeterError::Configuration(
                "hann window_size must be at least 1".to_string(),
            ));
        }
        let weights_by_len = (1..=window_size)
            .map(|length| normalize_weights(&hann_taper(length)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { window_size, weights_by_len })
    }
}

/// Raised-cosine taper `0.5 - 0.5 * cos(2*pi*i / (length-1))`. Lengths below
/// three have no interior point, so they fall back to a flat window.
fn hann_taper(length: usize) -> Vec<f64> {
    if length < 3 {
        return vec![1.0; length];
    }
    let span = (length - 1) as f64;
    (0..length)
        .map(|i| 0.5 - 0.5 * (std::f64::consts::TAU * i as f64 / span).cos())
        .collect()
}

/// Scale weights to sum to one. Non-finite weights and a zero sum are
/// configuration errors.
fn normalize_weights(weights: &[f64]) -> Result<Vec<f64>> {
    if let Some(bad) = weights.iter().find(|w| !w.is_finite()) {
        return Err(AltimeterError::Configuration(format!(
            "weights must be real numbers, got {}",
            bad
        )));
    }
    let total: f64 = weights.iter().sum();
    if total == 0.0 {
        return Err(AltimeterError::Configuration(
            "weights must not sum to zero".to_string(),
        ));
    }
    Ok(weights.iter().map(|w| w / total).collect())
}

impl SmoothingFilter for HannWindow {
    fn apply(&self, raw_history: &VecDeque<f64>, _filtered_history: &VecDeque<f64>) -> f64 {
        let length = raw_history.len().min(self.window_size);
        if length == 0 {
            return f64::NAN;
        }
        let weights = &self.weights_by_len[length - 1];
        raw_history
            .iter()
            .skip(raw_history.len() - length)
            .zip(weights.iter())
            .map(|(value, weight)| value * weight)
            .sum()
    }

    fn window_size(&self) -> usize {
        self.window_size
    }

    fn name(&self) -> &'static str {
        "hann_window"
    }
}

/// First-order recursive low-pass: `alpha * raw + (1 - alpha) * previous`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LowPass {
    alpha: f64,
}

impl LowPass {
    pub fn new(alpha: f64) -> Result<Self> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(AltimeterError::Configuration(format!(
                "low-pass alpha must lie in (0, 1], got {}",
                alpha
            )));
        }
        Ok(Self { alpha })
    }

    /// Alpha for an RC filter with the given cutoff at the given sample rate.
    pub fn from_cutoff(cutoff_hz: f64, sample_rate_hz: f64) -> Result<Self> {
        let dt = 1.0 / sample_rate_hz;
        let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff_hz);
        Self::new(dt / (rc + dt))
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl SmoothingFilter for LowPass {
    fn apply(&self, raw_history: &VecDeque<f64>, filtered_history: &VecDeque<f64>) -> f64 {
        let Some(&input) = raw_history.back() else {
            return f64::NAN;
        };
        match filtered_history.back() {
            Some(&previous) => previous * (1.0 - self.alpha) + input * self.alpha,
            None => input,
        }
    }

    fn window_size(&self) -> usize {
        1
    }

    fn name(&self) -> &'static str {
        "low_pass"
    }
}

/// Keys of the moving-average configuration. All three are required; they
/// are optional here so a missing key surfaces as a configuration error
/// rather than a deserialization failure.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MovingAverageParams {
    #[serde(default)]
    pub raw_data_window_size: Option<usize>,
    #[serde(default)]
    pub filtered_data_window_size: Option<usize>,
    #[serde(default)]
    pub weights: Option<Vec<f64>>,
}

impl MovingAverageParams {
    pub fn with_weights(weights: Vec<f64>) -> Self {
        Self {
            raw_data_window_size: Some(weights.len()),
            filtered_data_window_size: Some(0),
            weights: Some(weights),
        }
    }
}

/// Filter selection made at configuration time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filter", rename_all = "snake_case")]
pub enum FilterConfig {
    MovingAverage(MovingAverageParams),
    HannWindow { window_size: usize },
    LowPass { alpha: f64 },
}

impl FilterConfig {
    pub fn moving_average(weights: Vec<f64>) -> Self {
        FilterConfig::MovingAverage(MovingAverageParams::with_weights(weights))
    }

    /// Single-sample window: the filter passes raw values through.
    pub fn passthrough() -> Self {
        Self::moving_average(vec![1.0])
    }

    pub fn build(&self) -> Result<Arc<dyn SmoothingFilter>> {
        Ok(match self {
            FilterConfig::MovingAverage(params) => Arc::new(WeightedMovingAverage::new(params)?),
            FilterConfig::HannWindow { window_size } => Arc::new(HannWindow::new(*window_size)?),
            FilterConfig::LowPass { alpha } => Arc::new(LowPass::new(*alpha)?),
        })
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::moving_average(vec![2.0, 4.0, 2.0])
    }
}
