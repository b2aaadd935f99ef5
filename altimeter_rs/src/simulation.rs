//! Synthetic climb scenarios for exercising the altimeter offline.
//!
//! Ground truth climbs linearly. Pressure is the standard-atmosphere pressure
//! at the true elevation plus Gaussian noise and a linearly growing drift; GPS
//! reports the true elevation with small Gaussian noise on a random subset of
//! steps.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::clock::ManualClock;
use crate::config::AltimeterConfig;
use crate::error::{AltimeterError, Result};
use crate::sensor_fusion::RunReport;
use crate::sensor_model::StandardAtmosphereModel;
use crate::sensors::replay_source;
use crate::telemetry::TelemetrySink;
use crate::types::{GpsData, PressureData, RawReading, StreamKind};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub samples: usize,
    pub start_elevation: f64,
    pub end_elevation: f64,
    /// Std-dev of pressure noise (Pa).
    pub pressure_noise: f64,
    /// Pressure drift reached at the last sample (Pa).
    pub pressure_drift: f64,
    /// Std-dev of GPS altitude noise (m).
    pub gps_noise: f64,
    /// Chance that a step carries a GPS fix.
    pub gps_probability: f64,
    pub seed: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            samples: 1000,
            start_elevation: 1.0,
            end_elevation: 100.0,
            pressure_noise: 100.0,
            pressure_drift: 500.0,
            gps_noise: 1.0,
            gps_probability: 0.1,
            seed: 42,
        }
    }
}

/// Generated readings, one pressure and one GPS slot per step.
#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticScenario {
    pub ground_truth: Vec<f64>,
    pub pressure: Vec<RawReading>,
    pub gps: Vec<RawReading>,
}

fn linspace(start: f64, end: f64, n: usize) -> impl Iterator<Item = f64> {
    let step = if n > 1 { (end - start) / (n - 1) as f64 } else { 0.0 };
    (0..n).map(move |i| start + step * i as f64)
}

impl SyntheticScenario {
    pub fn generate(config: &ScenarioConfig, model: &StandardAtmosphereModel) -> Result<Self> {
        if !(0.0..=1.0).contains(&config.gps_probability) {
            return Err(AltimeterError::Configuration(format!(
                "gps_probability must lie in [0, 1], got {}",
                config.gps_probability
            )));
        }
        let pressure_noise = Normal::new(0.0, config.pressure_noise)
            .map_err(|e| AltimeterError::Configuration(format!("pressure noise: {}", e)))?;
        let gps_noise = Normal::new(0.0, config.gps_noise)
            .map_err(|e| AltimeterError::Configuration(format!("gps noise: {}", e)))?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let n = config.samples;

        let ground_truth: Vec<f64> =
            linspace(config.start_elevation, config.end_elevation, n).collect();
        let drift = linspace(0.0, config.pressure_drift, n);

        let mut pressure = Vec::with_capacity(n);
        let mut gps = Vec::with_capacity(n);
        for (i, (&truth, drift)) in ground_truth.iter().zip(drift).enumerate() {
            let timestamp = i as f64;
            let pressure_pa = model.pressure_at(truth) + pressure_noise.sample(&mut rng) + drift;
            pressure.push(RawReading::from(PressureData { timestamp, pressure_pa }));

            let altitude = truth + gps_noise.sample(&mut rng);
            if rng.gen::<f64>() < config.gps_probability {
                gps.push(RawReading::from(GpsData {
                    timestamp,
                    latitude: altitude,
                    longitude: altitude,
                    altitude,
                }));
            } else {
                gps.push(RawReading::absent(timestamp));
            }
        }

        Ok(Self { ground_truth, pressure, gps })
    }

    pub fn gps_fixes(&self) -> usize {
        self.gps.iter().filter(|r| r.payload.is_some()).count()
    }

    /// Replay the scenario through an engine built from `config`.
    ///
    /// Simulated time advances one unit per clock read, so the run ends a few
    /// polls after the data is exhausted.
    pub fn run(
        &self,
        config: &AltimeterConfig,
        with_gps: bool,
        sink: Box<dyn TelemetrySink>,
    ) -> Result<RunReport> {
        let pressure = replay_source(StreamKind::Pressure.name(), self.pressure.iter().cloned());
        let gps = if with_gps {
            replay_source(StreamKind::Gps.name(), self.gps.iter().cloned())
        } else {
            replay_source(StreamKind::Gps.name(), std::iter::empty())
        };
        let clock = ManualClock::stepping(0.0, 1.0);

        let mut engine =
            config.build_engine(Box::new(pressure), Box::new(gps), sink, Box::new(clock))?;
        engine.run()
    }
}

/// Root-mean-square error over paired samples; infinite when nothing pairs.
pub fn rmse(estimates: &[f64], truth: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = estimates.iter().copied().zip(truth.iter().copied()).collect();
    if pairs.is_empty() {
        return f64::INFINITY;
    }
    let sum_sq: f64 = pairs.iter().map(|(a, b)| (a - b).powi(2)).sum();
    (sum_sq / pairs.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MemorySink;
    use approx::assert_abs_diff_eq;

    fn default_model() -> StandardAtmosphereModel {
        StandardAtmosphereModel::default()
    }

    #[test]
    fn test_scenario_shape() {
        let scenario = SyntheticScenario::generate(&ScenarioConfig::default(), &default_model()).unwrap();
        assert_eq!(scenario.ground_truth.len(), 1000);
        assert_eq!(scenario.pressure.len(), 1000);
        assert_eq!(scenario.gps.len(), 1000);
        assert_abs_diff_eq!(scenario.ground_truth[0], 1.0);
        assert_abs_diff_eq!(scenario.ground_truth[999], 100.0, epsilon = 1e-9);

        let fixes = scenario.gps_fixes();
        assert!(fixes > 50 && fixes < 150, "{} fixes", fixes);
    }

    #[test]
    fn test_same_seed_same_scenario() {
        let config = ScenarioConfig { samples: 50, ..ScenarioConfig::default() };
        let a = SyntheticScenario::generate(&config, &default_model()).unwrap();
        let b = SyntheticScenario::generate(&config, &default_model()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_noise_free_pressure_inverts_to_truth() {
        let config = ScenarioConfig {
            samples: 10,
            pressure_noise: 0.0,
            pressure_drift: 0.0,
            ..ScenarioConfig::default()
        };
        let model = default_model();
        let scenario = SyntheticScenario::generate(&config, &model).unwrap();
        for (reading, truth) in scenario.pressure.iter().zip(&scenario.ground_truth) {
            let pressure = reading.payload.as_ref().and_then(|p| p.as_scalar()).unwrap();
            assert_abs_diff_eq!(model.elevation_from_pressure(pressure).unwrap(), *truth, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_bad_probability_rejected() {
        let config = ScenarioConfig { gps_probability: 1.5, ..ScenarioConfig::default() };
        assert!(matches!(
            SyntheticScenario::generate(&config, &default_model()),
            Err(AltimeterError::Configuration(_))
        ));
    }

    #[test]
    fn test_gps_reduces_drift_error() {
        let scenario = SyntheticScenario::generate(&ScenarioConfig::default(), &default_model()).unwrap();
        let config = AltimeterConfig::default();

        let with_gps = scenario.run(&config, true, Box::new(MemorySink::new())).unwrap();
        let without_gps = scenario.run(&config, false, Box::new(MemorySink::new())).unwrap();

        assert_eq!(with_gps.corrected_elevations.len(), 1000);
        assert_eq!(without_gps.corrected_elevations.len(), 1000);
        assert_eq!(without_gps.gps_samples, 0);

        let error_with = rmse(&with_gps.corrected_elevations, &scenario.ground_truth);
        let error_without = rmse(&without_gps.corrected_elevations, &scenario.ground_truth);
        assert!(error_with < error_without, "{} vs {}", error_with, error_without);
    }

    #[test]
    fn test_rmse() {
        assert_abs_diff_eq!(rmse(&[1.0, 3.0], &[1.0, 1.0]), 2.0_f64.sqrt());
        assert!(rmse(&[], &[1.0]).is_infinite());
    }
}
