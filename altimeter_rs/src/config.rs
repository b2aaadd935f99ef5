use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{AltimeterError, Result};
use crate::sensor_fusion::{ElevationFusion, FusionConfig, StreamInputs};
use crate::sensor_model::ModelConfig;
use crate::sensors::SensorSource;
use crate::smoothing::FilterConfig;
use crate::telemetry::TelemetrySink;
use crate::types::StreamKind;

/// Full altimeter setup: window sizing plus the model and filter per stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AltimeterConfig {
    pub fusion: FusionConfig,
    pub pressure_model: ModelConfig,
    pub gps_model: ModelConfig,
    pub pressure_filter: FilterConfig,
    pub gps_filter: FilterConfig,
}

impl Default for AltimeterConfig {
    fn default() -> Self {
        Self {
            fusion: FusionConfig::default(),
            pressure_model: ModelConfig::default(),
            gps_model: ModelConfig::StandardGps,
            pressure_filter: FilterConfig::default(),
            gps_filter: FilterConfig::default(),
        }
    }
}

impl AltimeterConfig {
    pub fn validate(&self) -> Result<()> {
        self.fusion.validate()?;
        for (stream, model) in [
            (StreamKind::Pressure, &self.pressure_model),
            (StreamKind::Gps, &self.gps_model),
        ] {
            if model.stream() != stream {
                return Err(AltimeterError::Configuration(format!(
                    "{} stream configured with a {} model",
                    stream,
                    model.stream()
                )));
            }
        }
        self.pressure_model.build()?;
        self.gps_model.build()?;
        self.pressure_filter.build()?;
        self.gps_filter.build()?;
        Ok(())
    }

    pub fn pressure_inputs(&self, source: Box<dyn SensorSource>) -> Result<StreamInputs> {
        Ok(StreamInputs {
            source,
            model: self.pressure_model.build()?,
            filter: self.pressure_filter.build()?,
        })
    }

    pub fn gps_inputs(&self, source: Box<dyn SensorSource>) -> Result<StreamInputs> {
        Ok(StreamInputs {
            source,
            model: self.gps_model.build()?,
            filter: self.gps_filter.build()?,
        })
    }

    /// Assemble an engine over the given sources, sink and clock.
    pub fn build_engine(
        &self,
        pressure: Box<dyn SensorSource>,
        gps: Box<dyn SensorSource>,
        sink: Box<dyn TelemetrySink>,
        clock: Box<dyn Clock>,
    ) -> Result<ElevationFusion> {
        self.validate()?;
        ElevationFusion::new(
            self.fusion.clone(),
            self.pressure_inputs(pressure)?,
            self.gps_inputs(gps)?,
            sink,
            clock,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sensors::sensor_channel;
    use crate::smoothing::MovingAverageParams;
    use crate::telemetry::MemorySink;

    #[test]
    fn test_default_is_valid() {
        let config = AltimeterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fusion.pressure_buffer_size, 16);
        assert_eq!(config.fusion.gps_buffer_size(), 8);
    }

    #[test]
    fn test_json_round_trip_with_partial_document() {
        let json = r#"{
            "fusion": { "pressure_buffer_size": 4, "gps_data_size_factor": 1.0,
                        "max_idle_time": 2.0, "poll_interval_secs": 0.0 },
            "pressure_filter": { "filter": "hann_window", "window_size": 3 }
        }"#;
        let config: AltimeterConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.fusion.gps_buffer_size(), 4);
        assert_eq!(config.pressure_filter, FilterConfig::HannWindow { window_size: 3 });
        assert_eq!(config.gps_model, ModelConfig::StandardGps);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_filter_surfaces_as_configuration_error() {
        let config = AltimeterConfig {
            gps_filter: FilterConfig::MovingAverage(MovingAverageParams {
                raw_data_window_size: Some(2),
                filtered_data_window_size: Some(0),
                weights: Some(vec![1.0]),
            }),
            ..AltimeterConfig::default()
        };
        assert!(matches!(config.validate(), Err(AltimeterError::Configuration(_))));
    }

    #[test]
    fn test_model_must_match_its_stream() {
        let swapped: AltimeterConfig = serde_json::from_str(
            r#"{ "pressure_model": { "model": "standard_gps" } }"#,
        )
        .unwrap();
        assert!(matches!(swapped.validate(), Err(AltimeterError::Configuration(_))));

        let config = AltimeterConfig {
            gps_model: ModelConfig::default(),
            ..AltimeterConfig::default()
        };
        let (_, pressure) = sensor_channel("pressure");
        let (_, gps) = sensor_channel("gps");
        let result = config.build_engine(
            Box::new(pressure),
            Box::new(gps),
            Box::new(MemorySink::new()),
            Box::new(ManualClock::new(0.0)),
        );
        assert!(matches!(result, Err(AltimeterError::Configuration(_))));
    }

    #[test]
    fn test_build_engine_rejects_empty_gps_window() {
        let mut config = AltimeterConfig::default();
        config.fusion.pressure_buffer_size = 1;
        let (_, pressure) = sensor_channel("pressure");
        let (_, gps) = sensor_channel("gps");
        let result = config.build_engine(
            Box::new(pressure),
            Box::new(gps),
            Box::new(MemorySink::new()),
            Box::new(ManualClock::new(0.0)),
        );
        assert!(matches!(result, Err(AltimeterError::Configuration(_))));
    }
}
