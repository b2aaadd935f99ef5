//! Sensor models: convert one raw reading into an elevation in meters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{AltimeterError, Result};
use crate::types::{SensorPayload, StreamKind};

/// Stateless conversion from a raw payload to a scalar elevation.
pub trait SensorModel: Send + Sync {
    fn estimate(&self, payload: &SensorPayload) -> Result<f64>;

    fn name(&self) -> &'static str;
}

/// Standard atmosphere pressure model: `elevation = a - b * pressure^c`.
///
/// Coefficients follow the Portland State Aerospace Society derivation, e.g.
/// `a = 44330.8`, `b = 4946.54`, `c = 0.1902632` for pressure in Pa.
#[derive(Clone, Debug, PartialEq)]
pub struct StandardAtmosphereModel {
    a: f64,
    b: f64,
    c: f64,
}

impl StandardAtmosphereModel {
    pub fn new(a: f64, b: f64, c: f64) -> Result<Self> {
        for (key, value) in [("a", a), ("b", b), ("c", c)] {
            if !value.is_finite() {
                return Err(AltimeterError::Configuration(format!(
                    "model parameter {} must be a real number, got {}",
                    key, value
                )));
            }
        }
        Ok(Self { a, b, c })
    }

    pub fn from_parameters(parameters: &BTreeMap<String, f64>) -> Result<Self> {
        let get = |key: &str| {
            parameters.get(key).copied().ok_or_else(|| {
                AltimeterError::Configuration(format!("model parameter {} missing", key))
            })
        };
        Self::new(get("a")?, get("b")?, get("c")?)
    }

    /// Inverse of the model, used to synthesize pressure for a known elevation.
    pub fn pressure_at(&self, elevation: f64) -> f64 {
        ((self.a - elevation) / self.b).powf(1.0 / self.c)
    }

    pub fn elevation_from_pressure(&self, pressure: f64) -> Result<f64> {
        if !pressure.is_finite() {
            return Err(AltimeterError::InvalidInput(format!(
                "pressure must be a real number, got {}",
                pressure
            )));
        }
        let elevation = self.a - self.b * pressure.powf(self.c);
        if !elevation.is_finite() {
            return Err(AltimeterError::InvalidInput(format!(
                "pressure {} has no real elevation",
                pressure
            )));
        }
        Ok(elevation)
    }
}

impl Default for StandardAtmosphereModel {
    fn default() -> Self {
        Self { a: 44330.8, b: 4946.54, c: 0.1902632 }
    }
}

impl SensorModel for StandardAtmosphereModel {
    fn estimate(&self, payload: &SensorPayload) -> Result<f64> {
        match payload {
            SensorPayload::Scalar(pressure) => self.elevation_from_pressure(*pressure),
            SensorPayload::Vector(values) => Err(AltimeterError::InvalidInput(format!(
                "pressure data must be a single real number, got {} values",
                values.len()
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "standard_atmosphere"
    }
}

/// GPS model: the payload is `[latitude, longitude, altitude]` and the
/// elevation is the altitude component as reported.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StandardGpsModel;

impl SensorModel for StandardGpsModel {
    fn estimate(&self, payload: &SensorPayload) -> Result<f64> {
        let values = match payload {
            SensorPayload::Vector(values) if values.len() == 3 => values,
            other => {
                return Err(AltimeterError::InvalidInput(format!(
                    "gps data must hold latitude, longitude and altitude, got {} values",
                    other.arity()
                )))
            }
        };
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(AltimeterError::InvalidInput(format!(
                "gps data must be real numbers, got {}",
                bad
            )));
        }
        Ok(values[2])
    }

    fn name(&self) -> &'static str {
        "standard_gps"
    }
}

/// Model selection made at configuration time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelConfig {
    StandardAtmosphere { parameters: BTreeMap<String, f64> },
    StandardGps,
}

impl ModelConfig {
    pub fn standard_atmosphere(a: f64, b: f64, c: f64) -> Self {
        let parameters = [("a", a), ("b", b), ("c", c)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        ModelConfig::StandardAtmosphere { parameters }
    }

    /// The stream whose payloads this model understands.
    pub fn stream(&self) -> StreamKind {
        match self {
            ModelConfig::StandardAtmosphere { .. } => StreamKind::Pressure,
            ModelConfig::StandardGps => StreamKind::Gps,
        }
    }

    pub fn build(&self) -> Result<Arc<dyn SensorModel>> {
        Ok(match self {
            ModelConfig::StandardAtmosphere { parameters } => {
                Arc::new(StandardAtmosphereModel::from_parameters(parameters)?)
            }
            ModelConfig::StandardGps => Arc::new(StandardGpsModel),
        })
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig::standard_atmosphere(44330.8, 4946.54, 0.1902632)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn unit_model() -> StandardAtmosphereModel {
        StandardAtmosphereModel::new(3.0, 2.0, 1.0).unwrap()
    }

    #[test]
    fn test_standard_atmosphere() {
        let model = unit_model();
        assert_abs_diff_eq!(model.estimate(&SensorPayload::Scalar(1.0)).unwrap(), 1.0);

        let sqrt_model = StandardAtmosphereModel::new(10.0, 2.0, 0.5).unwrap();
        assert_abs_diff_eq!(sqrt_model.estimate(&SensorPayload::Scalar(16.0)).unwrap(), 2.0);
    }

    #[test]
    fn test_missing_parameter_is_configuration_error() {
        let mut parameters = BTreeMap::new();
        parameters.insert("a".to_string(), 10.0);
        parameters.insert("b".to_string(), 2.0);
        let err = StandardAtmosphereModel::from_parameters(&parameters).unwrap_err();
        assert!(matches!(err, AltimeterError::Configuration(ref m) if m.contains("parameter c")));

        parameters.insert("c".to_string(), 0.5);
        assert!(StandardAtmosphereModel::from_parameters(&parameters).is_ok());
    }

    #[test]
    fn test_pressure_rejects_vector_payload() {
        let err = unit_model()
            .estimate(&SensorPayload::Vector(vec![1.0, 2.0]))
            .unwrap_err();
        assert!(matches!(err, AltimeterError::InvalidInput(_)));
        assert!(unit_model().estimate(&SensorPayload::Scalar(f64::NAN)).is_err());
    }

    #[test]
    fn test_pressure_inverse_round_trips() {
        let model = StandardAtmosphereModel::new(44330.8, 4946.54, 0.1902632).unwrap();
        let pressure = model.pressure_at(250.0);
        assert_abs_diff_eq!(model.elevation_from_pressure(pressure).unwrap(), 250.0, epsilon = 1e-6);
    }

    #[test]
    fn test_gps_model() {
        let model = StandardGpsModel;
        assert_abs_diff_eq!(
            model.estimate(&SensorPayload::Vector(vec![1.2, 2.3, 4.5])).unwrap(),
            4.5
        );
        assert!(model.estimate(&SensorPayload::Scalar(1.0)).is_err());
        assert!(model.estimate(&SensorPayload::Vector(vec![1.0, 1.0])).is_err());
        assert!(model.estimate(&SensorPayload::Vector(vec![1.0, 1.0, f64::NAN])).is_err());
    }

    #[test]
    fn test_model_config_build() {
        let config: ModelConfig =
            serde_json::from_str(r#"{"model":"standard_atmosphere","parameters":{"a":3.0,"b":2.0,"c":1.0}}"#)
                .unwrap();
        let model = config.build().unwrap();
        assert_eq!(model.name(), "standard_atmosphere");
        assert_abs_diff_eq!(model.estimate(&SensorPayload::Scalar(1.0)).unwrap(), 1.0);

        let gps: ModelConfig = serde_json::from_str(r#"{"model":"standard_gps"}"#).unwrap();
        assert_eq!(gps.build().unwrap().name(), "standard_gps");

        let broken = ModelConfig::StandardAtmosphere { parameters: BTreeMap::new() };
        assert!(broken.build().is_err());
    }
}
