use serde::{Deserialize, Serialize};
use std::fmt;

/// The two logical streams fused by the altimeter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    #[serde(rename = "pressure_sensor")]
    Pressure,
    #[serde(rename = "gps_sensor")]
    Gps,
}

impl StreamKind {
    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::Pressure => "pressure_sensor",
            StreamKind::Gps => "gps_sensor",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw sensor payload before any model is applied.
///
/// Pressure feeds carry a scalar (Pa), GPS feeds carry
/// `[latitude, longitude, altitude]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorPayload {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl SensorPayload {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            SensorPayload::Scalar(v) => Some(*v),
            SensorPayload::Vector(_) => None,
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            SensorPayload::Scalar(_) => 1,
            SensorPayload::Vector(values) => values.len(),
        }
    }
}

impl fmt::Display for SensorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorPayload::Scalar(v) => write!(f, "{}", v),
            SensorPayload::Vector(values) => write!(f, "{:?}", values),
        }
    }
}

/// One entry of a sensor queue. `payload: None` is the feed's placeholder
/// for "nothing measured at this instant".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub timestamp: f64,
    pub payload: Option<SensorPayload>,
}

impl RawReading {
    pub fn present(timestamp: f64, payload: SensorPayload) -> Self {
        Self { timestamp, payload: Some(payload) }
    }

    pub fn absent(timestamp: f64) -> Self {
        Self { timestamp, payload: None }
    }
}

/// A reading handed out by a sensor source. Always carries a payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimestampedReading {
    pub timestamp: f64,
    pub payload: SensorPayload,
}

/// A scalar value with its timestamp (filtered or model output).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimestampedSample {
    pub timestamp: f64,
    pub value: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PressureData {
    pub timestamp: f64,
    pub pressure_pa: f64,
}

impl From<PressureData> for RawReading {
    fn from(data: PressureData) -> Self {
        RawReading::present(data.timestamp, SensorPayload::Scalar(data.pressure_pa))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GpsData {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl From<GpsData> for RawReading {
    fn from(data: GpsData) -> Self {
        RawReading::present(
            data.timestamp,
            SensorPayload::Vector(vec![data.latitude, data.longitude, data.altitude]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_serializes_untagged() {
        let scalar = serde_json::to_string(&SensorPayload::Scalar(101325.0)).unwrap();
        assert_eq!(scalar, "101325.0");

        let parsed: SensorPayload = serde_json::from_str("[1.2,2.3,4.5]").unwrap();
        assert_eq!(parsed, SensorPayload::Vector(vec![1.2, 2.3, 4.5]));
        assert_eq!(parsed.arity(), 3);
        assert_eq!(parsed.as_scalar(), None);
    }

    #[test]
    fn test_stream_names() {
        assert_eq!(StreamKind::Pressure.to_string(), "pressure_sensor");
        let gps: StreamKind = serde_json::from_str("\"gps_sensor\"").unwrap();
        assert_eq!(gps, StreamKind::Gps);
    }

    #[test]
    fn test_gps_data_into_reading() {
        let reading: RawReading = GpsData {
            timestamp: 3.0,
            latitude: 40.0,
            longitude: -120.0,
            altitude: 105.0,
        }
        .into();
        assert_eq!(reading.payload, Some(SensorPayload::Vector(vec![40.0, -120.0, 105.0])));
    }
}
