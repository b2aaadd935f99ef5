//! Elevation estimation from a drifting barometer and sparse GPS fixes.
//!
//! Two sensor streams are polled in lock step. Pressure readings become
//! elevations through a sensor model, GPS fixes carry altitude directly, and
//! the gap between the two windowed means corrects the barometer's drift.

pub mod buffer;
pub mod clock;
pub mod config;
pub mod error;
pub mod sensor_fusion;
pub mod sensor_model;
pub mod sensors;
pub mod simulation;
pub mod smoothing;
pub mod telemetry;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AltimeterConfig;
pub use error::{AltimeterError, Result};
pub use sensor_fusion::{
    ElevationFusion, EngineState, FusionConfig, FusionEvent, FusionSnapshot, FusionState, RunReport,
    StreamInputs, TickOutcome,
};
pub use sensor_model::{ModelConfig, SensorModel, StandardAtmosphereModel, StandardGpsModel};
pub use sensors::{replay_source, sensor_channel, ChannelSource, SensorFeed, SensorSource};
pub use smoothing::{FilterConfig, HannWindow, LowPass, SmoothingFilter, WeightedMovingAverage};
pub use telemetry::{JsonLinesSink, MemorySink, TelemetryRecord, TelemetrySink};
pub use types::{RawReading, SensorPayload, StreamKind, TimestampedReading};
