// sensor_fusion.rs: pressure/GPS elevation fusion engine
//
// Pressure readings are frequent and noisy with slow drift; GPS readings are
// rare but unbiased. The engine smooths each stream over a bounded window and
// treats the difference of the two windows' means as the pressure drift,
// which it adds back onto the latest pressure-derived elevation.
//
// Known limitation: the two windows are not aligned in time, so the bias is
// only meaningful while both windows span comparable intervals.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::{mean, StreamBuffer};
use crate::clock::Clock;
use crate::error::{AltimeterError, Result};
use crate::sensor_model::SensorModel;
use crate::sensors::SensorSource;
use crate::smoothing::SmoothingFilter;
use crate::telemetry::TelemetrySink;
use crate::types::{SensorPayload, StreamKind, TimestampedReading};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Capacity of the pressure window (samples).
    pub pressure_buffer_size: usize,
    /// GPS window capacity as a fraction of the pressure window.
    pub gps_data_size_factor: f64,
    /// Seconds without data from either stream before the run ends.
    pub max_idle_time: f64,
    /// Sleep between idle polls in `run`. Zero busy-polls.
    pub poll_interval_secs: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            pressure_buffer_size: 16,
            gps_data_size_factor: 0.5,
            max_idle_time: 5.0,
            poll_interval_secs: 0.0,
        }
    }
}

impl FusionConfig {
    pub fn gps_buffer_size(&self) -> usize {
        (self.gps_data_size_factor * self.pressure_buffer_size as f64).floor() as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.pressure_buffer_size == 0 {
            return Err(AltimeterError::Configuration(
                "pressure_buffer_size must be a positive integer".to_string(),
            ));
        }
        if !(self.gps_data_size_factor.is_finite() && self.gps_data_size_factor > 0.0) {
            return Err(AltimeterError::Configuration(format!(
                "gps_data_size_factor must be a positive real, got {}",
                self.gps_data_size_factor
            )));
        }
        if self.gps_buffer_size() == 0 {
            return Err(AltimeterError::Configuration(format!(
                "gps buffer would hold no samples ({} * {})",
                self.gps_data_size_factor, self.pressure_buffer_size
            )));
        }
        if !(self.max_idle_time.is_finite() && self.max_idle_time > 0.0) {
            return Err(AltimeterError::Configuration(format!(
                "max_idle_time must be positive seconds, got {}",
                self.max_idle_time
            )));
        }
        if !(self.poll_interval_secs.is_finite() && self.poll_interval_secs >= 0.0) {
            return Err(AltimeterError::Configuration(format!(
                "poll_interval_secs must be non-negative, got {}",
                self.poll_interval_secs
            )));
        }
        Ok(())
    }
}

/// Everything one stream needs: where readings come from, how they become
/// elevations, and how they are smoothed.
pub struct StreamInputs {
    pub source: Box<dyn SensorSource>,
    pub model: Arc<dyn SensorModel>,
    pub filter: Arc<dyn SmoothingFilter>,
}

// ─── Events / outcomes ───────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum FusionEvent {
    SampleRejected { stream: StreamKind, timestamp: f64, reason: String },
    BiasUpdated { bias: f64, mean_gps: f64, mean_pressure: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Running,
    Terminated,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// Neither source had data; still within the idle budget.
    Idle,
    /// At least one sample arrived and a new estimate was appended.
    Updated { elevation: f64, events: Vec<FusionEvent> },
    /// Idle budget exhausted. Terminal.
    Terminated { idle_secs: f64 },
}

// ─── State / output ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FusionState {
    pub bias: f64,
    pub last_pressure_elevation: f64,
    pub mean_filtered_pressure: f64,
    pub corrected_elevations: Vec<f64>,
    pub last_activity_time: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusionSnapshot {
    pub engine_state: EngineState,
    pub bias: f64,
    pub mean_filtered_pressure: f64,
    pub mean_filtered_gps: Option<f64>,
    pub last_pressure_elevation: f64,
    pub estimate: Option<f64>,
    pub pressure_window: usize,
    pub gps_window: usize,
    pub estimates: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub corrected_elevations: Vec<f64>,
    pub ticks: u64,
    pub pressure_samples: u64,
    pub gps_samples: u64,
    pub rejected_samples: u64,
    pub final_bias: f64,
}

// ─── Per-stream plumbing ─────────────────────────────────────────────────────

struct StreamChannel {
    kind: StreamKind,
    source: Box<dyn SensorSource>,
    model: Arc<dyn SensorModel>,
    filter: Arc<dyn SmoothingFilter>,
    buffer: StreamBuffer,
    accepted: u64,
    rejected: u64,
}

impl StreamChannel {
    fn new(kind: StreamKind, inputs: StreamInputs, capacity: usize) -> Self {
        if inputs.filter.window_size() > capacity {
            log::warn!(
                "{} filter window ({}) exceeds buffer capacity ({}); output stays unsmoothed",
                kind,
                inputs.filter.window_size(),
                capacity
            );
        }
        Self {
            kind,
            source: inputs.source,
            model: inputs.model,
            filter: inputs.filter,
            buffer: StreamBuffer::new(capacity),
            accepted: 0,
            rejected: 0,
        }
    }

    /// Account for a dropped sample. Only recoverable errors are dropped;
    /// anything else is handed back to end the run.
    fn reject(&mut self, reading: &TimestampedReading, error: AltimeterError) -> Result<FusionEvent> {
        if !error.is_recoverable() {
            return Err(error);
        }
        log::warn!("dropping {} sample at {}: {}", self.kind, reading.timestamp, error);
        self.rejected += 1;
        Ok(FusionEvent::SampleRejected {
            stream: self.kind,
            timestamp: reading.timestamp,
            reason: error.to_string(),
        })
    }
}

// ─── The fusion engine ───────────────────────────────────────────────────────

pub struct ElevationFusion {
    config: FusionConfig,
    pressure: StreamChannel,
    gps: StreamChannel,
    sink: Box<dyn TelemetrySink>,
    clock: Box<dyn Clock>,
    state: FusionState,
    engine_state: EngineState,
    ticks: u64,
}

impl ElevationFusion {
    pub fn new(
        config: FusionConfig,
        pressure: StreamInputs,
        gps: StreamInputs,
        sink: Box<dyn TelemetrySink>,
        clock: Box<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let pressure = StreamChannel::new(StreamKind::Pressure, pressure, config.pressure_buffer_size);
        let gps = StreamChannel::new(StreamKind::Gps, gps, config.gps_buffer_size());
        let state = FusionState {
            last_activity_time: clock.now(),
            ..FusionState::default()
        };

        Ok(Self {
            config,
            pressure,
            gps,
            sink,
            clock,
            state,
            engine_state: EngineState::Running,
            ticks: 0,
        })
    }

    /// Open the telemetry sink. Required before ticking by hand; `run` does it.
    pub fn start(&mut self) -> Result<()> {
        self.sink.start()?;
        log::info!(
            "altimeter started: pressure window {}, gps window {}, idle timeout {:.1}s",
            self.pressure.buffer.capacity(),
            self.gps.buffer.capacity(),
            self.config.max_idle_time
        );
        Ok(())
    }

    /// Close the telemetry sink and summarize the run.
    pub fn finish(&mut self) -> Result<RunReport> {
        self.sink.stop()?;
        let report = self.report();
        log::info!(
            "altimeter finished: {} estimates over {} ticks ({} rejected samples)",
            report.corrected_elevations.len(),
            report.ticks,
            report.rejected_samples
        );
        Ok(report)
    }

    /// Poll until the idle timeout ends the run.
    pub fn run(&mut self) -> Result<RunReport> {
        self.start()?;
        let outcome = self.run_until_terminated();
        let report = self.finish();
        outcome?;
        report
    }

    fn run_until_terminated(&mut self) -> Result<()> {
        let pause = Duration::from_secs_f64(self.config.poll_interval_secs);
        loop {
            match self.tick()? {
                TickOutcome::Terminated { .. } => return Ok(()),
                TickOutcome::Idle if !pause.is_zero() => std::thread::sleep(pause),
                _ => {}
            }
        }
    }

    /// One poll of both sources and, if anything arrived, one new estimate.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        if self.engine_state == EngineState::Terminated {
            let idle_secs = self.clock.now() - self.state.last_activity_time;
            return Ok(TickOutcome::Terminated { idle_secs });
        }
        self.ticks += 1;

        let pressure = self.pressure.source.poll();
        let gps = self.gps.source.poll();
        let now = self.clock.now();

        if pressure.is_none() && gps.is_none() {
            let idle_secs = now - self.state.last_activity_time;
            if idle_secs > self.config.max_idle_time {
                self.engine_state = EngineState::Terminated;
                log::info!("no sensor data for {:.2}s, terminating", idle_secs);
                return Ok(TickOutcome::Terminated { idle_secs });
            }
            return Ok(TickOutcome::Idle);
        }

        self.state.last_activity_time = now;
        if let Some(ref reading) = pressure {
            self.sink.log(reading.timestamp, StreamKind::Pressure.name(), &reading.payload)?;
        }
        if let Some(ref reading) = gps {
            self.sink.log(reading.timestamp, StreamKind::Gps.name(), &reading.payload)?;
        }

        let mut events = Vec::new();

        if let Some(reading) = pressure {
            match self.process_pressure(&reading) {
                Ok(()) => self.pressure.accepted += 1,
                Err(e) => events.push(self.pressure.reject(&reading, e)?),
            }
        }

        if let Some(reading) = gps {
            match self.process_gps(&reading) {
                Ok(event) => {
                    self.gps.accepted += 1;
                    events.push(event);
                }
                Err(e) => events.push(self.gps.reject(&reading, e)?),
            }
        }

        let elevation = self.state.last_pressure_elevation + self.state.bias;
        self.state.corrected_elevations.push(elevation);
        log::debug!(
            "tick {}: elevation {:.3} (pressure {:.3}, bias {:.3})",
            self.ticks,
            elevation,
            self.state.last_pressure_elevation,
            self.state.bias
        );

        Ok(TickOutcome::Updated { elevation, events })
    }

    fn process_pressure(&mut self, reading: &TimestampedReading) -> Result<()> {
        let channel = &mut self.pressure;
        let raw_pressure = reading.payload.as_scalar().ok_or_else(|| {
            AltimeterError::InvalidInput(format!(
                "pressure data must be a single real number, got {}",
                reading.payload
            ))
        })?;
        // Validate before anything is committed to the window
        channel.model.estimate(&reading.payload)?;

        // The smoothed value must map to an elevation too, or the sample is
        // dropped with the window left as it was
        let model = &channel.model;
        channel.buffer.push_checked(
            reading.timestamp,
            raw_pressure,
            channel.filter.as_ref(),
            |filtered| model.estimate(&SensorPayload::Scalar(filtered)).map(|_| ()),
        )?;

        let elevations = channel
            .buffer
            .filtered_values()
            .iter()
            .map(|&p| channel.model.estimate(&SensorPayload::Scalar(p)))
            .collect::<Result<Vec<f64>>>()?;

        if let (Some(mean_elevation), Some(&last)) = (mean(elevations.iter().copied()), elevations.last()) {
            self.state.mean_filtered_pressure = mean_elevation;
            self.state.last_pressure_elevation = last;
        }
        Ok(())
    }

    fn process_gps(&mut self, reading: &TimestampedReading) -> Result<FusionEvent> {
        let channel = &mut self.gps;
        let elevation = channel.model.estimate(&reading.payload)?;
        channel.buffer.push(reading.timestamp, elevation, channel.filter.as_ref());

        let mean_gps = channel.buffer.mean_filtered().unwrap_or(elevation);
        // Uses whatever pressure mean is held, even if it predates this fix
        self.state.bias = mean_gps - self.state.mean_filtered_pressure;

        Ok(FusionEvent::BiasUpdated {
            bias: self.state.bias,
            mean_gps,
            mean_pressure: self.state.mean_filtered_pressure,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn estimate(&self) -> Option<f64> {
        self.state.corrected_elevations.last().copied()
    }

    pub fn corrected_elevations(&self) -> &[f64] {
        &self.state.corrected_elevations
    }

    pub fn state(&self) -> &FusionState {
        &self.state
    }

    pub fn engine_state(&self) -> EngineState {
        self.engine_state
    }

    pub fn is_terminated(&self) -> bool {
        self.engine_state == EngineState::Terminated
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn pressure_buffer(&self) -> &StreamBuffer {
        &self.pressure.buffer
    }

    pub fn gps_buffer(&self) -> &StreamBuffer {
        &self.gps.buffer
    }

    pub fn get_snapshot(&self) -> FusionSnapshot {
        FusionSnapshot {
            engine_state: self.engine_state,
            bias: self.state.bias,
            mean_filtered_pressure: self.state.mean_filtered_pressure,
            mean_filtered_gps: self.gps.buffer.mean_filtered(),
            last_pressure_elevation: self.state.last_pressure_elevation,
            estimate: self.estimate(),
            pressure_window: self.pressure.buffer.len(),
            gps_window: self.gps.buffer.len(),
            estimates: self.state.corrected_elevations.len(),
        }
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            corrected_elevations: self.state.corrected_elevations.clone(),
            ticks: self.ticks,
            pressure_samples: self.pressure.accepted,
            gps_samples: self.gps.accepted,
            rejected_samples: self.pressure.rejected + self.gps.rejected,
            final_bias: self.state.bias,
        }
    }
}
