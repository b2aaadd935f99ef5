//! Telemetry: record the raw samples an altimeter run consumed so the run can
//! be replayed later.

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{AltimeterError, Result};
use crate::types::{RawReading, SensorPayload, StreamKind};

/// Receives every raw sample the fusion engine consumes, before filtering.
pub trait TelemetrySink {
    /// Must be called before the run begins.
    fn start(&mut self) -> Result<()>;

    fn log(&mut self, timestamp: f64, stream: &str, payload: &SensorPayload) -> Result<()>;

    /// Flush and release. Fails without a prior `start`.
    fn stop(&mut self) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub timestamp: f64,
    pub stream: String,
    pub payload: SensorPayload,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SinkState {
    Idle,
    Running,
    Stopped,
}

impl SinkState {
    fn start(&mut self) -> Result<()> {
        match self {
            SinkState::Idle | SinkState::Stopped => {
                *self = SinkState::Running;
                Ok(())
            }
            SinkState::Running => Err(AltimeterError::ResourceState(
                "telemetry sink already started".to_string(),
            )),
        }
    }

    fn ensure_running(&self, operation: &str) -> Result<()> {
        match self {
            SinkState::Running => Ok(()),
            SinkState::Idle => Err(AltimeterError::ResourceState(format!(
                "telemetry sink {} before start()",
                operation
            ))),
            SinkState::Stopped => Err(AltimeterError::ResourceState(format!(
                "telemetry sink {} after stop()",
                operation
            ))),
        }
    }
}

/// Keeps records in memory. Clones share the same record list.
#[derive(Clone, Debug)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<TelemetryRecord>>>,
    state: SinkState,
}

impl MemorySink {
    pub fn new() -> Self {
        Self { records: Arc::new(Mutex::new(Vec::new())), state: SinkState::Idle }
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySink for MemorySink {
    fn start(&mut self) -> Result<()> {
        self.state.start()
    }

    fn log(&mut self, timestamp: f64, stream: &str, payload: &SensorPayload) -> Result<()> {
        self.state.ensure_running("log()")?;
        let mut records = self.records.lock().map_err(|_| {
            AltimeterError::ResourceState("Failed to acquire telemetry lock".to_string())
        })?;
        records.push(TelemetryRecord {
            timestamp,
            stream: stream.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.state.ensure_running("stop()")?;
        self.state = SinkState::Stopped;
        Ok(())
    }
}

/// Writes records as JSON lines. Records are buffered while running and
/// written on `stop()`; a `.gz` path is gzip-compressed.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    append: bool,
    state: SinkState,
    file: Option<File>,
    pending: Vec<TelemetryRecord>,
}

impl JsonLinesSink {
    /// Appends to an existing log.
    pub fn append<P: AsRef<Path>>(path: P) -> Self {
        Self::with_mode(path, true)
    }

    /// Truncates any existing log on `start()`.
    pub fn create<P: AsRef<Path>>(path: P) -> Self {
        Self::with_mode(path, false)
    }

    fn with_mode<P: AsRef<Path>>(path: P, append: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            append,
            state: SinkState::Idle,
            file: None,
            pending: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl TelemetrySink for JsonLinesSink {
    fn start(&mut self) -> Result<()> {
        self.state.start()?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(self.append)
            .truncate(!self.append)
            .open(&self.path);
        match file {
            Ok(file) => {
                self.file = Some(file);
                Ok(())
            }
            Err(e) => {
                self.state = SinkState::Idle;
                Err(e.into())
            }
        }
    }

    fn log(&mut self, timestamp: f64, stream: &str, payload: &SensorPayload) -> Result<()> {
        self.state.ensure_running("log()")?;
        self.pending.push(TelemetryRecord {
            timestamp,
            stream: stream.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.state.ensure_running("stop()")?;
        self.state = SinkState::Stopped;
        let file = self.file.take().ok_or_else(|| {
            AltimeterError::ResourceState("telemetry file is not open".to_string())
        })?;
        let records = std::mem::take(&mut self.pending);
        let writer = BufWriter::new(file);

        if is_gzip(&self.path) {
            let mut encoder = GzEncoder::new(writer, Compression::default());
            write_records(&mut encoder, &records)?;
            encoder.finish()?.flush()?;
        } else {
            let mut writer = writer;
            write_records(&mut writer, &records)?;
            writer.flush()?;
        }
        log::debug!("wrote {} telemetry records to {}", records.len(), self.path.display());
        Ok(())
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

fn write_records<W: Write>(writer: &mut W, records: &[TelemetryRecord]) -> Result<()> {
    for record in records {
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// Load a JSON-lines telemetry log (plain or `.gz`).
pub fn load_records(path: &Path) -> Result<Vec<TelemetryRecord>> {
    let file = File::open(path)?;
    let reader: Box<dyn BufRead> = if is_gzip(path) {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        records.push(serde_json::from_str(line)?);
    }
    Ok(records)
}

/// Per-stream replay queues recovered from a mixed telemetry log.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamLogs {
    pub pressure: Vec<RawReading>,
    pub gps: Vec<RawReading>,
}

impl StreamLogs {
    fn stream_mut(&mut self, kind: StreamKind) -> &mut Vec<RawReading> {
        match kind {
            StreamKind::Pressure => &mut self.pressure,
            StreamKind::Gps => &mut self.gps,
        }
    }
}

fn stream_kind(name: &str) -> Option<StreamKind> {
    [StreamKind::Pressure, StreamKind::Gps]
        .into_iter()
        .find(|k| k.name() == name)
}

/// Split a mixed log into pressure and GPS queues.
///
/// Two consecutive records from the same stream one time unit apart mean the
/// other stream produced nothing at the later instant; an absent placeholder
/// is queued for it so both replay queues advance in step.
pub fn split_streams(records: &[TelemetryRecord]) -> StreamLogs {
    let mut logs = StreamLogs::default();
    let mut previous: Option<(StreamKind, f64)> = None;

    for record in records {
        let Some(kind) = stream_kind(&record.stream) else {
            log::warn!("skipping telemetry record for unknown stream {:?}", record.stream);
            continue;
        };
        logs.stream_mut(kind)
            .push(RawReading::present(record.timestamp, record.payload.clone()));

        if let Some((prev_kind, prev_time)) = previous {
            if prev_kind == kind && (record.timestamp - (prev_time + 1.0)).abs() < 1e-9 {
                let other = match kind {
                    StreamKind::Pressure => StreamKind::Gps,
                    StreamKind::Gps => StreamKind::Pressure,
                };
                logs.stream_mut(other).push(RawReading::absent(record.timestamp));
            }
        }
        previous = Some((kind, record.timestamp));
    }
    logs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("altimeter_rs_{}_{}", std::process::id(), name))
    }

    fn record(timestamp: f64, stream: StreamKind, payload: SensorPayload) -> TelemetryRecord {
        TelemetryRecord { timestamp, stream: stream.name().to_string(), payload }
    }

    #[test]
    fn test_memory_sink_lifecycle() {
        let mut sink = MemorySink::new();
        let payload = SensorPayload::Scalar(1.0);

        assert!(matches!(sink.log(0.0, "pressure_sensor", &payload), Err(AltimeterError::ResourceState(_))));
        assert!(sink.stop().is_err());

        sink.start().unwrap();
        assert!(sink.start().is_err());
        sink.log(0.0, "pressure_sensor", &payload).unwrap();
        sink.stop().unwrap();
        assert!(sink.stop().is_err());
        assert!(sink.log(1.0, "pressure_sensor", &payload).is_err());

        assert_eq!(sink.records().len(), 1);
    }

    #[test]
    fn test_json_lines_round_trip() {
        let path = temp_path("telemetry.jsonl");
        let mut sink = JsonLinesSink::create(&path);
        sink.start().unwrap();
        sink.log(0.0, "pressure_sensor", &SensorPayload::Scalar(101325.0)).unwrap();
        sink.log(0.0, "gps_sensor", &SensorPayload::Vector(vec![1.0, 2.0, 3.0])).unwrap();
        assert_eq!(sink.pending(), 2);
        sink.stop().unwrap();

        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].payload, SensorPayload::Vector(vec![1.0, 2.0, 3.0]));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_gzip_append_keeps_both_runs() {
        let path = temp_path("telemetry.jsonl.gz");
        let _ = std::fs::remove_file(&path);
        for run in 0..2 {
            let mut sink = JsonLinesSink::append(&path);
            sink.start().unwrap();
            sink.log(run as f64, "pressure_sensor", &SensorPayload::Scalar(run as f64)).unwrap();
            sink.stop().unwrap();
        }
        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].timestamp, 1.0);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_stop_without_start_fails() {
        let mut sink = JsonLinesSink::create(temp_path("never_started.jsonl"));
        assert!(matches!(sink.stop(), Err(AltimeterError::ResourceState(_))));
    }

    #[test]
    fn test_split_inserts_placeholders() {
        let gps = || SensorPayload::Vector(vec![0.0, 0.0, 5.0]);
        let records = vec![
            record(0.0, StreamKind::Pressure, SensorPayload::Scalar(10.0)),
            record(0.0, StreamKind::Gps, gps()),
            record(1.0, StreamKind::Pressure, SensorPayload::Scalar(11.0)),
            record(2.0, StreamKind::Pressure, SensorPayload::Scalar(12.0)),
            record(2.0, StreamKind::Gps, gps()),
        ];
        let logs = split_streams(&records);

        assert_eq!(logs.pressure.len(), 3);
        assert_eq!(
            logs.gps,
            vec![
                RawReading::present(0.0, gps()),
                RawReading::absent(2.0),
                RawReading::present(2.0, gps()),
            ]
        );
    }

    #[test]
    fn test_split_skips_unknown_streams() {
        let records = vec![TelemetryRecord {
            timestamp: 0.0,
            stream: "magnetometer".to_string(),
            payload: SensorPayload::Scalar(1.0),
        }];
        assert_eq!(split_streams(&records), StreamLogs::default());
    }
}
