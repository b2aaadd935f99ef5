use std::path::{Path, PathBuf};

use clap::Parser;
use serde_json::{json, Value};

use altimeter_rs::clock::ManualClock;
use altimeter_rs::config::AltimeterConfig;
use altimeter_rs::sensors::replay_source;
use altimeter_rs::telemetry::{load_records, split_streams, MemorySink};
use altimeter_rs::types::StreamKind;

#[derive(Parser, Debug)]
struct Args {
    /// Path to an altimeter_*.jsonl[.gz] telemetry log
    #[arg(long, conflicts_with = "golden_dir")]
    log: Option<PathBuf>,

    /// Directory of telemetry logs to batch replay (processes altimeter_*.jsonl[.gz])
    #[arg(long)]
    golden_dir: Option<PathBuf>,

    /// Replay the pressure stream only
    #[arg(long, default_value_t = false)]
    no_gps: bool,

    /// Pressure window size (samples)
    #[arg(long, default_value = "16")]
    buffer_size: usize,

    /// GPS window size as a fraction of the pressure window
    #[arg(long, default_value = "0.5")]
    gps_factor: f64,

    /// Idle timeout in replay time units
    #[arg(long, default_value = "5.0")]
    max_idle: f64,
}

fn run_once(path: &Path, args: &Args) -> anyhow::Result<Value> {
    let records = load_records(path)?;
    let logs = split_streams(&records);

    let mut config = AltimeterConfig::default();
    config.fusion.pressure_buffer_size = args.buffer_size;
    config.fusion.gps_data_size_factor = args.gps_factor;
    config.fusion.max_idle_time = args.max_idle;

    let pressure = replay_source(StreamKind::Pressure.name(), logs.pressure.iter().cloned());
    let gps = if args.no_gps {
        replay_source(StreamKind::Gps.name(), std::iter::empty())
    } else {
        replay_source(StreamKind::Gps.name(), logs.gps.iter().cloned())
    };

    let mut engine = config.build_engine(
        Box::new(pressure),
        Box::new(gps),
        Box::new(MemorySink::new()),
        Box::new(ManualClock::stepping(0.0, 1.0)),
    )?;
    let report = engine.run()?;

    let estimates = &report.corrected_elevations;
    let min_estimate = estimates.iter().copied().reduce(f64::min);
    let max_estimate = estimates.iter().copied().reduce(f64::max);

    Ok(json!({
        "log": path.display().to_string(),
        "records": records.len(),
        "gps_enabled": !args.no_gps,
        "buffer_size": args.buffer_size,
        "gps_factor": args.gps_factor,
        "ticks": report.ticks,
        "pressure_samples": report.pressure_samples,
        "gps_samples": report.gps_samples,
        "rejected_samples": report.rejected_samples,
        "estimates": estimates.len(),
        "final_estimate": estimates.last(),
        "min_estimate": min_estimate,
        "max_estimate": max_estimate,
        "final_bias": report.final_bias
    }))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let mut results = Vec::new();

    if let Some(dir) = args.golden_dir.as_ref() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !(name.starts_with("altimeter_") && (name.ends_with(".jsonl") || name.ends_with(".jsonl.gz"))) {
                continue;
            }
            match run_once(&path, &args) {
                Ok(res) => results.push(res),
                Err(e) => eprintln!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &args)?);
    } else {
        anyhow::bail!("Provide --log or --golden-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
