use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;

use altimeter_rs::config::AltimeterConfig;
use altimeter_rs::sensor_model::StandardAtmosphereModel;
use altimeter_rs::simulation::{rmse, ScenarioConfig, SyntheticScenario};
use altimeter_rs::telemetry::{JsonLinesSink, MemorySink, TelemetrySink};

#[derive(Parser, Debug)]
#[command(name = "altimeter")]
#[command(about = "Barometric altimeter with GPS drift correction - synthetic climb comparison", long_about = None)]
struct Args {
    /// Number of synthetic samples
    #[arg(long, default_value = "1000")]
    samples: usize,

    /// RNG seed for the scenario
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Probability of a GPS fix per sample
    #[arg(long, default_value = "0.1")]
    gps_probability: f64,

    /// Pressure window size (samples)
    #[arg(long, default_value = "16")]
    buffer_size: usize,

    /// GPS window size as a fraction of the pressure window
    #[arg(long, default_value = "0.5")]
    gps_factor: f64,

    /// Seconds without data before a run ends
    #[arg(long, default_value = "5.0")]
    max_idle: f64,

    /// Directory for the telemetry log of the GPS-aided run (none = no log)
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    println!("[{}] Altimeter RS Starting", ts_now());
    println!("  Samples: {} (seed {})", args.samples, args.seed);
    println!("  GPS probability: {}", args.gps_probability);
    println!("  Pressure window: {} (gps factor {})", args.buffer_size, args.gps_factor);

    let mut config = AltimeterConfig::default();
    config.fusion.pressure_buffer_size = args.buffer_size;
    config.fusion.gps_data_size_factor = args.gps_factor;
    config.fusion.max_idle_time = args.max_idle;
    config.validate()?;

    let scenario_config = ScenarioConfig {
        samples: args.samples,
        gps_probability: args.gps_probability,
        seed: args.seed,
        ..ScenarioConfig::default()
    };
    let model = StandardAtmosphereModel::default();
    let scenario = SyntheticScenario::generate(&scenario_config, &model)?;
    println!("[{}] Generated {} samples, {} GPS fixes", ts_now(), scenario.ground_truth.len(), scenario.gps_fixes());

    let sink: Box<dyn TelemetrySink> = match args.output_dir.as_ref() {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(format!("altimeter_{}.jsonl.gz", ts_now_clean()));
            println!("  Telemetry: {}", path.display());
            Box::new(JsonLinesSink::create(path))
        }
        None => Box::new(MemorySink::new()),
    };

    let with_gps = scenario.run(&config, true, sink)?;
    let without_gps = scenario.run(&config, false, Box::new(MemorySink::new()))?;

    println!("\n=== Final Stats ===");
    println!("Estimates: {}", with_gps.corrected_elevations.len());
    println!("GPS fixes used: {}", with_gps.gps_samples);
    println!("Rejected samples: {}", with_gps.rejected_samples);
    println!("Final bias: {:.2} m", with_gps.final_bias);
    println!("RMSE with GPS: {:.2} m", rmse(&with_gps.corrected_elevations, &scenario.ground_truth));
    println!("RMSE without GPS: {:.2} m", rmse(&without_gps.corrected_elevations, &scenario.ground_truth));

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
