use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use swerve_zenoh_runtime::config::RobotConfig;
use swerve_zenoh_runtime::runtime::{self, RunOptions};

#[derive(Parser, Debug)]
#[command(name = "swerve-zenoh-runtime", about = "Swerve drive control loop over zenoh")]
struct Args {
    /// Robot parameter file (TOML); built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run against simulated devices
    #[arg(long)]
    sim: bool,

    /// Servo bus serial port, overrides the parameter file
    #[arg(short, long)]
    port: Option<String>,

    /// Drive field-oriented (true) or robot-relative (false)
    #[arg(long)]
    field_oriented: Option<bool>,
}

fn load_config(args: &Args) -> Result<RobotConfig, Box<dyn std::error::Error + Send + Sync>> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading parameters from {}", path.display());
            RobotConfig::load(path)?
        }
        None => RobotConfig::default(),
    };
    if let Some(port) = &args.port {
        config.serial_port = port.clone();
    }
    if let Some(field_oriented) = args.field_oriented {
        config.driver.field_oriented = field_oriented;
    }
    config.validate()?;
    if !args.sim {
        config.validate_servos()?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init(); // installs the subscriber globally

    let args = Args::parse();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = runtime::run(RunOptions { config, sim: args.sim }).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
