//! `sensorbridge` – command line entry point for the sensor bridges.
//!
//! ```text
//! sensorbridge [--config <path>] capture
//! sensorbridge [--config <path>] pose
//! sensorbridge calibrate <dataset_dir> <calibration_subdir> <num_samples> <first_group_size>
//! sensorbridge [--config <path>] init
//! ```
//!
//! `capture` and `pose` run until Ctrl-C, then shut their bridge down in
//! order before exiting.

mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use sensorbridge_hal::sim::SimTracker;
use sensorbridge_perception::{CalibrationReport, load_dataset};
use sensorbridge_runtime::{CaptureBridge, PoseBridge, init_tracing};
use sensorbridge_types::{BridgeError, Vec3};
use tracing::{info, warn};

use crate::config::{Config, TrackerBackend};

/// How often the main thread rechecks the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

// ─────────────────────────────────────────────────────────────────────────────
// Argument parsing
// ─────────────────────────────────────────────────────────────────────────────

/// SensorBridge - HTTP bridges for camera frames and tracker poses
#[derive(Debug, Parser)]
#[command(name = "sensorbridge")]
#[command(version, long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.sensorbridge/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, PartialEq, Subcommand)]
enum Commands {
    /// Serve POST /capture and log every frame handed to the consumer
    Capture,

    /// Poll the tracker and serve GET /pose
    Pose,

    /// Compare two groups of recorded probe positions
    Calibrate {
        /// Directory holding the recorded datasets
        dataset_dir: PathBuf,

        /// Calibration run inside the dataset directory
        calibration_subdir: PathBuf,

        /// Number of samples (0.json ..)
        num_samples: usize,

        /// Size of the first group
        first_group_size: usize,
    },

    /// Write a default config file
    Init,
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry point
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = init_tracing(service_name(&cli.command));
    let config_path = cli.config.clone().unwrap_or_else(config::config_path);

    let result = match cli.command {
        Commands::Init => run_init(&config_path),
        Commands::Calibrate {
            dataset_dir,
            calibration_subdir,
            num_samples,
            first_group_size,
        } => run_calibrate(
            &dataset_dir.join(calibration_subdir),
            num_samples,
            first_group_size,
        ),
        Commands::Capture => config::load_from(&config_path).and_then(|cfg| {
            print_banner("Capture Bridge");
            run_capture(&cfg, install_ctrlc())
        }),
        Commands::Pose => config::load_from(&config_path).and_then(|cfg| {
            print_banner("Pose Bridge");
            run_pose(&cfg, install_ctrlc())
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn service_name(command: &Commands) -> &'static str {
    match command {
        Commands::Capture => "sensorbridge-capture",
        Commands::Pose => "sensorbridge-pose",
        _ => "sensorbridge",
    }
}

/// Flag raised by Ctrl-C (and SIGTERM).
fn install_ctrlc() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; stop the process another way");
    }
    shutdown
}

fn wait_for(shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(SHUTDOWN_POLL);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn run_capture(cfg: &Config, shutdown: Arc<AtomicBool>) -> Result<(), BridgeError> {
    let mut bridge = CaptureBridge::start(cfg.capture.to_runtime()?)?;
    println!(
        "  Listening on {}  (POST /capture)",
        bridge.local_addr().to_string().bold()
    );
    println!("  Press {} to stop.\n", "Ctrl-C".bold());

    while !shutdown.load(Ordering::SeqCst) {
        if let Some((pixels, metadata)) = bridge.get_next_image_timeout(SHUTDOWN_POLL) {
            let (rows, cols) = pixels.shape();
            info!(
                rows,
                cols,
                mean = pixels.mean(),
                metadata = %serde_json::Value::Object(metadata),
                "frame consumed"
            );
        }
    }

    bridge.stop()?;
    println!("{}", "  ✓ Capture bridge stopped.".green());
    Ok(())
}

fn run_pose(cfg: &Config, shutdown: Arc<AtomicBool>) -> Result<(), BridgeError> {
    let system = match cfg.pose.tracker {
        TrackerBackend::Sim => SimTracker::demo(),
    };
    let mut bridge = PoseBridge::start(cfg.pose.to_runtime()?, system)?;
    println!(
        "  Listening on {}  (GET /pose, tracker: {})",
        bridge.local_addr().to_string().bold(),
        cfg.pose.tracker.to_string().cyan()
    );
    println!("  Press {} to stop.\n", "Ctrl-C".bold());

    wait_for(&shutdown);

    bridge.stop()?;
    println!("{}", "  ✓ Tracking session released, pose bridge stopped.".green());
    Ok(())
}

fn run_calibrate(dir: &Path, samples: usize, first_group: usize) -> Result<(), BridgeError> {
    let positions = load_dataset(dir, samples)?;
    let report = CalibrationReport::analyze(&positions, first_group)?;

    println!();
    println!("  {} {}", "Calibration check:".bold(), dir.display());
    println!(
        "  samples            {} (groups of {} and {})",
        report.samples,
        report.first_group,
        report.samples - report.first_group
    );
    println!("  mean position      {}", fmt_cm(report.mean_cm));
    println!("  group difference   {}", fmt_cm(report.group_difference_cm));
    println!(
        "  group distance     {}",
        format!("{:.3} cm", report.group_distance_cm).bold()
    );
    println!("  max deviation      {:.3} cm", report.max_deviation_cm);
    println!();
    Ok(())
}

fn fmt_cm(v: Vec3) -> String {
    format!("x {:+.3}  y {:+.3}  z {:+.3} cm", v.x, v.y, v.z)
}

fn run_init(path: &Path) -> Result<(), BridgeError> {
    if path.exists() {
        return Err(BridgeError::Config(format!(
            "{} already exists; remove it first to regenerate",
            path.display()
        )));
    }
    config::save_to(&Config::default(), path)?;
    println!(
        "  {} Config written to {}",
        "✓".green().bold(),
        path.display().to_string().bold()
    );
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner(bridge: &str) {
    println!();
    println!(
        "  {} {}  {}",
        "SensorBridge".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed(),
        bridge.bold()
    );
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("sensorbridge").chain(args.iter().copied()))
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn bridge_commands_parse() {
        assert_eq!(parse(&["capture"]).unwrap().command, Commands::Capture);
        assert_eq!(parse(&["pose"]).unwrap().command, Commands::Pose);
        assert_eq!(parse(&["init"]).unwrap().command, Commands::Init);
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn config_flag_is_accepted_after_subcommand() {
        let cli = parse(&["pose", "--config", "/tmp/sb.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/sb.toml")));
        assert_eq!(cli.command, Commands::Pose);

        let cli = parse(&["-c", "/tmp/other.toml", "capture"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/other.toml")));
        assert!(parse(&["pose", "--config"]).is_err());
    }

    #[test]
    fn calibrate_takes_four_typed_arguments() {
        let cli = parse(&["calibrate", "data", "run-3", "10", "4"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Calibrate {
                dataset_dir: PathBuf::from("data"),
                calibration_subdir: PathBuf::from("run-3"),
                num_samples: 10,
                first_group_size: 4,
            }
        );
        assert!(parse(&["calibrate", "data"]).is_err());
        assert!(parse(&["calibrate", "data", "run", "ten", "4"]).is_err());
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(parse(&["serve"]).is_err());
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        run_init(&path).unwrap();
        assert!(path.exists());
        assert!(matches!(run_init(&path), Err(BridgeError::Config(_))));
    }

    #[test]
    fn calibrate_reports_missing_dataset() {
        let dir = tempfile::tempdir().expect("tmp dir");
        assert!(matches!(
            run_calibrate(dir.path(), 3, 1),
            Err(BridgeError::Calibration(_))
        ));
    }
}
