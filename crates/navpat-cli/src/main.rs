//! `navpat` – field-robot pattern driver.
//!
//! * `navpat run <config>` drives the configured pattern on the vehicle and
//!   records a session log (meta file plus command/telemetry log).
//! * `navpat replay <meta>` runs the same control code against a recorded
//!   session.  By default every command must match the recording; `--force`
//!   only feeds the recorded inputs.
//!
//! **Ctrl-C** during `run` asserts the operator emergency stop: the vehicle
//! brakes and the run goes through the normal shutdown sequence.

mod config;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

use navpat_hal::{ChannelMode, LiveChannel, ReplayChannel, SessionLog, SimVehicle};
use navpat_perception::PoseEstimator;
use navpat_runtime::{
    FrameProbe, ImageProcessor, MotionExecutor, PatternRunner, Robot, RunOutcome, RunReport,
    ViewerCollector,
};
use navpat_types::{NavError, Pose};

use config::Config;

#[derive(Parser)]
#[command(name = "navpat")]
#[command(about = "Drive a field robot along a lap pattern, or replay a recorded run")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drive the pattern on the vehicle and record a session log
    Run {
        /// Configuration file (TOML)
        config: PathBuf,

        /// Free-text note stored in the session meta file
        #[arg(long)]
        note: Option<String>,

        /// Directory for the session logs
        #[arg(long, default_value = ".")]
        log_dir: PathBuf,
    },
    /// Re-run the control code against a recorded session
    Replay {
        /// Session meta file (`meta_*.toml`)
        logfile: PathBuf,

        /// Collect visualization records into `<logfile>.viewer.json`
        #[arg(long)]
        view: bool,

        /// Do not require the commands to match the recording
        #[arg(short = 'F', long)]
        force: bool,

        /// Use this configuration instead of the one stored in the session
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _tracing = navpat_runtime::init_tracing("navpat");

    let result = match cli.command {
        Command::Run {
            config,
            note,
            log_dir,
        } => run(&config, note, &log_dir),
        Command::Replay {
            logfile,
            view,
            force,
            config,
        } => replay(&logfile, view, force, config.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// run
// ─────────────────────────────────────────────────────────────────────────────

fn run(config_path: &Path, note: Option<String>, log_dir: &Path) -> Result<(), NavError> {
    let cfg = match config::load_from(config_path) {
        Ok(cfg) => {
            println!("  Config loaded from {}", config_path.display().to_string().bold());
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            Config::default()
        }
    };

    let session = SessionLog::create(log_dir, note, cfg.source.clone())?;
    println!(
        "  Recording session to {}",
        session.meta_path().display().to_string().bold()
    );

    let operator_stop = Arc::new(AtomicBool::new(false));
    let flag = operator_stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – emergency stop".yellow().bold());
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; operator emergency stop unavailable");
    }

    let mut robot = live_robot(&cfg, &session, operator_stop)?;
    let result = runner(&cfg).run(&mut robot);
    let closed = robot.close();

    let report = result?;
    closed?;
    print_report(&report);
    Ok(())
}

/// Robot over the real-time vehicle, recording into `session`.  Camera
/// frames go to an image worker rooted at the session directory.
fn live_robot(
    cfg: &Config,
    session: &SessionLog,
    operator_stop: Arc<AtomicBool>,
) -> Result<Robot<LiveChannel<SimVehicle>>, NavError> {
    let mut tuning = cfg.vehicle_tuning();
    tuning.realtime = true;
    let [x, y, heading] = cfg.localization.pose;
    let vehicle = SimVehicle::new(tuning, Pose::new(x, y, heading));
    let channel = LiveChannel::new(vehicle)
        .with_session(session)?
        .with_operator_stop(operator_stop);

    let frames = FrameProbe::new(session_dir(session.meta_path()));
    Ok(Robot::new(channel, PoseEstimator::from_config(&cfg.localization))
        .with_image_processor(ImageProcessor::spawn(frames)))
}

fn session_dir(meta_path: &Path) -> PathBuf {
    meta_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

// ─────────────────────────────────────────────────────────────────────────────
// replay
// ─────────────────────────────────────────────────────────────────────────────

fn replay(
    logfile: &Path,
    view: bool,
    force: bool,
    config_path: Option<&Path>,
) -> Result<(), NavError> {
    let session = SessionLog::open(logfile)?;
    let cfg = replay_config(&session, config_path);
    let mode = ChannelMode::replay(force);
    println!(
        "  Replaying {} ({})",
        logfile.display().to_string().bold(),
        mode.to_string().cyan()
    );

    let frames_dir = session_dir(logfile);
    let channel = ReplayChannel::open(&session, mode)?;
    let mut robot = Robot::new(channel, PoseEstimator::from_config(&cfg.localization))
        .with_image_processor(ImageProcessor::spawn(FrameProbe::new(&frames_dir)));
    if view {
        robot.attach("viewer", ViewerCollector::default().with_image_dir(&frames_dir))?;
    }

    let result = runner(&cfg).run(&mut robot);
    let closed = robot.close();

    if view {
        write_viewer_records(logfile, &robot)?;
    }
    let report = result?;
    closed?;
    print_report(&report);
    Ok(())
}

/// `--config` wins, then the configuration stored with the session.
fn replay_config(session: &SessionLog, config_path: Option<&Path>) -> Config {
    if let Some(path) = config_path {
        return config::load_from(path).unwrap_or_else(|e| {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            Config::default()
        });
    }
    match session.meta().config.as_deref().map(config::parse_str) {
        Some(Ok(cfg)) => cfg,
        Some(Err(e)) => {
            println!("{}: {}", "Stored config error".red(), e);
            Config::default()
        }
        None => {
            info!("session has no stored config, using defaults");
            Config::default()
        }
    }
}

fn write_viewer_records<T: navpat_hal::TelemetryChannel>(
    logfile: &Path,
    robot: &Robot<T>,
) -> Result<(), NavError> {
    let mut path = logfile.as_os_str().to_owned();
    path.push(".viewer.json");
    let path = PathBuf::from(path);

    let file = File::create(&path)
        .map_err(|e| NavError::SessionLog(format!("{}: {e}", path.display())))?;
    serde_json::to_writer(BufWriter::new(file), &robot.state.viewer_data)
        .map_err(|e| NavError::SessionLog(format!("{}: {e}", path.display())))?;
    println!(
        "  {} viewer records written to {}",
        robot.state.viewer_data.len(),
        path.display().to_string().bold()
    );
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn runner(cfg: &Config) -> PatternRunner {
    PatternRunner::new(cfg.pattern, MotionExecutor::new(cfg.motion), cfg.safety)
}

fn print_report(report: &RunReport) {
    println!();
    match &report.outcome {
        RunOutcome::Completed => println!("  {} pattern completed", "✓".green().bold()),
        RunOutcome::Aborted(signal) => println!(
            "  {} aborted by {}: {}",
            "✗".red().bold(),
            signal.interlock().bold(),
            signal
        ),
        RunOutcome::LogExhausted => {
            println!("  {} session log ended before the pattern", "•".yellow().bold())
        }
    }
    println!("  Laps completed: {}", report.laps_completed);
    if report.timeouts > 0 {
        println!("  Primitive timeouts: {}", report.timeouts.to_string().yellow());
    }
}

fn print_error(e: &NavError) {
    match e {
        NavError::ReplayMismatch {
            record,
            expected,
            actual,
        } => {
            eprintln!("{} at log record {}", "Replay mismatch".red().bold(), record);
            eprintln!("  expected: {}", expected.green());
            eprintln!("  actual:   {}", actual.red());
            eprintln!("  Re-run with {} to replay inputs only.", "--force".bold());
        }
        other => eprintln!("{}: {}", "Error".red().bold(), other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_robot_processes_camera_frames() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config::parse_str("[johndeere]\ncamera_period = 0.25\n").unwrap();
        let session = SessionLog::create(dir.path(), None, cfg.source.clone()).unwrap();
        let mut robot = live_robot(&cfg, &session, Arc::new(AtomicBool::new(false))).unwrap();

        // First frame at 0.25 s; the worker reports on a later tick.
        for _ in 0..10 {
            robot.update().unwrap();
        }
        robot.close().unwrap();

        let report = robot.state.camera.as_ref().expect("camera report");
        assert!(report.image.path.starts_with("sim/frame_"));
        // No such file under the session directory.
        assert_eq!(report.landmarks, None);
    }
}
