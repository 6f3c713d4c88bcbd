mod common;

use std::io;

use navpat_hal::{LiveChannel, SimObstacle, SimTuning, SimVehicle, TelemetryChannel, VehicleBus};
use navpat_kernel::{SafetyConfig, from_fn};
use navpat_perception::{LocalizationConfig, PoseEstimator};
use navpat_runtime::{
    MotionExecutor, PatternConfig, PatternKind, PatternRunner, Robot, RobotState, RunOutcome,
    ViewerCollector,
};
use navpat_types::{AbortSignal, Command, NavError, SensorSample, TelemetryFrame, VehicleStatus};

use common::{sim_for, sim_robot, small_area};

fn runner(pattern: PatternConfig) -> PatternRunner {
    PatternRunner::new(pattern, MotionExecutor::default(), SafetyConfig::default())
}

/// Commands after the last `StopTurn`, which must all be zero-speed,
/// zero-steering drive ticks.
fn shutdown_ticks(robot: &Robot<LiveChannel<SimVehicle>>) -> usize {
    let sent = robot.channel().bus().transmitted();
    let i = sent
        .iter()
        .rposition(|c| *c == Command::StopTurn)
        .expect("shutdown must release steering");
    assert_eq!(sent[i - 1], Command::Stop, "stop precedes stop_turn");
    let tail = &sent[i + 1..];
    assert!(tail.iter().all(|c| *c
        == Command::Drive {
            speed: 0.0,
            steering: 0.0
        }));
    tail.len()
}

#[test]
fn ten_laps_then_shutdown() {
    let mut robot = sim_robot(&small_area(), SimTuning::default());
    let report = runner(PatternConfig::default()).run(&mut robot).unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.laps_completed, 10);
    assert_eq!(report.timeouts, 0);
    assert_eq!(robot.state.lap, 10);
    assert!(robot.extension_names().is_empty());

    // Shutdown waits three seconds at 20 Hz.
    assert!((60..=61).contains(&shutdown_ticks(&robot)));

    let sent = robot.channel().bus().transmitted();
    assert_eq!(sent[0], Command::Stop);
    assert_eq!(sent[1], Command::CenterSteering);

    // Back near the start of the lane, facing along it.
    let pose = robot.pose();
    assert!(pose.x.abs() < 1.0 && (pose.y - 2.5).abs() < 1.0, "{pose:?}");
}

#[test]
fn abort_on_third_lap_skips_remaining_laps() {
    let mut robot = sim_robot(&small_area(), SimTuning::default());
    robot
        .attach(
            "lap_tripwire",
            from_fn(|state: &mut RobotState, _: &SensorSample| {
                if state.lap == 3 {
                    Err(AbortSignal::NearObstacle { min_range: 0.3 })
                } else {
                    Ok(())
                }
            }),
        )
        .unwrap();

    let report = runner(PatternConfig::default()).run(&mut robot).unwrap();

    assert_eq!(
        report.outcome,
        RunOutcome::Aborted(AbortSignal::NearObstacle { min_range: 0.3 })
    );
    assert_eq!(report.laps_completed, 2);
    assert_eq!(robot.state.lap, 3);
    assert!(robot.extension_names().is_empty());

    // Abort stop, then the shutdown sequence: stop, stop_turn, wait.
    let sent = robot.channel().bus().transmitted();
    let i = sent.iter().rposition(|c| *c == Command::StopTurn).unwrap();
    assert_eq!(sent[i - 2], Command::Stop);
    assert!((60..=61).contains(&shutdown_ticks(&robot)));
}

#[test]
fn emergency_stop_aborts_the_run() {
    let tuning = SimTuning {
        emergency_stop_at: Some(5.0),
        ..SimTuning::default()
    };
    let mut robot = sim_robot(&small_area(), tuning);

    let report = runner(PatternConfig::default()).run(&mut robot).unwrap();

    assert_eq!(report.outcome, RunOutcome::Aborted(AbortSignal::EmergencyStop));
    assert_eq!(report.laps_completed, 0);
    assert!(robot.time() >= 5.0 && robot.time() < 8.5);
    shutdown_ticks(&robot);
}

#[test]
fn obstacle_in_the_lane_aborts_before_contact() {
    let tuning = SimTuning {
        obstacles: vec![SimObstacle {
            x: 4.0,
            y: 2.5,
            radius: 0.3,
        }],
        ..SimTuning::default()
    };
    let mut robot = sim_robot(&small_area(), tuning);

    let report = runner(PatternConfig::default()).run(&mut robot).unwrap();

    match report.outcome {
        RunOutcome::Aborted(AbortSignal::NearObstacle { min_range }) => assert!(min_range < 0.5),
        other => panic!("expected near-obstacle abort, got {other:?}"),
    }
    // Sensor (1.78 m ahead of the origin) never reached the obstacle.
    let truth = robot.channel().bus().pose();
    assert!(truth.x + 1.78 < 3.7, "{truth:?}");
    assert!(robot.channel().bus().speed().abs() < 1e-9);
}

#[test]
fn viewer_collects_until_extensions_detach() {
    let mut robot = sim_robot(&small_area(), SimTuning::default());
    robot.attach("viewer", ViewerCollector::default()).unwrap();
    let pattern = PatternConfig {
        laps: 1,
        ..PatternConfig::default()
    };

    let report = runner(pattern).run(&mut robot).unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(!robot.state.viewer_data.is_empty());
    // One record per ranging sample while attached, i.e. until shutdown.
    let last = robot.state.viewer_data.last().unwrap();
    assert!(last.time < robot.time());
}

#[test]
fn oval_pattern_completes() {
    let config = LocalizationConfig {
        pose: [5.0, 0.0, 0.0],
        ..LocalizationConfig::default()
    };
    let mut robot = sim_robot(&config, SimTuning::default());
    let pattern = PatternConfig {
        kind: PatternKind::Oval,
        laps: 2,
        ..PatternConfig::default()
    };

    let report = runner(pattern).run(&mut robot).unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.laps_completed, 2);
}

#[test]
fn duplicate_safety_extension_name_is_an_error() {
    let mut robot = sim_robot(&small_area(), SimTuning::default());
    robot
        .attach("landmarks", from_fn(|_: &mut RobotState, _: &SensorSample| Ok(())))
        .unwrap();

    let err = runner(PatternConfig::default()).run(&mut robot).unwrap_err();
    assert!(err.to_string().contains("landmarks"));
}

/// Status-only frames with the emergency condition held asserted.
struct EmergencyWithoutSamples {
    time: f64,
}

impl TelemetryChannel for EmergencyWithoutSamples {
    fn send_command(&mut self, _: &Command) -> Result<(), NavError> {
        Ok(())
    }

    fn poll_samples(&mut self) -> Result<Option<TelemetryFrame>, NavError> {
        self.time += 0.05;
        Ok(Some(TelemetryFrame {
            status: VehicleStatus {
                time: self.time,
                emergency_stop: true,
                ..VehicleStatus::default()
            },
            samples: Vec::new(),
        }))
    }

    fn close(&mut self) -> Result<(), NavError> {
        Ok(())
    }
}

#[test]
fn emergency_stop_aborts_on_ticks_without_samples() {
    let mut robot = Robot::new(
        EmergencyWithoutSamples { time: 0.0 },
        PoseEstimator::from_config(&small_area()),
    );
    let pattern = PatternConfig {
        laps: 1,
        ..PatternConfig::default()
    };

    let report = runner(pattern).run(&mut robot).unwrap();

    assert_eq!(report.outcome, RunOutcome::Aborted(AbortSignal::EmergencyStop));
    assert_eq!(report.laps_completed, 0);
    assert!(robot.extension_names().is_empty());
    // First tick aborts, then the three-second shutdown wait.
    assert!(robot.time() < 3.5, "{}", robot.time());
}

/// Simulated vehicle whose telemetry link drops after a number of ticks.
struct DroppingBus {
    sim: SimVehicle,
    receives_left: usize,
}

impl VehicleBus for DroppingBus {
    fn transmit(&mut self, command: &Command) -> io::Result<()> {
        self.sim.transmit(command)
    }

    fn receive(&mut self) -> io::Result<TelemetryFrame> {
        if self.receives_left == 0 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "bus off"));
        }
        self.receives_left -= 1;
        self.sim.receive()
    }
}

#[test]
fn transport_fault_stops_detaches_and_fails_the_run() {
    let bus = DroppingBus {
        sim: sim_for(&small_area(), SimTuning::default()),
        receives_left: 40,
    };
    let mut robot = Robot::new(LiveChannel::new(bus), PoseEstimator::from_config(&small_area()));

    let err = runner(PatternConfig::default()).run(&mut robot).unwrap_err();

    assert!(matches!(err, NavError::Transport(ref m) if m.contains("bus off")), "{err}");
    assert!(robot.extension_names().is_empty());
    assert_eq!(robot.state.lap, 1);
    // Best-effort stop after the failed poll.
    let sent = robot.channel().bus().sim.transmitted();
    assert_eq!(sent.last(), Some(&Command::Stop));
    assert!(sent.len() > 40);
}
