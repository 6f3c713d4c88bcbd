//! [`PatternRunner`] – laps of legs with abort recovery.
//!
//! A run has one shape regardless of how it ends:
//!
//! ```text
//! stop, center_steering
//! attach detect_near, landmarks, emergency_stop
//! for lap in 1..=laps: for leg in legs: follow_line, then turn_back or U-turn
//!     ── abort ──▶ stop, detach_all, log the interlock
//! detach_all
//! stop, stop_turn, wait(shutdown_wait)
//! ```
//!
//! Aborts are never retried.  A replay log running out ends the run where it
//! is, since there is no vehicle left to command.

use std::f64::consts::PI;

use navpat_hal::TelemetryChannel;
use navpat_kernel::{EmergencyStopInterlock, NearObstacleInterlock, SafetyConfig};
use navpat_perception::LandmarkFinder;
use navpat_types::{AbortSignal, Halt, NavError};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::extensions::LandmarkTracker;
use crate::motion::{Line, MotionExecutor, PrimitiveOutcome, TurnManeuver};
use crate::robot::Robot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Along the lane to the far end, turn back, and return.
    #[default]
    ThereAndBack,
    /// Middle third of the area out and back with 180° turns in between.
    Oval,
}

/// The `pattern` configuration section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub kind: PatternKind,
    pub laps: u32,
    pub speed: f64,
    /// `y` of the there-and-back lane.
    pub lane_y: f64,
    pub leg_timeout: f64,
    /// Timeout of each 180° turn of the oval.
    pub turn_timeout: f64,
    pub oval_radius: f64,
    /// Ticks after the final stop, in seconds.
    pub shutdown_wait: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            kind: PatternKind::ThereAndBack,
            laps: 10,
            speed: 0.5,
            lane_y: 2.5,
            leg_timeout: 60.0,
            turn_timeout: 60.0,
            oval_radius: 2.5,
            shutdown_wait: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LegEnd {
    TurnBack,
    /// Stop, then 180° to the left with the given radius.
    UTurn { radius: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leg {
    pub line: Line,
    pub end: LegEnd,
}

/// Legs of one lap over an area `long_side` metres long.
pub fn legs(config: &PatternConfig, long_side: f64) -> Vec<Leg> {
    match config.kind {
        PatternKind::ThereAndBack => {
            let y = config.lane_y;
            vec![
                Leg {
                    line: Line::new((0.0, y), (long_side, y)),
                    end: LegEnd::TurnBack,
                },
                Leg {
                    line: Line::new((long_side, y), (0.0, y)),
                    end: LegEnd::TurnBack,
                },
            ]
        }
        PatternKind::Oval => {
            let r = config.oval_radius;
            let (near, far) = (long_side / 3.0, 2.0 * long_side / 3.0);
            vec![
                Leg {
                    line: Line::new((near, 0.0), (far, 0.0)),
                    end: LegEnd::UTurn { radius: r },
                },
                Leg {
                    line: Line::new((far, 2.0 * r), (near, 2.0 * r)),
                    end: LegEnd::UTurn { radius: r },
                },
            ]
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunOutcome {
    Completed,
    Aborted(AbortSignal),
    /// The replay log ended before the pattern did.
    LogExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub laps_completed: u32,
    /// Primitives that returned on timeout.
    pub timeouts: u32,
}

pub struct PatternRunner {
    pattern: PatternConfig,
    executor: MotionExecutor,
    safety: SafetyConfig,
    finder: LandmarkFinder,
}

impl PatternRunner {
    pub fn new(pattern: PatternConfig, executor: MotionExecutor, safety: SafetyConfig) -> Self {
        Self {
            pattern,
            executor,
            safety,
            finder: LandmarkFinder::default(),
        }
    }

    pub fn with_finder(mut self, finder: LandmarkFinder) -> Self {
        self.finder = finder;
        self
    }

    /// Drive the whole pattern and bring the vehicle to rest.
    ///
    /// Aborts and an exhausted replay log are outcomes, not errors.  Errors
    /// are transport faults, replay mismatches and session-log failures.
    pub fn run<T: TelemetryChannel>(&self, robot: &mut Robot<T>) -> Result<RunReport, NavError> {
        let mut report = RunReport {
            outcome: RunOutcome::Completed,
            laps_completed: 0,
            timeouts: 0,
        };

        match self.drive(robot, &mut report) {
            Ok(()) => {
                robot.detach_all();
                info!(laps = report.laps_completed, timeouts = report.timeouts, "pattern completed");
            }
            Err(Halt::Abort(signal)) => {
                let stopped = robot.stop();
                robot.detach_all();
                error!(
                    interlock = signal.interlock(),
                    lap = robot.state.lap,
                    "pattern aborted: {signal}"
                );
                report.outcome = RunOutcome::Aborted(signal);
                if let Err(e) = stopped {
                    return self.finish_early(robot, report, e);
                }
            }
            Err(Halt::Fault(e)) => return self.finish_early(robot, report, e),
        }

        match self.shutdown(robot) {
            Ok(()) => Ok(report),
            Err(Halt::Fault(e)) => self.finish_early(robot, report, e),
            // Nothing is attached any more.
            Err(Halt::Abort(signal)) => {
                warn!(interlock = signal.interlock(), "abort during shutdown ignored");
                Ok(report)
            }
        }
    }

    fn drive<T: TelemetryChannel>(
        &self,
        robot: &mut Robot<T>,
        report: &mut RunReport,
    ) -> Result<(), Halt> {
        robot.stop()?;
        robot.center_steering()?;

        robot.attach("detect_near", NearObstacleInterlock::new(self.safety))?;
        robot.attach("landmarks", LandmarkTracker::new(self.finder))?;
        robot.attach("emergency_stop", EmergencyStopInterlock)?;
        info!(extensions = ?robot.extension_names(), "extensions attached");

        let long_side = robot.state.localization.global_map().long_side();
        let legs = legs(&self.pattern, long_side);
        info!(kind = ?self.pattern.kind, laps = self.pattern.laps, long_side, "pattern start");

        for lap in 1..=self.pattern.laps {
            robot.state.lap = lap;
            info!(lap, "lap start");
            for leg in &legs {
                self.run_leg(robot, leg, report)?;
            }
            report.laps_completed = lap;
        }
        Ok(())
    }

    fn run_leg<T: TelemetryChannel>(
        &self,
        robot: &mut Robot<T>,
        leg: &Leg,
        report: &mut RunReport,
    ) -> Result<(), Halt> {
        let speed = self.pattern.speed;
        let mut count = |outcome: PrimitiveOutcome| {
            if outcome == PrimitiveOutcome::TimedOut {
                report.timeouts += 1;
            }
        };

        count(self.executor.follow_line(
            robot,
            leg.line,
            Some(speed),
            Some(self.pattern.leg_timeout),
        )?);
        match leg.end {
            LegEnd::TurnBack => count(self.executor.turn_back(robot, speed)?),
            LegEnd::UTurn { radius } => {
                robot.stop()?;
                count(self.executor.turn(
                    robot,
                    TurnManeuver {
                        angle: PI,
                        radius,
                        speed,
                        with_stop: true,
                        timeout: self.pattern.turn_timeout,
                    },
                )?);
            }
        }
        Ok(())
    }

    fn shutdown<T: TelemetryChannel>(&self, robot: &mut Robot<T>) -> Result<(), Halt> {
        robot.stop()?;
        robot.stop_turn()?;
        robot.wait(self.pattern.shutdown_wait)
    }

    /// Classify a fault that ended the run before the shutdown finished.
    fn finish_early<T: TelemetryChannel>(
        &self,
        robot: &mut Robot<T>,
        mut report: RunReport,
        e: NavError,
    ) -> Result<RunReport, NavError> {
        if matches!(e, NavError::LogExhausted) {
            info!(laps = report.laps_completed, "replay log exhausted");
            if report.outcome == RunOutcome::Completed && report.laps_completed < self.pattern.laps {
                report.outcome = RunOutcome::LogExhausted;
            }
            return Ok(report);
        }
        robot.detach_all();
        if let Err(stop_err) = robot.stop() {
            warn!(error = %stop_err, "best-effort stop failed");
        }
        error!(error = %e, lap = robot.state.lap, "run terminated");
        Err(e)
    }
}
