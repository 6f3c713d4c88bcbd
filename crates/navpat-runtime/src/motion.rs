//! Motion primitives.
//!
//! Each primitive is a loop of [`Robot::update`] ticks that ends when its
//! goal is reached or its timeout elapses.  A timeout is not an error: it is
//! logged and reported as [`PrimitiveOutcome::TimedOut`].  An abort from a
//! safety interlock leaves the loop through `?` as [`Halt::Abort`].
//!
//! No primitive keeps state between calls; progress and elapsed time live in
//! the call's own locals.

use std::f64::consts::PI;

use navpat_hal::TelemetryChannel;
use navpat_types::{Halt, Point, Pose, normalize_angle};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::robot::Robot;

/// The `motion` configuration section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Distance between the axles (metres).
    pub wheel_base: f64,
    /// Steering limit (radians).
    pub max_steering: f64,
    /// Steering per radian of heading error.
    pub turn_scale: f64,
    /// Heading offset toward the line at full cross-track error (radians).
    pub offset_speed: f64,
    /// Cross-track error at which `offset_speed` saturates (metres).
    pub offset_distance: f64,
    /// Line following ends this far before the terminal point (metres).
    pub stop_distance: f64,
    /// Default `follow_line` timeout (seconds).
    pub follow_timeout: f64,
    /// Speed under which the vehicle counts as stopped (m/s).
    pub stop_speed_tolerance: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            wheel_base: 1.3,
            max_steering: 0.7,
            turn_scale: 4.0,
            offset_speed: 20f64.to_radians(),
            offset_distance: 0.03,
            stop_distance: 0.0,
            follow_timeout: 20.0,
            stop_speed_tolerance: 0.01,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Line geometry
// ────────────────────────────────────────────────────────────────────────────

/// Directed line segment from `start` to `end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub start: Point,
    pub end: Point,
}

impl Line {
    pub fn new(start: (f64, f64), end: (f64, f64)) -> Self {
        Self {
            start: Point::new(start.0, start.1),
            end: Point::new(end.0, end.1),
        }
    }

    /// Direction of travel.
    pub fn angle(&self) -> f64 {
        (self.end.y - self.start.y).atan2(self.end.x - self.start.x)
    }

    fn direction(&self) -> (f64, f64) {
        let (sin, cos) = self.angle().sin_cos();
        (cos, sin)
    }

    /// Cross-track distance of `p`; positive to the left of the direction of
    /// travel.
    pub fn signed_distance(&self, p: Point) -> f64 {
        let (dx, dy) = self.direction();
        dx * (p.y - self.start.y) - dy * (p.x - self.start.x)
    }

    /// Along-track distance from `p` to the terminal point; negative once
    /// `p` is past it.
    pub fn distance_to_finish(&self, p: Point) -> f64 {
        let (dx, dy) = self.direction();
        (self.end.x - p.x) * dx + (self.end.y - p.y) * dy
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LineFollower
// ────────────────────────────────────────────────────────────────────────────

/// Steering law for one `follow_line` call.
///
/// ```text
/// target   = line.angle − offset_speed · clamp(cross_track / offset_distance, −1, 1)
/// steering = clamp(turn_scale · normalize(target − heading), ±max_steering)
/// ```
///
/// [`step`][LineFollower::step] is a pure function of the pose, so the
/// sequence it produces can be restarted from any pose.
#[derive(Debug, Clone, Copy)]
pub struct LineFollower {
    line: Line,
    turn_scale: f64,
    offset_speed: f64,
    offset_distance: f64,
    stop_distance: f64,
    max_steering: f64,
}

impl LineFollower {
    pub fn new(line: Line, config: &MotionConfig) -> Self {
        Self {
            line,
            turn_scale: config.turn_scale,
            offset_speed: config.offset_speed,
            offset_distance: config.offset_distance,
            stop_distance: config.stop_distance,
            max_steering: config.max_steering,
        }
    }

    /// Steering for the next tick, or `None` once the terminal point is
    /// within `stop_distance`.
    pub fn step(&self, pose: Pose) -> Option<f64> {
        let p = pose.position();
        if self.line.distance_to_finish(p) <= self.stop_distance {
            return None;
        }
        let offset = (self.line.signed_distance(p) / self.offset_distance).clamp(-1.0, 1.0);
        let target = self.line.angle() - self.offset_speed * offset;
        let error = normalize_angle(target - pose.heading);
        Some((self.turn_scale * error).clamp(-self.max_steering, self.max_steering))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Executor
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveOutcome {
    Completed,
    TimedOut,
}

/// Parameters of a constant-radius turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnManeuver {
    /// Heading change; negative turns right.
    pub angle: f64,
    pub radius: f64,
    /// Signed speed; negative reverses.
    pub speed: f64,
    /// Come to a standstill before returning.
    pub with_stop: bool,
    pub timeout: f64,
}

#[derive(Debug, Clone, Default)]
pub struct MotionExecutor {
    config: MotionConfig,
}

impl MotionExecutor {
    pub fn new(config: MotionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Follow `line` until its terminal point.
    ///
    /// `speed`, when given, becomes the desired speed; otherwise the current
    /// desired speed is kept.  `timeout` defaults to `follow_timeout`.
    pub fn follow_line<T: TelemetryChannel>(
        &self,
        robot: &mut Robot<T>,
        line: Line,
        speed: Option<f64>,
        timeout: Option<f64>,
    ) -> Result<PrimitiveOutcome, Halt> {
        let timeout = timeout.unwrap_or(self.config.follow_timeout);
        if let Some(speed) = speed {
            robot.set_desired_speed(speed);
        }
        debug!(?line, timeout, "follow_line");

        let follower = LineFollower::new(line, &self.config);
        let start = robot.time();
        while let Some(steering) = follower.step(robot.pose()) {
            robot.set_desired_steering(steering);
            robot.update()?;
            if robot.time() - start > timeout {
                warn!(timeout, "TIMEOUT");
                return Ok(PrimitiveOutcome::TimedOut);
            }
        }
        Ok(PrimitiveOutcome::Completed)
    }

    /// Drive a constant-radius arc until the heading has changed by
    /// `maneuver.angle`.
    pub fn turn<T: TelemetryChannel>(
        &self,
        robot: &mut Robot<T>,
        maneuver: TurnManeuver,
    ) -> Result<PrimitiveOutcome, Halt> {
        let TurnManeuver {
            angle,
            radius,
            speed,
            with_stop,
            timeout,
        } = maneuver;
        let steering = angle.signum() * speed.signum() * (self.config.wheel_base / radius).atan();
        debug!(angle, radius, speed, steering, "turn");

        robot.set_desired_speed(speed);
        robot.set_desired_steering(steering);

        let start = robot.time();
        let mut previous = robot.pose().heading;
        let mut turned = 0.0_f64;
        while turned.abs() < angle.abs() {
            robot.update()?;
            let heading = robot.pose().heading;
            turned += normalize_angle(heading - previous);
            previous = heading;
            if robot.time() - start > timeout {
                warn!(timeout, turned, "TIMEOUT");
                return Ok(PrimitiveOutcome::TimedOut);
            }
        }

        if with_stop {
            robot.stop()?;
            while robot.state.measured_speed.abs() > self.config.stop_speed_tolerance {
                robot.update()?;
                if robot.time() - start > timeout {
                    warn!(timeout, "TIMEOUT");
                    return Ok(PrimitiveOutcome::TimedOut);
                }
            }
        }
        Ok(PrimitiveOutcome::Completed)
    }

    /// Drive `distance` metres (negative reverses) holding the start heading.
    pub fn go_straight<T: TelemetryChannel>(
        &self,
        robot: &mut Robot<T>,
        distance: f64,
        speed: f64,
        timeout: Option<f64>,
    ) -> Result<PrimitiveOutcome, Halt> {
        let timeout = timeout.unwrap_or(self.config.follow_timeout);
        let speed = speed.abs() * if distance < 0.0 { -1.0 } else { 1.0 };
        let heading = robot.pose().heading;
        let start_distance = robot.state.odometry_distance;
        let start = robot.time();
        debug!(distance, speed, "go_straight");

        robot.set_desired_speed(speed);
        while robot.state.odometry_distance - start_distance < distance.abs() {
            let error = normalize_angle(heading - robot.pose().heading);
            let steering = (self.config.turn_scale * error * speed.signum())
                .clamp(-self.config.max_steering, self.config.max_steering);
            robot.set_desired_steering(steering);
            robot.update()?;
            if robot.time() - start > timeout {
                warn!(timeout, "TIMEOUT");
                return Ok(PrimitiveOutcome::TimedOut);
            }
        }
        Ok(PrimitiveOutcome::Completed)
    }

    /// The three turns of [`turn_back`][Self::turn_back]: right, reverse
    /// through the same arc, right again, each 60°.
    pub fn turn_back_plan(speed: f64) -> [TurnManeuver; 3] {
        let step = |speed: f64| TurnManeuver {
            angle: -PI / 3.0,
            radius: 2.0,
            speed,
            with_stop: true,
            timeout: 30.0,
        };
        [step(speed), step(-speed), step(speed)]
    }

    /// Reverse the direction of travel with a three-point turn.
    ///
    /// Every step runs even if an earlier one timed out; the outcome is
    /// `TimedOut` if any did.
    pub fn turn_back<T: TelemetryChannel>(
        &self,
        robot: &mut Robot<T>,
        speed: f64,
    ) -> Result<PrimitiveOutcome, Halt> {
        let mut outcome = PrimitiveOutcome::Completed;
        for maneuver in Self::turn_back_plan(speed) {
            if self.turn(robot, maneuver)? == PrimitiveOutcome::TimedOut {
                outcome = PrimitiveOutcome::TimedOut;
            }
        }
        Ok(outcome)
    }
}
