//! [`SimVehicle`] – kinematic vehicle simulator for headless runs and tests.
//!
//! Implements [`VehicleBus`] so it can stand in for the real vehicle behind a
//! [`LiveChannel`][crate::live::LiveChannel].  Each `receive` advances the
//! simulation by one tick of `1 / update_hz` seconds.
//!
//! # Model
//!
//! | quantity | behaviour |
//! |---|---|
//! | speed | approaches the commanded speed at most `max_acceleration` m/s² |
//! | steering | front-wheel angle, applied immediately |
//! | motion | bicycle model, `dθ = d · tan(steering) / wheel_base`, midpoint integration |
//! | ranging | 541 beams ray-cast against circular obstacles, `0` = no return within `scan_range` |
//! | positioning | one fix per second around a fixed geographic origin |
//! | imaging | optional frame reference every `camera_period` seconds |
//! | emergency stop | asserted from `emergency_stop_at` onwards |
//!
//! # Example
//!
//! ```rust
//! use navpat_hal::sim::{SimTuning, SimVehicle};
//! use navpat_hal::live::VehicleBus;
//! use navpat_types::{Command, Pose};
//!
//! let mut sim = SimVehicle::new(SimTuning::default(), Pose::new(0.0, 0.0, 0.0));
//! sim.transmit(&Command::Drive { speed: 1.0, steering: 0.0 }).unwrap();
//! let frame = sim.receive().unwrap();
//! assert!(frame.status.odometry.distance > 0.0);
//! ```

use std::io;
use std::time::Duration;

use navpat_types::{
    Command, GeoFix, ImageRef, OdometryDelta, Point, Pose, RANGING_MOUNT, RangingScan,
    SensorPayload, SensorSample, TelemetryFrame, VehicleStatus,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::live::VehicleBus;

/// Metres per degree of latitude.
const METRES_PER_DEGREE: f64 = 111_320.0;

// ────────────────────────────────────────────────────────────────────────────
// Tuning
// ────────────────────────────────────────────────────────────────────────────

/// A round obstacle (e.g. a cone or a post) in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimObstacle {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

/// Vehicle tuning, read from the `johndeere` configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimTuning {
    pub wheel_base: f64,
    pub max_acceleration: f64,
    pub update_hz: u32,
    /// Maximum ranging distance in metres.
    pub scan_range: f64,
    pub obstacles: Vec<SimObstacle>,
    /// Vehicle time at which the emergency stop button is pressed.
    pub emergency_stop_at: Option<f64>,
    pub camera_period: Option<f64>,
    /// Geographic origin `[latitude, longitude]` of the local frame.
    pub origin: [f64; 2],
    /// Sleep for one tick per `receive`.
    pub realtime: bool,
}

impl Default for SimTuning {
    fn default() -> Self {
        Self {
            wheel_base: 1.3,
            max_acceleration: 1.0,
            update_hz: 20,
            scan_range: 20.0,
            obstacles: Vec::new(),
            emergency_stop_at: None,
            camera_period: None,
            origin: [50.0, 14.4],
            realtime: false,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimVehicle
// ────────────────────────────────────────────────────────────────────────────

pub struct SimVehicle {
    tuning: SimTuning,
    pose: Pose,
    speed: f64,
    target_speed: f64,
    steering: f64,
    tick: u64,
    /// Off unless requested; a real-time run would grow it every tick.
    transmitted: Option<Vec<Command>>,
}

impl SimVehicle {
    pub fn new(tuning: SimTuning, start: Pose) -> Self {
        info!(
            x = start.x,
            y = start.y,
            heading = start.heading,
            obstacles = tuning.obstacles.len(),
            "simulated vehicle ready"
        );
        Self {
            tuning,
            pose: start,
            speed: 0.0,
            target_speed: 0.0,
            steering: 0.0,
            tick: 0,
            transmitted: None,
        }
    }

    /// Keep every received command for inspection through
    /// [`transmitted`](Self::transmitted).
    pub fn with_command_log(mut self) -> Self {
        self.transmitted = Some(Vec::new());
        self
    }

    /// Ground-truth pose.
    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn time(&self) -> f64 {
        self.tick as f64 * self.dt()
    }

    /// Every command received so far, in order.  Empty unless built
    /// [`with_command_log`](Self::with_command_log).
    pub fn transmitted(&self) -> &[Command] {
        self.transmitted.as_deref().unwrap_or(&[])
    }

    fn dt(&self) -> f64 {
        1.0 / f64::from(self.tuning.update_hz.max(1))
    }

    fn ticks_per(&self, period: f64) -> u64 {
        ((period * f64::from(self.tuning.update_hz)).round() as u64).max(1)
    }

    fn step(&mut self) -> OdometryDelta {
        let dt = self.dt();
        let max_dv = self.tuning.max_acceleration * dt;
        let previous = self.speed;
        self.speed += (self.target_speed - self.speed).clamp(-max_dv, max_dv);

        let distance = (previous + self.speed) / 2.0 * dt;
        let heading_change = distance * self.steering.tan() / self.tuning.wheel_base;
        let mid = self.pose.heading + heading_change / 2.0;
        self.pose = Pose::new(
            self.pose.x + distance * mid.cos(),
            self.pose.y + distance * mid.sin(),
            self.pose.heading + heading_change,
        );
        self.tick += 1;

        OdometryDelta {
            distance,
            heading_change,
        }
    }

    fn scan(&self) -> RangingScan {
        let sensor = self.pose.combine(Pose::new(RANGING_MOUNT.x, RANGING_MOUNT.y, 0.0));
        let origin = sensor.position();
        let readings = (0..RangingScan::BEAM_COUNT)
            .map(|i| {
                let angle = sensor.heading + RangingScan::bearing(i);
                let hit = self
                    .tuning
                    .obstacles
                    .iter()
                    .filter_map(|o| ray_circle(origin, angle, o))
                    .fold(f64::INFINITY, f64::min);
                if hit <= self.tuning.scan_range {
                    (hit * 1000.0).round() as i32
                } else {
                    0
                }
            })
            .collect();
        RangingScan::new(readings)
    }

    fn geo_fix(&self) -> GeoFix {
        let [lat0, lon0] = self.tuning.origin;
        GeoFix {
            latitude: lat0 + self.pose.y / METRES_PER_DEGREE,
            longitude: lon0 + self.pose.x / (METRES_PER_DEGREE * lat0.to_radians().cos()),
        }
    }
}

/// Distance along the ray from `origin` at `angle` to the circle, if hit
/// in front of the origin.
fn ray_circle(origin: Point, angle: f64, obstacle: &SimObstacle) -> Option<f64> {
    let (dy, dx) = angle.sin_cos();
    let fx = origin.x - obstacle.x;
    let fy = origin.y - obstacle.y;
    let b = fx * dx + fy * dy;
    let c = fx * fx + fy * fy - obstacle.radius * obstacle.radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let t = -b - disc.sqrt();
    (t > 0.0).then_some(t)
}

impl VehicleBus for SimVehicle {
    fn transmit(&mut self, command: &Command) -> io::Result<()> {
        match *command {
            Command::Drive { speed, steering } => {
                self.target_speed = speed;
                self.steering = steering;
            }
            Command::Stop => self.target_speed = 0.0,
            Command::StopTurn => {}
            Command::CenterSteering => self.steering = 0.0,
        }
        if let Some(log) = self.transmitted.as_mut() {
            log.push(*command);
        }
        Ok(())
    }

    fn receive(&mut self) -> io::Result<TelemetryFrame> {
        if self.tuning.realtime {
            std::thread::sleep(Duration::from_secs_f64(self.dt()));
        }

        let odometry = self.step();
        let time = self.time();
        let emergency_stop = self.tuning.emergency_stop_at.is_some_and(|t| time >= t);

        let mut samples = vec![SensorSample::new(time, SensorPayload::Ranging(self.scan()))];
        if self.tick % self.ticks_per(1.0) == 0 {
            samples.push(SensorSample::new(time, SensorPayload::Positioning(self.geo_fix())));
        }
        if let Some(period) = self.tuning.camera_period {
            if self.tick % self.ticks_per(period) == 0 {
                samples.push(SensorSample::new(
                    time,
                    SensorPayload::Imaging(ImageRef {
                        path: format!("sim/frame_{:06}.jpg", self.tick),
                    }),
                ));
            }
        }

        Ok(TelemetryFrame {
            status: VehicleStatus {
                time,
                odometry,
                speed: self.speed,
                emergency_stop,
            },
            samples,
        })
    }

    fn shutdown(&mut self) -> io::Result<()> {
        debug!(ticks = self.tick, "simulated vehicle shut down");
        Ok(())
    }
}
