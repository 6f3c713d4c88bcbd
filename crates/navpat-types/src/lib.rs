use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Position of the ranging sensor in the vehicle frame (metres ahead, left).
pub const RANGING_MOUNT: Point = Point { x: 1.78, y: 0.0 };

/// Wrap `angle` into the half-open interval `(-π, π]`.
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a <= -PI {
        a += 2.0 * PI;
    } else if a > PI {
        a -= 2.0 * PI;
    }
    a
}

// ────────────────────────────────────────────────────────────────────────────
// Geometry
// ────────────────────────────────────────────────────────────────────────────

/// A point in the plane (metres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Vehicle pose in the world frame: metres and radians.
///
/// Construct through [`Pose::new`] so the heading stays within `(-π, π]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self {
            x,
            y,
            heading: normalize_angle(heading),
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Express a pose given in this pose's frame in the parent frame.
    pub fn combine(&self, local: Pose) -> Pose {
        let (sin, cos) = self.heading.sin_cos();
        Pose::new(
            self.x + cos * local.x - sin * local.y,
            self.y + sin * local.x + cos * local.y,
            self.heading + local.heading,
        )
    }

    /// Transform a point given in this pose's frame into the parent frame.
    pub fn transform_point(&self, local: Point) -> Point {
        self.combine(Pose::new(local.x, local.y, 0.0)).position()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sensor samples
// ────────────────────────────────────────────────────────────────────────────

/// The fixed set of sensors attached to the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Ranging,
    Imaging,
    Positioning,
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Ranging => write!(f, "ranging"),
            SourceId::Imaging => write!(f, "imaging"),
            SourceId::Positioning => write!(f, "positioning"),
        }
    }
}

/// One sweep of the planar laser scanner.
///
/// Readings are in millimetres; beam `i` points at
/// `-135° + i * 0.5°` in the sensor frame.  Values `<= 0` mean no return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangingScan {
    pub readings: Vec<i32>,
}

impl RangingScan {
    pub const BEAM_COUNT: usize = 541;
    pub const FIRST_BEAM_DEG: f64 = -135.0;
    pub const BEAM_STEP_DEG: f64 = 0.5;

    pub fn new(readings: Vec<i32>) -> Self {
        Self { readings }
    }

    /// Sensor-frame bearing of beam `index` in radians.
    pub fn bearing(index: usize) -> f64 {
        (Self::FIRST_BEAM_DEG + index as f64 * Self::BEAM_STEP_DEG).to_radians()
    }

    /// Angular spacing between adjacent beams in radians.
    pub fn beam_step() -> f64 {
        Self::BEAM_STEP_DEG.to_radians()
    }

    /// Range of beam `index` in metres, `None` for no return.
    pub fn range(&self, index: usize) -> Option<f64> {
        match self.readings.get(index) {
            Some(&mm) if mm > 0 => Some(f64::from(mm) / 1000.0),
            _ => None,
        }
    }
}

/// Reference to a captured camera frame stored alongside the session log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub path: String,
}

/// Satellite positioning fix in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoFix {
    pub latitude: f64,
    pub longitude: f64,
}

/// Sensor data, tagged by the sensor that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "data", rename_all = "lowercase")]
pub enum SensorPayload {
    Ranging(RangingScan),
    Imaging(ImageRef),
    Positioning(GeoFix),
}

/// A single immutable sensor reading delivered to the extensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    /// Vehicle clock time in seconds.
    pub timestamp: f64,
    pub payload: SensorPayload,
}

impl SensorSample {
    pub fn new(timestamp: f64, payload: SensorPayload) -> Self {
        Self { timestamp, payload }
    }

    pub fn source_id(&self) -> SourceId {
        match self.payload {
            SensorPayload::Ranging(_) => SourceId::Ranging,
            SensorPayload::Imaging(_) => SourceId::Imaging,
            SensorPayload::Positioning(_) => SourceId::Positioning,
        }
    }
}

/// A discrete feature (typically a traffic cone) seen by the ranging sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    /// Sensor-frame bearing in radians.
    pub bearing: f64,
    /// Distance in metres.
    pub range: f64,
    /// Angle subtended by the landmark in radians.
    pub angular_width: f64,
}

impl Landmark {
    /// Approximate physical width in metres.
    pub fn width(&self) -> f64 {
        self.angular_width * self.range
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Vehicle telemetry and commands
// ────────────────────────────────────────────────────────────────────────────

/// Motion measured by the wheel encoders since the previous tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OdometryDelta {
    /// Signed distance travelled (metres, negative when reversing).
    pub distance: f64,
    /// Heading change in radians.
    pub heading_change: f64,
}

/// Vehicle state reported once per control tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleStatus {
    /// Vehicle clock time in seconds.
    pub time: f64,
    pub odometry: OdometryDelta,
    /// Measured speed in m/s.
    pub speed: f64,
    /// External emergency-stop condition (hardware button or operator).
    pub emergency_stop: bool,
}

/// Everything the vehicle delivered for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub status: VehicleStatus,
    pub samples: Vec<SensorSample>,
}

/// Commands accepted by the vehicle control collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Per-tick desired speed (m/s) and front-wheel steering angle (rad).
    Drive { speed: f64, steering: f64 },
    /// Brake to standstill.
    Stop,
    /// Release the steering actuator.
    StopTurn,
    /// Drive the steering to its raw zero position.
    CenterSteering,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Drive { speed, steering } => {
                write!(f, "drive(speed={speed}, steering={steering})")
            }
            Command::Stop => write!(f, "stop"),
            Command::StopTurn => write!(f, "stop_turn"),
            Command::CenterSteering => write!(f, "center_steering"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Control flow and errors
// ────────────────────────────────────────────────────────────────────────────

/// Raised by a safety interlock to unwind the active motion sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AbortSignal {
    NearObstacle { min_range: f64 },
    EmergencyStop,
}

impl AbortSignal {
    /// Name of the interlock that raised the signal.
    pub fn interlock(&self) -> &'static str {
        match self {
            AbortSignal::NearObstacle { .. } => "near_obstacle",
            AbortSignal::EmergencyStop => "emergency_stop",
        }
    }
}

impl fmt::Display for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortSignal::NearObstacle { min_range } => {
                write!(f, "near obstacle at {min_range:.2} m")
            }
            AbortSignal::EmergencyStop => write!(f, "emergency stop"),
        }
    }
}

/// Errors spanning telemetry transport, replay verification and session logs.
#[derive(Error, Debug)]
pub enum NavError {
    #[error("Transport fault: {0}")]
    Transport(String),

    #[error("Replay mismatch at record {record}: expected {expected}, actual {actual}")]
    ReplayMismatch {
        record: u64,
        expected: String,
        actual: String,
    },

    #[error("Replay log exhausted")]
    LogExhausted,

    #[error("Session log error: {0}")]
    SessionLog(String),

    #[error("Extension '{0}' is already attached")]
    DuplicateExtension(String),
}

/// Why a control sequence stopped before finishing.
#[derive(Error, Debug)]
pub enum Halt {
    #[error("Abort: {0}")]
    Abort(AbortSignal),

    #[error(transparent)]
    Fault(#[from] NavError),
}

impl From<AbortSignal> for Halt {
    fn from(signal: AbortSignal) -> Self {
        Halt::Abort(signal)
    }
}
