//! `navpat-runtime` – The Control Loop
//!
//! Drives the vehicle through a navigation pattern, one tick at a time, on a
//! single thread of control.
//!
//! # Modules
//!
//! - [`robot`] – [`Robot`][robot::Robot]: the run-long context.  Owns the
//!   [`TelemetryChannel`][navpat_hal::TelemetryChannel], the extension
//!   registry and the [`RobotState`][robot::RobotState] that extensions see.
//!   [`Robot::update`][robot::Robot::update] is one tick.
//! - [`motion`] – [`MotionExecutor`][motion::MotionExecutor]: `follow_line`,
//!   `turn`, `go_straight` and `turn_back` as timeout-bounded tick loops.
//!   Line following is an explicit step function,
//!   [`LineFollower::step`][motion::LineFollower::step].
//! - [`pattern`] – [`PatternRunner`][pattern::PatternRunner]: laps of legs,
//!   abort recovery and the shutdown sequence.
//! - [`extensions`] – runtime extensions: the
//!   [`LandmarkTracker`][extensions::LandmarkTracker] feeding the pose
//!   estimator and the [`ViewerCollector`][extensions::ViewerCollector].
//! - [`image`] – [`ImageProcessor`][image::ImageProcessor]: camera frames are
//!   handed to a [`LandmarkDetector`][image::LandmarkDetector] on a worker
//!   thread; results come back at a later tick.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.
//!
//! # Aborts
//!
//! Every per-tick function returns `Result<_, Halt>`.  A safety interlock's
//! [`AbortSignal`][navpat_types::AbortSignal] travels up through the motion
//! primitive with `?` and is handled in exactly one place,
//! [`PatternRunner::run`][pattern::PatternRunner::run].

pub mod extensions;
pub mod image;
pub mod motion;
pub mod pattern;
pub mod robot;
pub mod telemetry;

pub use extensions::{LandmarkTracker, ViewerCollector, ViewerRecord};
pub use image::{CameraReport, FrameProbe, ImageProcessor, LandmarkDetector};
pub use motion::{Line, LineFollower, MotionConfig, MotionExecutor, PrimitiveOutcome, TurnManeuver};
pub use pattern::{PatternConfig, PatternKind, PatternRunner, RunOutcome, RunReport};
pub use robot::{Robot, RobotState};
pub use telemetry::{TracerProviderGuard, init_tracing};
