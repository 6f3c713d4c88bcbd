//! [`Robot`] – the long-lived context of a run.
//!
//! The robot owns everything mutable in the control loop and is passed by
//! `&mut` to whoever drives it.  Extensions only ever see the
//! [`RobotState`] half, never the registry they are stored in or the
//! channel.
//!
//! One call to [`Robot::update`] is one tick:
//!
//! 1. send `Drive { desired_speed, desired_steering }`
//! 2. poll one [`TelemetryFrame`][navpat_types::TelemetryFrame]
//! 3. integrate odometry, record time, speed and the emergency condition
//! 4. hand the status to the extensions (emergency stop is checked here)
//! 5. pick up a finished camera report, if any
//! 6. dispatch every sample to the extensions in order

use navpat_hal::TelemetryChannel;
use navpat_kernel::{EmergencyStatus, Extension, ExtensionRegistry};
use navpat_perception::PoseEstimator;
use navpat_types::{Command, Halt, NavError, Pose, SensorPayload, VehicleStatus};
use tracing::debug;

use crate::extensions::ViewerRecord;
use crate::image::{CameraReport, ImageProcessor};

/// Per-run state visible to extensions.
#[derive(Debug)]
pub struct RobotState {
    /// Vehicle clock, seconds.
    pub time: f64,
    pub localization: PoseEstimator,
    pub desired_speed: f64,
    pub desired_steering: f64,
    pub measured_speed: f64,
    /// Total distance driven, forward and reverse alike.
    pub odometry_distance: f64,
    pub emergency_stop: bool,
    /// Current pattern lap, 1-based; 0 outside a pattern.
    pub lap: u32,
    /// Latest finished camera report.
    pub camera: Option<CameraReport>,
    pub viewer_data: Vec<ViewerRecord>,
}

impl RobotState {
    pub fn new(localization: PoseEstimator) -> Self {
        Self {
            time: 0.0,
            localization,
            desired_speed: 0.0,
            desired_steering: 0.0,
            measured_speed: 0.0,
            odometry_distance: 0.0,
            emergency_stop: false,
            lap: 0,
            camera: None,
            viewer_data: Vec::new(),
        }
    }

    fn apply_status(&mut self, status: &VehicleStatus) {
        self.time = status.time;
        self.localization.update_odometry(status.odometry);
        self.measured_speed = status.speed;
        self.odometry_distance += status.odometry.distance.abs();
        self.emergency_stop = status.emergency_stop;
    }
}

impl EmergencyStatus for RobotState {
    fn emergency_stop_asserted(&self) -> bool {
        self.emergency_stop
    }
}

pub struct Robot<T: TelemetryChannel> {
    pub state: RobotState,
    extensions: ExtensionRegistry<RobotState>,
    channel: T,
    image_processor: Option<ImageProcessor>,
}

impl<T: TelemetryChannel> Robot<T> {
    pub fn new(channel: T, localization: PoseEstimator) -> Self {
        Self {
            state: RobotState::new(localization),
            extensions: ExtensionRegistry::new(),
            channel,
            image_processor: None,
        }
    }

    pub fn with_image_processor(mut self, processor: ImageProcessor) -> Self {
        self.image_processor = Some(processor);
        self
    }

    pub fn pose(&self) -> Pose {
        self.state.localization.pose()
    }

    pub fn time(&self) -> f64 {
        self.state.time
    }

    pub fn channel(&self) -> &T {
        &self.channel
    }

    // ── extensions ──────────────────────────────────────────────────────────

    pub fn attach(
        &mut self,
        name: impl Into<String>,
        extension: impl Extension<RobotState> + 'static,
    ) -> Result<(), NavError> {
        self.extensions.attach(name, extension)
    }

    pub fn detach_all(&mut self) -> usize {
        self.extensions.detach_all()
    }

    pub fn extension_names(&self) -> Vec<&str> {
        self.extensions.names()
    }

    // ── control ─────────────────────────────────────────────────────────────

    pub fn set_desired_speed(&mut self, speed: f64) {
        self.state.desired_speed = speed;
    }

    pub fn set_desired_steering(&mut self, steering: f64) {
        self.state.desired_steering = steering;
    }

    /// Run one control tick.
    pub fn update(&mut self) -> Result<(), Halt> {
        self.channel.send_command(&Command::Drive {
            speed: self.state.desired_speed,
            steering: self.state.desired_steering,
        })?;
        let frame = self.channel.poll_samples()?.ok_or(NavError::LogExhausted)?;
        self.state.apply_status(&frame.status);
        self.extensions.dispatch_status(&mut self.state, &frame.status)?;

        if let Some(report) = self.image_processor.as_mut().and_then(|p| p.try_result()) {
            debug!(image = %report.image.path, found = report.landmarks.is_some(), "camera report");
            self.state.camera = Some(report);
        }

        for sample in &frame.samples {
            if let (SensorPayload::Imaging(image), Some(processor)) =
                (&sample.payload, self.image_processor.as_mut())
            {
                processor.submit(image.clone());
            }
            self.extensions.dispatch(&mut self.state, sample)?;
        }
        Ok(())
    }

    /// Keep ticking with the current desired speed and steering for
    /// `duration` seconds of vehicle time.
    pub fn wait(&mut self, duration: f64) -> Result<(), Halt> {
        let start = self.state.time;
        while self.state.time - start < duration {
            self.update()?;
        }
        Ok(())
    }

    /// Brake to standstill.
    pub fn stop(&mut self) -> Result<(), NavError> {
        self.state.desired_speed = 0.0;
        self.channel.send_command(&Command::Stop)
    }

    /// Release the steering actuator.
    pub fn stop_turn(&mut self) -> Result<(), NavError> {
        self.state.desired_steering = 0.0;
        self.channel.send_command(&Command::StopTurn)
    }

    pub fn center_steering(&mut self) -> Result<(), NavError> {
        self.state.desired_steering = 0.0;
        self.channel.send_command(&Command::CenterSteering)
    }

    /// Stop the image worker and close the channel.
    pub fn close(&mut self) -> Result<(), NavError> {
        self.image_processor = None;
        self.channel.close()
    }
}
