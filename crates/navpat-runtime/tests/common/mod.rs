#![allow(dead_code)]

use navpat_hal::{LiveChannel, SimTuning, SimVehicle, TelemetryChannel};
use navpat_perception::{LocalizationConfig, PoseEstimator};
use navpat_runtime::Robot;
use navpat_types::{Command, NavError, Pose, TelemetryFrame};

/// 6 × 5 m area with the vehicle at the start of the lane.
pub fn small_area() -> LocalizationConfig {
    LocalizationConfig {
        pose: [0.0, 2.5, 0.0],
        global_map: vec![[0.0, 0.0], [6.0, 0.0], [6.0, 5.0], [0.0, 5.0]],
        ..LocalizationConfig::default()
    }
}

pub fn sim_for(config: &LocalizationConfig, tuning: SimTuning) -> SimVehicle {
    let [x, y, heading] = config.pose;
    SimVehicle::new(tuning, Pose::new(x, y, heading)).with_command_log()
}

pub fn sim_robot(
    config: &LocalizationConfig,
    tuning: SimTuning,
) -> Robot<LiveChannel<SimVehicle>> {
    Robot::new(
        LiveChannel::new(sim_for(config, tuning)),
        PoseEstimator::from_config(config),
    )
}

/// Channel wrapper keeping the JSON encoding of every emitted command.
pub struct Recorder<T> {
    pub inner: T,
    pub sent: Vec<u8>,
}

impl<T> Recorder<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            sent: Vec::new(),
        }
    }
}

impl<T: TelemetryChannel> TelemetryChannel for Recorder<T> {
    fn send_command(&mut self, command: &Command) -> Result<(), NavError> {
        serde_json::to_writer(&mut self.sent, command).unwrap();
        self.sent.push(b'\n');
        self.inner.send_command(command)
    }

    fn poll_samples(&mut self) -> Result<Option<TelemetryFrame>, NavError> {
        self.inner.poll_samples()
    }

    fn close(&mut self) -> Result<(), NavError> {
        self.inner.close()
    }
}
