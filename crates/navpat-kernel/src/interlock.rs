//! Safety interlocks.
//!
//! Both interlocks are [`Extension`]s and stop the vehicle by returning an
//! [`AbortSignal`] from dispatch.
//!
//! # Near-obstacle hysteresis
//!
//! A single close reading is noise; a sustained approach is not.  On every
//! ranging sample:
//!
//! ```text
//! abort  = armed && min_range < abort_range
//! armed  = min_range < arm_range          (always updated)
//! ```
//!
//! so two consecutive samples are needed: the first under `arm_range`, the
//! second under `abort_range`.

use navpat_types::{AbortSignal, RangingScan, SensorPayload, SensorSample, VehicleStatus};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::extension::Extension;

/// The `safety` configuration section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Abort when armed and an obstacle is closer than this (metres).
    pub abort_range: f64,
    /// Arm when an obstacle is closer than this (metres).
    pub arm_range: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            abort_range: 0.5,
            arm_range: 1.0,
        }
    }
}

/// Smallest positive reading in metres, or `infinity` when there is none.
pub fn min_range(readings_mm: &[i32], infinity: f64) -> f64 {
    readings_mm
        .iter()
        .filter(|&&mm| mm > 0)
        .min()
        .map_or(infinity, |&mm| f64::from(mm) / 1000.0)
}

// ────────────────────────────────────────────────────────────────────────────
// Near-obstacle interlock
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyState {
    pub last_min_range: f64,
    pub armed: bool,
}

impl Default for SafetyState {
    fn default() -> Self {
        Self {
            last_min_range: f64::INFINITY,
            armed: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct NearObstacleInterlock {
    config: SafetyConfig,
    state: SafetyState,
}

impl NearObstacleInterlock {
    pub fn new(config: SafetyConfig) -> Self {
        Self {
            config,
            state: SafetyState::default(),
        }
    }

    pub fn state(&self) -> SafetyState {
        self.state
    }

    /// Feed one ranging scan through the hysteresis filter.
    pub fn observe(&mut self, scan: &RangingScan) -> Option<AbortSignal> {
        let m = min_range(&scan.readings, f64::INFINITY);
        let fire = self.state.armed && m < self.config.abort_range;
        self.state = SafetyState {
            last_min_range: m,
            armed: m < self.config.arm_range,
        };
        fire.then_some(AbortSignal::NearObstacle { min_range: m })
    }
}

impl<C> Extension<C> for NearObstacleInterlock {
    fn on_sample(&mut self, _ctx: &mut C, sample: &SensorSample) -> Result<(), AbortSignal> {
        let SensorPayload::Ranging(scan) = &sample.payload else {
            return Ok(());
        };
        match self.observe(scan) {
            Some(signal) => {
                warn!(
                    interlock = signal.interlock(),
                    min_range = self.state.last_min_range,
                    "obstacle too close"
                );
                Err(signal)
            }
            None => Ok(()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Emergency-stop interlock
// ────────────────────────────────────────────────────────────────────────────

/// Access to the externally sourced emergency condition.
pub trait EmergencyStatus {
    fn emergency_stop_asserted(&self) -> bool;
}

/// Aborts on every tick while the emergency condition is asserted,
/// independently of the near-obstacle state and of whether the tick
/// carried any samples.
#[derive(Debug, Default)]
pub struct EmergencyStopInterlock;

impl<C: EmergencyStatus> Extension<C> for EmergencyStopInterlock {
    fn on_status(&mut self, ctx: &mut C, _status: &VehicleStatus) -> Result<(), AbortSignal> {
        if ctx.emergency_stop_asserted() {
            warn!(interlock = "emergency_stop", "emergency stop asserted");
            return Err(AbortSignal::EmergencyStop);
        }
        Ok(())
    }
}
