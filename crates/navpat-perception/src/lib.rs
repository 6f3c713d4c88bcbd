//! `navpat-perception` – where is the vehicle?
//!
//! Turns odometry and ranging scans into a world-frame pose estimate.
//!
//! # Modules
//!
//! - [`transform`] – sensor-frame polar readings to world-frame points.
//! - [`landmarks`] – [`LandmarkFinder`][landmarks::LandmarkFinder]: extracts
//!   cone-like landmarks from a single ranging scan.
//! - [`localization`] – [`PoseEstimator`][localization::PoseEstimator]:
//!   odometry integration plus opportunistic correction against the fixed
//!   [`GlobalMap`][localization::GlobalMap].

pub mod landmarks;
pub mod localization;
pub mod transform;

pub use landmarks::LandmarkFinder;
pub use localization::{
    GlobalMap, LandmarkClass, LocalizationConfig, ObservedLandmark, PoseEstimator,
};
