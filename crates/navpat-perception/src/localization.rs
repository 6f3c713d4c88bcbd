//! Pose Estimator.
//!
//! Dead-reckons the vehicle pose from per-tick [`OdometryDelta`]s and, when
//! the ranging sensor sees landmarks near a known [`GlobalMap`] position,
//! pulls the estimate toward the map with a complementary blend:
//!
//! ```text
//! position_corrected = position + gain * mean(map_position − observed_position)
//! ```
//!
//! Landmarks are classified before fusion:
//!
//! | class | condition | fused | retained |
//! |---|---|---|---|
//! | [`LandmarkClass::Rejected`] | width outside `[min_width, max_width]` | no | no |
//! | [`LandmarkClass::Unmatched`] | farther than `match_radius` from every map point | no | yes |
//! | [`LandmarkClass::Matched`] | within `match_radius` of a map point | yes | yes |
//!
//! # Example
//!
//! ```rust
//! use navpat_perception::localization::{LocalizationConfig, PoseEstimator};
//! use navpat_types::OdometryDelta;
//!
//! let mut est = PoseEstimator::from_config(&LocalizationConfig::default());
//! est.update_odometry(OdometryDelta { distance: 1.0, heading_change: 0.0 });
//! assert!((est.pose().x - 1.0).abs() < 1e-9);
//! ```

use std::collections::VecDeque;

use navpat_types::{Landmark, OdometryDelta, Point, Pose, RANGING_MOUNT, SourceId};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::transform::landmark_to_world;

/// How many unmatched landmark positions are kept for diagnostics.
const UNMATCHED_HISTORY: usize = 256;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// The `localization` configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizationConfig {
    /// Initial pose as `[x, y, heading]`.
    pub pose: [f64; 3],
    /// Approximate world positions of the landmarks as `[x, y]` pairs.
    pub global_map: Vec<[f64; 2]>,
    /// A landmark closer than this to a map point is a correction candidate.
    pub match_radius: f64,
    /// Narrowest plausible landmark (metres).
    pub min_width: f64,
    /// Widest plausible landmark (metres).
    pub max_width: f64,
    /// Fraction of the observed map offset applied per scan.
    pub correction_gain: f64,
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            pose: [0.0, 2.5, 0.0],
            global_map: vec![[0.0, 0.0], [15.0, 0.0], [15.0, 5.0], [0.0, 5.0]],
            match_radius: 2.0,
            min_width: 0.05,
            max_width: 0.5,
            correction_gain: 0.2,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// GlobalMap
// ────────────────────────────────────────────────────────────────────────────

/// Fixed set of expected landmark positions for one run area.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalMap {
    points: Vec<Point>,
}

impl GlobalMap {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Index and distance of the map point closest to `p`.
    pub fn nearest(&self, p: Point) -> Option<(usize, f64)> {
        self.points
            .iter()
            .enumerate()
            .map(|(i, q)| (i, q.distance_to(p)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Route scale: the largest x coordinate on the map.
    pub fn long_side(&self) -> f64 {
        self.points.iter().map(|p| p.x).fold(0.0, f64::max)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Observations
// ────────────────────────────────────────────────────────────────────────────

/// How a landmark observation was treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkClass {
    Matched { map_index: usize },
    Unmatched,
    Rejected,
}

/// A landmark together with its estimated world position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservedLandmark {
    pub landmark: Landmark,
    pub position: Point,
    pub class: LandmarkClass,
}

// ────────────────────────────────────────────────────────────────────────────
// PoseEstimator
// ────────────────────────────────────────────────────────────────────────────

/// Single writer of the vehicle [`Pose`].
#[derive(Debug)]
pub struct PoseEstimator {
    pose: Pose,
    global_map: GlobalMap,
    mount: Point,
    match_radius: f64,
    min_width: f64,
    max_width: f64,
    correction_gain: f64,
    /// Matched and unmatched landmarks from the most recent scan.
    landmarks: Vec<ObservedLandmark>,
    unmatched: VecDeque<Point>,
    corrections: u64,
}

impl PoseEstimator {
    pub fn from_config(config: &LocalizationConfig) -> Self {
        let [x, y, heading] = config.pose;
        Self {
            pose: Pose::new(x, y, heading),
            global_map: GlobalMap::new(
                config
                    .global_map
                    .iter()
                    .map(|&[x, y]| Point::new(x, y))
                    .collect(),
            ),
            mount: RANGING_MOUNT,
            match_radius: config.match_radius,
            min_width: config.min_width,
            max_width: config.max_width,
            correction_gain: config.correction_gain,
            landmarks: Vec::new(),
            unmatched: VecDeque::with_capacity(UNMATCHED_HISTORY),
            corrections: 0,
        }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn global_map(&self) -> &GlobalMap {
        &self.global_map
    }

    /// Landmarks retained from the most recent ranging scan.
    pub fn landmarks(&self) -> &[ObservedLandmark] {
        &self.landmarks
    }

    /// World positions of recent landmarks that matched nothing on the map.
    pub fn unmatched_history(&self) -> impl Iterator<Item = &Point> {
        self.unmatched.iter()
    }

    /// Number of scans that moved the pose toward the map.
    pub fn corrections(&self) -> u64 {
        self.corrections
    }

    /// Integrate one tick of wheel odometry (midpoint rule).
    pub fn update_odometry(&mut self, delta: OdometryDelta) {
        let mid_heading = self.pose.heading + delta.heading_change / 2.0;
        self.pose = Pose::new(
            self.pose.x + delta.distance * mid_heading.cos(),
            self.pose.y + delta.distance * mid_heading.sin(),
            self.pose.heading + delta.heading_change,
        );
    }

    /// Classify a landmark against the map from the current pose.
    pub fn classify(&self, landmark: &Landmark) -> ObservedLandmark {
        let position = landmark_to_world(&self.pose, self.mount, landmark);
        let width = landmark.width();
        let class = if width < self.min_width || width > self.max_width {
            LandmarkClass::Rejected
        } else {
            match self.global_map.nearest(position) {
                Some((map_index, dist)) if dist < self.match_radius => {
                    LandmarkClass::Matched { map_index }
                }
                _ => LandmarkClass::Unmatched,
            }
        };
        ObservedLandmark {
            landmark: *landmark,
            position,
            class,
        }
    }

    /// Replace the landmark set with `observed` and fuse the matched ones.
    ///
    /// Only ranging landmarks carry a usable range; other sources are
    /// ignored.  Returns the classification of every input landmark,
    /// including rejected ones.
    pub fn update_landmarks(
        &mut self,
        source: SourceId,
        observed: &[Landmark],
    ) -> Vec<ObservedLandmark> {
        if source != SourceId::Ranging {
            debug!(%source, count = observed.len(), "landmarks without range ignored");
            return Vec::new();
        }

        let classified: Vec<ObservedLandmark> =
            observed.iter().map(|lm| self.classify(lm)).collect();

        let mut dx = 0.0;
        let mut dy = 0.0;
        let mut matched = 0usize;
        for obs in &classified {
            match obs.class {
                LandmarkClass::Matched { map_index } => {
                    let target = self.global_map.points()[map_index];
                    dx += target.x - obs.position.x;
                    dy += target.y - obs.position.y;
                    matched += 1;
                }
                LandmarkClass::Unmatched => {
                    if self.unmatched.len() == UNMATCHED_HISTORY {
                        self.unmatched.pop_front();
                    }
                    self.unmatched.push_back(obs.position);
                }
                LandmarkClass::Rejected => {
                    trace!(width = obs.landmark.width(), "landmark rejected by width");
                }
            }
        }

        self.landmarks = classified
            .iter()
            .filter(|obs| obs.class != LandmarkClass::Rejected)
            .copied()
            .collect();

        if matched > 0 {
            let n = matched as f64;
            let gain = self.correction_gain;
            self.pose = Pose::new(
                self.pose.x + gain * dx / n,
                self.pose.y + gain * dy / n,
                self.pose.heading,
            );
            self.corrections += 1;
            debug!(matched, dx = dx / n, dy = dy / n, "pose corrected from landmarks");
        }

        classified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn estimator_at_origin_with_cone_at(x: f64, y: f64) -> PoseEstimator {
        PoseEstimator::from_config(&LocalizationConfig {
            pose: [0.0, 0.0, 0.0],
            global_map: vec![[x, y]],
            ..LocalizationConfig::default()
        })
    }

    fn landmark(range: f64, width: f64) -> Landmark {
        Landmark {
            bearing: 0.0,
            range,
            angular_width: width / range,
        }
    }

    #[test]
    fn default_config_is_fifteen_by_five_rectangle() {
        let est = PoseEstimator::from_config(&LocalizationConfig::default());
        assert_eq!(est.pose(), Pose::new(0.0, 2.5, 0.0));
        assert_eq!(est.global_map().points().len(), 4);
        assert!((est.global_map().long_side() - 15.0).abs() < 1e-12);
    }

    #[test]
    fn odometry_integrates_arc() {
        let mut est = estimator_at_origin_with_cone_at(5.0, 0.0);
        for _ in 0..100 {
            est.update_odometry(OdometryDelta {
                distance: std::f64::consts::PI / 200.0,
                heading_change: FRAC_PI_2 / 100.0,
            });
        }
        // Quarter circle of radius 1 to the left.
        let pose = est.pose();
        assert!((pose.x - 1.0).abs() < 1e-3);
        assert!((pose.y - 1.0).abs() < 1e-3);
        assert!((pose.heading - FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn narrow_landmark_near_map_point_is_fused() {
        let mut est = estimator_at_origin_with_cone_at(5.0, 0.0);
        // Sensor at x=1.78; observed at 1.78 + 3.32 = 5.1.
        let result = est.update_landmarks(SourceId::Ranging, &[landmark(3.32, 0.2)]);
        assert_eq!(result[0].class, LandmarkClass::Matched { map_index: 0 });
        assert_eq!(est.corrections(), 1);
        assert!((est.pose().x - (-0.02)).abs() < 1e-9);
        assert_eq!(est.landmarks().len(), 1);
    }

    #[test]
    fn wide_landmark_is_excluded_from_fusion_and_history() {
        let mut est = estimator_at_origin_with_cone_at(5.0, 0.0);
        let result = est.update_landmarks(SourceId::Ranging, &[landmark(3.32, 0.6)]);
        assert_eq!(result[0].class, LandmarkClass::Rejected);
        assert_eq!(est.corrections(), 0);
        assert_eq!(est.pose(), Pose::new(0.0, 0.0, 0.0));
        assert!(est.landmarks().is_empty());
        assert_eq!(est.unmatched_history().count(), 0);
    }

    #[test]
    fn distant_landmark_is_kept_as_unmatched() {
        let mut est = estimator_at_origin_with_cone_at(5.0, 0.0);
        let result = est.update_landmarks(SourceId::Ranging, &[landmark(8.0, 0.2)]);
        assert_eq!(result[0].class, LandmarkClass::Unmatched);
        assert_eq!(est.corrections(), 0);
        assert_eq!(est.landmarks().len(), 1);
        assert_eq!(est.unmatched_history().count(), 1);
    }

    #[test]
    fn unmatched_history_is_bounded() {
        let mut est = estimator_at_origin_with_cone_at(5.0, 0.0);
        for _ in 0..(UNMATCHED_HISTORY + 10) {
            est.update_landmarks(SourceId::Ranging, &[landmark(8.0, 0.2)]);
        }
        assert_eq!(est.unmatched_history().count(), UNMATCHED_HISTORY);
    }

    #[test]
    fn non_ranging_landmarks_are_ignored() {
        let mut est = estimator_at_origin_with_cone_at(5.0, 0.0);
        let result = est.update_landmarks(SourceId::Imaging, &[landmark(3.32, 0.2)]);
        assert!(result.is_empty());
        assert_eq!(est.corrections(), 0);
    }
}
