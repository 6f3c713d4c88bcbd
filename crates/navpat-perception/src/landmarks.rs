//! Cone-like landmark extraction from a single ranging scan.
//!
//! A landmark is a short run of consecutive beams that is clearly in front of
//! whatever the scanner sees on either side of it.  Wall segments (too many
//! beams) and holes (neighbours closer than the run) are rejected here; the
//! physical-width check is left to the
//! [`PoseEstimator`][crate::localization::PoseEstimator], which also keeps the
//! diagnostics.

use navpat_types::{Landmark, RangingScan};
use serde::{Deserialize, Serialize};

/// Segment-based landmark detector for [`RangingScan`]s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkFinder {
    /// Maximum reading change between neighbouring beams of one object (mm).
    pub continuity_mm: i32,
    /// How much farther both neighbours must be for the run to stand out (mm).
    pub min_jump_mm: i32,
    /// Longest run still considered a landmark.
    pub max_beams: usize,
}

impl Default for LandmarkFinder {
    fn default() -> Self {
        Self {
            continuity_mm: 150,
            min_jump_mm: 300,
            max_beams: 40,
        }
    }
}

impl LandmarkFinder {
    /// Return every landmark in `scan`, ordered by beam index.
    pub fn find(&self, scan: &RangingScan) -> Vec<Landmark> {
        let readings = &scan.readings;
        let mut landmarks = Vec::new();
        let mut i = 0;

        while i < readings.len() {
            if readings[i] <= 0 {
                i += 1;
                continue;
            }
            let start = i;
            while i + 1 < readings.len()
                && readings[i + 1] > 0
                && (readings[i + 1] - readings[i]).abs() < self.continuity_mm
            {
                i += 1;
            }
            let end = i;
            i += 1;

            // Runs touching the edge of the field of view cannot be confirmed.
            if start == 0 || end + 1 >= readings.len() {
                continue;
            }
            let count = end - start + 1;
            if count > self.max_beams {
                continue;
            }
            let segment = &readings[start..=end];
            let farthest = segment.iter().copied().max().unwrap_or(0);
            if !self.stands_out(readings[start - 1], farthest)
                || !self.stands_out(readings[end + 1], farthest)
            {
                continue;
            }

            let mean_mm = segment.iter().map(|&mm| f64::from(mm)).sum::<f64>() / count as f64;
            let centre = (start + end) as f64 / 2.0;
            landmarks.push(Landmark {
                bearing: (RangingScan::FIRST_BEAM_DEG + centre * RangingScan::BEAM_STEP_DEG)
                    .to_radians(),
                range: mean_mm / 1000.0,
                angular_width: count as f64 * RangingScan::beam_step(),
            });
        }

        landmarks
    }

    fn stands_out(&self, neighbour: i32, farthest: i32) -> bool {
        neighbour <= 0 || neighbour - farthest >= self.min_jump_mm
    }
}
