//! Extensions that live in the runtime because they touch [`RobotState`].

use std::path::PathBuf;

use navpat_kernel::Extension;
use navpat_perception::transform::polar_to_world;
use navpat_perception::{LandmarkFinder, ObservedLandmark};
use navpat_types::{AbortSignal, Point, Pose, RANGING_MOUNT, RangingScan, SensorPayload, SensorSample, SourceId};
use serde::Serialize;

use crate::robot::RobotState;

/// Feeds landmarks of every ranging scan to the pose estimator.
#[derive(Debug, Default)]
pub struct LandmarkTracker {
    finder: LandmarkFinder,
}

impl LandmarkTracker {
    pub fn new(finder: LandmarkFinder) -> Self {
        Self { finder }
    }
}

impl Extension<RobotState> for LandmarkTracker {
    fn on_sample(&mut self, ctx: &mut RobotState, sample: &SensorSample) -> Result<(), AbortSignal> {
        if let SensorPayload::Ranging(scan) = &sample.payload {
            let found = self.finder.find(scan);
            ctx.localization.update_landmarks(SourceId::Ranging, &found);
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Visualization collector
// ────────────────────────────────────────────────────────────────────────────

/// Everything the external viewer draws for one ranging sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewerRecord {
    pub time: f64,
    pub pose: Pose,
    /// World-frame hit points of every second beam.
    pub scan: Vec<Point>,
    /// Latest camera frame, resolved against the image directory.
    pub image: Option<String>,
    pub landmarks: Vec<ObservedLandmark>,
}

/// Accumulates [`ViewerRecord`]s into [`RobotState::viewer_data`].
///
/// Read-only with respect to control: never aborts, never touches the pose.
#[derive(Debug, Default)]
pub struct ViewerCollector {
    finder: LandmarkFinder,
    image_dir: Option<PathBuf>,
}

impl ViewerCollector {
    const BEAM_STRIDE: usize = 2;

    pub fn new(finder: LandmarkFinder) -> Self {
        Self {
            finder,
            image_dir: None,
        }
    }

    pub fn with_image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.image_dir = Some(dir.into());
        self
    }

    fn record(&self, ctx: &RobotState, time: f64, scan: &RangingScan) -> ViewerRecord {
        let pose = ctx.localization.pose();
        let points = (0..scan.readings.len())
            .step_by(Self::BEAM_STRIDE)
            .filter_map(|i| {
                let range = scan.range(i)?;
                Some(polar_to_world(&pose, RANGING_MOUNT, RangingScan::bearing(i), range))
            })
            .collect();
        let image = ctx.camera.as_ref().map(|report| match &self.image_dir {
            Some(dir) => dir.join(&report.image.path).to_string_lossy().into_owned(),
            None => report.image.path.clone(),
        });
        let landmarks = self
            .finder
            .find(scan)
            .iter()
            .map(|lm| ctx.localization.classify(lm))
            .collect();
        ViewerRecord {
            time,
            pose,
            scan: points,
            image,
            landmarks,
        }
    }
}

impl Extension<RobotState> for ViewerCollector {
    fn on_sample(&mut self, ctx: &mut RobotState, sample: &SensorSample) -> Result<(), AbortSignal> {
        if let SensorPayload::Ranging(scan) = &sample.payload {
            let record = self.record(ctx, sample.timestamp, scan);
            ctx.viewer_data.push(record);
        }
        Ok(())
    }
}
