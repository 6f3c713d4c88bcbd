//! Off-thread camera processing.
//!
//! Camera frames arrive as [`ImageRef`]s in the tick's samples.  The
//! [`ImageProcessor`] forwards them over a `tokio::sync::mpsc` channel to a
//! worker thread running a [`LandmarkDetector`] and hands back finished
//! [`CameraReport`]s at a later tick.  The control thread never blocks on
//! the detector.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use navpat_types::{ImageRef, Landmark};
use serde::Serialize;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, warn};

/// Vision collaborator: finds landmarks in a camera frame.
pub trait LandmarkDetector: Send + 'static {
    /// `None` when the frame cannot be processed.
    fn detect(&mut self, image: &ImageRef) -> Option<Vec<Landmark>>;
}

/// Detector result for one camera frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraReport {
    pub image: ImageRef,
    pub landmarks: Option<Vec<Landmark>>,
}

/// Detector that only checks the frame is readable from `root`.
///
/// Reports an empty landmark list for readable frames and `None` otherwise;
/// use it where no vision model is available.
#[derive(Debug, Clone, Default)]
pub struct FrameProbe {
    root: PathBuf,
}

impl FrameProbe {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl LandmarkDetector for FrameProbe {
    fn detect(&mut self, image: &ImageRef) -> Option<Vec<Landmark>> {
        let path = self.root.join(&image.path);
        path.is_file().then(Vec::new)
    }
}

pub struct ImageProcessor {
    requests: Option<UnboundedSender<ImageRef>>,
    reports: UnboundedReceiver<CameraReport>,
    worker: Option<JoinHandle<()>>,
}

impl ImageProcessor {
    pub fn spawn(mut detector: impl LandmarkDetector) -> Self {
        let (request_tx, mut request_rx) = unbounded_channel::<ImageRef>();
        let (report_tx, report_rx) = unbounded_channel();

        let worker = thread::spawn(move || {
            while let Some(image) = request_rx.blocking_recv() {
                let landmarks = detector.detect(&image);
                if report_tx.send(CameraReport { image, landmarks }).is_err() {
                    break;
                }
            }
            debug!("image worker finished");
        });

        Self {
            requests: Some(request_tx),
            reports: report_rx,
            worker: Some(worker),
        }
    }

    /// Queue a frame for detection.
    pub fn submit(&mut self, image: ImageRef) {
        if let Some(tx) = &self.requests {
            if tx.send(image).is_err() {
                warn!("image worker gone, frame dropped");
            }
        }
    }

    /// Most recent finished report, if any arrived since the last call.
    pub fn try_result(&mut self) -> Option<CameraReport> {
        let mut latest = None;
        while let Ok(report) = self.reports.try_recv() {
            latest = Some(report);
        }
        latest
    }
}

impl Drop for ImageProcessor {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("image worker panicked");
            }
        }
    }
}
