mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from pillcounter for tests
pub use pillcounter::detection::{Annotator, BoxPredictor, ClassicalDetector, LearnedDetector};
pub use pillcounter::source::{CaptureBackend, CaptureDevice};
pub use pillcounter::{
    AppConfig, BoundingBox, Controller, CountResult, Detection, DetectionError, DetectionParameters,
    Detector, Frame, Mode, Notification, Region, SourceError, Worker, WorkerCommand, WorkerEvent,
};
