pub mod config;
pub mod controller;
pub mod detection;
pub mod error;
pub mod models;
pub mod params;
pub mod pipeline;
pub mod smoother;
pub mod source;
pub mod store;
pub mod worker;

pub use config::AppConfig;
pub use controller::{Controller, Notification};
pub use detection::{Detection, Detector, PillDetector};
pub use error::{DetectionError, ModelLoadError, ParameterError, SourceError};
pub use models::{BoundingBox, CountResult, Frame, Mode, Region};
pub use params::{Binarization, DetectionParameters, ParameterCell, ParameterPatch};
pub use pipeline::{Pipeline, PipelineStep};
pub use smoother::Smoother;
pub use store::ImageStore;
pub use worker::{Worker, WorkerCommand, WorkerEvent, WorkerHandle};
