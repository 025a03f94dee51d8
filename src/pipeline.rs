use image::DynamicImage;
use std::sync::Arc;
use tracing::trace;

use crate::error::DetectionError;
use crate::models::{Frame, StageImage};

/// Trait that all mask pipeline steps must implement
pub trait PipelineStep: Send + Sync {
    /// Transform the image produced by the previous step
    fn process(&self, image: &DynamicImage) -> Result<DynamicImage, DetectionError>;

    /// Short name, used as the stage label and in trace output
    fn name(&self) -> &str;
}

/// Output of a pipeline run: the final image plus every intermediate one
pub struct PipelineOutput {
    pub image: DynamicImage,
    pub stages: Vec<StageImage>,
}

/// Composable chain of image steps
///
/// The classical detector assembles one of these from the current parameter
/// snapshot for every frame, so a parameter change never affects a run that
/// has already started.
#[derive(Clone)]
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
}

impl Pipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Add a processing step to the pipeline
    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order on `input`
    pub fn run(&self, input: DynamicImage) -> Result<PipelineOutput, DetectionError> {
        let mut image = input;
        let mut stages = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            trace!(
                step = step.name(),
                width = image.width(),
                height = image.height(),
                "running pipeline step"
            );
            image = step.process(&image)?;
            stages.push(StageImage {
                name: step.name().to_string(),
                frame: Frame::new(image.clone()),
            });
        }

        Ok(PipelineOutput { image, stages })
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
