//! Foreground façade over the worker.
//!
//! Commands return immediately; the controller never touches a device or a
//! model itself. Worker events are turned into counter updates, store writes
//! and [`Notification`]s for whoever presents them.

use std::path::PathBuf;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::detection::Detector;
use crate::detection::steps::STAGE_NAMES;
use crate::error::{ParameterError, SourceError};
use crate::models::{CountResult, Mode};
use crate::params::{Binarization, DetectionParameters, ParameterPatch};
use crate::source::{self, CaptureBackend};
use crate::store::ImageStore;
use crate::worker::{WorkerCommand, WorkerEvent, WorkerHandle};

/// Observable state changes
#[derive(Debug, Clone)]
pub enum Notification {
    FramesProcessedChanged(u64),
    PillCountChanged(u32),
    /// These store keys hold new images
    ImagesUpdated(Vec<String>),
    ModeChanged(Mode),
    Fault(SourceError),
    Unavailable(String),
}

pub struct Controller {
    worker: WorkerHandle,
    events: UnboundedReceiver<WorkerEvent>,
    store: ImageStore,
    stream_id: String,
    generation: u64,
    frames_processed: u64,
    pill_count: u32,
    mode: Mode,
    latest: Option<CountResult>,
    discarded: u64,
    unavailable: Option<String>,
}

impl Controller {
    /// Start a worker with the camera backend compiled into this build
    pub fn new(config: &AppConfig) -> Self {
        Self::with_backend(config, source::default_backend())
    }

    pub fn with_backend(config: &AppConfig, backend: Box<dyn CaptureBackend>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = WorkerHandle::spawn(config, backend, tx);
        Self::from_parts(config, worker, rx)
    }

    /// Use an already built detector instead of the configured one
    pub fn with_detector(
        config: &AppConfig,
        detector: Box<dyn Detector>,
        backend: Box<dyn CaptureBackend>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = WorkerHandle::spawn_with_detector(detector, backend, config, tx);
        Self::from_parts(config, worker, rx)
    }

    fn from_parts(config: &AppConfig, worker: WorkerHandle, events: UnboundedReceiver<WorkerEvent>) -> Self {
        let unavailable = worker.unavailable_reason().map(str::to_string);
        Self {
            worker,
            events,
            store: ImageStore::new(),
            stream_id: config.display.stream_id.clone(),
            generation: 0,
            frames_processed: 0,
            pill_count: 0,
            mode: Mode::Stopped,
            latest: None,
            discarded: 0,
            unavailable,
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub fn start_live(&mut self) {
        let generation = self.next_generation();
        self.worker.send(WorkerCommand::StartLive { generation });
    }

    pub fn stop(&mut self) {
        let generation = self.next_generation();
        self.worker.send(WorkerCommand::Stop { generation });
    }

    /// Switch to static mode over `paths` and process the first image
    pub fn load_static_set(&mut self, paths: Vec<PathBuf>) {
        let generation = self.next_generation();
        info!(images = paths.len(), generation, "loading static image set");
        self.worker.send(WorkerCommand::StartStatic { paths, generation });
        self.worker.send(WorkerCommand::ProcessCurrent);
    }

    pub fn next(&self) {
        self.worker.send(WorkerCommand::Step(1));
        self.worker.send(WorkerCommand::ProcessCurrent);
    }

    pub fn previous(&self) {
        self.worker.send(WorkerCommand::Step(-1));
        self.worker.send(WorkerCommand::ProcessCurrent);
    }

    pub fn reprocess_current(&self) {
        self.worker.send(WorkerCommand::ProcessCurrent);
    }

    pub fn parameters(&self) -> std::sync::Arc<DetectionParameters> {
        self.worker.parameters().load()
    }

    /// Validate and publish a parameter change; the worker picks it up on
    /// its next frame.
    pub fn update_parameters(&self, patch: ParameterPatch) -> Result<(), ParameterError> {
        let params = self.worker.parameters().update(&patch)?;
        debug!(version = params.version, ?patch, "parameters updated");
        Ok(())
    }

    pub fn set_confidence_threshold(&self, threshold: f32) -> Result<(), ParameterError> {
        self.update_parameters(ParameterPatch {
            confidence_threshold: Some(threshold),
            ..Default::default()
        })
    }

    pub fn set_display_scale(&self, scale: f32) -> Result<(), ParameterError> {
        self.update_parameters(ParameterPatch {
            display_font_scale: Some(scale),
            ..Default::default()
        })
    }

    pub fn set_blur_aperture(&self, aperture: u32) -> Result<(), ParameterError> {
        self.update_parameters(ParameterPatch {
            blur_aperture: Some(aperture),
            ..Default::default()
        })
    }

    pub fn set_binarization(&self, binarization: Binarization) -> Result<(), ParameterError> {
        self.update_parameters(ParameterPatch {
            binarization: Some(binarization),
            ..Default::default()
        })
    }

    pub fn set_kernel_size(&self, size: u32) -> Result<(), ParameterError> {
        self.update_parameters(ParameterPatch {
            morphology_kernel_size: Some(size),
            ..Default::default()
        })
    }

    pub fn set_closing_enabled(&self, enabled: bool) -> Result<(), ParameterError> {
        self.update_parameters(ParameterPatch {
            closing_enabled: Some(enabled),
            ..Default::default()
        })
    }

    pub fn set_opening_enabled(&self, enabled: bool) -> Result<(), ParameterError> {
        self.update_parameters(ParameterPatch {
            opening_enabled: Some(enabled),
            ..Default::default()
        })
    }

    /// Handle every event already waiting, without blocking
    pub fn poll(&mut self) -> Vec<Notification> {
        let mut notifications = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            notifications.extend(self.apply(event));
        }
        notifications
    }

    /// Wait for at least one event, then handle everything queued behind it.
    /// Returns `None` once the worker is gone and no events remain.
    pub async fn next_notifications(&mut self) -> Option<Vec<Notification>> {
        let event = self.events.recv().await?;
        let mut notifications = self.apply(event);
        notifications.extend(self.poll());
        Some(notifications)
    }

    /// Fold one worker event into the controller state
    pub fn apply(&mut self, event: WorkerEvent) -> Vec<Notification> {
        match event {
            WorkerEvent::Processed(result) => self.apply_result(*result),
            WorkerEvent::ModeChanged { mode, generation } => {
                if generation < self.generation {
                    debug!(%mode, generation, current = self.generation, "ignoring stale mode change");
                    return Vec::new();
                }
                self.mode = mode;
                vec![Notification::ModeChanged(mode)]
            }
            WorkerEvent::Fault { error, generation } => {
                if generation < self.generation {
                    debug!(error = %error, generation, current = self.generation, "ignoring fault from a previous mode");
                    return Vec::new();
                }
                warn!(error = %error, "worker fault");
                vec![Notification::Fault(error)]
            }
            WorkerEvent::Unavailable(reason) => {
                self.unavailable = Some(reason.clone());
                vec![Notification::Unavailable(reason)]
            }
        }
    }

    fn apply_result(&mut self, result: CountResult) -> Vec<Notification> {
        if result.generation < self.generation {
            self.discarded += 1;
            debug!(
                generation = result.generation,
                current = self.generation,
                "dropping result from a previous mode"
            );
            return Vec::new();
        }

        self.frames_processed += 1;
        self.pill_count = result.display_count;

        let mut keys = Vec::with_capacity(2 + STAGE_NAMES.len());
        let annotated_key = self.annotated_key();
        self.store.set(&annotated_key, result.annotated.clone());
        keys.push(annotated_key);
        let original_key = self.unannotated_key();
        self.store.set(&original_key, result.original.clone());
        keys.push(original_key);

        // stages that did not run on this frame must not show an older image
        for (i, name) in STAGE_NAMES.iter().enumerate() {
            let key = self.stage_key(i + 1);
            match result.stages.iter().find(|stage| stage.name == *name) {
                Some(stage) => {
                    self.store.set(&key, stage.frame.clone());
                    keys.push(key);
                }
                None => {
                    if self.store.remove(&key).is_some() {
                        keys.push(key);
                    }
                }
            }
        }

        self.latest = Some(result);
        vec![
            Notification::FramesProcessedChanged(self.frames_processed),
            Notification::PillCountChanged(self.pill_count),
            Notification::ImagesUpdated(keys),
        ]
    }

    pub fn annotated_key(&self) -> String {
        format!("annotated_{}", self.stream_id)
    }

    pub fn unannotated_key(&self) -> String {
        format!("unannotated_{}", self.stream_id)
    }

    /// Key of intermediate image `n`; see [`STAGE_NAMES`] for the numbering
    pub fn stage_key(&self, n: usize) -> String {
        format!("{}_{}", n, self.stream_id)
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn pill_count(&self) -> u32 {
        self.pill_count
    }

    /// Mode as last reported by the worker
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn latest_result(&self) -> Option<&CountResult> {
        self.latest.as_ref()
    }

    /// Results dropped because they belonged to a mode already left
    pub fn discarded_results(&self) -> u64 {
        self.discarded
    }

    pub fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable.as_deref()
    }

    /// Stop the worker and wait for it to exit
    pub fn shutdown(&mut self) {
        self.worker.shutdown();
    }
}
