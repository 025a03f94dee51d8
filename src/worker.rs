//! Background worker: owns the frame source, the detector and the smoother.
//!
//! Everything that touches a device or a model runs on the worker thread.
//! The foreground talks to it only through a FIFO command channel and the
//! shared [`ParameterCell`]; results flow back on an unbounded event channel.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, CameraConfig};
use crate::detection::{Detector, PillDetector};
use crate::error::{ModelLoadError, SourceError};
use crate::models::{CountResult, Frame, Mode};
use crate::params::ParameterCell;
use crate::smoother::Smoother;
use crate::source::{CaptureBackend, LiveSource, StaticSource};

/// Requests from the foreground, applied in the order they were sent
#[derive(Debug, Clone)]
pub enum WorkerCommand {
    StartLive { generation: u64 },
    StartStatic { paths: Vec<PathBuf>, generation: u64 },
    Stop { generation: u64 },
    Step(isize),
    ProcessCurrent,
    Shutdown,
}

/// What the worker reports back
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Processed(Box<CountResult>),
    ModeChanged { mode: Mode, generation: u64 },
    /// A recoverable problem: no camera, or an unreadable file
    Fault { error: SourceError, generation: u64 },
    /// The detector could not be built; nothing will ever be processed
    Unavailable(String),
}

pub struct Worker {
    detector: Box<dyn Detector>,
    backend: Box<dyn CaptureBackend>,
    camera: CameraConfig,
    params: ParameterCell,
    smoother: Smoother,
    events: UnboundedSender<WorkerEvent>,
    mode: Mode,
    generation: u64,
    live: Option<LiveSource>,
    files: Option<StaticSource>,
    next_tick: Option<Instant>,
    tick_interval: Duration,
}

impl Worker {
    pub fn new(
        detector: Box<dyn Detector>,
        backend: Box<dyn CaptureBackend>,
        config: &AppConfig,
        params: ParameterCell,
        events: UnboundedSender<WorkerEvent>,
    ) -> Self {
        Self {
            detector,
            backend,
            camera: config.camera.clone(),
            params,
            smoother: Smoother::new(config.smoothing.window()),
            events,
            mode: Mode::Stopped,
            generation: 0,
            live: None,
            files: None,
            next_tick: None,
            tick_interval: config.camera.tick_interval(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_device_open(&self) -> bool {
        self.live.as_ref().is_some_and(LiveSource::is_open)
    }

    pub fn is_trigger_armed(&self) -> bool {
        self.next_tick.is_some()
    }

    pub fn next_tick(&self) -> Option<Instant> {
        self.next_tick
    }

    pub fn static_cursor(&self) -> Option<usize> {
        self.files.as_ref().map(StaticSource::cursor)
    }

    pub fn smoother(&self) -> &Smoother {
        &self.smoother
    }

    pub fn parameters(&self) -> &ParameterCell {
        &self.params
    }

    /// Apply one command. Returns false once the worker should exit.
    pub fn handle(&mut self, command: WorkerCommand) -> bool {
        debug!(?command, mode = %self.mode, "worker command");
        match command {
            WorkerCommand::StartLive { generation } => {
                self.generation = generation;
                self.start_live();
            }
            WorkerCommand::StartStatic { paths, generation } => {
                self.generation = generation;
                self.start_static(paths);
            }
            WorkerCommand::Stop { generation } => {
                self.generation = generation;
                self.stop();
            }
            WorkerCommand::Step(direction) => {
                self.step_static(direction);
            }
            WorkerCommand::ProcessCurrent => self.process_current(),
            WorkerCommand::Shutdown => return false,
        }
        true
    }

    /// Open the camera and arm the periodic trigger
    pub fn start_live(&mut self) {
        self.teardown();
        self.files = None;

        match LiveSource::open(self.backend.as_mut(), &self.camera) {
            Ok(source) => {
                self.live = Some(source);
                self.next_tick = Some(Instant::now());
                self.set_mode(Mode::Live);
            }
            Err(e) => {
                error!(error = %e, "cannot start live mode");
                self.set_mode(Mode::Stopped);
                self.fault(e);
            }
        }
    }

    /// Switch to stepping through `paths`. Nothing is processed until
    /// [`Worker::process_current`] is called.
    pub fn start_static(&mut self, paths: Vec<PathBuf>) {
        self.teardown();
        info!(images = paths.len(), "starting static mode");
        self.files = Some(StaticSource::new(paths));
        self.set_mode(Mode::Static);
    }

    /// Move the static cursor; a step off either end is ignored
    pub fn step_static(&mut self, direction: isize) -> bool {
        if self.mode != Mode::Static {
            warn!(mode = %self.mode, "step ignored outside static mode");
            return false;
        }
        let Some(files) = self.files.as_mut() else {
            return false;
        };
        let moved = files.step(direction);
        if !moved {
            debug!(cursor = files.cursor(), direction, "step would leave the image list");
        }
        moved
    }

    /// Load and process the image under the static cursor
    pub fn process_current(&mut self) {
        if self.mode != Mode::Static {
            warn!(mode = %self.mode, "process request ignored outside static mode");
            return;
        }
        let Some(files) = self.files.as_ref() else {
            return;
        };
        match files.load_current() {
            Ok(frame) => {
                self.process_one(frame, Instant::now());
            }
            Err(e) => {
                warn!(error = %e, cursor = files.cursor(), "skipping unreadable image");
                self.fault(e);
            }
        }
    }

    /// One periodic live tick: read a frame and process it
    pub fn tick(&mut self, now: Instant) {
        if self.mode != Mode::Live {
            self.next_tick = None;
            return;
        }
        self.next_tick = Some(now + self.tick_interval);

        let Some(live) = self.live.as_mut() else {
            return;
        };
        match live.next_frame() {
            Ok(frame) => {
                self.process_one(frame, now);
            }
            Err(e) => warn!(error = %e, "dropped live frame"),
        }
    }

    /// Run the detector on one frame and publish the result.
    ///
    /// Returns the display count, or `None` when the frame failed detection
    /// (nothing is published in that case).
    pub fn process_one(&mut self, frame: Frame, timestamp: Instant) -> Option<u32> {
        let params = self.params.load();
        let frame = frame.oriented();

        let detection = match self.detector.detect(&frame, &params) {
            Ok(detection) => detection,
            Err(e) => {
                warn!(detector = self.detector.name(), error = %e, "detection failed, skipping frame");
                return None;
            }
        };

        let display_count = if self.mode == Mode::Live {
            self.smoother.record(timestamp, detection.raw_count)
        } else {
            detection.raw_count
        };

        let (static_index, source_path) = match (&self.files, self.mode) {
            (Some(files), Mode::Static) => (
                Some(files.cursor()),
                files.current_path().map(|p| p.to_path_buf()),
            ),
            _ => (None, None),
        };

        debug!(
            raw_count = detection.raw_count,
            display_count,
            regions = detection.regions.len(),
            params_version = params.version,
            "frame processed"
        );

        self.emit(WorkerEvent::Processed(Box::new(CountResult {
            annotated: detection.annotated,
            original: frame,
            display_count,
            raw_count: detection.raw_count,
            regions: detection.regions,
            stages: detection.stages,
            mode: self.mode,
            generation: self.generation,
            static_index,
            source_path,
            parameters_version: params.version,
        })));
        Some(display_count)
    }

    /// Cancel the trigger, release the device and forget all state.
    /// Calling it again changes nothing.
    pub fn stop(&mut self) {
        self.teardown();
        self.files = None;
        self.set_mode(Mode::Stopped);
    }

    fn teardown(&mut self) {
        self.next_tick = None;
        if let Some(mut live) = self.live.take() {
            live.close();
        }
        self.smoother.reset();
    }

    fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            info!(from = %self.mode, to = %mode, generation = self.generation, "mode changed");
            self.mode = mode;
        }
        self.emit(WorkerEvent::ModeChanged {
            mode,
            generation: self.generation,
        });
    }

    fn fault(&self, error: SourceError) {
        self.emit(WorkerEvent::Fault {
            error,
            generation: self.generation,
        });
    }

    fn emit(&self, event: WorkerEvent) {
        if self.events.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }

    /// Serve commands until shutdown, firing live ticks in between.
    ///
    /// Pending commands always win over an overdue tick, so a slow detector
    /// cannot starve mode switches.
    pub fn run(mut self, commands: Receiver<WorkerCommand>) {
        info!(detector = self.detector.name(), "worker started");
        loop {
            let received = match self.next_tick {
                Some(deadline) => {
                    commands.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                }
                None => commands.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(command) => {
                    if !self.handle(command) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => self.tick(Instant::now()),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.teardown();
        self.files = None;
        self.mode = Mode::Stopped;
        info!("worker stopped");
    }
}

/// Foreground end of a running worker
pub struct WorkerHandle {
    commands: Option<Sender<WorkerCommand>>,
    thread: Option<JoinHandle<()>>,
    params: ParameterCell,
    unavailable: Option<String>,
}

impl WorkerHandle {
    /// Build the configured detector and start the worker thread.
    ///
    /// If the model cannot be loaded no thread is started: the handle stays
    /// usable for parameter updates but reports itself unavailable, and a
    /// single [`WorkerEvent::Unavailable`] is sent.
    pub fn spawn(
        config: &AppConfig,
        backend: Box<dyn CaptureBackend>,
        events: UnboundedSender<WorkerEvent>,
    ) -> Self {
        match PillDetector::from_config(config) {
            Ok(detector) => Self::spawn_with_detector(Box::new(detector), backend, config, events),
            Err(e) => Self::unavailable(config, e, events),
        }
    }

    pub fn spawn_with_detector(
        detector: Box<dyn Detector>,
        backend: Box<dyn CaptureBackend>,
        config: &AppConfig,
        events: UnboundedSender<WorkerEvent>,
    ) -> Self {
        let params = ParameterCell::new(config.parameters.clone());
        let (tx, rx) = mpsc::channel();
        let worker = Worker::new(detector, backend, config, params.clone(), events.clone());

        match std::thread::Builder::new()
            .name("pill-worker".into())
            .spawn(move || worker.run(rx))
        {
            Ok(thread) => Self {
                commands: Some(tx),
                thread: Some(thread),
                params,
                unavailable: None,
            },
            Err(e) => {
                let reason = format!("failed to start worker thread: {}", e);
                error!(error = %e, "failed to start worker thread");
                let _ = events.send(WorkerEvent::Unavailable(reason.clone()));
                Self {
                    commands: None,
                    thread: None,
                    params,
                    unavailable: Some(reason),
                }
            }
        }
    }

    fn unavailable(config: &AppConfig, e: ModelLoadError, events: UnboundedSender<WorkerEvent>) -> Self {
        error!(error = %e, "detector unavailable");
        let reason = e.to_string();
        let _ = events.send(WorkerEvent::Unavailable(reason.clone()));
        Self {
            commands: None,
            thread: None,
            params: ParameterCell::new(config.parameters.clone()),
            unavailable: Some(reason),
        }
    }

    pub fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable.as_deref()
    }

    pub fn parameters(&self) -> &ParameterCell {
        &self.params
    }

    /// Queue a command. Never blocks; returns false if there is no worker.
    pub fn send(&self, command: WorkerCommand) -> bool {
        match &self.commands {
            Some(tx) => tx.send(command).is_ok(),
            None => {
                warn!(?command, "detector unavailable, command ignored");
                false
            }
        }
    }

    /// Stop the worker and wait for its thread. Waits at most for the frame
    /// currently being read or inferred.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.commands.take() {
            let _ = tx.send(WorkerCommand::Shutdown);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
