// The capture session controller.
//
// One CaptureSession lives for one scanner screen. The host forwards its lifecycle
// callbacks (`on_create`, `on_resume`, `on_pause`, `on_destroy`, surface created/destroyed),
// calls CaptureSession::pump on its UI thread to receive worker and watchdog messages,
// and CaptureSession::render to keep the viewfinder layer current.
//
// Camera open ⇒ state is CameraOpen, Scanning or ResultFound. Decode worker alive ⇔ state is
// Scanning. Watchdog armed ⇔ state is Scanning or ResultFound. Once a code is read the session
// never scans again: a resume only brings the frozen snapshot back.

use std::time::Instant;

use log::{debug, error, info, warn};

use crate::action::ActionResolver;
use crate::camera::{CameraDriver, CameraHandle, PermissionCheck};
use crate::config::{IdlePolicy, ScanConfig};
use crate::decode::{BarcodeFormat, DecodeHints, Decoded, WorkerFactory, WorkerHandle, WorkerReporter};
use crate::error::Error;
use crate::feedback::Feedback;
use crate::queue::{MessageQueue, UiMessage};
use crate::types::{FrameBuffer, Rect, Surface};
use crate::viewfinder::Viewfinder;
use crate::watchdog::Watchdog;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Created,
    SurfaceWait,
    CameraOpen,
    Scanning,
    ResultFound,
    PermissionDenied,
    CameraError,
    Paused,
    Destroyed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeKind {
    /// Camera access refused; the screen cannot scan.
    PermissionDenied,
    /// A code was read but nothing on this host can open it.
    UnresolvableResult,
}

/// A message the user has to acknowledge. Acknowledging it always ends the screen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

/// Why the screen ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScreenOutcome {
    /// The payload was handed to its handler.
    Opened(String),
    /// The user acknowledged a notice.
    Dismissed(NoticeKind),
    IdleTimeout,
}

/// Everything the session drives but doesn't implement itself.
pub struct Collaborators {
    pub camera: Box<dyn CameraDriver>,
    pub workers: Box<dyn WorkerFactory>,
    pub watchdog: Box<dyn Watchdog>,
    pub feedback: Box<dyn Feedback>,
    pub resolver: Box<dyn ActionResolver>,
    pub permission: Box<dyn PermissionCheck>,
}

pub struct CaptureSession {
    state: SessionState,
    surface: Option<Surface>,
    permission_granted: bool,
    pending_formats: Option<Vec<BarcodeFormat>>,
    pending_charset: Option<String>,
    play_beep: bool,
    vibrate: bool,
    idle_policy: IdlePolicy,

    camera: CameraHandle,
    workers: Box<dyn WorkerFactory>,
    worker: Option<Box<dyn WorkerHandle>>,
    /// Bumped whenever a worker is stopped; messages from older workers are dropped.
    generation: u64,
    watchdog: Box<dyn Watchdog>,
    /// Bumped on every arm and disarm; timeouts from an older epoch are dropped.
    idle_epoch: u64,
    feedback: Box<dyn Feedback>,
    resolver: Box<dyn ActionResolver>,
    permission: Box<dyn PermissionCheck>,

    queue: MessageQueue,
    viewfinder: Viewfinder,
    /// Where the frozen snapshot sits; outlives the camera's framing rect across a pause.
    result_frame: Option<Rect>,
    notice: Option<Notice>,
    outcome: Option<ScreenOutcome>,
}

impl CaptureSession {
    /// `queue` must be the one the watchdog was given to post its timeouts on.
    pub fn new(config: &ScanConfig, queue: MessageQueue, parts: Collaborators) -> Self {
        Self {
            state: SessionState::Created,
            surface: None,
            permission_granted: false,
            pending_formats: None,
            pending_charset: None,
            play_beep: false,
            vibrate: false,
            idle_policy: config.idle_policy,
            camera: CameraHandle::new(parts.camera),
            workers: parts.workers,
            worker: None,
            generation: 0,
            watchdog: parts.watchdog,
            idle_epoch: 0,
            feedback: parts.feedback,
            resolver: parts.resolver,
            permission: parts.permission,
            queue,
            viewfinder: Viewfinder::new(config.accent, config.animation_delay),
            result_frame: None,
            notice: None,
            outcome: None,
        }
    }

    /* ------------------------------ lifecycle hooks ------------------------------ */

    pub fn on_create(&mut self) {
        if self.state != SessionState::Created {
            return;
        }
        self.vibrate = true;
        self.play_beep = self.feedback.sound_enabled();

        self.permission_granted = self.permission.camera_permitted();
        if !self.permission_granted {
            warn!("camera permission denied");
            self.state = SessionState::PermissionDenied;
            self.show_notice(
                NoticeKind::PermissionDenied,
                Error::PermissionDenied.to_string(),
            );
        }
    }

    /// Come (back) to the foreground with fresh decode configuration.
    pub fn on_resume(&mut self, hints: DecodeHints) {
        if !self.permission_granted || self.is_terminal() || self.is_finished() {
            return;
        }

        if self.viewfinder.is_frozen() {
            // Already decoded: show the snapshot again, leave the camera closed.
            self.viewfinder.attach();
            self.arm_watchdog();
            self.state = SessionState::ResultFound;
            return;
        }

        // Replaced wholesale: nothing from the previous foreground period carries over.
        self.pending_formats = hints.formats;
        self.pending_charset = hints.charset;

        if self.play_beep {
            self.feedback.prepare();
        }

        self.viewfinder.attach();
        self.viewfinder.draw_viewfinder();

        match self.surface {
            Some(surface) => self.init_camera(surface),
            None => {
                debug!("waiting for surface");
                self.state = SessionState::SurfaceWait;
            }
        }
    }

    /// Stop the worker (blocking until its thread exits) and release the camera.
    /// Safe to call repeatedly.
    pub fn on_pause(&mut self) {
        self.stop_worker();
        self.camera.close();
        self.disarm_watchdog();
        self.viewfinder.detach();
        if !self.is_terminal() && self.state != SessionState::Created {
            self.state = SessionState::Paused;
        }
    }

    pub fn on_destroy(&mut self) {
        if self.state == SessionState::Destroyed {
            return;
        }
        self.on_pause();
        self.watchdog.shutdown();
        self.state = SessionState::Destroyed;
        info!("capture session destroyed");
    }

    /// The preview surface exists. Ignored if one is already recorded.
    pub fn on_surface_created(&mut self, surface: Surface) {
        if self.surface.is_some() {
            debug!("surface already recorded, ignoring");
            return;
        }
        self.surface = Some(surface);
        if matches!(self.state, SessionState::SurfaceWait) {
            self.init_camera(surface);
        }
    }

    pub fn on_surface_destroyed(&mut self) {
        self.surface = None;
    }

    /* ------------------------------ camera + worker ------------------------------ */

    fn init_camera(&mut self, surface: Surface) {
        if let Err(e) = self.camera.open(surface) {
            // Degraded idle: the screen stays up, just doesn't scan.
            warn!("{}", Error::CameraUnavailable(e));
            self.camera.close();
            self.state = SessionState::CameraError;
            return;
        }
        self.state = SessionState::CameraOpen;
        // The framing rect exists now; get the overlay going.
        self.viewfinder.invalidate();
        self.start_scanning();
    }

    fn start_scanning(&mut self) {
        if self.worker.is_some() {
            self.state = SessionState::Scanning;
            return;
        }
        let hints = DecodeHints {
            formats: self.pending_formats.clone(),
            charset: self.pending_charset.clone(),
        };
        let reporter = WorkerReporter::new(self.generation, self.queue.sender());
        match self.workers.start(self.camera.clone(), hints, reporter) {
            Ok(worker) => {
                self.worker = Some(worker);
                self.state = SessionState::Scanning;
                self.arm_watchdog();
                info!("scanning (worker {})", self.generation);
            }
            Err(Error::WorkerStartConflict) => {
                error!("{}", Error::WorkerStartConflict);
                debug_assert!(false, "decode worker started twice");
            }
            Err(e) => warn!("decode worker did not start: {e}"),
        }
    }

    fn arm_watchdog(&mut self) {
        self.idle_epoch += 1;
        self.watchdog.arm(self.idle_epoch);
    }

    fn disarm_watchdog(&mut self) {
        self.idle_epoch += 1;
        self.watchdog.disarm();
    }

    fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop_and_join();
        }
        self.generation += 1;
    }

    /* ------------------------------ messages ------------------------------ */

    /// Deliver everything the worker and watchdog posted. Call on the UI thread.
    pub fn pump(&mut self) {
        let pending: Vec<UiMessage> = self.queue.drain().collect();
        for msg in pending {
            match msg {
                UiMessage::PossibleResultPoint { generation, point } => {
                    if generation == self.generation && self.state == SessionState::Scanning {
                        self.viewfinder.add_possible_result_point(point);
                    }
                }
                UiMessage::DecodeSucceeded { generation, decoded } => {
                    if generation != self.generation {
                        debug!("dropping result from stopped worker {generation}");
                        continue;
                    }
                    self.handle_decode(decoded);
                }
                UiMessage::IdleTimeout { epoch } => {
                    if epoch != self.idle_epoch {
                        debug!("dropping idle timeout from epoch {epoch}");
                        continue;
                    }
                    self.on_idle_timeout();
                }
            }
        }
    }

    /// A barcode was read.
    pub fn handle_decode(&mut self, decoded: Decoded) {
        if self.state != SessionState::Scanning {
            debug!("dropping result in state {:?}", self.state);
            return;
        }
        self.result_frame = self.camera.framing_rect();
        self.stop_worker();
        self.state = SessionState::ResultFound;
        info!("decoded {:?}: {}", decoded.format, decoded.text);

        let Decoded { text, snapshot, .. } = decoded;
        self.viewfinder.draw_result_image(snapshot);
        self.watchdog.on_activity();
        self.feedback.play(self.play_beep, self.vibrate);

        match self.resolver.resolve(&text) {
            Some(action) => match action.invoke() {
                Ok(()) => self.finish(ScreenOutcome::Opened(text)),
                Err(e) => {
                    warn!("{e}");
                    self.show_notice(NoticeKind::UnresolvableResult, unresolvable_message(&text));
                }
            },
            None => {
                info!("{}", Error::UnresolvableResult(text.clone()));
                self.show_notice(NoticeKind::UnresolvableResult, unresolvable_message(&text));
            }
        }
    }

    fn on_idle_timeout(&mut self) {
        if !matches!(self.state, SessionState::Scanning | SessionState::ResultFound) {
            return;
        }
        match self.idle_policy {
            IdlePolicy::Finish => {
                info!("idle timeout, closing scanner");
                self.finish(ScreenOutcome::IdleTimeout);
            }
            IdlePolicy::Ignore => debug!("idle timeout ignored"),
        }
    }

    /* ------------------------------ notices + outcome ------------------------------ */

    fn show_notice(&mut self, kind: NoticeKind, message: String) {
        self.notice = Some(Notice { kind, message });
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    /// The user dismissed the notice; the screen ends.
    pub fn acknowledge_notice(&mut self) {
        if let Some(notice) = self.notice.take() {
            self.finish(ScreenOutcome::Dismissed(notice.kind));
        }
    }

    fn finish(&mut self, outcome: ScreenOutcome) {
        if self.outcome.is_none() {
            info!("screen finished: {outcome:?}");
            self.outcome = Some(outcome);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn outcome(&self) -> Option<&ScreenOutcome> {
        self.outcome.as_ref()
    }

    /* ------------------------------ rendering + accessors ------------------------------ */

    /// Redraw the overlay layer if the viewfinder wants it. Returns whether it drew.
    pub fn render(&mut self, layer: &mut FrameBuffer, now: Instant) -> bool {
        if !self.viewfinder.needs_redraw(now) {
            return false;
        }
        let frame = self.camera.framing_rect().or(self.result_frame);
        self.viewfinder.draw(layer, frame, now);
        true
    }

    /// Copy the latest camera picture into `screen`; false if there is none yet.
    pub fn copy_preview_into(&self, screen: &mut FrameBuffer) -> bool {
        self.camera.copy_preview_into(screen)
    }

    fn is_terminal(&self) -> bool {
        matches!(self.state, SessionState::PermissionDenied | SessionState::Destroyed)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    pub fn decode_active(&self) -> bool {
        self.worker.is_some()
    }

    pub fn permission_granted(&self) -> bool {
        self.permission_granted
    }

    pub fn camera_open(&self) -> bool {
        self.camera.is_open()
    }

    pub fn framing_rect(&self) -> Option<Rect> {
        self.camera.framing_rect()
    }

    pub fn pending_hints(&self) -> DecodeHints {
        DecodeHints {
            formats: self.pending_formats.clone(),
            charset: self.pending_charset.clone(),
        }
    }

    pub fn sound_enabled(&self) -> bool {
        self.play_beep
    }

    pub fn viewfinder(&self) -> &Viewfinder {
        &self.viewfinder
    }
}

fn unresolvable_message(text: &str) -> String {
    let mut shown: String = text.chars().take(40).collect();
    if shown.len() < text.len() {
        shown.push_str("...");
    }
    format!("Cannot open scanned code: {shown}")
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.on_destroy();
    }
}
