// The decode worker: a background thread that pulls frames from the camera, runs a
// FrameDecoder over the framing region, and posts what it finds to the UI queue.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::camera::CameraHandle;
use crate::error::{Error, Result};
use crate::queue::{UiMessage, UiSender};
use crate::types::{FrameBuffer, Rect, ResultPoint};

/// Pause between attempts when the camera has nothing for us.
const IDLE_BACKOFF: Duration = Duration::from_millis(20);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BarcodeFormat {
    QrCode,
    DataMatrix,
    Aztec,
    Pdf417,
    Code128,
    Code39,
    Ean13,
    Ean8,
    UpcA,
}

impl FromStr for BarcodeFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let norm: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match norm.as_str() {
            "qr" | "qrcode" => Ok(BarcodeFormat::QrCode),
            "datamatrix" => Ok(BarcodeFormat::DataMatrix),
            "aztec" => Ok(BarcodeFormat::Aztec),
            "pdf417" => Ok(BarcodeFormat::Pdf417),
            "code128" => Ok(BarcodeFormat::Code128),
            "code39" => Ok(BarcodeFormat::Code39),
            "ean13" => Ok(BarcodeFormat::Ean13),
            "ean8" => Ok(BarcodeFormat::Ean8),
            "upca" => Ok(BarcodeFormat::UpcA),
            _ => Err(format!("unknown barcode format '{s}'")),
        }
    }
}

/// Decode configuration captured by the session when it resumes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodeHints {
    /// None = every format the decoder supports.
    pub formats: Option<Vec<BarcodeFormat>>,
    pub charset: Option<String>,
}

impl DecodeHints {
    pub fn allows(&self, format: BarcodeFormat) -> bool {
        self.formats.as_ref().is_none_or(|f| f.contains(&format))
    }
}

/// A successful decode: the payload plus a snapshot of the framing region.
#[derive(Clone)]
pub struct Decoded {
    pub text: String,
    pub format: BarcodeFormat,
    /// Corner/finder points relative to the framing rect.
    pub points: Vec<ResultPoint>,
    pub snapshot: FrameBuffer,
}

impl fmt::Debug for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoded")
            .field("text", &self.text)
            .field("format", &self.format)
            .field("points", &self.points.len())
            .field("snapshot", &(self.snapshot.width, self.snapshot.height))
            .finish()
    }
}

pub enum DecodeOutcome {
    Found(Decoded),
    /// Something barcode-like was located but not read.
    Candidates(Vec<ResultPoint>),
    Nothing,
}

/// One frame in, at most one result out.
pub trait FrameDecoder: Send {
    /// `region` is the framing rect in frame pixels.
    fn decode(&mut self, frame: &FrameBuffer, region: Rect, hints: &DecodeHints) -> DecodeOutcome;
}

/// How a worker talks back to the session. Every message carries the worker's generation,
/// so anything posted by a worker the session has since stopped is ignored.
#[derive(Clone)]
pub struct WorkerReporter {
    generation: u64,
    tx: UiSender,
}

impl WorkerReporter {
    pub fn new(generation: u64, tx: UiSender) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// False once the session side of the queue is gone.
    pub fn possible_result_point(&self, point: ResultPoint) -> bool {
        self.tx
            .send(UiMessage::PossibleResultPoint { generation: self.generation, point })
            .is_ok()
    }

    pub fn decoded(&self, decoded: Decoded) -> bool {
        self.tx
            .send(UiMessage::DecodeSucceeded { generation: self.generation, decoded })
            .is_ok()
    }
}

pub trait WorkerHandle {
    /// Ask the worker to stop and block until its thread has exited.
    fn stop_and_join(self: Box<Self>);
}

pub trait WorkerFactory {
    fn start(
        &self,
        camera: CameraHandle,
        hints: DecodeHints,
        reporter: WorkerReporter,
    ) -> Result<Box<dyn WorkerHandle>>;
}

/// Runs one decoder per worker thread. Refuses to start while a previous worker is alive.
pub struct ThreadedWorkerFactory<F> {
    make_decoder: F,
    live: Arc<AtomicBool>,
}

impl<F, D> ThreadedWorkerFactory<F>
where
    F: Fn() -> D,
    D: FrameDecoder + 'static,
{
    pub fn new(make_decoder: F) -> Self {
        Self { make_decoder, live: Arc::new(AtomicBool::new(false)) }
    }
}

impl<F, D> WorkerFactory for ThreadedWorkerFactory<F>
where
    F: Fn() -> D,
    D: FrameDecoder + 'static,
{
    fn start(
        &self,
        camera: CameraHandle,
        hints: DecodeHints,
        reporter: WorkerReporter,
    ) -> Result<Box<dyn WorkerHandle>> {
        if self
            .live
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::WorkerStartConflict);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let decoder = (self.make_decoder)();
        let thread_stop = Arc::clone(&stop);
        let live = Arc::clone(&self.live);
        let generation = reporter.generation();

        let spawned = thread::Builder::new()
            .name("decode-worker".to_string())
            .spawn(move || {
                decode_loop(decoder, camera, hints, reporter, thread_stop);
                live.store(false, Ordering::SeqCst);
            });

        match spawned {
            Ok(thread) => {
                info!("decode worker {generation} started");
                Ok(Box::new(DecodeThread { stop, thread: Some(thread), generation }))
            }
            Err(e) => {
                self.live.store(false, Ordering::SeqCst);
                Err(Error::Spawn("decode-worker", e.to_string()))
            }
        }
    }
}

fn decode_loop<D: FrameDecoder>(
    mut decoder: D,
    camera: CameraHandle,
    hints: DecodeHints,
    reporter: WorkerReporter,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::SeqCst) {
        let Some(region) = camera.framing_rect() else {
            thread::sleep(IDLE_BACKOFF);
            continue;
        };
        let frame = match camera.grab_frame() {
            Ok(frame) => frame,
            Err(e) => {
                debug!("decode worker: no frame ({e})");
                thread::sleep(IDLE_BACKOFF);
                continue;
            }
        };
        if stop.load(Ordering::SeqCst) {
            break;
        }

        match decoder.decode(&frame, region, &hints) {
            DecodeOutcome::Found(decoded) => {
                debug!("decode worker: found {:?}", decoded.format);
                // The worker is done after a full decode; the session joins it.
                if !reporter.decoded(decoded) {
                    warn!("decode worker: session queue closed, result dropped");
                }
                break;
            }
            DecodeOutcome::Candidates(points) => {
                for point in points {
                    if !reporter.possible_result_point(point) {
                        return;
                    }
                }
            }
            DecodeOutcome::Nothing => {}
        }
    }
}

/// Handle on a running decode thread.
pub struct DecodeThread {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    generation: u64,
}

impl WorkerHandle for DecodeThread {
    fn stop_and_join(mut self: Box<Self>) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("decode worker {} panicked", self.generation);
            } else {
                info!("decode worker {} stopped", self.generation);
            }
        }
    }
}

impl Drop for DecodeThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraDriver;
    use crate::error::CameraError;
    use crate::queue::MessageQueue;
    use crate::types::Surface;
    use std::time::Instant;

    struct StillCamera {
        open: bool,
    }

    impl CameraDriver for StillCamera {
        fn open(&mut self, _surface: Surface) -> std::result::Result<(), CameraError> {
            self.open = true;
            Ok(())
        }
        fn close(&mut self) {
            self.open = false;
        }
        fn is_open(&self) -> bool {
            self.open
        }
        fn framing_rect(&self) -> Option<Rect> {
            self.open.then_some(Rect::new(0, 0, 8, 8))
        }
        fn grab_frame(&mut self) -> std::result::Result<FrameBuffer, CameraError> {
            thread::sleep(Duration::from_millis(2));
            Ok(FrameBuffer::new(8, 8, 0))
        }
    }

    /// Reports a candidate on each frame, then decodes on the `after`-th frame.
    struct CountingDecoder {
        seen: usize,
        after: usize,
    }

    impl FrameDecoder for CountingDecoder {
        fn decode(&mut self, frame: &FrameBuffer, region: Rect, _hints: &DecodeHints) -> DecodeOutcome {
            self.seen += 1;
            if self.seen >= self.after {
                DecodeOutcome::Found(Decoded {
                    text: "hello".to_string(),
                    format: BarcodeFormat::QrCode,
                    points: vec![],
                    snapshot: frame.crop(region).unwrap_or_else(|| frame.clone()),
                })
            } else {
                DecodeOutcome::Candidates(vec![ResultPoint::new(1.0, 1.0)])
            }
        }
    }

    fn open_camera() -> CameraHandle {
        let camera = CameraHandle::new(Box::new(StillCamera { open: false }));
        camera.open(Surface { width: 8, height: 8 }).unwrap();
        camera
    }

    #[test]
    fn worker_posts_points_then_result_and_exits() {
        let queue = MessageQueue::new();
        let factory = ThreadedWorkerFactory::new(|| CountingDecoder { seen: 0, after: 3 });
        let handle = factory
            .start(open_camera(), DecodeHints::default(), WorkerReporter::new(7, queue.sender()))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut points = 0;
        let mut decoded = None;
        while decoded.is_none() && Instant::now() < deadline {
            for msg in queue.drain() {
                match msg {
                    UiMessage::PossibleResultPoint { generation, .. } => {
                        assert_eq!(generation, 7);
                        points += 1;
                    }
                    UiMessage::DecodeSucceeded { generation, decoded: d } => {
                        assert_eq!(generation, 7);
                        decoded = Some(d);
                    }
                    UiMessage::IdleTimeout { .. } => unreachable!(),
                }
            }
            thread::sleep(Duration::from_millis(5));
        }
        handle.stop_and_join();
        assert_eq!(points, 2);
        assert_eq!(decoded.unwrap().text, "hello");
    }

    #[test]
    fn second_start_while_live_is_a_conflict() {
        let queue = MessageQueue::new();
        let factory = ThreadedWorkerFactory::new(|| CountingDecoder { seen: 0, after: usize::MAX });
        let camera = open_camera();
        let first = factory
            .start(camera.clone(), DecodeHints::default(), WorkerReporter::new(1, queue.sender()))
            .unwrap();
        let second =
            factory.start(camera.clone(), DecodeHints::default(), WorkerReporter::new(2, queue.sender()));
        assert!(matches!(second, Err(Error::WorkerStartConflict)));

        first.stop_and_join();
        let third = factory
            .start(camera, DecodeHints::default(), WorkerReporter::new(3, queue.sender()))
            .unwrap();
        third.stop_and_join();
    }

    #[test]
    fn hints_filter_formats() {
        let all = DecodeHints::default();
        assert!(all.allows(BarcodeFormat::Ean13));
        let qr_only = DecodeHints { formats: Some(vec![BarcodeFormat::QrCode]), charset: None };
        assert!(qr_only.allows(BarcodeFormat::QrCode));
        assert!(!qr_only.allows(BarcodeFormat::Ean13));
        assert_eq!("QR_CODE".parse::<BarcodeFormat>(), Ok(BarcodeFormat::QrCode));
    }
}
