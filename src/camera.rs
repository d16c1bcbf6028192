// Camera side of the scanner: the driver contract, the session-owned handle that shares the
// driver with the decode worker, framing geometry, and the nokhwa-backed webcam driver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, bounded, unbounded};
use log::{debug, info, warn};

use crate::error::CameraError;
use crate::types::{FrameBuffer, Rect, Surface};

// Bring in nokhwa types for camera control.
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution},
};

// `image` resizes device frames that don't match the surface.
use image::imageops::{self, FilterType};

const MIN_FRAME_WIDTH: u32 = 240;
const MIN_FRAME_HEIGHT: u32 = 240;
const MAX_FRAME_WIDTH: u32 = 480;
const MAX_FRAME_HEIGHT: u32 = 360;

/// Where the scan target sits on a surface: 3/4 of each axis, clamped, centered.
/// Visual: the clear window inside the dark mask.
pub fn framing_rect_for(surface: Surface) -> Option<Rect> {
    if surface.width == 0 || surface.height == 0 {
        return None;
    }
    let width = (surface.width * 3 / 4)
        .clamp(MIN_FRAME_WIDTH, MAX_FRAME_WIDTH)
        .min(surface.width);
    let height = (surface.height * 3 / 4)
        .clamp(MIN_FRAME_HEIGHT, MAX_FRAME_HEIGHT)
        .min(surface.height);
    let left = ((surface.width - width) / 2) as i32;
    let top = ((surface.height - height) / 2) as i32;
    Some(Rect::new(left, top, left + width as i32, top + height as i32))
}

/// What the session needs from a camera.
pub trait CameraDriver: Send {
    /// Acquire the device and start streaming at the surface size.
    fn open(&mut self, surface: Surface) -> Result<(), CameraError>;
    /// Stop streaming and release the device. No-op when closed.
    fn close(&mut self);
    fn is_open(&self) -> bool;
    /// The scan target in surface pixels; None until opened.
    fn framing_rect(&self) -> Option<Rect>;
    /// Block until the next frame (0x00RRGGBB, surface-sized) is available.
    fn grab_frame(&mut self) -> Result<FrameBuffer, CameraError>;
}

/// The session's exclusive handle on its camera.
///
/// The decode worker gets a clone to pull frames; the UI thread only reads the published
/// framing rect and latest preview, so it never waits on a frame grab.
#[derive(Clone)]
pub struct CameraHandle {
    driver: Arc<Mutex<Box<dyn CameraDriver>>>,
    framing: Arc<RwLock<Option<Rect>>>,
    preview: Arc<Mutex<Option<FrameBuffer>>>,
    open: Arc<AtomicBool>,
}

impl CameraHandle {
    pub fn new(driver: Box<dyn CameraDriver>) -> Self {
        Self {
            driver: Arc::new(Mutex::new(driver)),
            framing: Arc::new(RwLock::new(None)),
            preview: Arc::new(Mutex::new(None)),
            open: Arc::new(AtomicBool::new(false)),
        }
    }

    fn driver(&self) -> MutexGuard<'_, Box<dyn CameraDriver>> {
        self.driver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn open(&self, surface: Surface) -> Result<(), CameraError> {
        let mut driver = self.driver();
        if !driver.is_open() {
            driver.open(surface)?;
        }
        *self.framing.write().unwrap_or_else(PoisonError::into_inner) = driver.framing_rect();
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Release the device. Safe to call whether or not `open` succeeded.
    pub fn close(&self) {
        self.driver().close();
        *self.framing.write().unwrap_or_else(PoisonError::into_inner) = None;
        *self.preview.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn framing_rect(&self) -> Option<Rect> {
        *self.framing.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pull a frame for decoding; it also becomes the latest preview.
    pub fn grab_frame(&self) -> Result<FrameBuffer, CameraError> {
        if !self.is_open() {
            return Err(CameraError::NotOpen);
        }
        let frame = self.driver().grab_frame()?;
        *self.preview.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame.clone());
        Ok(frame)
    }

    /// Copy the latest preview into `dst` if the sizes match.
    /// Visual: the live camera picture under the overlay.
    pub fn copy_preview_into(&self, dst: &mut FrameBuffer) -> bool {
        let preview = self.preview.lock().unwrap_or_else(PoisonError::into_inner);
        match preview.as_ref() {
            Some(p) if p.width == dst.width && p.height == dst.height => {
                dst.pixels.copy_from_slice(&p.pixels);
                true
            }
            _ => false,
        }
    }
}

/// Camera permission gate checked once when the screen is created.
pub trait PermissionCheck {
    fn camera_permitted(&self) -> bool;
}

/// Asks the platform backend (AVFoundation prompts; V4L2/MSMF always allow).
pub struct SystemPermission;

impl PermissionCheck for SystemPermission {
    fn camera_permitted(&self) -> bool {
        nokhwa::nokhwa_check()
    }
}

/* ------------------------------ nokhwa webcam driver ------------------------------ */

enum CameraCommand {
    Grab(Sender<Result<FrameBuffer, CameraError>>),
    Close,
}

/// Webcam driver. The nokhwa camera isn't Send, so it lives on its own "camera" thread
/// for as long as the driver is open; this struct only holds the command channel.
pub struct NokhwaDriver {
    index: u32,
    commands: Option<Sender<CameraCommand>>,
    thread: Option<JoinHandle<()>>,
    framing: Option<Rect>,
}

impl NokhwaDriver {
    pub fn new(index: u32) -> Self {
        Self { index, commands: None, thread: None, framing: None }
    }
}

impl CameraDriver for NokhwaDriver {
    fn open(&mut self, surface: Surface) -> Result<(), CameraError> {
        if self.commands.is_some() {
            return Ok(());
        }

        let (tx, rx) = unbounded::<CameraCommand>();
        let (ready_tx, ready_rx) = bounded::<Result<(u32, u32), CameraError>>(1);
        let index = self.index;

        let thread = thread::Builder::new()
            .name("camera".to_string())
            .spawn(move || {
                let mut cam = match CameraCapture::new(index, surface.width, surface.height) {
                    Ok(cam) => {
                        let _ = ready_tx.send(Ok(cam.resolution()));
                        cam
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        CameraCommand::Grab(reply) => {
                            let _ = reply.send(cam.next_frame(surface.width, surface.height));
                        }
                        CameraCommand::Close => break,
                    }
                }
                cam.shutdown();
            })
            .map_err(|e| CameraError::Runtime(format!("Spawn camera thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok((w, h))) => {
                info!("camera {index} streaming at {w}x{h}, surface {}x{}", surface.width, surface.height);
                self.commands = Some(tx);
                self.thread = Some(thread);
                self.framing = framing_rect_for(surface);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(CameraError::Runtime("camera thread exited during open".to_string()))
            }
        }
    }

    fn close(&mut self) {
        if let Some(tx) = self.commands.take() {
            let _ = tx.send(CameraCommand::Close);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("camera thread panicked");
            }
            debug!("camera {} closed", self.index);
        }
        self.framing = None;
    }

    fn is_open(&self) -> bool {
        self.commands.is_some()
    }

    fn framing_rect(&self) -> Option<Rect> {
        self.framing
    }

    fn grab_frame(&mut self) -> Result<FrameBuffer, CameraError> {
        let tx = self.commands.as_ref().ok_or(CameraError::NotOpen)?;
        let (reply_tx, reply_rx) = bounded(1);
        tx.send(CameraCommand::Grab(reply_tx))
            .map_err(|_| CameraError::Runtime("camera thread is gone".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| CameraError::Runtime("camera thread dropped the frame request".to_string()))?
    }
}

impl Drop for NokhwaDriver {
    fn drop(&mut self) {
        self.close();
    }
}

// A small wrapper around nokhwa::Camera; only ever touched on the camera thread.
struct CameraCapture {
    cam: Camera,
    width: u32,
    height: u32,
}

impl CameraCapture {
    /// Open camera `index` near the requested resolution and start streaming.
    fn new(index: u32, width: u32, height: u32) -> Result<Self, CameraError> {
        let idx = CameraIndex::Index(index);

        let fmt = CameraFormat::new(
            Resolution::new(width, height),
            FrameFormat::YUYV, // uncompressed; cheap to convert to RGB
            30,                // target FPS
        );
        let req = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(fmt));

        // Creating the device fails if nothing is plugged in or it's busy.
        let mut cam = Camera::new(idx, req)
            .map_err(|e| CameraError::Io(format!("Create camera: {e}")))?;

        cam.open_stream()
            .map_err(|e| CameraError::Runtime(format!("Open stream: {e}")))?;

        // The actual stream might choose a slightly different resolution.
        let actual = cam.resolution();

        Ok(Self { cam, width: actual.width(), height: actual.height() })
    }

    /// Grab one frame as 0x00RRGGBB pixels, resized to `target_w` x `target_h` if needed.
    fn next_frame(&mut self, target_w: u32, target_h: u32) -> Result<FrameBuffer, CameraError> {
        let frame = self
            .cam
            .frame()
            .map_err(|e| CameraError::Runtime(format!("Fetch frame: {e}")))?;

        let mut rgb_img = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::Runtime(format!("Decode RGB: {e}")))?;

        if rgb_img.dimensions() != (target_w, target_h) {
            rgb_img = imageops::resize(&rgb_img, target_w, target_h, FilterType::Triangle);
        }

        let (w, h) = rgb_img.dimensions();
        let mut out = Vec::with_capacity((w as usize) * (h as usize));
        for pixel in rgb_img.pixels() {
            let r = pixel[0] as u32;
            let g = pixel[1] as u32;
            let b = pixel[2] as u32;
            out.push((r << 16) | (g << 8) | b);
        }

        Ok(FrameBuffer { width: w as usize, height: h as usize, pixels: out })
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.cam.stop_stream() {
            warn!("Stop stream: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_rect_is_centered_and_clamped() {
        let r = framing_rect_for(Surface { width: 640, height: 480 }).unwrap();
        assert_eq!(r, Rect::new(80, 60, 560, 420));

        let big = framing_rect_for(Surface { width: 1920, height: 1080 }).unwrap();
        assert_eq!((big.width(), big.height()), (480, 360));
        assert_eq!(big.left, (1920 - 480) / 2);
    }

    #[test]
    fn framing_rect_never_exceeds_small_surfaces() {
        let r = framing_rect_for(Surface { width: 200, height: 100 }).unwrap();
        assert_eq!(r, Rect::new(0, 0, 200, 100));
        assert!(framing_rect_for(Surface { width: 0, height: 100 }).is_none());
    }
}
