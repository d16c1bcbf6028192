// Camera barcode scanner screen.
//
// A CaptureSession coordinates the preview surface, the camera, a background decode
// worker, the idle watchdog and the Viewfinder overlay for one scanner screen. The
// collaborators sit behind traits; desktop implementations (nokhwa camera, rqrr decoder,
// rodio beep, OS URI opener) ship alongside.

pub mod action;
pub mod camera;
pub mod config;
pub mod decode;
pub mod draw;
pub mod error;
pub mod feedback;
pub mod qr;
pub mod queue;
pub mod session;
pub mod types;
pub mod viewfinder;
pub mod watchdog;

pub use action::{Action, ActionResolver, SystemOpener};
pub use camera::{CameraDriver, CameraHandle, NokhwaDriver, PermissionCheck, SystemPermission};
pub use config::{IdlePolicy, ScanConfig};
pub use decode::{
    BarcodeFormat, DecodeHints, DecodeOutcome, Decoded, FrameDecoder, ThreadedWorkerFactory,
    WorkerFactory, WorkerHandle, WorkerReporter,
};
pub use error::{CameraError, Error, Result};
pub use feedback::{BeepFeedback, Feedback};
pub use qr::QrDecoder;
pub use queue::{MessageQueue, UiMessage};
pub use session::{CaptureSession, Collaborators, Notice, NoticeKind, ScreenOutcome, SessionState};
pub use types::{FrameBuffer, Rect, ResultPoint, Surface};
pub use viewfinder::Viewfinder;
pub use watchdog::{InactivityTimer, Watchdog};
