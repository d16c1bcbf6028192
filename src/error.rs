// Error types. Every variant states *where* things went wrong.
use thiserror::Error;

/// Faults reported by a camera driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    /// The device could not be acquired (missing, busy, unreadable).
    #[error("camera I/O failure: {0}")]
    Io(String),
    /// The driver accepted the device but failed while streaming.
    #[error("camera driver fault: {0}")]
    Runtime(String),
    #[error("camera is not open")]
    NotOpen,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Window init error: {0}")]
    WindowInit(String),   // Creating the window failed
    #[error("Window update error: {0}")]
    WindowUpdate(String), // Updating the window buffer failed
    #[error("Camera permission denied")]
    PermissionDenied,
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(#[from] CameraError),
    #[error("No handler for scanned content: {0}")]
    UnresolvableResult(String),
    /// A second decode worker was requested while one is still alive.
    #[error("Decode worker already running")]
    WorkerStartConflict,
    #[error("Failed to spawn {0} thread: {1}")]
    Spawn(&'static str, String),
    #[error("Audio error: {0}")]
    Audio(String),
}

pub type Result<T> = std::result::Result<T, Error>;
