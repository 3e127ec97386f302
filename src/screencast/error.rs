use std::io;

/// Failures surfaced by the capture layer
///
/// Only session start and one-shot screenshots report errors; stopping a
/// session always succeeds and absorbs shutdown failures internally.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("ffmpeg is not installed or not on PATH. Please install ffmpeg to capture the screen.")]
    EncoderNotFound,

    #[error("screen capture is not supported on this platform")]
    UnsupportedPlatform,

    #[error("failed to launch encoder: {0}")]
    LaunchFailed(#[source] io::Error),

    #[error("screen capture failed: {0}")]
    CaptureFailed(String),

    #[error("this recording session has already finished")]
    SessionFinished,
}
