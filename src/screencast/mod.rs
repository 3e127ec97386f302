//! Screen recording functionality
//!
//! Recording runs in an external ffmpeg process. A [`SessionController`]
//! launches it, a size monitor stops it before the artifact outgrows the
//! upload ceiling, and shutdown escalates from a graceful stop request to
//! terminate and finally kill.

mod error;
mod encoder;
mod monitor;
mod process;
mod session;
mod source;

pub use error::RecorderError;
pub use session::{SessionController, SessionOptions};
pub use source::FfmpegSource;
