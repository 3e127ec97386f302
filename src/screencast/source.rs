//! Capture source: where encoder processes and screenshots come from

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::RecorderError;
use super::encoder::{self, CaptureCommand, Platform};
use super::process::{ChildProcess, EncoderProcess};
use crate::domain::Region;

/// Supplies encoder processes for recording sessions
pub trait CaptureSource: Send + Sync {
    /// Find the encoder executable on this host
    fn locate_encoder(&self) -> Result<PathBuf, RecorderError>;

    /// Build the recording command line for this platform
    fn build_command(
        &self,
        encoder: &Path,
        output: &Path,
        framerate: u32,
        region: Option<Region>,
    ) -> Result<Vec<String>, RecorderError>;

    /// Launch the encoder with stdin available for a graceful stop
    fn launch(&self, argv: &[String]) -> Result<Box<dyn EncoderProcess>, RecorderError>;
}

/// ffmpeg-backed capture for the current platform
#[derive(Debug, Clone)]
pub struct FfmpegSource {
    encoder_path: Option<PathBuf>,
    display: String,
}

impl FfmpegSource {
    pub fn new(encoder_path: Option<PathBuf>) -> Self {
        Self {
            encoder_path,
            display: std::env::var("DISPLAY").unwrap_or_else(|_| ":0".to_string()),
        }
    }

    fn command(&self, framerate: u32, region: Option<Region>) -> Result<CaptureCommand, RecorderError> {
        Ok(CaptureCommand::new(Platform::current()?)
            .with_display(self.display.clone())
            .with_framerate(framerate)
            .with_region(region))
    }

    /// Grab a single frame and return it as PNG bytes
    pub fn capture_screenshot(&self, region: Option<Region>) -> Result<Vec<u8>, RecorderError> {
        let encoder = self.locate_encoder()?;
        let argv = self.command(1, region)?.screenshot(&encoder);
        log::info!("Capturing screenshot: region={:?}", region);

        let (program, args) = argv
            .split_first()
            .ok_or_else(|| RecorderError::CaptureFailed("empty command line".to_string()))?;
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(RecorderError::LaunchFailed)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecorderError::CaptureFailed(format!(
                "{} ({})",
                stderr.trim(),
                output.status
            )));
        }
        if output.stdout.is_empty() {
            return Err(RecorderError::CaptureFailed(
                "encoder produced no image".to_string(),
            ));
        }

        log::debug!("Captured {} bytes of PNG", output.stdout.len());
        Ok(output.stdout)
    }
}

impl CaptureSource for FfmpegSource {
    fn locate_encoder(&self) -> Result<PathBuf, RecorderError> {
        encoder::locate_encoder(self.encoder_path.as_deref())
    }

    fn build_command(
        &self,
        encoder: &Path,
        output: &Path,
        framerate: u32,
        region: Option<Region>,
    ) -> Result<Vec<String>, RecorderError> {
        Ok(self.command(framerate, region)?.recording(encoder, output))
    }

    fn launch(&self, argv: &[String]) -> Result<Box<dyn EncoderProcess>, RecorderError> {
        let process = ChildProcess::spawn(argv).map_err(RecorderError::LaunchFailed)?;
        log::info!("Encoder started (pid {})", process.id());
        Ok(Box::new(process))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable shell script standing in for ffmpeg
    fn fake_encoder(dir: &Path, script: &str) -> PathBuf {
        let path = dir.join("fake-ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_configured_encoder_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(dir.path(), "exit 0");
        let source = FfmpegSource::new(Some(encoder.clone()));

        assert_eq!(source.locate_encoder().unwrap(), encoder);
    }

    #[test]
    fn test_build_command_targets_output() {
        let source = FfmpegSource::new(None);
        let argv = source
            .build_command(
                Path::new("/usr/bin/ffmpeg"),
                Path::new("/tmp/rec.mp4"),
                30,
                None,
            )
            .unwrap();
        assert_eq!(argv.first().map(String::as_str), Some("/usr/bin/ffmpeg"));
        assert_eq!(argv.last().map(String::as_str), Some("/tmp/rec.mp4"));
    }

    #[test]
    fn test_screenshot_returns_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(dir.path(), "printf 'PNGDATA'");
        let source = FfmpegSource::new(Some(encoder));

        assert_eq!(source.capture_screenshot(None).unwrap(), b"PNGDATA");
    }

    #[test]
    fn test_screenshot_failure_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(dir.path(), "echo 'cannot open display' >&2; exit 1");
        let source = FfmpegSource::new(Some(encoder));

        match source.capture_screenshot(None) {
            Err(RecorderError::CaptureFailed(msg)) => assert!(msg.contains("cannot open display")),
            other => panic!("expected CaptureFailed, got {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn test_launch_runs_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = fake_encoder(dir.path(), "head -c 1 >/dev/null");
        let source = FfmpegSource::new(Some(encoder.clone()));

        let mut process = source.launch(&[encoder.display().to_string()]).unwrap();
        process.request_stop().unwrap();
        assert!(process.wait_timeout(std::time::Duration::from_secs(5)).unwrap());
    }
}
