//! One-shot CLI commands: capture or upload once, print the URL, exit

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::app::{Delivery, artifact_path};
use crate::clipboard::ClipboardService;
use crate::config::AppConfig;
use crate::core::control::{self, ControlCommand};
use crate::domain::Region;
use crate::notify::LogNotifier;
use crate::screencast::{FfmpegSource, SessionController, SessionOptions};
use crate::upload::{HttpUploader, check_file_size};

/// Global flag set by SIGINT/SIGTERM while recording
static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

const POLL: Duration = Duration::from_millis(100);

/// Runtime plus delivery for a single command
struct OneShot {
    _runtime: tokio::runtime::Runtime,
    delivery: Delivery,
}

impl OneShot {
    fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;
        let uploader = HttpUploader::new(config.upload_url.clone(), config.max_file_size_bytes())
            .context("Failed to create upload client")?;
        let clipboard = ClipboardService::spawn().context("Failed to start clipboard thread")?;
        let delivery = Delivery::new(
            runtime.handle().clone(),
            Arc::new(uploader),
            Arc::new(LogNotifier),
            Arc::new(clipboard),
        );
        Ok(Self {
            _runtime: runtime,
            delivery,
        })
    }

    /// Upload and print the URL on stdout
    fn deliver(&self, path: &Path) -> anyhow::Result<()> {
        let url = self
            .delivery
            .deliver(path)
            .with_context(|| format!("Failed to upload {}", path.display()))?;
        println!("{}", url);
        Ok(())
    }
}

/// `shotdrop upload FILE`
pub fn upload(config: &AppConfig, path: &Path) -> anyhow::Result<()> {
    OneShot::new(config)?.deliver(path)
}

/// `shotdrop screenshot [--region]`
pub fn screenshot(config: &AppConfig, region: Option<Region>) -> anyhow::Result<()> {
    let oneshot = OneShot::new(config)?;
    let source = FfmpegSource::new(config.encoder_path.clone());

    let bytes = source
        .capture_screenshot(region)
        .context("Failed to capture screenshot")?;
    let artifact = artifact_path("shot", "png").context("Failed to create screenshot file")?;
    std::fs::write(&artifact, &bytes)
        .with_context(|| format!("Failed to write {}", artifact.display()))?;

    oneshot.deliver(&artifact)
}

/// `shotdrop record [--region] [--duration] [--fps]`
///
/// Records until Ctrl-C/SIGTERM, the duration elapses or the size limit stops
/// the session, then uploads. A recording that fails to upload is kept.
pub fn record(
    config: &AppConfig,
    region: Option<Region>,
    duration: Option<Duration>,
    framerate: Option<u32>,
) -> anyhow::Result<()> {
    let oneshot = OneShot::new(config)?;
    setup_signal_handler();
    record_with(&oneshot, config, region, duration, framerate, || {
        STOP_REQUESTED.load(Ordering::Relaxed)
    })
}

fn record_with(
    oneshot: &OneShot,
    config: &AppConfig,
    region: Option<Region>,
    duration: Option<Duration>,
    framerate: Option<u32>,
    stop_requested: impl Fn() -> bool,
) -> anyhow::Result<()> {
    let artifact = artifact_path("rec", config.video_container.extension())
        .context("Failed to create recording file")?;

    let options = SessionOptions {
        framerate: framerate.unwrap_or(config.video_framerate),
        region,
        size_limit: config.recording_size_limit(),
        ..Default::default()
    };
    let source = Arc::new(FfmpegSource::new(config.encoder_path.clone()));
    let session = SessionController::new(source, artifact.to_path_buf(), options);

    session.start().context("Failed to start recording")?;
    eprintln!(
        "Recording to {} (Ctrl-C to stop)",
        session.output_path().display()
    );

    let started = Instant::now();
    while session.is_recording() && !stop_requested() {
        if duration.is_some_and(|limit| started.elapsed() >= limit) {
            log::info!("Recording duration reached");
            break;
        }
        std::thread::sleep(POLL);
    }

    if session.auto_stopped() {
        eprintln!("Size limit reached, recording stopped");
    }
    let path = session.stop();
    log::info!(
        "Recording finished after {:.1}s: {:?}",
        started.elapsed().as_secs_f64(),
        session.shutdown_outcome()
    );

    if let Some(exit) = session.early_exit().filter(|exit| !exit.success()) {
        anyhow::bail!("Recording failed: encoder exited with {}", exit);
    }

    if !check_file_size(&path, config.max_file_size_bytes()) {
        let kept = artifact.keep().context("Failed to keep recording")?;
        anyhow::bail!(
            "Recording at {} is over the {} MB upload limit",
            kept.display(),
            config.max_file_size_mb
        );
    }

    match oneshot.deliver(&path) {
        Ok(()) => Ok(()),
        Err(e) => {
            let kept = artifact.keep().context("Failed to keep recording")?;
            Err(e.context(format!("Recording kept at {}", kept.display())))
        }
    }
}

/// `shotdrop --screenshot | --toggle-recording | --quit`
pub fn forward(command: ControlCommand) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?
        .block_on(send_to_instance(command))
}

async fn send_to_instance(command: ControlCommand) -> anyhow::Result<()> {
    if !control::is_instance_running().await {
        anyhow::bail!("No running shotdrop instance (start one with `shotdrop tray`)");
    }
    let accepted = control::send_command(command)
        .await
        .context("Failed to reach the running instance")?;
    if !accepted {
        anyhow::bail!("The running instance rejected {:?}", command);
    }
    Ok(())
}

/// `shotdrop config`
pub fn write_default_config() -> anyhow::Result<()> {
    let path = AppConfig::path().context("No config directory on this system")?;
    if path.exists() {
        println!("{}", path.display());
        return Ok(());
    }

    AppConfig::default().save_to(&path)?;
    println!("{}", path.display());
    Ok(())
}

/// Set up signal handler for SIGINT/SIGTERM
#[cfg(unix)]
fn setup_signal_handler() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| unsafe {
        let handler = stop_handler as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::signal(libc::SIGTERM, handler);
        libc::signal(libc::SIGINT, handler);
    });
}

#[cfg(not(unix))]
fn setup_signal_handler() {}

#[cfg(unix)]
extern "C" fn stop_handler(_: libc::c_int) {
    STOP_REQUESTED.store(true, Ordering::Relaxed);
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    /// Config recording with `script` as the encoder and uploading nowhere
    fn config(dir: &tempfile::TempDir, script: &str) -> AppConfig {
        let encoder = dir.path().join("fake-ffmpeg");
        std::fs::write(&encoder, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&encoder, std::fs::Permissions::from_mode(0o755)).unwrap();

        AppConfig {
            // Nothing listens on the discard port
            upload_url: "http://127.0.0.1:9/api/".to_string(),
            encoder_path: Some(encoder),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_failed_upload_keeps_recording() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(
            &dir,
            "for last; do :; done; printf 'FRAMES' > \"$last\"; head -c 1 >/dev/null",
        );
        let oneshot = OneShot::new(&config).unwrap();

        let err = record_with(&oneshot, &config, None, None, None, || true).unwrap_err();
        let message = err.to_string();
        let kept = PathBuf::from(message.strip_prefix("Recording kept at ").unwrap());

        assert_eq!(std::fs::read(&kept).unwrap(), b"FRAMES");
        std::fs::remove_file(kept).unwrap();
    }

    #[test]
    fn test_dead_encoder_fails_without_upload() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, "exit 1");
        let oneshot = OneShot::new(&config).unwrap();

        let err = record_with(&oneshot, &config, None, None, None, || false).unwrap_err();
        assert_eq!(err.to_string(), "Recording failed: encoder exited with status 1");
    }

    #[test]
    fn test_duration_ends_recording() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(
            &dir,
            "for last; do :; done; printf 'FRAMES' > \"$last\"; head -c 1 >/dev/null",
        );
        let oneshot = OneShot::new(&config).unwrap();

        let started = Instant::now();
        let err = record_with(
            &oneshot,
            &config,
            None,
            Some(Duration::from_millis(300)),
            None,
            || false,
        )
        .unwrap_err();
        assert!(started.elapsed() >= Duration::from_millis(300));

        let message = err.to_string();
        let kept = PathBuf::from(message.strip_prefix("Recording kept at ").unwrap());
        std::fs::remove_file(kept).unwrap();
    }
}
