//! Tray application: command loop, recording lifecycle and upload delivery

use anyhow::Context;
use crossbeam_channel::RecvTimeoutError;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::TempPath;

use crate::clipboard::ClipboardService;
use crate::config::AppConfig;
use crate::core::control::{self, ControlCommand, ControlInterface};
use crate::notify::{DesktopNotifier, Notifier};
use crate::screencast::{FfmpegSource, SessionController, SessionOptions};
use crate::tray::{self, TrayHandle};
use crate::upload::{HttpUploader, UploadError, Uploader};

/// How often the loop looks for sessions the size monitor stopped
const TICK: Duration = Duration::from_millis(500);

/// Uploads finished artifacts and reports the result to the user
#[derive(Clone)]
pub struct Delivery {
    runtime: tokio::runtime::Handle,
    uploader: Arc<dyn Uploader>,
    notifier: Arc<dyn Notifier>,
    clipboard: Arc<ClipboardService>,
}

impl Delivery {
    pub fn new(
        runtime: tokio::runtime::Handle,
        uploader: Arc<dyn Uploader>,
        notifier: Arc<dyn Notifier>,
        clipboard: Arc<ClipboardService>,
    ) -> Self {
        Self {
            runtime,
            uploader,
            notifier,
            clipboard,
        }
    }

    /// Upload `path`, then copy the URL and notify, or notify the error
    ///
    /// Blocks the calling thread; must not be called from inside the runtime.
    pub fn deliver(&self, path: &Path) -> Result<String, UploadError> {
        match self.runtime.block_on(self.uploader.upload(path)) {
            Ok(url) => {
                self.clipboard.copy(&url);
                self.notifier.notify(&format!("Uploaded! URL copied:\n{}", url));
                Ok(url)
            }
            Err(e) => {
                self.notifier.notify(&format!("Upload failed: {}", e));
                Err(e)
            }
        }
    }
}

/// Temporary artifact file named after the capture time
pub fn artifact_path(kind: &str, extension: &str) -> std::io::Result<TempPath> {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    Ok(tempfile::Builder::new()
        .prefix(&format!("{}_{}_{}_", AppConfig::ID, kind, stamp))
        .suffix(&format!(".{}", extension))
        .tempfile()?
        .into_temp_path())
}

/// A live recording and the temp file it writes to
struct ActiveRecording {
    session: SessionController,
    artifact: TempPath,
}

struct App {
    config: AppConfig,
    source: Arc<FfmpegSource>,
    delivery: Delivery,
    notifier: Arc<dyn Notifier>,
    active: Option<ActiveRecording>,
    recording: Arc<AtomicBool>,
    tray: Option<TrayHandle>,
    workers: Vec<JoinHandle<()>>,
}

impl App {
    fn handle(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::TakeScreenshot => self.take_screenshot(),
            ControlCommand::ToggleRecording => self.toggle_recording(),
            // Handled by the loop
            ControlCommand::Quit => {}
        }
    }

    fn take_screenshot(&mut self) {
        let bytes = match self.source.capture_screenshot(None) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.notifier.notify(&format!("Screenshot failed: {}", e));
                return;
            }
        };

        let artifact = match write_screenshot(&bytes) {
            Ok(artifact) => artifact,
            Err(e) => {
                self.notifier.notify(&format!("Screenshot failed: {:#}", e));
                return;
            }
        };

        let delivery = self.delivery.clone();
        self.spawn_worker("screenshot-upload", move || {
            let _ = delivery.deliver(&artifact);
            // Dropping the TempPath deletes the file
            drop(artifact);
        });
    }

    fn toggle_recording(&mut self) {
        if self.active.is_some() {
            // A session that already ended is handled as such, not toggled
            self.check_active();
            if self.active.is_none() {
                return;
            }
        }
        match self.active.take() {
            Some(active) => self.finish_recording(active, "Recording stopped, uploading..."),
            None => self.start_recording(),
        }
    }

    fn start_recording(&mut self) {
        let artifact = match artifact_path("rec", self.config.video_container.extension()) {
            Ok(artifact) => artifact,
            Err(e) => {
                self.notifier
                    .notify(&format!("Could not create recording file: {}", e));
                return;
            }
        };

        let options = SessionOptions {
            framerate: self.config.video_framerate,
            size_limit: self.config.recording_size_limit(),
            ..Default::default()
        };
        let session = SessionController::new(self.source.clone(), artifact.to_path_buf(), options);

        match session.start() {
            Ok(()) => {
                self.active = Some(ActiveRecording { session, artifact });
                self.set_recording(true);
                self.notifier
                    .notify("Recording started, toggle again to stop and upload");
            }
            Err(e) => self
                .notifier
                .notify(&format!("Could not start recording: {}", e)),
        }
    }

    /// Stop (possibly slow) and upload on a worker thread
    fn finish_recording(&mut self, active: ActiveRecording, message: &str) {
        self.set_recording(false);
        self.notifier.notify(message);

        let delivery = self.delivery.clone();
        self.spawn_worker("recording-upload", move || {
            let path = active.session.stop();
            let _ = delivery.deliver(&path);
            drop(active.artifact);
        });
    }

    /// Pick up a session that ended without a toggle
    ///
    /// The size monitor stops a session on its own, and the encoder may die
    /// (no display, bad arguments). The first is uploaded, the second is
    /// reported and discarded.
    fn check_active(&mut self) {
        let Some(session) = self.active.as_ref().map(|active| &active.session) else {
            return;
        };

        if session.auto_stopped() {
            if let Some(active) = self.active.take() {
                self.finish_recording(active, "Recording size limit reached, uploading...");
            }
            return;
        }
        if session.is_recording() {
            return;
        }

        let failure = session.early_exit().filter(|exit| !exit.success());
        let Some(active) = self.active.take() else {
            return;
        };
        match failure {
            Some(exit) => {
                self.set_recording(false);
                // Nothing left to signal; this only reaps and records the outcome
                active.session.stop();
                self.notifier
                    .notify(&format!("Recording failed: encoder exited with {}", exit));
                drop(active.artifact);
            }
            None => self.finish_recording(active, "Recording ended, uploading..."),
        }
    }

    fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::SeqCst);
        if let Some(tray) = &self.tray {
            tray.update(move |tray| {
                tray.set_recording(recording);
            });
        }
    }

    fn spawn_worker(&mut self, name: &str, work: impl FnOnce() + Send + 'static) {
        self.workers.retain(|worker| !worker.is_finished());
        match thread::Builder::new().name(name.to_string()).spawn(work) {
            Ok(handle) => self.workers.push(handle),
            Err(e) => log::error!("Failed to spawn {} thread: {}", name, e),
        }
    }

    /// Stop any live recording and wait for pending uploads
    fn shutdown(mut self) {
        if let Some(active) = self.active.take() {
            log::info!("Stopping recording before exit");
            active.session.stop();
            match active.artifact.keep() {
                Ok(path) => self
                    .notifier
                    .notify(&format!("Recording saved to {}", path.display())),
                Err(e) => log::warn!("Could not keep recording: {}", e),
            }
        }

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Worker thread panicked");
            }
        }

        if let Some(tray) = self.tray.take() {
            tray.shutdown();
        }
    }
}

fn write_screenshot(bytes: &[u8]) -> anyhow::Result<TempPath> {
    let artifact = artifact_path("shot", "png").context("Failed to create screenshot file")?;
    std::fs::write(&artifact, bytes)
        .with_context(|| format!("Failed to write {}", artifact.display()))?;
    Ok(artifact)
}

/// Run the tray application until Quit
pub fn run(config: AppConfig) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    if runtime.block_on(control::is_instance_running()) {
        anyhow::bail!(
            "shotdrop is already running; use --screenshot or --toggle-recording to control it"
        );
    }

    let (tx, rx) = crossbeam_channel::unbounded();
    let recording = Arc::new(AtomicBool::new(false));

    let connection = match runtime.block_on(control::serve(ControlInterface::new(
        tx.clone(),
        recording.clone(),
    ))) {
        Ok(connection) => Some(connection),
        Err(e) => {
            log::warn!("D-Bus control interface unavailable: {}", e);
            None
        }
    };

    let tray = match tray::create_tray(tx) {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::warn!("Tray icon unavailable: {}", e);
            None
        }
    };

    if connection.is_none() && tray.is_none() {
        anyhow::bail!("Neither the tray icon nor the D-Bus control interface could be started");
    }

    let notifier: Arc<dyn Notifier> = Arc::new(DesktopNotifier::new(
        runtime.handle().clone(),
        config.notification_enabled,
    ));
    let uploader = HttpUploader::new(config.upload_url.clone(), config.max_file_size_bytes())
        .context("Failed to create upload client")?;
    let clipboard = ClipboardService::spawn().context("Failed to start clipboard thread")?;
    let delivery = Delivery::new(
        runtime.handle().clone(),
        Arc::new(uploader),
        notifier.clone(),
        Arc::new(clipboard),
    );

    let mut app = App {
        source: Arc::new(FfmpegSource::new(config.encoder_path.clone())),
        config,
        delivery,
        notifier,
        active: None,
        recording,
        tray,
        workers: Vec::new(),
    };

    log::info!(
        "shotdrop running; bind {} to `shotdrop --screenshot` and {} to `shotdrop --toggle-recording`",
        app.config.screenshot_hotkey,
        app.config.record_hotkey
    );
    loop {
        match rx.recv_timeout(TICK) {
            Ok(ControlCommand::Quit) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(command) => app.handle(command),
            Err(RecvTimeoutError::Timeout) => {}
        }
        app.check_active();
    }

    log::info!("shotdrop exiting");
    app.shutdown();
    drop(connection);
    Ok(())
}
