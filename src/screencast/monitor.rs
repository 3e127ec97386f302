//! Output size watchdog
//!
//! ffmpeg has no "stop after N bytes" option, so a background thread samples
//! the growing artifact and stops the session before it outgrows the upload
//! ceiling.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// The session as seen by its monitor
pub trait MonitoredSession: Send + Sync {
    fn is_recording(&self) -> bool;

    /// Stop the session because the size limit was reached
    fn stop_for_size_limit(&self);
}

/// Handle to a running size monitor thread
pub struct SizeMonitor {
    cancel: Option<Sender<()>>,
    handle: JoinHandle<()>,
}

impl SizeMonitor {
    /// Start watching `path`, stopping `session` once the file reaches `limit` bytes
    pub fn spawn(
        session: Weak<dyn MonitoredSession>,
        path: PathBuf,
        limit: u64,
        interval: Duration,
    ) -> io::Result<Self> {
        let (cancel, cancelled) = crossbeam_channel::bounded(1);
        let handle = thread::Builder::new()
            .name("size-monitor".to_string())
            .spawn(move || run(session, &path, limit, interval, cancelled))?;

        Ok(Self {
            cancel: Some(cancel),
            handle,
        })
    }

    /// Wake the monitor so it notices the session is no longer recording
    pub fn cancel(&mut self) {
        self.cancel.take();
    }

    /// Wait for the monitor thread to finish
    ///
    /// No-op when called from the monitor thread itself (size-triggered stop).
    pub fn join(mut self) {
        self.cancel();
        if self.handle.thread().id() == thread::current().id() {
            return;
        }
        if self.handle.join().is_err() {
            log::error!("Size monitor thread panicked");
        }
    }
}

fn run(
    session: Weak<dyn MonitoredSession>,
    path: &Path,
    limit: u64,
    interval: Duration,
    cancelled: Receiver<()>,
) {
    log::debug!(
        "Size monitor watching {} (limit {} bytes)",
        path.display(),
        limit
    );

    loop {
        match cancelled.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let Some(session) = session.upgrade() else {
            break;
        };
        if !session.is_recording() {
            break;
        }

        // Missing file (encoder still starting) or a failed stat is just a skipped sample
        let Some(size) = sample_size(path) else {
            continue;
        };

        if size >= limit {
            log::warn!(
                "Recording reached {} bytes (limit {}), stopping automatically",
                size,
                limit
            );
            session.stop_for_size_limit();
            break;
        }
    }

    log::debug!("Size monitor for {} exited", path.display());
}

fn sample_size(path: &Path) -> Option<u64> {
    match std::fs::metadata(path) {
        Ok(meta) => Some(meta.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            log::debug!("Could not read size of {}: {}", path.display(), e);
            None
        }
    }
}
