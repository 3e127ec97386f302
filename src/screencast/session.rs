//! Recording session lifecycle
//!
//! A [`SessionController`] owns one encoder process from launch to exit. The
//! size monitor and the user may both ask it to stop; only the first caller to
//! observe `Recording` runs the shutdown escalation, later callers wait for it
//! to finish and get the same output path.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::monitor::{MonitoredSession, SizeMonitor};
use super::process::{EncoderExit, EncoderProcess};
use super::source::CaptureSource;
use super::RecorderError;
use crate::domain::Region;

/// Upload ceiling of the sharing service
pub const SERVICE_SIZE_LIMIT: u64 = 64 * 1024 * 1024;
/// Headroom for the container trailer written after the last size sample
pub const SIZE_MARGIN: u64 = 1024 * 1024;
/// Artifact size at which a recording is stopped automatically
pub const DEFAULT_SIZE_LIMIT: u64 = SERVICE_SIZE_LIMIT - SIZE_MARGIN;

/// Shutdown tier currently in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopTier {
    /// Graceful stop requested through stdin
    SignalSent,
    /// Terminate requested from the OS
    TerminateSent,
    /// Force killed
    Killed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Stopping(StopTier),
    Stopped,
}

/// Which shutdown tier actually ended the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The encoder had already exited on its own
    AlreadyExited,
    Graceful,
    Terminated,
    Killed,
}

/// Bounded waits for each shutdown tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GracePeriods {
    pub graceful: Duration,
    pub terminate: Duration,
}

impl Default for GracePeriods {
    fn default() -> Self {
        Self {
            graceful: Duration::from_secs(10),
            terminate: Duration::from_secs(5),
        }
    }
}

/// Parameters fixed at session creation
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub framerate: u32,
    /// Capture rectangle, `None` for the full primary display
    pub region: Option<Region>,
    /// Output size that triggers an automatic stop
    pub size_limit: u64,
    pub poll_interval: Duration,
    pub grace: GracePeriods,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            framerate: 30,
            region: None,
            size_limit: DEFAULT_SIZE_LIMIT,
            poll_interval: Duration::from_millis(500),
            grace: GracePeriods::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    User,
    SizeLimit,
}

/// Controller for a single recording session
///
/// Cheap to clone; clones share the same session. A session is never reused:
/// once stopped, record again with a new controller.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Session>,
}

struct Session {
    output_path: PathBuf,
    options: SessionOptions,
    source: Arc<dyn CaptureSource>,
    record: Mutex<Record>,
    stopped: Condvar,
    auto_stopped: AtomicBool,
}

struct Record {
    state: SessionState,
    process: Option<Box<dyn EncoderProcess>>,
    monitor: Option<SizeMonitor>,
    outcome: Option<ShutdownOutcome>,
    /// Final exit status of the encoder, once reaped
    exit: Option<EncoderExit>,
    /// Set when the encoder exited before anyone asked it to stop
    exited_early: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionController {
    pub fn new(source: Arc<dyn CaptureSource>, output_path: PathBuf, options: SessionOptions) -> Self {
        Self {
            inner: Arc::new(Session {
                output_path,
                options,
                source,
                record: Mutex::new(Record {
                    state: SessionState::Idle,
                    process: None,
                    monitor: None,
                    outcome: None,
                    exit: None,
                    exited_early: false,
                }),
                stopped: Condvar::new(),
                auto_stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Launch the encoder and start watching the output size
    ///
    /// Ignored while already recording. Fails without side effects when the
    /// encoder cannot be found or launched.
    pub fn start(&self) -> Result<(), RecorderError> {
        let session = &self.inner;
        let mut record = lock(&session.record);

        match record.state {
            SessionState::Idle => {}
            SessionState::Recording | SessionState::Stopping(_) => {
                log::debug!("Recording already in progress, ignoring start");
                return Ok(());
            }
            SessionState::Stopped => return Err(RecorderError::SessionFinished),
        }

        let encoder = session.source.locate_encoder()?;
        let argv = session.source.build_command(
            &encoder,
            &session.output_path,
            session.options.framerate,
            session.options.region,
        )?;

        log::info!(
            "Starting recording: output={}, region={:?}, fps={}",
            session.output_path.display(),
            session.options.region,
            session.options.framerate
        );
        let process = session.source.launch(&argv)?;

        let weak = Arc::downgrade(&(session.clone() as Arc<dyn MonitoredSession>));
        let monitor = match SizeMonitor::spawn(
            weak,
            session.output_path.clone(),
            session.options.size_limit,
            session.options.poll_interval,
        ) {
            Ok(monitor) => monitor,
            Err(e) => {
                // Dropping the handle kills the encoder we just launched
                drop(process);
                return Err(RecorderError::LaunchFailed(e));
            }
        };

        record.process = Some(process);
        record.monitor = Some(monitor);
        record.state = SessionState::Recording;
        log::info!("Recording started successfully!");
        Ok(())
    }

    /// Stop recording and return the output path
    ///
    /// Never fails. Blocks until the encoder has exited, which takes at most
    /// the sum of the grace periods plus the time to reap a killed process.
    pub fn stop(&self) -> PathBuf {
        self.inner.stop(StopReason::User)
    }

    pub fn state(&self) -> SessionState {
        lock(&self.inner.record).state
    }

    /// Recording with an encoder that is still alive
    ///
    /// An encoder that exited on its own (no display, bad region, crash) makes
    /// this false; see [`SessionController::early_exit`].
    pub fn is_recording(&self) -> bool {
        self.inner.poll_encoder()
    }

    /// Exit status of an encoder that died before it was asked to stop
    pub fn early_exit(&self) -> Option<EncoderExit> {
        let record = lock(&self.inner.record);
        if record.exited_early { record.exit } else { None }
    }

    /// Final exit status of the encoder, once stopped
    pub fn exit_status(&self) -> Option<EncoderExit> {
        lock(&self.inner.record).exit
    }

    /// Whether the size monitor ended this session
    pub fn auto_stopped(&self) -> bool {
        self.inner.auto_stopped.load(Ordering::SeqCst)
    }

    pub fn output_path(&self) -> &Path {
        &self.inner.output_path
    }

    pub fn shutdown_outcome(&self) -> Option<ShutdownOutcome> {
        lock(&self.inner.record).outcome
    }
}

impl Session {
    /// Check the encoder under the record lock, noting an unexpected exit
    fn poll_encoder(&self) -> bool {
        let mut record = lock(&self.record);
        if record.state != SessionState::Recording {
            return false;
        }
        let status = match record.process.as_mut() {
            Some(process) => process.try_status(),
            None => return false,
        };

        match status {
            Ok(None) => true,
            Ok(Some(exit)) => {
                if !record.exited_early {
                    log::warn!("Encoder exited unexpectedly with {}", exit);
                }
                record.exit = Some(exit);
                record.exited_early = true;
                false
            }
            Err(e) => {
                log::debug!("Could not poll encoder: {}", e);
                true
            }
        }
    }

    fn stop(&self, reason: StopReason) -> PathBuf {
        let (mut process, monitor) = {
            let mut record = lock(&self.record);
            match record.state {
                SessionState::Idle | SessionState::Stopped => return self.output_path.clone(),
                SessionState::Stopping(_) => {
                    // Someone else is shutting down; wait until the artifact is final
                    while record.state != SessionState::Stopped {
                        record = self
                            .stopped
                            .wait(record)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                    return self.output_path.clone();
                }
                SessionState::Recording => {}
            }

            if reason == StopReason::SizeLimit {
                self.auto_stopped.store(true, Ordering::SeqCst);
            }
            record.state = SessionState::Stopping(StopTier::SignalSent);
            let mut monitor = record.monitor.take();
            if let Some(monitor) = monitor.as_mut() {
                monitor.cancel();
            }
            (record.process.take(), monitor)
        };

        log::info!("Stopping recording ({:?})...", reason);
        let (outcome, exit) = match process.as_deref_mut() {
            Some(process) => {
                let outcome = shut_down(process, self.options.grace, |tier| self.enter_tier(tier));
                (outcome, process.try_status().ok().flatten())
            }
            None => (ShutdownOutcome::AlreadyExited, None),
        };
        // Releases the handle; the process has exited by every path above
        drop(process);

        {
            let mut record = lock(&self.record);
            record.state = SessionState::Stopped;
            record.outcome = Some(outcome);
            if exit.is_some() {
                record.exit = exit;
            }
            // Nobody signalled it, so the encoder ended on its own
            if outcome == ShutdownOutcome::AlreadyExited {
                record.exited_early = true;
            }
        }
        self.stopped.notify_all();

        if let Some(monitor) = monitor {
            monitor.join();
        }

        log::info!(
            "Recording stopped ({:?}, encoder exit {:?}), saved to: {}",
            outcome,
            exit.map(|e| e.code),
            self.output_path.display()
        );
        self.output_path.clone()
    }

    fn enter_tier(&self, tier: StopTier) {
        let mut record = lock(&self.record);
        if matches!(record.state, SessionState::Stopping(_)) {
            record.state = SessionState::Stopping(tier);
        }
    }
}

impl MonitoredSession for Session {
    fn is_recording(&self) -> bool {
        self.poll_encoder()
    }

    fn stop_for_size_limit(&self) {
        self.stop(StopReason::SizeLimit);
    }
}

/// Walk the encoder through graceful stop, terminate and kill
///
/// Each tier gets a bounded wait; any failure moves on to the next tier. The
/// process has exited when this returns.
fn shut_down(
    process: &mut dyn EncoderProcess,
    grace: GracePeriods,
    mut enter_tier: impl FnMut(StopTier),
) -> ShutdownOutcome {
    if matches!(process.wait_timeout(Duration::ZERO), Ok(true)) {
        return ShutdownOutcome::AlreadyExited;
    }

    enter_tier(StopTier::SignalSent);
    match process.request_stop() {
        Ok(()) => match process.wait_timeout(grace.graceful) {
            Ok(true) => return ShutdownOutcome::Graceful,
            Ok(false) => log::warn!(
                "Encoder did not finish within {:?} of the stop request",
                grace.graceful
            ),
            Err(e) => log::warn!("Failed waiting for encoder to stop: {}", e),
        },
        Err(e) => log::warn!("Failed to send stop request to encoder: {}", e),
    }

    enter_tier(StopTier::TerminateSent);
    match process.terminate() {
        Ok(()) => match process.wait_timeout(grace.terminate) {
            Ok(true) => return ShutdownOutcome::Terminated,
            Ok(false) => log::warn!(
                "Encoder did not terminate within {:?}, force killing",
                grace.terminate
            ),
            Err(e) => log::warn!("Failed waiting for encoder to terminate: {}", e),
        },
        Err(e) => log::warn!("Failed to terminate encoder: {}", e),
    }

    enter_tier(StopTier::Killed);
    if let Err(e) = process.kill() {
        log::warn!("Failed to kill encoder: {}", e);
    }
    if let Err(e) = process.wait() {
        log::warn!("Failed to reap killed encoder: {}", e);
    }
    ShutdownOutcome::Killed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Instant;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        RequestStop,
        Terminate,
        Kill,
        Wait,
    }

    /// Tier at which the fake encoder gives up and exits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum ExitsOn {
        /// Dies right after launch with status 1
        Launch,
        RequestStop,
        Terminate,
        Kill,
    }

    struct FakeProcess {
        exits_on: ExitsOn,
        status: Option<EncoderExit>,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl FakeProcess {
        fn new(exits_on: ExitsOn, calls: Arc<Mutex<Vec<Call>>>) -> Self {
            let status = (exits_on == ExitsOn::Launch).then_some(EncoderExit { code: Some(1) });
            Self {
                exits_on,
                status,
                calls,
            }
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn exit_if(&mut self, tier: ExitsOn, code: Option<i32>) {
            if self.status.is_none() && self.exits_on == tier {
                self.status = Some(EncoderExit { code });
            }
        }
    }

    impl EncoderProcess for FakeProcess {
        fn request_stop(&mut self) -> io::Result<()> {
            self.record(Call::RequestStop);
            self.exit_if(ExitsOn::RequestStop, Some(0));
            Ok(())
        }

        fn terminate(&mut self) -> io::Result<()> {
            self.record(Call::Terminate);
            self.exit_if(ExitsOn::Terminate, Some(255));
            Ok(())
        }

        fn kill(&mut self) -> io::Result<()> {
            self.record(Call::Kill);
            if self.status.is_none() {
                self.status = Some(EncoderExit { code: None });
            }
            Ok(())
        }

        fn wait_timeout(&mut self, timeout: Duration) -> io::Result<bool> {
            if self.status.is_none() {
                thread::sleep(timeout);
            }
            Ok(self.status.is_some())
        }

        fn try_status(&mut self) -> io::Result<Option<EncoderExit>> {
            Ok(self.status)
        }

        fn wait(&mut self) -> io::Result<()> {
            self.record(Call::Wait);
            Ok(())
        }
    }

    struct FakeSource {
        has_encoder: bool,
        launch_fails: bool,
        exits_on: ExitsOn,
        launches: AtomicUsize,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl FakeSource {
        fn new(exits_on: ExitsOn) -> Self {
            Self {
                has_encoder: true,
                launch_fails: false,
                exits_on,
                launches: AtomicUsize::new(0),
                calls: Arc::default(),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CaptureSource for FakeSource {
        fn locate_encoder(&self) -> Result<PathBuf, RecorderError> {
            if self.has_encoder {
                Ok(PathBuf::from("/usr/bin/ffmpeg"))
            } else {
                Err(RecorderError::EncoderNotFound)
            }
        }

        fn build_command(
            &self,
            encoder: &Path,
            output: &Path,
            _framerate: u32,
            _region: Option<Region>,
        ) -> Result<Vec<String>, RecorderError> {
            Ok(vec![
                encoder.display().to_string(),
                output.display().to_string(),
            ])
        }

        fn launch(&self, _argv: &[String]) -> Result<Box<dyn EncoderProcess>, RecorderError> {
            if self.launch_fails {
                return Err(RecorderError::LaunchFailed(io::Error::from(
                    io::ErrorKind::PermissionDenied,
                )));
            }
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeProcess::new(self.exits_on, self.calls.clone())))
        }
    }

    fn quick_options() -> SessionOptions {
        SessionOptions {
            poll_interval: Duration::from_millis(10),
            grace: GracePeriods {
                graceful: Duration::from_millis(50),
                terminate: Duration::from_millis(50),
            },
            ..SessionOptions::default()
        }
    }

    fn controller(source: &Arc<FakeSource>, dir: &tempfile::TempDir) -> SessionController {
        SessionController::new(
            source.clone(),
            dir.path().join("recording.mp4"),
            quick_options(),
        )
    }

    fn wait_for_state(controller: &SessionController, state: SessionState) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if controller.state() == state {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_default_limit_is_63_mib() {
        assert_eq!(DEFAULT_SIZE_LIMIT, 63 * 1024 * 1024);
        assert_eq!(SessionOptions::default().poll_interval, Duration::from_millis(500));
        assert_eq!(GracePeriods::default().graceful, Duration::from_secs(10));
        assert_eq!(GracePeriods::default().terminate, Duration::from_secs(5));
    }

    #[test]
    fn test_start_stop_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new(ExitsOn::RequestStop));
        let session = controller(&source, &dir);

        assert_eq!(session.state(), SessionState::Idle);
        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Recording);

        let path = session.stop();
        assert_eq!(path, dir.path().join("recording.mp4"));
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!session.auto_stopped());
        assert_eq!(session.shutdown_outcome(), Some(ShutdownOutcome::Graceful));
        assert_eq!(session.exit_status(), Some(EncoderExit { code: Some(0) }));
        assert_eq!(session.early_exit(), None);
        assert_eq!(source.calls(), vec![Call::RequestStop]);
    }

    #[test]
    fn test_stop_twice_does_not_resignal() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new(ExitsOn::RequestStop));
        let session = controller(&source, &dir);
        session.start().unwrap();

        let first = session.stop();
        let second = session.stop();
        assert_eq!(first, second);
        assert_eq!(source.calls(), vec![Call::RequestStop]);
    }

    #[test]
    fn test_concurrent_stop_runs_escalation_once() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new(ExitsOn::Terminate));
        let session = controller(&source, &dir);
        session.start().unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let session = session.clone();
                thread::spawn(move || session.stop())
            })
            .collect();
        let paths: Vec<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(paths.iter().all(|p| p == session.output_path()));
        assert_eq!(source.calls(), vec![Call::RequestStop, Call::Terminate]);
        // Every caller returned only after the encoder was gone
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_stop_from_idle_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new(ExitsOn::RequestStop));
        let session = controller(&source, &dir);

        assert_eq!(session.stop(), dir.path().join("recording.mp4"));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(source.calls().is_empty());
        assert_eq!(session.shutdown_outcome(), None);
    }

    #[test]
    fn test_second_start_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new(ExitsOn::RequestStop));
        let session = controller(&source, &dir);

        session.start().unwrap();
        session.start().unwrap();
        assert_eq!(source.launches.load(Ordering::SeqCst), 1);
        assert!(lock(&session.inner.record).monitor.is_some());

        session.stop();
    }

    #[test]
    fn test_stopped_session_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new(ExitsOn::RequestStop));
        let session = controller(&source, &dir);
        session.start().unwrap();
        session.stop();

        assert!(matches!(session.start(), Err(RecorderError::SessionFinished)));
        assert_eq!(source.launches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_encoder_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource {
            has_encoder: false,
            ..FakeSource::new(ExitsOn::RequestStop)
        });
        let session = controller(&source, &dir);

        assert!(matches!(session.start(), Err(RecorderError::EncoderNotFound)));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(source.launches.load(Ordering::SeqCst), 0);

        let record = lock(&session.inner.record);
        assert!(record.process.is_none());
        assert!(record.monitor.is_none());
    }

    #[test]
    fn test_launch_failure_leaves_session_idle() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource {
            launch_fails: true,
            ..FakeSource::new(ExitsOn::RequestStop)
        });
        let session = controller(&source, &dir);

        assert!(matches!(session.start(), Err(RecorderError::LaunchFailed(_))));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(lock(&session.inner.record).monitor.is_none());
    }

    #[test]
    fn test_escalates_to_terminate_before_kill() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new(ExitsOn::Terminate));
        let session = controller(&source, &dir);
        session.start().unwrap();

        session.stop();
        assert_eq!(session.shutdown_outcome(), Some(ShutdownOutcome::Terminated));
        assert_eq!(source.calls(), vec![Call::RequestStop, Call::Terminate]);
    }

    #[test]
    fn test_kill_is_last_resort() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new(ExitsOn::Kill));
        let session = controller(&source, &dir);
        session.start().unwrap();

        let started = Instant::now();
        session.stop();

        assert_eq!(session.shutdown_outcome(), Some(ShutdownOutcome::Killed));
        assert_eq!(
            source.calls(),
            vec![Call::RequestStop, Call::Terminate, Call::Kill, Call::Wait]
        );
        // Both grace periods elapsed before the kill
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_tier_is_visible_while_stopping() {
        let mut process = FakeProcess::new(ExitsOn::Kill, Arc::default());
        let mut tiers = Vec::new();
        let outcome = shut_down(
            &mut process,
            GracePeriods {
                graceful: Duration::ZERO,
                terminate: Duration::ZERO,
            },
            |tier| tiers.push(tier),
        );

        assert_eq!(outcome, ShutdownOutcome::Killed);
        assert_eq!(
            tiers,
            vec![StopTier::SignalSent, StopTier::TerminateSent, StopTier::Killed]
        );
    }

    #[test]
    fn test_exited_encoder_is_not_signalled() {
        let calls = Arc::default();
        let mut process = FakeProcess::new(ExitsOn::Launch, Arc::clone(&calls));

        let outcome = shut_down(&mut process, GracePeriods::default(), |_| {});
        assert_eq!(outcome, ShutdownOutcome::AlreadyExited);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_size_limit_auto_stops() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new(ExitsOn::RequestStop));
        let session = controller(&source, &dir);
        session.start().unwrap();

        // Grows from nothing to 63.2 MiB between two samples
        let file = File::create(session.output_path()).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert!(session.is_recording());
        file.set_len(DEFAULT_SIZE_LIMIT + 200 * 1024).unwrap();

        assert!(wait_for_state(&session, SessionState::Stopped));
        assert!(session.auto_stopped());
        assert_eq!(source.calls(), vec![Call::RequestStop]);

        // A later user stop changes nothing
        assert_eq!(session.stop(), session.output_path());
        assert_eq!(source.calls(), vec![Call::RequestStop]);
        assert!(session.auto_stopped());
    }

    #[test]
    fn test_below_limit_is_not_auto_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new(ExitsOn::RequestStop));
        let session = controller(&source, &dir);
        session.start().unwrap();

        let file = File::create(session.output_path()).unwrap();
        file.set_len(DEFAULT_SIZE_LIMIT - 1).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert!(session.is_recording());

        session.stop();
        assert!(!session.auto_stopped());
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_user_stop_racing_size_limit_is_not_auto() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new(ExitsOn::Terminate));
        let session = SessionController::new(
            source.clone(),
            dir.path().join("recording.mp4"),
            SessionOptions {
                grace: GracePeriods {
                    graceful: Duration::from_millis(500),
                    terminate: Duration::from_millis(50),
                },
                ..quick_options()
            },
        );
        session.start().unwrap();

        let stopper = {
            let session = session.clone();
            thread::spawn(move || session.stop())
        };
        assert!(wait_for_state(
            &session,
            SessionState::Stopping(StopTier::SignalSent)
        ));

        // The monitor now only ever sees a session that is no longer recording
        File::create(session.output_path())
            .unwrap()
            .set_len(DEFAULT_SIZE_LIMIT)
            .unwrap();
        stopper.join().unwrap();

        assert!(!session.auto_stopped());
        assert_eq!(source.calls(), vec![Call::RequestStop, Call::Terminate]);
    }

    #[test]
    fn test_dead_encoder_is_not_recording() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new(ExitsOn::Launch));
        let session = controller(&source, &dir);
        session.start().unwrap();

        // State alone still says Recording; the liveness check says otherwise
        assert_eq!(session.state(), SessionState::Recording);
        assert!(!session.is_recording());
        assert_eq!(session.early_exit(), Some(EncoderExit { code: Some(1) }));

        session.stop();
        assert_eq!(session.shutdown_outcome(), Some(ShutdownOutcome::AlreadyExited));
        assert!(!session.auto_stopped());
        assert!(source.calls().is_empty());

        let exit = session.early_exit().unwrap();
        assert!(!exit.success());
        assert_eq!(format!("encoder exited with {}", exit), "encoder exited with status 1");
    }

    #[test]
    fn test_escalated_stop_is_not_an_early_exit() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new(ExitsOn::Kill));
        let session = controller(&source, &dir);
        session.start().unwrap();
        assert!(session.is_recording());

        session.stop();
        assert_eq!(session.exit_status(), Some(EncoderExit { code: None }));
        assert_eq!(session.early_exit(), None);
    }
}
