//! Encoder process handle
//!
//! Wraps the external encoder so the session controller can walk through its
//! shutdown tiers without knowing about pipes or signals.

use std::fmt;
use std::io::{self, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// How often a bounded wait re-checks the child
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How an encoder process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderExit {
    /// Exit code, `None` when ended by a signal
    pub code: Option<i32>,
}

impl EncoderExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for EncoderExit {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for EncoderExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "status {}", code),
            None => write!(f, "a signal"),
        }
    }
}

/// A live encoder process owned by a recording session
pub trait EncoderProcess: Send {
    /// Ask the encoder to finalize its output and exit (ffmpeg: `q` on stdin)
    fn request_stop(&mut self) -> io::Result<()>;

    /// Ask the OS to terminate the process (SIGTERM on unix)
    fn terminate(&mut self) -> io::Result<()>;

    /// Kill the process unconditionally
    fn kill(&mut self) -> io::Result<()>;

    /// Wait up to `timeout` for the process to exit. Returns `true` once it has.
    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Block until the process exits
    fn wait(&mut self) -> io::Result<()>;

    /// Exit status if the process has already exited, without blocking
    fn try_status(&mut self) -> io::Result<Option<EncoderExit>>;
}

/// Encoder running as a child process
pub struct ChildProcess {
    child: Child,
    status: Option<EncoderExit>,
}

impl ChildProcess {
    /// Spawn `argv` with stdin piped and output discarded
    pub fn spawn(argv: &[String]) -> io::Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command line"))?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        log::debug!("Spawned encoder process {}: {:?}", child.id(), argv);
        Ok(Self {
            child,
            status: None,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    fn reaped(&mut self, status: ExitStatus) -> EncoderExit {
        log::debug!("Encoder process {} exited: {}", self.child.id(), status);
        let exit = EncoderExit::from(status);
        self.status = Some(exit);
        exit
    }
}

impl EncoderProcess for ChildProcess {
    fn request_stop(&mut self) -> io::Result<()> {
        let stdin = self
            .child
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "encoder stdin is closed"))?;
        stdin.write_all(b"q")?;
        stdin.flush()
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        log::info!("Sending SIGTERM to encoder process {}...", self.child.id());
        signal::kill(Pid::from_raw(self.child.id() as i32), Signal::SIGTERM)?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        log::info!("Terminating encoder process {}...", self.child.id());
        self.child.kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        log::warn!("Force killing encoder process {}", self.child.id());
        self.child.kill()
    }

    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_status()?.is_some() {
                return Ok(true);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            std::thread::sleep(EXIT_POLL_INTERVAL.min(deadline - now));
        }
    }

    fn wait(&mut self) -> io::Result<()> {
        if self.status.is_none() {
            let status = self.child.wait()?;
            self.reaped(status);
        }
        Ok(())
    }

    fn try_status(&mut self) -> io::Result<Option<EncoderExit>> {
        if self.status.is_some() {
            return Ok(self.status);
        }
        Ok(self.child.try_wait()?.map(|status| self.reaped(status)))
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if self.status.is_some() || matches!(self.child.try_wait(), Ok(Some(_))) {
            return;
        }
        log::warn!(
            "Encoder process {} still running on release, killing it",
            self.child.id()
        );
        if let Err(e) = self.child.kill() {
            log::error!("Failed to kill encoder process {}: {}", self.child.id(), e);
        }
        let _ = self.child.wait();
    }
}
