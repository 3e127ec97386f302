//! D-Bus control interface for single-instance support
//!
//! A running tray instance owns `DBUS_NAME`; later invocations such as
//! `shotdrop --toggle-recording` forward their command here instead of
//! starting a second instance.

use crossbeam_channel::Sender;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// D-Bus service name owned by the running instance
pub const DBUS_NAME: &str = "io.github.shotdrop";

/// D-Bus object path for the control interface
pub const CONTROL_PATH: &str = "/io/github/shotdrop";

const CONTROL_INTERFACE: &str = "io.github.shotdrop.Control";

/// Commands that can be sent to a running instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Capture the screen and upload it
    TakeScreenshot,
    /// Start a recording, or stop and upload the current one
    ToggleRecording,
    /// Stop any recording and exit
    Quit,
}

impl ControlCommand {
    /// Parse the command-line form (`--screenshot`, `--toggle-recording`, `--quit`)
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "--screenshot" => Some(Self::TakeScreenshot),
            "--toggle-recording" => Some(Self::ToggleRecording),
            "--quit" => Some(Self::Quit),
            _ => None,
        }
    }

    fn method(self) -> &'static str {
        match self {
            Self::TakeScreenshot => "TakeScreenshot",
            Self::ToggleRecording => "ToggleRecording",
            Self::Quit => "Quit",
        }
    }
}

/// D-Bus control interface
pub struct ControlInterface {
    tx: Sender<ControlCommand>,
    recording: Arc<AtomicBool>,
}

impl ControlInterface {
    pub fn new(tx: Sender<ControlCommand>, recording: Arc<AtomicBool>) -> Self {
        Self { tx, recording }
    }
}

#[zbus::interface(name = "io.github.shotdrop.Control")]
impl ControlInterface {
    /// Capture the screen and upload it
    async fn take_screenshot(&self) -> bool {
        log::info!("D-Bus: TakeScreenshot command received");
        self.tx.send(ControlCommand::TakeScreenshot).is_ok()
    }

    /// Start or stop recording
    async fn toggle_recording(&self) -> bool {
        log::info!("D-Bus: ToggleRecording command received");
        self.tx.send(ControlCommand::ToggleRecording).is_ok()
    }

    /// Quit the application
    async fn quit(&self) -> bool {
        log::info!("D-Bus: Quit command received");
        self.tx.send(ControlCommand::Quit).is_ok()
    }

    /// Check if the application is running (always returns true if reachable)
    async fn ping(&self) -> bool {
        true
    }

    /// Check if currently recording
    async fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }
}

/// Claim the bus name and serve the control interface
pub async fn serve(interface: ControlInterface) -> zbus::Result<zbus::Connection> {
    zbus::connection::Builder::session()?
        .name(DBUS_NAME)?
        .serve_at(CONTROL_PATH, interface)?
        .build()
        .await
}

/// Check if another instance is running by trying to call Ping on the D-Bus interface
pub async fn is_instance_running() -> bool {
    let Ok(connection) = zbus::Connection::session().await else {
        return false;
    };

    connection
        .call_method(
            Some(DBUS_NAME),
            CONTROL_PATH,
            Some(CONTROL_INTERFACE),
            "Ping",
            &(),
        )
        .await
        .is_ok()
}

/// Send a command to the running instance
pub async fn send_command(command: ControlCommand) -> Result<bool, zbus::Error> {
    let connection = zbus::Connection::session().await?;

    let reply: bool = connection
        .call_method(
            Some(DBUS_NAME),
            CONTROL_PATH,
            Some(CONTROL_INTERFACE),
            command.method(),
            &(),
        )
        .await?
        .body()
        .deserialize()?;

    Ok(reply)
}
