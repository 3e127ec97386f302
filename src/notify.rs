//! Best-effort desktop notifications over org.freedesktop.Notifications

use std::collections::HashMap;
use zbus::zvariant::Value;

const NOTIFICATIONS_NAME: &str = "org.freedesktop.Notifications";
const NOTIFICATIONS_PATH: &str = "/org/freedesktop/Notifications";
const APP_NAME: &str = "shotdrop";

/// Shows user-visible status text
///
/// Implementations must not block or fail the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Sends notifications on the session bus from a background task
pub struct DesktopNotifier {
    runtime: tokio::runtime::Handle,
    enabled: bool,
}

impl DesktopNotifier {
    pub fn new(runtime: tokio::runtime::Handle, enabled: bool) -> Self {
        Self { runtime, enabled }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, message: &str) {
        log::info!("{}", message);
        if !self.enabled {
            return;
        }

        let message = message.to_string();
        self.runtime.spawn(async move {
            if let Err(e) = send_notification(&message).await {
                log::debug!("Desktop notification failed: {}", e);
            }
        });
    }
}

async fn send_notification(body: &str) -> zbus::Result<u32> {
    let connection = zbus::Connection::session().await?;
    let actions: Vec<&str> = Vec::new();
    let hints: HashMap<&str, Value<'_>> = HashMap::new();

    let reply = connection
        .call_method(
            Some(NOTIFICATIONS_NAME),
            NOTIFICATIONS_PATH,
            Some(NOTIFICATIONS_NAME),
            "Notify",
            &(
                APP_NAME,
                0u32,
                "camera-photo",
                "Shotdrop",
                body,
                actions,
                hints,
                -1i32,
            ),
        )
        .await?;

    reply.body().deserialize()
}

/// Notifier that only writes to the log, for one-shot CLI commands
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        log::info!("{}", message);
    }
}
