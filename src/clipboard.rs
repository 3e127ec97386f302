//! Clipboard access for uploaded URLs
//!
//! On X11 and Wayland the clipboard contents disappear with their owner, so a
//! single `arboard::Clipboard` lives on its own thread for the lifetime of the
//! service and serves copy requests from a channel.

use crossbeam_channel::{Receiver, Sender};
use std::thread::{self, JoinHandle};

/// Owns the system clipboard on a background thread
pub struct ClipboardService {
    tx: Option<Sender<String>>,
    handle: Option<JoinHandle<()>>,
}

impl ClipboardService {
    pub fn spawn() -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("clipboard".to_string())
            .spawn(move || serve(rx))?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Queue `text` to be placed on the clipboard
    pub fn copy(&self, text: &str) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(text.to_string()).is_err() {
            log::warn!("Clipboard thread is gone, URL not copied");
        }
    }
}

impl Drop for ClipboardService {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Clipboard thread panicked");
            }
        }
    }
}

fn serve(rx: Receiver<String>) {
    let mut clipboard = match arboard::Clipboard::new() {
        Ok(clipboard) => clipboard,
        Err(e) => {
            log::warn!("Clipboard unavailable: {}", e);
            // Keep accepting requests so callers see no errors
            for _ in rx.iter() {}
            return;
        }
    };

    for text in rx.iter() {
        match clipboard.set_text(text) {
            Ok(()) => log::debug!("Copied URL to clipboard"),
            Err(e) => log::warn!("Failed to copy to clipboard: {}", e),
        }
    }
}
