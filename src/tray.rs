//! System tray icon using StatusNotifierItem (ksni)

use crossbeam_channel::Sender;
use ksni::{Icon, MenuItem, Tray, blocking::TrayMethods, menu::StandardItem};

use crate::core::control::ControlCommand;

const IDLE_COLOR: [u8; 3] = [70, 130, 200];
const RECORDING_COLOR: [u8; 3] = [220, 50, 50];

/// The tray icon state
pub struct ShotdropTray {
    recording: bool,
    tx: Sender<ControlCommand>,
    idle_icon: Vec<Icon>,
    recording_icon: Vec<Icon>,
}

impl ShotdropTray {
    pub fn new(tx: Sender<ControlCommand>) -> Self {
        Self {
            recording: false,
            tx,
            idle_icon: create_icon(IDLE_COLOR),
            recording_icon: create_icon(RECORDING_COLOR),
        }
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    fn send(&self, command: ControlCommand) {
        if let Err(e) = self.tx.send(command) {
            log::error!("Failed to send {:?}: {}", e.0, e);
        }
    }
}

/// Circle icon in several sizes for DPI scaling
fn create_icon(color: [u8; 3]) -> Vec<Icon> {
    [16, 22, 24, 32, 48, 64]
        .into_iter()
        .map(|size| create_circle_icon(size, color))
        .collect()
}

/// Filled circle with a slight radial gradient, ARGB32 in network byte order
fn create_circle_icon(size: i32, [r, g, b]: [u8; 3]) -> Icon {
    let mut data = Vec::with_capacity((size * size * 4) as usize);
    let center = size as f32 / 2.0;
    let radius = center - 1.0;

    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 - center + 0.5;
            let dy = y as f32 - center + 0.5;
            let dist = (dx * dx + dy * dy).sqrt();

            if dist <= radius {
                let intensity = 1.0 - (dist / radius) * 0.2;
                data.extend_from_slice(&[
                    255,
                    (r as f32 * intensity) as u8,
                    (g as f32 * intensity) as u8,
                    (b as f32 * intensity) as u8,
                ]);
            } else if dist <= radius + 1.0 {
                // Anti-aliased edge
                let alpha = ((radius + 1.0 - dist) * 255.0) as u8;
                data.extend_from_slice(&[alpha, r, g, b]);
            } else {
                data.extend_from_slice(&[0, 0, 0, 0]);
            }
        }
    }

    Icon {
        width: size,
        height: size,
        data,
    }
}

impl Tray for ShotdropTray {
    fn id(&self) -> String {
        "io.github.shotdrop".to_string()
    }

    fn title(&self) -> String {
        "Shotdrop".to_string()
    }

    fn icon_pixmap(&self) -> Vec<Icon> {
        if self.recording {
            self.recording_icon.clone()
        } else {
            self.idle_icon.clone()
        }
    }

    fn activate(&mut self, _x: i32, _y: i32) {
        log::info!("Tray icon clicked - toggling recording");
        self.send(ControlCommand::ToggleRecording);
    }

    fn tool_tip(&self) -> ksni::ToolTip {
        let description = if self.recording {
            "Recording - click to stop and upload"
        } else {
            "Click to start recording"
        };
        ksni::ToolTip {
            title: "Shotdrop".to_string(),
            description: description.to_string(),
            icon_name: String::new(),
            icon_pixmap: Vec::new(),
        }
    }

    fn menu(&self) -> Vec<MenuItem<Self>> {
        vec![
            MenuItem::Standard(StandardItem {
                label: "Take Screenshot".to_string(),
                enabled: !self.recording,
                activate: Box::new(|tray: &mut Self| {
                    log::info!("Menu: Take Screenshot clicked");
                    tray.send(ControlCommand::TakeScreenshot);
                }),
                ..Default::default()
            }),
            MenuItem::Standard(StandardItem {
                label: if self.recording {
                    "Stop Recording"
                } else {
                    "Start Recording"
                }
                .to_string(),
                activate: Box::new(|tray: &mut Self| {
                    log::info!("Menu: Toggle Recording clicked");
                    tray.send(ControlCommand::ToggleRecording);
                }),
                ..Default::default()
            }),
            MenuItem::Separator,
            MenuItem::Standard(StandardItem {
                label: "Quit".to_string(),
                activate: Box::new(|tray: &mut Self| {
                    log::info!("Menu: Quit clicked");
                    tray.send(ControlCommand::Quit);
                }),
                ..Default::default()
            }),
        ]
    }
}

/// Handle type for the tray
pub type TrayHandle = ksni::blocking::Handle<ShotdropTray>;

/// Create the tray icon and return a handle for controlling it
pub fn create_tray(tx: Sender<ControlCommand>) -> Result<TrayHandle, ksni::Error> {
    ShotdropTray::new(tx).spawn()
}
