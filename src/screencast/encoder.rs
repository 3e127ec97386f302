//! Encoder discovery and command-line construction
//!
//! Recording and screenshots both go through ffmpeg. Each platform has its
//! own screen grabber (x11grab, avfoundation, gdigrab) with different ways of
//! restricting capture to a region.

use std::path::{Path, PathBuf};

use super::RecorderError;
use crate::domain::Region;

/// Name of the encoder binary searched on PATH
pub const ENCODER_PROGRAM: &str = "ffmpeg";

/// Desktop platform, which decides the screen grabber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    /// Platform this binary was built for
    pub fn current() -> Result<Self, RecorderError> {
        if cfg!(target_os = "linux") {
            Ok(Platform::Linux)
        } else if cfg!(target_os = "macos") {
            Ok(Platform::MacOs)
        } else if cfg!(target_os = "windows") {
            Ok(Platform::Windows)
        } else {
            Err(RecorderError::UnsupportedPlatform)
        }
    }

    /// ffmpeg input format (`-f`) used to grab the screen
    pub fn grabber(&self) -> &'static str {
        match self {
            Platform::Linux => "x11grab",
            Platform::MacOs => "avfoundation",
            Platform::Windows => "gdigrab",
        }
    }
}

/// Locate the encoder, preferring an explicitly configured binary
pub fn locate_encoder(configured: Option<&Path>) -> Result<PathBuf, RecorderError> {
    locate_program(ENCODER_PROGRAM, configured)
}

fn locate_program(program: &str, configured: Option<&Path>) -> Result<PathBuf, RecorderError> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        log::warn!(
            "Configured encoder {} does not exist, searching PATH for {}",
            path.display(),
            program
        );
    }

    which::which(program).map_err(|err| {
        log::debug!("{} lookup failed: {}", program, err);
        RecorderError::EncoderNotFound
    })
}

/// Builder for screen-grab command lines
#[derive(Debug, Clone)]
pub struct CaptureCommand {
    platform: Platform,
    display: String,
    framerate: u32,
    region: Option<Region>,
}

impl CaptureCommand {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            display: ":0".to_string(),
            framerate: 30,
            region: None,
        }
    }

    /// X11 display to grab from (Linux only)
    pub fn with_display(mut self, display: String) -> Self {
        self.display = display;
        self
    }

    pub fn with_framerate(mut self, framerate: u32) -> Self {
        self.framerate = framerate.max(1);
        self
    }

    pub fn with_region(mut self, region: Option<Region>) -> Self {
        self.region = region;
        self
    }

    /// Full command line for a video recording written to `output`
    pub fn recording(&self, encoder: &Path, output: &Path) -> Vec<String> {
        let region = self.region.map(Region::even);

        let mut args = vec![encoder.to_string_lossy().to_string(), "-y".to_string()];
        args.extend(self.input_args(region));
        args.extend(self.filter_args(region));
        args.extend([
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "ultrafast".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            output.to_string_lossy().to_string(),
        ]);
        args
    }

    /// Full command line for a single PNG frame written to stdout
    pub fn screenshot(&self, encoder: &Path) -> Vec<String> {
        let mut args = vec![
            encoder.to_string_lossy().to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
        ];
        args.extend(self.input_args(self.region));
        args.extend(self.filter_args(self.region));
        args.extend([
            "-frames:v".to_string(),
            "1".to_string(),
            "-f".to_string(),
            "image2pipe".to_string(),
            "-c:v".to_string(),
            "png".to_string(),
            "-".to_string(),
        ]);
        args
    }

    fn input_args(&self, region: Option<Region>) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            self.platform.grabber().to_string(),
            "-framerate".to_string(),
            self.framerate.to_string(),
        ];

        match (self.platform, region) {
            (Platform::Linux, Some(r)) => args.extend([
                "-video_size".to_string(),
                format!("{}x{}", r.width, r.height),
                "-i".to_string(),
                format!("{}+{},{}", self.display, r.x, r.y),
            ]),
            (Platform::Linux, None) => args.extend(["-i".to_string(), self.display.clone()]),
            // avfoundation cannot grab a sub-rectangle, it is cropped after decoding
            (Platform::MacOs, _) => args.extend(["-i".to_string(), "1:none".to_string()]),
            (Platform::Windows, Some(r)) => args.extend([
                "-offset_x".to_string(),
                r.x.to_string(),
                "-offset_y".to_string(),
                r.y.to_string(),
                "-video_size".to_string(),
                format!("{}x{}", r.width, r.height),
                "-i".to_string(),
                "desktop".to_string(),
            ]),
            (Platform::Windows, None) => args.extend(["-i".to_string(), "desktop".to_string()]),
        }

        args
    }

    fn filter_args(&self, region: Option<Region>) -> Vec<String> {
        match (self.platform, region) {
            (Platform::MacOs, Some(r)) => vec![
                "-vf".to_string(),
                format!("crop={}:{}:{}:{}", r.width, r.height, r.x, r.y),
            ],
            _ => Vec::new(),
        }
    }
}
