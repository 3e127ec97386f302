//! Geometric types for capture regions

use std::fmt;
use std::str::FromStr;

/// A capture rectangle in global screen coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Create a new region from origin and size
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Round width and height down to even values (minimum 2)
    ///
    /// yuv420p subsamples chroma 2x2, so libx264 refuses odd dimensions.
    pub fn even(self) -> Self {
        Self {
            width: (self.width & !1).max(2),
            height: (self.height & !1).max(2),
            ..self
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{},{}", self.width, self.height, self.x, self.y)
    }
}

/// Errors produced when parsing a region from `X,Y,W,H`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseRegionError {
    #[error("expected X,Y,WIDTH,HEIGHT but got {0:?}")]
    Format(String),
    #[error("invalid number {0:?} in region")]
    Number(String),
    #[error("region must have a non-zero width and height")]
    Empty,
}

impl FromStr for Region {
    type Err = ParseRegionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [x, y, w, h] = parts[..] else {
            return Err(ParseRegionError::Format(s.to_string()));
        };

        let int = |v: &str| {
            v.parse::<i32>()
                .map_err(|_| ParseRegionError::Number(v.to_string()))
        };
        let uint = |v: &str| {
            v.parse::<u32>()
                .map_err(|_| ParseRegionError::Number(v.to_string()))
        };

        let region = Region::new(int(x)?, int(y)?, uint(w)?, uint(h)?);
        if region.width == 0 || region.height == 0 {
            return Err(ParseRegionError::Empty);
        }
        Ok(region)
    }
}
