//! Pure domain types with minimal dependencies
//!
//! Types here should have no platform or process dependencies so that
//! the recorder, CLI and tray can all share them.

pub mod geometry;

pub use geometry::*;
