//! Core application module
//!
//! This module contains:
//! - The tray application loop
//! - One-shot CLI commands
//! - D-Bus control interface for single-instance support

pub mod app;
pub mod control;
pub mod oneshot;
