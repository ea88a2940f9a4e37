//! ffpilot - probe media and drive ffmpeg transcodes
//!
//! This library crate exposes the configuration layer for integration testing.

pub mod config;
