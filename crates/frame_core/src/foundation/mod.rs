//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the renderer:
//! - Math types shared with the GPU layouts
//! - Logging setup

pub mod logging;
pub mod math;
