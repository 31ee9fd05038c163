//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod lines;
pub mod retry;

use std::time::Duration;

/// Format byte size as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return String::from("0 B");
    }

    let base: f64 = 1024.0;
    let exponent = (bytes as f64).log(base).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);

    let value = bytes as f64 / base.powi(exponent as i32);

    format!("{value:.2} {}", UNITS[exponent])
}

/// Format a duration as `#h #m`
pub fn format_hm(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}h {}m", secs / 3600, secs % 3600 / 60)
}
