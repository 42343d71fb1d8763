//! Full-screen capture using the `xcap` crate.
//!
//! This is the infrastructure layer — it talks to the OS. Everything is
//! synchronous and CPU/IO-bound, so the store calls it through
//! `spawn_blocking`.

use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use xcap::Monitor;

/// Captures the primary monitor and returns PNG-encoded bytes.
pub fn capture_primary_png() -> Result<Vec<u8>, ScreenshotError> {
    let image = capture_primary_monitor()?;
    encode_png(&image)
}

/// Captures the primary monitor's screen as a `DynamicImage`.
fn capture_primary_monitor() -> Result<DynamicImage, ScreenshotError> {
    let monitors =
        Monitor::all().map_err(|e| ScreenshotError::MonitorEnumeration(e.to_string()))?;

    let primary = monitors
        .into_iter()
        .find(|m| m.is_primary().unwrap_or(false))
        .or_else(|| {
            // Fallback: if no monitor reports as primary, use the first one
            let all = Monitor::all().ok()?;
            all.into_iter().next()
        })
        .ok_or(ScreenshotError::NoPrimaryMonitor)?;

    let image = primary
        .capture_image()
        .map_err(|e| ScreenshotError::CaptureFailed(e.to_string()))?;

    Ok(DynamicImage::ImageRgba8(image))
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ScreenshotError> {
    let mut png_bytes: Vec<u8> = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
        .map_err(|e| ScreenshotError::EncodingFailed(e.to_string()))?;
    Ok(png_bytes)
}

#[derive(Debug, thiserror::Error)]
pub enum ScreenshotError {
    #[error("Failed to enumerate monitors: {0}")]
    MonitorEnumeration(String),

    #[error("No primary monitor found")]
    NoPrimaryMonitor,

    #[error("Screen capture failed: {0}")]
    CaptureFailed(String),

    #[error("PNG encoding failed: {0}")]
    EncodingFailed(String),
}
