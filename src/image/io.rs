//! File and buffer helpers for scans, debug rasters and JSON reports.
//!
//! - `load_scan`: read a PNG/JPEG file into a [`ScanImage`].
//! - `encode_png_f32`: encode a unit-range raster into PNG bytes in memory.
//! - `save_grayscale_f32` / `save_grayscale_u8`: write debug PNGs.
//! - `write_json_file`: pretty-print a serializable value to disk.
use super::{ImageF32, ImageView, ScanImage};
use crate::error::{OmrError, Result};
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use serde::Serialize;
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// Read and decode a scan from disk.
pub fn load_scan(path: &Path) -> Result<ScanImage> {
    let bytes = fs::read(path)?;
    ScanImage::from_bytes(&bytes).map_err(|e| match e {
        OmrError::Input(msg) => OmrError::Input(format!("{}: {msg}", path.display())),
        other => other,
    })
}

fn to_gray_image(image: &ImageF32) -> GrayImage {
    let mut out = GrayImage::new(image.w as u32, image.h as u32);
    for y in 0..image.h {
        for (x, &px) in image.row(y).iter().enumerate() {
            let v = (px * 255.0).round().clamp(0.0, 255.0);
            out.put_pixel(x as u32, y as u32, Luma([v as u8]));
        }
    }
    out
}

/// Encode a `[0, 1]` raster as an in-memory PNG.
pub fn encode_png_f32(image: &ImageF32) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(to_gray_image(image))
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| OmrError::Io(std::io::Error::other(e.to_string())))?;
    Ok(buf.into_inner())
}

/// Save a float raster to a grayscale PNG, clamping values in [0, 255].
pub fn save_grayscale_f32(image: &ImageF32, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    to_gray_image(image).save(path).map_err(|e| {
        OmrError::Io(std::io::Error::other(format!(
            "failed to save {}: {e}",
            path.display()
        )))
    })
}

/// Save a tightly packed 8-bit buffer to a grayscale PNG.
pub fn save_grayscale_u8(width: usize, height: usize, data: &[u8], path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let image = GrayImage::from_raw(width as u32, height as u32, data.to_vec())
        .ok_or_else(|| OmrError::Input(format!("buffer does not fit {width}x{height}")))?;
    image.save(path).map_err(|e| {
        OmrError::Io(std::io::Error::other(format!(
            "failed to save {}: {e}",
            path.display()
        )))
    })
}

/// Serialize a value as pretty JSON to `path`, creating parent directories.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent_dir(path)?;
    let json = serde_json::to_string_pretty(value).map_err(|source| OmrError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json)?;
    Ok(())
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
