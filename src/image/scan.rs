//! Raw scan buffers as handed over by the file-retrieval layer.
//!
//! A [`ScanImage`] owns the decoded 8-bit grayscale pixels plus the metadata
//! the normalizer needs (resolution and orientation). Decoding accepts any
//! encoded byte buffer the `image` crate understands (PNG and JPEG are
//! compiled in).
use super::ImageU8;
use crate::error::{OmrError, Result};
use image::{imageops, GrayImage};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Clockwise rotation that turns the stored pixels into an upright sheet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Upright,
    Rotate90,
    Rotate180,
    Rotate270,
}

#[derive(Clone, Debug)]
pub struct ScanImage {
    gray: GrayImage,
    /// Scan resolution when known (dots per inch).
    pub dpi: Option<f32>,
    pub orientation: Orientation,
}

impl ScanImage {
    /// Wrap a tightly packed grayscale buffer.
    pub fn from_gray(width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(OmrError::Input(format!(
                "scan has zero extent ({width}x{height})"
            )));
        }
        let len = data.len();
        let gray = GrayImage::from_raw(width as u32, height as u32, data).ok_or_else(|| {
            OmrError::Input(format!(
                "scan buffer holds {len} bytes, expected {} for {width}x{height}",
                width * height
            ))
        })?;
        Ok(Self::from_luma(gray))
    }

    fn from_luma(gray: GrayImage) -> Self {
        Self {
            gray,
            dpi: None,
            orientation: Orientation::Upright,
        }
    }

    /// Decode an encoded image (PNG/JPEG) and convert it to grayscale.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(OmrError::Input("empty image buffer".to_string()));
        }
        let gray = image::load_from_memory(bytes)
            .map_err(|e| OmrError::Input(format!("unreadable image: {e}")))?
            .into_luma8();
        if gray.width() == 0 || gray.height() == 0 {
            return Err(OmrError::Input("decoded image is empty".to_string()));
        }
        Ok(Self::from_luma(gray))
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_dpi(mut self, dpi: f32) -> Self {
        self.dpi = Some(dpi);
        self
    }

    pub fn width(&self) -> usize {
        self.gray.width() as usize
    }

    pub fn height(&self) -> usize {
        self.gray.height() as usize
    }

    pub fn as_view(&self) -> ImageU8<'_> {
        ImageU8 {
            w: self.width(),
            h: self.height(),
            stride: self.width(),
            data: self.gray.as_raw(),
        }
    }

    /// Pixels rotated according to [`Orientation`]; borrows when upright.
    pub fn upright(&self) -> Cow<'_, ScanImage> {
        let gray = match self.orientation {
            Orientation::Upright => return Cow::Borrowed(self),
            Orientation::Rotate90 => imageops::rotate90(&self.gray),
            Orientation::Rotate180 => imageops::rotate180(&self.gray),
            Orientation::Rotate270 => imageops::rotate270(&self.gray),
        };
        Cow::Owned(ScanImage {
            gray,
            dpi: self.dpi,
            orientation: Orientation::Upright,
        })
    }
}
