//! Image normalizer: scan → sheet aligned with the template canvas.
//!
//! Pipeline
//! - Apply the scan's orientation metadata and convert to `[0, 1]`.
//! - Downsample (blurred 2× pyramid) until the longer side fits
//!   `detect_max_dim`, binarize with a local-mean threshold and locate the
//!   four corner fiducials there.
//! - Scale the fiducial centres back to full resolution, estimate the
//!   canvas→scan homography and resample the full-resolution scan into the
//!   canvas.
//! - Binarize the aligned raster and verify that the fiducials sit where the
//!   template says they should.
//!
//! Failures are [`OmrError::Alignment`]: the sheet is flagged for manual
//! review and never partially scored.

pub mod fiducials;
mod warp;

pub use fiducials::{Blob, FiducialCandidates, FiducialDetection, FiducialParams};
pub use warp::warp_to_canvas;

use crate::diagnostics::AlignmentStage;
use crate::error::{OmrError, Result};
use crate::homography::{estimate_homography, reprojection_rmse};
use crate::image::{ImageF32, ScanImage};
use crate::pyramid::{Pyramid, GAUSSIAN_5TAP};
use crate::template::BubbleGrid;
use crate::threshold::{adaptive_threshold, InkMask, ThresholdParams};
use log::debug;
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerParams {
    /// Longer side of the raster used for fiducial search (0 = full size).
    pub detect_max_dim: usize,
    pub threshold: ThresholdParams,
    pub fiducials: FiducialParams,
    /// Minimum ink share inside each warped fiducial square.
    pub min_fiducial_fill: f32,
}

impl Default for NormalizerParams {
    fn default() -> Self {
        Self {
            detect_max_dim: 800,
            threshold: ThresholdParams::default(),
            fiducials: FiducialParams::default(),
            min_fiducial_fill: 0.6,
        }
    }
}

/// Scan resampled into the template canvas. Read-only once built.
#[derive(Clone, Debug)]
pub struct AlignedSheet {
    gray: ImageF32,
    ink: InkMask,
    transform: Matrix3<f32>,
    fiducials: [[f32; 2]; 4],
    reprojection_error: f32,
    alignment_score: f32,
}

impl AlignedSheet {
    /// Wrap a raster that is already in canvas coordinates (e.g. a digitally
    /// filled form) and binarize it.
    pub fn from_canvas(gray: ImageF32, threshold: &ThresholdParams) -> Self {
        let ink = adaptive_threshold(&gray, threshold);
        Self {
            gray,
            ink,
            transform: Matrix3::identity(),
            fiducials: [[0.0; 2]; 4],
            reprojection_error: 0.0,
            alignment_score: 1.0,
        }
    }

    pub fn gray(&self) -> &ImageF32 {
        &self.gray
    }

    pub fn ink(&self) -> &InkMask {
        &self.ink
    }

    /// Canvas → upright scan pixel homography.
    pub fn transform(&self) -> &Matrix3<f32> {
        &self.transform
    }

    /// Detected fiducial centres in upright scan pixels (TL, TR, BR, BL).
    pub fn fiducials(&self) -> &[[f32; 2]; 4] {
        &self.fiducials
    }

    /// RMS fiducial reprojection error in scan pixels.
    pub fn reprojection_error(&self) -> f32 {
        self.reprojection_error
    }

    /// Lowest ink share found inside the warped fiducial squares.
    pub fn alignment_score(&self) -> f32 {
        self.alignment_score
    }
}

pub struct Normalizer {
    params: NormalizerParams,
}

impl Normalizer {
    pub fn new(params: NormalizerParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &NormalizerParams {
        &self.params
    }

    pub fn normalize(&self, scan: &ScanImage, grid: &BubbleGrid) -> Result<AlignedSheet> {
        self.normalize_with_trace(scan, grid).0
    }

    /// Like [`normalize`](Self::normalize) but also reports what the
    /// fiducial search saw, including on failure.
    pub fn normalize_with_trace(
        &self,
        scan: &ScanImage,
        grid: &BubbleGrid,
    ) -> (Result<AlignedSheet>, AlignmentStage) {
        let upright = scan.upright();
        let full = upright.as_view().to_unit_f32();
        let mut stage = AlignmentStage {
            scan_width: full.w,
            scan_height: full.h,
            ..Default::default()
        };
        if full.w < 8 || full.h < 8 {
            let err = OmrError::Input(format!("scan too small ({}x{})", full.w, full.h));
            return (Err(err), stage);
        }

        let pyramid = Pyramid::build_to_max_dim(full, self.params.detect_max_dim, GAUSSIAN_5TAP);
        let level = pyramid.coarsest_index();
        let coarse = pyramid.coarsest();
        stage.detection_level = level;
        stage.detection_size = [coarse.w, coarse.h];
        debug!(
            "normalize: scan={}x{} detect_level={} ({}x{})",
            stage.scan_width, stage.scan_height, level, coarse.w, coarse.h
        );

        let coarse_mask = adaptive_threshold(coarse, &self.params.threshold);
        let search = FiducialCandidates::find(&coarse_mask, grid, &self.params.fiducials);
        stage.candidates = search.candidates.len();
        stage.blobs = search.blobs_total;
        let detection = match search.pick_corners(grid, &self.params.fiducials) {
            Ok(d) => d,
            Err(e) => return (Err(e), stage),
        };

        let scale = Pyramid::scale_to_full(level);
        let detected = detection.corners.map(|c| [c[0] * scale, c[1] * scale]);
        stage.fiducials = Some(detected);

        let canonical = grid.fiducial_centers();
        let Some(transform) = estimate_homography(&canonical, &detected) else {
            let err = OmrError::Alignment("degenerate fiducial configuration".into());
            return (Err(err), stage);
        };
        stage.homography = Some(transform);
        let Some(reprojection_error) = reprojection_rmse(&transform, &canonical, &detected) else {
            let err = OmrError::Alignment("fiducials map to infinity".into());
            return (Err(err), stage);
        };
        stage.reprojection_error = Some(reprojection_error);

        let full = &pyramid.levels[0];
        let gray = warp_to_canvas(full, &transform, grid.width, grid.height);
        let ink = adaptive_threshold(&gray, &self.params.threshold);
        let alignment_score = fiducial_fill(&ink, grid);
        stage.alignment_score = Some(alignment_score);
        if alignment_score < self.params.min_fiducial_fill {
            let err = OmrError::Alignment(format!(
                "warped fiducials are only {:.0}% inked",
                alignment_score * 100.0
            ));
            return (Err(err), stage);
        }

        let sheet = AlignedSheet {
            gray,
            ink,
            transform,
            fiducials: detected,
            reprojection_error,
            alignment_score,
        };
        (Ok(sheet), stage)
    }
}

/// Minimum over the four fiducials of the ink share in the central 60% of
/// each canonical square.
fn fiducial_fill(ink: &InkMask, grid: &BubbleGrid) -> f32 {
    grid.fiducials
        .iter()
        .map(|f| {
            let half = 0.3 * f.size;
            let x0 = (f.center[0] - half).max(0.0).round() as usize;
            let y0 = (f.center[1] - half).max(0.0).round() as usize;
            let x1 = ((f.center[0] + half).round() as usize).min(ink.w);
            let y1 = ((f.center[1] + half).round() as usize).min(ink.h);
            let mut total = 0usize;
            let mut inked = 0usize;
            for y in y0..y1 {
                for x in x0..x1 {
                    total += 1;
                    inked += usize::from(ink.is_ink(x, y));
                }
            }
            if total == 0 {
                0.0
            } else {
                inked as f32 / total as f32
            }
        })
        .fold(f32::INFINITY, f32::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{render_sheet, GridLayout};

    fn to_scan(img: &ImageF32) -> ScanImage {
        let data = img
            .data
            .iter()
            .map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8)
            .collect();
        ScanImage::from_gray(img.w, img.h, data).unwrap()
    }

    #[test]
    fn canvas_sized_scan_aligns_to_identity() {
        let grid = GridLayout::default().to_grid().unwrap();
        let scan = to_scan(&render_sheet(&grid, &[vec![0]]));
        let normalizer = Normalizer::new(NormalizerParams::default());
        let (sheet, stage) = normalizer.normalize_with_trace(&scan, &grid);
        let sheet = sheet.unwrap();
        assert_eq!((sheet.gray().w, sheet.gray().h), (grid.width, grid.height));
        assert!(sheet.reprojection_error() < 0.5);
        assert!(sheet.alignment_score() > 0.9);
        let h = sheet.transform();
        assert!((h[(0, 0)] - 1.0).abs() < 0.02);
        assert!(h[(0, 2)].abs() < 2.0 && h[(1, 2)].abs() < 2.0);
        assert_eq!(stage.detection_level, 1);
        assert!(stage.candidates >= 4);
    }

    #[test]
    fn blank_page_is_an_alignment_failure() {
        let grid = GridLayout::default().to_grid().unwrap();
        let scan = ScanImage::from_gray(400, 500, vec![240; 400 * 500]).unwrap();
        let (result, stage) = Normalizer::new(NormalizerParams::default())
            .normalize_with_trace(&scan, &grid);
        assert!(matches!(result, Err(OmrError::Alignment(_))));
        assert_eq!(stage.scan_width, 400);
        assert!(stage.fiducials.is_none());
    }

    #[test]
    fn failed_search_still_reports_blob_counts() {
        let grid = GridLayout::default().to_grid().unwrap();
        let mut page = render_sheet(&grid, &[]);
        for f in &grid.fiducials[2..] {
            let half = 0.5 * f.size + 3.0;
            let x0 = (f.center[0] - half).max(0.0) as usize;
            let y0 = (f.center[1] - half).max(0.0) as usize;
            let x1 = ((f.center[0] + half) as usize).min(page.w);
            let y1 = ((f.center[1] + half) as usize).min(page.h);
            for y in y0..y1 {
                for x in x0..x1 {
                    page.data[y * page.w + x] = 1.0;
                }
            }
        }
        let (result, stage) = Normalizer::new(NormalizerParams::default())
            .normalize_with_trace(&to_scan(&page), &grid);
        assert!(matches!(result, Err(OmrError::Alignment(_))));
        assert!(stage.candidates >= 2, "candidates={}", stage.candidates);
        assert!(stage.blobs > stage.candidates);
    }

    #[test]
    fn tiny_scan_is_rejected() {
        let grid = GridLayout::default().to_grid().unwrap();
        let scan = ScanImage::from_gray(4, 4, vec![0; 16]).unwrap();
        let result = Normalizer::new(NormalizerParams::default()).normalize(&scan, &grid);
        assert!(matches!(result, Err(OmrError::Input(_))));
    }
}
