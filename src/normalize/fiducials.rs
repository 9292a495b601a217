//! Corner fiducial search on a binarized scan.
//!
//! 1. Label 8-connected ink components (`imageproc` region labelling).
//! 2. Keep blobs whose area is compatible with the template's fiducial size,
//!    whose bounding box is roughly square and which are solid.
//! 3. For every template corner pick the blob closest (L1) to the matching
//!    image corner. Fiducials are the outermost marks of a sheet, so under
//!    rotations up to ±45° the closest blob to a corner is its fiducial.
//! 4. Reject picks that are not distinct, differ wildly in size or do not
//!    form a convex quadrilateral with the template's proportions.
use crate::error::{OmrError, Result};
use crate::template::{quad_aspect, BubbleGrid};
use crate::threshold::InkMask;
use image::{GrayImage, Luma};
use imageproc::region_labelling::{self, Connectivity};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiducialParams {
    /// Smallest share of the scan the sheet may cover (by area).
    pub min_sheet_fraction: f32,
    /// Multiplicative tolerance on the expected fiducial area.
    pub area_slack: f32,
    /// Minimum blob area over bounding-box area.
    pub min_solidity: f32,
    /// Maximum bounding-box elongation.
    pub max_aspect: f32,
    /// Allowed relative deviation of the detected quad's aspect ratio.
    pub aspect_tolerance: f32,
    /// Largest allowed area ratio between the four picked fiducials.
    pub max_size_ratio: f32,
}

impl Default for FiducialParams {
    fn default() -> Self {
        Self {
            min_sheet_fraction: 0.2,
            area_slack: 2.0,
            min_solidity: 0.55,
            max_aspect: 2.0,
            aspect_tolerance: 0.25,
            max_size_ratio: 4.0,
        }
    }
}

/// Connected ink component.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub area: usize,
    pub centroid: [f32; 2],
    /// Inclusive bounding box `[x0, y0, x1, y1]`.
    pub bbox: [usize; 4],
    pub touches_border: bool,
}

impl Blob {
    pub fn bbox_size(&self) -> (usize, usize) {
        (
            self.bbox[2] - self.bbox[0] + 1,
            self.bbox[3] - self.bbox[1] + 1,
        )
    }

    pub fn solidity(&self) -> f32 {
        let (w, h) = self.bbox_size();
        self.area as f32 / (w * h) as f32
    }

    pub fn elongation(&self) -> f32 {
        let (w, h) = self.bbox_size();
        w.max(h) as f32 / w.min(h) as f32
    }
}

/// 8-connected components of the ink pixels, in raster order of their first
/// pixel.
pub fn connected_components(mask: &InkMask) -> Vec<Blob> {
    let (w, h) = (mask.w, mask.h);
    let Some(raster) = GrayImage::from_raw(w as u32, h as u32, mask.data.clone()) else {
        return Vec::new();
    };
    let labels = region_labelling::connected_components(&raster, Connectivity::Eight, Luma([0u8]));

    let mut slot_of_label: Vec<Option<usize>> = Vec::new();
    let mut sums: Vec<(f64, f64)> = Vec::new();
    let mut blobs: Vec<Blob> = Vec::new();
    for (x, y, px) in labels.enumerate_pixels() {
        let label = px[0] as usize;
        if label == 0 {
            continue;
        }
        if label >= slot_of_label.len() {
            slot_of_label.resize(label + 1, None);
        }
        let (x, y) = (x as usize, y as usize);
        let idx = *slot_of_label[label].get_or_insert_with(|| {
            blobs.push(Blob {
                area: 0,
                centroid: [0.0, 0.0],
                bbox: [x, y, x, y],
                touches_border: false,
            });
            sums.push((0.0, 0.0));
            blobs.len() - 1
        });
        let blob = &mut blobs[idx];
        blob.area += 1;
        blob.bbox[0] = blob.bbox[0].min(x);
        blob.bbox[1] = blob.bbox[1].min(y);
        blob.bbox[2] = blob.bbox[2].max(x);
        blob.bbox[3] = blob.bbox[3].max(y);
        sums[idx].0 += x as f64;
        sums[idx].1 += y as f64;
    }
    for (blob, (sx, sy)) in blobs.iter_mut().zip(sums) {
        let n = blob.area as f64;
        blob.centroid = [(sx / n) as f32, (sy / n) as f32];
        blob.touches_border =
            blob.bbox[0] == 0 || blob.bbox[1] == 0 || blob.bbox[2] == w - 1 || blob.bbox[3] == h - 1;
    }
    blobs
}

/// Four fiducial centres in TL, TR, BR, BL order (mask pixel coordinates).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiducialDetection {
    pub corners: [[f32; 2]; 4],
    pub areas: [usize; 4],
    pub blobs_total: usize,
    pub candidates: usize,
}

/// Blobs that pass the size and shape filters, plus how many blobs the mask
/// held in total.
#[derive(Clone, Debug)]
pub struct FiducialCandidates {
    pub blobs_total: usize,
    pub candidates: Vec<Blob>,
    mask_size: (usize, usize),
}

impl FiducialCandidates {
    pub fn find(mask: &InkMask, grid: &BubbleGrid, params: &FiducialParams) -> Self {
        let image_area = (mask.w * mask.h) as f32;
        let expected = grid.fiducial_area_fraction() * image_area;
        let slack = params.area_slack.max(1.0);
        let min_area = (expected * params.min_sheet_fraction / slack).max(4.0);
        let max_area = expected * slack;

        let blobs = connected_components(mask);
        let blobs_total = blobs.len();
        let candidates: Vec<Blob> = blobs
            .into_iter()
            .filter(|b| {
                !b.touches_border
                    && (b.area as f32) >= min_area
                    && (b.area as f32) <= max_area
                    && b.solidity() >= params.min_solidity
                    && b.elongation() <= params.max_aspect
            })
            .collect();
        debug!(
            "fiducials: blobs={} candidates={} area_range=[{:.0}, {:.0}]",
            blobs_total,
            candidates.len(),
            min_area,
            max_area
        );
        Self {
            blobs_total,
            candidates,
            mask_size: (mask.w, mask.h),
        }
    }

    /// Assign one candidate to every sheet corner and check the result.
    pub fn pick_corners(
        &self,
        grid: &BubbleGrid,
        params: &FiducialParams,
    ) -> Result<FiducialDetection> {
        let candidates = &self.candidates;
        if candidates.len() < 4 {
            return Err(OmrError::Alignment(format!(
                "found {} fiducial candidates, need 4",
                candidates.len()
            )));
        }
        let image_area = (self.mask_size.0 * self.mask_size.1) as f32;
        let (w, h) = (self.mask_size.0 as f32, self.mask_size.1 as f32);
        let image_corners = [[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]];
        let mut picks = [0usize; 4];
        for (k, corner) in image_corners.iter().enumerate() {
            let l1 = |b: &Blob| (b.centroid[0] - corner[0]).abs() + (b.centroid[1] - corner[1]).abs();
            picks[k] = (0..candidates.len())
                .min_by(|&a, &b| l1(&candidates[a]).total_cmp(&l1(&candidates[b])))
                .unwrap_or(0);
        }
        for i in 0..4 {
            for j in i + 1..4 {
                if picks[i] == picks[j] {
                    return Err(OmrError::Alignment(
                        "the same mark is closest to two sheet corners".into(),
                    ));
                }
            }
        }

        let chosen = picks.map(|i| &candidates[i]);
        let areas = chosen.map(|b| b.area);
        let a_min = areas.iter().copied().fold(usize::MAX, usize::min);
        let a_max = areas.iter().copied().fold(0, usize::max);
        if a_max as f32 > a_min as f32 * params.max_size_ratio {
            return Err(OmrError::Alignment(format!(
                "corner marks differ too much in size ({a_min}..{a_max} px)"
            )));
        }

        let corners = chosen.map(|b| b.centroid);
        if !is_convex(&corners) {
            return Err(OmrError::Alignment(
                "corner marks do not form a convex quadrilateral".into(),
            ));
        }
        let canvas_area = (grid.width * grid.height) as f32;
        let canonical_share = quad_area(&grid.fiducial_centers()) / canvas_area;
        let min_quad = params.min_sheet_fraction * image_area * canonical_share;
        let area = quad_area(&corners);
        if area < min_quad {
            return Err(OmrError::Alignment(format!(
                "corner marks span {area:.0} px², expected at least {min_quad:.0}"
            )));
        }
        let expected_aspect = grid.fiducial_aspect();
        let aspect = quad_aspect(&corners);
        if (aspect / expected_aspect - 1.0).abs() > params.aspect_tolerance {
            return Err(OmrError::Alignment(format!(
                "corner marks have aspect {aspect:.2}, template expects {expected_aspect:.2}"
            )));
        }

        Ok(FiducialDetection {
            corners,
            areas,
            blobs_total: self.blobs_total,
            candidates: candidates.len(),
        })
    }
}

fn cross(o: [f32; 2], a: [f32; 2], b: [f32; 2]) -> f32 {
    (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
}

fn is_convex(q: &[[f32; 2]; 4]) -> bool {
    let signs: Vec<f32> = (0..4)
        .map(|i| cross(q[i], q[(i + 1) % 4], q[(i + 2) % 4]))
        .collect();
    signs.iter().all(|&s| s > 0.0) || signs.iter().all(|&s| s < 0.0)
}

/// Shoelace area of a simple quadrilateral.
fn quad_area(q: &[[f32; 2]; 4]) -> f32 {
    let mut acc = 0.0;
    for i in 0..4 {
        let j = (i + 1) % 4;
        acc += q[i][0] * q[j][1] - q[j][0] * q[i][1];
    }
    0.5 * acc.abs()
}
