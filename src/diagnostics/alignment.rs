use nalgebra::Matrix3;
use serde::Serialize;

/// What the normalizer saw while aligning one scan. Filled progressively, so
/// a failed alignment still reports how far it got.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentStage {
    pub scan_width: usize,
    pub scan_height: usize,
    /// Pyramid level used for the fiducial search and its size.
    pub detection_level: usize,
    pub detection_size: [usize; 2],
    pub blobs: usize,
    pub candidates: usize,
    /// Fiducial centres in full-resolution scan pixels (TL, TR, BR, BL).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiducials: Option<[[f32; 2]; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homography: Option<Matrix3<f32>>,
    /// RMS distance between mapped template fiducials and detections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reprojection_error: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alignment_score: Option<f32>,
}
