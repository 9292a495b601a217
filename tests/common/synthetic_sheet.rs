use nalgebra::Matrix3;
use omr_scorer::image::io::encode_png_f32;
use omr_scorer::image::ImageF32;
use omr_scorer::normalize::warp_to_canvas;
use omr_scorer::template::render_sheet;
use omr_scorer::BubbleGrid;

/// How the rendered sheet lands on the simulated scanner bed.
#[derive(Clone, Copy, Debug)]
pub struct ScanPose {
    pub width: usize,
    pub height: usize,
    pub angle_deg: f32,
    pub scale: f32,
    /// Projective terms (h31, h32) of the canvas → scan mapping.
    pub perspective: [f32; 2],
}

impl Default for ScanPose {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 1250,
            angle_deg: 0.0,
            scale: 1.0,
            perspective: [0.0, 0.0],
        }
    }
}

impl ScanPose {
    pub fn rotated(angle_deg: f32) -> Self {
        Self {
            width: 1200,
            height: 1400,
            angle_deg,
            ..Default::default()
        }
    }

    /// Canvas → scan homography: scale and rotate about the canvas centre,
    /// then centre the sheet on the scanner bed.
    pub fn canvas_to_scan(&self, grid: &BubbleGrid) -> Matrix3<f32> {
        let (cx, cy) = (grid.width as f32 / 2.0, grid.height as f32 / 2.0);
        let (sx, sy) = (self.width as f32 / 2.0, self.height as f32 / 2.0);
        let (s, c) = self.angle_deg.to_radians().sin_cos();
        let k = self.scale;
        let to_origin = Matrix3::new(1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0);
        let rot_scale = Matrix3::new(k * c, -k * s, 0.0, k * s, k * c, 0.0, 0.0, 0.0, 1.0);
        let keystone = Matrix3::new(
            1.0,
            0.0,
            0.0,
            0.0,
            1.0,
            0.0,
            self.perspective[0],
            self.perspective[1],
            1.0,
        );
        let to_bed = Matrix3::new(1.0, 0.0, sx, 0.0, 1.0, sy, 0.0, 0.0, 1.0);
        to_bed * keystone * rot_scale * to_origin
    }
}

/// Render `marks` on the template and photograph it at `pose`.
pub fn scan_image(grid: &BubbleGrid, marks: &[Vec<usize>], pose: ScanPose) -> ImageF32 {
    let canvas = render_sheet(grid, marks);
    let scan_to_canvas = pose
        .canvas_to_scan(grid)
        .try_inverse()
        .expect("invertible pose");
    let mut scan = warp_to_canvas(&canvas, &scan_to_canvas, pose.width, pose.height);
    add_paper_texture(&mut scan);
    scan
}

/// PNG bytes of [`scan_image`], as an upload would deliver them.
pub fn scan_png(grid: &BubbleGrid, marks: &[Vec<usize>], pose: ScanPose) -> Vec<u8> {
    encode_png_f32(&scan_image(grid, marks, pose)).expect("encode png")
}

/// Slightly grey, noisy paper with a left-to-right illumination falloff.
fn add_paper_texture(img: &mut ImageF32) {
    let mut state = 0x2545_f491_u32;
    let w = img.w as f32;
    for y in 0..img.h {
        for x in 0..img.w {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let noise = (state % 1000) as f32 / 1000.0 * 0.04 - 0.02;
            let shade = 0.94 - 0.08 * (x as f32 / w);
            let v = img.get(x, y) * shade + noise;
            img.set(x, y, v.clamp(0.0, 1.0));
        }
    }
}

/// Uniform white image of the given size.
pub fn white_png(width: usize, height: usize) -> Vec<u8> {
    encode_png_f32(&ImageF32::filled(width, height, 1.0)).expect("encode png")
}

/// Rotate an image 90° counter-clockwise; `Orientation::Rotate90` undoes it.
pub fn rotate_ccw(img: &ImageF32) -> ImageF32 {
    let (w, h) = (img.w, img.h);
    let mut out = ImageF32::new(h, w);
    for y in 0..w {
        for x in 0..h {
            out.set(x, y, img.get(w - 1 - y, x));
        }
    }
    out
}

/// `answers[i]` is the single correct option of question `i`.
pub fn cyclic_answers(n: usize, options: usize) -> Vec<Vec<usize>> {
    (0..n).map(|i| vec![(i * 3 + 1) % options]).collect()
}
