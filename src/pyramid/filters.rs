/// Separable 1D kernel applied before each 2× decimation.
///
/// Taps are listed left-to-right and assumed to sum to one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SeparableFilter {
    taps: &'static [f32],
}

impl Default for SeparableFilter {
    fn default() -> Self {
        GAUSSIAN_5TAP
    }
}

impl SeparableFilter {
    pub const fn new(taps: &'static [f32]) -> Self {
        Self { taps }
    }

    #[inline]
    pub fn taps(&self) -> &[f32] {
        self.taps
    }

    #[inline]
    pub fn radius(&self) -> usize {
        self.taps.len() / 2
    }
}

/// Normalised 5-tap Gaussian filter `[1, 4, 6, 4, 1] / 16`.
pub const GAUSSIAN_5TAP: SeparableFilter =
    SeparableFilter::new(&[0.0625, 0.25, 0.375, 0.25, 0.0625]);

/// Plain 2× decimation without smoothing.
pub const IDENTITY: SeparableFilter = SeparableFilter::new(&[1.0]);
