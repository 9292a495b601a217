pub mod f32;
pub mod io;
pub mod scan;
pub mod traits;
pub mod u8;

pub use self::f32::ImageF32;
pub use self::scan::{Orientation, ScanImage};
pub use self::traits::{ImageView, ImageViewMut};
pub use self::u8::ImageU8;
