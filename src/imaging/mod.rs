//! Upload preparation: orientation, resize and crop.

pub mod crop;
pub mod normalize;

pub use crop::{crop_region, CropRect};
pub use normalize::load_normalized;
