//! Per-sample image and label processing.

mod crop_resize;
mod sample;

pub use crop_resize::*;
pub use sample::*;
