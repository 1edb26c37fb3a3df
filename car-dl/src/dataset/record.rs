use crate::common::*;

/// Rectangular region in source image pixels.
///
/// The region spans `[min_x, max_x)` horizontally and `[min_y, max_y)`
/// vertically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropBox {
    pub min_x: i64,
    pub min_y: i64,
    pub max_x: i64,
    pub max_y: i64,
}

impl CropBox {
    pub fn new(min_x: i64, min_y: i64, max_x: i64, max_y: i64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> i64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> i64 {
        self.max_y - self.min_y
    }

    /// Returns true if the box covers no pixel.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Returns true if the box lies inside an image of given size.
    pub fn fits_within(&self, width: i64, height: i64) -> bool {
        self.min_x >= 0 && self.min_y >= 0 && self.max_x <= width && self.max_y <= height
    }

    pub fn to_array(&self) -> [i64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

/// One labeled sample parsed from a metadata row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleRecord {
    pub crop_box: CropBox,
    /// The 1-indexed class id.
    pub class_id: i64,
    /// The image file name relative to the image directory.
    pub image_ref: String,
}
