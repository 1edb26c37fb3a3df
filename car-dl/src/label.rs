//! One-hot encoding of class ids.

use crate::{common::*, error::PipelineError};

/// The number of car classes in the dataset.
pub const NUM_CLASSES: usize = 196;

/// Encode a 1-indexed class id into a float vector of length `num_classes`
/// with a single 1 at index `class_id - 1`.
pub fn encode(class_id: i64, num_classes: usize) -> Result<Tensor> {
    let index = class_index(class_id, num_classes)?;
    let mut values = vec![0f32; num_classes];
    values[index] = 1.0;
    Ok(Tensor::of_slice(&values))
}

/// Convert a 1-indexed class id into a 0-indexed position.
pub fn class_index(class_id: i64, num_classes: usize) -> Result<usize, PipelineError> {
    if class_id < 1 || class_id as u64 > num_classes as u64 {
        return Err(PipelineError::OutOfRange {
            class_id,
            num_classes,
        });
    }
    Ok(class_id as usize - 1)
}

/// The one-hot encoder bound to a fixed class count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OneHotEncoder {
    num_classes: usize,
}

impl OneHotEncoder {
    pub fn new(num_classes: usize) -> Result<Self> {
        ensure!(num_classes > 0, "num_classes must be positive");
        Ok(Self { num_classes })
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn encode(&self, class_id: i64) -> Result<Tensor> {
        encode(class_id, self.num_classes)
    }
}

impl Default for OneHotEncoder {
    fn default() -> Self {
        Self {
            num_classes: NUM_CLASSES,
        }
    }
}
