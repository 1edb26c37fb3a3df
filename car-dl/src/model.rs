//! The contract of the trainable model driven by the orchestrator.

use crate::{common::*, generator::Batch};

/// The loss and accuracy of one step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    pub loss: R64,
    pub accuracy: R64,
}

/// A model that learns from batches.
///
/// Network layers, gradient computation and optimization are up to the
/// implementor.
pub trait TrainableModel {
    /// Run one optimization step on a training batch.
    fn train_step(&mut self, batch: &Batch) -> Result<StepOutput>;

    /// Evaluate a validation batch without updating the parameters.
    fn evaluate_step(&mut self, batch: &Batch) -> Result<StepOutput>;
}

impl<M> TrainableModel for &mut M
where
    M: TrainableModel + ?Sized,
{
    fn train_step(&mut self, batch: &Batch) -> Result<StepOutput> {
        (**self).train_step(batch)
    }

    fn evaluate_step(&mut self, batch: &Batch) -> Result<StepOutput> {
        (**self).evaluate_step(batch)
    }
}
