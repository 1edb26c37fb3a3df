//! The cyclic batch generator.

use crate::{
    common::*,
    dataset::{Partition, SampleRecord},
    error::PipelineError,
    processor::SampleLoader,
};

/// A batch of stacked images and labels.
///
/// `images` has shape `[batch_size, height, width, 3]` and `labels` has
/// shape `[batch_size, num_classes]`. Row `i` of both comes from
/// `samples[i]`.
#[derive(Debug)]
pub struct Batch {
    pub images: Tensor,
    pub labels: Tensor,
    pub samples: Vec<Arc<SampleRecord>>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// The state of a batch generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Ready to emit the window starting at `cursor`.
    Ready { cursor: usize },
}

/// Emits full-sized batches from a partition forever.
///
/// Each step takes the window `[cursor, cursor + batch_size)`, then advances
/// the cursor by `batch_size`. The cursor restarts from zero as soon as the
/// next window would run past the partition end. The tail samples that do
/// not fill a complete window are never emitted, on every cycle.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct BatchGenerator<L>
where
    L: SampleLoader,
{
    partition: Partition,
    batch_size: usize,
    state: GeneratorState,
    #[derivative(Debug = "ignore")]
    loader: L,
}

impl<L> BatchGenerator<L>
where
    L: SampleLoader,
{
    pub fn new(partition: Partition, batch_size: usize, loader: L) -> Result<Self> {
        if batch_size == 0 {
            return Err(PipelineError::configuration("batch_size must be positive").into());
        }
        if batch_size > partition.len() {
            return Err(PipelineError::configuration(format!(
                "batch_size {} exceeds the partition size {}",
                batch_size,
                partition.len()
            ))
            .into());
        }

        Ok(Self {
            partition,
            batch_size,
            state: GeneratorState::Ready { cursor: 0 },
            loader,
        })
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        let GeneratorState::Ready { cursor } = self.state;
        cursor
    }

    /// The number of distinct windows before the cursor wraps around.
    pub fn windows_per_cycle(&self) -> usize {
        self.partition.len() / self.batch_size
    }

    /// The sample range of the next batch.
    pub fn next_window(&self) -> Range<usize> {
        let cursor = self.cursor();
        cursor..(cursor + self.batch_size)
    }

    /// Restart from the beginning of the partition.
    pub fn reset(&mut self) {
        self.state = GeneratorState::Ready { cursor: 0 };
    }

    /// Load the next window and advance the cursor.
    ///
    /// The cursor does not move if any sample in the window fails to load.
    pub fn next_batch(&mut self) -> Result<Batch> {
        let window = self.next_window();
        debug_assert!(window.end <= self.partition.len());

        let samples = self.partition.samples()[window.clone()].to_vec();
        let (images, labels): (Vec<_>, Vec<_>) = samples
            .iter()
            .map(|record| self.loader.load(record))
            .collect::<Result<Vec<_>>>()
            .with_context(|| {
                format!(
                    "failed to assemble the batch of samples {}..{}",
                    window.start, window.end
                )
            })?
            .into_iter()
            .unzip();

        let batch = Batch {
            images: Tensor::stack(&images, 0),
            labels: Tensor::stack(&labels, 0),
            samples,
        };

        self.state = self.advance(window.start);

        Ok(batch)
    }

    fn advance(&self, cursor: usize) -> GeneratorState {
        let next = cursor + self.batch_size;
        let cursor = if next + self.batch_size > self.partition.len() {
            0
        } else {
            next
        };
        GeneratorState::Ready { cursor }
    }
}
