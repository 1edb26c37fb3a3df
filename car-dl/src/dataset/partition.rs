use super::*;
use crate::{common::*, error::PipelineError};

/// An ordered subset of the dataset samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    samples: Vec<Arc<SampleRecord>>,
}

impl Partition {
    pub fn new(samples: Vec<Arc<SampleRecord>>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Arc<SampleRecord>] {
        &self.samples
    }

    pub fn get(&self, index: usize) -> Option<&Arc<SampleRecord>> {
        self.samples.get(index)
    }
}

impl From<Vec<Arc<SampleRecord>>> for Partition {
    fn from(samples: Vec<Arc<SampleRecord>>) -> Self {
        Self::new(samples)
    }
}

/// The training and validation partitions of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partitions {
    pub train: Partition,
    pub validation: Partition,
}

/// Shuffle a copy of `samples` with a seeded generator and split it into
/// training and validation partitions.
///
/// The split point is `floor(train_fraction * samples.len())`. The caller's
/// slice is left untouched.
pub fn partition(samples: &[Arc<SampleRecord>], seed: u64, train_fraction: f64) -> Result<Partitions> {
    let (train, validation) = shuffle_split(samples, seed, train_fraction)?;
    info!(
        "partitioned {} samples into {} training and {} validation samples",
        samples.len(),
        train.len(),
        validation.len()
    );

    Ok(Partitions {
        train: train.into(),
        validation: validation.into(),
    })
}

/// Copy, shuffle with `StdRng` seeded by `seed` and split at
/// `floor(train_fraction * items.len())`.
pub fn shuffle_split<T>(items: &[T], seed: u64, train_fraction: f64) -> Result<(Vec<T>, Vec<T>)>
where
    T: Clone,
{
    if !(0.0..=1.0).contains(&train_fraction) {
        return Err(PipelineError::configuration(format!(
            "train_fraction must be in range [0, 1], but get {}",
            train_fraction
        ))
        .into());
    }

    let mut items = items.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);

    let cutoff = (items.len() as f64 * train_fraction).floor() as usize;
    let validation = items.split_off(cutoff);

    Ok((items, validation))
}
