//! Epoch-by-epoch training orchestration.

use crate::{
    common::*,
    dataset::Partition,
    error::PipelineError,
    generator::BatchGenerator,
    model::{StepOutput, TrainableModel},
    processor::SampleLoader,
    utils::RateCounter,
};

/// The rounding of `validation_len / batch_size` into a step count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepRounding {
    /// Round down. The validation tail is left out.
    Floor,
    /// Round up. The extra step wraps around to the partition start.
    Ceil,
    /// Reject partitions not divisible by the batch size.
    Exact,
}

impl Default for StepRounding {
    fn default() -> Self {
        Self::Floor
    }
}

/// The step counts of a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingPlan {
    pub batch_size: usize,
    pub epochs: usize,
    pub steps_per_epoch: usize,
    pub validation_steps: usize,
}

impl TrainingPlan {
    /// Compute and validate step counts before any batch is requested.
    pub fn new(
        train_len: usize,
        validation_len: usize,
        batch_size: usize,
        epochs: usize,
        rounding: StepRounding,
    ) -> Result<Self> {
        let config_error = |reason: String| -> Error { PipelineError::Configuration(reason).into() };

        if batch_size == 0 {
            return Err(config_error("batch_size must be positive".into()));
        }
        if epochs == 0 {
            return Err(config_error("epochs must be positive".into()));
        }
        if batch_size > train_len {
            return Err(config_error(format!(
                "batch_size {} exceeds the training partition size {}",
                batch_size, train_len
            )));
        }
        if batch_size > validation_len {
            return Err(config_error(format!(
                "batch_size {} exceeds the validation partition size {}",
                batch_size, validation_len
            )));
        }

        let steps_per_epoch = train_len / batch_size;
        let validation_steps = match rounding {
            StepRounding::Floor => validation_len / batch_size,
            StepRounding::Ceil => (validation_len + batch_size - 1) / batch_size,
            StepRounding::Exact => {
                if validation_len % batch_size != 0 {
                    return Err(config_error(format!(
                        "validation partition size {} is not a multiple of batch_size {}",
                        validation_len, batch_size
                    )));
                }
                validation_len / batch_size
            }
        };

        Ok(Self {
            batch_size,
            epochs,
            steps_per_epoch,
            validation_steps,
        })
    }
}

/// The aggregated metrics of an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train_loss: R64,
    pub train_accuracy: R64,
    pub val_loss: R64,
    pub val_accuracy: R64,
}

/// The epoch summaries of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub epochs: Vec<EpochSummary>,
}

/// Receives the summary at the end of each epoch.
pub trait EpochCallback<M>
where
    M: ?Sized,
{
    fn on_epoch_end(&mut self, model: &M, summary: &EpochSummary) -> Result<()>;
}

/// Drives the model through a fixed number of epochs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orchestrator {
    pub batch_size: usize,
    pub epochs: usize,
    pub validation_rounding: StepRounding,
}

impl Orchestrator {
    pub fn new(batch_size: usize, epochs: usize, validation_rounding: StepRounding) -> Self {
        Self {
            batch_size,
            epochs,
            validation_rounding,
        }
    }

    pub fn plan(&self, train: &Partition, validation: &Partition) -> Result<TrainingPlan> {
        TrainingPlan::new(
            train.len(),
            validation.len(),
            self.batch_size,
            self.epochs,
            self.validation_rounding,
        )
    }

    /// Validate the run, build one generator per partition and train.
    pub fn run<M, L>(
        &self,
        model: &mut M,
        train: Partition,
        validation: Partition,
        loader: L,
        callbacks: &mut [&mut dyn EpochCallback<M>],
    ) -> Result<History>
    where
        M: TrainableModel,
        L: SampleLoader + Clone,
    {
        let plan = self.plan(&train, &validation)?;
        info!(
            "{} epochs, {} steps per epoch, {} validation steps, batch size {}",
            plan.epochs, plan.steps_per_epoch, plan.validation_steps, plan.batch_size
        );

        let mut train = BatchGenerator::new(train, plan.batch_size, loader.clone())?;
        let mut validation = BatchGenerator::new(validation, plan.batch_size, loader)?;

        fit(model, &mut train, &mut validation, &plan, callbacks)
    }
}

/// Train the model by the plan.
///
/// Each epoch pulls exactly `steps_per_epoch` training batches and
/// `validation_steps` validation batches. The generators keep their cursors
/// across epochs.
pub fn fit<M, L, V>(
    model: &mut M,
    train: &mut BatchGenerator<L>,
    validation: &mut BatchGenerator<V>,
    plan: &TrainingPlan,
    callbacks: &mut [&mut dyn EpochCallback<M>],
) -> Result<History>
where
    M: TrainableModel + ?Sized,
    L: SampleLoader,
    V: SampleLoader,
{
    ensure!(
        train.batch_size() == plan.batch_size && validation.batch_size() == plan.batch_size,
        PipelineError::configuration("generator batch sizes do not match the training plan")
    );

    let mut history = History::default();
    let mut rate_counter = RateCounter::with_second_interval();

    for epoch in 0..plan.epochs {
        // training
        let train_outputs: Vec<_> = (0..plan.steps_per_epoch)
            .map(|step| -> Result<_> {
                let batch = train.next_batch()?;
                let output = model
                    .train_step(&batch)
                    .with_context(|| format!("training failed at epoch {} step {}", epoch, step))?;

                rate_counter.add(1.0);
                match rate_counter.rate() {
                    Some(batch_rate) => info!(
                        "epoch: {}\tstep: {}/{}\tloss: {:.5}\t{:.2} batches/s\t{:.2} samples/s",
                        epoch,
                        step + 1,
                        plan.steps_per_epoch,
                        output.loss,
                        batch_rate,
                        batch_rate * plan.batch_size as f64
                    ),
                    None => info!(
                        "epoch: {}\tstep: {}/{}\tloss: {:.5}",
                        epoch,
                        step + 1,
                        plan.steps_per_epoch,
                        output.loss
                    ),
                }

                Ok(output)
            })
            .try_collect()?;

        // validation
        let validation_outputs: Vec<_> = (0..plan.validation_steps)
            .map(|step| -> Result<_> {
                let batch = validation.next_batch()?;
                model.evaluate_step(&batch).with_context(|| {
                    format!("validation failed at epoch {} step {}", epoch, step)
                })
            })
            .try_collect()?;

        let (train_loss, train_accuracy) = mean_output(&train_outputs);
        let (val_loss, val_accuracy) = mean_output(&validation_outputs);
        let summary = EpochSummary {
            epoch,
            train_loss,
            train_accuracy,
            val_loss,
            val_accuracy,
        };
        info!(
            "epoch {}/{}\tloss: {:.5}\taccuracy: {:.4}\tval_loss: {:.5}\tval_accuracy: {:.4}",
            epoch + 1,
            plan.epochs,
            train_loss,
            train_accuracy,
            val_loss,
            val_accuracy
        );

        callbacks
            .iter_mut()
            .try_for_each(|callback| callback.on_epoch_end(model, &summary))?;

        history.epochs.push(summary);
    }

    Ok(history)
}

fn mean_output(outputs: &[StepOutput]) -> (R64, R64) {
    let count = r64(outputs.len().max(1) as f64);
    let (loss, accuracy) = outputs
        .iter()
        .fold((r64(0.0), r64(0.0)), |(loss, accuracy), output| {
            (loss + output.loss, accuracy + output.accuracy)
        });
    (loss / count, accuracy / count)
}
