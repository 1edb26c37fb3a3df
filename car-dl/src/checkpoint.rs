//! Best snapshot selection.

use crate::{
    common::*,
    orchestrator::{EpochCallback, EpochSummary},
};
use std::marker::PhantomData;

/// Whether a lower or a higher score is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreMode {
    Min,
    Max,
}

impl ScoreMode {
    /// Returns true if `score` is strictly better than `best`.
    pub fn improves(&self, score: R64, best: R64) -> bool {
        match self {
            Self::Min => score < best,
            Self::Max => score > best,
        }
    }
}

/// The epoch metric that decides the best snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Monitor {
    ValLoss,
    ValAccuracy,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::ValLoss
    }
}

impl Monitor {
    pub fn mode(&self) -> ScoreMode {
        match self {
            Self::ValLoss => ScoreMode::Min,
            Self::ValAccuracy => ScoreMode::Max,
        }
    }

    pub fn score(&self, summary: &EpochSummary) -> R64 {
        match self {
            Self::ValLoss => summary.val_loss,
            Self::ValAccuracy => summary.val_accuracy,
        }
    }
}

/// The best snapshot seen so far.
#[derive(Debug, Clone, PartialEq)]
pub struct BestCheckpoint<H> {
    pub epoch: usize,
    pub score: R64,
    pub snapshot: H,
}

/// Keeps the snapshot of the best score.
///
/// The snapshot is replaced only on a strict improvement. Ties and
/// regressions leave it untouched.
#[derive(Debug, Clone)]
pub struct CheckpointPolicy<H> {
    mode: ScoreMode,
    best: Option<BestCheckpoint<H>>,
}

impl<H> CheckpointPolicy<H> {
    pub fn new(mode: ScoreMode) -> Self {
        Self { mode, best: None }
    }

    pub fn mode(&self) -> ScoreMode {
        self.mode
    }

    pub fn best(&self) -> Option<&BestCheckpoint<H>> {
        self.best.as_ref()
    }

    pub fn best_score(&self) -> Option<R64> {
        self.best.as_ref().map(|best| best.score)
    }

    pub fn into_best(self) -> Option<BestCheckpoint<H>> {
        self.best
    }

    pub fn is_improvement(&self, score: R64) -> bool {
        match &self.best {
            Some(best) => self.mode.improves(score, best.score),
            None => true,
        }
    }

    /// Observe the score of an epoch. If it improves on the best score,
    /// `snapshot` is called and its outcome becomes the best snapshot.
    ///
    /// Returns true if the best snapshot was replaced.
    pub fn observe<F>(&mut self, epoch: usize, score: R64, snapshot: F) -> Result<bool>
    where
        F: FnOnce() -> Result<H>,
    {
        if !self.is_improvement(score) {
            return Ok(false);
        }

        let snapshot = snapshot()?;
        self.best = Some(BestCheckpoint {
            epoch,
            score,
            snapshot,
        });
        Ok(true)
    }
}

/// Persists model snapshots.
pub trait SnapshotStore<M>
where
    M: ?Sized,
{
    /// The reference to a persisted snapshot.
    type Handle;

    fn persist(&mut self, model: &M, epoch: usize, score: R64) -> Result<Self::Handle>;
}

/// The epoch callback that persists a snapshot whenever the monitored score
/// improves.
pub struct ModelCheckpoint<M, S>
where
    M: ?Sized,
    S: SnapshotStore<M>,
{
    monitor: Monitor,
    policy: CheckpointPolicy<S::Handle>,
    store: S,
    _phantom: PhantomData<fn(&M)>,
}

impl<M, S> ModelCheckpoint<M, S>
where
    M: ?Sized,
    S: SnapshotStore<M>,
{
    pub fn new(monitor: Monitor, store: S) -> Self {
        Self {
            monitor,
            policy: CheckpointPolicy::new(monitor.mode()),
            store,
            _phantom: PhantomData,
        }
    }

    pub fn monitor(&self) -> Monitor {
        self.monitor
    }

    pub fn policy(&self) -> &CheckpointPolicy<S::Handle> {
        &self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<M, S> Debug for ModelCheckpoint<M, S>
where
    M: ?Sized,
    S: SnapshotStore<M> + Debug,
    S::Handle: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCheckpoint")
            .field("monitor", &self.monitor)
            .field("policy", &self.policy)
            .field("store", &self.store)
            .finish()
    }
}

impl<M, S> EpochCallback<M> for ModelCheckpoint<M, S>
where
    M: ?Sized,
    S: SnapshotStore<M>,
{
    fn on_epoch_end(&mut self, model: &M, summary: &EpochSummary) -> Result<()> {
        let Self {
            monitor,
            ref mut policy,
            ref mut store,
            ..
        } = *self;
        let epoch = summary.epoch;
        let score = monitor.score(summary);
        let prev = policy.best_score();

        let improved = policy.observe(epoch, score, || store.persist(model, epoch, score))?;

        match (improved, prev) {
            (true, Some(prev)) => info!(
                "epoch {}: {:?} improved from {:.5} to {:.5}, checkpoint saved",
                epoch, monitor, prev, score
            ),
            (true, None) => info!(
                "epoch {}: {:?} is {:.5}, checkpoint saved",
                epoch, monitor, score
            ),
            (false, Some(prev)) => info!(
                "epoch {}: {:?} did not improve from {:.5}",
                epoch, monitor, prev
            ),
            (false, None) => unreachable!(),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct MemoryStore {
        persisted: Vec<usize>,
    }

    impl SnapshotStore<str> for MemoryStore {
        type Handle = String;

        fn persist(&mut self, model: &str, epoch: usize, _score: R64) -> Result<Self::Handle> {
            self.persisted.push(epoch);
            Ok(format!("{}@{}", model, epoch))
        }
    }

    fn summary(epoch: usize, val_loss: f64, val_accuracy: f64) -> EpochSummary {
        EpochSummary {
            epoch,
            train_loss: r64(1.0),
            train_accuracy: r64(0.0),
            val_loss: r64(val_loss),
            val_accuracy: r64(val_accuracy),
        }
    }

    #[test]
    fn lower_is_better_stream() -> Result<()> {
        let scores = [0.8, 0.75, 0.9, 0.9, 0.6];
        let mut policy = CheckpointPolicy::new(ScoreMode::Min);

        let updates: Vec<_> = scores
            .iter()
            .enumerate()
            .map(|(epoch, &score)| -> Result<_> {
                let updated = policy.observe(epoch, r64(score), || Ok(epoch))?;
                Ok((updated, policy.best_score().unwrap().raw()))
            })
            .try_collect()?;

        assert_eq!(
            updates,
            vec![
                (true, 0.8),
                (true, 0.75),
                (false, 0.75),
                (false, 0.75),
                (true, 0.6)
            ]
        );
        assert_eq!(policy.best().unwrap().snapshot, 4);
        Ok(())
    }

    #[test]
    fn tie_does_not_overwrite() -> Result<()> {
        let mut policy = CheckpointPolicy::new(ScoreMode::Min);
        assert!(policy.observe(0, r64(0.75), || Ok("first"))?);
        assert!(!policy.observe(1, r64(0.75), || Ok("second"))?);

        let best = policy.best().unwrap();
        assert_eq!((best.epoch, best.snapshot), (0, "first"));
        Ok(())
    }

    #[test]
    fn snapshot_is_taken_only_on_improvement() -> Result<()> {
        let mut policy = CheckpointPolicy::new(ScoreMode::Max);
        let mut taken = 0;

        for (epoch, &score) in [0.1, 0.3, 0.2, 0.3, 0.5].iter().enumerate() {
            policy.observe(epoch, r64(score), || {
                taken += 1;
                Ok(epoch)
            })?;
        }

        assert_eq!(taken, 3);
        assert_eq!(policy.best_score(), Some(r64(0.5)));
        Ok(())
    }

    #[test]
    fn failed_snapshot_keeps_previous_best() {
        let mut policy = CheckpointPolicy::new(ScoreMode::Min);
        policy.observe(0, r64(1.0), || Ok(0)).unwrap();

        let result = policy.observe(1, r64(0.5), || bail!("disk full"));
        assert!(result.is_err());
        assert_eq!(policy.best().unwrap().epoch, 0);
    }

    #[test]
    fn model_checkpoint_persists_best_only() -> Result<()> {
        let mut callback: ModelCheckpoint<str, _> =
            ModelCheckpoint::new(Monitor::ValLoss, MemoryStore::default());

        for (epoch, &loss) in [0.8, 0.75, 0.9, 0.9, 0.6].iter().enumerate() {
            callback.on_epoch_end("net", &summary(epoch, loss, 0.0))?;
        }

        assert_eq!(callback.store().persisted, vec![0, 1, 4]);
        assert_eq!(callback.policy().best().unwrap().snapshot, "net@4");
        Ok(())
    }

    #[test]
    fn monitor_accuracy_prefers_higher() -> Result<()> {
        let mut callback: ModelCheckpoint<str, _> =
            ModelCheckpoint::new(Monitor::ValAccuracy, MemoryStore::default());

        for (epoch, &accuracy) in [0.2, 0.4, 0.4, 0.1].iter().enumerate() {
            callback.on_epoch_end("net", &summary(epoch, 1.0, accuracy))?;
        }

        assert_eq!(callback.store().persisted, vec![0, 1]);
        Ok(())
    }
}
