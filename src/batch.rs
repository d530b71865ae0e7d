//! Concurrent execution of independent single-key operations
//!
//! A batch is a set of `(key, input)` jobs. Each job runs one client call;
//! the per-key outcomes are merged into a [`BatchOutcome`] whose content
//! depends only on the `(key, outcome)` pairs, never on completion order.
//! There is no cross-key atomicity and no batch-wide timeout: a slow key is
//! bounded only by the transport's per-request timeout. Dropping the batch
//! future aborts every job still running; requests already sent may still
//! take effect on the store.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// How a batch is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStrategy {
    /// One job at a time on a single task.
    Sequential,
    /// A fixed pool of workers draining a shared queue; at most this many
    /// requests are in flight.
    Bounded(usize),
    /// One task per key with no limit on in-flight requests.
    Unbounded,
}

impl BatchStrategy {
    /// Number of workers used for a batch of `jobs` jobs.
    pub fn workers(&self, jobs: usize) -> usize {
        match self {
            BatchStrategy::Sequential => jobs.min(1),
            BatchStrategy::Bounded(limit) => jobs.min((*limit).max(1)),
            BatchStrategy::Unbounded => jobs,
        }
    }
}

impl Default for BatchStrategy {
    fn default() -> Self {
        BatchStrategy::Bounded(crate::config::DEFAULT_BATCH_CONCURRENCY)
    }
}

/// Per-key results of a batch.
///
/// Every submitted key lands in exactly one of `values`, `missing`, or
/// `errors`.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    /// Keys whose operation produced a value
    pub values: HashMap<String, T>,
    /// Keys the store reported as absent
    pub missing: HashSet<String>,
    /// Keys whose operation failed
    pub errors: HashMap<String, Error>,
}

impl<T> BatchOutcome<T> {
    /// An outcome with no keys.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            missing: HashSet::new(),
            errors: HashMap::new(),
        }
    }

    fn record(&mut self, key: String, result: Result<Option<T>>) {
        match result {
            Ok(Some(value)) => {
                self.values.insert(key, value);
            }
            Ok(None) => {
                self.missing.insert(key);
            }
            Err(err) => {
                warn!("Batch operation for key '{}' failed: {}", key, err);
                self.errors.insert(key, err);
            }
        }
    }

    /// Value for `key`, if its operation produced one.
    pub fn get(&self, key: &str) -> Option<&T> {
        self.values.get(key)
    }

    /// Number of keys that produced a value.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no key produced a value.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when no key failed.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Total number of keys accounted for.
    pub fn total(&self) -> usize {
        self.values.len() + self.missing.len() + self.errors.len()
    }

    /// The value mapping alone, dropping absent and failed keys.
    pub fn into_values(self) -> HashMap<String, T> {
        self.values
    }

    /// The value mapping, or the error of the lexicographically first
    /// failed key.
    pub fn into_result(self) -> Result<HashMap<String, T>> {
        let first_failed = self.errors.keys().min().cloned();
        match first_failed {
            Some(key) => {
                let mut errors = self.errors;
                match errors.remove(&key) {
                    Some(err) => Err(err),
                    None => Ok(self.values),
                }
            }
            None => Ok(self.values),
        }
    }
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs batches of independent jobs according to a [`BatchStrategy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchExecutor {
    strategy: BatchStrategy,
}

impl BatchExecutor {
    /// Executor using `strategy`.
    pub fn new(strategy: BatchStrategy) -> Self {
        Self { strategy }
    }

    /// The scheduling strategy.
    pub fn strategy(&self) -> BatchStrategy {
        self.strategy
    }

    /// Run `op` once per distinct key and collect the outcomes.
    ///
    /// Later duplicates of a key are dropped so each key is operated on
    /// exactly once. Each job runs on its own task; a job that panics is
    /// reported as [`Error::Internal`] for its key and does not affect the
    /// others.
    pub async fn run<I, T, F, Fut>(&self, jobs: Vec<(String, I)>, op: F) -> BatchOutcome<T>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(String, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        let jobs = dedup_jobs(jobs);
        let workers = self.strategy.workers(jobs.len());
        debug!(
            "Running batch of {} keys on {} workers ({:?})",
            jobs.len(),
            workers,
            self.strategy
        );

        let mut outcome = BatchOutcome::new();
        if jobs.is_empty() {
            return outcome;
        }

        let op = Arc::new(op);

        if self.strategy == BatchStrategy::Sequential {
            for (key, input) in jobs {
                let result = run_job(op.as_ref(), key.clone(), input).await;
                outcome.record(key, result);
            }
            return outcome;
        }

        let queue = Arc::new(Mutex::new(VecDeque::from(jobs)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut set = JoinSet::new();

        for _ in 0..workers {
            let queue = queue.clone();
            let tx = tx.clone();
            let op = op.clone();
            set.spawn(async move {
                loop {
                    let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
                    let Some((key, input)) = next else {
                        break;
                    };
                    let result = run_job(op.as_ref(), key.clone(), input).await;
                    if tx.send((key, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                warn!("Batch worker exited abnormally: {}", e);
            }
        }

        while let Some((key, result)) = rx.recv().await {
            outcome.record(key, result);
        }
        outcome
    }
}

async fn run_job<I, T, F, Fut>(op: &F, key: String, input: I) -> Result<Option<T>>
where
    T: Send + 'static,
    F: Fn(String, I) -> Fut,
    Fut: Future<Output = Result<Option<T>>> + Send + 'static,
{
    // Owned by the caller so dropping the batch aborts the job too.
    let mut task = JoinSet::new();
    task.spawn(op(key, input));
    match task.join_next().await {
        Some(Ok(result)) => result,
        Some(Err(e)) => Err(Error::Internal(format!("batch task failed: {}", e))),
        None => Err(Error::Internal("batch task was not scheduled".to_string())),
    }
}

fn dedup_jobs<I>(jobs: Vec<(String, I)>) -> Vec<(String, I)> {
    let mut seen = HashSet::with_capacity(jobs.len());
    jobs.into_iter()
        .filter(|(key, _)| seen.insert(key.clone()))
        .collect()
}
