//! Bounded-concurrency dispatch of regional workers.

use crate::errors::StagerError;
use crate::metrics_defs::FANOUT_DURATION;
use crate::outcome::{OperationKind, RegionOutcome};
use crate::worker::{RegionOperation, RegionWorker};
use shared::histogram;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::{Id, JoinSet};

pub const DEFAULT_CONCURRENCY: usize = 3;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One region's share of a fan-out.
pub struct Job {
    pub worker: RegionWorker,
    pub kind: OperationKind,
    pub operations: Vec<RegionOperation>,
}

/// Runs jobs with at most `concurrency` in flight.
///
/// Workers report through a completion channel whose capacity equals the
/// concurrency limit. The loop polls that channel with a short timeout so it
/// can keep dispatching, and there is no overall deadline: every dispatched
/// region is waited for.
#[derive(Clone, Debug)]
pub struct FanOut {
    concurrency: usize,
    poll_interval: Duration,
}

impl Default for FanOut {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl FanOut {
    pub fn new(concurrency: usize) -> Self {
        FanOut {
            concurrency: concurrency.max(1),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Dispatches `jobs` in order and returns one outcome per job, in
    /// completion order. `on_outcome` sees each outcome as it arrives.
    pub async fn run<F>(&self, jobs: Vec<Job>, mut on_outcome: F) -> Vec<RegionOutcome>
    where
        F: FnMut(&RegionOutcome),
    {
        let started = Instant::now();
        let total = jobs.len();
        let (tx, mut rx) = mpsc::channel(self.concurrency);

        let mut pending: VecDeque<(usize, Job)> = jobs.into_iter().enumerate().collect();
        let mut join_set = JoinSet::new();
        let mut task_jobs: HashMap<Id, (usize, String, OperationKind)> = HashMap::new();
        let mut outstanding: HashSet<usize> = HashSet::new();
        let mut outcomes = Vec::with_capacity(total);

        while !pending.is_empty() || !outstanding.is_empty() {
            if !outstanding.is_empty() {
                match tokio::time::timeout(self.poll_interval, rx.recv()).await {
                    Ok(Some((job, outcome))) => {
                        outstanding.remove(&job);
                        on_outcome(&outcome);
                        outcomes.push(outcome);
                    }
                    // The loop holds a sender, so the channel cannot close.
                    Ok(None) => {}
                    Err(_) => tracing::debug!(
                        in_progress = outstanding.len(),
                        "Not yet finished any regions in progress"
                    ),
                }

                // A worker that panicked never reports, so report for it.
                while let Some(result) = join_set.try_join_next_with_id() {
                    let (id, failure) = match result {
                        Ok((id, ())) => (id, None),
                        Err(e) => (e.id(), Some(e.to_string())),
                    };
                    let Some((job, region, kind)) = task_jobs.remove(&id) else {
                        continue;
                    };
                    if let Some(message) = failure {
                        tracing::error!(region = %region, "Task panicked: {}", message);
                        if outstanding.remove(&job) {
                            let outcome = RegionOutcome::failed(
                                region.clone(),
                                kind,
                                StagerError::TaskFailed { region, message },
                            );
                            on_outcome(&outcome);
                            outcomes.push(outcome);
                        }
                    }
                }
            }

            while outstanding.len() < self.concurrency {
                let Some((index, job)) = pending.pop_front() else {
                    break;
                };
                let region = job.worker.region().to_string();
                tracing::debug!(region = %region, kind = %job.kind, "Handing off to regional worker");

                let tx = tx.clone();
                let handle = join_set.spawn(job.worker.run(job.kind, job.operations, index, tx));
                task_jobs.insert(handle.id(), (index, region, job.kind));
                outstanding.insert(index);
            }
        }

        histogram!(FANOUT_DURATION).record(started.elapsed().as_secs_f64());
        tracing::debug!(regions = total, "Fan-out complete");
        outcomes
    }
}

/// True when every outcome succeeded. Vacuously true for no outcomes.
pub fn all_ok(outcomes: &[RegionOutcome]) -> bool {
    outcomes.iter().all(RegionOutcome::is_ok)
}
