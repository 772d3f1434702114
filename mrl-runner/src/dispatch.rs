//! A local stand-in for a task queue: follows every shard chain a master
//! task fans out to, a bounded number of invocations at a time.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use common::{Master, Operation, TaskName, TaskResponse};

/// Counters for one phase of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseSummary {
    pub invocations: usize,
    pub retries: usize,
    pub processed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct JobSummary {
    pub phases: Vec<(TaskName, PhaseSummary)>,
    /// Time spent per operation, summed over every invocation.
    pub totals: Vec<(Operation, Duration)>,
}

impl JobSummary {
    pub fn phase(&self, task: TaskName) -> Option<&PhaseSummary> {
        self.phases.iter().find(|(t, _)| *t == task).map(|(_, s)| s)
    }
}

#[derive(Default)]
struct Counters {
    invocations: AtomicUsize,
    retries: AtomicUsize,
    processed: AtomicUsize,
}

pub struct LocalDispatcher {
    master: Arc<Master>,
    permits: Arc<Semaphore>,
    retries: u32,
    totals: Arc<DashMap<Operation, Duration>>,
}

impl LocalDispatcher {
    pub fn new(master: Arc<Master>, workers: usize, retries: u32) -> Self {
        Self {
            master,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            retries,
            totals: Arc::new(DashMap::new()),
        }
    }

    /// Runs every phase in order. A phase starts once the previous one has
    /// drained all of its shards.
    pub async fn run_job(&self, phases: &[TaskName]) -> Result<JobSummary> {
        let mut summary = JobSummary::default();
        for &phase in phases {
            let counters = self.run_phase(phase).await?;
            info!(
                job = self.master.jobname(),
                phase = %phase,
                invocations = counters.invocations,
                retries = counters.retries,
                processed = counters.processed,
                "phase complete"
            );
            summary.phases.push((phase, counters));
        }
        summary.totals = Operation::ALL
            .iter()
            .map(|op| (*op, self.totals.get(op).map(|d| *d).unwrap_or_default()))
            .collect();
        Ok(summary)
    }

    /// Requests the fan-out of `master_task`, then follows each shard's
    /// continuations until none is left.
    pub async fn run_phase(&self, master_task: TaskName) -> Result<PhaseSummary> {
        let counters = Arc::new(Counters::default());
        let start = self.master.task_url(master_task);

        let urls = match invoke(&self.master, &self.permits, &counters, self.retries, start).await? {
            TaskResponse::FanOut { urls, .. } => urls,
            TaskResponse::Batch { task, .. } => {
                bail!("`{master_task}` answered with a `{task}` batch instead of a fan-out")
            }
        };

        let mut chains = JoinSet::new();
        for url in urls {
            let master = self.master.clone();
            let permits = self.permits.clone();
            let counters = counters.clone();
            let totals = self.totals.clone();
            let retries = self.retries;
            chains.spawn(async move {
                let mut next = Some(url);
                while let Some(url) = next.take() {
                    match invoke(&master, &permits, &counters, retries, url).await? {
                        TaskResponse::Batch {
                            next_url,
                            processed,
                            statistics,
                            ..
                        } => {
                            counters.processed.fetch_add(processed, Ordering::Relaxed);
                            merge_statistics(&totals, &statistics);
                            next = next_url;
                        }
                        TaskResponse::FanOut { task, .. } => {
                            bail!("worker request answered with a `{task}` fan-out")
                        }
                    }
                }
                anyhow::Ok(())
            });
        }

        while let Some(chain) = chains.join_next().await {
            if let Err(e) = chain? {
                chains.abort_all();
                return Err(e.context(format!("phase `{master_task}` failed")));
            }
        }

        Ok(PhaseSummary {
            invocations: counters.invocations.load(Ordering::Relaxed),
            retries: counters.retries.load(Ordering::Relaxed),
            processed: counters.processed.load(Ordering::Relaxed),
        })
    }
}

/// Delivers one request, redelivering the same URL on failure.
async fn invoke(
    master: &Arc<Master>,
    permits: &Semaphore,
    counters: &Counters,
    retries: u32,
    url: Url,
) -> Result<TaskResponse> {
    let mut attempt = 0;
    loop {
        let _permit = permits.acquire().await?;
        counters.invocations.fetch_add(1, Ordering::Relaxed);
        debug!(%url, attempt, "invoking");

        let handler = master.clone();
        let target = url.clone();
        let result = tokio::task::spawn_blocking(move || handler.handle(&target))
            .await
            .context("invocation panicked")?;

        match result {
            Ok(response) => return Ok(response),
            Err(e) if attempt < retries => {
                attempt += 1;
                counters.retries.fetch_add(1, Ordering::Relaxed);
                warn!(%url, attempt, "invocation failed, redelivering: {}", e);
            }
            Err(e) => return Err(anyhow::Error::new(e).context(format!("giving up on {url}"))),
        }
    }
}

/// Adds the `<operation> <seconds>` lines of one invocation to the totals.
fn merge_statistics(totals: &DashMap<Operation, Duration>, report: &str) {
    for line in report.lines() {
        let Some((name, secs)) = line.split_once(' ') else {
            continue;
        };
        let (Ok(op), Ok(secs)) = (Operation::from_str(name), secs.parse::<f64>()) else {
            warn!("ignoring malformed statistics line `{line}`");
            continue;
        };
        let Ok(secs) = Duration::try_from_secs_f64(secs) else {
            warn!("ignoring out of range statistics line `{line}`");
            continue;
        };
        *totals.entry(op).or_default() += secs;
    }
}
