//! Task dispatch: routes one inbound request to a fan-out or to one batch of
//! the map, reduce or cleanup executor.
//!
//! The master keeps no state between requests. Everything a worker task needs
//! to resume arrives in the request itself.

use std::sync::Arc;

use tracing::{debug, info};
use url::Url;

use crate::continuation::{Continuation, Invocation};
use crate::error::{Error, Result};
use crate::map::run_map_batch;
use crate::reduce::run_reduce_batch;
use crate::shard::{compute_shard_ranges, DEFAULT_SHARD_COUNT};
use crate::store::{NoOpSink, Sink, Source};
use crate::task::{BatchContext, BatchOutcome, TaskName};
use crate::timer::{Clock, TimerConfig};
use crate::{Mapper, Reducer};

/// Batch size handed to every shard by a fan-out.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct MasterConfig {
    /// Address continuations are sent to.
    pub base_url: Url,

    pub shard_count: usize,

    pub default_batch_size: usize,

    pub timer: TimerConfig,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("http://localhost/mapreduce").expect("static url is valid"),
            shard_count: DEFAULT_SHARD_COUNT,
            default_batch_size: DEFAULT_BATCH_SIZE,
            timer: TimerConfig::default(),
        }
    }
}

impl MasterConfig {
    pub fn validate(&self) -> Result<()> {
        compute_shard_ranges(self.shard_count)?;
        if self.default_batch_size == 0 {
            return Err(Error::InvalidConfig("batch size must be positive".into()));
        }
        if self.base_url.cannot_be_a_base() {
            return Err(Error::InvalidConfig(format!(
                "`{}` cannot be used as a base url",
                self.base_url
            )));
        }
        self.timer.validate()
    }
}

/// The result of one invocation, ready to be rendered by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskResponse {
    /// A master task: one request per shard for the dispatcher to enqueue.
    FanOut { task: TaskName, urls: Vec<Url> },

    /// A worker task: the follow-up request, if the shard has work left.
    Batch {
        task: TaskName,
        next_url: Option<Url>,
        processed: usize,
        statistics: String,
    },
}

impl TaskResponse {
    pub fn task(&self) -> TaskName {
        match self {
            TaskResponse::FanOut { task, .. } | TaskResponse::Batch { task, .. } => *task,
        }
    }
}

/// Coordinates mappers, reducers and their data for one job.
pub struct Master {
    jobname: String,
    config: MasterConfig,
    ctx: BatchContext,
    mapper: Option<Arc<dyn Mapper>>,
    reducer: Option<Arc<dyn Reducer>>,
    cleanup_reducer: Option<Arc<dyn Reducer>>,
    source: Option<Arc<dyn Source>>,
    mapper_sink: Option<Arc<dyn Sink>>,
    reducer_source: Option<Arc<dyn Source>>,
    sink: Option<Arc<dyn Sink>>,
}

impl Master {
    pub fn new(jobname: impl Into<String>, config: MasterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            jobname: jobname.into(),
            ctx: BatchContext::new(config.timer.clone()),
            config,
            mapper: None,
            reducer: None,
            cleanup_reducer: None,
            source: None,
            mapper_sink: None,
            reducer_source: None,
            sink: None,
        })
    }

    pub fn jobname(&self) -> &str {
        &self.jobname
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    /// The mapper used by `mapper` tasks.
    pub fn with_mapper(mut self, mapper: Arc<dyn Mapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// The reducer used by `reducer` tasks.
    pub fn with_reducer(mut self, reducer: Arc<dyn Reducer>) -> Self {
        self.reducer = Some(reducer);
        self
    }

    /// The reducer `cleanup` tasks run over the intermediate data, usually a
    /// [`PurgeReducer`](crate::store::PurgeReducer). Its output is discarded.
    pub fn with_cleanup_reducer(mut self, reducer: Arc<dyn Reducer>) -> Self {
        self.cleanup_reducer = Some(reducer);
        self
    }

    /// Where mapper input is read from.
    pub fn with_source(mut self, source: Arc<dyn Source>) -> Self {
        self.source = Some(source);
        self
    }

    /// Where mapper output goes.
    pub fn with_mapper_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.mapper_sink = Some(sink);
        self
    }

    /// Where reducer and cleanup input is read from.
    pub fn with_reducer_source(mut self, source: Arc<dyn Source>) -> Self {
        self.reducer_source = Some(source);
        self
    }

    /// Where reducer output goes.
    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.ctx = self.ctx.with_clock(clock);
        self
    }

    /// The request that starts `task`, e.g. the map-master page.
    pub fn task_url(&self, task: TaskName) -> Url {
        let mut url = self.config.base_url.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair(crate::continuation::TASK, task.as_str());
        url
    }

    /// Handles one request addressed by URL.
    pub fn handle(&self, url: &Url) -> Result<TaskResponse> {
        let invocation = Invocation::from_url(url)?;
        self.handle_invocation(&invocation)
    }

    pub fn handle_invocation(&self, invocation: &Invocation) -> Result<TaskResponse> {
        let task = invocation.task();
        debug!(job = %self.jobname, %task, "dispatching request");
        match invocation {
            Invocation::Master(task) => self.fan_out(*task),
            Invocation::Worker(work) if work.task.is_master() => self.fan_out(work.task),
            Invocation::Worker(work) => self.run_worker(work),
        }
    }

    /// One continuation per shard for the worker task behind `master`.
    pub fn shard_continuations(&self, master: TaskName) -> Result<Vec<Continuation>> {
        let worker = master.worker().ok_or_else(|| Error::InvalidParameter {
            name: crate::continuation::TASK,
            value: master.to_string(),
            reason: "only master tasks fan out".into(),
        })?;
        Ok(compute_shard_ranges(self.config.shard_count)?
            .into_iter()
            .map(|range| Continuation::new(worker, range, self.config.default_batch_size))
            .collect())
    }

    fn fan_out(&self, master: TaskName) -> Result<TaskResponse> {
        let urls: Vec<Url> = self
            .shard_continuations(master)?
            .iter()
            .map(|c| c.to_url(&self.config.base_url))
            .collect();
        info!(job = %self.jobname, task = %master, shards = urls.len(), "fanning out");
        Ok(TaskResponse::FanOut { task: master, urls })
    }

    fn run_worker(&self, work: &Continuation) -> Result<TaskResponse> {
        let outcome = self.run_batch(work)?;
        let next_url = outcome
            .continuation
            .as_ref()
            .map(|c| c.to_url(&self.config.base_url));
        info!(
            job = %self.jobname,
            task = %work.task,
            range = %work.range,
            processed = outcome.processed,
            done = next_url.is_none(),
            "batch finished"
        );
        Ok(TaskResponse::Batch {
            task: work.task,
            next_url,
            processed: outcome.processed,
            statistics: outcome.statistics.report(),
        })
    }

    /// Runs one batch of a worker task without rendering its continuation.
    pub fn run_batch(&self, work: &Continuation) -> Result<BatchOutcome> {
        let task = work.task;
        match task {
            TaskName::Mapper => run_map_batch(
                require(&self.mapper, task, "mapper")?,
                require(&self.source, task, "source")?,
                require(&self.mapper_sink, task, "mapper sink")?,
                work,
                &self.ctx,
            ),
            TaskName::Reducer => run_reduce_batch(
                require(&self.reducer, task, "reducer")?,
                require(&self.reducer_source, task, "reducer source")?,
                require(&self.sink, task, "sink")?,
                work,
                &self.ctx,
            ),
            TaskName::Cleanup => run_reduce_batch(
                require(&self.cleanup_reducer, task, "cleanup reducer")?,
                require(&self.reducer_source, task, "reducer source")?,
                &NoOpSink,
                work,
                &self.ctx,
            ),
            TaskName::MapMaster | TaskName::ReduceMaster | TaskName::CleanupMaster => {
                Err(Error::InvalidParameter {
                    name: crate::continuation::TASK,
                    value: task.to_string(),
                    reason: "master tasks do not run batches".into(),
                })
            }
        }
    }
}

fn require<'a, T: ?Sized>(
    slot: &'a Option<Arc<T>>,
    task: TaskName,
    component: &'static str,
) -> Result<&'a T> {
    slot.as_deref().ok_or(Error::MissingComponent {
        task: task.as_str(),
        component,
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::shard::Upper;
    use crate::store::{MemoryStore, PurgeReducer};
    use crate::{KeyValue, MapOutput, ReduceOutput};

    fn first_letter(kv: KeyValue) -> MapOutput {
        let key = kv.key.slice(0..1);
        Ok(Box::new(std::iter::once(Ok(KeyValue::new(key, kv.value)))))
    }

    fn sum(key: Bytes, values: Vec<Bytes>) -> ReduceOutput {
        let mut total = 0u64;
        for value in values {
            total += std::str::from_utf8(&value)?.parse::<u64>()?;
        }
        Ok(Box::new(std::iter::once(Ok(KeyValue::new(key, total.to_string())))))
    }

    /// Follows every shard chain a master task fans out to completion.
    fn run_phase(master: &Master, task: TaskName) -> usize {
        let TaskResponse::FanOut { urls, .. } = master.handle(&master.task_url(task)).unwrap() else {
            panic!("{task} should fan out");
        };
        let mut invocations = 0;
        for url in urls {
            let mut next = Some(url);
            while let Some(url) = next.take() {
                invocations += 1;
                match master.handle(&url).unwrap() {
                    TaskResponse::Batch { next_url, .. } => next = next_url,
                    other => panic!("unexpected response {other:?}"),
                }
            }
        }
        invocations
    }

    #[test]
    fn map_master_fans_out_one_url_per_shard() {
        let master = Master::new("job", MasterConfig::default()).unwrap();
        let TaskResponse::FanOut { task, urls } =
            master.handle(&master.config().base_url).unwrap()
        else {
            panic!("expected fan-out");
        };

        assert_eq!(task, TaskName::MapMaster);
        assert_eq!(urls.len(), 36);
        let first = Continuation::from_url(&urls[0]).unwrap();
        assert_eq!(first.task, TaskName::Mapper);
        assert!(first.range.start.is_empty());
        assert_eq!(first.batch_size, DEFAULT_BATCH_SIZE);
        let last = Continuation::from_url(&urls[35]).unwrap();
        assert_eq!(last.range.end, Upper::Unbounded);
    }

    #[test]
    fn unknown_task_is_an_error() {
        let master = Master::new("job", MasterConfig::default()).unwrap();
        let url = Url::parse("http://localhost/mapreduce?task=shuffle").unwrap();
        let err = master.handle(&url).unwrap_err();
        assert!(err.to_string().contains("reduce-master"));
    }

    #[test]
    fn missing_component_is_reported() {
        let master = Master::new("job", MasterConfig::default()).unwrap();
        let TaskResponse::FanOut { urls, .. } = master.handle(&master.task_url(TaskName::ReduceMaster)).unwrap() else {
            panic!("expected fan-out");
        };
        let err = master.handle(&urls[0]).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingComponent {
                task: "reducer",
                component: "reducer"
            }
        ));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = MasterConfig {
            shard_count: 0,
            ..MasterConfig::default()
        };
        assert!(Master::new("job", config).is_err());
    }

    #[test]
    fn first_letter_sum_end_to_end() {
        let source: Arc<MemoryStore> = Arc::new(
            [("apple", "10"), ("banana", "20"), ("cherry", "30")]
                .into_iter()
                .map(|(k, v)| KeyValue::new(k, v))
                .collect(),
        );
        let intermediate = Arc::new(MemoryStore::new());
        let output = Arc::new(MemoryStore::new());

        let config = MasterConfig {
            default_batch_size: 2,
            ..MasterConfig::default()
        };
        let master = Master::new("letters", config)
            .unwrap()
            .with_mapper(Arc::new(first_letter))
            .with_reducer(Arc::new(sum))
            .with_cleanup_reducer(Arc::new(PurgeReducer::new(intermediate.clone())))
            .with_source(source)
            .with_mapper_sink(intermediate.clone())
            .with_reducer_source(intermediate.clone())
            .with_sink(output.clone());

        run_phase(&master, TaskName::MapMaster);
        assert_eq!(intermediate.len(), 3);

        run_phase(&master, TaskName::ReduceMaster);
        let results: Vec<String> = output
            .snapshot()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(results, vec!["a 10", "b 20", "c 30"]);

        run_phase(&master, TaskName::CleanupMaster);
        assert!(intermediate.is_empty());
        assert_eq!(output.len(), 3);
    }
}
