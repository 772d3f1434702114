use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::continuation::Continuation;
use crate::error::Error;
use crate::stats::OperationStatistics;
use crate::timer::{Clock, SystemClock, TaskSetTimer, TimerConfig};

/// Every task an invocation can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskName {
    /// Fans out one mapper request per shard.
    MapMaster,
    Mapper,
    /// Fans out one reducer request per shard.
    ReduceMaster,
    Reducer,
    /// Fans out one cleanup request per shard.
    CleanupMaster,
    /// Consumes intermediate data without producing output.
    Cleanup,
}

impl TaskName {
    pub const ALL: [TaskName; 6] = [
        TaskName::MapMaster,
        TaskName::Mapper,
        TaskName::ReduceMaster,
        TaskName::Reducer,
        TaskName::CleanupMaster,
        TaskName::Cleanup,
    ];

    pub const NAMES: &'static [&'static str] = &[
        "map-master",
        "mapper",
        "reduce-master",
        "reducer",
        "cleanup-master",
        "cleanup",
    ];

    pub fn as_str(&self) -> &'static str {
        Self::NAMES[*self as usize]
    }

    /// For a master task, the worker task it fans out to.
    pub fn worker(&self) -> Option<TaskName> {
        match self {
            TaskName::MapMaster => Some(TaskName::Mapper),
            TaskName::ReduceMaster => Some(TaskName::Reducer),
            TaskName::CleanupMaster => Some(TaskName::Cleanup),
            _ => None,
        }
    }

    pub fn is_master(&self) -> bool {
        self.worker().is_some()
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskName::ALL
            .into_iter()
            .find(|task| task.as_str() == s)
            .ok_or_else(|| Error::UnknownTask {
                name: s.to_string(),
                valid: TaskName::NAMES,
            })
    }
}

/// What one worker invocation produced.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Where the next invocation of this shard resumes. `None` once the shard
    /// is exhausted.
    pub continuation: Option<Continuation>,

    /// Records (map) or keys (reduce) fully processed in this batch.
    pub processed: usize,

    pub statistics: OperationStatistics,
}

/// Timing environment shared by the map and reduce executors.
#[derive(Clone)]
pub struct BatchContext {
    pub timer: TimerConfig,
    pub clock: Arc<dyn Clock>,
}

impl Default for BatchContext {
    fn default() -> Self {
        Self::new(TimerConfig::default())
    }
}

impl BatchContext {
    pub fn new(timer: TimerConfig) -> Self {
        Self {
            timer,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn statistics(&self) -> OperationStatistics {
        OperationStatistics::new(self.clock.clone())
    }

    pub(crate) fn started_timer(&self) -> TaskSetTimer {
        let mut timer = TaskSetTimer::new(self.timer.clone(), self.clock.clone());
        timer.start();
        timer
    }
}

impl fmt::Debug for BatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchContext")
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}
