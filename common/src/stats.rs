//! Per-invocation timing of the read, write, map and reduce phases.
//!
//! Only one phase can be timed at a time. Starting a second phase before
//! stopping the first, or stopping when nothing runs, is a bug in the caller
//! and is reported as a [`StatisticsError`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::timer::{Clock, SystemClock};

/// The phases an invocation spends time in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Write,
    Map,
    Reduce,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Read,
        Operation::Write,
        Operation::Map,
        Operation::Reduce,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Map => "map",
            Operation::Reduce => "reduce",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = StatisticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| StatisticsError::UnknownOperation(s.to_string()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatisticsError {
    #[error("cannot start timing `{requested}` while `{running}` is still running")]
    AlreadyRunning {
        running: Operation,
        requested: Operation,
    },

    #[error("cannot stop timing: no operation is running")]
    NotRunning,

    #[error("`{0}` is not a recognized operation; expected one of read, write, map, reduce")]
    UnknownOperation(String),
}

#[derive(Debug, Clone, Copy)]
enum State {
    Idle,
    Running { operation: Operation, since: Instant },
}

/// Accumulated time per [`Operation`] for one invocation.
pub struct OperationStatistics {
    totals: [Duration; 4],
    state: State,
    clock: Arc<dyn Clock>,
}

impl Default for OperationStatistics {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl OperationStatistics {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            totals: [Duration::ZERO; 4],
            state: State::Idle,
            clock,
        }
    }

    pub fn start(&mut self, operation: Operation) -> Result<(), StatisticsError> {
        match self.state {
            State::Idle => {
                self.state = State::Running {
                    operation,
                    since: self.clock.now(),
                };
                Ok(())
            }
            State::Running { operation: running, .. } => Err(StatisticsError::AlreadyRunning {
                running,
                requested: operation,
            }),
        }
    }

    /// Stops the running operation and adds its elapsed time to its bucket.
    pub fn stop(&mut self) -> Result<Operation, StatisticsError> {
        match self.state {
            State::Idle => Err(StatisticsError::NotRunning),
            State::Running { operation, since } => {
                self.totals[operation.index()] += self.clock.now().saturating_duration_since(since);
                self.state = State::Idle;
                Ok(operation)
            }
        }
    }

    /// Times `f` under `operation`.
    pub fn time<T>(
        &mut self,
        operation: Operation,
        f: impl FnOnce() -> T,
    ) -> Result<T, StatisticsError> {
        self.start(operation)?;
        let out = f();
        self.stop()?;
        Ok(out)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }

    pub fn total(&self, operation: Operation) -> Duration {
        self.totals[operation.index()]
    }

    /// One `<operation> <seconds>` line per bucket.
    pub fn report(&self) -> String {
        Operation::ALL
            .iter()
            .map(|op| format!("{} {:.6}", op, self.total(*op).as_secs_f64()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Debug for OperationStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationStatistics")
            .field("totals", &self.totals)
            .field("state", &self.state)
            .finish()
    }
}
