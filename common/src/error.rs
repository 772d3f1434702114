use thiserror::Error;

use crate::stats::StatisticsError;

/// Errors raised while handling a task invocation.
///
/// None of these are retried here. A failed invocation produces no
/// continuation, so the dispatcher recovers by redelivering the same request.
#[derive(Debug, Error)]
pub enum Error {
    /// A collaborator the task needs was never configured on the master.
    #[error("task `{task}` requires a {component}, but none was configured")]
    MissingComponent {
        task: &'static str,
        component: &'static str,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("task name `{name}` is not recognized; valid task values are {valid:?}")]
    UnknownTask {
        name: String,
        valid: &'static [&'static str],
    },

    #[error("request is missing required parameter `{0}`")]
    MissingParameter(&'static str),

    #[error("parameter `{name}` has invalid value `{value}`: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read from source")]
    Read(#[source] anyhow::Error),

    #[error("failed to write key `{key}` to sink")]
    Write {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("mapper failed on key `{key}`")]
    Map {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("reducer failed on key `{key}`")]
    Reduce {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Statistics(#[from] StatisticsError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
