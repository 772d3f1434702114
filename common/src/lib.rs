//! A MapReduce engine that runs as a chain of short, independent task
//! invocations instead of a long-lived cluster process.
//!
//! The key space is cut into fixed shards. Every invocation processes one
//! bounded batch of one shard, stops early when its time budget is about to
//! run out, and hands back a [`Continuation`] describing where the next
//! invocation of the same shard should pick up. Nothing else survives between
//! invocations; the dispatcher that delivers continuations is an external
//! collaborator.

use std::fmt;
use std::fmt::Formatter;

use bytes::Bytes;

pub mod continuation;
pub mod error;
pub mod map;
pub mod master;
pub mod reduce;
pub mod shard;
pub mod stats;
pub mod store;
pub mod task;
pub mod timer;

pub use continuation::{Continuation, Invocation};
pub use error::{Error, Result};
pub use master::{Master, MasterConfig, TaskResponse};
pub use shard::{compute_shard_ranges, ShardRange, Upper};
pub use stats::{Operation, OperationStatistics};
pub use store::{MemoryStore, NoOpSink, Purge, PurgeReducer, Sink, Source};
pub use task::{BatchContext, BatchOutcome, TaskName};
pub use timer::{Clock, ManualClock, SystemClock, TaskSetTimer, TimerConfig};

/////////////////////////////////////////////////////////////////////////////
// MapReduce application types
/////////////////////////////////////////////////////////////////////////////

/// The output of a map function.
///
/// There are 2 layers of [`anyhow::Result`]s here. The outer layer
/// accounts for errors that arise while creating the iterator.
/// The inner layer accounts for errors that occur during iteration.
pub type MapOutput = anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<KeyValue>>>>;

/// The output of a reduce function. Same layering as [`MapOutput`].
pub type ReduceOutput = MapOutput;

/// Transforms one source record into zero or more intermediate records.
pub trait Mapper: Send + Sync {
    fn map(&self, kv: KeyValue) -> MapOutput;
}

/// Folds every intermediate value of one key into zero or more output records.
///
/// `values` arrive in the order the reducer source yielded them.
pub trait Reducer: Send + Sync {
    fn reduce(&self, key: Bytes, values: Vec<Bytes>) -> ReduceOutput;
}

impl<F> Mapper for F
where
    F: Fn(KeyValue) -> MapOutput + Send + Sync,
{
    fn map(&self, kv: KeyValue) -> MapOutput {
        self(kv)
    }
}

impl<F> Reducer for F
where
    F: Fn(Bytes, Vec<Bytes>) -> ReduceOutput + Send + Sync,
{
    fn reduce(&self, key: Bytes, values: Vec<Bytes>) -> ReduceOutput {
        self(key, values)
    }
}

/////////////////////////////////////////////////////////////////////////////
// Key-value pairs
/////////////////////////////////////////////////////////////////////////////

/// A single key-value pair.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct KeyValue {
    /// The key.
    pub key: Bytes,

    /// The value.
    pub value: Bytes,
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            String::from_utf8_lossy(&self.key),
            String::from_utf8_lossy(&self.value)
        )
    }
}

impl KeyValue {
    /// Construct a new key-value pair from the given key and value.
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Get the key of this key-value pair.
    ///
    /// This method is cheap, since [`Bytes`] are cheaply cloneable.
    #[inline]
    pub fn key(&self) -> Bytes {
        self.key.clone()
    }

    /// Get the value of this key-value pair.
    ///
    /// This method is cheap, since [`Bytes`] are cheaply cloneable.
    #[inline]
    pub fn value(&self) -> Bytes {
        self.value.clone()
    }

    /// Consumes the key-value pair and returns the key.
    #[inline]
    pub fn into_key(self) -> Bytes {
        self.key
    }

    /// Consumes the key-value pair and returns the value.
    #[inline]
    pub fn into_value(self) -> Bytes {
        self.value
    }
}

/// Lossy UTF-8 rendering of a key for log lines and error messages.
pub fn display_key(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}
