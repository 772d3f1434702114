//! One time-boxed batch of the reduce phase.
//!
//! Intermediate records are grouped by key in memory, one batch at a time.
//! Every value of a key lands in the same shard because intermediate keys are
//! partitioned with the same boundaries as the input. A key can still straddle
//! two fetches, so a full fetch never reduces its trailing key: that group is
//! left for the next batch, or re-read in full when it is the only key.

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::debug;

use crate::continuation::Continuation;
use crate::error::{Error, Result};
use crate::map::emit;
use crate::shard::{ShardRange, Upper};
use crate::stats::{Operation, OperationStatistics};
use crate::store::{Sink, Source};
use crate::task::{BatchContext, BatchOutcome};
use crate::{display_key, Reducer};

/// Intermediate values of one batch, by key, in fetch order.
pub type Groups = BTreeMap<Bytes, Vec<Bytes>>;

/// Reduces the next batch of the shard described by `work`.
///
/// Keys are reduced in ascending order so the continuation, which resumes
/// after the last reduced key, never skips a group. When the timer asks to
/// stop, the remaining groups are dropped from this batch and re-read by the
/// next one.
pub fn run_reduce_batch(
    reducer: &dyn Reducer,
    source: &dyn Source,
    sink: &dyn Sink,
    work: &Continuation,
    ctx: &BatchContext,
) -> Result<BatchOutcome> {
    debug!(task = %work.task, range = %work.range, batch = work.batch_size, "starting reduce batch");

    let mut statistics = ctx.statistics();
    let groups = read_groups(source, &work.range, work.batch_size, &mut statistics)?;

    let mut timer = ctx.started_timer();
    let mut last_key = None;
    let mut processed = 0;

    for (key, values) in groups {
        if timer.should_stop() {
            debug!(processed, "time budget reached, stopping reduce batch early");
            break;
        }

        let outputs = statistics.time(Operation::Reduce, || reducer.reduce(key.clone(), values))?;
        emit(outputs, sink, &mut statistics, Operation::Reduce, &key)?;

        last_key = Some(key);
        processed += 1;
        timer.record_completion();
    }

    debug!(processed, "completed reduce operations");
    Ok(BatchOutcome {
        continuation: last_key
            .map(|key| Continuation::new(work.task, work.range.resume_after(key), work.batch_size)),
        processed,
        statistics,
    })
}

/// Fetches one batch and groups it by key, holding back any group the fetch
/// may have cut short.
pub fn read_groups(
    source: &dyn Source,
    range: &ShardRange,
    max_entries: usize,
    statistics: &mut OperationStatistics,
) -> Result<Groups> {
    let (mut groups, fetched) = fetch_groups(source, range, max_entries, statistics)?;
    if fetched < max_entries {
        return Ok(groups);
    }

    if groups.len() > 1 {
        if let Some((key, values)) = groups.pop_last() {
            debug!(
                key = %display_key(&key),
                values = values.len(),
                "batch is full, deferring trailing group"
            );
        }
        return Ok(groups);
    }

    // A single key filled the whole batch. Read all of it.
    let Some(key) = groups.keys().next().cloned() else {
        return Ok(groups);
    };
    debug!(key = %display_key(&key), "group exceeds batch size, reading it in full");
    let whole = ShardRange::new(range.start.clone(), Upper::Inclusive(key));
    let (groups, _) = fetch_groups(source, &whole, usize::MAX, statistics)?;
    Ok(groups)
}

fn fetch_groups(
    source: &dyn Source,
    range: &ShardRange,
    max_entries: usize,
    statistics: &mut OperationStatistics,
) -> Result<(Groups, usize)> {
    let mut records = statistics
        .time(Operation::Read, || source.get(range, max_entries))?
        .map_err(Error::Read)?;

    let mut groups = Groups::new();
    let mut fetched = 0;
    while let Some(record) = statistics.time(Operation::Read, || records.next())? {
        let record = record.map_err(Error::Read)?;
        groups.entry(record.key).or_default().push(record.value);
        fetched += 1;
    }
    Ok((groups, fetched))
}
