//! One time-boxed batch of the map phase.

use anyhow::anyhow;
use tracing::debug;

use crate::continuation::Continuation;
use crate::error::{Error, Result};
use crate::stats::{Operation, OperationStatistics};
use crate::store::{Sink, Source};
use crate::task::{BatchContext, BatchOutcome};
use crate::{display_key, KeyValue, MapOutput, Mapper};

/// Maps the next batch of the shard described by `work`.
///
/// Reads up to `work.batch_size` records from `(start, end]`, maps each one
/// and writes every output to `sink`. The loop stops early once the timer
/// predicts the next record would overrun the budget; the unprocessed tail is
/// left for the continuation. Any source, mapper or sink error aborts the
/// batch without a continuation.
pub fn run_map_batch(
    mapper: &dyn Mapper,
    source: &dyn Source,
    sink: &dyn Sink,
    work: &Continuation,
    ctx: &BatchContext,
) -> Result<BatchOutcome> {
    debug!(task = %work.task, range = %work.range, batch = work.batch_size, "starting map batch");

    let mut statistics = ctx.statistics();
    let mut records = statistics
        .time(Operation::Read, || source.get(&work.range, work.batch_size))?
        .map_err(Error::Read)?;

    let mut timer = ctx.started_timer();
    let mut last_key = None;
    let mut processed = 0;

    loop {
        let next = statistics.time(Operation::Read, || records.next())?;
        let Some(record) = next else {
            break;
        };
        let record = record.map_err(Error::Read)?;

        if timer.should_stop() {
            debug!(processed, "time budget reached, stopping map batch early");
            break;
        }

        let key = record.key();
        let outputs = statistics.time(Operation::Map, || mapper.map(record))?;
        emit(outputs, sink, &mut statistics, Operation::Map, &key)?;

        last_key = Some(key);
        processed += 1;
        timer.record_completion();
    }

    debug!(processed, "completed map operations");
    Ok(BatchOutcome {
        continuation: last_key
            .map(|key| Continuation::new(work.task, work.range.resume_after(key), work.batch_size)),
        processed,
        statistics,
    })
}

/// Drains the output of one map or reduce call into `sink`.
///
/// Pulling from the output iterator is timed under `operation`, each write
/// under [`Operation::Write`]. Errors are attributed to `input_key`.
pub(crate) fn emit(
    outputs: MapOutput,
    sink: &dyn Sink,
    statistics: &mut OperationStatistics,
    operation: Operation,
    input_key: &[u8],
) -> Result<()> {
    let failed = |source: anyhow::Error| {
        let key = display_key(input_key);
        match operation {
            Operation::Reduce => Error::Reduce { key, source },
            _ => Error::Map { key, source },
        }
    };

    let mut outputs = outputs.map_err(failed)?;
    loop {
        let next = statistics.time(operation, || outputs.next())?;
        let Some(output) = next else {
            return Ok(());
        };
        let output: KeyValue = output.map_err(failed)?;
        // The first shard starts after the empty key, so no reduce or cleanup
        // batch would ever read it back.
        if operation == Operation::Map && output.key.is_empty() {
            return Err(failed(anyhow!("mapper emitted an empty key")));
        }
        let output_key = display_key(&output.key);
        statistics
            .time(Operation::Write, || sink.put(output))?
            .map_err(|source| Error::Write {
                key: output_key,
                source,
            })?;
    }
}
