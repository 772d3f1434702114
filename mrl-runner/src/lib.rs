//! Runs a whole MapReduce job in one process: loads the input into memory,
//! drives the map, reduce and cleanup phases through the master one
//! invocation at a time and writes the reduced output to a file.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::info;

use common::{Master, MemoryStore, PurgeReducer, TaskName};

pub mod args;
pub mod dispatch;
pub mod input;

use args::Args;
use dispatch::{JobSummary, LocalDispatcher};

pub async fn run(args: Args) -> Result<JobSummary> {
    let workload = workload::try_named(&args.workload).ok_or_else(|| {
        anyhow!(
            "unknown workload `{}`, expected one of: {}",
            args.workload,
            workload::NAMES.join(", ")
        )
    })?;
    let config = args.master_config()?;

    let source = Arc::new(input::load_records(&args.input, args.format)?);
    let intermediate = Arc::new(MemoryStore::new());
    let output = Arc::new(MemoryStore::new());

    let aux = args.aux();
    let master = Master::new(args.workload.clone(), config)?
        .with_mapper(Arc::new(workload.mapper(aux.clone())))
        .with_reducer(Arc::new(workload.reducer(aux)))
        .with_cleanup_reducer(Arc::new(PurgeReducer::new(intermediate.clone())))
        .with_source(source)
        .with_mapper_sink(intermediate.clone())
        .with_reducer_source(intermediate.clone())
        .with_sink(output.clone());

    let mut phases = vec![TaskName::MapMaster, TaskName::ReduceMaster];
    if !args.keep_intermediate {
        phases.push(TaskName::CleanupMaster);
    }

    let dispatcher = LocalDispatcher::new(Arc::new(master), args.workers, args.retries);
    let summary = dispatcher.run_job(&phases).await?;

    let written = input::write_output(&output, &args.output)?;
    info!(
        records = written,
        intermediate = intermediate.len(),
        output = %args.output.display(),
        "job complete"
    );
    for (op, total) in &summary.totals {
        info!("{} {:.6}s", op, total.as_secs_f64());
    }
    Ok(summary)
}
