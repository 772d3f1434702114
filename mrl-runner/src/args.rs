use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Parser, ValueEnum};
use url::Url;

use common::{MasterConfig, TimerConfig};

/// How lines of the input files become records.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum RecordFormat {
    /// Every line is a value, keyed by a hashed prefix, its file and its line number.
    Lines,
    /// Every line is `<key> <value>`. Keys must be unique.
    Pairs,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Glob pattern matching the input files.
    #[arg(short, long)]
    pub input: String,

    /// Name of the workload.
    #[arg(short, long)]
    pub workload: String,

    /// Output file.
    #[arg(short, long)]
    pub output: PathBuf,

    /// How input lines become records.
    #[arg(short, long, value_enum, default_value_t = RecordFormat::Lines)]
    pub format: RecordFormat,

    /// Number of key-space shards.
    #[arg(long, default_value_t = 36)]
    pub shards: usize,

    /// Records fetched per invocation.
    #[arg(short, long, default_value_t = 1000)]
    pub batch_size: usize,

    /// Execution limit of one invocation, in seconds.
    #[arg(short, long, default_value_t = 10.0)]
    pub timeout: f64,

    /// Fraction of the timeout an invocation may use.
    #[arg(long, default_value_t = 0.8)]
    pub safety_factor: f64,

    /// Only the most recent N per-item gaps count towards the stop prediction.
    #[arg(long)]
    pub lookback: Option<usize>,

    /// Invocations running at the same time.
    #[arg(short = 'j', long, default_value_t = 4)]
    pub workers: usize,

    /// Times a failed invocation is redelivered before the job is abandoned.
    ///
    /// A redelivered batch starts over from its first record, so output
    /// written before the failure is written again and summing workloads
    /// over-count.
    #[arg(short, long, default_value_t = 2)]
    pub retries: u32,

    /// Skip the cleanup phase and leave intermediate data in place.
    #[arg(long)]
    pub keep_intermediate: bool,

    /// Base URL continuations are addressed to.
    #[arg(long, default_value = "http://localhost/mapreduce")]
    pub base_url: String,

    /// Auxiliary arguments to pass to the MapReduce application.
    #[clap(value_parser, last = true)]
    pub args: Vec<String>,
}

impl Args {
    pub fn master_config(&self) -> anyhow::Result<MasterConfig> {
        let timeout = Duration::try_from_secs_f64(self.timeout)
            .map_err(|e| anyhow!("invalid timeout `{}`: {}", self.timeout, e))?;
        let base_url = Url::parse(&self.base_url)
            .with_context(|| format!("invalid base url `{}`", self.base_url))?;

        let config = MasterConfig {
            base_url,
            shard_count: self.shards,
            default_batch_size: self.batch_size,
            timer: TimerConfig {
                timeout,
                safety_factor: self.safety_factor,
                lookback: self.lookback,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Auxiliary arguments joined by spaces, as the workloads expect them.
    pub fn aux(&self) -> bytes::Bytes {
        bytes::Bytes::from(self.args.join(" "))
    }
}
