//! Encoding of resumable shard state as a follow-up request URL.
//!
//! A continuation is the only state that crosses an invocation boundary. It
//! travels as query parameters of the next request:
//!
//! ```text
//! <base>?task=mapper&source_start_point=<b64>&source_end_point=<b64|*>&source_max_entries=1000
//! ```
//!
//! Key bounds are URL-safe base64 so arbitrary key bytes survive the trip.
//! The unbounded end of the last shard is written as `*`, which is not a
//! base64 symbol.

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use bytes::Bytes;
use url::Url;

use crate::error::{Error, Result};
use crate::shard::{ShardRange, Upper};
use crate::task::TaskName;

pub const TASK: &str = "task";
pub const SOURCE_START_POINT: &str = "source_start_point";
pub const SOURCE_END_POINT: &str = "source_end_point";
pub const SOURCE_MAX_ENTRIES: &str = "source_max_entries";

const UNBOUNDED: &str = "*";

/// Where the next batch of one shard begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    /// The worker task to invoke.
    pub task: TaskName,

    /// The unprocessed remainder of the shard.
    pub range: ShardRange,

    /// Maximum records fetched per batch.
    pub batch_size: usize,
}

impl Continuation {
    pub fn new(task: TaskName, range: ShardRange, batch_size: usize) -> Self {
        Self {
            task,
            range,
            batch_size,
        }
    }

    /// The request that resumes this shard, addressed at `base`.
    pub fn to_url(&self, base: &Url) -> Url {
        let mut url = base.clone();
        let end = match &self.range.end {
            Upper::Inclusive(key) => URL_SAFE.encode(key),
            Upper::Unbounded => UNBOUNDED.to_string(),
        };
        url.query_pairs_mut()
            .clear()
            .append_pair(TASK, self.task.as_str())
            .append_pair(SOURCE_START_POINT, &URL_SAFE.encode(&self.range.start))
            .append_pair(SOURCE_END_POINT, &end)
            .append_pair(SOURCE_MAX_ENTRIES, &self.batch_size.to_string());
        url
    }

    pub fn from_url(url: &Url) -> Result<Self> {
        match Invocation::from_url(url)? {
            Invocation::Worker(continuation) => Ok(continuation),
            Invocation::Master(task) => Err(Error::InvalidParameter {
                name: TASK,
                value: task.to_string(),
                reason: "a master task carries no shard state".into(),
            }),
        }
    }
}

/// A decoded inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// A fan-out request. Shard parameters, if any, are ignored.
    Master(TaskName),

    /// One batch of one shard.
    Worker(Continuation),
}

impl Invocation {
    pub fn task(&self) -> TaskName {
        match self {
            Invocation::Master(task) => *task,
            Invocation::Worker(continuation) => continuation.task,
        }
    }

    /// Decodes the query of `url`. A request without a `task` parameter is a
    /// map-master request.
    pub fn from_url(url: &Url) -> Result<Self> {
        let param = |name: &'static str| {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        };

        let task = match param(TASK) {
            Some(name) => name.parse::<TaskName>()?,
            None => TaskName::MapMaster,
        };
        if task.is_master() {
            return Ok(Invocation::Master(task));
        }

        let start = param(SOURCE_START_POINT).ok_or(Error::MissingParameter(SOURCE_START_POINT))?;
        let end = param(SOURCE_END_POINT).ok_or(Error::MissingParameter(SOURCE_END_POINT))?;
        let max = param(SOURCE_MAX_ENTRIES).ok_or(Error::MissingParameter(SOURCE_MAX_ENTRIES))?;

        let start = decode_key(SOURCE_START_POINT, &start)?;
        let end = if end == UNBOUNDED {
            Upper::Unbounded
        } else {
            Upper::Inclusive(decode_key(SOURCE_END_POINT, &end)?)
        };
        let batch_size = parse_batch_size(&max)?;

        Ok(Invocation::Worker(Continuation::new(
            task,
            ShardRange::new(start, end),
            batch_size,
        )))
    }
}

fn decode_key(name: &'static str, value: &str) -> Result<Bytes> {
    URL_SAFE
        .decode(value)
        .map(Bytes::from)
        .map_err(|e| Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn parse_batch_size(value: &str) -> Result<usize> {
    let invalid = |reason: String| Error::InvalidParameter {
        name: SOURCE_MAX_ENTRIES,
        value: value.to_string(),
        reason,
    };
    let batch_size = value.parse::<usize>().map_err(|e| invalid(e.to_string()))?;
    if batch_size == 0 {
        return Err(invalid("batch size must be positive".into()));
    }
    Ok(batch_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://localhost:8080/mapreduce").unwrap()
    }

    #[test]
    fn encodes_shard_state_in_the_query() {
        let continuation = Continuation::new(
            TaskName::Reducer,
            ShardRange::new("apple", Upper::Inclusive(Bytes::from("b"))),
            250,
        );
        let url = continuation.to_url(&base());

        assert_eq!(url.path(), "/mapreduce");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("task".into(), "reducer".into()));
        assert_eq!(pairs[3], ("source_max_entries".into(), "250".into()));
        assert_eq!(Continuation::from_url(&url).unwrap(), continuation);
    }

    #[test]
    fn unbounded_end_and_binary_keys_survive() {
        let continuation = Continuation::new(
            TaskName::Mapper,
            ShardRange::new(Bytes::from_static(b"\xff\x00&="), Upper::Unbounded),
            1,
        );
        let url = continuation.to_url(&base());
        assert!(url.as_str().contains("source_end_point=*"));
        assert_eq!(Continuation::from_url(&url).unwrap(), continuation);
    }

    #[test]
    fn missing_task_means_map_master() {
        let invocation = Invocation::from_url(&base()).unwrap();
        assert_eq!(invocation, Invocation::Master(TaskName::MapMaster));
    }

    #[test]
    fn worker_without_batch_size_is_rejected() {
        let url = Url::parse(
            "http://localhost/mr?task=mapper&source_start_point=&source_end_point=*",
        )
        .unwrap();
        assert!(matches!(
            Invocation::from_url(&url),
            Err(Error::MissingParameter(SOURCE_MAX_ENTRIES))
        ));
    }

    #[test]
    fn non_numeric_batch_size_is_rejected() {
        for bad in ["ten", "-3", "0"] {
            let url = Url::parse(&format!(
                "http://localhost/mr?task=reducer&source_start_point=&source_end_point=*&source_max_entries={bad}"
            ))
            .unwrap();
            assert!(matches!(
                Invocation::from_url(&url),
                Err(Error::InvalidParameter {
                    name: SOURCE_MAX_ENTRIES,
                    ..
                })
            ));
        }
    }

    #[test]
    fn unknown_task_is_rejected() {
        let url = Url::parse("http://localhost/mr?task=combine").unwrap();
        assert!(matches!(
            Invocation::from_url(&url),
            Err(Error::UnknownTask { .. })
        ));
    }

    #[test]
    fn master_has_no_continuation() {
        let url = Url::parse("http://localhost/mr?task=reduce-master").unwrap();
        assert!(Continuation::from_url(&url).is_err());
    }
}
