//! Ready-made MapReduce applications, addressable by name.

use anyhow::Result;
use bytes::Bytes;

use common::{KeyValue, MapOutput, Mapper, ReduceOutput, Reducer};

pub mod grep;
pub mod letter_sum;
pub mod vertex_degree;
pub mod wc;

/// A map function takes a key-value pair and auxiliary arguments.
///
/// It returns an iterator that yields new key-value pairs.
pub type MapFn = fn(kv: KeyValue, aux: Bytes) -> MapOutput;

/// A reduce function takes in a key, every value seen for that key in fetch
/// order, and an auxiliary argument. It returns an iterator of output pairs.
pub type ReduceFn = fn(key: Bytes, values: Vec<Bytes>, aux: Bytes) -> ReduceOutput;

/// A map reduce application.
#[derive(Copy, Clone)]
pub struct Workload {
    pub map_fn: MapFn,
    pub reduce_fn: ReduceFn,
}

impl Workload {
    /// Binds the map function to its auxiliary arguments.
    pub fn mapper(&self, aux: Bytes) -> WorkloadMapper {
        WorkloadMapper {
            map_fn: self.map_fn,
            aux,
        }
    }

    /// Binds the reduce function to its auxiliary arguments.
    pub fn reducer(&self, aux: Bytes) -> WorkloadReducer {
        WorkloadReducer {
            reduce_fn: self.reduce_fn,
            aux,
        }
    }
}

pub struct WorkloadMapper {
    map_fn: MapFn,
    aux: Bytes,
}

impl Mapper for WorkloadMapper {
    fn map(&self, kv: KeyValue) -> MapOutput {
        (self.map_fn)(kv, self.aux.clone())
    }
}

pub struct WorkloadReducer {
    reduce_fn: ReduceFn,
    aux: Bytes,
}

impl Reducer for WorkloadReducer {
    fn reduce(&self, key: Bytes, values: Vec<Bytes>) -> ReduceOutput {
        (self.reduce_fn)(key, values, self.aux.clone())
    }
}

/// Names accepted by [`try_named`].
pub const NAMES: &[&str] = &["wc", "grep", "vertex-degree", "letter-sum"];

pub fn try_named(name: &str) -> Option<Workload> {
    match name {
        "wc" => Some(Workload {
            map_fn: wc::map,
            reduce_fn: wc::reduce,
        }),
        "grep" => Some(Workload {
            map_fn: grep::map,
            reduce_fn: grep::reduce,
        }),
        "vertex-degree" => Some(Workload {
            map_fn: vertex_degree::map,
            reduce_fn: vertex_degree::reduce,
        }),
        "letter-sum" => Some(Workload {
            map_fn: letter_sum::map,
            reduce_fn: letter_sum::reduce,
        }),
        _ => None,
    }
}

pub(crate) fn string_from_bytes(bytes: Bytes) -> Result<String> {
    Ok(String::from_utf8(bytes.to_vec())?)
}

/// Sums values that are decimal integers.
pub(crate) fn sum_counts(values: &[Bytes]) -> Result<u64> {
    let mut total = 0u64;
    for value in values {
        total += std::str::from_utf8(value)?.trim().parse::<u64>()?;
    }
    Ok(total)
}

pub(crate) fn single(kv: KeyValue) -> ReduceOutput {
    Ok(Box::new(std::iter::once(Ok(kv))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_name_resolves() {
        for name in NAMES {
            assert!(try_named(name).is_some(), "{name}");
        }
        assert!(try_named("matrix").is_none());
    }

    #[test]
    fn adapters_pass_aux_through() {
        let workload = try_named("grep").unwrap();
        let mapper = workload.mapper(Bytes::from("needle"));
        let hits: Vec<_> = mapper
            .map(KeyValue::new("f:1", "a needle here"))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(hits, vec![KeyValue::new("f:1", "a needle here")]);

        let misses = mapper.map(KeyValue::new("f:2", "hay")).unwrap().count();
        assert_eq!(misses, 0);
    }
}
