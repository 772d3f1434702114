//! A MapReduce-compatible application that computes the
//! degree of each vertex in a graph, given a list of edges.
//!
//! Each record value holds one edge, `<from> <to>`.

use anyhow::{anyhow, Result};
use bytes::Bytes;

use common::{KeyValue, MapOutput, ReduceOutput};

use crate::{single, string_from_bytes, sum_counts};

fn parse_line(line: &str) -> Result<(u64, u64)> {
    let mut iter = line.split_whitespace().take(2);
    let a = iter
        .next()
        .ok_or_else(|| anyhow!("Invalid input file format"))?
        .parse()?;
    let b = iter
        .next()
        .ok_or_else(|| anyhow!("Invalid input file format"))?
        .parse()?;
    Ok((a, b))
}

pub fn map(kv: KeyValue, _aux: Bytes) -> MapOutput {
    let line = string_from_bytes(kv.value)?;
    if line.trim().is_empty() {
        return Ok(Box::new(std::iter::empty()));
    }
    let (a, b) = parse_line(&line)?;

    let iter = [a, b]
        .into_iter()
        .map(|vertex| Ok(KeyValue::new(vertex.to_string(), Bytes::from_static(b"1"))));
    Ok(Box::new(iter))
}

pub fn reduce(key: Bytes, values: Vec<Bytes>, _aux: Bytes) -> ReduceOutput {
    let count = sum_counts(&values)?;
    single(KeyValue::new(key, format!("deg={}", count)))
}
