//! Sums integer values by the first character of their key.

use anyhow::anyhow;
use bytes::Bytes;

use common::{KeyValue, MapOutput, ReduceOutput};

use crate::{single, sum_counts};

pub fn map(kv: KeyValue, _aux: Bytes) -> MapOutput {
    if kv.key.is_empty() {
        return Err(anyhow!("cannot take the first letter of an empty key"));
    }
    let letter = kv.key.slice(0..1);
    Ok(Box::new(std::iter::once(Ok(KeyValue::new(letter, kv.value)))))
}

pub fn reduce(key: Bytes, values: Vec<Bytes>, _aux: Bytes) -> ReduceOutput {
    single(KeyValue::new(key, sum_counts(&values)?.to_string()))
}
