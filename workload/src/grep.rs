//! Line filter. The auxiliary argument is the pattern; every record whose
//! value contains it is passed through unchanged.

use bytes::Bytes;

use common::{KeyValue, MapOutput, ReduceOutput};

use crate::string_from_bytes;

pub fn map(kv: KeyValue, aux: Bytes) -> MapOutput {
    let pattern = string_from_bytes(aux)?;
    let line = string_from_bytes(kv.value())?;
    if line.contains(&pattern) {
        Ok(Box::new(std::iter::once(Ok(kv))))
    } else {
        Ok(Box::new(std::iter::empty()))
    }
}

pub fn reduce(key: Bytes, values: Vec<Bytes>, _aux: Bytes) -> ReduceOutput {
    Ok(Box::new(
        values
            .into_iter()
            .map(move |value| Ok(KeyValue::new(key.clone(), value))),
    ))
}
