//! Word count. Each record value is a line of text; the output is one
//! `word count` pair per distinct lowercase word.

use bytes::Bytes;

use common::{KeyValue, MapOutput, ReduceOutput};

use crate::{single, string_from_bytes, sum_counts};

fn words(line: &str) -> Vec<String> {
    line.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

pub fn map(kv: KeyValue, _aux: Bytes) -> MapOutput {
    let line = string_from_bytes(kv.value)?;
    let iter = words(&line)
        .into_iter()
        .map(|word| Ok(KeyValue::new(word, Bytes::from_static(b"1"))));
    Ok(Box::new(iter))
}

pub fn reduce(key: Bytes, values: Vec<Bytes>, _aux: Bytes) -> ReduceOutput {
    let count: u64 = sum_counts(&values)?;
    single(KeyValue::new(key, count.to_string()))
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    fn mapped(line: &'static str) -> Result<Vec<KeyValue>> {
        map(KeyValue::new("f:1", line), Bytes::new())?.collect()
    }

    #[test]
    fn splits_on_punctuation_and_lowercases() {
        let out = mapped("The cat, the HAT!").unwrap();
        let keys: Vec<_> = out.iter().map(|kv| kv.key.clone()).collect();
        assert_eq!(keys, vec!["the", "cat", "the", "hat"]);
        assert!(out.iter().all(|kv| kv.value == "1"));
    }

    #[test]
    fn counts_occurrences() {
        let out: Vec<_> = reduce(
            Bytes::from("the"),
            vec![Bytes::from("1"), Bytes::from("1"), Bytes::from("3")],
            Bytes::new(),
        )
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();
        assert_eq!(out, vec![KeyValue::new("the", "5")]);
    }

    #[test]
    fn non_utf8_input_fails() {
        assert!(map(KeyValue::new("f:1", Bytes::from_static(b"\xff")), Bytes::new()).is_err());
    }
}
