//! Loading input files into an in-memory source, and writing the result.

use std::collections::HashSet;
use std::fs::{self, File};
use std::hash::Hasher;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use glob::glob;
use tracing::{debug, info};

use common::shard::to_base36;
use common::{KeyValue, MemoryStore};

use crate::args::RecordFormat;

/// Hashes a key. Used to spread line records evenly over the shards.
pub fn ihash(key: &[u8]) -> u32 {
    let mut hasher = fnv::FnvHasher::with_key(0);
    hasher.write(key);
    (hasher.finish() & 0x7fffffff) as u32
}

/// Key of the `line_no`-th line of `file`.
///
/// Shards are cut on the leading base-36 characters of a key, so the key
/// starts with a two-digit base-36 hash of the location.
pub fn line_key(file: &str, line_no: usize) -> String {
    let location = format!("{}:{:08}", file, line_no);
    let bucket = to_base36(u64::from(ihash(location.as_bytes()) % (36 * 36)));
    format!("{:0>2}-{}", bucket, location)
}

/// Reads every file matching `pattern` into a new store.
pub fn load_records(pattern: &str, format: RecordFormat) -> Result<MemoryStore> {
    let store = MemoryStore::new();
    let mut seen = HashSet::new();
    let mut files = 0;

    for entry in glob(pattern).with_context(|| format!("invalid input glob `{pattern}`"))? {
        let path = entry?;
        if !path.is_file() {
            continue;
        }
        files += 1;
        let name = path.display().to_string();
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read input file {}", path.display()))?;
        debug!("loading {}", path.display());

        for (i, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record = match format {
                RecordFormat::Lines => KeyValue::new(line_key(&name, i + 1), line.to_string()),
                RecordFormat::Pairs => {
                    let (key, value) = line.trim().split_once(char::is_whitespace).unwrap_or((line.trim(), ""));
                    if !seen.insert(key.to_string()) {
                        bail!("duplicate input key `{key}` in {}:{}", path.display(), i + 1);
                    }
                    KeyValue::new(key.to_string(), value.trim().to_string())
                }
            };
            store.insert(record)?;
        }
    }

    if files == 0 {
        bail!("no input files match `{pattern}`");
    }
    info!(files, records = store.len(), "loaded input");
    Ok(store)
}

/// Writes every record of `store` to `path`, one `key value` line each, in
/// key order.
pub fn write_output(store: &MemoryStore, path: &Path) -> Result<usize> {
    let records = store.snapshot()?;
    let file = File::create(path)
        .with_context(|| format!("failed to create output file {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for record in &records {
        writeln!(out, "{}", record)?;
    }
    out.flush()?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_keys_start_with_a_base36_bucket() {
        let key = line_key("book.txt", 12);
        assert!(key.ends_with("-book.txt:00000012"));
        let bucket = &key[..2];
        assert!(bucket.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()));
        assert_eq!(key, line_key("book.txt", 12));
    }

    #[test]
    fn loads_pairs_and_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "apple 10\n\nbanana  20\n").unwrap();
        let pattern = format!("{}/*.txt", dir.path().display());

        let store = load_records(&pattern, RecordFormat::Pairs).unwrap();
        let records: Vec<_> = store.snapshot().unwrap().iter().map(|kv| kv.to_string()).collect();
        assert_eq!(records, vec!["apple 10", "banana 20"]);

        fs::write(dir.path().join("b.txt"), "apple 1\n").unwrap();
        assert!(load_records(&pattern, RecordFormat::Pairs).is_err());
    }

    #[test]
    fn empty_glob_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/*.missing", dir.path().display());
        assert!(load_records(&pattern, RecordFormat::Lines).is_err());
    }
}
