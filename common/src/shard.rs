//! Static partitioning of the key space into contiguous shard ranges.
//!
//! The partition does not look at the data. It assumes keys are spread
//! roughly evenly over their leading base-36 characters, which holds for
//! hashed or alphanumeric keys and is a poor fit for anything else.

use std::fmt;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::display_key;

/// Number of shards in the reference partition: one per base-36 digit.
pub const DEFAULT_SHARD_COUNT: usize = 36;

/// Partitions wider than this would need boundaries more than four digits wide.
pub const MAX_SHARD_COUNT: usize = 36 * 36 * 36 * 36;

const SYMBOLS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Inclusive upper bound of a [`ShardRange`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Upper {
    /// Keys up to and including this one.
    Inclusive(Bytes),

    /// Sorts after every possible key. Closes the last shard.
    Unbounded,
}

impl Upper {
    /// Whether `key` is at or below this bound.
    pub fn admits(&self, key: &[u8]) -> bool {
        match self {
            Upper::Inclusive(end) => key <= end.as_ref(),
            Upper::Unbounded => true,
        }
    }
}

impl fmt::Display for Upper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Upper::Inclusive(end) => write!(f, "{:?}", display_key(end)),
            Upper::Unbounded => write!(f, "MAX"),
        }
    }
}

/// A contiguous slice of the key space: `(start, end]`.
///
/// `start` is exclusive so that a shard can resume from the last key it
/// processed without yielding that key again.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShardRange {
    pub start: Bytes,
    pub end: Upper,
}

impl ShardRange {
    pub fn new(start: impl Into<Bytes>, end: Upper) -> Self {
        Self {
            start: start.into(),
            end,
        }
    }

    /// Whether `key` falls inside `(start, end]`.
    pub fn contains(&self, key: &[u8]) -> bool {
        key > self.start.as_ref() && self.end.admits(key)
    }

    /// The remainder of this range after `key` has been processed.
    pub fn resume_after(&self, key: Bytes) -> Self {
        Self {
            start: key,
            end: self.end.clone(),
        }
    }
}

impl fmt::Display for ShardRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?}, {}]", display_key(&self.start), self.end)
    }
}

/// Renders `number` in base 36 using the digits `0-9a-z`.
pub fn to_base36(mut number: u64) -> String {
    if number == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while number > 0 {
        digits.push(SYMBOLS[(number % 36) as usize]);
        number /= 36;
    }
    digits.reverse();
    // SYMBOLS is ASCII.
    String::from_utf8(digits).unwrap_or_default()
}

/// The interior boundary keys of an `n`-way partition, in ascending order.
///
/// Boundaries are fixed-width base-36 strings spread evenly over the
/// `36^width` values of that width. With 36 shards this is exactly the digit
/// symbols `1` through `z`.
pub fn shard_boundaries(shard_count: usize) -> Result<Vec<Bytes>> {
    if shard_count == 0 || shard_count > MAX_SHARD_COUNT {
        return Err(Error::InvalidConfig(format!(
            "shard count must be between 1 and {MAX_SHARD_COUNT}, got {shard_count}"
        )));
    }

    let n = shard_count as u64;
    let mut width = 1;
    while 36u64.pow(width) < n {
        width += 1;
    }
    let span = 36u64.pow(width);

    let boundaries = (1..n)
        .map(|i| {
            let digits = to_base36(i * span / n);
            Bytes::from(format!("{:0>w$}", digits, w = width as usize))
        })
        .collect();
    Ok(boundaries)
}

/// Tiles the whole key space with `shard_count` contiguous ranges.
///
/// The first range starts at the empty key, the last one ends at
/// [`Upper::Unbounded`], and each range starts where the previous one ended.
pub fn compute_shard_ranges(shard_count: usize) -> Result<Vec<ShardRange>> {
    let mut starts = vec![Bytes::new()];
    starts.extend(shard_boundaries(shard_count)?);

    let ends = starts
        .iter()
        .skip(1)
        .cloned()
        .map(Upper::Inclusive)
        .chain(std::iter::once(Upper::Unbounded));

    Ok(starts
        .iter()
        .cloned()
        .zip(ends)
        .map(|(start, end)| ShardRange { start, end })
        .collect())
}
