//! Subsetting functions.

use crate::collection::Collection;
use crate::error::Result;

use super::{empty, integer_arg};

pub fn single(input: &Collection) -> Result<Collection> {
    Ok(input
        .singleton_item("single")?
        .cloned()
        .map(Collection::singleton)
        .unwrap_or_default())
}

pub fn first(input: &Collection) -> Result<Collection> {
    input.require_ordered("first")?;
    Ok(input.first().cloned().map(Collection::singleton).unwrap_or_default())
}

pub fn last(input: &Collection) -> Result<Collection> {
    input.require_ordered("last")?;
    Ok(input.last().cloned().map(Collection::singleton).unwrap_or_default())
}

pub fn tail(input: &Collection) -> Result<Collection> {
    input.require_ordered("tail")?;
    Ok(input.iter().skip(1).cloned().collect())
}

pub fn skip(input: &Collection, num: &Collection) -> Result<Collection> {
    input.require_ordered("skip")?;
    let Some(num) = integer_arg(num, "skip")? else {
        return empty();
    };
    let n = usize::try_from(num).unwrap_or(0);
    Ok(input.iter().skip(n).cloned().collect())
}

pub fn take(input: &Collection, num: &Collection) -> Result<Collection> {
    input.require_ordered("take")?;
    let Some(num) = integer_arg(num, "take")? else {
        return empty();
    };
    let n = usize::try_from(num).unwrap_or(0);
    Ok(input.iter().take(n).cloned().collect())
}

/// Items present in both, without duplicates.
pub fn intersect(input: &Collection, other: &Collection) -> Result<Collection> {
    let mut result = Collection::empty();
    for node in input {
        if other.contains(node) && !result.contains(node) {
            result.push(node.clone());
        }
    }
    Ok(result)
}

/// Items of `input` not in `other`; duplicates are kept.
pub fn exclude(input: &Collection, other: &Collection) -> Result<Collection> {
    Ok(input.iter().filter(|n| !other.contains(n)).cloned().collect())
}
