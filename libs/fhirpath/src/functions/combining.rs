//! Combining functions.

use std::collections::HashSet;

use crate::collection::Collection;
use crate::error::Result;

/// Set union, first-seen order.
pub fn union(input: &Collection, other: &Collection) -> Result<Collection> {
    let mut seen = HashSet::with_capacity(input.len() + other.len());
    Ok(input
        .iter()
        .chain(other.iter())
        .filter(|node| seen.insert(*node))
        .cloned()
        .collect())
}

/// Concatenation; duplicates are kept.
pub fn combine(input: &Collection, other: &Collection) -> Result<Collection> {
    Ok(input.iter().chain(other.iter()).cloned().collect())
}
