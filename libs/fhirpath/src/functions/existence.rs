//! Existence and collection query functions.
//!
//! `exists()` and `all()` take criteria and live in the evaluator.

use std::collections::HashSet;

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::node::Node;

use super::boolean;

pub fn empty(input: &Collection) -> Result<Collection> {
    boolean(input.is_empty())
}

pub fn not(input: &Collection) -> Result<Collection> {
    Ok(match input.as_boolean()? {
        Some(value) => Collection::boolean(!value),
        None => Collection::empty(),
    })
}

/// Boolean of one item; anything else breaks the contract.
fn require_boolean(node: &Node, function: &str) -> Result<bool> {
    node.system_value()
        .and_then(|v| v.as_boolean())
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "{}: expected a collection of booleans, found {}",
                function,
                node.type_()
            ))
        })
}

pub fn all_true(input: &Collection) -> Result<Collection> {
    for node in input {
        if !require_boolean(node, "allTrue")? {
            return boolean(false);
        }
    }
    boolean(true)
}

pub fn any_true(input: &Collection) -> Result<Collection> {
    for node in input {
        if require_boolean(node, "anyTrue")? {
            return boolean(true);
        }
    }
    boolean(false)
}

pub fn all_false(input: &Collection) -> Result<Collection> {
    for node in input {
        if require_boolean(node, "allFalse")? {
            return boolean(false);
        }
    }
    boolean(true)
}

pub fn any_false(input: &Collection) -> Result<Collection> {
    for node in input {
        if !require_boolean(node, "anyFalse")? {
            return boolean(true);
        }
    }
    boolean(false)
}

pub fn count(input: &Collection) -> Result<Collection> {
    let count = i64::try_from(input.len())
        .map_err(|_| Error::EvaluationError("count() overflow".into()))?;
    Ok(Collection::singleton(Node::integer(count)))
}

/// First occurrence of every item, in input order.
pub fn distinct(input: &Collection) -> Result<Collection> {
    let mut seen = HashSet::with_capacity(input.len());
    Ok(input
        .iter()
        .filter(|node| seen.insert(*node))
        .cloned()
        .collect())
}

pub fn is_distinct(input: &Collection) -> Result<Collection> {
    let mut seen = HashSet::with_capacity(input.len());
    for node in input {
        if !seen.insert(node) {
            return boolean(false);
        }
    }
    boolean(true)
}

pub fn subset_of(input: &Collection, other: &Collection) -> Result<Collection> {
    boolean(input.iter().all(|node| other.contains(node)))
}

pub fn superset_of(input: &Collection, other: &Collection) -> Result<Collection> {
    subset_of(other, input)
}
