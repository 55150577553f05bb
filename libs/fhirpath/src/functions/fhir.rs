//! FHIR-specific functions that need no collaborator.

use crate::collection::Collection;
use crate::error::Result;

use super::{boolean, empty, string_arg};

/// Direct `extension` children whose `url` matches.
pub fn extension(input: &Collection, url: &Collection) -> Result<Collection> {
    let Some(url) = string_arg(url, "extension")? else {
        return empty();
    };
    Ok(input
        .iter()
        .flat_map(|node| node.children_named("extension"))
        .filter(|ext| ext.child_string("url").as_deref() == Some(url.as_str()))
        .cloned()
        .collect())
}

/// Whether the input is a single primitive element carrying a value.
pub fn has_value(input: &Collection) -> Result<Collection> {
    boolean(input.len() == 1 && input.first().is_some_and(|n| n.has_value()))
}

pub fn get_value(input: &Collection) -> Result<Collection> {
    match input.first() {
        Some(node) if input.len() == 1 => Ok(node
            .get_value()
            .cloned()
            .map(Collection::from_value)
            .unwrap_or_default()),
        _ => empty(),
    }
}
