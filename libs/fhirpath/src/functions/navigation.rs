//! Tree navigation functions. Results have no defined order.

use crate::collection::Collection;
use crate::error::Result;

pub fn children(input: &Collection) -> Result<Collection> {
    let collected: Collection = input
        .iter()
        .flat_map(|node| node.children().iter().cloned())
        .collect();
    Ok(collected.unordered())
}

pub fn descendants(input: &Collection) -> Result<Collection> {
    let collected: Collection = input.iter().flat_map(|node| node.descendants()).collect();
    Ok(collected.unordered())
}
