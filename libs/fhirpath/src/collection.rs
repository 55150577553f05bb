//! Node collections
//!
//! Every FHIRPath expression evaluates to a [`Collection`]. Collections
//! produced by `children()`/`descendants()` are marked unordered; functions
//! that depend on position reject them.

use std::hash::{Hash, Hasher};

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::node::Node;
use crate::value::SystemValue;

#[derive(Debug, Clone)]
pub struct Collection {
    items: SmallVec<[Node; 4]>,
    ordered: bool,
}

impl Collection {
    pub fn empty() -> Self {
        Self {
            items: SmallVec::new(),
            ordered: true,
        }
    }

    pub fn singleton(node: Node) -> Self {
        let mut items = SmallVec::new();
        items.push(node);
        Self {
            items,
            ordered: true,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: SmallVec::with_capacity(capacity),
            ordered: true,
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self::singleton(Node::boolean(value))
    }

    pub fn from_value(value: SystemValue) -> Self {
        Self::singleton(Node::value(value))
    }

    pub fn push(&mut self, node: Node) {
        self.items.push(node);
    }

    pub fn extend<I: IntoIterator<Item = Node>>(&mut self, nodes: I) {
        self.items.extend(nodes);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&Node> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&Node> {
        self.items.last()
    }

    pub fn get(&self, index: usize) -> Option<&Node> {
        self.items.get(index)
    }

    pub fn as_slice(&self) -> &[Node] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Node> {
        self.items.into_vec()
    }

    /// Mark as having no defined order.
    pub fn unordered(mut self) -> Self {
        self.ordered = false;
        self
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    /// Fail unless the collection has a defined order.
    pub fn require_ordered(&self, function: &str) -> Result<()> {
        if self.ordered {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "{}: input collection is unordered",
                function
            )))
        }
    }

    /// The single item, `None` when empty, an error when there are more.
    pub fn singleton_item(&self, function: &str) -> Result<Option<&Node>> {
        match self.items.len() {
            0 => Ok(None),
            1 => Ok(self.items.first()),
            n => Err(Error::not_singleton(function, n)),
        }
    }

    /// Singleton evaluation of collections: a lone boolean is itself, any
    /// other lone item is `true`, empty is `None`.
    pub fn as_boolean(&self) -> Result<Option<bool>> {
        match self.singleton_item("boolean evaluation")? {
            None => Ok(None),
            Some(node) => Ok(Some(
                node.system_value()
                    .and_then(|v| v.as_boolean())
                    .unwrap_or(true),
            )),
        }
    }

    /// The System value of a singleton, if it has one.
    pub fn singleton_value(&self, function: &str) -> Result<Option<SystemValue>> {
        Ok(self.singleton_item(function)?.and_then(Node::system_value))
    }

    pub fn contains(&self, node: &Node) -> bool {
        self.items.iter().any(|n| n == node)
    }
}

impl Default for Collection {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl Eq for Collection {}

impl Hash for Collection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.items.len().hash(state);
        for item in &self.items {
            item.hash(state);
        }
    }
}

impl FromIterator<Node> for Collection {
    fn from_iter<I: IntoIterator<Item = Node>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
            ordered: true,
        }
    }
}

impl IntoIterator for Collection {
    type Item = Node;
    type IntoIter = smallvec::IntoIter<[Node; 4]>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl From<Vec<Node>> for Collection {
    fn from(nodes: Vec<Node>) -> Self {
        nodes.into_iter().collect()
    }
}
