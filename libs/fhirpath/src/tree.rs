//! Node trees built from host instances
//!
//! Nodes carry no pointer to their parent. Upward navigation goes through the
//! tree's path index instead: every node built here gets a unique path
//! (`Patient.name[0].given[1]`) and the parent is the node at the path minus
//! its last step.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::model::{FhirObject, Object, ObjectRef};
use crate::node::{Node, NodeBuilder};
use crate::types::{FhirPathType, HostClass, ModelCategory};

#[derive(Debug, Clone)]
pub struct FhirPathTree {
    root: Node,
    nodes_by_path: HashMap<Arc<str>, Node>,
}

impl FhirPathTree {
    pub fn from_object(object: ObjectRef) -> Self {
        let mut nodes_by_path = HashMap::new();
        let name = object.type_name().to_string();
        let root = build_node(&object, &name, name.clone(), &mut nodes_by_path);
        Self {
            root,
            nodes_by_path,
        }
    }

    /// Build a tree from FHIR JSON; `None` without a `resourceType`.
    pub fn from_json(value: &Value) -> Option<Self> {
        Object::from_json(value).map(|o| Self::from_object(o.into_ref()))
    }

    pub fn get_root(&self) -> &Node {
        &self.root
    }

    pub fn get_node(&self, path: &str) -> Option<&Node> {
        self.nodes_by_path.get(path)
    }

    /// Whether `node` is this tree's node at its path.
    pub fn contains(&self, node: &Node) -> bool {
        node.path()
            .and_then(|p| self.nodes_by_path.get(p))
            .is_some_and(|n| n.ptr_eq(node))
    }

    pub fn get_parent(&self, node: &Node) -> Option<&Node> {
        if !self.contains(node) {
            return None;
        }
        let path = node.path()?;
        let (parent, _) = path.rsplit_once('.')?;
        self.nodes_by_path.get(parent)
    }

    /// First child of `node`'s parent with the given name.
    pub fn get_sibling(&self, node: &Node, name: &str) -> Option<&Node> {
        self.get_parent(node)?.child(name)
    }

    /// Ancestors from the parent up to the root.
    pub fn ancestors<'a>(&'a self, node: &Node) -> impl Iterator<Item = &'a Node> + 'a {
        std::iter::successors(self.get_parent(node), move |n| self.get_parent(n))
    }

    pub fn len(&self) -> usize {
        self.nodes_by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes_by_path.is_empty()
    }
}

/// Type of a host instance, falling back on its category.
pub fn object_type(object: &dyn FhirObject) -> FhirPathType {
    let category = object.category();
    FhirPathType::type_of(HostClass::Model {
        name: object.type_name(),
        category,
    })
    .unwrap_or(match category {
        ModelCategory::Resource => FhirPathType::DomainResource,
        ModelCategory::BackboneElement => FhirPathType::BackboneElement,
        ModelCategory::Code => FhirPathType::Code,
        ModelCategory::Element => FhirPathType::Element,
    })
}

fn build_node(
    object: &ObjectRef,
    name: &str,
    path: String,
    index: &mut HashMap<Arc<str>, Node>,
) -> Node {
    let type_ = object_type(object.as_ref());
    let children: Vec<Node> = object
        .children()
        .iter()
        .map(|child| {
            let child_path = match child.index {
                Some(i) => format!("{}.{}[{}]", path, child.name, i),
                None => format!("{}.{}", path, child.name),
            };
            build_node(&child.value, &child.name, child_path, index)
        })
        .collect();

    let path: Arc<str> = path.into();
    let node = if object.is_resource() {
        NodeBuilder::resource(type_, Some(Arc::clone(object)))
            .name(name)
            .path(Arc::clone(&path))
            .children(children)
            .build()
    } else {
        let builder = NodeBuilder::element(type_, Some(Arc::clone(object)))
            .name(name)
            .path(Arc::clone(&path))
            .children(children);
        match object.system_value() {
            Some(value) => builder.value(value).build(),
            None => builder.build(),
        }
    };
    index.insert(path, node.clone());
    node
}
