//! Nodes: the values FHIRPath expressions operate on
//!
//! A [`Node`] is one tree position or one computed value. Its [`NodeKind`] is a
//! closed sum over element, resource, System value, type-info and the
//! terminology-service sentinel. Nodes are immutable and cheap to clone.
//!
//! How a node's value is obtained is exactly one of: it has children, it holds
//! a System value (a primitive element), or it is a System value itself.
//! [`NodeBuilder`] enforces this statically: only structural builders accept
//! children or a held value.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::model::ObjectRef;
use crate::types::{FhirPathType, TypeNamespace};
use crate::value::{QuantityValue, SystemValue};

/// Reflective type descriptor produced by `type()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeInfo {
    Simple {
        namespace: TypeNamespace,
        name: String,
        base_type: Option<String>,
    },
    Class {
        namespace: TypeNamespace,
        name: String,
        base_type: Option<String>,
        elements: Vec<TypeInfoElement>,
    },
    List {
        element_type: String,
    },
    Tuple {
        elements: Vec<TypeInfoElement>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeInfoElement {
    pub name: String,
    pub type_: String,
    pub is_one_based: bool,
}

impl TypeInfo {
    pub fn simple(ty: FhirPathType) -> Self {
        TypeInfo::Simple {
            namespace: ty.namespace(),
            name: ty.name().to_string(),
            base_type: ty.base_type().map(FhirPathType::qualified_name),
        }
    }

    pub fn class(ty: FhirPathType) -> Self {
        TypeInfo::Class {
            namespace: ty.namespace(),
            name: ty.name().to_string(),
            base_type: ty.base_type().map(FhirPathType::qualified_name),
            elements: Vec::new(),
        }
    }

    pub fn type_(&self) -> FhirPathType {
        match self {
            TypeInfo::Simple { .. } => FhirPathType::SimpleTypeInfo,
            TypeInfo::Class { .. } => FhirPathType::ClassInfo,
            TypeInfo::List { .. } => FhirPathType::ListTypeInfo,
            TypeInfo::Tuple { .. } => FhirPathType::TupleTypeInfo,
        }
    }

    fn child_nodes(&self) -> Vec<Node> {
        fn string(name: &str, value: &str) -> Node {
            Node::named_value(name, SystemValue::string(value))
        }
        let mut children = Vec::new();
        match self {
            TypeInfo::Simple {
                namespace,
                name,
                base_type,
            }
            | TypeInfo::Class {
                namespace,
                name,
                base_type,
                ..
            } => {
                children.push(string("namespace", namespace.as_str()));
                children.push(string("name", name));
                if let Some(base) = base_type {
                    children.push(string("baseType", base));
                }
            }
            TypeInfo::List { element_type } => children.push(string("elementType", element_type)),
            TypeInfo::Tuple { .. } => {}
        }

        let (elements, element_type) = match self {
            TypeInfo::Class { elements, .. } => (elements.as_slice(), FhirPathType::ClassInfoElement),
            TypeInfo::Tuple { elements } => (elements.as_slice(), FhirPathType::TupleTypeInfoElement),
            _ => (&[][..], FhirPathType::ClassInfoElement),
        };
        for element in elements {
            children.push(
                NodeBuilder::element(element_type, None)
                    .name("element")
                    .child(string("name", &element.name))
                    .child(string("type", &element.type_))
                    .child(Node::named_value(
                        "isOneBased",
                        SystemValue::boolean(element.is_one_based),
                    ))
                    .build(),
            );
        }
        children
    }
}

/// What a node wraps.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// A data-model element; `None` for synthetic elements.
    Element(Option<ObjectRef>),
    /// A resource; `None` is a typed placeholder for an unresolved reference target.
    Resource(Option<ObjectRef>),
    SystemValue(SystemValue),
    TypeInfo(TypeInfo),
    TermService,
}

#[derive(Debug)]
struct NodeInner {
    name: Option<Arc<str>>,
    path: Option<Arc<str>>,
    type_: FhirPathType,
    value: Option<SystemValue>,
    children: Vec<Node>,
    kind: NodeKind,
}

/// An immutable FHIRPath node.
#[derive(Clone)]
pub struct Node(Arc<NodeInner>);

impl Node {
    /// A System value node.
    pub fn value(value: SystemValue) -> Node {
        NodeBuilder::system_value(value).build()
    }

    pub fn named_value(name: &str, value: SystemValue) -> Node {
        NodeBuilder::system_value(value).name(name).build()
    }

    pub fn boolean(value: bool) -> Node {
        Node::value(SystemValue::boolean(value))
    }

    pub fn string(value: impl Into<Arc<str>>) -> Node {
        Node::value(SystemValue::string(value))
    }

    pub fn integer(value: i64) -> Node {
        Node::value(SystemValue::integer(value))
    }

    pub fn decimal(value: Decimal) -> Node {
        Node::value(SystemValue::decimal(value))
    }

    pub fn type_info(info: TypeInfo) -> Node {
        NodeBuilder::type_info(info).build()
    }

    /// The `%terminologies` sentinel.
    pub fn term_service() -> Node {
        static TERM_SERVICE: OnceLock<Node> = OnceLock::new();
        TERM_SERVICE
            .get_or_init(|| {
                Node(Arc::new(NodeInner {
                    name: Some("terminologies".into()),
                    path: None,
                    type_: FhirPathType::TermService,
                    value: None,
                    children: Vec::new(),
                    kind: NodeKind::TermService,
                }))
            })
            .clone()
    }

    /// A resource placeholder of a known type, with no instance behind it.
    pub fn resource_placeholder(type_: FhirPathType) -> Node {
        NodeBuilder::resource(type_, None).name(type_.name()).build()
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.0.path.as_deref()
    }

    pub fn type_(&self) -> FhirPathType {
        self.0.type_
    }

    /// Most specific type name, preferring the host's own name.
    pub fn type_name(&self) -> &str {
        match self.object() {
            Some(object) => object.type_name(),
            None => self.0.type_.name(),
        }
    }

    pub fn kind(&self) -> &NodeKind {
        &self.0.kind
    }

    pub fn object(&self) -> Option<&ObjectRef> {
        match &self.0.kind {
            NodeKind::Element(object) | NodeKind::Resource(object) => object.as_ref(),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.0.kind, NodeKind::Element(_))
    }

    pub fn is_resource(&self) -> bool {
        matches!(self.0.kind, NodeKind::Resource(_))
    }

    /// Element or resource.
    pub fn is_structural(&self) -> bool {
        self.is_element() || self.is_resource()
    }

    pub fn is_system_value(&self) -> bool {
        matches!(self.0.kind, NodeKind::SystemValue(_))
    }

    pub fn is_type_info(&self) -> bool {
        matches!(self.0.kind, NodeKind::TypeInfo(_))
    }

    pub fn is_term_service(&self) -> bool {
        matches!(self.0.kind, NodeKind::TermService)
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn children(&self) -> &[Node] {
        &self.0.children
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.0
            .children
            .iter()
            .filter(move |c| c.name() == Some(name))
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.0.children.iter().find(|c| c.name() == Some(name))
    }

    /// String value of a named child (`reference`, `url`, `id`, ...).
    pub fn child_string(&self, name: &str) -> Option<String> {
        self.child(name)
            .and_then(Node::system_value)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// All nodes strictly below this one, pre-order.
    pub fn descendants(&self) -> Vec<Node> {
        fn walk(node: &Node, out: &mut Vec<Node>) {
            for child in node.children() {
                out.push(child.clone());
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }

    /// Whether this node holds a System value as its child value. A System
    /// value node is the value itself and does not hold one.
    pub fn has_value(&self) -> bool {
        self.0.value.is_some()
    }

    pub fn get_value(&self) -> Option<&SystemValue> {
        self.0.value.as_ref()
    }

    /// The primitive this node stands for, if any: its own value, its held
    /// value, or the quantity assembled from a quantity element.
    pub fn system_value(&self) -> Option<SystemValue> {
        match &self.0.kind {
            NodeKind::SystemValue(v) => Some(v.clone()),
            _ if self.0.value.is_some() => self.0.value.clone(),
            NodeKind::Element(_) => self.quantity_value().map(SystemValue::Quantity),
            _ => None,
        }
    }

    /// Quantity view of a quantity-typed element.
    pub fn quantity_value(&self) -> Option<QuantityValue> {
        if !self.is_element() || !self.0.type_.is_quantity_type() {
            return None;
        }
        let value = self.child("value")?.system_value()?.as_decimal()?;
        Some(QuantityValue {
            value,
            unit: self.child_string("unit").map(Into::into),
            system: self.child_string("system").map(Into::into),
            code: self.child_string("code").map(Into::into),
        })
    }

    pub fn is_comparable_to(&self, other: &Node) -> bool {
        match (self.system_value(), other.system_value()) {
            (Some(a), Some(b)) => a.is_comparable_to(&b),
            (None, None) => {
                self.is_structural() && other.is_structural() && self.type_() == other.type_()
            }
            _ => false,
        }
    }

    /// Order two comparable nodes. Structural nodes are only ever equal or
    /// undecided.
    pub fn compare_to(&self, other: &Node) -> Result<Option<Ordering>> {
        if !self.is_comparable_to(other) {
            return Err(Error::InvalidArgument(format!(
                "Node of type {} is not comparable to node of type {}",
                self.type_(),
                other.type_()
            )));
        }
        match (self.system_value(), other.system_value()) {
            (Some(a), Some(b)) => a.compare_to(&b),
            _ => Ok((self == other).then_some(Ordering::Equal)),
        }
    }

    /// Copy under a new name.
    pub fn with_name(&self, name: &str) -> Node {
        let inner = &self.0;
        Node(Arc::new(NodeInner {
            name: Some(name.into()),
            path: inner.path.clone(),
            type_: inner.type_,
            value: inner.value.clone(),
            children: inner.children.clone(),
            kind: inner.kind.clone(),
        }))
    }

    fn structurally_equal(&self, other: &Node) -> bool {
        self.0.type_ == other.0.type_
            && self.0.value == other.0.value
            && self.0.children.len() == other.0.children.len()
            && self
                .0
                .children
                .iter()
                .zip(other.0.children.iter())
                .all(|(a, b)| a.name() == b.name() && a == b)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (&self.0.kind, &other.0.kind) {
            (NodeKind::SystemValue(_), _) | (_, NodeKind::SystemValue(_)) => {
                match (self.system_value(), other.system_value()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            (NodeKind::TypeInfo(a), NodeKind::TypeInfo(b)) => a == b,
            (NodeKind::TermService, NodeKind::TermService) => true,
            (
                NodeKind::Element(_) | NodeKind::Resource(_),
                NodeKind::Element(_) | NodeKind::Resource(_),
            ) => self.structurally_equal(other),
            _ => false,
        }
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0.kind {
            NodeKind::TypeInfo(info) => info.hash(state),
            NodeKind::TermService => "%terminologies".hash(state),
            _ => match self.system_value() {
                Some(value) => value.hash(state),
                None => {
                    self.0.type_.hash(state);
                    self.0.children.len().hash(state);
                }
            },
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.0.kind {
            NodeKind::Element(_) => "Element",
            NodeKind::Resource(_) => "Resource",
            NodeKind::SystemValue(_) => "SystemValue",
            NodeKind::TypeInfo(_) => "TypeInfo",
            NodeKind::TermService => "TermService",
        };
        let mut s = f.debug_struct(kind);
        if let Some(name) = self.name() {
            s.field("name", &name);
        }
        if let Some(path) = self.path() {
            s.field("path", &path);
        }
        s.field("type", &self.0.type_.qualified_name());
        if let Some(value) = self.system_value() {
            s.field("value", &value.to_fhirpath_string());
        }
        if !self.0.children.is_empty() {
            s.field("children", &self.0.children.len());
        }
        s.finish()
    }
}

/// Builder state for element and resource nodes.
#[derive(Debug)]
pub struct Structural;

/// Builder state for System value and type-info nodes.
#[derive(Debug)]
pub struct Terminal;

/// Builds a [`Node`]. Children and held values can only be set on
/// `NodeBuilder<Structural>`.
#[derive(Debug)]
pub struct NodeBuilder<S> {
    name: Option<Arc<str>>,
    path: Option<Arc<str>>,
    type_: FhirPathType,
    value: Option<SystemValue>,
    children: Vec<Node>,
    kind: NodeKind,
    state: PhantomData<S>,
}

impl NodeBuilder<Structural> {
    pub fn element(type_: FhirPathType, object: Option<ObjectRef>) -> Self {
        Self::with_kind(type_, NodeKind::Element(object))
    }

    pub fn resource(type_: FhirPathType, object: Option<ObjectRef>) -> Self {
        Self::with_kind(type_, NodeKind::Resource(object))
    }

    /// Held System value of a primitive element.
    pub fn value(mut self, value: SystemValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn children<I: IntoIterator<Item = Node>>(mut self, children: I) -> Self {
        self.children.extend(children);
        self
    }
}

impl NodeBuilder<Terminal> {
    pub fn system_value(value: SystemValue) -> Self {
        Self::with_kind(value.type_(), NodeKind::SystemValue(value))
    }

    pub fn type_info(info: TypeInfo) -> Self {
        let mut builder = Self::with_kind(info.type_(), NodeKind::TypeInfo(info.clone()));
        builder.children = info.child_nodes();
        builder
    }
}

impl<S> NodeBuilder<S> {
    fn with_kind(type_: FhirPathType, kind: NodeKind) -> Self {
        Self {
            name: None,
            path: None,
            type_,
            value: None,
            children: Vec::new(),
            kind,
            state: PhantomData,
        }
    }

    pub fn name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn path(mut self, path: impl Into<Arc<str>>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn build(self) -> Node {
        Node(Arc::new(NodeInner {
            name: self.name,
            path: self.path,
            type_: self.type_,
            value: self.value,
            children: self.children,
            kind: self.kind,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_element(name: &str, value: &str) -> Node {
        NodeBuilder::element(FhirPathType::FhirString, None)
            .name(name)
            .value(SystemValue::string(value))
            .build()
    }

    #[test]
    fn test_held_value_round_trip() {
        let node = string_element("family", "Chalmers");
        assert!(node.has_value());
        assert_eq!(node.get_value(), Some(&SystemValue::string("Chalmers")));
        assert!(node.children().is_empty());
    }

    #[test]
    fn test_system_value_node_has_no_children_or_held_value() {
        let node = Node::integer(3);
        assert!(!node.has_value());
        assert!(node.children().is_empty());
        assert!(node.descendants().is_empty());
        assert_eq!(node.system_value(), Some(SystemValue::integer(3)));
        assert_eq!(node.type_(), FhirPathType::SystemInteger);
    }

    #[test]
    fn test_value_equality_crosses_node_kinds() {
        assert_eq!(string_element("given", "Jim"), Node::string("Jim"));
        assert_ne!(string_element("given", "Jim"), Node::string("Peter"));
        assert_eq!(Node::integer(1), Node::decimal(Decimal::ONE));
    }

    #[test]
    fn test_structural_equality_ignores_own_name_and_path() {
        let build = |path: &str| {
            NodeBuilder::element(FhirPathType::HumanName, None)
                .name("name")
                .path(path)
                .child(string_element("family", "Chalmers"))
                .build()
        };
        let a = build("Patient.name[0]");
        let b = build("Patient.name[1]");
        assert_eq!(a, b);
        assert_eq!(a.compare_to(&b).unwrap(), Some(Ordering::Equal));

        let c = NodeBuilder::element(FhirPathType::HumanName, None)
            .child(string_element("family", "Windsor"))
            .build();
        assert_ne!(a, c);
        assert_eq!(a.compare_to(&c).unwrap(), None);
    }

    #[test]
    fn test_descendants_are_pre_order() {
        let tree = NodeBuilder::element(FhirPathType::HumanName, None)
            .child(
                NodeBuilder::element(FhirPathType::Period, None)
                    .name("period")
                    .child(string_element("start", "2020"))
                    .build(),
            )
            .child(string_element("family", "x"))
            .build();
        let names: Vec<_> = tree
            .descendants()
            .iter()
            .map(|n| n.name().unwrap_or_default().to_string())
            .collect();
        assert_eq!(names, vec!["period", "start", "family"]);
    }

    #[test]
    fn test_child_lookup_by_owned_name() {
        fn first_present<'a>(node: &'a Node, names: &[String]) -> Option<&'a Node> {
            names.iter().find_map(|name| node.child(name))
        }
        let name = NodeBuilder::element(FhirPathType::HumanName, None)
            .child(string_element("family", "Chalmers"))
            .child(string_element("text", "Peter Chalmers"))
            .build();
        let names = vec!["prefix".to_string(), format!("fam{}", "ily"), "text".to_string()];

        let found = first_present(&name, &names);
        drop(names);
        assert_eq!(found.and_then(Node::name), Some("family"));
        assert_eq!(name.child_string(&String::from("text")).as_deref(), Some("Peter Chalmers"));
        assert!(name.child("given").is_none());
    }

    #[test]
    fn test_quantity_element_comparability() {
        let quantity = |value: i64, unit: &str| {
            NodeBuilder::element(FhirPathType::Age, None)
                .child(Node::named_value("value", SystemValue::integer(value)))
                .child(Node::named_value("unit", SystemValue::string(unit)))
                .build()
        };
        let a = quantity(5, "a");
        let b = quantity(7, "a");
        let c = quantity(7, "mo");
        assert!(a.is_comparable_to(&b));
        assert_eq!(a.compare_to(&b).unwrap(), Some(Ordering::Less));
        assert!(!a.is_comparable_to(&c));
        assert!(matches!(a.compare_to(&c), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_type_info_children() {
        let node = Node::type_info(TypeInfo::class(FhirPathType::Patient));
        assert_eq!(node.type_(), FhirPathType::ClassInfo);
        assert_eq!(node.child_string("namespace").as_deref(), Some("FHIR"));
        assert_eq!(node.child_string("name").as_deref(), Some("Patient"));
        assert_eq!(node.child_string("baseType").as_deref(), Some("FHIR.DomainResource"));
    }

    #[test]
    fn test_term_service_is_a_singleton() {
        assert!(Node::term_service().ptr_eq(&Node::term_service()));
        assert!(Node::term_service().is_term_service());
    }
}
