//! Host data-model capability
//!
//! The evaluator never sees concrete resource classes. It needs a narrow view
//! of each instance: its most specific type name, its broad category, its named
//! children, and a System primitive when the instance is a primitive. Hosts
//! implement [`FhirObject`] over their own model; [`Object`] is a generic
//! implementation used for results built at evaluation time and for JSON.

use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::temporal_parse::{parse_date_value, parse_datetime_value, parse_time_value};
use crate::types::ModelCategory;
use crate::value::SystemValue;

/// Shared handle to a host instance.
pub type ObjectRef = Arc<dyn FhirObject>;

/// One named child of a host instance. `index` is set for members of a
/// repeating field.
#[derive(Debug, Clone)]
pub struct ObjectChild {
    pub name: Arc<str>,
    pub index: Option<usize>,
    pub value: ObjectRef,
}

/// Read-only view of a resource or element instance.
pub trait FhirObject: fmt::Debug + Send + Sync {
    /// Most specific type name (`Patient`, `HumanName`, `string`, ...).
    fn type_name(&self) -> &str;

    fn category(&self) -> ModelCategory;

    /// Named children in declaration order.
    fn children(&self) -> Vec<ObjectChild>;

    /// The System primitive carried by a primitive element.
    fn system_value(&self) -> Option<SystemValue>;

    fn is_resource(&self) -> bool {
        self.category() == ModelCategory::Resource
    }

    /// `id` child rendered as a string.
    fn id(&self) -> Option<String> {
        self.children()
            .into_iter()
            .find(|c| &*c.name == "id")
            .and_then(|c| c.value.system_value())
            .and_then(|v| v.as_str().map(str::to_string))
    }
}

/// Generic instance: a type name, a category, an optional primitive and
/// children.
#[derive(Debug, Clone)]
pub struct Object {
    type_name: Arc<str>,
    category: ModelCategory,
    value: Option<SystemValue>,
    children: Vec<ObjectChild>,
}

impl Object {
    pub fn resource(type_name: &str) -> Self {
        Self::new(type_name, ModelCategory::Resource)
    }

    pub fn element(type_name: &str) -> Self {
        Self::new(type_name, ModelCategory::Element)
    }

    /// An anonymous backbone element (`Bundle.entry`, `Patient.contact`).
    pub fn backbone(type_name: &str) -> Self {
        Self::new(type_name, ModelCategory::BackboneElement)
    }

    /// A primitive element such as `string` or `dateTime`.
    pub fn primitive(type_name: &str, value: SystemValue) -> Self {
        Self {
            value: Some(value),
            ..Self::primitive_without_value(type_name)
        }
    }

    /// A primitive element carrying only an `id` or extensions.
    pub fn primitive_without_value(type_name: &str) -> Self {
        let category = if type_name == "code" {
            ModelCategory::Code
        } else {
            ModelCategory::Element
        };
        Self::new(type_name, category)
    }

    fn new(type_name: &str, category: ModelCategory) -> Self {
        Self {
            type_name: type_name.into(),
            category,
            value: None,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, name: &str, child: Object) -> Self {
        self.children.push(ObjectChild {
            name: name.into(),
            index: None,
            value: child.into_ref(),
        });
        self
    }

    pub fn with_children<I>(mut self, name: &str, children: I) -> Self
    where
        I: IntoIterator<Item = Object>,
    {
        let name: Arc<str> = name.into();
        for (index, child) in children.into_iter().enumerate() {
            self.children.push(ObjectChild {
                name: Arc::clone(&name),
                index: Some(index),
                value: child.into_ref(),
            });
        }
        self
    }

    /// Shorthand for a `string` child.
    pub fn with_string(self, name: &str, value: &str) -> Self {
        self.with_child(name, Object::primitive("string", SystemValue::string(value)))
    }

    pub fn into_ref(self) -> ObjectRef {
        Arc::new(self)
    }

    /// Build an instance tree from FHIR JSON.
    ///
    /// Without a schema, element types come from `resourceType`, choice-type
    /// suffixes (`valueQuantity`) and a table of well-known field names.
    /// Anything else is a `BackboneElement`; string primitives default to
    /// `string`. A `_field` sibling contributes `id` and extensions to the
    /// primitive it annotates, and stands in for the primitive when the value
    /// itself is absent.
    pub fn from_json(value: &Value) -> Option<Object> {
        let object = value.as_object()?;
        let resource_type = object.get("resourceType")?.as_str()?;
        Some(json_object(Object::resource(resource_type), object))
    }
}

impl FhirObject for Object {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn category(&self) -> ModelCategory {
        self.category
    }

    fn children(&self) -> Vec<ObjectChild> {
        self.children.clone()
    }

    fn system_value(&self) -> Option<SystemValue> {
        self.value.clone()
    }
}

/// Element types of well-known fields.
static FIELD_TYPES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "id" => "id",
    "url" => "uri",
    "system" => "uri",
    "fullUrl" => "uri",
    "profile" => "canonical",
    "status" => "code",
    "gender" => "code",
    "use" => "code",
    "language" => "code",
    "unit" => "string",
    "comparator" => "code",
    "birthDate" => "date",
    "deceasedDateTime" => "dateTime",
    "effectiveDateTime" => "dateTime",
    "issued" => "instant",
    "lastUpdated" => "instant",
    "start" => "dateTime",
    "end" => "dateTime",
    "active" => "boolean",
    "meta" => "Meta",
    "text" => "Narrative",
    "extension" => "Extension",
    "modifierExtension" => "Extension",
    "identifier" => "Identifier",
    "name" => "HumanName",
    "telecom" => "ContactPoint",
    "address" => "Address",
    "coding" => "Coding",
    "code" => "CodeableConcept",
    "category" => "CodeableConcept",
    "maritalStatus" => "CodeableConcept",
    "bodySite" => "CodeableConcept",
    "period" => "Period",
    "subject" => "Reference",
    "patient" => "Reference",
    "performer" => "Reference",
    "encounter" => "Reference",
    "managingOrganization" => "Reference",
    "generalPractitioner" => "Reference",
    "dosageInstruction" => "Dosage",
};

fn json_object(mut target: Object, object: &serde_json::Map<String, Value>) -> Object {
    for (key, value) in object {
        if key == "resourceType" {
            continue;
        }
        if let Some(field) = key.strip_prefix('_') {
            if !object.contains_key(field) {
                target = with_field(target, field, &Value::Null, Some(value));
            }
            continue;
        }
        let meta = object.get(&format!("_{}", key));
        target = with_field(target, key, value, meta);
    }
    target
}

/// Add `field` to `target`. `meta` is the `_field` sibling holding the `id`
/// and extensions of primitive values, index-aligned for repeating fields.
fn with_field(target: Object, field: &str, value: &Value, meta: Option<&Value>) -> Object {
    match (value, meta) {
        (Value::Array(items), _) => {
            let children: Vec<Object> = items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| json_value(field, item, meta.and_then(|m| m.get(i))))
                .collect();
            target.with_children(field, children)
        }
        (Value::Null, Some(Value::Array(metas))) => {
            let children: Vec<Object> = metas
                .iter()
                .filter_map(|m| json_value(field, &Value::Null, Some(m)))
                .collect();
            target.with_children(field, children)
        }
        (other, _) => match json_value(field, other, meta) {
            Some(child) => target.with_child(field, child),
            None => target,
        },
    }
}

fn json_value(field: &str, value: &Value, meta: Option<&Value>) -> Option<Object> {
    let meta = meta.and_then(Value::as_object);
    let primitive = match value {
        Value::Array(_) => return None,
        Value::Null => Object::primitive_without_value(primitive_type_name(field)),
        Value::Object(map) => {
            if let Some(rt) = map.get("resourceType").and_then(Value::as_str) {
                return Some(json_object(Object::resource(rt), map));
            }
            let type_name = element_type_name(field, map);
            let target = match type_name {
                Some(t) => Object::element(t),
                None => Object::backbone("BackboneElement"),
            };
            return Some(json_object(target, map));
        }
        Value::Bool(b) => Object::primitive("boolean", SystemValue::boolean(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Object::primitive("integer", SystemValue::integer(i))
            } else {
                let d: Decimal = n.to_string().parse().ok()?;
                Object::primitive("decimal", SystemValue::decimal(d))
            }
        }
        Value::String(s) => {
            let type_name = primitive_type_name(field);
            let parsed = match type_name {
                "date" => parse_date_value(s),
                "dateTime" | "instant" => parse_datetime_value(s),
                "time" => parse_time_value(s),
                _ => None,
            };
            let value = parsed.unwrap_or_else(|| SystemValue::string(s.as_str()));
            Object::primitive(type_name, value)
        }
    };
    match meta {
        Some(meta) => Some(json_object(primitive, meta)),
        None if value.is_null() => None,
        None => Some(primitive),
    }
}

fn element_type_name(
    field: &str,
    map: &serde_json::Map<String, Value>,
) -> Option<&'static str> {
    if let Some(t) = choice_suffix(field).and_then(complex_type_name) {
        return Some(t);
    }
    if let Some(t) = FIELD_TYPES
        .get(field)
        .copied()
        .filter(|t| t.starts_with(|c: char| c.is_ascii_uppercase()))
    {
        return Some(t);
    }
    if map.contains_key("reference") {
        return Some("Reference");
    }
    if map.contains_key("value") && (map.contains_key("unit") || map.contains_key("code")) {
        return Some("Quantity");
    }
    None
}

fn primitive_type_name(field: &str) -> &'static str {
    if let Some(t) = choice_suffix(field).and_then(primitive_choice) {
        return t;
    }
    if field == "code" {
        return "code";
    }
    FIELD_TYPES
        .get(field)
        .copied()
        .filter(|t| t.starts_with(|c: char| c.is_ascii_lowercase()))
        .unwrap_or("string")
}

fn choice_suffix(field: &str) -> Option<&str> {
    let suffix = field.strip_prefix("value")?;
    suffix.starts_with(|c: char| c.is_ascii_uppercase()).then_some(suffix)
}

fn complex_type_name(suffix: &str) -> Option<&'static str> {
    crate::types::FhirPathType::from_namespace_name(crate::types::TypeNamespace::Fhir, suffix)
        .map(|t| t.name())
}

fn primitive_choice(suffix: &str) -> Option<&'static str> {
    let mut chars = suffix.chars();
    let first = chars.next()?.to_ascii_lowercase();
    let name = format!("{}{}", first, chars.as_str());
    crate::types::FhirPathType::from_namespace_name(crate::types::TypeNamespace::Fhir, &name)
        .filter(|t| t.is_primitive_type())
        .map(|t| t.name())
}
