//! Reference resolution hook for `resolve()`
//!
//! `resolve()` handles contained and bundle-local references itself. Literal
//! references to other resources (`Patient/123`,
//! `https://server/fhir/Patient/123/_history/2`) are handed to a
//! [`ReferenceResolver`] when the evaluation options allow it. The default
//! resolver finds nothing, and the caller falls back to a typed placeholder.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Result;
use crate::model::ObjectRef;

/// Trait for custom resource resolution
///
/// Implement this to back `resolve()` with a database or remote server.
/// Returning `Ok(None)` means "not found" and is not an error.
///
/// # Example
///
/// ```rust,ignore
/// struct DatabaseResolver { /* pool, ... */ }
///
/// impl ReferenceResolver for DatabaseResolver {
///     fn resolve(&self, resource_type: &str, id: &str, version: Option<&str>)
///         -> Result<Option<ObjectRef>>
///     {
///         let json = query_database(resource_type, id, version)?;
///         Ok(json.and_then(|j| Object::from_json(&j)).map(Object::into_ref))
///     }
/// }
/// ```
pub trait ReferenceResolver: Send + Sync {
    fn resolve(
        &self,
        resource_type: &str,
        id: &str,
        version: Option<&str>,
    ) -> Result<Option<ObjectRef>>;
}

/// Resolves nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopResolver;

impl ReferenceResolver for NoopResolver {
    fn resolve(&self, _: &str, _: &str, _: Option<&str>) -> Result<Option<ObjectRef>> {
        Ok(None)
    }
}

/// Map-backed resolver keyed by `(type, id)`; versions are ignored.
#[derive(Debug, Default, Clone)]
pub struct InMemoryResolver {
    resources: HashMap<(String, String), ObjectRef>,
}

impl InMemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource under its type name and `id`. Resources without an
    /// id are ignored.
    pub fn with_resource(mut self, resource: ObjectRef) -> Self {
        if let Some(id) = resource.id() {
            self.resources
                .insert((resource.type_name().to_string(), id), resource);
        }
        self
    }
}

impl ReferenceResolver for InMemoryResolver {
    fn resolve(
        &self,
        resource_type: &str,
        id: &str,
        _version: Option<&str>,
    ) -> Result<Option<ObjectRef>> {
        Ok(self
            .resources
            .get(&(resource_type.to_string(), id.to_string()))
            .cloned())
    }
}

/// A literal reference split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReference<'a> {
    pub base_url: Option<&'a str>,
    pub resource_type: &'a str,
    pub id: &'a str,
    pub version: Option<&'a str>,
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?:(?P<base>(?:https?://|urn:)\S*?)/)?(?P<type>[A-Z][A-Za-z]+)/(?P<id>[A-Za-z0-9\-\.]{1,64})(?:/_history/(?P<version>[A-Za-z0-9\-\.]{1,64}))?$",
        )
        .expect("reference pattern is valid")
    })
}

/// Parse `[baseUrl/]Type/id[/_history/version]`.
pub fn parse_reference(reference: &str) -> Option<ParsedReference<'_>> {
    let caps = reference_pattern().captures(reference)?;
    Some(ParsedReference {
        base_url: caps.name("base").map(|m| m.as_str()),
        resource_type: caps.name("type")?.as_str(),
        id: caps.name("id")?.as_str(),
        version: caps.name("version").map(|m| m.as_str()),
    })
}

/// Resource type implied by a reference string, without resolving it.
pub fn extract_type(reference: &str) -> Option<&str> {
    if reference.starts_with('#') {
        return None;
    }
    parse_reference(reference).map(|r| r.resource_type)
}
