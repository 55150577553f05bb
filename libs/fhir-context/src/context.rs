//! Canonical resource lookup
//!
//! [`FhirContext`] needs only one primitive, `get_resource_by_url`; the typed
//! accessors deserialize on top of it. [`InMemoryContext`] is a map-backed
//! implementation for embedding and tests.

use crate::error::{Error, Result};
use ferrum_models::{
    split_canonical, CodeSystem, ConceptMap, StructureDefinition, ValueSet,
};
use lru::LruCache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Registry of canonical conformance and terminology resources.
///
/// Canonicals may carry a version suffix (`url|version`); the typed accessors
/// split it before calling [`FhirContext::get_resource_by_url`].
pub trait FhirContext: Send + Sync {
    /// Raw JSON of the resource with this canonical url, if known.
    fn get_resource_by_url(
        &self,
        canonical_url: &str,
        version: Option<&str>,
    ) -> Result<Option<Arc<Value>>>;

    fn get_structure_definition(
        &self,
        canonical_url: &str,
    ) -> Result<Option<Arc<StructureDefinition>>> {
        load_typed(self, canonical_url, "StructureDefinition")
    }

    fn get_value_set(&self, canonical_url: &str) -> Result<Option<Arc<ValueSet>>> {
        load_typed(self, canonical_url, "ValueSet")
    }

    fn get_code_system(&self, canonical_url: &str) -> Result<Option<Arc<CodeSystem>>> {
        load_typed(self, canonical_url, "CodeSystem")
    }

    fn get_concept_map(&self, canonical_url: &str) -> Result<Option<Arc<ConceptMap>>> {
        load_typed(self, canonical_url, "ConceptMap")
    }
}

fn load_typed<C, T>(context: &C, canonical: &str, expected: &str) -> Result<Option<Arc<T>>>
where
    C: FhirContext + ?Sized,
    T: DeserializeOwned,
{
    let (url, version) = split_canonical(canonical);
    let Some(raw) = context.get_resource_by_url(url, version)? else {
        return Ok(None);
    };

    let actual = raw
        .get("resourceType")
        .and_then(Value::as_str)
        .unwrap_or(expected);
    if actual != expected {
        return Err(Error::ResourceTypeMismatch {
            url: url.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }

    let typed = T::deserialize(raw.as_ref()).map_err(|e| Error::InvalidResource {
        resource_type: expected.to_string(),
        url: url.to_string(),
        message: e.to_string(),
    })?;
    Ok(Some(Arc::new(typed)))
}

/// Map-backed [`FhirContext`].
///
/// Multiple versions of one canonical may be registered; an unversioned
/// lookup returns the most recently added one.
pub struct InMemoryContext {
    resources: HashMap<String, Vec<Arc<Value>>>,
    structure_definitions: Mutex<LruCache<String, Arc<StructureDefinition>>>,
}

impl InMemoryContext {
    pub fn new() -> Self {
        Self::with_cache_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            resources: HashMap::new(),
            structure_definitions: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Register a resource from its FHIR JSON.
    pub fn add_resource(&mut self, resource: Value) -> Result<()> {
        let url = resource
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                let resource_type = resource
                    .get("resourceType")
                    .and_then(Value::as_str)
                    .unwrap_or("resource");
                Error::MissingUrl(resource_type.to_string())
            })?
            .to_string();

        if let Ok(mut cache) = self.structure_definitions.lock() {
            cache.clear();
        }
        self.resources.entry(url).or_default().push(Arc::new(resource));
        Ok(())
    }

    pub fn with_resource(mut self, resource: Value) -> Result<Self> {
        self.add_resource(resource)?;
        Ok(self)
    }

    pub fn add_structure_definition(&mut self, sd: &StructureDefinition) -> Result<()> {
        self.add_model(sd)
    }

    pub fn add_value_set(&mut self, vs: &ValueSet) -> Result<()> {
        self.add_model(vs)
    }

    pub fn add_code_system(&mut self, cs: &CodeSystem) -> Result<()> {
        self.add_model(cs)
    }

    pub fn add_concept_map(&mut self, cm: &ConceptMap) -> Result<()> {
        self.add_model(cm)
    }

    fn add_model<T: Serialize>(&mut self, model: &T) -> Result<()> {
        self.add_resource(serde_json::to_value(model)?)
    }

    /// Number of distinct canonical urls registered.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl Default for InMemoryContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FhirContext for InMemoryContext {
    fn get_resource_by_url(
        &self,
        canonical_url: &str,
        version: Option<&str>,
    ) -> Result<Option<Arc<Value>>> {
        let Some(candidates) = self.resources.get(canonical_url) else {
            return Ok(None);
        };

        let found = match version {
            Some(version) => candidates
                .iter()
                .rev()
                .find(|r| r.get("version").and_then(Value::as_str) == Some(version)),
            None => candidates.last(),
        };
        Ok(found.cloned())
    }

    fn get_structure_definition(
        &self,
        canonical_url: &str,
    ) -> Result<Option<Arc<StructureDefinition>>> {
        if let Ok(mut cache) = self.structure_definitions.lock() {
            if let Some(sd) = cache.get(canonical_url) {
                return Ok(Some(Arc::clone(sd)));
            }
        }

        let loaded: Option<Arc<StructureDefinition>> =
            load_typed(self, canonical_url, "StructureDefinition")?;
        if let Some(sd) = &loaded {
            if let Ok(mut cache) = self.structure_definitions.lock() {
                cache.put(canonical_url.to_string(), Arc::clone(sd));
            }
        }
        Ok(loaded)
    }
}
