//! Per-evaluation state
//!
//! An [`EvaluationContext`] lives for one top-level evaluation, including every
//! nested constraint evaluation it triggers. It owns:
//!
//! - the issues recorded so far,
//! - the stack of constraints currently being checked,
//! - the function-result cache used by `conformsTo()` to break recursion,
//! - external constants (`%resource`, `%rootResource`, user supplied),
//! - the collaborators: canonical lookup, terminology, reference resolution
//!   and constraint validation.
//!
//! Contexts are not shared between threads or between independent
//! evaluations; create a fresh one (or call [`EvaluationContext::reset`]).

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use ferrum_context::{FhirContext, InMemoryContext};
use ferrum_models::ElementDefinitionConstraint;
use lru::LruCache;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::collection::Collection;
use crate::constraint::{ConstraintValidator, ExpressionConstraintValidator};
use crate::error::{Error, Result};
use crate::evaluator::EvaluationListener;
use crate::issue::Issue;
use crate::node::Node;
use crate::resolver::{NoopResolver, ReferenceResolver};
use crate::term::{NoopTermService, TermService};
use crate::tree::FhirPathTree;
use crate::types::FhirPathType;

const REGEX_CACHE_CAPACITY: usize = 64;

pub const UCUM_URL: &str = "http://unitsofmeasure.org";
pub const LOINC_URL: &str = "http://loinc.org";
pub const SNOMED_URL: &str = "http://snomed.info/sct";
const EXTENSION_BASE: &str = "http://hl7.org/fhir/StructureDefinition/";
const VALUE_SET_BASE: &str = "http://hl7.org/fhir/ValueSet/";

/// Evaluation options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvalOptions {
    /// Hand literal references to the [`ReferenceResolver`].
    pub resolve_relative_references: bool,
    /// Base URL of the serving endpoint; absolute references with this base
    /// are treated as local.
    pub service_base_url: Option<String>,
    /// Fail on undefined `%constants` instead of returning empty.
    pub strict: bool,
}

/// Key of a cached function result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionCacheKey {
    name: String,
    input: Collection,
    args: Vec<Collection>,
}

impl FunctionCacheKey {
    pub fn new(name: &str, input: &Collection, args: &[Collection]) -> Self {
        Self {
            name: name.to_string(),
            input: input.clone(),
            args: args.to_vec(),
        }
    }
}

/// A cached function result; `InProgress` marks a call still on the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedResult {
    InProgress,
    Done(Collection),
}

/// Pops the constraint pushed by [`EvaluationContext::push_constraint`] when
/// dropped.
pub struct ConstraintGuard<'a> {
    ctx: &'a mut EvaluationContext,
}

impl Deref for ConstraintGuard<'_> {
    type Target = EvaluationContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for ConstraintGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for ConstraintGuard<'_> {
    fn drop(&mut self) {
        self.ctx.constraints.pop();
    }
}

pub struct EvaluationContext {
    tree: Option<Arc<FhirPathTree>>,
    options: EvalOptions,
    external_constants: HashMap<String, Collection>,
    issues: Vec<Issue>,
    constraints: Vec<ElementDefinitionConstraint>,
    function_cache: HashMap<FunctionCacheKey, CachedResult>,
    fhir_context: Arc<dyn FhirContext>,
    term_service: Arc<dyn TermService>,
    resolver: Arc<dyn ReferenceResolver>,
    constraint_validator: Arc<dyn ConstraintValidator>,
    listeners: Vec<Arc<dyn EvaluationListener>>,
    bundle_index: Option<HashMap<String, Node>>,
    regex_cache: LruCache<String, Regex>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self {
            tree: None,
            options: EvalOptions::default(),
            external_constants: HashMap::new(),
            issues: Vec::new(),
            constraints: Vec::new(),
            function_cache: HashMap::new(),
            fhir_context: Arc::new(InMemoryContext::new()),
            term_service: Arc::new(NoopTermService),
            resolver: Arc::new(NoopResolver),
            constraint_validator: Arc::new(ExpressionConstraintValidator::default()),
            listeners: Vec::new(),
            bundle_index: None,
            regex_cache: LruCache::new(
                NonZeroUsize::new(REGEX_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            ),
        }
    }

    /// Context over a tree; binds `%resource`, `%rootResource` and
    /// `%context` to its root.
    pub fn from_tree(tree: FhirPathTree) -> Self {
        let root = Collection::singleton(tree.get_root().clone());
        let mut ctx = Self::new();
        for name in ["resource", "rootResource", "context"] {
            ctx.external_constants.insert(name.to_string(), root.clone());
        }
        ctx.tree = Some(Arc::new(tree));
        ctx
    }

    /// Context over FHIR JSON; `None` without a `resourceType`.
    pub fn from_resource(resource: &serde_json::Value) -> Option<Self> {
        FhirPathTree::from_json(resource).map(Self::from_tree)
    }

    pub fn with_options(mut self, options: EvalOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_fhir_context(mut self, context: Arc<dyn FhirContext>) -> Self {
        self.fhir_context = context;
        self
    }

    pub fn with_term_service(mut self, service: Arc<dyn TermService>) -> Self {
        self.term_service = service;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ReferenceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_constraint_validator(mut self, validator: Arc<dyn ConstraintValidator>) -> Self {
        self.constraint_validator = validator;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn EvaluationListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn options(&self) -> &EvalOptions {
        &self.options
    }

    pub fn tree(&self) -> Option<&FhirPathTree> {
        self.tree.as_deref()
    }

    pub fn root(&self) -> Option<&Node> {
        self.tree().map(FhirPathTree::get_root)
    }

    pub fn fhir_context(&self) -> Arc<dyn FhirContext> {
        Arc::clone(&self.fhir_context)
    }

    pub fn term_service(&self) -> Arc<dyn TermService> {
        Arc::clone(&self.term_service)
    }

    pub fn resolver(&self) -> Arc<dyn ReferenceResolver> {
        Arc::clone(&self.resolver)
    }

    pub fn constraint_validator(&self) -> Arc<dyn ConstraintValidator> {
        Arc::clone(&self.constraint_validator)
    }

    pub(crate) fn listeners(&self) -> &[Arc<dyn EvaluationListener>] {
        &self.listeners
    }

    /// Drop issues, cached results and the constraint stack so the context
    /// can serve another evaluation.
    pub fn reset(&mut self) {
        self.issues.clear();
        self.constraints.clear();
        self.function_cache.clear();
    }

    // External constants

    pub fn set_external_constant(&mut self, name: &str, value: Collection) {
        if matches!(name, "rootResource" | "resource") {
            self.bundle_index = None;
        }
        self.external_constants.insert(name.to_string(), value);
    }

    pub fn unset_external_constant(&mut self, name: &str) {
        if matches!(name, "rootResource" | "resource") {
            self.bundle_index = None;
        }
        self.external_constants.remove(name);
    }

    /// Value of `%name`: user-set constants first, then the built-ins.
    pub fn external_constant(&self, name: &str) -> Option<Collection> {
        if let Some(value) = self.external_constants.get(name) {
            return Some(value.clone());
        }
        let string = |s: String| Some(Collection::singleton(Node::string(s)));
        match name {
            "ucum" => string(UCUM_URL.to_string()),
            "loinc" => string(LOINC_URL.to_string()),
            "sct" => string(SNOMED_URL.to_string()),
            "terminologies" => Some(Collection::singleton(Node::term_service())),
            _ => {
                if let Some(ext) = name.strip_prefix("ext-") {
                    string(format!("{}{}", EXTENSION_BASE, ext))
                } else if let Some(vs) = name.strip_prefix("vs-") {
                    string(format!("{}{}", VALUE_SET_BASE, vs))
                } else {
                    None
                }
            }
        }
    }

    pub fn has_external_constant(&self, name: &str) -> bool {
        self.external_constant(name).is_some()
    }

    /// `%rootResource`, falling back to `%resource`.
    pub fn root_resource(&self) -> Option<Node> {
        self.external_constants
            .get("rootResource")
            .or_else(|| self.external_constants.get("resource"))
            .and_then(|c| c.first().cloned())
    }

    // Issues

    /// Record an issue. While a constraint is active its key prefixes the
    /// description.
    pub fn add_issue(&mut self, mut issue: Issue) {
        if let Some(constraint) = self.constraint() {
            issue.description = format!("{}: {}", constraint.key, issue.description);
        }
        self.issues.push(issue);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn clear_issues(&mut self) {
        self.issues.clear();
    }

    // Constraints

    /// Make `constraint` the active one until the guard drops.
    pub fn push_constraint(&mut self, constraint: ElementDefinitionConstraint) -> ConstraintGuard<'_> {
        self.constraints.push(constraint);
        ConstraintGuard { ctx: self }
    }

    /// Run `f` with `constraint` active.
    pub fn with_constraint<R>(
        &mut self,
        constraint: ElementDefinitionConstraint,
        f: impl FnOnce(&mut EvaluationContext) -> R,
    ) -> R {
        let mut guard = self.push_constraint(constraint);
        f(&mut guard)
    }

    /// The innermost active constraint.
    pub fn constraint(&self) -> Option<&ElementDefinitionConstraint> {
        self.constraints.last()
    }

    pub fn has_constraint(&self) -> bool {
        !self.constraints.is_empty()
    }

    // Function cache

    pub fn cached_function_result(
        &self,
        name: &str,
        input: &Collection,
        args: &[Collection],
    ) -> Option<CachedResult> {
        self.function_cache
            .get(&FunctionCacheKey::new(name, input, args))
            .cloned()
    }

    pub fn has_cached_function_result(&self, name: &str, input: &Collection, args: &[Collection]) -> bool {
        self.function_cache
            .contains_key(&FunctionCacheKey::new(name, input, args))
    }

    pub fn cache_function_result(
        &mut self,
        name: &str,
        input: &Collection,
        args: &[Collection],
        result: Collection,
    ) {
        self.function_cache.insert(
            FunctionCacheKey::new(name, input, args),
            CachedResult::Done(result),
        );
    }

    /// Record that a call is under way, so a re-entrant call can see it.
    pub fn mark_in_progress(&mut self, name: &str, input: &Collection, args: &[Collection]) {
        self.function_cache
            .insert(FunctionCacheKey::new(name, input, args), CachedResult::InProgress);
    }

    pub fn evict_function_result(&mut self, name: &str, input: &Collection, args: &[Collection]) {
        self.function_cache
            .remove(&FunctionCacheKey::new(name, input, args));
    }

    // Bundles

    /// Resource of the root Bundle entry with this `fullUrl`.
    pub fn bundle_entry(&mut self, full_url: &str) -> Option<Node> {
        if self.bundle_index.is_none() {
            self.bundle_index = Some(self.build_bundle_index());
        }
        self.bundle_index.as_ref()?.get(full_url).cloned()
    }

    fn build_bundle_index(&self) -> HashMap<String, Node> {
        let mut index = HashMap::new();
        let Some(root) = self.root_resource() else {
            return index;
        };
        if root.type_() != FhirPathType::Bundle {
            return index;
        }
        for entry in root.children_named("entry") {
            if let (Some(full_url), Some(resource)) = (entry.child_string("fullUrl"), entry.child("resource")) {
                index.entry(full_url).or_insert_with(|| resource.clone());
            }
        }
        index
    }

    // Regular expressions

    /// Compiled pattern, cached for the life of the context.
    pub fn regex(&mut self, pattern: &str) -> Result<Regex> {
        if let Some(regex) = self.regex_cache.get(pattern) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(pattern)
            .map_err(|e| Error::InvalidArgument(format!("Invalid regular expression '{}': {}", pattern, e)))?;
        self.regex_cache.put(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("root", &self.root())
            .field("options", &self.options)
            .field("constants", &self.external_constants.keys().collect::<Vec<_>>())
            .field("issues", &self.issues.len())
            .field("constraints", &self.constraints.len())
            .field("cached", &self.function_cache.len())
            .finish()
    }
}
