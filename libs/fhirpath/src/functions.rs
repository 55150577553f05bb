//! Function registry for FHIRPath functions
//!
//! Every function declares its name and arity bounds. The registry checks the
//! argument count before dispatch, so implementations can index `args`
//! within their declared bounds.
//!
//! Functions that need lazy argument evaluation (`where`, `select`, `all`,
//! `exists`, `repeat`, `iif`, `is`, `as`, `ofType`, `trace`, `aggregate`) are
//! handled by the evaluator and are not registered here.
//!
//! Hosts can add or replace functions:
//!
//! ```rust
//! use std::sync::Arc;
//! use ferrum_fhirpath::{BuiltinFunction, Collection, FunctionRegistry, Node};
//!
//! let mut registry = FunctionRegistry::default();
//! registry.register(Arc::new(BuiltinFunction::new("answer", 0, 0, |_, _, _| {
//!     Ok(Collection::singleton(Node::integer(42)))
//! })));
//! assert!(registry.get("answer").is_some());
//! ```

mod combining;
mod conforms_to;
mod conversion;
mod existence;
mod fhir;
mod math;
mod member_of;
mod navigation;
mod resolve;
mod string;
mod subsetting;
mod terminology;
mod utility;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::collection::Collection;
use crate::context::EvaluationContext;
use crate::error::{Error, Result};
use crate::node::Node;
use crate::value::SystemValue;

pub use conforms_to::ConformsTo;
pub use member_of::MemberOf;
pub use resolve::Resolve;
pub use utility::type_info_of;

/// A FHIRPath function.
pub trait FhirPathFunction: Send + Sync {
    fn name(&self) -> &str;

    fn min_arity(&self) -> usize;

    fn max_arity(&self) -> usize;

    /// Apply to `input` with evaluated arguments. The argument count is
    /// already within the declared bounds.
    fn apply(
        &self,
        ctx: &mut EvaluationContext,
        input: &Collection,
        args: &[Collection],
    ) -> Result<Collection>;
}

pub type FunctionBody = fn(&mut EvaluationContext, &Collection, &[Collection]) -> Result<Collection>;

/// A function backed by a plain function pointer.
#[derive(Clone, Copy)]
pub struct BuiltinFunction {
    name: &'static str,
    min_arity: usize,
    max_arity: usize,
    body: FunctionBody,
}

impl BuiltinFunction {
    pub const fn new(name: &'static str, min_arity: usize, max_arity: usize, body: FunctionBody) -> Self {
        Self {
            name,
            min_arity,
            max_arity,
            body,
        }
    }
}

impl FhirPathFunction for BuiltinFunction {
    fn name(&self) -> &str {
        self.name
    }

    fn min_arity(&self) -> usize {
        self.min_arity
    }

    fn max_arity(&self) -> usize {
        self.max_arity
    }

    fn apply(&self, ctx: &mut EvaluationContext, input: &Collection, args: &[Collection]) -> Result<Collection> {
        (self.body)(ctx, input, args)
    }
}

impl fmt::Debug for BuiltinFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}..={})", self.name, self.min_arity, self.max_arity)
    }
}

/// Fail unless `actual` is within the function's arity bounds.
pub fn check_arity(function: &dyn FhirPathFunction, actual: usize) -> Result<()> {
    check_arity_bounds(function.name(), function.min_arity(), function.max_arity(), actual)
}

pub(crate) fn check_arity_bounds(name: &str, min: usize, max: usize, actual: usize) -> Result<()> {
    if actual < min || actual > max {
        return Err(Error::InvalidArity {
            name: name.to_string(),
            min,
            max,
            actual,
        });
    }
    Ok(())
}

/// Name → implementation lookup.
#[derive(Clone)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn FhirPathFunction>>,
}

impl FunctionRegistry {
    /// A registry without any functions.
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// A registry with the standard library.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for builtin in BUILTINS {
            registry.register(Arc::new(*builtin));
        }
        registry.register(Arc::new(Resolve));
        registry.register(Arc::new(ConformsTo));
        registry.register(Arc::new(MemberOf));
        registry
    }

    /// Add a function, replacing any earlier one with the same name.
    pub fn register(&mut self, function: Arc<dyn FhirPathFunction>) {
        self.functions.insert(function.name().to_string(), function);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn FhirPathFunction>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Look up, check arity and apply.
    pub fn apply(
        &self,
        ctx: &mut EvaluationContext,
        name: &str,
        input: &Collection,
        args: &[Collection],
    ) -> Result<Collection> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| Error::FunctionNotFound(name.to_string()))?;
        check_arity(function.as_ref(), args.len())?;
        function.apply(ctx, input, args)
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

static BUILTINS: &[BuiltinFunction] = &[
    // Existence
    BuiltinFunction::new("empty", 0, 0, |_, input, _| existence::empty(input)),
    BuiltinFunction::new("not", 0, 0, |_, input, _| existence::not(input)),
    BuiltinFunction::new("allTrue", 0, 0, |_, input, _| existence::all_true(input)),
    BuiltinFunction::new("anyTrue", 0, 0, |_, input, _| existence::any_true(input)),
    BuiltinFunction::new("allFalse", 0, 0, |_, input, _| existence::all_false(input)),
    BuiltinFunction::new("anyFalse", 0, 0, |_, input, _| existence::any_false(input)),
    BuiltinFunction::new("count", 0, 0, |_, input, _| existence::count(input)),
    BuiltinFunction::new("distinct", 0, 0, |_, input, _| existence::distinct(input)),
    BuiltinFunction::new("isDistinct", 0, 0, |_, input, _| existence::is_distinct(input)),
    BuiltinFunction::new("subsetOf", 1, 1, |_, input, args| existence::subset_of(input, &args[0])),
    BuiltinFunction::new("supersetOf", 1, 1, |_, input, args| existence::superset_of(input, &args[0])),
    // Subsetting
    BuiltinFunction::new("single", 0, 0, |_, input, _| subsetting::single(input)),
    BuiltinFunction::new("first", 0, 0, |_, input, _| subsetting::first(input)),
    BuiltinFunction::new("last", 0, 0, |_, input, _| subsetting::last(input)),
    BuiltinFunction::new("tail", 0, 0, |_, input, _| subsetting::tail(input)),
    BuiltinFunction::new("skip", 1, 1, |_, input, args| subsetting::skip(input, &args[0])),
    BuiltinFunction::new("take", 1, 1, |_, input, args| subsetting::take(input, &args[0])),
    BuiltinFunction::new("intersect", 1, 1, |_, input, args| subsetting::intersect(input, &args[0])),
    BuiltinFunction::new("exclude", 1, 1, |_, input, args| subsetting::exclude(input, &args[0])),
    // Combining
    BuiltinFunction::new("union", 1, 1, |_, input, args| combining::union(input, &args[0])),
    BuiltinFunction::new("combine", 1, 1, |_, input, args| combining::combine(input, &args[0])),
    // Strings
    BuiltinFunction::new("indexOf", 1, 1, |_, input, args| string::index_of(input, &args[0])),
    BuiltinFunction::new("lastIndexOf", 1, 1, |_, input, args| string::last_index_of(input, &args[0])),
    BuiltinFunction::new("substring", 1, 2, |_, input, args| string::substring(input, &args[0], args.get(1))),
    BuiltinFunction::new("startsWith", 1, 1, |_, input, args| string::starts_with(input, &args[0])),
    BuiltinFunction::new("endsWith", 1, 1, |_, input, args| string::ends_with(input, &args[0])),
    BuiltinFunction::new("contains", 1, 1, |_, input, args| string::contains(input, &args[0])),
    BuiltinFunction::new("upper", 0, 0, |_, input, _| string::upper(input)),
    BuiltinFunction::new("lower", 0, 0, |_, input, _| string::lower(input)),
    BuiltinFunction::new("replace", 2, 2, |_, input, args| string::replace(input, &args[0], &args[1])),
    BuiltinFunction::new("matches", 1, 1, |ctx, input, args| string::matches(ctx, input, &args[0], false)),
    BuiltinFunction::new("matchesFull", 1, 1, |ctx, input, args| string::matches(ctx, input, &args[0], true)),
    BuiltinFunction::new("replaceMatches", 2, 2, |ctx, input, args| {
        string::replace_matches(ctx, input, &args[0], &args[1])
    }),
    BuiltinFunction::new("length", 0, 0, |_, input, _| string::length(input)),
    BuiltinFunction::new("toChars", 0, 0, |_, input, _| string::to_chars(input)),
    BuiltinFunction::new("trim", 0, 0, |_, input, _| string::trim(input)),
    BuiltinFunction::new("split", 1, 1, |_, input, args| string::split(input, &args[0])),
    BuiltinFunction::new("join", 0, 1, |_, input, args| string::join(input, args.first())),
    BuiltinFunction::new("encode", 1, 1, |_, input, args| string::encode(input, &args[0])),
    BuiltinFunction::new("decode", 1, 1, |_, input, args| string::decode(input, &args[0])),
    BuiltinFunction::new("escape", 1, 1, |_, input, args| string::escape(input, &args[0])),
    BuiltinFunction::new("unescape", 1, 1, |_, input, args| string::unescape(input, &args[0])),
    // Conversion
    BuiltinFunction::new("toBoolean", 0, 0, |_, input, _| conversion::to_boolean(input)),
    BuiltinFunction::new("convertsToBoolean", 0, 0, |_, input, _| conversion::converts_to_boolean(input)),
    BuiltinFunction::new("toInteger", 0, 0, |_, input, _| conversion::to_integer(input)),
    BuiltinFunction::new("convertsToInteger", 0, 0, |_, input, _| conversion::converts_to_integer(input)),
    BuiltinFunction::new("toDecimal", 0, 0, |_, input, _| conversion::to_decimal(input)),
    BuiltinFunction::new("convertsToDecimal", 0, 0, |_, input, _| conversion::converts_to_decimal(input)),
    BuiltinFunction::new("toString", 0, 0, |_, input, _| conversion::to_string(input)),
    BuiltinFunction::new("convertsToString", 0, 0, |_, input, _| conversion::converts_to_string(input)),
    BuiltinFunction::new("toQuantity", 0, 1, |_, input, args| conversion::to_quantity(input, args.first())),
    BuiltinFunction::new("convertsToQuantity", 0, 1, |_, input, args| {
        conversion::converts_to_quantity(input, args.first())
    }),
    BuiltinFunction::new("toDate", 0, 0, |_, input, _| conversion::to_date(input)),
    BuiltinFunction::new("convertsToDate", 0, 0, |_, input, _| conversion::converts_to_date(input)),
    BuiltinFunction::new("toDateTime", 0, 0, |_, input, _| conversion::to_datetime(input)),
    BuiltinFunction::new("convertsToDateTime", 0, 0, |_, input, _| conversion::converts_to_datetime(input)),
    BuiltinFunction::new("toTime", 0, 0, |_, input, _| conversion::to_time(input)),
    BuiltinFunction::new("convertsToTime", 0, 0, |_, input, _| conversion::converts_to_time(input)),
    // Math
    BuiltinFunction::new("abs", 0, 0, |_, input, _| math::abs(input)),
    BuiltinFunction::new("ceiling", 0, 0, |_, input, _| math::ceiling(input)),
    BuiltinFunction::new("floor", 0, 0, |_, input, _| math::floor(input)),
    BuiltinFunction::new("truncate", 0, 0, |_, input, _| math::truncate(input)),
    BuiltinFunction::new("round", 0, 1, |_, input, args| math::round(input, args.first())),
    BuiltinFunction::new("exp", 0, 0, |_, input, _| math::exp(input)),
    BuiltinFunction::new("ln", 0, 0, |_, input, _| math::ln(input)),
    BuiltinFunction::new("log", 1, 1, |_, input, args| math::log(input, &args[0])),
    BuiltinFunction::new("power", 1, 1, |_, input, args| math::power(input, &args[0])),
    BuiltinFunction::new("sqrt", 0, 0, |_, input, _| math::sqrt(input)),
    // Tree navigation
    BuiltinFunction::new("children", 0, 0, |_, input, _| navigation::children(input)),
    BuiltinFunction::new("descendants", 0, 0, |_, input, _| navigation::descendants(input)),
    // Utility
    BuiltinFunction::new("now", 0, 0, |_, _, _| utility::now()),
    BuiltinFunction::new("today", 0, 0, |_, _, _| utility::today()),
    BuiltinFunction::new("timeOfDay", 0, 0, |_, _, _| utility::time_of_day()),
    BuiltinFunction::new("type", 0, 0, |_, input, _| utility::type_function(input)),
    // FHIR
    BuiltinFunction::new("extension", 1, 1, |_, input, args| fhir::extension(input, &args[0])),
    BuiltinFunction::new("hasValue", 0, 0, |_, input, _| fhir::has_value(input)),
    BuiltinFunction::new("getValue", 0, 0, |_, input, _| fhir::get_value(input)),
    // Terminology
    BuiltinFunction::new("expand", 1, 2, terminology::expand),
    BuiltinFunction::new("lookup", 1, 2, terminology::lookup),
    BuiltinFunction::new("validateVS", 2, 3, terminology::validate_vs),
    BuiltinFunction::new("validateCS", 2, 3, terminology::validate_cs),
    BuiltinFunction::new("subsumes", 1, 3, terminology::subsumes),
    BuiltinFunction::new("subsumedBy", 1, 3, terminology::subsumed_by),
    BuiltinFunction::new("translate", 2, 3, terminology::translate),
];

// Shared argument handling

/// The single string of a string-family input.
///
/// Empty input and a string-typed element without a value are `None`. More
/// than one item, or a non-string item, is a contract violation.
pub(crate) fn string_input(input: &Collection, function: &str) -> Result<Option<String>> {
    let Some(node) = input.singleton_item(function)? else {
        return Ok(None);
    };
    match node.system_value() {
        Some(SystemValue::String(s)) => Ok(Some(s.to_string())),
        None if node.is_element() && node.type_().is_string_like() => Ok(None),
        _ => Err(Error::InvalidArgument(format!(
            "{}: input must be a string, found {}",
            function,
            node.type_()
        ))),
    }
}

/// A singleton string argument; empty is `None`.
pub(crate) fn string_arg(arg: &Collection, function: &str) -> Result<Option<String>> {
    match arg.singleton_value(function)? {
        None => Ok(None),
        Some(SystemValue::String(s)) => Ok(Some(s.to_string())),
        Some(other) => Err(Error::InvalidArgument(format!(
            "{}: argument must be a string, found {}",
            function,
            other.type_()
        ))),
    }
}

/// A singleton integer argument; empty is `None`.
pub(crate) fn integer_arg(arg: &Collection, function: &str) -> Result<Option<i64>> {
    match arg.singleton_value(function)? {
        None => Ok(None),
        Some(SystemValue::Integer(i)) => Ok(Some(i)),
        Some(other) => Err(Error::InvalidArgument(format!(
            "{}: argument must be an integer, found {}",
            function,
            other.type_()
        ))),
    }
}

/// The System value of a singleton input; `None` when empty.
pub(crate) fn value_input(input: &Collection, function: &str) -> Result<Option<SystemValue>> {
    input.singleton_value(function)
}

pub(crate) fn single(node: Node) -> Result<Collection> {
    Ok(Collection::singleton(node))
}

pub(crate) fn boolean(value: bool) -> Result<Collection> {
    Ok(Collection::boolean(value))
}

pub(crate) fn empty() -> Result<Collection> {
    Ok(Collection::empty())
}
