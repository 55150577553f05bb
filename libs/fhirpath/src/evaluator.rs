//! Tree-walking evaluator
//!
//! Walks an [`Expr`] against a focus collection. Operators are applied here.
//! Functions whose arguments are expressions evaluated per item (`where`,
//! `select`, `all`, `exists`, `repeat`, `iif`, `is`, `as`, `ofType`, `trace`,
//! `aggregate`) are handled by the evaluator itself. Every other call is
//! dispatched through the [`FunctionRegistry`] with eagerly evaluated
//! arguments.
//!
//! ```rust
//! use ferrum_fhirpath::ast::Expr;
//! use ferrum_fhirpath::{EvaluationContext, Evaluator};
//! use serde_json::json;
//!
//! let patient = json!({
//!     "resourceType": "Patient",
//!     "name": [{ "use": "official", "given": ["Ann", "Marie"] }]
//! });
//! let mut ctx = EvaluationContext::from_resource(&patient).unwrap();
//! let expr = Expr::path("Patient.name.given").call("count", vec![]);
//!
//! let result = Evaluator::default().evaluate_root(&mut ctx, &expr).unwrap();
//! assert_eq!(result.first().and_then(|n| n.system_value()).and_then(|v| v.as_integer()), Some(2));
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::ast::{
    AdditiveOperator, EqualityOperator, Expr, InequalityOperator, MembershipOperator,
    MultiplicativeOperator, OrOperator, PolarityOperator, TypeOperator,
};
use crate::collection::Collection;
use crate::constraint::is_choice_type_suffix;
use crate::context::EvaluationContext;
use crate::error::{Error, Result};
use crate::functions::{check_arity_bounds, FunctionRegistry};
use crate::node::Node;
use crate::types::FhirPathType;
use crate::value::SystemValue;

/// Observes every expression the evaluator visits.
pub trait EvaluationListener: Send + Sync {
    fn before(&self, _expr: &Expr, _input: &Collection) {}

    fn after(&self, _expr: &Expr, _input: &Collection, _output: &Collection) {}
}

/// Iteration variables of the innermost `where`/`select`/`aggregate`.
#[derive(Debug, Clone, Default)]
struct Scope {
    index: Option<usize>,
    total: Option<Collection>,
}

impl Scope {
    fn at(&self, index: usize) -> Scope {
        Scope {
            index: Some(index),
            total: self.total.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lazy {
    Where,
    Select,
    All,
    Exists,
    Repeat,
    Iif,
    Is,
    As,
    OfType,
    Trace,
    Aggregate,
}

/// Functions with per-item argument evaluation, with their arities.
static LAZY_FUNCTIONS: phf::Map<&'static str, (Lazy, usize, usize)> = phf::phf_map! {
    "where" => (Lazy::Where, 1, 1),
    "select" => (Lazy::Select, 1, 1),
    "all" => (Lazy::All, 1, 1),
    "exists" => (Lazy::Exists, 0, 1),
    "repeat" => (Lazy::Repeat, 1, 1),
    "iif" => (Lazy::Iif, 2, 3),
    "is" => (Lazy::Is, 1, 1),
    "as" => (Lazy::As, 1, 1),
    "ofType" => (Lazy::OfType, 1, 1),
    "trace" => (Lazy::Trace, 1, 2),
    "aggregate" => (Lazy::Aggregate, 1, 2),
};

#[derive(Clone, Default)]
pub struct Evaluator {
    registry: Arc<FunctionRegistry>,
}

impl Evaluator {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Evaluate `expr` with `input` as the focus (`$this`).
    pub fn evaluate(&self, ctx: &mut EvaluationContext, expr: &Expr, input: &Collection) -> Result<Collection> {
        self.eval(ctx, expr, input, &Scope::default())
    }

    pub fn evaluate_node(&self, ctx: &mut EvaluationContext, expr: &Expr, node: &Node) -> Result<Collection> {
        self.evaluate(ctx, expr, &Collection::singleton(node.clone()))
    }

    /// Evaluate against the root of the context's tree; empty without one.
    pub fn evaluate_root(&self, ctx: &mut EvaluationContext, expr: &Expr) -> Result<Collection> {
        let input = ctx.root().cloned().map(Collection::singleton).unwrap_or_default();
        self.evaluate(ctx, expr, &input)
    }

    fn eval(&self, ctx: &mut EvaluationContext, expr: &Expr, input: &Collection, scope: &Scope) -> Result<Collection> {
        if ctx.listeners().is_empty() {
            return self.eval_expr(ctx, expr, input, scope);
        }
        let listeners = ctx.listeners().to_vec();
        for listener in &listeners {
            listener.before(expr, input);
        }
        let output = self.eval_expr(ctx, expr, input, scope)?;
        for listener in &listeners {
            listener.after(expr, input, &output);
        }
        Ok(output)
    }

    fn eval_expr(&self, ctx: &mut EvaluationContext, expr: &Expr, input: &Collection, scope: &Scope) -> Result<Collection> {
        match expr {
            Expr::Empty => Ok(Collection::empty()),
            Expr::Literal(value) => Ok(Collection::from_value(value.clone())),
            Expr::ExternalConstant(name) => match ctx.external_constant(name) {
                Some(value) => Ok(value),
                None if ctx.options().strict => Err(Error::VariableNotFound(format!("%{}", name))),
                None => Ok(Collection::empty()),
            },
            Expr::This => Ok(input.clone()),
            Expr::Index => Ok(scope
                .index
                .map(|i| Collection::singleton(Node::integer(i as i64)))
                .unwrap_or_default()),
            Expr::Total => Ok(scope.total.clone().unwrap_or_default()),
            Expr::Member { target, name } => {
                let focus = match target {
                    Some(target) => self.eval(ctx, target, input, scope)?,
                    None => input.clone(),
                };
                Ok(navigate(&focus, name))
            }
            Expr::Function { target, name, args } => {
                let receiver = match target {
                    Some(target) => self.eval(ctx, target, input, scope)?,
                    None => input.clone(),
                };
                self.call(ctx, name, &receiver, args, input, scope)
            }
            Expr::Indexer { collection, index } => {
                let collection = self.eval(ctx, collection, input, scope)?;
                collection.require_ordered("[]")?;
                let index = self.eval(ctx, index, input, scope)?;
                let Some(index) = index.singleton_value("[]")?.and_then(|v| v.as_integer()) else {
                    return Ok(Collection::empty());
                };
                Ok(usize::try_from(index)
                    .ok()
                    .and_then(|i| collection.get(i).cloned())
                    .map(Collection::singleton)
                    .unwrap_or_default())
            }
            Expr::Polarity { operator, expression } => {
                let operand = self.eval(ctx, expression, input, scope)?;
                let Some(value) = operand.singleton_value("polarity")? else {
                    return Ok(Collection::empty());
                };
                if !value.is_numeric() && value.as_quantity().is_none() {
                    return Err(Error::TypeError(format!("Cannot apply polarity to {}", value.type_())));
                }
                match operator {
                    PolarityOperator::Plus => Ok(Collection::from_value(value)),
                    PolarityOperator::Minus => Ok(value.negate().map(Collection::from_value).unwrap_or_default()),
                }
            }
            Expr::Multiplicative { left, operator, right } => {
                let symbol = match operator {
                    MultiplicativeOperator::Multiply => "*",
                    MultiplicativeOperator::Divide => "/",
                    MultiplicativeOperator::Div => "div",
                    MultiplicativeOperator::Mod => "mod",
                };
                self.arithmetic(ctx, left, right, input, scope, symbol, |a, b| match operator {
                    MultiplicativeOperator::Multiply => a.multiply(b),
                    MultiplicativeOperator::Divide => a.divide(b),
                    MultiplicativeOperator::Div => a.div(b),
                    MultiplicativeOperator::Mod => a.modulo(b),
                })
            }
            Expr::Additive { left, operator, right } => match operator {
                AdditiveOperator::Plus => self.arithmetic(ctx, left, right, input, scope, "+", SystemValue::add),
                AdditiveOperator::Minus => self.arithmetic(ctx, left, right, input, scope, "-", SystemValue::subtract),
                AdditiveOperator::Concat => {
                    let l = self.eval(ctx, left, input, scope)?;
                    let r = self.eval(ctx, right, input, scope)?;
                    let text = concat_operand(&l)? + &concat_operand(&r)?;
                    Ok(Collection::singleton(Node::string(text)))
                }
            },
            Expr::Type {
                expression,
                operator,
                type_specifier,
            } => {
                let operand = self.eval(ctx, expression, input, scope)?;
                let type_name = type_specifier.name();
                match operator {
                    TypeOperator::Is => is_type(&operand, &type_name, "is"),
                    TypeOperator::As => as_type(&operand, &type_name, "as"),
                }
            }
            Expr::Union { left, right } => {
                let l = self.eval(ctx, left, input, scope)?;
                let r = self.eval(ctx, right, input, scope)?;
                self.registry.apply(ctx, "union", &l, &[r])
            }
            Expr::Inequality { left, operator, right } => {
                let l = self.eval(ctx, left, input, scope)?;
                let r = self.eval(ctx, right, input, scope)?;
                let (Some(a), Some(b)) = (l.singleton_item("comparison")?, r.singleton_item("comparison")?) else {
                    return Ok(Collection::empty());
                };
                let Some(ordering) = a.compare_to(b)? else {
                    return Ok(Collection::empty());
                };
                let result = match operator {
                    InequalityOperator::LessThan => ordering.is_lt(),
                    InequalityOperator::LessThanOrEqual => ordering.is_le(),
                    InequalityOperator::GreaterThan => ordering.is_gt(),
                    InequalityOperator::GreaterThanOrEqual => ordering.is_ge(),
                };
                Ok(Collection::boolean(result))
            }
            Expr::Equality { left, operator, right } => {
                let l = self.eval(ctx, left, input, scope)?;
                let r = self.eval(ctx, right, input, scope)?;
                let result = match operator {
                    EqualityOperator::Equal => collection_equals(&l, &r),
                    EqualityOperator::NotEqual => collection_equals(&l, &r).map(|b| !b),
                    EqualityOperator::Equivalent => Some(collection_equivalent(&l, &r)),
                    EqualityOperator::NotEquivalent => Some(!collection_equivalent(&l, &r)),
                };
                Ok(result.map(Collection::boolean).unwrap_or_default())
            }
            Expr::Membership { left, operator, right } => {
                let l = self.eval(ctx, left, input, scope)?;
                let r = self.eval(ctx, right, input, scope)?;
                let (item, collection, name) = match operator {
                    MembershipOperator::In => (l, r, "in"),
                    MembershipOperator::Contains => (r, l, "contains"),
                };
                let Some(item) = item.singleton_item(name)? else {
                    return Ok(Collection::empty());
                };
                let found = collection.iter().any(|n| node_equals(item, n) == Some(true));
                Ok(Collection::boolean(found))
            }
            Expr::And { left, right } => {
                let l = self.eval(ctx, left, input, scope)?.as_boolean()?;
                if l == Some(false) {
                    return Ok(Collection::boolean(false));
                }
                let r = self.eval(ctx, right, input, scope)?.as_boolean()?;
                Ok(match (l, r) {
                    (_, Some(false)) => Collection::boolean(false),
                    (Some(true), Some(true)) => Collection::boolean(true),
                    _ => Collection::empty(),
                })
            }
            Expr::Or { left, operator, right } => {
                let l = self.eval(ctx, left, input, scope)?.as_boolean()?;
                if *operator == OrOperator::Or && l == Some(true) {
                    return Ok(Collection::boolean(true));
                }
                let r = self.eval(ctx, right, input, scope)?.as_boolean()?;
                Ok(match (operator, l, r) {
                    (OrOperator::Or, _, Some(true)) => Collection::boolean(true),
                    (OrOperator::Or, Some(false), Some(false)) => Collection::boolean(false),
                    (OrOperator::Xor, Some(a), Some(b)) => Collection::boolean(a != b),
                    _ => Collection::empty(),
                })
            }
            Expr::Implies { left, right } => {
                let l = self.eval(ctx, left, input, scope)?.as_boolean()?;
                if l == Some(false) {
                    return Ok(Collection::boolean(true));
                }
                let r = self.eval(ctx, right, input, scope)?.as_boolean()?;
                Ok(match (l, r) {
                    (_, Some(true)) => Collection::boolean(true),
                    (Some(true), Some(false)) => Collection::boolean(false),
                    _ => Collection::empty(),
                })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn arithmetic(
        &self,
        ctx: &mut EvaluationContext,
        left: &Expr,
        right: &Expr,
        input: &Collection,
        scope: &Scope,
        symbol: &str,
        op: impl Fn(&SystemValue, &SystemValue) -> Result<Option<SystemValue>>,
    ) -> Result<Collection> {
        let l = self.eval(ctx, left, input, scope)?;
        let r = self.eval(ctx, right, input, scope)?;
        let (Some(a), Some(b)) = (l.singleton_value(symbol)?, r.singleton_value(symbol)?) else {
            return Ok(Collection::empty());
        };
        Ok(op(&a, &b)?.map(Collection::from_value).unwrap_or_default())
    }

    /// `receiver.name(args)`. `focus` is the collection the arguments of
    /// eagerly evaluated functions are evaluated against.
    fn call(
        &self,
        ctx: &mut EvaluationContext,
        name: &str,
        receiver: &Collection,
        args: &[Expr],
        focus: &Collection,
        scope: &Scope,
    ) -> Result<Collection> {
        if let Some(&(lazy, min, max)) = LAZY_FUNCTIONS.get(name) {
            check_arity_bounds(name, min, max, args.len())?;
            return self.call_lazy(ctx, lazy, name, receiver, args, scope);
        }

        tracing::debug!(function = name, items = receiver.len(), "dispatching function");
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(ctx, arg, focus, scope)?);
        }
        self.registry.apply(ctx, name, receiver, &values)
    }

    fn call_lazy(
        &self,
        ctx: &mut EvaluationContext,
        lazy: Lazy,
        name: &str,
        receiver: &Collection,
        args: &[Expr],
        scope: &Scope,
    ) -> Result<Collection> {
        match lazy {
            Lazy::Where => {
                let mut out = Collection::with_capacity(receiver.len());
                for (i, item) in receiver.iter().enumerate() {
                    if self.test(ctx, &args[0], item, &scope.at(i))? == Some(true) {
                        out.push(item.clone());
                    }
                }
                Ok(out)
            }
            Lazy::Select => {
                let mut out = Collection::empty();
                for (i, item) in receiver.iter().enumerate() {
                    let projected = self.eval(ctx, &args[0], &Collection::singleton(item.clone()), &scope.at(i))?;
                    out.extend(projected);
                }
                Ok(out)
            }
            Lazy::All => {
                for (i, item) in receiver.iter().enumerate() {
                    if self.test(ctx, &args[0], item, &scope.at(i))? != Some(true) {
                        return Ok(Collection::boolean(false));
                    }
                }
                Ok(Collection::boolean(true))
            }
            Lazy::Exists => {
                let Some(criteria) = args.first() else {
                    return Ok(Collection::boolean(!receiver.is_empty()));
                };
                for (i, item) in receiver.iter().enumerate() {
                    if self.test(ctx, criteria, item, &scope.at(i))? == Some(true) {
                        return Ok(Collection::boolean(true));
                    }
                }
                Ok(Collection::boolean(false))
            }
            Lazy::Repeat => {
                let mut seen: HashSet<Node> = HashSet::new();
                let mut out = Collection::empty();
                let mut queue: Vec<Node> = receiver.iter().cloned().collect();
                while let Some(item) = queue.pop() {
                    let projected = self.eval(ctx, &args[0], &Collection::singleton(item), scope)?;
                    for next in projected {
                        if seen.insert(next.clone()) {
                            out.push(next.clone());
                            queue.push(next);
                        }
                    }
                }
                Ok(out)
            }
            Lazy::Iif => {
                if receiver.len() > 1 {
                    return Err(Error::not_singleton(name, receiver.len()));
                }
                let criterion = self.eval(ctx, &args[0], receiver, scope)?.as_boolean()?;
                if criterion == Some(true) {
                    self.eval(ctx, &args[1], receiver, scope)
                } else {
                    match args.get(2) {
                        Some(otherwise) => self.eval(ctx, otherwise, receiver, scope),
                        None => Ok(Collection::empty()),
                    }
                }
            }
            Lazy::Is => is_type(receiver, &type_specifier(&args[0], name)?, name),
            Lazy::As => as_type(receiver, &type_specifier(&args[0], name)?, name),
            Lazy::OfType => {
                let type_name = type_specifier(&args[0], name)?;
                Ok(receiver
                    .iter()
                    .filter(|node| is_of_type(node, &type_name))
                    .cloned()
                    .collect())
            }
            Lazy::Trace => {
                let label = self.eval(ctx, &args[0], receiver, scope)?;
                let label = label
                    .singleton_value(name)?
                    .map(|v| v.to_fhirpath_string())
                    .unwrap_or_default();
                let shown = match args.get(1) {
                    Some(projection) => self.eval(ctx, projection, receiver, scope)?,
                    None => receiver.clone(),
                };
                tracing::trace!(target: "fhirpath::trace", name = %label, items = ?shown.as_slice());
                Ok(receiver.clone())
            }
            Lazy::Aggregate => {
                let mut total = match args.get(1) {
                    Some(init) => self.eval(ctx, init, receiver, scope)?,
                    None => Collection::empty(),
                };
                for (i, item) in receiver.iter().enumerate() {
                    let step = Scope {
                        index: Some(i),
                        total: Some(total),
                    };
                    total = self.eval(ctx, &args[0], &Collection::singleton(item.clone()), &step)?;
                }
                Ok(total)
            }
        }
    }

    /// Boolean value of `criteria` evaluated on one item.
    fn test(&self, ctx: &mut EvaluationContext, criteria: &Expr, item: &Node, scope: &Scope) -> Result<Option<bool>> {
        self.eval(ctx, criteria, &Collection::singleton(item.clone()), scope)?
            .as_boolean()
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("functions", &self.registry.len())
            .finish()
    }
}

/// Children named `name`, choice elements included. A type name applied to a
/// node of that type selects the node itself (`Patient.name` on a Patient).
fn navigate(focus: &Collection, name: &str) -> Collection {
    let mut out = Collection::empty();
    for node in focus {
        let before = out.len();
        for child in node.children() {
            let Some(child_name) = child.name() else {
                continue;
            };
            if child_name == name
                || child_name
                    .strip_prefix(name)
                    .is_some_and(is_choice_type_suffix)
            {
                out.push(child.clone());
            }
        }
        if out.len() == before
            && name.starts_with(|c: char| c.is_ascii_uppercase())
            && node.is_resource()
            && is_of_type(node, name)
        {
            out.push(node.clone());
        }
    }
    if focus.is_ordered() {
        out
    } else {
        out.unordered()
    }
}

fn type_specifier(arg: &Expr, function: &str) -> Result<String> {
    arg.as_type_specifier().ok_or_else(|| {
        Error::InvalidArgument(format!("{}: argument must be a type specifier", function))
    })
}

/// Whether `node` is of `type_name` or a subtype. Types outside the lattice
/// match on the host's own type name.
fn is_of_type(node: &Node, type_name: &str) -> bool {
    match FhirPathType::from_name(type_name) {
        Some(ty) => ty.is_assignable_from(Some(node.type_())),
        None => {
            let short = type_name.rsplit('.').next().unwrap_or(type_name);
            node.type_name() == short.trim_matches('`')
        }
    }
}

fn is_type(operand: &Collection, type_name: &str, operator: &str) -> Result<Collection> {
    Ok(match operand.singleton_item(operator)? {
        Some(node) => Collection::boolean(is_of_type(node, type_name)),
        None => Collection::empty(),
    })
}

fn as_type(operand: &Collection, type_name: &str, operator: &str) -> Result<Collection> {
    Ok(match operand.singleton_item(operator)? {
        Some(node) if is_of_type(node, type_name) => Collection::singleton(node.clone()),
        _ => Collection::empty(),
    })
}

/// `&` operand: empty is the empty string.
fn concat_operand(operand: &Collection) -> Result<String> {
    match operand.singleton_value("&")? {
        None => Ok(String::new()),
        Some(value) => value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::TypeError(format!("& requires strings, found {}", value.type_()))),
    }
}

/// Item equality: System values by `=`, structural nodes by content.
fn node_equals(a: &Node, b: &Node) -> Option<bool> {
    match (a.system_value(), b.system_value()) {
        (Some(x), Some(y)) => x.equals(&y),
        (None, None) => Some(a == b),
        _ => Some(false),
    }
}

fn node_equivalent(a: &Node, b: &Node) -> bool {
    match (a.system_value(), b.system_value()) {
        (Some(x), Some(y)) => x.equivalent(&y),
        (None, None) => a == b,
        _ => false,
    }
}

/// `=`: empty when either side is empty or an item pair is undecidable.
fn collection_equals(left: &Collection, right: &Collection) -> Option<bool> {
    if left.is_empty() || right.is_empty() {
        return None;
    }
    if left.len() != right.len() {
        return Some(false);
    }
    let mut result = true;
    for (a, b) in left.iter().zip(right.iter()) {
        match node_equals(a, b)? {
            true => {}
            false => result = false,
        }
    }
    Some(result)
}

/// `~`: order-insensitive; two empty collections are equivalent.
fn collection_equivalent(left: &Collection, right: &Collection) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut unmatched: Vec<&Node> = right.iter().collect();
    for a in left {
        match unmatched.iter().position(|b| node_equivalent(a, b)) {
            Some(i) => {
                unmatched.swap_remove(i);
            }
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::sync::Mutex;

    fn patient_context() -> EvaluationContext {
        EvaluationContext::from_resource(&json!({
            "resourceType": "Patient",
            "id": "p1",
            "active": true,
            "name": [
                { "use": "official", "family": "Doe", "given": ["Jane", "Q"] },
                { "use": "nickname", "given": ["JD"] }
            ]
        }))
        .unwrap()
    }

    fn eval(ctx: &mut EvaluationContext, expr: &Expr) -> Collection {
        Evaluator::default().evaluate_root(ctx, expr).unwrap()
    }

    fn strings(collection: &Collection) -> Vec<String> {
        collection
            .iter()
            .filter_map(|n| n.system_value())
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_path_navigation_starts_at_type_name() {
        let mut ctx = patient_context();
        let given = eval(&mut ctx, &Expr::path("Patient.name.given"));
        assert_eq!(strings(&given), vec!["Jane", "Q", "JD"]);
        let given = eval(&mut ctx, &Expr::path("name.given"));
        assert_eq!(given.len(), 3);
    }

    #[test]
    fn test_where_and_index() {
        let mut ctx = patient_context();
        let expr = Expr::path("name")
            .call("where", vec![Expr::member("use").equals(Expr::string("official"))])
            .dot("given");
        assert_eq!(strings(&eval(&mut ctx, &expr)), vec!["Jane", "Q"]);

        let expr = Expr::path("name.given").index(Expr::integer(2));
        assert_eq!(strings(&eval(&mut ctx, &expr)), vec!["JD"]);
        let expr = Expr::path("name.given").index(Expr::integer(7));
        assert!(eval(&mut ctx, &expr).is_empty());
    }

    #[test]
    fn test_index_requires_ordered_input() {
        let mut ctx = patient_context();
        let expr = Expr::This.call("children", vec![]).index(Expr::integer(0));
        assert!(matches!(
            Evaluator::default().evaluate_root(&mut ctx, &expr),
            Err(Error::InvalidArgument(_))
        ));
        let expr = Expr::This.call("descendants", vec![]).dot("given").index(Expr::integer(0));
        assert!(Evaluator::default().evaluate_root(&mut ctx, &expr).is_err());
    }

    #[test]
    fn test_three_valued_logic() {
        let mut ctx = EvaluationContext::new();
        let t = || Expr::boolean(true);
        let f = || Expr::boolean(false);
        let e = || Expr::Empty;
        let b = |c: Collection| c.as_boolean().unwrap();
        assert_eq!(b(eval(&mut ctx, &e().and(f()))), Some(false));
        assert_eq!(b(eval(&mut ctx, &e().and(t()))), None);
        assert_eq!(b(eval(&mut ctx, &e().or(t()))), Some(true));
        assert_eq!(b(eval(&mut ctx, &e().or(f()))), None);
        assert_eq!(b(eval(&mut ctx, &t().xor(f()))), Some(true));
        assert_eq!(b(eval(&mut ctx, &e().xor(f()))), None);
        assert_eq!(b(eval(&mut ctx, &f().implies(e()))), Some(true));
        assert_eq!(b(eval(&mut ctx, &e().implies(t()))), Some(true));
        assert_eq!(b(eval(&mut ctx, &t().implies(e()))), None);
    }

    #[test]
    fn test_arithmetic_promotes_and_concatenates() {
        let mut ctx = EvaluationContext::new();
        let sum = eval(&mut ctx, &Expr::integer(1).plus(Expr::decimal(Decimal::new(5, 1))));
        assert_eq!(sum.first().and_then(Node::system_value), Some(SystemValue::decimal(Decimal::new(15, 1))));

        let text = eval(&mut ctx, &Expr::string("a").concat(Expr::Empty));
        assert_eq!(strings(&text), vec!["a"]);
        assert!(eval(&mut ctx, &Expr::string("a").plus(Expr::Empty)).is_empty());
    }

    #[test]
    fn test_equality_and_equivalence() {
        let mut ctx = EvaluationContext::new();
        let list = |a: &str, b: &str| Expr::string(a).union(Expr::string(b));
        let b = |c: Collection| c.as_boolean().unwrap();
        assert_eq!(b(eval(&mut ctx, &list("a", "b").equals(list("b", "a")))), Some(false));
        assert_eq!(b(eval(&mut ctx, &list("a", "b").equivalent(list("B", "A")))), Some(true));
        assert_eq!(b(eval(&mut ctx, &Expr::Empty.equals(Expr::integer(1)))), None);
        assert_eq!(b(eval(&mut ctx, &Expr::Empty.equivalent(Expr::Empty))), Some(true));
    }

    #[test]
    fn test_comparison_of_incompatible_values_fails() {
        let mut ctx = EvaluationContext::new();
        let expr = Expr::integer(1).less_than(Expr::string("a"));
        assert!(matches!(
            Evaluator::default().evaluate(&mut ctx, &expr, &Collection::empty()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_type_operators() {
        let mut ctx = patient_context();
        let b = |c: Collection| c.as_boolean().unwrap();
        assert_eq!(b(eval(&mut ctx, &Expr::This.is_type("Patient"))), Some(true));
        assert_eq!(b(eval(&mut ctx, &Expr::This.is_type("FHIR.Resource"))), Some(true));
        assert_eq!(b(eval(&mut ctx, &Expr::This.is_type("Observation"))), Some(false));
        assert_eq!(eval(&mut ctx, &Expr::This.as_type("Patient")).len(), 1);
        assert!(eval(&mut ctx, &Expr::This.as_type("Observation")).is_empty());

        let multiple = Expr::path("name").is_type("HumanName");
        assert!(Evaluator::default().evaluate_root(&mut ctx, &multiple).is_err());
    }

    #[test]
    fn test_aggregate_uses_total() {
        let mut ctx = EvaluationContext::new();
        let numbers = Expr::integer(1).union(Expr::integer(2)).union(Expr::integer(3));
        let expr = numbers.call("aggregate", vec![Expr::This.plus(Expr::Total), Expr::integer(0)]);
        let total = eval(&mut ctx, &expr);
        assert_eq!(total.first().and_then(Node::system_value), Some(SystemValue::integer(6)));
    }

    #[test]
    fn test_undefined_constant() {
        let mut ctx = EvaluationContext::new();
        assert!(eval(&mut ctx, &Expr::constant("missing")).is_empty());

        let mut strict = EvaluationContext::new().with_options(crate::context::EvalOptions {
            strict: true,
            ..Default::default()
        });
        assert!(matches!(
            Evaluator::default().evaluate(&mut strict, &Expr::constant("missing"), &Collection::empty()),
            Err(Error::VariableNotFound(_))
        ));
    }

    #[test]
    fn test_lazy_function_arity() {
        let mut ctx = EvaluationContext::new();
        let expr = Expr::function("where", vec![]);
        assert!(matches!(
            Evaluator::default().evaluate(&mut ctx, &expr, &Collection::empty()),
            Err(Error::InvalidArity { .. })
        ));
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<usize>>);

    impl EvaluationListener for Recorder {
        fn after(&self, _expr: &Expr, _input: &Collection, output: &Collection) {
            if let Ok(mut seen) = self.0.lock() {
                seen.push(output.len());
            }
        }
    }

    #[test]
    fn test_listeners_observe_each_expression() {
        let recorder = Arc::new(Recorder::default());
        let mut ctx = patient_context().with_listener(recorder.clone());
        eval(&mut ctx, &Expr::path("name.given"));
        assert_eq!(*recorder.0.lock().unwrap(), vec![2, 3]);
    }
}
