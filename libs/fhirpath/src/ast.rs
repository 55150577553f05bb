//! Expression tree consumed by the evaluator
//!
//! The variants mirror the FHIRPath grammar:
//!
//! - Terms: literals, `{}`, `%constant`, `$this`, `$index`, `$total`
//! - Invocations: member navigation and function calls, with or without an
//!   explicit target (`name` vs `Patient.name`)
//! - Indexer: `expression '[' expression ']'`
//! - Polarity, multiplicative, additive, type (`is`/`as`), union,
//!   inequality, equality, membership, `and`, `or`/`xor`, `implies`
//!
//! There is no parser in this crate. Hosts build trees with the helper
//! constructors:
//!
//! ```rust
//! use ferrum_fhirpath::ast::Expr;
//!
//! // Patient.name.where(use = 'official').given.first()
//! let expr = Expr::path("Patient.name")
//!     .call("where", vec![Expr::member("use").equals(Expr::string("official"))])
//!     .dot("given")
//!     .call("first", vec![]);
//! assert!(matches!(expr, Expr::Function { .. }));
//! ```

use rust_decimal::Decimal;

use crate::value::{QuantityValue, SystemValue};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `{}`
    Empty,

    Literal(SystemValue),

    /// `%name`
    ExternalConstant(String),

    /// `$this`
    This,

    /// `$index`
    Index,

    /// `$total`
    Total,

    /// `target.name`, or `name` on the focus when `target` is `None`.
    Member {
        target: Option<Box<Expr>>,
        name: String,
    },

    /// `target.name(args)`, or `name(args)` on the focus.
    Function {
        target: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
    },

    /// `collection[index]`
    Indexer {
        collection: Box<Expr>,
        index: Box<Expr>,
    },

    Polarity {
        operator: PolarityOperator,
        expression: Box<Expr>,
    },

    Multiplicative {
        left: Box<Expr>,
        operator: MultiplicativeOperator,
        right: Box<Expr>,
    },

    Additive {
        left: Box<Expr>,
        operator: AdditiveOperator,
        right: Box<Expr>,
    },

    /// `expression is Type`, `expression as Type`
    Type {
        expression: Box<Expr>,
        operator: TypeOperator,
        type_specifier: QualifiedIdentifier,
    },

    Union {
        left: Box<Expr>,
        right: Box<Expr>,
    },

    Inequality {
        left: Box<Expr>,
        operator: InequalityOperator,
        right: Box<Expr>,
    },

    Equality {
        left: Box<Expr>,
        operator: EqualityOperator,
        right: Box<Expr>,
    },

    Membership {
        left: Box<Expr>,
        operator: MembershipOperator,
        right: Box<Expr>,
    },

    And {
        left: Box<Expr>,
        right: Box<Expr>,
    },

    Or {
        left: Box<Expr>,
        operator: OrOperator,
        right: Box<Expr>,
    },

    Implies {
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// Qualified identifier: identifier ('.' identifier)*
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedIdentifier {
    pub parts: Vec<String>,
}

impl QualifiedIdentifier {
    pub fn new(parts: Vec<String>) -> Self {
        Self { parts }
    }

    /// Split a dotted name (`FHIR.Patient`).
    pub fn parse(name: &str) -> Self {
        Self {
            parts: name.split('.').map(str::to_string).collect(),
        }
    }

    pub fn single(name: String) -> Self {
        Self { parts: vec![name] }
    }

    pub fn name(&self) -> String {
        self.parts.join(".")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolarityOperator {
    Plus,  // +
    Minus, // -
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplicativeOperator {
    Multiply, // *
    Divide,   // /
    Div,      // div
    Mod,      // mod
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdditiveOperator {
    Plus,   // +
    Minus,  // -
    Concat, // &
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeOperator {
    Is,
    As,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InequalityOperator {
    LessThanOrEqual,    // <=
    LessThan,           // <
    GreaterThan,        // >
    GreaterThanOrEqual, // >=
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualityOperator {
    Equal,         // =
    Equivalent,    // ~
    NotEqual,      // !=
    NotEquivalent, // !~
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipOperator {
    In,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrOperator {
    Or,
    Xor,
}

// Construction helpers

impl Expr {
    pub fn literal(value: SystemValue) -> Expr {
        Expr::Literal(value)
    }

    pub fn boolean(value: bool) -> Expr {
        Expr::Literal(SystemValue::boolean(value))
    }

    pub fn string(value: &str) -> Expr {
        Expr::Literal(SystemValue::string(value))
    }

    pub fn integer(value: i64) -> Expr {
        Expr::Literal(SystemValue::integer(value))
    }

    pub fn decimal(value: Decimal) -> Expr {
        Expr::Literal(SystemValue::decimal(value))
    }

    /// `5 'mg'`, or a calendar duration such as `2 days`.
    pub fn quantity(value: Decimal, unit: &str) -> Expr {
        Expr::Literal(SystemValue::quantity(QuantityValue::ucum(value, unit)))
    }

    pub fn constant(name: &str) -> Expr {
        Expr::ExternalConstant(name.to_string())
    }

    /// `name` on the focus.
    pub fn member(name: &str) -> Expr {
        Expr::Member {
            target: None,
            name: name.to_string(),
        }
    }

    /// Chain of member steps: `Patient.name.given`.
    pub fn path(path: &str) -> Expr {
        let mut steps = path.split('.');
        let first = Expr::member(steps.next().unwrap_or_default());
        steps.fold(first, Expr::dot)
    }

    /// `name(args)` on the focus.
    pub fn function(name: &str, args: Vec<Expr>) -> Expr {
        Expr::Function {
            target: None,
            name: name.to_string(),
            args,
        }
    }

    /// `self.name`
    pub fn dot(self, name: &str) -> Expr {
        Expr::Member {
            target: Some(Box::new(self)),
            name: name.to_string(),
        }
    }

    /// `self.name(args)`
    pub fn call(self, name: &str, args: Vec<Expr>) -> Expr {
        Expr::Function {
            target: Some(Box::new(self)),
            name: name.to_string(),
            args,
        }
    }

    pub fn index(self, index: Expr) -> Expr {
        Expr::Indexer {
            collection: Box::new(self),
            index: Box::new(index),
        }
    }

    pub fn negate(self) -> Expr {
        Expr::Polarity {
            operator: PolarityOperator::Minus,
            expression: Box::new(self),
        }
    }

    pub fn is_type(self, type_name: &str) -> Expr {
        self.type_op(TypeOperator::Is, type_name)
    }

    pub fn as_type(self, type_name: &str) -> Expr {
        self.type_op(TypeOperator::As, type_name)
    }

    fn type_op(self, operator: TypeOperator, type_name: &str) -> Expr {
        Expr::Type {
            expression: Box::new(self),
            operator,
            type_specifier: QualifiedIdentifier::parse(type_name),
        }
    }

    pub fn multiplicative(self, operator: MultiplicativeOperator, right: Expr) -> Expr {
        Expr::Multiplicative {
            left: Box::new(self),
            operator,
            right: Box::new(right),
        }
    }

    pub fn additive(self, operator: AdditiveOperator, right: Expr) -> Expr {
        Expr::Additive {
            left: Box::new(self),
            operator,
            right: Box::new(right),
        }
    }

    pub fn plus(self, right: Expr) -> Expr {
        self.additive(AdditiveOperator::Plus, right)
    }

    pub fn minus(self, right: Expr) -> Expr {
        self.additive(AdditiveOperator::Minus, right)
    }

    pub fn concat(self, right: Expr) -> Expr {
        self.additive(AdditiveOperator::Concat, right)
    }

    pub fn union(self, right: Expr) -> Expr {
        Expr::Union {
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    pub fn inequality(self, operator: InequalityOperator, right: Expr) -> Expr {
        Expr::Inequality {
            left: Box::new(self),
            operator,
            right: Box::new(right),
        }
    }

    pub fn less_than(self, right: Expr) -> Expr {
        self.inequality(InequalityOperator::LessThan, right)
    }

    pub fn greater_than(self, right: Expr) -> Expr {
        self.inequality(InequalityOperator::GreaterThan, right)
    }

    pub fn equality(self, operator: EqualityOperator, right: Expr) -> Expr {
        Expr::Equality {
            left: Box::new(self),
            operator,
            right: Box::new(right),
        }
    }

    pub fn equals(self, right: Expr) -> Expr {
        self.equality(EqualityOperator::Equal, right)
    }

    pub fn not_equals(self, right: Expr) -> Expr {
        self.equality(EqualityOperator::NotEqual, right)
    }

    pub fn equivalent(self, right: Expr) -> Expr {
        self.equality(EqualityOperator::Equivalent, right)
    }

    pub fn membership(self, operator: MembershipOperator, right: Expr) -> Expr {
        Expr::Membership {
            left: Box::new(self),
            operator,
            right: Box::new(right),
        }
    }

    pub fn and(self, right: Expr) -> Expr {
        Expr::And {
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    pub fn or(self, right: Expr) -> Expr {
        Expr::Or {
            left: Box::new(self),
            operator: OrOperator::Or,
            right: Box::new(right),
        }
    }

    pub fn xor(self, right: Expr) -> Expr {
        Expr::Or {
            left: Box::new(self),
            operator: OrOperator::Xor,
            right: Box::new(right),
        }
    }

    pub fn implies(self, right: Expr) -> Expr {
        Expr::Implies {
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    /// The dotted name of a type specifier written as an expression
    /// (`ofType(FHIR.Patient)`).
    pub fn as_type_specifier(&self) -> Option<String> {
        match self {
            Expr::Member { target: None, name } => Some(name.clone()),
            Expr::Member {
                target: Some(target),
                name,
            } => target
                .as_type_specifier()
                .map(|prefix| format!("{}.{}", prefix, name)),
            _ => None,
        }
    }
}
