//! Issues recorded during evaluation
//!
//! Non-fatal findings (profile mismatch, terminology warnings, unresolvable
//! references) accumulate on the evaluation context and never interrupt
//! evaluation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: IssueSeverity,
    pub code: IssueType,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl Issue {
    pub fn new(severity: IssueSeverity, code: IssueType, description: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            description: description.into(),
            expression: None,
        }
    }

    pub fn error(code: IssueType, description: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Error, code, description)
    }

    pub fn warning(code: IssueType, description: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Warning, code, description)
    }

    pub fn information(code: IssueType, description: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Information, code, description)
    }

    /// Attach the path of the node the issue is about.
    pub fn with_expression(mut self, expression: Option<&str>) -> Self {
        self.expression = expression.map(str::to_string);
        self
    }

    pub fn to_json(&self) -> Value {
        let mut issue = serde_json::json!({
            "severity": self.severity.as_code(),
            "code": self.code.as_code(),
            "diagnostics": self.description,
        });

        if let Some(ref expr) = self.expression {
            issue["expression"] = serde_json::json!([expr]);
        }

        issue
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

impl IssueSeverity {
    pub fn as_code(self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "information",
        }
    }
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fatal => write!(f, "Fatal"),
            Self::Error => write!(f, "Error"),
            Self::Warning => write!(f, "Warning"),
            Self::Information => write!(f, "Information"),
        }
    }
}

/// OperationOutcome issue type codes used by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueType {
    Invalid,
    Structure,
    Required,
    Value,
    Invariant,
    CodeInvalid,
    NotSupported,
    NotFound,
    Processing,
    Exception,
    Informational,
}

impl IssueType {
    pub fn as_code(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Structure => "structure",
            Self::Required => "required",
            Self::Value => "value",
            Self::Invariant => "invariant",
            Self::CodeInvalid => "code-invalid",
            Self::NotSupported => "not-supported",
            Self::NotFound => "not-found",
            Self::Processing => "processing",
            Self::Exception => "exception",
            Self::Informational => "informational",
        }
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Render issues as a FHIR OperationOutcome.
pub fn issues_to_operation_outcome(issues: &[Issue]) -> Value {
    serde_json::json!({
        "resourceType": "OperationOutcome",
        "issue": issues.iter().map(Issue::to_json).collect::<Vec<_>>(),
    })
}
