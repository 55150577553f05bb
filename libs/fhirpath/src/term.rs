//! Terminology service bridge
//!
//! `memberOf()` and the `%terminologies` functions talk to a [`TermService`].
//! Failures are reported as [`TermServiceError`] and converted into warning
//! issues at the function boundary.
//!
//! [`InMemoryTermService`] answers from the CodeSystems, ValueSets and
//! ConceptMaps registered in a [`FhirContext`]. [`NoopTermService`] is the
//! default and refuses every call.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use ferrum_context::FhirContext;
use ferrum_models::{
    CodeSystem, CodeSystemConcept, ConceptMap, ValueSet, ValueSetExpansion,
    ValueSetExpansionContains, ValueSetInclude,
};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TermServiceError {
    #[error("Terminology service unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown terminology resource: {0}")]
    NotFound(String),

    #[error("Not supported by the terminology service: {0}")]
    Unsupported(String),

    #[error("Terminology operation failed: {0}")]
    Failed(String),
}

pub type TermResult<T> = std::result::Result<T, TermServiceError>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Coding {
    pub system: Option<String>,
    pub version: Option<String>,
    pub code: String,
    pub display: Option<String>,
}

impl Coding {
    pub fn new(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            code: code.into(),
            ..Default::default()
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    pub fn to_json(&self) -> Value {
        let mut coding = serde_json::Map::new();
        if let Some(system) = &self.system {
            coding.insert("system".into(), json!(system));
        }
        if let Some(version) = &self.version {
            coding.insert("version".into(), json!(version));
        }
        coding.insert("code".into(), json!(self.code));
        if let Some(display) = &self.display {
            coding.insert("display".into(), json!(display));
        }
        Value::Object(coding)
    }
}

/// The coded shapes a validation or translation accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodedValue {
    Code(String),
    Coding(Coding),
    Concept(Vec<Coding>),
}

impl CodedValue {
    pub fn codings(&self) -> Vec<Coding> {
        match self {
            CodedValue::Code(code) => vec![Coding {
                code: code.clone(),
                ..Default::default()
            }],
            CodedValue::Coding(coding) => vec![coding.clone()],
            CodedValue::Concept(codings) => codings.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub result: bool,
    pub message: Option<String>,
    pub display: Option<String>,
}

impl ValidationOutcome {
    pub fn valid(display: Option<String>) -> Self {
        Self {
            result: true,
            message: None,
            display,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            result: false,
            message: Some(message.into()),
            display: None,
        }
    }

    pub fn to_parameters(&self) -> Value {
        let mut parameter = vec![json!({ "name": "result", "valueBoolean": self.result })];
        if let Some(message) = &self.message {
            parameter.push(json!({ "name": "message", "valueString": message }));
        }
        if let Some(display) = &self.display {
            parameter.push(json!({ "name": "display", "valueString": display }));
        }
        parameters(parameter)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupOutcome {
    pub name: Option<String>,
    pub version: Option<String>,
    pub display: Option<String>,
    pub definition: Option<String>,
}

impl LookupOutcome {
    pub fn to_parameters(&self) -> Value {
        let parameter = [
            ("name", &self.name),
            ("version", &self.version),
            ("display", &self.display),
            ("definition", &self.definition),
        ]
        .into_iter()
        .filter_map(|(name, value)| {
            value
                .as_ref()
                .map(|v| json!({ "name": name, "valueString": v }))
        })
        .collect();
        parameters(parameter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubsumptionOutcome {
    Equivalent,
    Subsumes,
    SubsumedBy,
    NotSubsumed,
}

impl SubsumptionOutcome {
    pub fn as_code(self) -> &'static str {
        match self {
            Self::Equivalent => "equivalent",
            Self::Subsumes => "subsumes",
            Self::SubsumedBy => "subsumed-by",
            Self::NotSubsumed => "not-subsumed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationMatch {
    pub relationship: String,
    pub concept: Coding,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationOutcome {
    pub result: bool,
    pub message: Option<String>,
    pub matches: Vec<TranslationMatch>,
}

impl TranslationOutcome {
    pub fn to_parameters(&self) -> Value {
        let mut parameter = vec![json!({ "name": "result", "valueBoolean": self.result })];
        if let Some(message) = &self.message {
            parameter.push(json!({ "name": "message", "valueString": message }));
        }
        for m in &self.matches {
            let mut part = vec![
                json!({ "name": "relationship", "valueCode": m.relationship }),
                json!({ "name": "concept", "valueCoding": m.concept.to_json() }),
            ];
            if let Some(source) = &m.source {
                part.push(json!({ "name": "source", "valueUri": source }));
            }
            parameter.push(json!({ "name": "match", "part": part }));
        }
        parameters(parameter)
    }
}

fn parameters(parameter: Vec<Value>) -> Value {
    json!({ "resourceType": "Parameters", "parameter": parameter })
}

/// Operation parameters passed as a URL query string (`count=10&date=...`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermParams(HashMap<String, String>);

impl TermParams {
    pub fn parse(query: &str) -> Self {
        let params = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode(key), decode(value))
            })
            .collect();
        Self(params)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn decode(part: &str) -> String {
    let spaced = part.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// External terminology capability.
pub trait TermService: Send + Sync {
    fn validate_code_vs(
        &self,
        value_set: &ValueSet,
        coded: &CodedValue,
        params: &TermParams,
    ) -> TermResult<ValidationOutcome>;

    fn validate_code_cs(
        &self,
        code_system: &CodeSystem,
        coded: &CodedValue,
        params: &TermParams,
    ) -> TermResult<ValidationOutcome>;

    fn lookup(&self, coding: &Coding, params: &TermParams) -> TermResult<Option<LookupOutcome>>;

    /// Relation of `a` to `b`; `None` when either code is unknown.
    fn subsumes(&self, a: &Coding, b: &Coding) -> TermResult<Option<SubsumptionOutcome>>;

    fn translate(
        &self,
        concept_map: &ConceptMap,
        coded: &CodedValue,
        params: &TermParams,
    ) -> TermResult<TranslationOutcome>;

    fn expand(&self, value_set: &ValueSet, params: &TermParams) -> TermResult<ValueSet>;

    fn is_expandable(&self, value_set: &ValueSet) -> bool;

    fn is_expanded(&self, value_set: &ValueSet) -> bool {
        value_set.is_expanded()
    }
}

/// Refuses every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTermService;

impl NoopTermService {
    fn unavailable<T>(operation: &str) -> TermResult<T> {
        Err(TermServiceError::Unavailable(format!(
            "no terminology service configured for {}",
            operation
        )))
    }
}

impl TermService for NoopTermService {
    fn validate_code_vs(&self, _: &ValueSet, _: &CodedValue, _: &TermParams) -> TermResult<ValidationOutcome> {
        Self::unavailable("$validate-code")
    }

    fn validate_code_cs(&self, _: &CodeSystem, _: &CodedValue, _: &TermParams) -> TermResult<ValidationOutcome> {
        Self::unavailable("$validate-code")
    }

    fn lookup(&self, _: &Coding, _: &TermParams) -> TermResult<Option<LookupOutcome>> {
        Self::unavailable("$lookup")
    }

    fn subsumes(&self, _: &Coding, _: &Coding) -> TermResult<Option<SubsumptionOutcome>> {
        Self::unavailable("$subsumes")
    }

    fn translate(&self, _: &ConceptMap, _: &CodedValue, _: &TermParams) -> TermResult<TranslationOutcome> {
        Self::unavailable("$translate")
    }

    fn expand(&self, _: &ValueSet, _: &TermParams) -> TermResult<ValueSet> {
        Self::unavailable("$expand")
    }

    fn is_expandable(&self, _: &ValueSet) -> bool {
        false
    }
}

/// Terminology answered from the resources of a [`FhirContext`].
///
/// Supports enumerated compose rules, whole-system includes, `is-a`,
/// `descendent-of` and `=` concept filters, nested value sets and
/// excludes. Other filters are reported as unsupported.
#[derive(Clone)]
pub struct InMemoryTermService {
    context: Arc<dyn FhirContext>,
}

impl InMemoryTermService {
    pub fn new(context: Arc<dyn FhirContext>) -> Self {
        Self { context }
    }

    fn code_system(&self, url: &str) -> TermResult<Arc<CodeSystem>> {
        self.context
            .get_code_system(url)
            .map_err(|e| TermServiceError::Failed(e.to_string()))?
            .ok_or_else(|| TermServiceError::NotFound(format!("CodeSystem '{}'", url)))
    }

    fn value_set(&self, url: &str) -> TermResult<Arc<ValueSet>> {
        self.context
            .get_value_set(url)
            .map_err(|e| TermServiceError::Failed(e.to_string()))?
            .ok_or_else(|| TermServiceError::NotFound(format!("ValueSet '{}'", url)))
    }

    /// Display of `coding` if the include rule admits it.
    fn include_admits(
        &self,
        include: &ValueSetInclude,
        coding: &Coding,
    ) -> TermResult<Option<Option<String>>> {
        if let (Some(wanted), Some(actual)) = (&include.system, &coding.system) {
            if wanted != actual {
                return Ok(None);
            }
        }

        let mut display = None;
        if let Some(system) = &include.system {
            if let Some(concepts) = &include.concept {
                match concepts.iter().find(|c| c.code == coding.code) {
                    Some(concept) => display = concept.display.clone(),
                    None => return Ok(None),
                }
            } else {
                let cs = self.code_system(system)?;
                let Some(concept) = cs.find_concept(&coding.code) else {
                    return Ok(None);
                };
                for filter in include.filter.iter().flatten() {
                    let admitted = match (filter.property.as_str(), filter.op.as_str()) {
                        ("concept", "is-a") => cs.subsumes(&filter.value, &coding.code),
                        ("concept", "descendent-of") => cs
                            .subsumes(&filter.value, &coding.code)
                            .map(|s| s && filter.value != coding.code),
                        ("concept", "=") => Some(filter.value == coding.code),
                        (property, op) => {
                            return Err(TermServiceError::Unsupported(format!(
                                "filter '{} {} {}'",
                                property, op, filter.value
                            )))
                        }
                    };
                    if admitted != Some(true) {
                        return Ok(None);
                    }
                }
                display = concept.display.clone();
            }
        }

        for nested in include.value_set.iter().flatten() {
            let vs = self.value_set(nested)?;
            let outcome = self.validate_code_vs(
                &vs,
                &CodedValue::Coding(coding.clone()),
                &TermParams::default(),
            )?;
            if !outcome.result {
                return Ok(None);
            }
            display = display.or(outcome.display);
        }

        Ok(Some(display))
    }

    fn expand_include(&self, include: &ValueSetInclude) -> TermResult<Vec<ValueSetExpansionContains>> {
        if include.filter.as_ref().is_some_and(|f| !f.is_empty()) {
            return Err(TermServiceError::Unsupported(
                "expansion of filtered includes".into(),
            ));
        }

        let mut contains = Vec::new();
        if let Some(system) = &include.system {
            match &include.concept {
                Some(concepts) => contains.extend(concepts.iter().map(|c| ValueSetExpansionContains {
                    system: Some(system.clone()),
                    version: include.version.clone(),
                    code: Some(c.code.clone()),
                    display: c.display.clone(),
                    ..Default::default()
                })),
                None => {
                    let cs = self.code_system(system)?;
                    flatten_concepts(cs.concept.as_deref().unwrap_or(&[]), &cs, &mut contains);
                }
            }
        }

        for nested in include.value_set.iter().flatten() {
            let vs = self.value_set(nested)?;
            let expanded = self.expand(&vs, &TermParams::default())?;
            let nested_codes: Vec<ValueSetExpansionContains> =
                expanded.expansion_codes().into_iter().cloned().collect();
            if include.system.is_some() {
                contains.retain(|c| nested_codes.iter().any(|n| n.code == c.code && n.system == c.system));
            } else {
                contains.extend(nested_codes);
            }
        }
        Ok(contains)
    }
}

fn flatten_concepts(
    concepts: &[CodeSystemConcept],
    cs: &CodeSystem,
    out: &mut Vec<ValueSetExpansionContains>,
) {
    for concept in concepts {
        out.push(ValueSetExpansionContains {
            system: Some(cs.url.clone()),
            version: cs.version.clone(),
            code: Some(concept.code.clone()),
            display: concept.display.clone(),
            ..Default::default()
        });
        if let Some(children) = &concept.concept {
            flatten_concepts(children, cs, out);
        }
    }
}

impl TermService for InMemoryTermService {
    fn validate_code_vs(
        &self,
        value_set: &ValueSet,
        coded: &CodedValue,
        _params: &TermParams,
    ) -> TermResult<ValidationOutcome> {
        let codings = coded.codings();

        if value_set.is_expanded() {
            let entries = value_set.expansion_codes();
            for coding in &codings {
                let hit = entries.iter().find(|e| {
                    e.code.as_deref() == Some(coding.code.as_str())
                        && (coding.system.is_none() || e.system == coding.system)
                });
                if let Some(entry) = hit {
                    return Ok(ValidationOutcome::valid(entry.display.clone()));
                }
            }
        } else if let Some(compose) = &value_set.compose {
            'codings: for coding in &codings {
                let mut display = None;
                let mut included = false;
                for include in &compose.include {
                    if let Some(d) = self.include_admits(include, coding)? {
                        display = d;
                        included = true;
                        break;
                    }
                }
                if !included {
                    continue;
                }
                for exclude in compose.exclude.iter().flatten() {
                    if self.include_admits(exclude, coding)?.is_some() {
                        continue 'codings;
                    }
                }
                return Ok(ValidationOutcome::valid(display));
            }
        }

        let shown: Vec<String> = codings.iter().map(render_coding).collect();
        Ok(ValidationOutcome::invalid(format!(
            "The code {} is not in the value set '{}'",
            shown.join(", "),
            value_set.url
        )))
    }

    fn validate_code_cs(
        &self,
        code_system: &CodeSystem,
        coded: &CodedValue,
        _params: &TermParams,
    ) -> TermResult<ValidationOutcome> {
        let codings = coded.codings();
        for coding in &codings {
            if coding
                .system
                .as_deref()
                .is_some_and(|s| s != code_system.url)
            {
                continue;
            }
            if let (Some(wanted), Some(actual)) = (&coding.version, &code_system.version) {
                if wanted != actual {
                    continue;
                }
            }
            if let Some(concept) = code_system.find_concept(&coding.code) {
                return Ok(ValidationOutcome::valid(concept.display.clone()));
            }
        }

        let shown: Vec<String> = codings.iter().map(render_coding).collect();
        Ok(ValidationOutcome::invalid(format!(
            "Unknown code {} in the code system '{}'",
            shown.join(", "),
            code_system.url
        )))
    }

    fn lookup(&self, coding: &Coding, _params: &TermParams) -> TermResult<Option<LookupOutcome>> {
        let system = coding
            .system
            .as_deref()
            .ok_or_else(|| TermServiceError::Failed("$lookup requires a system".into()))?;
        let cs = self.code_system(system)?;
        Ok(cs.find_concept(&coding.code).map(|concept| LookupOutcome {
            name: cs.name.clone(),
            version: cs.version.clone(),
            display: concept.display.clone(),
            definition: concept.definition.clone(),
        }))
    }

    fn subsumes(&self, a: &Coding, b: &Coding) -> TermResult<Option<SubsumptionOutcome>> {
        let (Some(system), Some(other)) = (&a.system, &b.system) else {
            return Ok(None);
        };
        if system != other {
            return Ok(None);
        }
        let cs = self.code_system(system)?;
        if cs.find_concept(&a.code).is_none() || cs.find_concept(&b.code).is_none() {
            return Ok(None);
        }
        Ok(Some(if a.code == b.code {
            SubsumptionOutcome::Equivalent
        } else if cs.subsumes(&a.code, &b.code) == Some(true) {
            SubsumptionOutcome::Subsumes
        } else if cs.subsumes(&b.code, &a.code) == Some(true) {
            SubsumptionOutcome::SubsumedBy
        } else {
            SubsumptionOutcome::NotSubsumed
        }))
    }

    fn translate(
        &self,
        concept_map: &ConceptMap,
        coded: &CodedValue,
        _params: &TermParams,
    ) -> TermResult<TranslationOutcome> {
        let mut matches = Vec::new();
        for coding in coded.codings() {
            for found in concept_map.translate(coding.system.as_deref(), &coding.code) {
                let Some(code) = &found.target.code else {
                    continue;
                };
                matches.push(TranslationMatch {
                    relationship: found.target.relationship_code().to_string(),
                    concept: Coding {
                        system: found.system.map(str::to_string),
                        version: None,
                        code: code.clone(),
                        display: found.target.display.clone(),
                    },
                    source: Some(concept_map.url.clone()),
                });
            }
        }

        let positive = matches
            .iter()
            .any(|m| !matches!(m.relationship.as_str(), "unmatched" | "disjoint" | "not-related-to"));
        Ok(TranslationOutcome {
            result: positive,
            message: (!positive).then(|| "No mappings could be found".to_string()),
            matches,
        })
    }

    fn expand(&self, value_set: &ValueSet, params: &TermParams) -> TermResult<ValueSet> {
        if value_set.is_expanded() {
            return Ok(value_set.clone());
        }
        let compose = value_set.compose.as_ref().ok_or_else(|| {
            TermServiceError::Unsupported(format!("ValueSet '{}' has no compose", value_set.url))
        })?;

        let mut contains = Vec::new();
        for include in &compose.include {
            for entry in self.expand_include(include)? {
                if !contains
                    .iter()
                    .any(|c: &ValueSetExpansionContains| c.code == entry.code && c.system == entry.system)
                {
                    contains.push(entry);
                }
            }
        }
        for exclude in compose.exclude.iter().flatten() {
            let excluded = self.expand_include(exclude)?;
            contains.retain(|c| !excluded.iter().any(|x| x.code == c.code && x.system == c.system));
        }

        let total = contains.len();
        if let Some(count) = params.get("count").and_then(|c| c.parse::<usize>().ok()) {
            contains.truncate(count);
        }

        let mut expanded = value_set.clone();
        expanded.expansion = Some(ValueSetExpansion {
            identifier: None,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            total: i32::try_from(total).ok(),
            contains: Some(contains),
        });
        Ok(expanded)
    }

    fn is_expandable(&self, value_set: &ValueSet) -> bool {
        value_set.is_expanded()
            || value_set.compose.as_ref().is_some_and(|compose| {
                compose
                    .include
                    .iter()
                    .chain(compose.exclude.iter().flatten())
                    .all(|i| i.filter.as_ref().map_or(true, Vec::is_empty))
            })
    }
}

fn render_coding(coding: &Coding) -> String {
    match &coding.system {
        Some(system) => format!("'{}#{}'", system, coding.code),
        None => format!("'{}'", coding.code),
    }
}
