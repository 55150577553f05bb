#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ferrum_context::InMemoryContext;
use ferrum_fhirpath::ast::Expr;
use ferrum_fhirpath::term::{
    CodedValue, Coding, LookupOutcome, SubsumptionOutcome, TermParams, TermResult, TermService,
    TermServiceError, TranslationOutcome, ValidationOutcome,
};
use ferrum_fhirpath::{
    Collection, ConstraintValidator, EvaluationContext, Evaluator, FhirPathTree, Node,
};
use ferrum_models::{
    CodeSystem, ConceptMap, ConstraintSeverity, ElementDefinition, ElementDefinitionConstraint,
    StructureDefinition, StructureDefinitionKind, ValueSet,
};
use serde_json::{json, Value};

pub const PROFILE_URL: &str = "http://example.org/fhir/StructureDefinition/named-patient";

pub fn patient_json() -> Value {
    json!({
        "resourceType": "Patient",
        "id": "p1",
        "active": true,
        "gender": "female",
        "birthDate": "1974-12-25",
        "name": [
            { "use": "official", "family": "Chalmers", "given": ["Peter", "James"] },
            { "use": "usual", "given": ["Jim"] }
        ],
        "contained": [
            { "resourceType": "Organization", "id": "org1", "name": "Clinic" }
        ],
        "managingOrganization": { "reference": "#org1" },
        "extension": [
            {
                "url": "http://hl7.org/fhir/StructureDefinition/patient-birthPlace",
                "valueString": "Springfield"
            }
        ]
    })
}

pub fn observation_json() -> Value {
    json!({
        "resourceType": "Observation",
        "id": "o1",
        "status": "final",
        "code": {
            "coding": [{ "system": "http://loinc.org", "code": "29463-7", "display": "Body weight" }]
        },
        "subject": { "reference": "Patient/p1" },
        "valueQuantity": {
            "value": 72.5,
            "unit": "kg",
            "system": "http://unitsofmeasure.org",
            "code": "kg"
        }
    })
}

pub fn bundle_json() -> Value {
    json!({
        "resourceType": "Bundle",
        "type": "collection",
        "entry": [
            {
                "fullUrl": "http://example.org/fhir/Patient/p1",
                "resource": patient_json()
            },
            {
                "fullUrl": "http://example.org/fhir/Observation/o1",
                "resource": observation_json()
            }
        ]
    })
}

pub fn tree(json: &Value) -> FhirPathTree {
    FhirPathTree::from_json(json).expect("fixture has a resourceType")
}

pub fn context(json: &Value) -> EvaluationContext {
    EvaluationContext::from_resource(json).expect("fixture has a resourceType")
}

pub fn eval(ctx: &mut EvaluationContext, expr: &Expr) -> Collection {
    Evaluator::default()
        .evaluate_root(ctx, expr)
        .unwrap_or_else(|e| panic!("evaluation failed: {}", e))
}

pub fn strings(collection: &Collection) -> Vec<String> {
    collection
        .iter()
        .filter_map(Node::system_value)
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

pub fn boolean(collection: &Collection) -> Option<bool> {
    collection.as_boolean().expect("singleton or empty")
}

/// A Patient profile requiring a family name (error) and a birth date
/// (warning).
pub fn named_patient_profile() -> StructureDefinition {
    StructureDefinition::new(PROFILE_URL, "NamedPatient", StructureDefinitionKind::Resource, "Patient")
        .with_snapshot(vec![
            ElementDefinition::new("Patient")
                .with_constraint(ElementDefinitionConstraint::new(
                    "np-1",
                    ConstraintSeverity::Error,
                    "A family name is required",
                    "name.family.exists()",
                ))
                .with_constraint(ElementDefinitionConstraint::new(
                    "np-2",
                    ConstraintSeverity::Warning,
                    "A birth date should be present",
                    "birthDate.exists()",
                )),
            ElementDefinition::new("Patient.name").with_constraint(ElementDefinitionConstraint::new(
                "np-3",
                ConstraintSeverity::Error,
                "Names carry a use",
                "use.exists()",
            )),
        ])
}

pub fn fhir_context_with(profile: &StructureDefinition) -> Arc<InMemoryContext> {
    let mut fhir = InMemoryContext::new();
    fhir.add_structure_definition(profile)
        .expect("profile has a url");
    Arc::new(fhir)
}

/// Counts constraint checks and answers from a fixed verdict per key.
#[derive(Debug, Default)]
pub struct CountingValidator {
    calls: AtomicUsize,
    failing: Vec<String>,
}

impl CountingValidator {
    pub fn failing(keys: &[&str]) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failing: keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ConstraintValidator for CountingValidator {
    fn validate(
        &self,
        _ctx: &mut EvaluationContext,
        _node: &Node,
        _element: &ElementDefinition,
        constraint: &ElementDefinitionConstraint,
    ) -> ferrum_fhirpath::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(!self.failing.contains(&constraint.key))
    }
}

/// A terminology service that answers every validation with a scripted
/// outcome and records the codes it was asked about.
#[derive(Debug)]
pub struct ScriptedTermService {
    outcome: TermResult<ValidationOutcome>,
    seen: Mutex<Vec<CodedValue>>,
}

impl ScriptedTermService {
    pub fn answering(outcome: ValidationOutcome) -> Self {
        Self {
            outcome: Ok(outcome),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            outcome: Err(TermServiceError::Unavailable(reason.to_string())),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<CodedValue> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(&self, coded: &CodedValue) -> TermResult<ValidationOutcome> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(coded.clone());
        }
        self.outcome.clone()
    }
}

impl TermService for ScriptedTermService {
    fn validate_code_vs(&self, _vs: &ValueSet, coded: &CodedValue, _params: &TermParams) -> TermResult<ValidationOutcome> {
        self.record(coded)
    }

    fn validate_code_cs(&self, _cs: &CodeSystem, coded: &CodedValue, _params: &TermParams) -> TermResult<ValidationOutcome> {
        self.record(coded)
    }

    fn lookup(&self, _coding: &Coding, _params: &TermParams) -> TermResult<Option<LookupOutcome>> {
        Err(TermServiceError::Unsupported("lookup".into()))
    }

    fn subsumes(&self, _a: &Coding, _b: &Coding) -> TermResult<Option<SubsumptionOutcome>> {
        Err(TermServiceError::Unsupported("subsumes".into()))
    }

    fn translate(&self, _cm: &ConceptMap, _coded: &CodedValue, _params: &TermParams) -> TermResult<TranslationOutcome> {
        Err(TermServiceError::Unsupported("translate".into()))
    }

    fn expand(&self, _vs: &ValueSet, _params: &TermParams) -> TermResult<ValueSet> {
        Err(TermServiceError::Unsupported("expand".into()))
    }

    fn is_expandable(&self, _vs: &ValueSet) -> bool {
        false
    }
}
