//! Type lattice lookups and assignability

use ferrum_fhirpath::{FhirPathType, TypeNamespace};

#[test]
fn test_name_lookup() {
    assert_eq!(FhirPathType::from_name("Patient"), Some(FhirPathType::Patient));
    assert_eq!(FhirPathType::from_name("FHIR.Patient"), Some(FhirPathType::Patient));
    assert_eq!(FhirPathType::from_name("System.String"), Some(FhirPathType::SystemString));
    assert_eq!(FhirPathType::from_name("string"), Some(FhirPathType::FhirString));
    assert_eq!(FhirPathType::from_name("Integer"), Some(FhirPathType::SystemInteger));
    assert_eq!(FhirPathType::from_name("FHIR.`Quantity`"), Some(FhirPathType::Quantity));
    assert_eq!(FhirPathType::from_name("Nope.Patient"), None);
    assert_eq!(FhirPathType::from_name("Spaceship"), None);
}

#[test]
fn test_qualified_names() {
    assert_eq!(FhirPathType::Patient.qualified_name(), "FHIR.Patient");
    assert_eq!(FhirPathType::SystemDecimal.qualified_name(), "System.Decimal");
    assert_eq!(FhirPathType::Code.namespace(), TypeNamespace::Fhir);
}

#[test]
fn test_assignability_follows_the_hierarchy() {
    use FhirPathType::*;

    assert!(Element.is_assignable_from(Some(Quantity)));
    assert!(!Quantity.is_assignable_from(Some(Element)));
    assert!(Quantity.is_assignable_from(Some(SimpleQuantity)));
    assert!(Resource.is_assignable_from(Some(Patient)));
    assert!(DomainResource.is_assignable_from(Some(Observation)));
    assert!(!Patient.is_assignable_from(Some(Observation)));
    assert!(Resource.is_assignable_from(Some(Bundle)));
}

#[test]
fn test_assignability_is_reflexive_and_accepts_no_type() {
    for ty in FhirPathType::ALL {
        assert!(ty.is_assignable_from(Some(*ty)), "{} not reflexive", ty);
        assert!(ty.is_assignable_from(None), "{} rejects no type", ty);
    }
}

#[test]
fn test_namespace_roots() {
    use FhirPathType::*;

    assert!(FhirAny.is_assignable_from(Some(Patient)));
    assert!(FhirAny.is_assignable_from(Some(FhirString)));
    assert!(SystemAny.is_assignable_from(Some(SystemString)));
    assert!(!SystemAny.is_assignable_from(Some(FhirString)));
    assert!(!FhirAny.is_assignable_from(Some(SystemInteger)));
}

#[test]
fn test_unknown_resource_type_matches_any_resource() {
    use FhirPathType::*;

    assert!(Patient.is_assignable_from(Some(UnknownResourceType)));
    assert!(UnknownResourceType.is_assignable_from(Some(Organization)));
    assert!(!HumanName.is_assignable_from(Some(UnknownResourceType)));
}

#[test]
fn test_type_families() {
    use FhirPathType::*;

    assert!(Code.is_string_like());
    assert!(Uri.is_primitive_type());
    assert!(!HumanName.is_primitive_type());
    assert!(Age.is_quantity_type());
    assert!(SystemQuantity.is_quantity_type());
    assert!(Patient.is_resource_type());
    assert!(!Coding.is_resource_type());
    assert_eq!(PositiveInt.system_equivalent(), Some(SystemInteger));
    assert_eq!(Instant.system_equivalent(), Some(SystemDateTime));
    assert_eq!(Canonical.system_equivalent(), Some(SystemString));
    assert_eq!(Coding.system_equivalent(), None);
}
