//! Type lattice for FHIRPath
//!
//! Every value a FHIRPath expression can produce has a type drawn from a fixed,
//! enumerable set spread over two namespaces:
//! - `FHIR`: primitive, complex and resource types of the data model, plus the
//!   `UnknownResourceType` sentinel and the `TermService` pseudo-type
//! - `System`: the FHIRPath primitive types and the reflection (metamodel) types
//!
//! Types form a forest of single-inheritance chains rooted at `FHIR.Any` and
//! `System.Any`. The table is built in two phases: the identities are declared
//! by [`fhirpath_types!`], then [`FhirPathType::base_type`] wires the edges with
//! an exhaustive match, so no type ever refers to one not yet constructed.

use std::fmt;
use std::iter;

/// Fully-qualified type namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeNamespace {
    Fhir,
    System,
}

impl TypeNamespace {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeNamespace::Fhir => "FHIR",
            TypeNamespace::System => "System",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "FHIR" => Some(TypeNamespace::Fhir),
            "System" => Some(TypeNamespace::System),
            _ => None,
        }
    }
}

impl fmt::Display for TypeNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! fhirpath_types {
    (
        fhir { $($fv:ident => $fname:tt),* $(,)? }
        system { $($sv:ident => $sname:tt),* $(,)? }
    ) => {
        /// A named type in the FHIRPath type lattice.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum FhirPathType {
            $($fv,)*
            $($sv,)*
        }

        impl FhirPathType {
            /// Every type, FHIR namespace first.
            pub const ALL: &'static [FhirPathType] = &[
                $(FhirPathType::$fv,)*
                $(FhirPathType::$sv,)*
            ];

            /// Short (unqualified) name.
            pub fn name(self) -> &'static str {
                match self {
                    $(FhirPathType::$fv => $fname,)*
                    $(FhirPathType::$sv => $sname,)*
                }
            }

            pub fn namespace(self) -> TypeNamespace {
                match self {
                    $(FhirPathType::$fv => TypeNamespace::Fhir,)*
                    $(FhirPathType::$sv => TypeNamespace::System,)*
                }
            }
        }

        static FHIR_TYPES: phf::Map<&'static str, FhirPathType> = phf::phf_map! {
            $($fname => FhirPathType::$fv,)*
        };

        static SYSTEM_TYPES: phf::Map<&'static str, FhirPathType> = phf::phf_map! {
            $($sname => FhirPathType::$sv,)*
        };
    };
}

fhirpath_types! {
    fhir {
        FhirAny => "Any",

        // Primitive types
        FhirBoolean => "boolean",
        FhirInteger => "integer",
        PositiveInt => "positiveInt",
        UnsignedInt => "unsignedInt",
        Integer64 => "integer64",
        FhirDecimal => "decimal",
        FhirString => "string",
        Code => "code",
        Id => "id",
        Markdown => "markdown",
        Uri => "uri",
        Url => "url",
        Canonical => "canonical",
        Oid => "oid",
        Uuid => "uuid",
        Base64Binary => "base64Binary",
        Instant => "instant",
        FhirDate => "date",
        FhirDateTime => "dateTime",
        FhirTime => "time",
        Xhtml => "xhtml",

        // Complex types
        Element => "Element",
        BackboneElement => "BackboneElement",
        Extension => "Extension",
        Quantity => "Quantity",
        Age => "Age",
        Count => "Count",
        Distance => "Distance",
        Duration => "Duration",
        MoneyQuantity => "MoneyQuantity",
        SimpleQuantity => "SimpleQuantity",
        Money => "Money",
        Coding => "Coding",
        CodeableConcept => "CodeableConcept",
        Reference => "Reference",
        Identifier => "Identifier",
        HumanName => "HumanName",
        Address => "Address",
        ContactPoint => "ContactPoint",
        Period => "Period",
        Range => "Range",
        Ratio => "Ratio",
        Attachment => "Attachment",
        Annotation => "Annotation",
        Meta => "Meta",
        Narrative => "Narrative",
        Timing => "Timing",
        Dosage => "Dosage",
        SampledData => "SampledData",
        Signature => "Signature",

        // Resource types
        Resource => "Resource",
        DomainResource => "DomainResource",
        Bundle => "Bundle",
        Parameters => "Parameters",
        Binary => "Binary",
        Patient => "Patient",
        Practitioner => "Practitioner",
        Organization => "Organization",
        Observation => "Observation",
        Condition => "Condition",
        Encounter => "Encounter",
        Procedure => "Procedure",
        MedicationRequest => "MedicationRequest",
        StructureDefinition => "StructureDefinition",
        ValueSet => "ValueSet",
        CodeSystem => "CodeSystem",
        ConceptMap => "ConceptMap",
        OperationOutcome => "OperationOutcome",
        UnknownResourceType => "UnknownResourceType",

        TermService => "TermService",
    }
    system {
        SystemAny => "Any",
        SystemBoolean => "Boolean",
        SystemString => "String",
        SystemInteger => "Integer",
        SystemDecimal => "Decimal",
        SystemDate => "Date",
        SystemDateTime => "DateTime",
        SystemTime => "Time",
        SystemQuantity => "Quantity",

        // Reflection types
        ClassInfo => "ClassInfo",
        ClassInfoElement => "ClassInfoElement",
        ListTypeInfo => "ListTypeInfo",
        TupleTypeInfo => "TupleTypeInfo",
        TupleTypeInfoElement => "TupleTypeInfoElement",
        SimpleTypeInfo => "SimpleTypeInfo",
    }
}

/// Broad category of a data-model class, used when no exact type mapping exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelCategory {
    Resource,
    Element,
    BackboneElement,
    Code,
}

/// Host primitive representations that map onto System types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostPrimitive {
    Boolean,
    Integer,
    Decimal,
    String,
    Date,
    DateTime,
    Time,
    Quantity,
}

/// Description of a host class for [`FhirPathType::type_of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostClass<'a> {
    /// A reflection descriptor class (`ClassInfo`, `SimpleTypeInfo`, ...)
    Metamodel(&'a str),
    /// A class of the structured data model
    Model {
        name: &'a str,
        category: ModelCategory,
    },
    /// A primitive host value
    Primitive(HostPrimitive),
}

impl FhirPathType {
    /// Direct base type; `None` for the namespace roots.
    pub fn base_type(self) -> Option<FhirPathType> {
        use FhirPathType::*;
        match self {
            FhirAny | SystemAny => None,

            FhirBoolean | FhirInteger | PositiveInt | UnsignedInt | Integer64 | FhirDecimal
            | FhirString | Code | Id | Markdown | Uri | Url | Canonical | Oid | Uuid
            | Base64Binary | Instant | FhirDate | FhirDateTime | FhirTime | Xhtml => Some(Element),

            Element => Some(FhirAny),
            BackboneElement => Some(Element),
            Extension | Quantity | Money | Coding | CodeableConcept | Reference | Identifier
            | HumanName | Address | ContactPoint | Period | Range | Ratio | Attachment
            | Annotation | Meta | Narrative | SampledData | Signature => Some(Element),
            Timing | Dosage => Some(BackboneElement),
            Age | Count | Distance | Duration | MoneyQuantity | SimpleQuantity => Some(Quantity),

            Resource => Some(FhirAny),
            DomainResource => Some(Resource),
            Bundle | Parameters | Binary | UnknownResourceType => Some(Resource),
            Patient | Practitioner | Organization | Observation | Condition | Encounter
            | Procedure | MedicationRequest | StructureDefinition | ValueSet | CodeSystem
            | ConceptMap | OperationOutcome => Some(DomainResource),

            TermService => Some(FhirAny),

            SystemBoolean | SystemString | SystemInteger | SystemDecimal | SystemDate
            | SystemDateTime | SystemTime | SystemQuantity => Some(SystemAny),
            ClassInfo | ClassInfoElement | ListTypeInfo | TupleTypeInfo
            | TupleTypeInfoElement | SimpleTypeInfo => Some(SystemAny),
        }
    }

    /// Transitive base types, nearest first.
    pub fn ancestors(self) -> impl Iterator<Item = FhirPathType> {
        iter::successors(self.base_type(), |t| t.base_type())
    }

    /// `Namespace.name`
    pub fn qualified_name(self) -> String {
        format!("{}.{}", self.namespace(), self.name())
    }

    pub fn is_namespace_root(self) -> bool {
        matches!(self, FhirPathType::FhirAny | FhirPathType::SystemAny)
    }

    /// Whether a value of type `other` can be used where `self` is expected.
    ///
    /// `None` stands for "no type" and is assignable to everything. The
    /// `UnknownResourceType` sentinel is compatible with every resource type
    /// in both directions.
    pub fn is_assignable_from(self, other: Option<FhirPathType>) -> bool {
        let Some(other) = other else {
            return true;
        };
        if self == other {
            return true;
        }
        if other == FhirPathType::UnknownResourceType && self.is_resource_type() {
            return true;
        }
        if self == FhirPathType::UnknownResourceType && other.is_resource_type() {
            return true;
        }
        if self.is_namespace_root() && self.namespace() == other.namespace() {
            return true;
        }
        other.ancestors().any(|t| t == self)
    }

    /// Look up a type by name.
    ///
    /// Qualified names (`FHIR.Patient`, `System.String`) resolve in their
    /// namespace; unqualified names try FHIR first, then System.
    pub fn from_name(name: &str) -> Option<FhirPathType> {
        let name = name.trim_matches('`');
        if let Some((namespace, short)) = name.split_once('.') {
            let namespace = TypeNamespace::from_name(namespace)?;
            return Self::from_namespace_name(namespace, short.trim_matches('`'));
        }
        FHIR_TYPES
            .get(name)
            .or_else(|| SYSTEM_TYPES.get(name))
            .copied()
    }

    pub fn from_namespace_name(namespace: TypeNamespace, name: &str) -> Option<FhirPathType> {
        let table = match namespace {
            TypeNamespace::Fhir => &FHIR_TYPES,
            TypeNamespace::System => &SYSTEM_TYPES,
        };
        table.get(name).copied()
    }

    /// Resolve the type of a host class.
    pub fn type_of(class: HostClass<'_>) -> Option<FhirPathType> {
        match class {
            HostClass::Metamodel(name) => SYSTEM_TYPES
                .get(name)
                .copied()
                .filter(|t| t.is_metamodel_type()),
            HostClass::Model { name, category } => {
                FHIR_TYPES.get(name).copied().or(match category {
                    ModelCategory::BackboneElement => Some(FhirPathType::BackboneElement),
                    ModelCategory::Code => Some(FhirPathType::Code),
                    ModelCategory::Resource | ModelCategory::Element => None,
                })
            }
            HostClass::Primitive(primitive) => Some(match primitive {
                HostPrimitive::Boolean => FhirPathType::SystemBoolean,
                HostPrimitive::Integer => FhirPathType::SystemInteger,
                HostPrimitive::Decimal => FhirPathType::SystemDecimal,
                HostPrimitive::String => FhirPathType::SystemString,
                HostPrimitive::Date => FhirPathType::SystemDate,
                HostPrimitive::DateTime => FhirPathType::SystemDateTime,
                HostPrimitive::Time => FhirPathType::SystemTime,
                HostPrimitive::Quantity => FhirPathType::SystemQuantity,
            }),
        }
    }

    pub fn is_system_type(self) -> bool {
        self.namespace() == TypeNamespace::System
    }

    pub fn is_metamodel_type(self) -> bool {
        use FhirPathType::*;
        matches!(
            self,
            ClassInfo
                | ClassInfoElement
                | ListTypeInfo
                | TupleTypeInfo
                | TupleTypeInfoElement
                | SimpleTypeInfo
        )
    }

    pub fn is_resource_type(self) -> bool {
        self == FhirPathType::Resource || self.ancestors().any(|t| t == FhirPathType::Resource)
    }

    /// FHIR primitive data types (`boolean`, `string`, `dateTime`, ...).
    pub fn is_primitive_type(self) -> bool {
        self.namespace() == TypeNamespace::Fhir
            && self.base_type() == Some(FhirPathType::Element)
            && self.name().starts_with(|c: char| c.is_ascii_lowercase())
    }

    /// Types whose values are character data.
    pub fn is_string_like(self) -> bool {
        use FhirPathType::*;
        matches!(
            self,
            FhirString
                | Code
                | Id
                | Markdown
                | Uri
                | Url
                | Canonical
                | Oid
                | Uuid
                | Base64Binary
                | Xhtml
                | SystemString
        )
    }

    /// `Quantity` in either namespace, or one of its FHIR profiles.
    pub fn is_quantity_type(self) -> bool {
        self == FhirPathType::SystemQuantity
            || FhirPathType::Quantity.is_assignable_from(Some(self))
    }

    /// Primitive types that map to the given System type.
    pub fn system_equivalent(self) -> Option<FhirPathType> {
        use FhirPathType::*;
        match self {
            FhirBoolean => Some(SystemBoolean),
            FhirInteger | PositiveInt | UnsignedInt | Integer64 => Some(SystemInteger),
            FhirDecimal => Some(SystemDecimal),
            FhirDate => Some(SystemDate),
            FhirDateTime | Instant => Some(SystemDateTime),
            FhirTime => Some(SystemTime),
            t if t.is_string_like() => Some(SystemString),
            t if t.is_system_type() => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for FhirPathType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace(), self.name())
    }
}
