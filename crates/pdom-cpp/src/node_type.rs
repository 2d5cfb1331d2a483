//! Persisted node kind tags.
//!
//! Every concrete binding kind has a globally unique small-integer constant,
//! written once into the record header at construction and used as the sole
//! discriminant when a wrapper is reconstructed from a record. Adding a kind
//! means allocating a fresh constant; reusing a retired one would silently
//! corrupt old databases.

pub const LINKAGE_HEADER: i16 = 0;
pub const CLASS_TYPE: i16 = 1;
pub const FUNCTION: i16 = 2;
pub const METHOD: i16 = 3;
pub const CONSTRUCTOR: i16 = 4;
pub const VARIABLE: i16 = 5;
pub const FIELD: i16 = 6;
pub const ENUMERATION: i16 = 7;
pub const ENUMERATOR: i16 = 8;
pub const NAMESPACE: i16 = 9;
pub const NAMESPACE_ALIAS: i16 = 10;
pub const TYPEDEF: i16 = 11;
pub const CLASS_TEMPLATE: i16 = 12;
pub const FUNCTION_TEMPLATE: i16 = 13;
pub const VARIABLE_TEMPLATE: i16 = 14;
pub const ALIAS_TEMPLATE: i16 = 15;
pub const CONCEPT: i16 = 16;
pub const TEMPLATE_PARAMETER: i16 = 17;
pub const PARAMETER: i16 = 18;
pub const CLASS_SPECIALIZATION: i16 = 19;
pub const CLASS_INSTANCE: i16 = 20;
pub const PARTIAL_SPECIALIZATION: i16 = 21;
pub const FUNCTION_SPECIALIZATION: i16 = 22;
pub const FUNCTION_INSTANCE: i16 = 23;
pub const METHOD_SPECIALIZATION: i16 = 24;
pub const METHOD_INSTANCE: i16 = 25;
pub const CONSTRUCTOR_SPECIALIZATION: i16 = 26;
pub const CONSTRUCTOR_INSTANCE: i16 = 27;
pub const FIELD_SPECIALIZATION: i16 = 28;
pub const VARIABLE_INSTANCE: i16 = 29;

/// Kinds that can share a name with siblings and are disambiguated by
/// signature hash in the scope indices.
pub const fn is_overloadable(tag: i16) -> bool {
    matches!(
        tag,
        FUNCTION
            | METHOD
            | CONSTRUCTOR
            | FUNCTION_TEMPLATE
            | FUNCTION_SPECIALIZATION
            | FUNCTION_INSTANCE
            | METHOD_SPECIALIZATION
            | METHOD_INSTANCE
            | CONSTRUCTOR_SPECIALIZATION
            | CONSTRUCTOR_INSTANCE
            | PARTIAL_SPECIALIZATION
            | CLASS_INSTANCE
            | VARIABLE_INSTANCE
    )
}

/// Kinds whose records carry the function record fields.
pub const fn is_function_kind(tag: i16) -> bool {
    matches!(
        tag,
        FUNCTION
            | METHOD
            | CONSTRUCTOR
            | FUNCTION_TEMPLATE
            | FUNCTION_SPECIALIZATION
            | FUNCTION_INSTANCE
            | METHOD_SPECIALIZATION
            | METHOD_INSTANCE
            | CONSTRUCTOR_SPECIALIZATION
            | CONSTRUCTOR_INSTANCE
    )
}

/// Kinds whose records carry a base list and member blocks.
pub const fn is_class_kind(tag: i16) -> bool {
    matches!(
        tag,
        CLASS_TYPE
            | CLASS_TEMPLATE
            | PARTIAL_SPECIALIZATION
            | CLASS_SPECIALIZATION
            | CLASS_INSTANCE
    )
}

/// Kinds whose records carry the specialization header (specialized
/// binding, signature hash, template parameter map).
pub const fn is_specialization(tag: i16) -> bool {
    matches!(
        tag,
        CLASS_SPECIALIZATION
            | CLASS_INSTANCE
            | FUNCTION_SPECIALIZATION
            | FUNCTION_INSTANCE
            | METHOD_SPECIALIZATION
            | METHOD_INSTANCE
            | CONSTRUCTOR_SPECIALIZATION
            | CONSTRUCTOR_INSTANCE
            | FIELD_SPECIALIZATION
            | VARIABLE_INSTANCE
    )
}

/// Kinds that are template instances (specializations carrying concrete
/// arguments).
pub const fn is_instance(tag: i16) -> bool {
    matches!(
        tag,
        CLASS_INSTANCE
            | FUNCTION_INSTANCE
            | METHOD_INSTANCE
            | CONSTRUCTOR_INSTANCE
            | VARIABLE_INSTANCE
    )
}

pub const fn is_template(tag: i16) -> bool {
    matches!(
        tag,
        CLASS_TEMPLATE | FUNCTION_TEMPLATE | VARIABLE_TEMPLATE | ALIAS_TEMPLATE | CONCEPT
            | PARTIAL_SPECIALIZATION
    )
}

pub fn name(tag: i16) -> &'static str {
    match tag {
        LINKAGE_HEADER => "LinkageHeader",
        CLASS_TYPE => "ClassType",
        FUNCTION => "Function",
        METHOD => "Method",
        CONSTRUCTOR => "Constructor",
        VARIABLE => "Variable",
        FIELD => "Field",
        ENUMERATION => "Enumeration",
        ENUMERATOR => "Enumerator",
        NAMESPACE => "Namespace",
        NAMESPACE_ALIAS => "NamespaceAlias",
        TYPEDEF => "Typedef",
        CLASS_TEMPLATE => "ClassTemplate",
        FUNCTION_TEMPLATE => "FunctionTemplate",
        VARIABLE_TEMPLATE => "VariableTemplate",
        ALIAS_TEMPLATE => "AliasTemplate",
        CONCEPT => "Concept",
        TEMPLATE_PARAMETER => "TemplateParameter",
        PARAMETER => "Parameter",
        CLASS_SPECIALIZATION => "ClassSpecialization",
        CLASS_INSTANCE => "ClassInstance",
        PARTIAL_SPECIALIZATION => "PartialSpecialization",
        FUNCTION_SPECIALIZATION => "FunctionSpecialization",
        FUNCTION_INSTANCE => "FunctionInstance",
        METHOD_SPECIALIZATION => "MethodSpecialization",
        METHOD_INSTANCE => "MethodInstance",
        CONSTRUCTOR_SPECIALIZATION => "ConstructorSpecialization",
        CONSTRUCTOR_INSTANCE => "ConstructorInstance",
        FIELD_SPECIALIZATION => "FieldSpecialization",
        VARIABLE_INSTANCE => "VariableInstance",
        _ => "<unknown>",
    }
}
