//! Persisted record layouts and reconstruction.
//!
//! Every record kind declares its byte offsets as `FIELD = super
//! RECORD_SIZE + k` constants and a terminal `RECORD_SIZE`; fields are read
//! and written exclusively through the database scalar accessors. Growing a
//! kind's `RECORD_SIZE` once records exist in a live database is a format
//! break.
//!
//! Several kinds share field groups (class-ish records all carry a base
//! list and member blocks; function-ish records all carry a parameter list
//! and a function type) at kind-dependent offsets. The `*_fields` tables
//! here are the capability markers: a kind either has the field group at a
//! known offset or does not have the capability at all.

pub mod class_type;
pub mod enumeration;
pub mod function;
pub mod member_block;
pub mod namespace;
pub mod specialization;
pub mod template;
pub mod variable;

use crate::node_type;
use pdom_common::{RecordRef, Result};
use pdom_db::Database;

/// Common node header, present on every persisted record.
pub mod node_layout {
    /// i16 kind tag, written once at construction.
    pub const NODE_TYPE: u64 = 0;
    /// Owning parent scope record.
    pub const PARENT: u64 = 2;
    pub const RECORD_SIZE: u64 = 10;
}

/// Named binding header: node + external name + lifecycle flags.
pub mod binding_layout {
    use super::node_layout;

    /// String record holding the binding's name.
    pub const NAME: u64 = node_layout::RECORD_SIZE;
    /// u8 flag byte, see `binding_flags`.
    pub const FLAGS: u64 = node_layout::RECORD_SIZE + 8;
    pub const RECORD_SIZE: u64 = node_layout::RECORD_SIZE + 9;
}

pub mod binding_flags {
    /// Set once a non-local ("lasting") definition has been indexed.
    pub const HAS_DEFINITION: u8 = 1 << 0;
}

pub fn node_tag(db: &Database, rec: RecordRef) -> Result<i16> {
    db.get_short(rec, node_layout::NODE_TYPE)
}

pub fn parent_of(db: &Database, rec: RecordRef) -> Result<RecordRef> {
    db.get_rec(rec, node_layout::PARENT)
}

pub fn name_rec(db: &Database, rec: RecordRef) -> Result<RecordRef> {
    db.get_rec(rec, binding_layout::NAME)
}

pub fn name_bytes<'a>(db: &'a Database, rec: RecordRef) -> Result<&'a [u8]> {
    db.string_bytes(name_rec(db, rec)?)
}

pub fn has_definition(db: &Database, rec: RecordRef) -> Result<bool> {
    Ok(db.get_byte(rec, binding_layout::FLAGS)? & binding_flags::HAS_DEFINITION != 0)
}

pub fn mark_definition(db: &mut Database, rec: RecordRef) -> Result<()> {
    let flags = db.get_byte(rec, binding_layout::FLAGS)?;
    db.put_byte(rec, binding_layout::FLAGS, flags | binding_flags::HAS_DEFINITION)
}

/// Writes the common header of a fresh binding record.
pub fn init_binding(
    db: &mut Database,
    rec: RecordRef,
    tag: i16,
    parent: RecordRef,
    name: &[u8],
) -> Result<()> {
    db.put_short(rec, node_layout::NODE_TYPE, tag)?;
    db.put_rec(rec, node_layout::PARENT, parent)?;
    let name_rec = db.new_string(name)?;
    db.put_rec(rec, binding_layout::NAME, name_rec)?;
    Ok(())
}

// ---------------------------------------------------------------------
// Capability field tables
// ---------------------------------------------------------------------

/// Offsets of the class field group for class-ish kinds.
#[derive(Debug, Clone, Copy)]
pub struct ClassFields {
    pub first_base: u64,
    pub first_member_block: u64,
    pub annotation: u64,
    pub key: u64,
}

pub const fn class_fields(tag: i16) -> Option<ClassFields> {
    match tag {
        node_type::CLASS_TYPE | node_type::CLASS_TEMPLATE | node_type::PARTIAL_SPECIALIZATION => {
            Some(ClassFields {
                first_base: class_type::layout::FIRST_BASE,
                first_member_block: class_type::layout::FIRST_MEMBER_BLOCK,
                annotation: class_type::layout::ANNOTATION,
                key: class_type::layout::KEY,
            })
        }
        node_type::CLASS_SPECIALIZATION | node_type::CLASS_INSTANCE => Some(ClassFields {
            first_base: specialization::class_spec_layout::FIRST_BASE,
            first_member_block: specialization::class_spec_layout::FIRST_MEMBER_BLOCK,
            annotation: specialization::class_spec_layout::ANNOTATION,
            key: specialization::class_spec_layout::KEY,
        }),
        _ => None,
    }
}

/// Offsets of the function field group for function-ish kinds.
#[derive(Debug, Clone, Copy)]
pub struct FunctionFields {
    pub first_parameter: u64,
    pub function_type: u64,
    pub required_args: u64,
    pub exception_spec: u64,
    pub annotation: u64,
    pub execution: u64,
}

pub const fn function_fields(tag: i16) -> Option<FunctionFields> {
    match tag {
        node_type::FUNCTION
        | node_type::METHOD
        | node_type::CONSTRUCTOR
        | node_type::FUNCTION_TEMPLATE => Some(FunctionFields {
            first_parameter: function::layout::FIRST_PARAMETER,
            function_type: function::layout::FUNCTION_TYPE,
            required_args: function::layout::REQUIRED_ARGS,
            exception_spec: function::layout::EXCEPTION_SPEC,
            annotation: function::layout::ANNOTATION,
            execution: function::layout::EXECUTION,
        }),
        node_type::FUNCTION_SPECIALIZATION
        | node_type::FUNCTION_INSTANCE
        | node_type::METHOD_SPECIALIZATION
        | node_type::METHOD_INSTANCE
        | node_type::CONSTRUCTOR_SPECIALIZATION
        | node_type::CONSTRUCTOR_INSTANCE => Some(FunctionFields {
            first_parameter: specialization::function_spec_layout::FIRST_PARAMETER,
            function_type: specialization::function_spec_layout::FUNCTION_TYPE,
            required_args: specialization::function_spec_layout::REQUIRED_ARGS,
            exception_spec: specialization::function_spec_layout::EXCEPTION_SPEC,
            annotation: specialization::function_spec_layout::ANNOTATION,
            execution: specialization::function_spec_layout::EXECUTION,
        }),
        _ => None,
    }
}

/// Offset of the stored signature hash, for kinds that have one.
pub const fn signature_hash_field(tag: i16) -> Option<u64> {
    if node_type::is_specialization(tag) {
        Some(specialization::spec_layout::SIG_HASH)
    } else if matches!(tag, node_type::PARTIAL_SPECIALIZATION) {
        Some(template::partial_layout::SIG_HASH)
    } else if node_type::is_function_kind(tag) {
        Some(function::layout::SIG_HASH)
    } else {
        None
    }
}

/// Offset of the stored template-argument list, for instance kinds and
/// partial specializations.
pub const fn arguments_field(tag: i16) -> Option<u64> {
    match tag {
        node_type::CLASS_INSTANCE => Some(specialization::class_instance_layout::ARGUMENTS),
        node_type::FUNCTION_INSTANCE
        | node_type::METHOD_INSTANCE
        | node_type::CONSTRUCTOR_INSTANCE => {
            Some(specialization::function_instance_layout::ARGUMENTS)
        }
        node_type::VARIABLE_INSTANCE => Some(specialization::variable_instance_layout::ARGUMENTS),
        node_type::PARTIAL_SPECIALIZATION => Some(template::partial_layout::ARGUMENTS),
        _ => None,
    }
}

/// Offset of the template-parameter array, for template kinds.
pub const fn template_params_field(tag: i16) -> Option<u64> {
    match tag {
        node_type::CLASS_TEMPLATE | node_type::PARTIAL_SPECIALIZATION => {
            Some(template::class_template_layout::TEMPLATE_PARAMS)
        }
        node_type::FUNCTION_TEMPLATE => Some(template::function_template_layout::TEMPLATE_PARAMS),
        node_type::VARIABLE_TEMPLATE => Some(template::variable_template_layout::TEMPLATE_PARAMS),
        node_type::ALIAS_TEMPLATE => Some(template::alias_template_layout::TEMPLATE_PARAMS),
        node_type::CONCEPT => Some(template::concept_layout::TEMPLATE_PARAMS),
        _ => None,
    }
}

/// Offset of the scope index tree root, for kinds that index children in a
/// tree (the linkage header itself is handled by the linkage).
pub const fn index_field(tag: i16) -> Option<u64> {
    match tag {
        node_type::NAMESPACE => Some(namespace::layout::INDEX),
        _ => None,
    }
}

// ---------------------------------------------------------------------
// Reconstruction
// ---------------------------------------------------------------------

/// A freshly constructed in-memory wrapper around a record, selected by the
/// persisted kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdomNode {
    ClassType(class_type::PdomClassType),
    Function(function::PdomFunction),
    Variable(variable::PdomVariable),
    Enumeration(enumeration::PdomEnumeration),
    Enumerator(enumeration::PdomEnumerator),
    Namespace(namespace::PdomNamespace),
    NamespaceAlias(namespace::PdomNamespaceAlias),
    Typedef(namespace::PdomTypedef),
    ClassTemplate(template::PdomClassTemplate),
    FunctionTemplate(template::PdomFunctionTemplate),
    VariableTemplate(template::PdomVariableTemplate),
    AliasTemplate(template::PdomAliasTemplate),
    Concept(template::PdomConcept),
    TemplateParameter(template::PdomTemplateParameter),
    Parameter(function::PdomParameter),
    ClassSpecialization(specialization::PdomClassSpecialization),
    ClassInstance(specialization::PdomClassInstance),
    PartialSpecialization(template::PdomPartialSpecialization),
    FunctionSpecialization(specialization::PdomFunctionSpecialization),
    FunctionInstance(specialization::PdomFunctionInstance),
    FieldSpecialization(specialization::PdomFieldSpecialization),
    VariableInstance(specialization::PdomVariableInstance),
}

impl PdomNode {
    pub fn record(&self) -> RecordRef {
        match self {
            PdomNode::ClassType(n) => n.record,
            PdomNode::Function(n) => n.record,
            PdomNode::Variable(n) => n.record,
            PdomNode::Enumeration(n) => n.record,
            PdomNode::Enumerator(n) => n.record,
            PdomNode::Namespace(n) => n.record,
            PdomNode::NamespaceAlias(n) => n.record,
            PdomNode::Typedef(n) => n.record,
            PdomNode::ClassTemplate(n) => n.record,
            PdomNode::FunctionTemplate(n) => n.record,
            PdomNode::VariableTemplate(n) => n.record,
            PdomNode::AliasTemplate(n) => n.record,
            PdomNode::Concept(n) => n.record,
            PdomNode::TemplateParameter(n) => n.record,
            PdomNode::Parameter(n) => n.record,
            PdomNode::ClassSpecialization(n) => n.record,
            PdomNode::ClassInstance(n) => n.record,
            PdomNode::PartialSpecialization(n) => n.record,
            PdomNode::FunctionSpecialization(n) => n.record,
            PdomNode::FunctionInstance(n) => n.record,
            PdomNode::FieldSpecialization(n) => n.record,
            PdomNode::VariableInstance(n) => n.record,
        }
    }
}

/// Total over every allocated kind tag; an unrecognized tag means a corrupt
/// database or a programming error and aborts loudly.
pub fn get_node(db: &Database, rec: RecordRef) -> Result<PdomNode> {
    let tag = node_tag(db, rec)?;
    let node = match tag {
        node_type::CLASS_TYPE => PdomNode::ClassType(class_type::PdomClassType { record: rec }),
        node_type::FUNCTION | node_type::METHOD | node_type::CONSTRUCTOR => {
            PdomNode::Function(function::PdomFunction { record: rec })
        }
        node_type::VARIABLE | node_type::FIELD => {
            PdomNode::Variable(variable::PdomVariable { record: rec })
        }
        node_type::ENUMERATION => {
            PdomNode::Enumeration(enumeration::PdomEnumeration { record: rec })
        }
        node_type::ENUMERATOR => PdomNode::Enumerator(enumeration::PdomEnumerator { record: rec }),
        node_type::NAMESPACE => PdomNode::Namespace(namespace::PdomNamespace { record: rec }),
        node_type::NAMESPACE_ALIAS => {
            PdomNode::NamespaceAlias(namespace::PdomNamespaceAlias { record: rec })
        }
        node_type::TYPEDEF => PdomNode::Typedef(namespace::PdomTypedef { record: rec }),
        node_type::CLASS_TEMPLATE => {
            PdomNode::ClassTemplate(template::PdomClassTemplate { record: rec })
        }
        node_type::FUNCTION_TEMPLATE => {
            PdomNode::FunctionTemplate(template::PdomFunctionTemplate { record: rec })
        }
        node_type::VARIABLE_TEMPLATE => {
            PdomNode::VariableTemplate(template::PdomVariableTemplate { record: rec })
        }
        node_type::ALIAS_TEMPLATE => {
            PdomNode::AliasTemplate(template::PdomAliasTemplate { record: rec })
        }
        node_type::CONCEPT => PdomNode::Concept(template::PdomConcept { record: rec }),
        node_type::TEMPLATE_PARAMETER => {
            PdomNode::TemplateParameter(template::PdomTemplateParameter { record: rec })
        }
        node_type::PARAMETER => PdomNode::Parameter(function::PdomParameter { record: rec }),
        node_type::CLASS_SPECIALIZATION => {
            PdomNode::ClassSpecialization(specialization::PdomClassSpecialization { record: rec })
        }
        node_type::CLASS_INSTANCE => {
            PdomNode::ClassInstance(specialization::PdomClassInstance { record: rec })
        }
        node_type::PARTIAL_SPECIALIZATION => {
            PdomNode::PartialSpecialization(template::PdomPartialSpecialization { record: rec })
        }
        node_type::FUNCTION_SPECIALIZATION
        | node_type::METHOD_SPECIALIZATION
        | node_type::CONSTRUCTOR_SPECIALIZATION => PdomNode::FunctionSpecialization(
            specialization::PdomFunctionSpecialization { record: rec },
        ),
        node_type::FUNCTION_INSTANCE
        | node_type::METHOD_INSTANCE
        | node_type::CONSTRUCTOR_INSTANCE => {
            PdomNode::FunctionInstance(specialization::PdomFunctionInstance { record: rec })
        }
        node_type::FIELD_SPECIALIZATION => {
            PdomNode::FieldSpecialization(specialization::PdomFieldSpecialization { record: rec })
        }
        node_type::VARIABLE_INSTANCE => {
            PdomNode::VariableInstance(specialization::PdomVariableInstance { record: rec })
        }
        unknown => panic!(
            "unknown node type {unknown} at record {:#x}: corrupt database or unallocated tag",
            rec.raw()
        ),
    };
    Ok(node)
}
