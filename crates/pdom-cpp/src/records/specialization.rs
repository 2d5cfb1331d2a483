//! Specialization and instance records.
//!
//! Every specialization-kind record starts with the common specialization
//! header: the record of the binding it specializes (never null, never
//! itself a specialization), the argument-signature hash, and either an
//! owned template-parameter map or a deferral to its owner's map. The
//! concrete field groups (class, function, variable) follow at
//! kind-specific offsets; the capability tables in `records` let the
//! generic class/function operations work on these records unchanged.

use crate::annotation;
use crate::args;
use crate::marshal::{self, BindingRefs, PdomTemplateArg, PdomType, PdomValue};
use crate::records::{self, class_type};
use pdom_ast::{
    AstArena, AstBinding, ClassFacet, FunctionFacet, SpecFacet, VariableFacet, Visibility,
};
use pdom_common::{PdomError, RecordRef, Result};
use pdom_db::Database;
use tracing::warn;

pub mod spec_layout {
    use crate::records::binding_layout;

    /// Record of the specialized (original) binding. Never null.
    pub const SPECIALIZED: u64 = binding_layout::RECORD_SIZE;
    /// i32 hash of the canonical argument signature.
    pub const SIG_HASH: u64 = binding_layout::RECORD_SIZE + 8;
    /// Owned parameter-map block, null when deferring to the owner's map.
    pub const TPARAM_MAP: u64 = binding_layout::RECORD_SIZE + 12;
    /// u8; bit 0 set when this record owns its map.
    pub const SPEC_FLAGS: u64 = binding_layout::RECORD_SIZE + 20;
    pub const RECORD_SIZE: u64 = binding_layout::RECORD_SIZE + 21;
}

const OWNS_MAP: u8 = 1 << 0;

pub mod class_spec_layout {
    use super::spec_layout;

    pub const FIRST_BASE: u64 = spec_layout::RECORD_SIZE;
    pub const FIRST_MEMBER_BLOCK: u64 = spec_layout::RECORD_SIZE + 8;
    pub const ANNOTATION: u64 = spec_layout::RECORD_SIZE + 16;
    pub const KEY: u64 = spec_layout::RECORD_SIZE + 17;
    pub const RECORD_SIZE: u64 = spec_layout::RECORD_SIZE + 18;
}

pub mod class_instance_layout {
    use super::class_spec_layout;

    /// The concrete argument list this instance was built from.
    pub const ARGUMENTS: u64 = class_spec_layout::RECORD_SIZE;
    pub const RECORD_SIZE: u64 = class_spec_layout::RECORD_SIZE + 8;
}

pub mod function_spec_layout {
    use super::spec_layout;

    pub const FIRST_PARAMETER: u64 = spec_layout::RECORD_SIZE;
    pub const FUNCTION_TYPE: u64 = spec_layout::RECORD_SIZE + 8;
    pub const REQUIRED_ARGS: u64 = spec_layout::RECORD_SIZE + 16;
    pub const EXCEPTION_SPEC: u64 = spec_layout::RECORD_SIZE + 18;
    pub const ANNOTATION: u64 = spec_layout::RECORD_SIZE + 26;
    pub const EXECUTION: u64 = spec_layout::RECORD_SIZE + 28;
    pub const RECORD_SIZE: u64 = spec_layout::RECORD_SIZE + 36;
}

pub mod function_instance_layout {
    use super::function_spec_layout;

    pub const ARGUMENTS: u64 = function_spec_layout::RECORD_SIZE;
    pub const RECORD_SIZE: u64 = function_spec_layout::RECORD_SIZE + 8;
}

pub mod field_spec_layout {
    use super::spec_layout;

    pub const TYPE: u64 = spec_layout::RECORD_SIZE;
    pub const VALUE: u64 = spec_layout::RECORD_SIZE + 8;
    pub const RECORD_SIZE: u64 = spec_layout::RECORD_SIZE + 16;
}

pub mod variable_instance_layout {
    use super::spec_layout;

    pub const TYPE: u64 = spec_layout::RECORD_SIZE;
    pub const VALUE: u64 = spec_layout::RECORD_SIZE + 8;
    pub const ARGUMENTS: u64 = spec_layout::RECORD_SIZE + 16;
    pub const RECORD_SIZE: u64 = spec_layout::RECORD_SIZE + 24;
}

// ---------------------------------------------------------------------
// Common specialization header
// ---------------------------------------------------------------------

/// Writes the specialization header. `specialized` must already be
/// persisted; callers resolve it through the binding-refs map.
pub fn write_spec_header(
    db: &mut Database,
    ast: &AstArena,
    refs: &BindingRefs,
    rec: RecordRef,
    specialized: RecordRef,
    facet: &SpecFacet,
    sig_hash: i32,
) -> Result<()> {
    db.put_rec(rec, spec_layout::SPECIALIZED, specialized)?;
    db.put_int(rec, spec_layout::SIG_HASH, sig_hash)?;
    if facet.owns_map {
        let map = args::put_parameter_map(db, ast, refs, &facet.tparam_map)?;
        db.put_rec(rec, spec_layout::TPARAM_MAP, map)?;
        db.put_byte(rec, spec_layout::SPEC_FLAGS, OWNS_MAP)?;
    } else {
        db.put_rec(rec, spec_layout::TPARAM_MAP, RecordRef::NULL)?;
        db.put_byte(rec, spec_layout::SPEC_FLAGS, 0)?;
    }
    Ok(())
}

/// Header for lazily created member specializations: no owned map, the
/// effective map is the owner's.
pub fn write_deferring_header(
    db: &mut Database,
    rec: RecordRef,
    specialized: RecordRef,
    sig_hash: i32,
) -> Result<()> {
    db.put_rec(rec, spec_layout::SPECIALIZED, specialized)?;
    db.put_int(rec, spec_layout::SIG_HASH, sig_hash)?;
    db.put_rec(rec, spec_layout::TPARAM_MAP, RecordRef::NULL)?;
    db.put_byte(rec, spec_layout::SPEC_FLAGS, 0)
}

/// The specialized (original) binding record. Null here is a format
/// violation; accessors degrade to the null record with a diagnostic so
/// a damaged index stays navigable.
pub fn specialized_record(db: &Database, rec: RecordRef) -> RecordRef {
    match db.get_rec(rec, spec_layout::SPECIALIZED) {
        Ok(original) => {
            if original.is_null() {
                warn!(rec = rec.raw(), "specialization with null original");
            }
            original
        }
        Err(fault) => {
            warn!(rec = rec.raw(), %fault, "specialized record unreadable");
            RecordRef::NULL
        }
    }
}

pub fn owns_map(db: &Database, rec: RecordRef) -> Result<bool> {
    Ok(db.get_byte(rec, spec_layout::SPEC_FLAGS)? & OWNS_MAP != 0)
}

/// The effective parameter map: the owned one, or the owner's, walking up
/// through deferring owners. A deferring record whose owner is not a
/// specialization yields an empty map with a diagnostic.
pub fn parameter_map(db: &Database, rec: RecordRef) -> Result<Vec<(i32, PdomTemplateArg)>> {
    let mut current = rec;
    loop {
        if owns_map(db, current)? {
            return args::get_parameter_map(db, db.get_rec(current, spec_layout::TPARAM_MAP)?);
        }
        let owner = records::parent_of(db, current)?;
        let Some(owner) = owner.non_null() else {
            warn!(rec = rec.raw(), "deferred parameter map with no owner, using empty map");
            return Ok(Vec::new());
        };
        if !crate::node_type::is_specialization(records::node_tag(db, owner)?) {
            warn!(rec = rec.raw(), "deferred parameter map owner is not a specialization");
            return Ok(Vec::new());
        }
        current = owner;
    }
}

pub fn signature_hash(db: &Database, rec: RecordRef) -> Result<i32> {
    db.get_int(rec, spec_layout::SIG_HASH)
}

fn arguments_of(db: &Database, rec: RecordRef) -> Result<Vec<PdomTemplateArg>> {
    let tag = records::node_tag(db, rec)?;
    let field = records::arguments_field(tag)
        .ok_or(PdomError::Unsupported("record has no argument list"))?;
    args::get_arguments(db, db.get_rec(rec, field)?)
}

// ---------------------------------------------------------------------
// Class specializations and instances
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomClassSpecialization {
    pub record: RecordRef,
}

impl PdomClassSpecialization {
    pub fn create(
        db: &mut Database,
        parent: RecordRef,
        ast: &AstArena,
        refs: &BindingRefs,
        binding: &AstBinding,
        class_facet: &ClassFacet,
        spec_facet: &SpecFacet,
        specialized: RecordRef,
        sig_hash: i32,
    ) -> Result<PdomClassSpecialization> {
        let rec = db.malloc(class_spec_layout::RECORD_SIZE as u32)?;
        records::init_binding(
            db,
            rec,
            crate::node_type::CLASS_SPECIALIZATION,
            parent,
            binding.name_bytes(),
        )?;
        write_spec_header(db, ast, refs, rec, specialized, spec_facet, sig_hash)?;
        class_type::write_class_fields(db, rec, binding.visibility, class_facet)?;
        Ok(PdomClassSpecialization { record: rec })
    }

    pub fn specialized(&self, db: &Database) -> RecordRef {
        specialized_record(db, self.record)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomClassInstance {
    pub record: RecordRef,
}

impl PdomClassInstance {
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        db: &mut Database,
        parent: RecordRef,
        ast: &AstArena,
        refs: &BindingRefs,
        binding: &AstBinding,
        class_facet: &ClassFacet,
        spec_facet: &SpecFacet,
        specialized: RecordRef,
        arguments: &[pdom_ast::AstTemplateArg],
        sig_hash: i32,
    ) -> Result<PdomClassInstance> {
        let rec = db.malloc(class_instance_layout::RECORD_SIZE as u32)?;
        records::init_binding(
            db,
            rec,
            crate::node_type::CLASS_INSTANCE,
            parent,
            binding.name_bytes(),
        )?;
        write_spec_header(db, ast, refs, rec, specialized, spec_facet, sig_hash)?;
        class_type::write_class_fields(db, rec, binding.visibility, class_facet)?;
        let block = args::put_arguments(db, ast, refs, arguments)?;
        db.put_rec(rec, class_instance_layout::ARGUMENTS, block)?;
        Ok(PdomClassInstance { record: rec })
    }

    pub fn specialized(&self, db: &Database) -> RecordRef {
        specialized_record(db, self.record)
    }

    pub fn arguments(&self, db: &Database) -> Result<Vec<PdomTemplateArg>> {
        arguments_of(db, self.record)
    }
}

// ---------------------------------------------------------------------
// Function specializations and instances
// ---------------------------------------------------------------------

fn create_function_spec_record(
    db: &mut Database,
    tag: i16,
    size: u64,
    parent: RecordRef,
    ast: &AstArena,
    refs: &BindingRefs,
    binding: &AstBinding,
    function_facet: &FunctionFacet,
    spec_facet: &SpecFacet,
    specialized: RecordRef,
    file_scope: bool,
    sig_hash: i32,
) -> Result<RecordRef> {
    let rec = db.malloc(size as u32)?;
    records::init_binding(db, rec, tag, parent, binding.name_bytes())?;
    write_spec_header(db, ast, refs, rec, specialized, spec_facet, sig_hash)?;
    db.put_short(
        rec,
        function_spec_layout::ANNOTATION,
        annotation::function::encode(function_facet.modifiers, binding.visibility, file_scope)
            as i16,
    )?;
    Ok(rec)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomFunctionSpecialization {
    pub record: RecordRef,
}

impl PdomFunctionSpecialization {
    /// `tag` is one of the function/method/constructor specialization
    /// kinds. Detail fields are filled by `function::configure`.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        db: &mut Database,
        tag: i16,
        parent: RecordRef,
        ast: &AstArena,
        refs: &BindingRefs,
        binding: &AstBinding,
        function_facet: &FunctionFacet,
        spec_facet: &SpecFacet,
        specialized: RecordRef,
        file_scope: bool,
        sig_hash: i32,
    ) -> Result<PdomFunctionSpecialization> {
        let rec = create_function_spec_record(
            db,
            tag,
            function_spec_layout::RECORD_SIZE,
            parent,
            ast,
            refs,
            binding,
            function_facet,
            spec_facet,
            specialized,
            file_scope,
            sig_hash,
        )?;
        Ok(PdomFunctionSpecialization { record: rec })
    }

    pub fn specialized(&self, db: &Database) -> RecordRef {
        specialized_record(db, self.record)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomFunctionInstance {
    pub record: RecordRef,
}

impl PdomFunctionInstance {
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        db: &mut Database,
        tag: i16,
        parent: RecordRef,
        ast: &AstArena,
        refs: &BindingRefs,
        binding: &AstBinding,
        function_facet: &FunctionFacet,
        spec_facet: &SpecFacet,
        specialized: RecordRef,
        arguments: &[pdom_ast::AstTemplateArg],
        file_scope: bool,
        sig_hash: i32,
    ) -> Result<PdomFunctionInstance> {
        let rec = create_function_spec_record(
            db,
            tag,
            function_instance_layout::RECORD_SIZE,
            parent,
            ast,
            refs,
            binding,
            function_facet,
            spec_facet,
            specialized,
            file_scope,
            sig_hash,
        )?;
        let block = args::put_arguments(db, ast, refs, arguments)?;
        db.put_rec(rec, function_instance_layout::ARGUMENTS, block)?;
        Ok(PdomFunctionInstance { record: rec })
    }

    pub fn specialized(&self, db: &Database) -> RecordRef {
        specialized_record(db, self.record)
    }

    pub fn arguments(&self, db: &Database) -> Result<Vec<PdomTemplateArg>> {
        arguments_of(db, self.record)
    }
}

// ---------------------------------------------------------------------
// Field specializations and variable instances
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomFieldSpecialization {
    pub record: RecordRef,
}

impl PdomFieldSpecialization {
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        db: &mut Database,
        parent: RecordRef,
        ast: &AstArena,
        refs: &BindingRefs,
        binding: &AstBinding,
        variable_facet: &VariableFacet,
        spec_facet: &SpecFacet,
        specialized: RecordRef,
    ) -> Result<PdomFieldSpecialization> {
        let rec = db.malloc(field_spec_layout::RECORD_SIZE as u32)?;
        records::init_binding(
            db,
            rec,
            crate::node_type::FIELD_SPECIALIZATION,
            parent,
            binding.name_bytes(),
        )?;
        write_spec_header(db, ast, refs, rec, specialized, spec_facet, 0)?;
        write_typed_value(
            db,
            ast,
            refs,
            rec,
            field_spec_layout::TYPE,
            field_spec_layout::VALUE,
            variable_facet,
        )?;
        Ok(PdomFieldSpecialization { record: rec })
    }

    pub fn specialized(&self, db: &Database) -> RecordRef {
        specialized_record(db, self.record)
    }

    pub fn field_type(&self, db: &Database) -> Result<PdomType> {
        marshal::load_type(db, db.get_rec(self.record, field_spec_layout::TYPE)?)
    }

    pub fn value(&self, db: &Database) -> Result<Option<PdomValue>> {
        load_optional_value(db, self.record, field_spec_layout::VALUE)
    }

    /// Accessibility falls back to the unspecialized field's class when the
    /// specialized scope has no local entry; see the scope layer.
    pub fn visibility(&self, db: &Database) -> Visibility {
        let original = self.specialized(db);
        if original.is_null() {
            return Visibility::Unspecified;
        }
        Visibility::from_bits(
            crate::records::variable::variable_annotation(db, original)
                & annotation::VISIBILITY_MASK,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomVariableInstance {
    pub record: RecordRef,
}

impl PdomVariableInstance {
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        db: &mut Database,
        parent: RecordRef,
        ast: &AstArena,
        refs: &BindingRefs,
        binding: &AstBinding,
        variable_facet: &VariableFacet,
        spec_facet: &SpecFacet,
        specialized: RecordRef,
        arguments: &[pdom_ast::AstTemplateArg],
        sig_hash: i32,
    ) -> Result<PdomVariableInstance> {
        let rec = db.malloc(variable_instance_layout::RECORD_SIZE as u32)?;
        records::init_binding(
            db,
            rec,
            crate::node_type::VARIABLE_INSTANCE,
            parent,
            binding.name_bytes(),
        )?;
        write_spec_header(db, ast, refs, rec, specialized, spec_facet, sig_hash)?;
        write_typed_value(
            db,
            ast,
            refs,
            rec,
            variable_instance_layout::TYPE,
            variable_instance_layout::VALUE,
            variable_facet,
        )?;
        let block = args::put_arguments(db, ast, refs, arguments)?;
        db.put_rec(rec, variable_instance_layout::ARGUMENTS, block)?;
        Ok(PdomVariableInstance { record: rec })
    }

    pub fn specialized(&self, db: &Database) -> RecordRef {
        specialized_record(db, self.record)
    }

    pub fn var_type(&self, db: &Database) -> Result<PdomType> {
        marshal::load_type(db, db.get_rec(self.record, variable_instance_layout::TYPE)?)
    }

    pub fn value(&self, db: &Database) -> Result<Option<PdomValue>> {
        load_optional_value(db, self.record, variable_instance_layout::VALUE)
    }

    pub fn arguments(&self, db: &Database) -> Result<Vec<PdomTemplateArg>> {
        arguments_of(db, self.record)
    }
}

fn write_typed_value(
    db: &mut Database,
    ast: &AstArena,
    refs: &BindingRefs,
    rec: RecordRef,
    type_field: u64,
    value_field: u64,
    facet: &VariableFacet,
) -> Result<()> {
    let type_rec = marshal::store_type(db, ast, refs, facet.var_type)?;
    db.put_rec(rec, type_field, type_rec)?;
    let value_rec = match facet.value {
        Some(value) => marshal::store_value(db, ast.value(value))?,
        None => RecordRef::NULL,
    };
    db.put_rec(rec, value_field, value_rec)
}

fn load_optional_value(db: &Database, rec: RecordRef, field: u64) -> Result<Option<PdomValue>> {
    match db.get_rec(rec, field)?.non_null() {
        Some(value) => Ok(Some(marshal::load_value(db, value)?)),
        None => Ok(None),
    }
}
