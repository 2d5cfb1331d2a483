//! Function, method, and constructor records plus their parameter lists.
//!
//! The self-contained fields (annotation, signature hash) are written at
//! construction; the detail fields (parameters, function type, exception
//! specification, execution blob) may reference bindings that are still
//! being persisted in the same pass, so they are filled by a deferred
//! configuration step and may be re-written wholesale on update.

use crate::annotation;
use crate::records::{self, FunctionFields};
use pdom_ast::{AstArena, AstBinding, FunctionFacet, Visibility};
use pdom_common::{PdomError, RecordRef, Result};
use pdom_db::Database;
use crate::marshal::{self, BindingRefs, PdomType};
use tracing::warn;

pub mod layout {
    use crate::records::binding_layout;

    /// Head of the parameter linked list.
    pub const FIRST_PARAMETER: u64 = binding_layout::RECORD_SIZE;
    /// Stored `Function` type record.
    pub const FUNCTION_TYPE: u64 = binding_layout::RECORD_SIZE + 8;
    /// i16 count of parameters without default arguments.
    pub const REQUIRED_ARGS: u64 = binding_layout::RECORD_SIZE + 16;
    /// Type-list block; null means no exception specification declared.
    pub const EXCEPTION_SPEC: u64 = binding_layout::RECORD_SIZE + 18;
    /// u16, see `annotation::function`.
    pub const ANNOTATION: u64 = binding_layout::RECORD_SIZE + 26;
    /// Opaque constexpr-body blob.
    pub const EXECUTION: u64 = binding_layout::RECORD_SIZE + 28;
    /// i32 overload-disambiguation hash, written once at construction.
    pub const SIG_HASH: u64 = binding_layout::RECORD_SIZE + 36;
    pub const RECORD_SIZE: u64 = binding_layout::RECORD_SIZE + 40;
}

pub mod parameter_layout {
    use crate::records::binding_layout;

    pub const TYPE: u64 = binding_layout::RECORD_SIZE;
    pub const NEXT: u64 = binding_layout::RECORD_SIZE + 8;
    /// u8, see `annotation::parameter`.
    pub const ANNOTATION: u64 = binding_layout::RECORD_SIZE + 16;
    pub const DEFAULT_VALUE: u64 = binding_layout::RECORD_SIZE + 17;
    pub const RECORD_SIZE: u64 = binding_layout::RECORD_SIZE + 25;
}

fn fields_of(db: &Database, rec: RecordRef) -> Result<FunctionFields> {
    let tag = records::node_tag(db, rec)?;
    records::function_fields(tag).ok_or(PdomError::Unsupported("record has no function field group"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomFunction {
    pub record: RecordRef,
}

impl PdomFunction {
    /// Allocates a function-kind record and writes its self-contained
    /// fields. `tag` selects function vs method vs constructor; the detail
    /// fields are filled by `configure`.
    pub fn create(
        db: &mut Database,
        tag: i16,
        parent: RecordRef,
        binding: &AstBinding,
        facet: &FunctionFacet,
        file_scope: bool,
        sig_hash: i32,
    ) -> Result<PdomFunction> {
        let rec = db.malloc(layout::RECORD_SIZE as u32)?;
        records::init_binding(db, rec, tag, parent, binding.name_bytes())?;
        db.put_short(
            rec,
            layout::ANNOTATION,
            annotation::function::encode(facet.modifiers, binding.visibility, file_scope) as i16,
        )?;
        db.put_int(rec, layout::SIG_HASH, sig_hash)?;
        Ok(PdomFunction { record: rec })
    }

    pub fn annotation(&self, db: &Database) -> u16 {
        function_annotation(db, self.record)
    }

    pub fn is_inline(&self, db: &Database) -> bool {
        annotation::function::is_inline(self.annotation(db))
    }

    pub fn is_virtual(&self, db: &Database) -> bool {
        annotation::function::is_virtual(self.annotation(db))
    }

    pub fn is_implicit(&self, db: &Database) -> bool {
        annotation::function::is_implicit(self.annotation(db))
    }

    pub fn visibility(&self, db: &Database) -> Visibility {
        annotation::function::visibility(self.annotation(db))
    }

    pub fn signature_hash(&self, db: &Database) -> Result<i32> {
        db.get_int(self.record, layout::SIG_HASH)
    }

    pub fn parameters(&self, db: &Database) -> Result<Vec<PdomParameter>> {
        parameters(db, self.record)
    }

    pub fn function_type(&self, db: &Database) -> Result<PdomType> {
        function_type(db, self.record)
    }

    pub fn required_args(&self, db: &Database) -> Result<u16> {
        let fields = fields_of(db, self.record)?;
        Ok(db.get_short(self.record, fields.required_args)? as u16)
    }

    pub fn exception_spec(&self, db: &Database) -> Result<Option<Vec<PdomType>>> {
        exception_spec(db, self.record)
    }

    pub fn execution(&self, db: &Database) -> Result<Option<Vec<u8>>> {
        let fields = fields_of(db, self.record)?;
        marshal::load_execution(db, db.get_rec(self.record, fields.execution)?)
    }
}

/// Accessor fallback: unreadable annotations decode as the empty set.
pub fn function_annotation(db: &Database, rec: RecordRef) -> u16 {
    let read = fields_of(db, rec).and_then(|fields| db.get_short(rec, fields.annotation));
    match read {
        Ok(bits) => bits as u16,
        Err(fault) => {
            warn!(rec = rec.raw(), %fault, "function annotation unreadable, defaulting to empty");
            0
        }
    }
}

/// Fills the detail fields from a resolved facet. Works on any
/// function-kind record through the capability table.
pub fn configure(
    db: &mut Database,
    ast: &AstArena,
    refs: &BindingRefs,
    rec: RecordRef,
    facet: &FunctionFacet,
) -> Result<()> {
    let fields = fields_of(db, rec)?;
    let first = store_parameters(db, ast, refs, rec, facet)?;
    db.put_rec(rec, fields.first_parameter, first)?;
    let fn_type = marshal::store_type(db, ast, refs, facet.function_type)?;
    db.put_rec(rec, fields.function_type, fn_type)?;
    db.put_short(rec, fields.required_args, facet.required_args as i16)?;
    let exception = match &facet.exception_spec {
        Some(types) => marshal::store_type_list(db, ast, refs, types)?,
        None => RecordRef::NULL,
    };
    db.put_rec(rec, fields.exception_spec, exception)?;
    let execution = match &facet.execution {
        Some(blob) => marshal::store_execution(db, blob)?,
        None => RecordRef::NULL,
    };
    db.put_rec(rec, fields.execution, execution)?;
    Ok(())
}

/// Frees every detail field, leaving the record ready for a fresh
/// `configure`. The annotation is re-encoded separately by the caller.
pub fn clear_details(db: &mut Database, rec: RecordRef) -> Result<()> {
    let fields = fields_of(db, rec)?;
    let mut param = db.get_rec(rec, fields.first_parameter)?;
    db.put_rec(rec, fields.first_parameter, RecordRef::NULL)?;
    while let Some(current) = param.non_null() {
        param = db.get_rec(current, parameter_layout::NEXT)?;
        free_parameter(db, current)?;
    }
    let fn_type = db.get_rec(rec, fields.function_type)?;
    marshal::free_type(db, fn_type)?;
    db.put_rec(rec, fields.function_type, RecordRef::NULL)?;
    let exception = db.get_rec(rec, fields.exception_spec)?;
    marshal::free_type_list(db, exception)?;
    db.put_rec(rec, fields.exception_spec, RecordRef::NULL)?;
    if let Some(execution) = db.get_rec(rec, fields.execution)?.non_null() {
        db.free(execution)?;
    }
    db.put_rec(rec, fields.execution, RecordRef::NULL)?;
    Ok(())
}

/// Re-encodes the annotation bitfield from a fresh declaration. Full
/// replace, never a partial-bit update.
pub fn update_annotation(
    db: &mut Database,
    rec: RecordRef,
    facet: &FunctionFacet,
    visibility: Visibility,
    file_scope: bool,
) -> Result<()> {
    let fields = fields_of(db, rec)?;
    db.put_short(
        rec,
        fields.annotation,
        annotation::function::encode(facet.modifiers, visibility, file_scope) as i16,
    )
}

fn store_parameters(
    db: &mut Database,
    ast: &AstArena,
    refs: &BindingRefs,
    owner: RecordRef,
    facet: &FunctionFacet,
) -> Result<RecordRef> {
    // Built back to front so the list reads in declaration order.
    let mut next = RecordRef::NULL;
    for param in facet.parameters.iter().rev() {
        let rec = db.malloc(parameter_layout::RECORD_SIZE as u32)?;
        records::init_binding(db, rec, crate::node_type::PARAMETER, owner, param.name.as_bytes())?;
        let type_rec = marshal::store_type(db, ast, refs, param.param_type)?;
        db.put_rec(rec, parameter_layout::TYPE, type_rec)?;
        db.put_rec(rec, parameter_layout::NEXT, next)?;
        db.put_byte(
            rec,
            parameter_layout::ANNOTATION,
            annotation::parameter::encode(param.default_value.is_some(), param.is_pack),
        )?;
        let default = match param.default_value {
            Some(value) => marshal::store_value(db, ast.value(value))?,
            None => RecordRef::NULL,
        };
        db.put_rec(rec, parameter_layout::DEFAULT_VALUE, default)?;
        next = rec;
    }
    Ok(next)
}

fn free_parameter(db: &mut Database, rec: RecordRef) -> Result<()> {
    let param_type = db.get_rec(rec, parameter_layout::TYPE)?;
    marshal::free_type(db, param_type)?;
    let default = db.get_rec(rec, parameter_layout::DEFAULT_VALUE)?;
    marshal::free_value(db, default)?;
    db.free_string(db.get_rec(rec, records::binding_layout::NAME)?)?;
    db.free(rec)
}

/// The parameter list in declaration order.
pub fn parameters(db: &Database, rec: RecordRef) -> Result<Vec<PdomParameter>> {
    let fields = fields_of(db, rec)?;
    let mut out = Vec::new();
    let mut cursor = db.get_rec(rec, fields.first_parameter)?;
    while let Some(current) = cursor.non_null() {
        out.push(PdomParameter { record: current });
        cursor = db.get_rec(current, parameter_layout::NEXT)?;
    }
    Ok(out)
}

pub fn function_type(db: &Database, rec: RecordRef) -> Result<PdomType> {
    let fields = fields_of(db, rec)?;
    marshal::load_type(db, db.get_rec(rec, fields.function_type)?)
}

/// `None` means no exception specification was declared; `Some(vec![])` is
/// a declared empty one.
pub fn exception_spec(db: &Database, rec: RecordRef) -> Result<Option<Vec<PdomType>>> {
    let fields = fields_of(db, rec)?;
    let block = db.get_rec(rec, fields.exception_spec)?;
    match block.non_null() {
        Some(block) => Ok(Some(marshal::load_type_list(db, block)?)),
        None => Ok(None),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomParameter {
    pub record: RecordRef,
}

impl PdomParameter {
    pub fn name<'a>(&self, db: &'a Database) -> Result<&'a [u8]> {
        records::name_bytes(db, self.record)
    }

    pub fn param_type(&self, db: &Database) -> Result<PdomType> {
        marshal::load_type(db, db.get_rec(self.record, parameter_layout::TYPE)?)
    }

    pub fn has_default(&self, db: &Database) -> bool {
        match db.get_byte(self.record, parameter_layout::ANNOTATION) {
            Ok(bits) => annotation::parameter::has_default(bits),
            Err(fault) => {
                warn!(rec = self.record.raw(), %fault, "parameter annotation unreadable");
                false
            }
        }
    }

    pub fn is_pack(&self, db: &Database) -> bool {
        match db.get_byte(self.record, parameter_layout::ANNOTATION) {
            Ok(bits) => annotation::parameter::is_pack(bits),
            Err(fault) => {
                warn!(rec = self.record.raw(), %fault, "parameter annotation unreadable");
                false
            }
        }
    }

    pub fn default_value(&self, db: &Database) -> Result<Option<marshal::PdomValue>> {
        let rec = db.get_rec(self.record, parameter_layout::DEFAULT_VALUE)?;
        match rec.non_null() {
            Some(rec) => Ok(Some(marshal::load_value(db, rec)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_type;
    use pdom_ast::{AstArena, AstParam, DeclModifiers};

    fn facet(ast: &mut AstArena) -> FunctionFacet {
        let int_t = ast.int_type();
        let void_t = ast.void_type();
        let fn_type = ast.function_type(void_t, vec![int_t, int_t]);
        FunctionFacet {
            parameters: vec![
                AstParam { name: "a".into(), param_type: int_t, default_value: None, is_pack: false },
                AstParam {
                    name: "b".into(),
                    param_type: int_t,
                    default_value: Some(ast.add_value(pdom_ast::AstValue::Integral(7))),
                    is_pack: false,
                },
            ],
            function_type: fn_type,
            required_args: 1,
            exception_spec: None,
            execution: None,
            is_constructor: false,
            modifiers: DeclModifiers::INLINE,
        }
    }

    #[test]
    fn test_create_configure_read_back() {
        let mut db = Database::new();
        let mut ast = AstArena::new();
        let facet = facet(&mut ast);
        let binding = AstBinding::named("f").with_function(facet.clone());
        let refs = BindingRefs::default();
        let f = PdomFunction::create(
            &mut db,
            node_type::FUNCTION,
            RecordRef::NULL,
            &binding,
            &facet,
            true,
            42,
        )
        .unwrap();
        configure(&mut db, &ast, &refs, f.record, &facet).unwrap();

        assert!(f.is_inline(&db));
        assert_eq!(f.signature_hash(&db).unwrap(), 42);
        assert_eq!(f.required_args(&db).unwrap(), 1);
        assert!(f.exception_spec(&db).unwrap().is_none());
        let params = f.parameters(&db).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name(&db).unwrap(), b"a");
        assert!(!params[0].has_default(&db));
        assert!(params[1].has_default(&db));
        assert_eq!(
            params[1].default_value(&db).unwrap(),
            Some(marshal::PdomValue::Integral(7))
        );
    }

    #[test]
    fn test_clear_details_resets_fields() {
        let mut db = Database::new();
        let mut ast = AstArena::new();
        let facet = facet(&mut ast);
        let binding = AstBinding::named("f").with_function(facet.clone());
        let refs = BindingRefs::default();
        let f = PdomFunction::create(
            &mut db,
            node_type::FUNCTION,
            RecordRef::NULL,
            &binding,
            &facet,
            true,
            0,
        )
        .unwrap();
        configure(&mut db, &ast, &refs, f.record, &facet).unwrap();
        clear_details(&mut db, f.record).unwrap();
        assert!(f.parameters(&db).unwrap().is_empty());
        assert_eq!(f.function_type(&db).unwrap(), PdomType::Problem);
    }

    #[test]
    fn test_empty_exception_spec_is_not_none() {
        let mut db = Database::new();
        let mut ast = AstArena::new();
        let mut facet = facet(&mut ast);
        facet.exception_spec = Some(Vec::new());
        let binding = AstBinding::named("g").with_function(facet.clone());
        let refs = BindingRefs::default();
        let f = PdomFunction::create(
            &mut db,
            node_type::FUNCTION,
            RecordRef::NULL,
            &binding,
            &facet,
            true,
            0,
        )
        .unwrap();
        configure(&mut db, &ast, &refs, f.record, &facet).unwrap();
        assert_eq!(f.exception_spec(&db).unwrap(), Some(Vec::new()));
    }
}
