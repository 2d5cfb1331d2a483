//! Template records: class/function/variable/alias templates, concepts,
//! template parameters, and partial specializations.
//!
//! A template record is its concrete kind's record with a trailing
//! template-parameter array; the array is a block of pointers at
//! TEMPLATE_PARAMETER records. Updating a template's parameter list is a
//! structural replacement: the old parameter records and block are freed
//! and a new array is stored.
//!
//! Partial specializations extend the class-template layout (they are
//! themselves templates) with their argument pattern, their primary, and a
//! chain pointer; the primary keeps them on a singly linked list for
//! instantiation-time matching by argument-signature hash.

use crate::annotation;
use crate::args;
use crate::marshal::{self, BindingRefs, PdomTemplateArg};
use crate::node_type;
use crate::records::{self, class_type, function, variable};
use pdom_ast::{
    AstArena, AstBinding, AstTemplateParam, ClassFacet, FunctionFacet, TemplateFacet,
    TemplateParamKind, TypedefFacet, VariableFacet,
};
use pdom_common::{PdomError, RecordRef, Result};
use pdom_db::Database;
use tracing::warn;

pub mod tparam_layout {
    use crate::records::binding_layout;

    /// u8 `TemplateParamKind`.
    pub const PARAM_KIND: u64 = binding_layout::RECORD_SIZE;
    pub const PACK: u64 = binding_layout::RECORD_SIZE + 1;
    /// Template-argument record, null when no default.
    pub const DEFAULT_ARG: u64 = binding_layout::RECORD_SIZE + 2;
    /// i32 stable id: nesting level in the high 16 bits, position low.
    pub const PARAM_ID: u64 = binding_layout::RECORD_SIZE + 10;
    pub const RECORD_SIZE: u64 = binding_layout::RECORD_SIZE + 14;
}

pub mod class_template_layout {
    use crate::records::class_type;

    pub const TEMPLATE_PARAMS: u64 = class_type::layout::RECORD_SIZE;
    /// Head of the partial-specialization chain.
    pub const FIRST_PARTIAL: u64 = class_type::layout::RECORD_SIZE + 8;
    pub const RECORD_SIZE: u64 = class_type::layout::RECORD_SIZE + 16;
}

pub mod function_template_layout {
    use crate::records::function;

    pub const TEMPLATE_PARAMS: u64 = function::layout::RECORD_SIZE;
    pub const RECORD_SIZE: u64 = function::layout::RECORD_SIZE + 8;
}

pub mod variable_template_layout {
    use crate::records::variable;

    pub const TEMPLATE_PARAMS: u64 = variable::layout::RECORD_SIZE;
    pub const RECORD_SIZE: u64 = variable::layout::RECORD_SIZE + 8;
}

pub mod alias_template_layout {
    use crate::records::namespace::typedef_layout;

    pub const TEMPLATE_PARAMS: u64 = typedef_layout::RECORD_SIZE;
    pub const RECORD_SIZE: u64 = typedef_layout::RECORD_SIZE + 8;
}

pub mod concept_layout {
    use crate::records::binding_layout;

    pub const TEMPLATE_PARAMS: u64 = binding_layout::RECORD_SIZE;
    /// Opaque constraint-expression blob.
    pub const CONSTRAINT: u64 = binding_layout::RECORD_SIZE + 8;
    pub const RECORD_SIZE: u64 = binding_layout::RECORD_SIZE + 16;
}

pub mod partial_layout {
    use super::class_template_layout;

    /// Argument pattern of this partial specialization.
    pub const ARGUMENTS: u64 = class_template_layout::RECORD_SIZE;
    /// The primary class template.
    pub const PRIMARY: u64 = class_template_layout::RECORD_SIZE + 8;
    pub const NEXT_PARTIAL: u64 = class_template_layout::RECORD_SIZE + 16;
    /// i32 hash of the canonical argument-pattern signature.
    pub const SIG_HASH: u64 = class_template_layout::RECORD_SIZE + 24;
    pub const RECORD_SIZE: u64 = class_template_layout::RECORD_SIZE + 28;
}

// ---------------------------------------------------------------------
// Template-parameter arrays
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomTemplateParameter {
    pub record: RecordRef,
}

impl PdomTemplateParameter {
    pub fn kind(&self, db: &Database) -> TemplateParamKind {
        match db.get_byte(self.record, tparam_layout::PARAM_KIND) {
            Ok(raw) => TemplateParamKind::from_u8(raw),
            Err(fault) => {
                warn!(rec = self.record.raw(), %fault, "parameter kind unreadable, defaulting to type");
                TemplateParamKind::Type
            }
        }
    }

    pub fn is_pack(&self, db: &Database) -> bool {
        db.get_byte(self.record, tparam_layout::PACK).map(|b| b != 0).unwrap_or(false)
    }

    pub fn param_id(&self, db: &Database) -> Result<i32> {
        db.get_int(self.record, tparam_layout::PARAM_ID)
    }

    pub fn default_argument(&self, db: &Database) -> Result<Option<PdomTemplateArg>> {
        match db.get_rec(self.record, tparam_layout::DEFAULT_ARG)?.non_null() {
            Some(rec) => Ok(Some(marshal::load_template_argument(db, rec)?)),
            None => Ok(None),
        }
    }

    pub fn name<'a>(&self, db: &'a Database) -> Result<&'a [u8]> {
        records::name_bytes(db, self.record)
    }
}

fn store_template_param(
    db: &mut Database,
    ast: &AstArena,
    refs: &BindingRefs,
    owner: RecordRef,
    param: &AstTemplateParam,
) -> Result<RecordRef> {
    let rec = db.malloc(tparam_layout::RECORD_SIZE as u32)?;
    records::init_binding(db, rec, node_type::TEMPLATE_PARAMETER, owner, param.name.as_bytes())?;
    db.put_byte(rec, tparam_layout::PARAM_KIND, param.kind.as_u8())?;
    db.put_byte(rec, tparam_layout::PACK, u8::from(param.is_pack))?;
    let default = match &param.default_argument {
        Some(arg) => marshal::store_template_argument(db, ast, refs, arg)?,
        None => RecordRef::NULL,
    };
    db.put_rec(rec, tparam_layout::DEFAULT_ARG, default)?;
    db.put_int(rec, tparam_layout::PARAM_ID, param.param_id)?;
    Ok(rec)
}

fn free_template_param(db: &mut Database, rec: RecordRef) -> Result<()> {
    if let Some(default) = db.get_rec(rec, tparam_layout::DEFAULT_ARG)?.non_null() {
        marshal::free_template_argument(db, default)?;
    }
    db.free_string(records::name_rec(db, rec)?)?;
    db.free(rec)
}

fn store_param_array(
    db: &mut Database,
    ast: &AstArena,
    refs: &BindingRefs,
    owner: RecordRef,
    params: &[AstTemplateParam],
) -> Result<RecordRef> {
    let block = db.block_new(marshal::REC_SLOT, params.len() as u32)?;
    for (i, param) in params.iter().enumerate() {
        let rec = store_template_param(db, ast, refs, owner, param)?;
        db.block_put_rec(block, marshal::REC_SLOT, i as u32, 0, rec)?;
    }
    Ok(block)
}

fn params_field(db: &Database, rec: RecordRef) -> Result<u64> {
    let tag = records::node_tag(db, rec)?;
    records::template_params_field(tag)
        .ok_or(PdomError::Unsupported("record has no template-parameter array"))
}

/// The parameter array of any template-kind record.
pub fn template_parameters(db: &Database, rec: RecordRef) -> Result<Vec<PdomTemplateParameter>> {
    let field = params_field(db, rec)?;
    let Some(block) = db.get_rec(rec, field)?.non_null() else {
        return Ok(Vec::new());
    };
    let len = db.block_len(block, marshal::REC_SLOT)?;
    let mut out = Vec::with_capacity(len as usize);
    for i in 0..len {
        out.push(PdomTemplateParameter {
            record: db.block_get_rec(block, marshal::REC_SLOT, i, 0)?,
        });
    }
    Ok(out)
}

/// Persists a single template parameter outside an owner's parameter
/// array. Used when a parameter binding is added on its own; the owner's
/// array replaces it wholesale on the next definition.
pub fn create_template_parameter(
    db: &mut Database,
    ast: &AstArena,
    refs: &BindingRefs,
    owner: RecordRef,
    param: &AstTemplateParam,
) -> Result<RecordRef> {
    store_template_param(db, ast, refs, owner, param)
}

/// Frees the parameter array and the parameter records it owns, nulling
/// the owner's field.
pub fn free_template_parameters(db: &mut Database, rec: RecordRef) -> Result<()> {
    let field = params_field(db, rec)?;
    if let Some(block) = db.get_rec(rec, field)?.non_null() {
        let len = db.block_len(block, marshal::REC_SLOT)?;
        for i in 0..len {
            let slot = db.block_get_rec(block, marshal::REC_SLOT, i, 0)?;
            free_template_param(db, slot)?;
        }
        db.free(block)?;
        db.put_rec(rec, field, RecordRef::NULL)?;
    }
    Ok(())
}

/// Structural replacement of the parameter array: the persisted parameter
/// records are freed, not patched, and a fresh array is stored.
pub fn replace_template_parameters(
    db: &mut Database,
    ast: &AstArena,
    refs: &BindingRefs,
    rec: RecordRef,
    params: &[AstTemplateParam],
) -> Result<()> {
    free_template_parameters(db, rec)?;
    let field = params_field(db, rec)?;
    let fresh = store_param_array(db, ast, refs, rec, params)?;
    db.put_rec(rec, field, fresh)
}

// ---------------------------------------------------------------------
// Class templates
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomClassTemplate {
    pub record: RecordRef,
}

impl PdomClassTemplate {
    pub fn create(
        db: &mut Database,
        parent: RecordRef,
        ast: &AstArena,
        refs: &BindingRefs,
        binding: &AstBinding,
        class_facet: &ClassFacet,
        template_facet: &TemplateFacet,
    ) -> Result<PdomClassTemplate> {
        let rec = db.malloc(class_template_layout::RECORD_SIZE as u32)?;
        records::init_binding(db, rec, node_type::CLASS_TEMPLATE, parent, binding.name_bytes())?;
        class_type::write_class_fields(db, rec, binding.visibility, class_facet)?;
        let params = store_param_array(db, ast, refs, rec, &template_facet.parameters)?;
        db.put_rec(rec, class_template_layout::TEMPLATE_PARAMS, params)?;
        Ok(PdomClassTemplate { record: rec })
    }

    pub fn template_parameters(&self, db: &Database) -> Result<Vec<PdomTemplateParameter>> {
        template_parameters(db, self.record)
    }

    pub fn partial_specializations(&self, db: &Database) -> Result<Vec<PdomPartialSpecialization>> {
        let mut out = Vec::new();
        let mut cursor = db.get_rec(self.record, class_template_layout::FIRST_PARTIAL)?;
        while let Some(rec) = cursor.non_null() {
            out.push(PdomPartialSpecialization { record: rec });
            cursor = db.get_rec(rec, partial_layout::NEXT_PARTIAL)?;
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------
// Function templates
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomFunctionTemplate {
    pub record: RecordRef,
}

impl PdomFunctionTemplate {
    /// Writes the self-contained fields; the function detail fields are
    /// filled by `function::configure` in the deferred step.
    pub fn create(
        db: &mut Database,
        parent: RecordRef,
        ast: &AstArena,
        refs: &BindingRefs,
        binding: &AstBinding,
        function_facet: &FunctionFacet,
        template_facet: &TemplateFacet,
        file_scope: bool,
        sig_hash: i32,
    ) -> Result<PdomFunctionTemplate> {
        let rec = db.malloc(function_template_layout::RECORD_SIZE as u32)?;
        records::init_binding(db, rec, node_type::FUNCTION_TEMPLATE, parent, binding.name_bytes())?;
        db.put_short(
            rec,
            function::layout::ANNOTATION,
            annotation::function::encode(function_facet.modifiers, binding.visibility, file_scope)
                as i16,
        )?;
        db.put_int(rec, function::layout::SIG_HASH, sig_hash)?;
        let params = store_param_array(db, ast, refs, rec, &template_facet.parameters)?;
        db.put_rec(rec, function_template_layout::TEMPLATE_PARAMS, params)?;
        Ok(PdomFunctionTemplate { record: rec })
    }

    pub fn template_parameters(&self, db: &Database) -> Result<Vec<PdomTemplateParameter>> {
        template_parameters(db, self.record)
    }

    pub fn as_function(&self) -> function::PdomFunction {
        function::PdomFunction { record: self.record }
    }
}

// ---------------------------------------------------------------------
// Variable templates
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomVariableTemplate {
    pub record: RecordRef,
}

impl PdomVariableTemplate {
    pub fn create(
        db: &mut Database,
        parent: RecordRef,
        ast: &AstArena,
        refs: &BindingRefs,
        binding: &AstBinding,
        variable_facet: &VariableFacet,
        template_facet: &TemplateFacet,
        file_scope: bool,
    ) -> Result<PdomVariableTemplate> {
        let rec = db.malloc(variable_template_layout::RECORD_SIZE as u32)?;
        records::init_binding(db, rec, node_type::VARIABLE_TEMPLATE, parent, binding.name_bytes())?;
        variable::write_fields(db, ast, refs, rec, binding.visibility, variable_facet, file_scope)?;
        let params = store_param_array(db, ast, refs, rec, &template_facet.parameters)?;
        db.put_rec(rec, variable_template_layout::TEMPLATE_PARAMS, params)?;
        Ok(PdomVariableTemplate { record: rec })
    }

    pub fn as_variable(&self) -> variable::PdomVariable {
        variable::PdomVariable { record: self.record }
    }

    pub fn template_parameters(&self, db: &Database) -> Result<Vec<PdomTemplateParameter>> {
        template_parameters(db, self.record)
    }
}

// ---------------------------------------------------------------------
// Alias templates
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomAliasTemplate {
    pub record: RecordRef,
}

impl PdomAliasTemplate {
    pub fn create(
        db: &mut Database,
        parent: RecordRef,
        ast: &AstArena,
        refs: &BindingRefs,
        binding: &AstBinding,
        typedef_facet: &TypedefFacet,
        template_facet: &TemplateFacet,
    ) -> Result<PdomAliasTemplate> {
        let rec = db.malloc(alias_template_layout::RECORD_SIZE as u32)?;
        records::init_binding(db, rec, node_type::ALIAS_TEMPLATE, parent, binding.name_bytes())?;
        let type_rec = marshal::store_type(db, ast, refs, typedef_facet.target_type)?;
        db.put_rec(rec, crate::records::namespace::typedef_layout::TYPE, type_rec)?;
        let params = store_param_array(db, ast, refs, rec, &template_facet.parameters)?;
        db.put_rec(rec, alias_template_layout::TEMPLATE_PARAMS, params)?;
        Ok(PdomAliasTemplate { record: rec })
    }

    pub fn aliased_type(&self, db: &Database) -> Result<marshal::PdomType> {
        marshal::load_type(db, db.get_rec(self.record, crate::records::namespace::typedef_layout::TYPE)?)
    }

    pub fn template_parameters(&self, db: &Database) -> Result<Vec<PdomTemplateParameter>> {
        template_parameters(db, self.record)
    }
}

// ---------------------------------------------------------------------
// Concepts
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomConcept {
    pub record: RecordRef,
}

impl PdomConcept {
    pub fn create(
        db: &mut Database,
        parent: RecordRef,
        ast: &AstArena,
        refs: &BindingRefs,
        binding: &AstBinding,
        template_facet: &TemplateFacet,
        constraint: &[u8],
    ) -> Result<PdomConcept> {
        let rec = db.malloc(concept_layout::RECORD_SIZE as u32)?;
        records::init_binding(db, rec, node_type::CONCEPT, parent, binding.name_bytes())?;
        let params = store_param_array(db, ast, refs, rec, &template_facet.parameters)?;
        db.put_rec(rec, concept_layout::TEMPLATE_PARAMS, params)?;
        let blob = db.new_blob(constraint)?;
        db.put_rec(rec, concept_layout::CONSTRAINT, blob)?;
        Ok(PdomConcept { record: rec })
    }

    pub fn constraint(&self, db: &Database) -> Result<Vec<u8>> {
        match db.get_rec(self.record, concept_layout::CONSTRAINT)?.non_null() {
            Some(rec) => Ok(db.blob_bytes(rec)?.to_vec()),
            None => Ok(Vec::new()),
        }
    }

    pub fn template_parameters(&self, db: &Database) -> Result<Vec<PdomTemplateParameter>> {
        template_parameters(db, self.record)
    }
}

// ---------------------------------------------------------------------
// Partial specializations
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomPartialSpecialization {
    pub record: RecordRef,
}

impl PdomPartialSpecialization {
    /// Creates the record and links it onto the primary's partial chain.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        db: &mut Database,
        parent: RecordRef,
        ast: &AstArena,
        refs: &BindingRefs,
        binding: &AstBinding,
        class_facet: &ClassFacet,
        template_facet: &TemplateFacet,
        arguments: &[pdom_ast::AstTemplateArg],
        primary: RecordRef,
        sig_hash: i32,
    ) -> Result<PdomPartialSpecialization> {
        let rec = db.malloc(partial_layout::RECORD_SIZE as u32)?;
        records::init_binding(db, rec, node_type::PARTIAL_SPECIALIZATION, parent, binding.name_bytes())?;
        class_type::write_class_fields(db, rec, binding.visibility, class_facet)?;
        let params = store_param_array(db, ast, refs, rec, &template_facet.parameters)?;
        db.put_rec(rec, class_template_layout::TEMPLATE_PARAMS, params)?;
        let args_block = args::put_arguments(db, ast, refs, arguments)?;
        db.put_rec(rec, partial_layout::ARGUMENTS, args_block)?;
        db.put_rec(rec, partial_layout::PRIMARY, primary)?;
        db.put_int(rec, partial_layout::SIG_HASH, sig_hash)?;
        let head = db.get_rec(primary, class_template_layout::FIRST_PARTIAL)?;
        db.put_rec(rec, partial_layout::NEXT_PARTIAL, head)?;
        db.put_rec(primary, class_template_layout::FIRST_PARTIAL, rec)?;
        Ok(PdomPartialSpecialization { record: rec })
    }

    pub fn primary(&self, db: &Database) -> Result<RecordRef> {
        db.get_rec(self.record, partial_layout::PRIMARY)
    }

    pub fn arguments(&self, db: &Database) -> Result<Vec<PdomTemplateArg>> {
        args::get_arguments(db, db.get_rec(self.record, partial_layout::ARGUMENTS)?)
    }

    pub fn signature_hash(&self, db: &Database) -> Result<i32> {
        db.get_int(self.record, partial_layout::SIG_HASH)
    }

    pub fn template_parameters(&self, db: &Database) -> Result<Vec<PdomTemplateParameter>> {
        template_parameters(db, self.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdom_ast::{AstTemplateArg, ClassKey};

    fn tparam(name: &str, position: i32) -> AstTemplateParam {
        AstTemplateParam {
            name: name.into(),
            kind: TemplateParamKind::Type,
            is_pack: false,
            default_argument: None,
            param_id: position,
        }
    }

    #[test]
    fn test_class_template_parameters_round_trip() {
        let mut db = Database::new();
        let ast = AstArena::new();
        let refs = BindingRefs::default();
        let class_facet = ClassFacet { key: ClassKey::Class, ..ClassFacet::default() };
        let template_facet = TemplateFacet { parameters: vec![tparam("T", 0), tparam("U", 1)] };
        let binding = AstBinding::named("Pair")
            .with_class(class_facet.clone())
            .with_template(template_facet.clone());
        let t = PdomClassTemplate::create(
            &mut db,
            RecordRef::NULL,
            &ast,
            &refs,
            &binding,
            &class_facet,
            &template_facet,
        )
        .unwrap();
        let params = t.template_parameters(&db).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name(&db).unwrap(), b"T");
        assert_eq!(params[1].param_id(&db).unwrap(), 1);
        assert_eq!(params[0].kind(&db), TemplateParamKind::Type);
    }

    #[test]
    fn test_replace_parameters_is_structural() {
        let mut db = Database::new();
        let ast = AstArena::new();
        let refs = BindingRefs::default();
        let class_facet = ClassFacet::default();
        let template_facet = TemplateFacet { parameters: vec![tparam("T", 0)] };
        let binding = AstBinding::named("Box")
            .with_class(class_facet.clone())
            .with_template(template_facet.clone());
        let t = PdomClassTemplate::create(
            &mut db,
            RecordRef::NULL,
            &ast,
            &refs,
            &binding,
            &class_facet,
            &template_facet,
        )
        .unwrap();
        let old = t.template_parameters(&db).unwrap();
        replace_template_parameters(
            &mut db,
            &ast,
            &refs,
            t.record,
            &[tparam("T", 0), tparam("N", 1)],
        )
        .unwrap();
        let fresh = t.template_parameters(&db).unwrap();
        assert_eq!(fresh.len(), 2);
        // Replacement allocates new records rather than patching old ones.
        assert_ne!(old[0].record, fresh[1].record);
        assert_eq!(fresh[1].name(&db).unwrap(), b"N");
    }

    #[test]
    fn test_partial_chain_on_primary() {
        let mut db = Database::new();
        let mut ast = AstArena::new();
        let refs = BindingRefs::default();
        let class_facet = ClassFacet::default();
        let template_facet = TemplateFacet { parameters: vec![tparam("T", 0)] };
        let binding = AstBinding::named("S")
            .with_class(class_facet.clone())
            .with_template(template_facet.clone());
        let primary = PdomClassTemplate::create(
            &mut db,
            RecordRef::NULL,
            &ast,
            &refs,
            &binding,
            &class_facet,
            &template_facet,
        )
        .unwrap();
        let int_t = ast.int_type();
        let ptr = ast.add_type(pdom_ast::AstType::Pointer(int_t));
        let partial = PdomPartialSpecialization::create(
            &mut db,
            RecordRef::NULL,
            &ast,
            &refs,
            &binding,
            &class_facet,
            &template_facet,
            &[AstTemplateArg::Type(ptr)],
            primary.record,
            77,
        )
        .unwrap();
        let chain = primary.partial_specializations(&db).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].record, partial.record);
        assert_eq!(chain[0].primary(&db).unwrap(), primary.record);
        assert_eq!(chain[0].signature_hash(&db).unwrap(), 77);
        assert_eq!(chain[0].arguments(&db).unwrap().len(), 1);
    }
}
