//! Lazy member specialization and template instantiation.
//!
//! `specialize_member` resolves "the version of this member inside that
//! class specialization", building the owner's specialization map on first
//! use and caching it in the registry. Re-entrant requests for a member
//! already being specialized get a distinct `Recursion` placeholder rather
//! than recursing forever; the in-progress set travels in an explicit
//! `SpecializationContext` carried by the caller, never in thread-local
//! state. Concurrent stores of the same key resolve first-writer-wins.
//!
//! `instantiate` resolves `T<Args...>` against the instance cache, walking
//! the primary's partial specializations by argument-signature hash before
//! falling back to the primary itself. Arguments whose canonical signature
//! cannot be computed (dependent context) produce at most one cached
//! deferred instance per template.

use crate::cache::{CacheRegistry, CacheSlot, CacheValue, SpecMap};
use crate::marshal::BindingRefs;
use crate::node_type;
use crate::records::{self, class_type, function, specialization, template};
use crate::scope;
use crate::signature;
use pdom_ast::{AstArena, AstTemplateArg, SpecFacet, Visibility};
use pdom_common::{PdomError, RecordRef, Result};
use pdom_db::Database;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::debug;

/// Explicit recursion guard: the set of (owner, original) pairs currently
/// being specialized by this call chain.
#[derive(Debug, Default)]
pub struct SpecializationContext {
    in_progress: FxHashSet<(RecordRef, RecordRef)>,
}

impl SpecializationContext {
    pub fn new() -> SpecializationContext {
        SpecializationContext::default()
    }
}

/// Result of a member-specialization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecializedMember {
    Binding(RecordRef),
    /// The member is already being specialized further up this call chain;
    /// the caller sees a placeholder instead of infinite recursion.
    Recursion,
}

/// The owner's original-member -> specialized-member map, built on first
/// use by visiting the owner's stored members and indexing them by their
/// specialized-binding back-reference.
pub fn specialization_map(
    db: &Database,
    caches: &CacheRegistry,
    owner: RecordRef,
) -> Result<Arc<SpecMap>> {
    if let Some(CacheValue::Specializations(map)) = caches.get(owner, CacheSlot::Specializations) {
        return Ok(map);
    }
    let map = SpecMap::default();
    class_type::visit_members(db, owner, &mut |member, _| {
        if node_type::is_specialization(records::node_tag(db, member)?) {
            let original = specialization::specialized_record(db, member);
            if !original.is_null() {
                map.insert(original, member);
            }
        }
        Ok(true)
    })?;
    match caches.publish(owner, CacheSlot::Specializations, CacheValue::Specializations(Arc::new(map)))
    {
        CacheValue::Specializations(map) => Ok(map),
        other => unreachable!("Specializations slot held {other:?}"),
    }
}

/// Resolves the specialization of `original` inside `owner`, creating and
/// persisting it on first request.
pub fn specialize_member(
    db: &mut Database,
    caches: &CacheRegistry,
    owner: RecordRef,
    original: RecordRef,
    ctx: &mut SpecializationContext,
) -> Result<SpecializedMember> {
    let map = specialization_map(db, caches, owner)?;
    if let Some(hit) = map.get(&original) {
        return Ok(SpecializedMember::Binding(*hit.value()));
    }
    if !ctx.in_progress.insert((owner, original)) {
        debug!(owner = owner.raw(), original = original.raw(), "re-entrant specialization");
        return Ok(SpecializedMember::Recursion);
    }
    let created = create_member_specialization(db, owner, original);
    ctx.in_progress.remove(&(owner, original));
    let created = created?;

    // First writer wins; a racing store keeps the earlier record and the
    // newly built one is released.
    let winner = *map.entry(original).or_insert(created).value();
    if winner != created {
        db.free_string(records::name_rec(db, created)?)?;
        db.free(created)?;
        return Ok(SpecializedMember::Binding(winner));
    }
    let visibility = member_visibility(db, original);
    class_type::add_member(db, owner, created, visibility)?;
    scope::note_member_added(db, caches, owner, created)?;
    Ok(SpecializedMember::Binding(created))
}

fn member_visibility(db: &Database, original: RecordRef) -> Visibility {
    let owner = match records::parent_of(db, original) {
        Ok(parent) => parent,
        Err(_) => return Visibility::Unspecified,
    };
    if owner.is_null() {
        return Visibility::Unspecified;
    }
    class_type::member_accessibility(db, owner, original)
}

/// Allocates the specialized counterpart of `original` inside a class
/// specialization. Detail fields stay unset; readers follow the
/// specialized-binding back-reference for anything not overridden here.
fn create_member_specialization(
    db: &mut Database,
    owner: RecordRef,
    original: RecordRef,
) -> Result<RecordRef> {
    let tag = records::node_tag(db, original)?;
    let name = records::name_bytes(db, original)?.to_vec();
    let sig_hash = signature::stored_hash(db, original)?.unwrap_or(0);
    let (spec_tag, size) = match tag {
        node_type::CLASS_TYPE | node_type::CLASS_TEMPLATE => (
            node_type::CLASS_SPECIALIZATION,
            specialization::class_spec_layout::RECORD_SIZE,
        ),
        node_type::CONSTRUCTOR => (
            node_type::CONSTRUCTOR_SPECIALIZATION,
            specialization::function_spec_layout::RECORD_SIZE,
        ),
        node_type::METHOD | node_type::FUNCTION | node_type::FUNCTION_TEMPLATE => (
            node_type::METHOD_SPECIALIZATION,
            specialization::function_spec_layout::RECORD_SIZE,
        ),
        node_type::FIELD | node_type::VARIABLE => (
            node_type::FIELD_SPECIALIZATION,
            specialization::field_spec_layout::RECORD_SIZE,
        ),
        other => {
            return Err(PdomError::semantic(format!(
                "member kind {other} cannot be specialized"
            )));
        }
    };
    let rec = db.malloc(size as u32)?;
    records::init_binding(db, rec, spec_tag, owner, &name)?;
    specialization::write_deferring_header(db, rec, original, sig_hash)?;
    match spec_tag {
        node_type::CLASS_SPECIALIZATION => {
            let fields = records::class_fields(spec_tag).expect("class spec has class fields");
            db.put_byte(rec, fields.annotation, class_type::class_annotation(db, original))?;
            db.put_byte(rec, fields.key, class_type::class_key(db, original).as_u8())?;
        }
        node_type::FIELD_SPECIALIZATION => {}
        _ => {
            let fields =
                records::function_fields(spec_tag).expect("function spec has function fields");
            db.put_short(
                rec,
                fields.annotation,
                function::function_annotation(db, original) as i16,
            )?;
        }
    }
    Ok(rec)
}

// ---------------------------------------------------------------------
// Instantiation
// ---------------------------------------------------------------------

/// Resolves `template<args...>`, reusing the cached instance when one
/// exists. Partial specializations are consulted by argument-signature
/// hash before the primary.
pub fn instantiate(
    db: &mut Database,
    caches: &CacheRegistry,
    ast: &AstArena,
    refs: &BindingRefs,
    template_rec: RecordRef,
    arguments: &[AstTemplateArg],
) -> Result<RecordRef> {
    let key = match signature::template_args_signature(ast, arguments) {
        Ok(key) => key,
        Err(fault) => {
            debug!(template = template_rec.raw(), %fault, "dependent arguments, deferred instance");
            return deferred_instance(db, caches, ast, refs, template_rec, arguments);
        }
    };
    let instances = caches.instances(template_rec);
    if let Some(hit) = instances.get(&key) {
        return Ok(*hit.value());
    }
    let specialized = select_specialized(db, template_rec, signature::hash(&key))?;
    let created =
        create_class_instance(db, ast, refs, template_rec, specialized, arguments, signature::hash(&key))?;
    let winner = *instances.entry(key).or_insert(created).value();
    if winner != created {
        free_instance(db, created)?;
        return Ok(winner);
    }
    Ok(created)
}

/// At most one deferred instance per template is kept for argument lists
/// whose canonical form cannot be computed yet.
fn deferred_instance(
    db: &mut Database,
    caches: &CacheRegistry,
    ast: &AstArena,
    refs: &BindingRefs,
    template_rec: RecordRef,
    arguments: &[AstTemplateArg],
) -> Result<RecordRef> {
    if let Some(CacheValue::DeferredInstance(rec)) =
        caches.get(template_rec, CacheSlot::DeferredInstance)
    {
        return Ok(rec);
    }
    let created = create_class_instance(db, ast, refs, template_rec, template_rec, arguments, 0)?;
    match caches.publish(
        template_rec,
        CacheSlot::DeferredInstance,
        CacheValue::DeferredInstance(created),
    ) {
        CacheValue::DeferredInstance(winner) => {
            if winner != created {
                free_instance(db, created)?;
            }
            Ok(winner)
        }
        other => unreachable!("DeferredInstance slot held {other:?}"),
    }
}

/// The record the instance specializes: a partial specialization whose
/// stored argument-signature hash matches, or the primary template.
fn select_specialized(db: &Database, template_rec: RecordRef, arg_hash: i32) -> Result<RecordRef> {
    if records::node_tag(db, template_rec)? == node_type::CLASS_TEMPLATE {
        let primary = template::PdomClassTemplate { record: template_rec };
        for partial in primary.partial_specializations(db)? {
            if partial.signature_hash(db)? == arg_hash {
                return Ok(partial.record);
            }
        }
    }
    Ok(template_rec)
}

fn create_class_instance(
    db: &mut Database,
    ast: &AstArena,
    refs: &BindingRefs,
    template_rec: RecordRef,
    specialized: RecordRef,
    arguments: &[AstTemplateArg],
    sig_hash: i32,
) -> Result<RecordRef> {
    let parent = records::parent_of(db, template_rec)?;
    let name = records::name_bytes(db, template_rec)?.to_vec();
    let params = template::template_parameters(db, template_rec)?;
    let mut map = Vec::with_capacity(arguments.len());
    for (param, arg) in params.iter().zip(arguments) {
        map.push((param.param_id(db)?, arg.clone()));
    }
    let facet = SpecFacet {
        specialized: pdom_ast::BindingId(0),
        arguments: None,
        tparam_map: map,
        owns_map: true,
        primary: None,
    };

    match records::node_tag(db, template_rec)? {
        node_type::CLASS_TEMPLATE => {
            let rec =
                db.malloc(specialization::class_instance_layout::RECORD_SIZE as u32)?;
            records::init_binding(db, rec, node_type::CLASS_INSTANCE, parent, &name)?;
            specialization::write_spec_header(db, ast, refs, rec, specialized, &facet, sig_hash)?;
            let fields =
                records::class_fields(node_type::CLASS_INSTANCE).expect("instance has class fields");
            db.put_byte(rec, fields.annotation, class_type::class_annotation(db, template_rec))?;
            db.put_byte(rec, fields.key, class_type::class_key(db, template_rec).as_u8())?;
            let block = crate::args::put_arguments(db, ast, refs, arguments)?;
            db.put_rec(rec, specialization::class_instance_layout::ARGUMENTS, block)?;
            Ok(rec)
        }
        node_type::FUNCTION_TEMPLATE => {
            let rec =
                db.malloc(specialization::function_instance_layout::RECORD_SIZE as u32)?;
            records::init_binding(db, rec, node_type::FUNCTION_INSTANCE, parent, &name)?;
            specialization::write_spec_header(db, ast, refs, rec, specialized, &facet, sig_hash)?;
            let fields = records::function_fields(node_type::FUNCTION_INSTANCE)
                .expect("instance has function fields");
            db.put_short(
                rec,
                fields.annotation,
                function::function_annotation(db, template_rec) as i16,
            )?;
            let block = crate::args::put_arguments(db, ast, refs, arguments)?;
            db.put_rec(rec, specialization::function_instance_layout::ARGUMENTS, block)?;
            Ok(rec)
        }
        node_type::VARIABLE_TEMPLATE => {
            let rec =
                db.malloc(specialization::variable_instance_layout::RECORD_SIZE as u32)?;
            records::init_binding(db, rec, node_type::VARIABLE_INSTANCE, parent, &name)?;
            specialization::write_spec_header(db, ast, refs, rec, specialized, &facet, sig_hash)?;
            let block = crate::args::put_arguments(db, ast, refs, arguments)?;
            db.put_rec(rec, specialization::variable_instance_layout::ARGUMENTS, block)?;
            Ok(rec)
        }
        other => Err(PdomError::semantic(format!("kind {other} is not instantiable"))),
    }
}

fn free_instance(db: &mut Database, rec: RecordRef) -> Result<()> {
    let tag = records::node_tag(db, rec)?;
    if let Some(field) = records::arguments_field(tag) {
        let block = db.get_rec(rec, field)?;
        crate::args::clear_arguments(db, block)?;
    }
    let map = db.get_rec(rec, specialization::spec_layout::TPARAM_MAP)?;
    crate::args::clear_parameter_map(db, map)?;
    let name = records::name_rec(db, rec)?;
    db.free_string(name)?;
    db.free(rec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdom_ast::{AstArena, AstBinding, AstType, ClassFacet, TemplateFacet, TemplateParamKind};

    fn class_template(db: &mut Database, ast: &AstArena, name: &str) -> RecordRef {
        let refs = BindingRefs::default();
        let class_facet = ClassFacet::default();
        let template_facet = TemplateFacet {
            parameters: vec![pdom_ast::AstTemplateParam {
                name: "T".into(),
                kind: TemplateParamKind::Type,
                is_pack: false,
                default_argument: None,
                param_id: 0,
            }],
        };
        let binding = AstBinding::named(name)
            .with_class(class_facet.clone())
            .with_template(template_facet.clone());
        template::PdomClassTemplate::create(
            db,
            RecordRef::NULL,
            ast,
            &refs,
            &binding,
            &class_facet,
            &template_facet,
        )
        .unwrap()
        .record
    }

    #[test]
    fn test_instantiate_reuses_cached_instance() {
        let mut db = Database::new();
        let mut ast = AstArena::new();
        let caches = CacheRegistry::new();
        let refs = BindingRefs::default();
        let t = class_template(&mut db, &ast, "Box");
        let int_t = ast.int_type();
        let args = vec![AstTemplateArg::Type(int_t)];
        let first = instantiate(&mut db, &caches, &ast, &refs, t, &args).unwrap();
        let second = instantiate(&mut db, &caches, &ast, &refs, t, &args).unwrap();
        assert_eq!(first, second);
        assert_eq!(records::node_tag(&db, first).unwrap(), node_type::CLASS_INSTANCE);
        // Distinct arguments get a distinct instance.
        let double_t = ast.basic_type(pdom_ast::BasicKind::Double);
        let other =
            instantiate(&mut db, &caches, &ast, &refs, t, &[AstTemplateArg::Type(double_t)])
                .unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn test_instantiate_prefers_matching_partial() {
        let mut db = Database::new();
        let mut ast = AstArena::new();
        let caches = CacheRegistry::new();
        let refs = BindingRefs::default();
        let t = class_template(&mut db, &ast, "S");
        let int_t = ast.int_type();
        let ptr = ast.add_type(AstType::Pointer(int_t));
        let pattern = vec![AstTemplateArg::Type(ptr)];
        let pattern_sig = signature::template_args_signature(&ast, &pattern).unwrap();
        let partial = template::PdomPartialSpecialization::create(
            &mut db,
            RecordRef::NULL,
            &ast,
            &refs,
            &AstBinding::named("S"),
            &ClassFacet::default(),
            &TemplateFacet::default(),
            &pattern,
            t,
            signature::hash(&pattern_sig),
        )
        .unwrap();
        let via_partial = instantiate(&mut db, &caches, &ast, &refs, t, &pattern).unwrap();
        assert_eq!(specialization::specialized_record(&db, via_partial), partial.record);
        // Non-matching arguments fall back to the primary.
        let plain = instantiate(&mut db, &caches, &ast, &refs, t, &[AstTemplateArg::Type(int_t)])
            .unwrap();
        assert_eq!(specialization::specialized_record(&db, plain), t);
    }

    #[test]
    fn test_dependent_arguments_share_one_deferred_instance() {
        let mut db = Database::new();
        let mut ast = AstArena::new();
        let caches = CacheRegistry::new();
        let refs = BindingRefs::default();
        let t = class_template(&mut db, &ast, "W");
        let problem = ast.add_type(AstType::Problem);
        let args = vec![AstTemplateArg::Type(problem)];
        let first = instantiate(&mut db, &caches, &ast, &refs, t, &args).unwrap();
        let second = instantiate(&mut db, &caches, &ast, &refs, t, &args).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_specialize_member_caches_and_guards_recursion() {
        let mut db = Database::new();
        let mut ast = AstArena::new();
        let caches = CacheRegistry::new();
        let refs = BindingRefs::default();
        let t = class_template(&mut db, &ast, "Outer");
        // A nested class member of the primary.
        let nested = class_type::PdomClassType::create(
            &mut db,
            t,
            &AstBinding::named("Inner"),
            &ClassFacet::default(),
        )
        .unwrap()
        .record;
        class_type::add_member(&mut db, t, nested, Visibility::Public).unwrap();
        let int_t = ast.int_type();
        let owner =
            instantiate(&mut db, &caches, &ast, &refs, t, &[AstTemplateArg::Type(int_t)]).unwrap();

        let mut ctx = SpecializationContext::new();
        let first = specialize_member(&mut db, &caches, owner, nested, &mut ctx).unwrap();
        let SpecializedMember::Binding(rec) = first else {
            panic!("expected a binding, got {first:?}");
        };
        assert_eq!(records::node_tag(&db, rec).unwrap(), node_type::CLASS_SPECIALIZATION);
        assert_eq!(specialization::specialized_record(&db, rec), nested);
        // Second request is a cache hit on the same record.
        let again = specialize_member(&mut db, &caches, owner, nested, &mut ctx).unwrap();
        assert_eq!(again, SpecializedMember::Binding(rec));

        // A re-entrant request sees the placeholder, not a loop.
        let other = class_type::PdomClassType::create(
            &mut db,
            t,
            &AstBinding::named("Other"),
            &ClassFacet::default(),
        )
        .unwrap()
        .record;
        class_type::add_member(&mut db, t, other, Visibility::Public).unwrap();
        ctx.in_progress.insert((owner, other));
        let reentry = specialize_member(&mut db, &caches, owner, other, &mut ctx).unwrap();
        assert_eq!(reentry, SpecializedMember::Recursion);
    }
}
