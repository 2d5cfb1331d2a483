//! Template machinery end to end: instantiation through the linkage,
//! lazy member specialization, and the concurrency contract of the shared
//! cache registry.

use pdom_ast::{
    AstArena, AstBinding, AstName, AstTemplateArg, AstTemplateParam, AstType, BasicKind,
    ClassFacet, ClassKey, DeclModifiers, FunctionFacet, NameKind, SpecFacet, TemplateFacet,
    TemplateParamKind, VariableFacet, Visibility,
};
use pdom_cpp::cache::{CacheRegistry, CacheSlot, CacheValue};
use pdom_cpp::linkage::CppLinkage;
use pdom_cpp::marshal::{BindingRefs, PdomTemplateArg, PdomType};
use pdom_cpp::records::{self, class_type, specialization};
use pdom_cpp::records::function::function_annotation;
use pdom_cpp::specialize::{self, SpecializationContext, SpecializedMember};
use pdom_cpp::{annotation, node_type, scope, signature};
use pdom_common::RecordRef;
use pdom_db::Database;
use rayon::prelude::*;
use std::sync::Arc;

fn type_param(name: &str, param_id: i32) -> AstTemplateParam {
    AstTemplateParam {
        name: name.into(),
        kind: TemplateParamKind::Type,
        is_pack: false,
        default_argument: None,
        param_id,
    }
}

fn add_class_template(
    ast: &mut AstArena,
    linkage: &mut CppLinkage,
    name: &str,
) -> (pdom_ast::BindingId, RecordRef) {
    let binding = ast.add_binding(
        AstBinding::named(name)
            .with_class(ClassFacet { key: ClassKey::Struct, ..Default::default() })
            .with_template(TemplateFacet { parameters: vec![type_param("T", 0)] }),
    );
    let def = ast.definition_name(binding);
    let rec = linkage.add_binding(&ast, def).unwrap();
    assert_eq!(records::node_tag(linkage.database(), rec).unwrap(), node_type::CLASS_TEMPLATE);
    (binding, rec)
}

fn add_member_def(
    ast: &mut AstArena,
    linkage: &mut CppLinkage,
    binding: AstBinding,
) -> RecordRef {
    let id = ast.add_binding(binding);
    let name =
        ast.add_name(AstName { binding: id, kind: NameKind::Definition, composite_type_spec: true });
    linkage.add_binding(&ast, name).unwrap()
}

#[test]
fn test_field_specialization_maps_parameters_to_instance_arguments() {
    let mut ast = AstArena::new();
    let mut linkage = CppLinkage::new().unwrap();
    let (holder, holder_rec) = add_class_template(&mut ast, &mut linkage, "Holder");

    let param_ref = ast.add_type(AstType::TemplateParameter { param_id: 0 });
    let data_rec = add_member_def(
        &mut ast,
        &mut linkage,
        AstBinding::named("data")
            .with_variable(VariableFacet {
                var_type: param_ref,
                value: None,
                modifiers: DeclModifiers::empty(),
            })
            .with_owner(holder)
            .with_visibility(Visibility::Public),
    );
    assert_eq!(records::node_tag(linkage.database(), data_rec).unwrap(), node_type::FIELD);

    let caches = Arc::clone(linkage.caches());
    let refs = BindingRefs::default();
    let int_t = ast.int_type();
    let instance = specialize::instantiate(
        linkage.database_mut(),
        &caches,
        &ast,
        &refs,
        holder_rec,
        &[AstTemplateArg::Type(int_t)],
    )
    .unwrap();
    assert_eq!(records::node_tag(linkage.database(), instance).unwrap(), node_type::CLASS_INSTANCE);

    let mut ctx = SpecializationContext::new();
    let member =
        specialize::specialize_member(linkage.database_mut(), &caches, instance, data_rec, &mut ctx)
            .unwrap();
    let SpecializedMember::Binding(spec_rec) = member else {
        panic!("expected a binding, got {member:?}");
    };
    let db = linkage.database();
    assert_eq!(records::node_tag(db, spec_rec).unwrap(), node_type::FIELD_SPECIALIZATION);
    assert_eq!(specialization::specialized_record(db, spec_rec), data_rec);

    // The field defers to the instance's owned parameter map.
    assert!(!specialization::owns_map(db, spec_rec).unwrap());
    let map = specialization::parameter_map(db, spec_rec).unwrap();
    assert_eq!(
        map,
        vec![(0, PdomTemplateArg::Type(PdomType::Basic { kind: BasicKind::Int, modifiers: 0 }))]
    );

    // The specialized member is a first-class member of the instance scope.
    assert_eq!(scope::find_in_scope(db, &caches, instance, b"data").unwrap(), vec![spec_rec]);
}

#[test]
fn test_method_specialization_copies_annotation_and_hash() {
    let mut ast = AstArena::new();
    let mut linkage = CppLinkage::new().unwrap();
    let (holder, holder_rec) = add_class_template(&mut ast, &mut linkage, "Holder");

    let param_ref = ast.add_type(AstType::TemplateParameter { param_id: 0 });
    let fn_type = ast.function_type(param_ref, vec![]);
    let method_rec = add_member_def(
        &mut ast,
        &mut linkage,
        AstBinding::named("get")
            .with_function(FunctionFacet {
                parameters: vec![],
                function_type: fn_type,
                required_args: 0,
                exception_spec: None,
                execution: None,
                is_constructor: false,
                modifiers: DeclModifiers::VIRTUAL,
            })
            .with_owner(holder)
            .with_visibility(Visibility::Public),
    );

    let caches = Arc::clone(linkage.caches());
    let refs = BindingRefs::default();
    let int_t = ast.int_type();
    let instance = specialize::instantiate(
        linkage.database_mut(),
        &caches,
        &ast,
        &refs,
        holder_rec,
        &[AstTemplateArg::Type(int_t)],
    )
    .unwrap();

    let mut ctx = SpecializationContext::new();
    let member = specialize::specialize_member(
        linkage.database_mut(),
        &caches,
        instance,
        method_rec,
        &mut ctx,
    )
    .unwrap();
    let SpecializedMember::Binding(spec_rec) = member else {
        panic!("expected a binding, got {member:?}");
    };
    let db = linkage.database();
    assert_eq!(records::node_tag(db, spec_rec).unwrap(), node_type::METHOD_SPECIALIZATION);
    assert!(annotation::function::is_virtual(function_annotation(db, spec_rec)));
    assert_eq!(
        signature::stored_hash(db, spec_rec).unwrap(),
        signature::stored_hash(db, method_rec).unwrap()
    );
}

#[test]
fn test_instantiation_prefers_matching_partial_specialization() {
    let mut ast = AstArena::new();
    let mut linkage = CppLinkage::new().unwrap();
    let (s, s_rec) = add_class_template(&mut ast, &mut linkage, "S");

    let int_t = ast.int_type();
    let ptr = ast.add_type(AstType::Pointer(int_t));
    let partial = ast.add_binding(
        AstBinding::named("S")
            .with_class(ClassFacet::default())
            .with_template(TemplateFacet { parameters: vec![type_param("U", 0)] })
            .with_spec(SpecFacet {
                specialized: s,
                arguments: Some(vec![AstTemplateArg::Type(ptr)]),
                tparam_map: Vec::new(),
                owns_map: true,
                primary: Some(s),
            }),
    );
    let partial_name = ast.definition_name(partial);
    let partial_rec = linkage.add_binding(&ast, partial_name).unwrap();
    assert_eq!(
        records::node_tag(linkage.database(), partial_rec).unwrap(),
        node_type::PARTIAL_SPECIALIZATION
    );

    let caches = Arc::clone(linkage.caches());
    let refs = BindingRefs::default();
    let via_partial = specialize::instantiate(
        linkage.database_mut(),
        &caches,
        &ast,
        &refs,
        s_rec,
        &[AstTemplateArg::Type(ptr)],
    )
    .unwrap();
    assert_eq!(specialization::specialized_record(linkage.database(), via_partial), partial_rec);

    // Arguments outside the partial's pattern fall back to the primary.
    let plain = specialize::instantiate(
        linkage.database_mut(),
        &caches,
        &ast,
        &refs,
        s_rec,
        &[AstTemplateArg::Type(int_t)],
    )
    .unwrap();
    let db = linkage.database();
    assert_eq!(specialization::specialized_record(db, plain), s_rec);
    assert_eq!(
        specialization::PdomClassInstance { record: plain }.arguments(db).unwrap(),
        vec![PdomTemplateArg::Type(PdomType::Basic { kind: BasicKind::Int, modifiers: 0 })]
    );
    // The class key travels from the primary to its instances.
    assert_eq!(class_type::class_key(db, plain), ClassKey::Struct);
}

#[test]
fn test_instance_cache_returns_one_record_per_argument_list() {
    let mut ast = AstArena::new();
    let mut linkage = CppLinkage::new().unwrap();
    let (_, rec) = add_class_template(&mut ast, &mut linkage, "Box");

    let caches = Arc::clone(linkage.caches());
    let refs = BindingRefs::default();
    let int_t = ast.int_type();
    let double_t = ast.basic_type(BasicKind::Double);
    let first = specialize::instantiate(
        linkage.database_mut(),
        &caches,
        &ast,
        &refs,
        rec,
        &[AstTemplateArg::Type(int_t)],
    )
    .unwrap();
    let second = specialize::instantiate(
        linkage.database_mut(),
        &caches,
        &ast,
        &refs,
        rec,
        &[AstTemplateArg::Type(int_t)],
    )
    .unwrap();
    let other = specialize::instantiate(
        linkage.database_mut(),
        &caches,
        &ast,
        &refs,
        rec,
        &[AstTemplateArg::Type(double_t)],
    )
    .unwrap();
    assert_eq!(first, second);
    assert_ne!(first, other);
}

#[test]
fn test_racing_instance_publications_agree_on_one_winner() {
    let mut db = Database::new();
    let owner = db.malloc(32).unwrap();
    let candidates: Vec<RecordRef> = (0..32).map(|_| db.malloc(32).unwrap()).collect();
    let caches = Arc::new(CacheRegistry::new());

    let winners: Vec<RecordRef> = candidates
        .par_iter()
        .map(|rec| {
            let instances = caches.instances(owner);
            *instances.entry("Box<int>".to_string()).or_insert(*rec).value()
        })
        .collect();
    assert!(candidates.contains(&winners[0]));
    assert!(winners.iter().all(|w| *w == winners[0]));
    // The losing records stay allocated for their writers to release; the
    // map itself never hands out more than one record per key.
    assert_eq!(caches.instances(owner).len(), 1);
}

#[test]
fn test_racing_slot_publications_are_first_writer_wins() {
    let mut db = Database::new();
    let template = db.malloc(32).unwrap();
    let candidates: Vec<RecordRef> = (0..32).map(|_| db.malloc(32).unwrap()).collect();
    let caches = Arc::new(CacheRegistry::new());

    let winners: Vec<RecordRef> = candidates
        .par_iter()
        .map(|rec| {
            match caches.publish(
                template,
                CacheSlot::DeferredInstance,
                CacheValue::DeferredInstance(*rec),
            ) {
                CacheValue::DeferredInstance(winner) => winner,
                other => panic!("DeferredInstance slot held {other:?}"),
            }
        })
        .collect();
    assert!(winners.iter().all(|w| *w == winners[0]));
    match caches.get(template, CacheSlot::DeferredInstance) {
        Some(CacheValue::DeferredInstance(stored)) => assert_eq!(stored, winners[0]),
        other => panic!("DeferredInstance slot held {other:?}"),
    }
}
