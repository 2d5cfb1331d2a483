//! End-to-end linkage behavior: owner-chain resolution, update precedence,
//! deferred configuration, and implicit special members.

use pdom_ast::{
    AstArena, AstBinding, AstName, AstParam, AstType, AstValue, ClassFacet, ClassKey,
    DeclModifiers, EnumFacet, EnumeratorFacet, FunctionFacet, ImplicitSet, NameKind, TypeId,
    VariableFacet, Visibility,
};
use pdom_cpp::linkage::CppLinkage;
use pdom_cpp::records::{self, class_type, enumeration, function, namespace, variable};
use pdom_cpp::scope::FindBinding;
use pdom_cpp::{annotation, marshal, node_type, scope};
use pdom_common::RecordRef;
use pdom_db::tree;

/// Opt-in diagnostics for failing runs: `RUST_LOG=pdom_cpp=trace`.
fn fresh_linkage() -> CppLinkage {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    CppLinkage::new().unwrap()
}

fn fn_facet(ast: &mut AstArena, param_types: &[TypeId], modifiers: DeclModifiers) -> FunctionFacet {
    let void_t = ast.void_type();
    let fn_type = ast.function_type(void_t, param_types.to_vec());
    let parameters = param_types
        .iter()
        .enumerate()
        .map(|(i, ty)| AstParam {
            name: format!("a{i}"),
            param_type: *ty,
            default_value: None,
            is_pack: false,
        })
        .collect();
    FunctionFacet {
        parameters,
        function_type: fn_type,
        required_args: param_types.len() as u16,
        exception_spec: None,
        execution: None,
        is_constructor: false,
        modifiers,
    }
}

fn var_facet(ty: TypeId) -> VariableFacet {
    VariableFacet { var_type: ty, value: None, modifiers: DeclModifiers::empty() }
}

#[test]
fn test_global_class_is_reachable_after_add() {
    let mut ast = AstArena::new();
    let mut linkage = fresh_linkage();
    let c = ast.add_binding(
        AstBinding::named("C").with_class(ClassFacet { key: ClassKey::Struct, ..Default::default() }),
    );
    let name = ast.definition_name(c);
    let rec = linkage.add_binding(&ast, name).unwrap();

    assert_eq!(records::node_tag(linkage.database(), rec).unwrap(), node_type::CLASS_TYPE);
    assert!(records::parent_of(linkage.database(), rec).unwrap().is_null());
    assert!(records::has_definition(linkage.database(), rec).unwrap());
    assert_eq!(linkage.find_global(b"C").unwrap(), vec![rec]);
    assert_eq!(
        class_type::PdomClassType { record: rec }.key(linkage.database()),
        ClassKey::Struct
    );
}

#[test]
fn test_owner_chain_is_created_recursively() {
    let mut ast = AstArena::new();
    let mut linkage = fresh_linkage();
    let outer = ast.add_binding(AstBinding::named("outer").as_namespace());
    let inner = ast.add_binding(AstBinding::named("inner").as_namespace().with_owner(outer));
    let int_t = ast.int_type();
    let x = ast.add_binding(
        AstBinding::named("x").with_variable(var_facet(int_t)).with_owner(inner),
    );
    let name = ast.definition_name(x);

    // One call materializes the whole chain.
    let x_rec = linkage.add_binding(&ast, name).unwrap();

    let outer_rec = linkage.find_global(b"outer").unwrap()[0];
    let outer_ns = namespace::PdomNamespace { record: outer_rec };
    let mut finder = FindBinding::new(b"inner");
    tree::accept(linkage.database(), outer_ns.index_root(linkage.database()).unwrap(), &mut finder)
        .unwrap();
    let inner_rec = finder.matches[0];

    let inner_ns = namespace::PdomNamespace { record: inner_rec };
    let mut finder = FindBinding::new(b"x");
    tree::accept(linkage.database(), inner_ns.index_root(linkage.database()).unwrap(), &mut finder)
        .unwrap();
    assert_eq!(finder.matches, vec![x_rec]);
    assert_eq!(records::parent_of(linkage.database(), x_rec).unwrap(), inner_rec);
}

#[test]
fn test_overloads_coexist_under_one_name() {
    let mut ast = AstArena::new();
    let mut linkage = fresh_linkage();
    let int_t = ast.int_type();
    let double_t = ast.basic_type(pdom_ast::BasicKind::Double);
    let facet_int = fn_facet(&mut ast, &[int_t], DeclModifiers::empty());
    let facet_double = fn_facet(&mut ast, &[double_t], DeclModifiers::empty());
    let f1 = ast.add_binding(AstBinding::named("f").with_function(facet_int));
    let f2 = ast.add_binding(AstBinding::named("f").with_function(facet_double));
    let n1 = ast.definition_name(f1);
    let n2 = ast.definition_name(f2);

    let r1 = linkage.add_binding(&ast, n1).unwrap();
    let r2 = linkage.add_binding(&ast, n2).unwrap();
    assert_ne!(r1, r2);

    let found = linkage.find_global(b"f").unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.contains(&r1) && found.contains(&r2));

    // Re-adding the same overload resolves to the same record.
    let again = ast.reference_name(f1);
    assert_eq!(linkage.add_binding(&ast, again).unwrap(), r1);
}

#[test]
fn test_references_never_update() {
    let mut ast = AstArena::new();
    let mut linkage = fresh_linkage();
    let c = ast.add_binding(
        AstBinding::named("C").with_class(ClassFacet { key: ClassKey::Struct, ..Default::default() }),
    );
    let def = ast.definition_name(c);
    let rec = linkage.add_binding(&ast, def).unwrap();

    ast.binding_mut(c).class.as_mut().unwrap().key = ClassKey::Union;
    let reference = ast.reference_name(c);
    assert_eq!(linkage.add_binding(&ast, reference).unwrap(), rec);
    assert_eq!(class_type::PdomClassType { record: rec }.key(linkage.database()), ClassKey::Struct);

    // A definition occurrence does take the new facet.
    let redef = ast.definition_name(c);
    linkage.add_binding(&ast, redef).unwrap();
    assert_eq!(class_type::PdomClassType { record: rec }.key(linkage.database()), ClassKey::Union);
}

#[test]
fn test_class_members_update_only_through_composite_type_specifier() {
    let mut ast = AstArena::new();
    let mut linkage = fresh_linkage();
    let c = ast.add_binding(AstBinding::named("C").with_class(ClassFacet::default()));
    let int_t = ast.int_type();
    let field = ast.add_binding(
        AstBinding::named("m")
            .with_variable(var_facet(int_t))
            .with_owner(c)
            .with_visibility(Visibility::Private),
    );
    let first = ast.add_name(AstName {
        binding: field,
        kind: NameKind::Definition,
        composite_type_spec: true,
    });
    let rec = linkage.add_binding(&ast, first).unwrap();
    assert_eq!(records::node_tag(linkage.database(), rec).unwrap(), node_type::FIELD);

    // Even a definition kind does not update a member outside a
    // composite-type specifier.
    ast.binding_mut(field).variable.as_mut().unwrap().modifiers = DeclModifiers::MUTABLE;
    let outside = ast.definition_name(field);
    linkage.add_binding(&ast, outside).unwrap();
    assert!(!annotation::is_mutable(variable::variable_annotation(linkage.database(), rec)));

    let inside = ast.add_name(AstName {
        binding: field,
        kind: NameKind::Definition,
        composite_type_spec: true,
    });
    linkage.add_binding(&ast, inside).unwrap();
    assert!(annotation::is_mutable(variable::variable_annotation(linkage.database(), rec)));
}

#[test]
fn test_opaque_enum_declarations_update() {
    let mut ast = AstArena::new();
    let mut linkage = fresh_linkage();
    let e = ast.add_binding(AstBinding::named("E").with_enumeration(EnumFacet {
        scoped: false,
        opaque: true,
        underlying: None,
    }));
    let first = ast.declaration_name(e);
    let rec = linkage.add_binding(&ast, first).unwrap();
    assert!(!enumeration::PdomEnumeration { record: rec }.is_scoped(linkage.database()));

    ast.binding_mut(e).enumeration.as_mut().unwrap().scoped = true;
    let second = ast.declaration_name(e);
    linkage.add_binding(&ast, second).unwrap();
    assert!(enumeration::PdomEnumeration { record: rec }.is_scoped(linkage.database()));
}

#[test]
fn test_declarations_stop_updating_once_defined() {
    let mut ast = AstArena::new();
    let mut linkage = fresh_linkage();
    let facet = fn_facet(&mut ast, &[], DeclModifiers::empty());
    let f = ast.add_binding(AstBinding::named("g").with_function(facet));
    let decl = ast.declaration_name(f);
    let rec = linkage.add_binding(&ast, decl).unwrap();

    // No lasting definition yet: a later declaration refreshes the record.
    ast.binding_mut(f).function.as_mut().unwrap().modifiers = DeclModifiers::INLINE;
    let def = ast.definition_name(f);
    linkage.add_binding(&ast, def).unwrap();
    assert!(annotation::function::is_inline(function::function_annotation(linkage.database(), rec)));

    // Defined now: declarations no longer overwrite.
    ast.binding_mut(f).function.as_mut().unwrap().modifiers = DeclModifiers::CONSTEXPR;
    let late_decl = ast.declaration_name(f);
    linkage.add_binding(&ast, late_decl).unwrap();
    let bits = function::function_annotation(linkage.database(), rec);
    assert!(annotation::function::is_inline(bits));
    assert!(!annotation::function::is_constexpr(bits));
}

#[test]
fn test_method_return_type_can_reference_its_own_class() {
    let mut ast = AstArena::new();
    let mut linkage = fresh_linkage();
    let c = ast.add_binding(AstBinding::named("Builder").with_class(ClassFacet::default()));
    let self_t = ast.add_type(AstType::Binding(c));
    let self_ref = ast.add_type(AstType::Reference { rvalue: false, inner: self_t });
    let fn_type = ast.function_type(self_ref, vec![]);
    let m = ast.add_binding(
        AstBinding::named("finish")
            .with_function(FunctionFacet {
                parameters: vec![],
                function_type: fn_type,
                required_args: 0,
                exception_spec: None,
                execution: None,
                is_constructor: false,
                modifiers: DeclModifiers::empty(),
            })
            .with_owner(c)
            .with_visibility(Visibility::Public),
    );
    let name = ast.definition_name(m);
    let m_rec = linkage.add_binding(&ast, name).unwrap();
    let c_rec = linkage.find_global(b"Builder").unwrap()[0];

    // The deferred configuration resolved the self-reference to the class
    // record that was registered moments earlier in the same call.
    let loaded = function::function_type(linkage.database(), m_rec).unwrap();
    match loaded {
        marshal::PdomType::Function { return_type, .. } => match *return_type {
            marshal::PdomType::Reference { rvalue: false, inner } => {
                assert_eq!(*inner, marshal::PdomType::Binding(c_rec));
            }
            other => panic!("unexpected return type {other:?}"),
        },
        other => panic!("unexpected function type {other:?}"),
    }
}

#[test]
fn test_implicit_members_are_synthesized_and_diffed() {
    let mut ast = AstArena::new();
    let mut linkage = fresh_linkage();
    let c = ast.add_binding(AstBinding::named("C").with_class(ClassFacet {
        implicit: ImplicitSet::DEFAULT_CTOR | ImplicitSet::DESTRUCTOR,
        ..Default::default()
    }));
    let def = ast.definition_name(c);
    let rec = linkage.add_binding(&ast, def).unwrap();

    let ctors = scope::constructors(linkage.database(), rec).unwrap();
    assert_eq!(ctors.len(), 1);
    assert!(
        annotation::function::is_implicit(function::function_annotation(
            linkage.database(),
            ctors[0]
        )),
        "synthesized constructor must carry the implicit bit"
    );
    let dtors = scope::find_in_scope(linkage.database(), linkage.caches(), rec, b"~C").unwrap();
    assert_eq!(dtors.len(), 1);

    // Redefinition without an implied destructor removes the synthesized
    // one and keeps the constructor.
    ast.binding_mut(c).class.as_mut().unwrap().implicit = ImplicitSet::DEFAULT_CTOR;
    let redef = ast.definition_name(c);
    linkage.add_binding(&ast, redef).unwrap();
    assert!(
        scope::find_in_scope(linkage.database(), linkage.caches(), rec, b"~C")
            .unwrap()
            .is_empty()
    );
    assert_eq!(scope::constructors(linkage.database(), rec).unwrap().len(), 1);
}

#[test]
fn test_adapt_finds_without_creating() {
    let mut ast = AstArena::new();
    let mut linkage = fresh_linkage();
    let c = ast.add_binding(AstBinding::named("C").with_class(ClassFacet::default()));
    let def = ast.definition_name(c);
    let rec = linkage.add_binding(&ast, def).unwrap();
    assert_eq!(linkage.adapt_binding(&ast, c).unwrap(), Some(rec));

    let ghost = ast.add_binding(AstBinding::named("ghost").with_class(ClassFacet::default()));
    assert_eq!(linkage.adapt_binding(&ast, ghost).unwrap(), None);
    assert!(linkage.find_global(b"ghost").unwrap().is_empty());
}

#[test]
fn test_remove_unlinks_and_forgets() {
    let mut ast = AstArena::new();
    let mut linkage = fresh_linkage();
    let c = ast.add_binding(AstBinding::named("Doomed").with_class(ClassFacet::default()));
    let int_t = ast.int_type();
    let field = ast.add_binding(
        AstBinding::named("m").with_variable(var_facet(int_t)).with_owner(c),
    );
    let field_name = ast.add_name(AstName {
        binding: field,
        kind: NameKind::Definition,
        composite_type_spec: true,
    });
    let field_rec = linkage.add_binding(&ast, field_name).unwrap();
    let class_rec = linkage.find_global(b"Doomed").unwrap()[0];

    linkage.remove_binding(field_rec).unwrap();
    assert!(
        scope::find_in_scope(linkage.database(), linkage.caches(), class_rec, b"m")
            .unwrap()
            .is_empty()
    );

    linkage.remove_binding(class_rec).unwrap();
    assert!(linkage.find_global(b"Doomed").unwrap().is_empty());
}

#[test]
fn test_remove_enumerator_unlinks_and_recomputes_bounds() {
    let mut ast = AstArena::new();
    let mut linkage = fresh_linkage();
    let color = ast.add_binding(AstBinding::named("Color").with_enumeration(EnumFacet {
        scoped: true,
        opaque: false,
        underlying: None,
    }));
    let name = ast.definition_name(color);
    let enum_rec = linkage.add_binding(&ast, name).unwrap();

    let mut enumerators = Vec::new();
    for (name, value) in [("Red", 1i64), ("Blue", 5)] {
        let value = ast.add_value(AstValue::Integral(value));
        let enumerator = ast.add_binding(
            AstBinding::named(name)
                .with_enumerator(EnumeratorFacet { value: Some(value) })
                .with_owner(color),
        );
        let name = ast.definition_name(enumerator);
        enumerators.push(linkage.add_binding(&ast, name).unwrap());
    }
    let stored = enumeration::PdomEnumeration { record: enum_rec };
    assert_eq!(stored.value_bounds(linkage.database(), linkage.caches()).unwrap(), (1, 5));

    linkage.remove_binding(enumerators[0]).unwrap();

    // The freed enumerator is off the chain, out of the cached bounds, and
    // no longer found by name in the enumeration scope.
    let db = linkage.database();
    let left: Vec<RecordRef> = stored.enumerators(db).unwrap().iter().map(|e| e.record).collect();
    assert_eq!(left, vec![enumerators[1]]);
    assert_eq!(stored.value_bounds(db, linkage.caches()).unwrap(), (5, 5));
    assert!(scope::find_in_scope(db, linkage.caches(), enum_rec, b"Red").unwrap().is_empty());
}

#[test]
fn test_remove_enumeration_from_namespace_index() {
    let mut ast = AstArena::new();
    let mut linkage = fresh_linkage();
    let ns = ast.add_binding(AstBinding::named("palette").as_namespace());
    let mode = ast.add_binding(
        AstBinding::named("Mode")
            .with_enumeration(EnumFacet { scoped: false, opaque: false, underlying: None })
            .with_owner(ns),
    );
    let on_value = ast.add_value(AstValue::Integral(1));
    let on = ast.add_binding(
        AstBinding::named("On")
            .with_enumerator(EnumeratorFacet { value: Some(on_value) })
            .with_owner(mode),
    );
    let name = ast.definition_name(on);
    linkage.add_binding(&ast, name).unwrap();

    let ns_rec = linkage.find_global(b"palette").unwrap()[0];
    let ns_scope = namespace::PdomNamespace { record: ns_rec };
    let mut finder = FindBinding::new(b"Mode");
    tree::accept(linkage.database(), ns_scope.index_root(linkage.database()).unwrap(), &mut finder)
        .unwrap();
    let mode_rec = finder.matches[0];

    // Removing the enumeration takes its enumerators with it and deletes
    // it from the namespace index.
    linkage.remove_binding(mode_rec).unwrap();
    let mut finder = FindBinding::new(b"Mode");
    tree::accept(linkage.database(), ns_scope.index_root(linkage.database()).unwrap(), &mut finder)
        .unwrap();
    assert!(finder.matches.is_empty());
}

#[test]
fn test_remove_releases_owned_detail_records() {
    let mut ast = AstArena::new();
    let mut linkage = fresh_linkage();
    let int_t = ast.int_type();
    let seven = ast.add_value(AstValue::Integral(7));
    let first = ast.add_binding(AstBinding::named("budget").with_variable(VariableFacet {
        var_type: int_t,
        value: Some(seven),
        modifiers: DeclModifiers::empty(),
    }));
    let name = ast.definition_name(first);
    let rec = linkage.add_binding(&ast, name).unwrap();
    linkage.remove_binding(rec).unwrap();
    let settled = linkage.database().arena_size();

    // Removal returned the record, its name, and its type and value
    // records to the free lists; the same shape fits without growth.
    let second = ast.add_binding(AstBinding::named("budget").with_variable(VariableFacet {
        var_type: int_t,
        value: Some(seven),
        modifiers: DeclModifiers::empty(),
    }));
    let name = ast.definition_name(second);
    linkage.add_binding(&ast, name).unwrap();
    assert_eq!(linkage.database().arena_size(), settled);
}

#[test]
fn test_unclassifiable_binding_is_rejected() {
    let mut ast = AstArena::new();
    let mut linkage = fresh_linkage();
    let bare = ast.add_binding(AstBinding::named("nothing"));
    let name = ast.definition_name(bare);
    assert!(linkage.add_binding(&ast, name).is_err());
    assert!(linkage.find_global(b"nothing").unwrap().is_empty());
}

#[test]
fn test_fresh_linkage_has_an_empty_global_scope() {
    let linkage = fresh_linkage();
    assert_eq!(linkage.global_root().unwrap(), RecordRef::NULL);
    assert!(linkage.find_global(b"anything").unwrap().is_empty());
}
