//! The C++ linkage façade: the sole write entry point of the binding layer.
//!
//! `add_binding` consumes one resolved name occurrence, resolves or creates
//! the owner scope chain (bottoming out at the global index tree), then
//! either updates the existing record under `should_update`'s precedence
//! rules or creates a fresh one through the ordered classifier. Creation
//! and indexing are one step: a successfully created record is always
//! reachable from its parent before the call returns. Deferred field
//! configuration drains immediately after registration so recursive
//! lookups triggered by a record's own types can find it.

use crate::cache::{CacheRegistry, CacheSlot};
use crate::classify::{self, ClassifyCtx};
use crate::defer::{DeferredQueue, DeferredTask};
use crate::marshal::{self, BindingRefs, PdomType};
use crate::node_type;
use crate::records::{
    self, class_type, enumeration, function, member_block, namespace, specialization, template,
    variable,
};
use crate::scope::{self, FindBinding};
use crate::signature::{self, CppBindingComparator};
use pdom_ast::{
    AstArena, AstBinding, AstName, BindingId, ClassFacet, ImplicitSet, NameId, NameKind,
    Visibility,
};
use pdom_common::{PdomError, RecordRef, Result};
use pdom_db::{Database, tree};
use std::sync::Arc;
use tracing::{debug, trace};

/// Linkage header record: owns the root of the global scope index.
mod header_layout {
    use crate::records::node_layout;

    pub const INDEX: u64 = node_layout::RECORD_SIZE;
    pub const RECORD_SIZE: u64 = node_layout::RECORD_SIZE + 8;
}

pub struct CppLinkage {
    db: Database,
    caches: Arc<CacheRegistry>,
    deferred: DeferredQueue,
    /// Records persisted for AST bindings of the current indexing pass.
    refs: BindingRefs,
    header: RecordRef,
}

impl CppLinkage {
    pub fn new() -> Result<CppLinkage> {
        let mut db = Database::new();
        let header = db.malloc(header_layout::RECORD_SIZE as u32)?;
        db.put_short(header, records::node_layout::NODE_TYPE, node_type::LINKAGE_HEADER)?;
        Ok(CppLinkage {
            db,
            caches: Arc::new(CacheRegistry::new()),
            deferred: DeferredQueue::new(),
            refs: BindingRefs::default(),
            header,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn database_mut(&mut self) -> &mut Database {
        &mut self.db
    }

    pub fn caches(&self) -> &Arc<CacheRegistry> {
        &self.caches
    }

    pub fn global_root(&self) -> Result<RecordRef> {
        self.db.get_rec(self.header, header_layout::INDEX)
    }

    fn set_global_root(&mut self, root: RecordRef) -> Result<()> {
        self.db.put_rec(self.header, header_layout::INDEX, root)
    }

    /// Every binding stored under `name` in the global scope.
    pub fn find_global(&self, name: &[u8]) -> Result<Vec<RecordRef>> {
        let mut finder = FindBinding::new(name);
        tree::accept(&self.db, self.global_root()?, &mut finder)?;
        Ok(finder.matches)
    }

    // -----------------------------------------------------------------
    // add / adapt
    // -----------------------------------------------------------------

    /// The sole write entry point: one resolved name occurrence in, one
    /// persisted record out.
    pub fn add_binding(&mut self, ast: &AstArena, name: NameId) -> Result<RecordRef> {
        let occurrence = *ast.name(name);
        let rec = self.add_occurrence(ast, occurrence)?;
        self.drain_deferred(ast)?;
        Ok(rec)
    }

    fn add_occurrence(&mut self, ast: &AstArena, occurrence: AstName) -> Result<RecordRef> {
        let binding = ast.binding(occurrence.binding);
        if let Some(&rec) = self.refs.get(&occurrence.binding) {
            self.maybe_update(ast, rec, binding, &occurrence)?;
            return Ok(rec);
        }
        let parent = self.resolve_owner(ast, binding)?;
        let member_of_class = self.is_class_scope(parent)?;
        let tag = classify::classify(&ClassifyCtx { binding, member_of_class })?;
        let sig_hash = signature::compute_hash(ast, binding);

        if let Some(rec) = self.find_existing(parent, binding.name_bytes(), tag, sig_hash)? {
            self.refs.insert(occurrence.binding, rec);
            self.maybe_update(ast, rec, binding, &occurrence)?;
            return Ok(rec);
        }

        let rec = self.create_record(ast, parent, tag, occurrence.binding, sig_hash)?;
        self.link_into_parent(parent, tag, rec, binding.visibility)?;
        self.refs.insert(occurrence.binding, rec);
        trace!(tag, rec = rec.raw(), name = %binding.name, "created binding record");
        if occurrence.kind == NameKind::Definition {
            records::mark_definition(&mut self.db, rec)?;
            self.enqueue_implicit_members(rec, binding);
        }
        Ok(rec)
    }

    /// Find-without-create: resolves an AST binding to its persisted
    /// record if one exists.
    pub fn adapt_binding(&mut self, ast: &AstArena, binding_id: BindingId) -> Result<Option<RecordRef>> {
        if let Some(&rec) = self.refs.get(&binding_id) {
            return Ok(Some(rec));
        }
        let binding = ast.binding(binding_id);
        let parent = match binding.owner {
            None => RecordRef::NULL,
            Some(owner) => match self.adapt_binding(ast, owner)? {
                Some(rec) => rec,
                None => return Ok(None),
            },
        };
        let member_of_class = self.is_class_scope(parent)?;
        let tag = classify::classify(&ClassifyCtx { binding, member_of_class })?;
        let sig_hash = signature::compute_hash(ast, binding);
        let found = self.find_existing(parent, binding.name_bytes(), tag, sig_hash)?;
        if let Some(rec) = found {
            self.refs.insert(binding_id, rec);
        }
        Ok(found)
    }

    fn resolve_owner(&mut self, ast: &AstArena, binding: &AstBinding) -> Result<RecordRef> {
        match binding.owner {
            None => Ok(RecordRef::NULL),
            Some(owner) => self.add_occurrence(
                ast,
                AstName { binding: owner, kind: NameKind::Reference, composite_type_spec: false },
            ),
        }
    }

    fn is_class_scope(&self, rec: RecordRef) -> Result<bool> {
        if rec.is_null() {
            return Ok(false);
        }
        Ok(records::class_fields(records::node_tag(&self.db, rec)?).is_some())
    }

    fn find_existing(
        &self,
        parent: RecordRef,
        name: &[u8],
        tag: i16,
        sig_hash: i32,
    ) -> Result<Option<RecordRef>> {
        let candidates = if parent.is_null() {
            self.find_global(name)?
        } else {
            let parent_tag = records::node_tag(&self.db, parent)?;
            if records::class_fields(parent_tag).is_some() || parent_tag == node_type::ENUMERATION {
                scope::find_in_scope(&self.db, &self.caches, parent, name)?
            } else if let Some(index) = records::index_field(parent_tag) {
                let mut finder = FindBinding::new(name);
                tree::accept(&self.db, self.db.get_rec(parent, index)?, &mut finder)?;
                finder.matches
            } else {
                Vec::new()
            }
        };
        for candidate in candidates {
            if records::node_tag(&self.db, candidate)? != tag {
                continue;
            }
            if node_type::is_overloadable(tag)
                && signature::stored_hash(&self.db, candidate)?.unwrap_or(0) != sig_hash
            {
                continue;
            }
            return Ok(Some(candidate));
        }
        Ok(None)
    }

    // -----------------------------------------------------------------
    // should_update and the update paths
    // -----------------------------------------------------------------

    fn maybe_update(
        &mut self,
        ast: &AstArena,
        rec: RecordRef,
        binding: &AstBinding,
        occurrence: &AstName,
    ) -> Result<()> {
        if !self.should_update(rec, binding, occurrence)? {
            return Ok(());
        }
        self.update_record(ast, rec, binding, occurrence)?;
        if occurrence.kind == NameKind::Definition {
            records::mark_definition(&mut self.db, rec)?;
            self.enqueue_implicit_members(rec, binding);
        }
        Ok(())
    }

    /// Whether a fresh occurrence overwrites an existing record. The
    /// precedence of these checks is intentional and pinned by a test:
    /// parameter kinds never update, references never update, class
    /// members follow the composite-type-specifier bit, definitions always
    /// update, opaque-enum declarations update, and everything else updates
    /// only while the record has no lasting definition.
    pub fn should_update(
        &self,
        rec: RecordRef,
        binding: &AstBinding,
        occurrence: &AstName,
    ) -> Result<bool> {
        let tag = records::node_tag(&self.db, rec)?;
        if matches!(tag, node_type::PARAMETER | node_type::TEMPLATE_PARAMETER) {
            return Ok(false);
        }
        if occurrence.kind == NameKind::Reference {
            return Ok(false);
        }
        let parent = records::parent_of(&self.db, rec)?;
        if self.is_class_scope(parent)? {
            return Ok(occurrence.composite_type_spec);
        }
        if occurrence.kind == NameKind::Definition {
            return Ok(true);
        }
        if binding.enumeration.as_ref().is_some_and(|e| e.opaque) {
            return Ok(true);
        }
        Ok(!records::has_definition(&self.db, rec)?)
    }

    fn update_record(
        &mut self,
        ast: &AstArena,
        rec: RecordRef,
        binding: &AstBinding,
        occurrence: &AstName,
    ) -> Result<()> {
        let tag = records::node_tag(&self.db, rec)?;
        debug!(tag, rec = rec.raw(), name = %binding.name, "updating binding record");
        if records::function_fields(tag).is_some() {
            if let Some(facet) = &binding.function {
                let file_scope = records::parent_of(&self.db, rec)?.is_null();
                function::update_annotation(&mut self.db, rec, facet, binding.visibility, file_scope)?;
                function::clear_details(&mut self.db, rec)?;
                self.deferred.push(DeferredTask::ConfigureFunction {
                    record: rec,
                    facet: facet.clone(),
                });
            }
            return Ok(());
        }
        if records::class_fields(tag).is_some() {
            if let Some(facet) = &binding.class {
                class_type::update_class_fields(&mut self.db, rec, binding.visibility, facet)?;
                if occurrence.kind == NameKind::Definition {
                    self.replace_bases(ast, rec, binding.name_bytes(), facet)?;
                }
                if let Some(template_facet) = &binding.template {
                    template::replace_template_parameters(
                        &mut self.db,
                        ast,
                        &self.refs,
                        rec,
                        &template_facet.parameters,
                    )?;
                }
            }
            return Ok(());
        }
        match tag {
            node_type::VARIABLE | node_type::FIELD | node_type::VARIABLE_TEMPLATE => {
                if let Some(facet) = &binding.variable {
                    let file_scope = records::parent_of(&self.db, rec)?.is_null();
                    variable::update_fields(
                        &mut self.db,
                        ast,
                        &self.refs,
                        rec,
                        binding.visibility,
                        facet,
                        file_scope,
                    )?;
                }
            }
            node_type::TYPEDEF | node_type::ALIAS_TEMPLATE => {
                if let Some(facet) = &binding.typedef {
                    namespace::PdomTypedef { record: rec }
                        .set_target_type(&mut self.db, ast, &self.refs, facet)?;
                }
            }
            node_type::ENUMERATION => {
                if let Some(facet) = &binding.enumeration {
                    self.db.put_byte(
                        rec,
                        enumeration::layout::FLAGS,
                        crate::annotation::enumeration::encode(facet.scoped, facet.opaque),
                    )?;
                }
            }
            node_type::NAMESPACE_ALIAS => {
                if let Some(target) = binding.alias_target
                    && let Some(target_rec) = self.adapt_binding(ast, target)?
                {
                    namespace::PdomNamespaceAlias { record: rec }
                        .set_target(&mut self.db, target_rec)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn replace_bases(
        &mut self,
        ast: &AstArena,
        rec: RecordRef,
        def_name: &[u8],
        facet: &ClassFacet,
    ) -> Result<()> {
        class_type::remove_bases(&mut self.db, rec, def_name)?;
        let mut stored = Vec::with_capacity(facet.bases.len());
        for base in &facet.bases {
            let type_rec = marshal::store_type(&mut self.db, ast, &self.refs, base.base_type)?;
            stored.push(class_type::StoredBase {
                base_type: type_rec,
                visibility: base.visibility,
                is_virtual: base.is_virtual,
            });
        }
        class_type::add_bases(&mut self.db, rec, def_name, &stored)?;
        self.caches.evict(rec, CacheSlot::Bases);
        Ok(())
    }

    // -----------------------------------------------------------------
    // creation
    // -----------------------------------------------------------------

    fn create_record(
        &mut self,
        ast: &AstArena,
        parent: RecordRef,
        tag: i16,
        binding_id: BindingId,
        sig_hash: i32,
    ) -> Result<RecordRef> {
        let binding = ast.binding(binding_id);
        let file_scope = parent.is_null();
        match tag {
            node_type::CLASS_TYPE => {
                let facet = require(&binding.class, "class facet")?;
                let rec =
                    class_type::PdomClassType::create(&mut self.db, parent, binding, facet)?.record;
                self.replace_bases(ast, rec, binding.name_bytes(), facet)?;
                Ok(rec)
            }
            node_type::FUNCTION | node_type::METHOD | node_type::CONSTRUCTOR => {
                let facet = require(&binding.function, "function facet")?;
                let rec = function::PdomFunction::create(
                    &mut self.db,
                    tag,
                    parent,
                    binding,
                    facet,
                    file_scope,
                    sig_hash,
                )?
                .record;
                self.deferred
                    .push(DeferredTask::ConfigureFunction { record: rec, facet: facet.clone() });
                Ok(rec)
            }
            node_type::VARIABLE | node_type::FIELD => {
                let facet = require(&binding.variable, "variable facet")?;
                Ok(variable::PdomVariable::create(
                    &mut self.db,
                    tag,
                    parent,
                    ast,
                    &self.refs,
                    binding,
                    facet,
                    file_scope,
                )?
                .record)
            }
            node_type::ENUMERATION => {
                let facet = require(&binding.enumeration, "enumeration facet")?;
                Ok(enumeration::PdomEnumeration::create(
                    &mut self.db,
                    parent,
                    ast,
                    &self.refs,
                    binding,
                    facet,
                )?
                .record)
            }
            node_type::ENUMERATOR => {
                let facet = require(&binding.enumerator, "enumerator facet")?;
                Ok(enumeration::PdomEnumerator::create(
                    &mut self.db,
                    &self.caches,
                    parent,
                    ast,
                    binding,
                    facet,
                )?
                .record)
            }
            node_type::NAMESPACE => {
                Ok(namespace::PdomNamespace::create(&mut self.db, parent, binding)?.record)
            }
            node_type::NAMESPACE_ALIAS => {
                let target_id = binding
                    .alias_target
                    .ok_or(PdomError::Unsupported("namespace alias without target"))?;
                let target = self
                    .adapt_binding(ast, target_id)?
                    .ok_or_else(|| PdomError::semantic("alias target not persisted"))?;
                let binding = ast.binding(binding_id);
                Ok(namespace::PdomNamespaceAlias::create(&mut self.db, parent, binding, target)?
                    .record)
            }
            node_type::TYPEDEF => {
                let facet = require(&binding.typedef, "typedef facet")?;
                Ok(namespace::PdomTypedef::create(
                    &mut self.db,
                    parent,
                    ast,
                    &self.refs,
                    binding,
                    facet,
                )?
                .record)
            }
            node_type::CLASS_TEMPLATE => {
                let class_facet = require(&binding.class, "class facet")?;
                let template_facet = require(&binding.template, "template facet")?;
                let rec = template::PdomClassTemplate::create(
                    &mut self.db,
                    parent,
                    ast,
                    &self.refs,
                    binding,
                    class_facet,
                    template_facet,
                )?
                .record;
                self.replace_bases(ast, rec, binding.name_bytes(), class_facet)?;
                Ok(rec)
            }
            node_type::FUNCTION_TEMPLATE => {
                let function_facet = require(&binding.function, "function facet")?;
                let template_facet = require(&binding.template, "template facet")?;
                let rec = template::PdomFunctionTemplate::create(
                    &mut self.db,
                    parent,
                    ast,
                    &self.refs,
                    binding,
                    function_facet,
                    template_facet,
                    file_scope,
                    sig_hash,
                )?
                .record;
                self.deferred.push(DeferredTask::ConfigureFunction {
                    record: rec,
                    facet: function_facet.clone(),
                });
                Ok(rec)
            }
            node_type::VARIABLE_TEMPLATE => {
                let variable_facet = require(&binding.variable, "variable facet")?;
                let template_facet = require(&binding.template, "template facet")?;
                Ok(template::PdomVariableTemplate::create(
                    &mut self.db,
                    parent,
                    ast,
                    &self.refs,
                    binding,
                    variable_facet,
                    template_facet,
                    file_scope,
                )?
                .record)
            }
            node_type::ALIAS_TEMPLATE => {
                let typedef_facet = require(&binding.typedef, "typedef facet")?;
                let template_facet = require(&binding.template, "template facet")?;
                Ok(template::PdomAliasTemplate::create(
                    &mut self.db,
                    parent,
                    ast,
                    &self.refs,
                    binding,
                    typedef_facet,
                    template_facet,
                )?
                .record)
            }
            node_type::CONCEPT => {
                let template_facet = require(&binding.template, "template facet")?;
                let constraint = binding
                    .concept_constraint
                    .as_deref()
                    .ok_or(PdomError::Unsupported("concept without constraint"))?;
                Ok(template::PdomConcept::create(
                    &mut self.db,
                    parent,
                    ast,
                    &self.refs,
                    binding,
                    template_facet,
                    constraint,
                )?
                .record)
            }
            node_type::PARTIAL_SPECIALIZATION => {
                let class_facet = require(&binding.class, "class facet")?;
                let template_facet = require(&binding.template, "template facet")?;
                let spec_facet = require(&binding.spec, "specialization facet")?;
                let arguments = spec_facet
                    .arguments
                    .as_deref()
                    .ok_or(PdomError::Unsupported("partial specialization without arguments"))?;
                let primary_id = spec_facet
                    .primary
                    .ok_or(PdomError::Unsupported("partial specialization without primary"))?;
                let primary = self
                    .adapt_binding(ast, primary_id)?
                    .ok_or_else(|| PdomError::semantic("primary template not persisted"))?;
                let binding = ast.binding(binding_id);
                Ok(template::PdomPartialSpecialization::create(
                    &mut self.db,
                    parent,
                    ast,
                    &self.refs,
                    binding,
                    class_facet,
                    template_facet,
                    arguments,
                    primary,
                    sig_hash,
                )?
                .record)
            }
            _ if node_type::is_specialization(tag) => {
                self.create_specialization(ast, parent, tag, binding_id, sig_hash)
            }
            node_type::TEMPLATE_PARAMETER => {
                let param = require(&binding.template_parameter, "template-parameter facet")?;
                template::create_template_parameter(&mut self.db, ast, &self.refs, parent, param)
            }
            other => Err(PdomError::semantic(format!("no creation path for kind tag {other}"))),
        }
    }

    fn create_specialization(
        &mut self,
        ast: &AstArena,
        parent: RecordRef,
        tag: i16,
        binding_id: BindingId,
        sig_hash: i32,
    ) -> Result<RecordRef> {
        let binding = ast.binding(binding_id);
        let spec_facet = require(&binding.spec, "specialization facet")?.clone();
        let specialized = self
            .adapt_binding(ast, spec_facet.specialized)?
            .ok_or_else(|| PdomError::semantic("specialized binding not persisted"))?;
        let binding = ast.binding(binding_id);
        let file_scope = parent.is_null();
        let arguments = spec_facet.arguments.clone().unwrap_or_default();
        match tag {
            node_type::CLASS_SPECIALIZATION => {
                let class_facet = require(&binding.class, "class facet")?;
                Ok(specialization::PdomClassSpecialization::create(
                    &mut self.db,
                    parent,
                    ast,
                    &self.refs,
                    binding,
                    class_facet,
                    &spec_facet,
                    specialized,
                    sig_hash,
                )?
                .record)
            }
            node_type::CLASS_INSTANCE => {
                let class_facet = require(&binding.class, "class facet")?;
                Ok(specialization::PdomClassInstance::create(
                    &mut self.db,
                    parent,
                    ast,
                    &self.refs,
                    binding,
                    class_facet,
                    &spec_facet,
                    specialized,
                    &arguments,
                    sig_hash,
                )?
                .record)
            }
            node_type::FUNCTION_SPECIALIZATION
            | node_type::METHOD_SPECIALIZATION
            | node_type::CONSTRUCTOR_SPECIALIZATION => {
                let facet = require(&binding.function, "function facet")?;
                let rec = specialization::PdomFunctionSpecialization::create(
                    &mut self.db,
                    tag,
                    parent,
                    ast,
                    &self.refs,
                    binding,
                    facet,
                    &spec_facet,
                    specialized,
                    file_scope,
                    sig_hash,
                )?
                .record;
                self.deferred
                    .push(DeferredTask::ConfigureFunction { record: rec, facet: facet.clone() });
                Ok(rec)
            }
            node_type::FUNCTION_INSTANCE
            | node_type::METHOD_INSTANCE
            | node_type::CONSTRUCTOR_INSTANCE => {
                let facet = require(&binding.function, "function facet")?;
                let rec = specialization::PdomFunctionInstance::create(
                    &mut self.db,
                    tag,
                    parent,
                    ast,
                    &self.refs,
                    binding,
                    facet,
                    &spec_facet,
                    specialized,
                    &arguments,
                    file_scope,
                    sig_hash,
                )?
                .record;
                self.deferred
                    .push(DeferredTask::ConfigureFunction { record: rec, facet: facet.clone() });
                Ok(rec)
            }
            node_type::FIELD_SPECIALIZATION => {
                let facet = require(&binding.variable, "variable facet")?;
                Ok(specialization::PdomFieldSpecialization::create(
                    &mut self.db,
                    parent,
                    ast,
                    &self.refs,
                    binding,
                    facet,
                    &spec_facet,
                    specialized,
                )?
                .record)
            }
            node_type::VARIABLE_INSTANCE => {
                let facet = require(&binding.variable, "variable facet")?;
                Ok(specialization::PdomVariableInstance::create(
                    &mut self.db,
                    parent,
                    ast,
                    &self.refs,
                    binding,
                    facet,
                    &spec_facet,
                    specialized,
                    &arguments,
                    sig_hash,
                )?
                .record)
            }
            other => {
                Err(PdomError::semantic(format!("no creation path for specialization tag {other}")))
            }
        }
    }

    fn link_into_parent(
        &mut self,
        parent: RecordRef,
        tag: i16,
        rec: RecordRef,
        visibility: Visibility,
    ) -> Result<()> {
        // Enumerators chain off their enumeration at creation; parameters
        // and template parameters hang off their owner's own structures.
        if matches!(
            tag,
            node_type::ENUMERATOR | node_type::PARAMETER | node_type::TEMPLATE_PARAMETER
        ) {
            return Ok(());
        }
        if parent.is_null() {
            let root = self.global_root()?;
            let root = tree::insert(&mut self.db, root, rec, &CppBindingComparator)?;
            return self.set_global_root(root);
        }
        let parent_tag = records::node_tag(&self.db, parent)?;
        if records::class_fields(parent_tag).is_some() {
            class_type::add_member(&mut self.db, parent, rec, visibility)?;
            scope::note_member_added(&self.db, &self.caches, parent, rec)?;
            self.caches.evict(parent, CacheSlot::Specializations);
            return Ok(());
        }
        if let Some(index) = records::index_field(parent_tag) {
            let root = self.db.get_rec(parent, index)?;
            let root = tree::insert(&mut self.db, root, rec, &CppBindingComparator)?;
            return self.db.put_rec(parent, index, root);
        }
        Err(PdomError::Unsupported("parent record is not a scope"))
    }

    // -----------------------------------------------------------------
    // deferred configuration
    // -----------------------------------------------------------------

    fn drain_deferred(&mut self, ast: &AstArena) -> Result<()> {
        // A task may enqueue follow-up tasks; keep going until quiescent.
        while let Some(task) = self.deferred.pop() {
            match task {
                DeferredTask::ConfigureFunction { record, facet } => {
                    function::configure(&mut self.db, ast, &self.refs, record, &facet)?;
                }
                DeferredTask::SynthesizeImplicitMembers {
                    class,
                    implied,
                    class_name,
                    visibility,
                } => {
                    self.synthesize_implicit_members(class, implied, &class_name, visibility)?;
                }
            }
        }
        Ok(())
    }

    fn enqueue_implicit_members(&mut self, rec: RecordRef, binding: &AstBinding) {
        if let Some(facet) = &binding.class {
            self.deferred.push(DeferredTask::SynthesizeImplicitMembers {
                class: rec,
                implied: facet.implicit,
                class_name: binding.name_bytes().to_vec(),
                visibility: Visibility::Public,
            });
        }
    }

    /// Diff-synthesizes implicit special members: persisted implicit
    /// methods no longer implied are removed, missing ones are created.
    fn synthesize_implicit_members(
        &mut self,
        class: RecordRef,
        implied: ImplicitSet,
        class_name: &[u8],
        visibility: Visibility,
    ) -> Result<()> {
        let wanted = implicit_member_shapes(class, class_name, implied);

        // Remove persisted implicit members that are no longer implied.
        let mut stale = Vec::new();
        class_type::visit_members(&self.db, class, &mut |member, _| {
            let tag = records::node_tag(&self.db, member)?;
            if node_type::is_function_kind(tag)
                && crate::annotation::function::is_implicit(function::function_annotation(
                    &self.db, member,
                ))
            {
                let name = records::name_bytes(&self.db, member)?.to_vec();
                let hash = signature::stored_hash(&self.db, member)?.unwrap_or(0);
                if !wanted.iter().any(|w| w.name == name && w.sig_hash == hash) {
                    stale.push(member);
                }
            }
            Ok(true)
        })?;
        for member in stale {
            self.remove_binding(member)?;
        }

        for shape in wanted {
            if self
                .find_existing(class, &shape.name, shape.tag, shape.sig_hash)?
                .is_some()
            {
                continue;
            }
            let rec = self.db.malloc(function::layout::RECORD_SIZE as u32)?;
            records::init_binding(&mut self.db, rec, shape.tag, class, &shape.name)?;
            self.db.put_short(
                rec,
                function::layout::ANNOTATION,
                (crate::annotation::function::IMPLICIT | visibility.as_bits() as u16) as i16,
            )?;
            self.db.put_int(rec, function::layout::SIG_HASH, shape.sig_hash)?;
            let type_rec = marshal::store_pdom_type(&mut self.db, &shape.function_type)?;
            self.db.put_rec(rec, function::layout::FUNCTION_TYPE, type_rec)?;
            class_type::add_member(&mut self.db, class, rec, visibility)?;
            scope::note_member_added(&self.db, &self.caches, class, rec)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // removal
    // -----------------------------------------------------------------

    /// Unlinks a record from its parent structure and frees what it owns.
    pub fn remove_binding(&mut self, rec: RecordRef) -> Result<()> {
        let tag = records::node_tag(&self.db, rec)?;
        let parent = records::parent_of(&self.db, rec)?;
        if parent.is_null() {
            let root = self.global_root()?;
            let root = tree::delete(&mut self.db, root, rec, &CppBindingComparator)?;
            self.set_global_root(root)?;
        } else {
            let parent_tag = records::node_tag(&self.db, parent)?;
            if records::class_fields(parent_tag).is_some() {
                class_type::remove_member(&mut self.db, parent, rec)?;
                scope::evict_member_map(&self.caches, parent);
                self.caches.evict(parent, CacheSlot::Specializations);
            } else if parent_tag == node_type::ENUMERATION {
                enumeration::unlink(&mut self.db, parent, rec)?;
                self.caches.evict(parent, CacheSlot::EnumValues);
                self.caches.evict(parent, CacheSlot::Members);
            } else if let Some(index) = records::index_field(parent_tag) {
                let root = self.db.get_rec(parent, index)?;
                let root = tree::delete(&mut self.db, root, rec, &CppBindingComparator)?;
                self.db.put_rec(parent, index, root)?;
            }
        }
        self.free_owned(rec, tag)?;
        self.caches.evict_all(rec);
        Ok(())
    }

    fn free_owned(&mut self, rec: RecordRef, tag: i16) -> Result<()> {
        if let Some(fields) = records::class_fields(tag) {
            class_type::free_all_bases(&mut self.db, rec)?;
            // Members are owned by their class; free them before the
            // blocks that point at them.
            for (member, _) in class_type::members(&self.db, rec)? {
                let member_tag = records::node_tag(&self.db, member)?;
                self.free_owned(member, member_tag)?;
                self.caches.evict_all(member);
            }
            let first = self.db.get_rec(rec, fields.first_member_block)?;
            member_block::free_chain(&mut self.db, first)?;
        }
        if records::function_fields(tag).is_some() {
            function::clear_details(&mut self.db, rec)?;
        }
        if records::template_params_field(tag).is_some() {
            template::free_template_parameters(&mut self.db, rec)?;
        }
        if let Some(field) = records::arguments_field(tag) {
            let block = self.db.get_rec(rec, field)?;
            crate::args::clear_arguments(&mut self.db, block)?;
        }
        if node_type::is_specialization(tag) {
            let map = self.db.get_rec(rec, specialization::spec_layout::TPARAM_MAP)?;
            crate::args::clear_parameter_map(&mut self.db, map)?;
        }
        match tag {
            node_type::VARIABLE | node_type::FIELD | node_type::VARIABLE_TEMPLATE => {
                let ty = self.db.get_rec(rec, variable::layout::TYPE)?;
                marshal::free_type(&mut self.db, ty)?;
                let value = self.db.get_rec(rec, variable::layout::VALUE)?;
                marshal::free_value(&mut self.db, value)?;
            }
            node_type::FIELD_SPECIALIZATION | node_type::VARIABLE_INSTANCE => {
                let ty = self.db.get_rec(rec, specialization::field_spec_layout::TYPE)?;
                marshal::free_type(&mut self.db, ty)?;
                let value = self.db.get_rec(rec, specialization::field_spec_layout::VALUE)?;
                marshal::free_value(&mut self.db, value)?;
            }
            node_type::TYPEDEF | node_type::ALIAS_TEMPLATE => {
                let ty = self.db.get_rec(rec, namespace::typedef_layout::TYPE)?;
                marshal::free_type(&mut self.db, ty)?;
            }
            node_type::CONCEPT => {
                let blob = self.db.get_rec(rec, template::concept_layout::CONSTRAINT)?;
                self.db.free(blob)?;
            }
            node_type::ENUMERATION => {
                let underlying = self.db.get_rec(rec, enumeration::layout::UNDERLYING)?;
                marshal::free_type(&mut self.db, underlying)?;
                let chain = enumeration::PdomEnumeration { record: rec }.enumerators(&self.db)?;
                for enumerator in chain {
                    self.free_owned(enumerator.record, node_type::ENUMERATOR)?;
                    self.caches.evict_all(enumerator.record);
                }
            }
            node_type::ENUMERATOR => {
                let value = self.db.get_rec(rec, enumeration::enumerator_layout::VALUE)?;
                marshal::free_value(&mut self.db, value)?;
            }
            _ => {}
        }
        let name = records::name_rec(&self.db, rec)?;
        self.db.free_string(name)?;
        // A later occurrence of the same binding must resolve through the
        // index again, not through a pointer to a freed record.
        self.refs.retain(|_, kept| *kept != rec);
        self.db.free(rec)
    }
}

fn require<'a, T>(facet: &'a Option<T>, what: &'static str) -> Result<&'a T> {
    facet.as_ref().ok_or(PdomError::Unsupported(what))
}

// ---------------------------------------------------------------------
// Implicit special members
// ---------------------------------------------------------------------

struct ImplicitShape {
    name: Vec<u8>,
    tag: i16,
    sig_hash: i32,
    function_type: PdomType,
}

fn implicit_member_shapes(
    class: RecordRef,
    class_name: &[u8],
    implied: ImplicitSet,
) -> Vec<ImplicitShape> {
    let name = String::from_utf8_lossy(class_name).into_owned();
    let void_ret = PdomType::Basic { kind: pdom_ast::BasicKind::Void, modifiers: 0 };
    let const_ref = PdomType::Reference {
        rvalue: false,
        inner: Box::new(PdomType::CvQualified {
            is_const: true,
            is_volatile: false,
            inner: Box::new(PdomType::Binding(class)),
        }),
    };
    let rvalue_ref =
        PdomType::Reference { rvalue: true, inner: Box::new(PdomType::Binding(class)) };
    let self_ref = PdomType::Reference { rvalue: false, inner: Box::new(PdomType::Binding(class)) };
    let fn_type = |ret: &PdomType, params: Vec<PdomType>| PdomType::Function {
        return_type: Box::new(ret.clone()),
        parameters: params,
        takes_varargs: false,
    };

    let mut out = Vec::new();
    if implied.contains(ImplicitSet::DEFAULT_CTOR) {
        out.push(ImplicitShape {
            name: class_name.to_vec(),
            tag: node_type::CONSTRUCTOR,
            sig_hash: signature::hash("()"),
            function_type: fn_type(&void_ret, vec![]),
        });
    }
    if implied.contains(ImplicitSet::COPY_CTOR) {
        out.push(ImplicitShape {
            name: class_name.to_vec(),
            tag: node_type::CONSTRUCTOR,
            sig_hash: signature::hash(&format!("(const {name}&)")),
            function_type: fn_type(&void_ret, vec![const_ref.clone()]),
        });
    }
    if implied.contains(ImplicitSet::MOVE_CTOR) {
        out.push(ImplicitShape {
            name: class_name.to_vec(),
            tag: node_type::CONSTRUCTOR,
            sig_hash: signature::hash(&format!("({name}&&)")),
            function_type: fn_type(&void_ret, vec![rvalue_ref.clone()]),
        });
    }
    if implied.contains(ImplicitSet::COPY_ASSIGN) {
        out.push(ImplicitShape {
            name: b"operator=".to_vec(),
            tag: node_type::METHOD,
            sig_hash: signature::hash(&format!("(const {name}&)")),
            function_type: fn_type(&self_ref, vec![const_ref]),
        });
    }
    if implied.contains(ImplicitSet::MOVE_ASSIGN) {
        out.push(ImplicitShape {
            name: b"operator=".to_vec(),
            tag: node_type::METHOD,
            sig_hash: signature::hash(&format!("({name}&&)")),
            function_type: fn_type(&self_ref, vec![rvalue_ref]),
        });
    }
    if implied.contains(ImplicitSet::DESTRUCTOR) {
        let mut dtor = Vec::with_capacity(class_name.len() + 1);
        dtor.push(b'~');
        dtor.extend_from_slice(class_name);
        out.push(ImplicitShape {
            name: dtor,
            tag: node_type::METHOD,
            sig_hash: signature::hash("()"),
            function_type: fn_type(&void_ret, vec![]),
        });
    }
    out
}
