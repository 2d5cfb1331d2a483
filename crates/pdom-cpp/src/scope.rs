//! Scope lookup: member maps, tree search, own-name resolution.
//!
//! Name lookup is the primary read path, so the name -> bindings map of a
//! class or enumeration scope is built once per (database, record) pair by
//! a full member visitation and kept in the cache registry. Structural
//! mutations either patch the live map copy-on-write or evict it; a stale
//! map is a correctness bug, not a missed optimization.
//!
//! Members of nested anonymous classes and unions are flattened into the
//! enclosing scope's map, matching C++ name lookup for anonymous members.

use crate::annotation;
use crate::cache::{BindingMap, CacheRegistry, CacheSlot, CacheValue};
use crate::node_type;
use crate::records::{self, class_type, enumeration};
use pdom_common::{PdomError, RecordRef, Result};
use pdom_db::{Database, IndexVisitor};
use std::cmp::Ordering;
use std::sync::Arc;

/// The name -> bindings map of a class-ish or enumeration scope, built
/// lazily and cached under `CacheSlot::Members`.
pub fn binding_map(
    db: &Database,
    caches: &CacheRegistry,
    scope: RecordRef,
) -> Result<Arc<BindingMap>> {
    if let Some(CacheValue::Members(map)) = caches.get(scope, CacheSlot::Members) {
        return Ok(map);
    }
    let mut map = BindingMap::default();
    collect_scope(db, scope, &mut map)?;
    match caches.publish(scope, CacheSlot::Members, CacheValue::Members(Arc::new(map))) {
        CacheValue::Members(map) => Ok(map),
        other => unreachable!("Members slot held {other:?}"),
    }
}

fn collect_scope(db: &Database, scope: RecordRef, map: &mut BindingMap) -> Result<()> {
    let tag = records::node_tag(db, scope)?;
    if records::class_fields(tag).is_some() {
        class_type::visit_members(db, scope, &mut |member, _| {
            collect_member(db, member, map)?;
            Ok(true)
        })?;
        return Ok(());
    }
    if tag == node_type::ENUMERATION {
        let e = enumeration::PdomEnumeration { record: scope };
        for enumerator in e.enumerators(db)? {
            let name = records::name_bytes(db, enumerator.record)?.to_vec();
            map.entry(name).or_default().push(enumerator.record);
        }
        return Ok(());
    }
    Err(PdomError::Unsupported("record is not a member-mapped scope"))
}

fn collect_member(db: &Database, member: RecordRef, map: &mut BindingMap) -> Result<()> {
    let tag = records::node_tag(db, member)?;
    // Anonymous nested classes/unions contribute their members to the
    // enclosing scope under the members' own names.
    if records::class_fields(tag).is_some()
        && annotation::class::is_anonymous(class_type::class_annotation(db, member))
    {
        class_type::visit_members(db, member, &mut |inner, _| {
            collect_member(db, inner, map)?;
            Ok(true)
        })?;
        return Ok(());
    }
    let name = records::name_bytes(db, member)?.to_vec();
    if !name.is_empty() {
        map.entry(name).or_default().push(member);
    }
    Ok(())
}

/// Bindings under `name` in a member-mapped scope; empty when absent.
pub fn find_in_scope(
    db: &Database,
    caches: &CacheRegistry,
    scope: RecordRef,
    name: &[u8],
) -> Result<Vec<RecordRef>> {
    Ok(binding_map(db, caches, scope)?.get(name).map(|hits| hits.to_vec()).unwrap_or_default())
}

/// Patches a live cached map after a member was appended; a missing cache
/// entry stays missing (it will be rebuilt on demand).
pub fn note_member_added(
    db: &Database,
    caches: &CacheRegistry,
    scope: RecordRef,
    member: RecordRef,
) -> Result<()> {
    if let Some(CacheValue::Members(map)) = caches.get(scope, CacheSlot::Members) {
        let mut patched = (*map).clone();
        collect_member(db, member, &mut patched)?;
        caches.replace(scope, CacheSlot::Members, CacheValue::Members(Arc::new(patched)));
    }
    Ok(())
}

pub fn evict_member_map(caches: &CacheRegistry, scope: RecordRef) {
    caches.evict(scope, CacheSlot::Members);
}

/// The constructors of a class scope, in declaration order.
pub fn constructors(db: &Database, class: RecordRef) -> Result<Vec<RecordRef>> {
    let mut out = Vec::new();
    class_type::visit_members(db, class, &mut |member, _| {
        let tag = records::node_tag(db, member)?;
        if matches!(
            tag,
            node_type::CONSTRUCTOR
                | node_type::CONSTRUCTOR_SPECIALIZATION
                | node_type::CONSTRUCTOR_INSTANCE
        ) {
            out.push(member);
        }
        Ok(true)
    })?;
    Ok(out)
}

/// Resolution of a class's own name inside its own scope: the class itself,
/// or its constructors when the call site asks for them.
pub fn resolve_own_name(
    db: &Database,
    class: RecordRef,
    name: &[u8],
    want_constructors: bool,
) -> Result<Vec<RecordRef>> {
    if records::name_bytes(db, class)? != name {
        return Ok(Vec::new());
    }
    if want_constructors {
        constructors(db, class)
    } else {
        Ok(vec![class])
    }
}

// ---------------------------------------------------------------------
// Tree search for namespace / global scopes
// ---------------------------------------------------------------------

/// Visitor that collects every binding under one name from an index tree,
/// optionally filtered to a set of kind tags.
pub struct FindBinding<'a> {
    name: &'a [u8],
    kinds: Option<&'a [i16]>,
    pub matches: Vec<RecordRef>,
}

impl<'a> FindBinding<'a> {
    pub fn new(name: &'a [u8]) -> FindBinding<'a> {
        FindBinding { name, kinds: None, matches: Vec::new() }
    }

    pub fn with_kinds(name: &'a [u8], kinds: &'a [i16]) -> FindBinding<'a> {
        FindBinding { name, kinds: Some(kinds), matches: Vec::new() }
    }
}

impl IndexVisitor for FindBinding<'_> {
    fn compare(&self, db: &Database, payload: RecordRef) -> Result<Ordering> {
        Ok(records::name_bytes(db, payload)?.cmp(self.name))
    }

    fn visit(&mut self, db: &Database, payload: RecordRef) -> Result<bool> {
        if let Some(kinds) = self.kinds
            && !kinds.contains(&records::node_tag(db, payload)?)
        {
            return Ok(true);
        }
        self.matches.push(payload);
        Ok(true)
    }
}
