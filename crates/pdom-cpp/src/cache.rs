//! Process-wide result caches, keyed explicitly.
//!
//! The original sin this module avoids: caches keyed by ad hoc computed
//! offsets with implicit invalidation obligations. Here every cached value
//! lives under an explicit `(RecordRef, CacheSlot)` key in one registry per
//! database, and every structural mutation site calls `evict` (or updates
//! in place) against the slot it invalidates.
//!
//! The registry is shared by concurrent readers. Population is lazy and
//! idempotent: losing an insertion race means reusing the winner's value,
//! so redundant computation is acceptable but divergent results are not.

use crate::records::class_type::BaseInfo;
use dashmap::DashMap;
use pdom_common::RecordRef;
use rustc_hash::FxHashMap;
use serde::Serialize;
use smallvec::SmallVec;
use std::sync::Arc;

/// Name -> bindings, the primary member-lookup structure of a scope. Most
/// names bind exactly one record; overload sets are the exception.
pub type BindingMap = FxHashMap<Vec<u8>, SmallVec<[RecordRef; 2]>>;

/// Original member record -> specialized member record.
pub type SpecMap = DashMap<RecordRef, RecordRef>;

/// Canonical argument string -> instance record.
pub type InstanceMap = DashMap<String, RecordRef>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheSlot {
    /// Lazily built name->bindings map of a class/enum/namespace scope.
    Members,
    /// Specialization map of a class specialization (original -> member).
    Specializations,
    /// Instance cache of a template.
    Instances,
    /// Decoded base-class array of a class.
    Bases,
    /// Cached min/max of an enumeration.
    EnumValues,
    /// At most one deferred instance per template (dependent arguments).
    DeferredInstance,
}

#[derive(Debug, Clone)]
pub enum CacheValue {
    Members(Arc<BindingMap>),
    Specializations(Arc<SpecMap>),
    Instances(Arc<InstanceMap>),
    Bases(Arc<Vec<BaseInfo>>),
    EnumValues { min: i64, max: i64 },
    DeferredInstance(RecordRef),
}

#[derive(Debug, Default, Serialize)]
pub struct CacheStats {
    pub members: usize,
    pub specializations: usize,
    pub instances: usize,
    pub bases: usize,
    pub enum_values: usize,
    pub deferred_instances: usize,
}

#[derive(Debug, Default)]
pub struct CacheRegistry {
    map: DashMap<(RecordRef, CacheSlot), CacheValue>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        CacheRegistry { map: DashMap::new() }
    }

    pub fn get(&self, rec: RecordRef, slot: CacheSlot) -> Option<CacheValue> {
        self.map.get(&(rec, slot)).map(|entry| entry.value().clone())
    }

    /// Idempotent publish: if another thread populated the slot first, the
    /// existing value wins and the provided one is discarded.
    pub fn publish(&self, rec: RecordRef, slot: CacheSlot, value: CacheValue) -> CacheValue {
        self.map.entry((rec, slot)).or_insert(value).value().clone()
    }

    /// Unconditional replace, for update-in-place invalidation sites.
    pub fn replace(&self, rec: RecordRef, slot: CacheSlot, value: CacheValue) {
        self.map.insert((rec, slot), value);
    }

    pub fn evict(&self, rec: RecordRef, slot: CacheSlot) {
        self.map.remove(&(rec, slot));
    }

    /// Drops every cached value for a record. Used when the record itself
    /// is deleted.
    pub fn evict_all(&self, rec: RecordRef) {
        self.map.retain(|(key_rec, _), _| *key_rec != rec);
    }

    /// The specialization map of `rec`, creating an empty one on first use.
    pub fn specializations(&self, rec: RecordRef) -> Arc<SpecMap> {
        match self.publish(
            rec,
            CacheSlot::Specializations,
            CacheValue::Specializations(Arc::new(SpecMap::default())),
        ) {
            CacheValue::Specializations(map) => map,
            other => unreachable!("Specializations slot held {other:?}"),
        }
    }

    /// The instance cache of `rec`, creating an empty one on first use.
    pub fn instances(&self, rec: RecordRef) -> Arc<InstanceMap> {
        match self.publish(
            rec,
            CacheSlot::Instances,
            CacheValue::Instances(Arc::new(InstanceMap::default())),
        ) {
            CacheValue::Instances(map) => map,
            other => unreachable!("Instances slot held {other:?}"),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for entry in self.map.iter() {
            match entry.key().1 {
                CacheSlot::Members => stats.members += 1,
                CacheSlot::Specializations => stats.specializations += 1,
                CacheSlot::Instances => stats.instances += 1,
                CacheSlot::Bases => stats.bases += 1,
                CacheSlot::EnumValues => stats.enum_values += 1,
                CacheSlot::DeferredInstance => stats.deferred_instances += 1,
            }
        }
        stats
    }
}
