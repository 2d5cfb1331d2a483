//! Enumeration and enumerator records.
//!
//! Enumerators hang off their enumeration in a singly linked list appended
//! at the tail, so iteration order is declaration order. The min/max of the
//! enumerator values is not persisted; it is computed on demand and kept in
//! the cache registry, and evicted whenever an enumerator is added.

use crate::annotation;
use crate::cache::{CacheRegistry, CacheSlot, CacheValue};
use crate::marshal::{self, BindingRefs, PdomType, PdomValue};
use crate::records;
use pdom_ast::{AstArena, AstBinding, EnumFacet, EnumeratorFacet};
use pdom_common::{RecordRef, Result};
use pdom_db::Database;
use tracing::warn;

pub mod layout {
    use crate::records::binding_layout;

    pub const FIRST_ENUMERATOR: u64 = binding_layout::RECORD_SIZE;
    /// u8, see `annotation::enumeration`.
    pub const FLAGS: u64 = binding_layout::RECORD_SIZE + 8;
    /// Stored underlying type record, null when unspecified.
    pub const UNDERLYING: u64 = binding_layout::RECORD_SIZE + 9;
    pub const RECORD_SIZE: u64 = binding_layout::RECORD_SIZE + 17;
}

pub mod enumerator_layout {
    use crate::records::binding_layout;

    pub const VALUE: u64 = binding_layout::RECORD_SIZE;
    pub const NEXT: u64 = binding_layout::RECORD_SIZE + 8;
    pub const RECORD_SIZE: u64 = binding_layout::RECORD_SIZE + 16;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomEnumeration {
    pub record: RecordRef,
}

impl PdomEnumeration {
    pub fn create(
        db: &mut Database,
        parent: RecordRef,
        ast: &AstArena,
        refs: &BindingRefs,
        binding: &AstBinding,
        facet: &EnumFacet,
    ) -> Result<PdomEnumeration> {
        let rec = db.malloc(layout::RECORD_SIZE as u32)?;
        records::init_binding(db, rec, crate::node_type::ENUMERATION, parent, binding.name_bytes())?;
        db.put_byte(rec, layout::FLAGS, annotation::enumeration::encode(facet.scoped, facet.opaque))?;
        let underlying = match facet.underlying {
            Some(ty) => marshal::store_type(db, ast, refs, ty)?,
            None => RecordRef::NULL,
        };
        db.put_rec(rec, layout::UNDERLYING, underlying)?;
        Ok(PdomEnumeration { record: rec })
    }

    pub fn is_scoped(&self, db: &Database) -> bool {
        annotation::enumeration::is_scoped(flags(db, self.record))
    }

    pub fn is_opaque(&self, db: &Database) -> bool {
        annotation::enumeration::is_opaque(flags(db, self.record))
    }

    /// `None` when the declaration left the underlying type unspecified.
    pub fn underlying(&self, db: &Database) -> Result<Option<PdomType>> {
        match db.get_rec(self.record, layout::UNDERLYING)?.non_null() {
            Some(rec) => Ok(Some(marshal::load_type(db, rec)?)),
            None => Ok(None),
        }
    }

    /// Enumerators in declaration order.
    pub fn enumerators(&self, db: &Database) -> Result<Vec<PdomEnumerator>> {
        let mut out = Vec::new();
        let mut cursor = db.get_rec(self.record, layout::FIRST_ENUMERATOR)?;
        while let Some(rec) = cursor.non_null() {
            out.push(PdomEnumerator { record: rec });
            cursor = db.get_rec(rec, enumerator_layout::NEXT)?;
        }
        Ok(out)
    }

    /// Cached (min, max) over the integral enumerator values; (0, 0) for an
    /// empty enumeration.
    pub fn value_bounds(&self, db: &Database, caches: &CacheRegistry) -> Result<(i64, i64)> {
        if let Some(CacheValue::EnumValues { min, max }) =
            caches.get(self.record, CacheSlot::EnumValues)
        {
            return Ok((min, max));
        }
        let mut min = i64::MAX;
        let mut max = i64::MIN;
        for enumerator in self.enumerators(db)? {
            if let Some(PdomValue::Integral(v)) = enumerator.value(db)? {
                min = min.min(v);
                max = max.max(v);
            }
        }
        if min > max {
            min = 0;
            max = 0;
        }
        match caches.publish(self.record, CacheSlot::EnumValues, CacheValue::EnumValues { min, max })
        {
            CacheValue::EnumValues { min, max } => Ok((min, max)),
            other => unreachable!("EnumValues slot held {other:?}"),
        }
    }
}

fn flags(db: &Database, rec: RecordRef) -> u8 {
    match db.get_byte(rec, layout::FLAGS) {
        Ok(bits) => bits,
        Err(fault) => {
            warn!(rec = rec.raw(), %fault, "enumeration flags unreadable, defaulting to empty");
            0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomEnumerator {
    pub record: RecordRef,
}

impl PdomEnumerator {
    /// Allocates an enumerator record and appends it to its enumeration's
    /// list, evicting the cached value bounds.
    pub fn create(
        db: &mut Database,
        caches: &CacheRegistry,
        enumeration: RecordRef,
        ast: &AstArena,
        binding: &AstBinding,
        facet: &EnumeratorFacet,
    ) -> Result<PdomEnumerator> {
        let rec = db.malloc(enumerator_layout::RECORD_SIZE as u32)?;
        records::init_binding(db, rec, crate::node_type::ENUMERATOR, enumeration, binding.name_bytes())?;
        let value = match facet.value {
            Some(value) => marshal::store_value(db, ast.value(value))?,
            None => RecordRef::NULL,
        };
        db.put_rec(rec, enumerator_layout::VALUE, value)?;
        append(db, enumeration, rec)?;
        caches.evict(enumeration, CacheSlot::EnumValues);
        caches.evict(enumeration, CacheSlot::Members);
        Ok(PdomEnumerator { record: rec })
    }

    pub fn value(&self, db: &Database) -> Result<Option<PdomValue>> {
        match db.get_rec(self.record, enumerator_layout::VALUE)?.non_null() {
            Some(rec) => Ok(Some(marshal::load_value(db, rec)?)),
            None => Ok(None),
        }
    }
}

/// Takes `rec` out of its enumeration's list. A record that is not on the
/// list is a no-op, matching `remove_member` on class chains.
pub fn unlink(db: &mut Database, enumeration: RecordRef, rec: RecordRef) -> Result<()> {
    let next = db.get_rec(rec, enumerator_layout::NEXT)?;
    let mut cursor = db.get_rec(enumeration, layout::FIRST_ENUMERATOR)?;
    if cursor == rec {
        return db.put_rec(enumeration, layout::FIRST_ENUMERATOR, next);
    }
    while let Some(prev) = cursor.non_null() {
        cursor = db.get_rec(prev, enumerator_layout::NEXT)?;
        if cursor == rec {
            return db.put_rec(prev, enumerator_layout::NEXT, next);
        }
    }
    Ok(())
}

fn append(db: &mut Database, enumeration: RecordRef, rec: RecordRef) -> Result<()> {
    let mut cursor = db.get_rec(enumeration, layout::FIRST_ENUMERATOR)?;
    let Some(mut tail) = cursor.non_null() else {
        return db.put_rec(enumeration, layout::FIRST_ENUMERATOR, rec);
    };
    loop {
        cursor = db.get_rec(tail, enumerator_layout::NEXT)?;
        match cursor.non_null() {
            Some(next) => tail = next,
            None => break,
        }
    }
    db.put_rec(tail, enumerator_layout::NEXT, rec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdom_ast::AstValue;

    fn enumeration(db: &mut Database, ast: &AstArena) -> PdomEnumeration {
        let facet = EnumFacet { scoped: true, opaque: false, underlying: None };
        let binding = AstBinding::named("Color").with_enumeration(facet.clone());
        let refs = BindingRefs::default();
        PdomEnumeration::create(db, RecordRef::NULL, ast, &refs, &binding, &facet).unwrap()
    }

    fn add(
        db: &mut Database,
        caches: &CacheRegistry,
        ast: &mut AstArena,
        owner: RecordRef,
        name: &str,
        value: i64,
    ) -> PdomEnumerator {
        let value = ast.add_value(AstValue::Integral(value));
        let facet = EnumeratorFacet { value: Some(value) };
        let binding = AstBinding::named(name).with_enumerator(facet.clone());
        PdomEnumerator::create(db, caches, owner, ast, &binding, &facet).unwrap()
    }

    #[test]
    fn test_enumerators_keep_declaration_order() {
        let mut db = Database::new();
        let mut ast = AstArena::new();
        let caches = CacheRegistry::new();
        let e = enumeration(&mut db, &ast);
        add(&mut db, &caches, &mut ast, e.record, "Red", 0);
        add(&mut db, &caches, &mut ast, e.record, "Green", 1);
        add(&mut db, &caches, &mut ast, e.record, "Blue", 2);
        let names: Vec<Vec<u8>> = e
            .enumerators(&db)
            .unwrap()
            .iter()
            .map(|en| records::name_bytes(&db, en.record).unwrap().to_vec())
            .collect();
        assert_eq!(names, vec![b"Red".to_vec(), b"Green".to_vec(), b"Blue".to_vec()]);
        assert!(e.is_scoped(&db));
    }

    #[test]
    fn test_value_bounds_cached_and_evicted() {
        let mut db = Database::new();
        let mut ast = AstArena::new();
        let caches = CacheRegistry::new();
        let e = enumeration(&mut db, &ast);
        add(&mut db, &caches, &mut ast, e.record, "A", -3);
        add(&mut db, &caches, &mut ast, e.record, "B", 9);
        assert_eq!(e.value_bounds(&db, &caches).unwrap(), (-3, 9));
        // Adding an enumerator invalidates the cached bounds.
        add(&mut db, &caches, &mut ast, e.record, "C", 20);
        assert_eq!(e.value_bounds(&db, &caches).unwrap(), (-3, 20));
    }

    #[test]
    fn test_unlink_patches_head_and_middle() {
        let mut db = Database::new();
        let mut ast = AstArena::new();
        let caches = CacheRegistry::new();
        let e = enumeration(&mut db, &ast);
        let red = add(&mut db, &caches, &mut ast, e.record, "Red", 0);
        let green = add(&mut db, &caches, &mut ast, e.record, "Green", 1);
        add(&mut db, &caches, &mut ast, e.record, "Blue", 2);

        unlink(&mut db, e.record, green.record).unwrap();
        let names: Vec<Vec<u8>> = e
            .enumerators(&db)
            .unwrap()
            .iter()
            .map(|en| records::name_bytes(&db, en.record).unwrap().to_vec())
            .collect();
        assert_eq!(names, vec![b"Red".to_vec(), b"Blue".to_vec()]);

        unlink(&mut db, e.record, red.record).unwrap();
        assert_eq!(e.enumerators(&db).unwrap().len(), 1);
        // Unlinking an absent record leaves the list alone.
        unlink(&mut db, e.record, red.record).unwrap();
        assert_eq!(e.enumerators(&db).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_enumeration_bounds() {
        let mut db = Database::new();
        let ast = AstArena::new();
        let caches = CacheRegistry::new();
        let e = enumeration(&mut db, &ast);
        assert_eq!(e.value_bounds(&db, &caches).unwrap(), (0, 0));
    }
}
