//! Namespace, namespace-alias, and typedef records.
//!
//! A namespace is a scope: it owns a child index tree whose root lives in
//! its record (the linkage's own global index plays that role for the
//! file-scope namespace). Aliases and typedefs are single-pointer records.

use crate::marshal::{self, BindingRefs, PdomType};
use crate::records;
use pdom_ast::{AstArena, AstBinding, TypedefFacet};
use pdom_common::{RecordRef, Result};
use pdom_db::Database;

pub mod layout {
    use crate::records::binding_layout;

    /// Root of the child index tree.
    pub const INDEX: u64 = binding_layout::RECORD_SIZE;
    pub const RECORD_SIZE: u64 = binding_layout::RECORD_SIZE + 8;
}

pub mod alias_layout {
    use crate::records::binding_layout;

    /// Record of the aliased namespace.
    pub const TARGET: u64 = binding_layout::RECORD_SIZE;
    pub const RECORD_SIZE: u64 = binding_layout::RECORD_SIZE + 8;
}

pub mod typedef_layout {
    use crate::records::binding_layout;

    pub const TYPE: u64 = binding_layout::RECORD_SIZE;
    pub const RECORD_SIZE: u64 = binding_layout::RECORD_SIZE + 8;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomNamespace {
    pub record: RecordRef,
}

impl PdomNamespace {
    pub fn create(db: &mut Database, parent: RecordRef, binding: &AstBinding) -> Result<PdomNamespace> {
        let rec = db.malloc(layout::RECORD_SIZE as u32)?;
        records::init_binding(db, rec, crate::node_type::NAMESPACE, parent, binding.name_bytes())?;
        Ok(PdomNamespace { record: rec })
    }

    pub fn index_root(&self, db: &Database) -> Result<RecordRef> {
        db.get_rec(self.record, layout::INDEX)
    }

    pub fn set_index_root(&self, db: &mut Database, root: RecordRef) -> Result<()> {
        db.put_rec(self.record, layout::INDEX, root)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomNamespaceAlias {
    pub record: RecordRef,
}

impl PdomNamespaceAlias {
    pub fn create(
        db: &mut Database,
        parent: RecordRef,
        binding: &AstBinding,
        target: RecordRef,
    ) -> Result<PdomNamespaceAlias> {
        let rec = db.malloc(alias_layout::RECORD_SIZE as u32)?;
        records::init_binding(db, rec, crate::node_type::NAMESPACE_ALIAS, parent, binding.name_bytes())?;
        db.put_rec(rec, alias_layout::TARGET, target)?;
        Ok(PdomNamespaceAlias { record: rec })
    }

    pub fn target(&self, db: &Database) -> Result<RecordRef> {
        db.get_rec(self.record, alias_layout::TARGET)
    }

    pub fn set_target(&self, db: &mut Database, target: RecordRef) -> Result<()> {
        db.put_rec(self.record, alias_layout::TARGET, target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomTypedef {
    pub record: RecordRef,
}

impl PdomTypedef {
    pub fn create(
        db: &mut Database,
        parent: RecordRef,
        ast: &AstArena,
        refs: &BindingRefs,
        binding: &AstBinding,
        facet: &TypedefFacet,
    ) -> Result<PdomTypedef> {
        let rec = db.malloc(typedef_layout::RECORD_SIZE as u32)?;
        records::init_binding(db, rec, crate::node_type::TYPEDEF, parent, binding.name_bytes())?;
        let type_rec = marshal::store_type(db, ast, refs, facet.target_type)?;
        db.put_rec(rec, typedef_layout::TYPE, type_rec)?;
        Ok(PdomTypedef { record: rec })
    }

    pub fn target_type(&self, db: &Database) -> Result<PdomType> {
        marshal::load_type(db, db.get_rec(self.record, typedef_layout::TYPE)?)
    }

    /// Replaces the target type from a fresh declaration.
    pub fn set_target_type(
        &self,
        db: &mut Database,
        ast: &AstArena,
        refs: &BindingRefs,
        facet: &TypedefFacet,
    ) -> Result<()> {
        let old = db.get_rec(self.record, typedef_layout::TYPE)?;
        marshal::free_type(db, old)?;
        let type_rec = marshal::store_type(db, ast, refs, facet.target_type)?;
        db.put_rec(self.record, typedef_layout::TYPE, type_rec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_points_at_namespace() {
        let mut db = Database::new();
        let ns_binding = AstBinding::named("impl_detail").as_namespace();
        let ns = PdomNamespace::create(&mut db, RecordRef::NULL, &ns_binding).unwrap();
        let alias_binding = AstBinding::named("detail");
        let alias =
            PdomNamespaceAlias::create(&mut db, RecordRef::NULL, &alias_binding, ns.record).unwrap();
        assert_eq!(alias.target(&db).unwrap(), ns.record);
        assert_eq!(
            records::node_tag(&db, alias.record).unwrap(),
            crate::node_type::NAMESPACE_ALIAS
        );
    }

    #[test]
    fn test_typedef_round_trip() {
        let mut db = Database::new();
        let mut ast = AstArena::new();
        let int_t = ast.int_type();
        let ptr = ast.add_type(pdom_ast::AstType::Pointer(int_t));
        let facet = TypedefFacet { target_type: ptr };
        let binding = AstBinding::named("int_ptr").with_typedef(facet.clone());
        let refs = BindingRefs::default();
        let td = PdomTypedef::create(&mut db, RecordRef::NULL, &ast, &refs, &binding, &facet).unwrap();
        assert_eq!(
            td.target_type(&db).unwrap(),
            PdomType::Pointer(Box::new(PdomType::Basic {
                kind: pdom_ast::BasicKind::Int,
                modifiers: 0
            }))
        );
    }
}
