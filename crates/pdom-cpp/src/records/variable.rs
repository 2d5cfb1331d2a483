//! Variable and field records.
//!
//! Variables are self-contained: type and initial value are stored at
//! construction (a variable's type never mentions a binding that is still
//! being persisted in the same batch the way a method's can, so nothing is
//! deferred here).

use crate::annotation;
use crate::marshal::{self, BindingRefs, PdomType, PdomValue};
use crate::records;
use pdom_ast::{AstArena, AstBinding, Visibility, VariableFacet};
use pdom_common::{RecordRef, Result};
use pdom_db::Database;
use tracing::warn;

pub mod layout {
    use crate::records::binding_layout;

    pub const TYPE: u64 = binding_layout::RECORD_SIZE;
    pub const VALUE: u64 = binding_layout::RECORD_SIZE + 8;
    /// u8, see the variable annotation byte in `annotation`.
    pub const ANNOTATION: u64 = binding_layout::RECORD_SIZE + 16;
    pub const RECORD_SIZE: u64 = binding_layout::RECORD_SIZE + 17;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomVariable {
    pub record: RecordRef,
}

impl PdomVariable {
    /// Allocates a variable or field record. `tag` is `VARIABLE` or
    /// `FIELD`; `file_scope` selects the extern "C" interpretation of the
    /// low annotation bit.
    pub fn create(
        db: &mut Database,
        tag: i16,
        parent: RecordRef,
        ast: &AstArena,
        refs: &BindingRefs,
        binding: &AstBinding,
        facet: &VariableFacet,
        file_scope: bool,
    ) -> Result<PdomVariable> {
        let rec = db.malloc(layout::RECORD_SIZE as u32)?;
        records::init_binding(db, rec, tag, parent, binding.name_bytes())?;
        write_fields(db, ast, refs, rec, binding.visibility, facet, file_scope)?;
        Ok(PdomVariable { record: rec })
    }

    pub fn var_type(&self, db: &Database) -> Result<PdomType> {
        marshal::load_type(db, db.get_rec(self.record, layout::TYPE)?)
    }

    pub fn value(&self, db: &Database) -> Result<Option<PdomValue>> {
        match db.get_rec(self.record, layout::VALUE)?.non_null() {
            Some(rec) => Ok(Some(marshal::load_value(db, rec)?)),
            None => Ok(None),
        }
    }

    pub fn annotation(&self, db: &Database) -> u8 {
        variable_annotation(db, self.record)
    }

    pub fn visibility(&self, db: &Database) -> Visibility {
        annotation::visibility(self.annotation(db))
    }

    pub fn is_static(&self, db: &Database) -> bool {
        annotation::is_static(self.annotation(db))
    }

    pub fn is_mutable(&self, db: &Database) -> bool {
        annotation::is_mutable(self.annotation(db))
    }
}

/// Stores type, value, and annotation. Shared with field specializations,
/// which carry the same fields at different offsets via their own caller.
pub fn write_fields(
    db: &mut Database,
    ast: &AstArena,
    refs: &BindingRefs,
    rec: RecordRef,
    visibility: Visibility,
    facet: &VariableFacet,
    file_scope: bool,
) -> Result<()> {
    let type_rec = marshal::store_type(db, ast, refs, facet.var_type)?;
    db.put_rec(rec, layout::TYPE, type_rec)?;
    let value_rec = match facet.value {
        Some(value) => marshal::store_value(db, ast.value(value))?,
        None => RecordRef::NULL,
    };
    db.put_rec(rec, layout::VALUE, value_rec)?;
    db.put_byte(
        rec,
        layout::ANNOTATION,
        annotation::encode_variable(facet.modifiers, visibility, file_scope),
    )
}

/// Replaces type, value, and annotation from a fresh declaration, freeing
/// the stored forms it supersedes.
pub fn update_fields(
    db: &mut Database,
    ast: &AstArena,
    refs: &BindingRefs,
    rec: RecordRef,
    visibility: Visibility,
    facet: &VariableFacet,
    file_scope: bool,
) -> Result<()> {
    let old_type = db.get_rec(rec, layout::TYPE)?;
    marshal::free_type(db, old_type)?;
    let old_value = db.get_rec(rec, layout::VALUE)?;
    marshal::free_value(db, old_value)?;
    write_fields(db, ast, refs, rec, visibility, facet, file_scope)
}

pub fn variable_annotation(db: &Database, rec: RecordRef) -> u8 {
    match db.get_byte(rec, layout::ANNOTATION) {
        Ok(bits) => bits,
        Err(fault) => {
            warn!(rec = rec.raw(), %fault, "variable annotation unreadable, defaulting to empty");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_type;
    use pdom_ast::{AstValue, DeclModifiers};

    #[test]
    fn test_variable_round_trip() {
        let mut db = Database::new();
        let mut ast = AstArena::new();
        let int_t = ast.int_type();
        let value = ast.add_value(AstValue::Integral(5));
        let facet = VariableFacet {
            var_type: int_t,
            value: Some(value),
            modifiers: DeclModifiers::STATIC,
        };
        let binding = AstBinding::named("counter").with_variable(facet.clone());
        let refs = BindingRefs::default();
        let v = PdomVariable::create(
            &mut db,
            node_type::VARIABLE,
            RecordRef::NULL,
            &ast,
            &refs,
            &binding,
            &facet,
            true,
        )
        .unwrap();
        assert_eq!(records::name_bytes(&db, v.record).unwrap(), b"counter");
        assert!(v.is_static(&db));
        assert_eq!(
            v.var_type(&db).unwrap(),
            PdomType::Basic { kind: pdom_ast::BasicKind::Int, modifiers: 0 }
        );
        assert_eq!(v.value(&db).unwrap(), Some(PdomValue::Integral(5)));
    }

    #[test]
    fn test_update_replaces_type_and_value() {
        let mut db = Database::new();
        let mut ast = AstArena::new();
        let int_t = ast.int_type();
        let facet = VariableFacet { var_type: int_t, value: None, modifiers: DeclModifiers::empty() };
        let binding = AstBinding::named("x").with_variable(facet.clone());
        let refs = BindingRefs::default();
        let v = PdomVariable::create(
            &mut db,
            node_type::VARIABLE,
            RecordRef::NULL,
            &ast,
            &refs,
            &binding,
            &facet,
            true,
        )
        .unwrap();
        let double_t = ast.basic_type(pdom_ast::BasicKind::Double);
        let value = ast.add_value(AstValue::Integral(1));
        let updated = VariableFacet {
            var_type: double_t,
            value: Some(value),
            modifiers: DeclModifiers::CONSTEXPR,
        };
        update_fields(&mut db, &ast, &refs, v.record, Visibility::Unspecified, &updated, true)
            .unwrap();
        assert_eq!(
            v.var_type(&db).unwrap(),
            PdomType::Basic { kind: pdom_ast::BasicKind::Double, modifiers: 0 }
        );
        assert!(annotation::is_constexpr(v.annotation(&db)));
        assert_eq!(v.value(&db).unwrap(), Some(PdomValue::Integral(1)));
    }
}
