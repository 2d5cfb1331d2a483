//! Class/struct/union records, their base lists, and their member blocks.
//!
//! The class field group lives at kind-dependent offsets (plain classes,
//! class templates, and class specializations all carry it); every operation
//! here resolves the offsets through `records::class_fields` so it works on
//! any class-ish record.
//!
//! Bases are a singly linked list of base records, prepended on write and
//! reversed on read so declaration order is preserved. Each base carries the
//! string of the class-definition name that introduced it; a re-index of
//! that definition removes exactly its own bases before adding the fresh
//! ones.

use crate::annotation;
use crate::records::{self, ClassFields, member_block};
use pdom_ast::{AstBinding, ClassFacet, ClassKey, Visibility};
use pdom_common::{PdomError, RecordRef, Result};
use pdom_db::Database;
use tracing::warn;

pub mod layout {
    use crate::records::binding_layout;

    pub const FIRST_BASE: u64 = binding_layout::RECORD_SIZE;
    pub const FIRST_MEMBER_BLOCK: u64 = binding_layout::RECORD_SIZE + 8;
    /// u8, see `annotation::class`.
    pub const ANNOTATION: u64 = binding_layout::RECORD_SIZE + 16;
    /// u8 `ClassKey`.
    pub const KEY: u64 = binding_layout::RECORD_SIZE + 17;
    pub const RECORD_SIZE: u64 = binding_layout::RECORD_SIZE + 18;
}

mod base_layout {
    pub const NEXT: u64 = 0;
    /// Stored type record of the base class.
    pub const BASE_TYPE: u64 = 8;
    /// String record of the class-definition name that introduced the base.
    pub const DEF_NAME: u64 = 16;
    /// u8, see `annotation::base`.
    pub const FLAGS: u64 = 24;
    pub const RECORD_SIZE: u64 = 25;
}

/// A decoded base-class entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseInfo {
    /// Stored type record of the base class.
    pub base_type: RecordRef,
    pub visibility: Visibility,
    pub is_virtual: bool,
    /// Name of the class definition that introduced this base.
    pub def_name: Vec<u8>,
}

fn fields_of(db: &Database, rec: RecordRef) -> Result<ClassFields> {
    let tag = records::node_tag(db, rec)?;
    records::class_fields(tag).ok_or(PdomError::Unsupported("record has no class field group"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdomClassType {
    pub record: RecordRef,
}

impl PdomClassType {
    /// Allocates and initializes a plain class record. Bases and members
    /// are attached afterwards.
    pub fn create(
        db: &mut Database,
        parent: RecordRef,
        binding: &AstBinding,
        facet: &ClassFacet,
    ) -> Result<PdomClassType> {
        let rec = db.malloc(layout::RECORD_SIZE as u32)?;
        records::init_binding(db, rec, crate::node_type::CLASS_TYPE, parent, binding.name_bytes())?;
        write_class_fields(db, rec, binding.visibility, facet)?;
        Ok(PdomClassType { record: rec })
    }

    pub fn key(&self, db: &Database) -> ClassKey {
        class_key(db, self.record)
    }

    pub fn is_final(&self, db: &Database) -> bool {
        annotation::class::is_final(class_annotation(db, self.record))
    }

    pub fn is_anonymous(&self, db: &Database) -> bool {
        annotation::class::is_anonymous(class_annotation(db, self.record))
    }

    pub fn visibility(&self, db: &Database) -> Visibility {
        Visibility::from_bits(class_annotation(db, self.record) & annotation::class::VISIBILITY_MASK)
    }
}

/// Writes the class field group of a fresh class-ish record. Shared by
/// plain classes, class templates, partial specializations, and class
/// specializations.
pub fn write_class_fields(
    db: &mut Database,
    rec: RecordRef,
    visibility: Visibility,
    facet: &ClassFacet,
) -> Result<()> {
    let fields = fields_of(db, rec)?;
    db.put_byte(
        rec,
        fields.annotation,
        annotation::class::encode(visibility, facet.is_final, facet.is_anonymous),
    )?;
    db.put_byte(rec, fields.key, facet.key.as_u8())
}

/// Re-encodes the annotation byte and key from a fresh definition. Full
/// replace, no partial-bit updates.
pub fn update_class_fields(
    db: &mut Database,
    rec: RecordRef,
    visibility: Visibility,
    facet: &ClassFacet,
) -> Result<()> {
    write_class_fields(db, rec, visibility, facet)
}

/// Accessor fallback: a record without the class field group (or a storage
/// fault) reads as a plain `class`.
pub fn class_key(db: &Database, rec: RecordRef) -> ClassKey {
    let read = fields_of(db, rec).and_then(|fields| db.get_byte(rec, fields.key));
    match read {
        Ok(raw) => ClassKey::from_u8(raw),
        Err(fault) => {
            warn!(rec = rec.raw(), %fault, "class key unreadable, defaulting to class");
            ClassKey::Class
        }
    }
}

pub fn class_annotation(db: &Database, rec: RecordRef) -> u8 {
    let read = fields_of(db, rec).and_then(|fields| db.get_byte(rec, fields.annotation));
    match read {
        Ok(bits) => bits,
        Err(fault) => {
            warn!(rec = rec.raw(), %fault, "class annotation unreadable, defaulting to empty");
            0
        }
    }
}

// ---------------------------------------------------------------------
// Bases
// ---------------------------------------------------------------------

/// A base about to be attached: its already-stored type record plus flags.
#[derive(Debug, Clone, Copy)]
pub struct StoredBase {
    pub base_type: RecordRef,
    pub visibility: Visibility,
    pub is_virtual: bool,
}

/// Prepends the bases of one class definition. `def_name` keys later
/// removal when that definition is re-indexed.
pub fn add_bases(
    db: &mut Database,
    class: RecordRef,
    def_name: &[u8],
    bases: &[StoredBase],
) -> Result<()> {
    let fields = fields_of(db, class)?;
    for base in bases {
        let rec = db.malloc(base_layout::RECORD_SIZE as u32)?;
        let name = db.new_string(def_name)?;
        db.put_rec(rec, base_layout::BASE_TYPE, base.base_type)?;
        db.put_rec(rec, base_layout::DEF_NAME, name)?;
        db.put_byte(rec, base_layout::FLAGS, annotation::base::encode(base.visibility, base.is_virtual))?;
        let head = db.get_rec(class, fields.first_base)?;
        db.put_rec(rec, base_layout::NEXT, head)?;
        db.put_rec(class, fields.first_base, rec)?;
    }
    Ok(())
}

/// The base list in declaration order.
pub fn bases(db: &Database, class: RecordRef) -> Result<Vec<BaseInfo>> {
    let fields = fields_of(db, class)?;
    let mut out = Vec::new();
    let mut cursor = db.get_rec(class, fields.first_base)?;
    while let Some(rec) = cursor.non_null() {
        let flags = db.get_byte(rec, base_layout::FLAGS)?;
        out.push(BaseInfo {
            base_type: db.get_rec(rec, base_layout::BASE_TYPE)?,
            visibility: annotation::base::visibility(flags),
            is_virtual: annotation::base::is_virtual(flags),
            def_name: db.string_bytes(db.get_rec(rec, base_layout::DEF_NAME)?)?.to_vec(),
        });
        cursor = db.get_rec(rec, base_layout::NEXT)?;
    }
    out.reverse();
    Ok(out)
}

/// Unlinks and frees every base introduced by `def_name`, leaving bases
/// from other definitions intact.
pub fn remove_bases(db: &mut Database, class: RecordRef, def_name: &[u8]) -> Result<()> {
    let fields = fields_of(db, class)?;
    let mut prev: Option<RecordRef> = None;
    let mut cursor = db.get_rec(class, fields.first_base)?;
    while let Some(rec) = cursor.non_null() {
        let next = db.get_rec(rec, base_layout::NEXT)?;
        if db.string_bytes(db.get_rec(rec, base_layout::DEF_NAME)?)? == def_name {
            match prev {
                Some(prev) => db.put_rec(prev, base_layout::NEXT, next)?,
                None => db.put_rec(class, fields.first_base, next)?,
            }
            free_base(db, rec)?;
        } else {
            prev = Some(rec);
        }
        cursor = next;
    }
    Ok(())
}

/// Frees the whole base list. Used when the class record is deleted.
pub fn free_all_bases(db: &mut Database, class: RecordRef) -> Result<()> {
    let fields = fields_of(db, class)?;
    let mut cursor = db.get_rec(class, fields.first_base)?;
    db.put_rec(class, fields.first_base, RecordRef::NULL)?;
    while let Some(rec) = cursor.non_null() {
        cursor = db.get_rec(rec, base_layout::NEXT)?;
        free_base(db, rec)?;
    }
    Ok(())
}

fn free_base(db: &mut Database, rec: RecordRef) -> Result<()> {
    let base_type = db.get_rec(rec, base_layout::BASE_TYPE)?;
    crate::marshal::free_type(db, base_type)?;
    db.free_string(db.get_rec(rec, base_layout::DEF_NAME)?)?;
    db.free(rec)
}

// ---------------------------------------------------------------------
// Members
// ---------------------------------------------------------------------

/// Appends a member to this class's member blocks.
pub fn add_member(
    db: &mut Database,
    class: RecordRef,
    member: RecordRef,
    visibility: Visibility,
) -> Result<()> {
    let fields = fields_of(db, class)?;
    member_block::add_member(db, class, fields.first_member_block, member, visibility)
}

/// Visits members in declaration order.
pub fn visit_members(
    db: &Database,
    class: RecordRef,
    f: &mut dyn FnMut(RecordRef, Visibility) -> Result<bool>,
) -> Result<bool> {
    let fields = fields_of(db, class)?;
    member_block::visit(db, db.get_rec(class, fields.first_member_block)?, f)
}

/// Members in declaration order, materialized.
pub fn members(db: &Database, class: RecordRef) -> Result<Vec<(RecordRef, Visibility)>> {
    let mut out = Vec::new();
    visit_members(db, class, &mut |member, visibility| {
        out.push((member, visibility));
        Ok(true)
    })?;
    Ok(out)
}

/// The recorded accessibility of `member`, or `Unspecified` when it is not
/// in this class's blocks.
pub fn member_accessibility(db: &Database, class: RecordRef, member: RecordRef) -> Visibility {
    let fields = match fields_of(db, class) {
        Ok(fields) => fields,
        Err(fault) => {
            warn!(rec = class.raw(), %fault, "accessibility on non-class record");
            return Visibility::Unspecified;
        }
    };
    let found = db
        .get_rec(class, fields.first_member_block)
        .and_then(|first| member_block::accessibility(db, first, member));
    match found {
        Ok(Some(visibility)) => visibility,
        Ok(None) => Visibility::Unspecified,
        Err(fault) => {
            warn!(rec = class.raw(), %fault, "accessibility unreadable, defaulting");
            Visibility::Unspecified
        }
    }
}

/// Removes a member from this class's blocks. The member record itself is
/// owned by the scope index, not the block.
pub fn remove_member(db: &mut Database, class: RecordRef, member: RecordRef) -> Result<bool> {
    let fields = fields_of(db, class)?;
    let first = db.get_rec(class, fields.first_member_block)?;
    member_block::remove_member(db, first, member)
}
