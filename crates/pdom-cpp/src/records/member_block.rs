//! Class member storage: chained fixed-capacity blocks.
//!
//! A member block holds four member record pointers and a packed 2-bit
//! accessibility field per slot; when a block fills up, a fresh block is
//! chained behind it. Removal clears a slot to null; later additions append
//! after the last used slot so declaration order survives removals and
//! chain boundaries alike.

use pdom_ast::Visibility;
use pdom_common::{RecordRef, Result};
use pdom_common::limits::MEMBER_BLOCK_CAPACITY;
use pdom_db::Database;

pub mod layout {
    pub const NEXT: u64 = 0;
    /// u16: 2 accessibility bits per slot.
    pub const ACCESS: u64 = 8;
    pub const MEMBERS: u64 = 10;
    pub const RECORD_SIZE: u64 = 42;
}

fn slot_field(slot: usize) -> u64 {
    layout::MEMBERS + slot as u64 * 8
}

fn slot_access(access: u16, slot: usize) -> Visibility {
    Visibility::from_bits(((access >> (slot * 2)) & 0x3) as u8)
}

fn with_slot_access(access: u16, slot: usize, visibility: Visibility) -> u16 {
    let shift = slot * 2;
    (access & !(0x3 << shift)) | ((visibility.as_bits() as u16) << shift)
}

/// Appends a member to the chain rooted at `owner + first_block_field`,
/// allocating and linking blocks as needed.
pub fn add_member(
    db: &mut Database,
    owner: RecordRef,
    first_block_field: u64,
    member: RecordRef,
    visibility: Visibility,
) -> Result<()> {
    let mut block = db.get_rec(owner, first_block_field)?;
    if block.is_null() {
        block = db.malloc(layout::RECORD_SIZE as u32)?;
        db.put_rec(owner, first_block_field, block)?;
    } else {
        loop {
            let next = db.get_rec(block, layout::NEXT)?;
            if next.is_null() {
                break;
            }
            block = next;
        }
    }
    // Append after the last used slot of the final block.
    let mut last_used = None;
    for slot in 0..MEMBER_BLOCK_CAPACITY {
        if !db.get_rec(block, slot_field(slot))?.is_null() {
            last_used = Some(slot);
        }
    }
    let slot = match last_used {
        Some(slot) if slot + 1 < MEMBER_BLOCK_CAPACITY => slot + 1,
        None => 0,
        Some(_) => {
            let fresh = db.malloc(layout::RECORD_SIZE as u32)?;
            db.put_rec(block, layout::NEXT, fresh)?;
            block = fresh;
            0
        }
    };
    db.put_rec(block, slot_field(slot), member)?;
    let access = db.get_short(block, layout::ACCESS)? as u16;
    db.put_short(block, layout::ACCESS, with_slot_access(access, slot, visibility) as i16)?;
    Ok(())
}

/// Visits every member in declaration order. `f` returning `Ok(false)`
/// stops the walk.
pub fn visit(
    db: &Database,
    first_block: RecordRef,
    f: &mut dyn FnMut(RecordRef, Visibility) -> Result<bool>,
) -> Result<bool> {
    let mut block = first_block;
    while let Some(current) = block.non_null() {
        let access = db.get_short(current, layout::ACCESS)? as u16;
        for slot in 0..MEMBER_BLOCK_CAPACITY {
            let member = db.get_rec(current, slot_field(slot))?;
            if let Some(member) = member.non_null()
                && !f(member, slot_access(access, slot))?
            {
                return Ok(false);
            }
        }
        block = db.get_rec(current, layout::NEXT)?;
    }
    Ok(true)
}

/// The accessibility recorded for `member`, or `None` when the member is
/// not in this chain (callers fall back to "unspecified" or to the
/// unspecialized class).
pub fn accessibility(
    db: &Database,
    first_block: RecordRef,
    member: RecordRef,
) -> Result<Option<Visibility>> {
    let mut found = None;
    visit(db, first_block, &mut |candidate, visibility| {
        if candidate == member {
            found = Some(visibility);
            Ok(false)
        } else {
            Ok(true)
        }
    })?;
    Ok(found)
}

/// Clears the slot holding `member`. Returns whether it was present.
pub fn remove_member(
    db: &mut Database,
    first_block: RecordRef,
    member: RecordRef,
) -> Result<bool> {
    let mut block = first_block;
    while let Some(current) = block.non_null() {
        for slot in 0..MEMBER_BLOCK_CAPACITY {
            if db.get_rec(current, slot_field(slot))? == member {
                db.put_rec(current, slot_field(slot), RecordRef::NULL)?;
                let access = db.get_short(current, layout::ACCESS)? as u16;
                db.put_short(
                    current,
                    layout::ACCESS,
                    with_slot_access(access, slot, Visibility::Unspecified) as i16,
                )?;
                return Ok(true);
            }
        }
        block = db.get_rec(current, layout::NEXT)?;
    }
    Ok(false)
}

/// Frees the whole chain (block records only; members are owned elsewhere).
pub fn free_chain(db: &mut Database, first_block: RecordRef) -> Result<()> {
    let mut block = first_block;
    while let Some(current) = block.non_null() {
        block = db.get_rec(current, layout::NEXT)?;
        db.free(current)?;
    }
    Ok(())
}
