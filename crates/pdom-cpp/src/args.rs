//! Stored argument lists and template-parameter maps.
//!
//! An argument list is a `[u16 len][rec]*len` block whose slots point at
//! template-argument records; a parameter map is a `[u16 len]` block of
//! `[i32 param id][rec arg]` slots. Both are allocated and freed as a unit
//! together with the records their slots own.

use crate::marshal::{
    self, BindingRefs, MAP_SLOT, PdomTemplateArg, REC_SLOT,
};
use pdom_ast::{AstArena, AstTemplateArg};
use pdom_common::{RecordRef, Result};
use pdom_db::Database;

/// Persists an argument list, returning the block record.
pub fn put_arguments(
    db: &mut Database,
    ast: &AstArena,
    refs: &BindingRefs,
    args: &[AstTemplateArg],
) -> Result<RecordRef> {
    let block = db.block_new(REC_SLOT, args.len() as u32)?;
    for (i, arg) in args.iter().enumerate() {
        let rec = marshal::store_template_argument(db, ast, refs, arg)?;
        db.block_put_rec(block, REC_SLOT, i as u32, 0, rec)?;
    }
    Ok(block)
}

/// Reads an argument list back. A null block is the documented empty-array
/// fallback, not a fault.
pub fn get_arguments(db: &Database, block: RecordRef) -> Result<Vec<PdomTemplateArg>> {
    let Some(block) = block.non_null() else {
        return Ok(Vec::new());
    };
    let len = db.block_len(block, REC_SLOT)?;
    let mut out = Vec::with_capacity(len as usize);
    for i in 0..len {
        out.push(marshal::load_template_argument(
            db,
            db.block_get_rec(block, REC_SLOT, i, 0)?,
        )?);
    }
    Ok(out)
}

/// Frees an argument list and the argument records its slots own.
pub fn clear_arguments(db: &mut Database, block: RecordRef) -> Result<()> {
    let Some(block) = block.non_null() else {
        return Ok(());
    };
    let len = db.block_len(block, REC_SLOT)?;
    for i in 0..len {
        let slot = db.block_get_rec(block, REC_SLOT, i, 0)?;
        marshal::free_template_argument(db, slot)?;
    }
    db.free(block)
}

// ---------------------------------------------------------------------
// Template-parameter maps
// ---------------------------------------------------------------------

pub fn put_parameter_map(
    db: &mut Database,
    ast: &AstArena,
    refs: &BindingRefs,
    map: &[(i32, AstTemplateArg)],
) -> Result<RecordRef> {
    let block = db.block_new(MAP_SLOT, map.len() as u32)?;
    for (i, (param_id, arg)) in map.iter().enumerate() {
        let rec = marshal::store_template_argument(db, ast, refs, arg)?;
        db.block_put_int(block, MAP_SLOT, i as u32, 0, *param_id)?;
        db.block_put_rec(block, MAP_SLOT, i as u32, 4, rec)?;
    }
    Ok(block)
}

pub fn get_parameter_map(db: &Database, block: RecordRef) -> Result<Vec<(i32, PdomTemplateArg)>> {
    let Some(block) = block.non_null() else {
        return Ok(Vec::new());
    };
    let len = db.block_len(block, MAP_SLOT)?;
    let mut out = Vec::with_capacity(len as usize);
    for i in 0..len {
        let param_id = db.block_get_int(block, MAP_SLOT, i, 0)?;
        let arg =
            marshal::load_template_argument(db, db.block_get_rec(block, MAP_SLOT, i, 4)?)?;
        out.push((param_id, arg));
    }
    Ok(out)
}

pub fn clear_parameter_map(db: &mut Database, block: RecordRef) -> Result<()> {
    let Some(block) = block.non_null() else {
        return Ok(());
    };
    let len = db.block_len(block, MAP_SLOT)?;
    for i in 0..len {
        let slot = db.block_get_rec(block, MAP_SLOT, i, 4)?;
        marshal::free_template_argument(db, slot)?;
    }
    db.free(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::{PdomType, PdomValue};
    use pdom_ast::{AstValue, BasicKind};

    #[test]
    fn test_argument_list_round_trip() {
        let mut db = Database::new();
        let mut ast = AstArena::new();
        let refs = BindingRefs::default();
        let int_t = ast.int_type();
        let char_t = ast.basic_type(BasicKind::Char);
        let args = vec![
            AstTemplateArg::Type(char_t),
            AstTemplateArg::NonType { value: AstValue::Integral(3), value_type: int_t },
        ];

        let block = put_arguments(&mut db, &ast, &refs, &args).unwrap();
        let loaded = get_arguments(&db, block).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded[0],
            PdomTemplateArg::Type(PdomType::Basic { kind: BasicKind::Char, modifiers: 0 })
        );
        assert_eq!(
            loaded[1],
            PdomTemplateArg::NonType {
                value: PdomValue::Integral(3),
                value_type: PdomType::Basic { kind: BasicKind::Int, modifiers: 0 },
            }
        );
    }

    #[test]
    fn test_empty_argument_list_is_a_real_block() {
        let mut db = Database::new();
        let ast = AstArena::new();
        let refs = BindingRefs::default();
        let block = put_arguments(&mut db, &ast, &refs, &[]).unwrap();
        assert!(!block.is_null());
        assert!(get_arguments(&db, block).unwrap().is_empty());
    }

    #[test]
    fn test_null_block_reads_as_empty() {
        let db = Database::new();
        assert!(get_arguments(&db, RecordRef::NULL).unwrap().is_empty());
        assert!(get_parameter_map(&db, RecordRef::NULL).unwrap().is_empty());
    }

    #[test]
    fn test_parameter_map_round_trip_and_clear() {
        let mut db = Database::new();
        let mut ast = AstArena::new();
        let refs = BindingRefs::default();
        let int_t = ast.int_type();
        let map = vec![(0, AstTemplateArg::Type(int_t)), (2, AstTemplateArg::Type(int_t))];

        let block = put_parameter_map(&mut db, &ast, &refs, &map).unwrap();
        let loaded = get_parameter_map(&db, block).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].0, 0);
        assert_eq!(loaded[1].0, 2);
        assert_eq!(
            loaded[1].1,
            PdomTemplateArg::Type(PdomType::Basic { kind: BasicKind::Int, modifiers: 0 })
        );

        // Clearing returns the block and its argument records to the free
        // lists; a fresh same-sized map reuses them.
        let before = db.arena_size();
        clear_parameter_map(&mut db, block).unwrap();
        let again = put_parameter_map(&mut db, &ast, &refs, &map).unwrap();
        assert_eq!(db.arena_size(), before);
        assert_eq!(again, block);
    }
}
