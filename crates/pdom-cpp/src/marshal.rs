//! Type, value, and template-argument marshaling.
//!
//! Stored types are small tagged records. A type slot anywhere in the
//! binding layer is a record pointer to one of these; type lists and
//! argument lists are `[u16 len][rec]*len` blocks whose slots point at
//! type/argument records. Reading a null slot yields the documented empty
//! fallback rather than a fault.
//!
//! `AstType::Binding` references are resolved against the linkage's
//! ast-to-record map; a binding that has no persisted record yet is stored
//! as the typed problem marker (the binding layer never aborts a whole
//! record over one unresolvable type).

use pdom_ast::{AstArena, AstTemplateArg, AstType, AstValue, BasicKind, BindingId, TypeId};
use pdom_common::{RecordRef, Result};
use pdom_db::Database;
use rustc_hash::FxHashMap;
use tracing::debug;

/// Record pointers for AST bindings persisted in the current pass.
pub type BindingRefs = FxHashMap<BindingId, RecordRef>;

// Type record tags.
const T_BASIC: u8 = 1;
const T_POINTER: u8 = 2;
const T_REFERENCE: u8 = 3;
const T_CV: u8 = 4;
const T_ARRAY: u8 = 5;
const T_FUNCTION: u8 = 6;
const T_PACK: u8 = 7;
const T_TPARAM: u8 = 8;
const T_BINDING: u8 = 9;
const T_PROBLEM: u8 = 10;

// Value record tags.
const V_INTEGRAL: u8 = 1;
const V_TEXT: u8 = 2;
const V_UNKNOWN: u8 = 3;

// Template-argument record tags.
const A_TYPE: u8 = 1;
const A_NON_TYPE: u8 = 2;

/// Slot size of type-list and argument-list blocks (one record pointer).
pub const REC_SLOT: u32 = 8;
/// Slot size of template-parameter-map blocks (`[i32 param id][rec arg]`).
pub const MAP_SLOT: u32 = 12;

// ---------------------------------------------------------------------
// Loaded (reader-side) forms
// ---------------------------------------------------------------------

/// A type reconstructed from its stored record. Binding references stay as
/// record pointers; the caller reconstructs the binding wrapper on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdomType {
    Basic { kind: BasicKind, modifiers: u8 },
    Pointer(Box<PdomType>),
    Reference { rvalue: bool, inner: Box<PdomType> },
    CvQualified { is_const: bool, is_volatile: bool, inner: Box<PdomType> },
    Array { element: Box<PdomType>, size: Option<PdomValue> },
    Function { return_type: Box<PdomType>, parameters: Vec<PdomType>, takes_varargs: bool },
    PackExpansion(Box<PdomType>),
    TemplateParameter { param_id: i32 },
    Binding(RecordRef),
    Problem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdomValue {
    Integral(i64),
    Text(Vec<u8>),
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdomTemplateArg {
    Type(PdomType),
    NonType { value: PdomValue, value_type: PdomType },
}

// ---------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------

pub fn store_type(
    db: &mut Database,
    ast: &AstArena,
    refs: &BindingRefs,
    ty: TypeId,
) -> Result<RecordRef> {
    match ast.ty(ty) {
        AstType::Basic { kind, modifiers } => {
            let rec = db.malloc(3)?;
            db.put_byte(rec, 0, T_BASIC)?;
            db.put_byte(rec, 1, kind.as_u8())?;
            db.put_byte(rec, 2, *modifiers)?;
            Ok(rec)
        }
        AstType::Pointer(inner) => {
            let inner = store_type(db, ast, refs, *inner)?;
            let rec = db.malloc(9)?;
            db.put_byte(rec, 0, T_POINTER)?;
            db.put_rec(rec, 1, inner)?;
            Ok(rec)
        }
        AstType::Reference { rvalue, inner } => {
            let inner = store_type(db, ast, refs, *inner)?;
            let rec = db.malloc(10)?;
            db.put_byte(rec, 0, T_REFERENCE)?;
            db.put_byte(rec, 1, u8::from(*rvalue))?;
            db.put_rec(rec, 2, inner)?;
            Ok(rec)
        }
        AstType::CvQualified { is_const, is_volatile, inner } => {
            let inner = store_type(db, ast, refs, *inner)?;
            let rec = db.malloc(10)?;
            db.put_byte(rec, 0, T_CV)?;
            db.put_byte(rec, 1, u8::from(*is_const) | (u8::from(*is_volatile) << 1))?;
            db.put_rec(rec, 2, inner)?;
            Ok(rec)
        }
        AstType::Array { element, size } => {
            let element = store_type(db, ast, refs, *element)?;
            let size_rec = match size {
                Some(v) => store_value(db, ast.value(*v))?,
                None => RecordRef::NULL,
            };
            let rec = db.malloc(17)?;
            db.put_byte(rec, 0, T_ARRAY)?;
            db.put_rec(rec, 1, element)?;
            db.put_rec(rec, 9, size_rec)?;
            Ok(rec)
        }
        AstType::Function { return_type, parameters, takes_varargs } => {
            let ret = store_type(db, ast, refs, *return_type)?;
            let params = store_type_list(db, ast, refs, parameters)?;
            let rec = db.malloc(18)?;
            db.put_byte(rec, 0, T_FUNCTION)?;
            db.put_rec(rec, 1, ret)?;
            db.put_rec(rec, 9, params)?;
            db.put_byte(rec, 17, u8::from(*takes_varargs))?;
            Ok(rec)
        }
        AstType::PackExpansion(pattern) => {
            let pattern = store_type(db, ast, refs, *pattern)?;
            let rec = db.malloc(9)?;
            db.put_byte(rec, 0, T_PACK)?;
            db.put_rec(rec, 1, pattern)?;
            Ok(rec)
        }
        AstType::TemplateParameter { param_id } => {
            let rec = db.malloc(5)?;
            db.put_byte(rec, 0, T_TPARAM)?;
            db.put_int(rec, 1, *param_id)?;
            Ok(rec)
        }
        AstType::Binding(binding) => match refs.get(binding) {
            Some(target) => {
                let rec = db.malloc(9)?;
                db.put_byte(rec, 0, T_BINDING)?;
                db.put_rec(rec, 1, *target)?;
                Ok(rec)
            }
            None => {
                debug!(?binding, "binding type not persisted; storing problem marker");
                store_problem(db)
            }
        },
        AstType::Problem => store_problem(db),
    }
}

fn store_problem(db: &mut Database) -> Result<RecordRef> {
    let rec = db.malloc(1)?;
    db.put_byte(rec, 0, T_PROBLEM)?;
    Ok(rec)
}

/// Stores a reader-side type verbatim. Used when the linkage synthesizes
/// types itself (implicit special members referencing their own class).
pub fn store_pdom_type(db: &mut Database, ty: &PdomType) -> Result<RecordRef> {
    match ty {
        PdomType::Basic { kind, modifiers } => {
            let rec = db.malloc(3)?;
            db.put_byte(rec, 0, T_BASIC)?;
            db.put_byte(rec, 1, kind.as_u8())?;
            db.put_byte(rec, 2, *modifiers)?;
            Ok(rec)
        }
        PdomType::Pointer(inner) => {
            let inner = store_pdom_type(db, inner)?;
            let rec = db.malloc(9)?;
            db.put_byte(rec, 0, T_POINTER)?;
            db.put_rec(rec, 1, inner)?;
            Ok(rec)
        }
        PdomType::Reference { rvalue, inner } => {
            let inner = store_pdom_type(db, inner)?;
            let rec = db.malloc(10)?;
            db.put_byte(rec, 0, T_REFERENCE)?;
            db.put_byte(rec, 1, u8::from(*rvalue))?;
            db.put_rec(rec, 2, inner)?;
            Ok(rec)
        }
        PdomType::CvQualified { is_const, is_volatile, inner } => {
            let inner = store_pdom_type(db, inner)?;
            let rec = db.malloc(10)?;
            db.put_byte(rec, 0, T_CV)?;
            db.put_byte(rec, 1, u8::from(*is_const) | (u8::from(*is_volatile) << 1))?;
            db.put_rec(rec, 2, inner)?;
            Ok(rec)
        }
        PdomType::Array { element, size } => {
            let element = store_pdom_type(db, element)?;
            let size_rec = match size {
                Some(v) => store_pdom_value(db, v)?,
                None => RecordRef::NULL,
            };
            let rec = db.malloc(17)?;
            db.put_byte(rec, 0, T_ARRAY)?;
            db.put_rec(rec, 1, element)?;
            db.put_rec(rec, 9, size_rec)?;
            Ok(rec)
        }
        PdomType::Function { return_type, parameters, takes_varargs } => {
            let ret = store_pdom_type(db, return_type)?;
            let list = db.block_new(REC_SLOT, parameters.len() as u32)?;
            for (i, param) in parameters.iter().enumerate() {
                let p = store_pdom_type(db, param)?;
                db.block_put_rec(list, REC_SLOT, i as u32, 0, p)?;
            }
            let rec = db.malloc(18)?;
            db.put_byte(rec, 0, T_FUNCTION)?;
            db.put_rec(rec, 1, ret)?;
            db.put_rec(rec, 9, list)?;
            db.put_byte(rec, 17, u8::from(*takes_varargs))?;
            Ok(rec)
        }
        PdomType::PackExpansion(pattern) => {
            let pattern = store_pdom_type(db, pattern)?;
            let rec = db.malloc(9)?;
            db.put_byte(rec, 0, T_PACK)?;
            db.put_rec(rec, 1, pattern)?;
            Ok(rec)
        }
        PdomType::TemplateParameter { param_id } => {
            let rec = db.malloc(5)?;
            db.put_byte(rec, 0, T_TPARAM)?;
            db.put_int(rec, 1, *param_id)?;
            Ok(rec)
        }
        PdomType::Binding(target) => {
            let rec = db.malloc(9)?;
            db.put_byte(rec, 0, T_BINDING)?;
            db.put_rec(rec, 1, *target)?;
            Ok(rec)
        }
        PdomType::Problem => store_problem(db),
    }
}

pub fn load_type(db: &Database, rec: RecordRef) -> Result<PdomType> {
    if rec.is_null() {
        return Ok(PdomType::Problem);
    }
    let tag = db.get_byte(rec, 0)?;
    match tag {
        T_BASIC => Ok(PdomType::Basic {
            kind: BasicKind::from_u8(db.get_byte(rec, 1)?),
            modifiers: db.get_byte(rec, 2)?,
        }),
        T_POINTER => Ok(PdomType::Pointer(Box::new(load_type(db, db.get_rec(rec, 1)?)?))),
        T_REFERENCE => Ok(PdomType::Reference {
            rvalue: db.get_byte(rec, 1)? != 0,
            inner: Box::new(load_type(db, db.get_rec(rec, 2)?)?),
        }),
        T_CV => {
            let cv = db.get_byte(rec, 1)?;
            Ok(PdomType::CvQualified {
                is_const: cv & 1 != 0,
                is_volatile: cv & 2 != 0,
                inner: Box::new(load_type(db, db.get_rec(rec, 2)?)?),
            })
        }
        T_ARRAY => {
            let size_rec = db.get_rec(rec, 9)?;
            Ok(PdomType::Array {
                element: Box::new(load_type(db, db.get_rec(rec, 1)?)?),
                size: size_rec.non_null().map(|r| load_value(db, r)).transpose()?,
            })
        }
        T_FUNCTION => {
            let list = db.get_rec(rec, 9)?;
            let parameters = load_type_list(db, list)?;
            Ok(PdomType::Function {
                return_type: Box::new(load_type(db, db.get_rec(rec, 1)?)?),
                parameters,
                takes_varargs: db.get_byte(rec, 17)? != 0,
            })
        }
        T_PACK => Ok(PdomType::PackExpansion(Box::new(load_type(db, db.get_rec(rec, 1)?)?))),
        T_TPARAM => Ok(PdomType::TemplateParameter { param_id: db.get_int(rec, 1)? }),
        T_BINDING => Ok(PdomType::Binding(db.get_rec(rec, 1)?)),
        T_PROBLEM => Ok(PdomType::Problem),
        unknown => panic!(
            "unknown type record tag {unknown} at {:#x}: corrupt database",
            rec.raw()
        ),
    }
}

/// Frees a type record and everything it owns. Null is a no-op.
pub fn free_type(db: &mut Database, rec: RecordRef) -> Result<()> {
    if rec.is_null() {
        return Ok(());
    }
    let tag = db.get_byte(rec, 0)?;
    match tag {
        T_POINTER | T_PACK => {
            let inner = db.get_rec(rec, 1)?;
            free_type(db, inner)?;
        }
        T_REFERENCE | T_CV => {
            let inner = db.get_rec(rec, 2)?;
            free_type(db, inner)?;
        }
        T_ARRAY => {
            let element = db.get_rec(rec, 1)?;
            free_type(db, element)?;
            let size = db.get_rec(rec, 9)?;
            free_value(db, size)?;
        }
        T_FUNCTION => {
            let ret = db.get_rec(rec, 1)?;
            free_type(db, ret)?;
            let params = db.get_rec(rec, 9)?;
            free_type_list(db, params)?;
        }
        _ => {}
    }
    db.free(rec)
}

// ---------------------------------------------------------------------
// Type lists
// ---------------------------------------------------------------------

pub fn store_type_list(
    db: &mut Database,
    ast: &AstArena,
    refs: &BindingRefs,
    types: &[TypeId],
) -> Result<RecordRef> {
    let block = db.block_new(REC_SLOT, types.len() as u32)?;
    for (i, ty) in types.iter().enumerate() {
        let rec = store_type(db, ast, refs, *ty)?;
        db.block_put_rec(block, REC_SLOT, i as u32, 0, rec)?;
    }
    Ok(block)
}

/// Reading a null list yields the documented empty fallback.
pub fn load_type_list(db: &Database, block: RecordRef) -> Result<Vec<PdomType>> {
    let Some(block) = block.non_null() else {
        return Ok(Vec::new());
    };
    let len = db.block_len(block, REC_SLOT)?;
    let mut out = Vec::with_capacity(len as usize);
    for i in 0..len {
        out.push(load_type(db, db.block_get_rec(block, REC_SLOT, i, 0)?)?);
    }
    Ok(out)
}

pub fn free_type_list(db: &mut Database, block: RecordRef) -> Result<()> {
    let Some(block) = block.non_null() else {
        return Ok(());
    };
    let len = db.block_len(block, REC_SLOT)?;
    for i in 0..len {
        let slot = db.block_get_rec(block, REC_SLOT, i, 0)?;
        free_type(db, slot)?;
    }
    db.free(block)
}

// ---------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------

pub fn store_value(db: &mut Database, value: &AstValue) -> Result<RecordRef> {
    match value {
        AstValue::Integral(v) => {
            let rec = db.malloc(9)?;
            db.put_byte(rec, 0, V_INTEGRAL)?;
            db.put_long(rec, 1, *v)?;
            Ok(rec)
        }
        AstValue::Text(text) => {
            let string = db.new_string(text.as_bytes())?;
            let rec = db.malloc(9)?;
            db.put_byte(rec, 0, V_TEXT)?;
            db.put_rec(rec, 1, string)?;
            Ok(rec)
        }
        AstValue::Unknown => {
            let rec = db.malloc(1)?;
            db.put_byte(rec, 0, V_UNKNOWN)?;
            Ok(rec)
        }
    }
}

pub fn store_pdom_value(db: &mut Database, value: &PdomValue) -> Result<RecordRef> {
    match value {
        PdomValue::Integral(v) => store_value(db, &AstValue::Integral(*v)),
        PdomValue::Text(text) => {
            let string = db.new_string(text)?;
            let rec = db.malloc(9)?;
            db.put_byte(rec, 0, V_TEXT)?;
            db.put_rec(rec, 1, string)?;
            Ok(rec)
        }
        PdomValue::Unknown => store_value(db, &AstValue::Unknown),
    }
}

pub fn load_value(db: &Database, rec: RecordRef) -> Result<PdomValue> {
    if rec.is_null() {
        return Ok(PdomValue::Unknown);
    }
    match db.get_byte(rec, 0)? {
        V_INTEGRAL => Ok(PdomValue::Integral(db.get_long(rec, 1)?)),
        V_TEXT => Ok(PdomValue::Text(db.string_bytes(db.get_rec(rec, 1)?)?.to_vec())),
        V_UNKNOWN => Ok(PdomValue::Unknown),
        unknown => panic!(
            "unknown value record tag {unknown} at {:#x}: corrupt database",
            rec.raw()
        ),
    }
}

pub fn free_value(db: &mut Database, rec: RecordRef) -> Result<()> {
    if rec.is_null() {
        return Ok(());
    }
    if db.get_byte(rec, 0)? == V_TEXT {
        db.free_string(db.get_rec(rec, 1)?)?;
    }
    db.free(rec)
}

// ---------------------------------------------------------------------
// Template arguments
// ---------------------------------------------------------------------

pub fn store_template_argument(
    db: &mut Database,
    ast: &AstArena,
    refs: &BindingRefs,
    arg: &AstTemplateArg,
) -> Result<RecordRef> {
    match arg {
        AstTemplateArg::Type(ty) => {
            let type_rec = store_type(db, ast, refs, *ty)?;
            let rec = db.malloc(17)?;
            db.put_byte(rec, 0, A_TYPE)?;
            db.put_rec(rec, 1, type_rec)?;
            Ok(rec)
        }
        AstTemplateArg::NonType { value, value_type } => {
            let type_rec = store_type(db, ast, refs, *value_type)?;
            let value_rec = store_value(db, value)?;
            let rec = db.malloc(17)?;
            db.put_byte(rec, 0, A_NON_TYPE)?;
            db.put_rec(rec, 1, type_rec)?;
            db.put_rec(rec, 9, value_rec)?;
            Ok(rec)
        }
    }
}

pub fn load_template_argument(db: &Database, rec: RecordRef) -> Result<PdomTemplateArg> {
    match db.get_byte(rec, 0)? {
        A_TYPE => Ok(PdomTemplateArg::Type(load_type(db, db.get_rec(rec, 1)?)?)),
        A_NON_TYPE => Ok(PdomTemplateArg::NonType {
            value: load_value(db, db.get_rec(rec, 9)?)?,
            value_type: load_type(db, db.get_rec(rec, 1)?)?,
        }),
        unknown => panic!(
            "unknown template-argument tag {unknown} at {:#x}: corrupt database",
            rec.raw()
        ),
    }
}

pub fn free_template_argument(db: &mut Database, rec: RecordRef) -> Result<()> {
    if rec.is_null() {
        return Ok(());
    }
    let arg_type = db.get_rec(rec, 1)?;
    free_type(db, arg_type)?;
    if db.get_byte(rec, 0)? == A_NON_TYPE {
        let value = db.get_rec(rec, 9)?;
        free_value(db, value)?;
    }
    db.free(rec)
}

// ---------------------------------------------------------------------
// Execution blobs (opaque constexpr bodies)
// ---------------------------------------------------------------------

pub fn store_execution(db: &mut Database, blob: &[u8]) -> Result<RecordRef> {
    db.new_blob(blob)
}

pub fn load_execution(db: &Database, rec: RecordRef) -> Result<Option<Vec<u8>>> {
    match rec.non_null() {
        Some(rec) => Ok(Some(db.blob_bytes(rec)?.to_vec())),
        None => Ok(None),
    }
}
