//! Resolved type and value model.
//!
//! Types are arena-interned by id; the persisted form is produced by the
//! marshaling layer in `pdom-cpp`, which maps `AstType::Binding` references
//! to record pointers via the linkage.

use crate::arena::{BindingId, TypeId, ValueId};

/// Built-in type kinds. `Unspecified` is the documented decode fallback
/// ("kind defaults to int" on a storage fault lives on the reader side, not
/// here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicKind {
    Unspecified,
    Void,
    Bool,
    Char,
    WChar,
    Char8,
    Char16,
    Char32,
    Int,
    Float,
    Double,
    Nullptr,
}

impl BasicKind {
    pub const fn as_u8(self) -> u8 {
        match self {
            BasicKind::Unspecified => 0,
            BasicKind::Void => 1,
            BasicKind::Bool => 2,
            BasicKind::Char => 3,
            BasicKind::WChar => 4,
            BasicKind::Char8 => 5,
            BasicKind::Char16 => 6,
            BasicKind::Char32 => 7,
            BasicKind::Int => 8,
            BasicKind::Float => 9,
            BasicKind::Double => 10,
            BasicKind::Nullptr => 11,
        }
    }

    pub const fn from_u8(raw: u8) -> BasicKind {
        match raw {
            1 => BasicKind::Void,
            2 => BasicKind::Bool,
            3 => BasicKind::Char,
            4 => BasicKind::WChar,
            5 => BasicKind::Char8,
            6 => BasicKind::Char16,
            7 => BasicKind::Char32,
            8 => BasicKind::Int,
            9 => BasicKind::Float,
            10 => BasicKind::Double,
            11 => BasicKind::Nullptr,
            _ => BasicKind::Unspecified,
        }
    }
}

/// Modifier bits for basic types (`unsigned long long` and friends).
pub mod basic_modifiers {
    pub const SIGNED: u8 = 1 << 0;
    pub const UNSIGNED: u8 = 1 << 1;
    pub const SHORT: u8 = 1 << 2;
    pub const LONG: u8 = 1 << 3;
    pub const LONG_LONG: u8 = 1 << 4;
    pub const COMPLEX: u8 = 1 << 5;
    pub const IMAGINARY: u8 = 1 << 6;
}

/// A resolved C++ type. Referenced structurally by `TypeId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AstType {
    Basic { kind: BasicKind, modifiers: u8 },
    Pointer(TypeId),
    Reference { rvalue: bool, inner: TypeId },
    CvQualified { is_const: bool, is_volatile: bool, inner: TypeId },
    Array { element: TypeId, size: Option<ValueId> },
    Function { return_type: TypeId, parameters: Vec<TypeId>, takes_varargs: bool },
    PackExpansion(TypeId),
    /// A reference to a template parameter by its stable parameter id
    /// (nesting level in the high half, position in the low half).
    TemplateParameter { param_id: i32 },
    /// A type that *is* a binding (class, enum, typedef, instance).
    Binding(BindingId),
    /// The typed "not persisted" marker used when resolution failed.
    Problem,
}

/// A resolved constant value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AstValue {
    Integral(i64),
    Text(String),
    Unknown,
}
