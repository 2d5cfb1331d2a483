//! Bit-packed declaration annotations: the persisted wire format.
//!
//! Bit positions are format constants. Two properties may share a position
//! only when their owning declaration kinds are mutually exclusive, and
//! decoding must check the binding's kind before asking about a shared
//! property. The documented shared positions:
//!
//! - `MUTABLE` / `INLINE` share bit 4: only fields are mutable, only
//!   functions are inline.
//! - `EXTERN_C` shares the low visibility bit: only file-scope entities are
//!   extern "C", and file-scope entities have no member visibility.
//!
//! Updating a declaration's annotations replaces the whole bitfield
//! atomically; there are no partial-bit update entry points.

use pdom_ast::{DeclModifiers, Visibility};

// ---------------------------------------------------------------------
// Member/variable annotation byte
// ---------------------------------------------------------------------

/// bits 0-1: member visibility, or bit 0 = extern "C" at file scope
pub const VISIBILITY_MASK: u8 = 0b0000_0011;
pub const EXTERN_C: u8 = 1 << 0;
pub const STATIC: u8 = 1 << 2;
pub const EXTERN: u8 = 1 << 3;
/// Shared position: mutable on fields, inline on functions.
pub const MUTABLE: u8 = 1 << 4;
pub const CONSTEXPR: u8 = 1 << 5;
pub const AUTO_STORAGE: u8 = 1 << 6;
pub const REGISTER: u8 = 1 << 7;

/// Encodes the annotation byte for a variable or field.
///
/// `file_scope` selects the shared low-bit interpretation: members encode
/// visibility, file-scope entities encode extern "C".
pub fn encode_variable(modifiers: DeclModifiers, visibility: Visibility, file_scope: bool) -> u8 {
    let mut bits = if file_scope {
        if modifiers.contains(DeclModifiers::EXTERN_C) { EXTERN_C } else { 0 }
    } else {
        visibility.as_bits()
    };
    if modifiers.contains(DeclModifiers::STATIC) {
        bits |= STATIC;
    }
    if modifiers.contains(DeclModifiers::EXTERN) {
        bits |= EXTERN;
    }
    if modifiers.contains(DeclModifiers::MUTABLE) {
        bits |= MUTABLE;
    }
    if modifiers.contains(DeclModifiers::CONSTEXPR) {
        bits |= CONSTEXPR;
    }
    if modifiers.contains(DeclModifiers::AUTO_STORAGE) {
        bits |= AUTO_STORAGE;
    }
    if modifiers.contains(DeclModifiers::REGISTER) {
        bits |= REGISTER;
    }
    bits
}

pub const fn visibility(bits: u8) -> Visibility {
    Visibility::from_bits(bits & VISIBILITY_MASK)
}

/// Only meaningful for fields; callers must check the kind first (the bit
/// is `INLINE` on function kinds).
pub const fn is_mutable(bits: u8) -> bool {
    bits & MUTABLE != 0
}

/// Only meaningful for file-scope entities (shares the visibility field).
pub const fn is_extern_c(bits: u8) -> bool {
    bits & EXTERN_C != 0
}

pub const fn is_static(bits: u8) -> bool {
    bits & STATIC != 0
}

pub const fn is_extern(bits: u8) -> bool {
    bits & EXTERN != 0
}

pub const fn is_constexpr(bits: u8) -> bool {
    bits & CONSTEXPR != 0
}

// ---------------------------------------------------------------------
// Function annotation short
// ---------------------------------------------------------------------

pub mod function {
    use pdom_ast::{DeclModifiers, Visibility};

    /// bits 0-1: visibility (methods) or bit 0 extern "C" (free functions)
    pub const VISIBILITY_MASK: u16 = 0b0000_0000_0000_0011;
    pub const EXTERN_C: u16 = 1 << 0;
    pub const STATIC: u16 = 1 << 2;
    pub const EXTERN: u16 = 1 << 3;
    /// Shared position with `MUTABLE` on the variable byte.
    pub const INLINE: u16 = 1 << 4;
    pub const CONSTEXPR: u16 = 1 << 5;
    pub const VARARGS: u16 = 1 << 6;
    pub const PARAMETER_PACK: u16 = 1 << 7;
    pub const VIRTUAL: u16 = 1 << 8;
    pub const PURE_VIRTUAL: u16 = 1 << 9;
    pub const OVERRIDE: u16 = 1 << 10;
    pub const FINAL: u16 = 1 << 11;
    pub const EXPLICIT: u16 = 1 << 12;
    pub const DELETED: u16 = 1 << 13;
    pub const NO_RETURN: u16 = 1 << 14;
    /// Compiler-synthesized special member.
    pub const IMPLICIT: u16 = 1 << 15;

    pub fn encode(modifiers: DeclModifiers, visibility: Visibility, file_scope: bool) -> u16 {
        let mut bits = if file_scope {
            if modifiers.contains(DeclModifiers::EXTERN_C) { EXTERN_C } else { 0 }
        } else {
            visibility.as_bits() as u16
        };
        let pairs: [(DeclModifiers, u16); 13] = [
            (DeclModifiers::STATIC, STATIC),
            (DeclModifiers::EXTERN, EXTERN),
            (DeclModifiers::INLINE, INLINE),
            (DeclModifiers::CONSTEXPR, CONSTEXPR),
            (DeclModifiers::VARARGS, VARARGS),
            (DeclModifiers::PARAMETER_PACK, PARAMETER_PACK),
            (DeclModifiers::VIRTUAL, VIRTUAL),
            (DeclModifiers::PURE_VIRTUAL, PURE_VIRTUAL),
            (DeclModifiers::OVERRIDE, OVERRIDE),
            (DeclModifiers::FINAL, FINAL),
            (DeclModifiers::EXPLICIT, EXPLICIT),
            (DeclModifiers::DELETED, DELETED),
            (DeclModifiers::NO_RETURN, NO_RETURN),
        ];
        for (modifier, bit) in pairs {
            if modifiers.contains(modifier) {
                bits |= bit;
            }
        }
        if modifiers.contains(DeclModifiers::IMPLICIT) {
            bits |= IMPLICIT;
        }
        bits
    }

    pub const fn visibility(bits: u16) -> Visibility {
        Visibility::from_bits((bits & VISIBILITY_MASK) as u8)
    }

    pub const fn is_inline(bits: u16) -> bool {
        bits & INLINE != 0
    }

    pub const fn is_virtual(bits: u16) -> bool {
        bits & VIRTUAL != 0
    }

    pub const fn is_pure_virtual(bits: u16) -> bool {
        bits & PURE_VIRTUAL != 0
    }

    pub const fn is_override(bits: u16) -> bool {
        bits & OVERRIDE != 0
    }

    pub const fn is_final(bits: u16) -> bool {
        bits & FINAL != 0
    }

    pub const fn is_explicit(bits: u16) -> bool {
        bits & EXPLICIT != 0
    }

    pub const fn is_constexpr(bits: u16) -> bool {
        bits & CONSTEXPR != 0
    }

    pub const fn is_deleted(bits: u16) -> bool {
        bits & DELETED != 0
    }

    pub const fn is_no_return(bits: u16) -> bool {
        bits & NO_RETURN != 0
    }

    pub const fn takes_varargs(bits: u16) -> bool {
        bits & VARARGS != 0
    }

    pub const fn has_parameter_pack(bits: u16) -> bool {
        bits & PARAMETER_PACK != 0
    }

    pub const fn is_implicit(bits: u16) -> bool {
        bits & IMPLICIT != 0
    }
}

// ---------------------------------------------------------------------
// Class annotation byte
// ---------------------------------------------------------------------

pub mod class {
    use pdom_ast::Visibility;

    pub const VISIBILITY_MASK: u8 = 0b0000_0011;
    pub const FINAL: u8 = 1 << 2;
    pub const ANONYMOUS: u8 = 1 << 3;

    pub fn encode(visibility: Visibility, is_final: bool, is_anonymous: bool) -> u8 {
        let mut bits = visibility.as_bits();
        if is_final {
            bits |= FINAL;
        }
        if is_anonymous {
            bits |= ANONYMOUS;
        }
        bits
    }

    pub const fn is_final(bits: u8) -> bool {
        bits & FINAL != 0
    }

    pub const fn is_anonymous(bits: u8) -> bool {
        bits & ANONYMOUS != 0
    }
}

// ---------------------------------------------------------------------
// Parameter annotation byte
// ---------------------------------------------------------------------

pub mod parameter {
    pub const HAS_DEFAULT: u8 = 1 << 0;
    pub const PACK: u8 = 1 << 1;

    pub fn encode(has_default: bool, is_pack: bool) -> u8 {
        let mut bits = 0;
        if has_default {
            bits |= HAS_DEFAULT;
        }
        if is_pack {
            bits |= PACK;
        }
        bits
    }

    pub const fn has_default(bits: u8) -> bool {
        bits & HAS_DEFAULT != 0
    }

    pub const fn is_pack(bits: u8) -> bool {
        bits & PACK != 0
    }
}

// ---------------------------------------------------------------------
// Base-class flag byte
// ---------------------------------------------------------------------

pub mod base {
    use pdom_ast::Visibility;

    pub const VISIBILITY_MASK: u8 = 0b0000_0011;
    pub const VIRTUAL: u8 = 1 << 2;

    pub fn encode(visibility: Visibility, is_virtual: bool) -> u8 {
        let mut bits = visibility.as_bits();
        if is_virtual {
            bits |= VIRTUAL;
        }
        bits
    }

    pub const fn visibility(bits: u8) -> Visibility {
        Visibility::from_bits(bits & VISIBILITY_MASK)
    }

    pub const fn is_virtual(bits: u8) -> bool {
        bits & VIRTUAL != 0
    }
}

// ---------------------------------------------------------------------
// Enumeration flag byte
// ---------------------------------------------------------------------

pub mod enumeration {
    pub const SCOPED: u8 = 1 << 0;
    pub const OPAQUE: u8 = 1 << 1;

    pub fn encode(scoped: bool, opaque: bool) -> u8 {
        let mut bits = 0;
        if scoped {
            bits |= SCOPED;
        }
        if opaque {
            bits |= OPAQUE;
        }
        bits
    }

    pub const fn is_scoped(bits: u8) -> bool {
        bits & SCOPED != 0
    }

    pub const fn is_opaque(bits: u8) -> bool {
        bits & OPAQUE != 0
    }
}
