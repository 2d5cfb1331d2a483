//! The stable record pointer.
//!
//! A `RecordRef` is a 64-bit byte offset into the persistent database. It is
//! stable for the lifetime of the record it names and is the only identity a
//! persisted binding has. Offset arithmetic is confined to the storage layer;
//! every other crate treats a `RecordRef` as an opaque handle.

use serde::Serialize;
use std::fmt;

/// Opaque handle to a fixed-size byte range in the database.
///
/// `RecordRef::NULL` (offset 0) is the not-present sentinel; offset 0 is
/// never handed out by the allocator.
///
/// Serializes as the raw offset, for diagnostic dumps only.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RecordRef(u64);

impl RecordRef {
    pub const NULL: RecordRef = RecordRef(0);

    /// Wraps a raw offset. Only the storage layer and the record header
    /// readers have business calling this.
    #[inline]
    pub const fn from_raw(offset: u64) -> Self {
        RecordRef(offset)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// `None` for the null sentinel, `Some(self)` otherwise.
    #[inline]
    pub fn non_null(self) -> Option<RecordRef> {
        if self.is_null() { None } else { Some(self) }
    }
}

impl Default for RecordRef {
    fn default() -> Self {
        RecordRef::NULL
    }
}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "RecordRef(NULL)")
        } else {
            write!(f, "RecordRef({:#x})", self.0)
        }
    }
}
