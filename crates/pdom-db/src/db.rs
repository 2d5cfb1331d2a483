//! The paged byte database.
//!
//! Memory model: a grow-only arena of fixed-size chunks addressed by byte
//! offset. Every allocation is prefixed by a 2-byte gross-size header (not
//! visible through the returned `RecordRef`); freed blocks go onto
//! per-size-class free lists and are reused by later allocations of the
//! same class.
//!
//! Offset 0 is reserved so that `RecordRef::NULL` never aliases a live
//! record. Any access through a null or out-of-range reference is a
//! storage fault, never undefined data.

use pdom_common::limits::{BLOCK_LEN_PREFIX, CHUNK_SIZE, MAX_MALLOC_SIZE, max_block_len};
use pdom_common::{PdomError, RecordRef, Result};
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use tracing::trace;

/// Allocation granularity. Block gross sizes are multiples of this, which
/// keeps the free-list size-class count small.
const BLOCK_ALIGN: u64 = 8;

/// Bytes reserved at the front of the arena so offset 0 stays invalid.
const RESERVED: u64 = 8;

pub struct Database {
    data: Vec<u8>,
    /// Size-class free lists: gross block size -> head of a singly linked
    /// list threaded through the first 8 bytes of each free block body.
    free_lists: FxHashMap<u32, RecordRef>,
}

impl Database {
    pub fn new() -> Self {
        Database {
            data: vec![0u8; RESERVED as usize],
            free_lists: FxHashMap::default(),
        }
    }

    /// Total arena size in bytes, including reserved space and free blocks.
    pub fn arena_size(&self) -> u64 {
        self.data.len() as u64
    }

    // ---------------------------------------------------------------
    // Allocation
    // ---------------------------------------------------------------

    /// Allocates `size` usable bytes, zero-initialized.
    pub fn malloc(&mut self, size: u32) -> Result<RecordRef> {
        if size == 0 || size > MAX_MALLOC_SIZE {
            return Err(PdomError::storage(format!(
                "malloc of {size} bytes outside (0, {MAX_MALLOC_SIZE}]"
            )));
        }
        let gross = Self::gross_size(size);

        if let Some(head) = self.free_lists.get(&gross).copied()
            && !head.is_null()
        {
            let next = self.get_rec(head, 0)?;
            self.free_lists.insert(gross, next);
            // Reused blocks must come back zeroed like fresh ones.
            let start = head.raw() as usize;
            let body = gross as usize - 2;
            self.data[start..start + body].fill(0);
            trace!(rec = head.raw(), gross, "malloc: reused free block");
            return Ok(head);
        }

        let offset = self.data.len() as u64;
        // Never let a block straddle a chunk boundary; pad instead.
        let chunk = CHUNK_SIZE as u64;
        let offset = if (offset % chunk) + gross as u64 > chunk {
            let padded = offset.next_multiple_of(chunk);
            self.data.resize(padded as usize, 0);
            padded
        } else {
            offset
        };
        self.data.resize(offset as usize + gross as usize, 0);
        self.data[offset as usize..offset as usize + 2].copy_from_slice(&(gross as u16).to_le_bytes());
        Ok(RecordRef::from_raw(offset + 2))
    }

    /// Returns a block to its size-class free list. Freeing the null
    /// reference is a no-op.
    pub fn free(&mut self, rec: RecordRef) -> Result<()> {
        if rec.is_null() {
            return Ok(());
        }
        let gross = self.gross_of(rec)?;
        let head = self.free_lists.get(&gross).copied().unwrap_or(RecordRef::NULL);
        self.put_rec(rec, 0, head)?;
        self.free_lists.insert(gross, rec);
        trace!(rec = rec.raw(), gross, "free");
        Ok(())
    }

    fn gross_size(size: u32) -> u32 {
        // A freed block's body holds the free-list link, so every block
        // needs at least 8 usable bytes.
        ((size.max(8) as u64 + 2).next_multiple_of(BLOCK_ALIGN)) as u32
    }

    fn gross_of(&self, rec: RecordRef) -> Result<u32> {
        let hdr = rec.raw().checked_sub(2).ok_or_else(|| {
            PdomError::storage(format!("free of invalid record {:#x}", rec.raw()))
        })?;
        if hdr < RESERVED || hdr + 2 > self.data.len() as u64 {
            return Err(PdomError::storage(format!(
                "free of out-of-range record {:#x}",
                rec.raw()
            )));
        }
        let raw = &self.data[hdr as usize..hdr as usize + 2];
        Ok(u16::from_le_bytes([raw[0], raw[1]]) as u32)
    }

    // ---------------------------------------------------------------
    // Scalar accessors
    // ---------------------------------------------------------------

    fn check(&self, rec: RecordRef, offset: u64, width: u64, op: &str) -> Result<usize> {
        if rec.is_null() {
            return Err(PdomError::storage(format!("{op} through null record")));
        }
        let start = rec.raw() + offset;
        if start < RESERVED || start + width > self.data.len() as u64 {
            return Err(PdomError::storage(format!(
                "{op} at {:#x}+{offset} ({width} bytes) out of range",
                rec.raw()
            )));
        }
        Ok(start as usize)
    }

    pub fn get_byte(&self, rec: RecordRef, offset: u64) -> Result<u8> {
        let at = self.check(rec, offset, 1, "get_byte")?;
        Ok(self.data[at])
    }

    pub fn put_byte(&mut self, rec: RecordRef, offset: u64, value: u8) -> Result<()> {
        let at = self.check(rec, offset, 1, "put_byte")?;
        self.data[at] = value;
        Ok(())
    }

    pub fn get_short(&self, rec: RecordRef, offset: u64) -> Result<i16> {
        let at = self.check(rec, offset, 2, "get_short")?;
        Ok(i16::from_le_bytes([self.data[at], self.data[at + 1]]))
    }

    pub fn put_short(&mut self, rec: RecordRef, offset: u64, value: i16) -> Result<()> {
        let at = self.check(rec, offset, 2, "put_short")?;
        self.data[at..at + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn get_int(&self, rec: RecordRef, offset: u64) -> Result<i32> {
        let at = self.check(rec, offset, 4, "get_int")?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.data[at..at + 4]);
        Ok(i32::from_le_bytes(raw))
    }

    pub fn put_int(&mut self, rec: RecordRef, offset: u64, value: i32) -> Result<()> {
        let at = self.check(rec, offset, 4, "put_int")?;
        self.data[at..at + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn get_long(&self, rec: RecordRef, offset: u64) -> Result<i64> {
        let at = self.check(rec, offset, 8, "get_long")?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.data[at..at + 8]);
        Ok(i64::from_le_bytes(raw))
    }

    pub fn put_long(&mut self, rec: RecordRef, offset: u64, value: i64) -> Result<()> {
        let at = self.check(rec, offset, 8, "put_long")?;
        self.data[at..at + 8].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn get_rec(&self, rec: RecordRef, offset: u64) -> Result<RecordRef> {
        let at = self.check(rec, offset, 8, "get_rec")?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.data[at..at + 8]);
        Ok(RecordRef::from_raw(u64::from_le_bytes(raw)))
    }

    pub fn put_rec(&mut self, rec: RecordRef, offset: u64, value: RecordRef) -> Result<()> {
        let at = self.check(rec, offset, 8, "put_rec")?;
        self.data[at..at + 8].copy_from_slice(&value.raw().to_le_bytes());
        Ok(())
    }

    // ---------------------------------------------------------------
    // Strings: [u16 len][bytes]
    // ---------------------------------------------------------------

    pub fn new_string(&mut self, bytes: &[u8]) -> Result<RecordRef> {
        if bytes.len() as u32 > MAX_MALLOC_SIZE - BLOCK_LEN_PREFIX {
            return Err(PdomError::storage(format!(
                "string of {} bytes exceeds block capacity",
                bytes.len()
            )));
        }
        let rec = self.malloc(BLOCK_LEN_PREFIX + bytes.len() as u32)?;
        self.put_short(rec, 0, bytes.len() as i16)?;
        let at = self.check(rec, 2, bytes.len() as u64, "new_string")?;
        self.data[at..at + bytes.len()].copy_from_slice(bytes);
        Ok(rec)
    }

    pub fn string_bytes(&self, rec: RecordRef) -> Result<&[u8]> {
        let len = self.get_short(rec, 0)? as u16 as u64;
        let at = self.check(rec, 2, len, "string_bytes")?;
        Ok(&self.data[at..at + len as usize])
    }

    /// Byte-wise comparison of a stored string against an in-memory key.
    pub fn string_cmp(&self, rec: RecordRef, key: &[u8]) -> Result<Ordering> {
        Ok(self.string_bytes(rec)?.cmp(key))
    }

    pub fn free_string(&mut self, rec: RecordRef) -> Result<()> {
        self.free(rec)
    }

    // ---------------------------------------------------------------
    // Variable-length blocks: [u16 len][slot]*len
    // ---------------------------------------------------------------

    pub fn block_new(&mut self, slot_size: u32, len: u32) -> Result<RecordRef> {
        if len > max_block_len(slot_size) {
            return Err(PdomError::storage(format!(
                "block of {len} slots * {slot_size} bytes exceeds capacity"
            )));
        }
        let rec = self.malloc(BLOCK_LEN_PREFIX + len * slot_size)?;
        self.put_short(rec, 0, len as i16)?;
        Ok(rec)
    }

    /// Reads a block's length prefix. An out-of-range value is a
    /// format-integrity violation, not a recoverable condition.
    pub fn block_len(&self, rec: RecordRef, slot_size: u32) -> Result<u32> {
        let len = self.get_short(rec, 0)? as u16 as u32;
        assert!(
            len <= max_block_len(slot_size),
            "corrupt block at {:#x}: length {len} exceeds {} for {slot_size}-byte slots",
            rec.raw(),
            max_block_len(slot_size)
        );
        Ok(len)
    }

    fn slot_offset(slot_size: u32, index: u32, field: u64) -> u64 {
        BLOCK_LEN_PREFIX as u64 + index as u64 * slot_size as u64 + field
    }

    pub fn block_get_rec(
        &self,
        rec: RecordRef,
        slot_size: u32,
        index: u32,
        field: u64,
    ) -> Result<RecordRef> {
        self.get_rec(rec, Self::slot_offset(slot_size, index, field))
    }

    pub fn block_put_rec(
        &mut self,
        rec: RecordRef,
        slot_size: u32,
        index: u32,
        field: u64,
        value: RecordRef,
    ) -> Result<()> {
        self.put_rec(rec, Self::slot_offset(slot_size, index, field), value)
    }

    pub fn block_get_int(
        &self,
        rec: RecordRef,
        slot_size: u32,
        index: u32,
        field: u64,
    ) -> Result<i32> {
        self.get_int(rec, Self::slot_offset(slot_size, index, field))
    }

    pub fn block_put_int(
        &mut self,
        rec: RecordRef,
        slot_size: u32,
        index: u32,
        field: u64,
        value: i32,
    ) -> Result<()> {
        self.put_int(rec, Self::slot_offset(slot_size, index, field), value)
    }

    /// Raw byte payload access for opaque stored blobs.
    pub fn blob_bytes(&self, rec: RecordRef) -> Result<&[u8]> {
        self.string_bytes(rec)
    }

    pub fn new_blob(&mut self, bytes: &[u8]) -> Result<RecordRef> {
        self.new_string(bytes)
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malloc_never_returns_null() {
        let mut db = Database::new();
        let rec = db.malloc(16).unwrap();
        assert!(!rec.is_null());
    }

    #[test]
    fn test_scalar_round_trip() {
        let mut db = Database::new();
        let rec = db.malloc(32).unwrap();
        db.put_byte(rec, 0, 0xAB).unwrap();
        db.put_short(rec, 1, -1234).unwrap();
        db.put_int(rec, 3, -7_654_321).unwrap();
        db.put_long(rec, 7, i64::MIN + 5).unwrap();
        db.put_rec(rec, 15, RecordRef::from_raw(0xDEAD_BEEF)).unwrap();

        assert_eq!(db.get_byte(rec, 0).unwrap(), 0xAB);
        assert_eq!(db.get_short(rec, 1).unwrap(), -1234);
        assert_eq!(db.get_int(rec, 3).unwrap(), -7_654_321);
        assert_eq!(db.get_long(rec, 7).unwrap(), i64::MIN + 5);
        assert_eq!(db.get_rec(rec, 15).unwrap().raw(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_null_access_is_storage_fault() {
        let db = Database::new();
        assert!(matches!(
            db.get_int(RecordRef::NULL, 0),
            Err(PdomError::StorageFault(_))
        ));
    }

    #[test]
    fn test_free_list_reuse_same_size_class() {
        let mut db = Database::new();
        let a = db.malloc(24).unwrap();
        db.put_long(a, 8, 42).unwrap();
        db.free(a).unwrap();
        let b = db.malloc(24).unwrap();
        assert_eq!(a, b);
        // Reused blocks come back zeroed.
        assert_eq!(db.get_long(b, 8).unwrap(), 0);
    }

    #[test]
    fn test_tiny_blocks_carry_the_free_list_link() {
        let mut db = Database::new();
        // A 3-byte request still gets a body wide enough for the link a
        // later free() writes at offset 0.
        let tiny = db.malloc(3).unwrap();
        let neighbor = db.malloc(3).unwrap();
        db.put_byte(neighbor, 0, 0x5A).unwrap();
        db.free(tiny).unwrap();
        assert_eq!(db.get_byte(neighbor, 0).unwrap(), 0x5A);
        assert_eq!(db.malloc(3).unwrap(), tiny);
        // Freeing the last block in the arena must not run off the end.
        db.free(neighbor).unwrap();
    }

    #[test]
    fn test_free_null_is_noop() {
        let mut db = Database::new();
        db.free(RecordRef::NULL).unwrap();
    }

    #[test]
    fn test_string_round_trip_and_cmp() {
        let mut db = Database::new();
        let rec = db.new_string(b"operator<<").unwrap();
        assert_eq!(db.string_bytes(rec).unwrap(), b"operator<<");
        assert_eq!(db.string_cmp(rec, b"operator<<").unwrap(), Ordering::Equal);
        assert_eq!(db.string_cmp(rec, b"operator>>").unwrap(), Ordering::Less);
        assert_eq!(db.string_cmp(rec, b"abc").unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_block_boundary_lengths() {
        let mut db = Database::new();
        let max = max_block_len(8);
        let rec = db.block_new(8, max).unwrap();
        assert_eq!(db.block_len(rec, 8).unwrap(), max);
        assert!(db.block_new(8, max + 1).is_err());
    }

    #[test]
    fn test_malloc_rejects_oversize() {
        let mut db = Database::new();
        assert!(db.malloc(0).is_err());
        assert!(db.malloc(MAX_MALLOC_SIZE + 1).is_err());
    }
}
