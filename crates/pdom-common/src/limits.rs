//! Centralized size limits for the storage format.
//!
//! These are format constants, not tuning knobs: changing any of them after
//! databases exist in the wild is a compatibility break.

/// Largest single allocation the database will hand out, including the
/// block header. Mirrors the chunk-bounded allocator of the storage engine.
pub const MAX_MALLOC_SIZE: u32 = 4096 - 2;

/// Size of one allocation chunk in the paged arena.
pub const CHUNK_SIZE: u32 = 4096;

/// Number of member slots in one class member block.
pub const MEMBER_BLOCK_CAPACITY: usize = 4;

/// Length-prefix width shared by strings and variable-length blocks.
pub const BLOCK_LEN_PREFIX: u32 = 2;

/// Maximum element count for a variable-length block of `slot_size`-byte
/// slots: `[u16 len][slot]*len` must fit in one allocation.
pub const fn max_block_len(slot_size: u32) -> u32 {
    (MAX_MALLOC_SIZE - BLOCK_LEN_PREFIX) / slot_size
}
