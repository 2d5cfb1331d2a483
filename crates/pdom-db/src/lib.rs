//! Storage collaborator for the persisted index.
//!
//! This crate is the database side of the pdom: a paged byte arena with
//! malloc/free and scalar accessors, length-prefixed strings and
//! variable-length blocks, and an on-database binary search tree with a
//! pluggable comparator and a visitor accept protocol.
//!
//! The semantic layer above never does offset arithmetic on a `RecordRef`;
//! every field access goes through the `(record, offset)` accessors here.

pub mod db;
pub use db::Database;

pub mod tree;
pub use tree::{IndexComparator, IndexVisitor};
