//! Common types and utilities shared by the pdom crates.
//!
//! This crate provides the foundational pieces every layer of the persisted
//! index depends on:
//! - `RecordRef`, the stable 64-bit record pointer newtype
//! - The `PdomError` fault taxonomy and `Result` alias
//! - Centralized size limits for the storage format

pub mod error;
pub use error::{PdomError, Result};

pub mod record;
pub use record::RecordRef;

pub mod limits;
