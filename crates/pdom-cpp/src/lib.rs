//! C++ binding layer of the pdom persisted index.
//!
//! This crate persists resolved C++ declarations as typed records over the
//! `pdom-db` byte arena and reconstructs lightweight wrappers on demand.
//! The main pieces:
//!
//! - **`linkage`**: the single write entry point. Consumes resolved name
//!   occurrences, resolves owner scope chains, classifies, creates or
//!   updates records, drains deferred configuration, and synthesizes
//!   implicit special members for class definitions.
//! - **`records`**: one module per record kind, each declaring its byte
//!   layout as offset constants, plus the capability tables shared field
//!   groups are addressed through.
//! - **`specialize`**: lazy member specialization and template
//!   instantiation with first-writer-wins publication.
//! - **`cache`**: the explicit per-record cache registry (member maps,
//!   base lists, enum bounds, specialization and instance maps).
//!
//! Invariants worth knowing: a created record is reachable from its parent
//! before `add_binding` returns; unknown persisted kind tags panic rather
//! than answer plausibly; accessors on damaged detail fields log and fall
//! back to documented defaults instead of failing the caller.

pub mod annotation;
pub mod args;
pub mod cache;
pub mod classify;
pub mod defer;
pub mod linkage;
pub mod marshal;
pub mod node_type;
pub mod records;
pub mod scope;
pub mod signature;
pub mod specialize;

pub use cache::{CacheRegistry, CacheSlot};
pub use linkage::CppLinkage;
pub use marshal::{BindingRefs, PdomTemplateArg, PdomType, PdomValue};
pub use records::{PdomNode, get_node};
pub use specialize::{SpecializationContext, SpecializedMember};
