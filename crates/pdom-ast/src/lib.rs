//! Resolved-AST collaborator model.
//!
//! The binding layer persists *already-resolved* C++ declarations; it never
//! parses anything. This crate is the producer-side model it consumes: an
//! arena of resolved bindings, types, and values, addressed by id newtypes.
//!
//! Bindings use a capability-set design rather than an inheritance lattice:
//! one record per entity with optional facets (function, class, variable,
//! enumeration, template, specialization, ...). A binding that is
//! simultaneously a specialization, a function, and a member carries all
//! three facets; the persist-side classifier checks facets in a fixed,
//! documented precedence order.

pub mod arena;
pub use arena::{AstArena, BindingId, NameId, TypeId, ValueId};

pub mod binding;
pub use binding::{
    AstBase, AstBinding, AstName, AstParam, AstTemplateArg, AstTemplateParam, ClassFacet,
    ClassKey, DeclModifiers, EnumFacet, EnumeratorFacet, FunctionFacet, ImplicitSet, NameKind,
    SpecFacet, TemplateFacet, TemplateParamKind, TypedefFacet, VariableFacet, Visibility,
};

pub mod types;
pub use types::{AstType, AstValue, BasicKind, basic_modifiers};
