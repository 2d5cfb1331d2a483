//! Resolved binding model: capability facets over a single entity record.
//!
//! The facets a binding carries decide how it persists. A member function of
//! a class template instance carries `function` + `spec` facets; the
//! classifier in `pdom-cpp` checks the specialization facets before the
//! concrete-kind facets, so it lands on the method-instance record kind
//! rather than a plain function.

use crate::arena::{BindingId, TypeId, ValueId};
use crate::types::AstValue;
use bitflags::bitflags;
use smallvec::SmallVec;

/// Member accessibility / base visibility. `Unspecified` is the lookup
/// fallback when a member is not found in a local member block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    Public,
    Protected,
    Private,
    #[default]
    Unspecified,
}

impl Visibility {
    pub const fn as_bits(self) -> u8 {
        match self {
            Visibility::Unspecified => 0,
            Visibility::Public => 1,
            Visibility::Protected => 2,
            Visibility::Private => 3,
        }
    }

    pub const fn from_bits(raw: u8) -> Visibility {
        match raw & 0x3 {
            1 => Visibility::Public,
            2 => Visibility::Protected,
            3 => Visibility::Private,
            _ => Visibility::Unspecified,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassKey {
    #[default]
    Class,
    Struct,
    Union,
}

impl ClassKey {
    pub const fn as_u8(self) -> u8 {
        match self {
            ClassKey::Class => 0,
            ClassKey::Struct => 1,
            ClassKey::Union => 2,
        }
    }

    pub const fn from_u8(raw: u8) -> ClassKey {
        match raw {
            1 => ClassKey::Struct,
            2 => ClassKey::Union,
            _ => ClassKey::Class,
        }
    }
}

bitflags! {
    /// Declaration modifiers as resolved by the parser. This is the
    /// in-memory set; the persisted bitfield layout is a separate, packed
    /// wire format owned by `pdom-cpp::annotation`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DeclModifiers: u32 {
        const STATIC = 1 << 0;
        const EXTERN = 1 << 1;
        const EXTERN_C = 1 << 2;
        const AUTO_STORAGE = 1 << 3;
        const REGISTER = 1 << 4;
        const MUTABLE = 1 << 5;
        const INLINE = 1 << 6;
        const VIRTUAL = 1 << 7;
        const PURE_VIRTUAL = 1 << 8;
        const OVERRIDE = 1 << 9;
        const FINAL = 1 << 10;
        const EXPLICIT = 1 << 11;
        const CONSTEXPR = 1 << 12;
        const DELETED = 1 << 13;
        const NO_RETURN = 1 << 14;
        const VARARGS = 1 << 15;
        const PARAMETER_PACK = 1 << 16;
        const DESTRUCTOR = 1 << 17;
        /// Compiler-synthesized special member (implicit ctor/dtor/assign).
        const IMPLICIT = 1 << 18;
        const CONST_METHOD = 1 << 19;
        const VOLATILE_METHOD = 1 << 20;
        const HAS_DEFAULT_VALUE = 1 << 21;
    }
}

bitflags! {
    /// The set of implicit special members a class definition implies.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ImplicitSet: u8 {
        const DEFAULT_CTOR = 1 << 0;
        const COPY_CTOR = 1 << 1;
        const MOVE_CTOR = 1 << 2;
        const COPY_ASSIGN = 1 << 3;
        const MOVE_ASSIGN = 1 << 4;
        const DESTRUCTOR = 1 << 5;
    }
}

/// One occurrence of a resolved name in a translation unit. This is what
/// `add_binding` consumes.
#[derive(Debug, Clone, Copy)]
pub struct AstName {
    pub binding: BindingId,
    pub kind: NameKind,
    /// True when the occurrence is reached through a composite-type
    /// specifier (a class-member definition context). Feeds `should_update`.
    pub composite_type_spec: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Definition,
    Declaration,
    Reference,
}

#[derive(Debug, Clone)]
pub struct AstParam {
    pub name: String,
    pub param_type: TypeId,
    pub default_value: Option<ValueId>,
    pub is_pack: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct AstBase {
    pub base_type: TypeId,
    pub visibility: Visibility,
    pub is_virtual: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateParamKind {
    Type,
    NonType,
    Template,
}

impl TemplateParamKind {
    pub const fn as_u8(self) -> u8 {
        match self {
            TemplateParamKind::Type => 0,
            TemplateParamKind::NonType => 1,
            TemplateParamKind::Template => 2,
        }
    }

    pub const fn from_u8(raw: u8) -> TemplateParamKind {
        match raw {
            1 => TemplateParamKind::NonType,
            2 => TemplateParamKind::Template,
            _ => TemplateParamKind::Type,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AstTemplateParam {
    pub name: String,
    pub kind: TemplateParamKind,
    pub is_pack: bool,
    pub default_argument: Option<AstTemplateArg>,
    /// Stable parameter id: nesting level in the high 16 bits, position in
    /// the low 16.
    pub param_id: i32,
}

/// A resolved template argument: a type, or a non-type constant with its
/// type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AstTemplateArg {
    Type(TypeId),
    NonType { value: AstValue, value_type: TypeId },
}

// ---------------------------------------------------------------------
// Facets
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ClassFacet {
    pub key: ClassKey,
    pub is_final: bool,
    pub is_anonymous: bool,
    pub bases: Vec<AstBase>,
    /// Implicit special members this definition implies; the linkage diffs
    /// this against what is already persisted.
    pub implicit: ImplicitSet,
}

#[derive(Debug, Clone)]
pub struct FunctionFacet {
    pub parameters: Vec<AstParam>,
    /// The `AstType::Function` describing this function's type.
    pub function_type: TypeId,
    pub required_args: u16,
    /// `None` means no exception specification was declared.
    pub exception_spec: Option<Vec<TypeId>>,
    /// Opaque serialized constexpr body, marshaled as-is.
    pub execution: Option<Vec<u8>>,
    pub is_constructor: bool,
    pub modifiers: DeclModifiers,
}

#[derive(Debug, Clone)]
pub struct VariableFacet {
    pub var_type: TypeId,
    pub value: Option<ValueId>,
    pub modifiers: DeclModifiers,
}

#[derive(Debug, Clone, Default)]
pub struct EnumFacet {
    pub scoped: bool,
    pub opaque: bool,
    pub underlying: Option<TypeId>,
}

#[derive(Debug, Clone)]
pub struct EnumeratorFacet {
    pub value: Option<ValueId>,
}

#[derive(Debug, Clone)]
pub struct TypedefFacet {
    pub target_type: TypeId,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateFacet {
    pub parameters: Vec<AstTemplateParam>,
}

/// Specialization facet: present on explicit specializations, members of
/// specialized owners, instances, and partial specializations.
#[derive(Debug, Clone)]
pub struct SpecFacet {
    /// The original, unspecialized binding. Never a specialization itself.
    pub specialized: BindingId,
    /// `Some` for template instances and partial specializations; the
    /// concrete (or partially concrete) argument list.
    pub arguments: Option<Vec<AstTemplateArg>>,
    /// Parameter-id -> argument map for substitution.
    pub tparam_map: Vec<(i32, AstTemplateArg)>,
    /// Whether this binding owns its map or defers to its owner's.
    /// Exactly one of the two holds for any specialization.
    pub owns_map: bool,
    /// For partial specializations: the primary template.
    pub primary: Option<BindingId>,
}

// ---------------------------------------------------------------------
// The binding record
// ---------------------------------------------------------------------

/// One resolved C++ entity. The facets present decide its persisted kind.
#[derive(Debug, Clone, Default)]
pub struct AstBinding {
    pub name: String,
    pub owner: Option<BindingId>,
    pub visibility: Visibility,
    pub modifiers: DeclModifiers,

    pub class: Option<ClassFacet>,
    pub function: Option<FunctionFacet>,
    pub variable: Option<VariableFacet>,
    pub enumeration: Option<EnumFacet>,
    pub enumerator: Option<EnumeratorFacet>,
    pub typedef: Option<TypedefFacet>,
    pub template: Option<TemplateFacet>,
    pub template_parameter: Option<AstTemplateParam>,
    pub spec: Option<SpecFacet>,
    /// Namespace facet: `true` marks the binding as a namespace.
    pub is_namespace: bool,
    /// Namespace-alias target.
    pub alias_target: Option<BindingId>,
    /// Concept facet: constraint expression blob.
    pub concept_constraint: Option<Vec<u8>>,
}

impl AstBinding {
    pub fn named(name: impl Into<String>) -> AstBinding {
        AstBinding { name: name.into(), ..AstBinding::default() }
    }

    pub fn with_owner(mut self, owner: BindingId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_class(mut self, facet: ClassFacet) -> Self {
        self.class = Some(facet);
        self
    }

    pub fn with_function(mut self, facet: FunctionFacet) -> Self {
        self.function = Some(facet);
        self
    }

    pub fn with_variable(mut self, facet: VariableFacet) -> Self {
        self.variable = Some(facet);
        self
    }

    pub fn with_enumeration(mut self, facet: EnumFacet) -> Self {
        self.enumeration = Some(facet);
        self
    }

    pub fn with_enumerator(mut self, facet: EnumeratorFacet) -> Self {
        self.enumerator = Some(facet);
        self
    }

    pub fn with_typedef(mut self, facet: TypedefFacet) -> Self {
        self.typedef = Some(facet);
        self
    }

    pub fn with_template(mut self, facet: TemplateFacet) -> Self {
        self.template = Some(facet);
        self
    }

    pub fn with_spec(mut self, facet: SpecFacet) -> Self {
        self.spec = Some(facet);
        self
    }

    pub fn as_namespace(mut self) -> Self {
        self.is_namespace = true;
        self
    }

    pub fn with_modifiers(mut self, modifiers: DeclModifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Template instance: a specialization with concrete arguments.
    pub fn is_instance(&self) -> bool {
        self.spec.as_ref().is_some_and(|s| s.arguments.is_some() && s.primary.is_none())
    }

    pub fn is_partial_specialization(&self) -> bool {
        self.spec.as_ref().is_some_and(|s| s.primary.is_some())
    }

    pub fn is_constructor(&self) -> bool {
        self.function.as_ref().is_some_and(|f| f.is_constructor)
    }

    /// Parameter bindings never persist on their own; they hang off their
    /// owning function's parameter list.
    pub fn name_bytes(&self) -> &[u8] {
        self.name.as_bytes()
    }

    /// Names of all facets present, most specific first. Diagnostic only.
    pub fn facet_names(&self) -> SmallVec<[&'static str; 4]> {
        let mut out = SmallVec::new();
        if self.spec.is_some() {
            out.push("spec");
        }
        if self.template.is_some() {
            out.push("template");
        }
        if self.class.is_some() {
            out.push("class");
        }
        if self.function.is_some() {
            out.push("function");
        }
        if self.variable.is_some() {
            out.push("variable");
        }
        if self.enumeration.is_some() {
            out.push("enumeration");
        }
        if self.enumerator.is_some() {
            out.push("enumerator");
        }
        if self.typedef.is_some() {
            out.push("typedef");
        }
        if self.is_namespace {
            out.push("namespace");
        }
        out
    }
}
