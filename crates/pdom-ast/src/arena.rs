//! Arena storage for resolved bindings, types, values, and names.
//!
//! Ids are plain u32 newtypes; the arena is append-only for the lifetime of
//! one indexing pass, which is all the binding layer needs (it captures
//! AST-derived values eagerly, while the arena is still valid).

use crate::binding::{AstBinding, AstName, NameKind};
use crate::types::{AstType, AstValue, BasicKind};

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(
    /// Id of a resolved binding in the arena.
    BindingId
);
arena_id!(
    /// Id of a resolved type in the arena.
    TypeId
);
arena_id!(
    /// Id of a resolved constant value in the arena.
    ValueId
);
arena_id!(
    /// Id of a resolved name occurrence in the arena.
    NameId
);

#[derive(Debug, Default)]
pub struct AstArena {
    bindings: Vec<AstBinding>,
    types: Vec<AstType>,
    values: Vec<AstValue>,
    names: Vec<AstName>,
}

impl AstArena {
    pub fn new() -> Self {
        AstArena::default()
    }

    pub fn add_binding(&mut self, binding: AstBinding) -> BindingId {
        let id = BindingId(self.bindings.len() as u32);
        self.bindings.push(binding);
        id
    }

    pub fn binding(&self, id: BindingId) -> &AstBinding {
        &self.bindings[id.index()]
    }

    pub fn binding_mut(&mut self, id: BindingId) -> &mut AstBinding {
        &mut self.bindings[id.index()]
    }

    pub fn add_type(&mut self, ty: AstType) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    pub fn ty(&self, id: TypeId) -> &AstType {
        &self.types[id.index()]
    }

    pub fn add_value(&mut self, value: AstValue) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(value);
        id
    }

    pub fn value(&self, id: ValueId) -> &AstValue {
        &self.values[id.index()]
    }

    pub fn add_name(&mut self, name: AstName) -> NameId {
        let id = NameId(self.names.len() as u32);
        self.names.push(name);
        id
    }

    pub fn name(&self, id: NameId) -> &AstName {
        &self.names[id.index()]
    }

    // -----------------------------------------------------------------
    // Conveniences used heavily by fixtures and the marshaling layer
    // -----------------------------------------------------------------

    pub fn basic_type(&mut self, kind: BasicKind) -> TypeId {
        self.add_type(AstType::Basic { kind, modifiers: 0 })
    }

    pub fn int_type(&mut self) -> TypeId {
        self.basic_type(BasicKind::Int)
    }

    pub fn void_type(&mut self) -> TypeId {
        self.basic_type(BasicKind::Void)
    }

    pub fn function_type(&mut self, return_type: TypeId, parameters: Vec<TypeId>) -> TypeId {
        self.add_type(AstType::Function { return_type, parameters, takes_varargs: false })
    }

    pub fn definition_name(&mut self, binding: BindingId) -> NameId {
        self.add_name(AstName { binding, kind: NameKind::Definition, composite_type_spec: false })
    }

    pub fn declaration_name(&mut self, binding: BindingId) -> NameId {
        self.add_name(AstName { binding, kind: NameKind::Declaration, composite_type_spec: false })
    }

    pub fn reference_name(&mut self, binding: BindingId) -> NameId {
        self.add_name(AstName { binding, kind: NameKind::Reference, composite_type_spec: false })
    }
}
