//! Kind classification for freshly resolved bindings.
//!
//! The order of the rules is load-bearing: a specialization of a class
//! still carries a class facet, a constructor still carries a function
//! facet, so the more specific rule must fire first or the binding is
//! silently misclassified. The ordering lives in one table rather than a
//! cascade of conditionals so it can be read, and pinned by a test, as
//! data.

use crate::node_type;
use pdom_ast::AstBinding;
use pdom_common::{PdomError, Result};

/// Everything a rule may look at.
pub struct ClassifyCtx<'a> {
    pub binding: &'a AstBinding,
    /// Whether the binding's owner is a class-ish scope.
    pub member_of_class: bool,
}

pub struct Rule {
    pub name: &'static str,
    pub matches: fn(&ClassifyCtx) -> bool,
    pub tag: fn(&ClassifyCtx) -> i16,
}

fn function_tag(ctx: &ClassifyCtx, constructor: i16, method: i16, function: i16) -> i16 {
    if ctx.binding.is_constructor() {
        constructor
    } else if ctx.member_of_class {
        method
    } else {
        function
    }
}

/// Most specific first. Specialization rules precede template rules,
/// template rules precede concrete kinds, constructor precedes method
/// precedes function.
pub static CLASSIFICATION_ORDER: &[Rule] = &[
    Rule {
        name: "template parameter",
        matches: |ctx| ctx.binding.template_parameter.is_some(),
        tag: |_| node_type::TEMPLATE_PARAMETER,
    },
    Rule {
        name: "partial specialization",
        matches: |ctx| ctx.binding.is_partial_specialization(),
        tag: |_| node_type::PARTIAL_SPECIALIZATION,
    },
    Rule {
        name: "class instance",
        matches: |ctx| ctx.binding.is_instance() && ctx.binding.class.is_some(),
        tag: |_| node_type::CLASS_INSTANCE,
    },
    Rule {
        name: "function instance",
        matches: |ctx| ctx.binding.is_instance() && ctx.binding.function.is_some(),
        tag: |ctx| {
            function_tag(
                ctx,
                node_type::CONSTRUCTOR_INSTANCE,
                node_type::METHOD_INSTANCE,
                node_type::FUNCTION_INSTANCE,
            )
        },
    },
    Rule {
        name: "variable instance",
        matches: |ctx| ctx.binding.is_instance() && ctx.binding.variable.is_some(),
        tag: |_| node_type::VARIABLE_INSTANCE,
    },
    Rule {
        name: "class specialization",
        matches: |ctx| ctx.binding.spec.is_some() && ctx.binding.class.is_some(),
        tag: |_| node_type::CLASS_SPECIALIZATION,
    },
    Rule {
        name: "function specialization",
        matches: |ctx| ctx.binding.spec.is_some() && ctx.binding.function.is_some(),
        tag: |ctx| {
            function_tag(
                ctx,
                node_type::CONSTRUCTOR_SPECIALIZATION,
                node_type::METHOD_SPECIALIZATION,
                node_type::FUNCTION_SPECIALIZATION,
            )
        },
    },
    Rule {
        name: "field specialization",
        matches: |ctx| ctx.binding.spec.is_some() && ctx.binding.variable.is_some(),
        tag: |_| node_type::FIELD_SPECIALIZATION,
    },
    Rule {
        name: "concept",
        matches: |ctx| ctx.binding.concept_constraint.is_some(),
        tag: |_| node_type::CONCEPT,
    },
    Rule {
        name: "class template",
        matches: |ctx| ctx.binding.template.is_some() && ctx.binding.class.is_some(),
        tag: |_| node_type::CLASS_TEMPLATE,
    },
    Rule {
        name: "function template",
        matches: |ctx| ctx.binding.template.is_some() && ctx.binding.function.is_some(),
        tag: |_| node_type::FUNCTION_TEMPLATE,
    },
    Rule {
        name: "variable template",
        matches: |ctx| ctx.binding.template.is_some() && ctx.binding.variable.is_some(),
        tag: |_| node_type::VARIABLE_TEMPLATE,
    },
    Rule {
        name: "alias template",
        matches: |ctx| ctx.binding.template.is_some() && ctx.binding.typedef.is_some(),
        tag: |_| node_type::ALIAS_TEMPLATE,
    },
    Rule {
        name: "class",
        matches: |ctx| ctx.binding.class.is_some(),
        tag: |_| node_type::CLASS_TYPE,
    },
    Rule {
        name: "function",
        matches: |ctx| ctx.binding.function.is_some(),
        tag: |ctx| function_tag(ctx, node_type::CONSTRUCTOR, node_type::METHOD, node_type::FUNCTION),
    },
    Rule {
        name: "enumeration",
        matches: |ctx| ctx.binding.enumeration.is_some(),
        tag: |_| node_type::ENUMERATION,
    },
    Rule {
        name: "enumerator",
        matches: |ctx| ctx.binding.enumerator.is_some(),
        tag: |_| node_type::ENUMERATOR,
    },
    Rule {
        name: "variable",
        matches: |ctx| ctx.binding.variable.is_some(),
        tag: |ctx| if ctx.member_of_class { node_type::FIELD } else { node_type::VARIABLE },
    },
    Rule {
        name: "typedef",
        matches: |ctx| ctx.binding.typedef.is_some(),
        tag: |_| node_type::TYPEDEF,
    },
    Rule {
        name: "namespace alias",
        matches: |ctx| ctx.binding.alias_target.is_some(),
        tag: |_| node_type::NAMESPACE_ALIAS,
    },
    Rule {
        name: "namespace",
        matches: |ctx| ctx.binding.is_namespace,
        tag: |_| node_type::NAMESPACE,
    },
];

/// The persisted kind tag for a binding, or a semantic fault when no rule
/// claims it.
pub fn classify(ctx: &ClassifyCtx) -> Result<i16> {
    for rule in CLASSIFICATION_ORDER {
        if (rule.matches)(ctx) {
            return Ok((rule.tag)(ctx));
        }
    }
    Err(PdomError::semantic("binding matches no classification rule"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdom_ast::{
        AstArena, ClassFacet, FunctionFacet, SpecFacet, TemplateFacet, DeclModifiers,
    };

    fn fn_facet(ast: &mut AstArena, is_constructor: bool) -> FunctionFacet {
        let void_t = ast.void_type();
        let fn_type = ast.function_type(void_t, vec![]);
        FunctionFacet {
            parameters: vec![],
            function_type: fn_type,
            required_args: 0,
            exception_spec: None,
            execution: None,
            is_constructor,
            modifiers: DeclModifiers::empty(),
        }
    }

    fn spec_facet() -> SpecFacet {
        SpecFacet {
            specialized: pdom_ast::BindingId(0),
            arguments: None,
            tparam_map: vec![],
            owns_map: false,
            primary: None,
        }
    }

    #[test]
    fn test_specialization_rules_precede_concrete_kinds() {
        let idx = |name: &str| {
            CLASSIFICATION_ORDER.iter().position(|r| r.name == name).unwrap()
        };
        assert!(idx("class specialization") < idx("class template"));
        assert!(idx("class specialization") < idx("class"));
        assert!(idx("function specialization") < idx("function"));
        assert!(idx("partial specialization") < idx("class specialization"));
        assert!(idx("class instance") < idx("class specialization"));
    }

    #[test]
    fn test_specialized_class_is_not_a_plain_class() {
        let binding = pdom_ast::AstBinding::named("S")
            .with_class(ClassFacet::default())
            .with_spec(spec_facet());
        let ctx = ClassifyCtx { binding: &binding, member_of_class: false };
        assert_eq!(classify(&ctx).unwrap(), node_type::CLASS_SPECIALIZATION);
    }

    #[test]
    fn test_constructor_before_method_before_function() {
        let mut ast = AstArena::new();
        let ctor = pdom_ast::AstBinding::named("C").with_function(fn_facet(&mut ast, true));
        let ctx = ClassifyCtx { binding: &ctor, member_of_class: true };
        assert_eq!(classify(&ctx).unwrap(), node_type::CONSTRUCTOR);

        let method = pdom_ast::AstBinding::named("m").with_function(fn_facet(&mut ast, false));
        let ctx = ClassifyCtx { binding: &method, member_of_class: true };
        assert_eq!(classify(&ctx).unwrap(), node_type::METHOD);

        let free = pdom_ast::AstBinding::named("f").with_function(fn_facet(&mut ast, false));
        let ctx = ClassifyCtx { binding: &free, member_of_class: false };
        assert_eq!(classify(&ctx).unwrap(), node_type::FUNCTION);
    }

    #[test]
    fn test_templated_class_is_a_class_template() {
        let binding = pdom_ast::AstBinding::named("T")
            .with_class(ClassFacet::default())
            .with_template(TemplateFacet::default());
        let ctx = ClassifyCtx { binding: &binding, member_of_class: false };
        assert_eq!(classify(&ctx).unwrap(), node_type::CLASS_TEMPLATE);
    }

    #[test]
    fn test_unclassifiable_binding_is_a_semantic_fault() {
        let binding = pdom_ast::AstBinding::named("x");
        let ctx = ClassifyCtx { binding: &binding, member_of_class: false };
        assert!(classify(&ctx).is_err());
    }
}
