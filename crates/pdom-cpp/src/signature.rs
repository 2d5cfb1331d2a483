//! Canonical signatures and the overload-disambiguation hash.
//!
//! Overloaded functions and template instances coexist under one name in a
//! scope index; they are told apart by a 32-bit hash of the canonical
//! signature string (parameter types for functions, template arguments for
//! instances and partial specializations). The hash is computed once at
//! construction and stored; comparisons never recompute it.
//!
//! If signature computation hits an unresolvable (dependent) type, the hash
//! is 0 and a diagnostic is logged; collisions that result are resolved by
//! structural comparison at the visitor level, never silently merged.

use crate::node_type;
use crate::records::{self, signature_hash_field};
use pdom_ast::{
    AstArena, AstBinding, AstTemplateArg, AstType, AstValue, BasicKind, TypeId, basic_modifiers,
};
use pdom_common::{PdomError, RecordRef, Result};
use pdom_db::{Database, IndexComparator};
use std::cmp::Ordering;
use std::fmt::Write;
use tracing::debug;

/// FNV-1a over the canonical signature string, truncated to i32.
pub fn hash(signature: &str) -> i32 {
    let mut acc: u32 = 0x811c_9dc5;
    for byte in signature.bytes() {
        acc ^= byte as u32;
        acc = acc.wrapping_mul(0x0100_0193);
    }
    acc as i32
}

/// Appends the canonical form of a type. Fails with a semantic fault on the
/// problem marker so callers can fall back to hash 0.
pub fn append_type(ast: &AstArena, ty: TypeId, out: &mut String) -> Result<()> {
    match ast.ty(ty) {
        AstType::Basic { kind, modifiers } => {
            if modifiers & basic_modifiers::UNSIGNED != 0 {
                out.push_str("unsigned ");
            }
            if modifiers & basic_modifiers::SIGNED != 0 {
                out.push_str("signed ");
            }
            if modifiers & basic_modifiers::SHORT != 0 {
                out.push_str("short ");
            }
            if modifiers & basic_modifiers::LONG_LONG != 0 {
                out.push_str("long long ");
            } else if modifiers & basic_modifiers::LONG != 0 {
                out.push_str("long ");
            }
            out.push_str(basic_name(*kind));
            Ok(())
        }
        AstType::Pointer(inner) => {
            append_type(ast, *inner, out)?;
            out.push('*');
            Ok(())
        }
        AstType::Reference { rvalue, inner } => {
            append_type(ast, *inner, out)?;
            out.push_str(if *rvalue { "&&" } else { "&" });
            Ok(())
        }
        AstType::CvQualified { is_const, is_volatile, inner } => {
            if *is_const {
                out.push_str("const ");
            }
            if *is_volatile {
                out.push_str("volatile ");
            }
            append_type(ast, *inner, out)
        }
        AstType::Array { element, size } => {
            append_type(ast, *element, out)?;
            out.push('[');
            if let Some(size) = size
                && let AstValue::Integral(n) = ast.value(*size)
            {
                write!(out, "{n}").ok();
            }
            out.push(']');
            Ok(())
        }
        AstType::Function { return_type, parameters, takes_varargs } => {
            append_type(ast, *return_type, out)?;
            out.push('(');
            for (i, param) in parameters.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                append_type(ast, *param, out)?;
            }
            if *takes_varargs {
                out.push_str(",...");
            }
            out.push(')');
            Ok(())
        }
        AstType::PackExpansion(pattern) => {
            append_type(ast, *pattern, out)?;
            out.push_str("...");
            Ok(())
        }
        AstType::TemplateParameter { param_id } => {
            write!(out, "#{param_id}").ok();
            Ok(())
        }
        AstType::Binding(binding) => {
            append_qualified_name(ast, ast.binding(*binding), out);
            Ok(())
        }
        AstType::Problem => Err(PdomError::semantic("signature over unresolved type")),
    }
}

fn basic_name(kind: BasicKind) -> &'static str {
    match kind {
        BasicKind::Unspecified | BasicKind::Int => "int",
        BasicKind::Void => "void",
        BasicKind::Bool => "bool",
        BasicKind::Char => "char",
        BasicKind::WChar => "wchar_t",
        BasicKind::Char8 => "char8_t",
        BasicKind::Char16 => "char16_t",
        BasicKind::Char32 => "char32_t",
        BasicKind::Float => "float",
        BasicKind::Double => "double",
        BasicKind::Nullptr => "std::nullptr_t",
    }
}

fn append_qualified_name(ast: &AstArena, binding: &AstBinding, out: &mut String) {
    if let Some(owner) = binding.owner {
        append_qualified_name(ast, ast.binding(owner), out);
        out.push_str("::");
    }
    out.push_str(&binding.name);
}

/// `(T1,T2,...)` for a parameter-type list.
pub fn function_signature(ast: &AstArena, parameter_types: &[TypeId]) -> Result<String> {
    let mut out = String::from("(");
    for (i, ty) in parameter_types.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        append_type(ast, *ty, &mut out)?;
    }
    out.push(')');
    Ok(out)
}

/// `<A1,A2,...>` for a template-argument list. Also the canonical instance
/// cache key.
pub fn template_args_signature(ast: &AstArena, args: &[AstTemplateArg]) -> Result<String> {
    let mut out = String::from("<");
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        match arg {
            AstTemplateArg::Type(ty) => append_type(ast, *ty, &mut out)?,
            AstTemplateArg::NonType { value, .. } => match value {
                AstValue::Integral(n) => {
                    write!(out, "{n}").ok();
                }
                AstValue::Text(text) => out.push_str(text),
                AstValue::Unknown => {
                    return Err(PdomError::semantic("signature over unknown value"));
                }
            },
        }
    }
    out.push('>');
    Ok(out)
}

/// The stored hash for a binding about to be persisted. Instances and
/// partial specializations hash their argument list; function kinds hash
/// their parameter types. Everything else has no signature hash.
///
/// A semantic fault during hashing degrades to 0 with a diagnostic.
pub fn compute_hash(ast: &AstArena, binding: &AstBinding) -> i32 {
    let computed = signature_of(ast, binding);
    match computed {
        Ok(Some(signature)) => hash(&signature),
        Ok(None) => 0,
        Err(fault) => {
            debug!(name = %binding.name, %fault, "signature hash unavailable, using 0");
            0
        }
    }
}

fn signature_of(ast: &AstArena, binding: &AstBinding) -> Result<Option<String>> {
    if let Some(spec) = &binding.spec
        && let Some(args) = &spec.arguments
    {
        return Ok(Some(template_args_signature(ast, args)?));
    }
    if let Some(function) = &binding.function {
        let types: Vec<TypeId> = function.parameters.iter().map(|p| p.param_type).collect();
        return Ok(Some(function_signature(ast, &types)?));
    }
    Ok(None)
}

/// Reads the stored signature hash of a persisted binding, if its kind has
/// one.
pub fn stored_hash(db: &Database, rec: RecordRef) -> Result<Option<i32>> {
    let tag = records::node_tag(db, rec)?;
    match signature_hash_field(tag) {
        Some(offset) => Ok(Some(db.get_int(rec, offset)?)),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------
// Index comparator
// ---------------------------------------------------------------------

/// Total order for scope index trees: name bytes, then kind tag, then — for
/// overloadable kinds on both sides — signature hash. Hash equality means
/// "same slot": duplicates chain in the tree and are separated structurally
/// by the visitor.
pub struct CppBindingComparator;

impl IndexComparator for CppBindingComparator {
    fn compare(&self, db: &Database, a: RecordRef, b: RecordRef) -> Result<Ordering> {
        let name_order = records::name_bytes(db, a)?.cmp(records::name_bytes(db, b)?);
        if name_order != Ordering::Equal {
            return Ok(name_order);
        }
        let tag_a = records::node_tag(db, a)?;
        let tag_b = records::node_tag(db, b)?;
        let tag_order = tag_a.cmp(&tag_b);
        if tag_order != Ordering::Equal {
            return Ok(tag_order);
        }
        if node_type::is_overloadable(tag_a) && node_type::is_overloadable(tag_b) {
            let hash_a = stored_hash(db, a)?.unwrap_or(0);
            let hash_b = stored_hash(db, b)?.unwrap_or(0);
            return Ok(hash_a.cmp(&hash_b));
        }
        Ok(Ordering::Equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdom_ast::AstArena;

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash("(int)"), hash("(int)"));
        assert_ne!(hash("(int)"), hash("(double)"));
    }

    #[test]
    fn test_function_signature_text() {
        let mut ast = AstArena::new();
        let int_t = ast.int_type();
        let double_t = ast.basic_type(BasicKind::Double);
        let ptr = ast.add_type(AstType::Pointer(double_t));
        let sig = function_signature(&ast, &[int_t, ptr]).unwrap();
        assert_eq!(sig, "(int,double*)");
    }

    #[test]
    fn test_problem_type_is_semantic_fault() {
        let mut ast = AstArena::new();
        let problem = ast.add_type(AstType::Problem);
        assert!(function_signature(&ast, &[problem]).is_err());
    }

    #[test]
    fn test_compute_hash_degrades_to_zero() {
        let mut ast = AstArena::new();
        let problem = ast.add_type(AstType::Problem);
        let fn_type = ast.function_type(problem, vec![problem]);
        let binding = AstBinding::named("f").with_function(pdom_ast::FunctionFacet {
            parameters: vec![pdom_ast::AstParam {
                name: "a".into(),
                param_type: problem,
                default_value: None,
                is_pack: false,
            }],
            function_type: fn_type,
            required_args: 1,
            exception_spec: None,
            execution: None,
            is_constructor: false,
            modifiers: pdom_ast::DeclModifiers::empty(),
        });
        assert_eq!(compute_hash(&ast, &binding), 0);
    }

    #[test]
    fn test_template_args_signature() {
        let mut ast = AstArena::new();
        let int_t = ast.int_type();
        let sig = template_args_signature(
            &ast,
            &[
                AstTemplateArg::Type(int_t),
                AstTemplateArg::NonType { value: AstValue::Integral(3), value_type: int_t },
            ],
        )
        .unwrap();
        assert_eq!(sig, "<int,3>");
    }
}
