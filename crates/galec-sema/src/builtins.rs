//! The builtins scope.
//!
//! Primitive operators are ordinary function declarations living in a
//! distinguished scope shared as the root parent of every module scope.
//! Overload resolution then treats `1 + 2` exactly like a user call: the
//! operator reference gets a disjunction over the overload set. The scope
//! also carries the fixed builtin functions the lowering relies on
//! (`builtin_eq` on unsigned 64-bit for pointer iteration) and the `String`
//! type alias.

use galec_ast::{
    Ast, DeclId, DeclKind, FloatWidth, FunctionDecl, ParamDecl, Signedness, TyId, Type, TypeArena,
    Visibility,
};
use galec_util::{Span, Symbol};

use crate::scope::{ScopeId, ScopeTree};

/// Binary operators defined for every numeric type, `(T, T) -> T`.
const ARITHMETIC_OPS: &[&str] = &["+", "-", "*", "/", "%"];
/// Comparison operators defined for every numeric type, `(T, T) -> Bool`.
const COMPARISON_OPS: &[&str] = &["==", "!=", "<", "<=", ">", ">="];
/// Bitwise operators defined for integer types, `(T, T) -> T`.
const BITWISE_OPS: &[&str] = &["&", "|", "^", "<<", ">>"];

/// The integer widths the builtins cover.
const INT_WIDTHS: &[u32] = &[8, 16, 32, 64];

/// Populate the builtins scope. Idempotent: a populated scope is left alone.
pub fn install_builtins(tree: &mut ScopeTree, ast: &mut Ast, types: &mut TypeArena) {
    let builtins = tree.builtins();
    if !tree.get(builtins).items.is_empty() {
        return;
    }

    let bool_ty = types.bool_ty();
    let char_ty = types.char_ty();

    // Integer operators.
    for &signedness in &[Signedness::Signed, Signedness::Unsigned] {
        for &width in INT_WIDTHS {
            let ty = types.int(signedness, width);
            install_numeric_ops(tree, ast, types, builtins, ty, bool_ty);
            for &op in BITWISE_OPS {
                let fn_ty = types.function(vec![ty, ty], ty);
                declare(tree, ast, builtins, op, fn_ty, &[ty, ty]);
            }
        }
    }

    // Float operators; no `%` or bitwise.
    for &width in &[FloatWidth::F16, FloatWidth::F32, FloatWidth::F64, FloatWidth::F80] {
        let ty = types.float(width);
        for &op in &["+", "-", "*", "/"] {
            let fn_ty = types.function(vec![ty, ty], ty);
            declare(tree, ast, builtins, op, fn_ty, &[ty, ty]);
        }
        for &op in COMPARISON_OPS {
            let fn_ty = types.function(vec![ty, ty], bool_ty);
            declare(tree, ast, builtins, op, fn_ty, &[ty, ty]);
        }
        let neg_ty = types.function(vec![ty], ty);
        declare(tree, ast, builtins, "-", neg_ty, &[ty]);
    }

    // Bool and Char.
    let not_ty = types.function(vec![bool_ty], bool_ty);
    declare(tree, ast, builtins, "!", not_ty, &[bool_ty]);
    for &op in &["==", "!="] {
        let bool_cmp = types.function(vec![bool_ty, bool_ty], bool_ty);
        declare(tree, ast, builtins, op, bool_cmp, &[bool_ty, bool_ty]);
        let char_cmp = types.function(vec![char_ty, char_ty], bool_ty);
        declare(tree, ast, builtins, op, char_cmp, &[char_ty, char_ty]);
    }

    // builtin_eq on UInt64, used for pointer comparison in array iteration.
    let u64 = types.uint64();
    let eq_ty = types.function(vec![u64, u64], bool_ty);
    declare(tree, ast, builtins, "builtin_eq", eq_ty, &[u64, u64]);

    // The String type: an alias for *Char.
    let char_ptr = types.raw_pointer(char_ty);
    let string_name = Symbol::intern("String");
    let string_ty = types.intern(Type::TypeAlias {
        name: string_name,
        aliased: char_ptr,
        decl: DeclId(u32::MAX),
    });
    tree.insert_type(builtins, string_name, string_ty, Visibility::Public);
}

fn install_numeric_ops(
    tree: &mut ScopeTree,
    ast: &mut Ast,
    types: &mut TypeArena,
    builtins: ScopeId,
    ty: TyId,
    bool_ty: TyId,
) {
    for &op in ARITHMETIC_OPS {
        let fn_ty = types.function(vec![ty, ty], ty);
        declare(tree, ast, builtins, op, fn_ty, &[ty, ty]);
    }
    for &op in COMPARISON_OPS {
        let fn_ty = types.function(vec![ty, ty], bool_ty);
        declare(tree, ast, builtins, op, fn_ty, &[ty, ty]);
    }
    let neg_ty = types.function(vec![ty], ty);
    declare(tree, ast, builtins, "-", neg_ty, &[ty]);
}

/// Declare one builtin overload as a bodyless function.
fn declare(
    tree: &mut ScopeTree,
    ast: &mut Ast,
    builtins: ScopeId,
    name: &str,
    fn_ty: TyId,
    param_tys: &[TyId],
) -> DeclId {
    let name = Symbol::intern(name);
    let params = param_tys
        .iter()
        .enumerate()
        .map(|(i, &ty)| {
            ast.add_decl(
                DeclKind::Param(ParamDecl {
                    name: Symbol::intern(&format!("arg{i}")),
                    ty,
                    default: None,
                }),
                Span::DUMMY,
            )
        })
        .collect();
    let decl = ast.add_decl(
        DeclKind::Function(FunctionDecl {
            name,
            visibility: Visibility::Public,
            ty: fn_ty,
            params,
            body: None,
        }),
        Span::DUMMY,
    );
    tree.insert_item(builtins, name, decl, Visibility::Public);
    decl
}

/// Find the builtin overload of `name` whose parameter list is exactly
/// `param_tys`.
pub fn lookup_builtin(
    tree: &ScopeTree,
    ast: &Ast,
    types: &TypeArena,
    name: &str,
    param_tys: &[TyId],
) -> Option<DeclId> {
    let decls = tree.lookup_item_local(tree.builtins(), Symbol::intern(name))?;
    decls.iter().map(|d| d.item).find(|&decl| {
        let Some(f) = ast.as_function(decl) else {
            return false;
        };
        match types.get(f.ty) {
            Type::Function { params, .. } => params.as_slice() == param_tys,
            _ => false,
        }
    })
}
