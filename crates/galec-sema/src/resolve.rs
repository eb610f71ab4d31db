//! Resolution of `UnresolvedName` types.
//!
//! The parser leaves named types as `UnresolvedName` placeholders; once a
//! module's scopes exist, this mapper rewrites them to the types the names
//! denote, recursing through composite types. Failures are reported at the
//! span the caller supplies and leave the placeholder in place so downstream
//! stages see a consistent (if erroneous) tree.

use galec_ast::{Ast, DeclId, DeclKind, TyId, Type, TypeArena};
use galec_util::{DiagnosticHandler, Span};

use crate::scope::{ScopeId, ScopeTree};

/// Rewrite every `UnresolvedName` inside `ty` via scope lookup.
pub fn resolve_type(
    types: &mut TypeArena,
    scopes: &ScopeTree,
    scope: ScopeId,
    ty: TyId,
    span: Span,
    handler: &DiagnosticHandler,
) -> TyId {
    match types.get(ty).clone() {
        Type::UnresolvedName { ident } => match scopes.lookup_type(scope, &ident) {
            Some(resolved) => resolved,
            None => {
                handler.error(span, format!("unresolved type '{ident}'"));
                ty
            }
        },
        Type::Pointer { pointee, kind } => {
            let new = resolve_type(types, scopes, scope, pointee, span, handler);
            if new == pointee {
                ty
            } else {
                types.pointer(new, kind)
            }
        }
        Type::StaticArray { elem, size } => {
            let new = resolve_type(types, scopes, scope, elem, span, handler);
            if new == elem {
                ty
            } else {
                types.static_array(new, size)
            }
        }
        Type::DynamicArray { elem } => {
            let new = resolve_type(types, scopes, scope, elem, span, handler);
            if new == elem {
                ty
            } else {
                types.intern(Type::DynamicArray { elem: new })
            }
        }
        Type::Function {
            params,
            ret,
            c_variadic,
        } => {
            let new_params: Vec<TyId> = params
                .iter()
                .map(|&p| resolve_type(types, scopes, scope, p, span, handler))
                .collect();
            let new_ret = resolve_type(types, scopes, scope, ret, span, handler);
            if new_params == params && new_ret == ret {
                ty
            } else {
                types.intern(Type::Function {
                    params: new_params,
                    ret: new_ret,
                    c_variadic,
                })
            }
        }
        Type::Struct {
            decl,
            template_args,
        } => {
            let new_args: Vec<TyId> = template_args
                .iter()
                .map(|&a| resolve_type(types, scopes, scope, a, span, handler))
                .collect();
            if new_args == template_args {
                ty
            } else {
                types.intern(Type::Struct {
                    decl,
                    template_args: new_args,
                })
            }
        }
        _ => ty,
    }
}

/// Resolve the names in every declaration signature of a module.
///
/// Covers function types, parameter and field types, declared var/let types,
/// and alias targets. Expression type slots are handled later, when the
/// solver commits a solution.
pub fn resolve_decl_signatures(
    types: &mut TypeArena,
    ast: &mut Ast,
    scopes: &ScopeTree,
    scope: ScopeId,
    decls: &[DeclId],
    handler: &DiagnosticHandler,
) {
    for &decl in decls {
        let span = ast.decls[decl].span;
        match &ast.decls[decl].kind {
            DeclKind::Function(f) => {
                let ty = f.ty;
                let params = f.params.clone();
                let new_ty = resolve_type(types, scopes, scope, ty, span, handler);
                if let DeclKind::Function(f) = &mut ast.decls[decl].kind {
                    f.ty = new_ty;
                }
                resolve_decl_signatures(types, ast, scopes, scope, &params, handler);
            }
            DeclKind::Param(p) => {
                let ty = p.ty;
                let new_ty = resolve_type(types, scopes, scope, ty, span, handler);
                if let DeclKind::Param(p) = &mut ast.decls[decl].kind {
                    p.ty = new_ty;
                }
            }
            DeclKind::Field(f) => {
                let ty = f.ty;
                let new_ty = resolve_type(types, scopes, scope, ty, span, handler);
                if let DeclKind::Field(f) = &mut ast.decls[decl].kind {
                    f.ty = new_ty;
                }
            }
            DeclKind::VarLet(v) => {
                if let Some(ty) = v.ty {
                    let new_ty = resolve_type(types, scopes, scope, ty, span, handler);
                    if let DeclKind::VarLet(v) = &mut ast.decls[decl].kind {
                        v.ty = Some(new_ty);
                    }
                }
            }
            DeclKind::Struct(s) => {
                let fields = s.fields.clone();
                resolve_decl_signatures(types, ast, scopes, scope, &fields, handler);
            }
            DeclKind::Namespace(n) => {
                let children = n.decls.clone();
                resolve_decl_signatures(types, ast, scopes, scope, &children, handler);
            }
            DeclKind::TypeAlias(_) | DeclKind::Enum(_) | DeclKind::Import(_)
            | DeclKind::Module(_) => {}
        }
    }
}
