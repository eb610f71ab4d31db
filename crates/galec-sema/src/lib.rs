//! galec-sema - Semantic analysis for the Gale compiler
//!
//! Name resolution across modules and imports, and Hindley-Milner style
//! type inference with overload resolution, implicit conversions, and
//! literal defaulting. The entry point is [`analyze_module`]: it builds the
//! module's scope tables (resolving imports on the way), rewrites
//! unresolved type names, and then solves constraints per top-level
//! statement, committing inferred types back onto the AST in place.

pub mod builtins;
pub mod constraint;
pub mod gen;
pub mod imports;
pub mod resolve;
pub mod scope;
pub mod solver;

use galec_ast::{DeclId, DeclKind};
use galec_util::FileId;

pub use constraint::{Constraint, ConstraintKind, ConversionRestriction};
pub use gen::BodyChecker;
pub use imports::{ImportEnv, ImportManager, ModuleLoader};
pub use scope::{ImportSelector, Scope, ScopeId, ScopeKind, ScopeTree, WithVis};
pub use solver::{ConstraintSystem, SystemState};

/// Run semantic analysis over one module: scopes, imports, name resolution,
/// then constraint solving for globals and function bodies.
///
/// Returns the module's global scope, or `None` if scope construction
/// failed outright. Type errors are reported through the handler and leave
/// the scope usable.
pub fn analyze_module(
    env: &mut ImportEnv<'_>,
    imports: &mut ImportManager,
    loader: &mut dyn ModuleLoader,
    module: DeclId,
) -> Option<ScopeId> {
    builtins::install_builtins(env.scopes, env.ast, env.types);

    let file = module_file(env, module);
    imports.push_in_flight(file);
    let scope = build_module_scope(env, imports, loader, module);
    imports.pop_in_flight(file);
    let scope = scope?;
    imports.cache_module(file, scope);

    check_module_bodies(env, scope, module);
    Some(scope)
}

/// Build the global scope of a module: declared types, item overload sets,
/// namespaces, and imports, followed by name resolution over declaration
/// signatures.
///
/// This is also the per-file entry point module loaders call for imported
/// sources.
pub fn build_module_scope(
    env: &mut ImportEnv<'_>,
    imports: &mut ImportManager,
    loader: &mut dyn ModuleLoader,
    module: DeclId,
) -> Option<ScopeId> {
    let DeclKind::Module(m) = &env.ast.decls[module].kind else {
        return None;
    };
    let decls = m.decls.clone();
    let file = m.file;

    let scope = env.scopes.new_module_scope(module);
    populate_scope(env, imports, loader, file, scope, &decls);
    resolve::resolve_decl_signatures(env.types, env.ast, env.scopes, scope, &decls, env.handler);
    Some(scope)
}

fn populate_scope(
    env: &mut ImportEnv<'_>,
    imports: &mut ImportManager,
    loader: &mut dyn ModuleLoader,
    file: FileId,
    scope: ScopeId,
    decls: &[DeclId],
) {
    for &decl in decls {
        let span = env.ast.decls[decl].span;
        match env.ast.decls[decl].kind.clone() {
            DeclKind::Struct(s) => {
                let ty = env.types.intern(galec_ast::Type::Struct {
                    decl,
                    template_args: Vec::new(),
                });
                if !env.scopes.insert_type(scope, s.name, ty, s.visibility) {
                    env.handler
                        .error(span, format!("duplicate type '{}'", s.name));
                }
            }
            DeclKind::Enum(e) => {
                if !env.scopes.insert_type(scope, e.name, e.ty, e.visibility) {
                    env.handler
                        .error(span, format!("duplicate type '{}'", e.name));
                }
            }
            DeclKind::TypeAlias(t) => {
                if !env.scopes.insert_type(scope, t.name, t.ty, t.visibility) {
                    env.handler
                        .error(span, format!("duplicate type '{}'", t.name));
                }
            }
            DeclKind::Function(f) => {
                env.scopes.insert_item(scope, f.name, decl, f.visibility);
            }
            DeclKind::VarLet(v) if v.global => {
                env.scopes.insert_item(scope, v.name, decl, v.visibility);
            }
            DeclKind::Namespace(n) => {
                let child = env
                    .scopes
                    .new_scope(scope, scope::ScopeKind::Namespace(decl));
                if !env
                    .scopes
                    .insert_namespace(scope, n.name, child, n.visibility)
                {
                    env.handler
                        .error(span, format!("duplicate namespace '{}'", n.name));
                }
                populate_scope(env, imports, loader, file, child, &n.decls);
            }
            DeclKind::Import(i) => {
                imports.handle_import(env, loader, file, &i, scope, span);
            }
            _ => {}
        }
    }
}

/// Solve global initializers and function bodies of a module, in source
/// order: globals first so their inferred types are available to bodies.
fn check_module_bodies(env: &mut ImportEnv<'_>, scope: ScopeId, module: DeclId) {
    let DeclKind::Module(m) = &env.ast.decls[module].kind else {
        return;
    };
    let decls = m.decls.clone();
    check_decl_bodies(env, scope, &decls);
}

fn check_decl_bodies(env: &mut ImportEnv<'_>, scope: ScopeId, decls: &[DeclId]) {
    for &decl in decls {
        let is_global = matches!(&env.ast.decls[decl].kind, DeclKind::VarLet(v) if v.global);
        if is_global {
            BodyChecker::check_global(env.types, env.ast, env.scopes, env.handler, scope, decl);
        }
    }
    for &decl in decls {
        match env.ast.decls[decl].kind.clone() {
            DeclKind::Function(_) => {
                BodyChecker::check_function(
                    env.types,
                    env.ast,
                    env.scopes,
                    env.handler,
                    scope,
                    decl,
                );
            }
            DeclKind::Namespace(n) => {
                // Namespace members resolve against the namespace's scope.
                let child = env
                    .scopes
                    .get(scope)
                    .namespaces
                    .get(&n.name)
                    .map(|ns| ns.item);
                if let Some(child) = child {
                    check_decl_bodies(env, child, &n.decls);
                }
            }
            _ => {}
        }
    }
}

fn module_file(env: &ImportEnv<'_>, module: DeclId) -> FileId {
    match &env.ast.decls[module].kind {
        DeclKind::Module(m) => m.file,
        _ => FileId::DUMMY,
    }
}
