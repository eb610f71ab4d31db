#![allow(dead_code)]

//! Shared helpers for building test modules programmatically, standing in
//! for the parser.

use galec_ast::*;
use galec_sema::{ImportEnv, ImportManager, ModuleLoader, ScopeId};
use galec_util::{DiagnosticHandler, FileId, SourceMap, Span, Symbol};

/// A loader that refuses every file; for tests without imports.
pub struct NoLoader;

impl ModuleLoader for NoLoader {
    fn load_module(
        &mut self,
        _env: &mut ImportEnv<'_>,
        _imports: &mut ImportManager,
        _file: FileId,
    ) -> Option<ScopeId> {
        None
    }
}

pub fn sym(name: &str) -> Symbol {
    Symbol::intern(name)
}

pub fn span(line: u32, column: u32) -> Span {
    Span::point(FileId(0), line, column)
}

/// Everything a sema test needs, bundled.
pub struct TestModule {
    pub ast: Ast,
    pub types: TypeArena,
    pub scopes: galec_sema::ScopeTree,
    pub source_map: SourceMap,
    pub handler: DiagnosticHandler,
    pub imports: ImportManager,
}

impl TestModule {
    pub fn new() -> Self {
        Self {
            ast: Ast::new(),
            types: TypeArena::new(),
            scopes: galec_sema::ScopeTree::new(),
            source_map: SourceMap::new(),
            handler: DiagnosticHandler::new(),
            imports: ImportManager::new(Vec::new()),
        }
    }

    /// Wrap statements in a compound body and a `main`-style function, and
    /// produce the module declaration around the given top-level decls.
    pub fn module_with_fn(&mut self, name: &str, stmts: Vec<StmtId>, mut decls: Vec<DeclId>) -> DeclId {
        let body = self
            .ast
            .add_stmt(StmtKind::Compound { stmts }, span(1, 1));
        let void = self.types.void();
        let fn_ty = self.types.function(vec![], void);
        let function = self.ast.add_decl(
            DeclKind::Function(FunctionDecl {
                name: sym(name),
                visibility: Visibility::Public,
                ty: fn_ty,
                params: vec![],
                body: Some(body),
            }),
            span(1, 1),
        );
        decls.push(function);
        self.ast.add_decl(
            DeclKind::Module(ModuleDecl {
                name: sym("test"),
                file: FileId::DUMMY,
                decls,
            }),
            span(1, 1),
        )
    }

    /// Declare an external (bodyless) function.
    pub fn extern_fn(&mut self, name: &str, params: &[TyId], ret: TyId) -> DeclId {
        let fn_ty = self.types.function(params.to_vec(), ret);
        let param_decls = params
            .iter()
            .enumerate()
            .map(|(i, &ty)| {
                self.ast.add_decl(
                    DeclKind::Param(ParamDecl {
                        name: sym(&format!("p{i}")),
                        ty,
                        default: None,
                    }),
                    span(1, 1),
                )
            })
            .collect();
        self.ast.add_decl(
            DeclKind::Function(FunctionDecl {
                name: sym(name),
                visibility: Visibility::Public,
                ty: fn_ty,
                params: param_decls,
                body: None,
            }),
            span(1, 1),
        )
    }

    /// Declare a global variable with a concrete type and no initializer.
    pub fn global_var(&mut self, name: &str, ty: TyId) -> DeclId {
        self.ast.add_decl(
            DeclKind::VarLet(VarLetDecl {
                name: sym(name),
                keyword: BindingKeyword::Var,
                visibility: Visibility::Public,
                ty: Some(ty),
                value: None,
                global: true,
            }),
            span(1, 1),
        )
    }

    /// Declare a local `let` with an optional declared type.
    pub fn let_stmt(&mut self, name: &str, ty: Option<TyId>, value: ExprId) -> (DeclId, StmtId) {
        let decl = self.ast.add_decl(
            DeclKind::VarLet(VarLetDecl {
                name: sym(name),
                keyword: BindingKeyword::Let,
                visibility: Visibility::Private,
                ty,
                value: Some(value),
                global: false,
            }),
            span(2, 1),
        );
        let stmt = self.ast.add_stmt(StmtKind::Decl { decl }, span(2, 1));
        (decl, stmt)
    }

    /// Build a two-field struct declaration and its type.
    pub fn struct_decl(&mut self, name: &str, fields: &[(&str, TyId)]) -> (DeclId, TyId) {
        let field_decls: Vec<DeclId> = fields
            .iter()
            .map(|(fname, ty)| {
                self.ast.add_decl(
                    DeclKind::Field(FieldDecl {
                        name: sym(fname),
                        ty: *ty,
                        default: None,
                    }),
                    span(1, 1),
                )
            })
            .collect();
        let decl = self.ast.add_decl(
            DeclKind::Struct(StructDecl {
                name: sym(name),
                visibility: Visibility::Public,
                fields: field_decls,
                copy_fn: None,
                drop_fn: None,
            }),
            span(1, 1),
        );
        let ty = self.types.intern(Type::Struct {
            decl,
            template_args: vec![],
        });
        (decl, ty)
    }

    /// Run semantic analysis over the module.
    pub fn analyze(&mut self, module: DeclId) -> Option<ScopeId> {
        let mut env = ImportEnv {
            types: &mut self.types,
            ast: &mut self.ast,
            scopes: &mut self.scopes,
            source_map: &mut self.source_map,
            handler: &self.handler,
        };
        galec_sema::analyze_module(&mut env, &mut self.imports, &mut NoLoader, module)
    }
}
