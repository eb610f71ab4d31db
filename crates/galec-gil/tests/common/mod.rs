#![allow(dead_code)]

//! Shared fixture: builds test modules programmatically, runs semantic
//! analysis, and lowers them to GIL.

use galec_ast::*;
use galec_gil::{GilModule, InstKind};
use galec_sema::{ImportEnv, ImportManager, ModuleLoader, ScopeId};
use galec_util::{DiagnosticHandler, FileId, SourceMap, Span, Symbol};

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

pub struct Fixture {
    pub ast: Ast,
    pub types: TypeArena,
    pub scopes: galec_sema::ScopeTree,
    pub source_map: SourceMap,
    pub handler: DiagnosticHandler,
    pub imports: ImportManager,
}

impl Fixture {
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

    /// A function declaration with the given signature and body statements.
    pub fn function(
        &mut self,
        name: &str,
        params: &[(&str, TyId)],
        ret: TyId,
        stmts: Vec<StmtId>,
    ) -> DeclId {
        let body = self.ast.add_stmt(StmtKind::Compound { stmts }, span(1, 1));
        let param_tys: Vec<TyId> = params.iter().map(|(_, ty)| *ty).collect();
        let fn_ty = self.types.function(param_tys, ret);
        let param_decls = params
            .iter()
            .map(|(pname, ty)| {
                self.ast.add_decl(
                    DeclKind::Param(ParamDecl {
                        name: sym(pname),
                        ty: *ty,
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
                body: Some(body),
            }),
            span(1, 1),
        )
    }

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

    pub fn int_lit(&mut self, value: i64, at: Span) -> ExprId {
        self.ast
            .add_expr(ExprKind::Literal(LiteralValue::Int(value)), at)
    }

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

    pub fn var_stmt_uninit(&mut self, name: &str, ty: TyId) -> (DeclId, StmtId) {
        let decl = self.ast.add_decl(
            DeclKind::VarLet(VarLetDecl {
                name: sym(name),
                keyword: BindingKeyword::Var,
                visibility: Visibility::Private,
                ty: Some(ty),
                value: None,
                global: false,
            }),
            span(2, 1),
        );
        let stmt = self.ast.add_stmt(StmtKind::Decl { decl }, span(2, 1));
        (decl, stmt)
    }

    /// A struct declaration with optional overloaded copy/drop functions.
    pub fn struct_decl(
        &mut self,
        name: &str,
        fields: &[(&str, TyId)],
        copy_fn: Option<DeclId>,
        drop_fn: Option<DeclId>,
    ) -> (DeclId, TyId) {
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
                copy_fn,
                drop_fn,
            }),
            span(1, 1),
        );
        let ty = self.types.intern(Type::Struct {
            decl,
            template_args: vec![],
        });
        (decl, ty)
    }

    pub fn module(&mut self, decls: Vec<DeclId>) -> DeclId {
        self.ast.add_decl(
            DeclKind::Module(ModuleDecl {
                name: sym("test"),
                file: FileId::DUMMY,
                decls,
            }),
            span(1, 1),
        )
    }

    /// Run sema over the module; panics on unexpected analysis failure.
    pub fn analyze(&mut self, module: DeclId) -> ScopeId {
        let mut env = ImportEnv {
            types: &mut self.types,
            ast: &mut self.ast,
            scopes: &mut self.scopes,
            source_map: &mut self.source_map,
            handler: &self.handler,
        };
        galec_sema::analyze_module(&mut env, &mut self.imports, &mut NoLoader, module)
            .expect("module scope")
    }

    /// Lower the analyzed module to GIL.
    pub fn lower(&mut self, module: DeclId) -> GilModule {
        let mut gil = GilModule::new("test");
        galec_gil::generate_module(
            &mut gil,
            &mut self.types,
            &self.ast,
            &self.scopes,
            module,
        );
        gil
    }

    /// Sema + GIL generation in one go, asserting sema succeeded.
    pub fn compile(&mut self, module: DeclId) -> GilModule {
        self.analyze(module);
        assert!(
            !self.handler.has_errors(),
            "sema failed: {:?}",
            self.handler.diagnostics()
        );
        self.lower(module)
    }
}

/// Count instructions matching a predicate across a module's live blocks.
pub fn count_insts(module: &GilModule, pred: impl Fn(&InstKind) -> bool) -> usize {
    let mut count = 0;
    for function in module.functions.iter() {
        for &block in &function.block_order {
            for &inst in &function.blocks[block].insts {
                if pred(&function.insts[inst].kind) {
                    count += 1;
                }
            }
        }
    }
    count
}
