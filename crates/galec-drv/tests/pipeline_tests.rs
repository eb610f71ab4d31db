//! Pipeline integration: a clean module compiles through to LIR, and
//! errors gate progression at stage boundaries.

use galec_ast::*;
use galec_drv::{compile_module, CompileError, CompileOptions};
use galec_sema::{ImportEnv, ImportManager, ModuleLoader, ScopeId};
use galec_util::{DiagnosticHandler, FileId, SourceMap, Span, Symbol};

struct NoLoader;

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

fn sym(name: &str) -> Symbol {
    Symbol::intern(name)
}

fn span(line: u32, column: u32) -> Span {
    Span::point(FileId(0), line, column)
}

struct Setup {
    ast: Ast,
    types: TypeArena,
    source_map: SourceMap,
    handler: DiagnosticHandler,
}

impl Setup {
    fn new() -> Self {
        Self {
            ast: Ast::new(),
            types: TypeArena::new(),
            source_map: SourceMap::new(),
            handler: DiagnosticHandler::new(),
        }
    }

    fn compile(
        &mut self,
        module: DeclId,
        options: &CompileOptions,
    ) -> Result<galec_drv::Compilation, CompileError> {
        compile_module(
            &mut self.ast,
            &mut self.types,
            &mut self.source_map,
            &self.handler,
            &mut NoLoader,
            options,
            module,
        )
    }

    fn fn_with_body(&mut self, name: &str, ret: TyId, stmts: Vec<StmtId>) -> DeclId {
        let body = self
            .ast
            .add_stmt(StmtKind::Compound { stmts }, span(1, 1));
        let fn_ty = self.types.function(vec![], ret);
        self.ast.add_decl(
            DeclKind::Function(FunctionDecl {
                name: sym(name),
                visibility: Visibility::Public,
                ty: fn_ty,
                params: vec![],
                body: Some(body),
            }),
            span(1, 1),
        )
    }

    fn module(&mut self, decls: Vec<DeclId>) -> DeclId {
        self.ast.add_decl(
            DeclKind::Module(ModuleDecl {
                name: sym("test"),
                file: FileId::DUMMY,
                decls,
            }),
            span(1, 1),
        )
    }
}

#[test]
fn clean_module_compiles_to_lir() {
    let mut s = Setup::new();
    let lit = s
        .ast
        .add_expr(ExprKind::Literal(LiteralValue::Int(42)), span(2, 9));
    let decl = s.ast.add_decl(
        DeclKind::VarLet(VarLetDecl {
            name: sym("x"),
            keyword: BindingKeyword::Let,
            visibility: Visibility::Private,
            ty: None,
            value: Some(lit),
            global: false,
        }),
        span(2, 1),
    );
    let stmt = s.ast.add_stmt(StmtKind::Decl { decl }, span(2, 1));
    let void = s.types.void();
    let main = s.fn_with_body("main", void, vec![stmt]);
    let module = s.module(vec![main]);

    let compilation = s
        .compile(module, &CompileOptions::default())
        .expect("compiles");

    assert!(!s.handler.has_errors());
    let main_fn = compilation
        .lir
        .functions
        .iter()
        .find(|f| f.name == "main")
        .expect("main in LIR");
    // void-main ran: main returns a value.
    assert!(main_fn.ret.is_some());
}

#[test]
fn sema_errors_stop_before_gil() {
    // let x: Int32 = wide; with wide: Int64 — sema fails, pipeline stops.
    let mut s = Setup::new();
    let i64 = s.types.int64();
    let i32 = s.types.int32();
    let wide = s.ast.add_decl(
        DeclKind::VarLet(VarLetDecl {
            name: sym("wide"),
            keyword: BindingKeyword::Var,
            visibility: Visibility::Public,
            ty: Some(i64),
            value: None,
            global: true,
        }),
        span(1, 1),
    );
    let value = s.ast.ref_named("wide", span(2, 16));
    let decl = s.ast.add_decl(
        DeclKind::VarLet(VarLetDecl {
            name: sym("x"),
            keyword: BindingKeyword::Let,
            visibility: Visibility::Private,
            ty: Some(i32),
            value: Some(value),
            global: false,
        }),
        span(2, 1),
    );
    let stmt = s.ast.add_stmt(StmtKind::Decl { decl }, span(2, 1));
    let void = s.types.void();
    let main = s.fn_with_body("main", void, vec![stmt]);
    let module = s.module(vec![wide, main]);

    let result = s.compile(module, &CompileOptions::default());
    assert!(matches!(result, Err(CompileError::SemaFailed)));
    assert!(s.handler.has_errors());
}

#[test]
fn pass_errors_stop_before_lowering() {
    // A non-void function missing a return fails in the pass pipeline.
    let mut s = Setup::new();
    let i32 = s.types.int32();
    let f = s.fn_with_body("f", i32, vec![]);
    let module = s.module(vec![f]);

    let result = s.compile(module, &CompileOptions::default());
    assert!(matches!(result, Err(CompileError::PassesFailed)));
}

#[test]
fn fatal_diagnostic_aborts_immediately() {
    let mut s = Setup::new();
    let void = s.types.void();
    let main = s.fn_with_body("main", void, vec![]);
    let module = s.module(vec![main]);

    s.handler.fatal(Span::DUMMY, "out of disk space");
    let result = s.compile(module, &CompileOptions::default());
    assert!(matches!(result, Err(CompileError::Fatal)));
}

#[test]
fn gil_dump_is_collected_when_requested() {
    let mut s = Setup::new();
    let void = s.types.void();
    let main = s.fn_with_body("main", void, vec![]);
    let module = s.module(vec![main]);

    let options = CompileOptions {
        dump_gil: true,
        ..Default::default()
    };
    let compilation = s.compile(module, &options).expect("compiles");
    let dump = compilation.gil_dump.expect("dump requested");
    assert!(dump.contains("gil @main"));
}

#[test]
fn rendered_diagnostics_include_summary() {
    let mut s = Setup::new();
    let i32 = s.types.int32();
    let f = s.fn_with_body("f", i32, vec![]);
    let module = s.module(vec![f]);

    let _ = s.compile(module, &CompileOptions::default());
    let rendered = galec_drv::render_diagnostics(&s.handler, &s.source_map);
    assert!(rendered.contains("error"));
    assert!(rendered.contains("emitted"));
}
