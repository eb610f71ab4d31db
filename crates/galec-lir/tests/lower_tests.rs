//! GIL to LIR lowering: PHI materialization, alloca hoisting, and the
//! drop-free precondition.

use galec_ast::*;
use galec_gil::{GilModule, PassManager, PassPipelineConfig};
use galec_lir::{lower_module, LirInst, LirTerminator, LowerError};
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

struct Pipeline {
    ast: Ast,
    types: TypeArena,
    scopes: galec_sema::ScopeTree,
    source_map: SourceMap,
    handler: DiagnosticHandler,
    imports: ImportManager,
}

impl Pipeline {
    fn new() -> Self {
        Self {
            ast: Ast::new(),
            types: TypeArena::new(),
            scopes: galec_sema::ScopeTree::new(),
            source_map: SourceMap::new(),
            handler: DiagnosticHandler::new(),
            imports: ImportManager::new(Vec::new()),
        }
    }

    fn compile(&mut self, module: DeclId, run_passes: bool) -> GilModule {
        let mut env = ImportEnv {
            types: &mut self.types,
            ast: &mut self.ast,
            scopes: &mut self.scopes,
            source_map: &mut self.source_map,
            handler: &self.handler,
        };
        galec_sema::analyze_module(&mut env, &mut self.imports, &mut NoLoader, module)
            .expect("module scope");
        assert!(
            !self.handler.has_errors(),
            "sema failed: {:?}",
            self.handler.diagnostics()
        );

        let mut gil = GilModule::new("test");
        galec_gil::generate_module(&mut gil, &mut self.types, &self.ast, &self.scopes, module);
        if run_passes {
            let mut manager = PassManager::new(PassPipelineConfig::create_default());
            manager.run(&mut gil, &mut self.types, &self.ast, &self.handler);
            assert!(
                !self.handler.has_errors(),
                "passes failed: {:?}",
                self.handler.diagnostics()
            );
        }
        gil
    }
}

/// `func pick(c: Bool) -> Int32 { return c ? 1 : 2; }` — the ternary's
/// result block becomes a PHI with two incoming edges.
fn ternary_module(p: &mut Pipeline) -> DeclId {
    let bool_ty = p.types.bool_ty();
    let i32 = p.types.int32();
    let cond = p.ast.ref_named("c", span(2, 10));
    let one = p
        .ast
        .add_expr(ExprKind::Literal(LiteralValue::Int(1)), span(2, 14));
    let two = p
        .ast
        .add_expr(ExprKind::Literal(LiteralValue::Int(2)), span(2, 18));
    let ternary = p.ast.add_expr(
        ExprKind::Ternary {
            cond,
            then_value: one,
            else_value: two,
        },
        span(2, 10),
    );
    let ret = p.ast.add_stmt(
        StmtKind::Return {
            value: Some(ternary),
        },
        span(2, 3),
    );
    let body = p
        .ast
        .add_stmt(StmtKind::Compound { stmts: vec![ret] }, span(1, 30));
    let fn_ty = p.types.function(vec![bool_ty], i32);
    let param = p.ast.add_decl(
        DeclKind::Param(ParamDecl {
            name: sym("c"),
            ty: bool_ty,
            default: None,
        }),
        span(1, 11),
    );
    let func = p.ast.add_decl(
        DeclKind::Function(FunctionDecl {
            name: sym("pick"),
            visibility: Visibility::Public,
            ty: fn_ty,
            params: vec![param],
            body: Some(body),
        }),
        span(1, 1),
    );
    p.ast.add_decl(
        DeclKind::Module(ModuleDecl {
            name: sym("test"),
            file: FileId::DUMMY,
            decls: vec![func],
        }),
        span(1, 1),
    )
}

#[test]
fn block_arguments_become_phis() {
    let mut p = Pipeline::new();
    let module = ternary_module(&mut p);
    let gil = p.compile(module, true);

    let lir = lower_module(&gil, &p.types).expect("lowers");
    let pick = lir
        .functions
        .iter()
        .find(|f| f.name == "pick")
        .expect("pick function");

    let phi_block = pick
        .blocks
        .iter()
        .find(|b| !b.phis.is_empty())
        .expect("a block with a phi");
    assert_eq!(phi_block.phis.len(), 1);
    assert_eq!(phi_block.phis[0].incoming.len(), 2);
}

#[test]
fn allocas_are_hoisted_to_entry() {
    let mut p = Pipeline::new();
    let module = ternary_module(&mut p);
    let gil = p.compile(module, true);

    let lir = lower_module(&gil, &p.types).expect("lowers");
    for function in &lir.functions {
        if function.is_declaration() {
            continue;
        }
        for (i, block) in function.blocks.iter().enumerate() {
            let mut seen_non_alloca = false;
            for inst in &block.insts {
                match inst {
                    LirInst::Alloca { .. } => {
                        assert_eq!(i, 0, "alloca outside the entry block");
                        assert!(!seen_non_alloca, "alloca after other instructions");
                    }
                    _ => seen_non_alloca = true,
                }
            }
        }
    }
}

#[test]
fn surviving_drop_is_rejected() {
    // Lowering without the pass pipeline leaves scope-exit drops behind.
    let mut p = Pipeline::new();
    let i32 = p.types.int32();
    let lit = p
        .ast
        .add_expr(ExprKind::Literal(LiteralValue::Int(7)), span(2, 9));
    let decl = p.ast.add_decl(
        DeclKind::VarLet(VarLetDecl {
            name: sym("x"),
            keyword: BindingKeyword::Let,
            visibility: Visibility::Private,
            ty: Some(i32),
            value: Some(lit),
            global: false,
        }),
        span(2, 1),
    );
    let stmt = p.ast.add_stmt(StmtKind::Decl { decl }, span(2, 1));
    let body = p
        .ast
        .add_stmt(StmtKind::Compound { stmts: vec![stmt] }, span(1, 20));
    let void = p.types.void();
    let fn_ty = p.types.function(vec![], void);
    let func = p.ast.add_decl(
        DeclKind::Function(FunctionDecl {
            name: sym("f"),
            visibility: Visibility::Public,
            ty: fn_ty,
            params: vec![],
            body: Some(body),
        }),
        span(1, 1),
    );
    let module = p.ast.add_decl(
        DeclKind::Module(ModuleDecl {
            name: sym("test"),
            file: FileId::DUMMY,
            decls: vec![func],
        }),
        span(1, 1),
    );

    let gil = p.compile(module, false);
    match lower_module(&gil, &p.types) {
        Err(LowerError::DropSurvived { function }) => assert_eq!(function, "f"),
        other => panic!("expected DropSurvived, got {other:?}"),
    }
}

#[test]
fn terminators_translate_one_to_one() {
    let mut p = Pipeline::new();
    let module = ternary_module(&mut p);
    let gil = p.compile(module, true);

    let lir = lower_module(&gil, &p.types).expect("lowers");
    let pick = lir.functions.iter().find(|f| f.name == "pick").unwrap();

    let mut has_condbr = false;
    let mut has_ret = false;
    for block in &pick.blocks {
        match &block.terminator {
            LirTerminator::CondBr { .. } => has_condbr = true,
            LirTerminator::Ret { value } => {
                has_ret = true;
                assert!(value.is_some());
            }
            _ => {}
        }
    }
    assert!(has_condbr);
    assert!(has_ret);
}

#[test]
fn display_renders_phis() {
    let mut p = Pipeline::new();
    let module = ternary_module(&mut p);
    let gil = p.compile(module, true);

    let lir = lower_module(&gil, &p.types).expect("lowers");
    let text = lir.to_string();
    assert!(text.contains("define @pick"));
    assert!(text.contains("phi"));
}
