//! galec-drv - Pipeline orchestration
//!
//! Drives one compilation through its stages: semantic analysis (scopes,
//! imports, constraint solving), GIL generation, the GIL pass pipeline, and
//! lowering to LIR. Every stage reports into the shared diagnostic handler;
//! an error gates progression at the next stage boundary, and a fatal
//! diagnostic aborts immediately. The CLI wrapping this (argument parsing,
//! file discovery, object-file output) lives outside this crate.

use std::path::PathBuf;

use anyhow::Context;
use thiserror::Error;

use galec_ast::{Ast, DeclId, TypeArena};
use galec_gil::{GilModule, PassManager, PassPipelineConfig};
use galec_lir::{LirModule, LowerError};
use galec_sema::{ImportEnv, ImportManager, ModuleLoader};
use galec_util::{DiagnosticHandler, SourceMap};

/// Options for one compilation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Import search paths, user paths first; the driver appends system
    /// paths last.
    pub import_paths: Vec<PathBuf>,
    /// Pass pipeline configuration.
    pub passes: PassPipelineConfig,
    /// Collect a textual GIL dump after the pass pipeline.
    pub dump_gil: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            import_paths: Vec::new(),
            passes: PassPipelineConfig::create_default(),
            dump_gil: false,
        }
    }
}

/// Which stage stopped the pipeline.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("a fatal diagnostic terminated the pipeline")]
    Fatal,
    #[error("semantic analysis reported errors")]
    SemaFailed,
    #[error("the pass pipeline reported errors")]
    PassesFailed,
    #[error(transparent)]
    Lower(#[from] LowerError),
}

/// The result of a successful compilation.
pub struct Compilation {
    pub lir: LirModule,
    /// GIL dump after passes, when requested.
    pub gil_dump: Option<String>,
    /// Print-before/after output collected by the pass manager.
    pub pass_output: String,
}

/// Compile one module through sema, GIL generation, passes, and lowering.
///
/// Diagnostics accumulate in `handler` regardless of the outcome; callers
/// render them with [`render_diagnostics`].
#[allow(clippy::too_many_arguments)]
pub fn compile_module(
    ast: &mut Ast,
    types: &mut TypeArena,
    source_map: &mut SourceMap,
    handler: &DiagnosticHandler,
    loader: &mut dyn ModuleLoader,
    options: &CompileOptions,
    module: DeclId,
) -> Result<Compilation, CompileError> {
    let mut scopes = galec_sema::ScopeTree::new();
    let mut imports = ImportManager::new(options.import_paths.clone());

    // Stage 1: semantic analysis.
    let mut env = ImportEnv {
        types: &mut *types,
        ast: &mut *ast,
        scopes: &mut scopes,
        source_map: &mut *source_map,
        handler,
    };
    let module_scope = galec_sema::analyze_module(&mut env, &mut imports, loader, module);
    check_stage(handler, CompileError::SemaFailed)?;
    if module_scope.is_none() {
        return Err(CompileError::SemaFailed);
    }

    // Stage 2: GIL generation.
    let mut gil = GilModule::new(module_name(ast, module));
    galec_gil::generate_module(&mut gil, types, ast, &scopes, module);
    check_stage(handler, CompileError::SemaFailed)?;

    // Stage 3: the pass pipeline.
    let mut manager = PassManager::new(options.passes.clone());
    manager.run(&mut gil, types, ast, handler);
    check_stage(handler, CompileError::PassesFailed)?;

    let gil_dump = options
        .dump_gil
        .then(|| galec_gil::print_module(&gil, types, ast));

    // Stage 4: lowering to LIR.
    let lir = galec_lir::lower_module(&gil, types)?;
    check_stage(handler, CompileError::PassesFailed)?;

    Ok(Compilation {
        lir,
        gil_dump,
        pass_output: manager.output,
    })
}

/// Compile and render the LIR as text, wrapping stage failures with the
/// rendered diagnostics.
#[allow(clippy::too_many_arguments)]
pub fn compile_to_text(
    ast: &mut Ast,
    types: &mut TypeArena,
    source_map: &mut SourceMap,
    handler: &DiagnosticHandler,
    loader: &mut dyn ModuleLoader,
    options: &CompileOptions,
    module: DeclId,
) -> anyhow::Result<String> {
    let compilation = compile_module(ast, types, source_map, handler, loader, options, module)
        .with_context(|| render_diagnostics(handler, source_map))?;
    Ok(compilation.lir.to_string())
}

/// Render the handler's diagnostics sorted, de-duplicated, with source
/// lines, carets, and the trailing summary.
pub fn render_diagnostics(handler: &DiagnosticHandler, source_map: &SourceMap) -> String {
    handler.render(source_map)
}

fn check_stage(handler: &DiagnosticHandler, error: CompileError) -> Result<(), CompileError> {
    if handler.has_fatal() {
        return Err(CompileError::Fatal);
    }
    if handler.has_errors() {
        return Err(error);
    }
    Ok(())
}

fn module_name(ast: &Ast, module: DeclId) -> String {
    match &ast.decls[module].kind {
        galec_ast::DeclKind::Module(m) => m.name.to_string(),
        _ => "module".to_string(),
    }
}
