//! Import resolution: namespaces, selectors, re-exports, caching, and
//! cycle detection, against real files in a temporary directory.

mod common;

use std::collections::HashMap;
use std::path::PathBuf;

use common::{span, sym};
use galec_ast::*;
use galec_sema::{ImportEnv, ImportManager, ModuleLoader, ScopeId};
use galec_util::{DiagnosticHandler, FileId, Level, SourceMap, Symbol};

/// Specification of a module a test loader can materialize.
#[derive(Clone, Default)]
struct ModuleSpec {
    /// Public functions the module declares.
    functions: Vec<&'static str>,
    /// Private functions the module declares.
    private_functions: Vec<&'static str>,
    /// Import paths the module contains.
    imports: Vec<Vec<&'static str>>,
}

/// Builds modules on demand from specs keyed by file stem.
struct SpecLoader {
    specs: HashMap<String, ModuleSpec>,
    loads: Vec<String>,
}

impl SpecLoader {
    fn new(specs: HashMap<String, ModuleSpec>) -> Self {
        Self {
            specs,
            loads: Vec::new(),
        }
    }
}

impl ModuleLoader for SpecLoader {
    fn load_module(
        &mut self,
        env: &mut ImportEnv<'_>,
        imports: &mut ImportManager,
        file: FileId,
    ) -> Option<ScopeId> {
        let stem = env
            .source_map
            .file(file)?
            .path
            .file_stem()?
            .to_string_lossy()
            .to_string();
        self.loads.push(stem.clone());
        let spec = self.specs.get(&stem)?.clone();

        let mut decls = Vec::new();
        for import in &spec.imports {
            decls.push(env.ast.add_decl(
                DeclKind::Import(ImportDecl {
                    path: import.iter().map(|c| sym(c)).collect(),
                    visibility: Visibility::Private,
                }),
                span(1, 1),
            ));
        }
        for (names, visibility) in [
            (&spec.functions, Visibility::Public),
            (&spec.private_functions, Visibility::Private),
        ] {
            for name in names {
                let void = env.types.void();
                let fn_ty = env.types.function(vec![], void);
                decls.push(env.ast.add_decl(
                    DeclKind::Function(FunctionDecl {
                        name: sym(name),
                        visibility,
                        ty: fn_ty,
                        params: vec![],
                        body: None,
                    }),
                    span(1, 1),
                ));
            }
        }
        let module = env.ast.add_decl(
            DeclKind::Module(ModuleDecl {
                name: Symbol::intern(&stem),
                file,
                decls,
            }),
            span(1, 1),
        );
        galec_sema::build_module_scope(env, imports, self, module)
    }
}

struct ImportFixture {
    dir: tempfile::TempDir,
    ast: Ast,
    types: TypeArena,
    scopes: galec_sema::ScopeTree,
    source_map: SourceMap,
    handler: DiagnosticHandler,
    imports: ImportManager,
}

impl ImportFixture {
    fn new(files: &[&str]) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        for file in files {
            std::fs::write(dir.path().join(file), "// module source\n").expect("write module");
        }
        Self {
            dir,
            ast: Ast::new(),
            types: TypeArena::new(),
            scopes: galec_sema::ScopeTree::new(),
            source_map: SourceMap::new(),
            handler: DiagnosticHandler::new(),
            imports: ImportManager::new(Vec::new()),
        }
    }

    fn root_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Build and analyze a root module living in the temp dir with the given
    /// imports.
    fn analyze_root(
        &mut self,
        loader: &mut SpecLoader,
        file_name: &str,
        imports: &[Vec<&str>],
    ) -> Option<ScopeId> {
        std::fs::write(self.root_path(file_name), "// root\n").expect("write root");
        let file = self
            .source_map
            .load_file(&self.root_path(file_name))
            .expect("register root");

        let mut decls = Vec::new();
        for import in imports {
            decls.push(self.ast.add_decl(
                DeclKind::Import(ImportDecl {
                    path: import.iter().map(|c| sym(c)).collect(),
                    visibility: Visibility::Private,
                }),
                span(1, 1),
            ));
        }
        let module = self.ast.add_decl(
            DeclKind::Module(ModuleDecl {
                name: sym("root"),
                file,
                decls,
            }),
            span(1, 1),
        );

        let mut env = ImportEnv {
            types: &mut self.types,
            ast: &mut self.ast,
            scopes: &mut self.scopes,
            source_map: &mut self.source_map,
            handler: &self.handler,
        };
        galec_sema::analyze_module(&mut env, &mut self.imports, loader, module)
    }
}

fn specs(entries: &[(&str, ModuleSpec)]) -> HashMap<String, ModuleSpec> {
    entries
        .iter()
        .map(|(name, spec)| (name.to_string(), spec.clone()))
        .collect()
}

#[test]
fn import_module_as_namespace() {
    let mut fixture = ImportFixture::new(&["math.glu"]);
    let mut loader = SpecLoader::new(specs(&[(
        "math",
        ModuleSpec {
            functions: vec!["abs"],
            ..Default::default()
        },
    )]));

    let scope = fixture
        .analyze_root(&mut loader, "main.glu", &[vec!["math"]])
        .unwrap();

    assert!(!fixture.handler.has_errors(), "{:?}", fixture.handler.diagnostics());
    let ident = NamespacedIdent {
        components: vec![sym("math")],
        name: sym("abs"),
    };
    assert!(fixture.scopes.lookup_item(scope, &ident).is_some());
}

#[test]
fn import_single_item_selector() {
    let mut fixture = ImportFixture::new(&["math.glu"]);
    let mut loader = SpecLoader::new(specs(&[(
        "math",
        ModuleSpec {
            functions: vec!["abs", "max"],
            ..Default::default()
        },
    )]));

    let scope = fixture
        .analyze_root(&mut loader, "main.glu", &[vec!["math", "abs"]])
        .unwrap();

    assert!(!fixture.handler.has_errors(), "{:?}", fixture.handler.diagnostics());
    assert!(fixture.scopes.lookup_item_local(scope, sym("abs")).is_some());
    assert!(fixture.scopes.lookup_item_local(scope, sym("max")).is_none());
}

#[test]
fn import_all_reexports_public_entries_only() {
    let mut fixture = ImportFixture::new(&["math.glu"]);
    let mut loader = SpecLoader::new(specs(&[(
        "math",
        ModuleSpec {
            functions: vec!["abs", "max"],
            private_functions: vec!["helper"],
            ..Default::default()
        },
    )]));

    let scope = fixture
        .analyze_root(&mut loader, "main.glu", &[vec!["math", "@all"]])
        .unwrap();

    assert!(!fixture.handler.has_errors(), "{:?}", fixture.handler.diagnostics());
    assert!(fixture.scopes.lookup_item_local(scope, sym("abs")).is_some());
    assert!(fixture.scopes.lookup_item_local(scope, sym("max")).is_some());
    assert!(fixture.scopes.lookup_item_local(scope, sym("helper")).is_none());
}

#[test]
fn missing_selector_is_reported() {
    let mut fixture = ImportFixture::new(&["math.glu"]);
    let mut loader = SpecLoader::new(specs(&[(
        "math",
        ModuleSpec {
            functions: vec!["abs"],
            ..Default::default()
        },
    )]));

    fixture
        .analyze_root(&mut loader, "main.glu", &[vec!["math", "missing"]])
        .unwrap();

    assert!(fixture.handler.has_errors());
    let messages: Vec<String> = fixture
        .handler
        .diagnostics()
        .iter()
        .map(|d| d.message.clone())
        .collect();
    assert!(
        messages.iter().any(|m| m.contains("missing")),
        "unexpected diagnostics: {messages:?}"
    );
}

#[test]
fn repeated_imports_hit_the_cache() {
    let mut fixture = ImportFixture::new(&["math.glu"]);
    let mut loader = SpecLoader::new(specs(&[(
        "math",
        ModuleSpec {
            functions: vec!["abs", "max"],
            ..Default::default()
        },
    )]));

    fixture
        .analyze_root(
            &mut loader,
            "main.glu",
            &[vec!["math", "abs"], vec!["math", "max"]],
        )
        .unwrap();

    assert!(!fixture.handler.has_errors(), "{:?}", fixture.handler.diagnostics());
    assert_eq!(loader.loads, vec!["math"]);
}

#[test]
fn cyclic_import_reports_exactly_once() {
    // a.glu imports b, b.glu imports a: one error, no cross-bindings.
    let mut fixture = ImportFixture::new(&["b.glu"]);
    let mut loader = SpecLoader::new(specs(&[
        (
            "a",
            ModuleSpec {
                functions: vec!["from_a"],
                imports: vec![vec!["b", "@all"]],
                ..Default::default()
            },
        ),
        (
            "b",
            ModuleSpec {
                functions: vec!["from_b"],
                imports: vec![vec!["a", "@all"]],
                ..Default::default()
            },
        ),
    ]));

    // The root module is `a` itself, registered from disk.
    let scope = fixture
        .analyze_root(&mut loader, "a.glu", &[vec!["b", "@all"]])
        .unwrap();

    let cyclic_errors = fixture
        .handler
        .diagnostics()
        .iter()
        .filter(|d| d.level >= Level::Error && d.message.contains("yclic"))
        .count();
    assert_eq!(cyclic_errors, 1, "{:?}", fixture.handler.diagnostics());

    // Neither module's scope contains bindings from the other.
    assert!(fixture.scopes.lookup_item_local(scope, sym("from_b")).is_none());
}

#[test]
fn failed_import_is_skipped_silently_on_retry() {
    let mut fixture = ImportFixture::new(&["broken.glu"]);
    // No spec for `broken`: the loader fails.
    let mut loader = SpecLoader::new(specs(&[]));

    fixture
        .analyze_root(
            &mut loader,
            "main.glu",
            &[vec!["broken", "@all"], vec!["broken", "@all"]],
        )
        .unwrap();

    // The loader ran once; the retry hit the failure cache.
    assert_eq!(loader.loads, vec!["broken"]);
}

#[test]
fn unknown_module_reports_not_found() {
    let mut fixture = ImportFixture::new(&[]);
    let mut loader = SpecLoader::new(specs(&[]));

    fixture
        .analyze_root(&mut loader, "main.glu", &[vec!["ghost"]])
        .unwrap();

    assert!(fixture.handler.has_errors());
    let messages: Vec<String> = fixture
        .handler
        .diagnostics()
        .iter()
        .map(|d| d.message.clone())
        .collect();
    assert!(messages.iter().any(|m| m.contains("ghost")));
}
