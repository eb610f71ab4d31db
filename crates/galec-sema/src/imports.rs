//! Import resolution.
//!
//! `import a::b::c` searches the importing file's directory and then each
//! configured import path. Path prefixes are peeled one component at a time
//! (1, then 2, then all), and for every prefix the supported extension sets
//! are tried in priority order; the first existing file wins and the
//! remaining components become the selector within the loaded module.
//! Imports are cached by file identity, failed imports are remembered and
//! skipped silently, and an import stack catches cycles.

use std::path::{Path, PathBuf};

use galec_ast::{Ast, ImportDecl, TypeArena};
use galec_util::{DiagnosticHandler, FileId, FxHashMap, FxHashSet, SourceMap, Span, Symbol};

use crate::scope::{ImportSelector, ScopeId, ScopeTree};

/// Extension sets in resolution priority order: native sources, C headers,
/// LLVM bitcode/IR, then foreign sources importable through external
/// compilation.
const EXTENSION_SETS: &[&[&str]] = &[
    &["glu"],
    &["h"],
    &["bc", "ll"],
    &["c", "cpp", "cc", "cxx", "rs", "zig", "swift", "d"],
];

/// The `@all` re-export selector.
const ALL_SELECTOR: &str = "@all";

/// Mutable compilation context the import machinery threads through.
pub struct ImportEnv<'a> {
    pub types: &'a mut TypeArena,
    pub ast: &'a mut Ast,
    pub scopes: &'a mut ScopeTree,
    pub source_map: &'a mut SourceMap,
    pub handler: &'a DiagnosticHandler,
}

/// Produces a populated global scope for a resolved file.
///
/// For native sources this parses and scope-checks the module; for C
/// headers, bitcode, and foreign sources it invokes the relevant importer
/// (external compilation to IR, then declaration decompilation), caching
/// derived artifacts by file identity. All of that machinery lives behind
/// this trait; the resolver only needs the resulting scope.
pub trait ModuleLoader {
    fn load_module(
        &mut self,
        env: &mut ImportEnv<'_>,
        imports: &mut ImportManager,
        file: FileId,
    ) -> Option<ScopeId>;
}

/// Resolves and caches imports for one compilation.
pub struct ImportManager {
    /// User-configured import paths; system paths are appended last by the
    /// driver.
    search_paths: Vec<PathBuf>,
    /// Files whose loads are in flight, for cycle detection.
    import_stack: Vec<FileId>,
    /// Successfully imported files.
    imported: FxHashMap<FileId, ScopeId>,
    /// Files whose import failed; retried imports skip silently.
    failed: FxHashSet<FileId>,
    /// Files whose in-flight load hit a cyclic import.
    tainted: FxHashSet<FileId>,
}

impl ImportManager {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths,
            import_stack: Vec::new(),
            imported: FxHashMap::default(),
            failed: FxHashSet::default(),
            tainted: FxHashSet::default(),
        }
    }

    /// Mark a root module's file as in flight while its scope is built, so
    /// cycles back into it are caught.
    pub fn push_in_flight(&mut self, file: FileId) {
        self.import_stack.push(file);
    }

    pub fn pop_in_flight(&mut self, file: FileId) {
        debug_assert_eq!(self.import_stack.last(), Some(&file));
        self.import_stack.pop();
    }

    /// Record an externally constructed scope for a file (the root module).
    pub fn cache_module(&mut self, file: FileId, scope: ScopeId) {
        self.imported.insert(file, scope);
    }

    /// Resolve one import declaration into `into_scope`.
    ///
    /// Returns true if the import bound anything.
    pub fn handle_import(
        &mut self,
        env: &mut ImportEnv<'_>,
        loader: &mut dyn ModuleLoader,
        importing_file: FileId,
        decl: &ImportDecl,
        into_scope: ScopeId,
        span: Span,
    ) -> bool {
        let components = &decl.path;
        if components.is_empty() {
            return false;
        }

        let mut dirs: Vec<PathBuf> = Vec::new();
        if let Some(file) = env.source_map.file(importing_file) {
            if let Some(parent) = file.path.parent() {
                dirs.push(parent.to_path_buf());
            }
        }
        dirs.extend(self.search_paths.iter().cloned());

        for dir in &dirs {
            for prefix_len in 1..=components.len() {
                // `@all` is a selector, never a path component.
                if components[..prefix_len]
                    .iter()
                    .any(|c| c.as_str() == ALL_SELECTOR)
                {
                    break;
                }
                for ext_set in EXTENSION_SETS {
                    for &ext in *ext_set {
                        let path = build_path(dir, &components[..prefix_len], ext);
                        if !path.is_file() {
                            continue;
                        }
                        let file = match env.source_map.load_file(&path) {
                            Ok(file) => file,
                            Err(err) => {
                                env.handler.error(span, err.to_string());
                                return false;
                            }
                        };
                        if file == importing_file {
                            // Self-imports fall through to other candidates.
                            continue;
                        }
                        return self.import_resolved_file(
                            env,
                            loader,
                            decl,
                            file,
                            components[prefix_len - 1],
                            &components[prefix_len..],
                            into_scope,
                            span,
                        );
                    }
                }
            }
        }
        env.handler.error(
            span,
            format!(
                "no module found for import '{}'",
                components
                    .iter()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
                    .join("::")
            ),
        );
        false
    }

    #[allow(clippy::too_many_arguments)]
    fn import_resolved_file(
        &mut self,
        env: &mut ImportEnv<'_>,
        loader: &mut dyn ModuleLoader,
        decl: &ImportDecl,
        file: FileId,
        stem: Symbol,
        selector: &[Symbol],
        into_scope: ScopeId,
        span: Span,
    ) -> bool {
        let Some(module_scope) = self.try_loading_file(env, loader, file, span) else {
            return false;
        };
        self.import_into_scope(env, decl, module_scope, stem, selector, into_scope, span)
    }

    /// Load (or fetch the cached scope of) a file, detecting cycles.
    fn try_loading_file(
        &mut self,
        env: &mut ImportEnv<'_>,
        loader: &mut dyn ModuleLoader,
        file: FileId,
        span: Span,
    ) -> Option<ScopeId> {
        if self.failed.contains(&file) {
            // Already diagnosed; skip silently.
            return None;
        }
        if self.import_stack.contains(&file) {
            env.handler.error(
                span,
                "cyclic import detected, module imports itself indirectly",
            );
            // The load requesting this import cannot complete cleanly.
            if let Some(&requester) = self.import_stack.last() {
                self.tainted.insert(requester);
            }
            return None;
        }
        if let Some(&scope) = self.imported.get(&file) {
            return Some(scope);
        }

        self.import_stack.push(file);
        let scope = loader.load_module(env, self, file);
        self.import_stack.pop();

        match scope {
            Some(scope) if !self.tainted.remove(&file) => {
                self.imported.insert(file, scope);
                Some(scope)
            }
            _ => {
                self.tainted.remove(&file);
                self.failed.insert(file);
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn import_into_scope(
        &mut self,
        env: &mut ImportEnv<'_>,
        decl: &ImportDecl,
        module_scope: ScopeId,
        stem: Symbol,
        selector: &[Symbol],
        into_scope: ScopeId,
        span: Span,
    ) -> bool {
        if selector.is_empty() {
            // Import the module as a namespace under its file stem.
            if !env
                .scopes
                .insert_namespace(into_scope, stem, module_scope, decl.visibility)
            {
                env.handler.error(
                    span,
                    format!("import collision: namespace '{stem}' already declared"),
                );
                return false;
            }
            return true;
        }

        // Walk intermediate namespaces within the loaded module.
        let mut scope = module_scope;
        let mut selector = selector;
        while selector.len() > 1 {
            let component = selector[0];
            match env.scopes.get(scope).namespaces.get(&component) {
                Some(ns) if ns.is_public() => scope = ns.item,
                _ => {
                    env.handler.error(
                        span,
                        format!("module has no namespace named '{component}'"),
                    );
                    return false;
                }
            }
            selector = &selector[1..];
        }

        let name = selector[0];
        let kind = if name.as_str() == ALL_SELECTOR {
            ImportSelector::All
        } else {
            ImportSelector::Item(name)
        };
        let copied =
            env.scopes
                .copy_into(scope, into_scope, &kind, decl.visibility, span, env.handler);
        if !copied {
            env.handler
                .error(span, format!("could not find '{name}' in imported module"));
        }
        copied
    }
}

fn build_path(dir: &Path, components: &[Symbol], ext: &str) -> PathBuf {
    let mut path = dir.to_path_buf();
    for component in components {
        path.push(component.as_str());
    }
    path.set_extension(ext);
    path
}
