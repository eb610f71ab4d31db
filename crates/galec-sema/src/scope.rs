//! Scope tables for name resolution.
//!
//! Each lexical scope holds three maps keyed by name: overloadable items
//! (functions and variable bindings), types, and namespaces. Scopes chain to
//! a parent; the global scope of a module roots the chain, and every module
//! chain bottoms out in the shared builtins scope. Maps are `IndexMap`s so
//! lookup results and collision diagnostics come out in insertion order.

use galec_ast::{DeclId, NamespacedIdent, TyId, Visibility};
use galec_util::{define_idx, DiagnosticHandler, IndexVec, Span, Symbol};
use indexmap::IndexMap;

define_idx! {
    /// Handle to a scope in the [`ScopeTree`].
    pub struct ScopeId;
}

/// An entry together with its visibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WithVis<T> {
    pub visibility: Visibility,
    pub item: T,
}

impl<T> WithVis<T> {
    pub fn new(visibility: Visibility, item: T) -> Self {
        Self { visibility, item }
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }
}

/// What kind of node a scope belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    /// The shared builtins scope.
    Builtins,
    /// A module's global scope.
    Module(DeclId),
    /// A namespace within a module.
    Namespace(DeclId),
    /// A function's parameter scope.
    Function(DeclId),
    /// A compound statement.
    Block,
}

/// A single scope's semantic table.
#[derive(Debug)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    /// Overload lists of functions and variable bindings.
    pub items: IndexMap<Symbol, Vec<WithVis<DeclId>>>,
    /// Types declared in this scope. Only global scopes carry types.
    pub types: IndexMap<Symbol, WithVis<TyId>>,
    /// Child namespaces. Only global scopes carry namespaces.
    pub namespaces: IndexMap<Symbol, WithVis<ScopeId>>,
}

/// Selector applied when copying an imported module's entries into a scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImportSelector {
    /// `@all`: copy every public entry, re-exporting with the requested
    /// visibility.
    All,
    /// Copy a single named entry.
    Item(Symbol),
}

/// Arena of scopes for one compilation.
pub struct ScopeTree {
    scopes: IndexVec<ScopeId, Scope>,
    builtins: ScopeId,
}

impl ScopeTree {
    /// Create a scope tree with an empty builtins scope at the root.
    ///
    /// The builtins scope is populated lazily by
    /// [`crate::builtins::install_builtins`] on first use.
    pub fn new() -> Self {
        let mut scopes = IndexVec::new();
        let builtins = scopes.push(Scope {
            parent: None,
            kind: ScopeKind::Builtins,
            items: IndexMap::new(),
            types: IndexMap::new(),
            namespaces: IndexMap::new(),
        });
        Self { scopes, builtins }
    }

    pub fn builtins(&self) -> ScopeId {
        self.builtins
    }

    /// Create a new scope chained to a parent.
    pub fn new_scope(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        self.scopes.push(Scope {
            parent: Some(parent),
            kind,
            items: IndexMap::new(),
            types: IndexMap::new(),
            namespaces: IndexMap::new(),
        })
    }

    /// Create a module global scope rooted at the builtins scope.
    pub fn new_module_scope(&mut self, module: DeclId) -> ScopeId {
        let builtins = self.builtins;
        self.new_scope(builtins, ScopeKind::Module(module))
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id]
    }

    /// Append a declaration to the item overload list for `name`.
    pub fn insert_item(
        &mut self,
        scope: ScopeId,
        name: Symbol,
        decl: DeclId,
        visibility: Visibility,
    ) {
        self.scopes[scope]
            .items
            .entry(name)
            .or_default()
            .push(WithVis::new(visibility, decl));
    }

    /// Insert a type. Returns false if the name is already taken.
    pub fn insert_type(
        &mut self,
        scope: ScopeId,
        name: Symbol,
        ty: TyId,
        visibility: Visibility,
    ) -> bool {
        match self.scopes[scope].types.entry(name) {
            indexmap::map::Entry::Occupied(_) => false,
            indexmap::map::Entry::Vacant(e) => {
                e.insert(WithVis::new(visibility, ty));
                true
            }
        }
    }

    /// Insert a namespace. Returns false if the name is already taken.
    pub fn insert_namespace(
        &mut self,
        scope: ScopeId,
        name: Symbol,
        table: ScopeId,
        visibility: Visibility,
    ) -> bool {
        match self.scopes[scope].namespaces.entry(name) {
            indexmap::map::Entry::Occupied(_) => false,
            indexmap::map::Entry::Vacant(e) => {
                e.insert(WithVis::new(visibility, table));
                true
            }
        }
    }

    /// Look up an item in this scope or its parents.
    ///
    /// Overloads shadow outward: the closest scope that has any entry for
    /// the name wins.
    pub fn lookup_item_local(&self, mut scope: ScopeId, name: Symbol) -> Option<&[WithVis<DeclId>]> {
        loop {
            let s = &self.scopes[scope];
            if let Some(decls) = s.items.get(&name) {
                return Some(decls);
            }
            scope = s.parent?;
        }
    }

    /// Look up a type in this scope or its parents.
    pub fn lookup_type_local(&self, mut scope: ScopeId, name: Symbol) -> Option<TyId> {
        loop {
            let s = &self.scopes[scope];
            if let Some(ty) = s.types.get(&name) {
                return Some(ty.item);
            }
            scope = s.parent?;
        }
    }

    /// Look up a namespace in this scope or its parents.
    pub fn lookup_namespace_local(&self, mut scope: ScopeId, name: Symbol) -> Option<ScopeId> {
        loop {
            let s = &self.scopes[scope];
            if let Some(ns) = s.namespaces.get(&name) {
                return Some(ns.item);
            }
            scope = s.parent?;
        }
    }

    /// Resolve the scope a namespaced identifier's components lead to,
    /// starting from `scope`. Plain identifiers resolve to `scope` itself.
    fn resolve_components(&self, scope: ScopeId, ident: &NamespacedIdent) -> Option<ScopeId> {
        let mut current = match ident.components.first() {
            None => return Some(scope),
            Some(&first) => self.lookup_namespace_local(scope, first)?,
        };
        for &component in &ident.components[1..] {
            current = self.scopes[current].namespaces.get(&component)?.item;
        }
        Some(current)
    }

    /// Look up an item by namespaced identifier.
    pub fn lookup_item(&self, scope: ScopeId, ident: &NamespacedIdent) -> Option<&[WithVis<DeclId>]> {
        let target = self.resolve_components(scope, ident)?;
        if ident.components.is_empty() {
            self.lookup_item_local(target, ident.name)
        } else {
            // Within a foreign namespace, do not fall back to its parents.
            self.scopes[target].items.get(&ident.name).map(|v| &v[..])
        }
    }

    /// Look up a type by namespaced identifier.
    pub fn lookup_type(&self, scope: ScopeId, ident: &NamespacedIdent) -> Option<TyId> {
        let target = self.resolve_components(scope, ident)?;
        if ident.components.is_empty() {
            self.lookup_type_local(target, ident.name)
        } else {
            self.scopes[target].types.get(&ident.name).map(|t| t.item)
        }
    }

    /// The function declaration enclosing a scope, if any.
    pub fn enclosing_function(&self, mut scope: ScopeId) -> Option<DeclId> {
        loop {
            let s = &self.scopes[scope];
            if let ScopeKind::Function(decl) = s.kind {
                return Some(decl);
            }
            scope = s.parent?;
        }
    }

    /// The global scope at the root of a scope's module chain (the scope
    /// just below builtins).
    pub fn global_scope(&self, mut scope: ScopeId) -> ScopeId {
        loop {
            let s = &self.scopes[scope];
            match s.parent {
                Some(parent) if parent != self.builtins => scope = parent,
                _ => return scope,
            }
        }
    }

    /// Copy entries selected from `from` into `into`, enforcing visibility.
    ///
    /// Returns true if at least one entry was copied. Name collisions on
    /// types and namespaces are diagnosed; item overload lists merge.
    pub fn copy_into(
        &mut self,
        from: ScopeId,
        into: ScopeId,
        selector: &ImportSelector,
        import_visibility: Visibility,
        loc: Span,
        handler: &DiagnosticHandler,
    ) -> bool {
        let keep = |name: Symbol| match selector {
            ImportSelector::All => true,
            ImportSelector::Item(wanted) => name == *wanted,
        };

        // Collect first so we do not hold a borrow across the inserts.
        let items: Vec<(Symbol, Vec<DeclId>)> = self.scopes[from]
            .items
            .iter()
            .filter(|(name, _)| keep(**name))
            .map(|(name, decls)| {
                (
                    *name,
                    decls
                        .iter()
                        .filter(|d| d.is_public())
                        .map(|d| d.item)
                        .collect(),
                )
            })
            .filter(|(_, decls): &(Symbol, Vec<DeclId>)| !decls.is_empty())
            .collect();
        let types: Vec<(Symbol, TyId)> = self.scopes[from]
            .types
            .iter()
            .filter(|(name, ty)| keep(**name) && ty.is_public())
            .map(|(name, ty)| (*name, ty.item))
            .collect();
        let namespaces: Vec<(Symbol, ScopeId)> = self.scopes[from]
            .namespaces
            .iter()
            .filter(|(name, ns)| keep(**name) && ns.is_public())
            .map(|(name, ns)| (*name, ns.item))
            .collect();

        let mut copied = false;
        for (name, decls) in items {
            for decl in decls {
                // Imported items merge into the overload list; ambiguities
                // surface at use sites.
                self.insert_item(into, name, decl, import_visibility);
                copied = true;
            }
        }
        for (name, ty) in types {
            if !self.insert_type(into, name, ty, import_visibility) {
                handler.error(loc, format!("import collision: type '{name}' already declared"));
            } else {
                copied = true;
            }
        }
        for (name, ns) in namespaces {
            if !self.insert_namespace(into, name, ns, import_visibility) {
                handler.error(
                    loc,
                    format!("import collision: namespace '{name}' already declared"),
                );
            } else {
                copied = true;
            }
        }
        copied
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}
