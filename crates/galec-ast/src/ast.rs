//! The abstract syntax tree.
//!
//! The parser produces a [`Ast`] arena of declarations, statements, and
//! expressions, each carrying a source span. Expressions own a mutable type
//! slot that starts empty (or as an `UnresolvedName` type) and is rewritten
//! in place by the solver; after sema the tree is read-only.

use std::fmt;

use galec_util::{define_idx, FileId, IndexVec, Span, Symbol};

use crate::types::{TyId, Type, TypeArena};

define_idx! {
    /// Handle to a declaration.
    pub struct DeclId;
}

define_idx! {
    /// Handle to a statement.
    pub struct StmtId;
}

define_idx! {
    /// Handle to an expression.
    pub struct ExprId;
}

/// Entry visibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// A possibly-qualified identifier, e.g. `std::io::print`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NamespacedIdent {
    /// Leading namespace components, empty for plain identifiers.
    pub components: Vec<Symbol>,
    /// The final name.
    pub name: Symbol,
}

impl NamespacedIdent {
    pub fn plain(name: Symbol) -> Self {
        Self {
            components: Vec::new(),
            name,
        }
    }
}

impl fmt::Display for NamespacedIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for component in &self.components {
            write!(f, "{component}::")?;
        }
        write!(f, "{}", self.name)
    }
}

/// A declaration node.
#[derive(Clone, Debug)]
pub struct Decl {
    pub kind: DeclKind,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum DeclKind {
    Module(ModuleDecl),
    Namespace(NamespaceDecl),
    Function(FunctionDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    TypeAlias(TypeAliasDecl),
    Field(FieldDecl),
    Param(ParamDecl),
    VarLet(VarLetDecl),
    Import(ImportDecl),
}

#[derive(Clone, Debug)]
pub struct ModuleDecl {
    pub name: Symbol,
    pub file: FileId,
    /// Top-level declarations in source order.
    pub decls: Vec<DeclId>,
}

#[derive(Clone, Debug)]
pub struct NamespaceDecl {
    pub name: Symbol,
    pub visibility: Visibility,
    pub decls: Vec<DeclId>,
}

#[derive(Clone, Debug)]
pub struct FunctionDecl {
    pub name: Symbol,
    pub visibility: Visibility,
    /// The function's type; always a `Type::Function`.
    pub ty: TyId,
    /// Parameter declarations, one per function-type parameter.
    pub params: Vec<DeclId>,
    /// Body, absent for external declarations.
    pub body: Option<StmtId>,
}

#[derive(Clone, Debug)]
pub struct StructDecl {
    pub name: Symbol,
    pub visibility: Visibility,
    /// Field declarations in declaration order.
    pub fields: Vec<DeclId>,
    /// User-provided copy function, if the struct overloads copying.
    pub copy_fn: Option<DeclId>,
    /// User-provided drop function, if the struct overloads dropping.
    pub drop_fn: Option<DeclId>,
}

#[derive(Clone, Debug)]
pub struct EnumDecl {
    pub name: Symbol,
    pub visibility: Visibility,
    /// The `Type::Enum` for this declaration.
    pub ty: TyId,
}

#[derive(Clone, Debug)]
pub struct TypeAliasDecl {
    pub name: Symbol,
    pub visibility: Visibility,
    /// The `Type::TypeAlias` for this declaration.
    pub ty: TyId,
}

#[derive(Clone, Debug)]
pub struct FieldDecl {
    pub name: Symbol,
    pub ty: TyId,
    /// Default initializer used when a struct initializer omits the field.
    pub default: Option<ExprId>,
}

#[derive(Clone, Debug)]
pub struct ParamDecl {
    pub name: Symbol,
    pub ty: TyId,
    /// Default argument used when a call omits the trailing parameter.
    pub default: Option<ExprId>,
}

/// `var` or `let` binding keyword.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKeyword {
    Var,
    Let,
}

#[derive(Clone, Debug)]
pub struct VarLetDecl {
    pub name: Symbol,
    pub keyword: BindingKeyword,
    pub visibility: Visibility,
    /// Declared or inferred type; `None` until the solver fills it in.
    pub ty: Option<TyId>,
    pub value: Option<ExprId>,
    /// True for module-level bindings.
    pub global: bool,
}

#[derive(Clone, Debug)]
pub struct ImportDecl {
    /// Import path components; the final components may act as a selector
    /// (`@all` re-exports everything) depending on which file resolves.
    pub path: Vec<Symbol>,
    pub visibility: Visibility,
}

/// A statement node.
#[derive(Clone, Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum StmtKind {
    Compound { stmts: Vec<StmtId> },
    If {
        cond: ExprId,
        then_body: StmtId,
        else_body: Option<StmtId>,
    },
    While { cond: ExprId, body: StmtId },
    For(ForStmt),
    Return { value: Option<ExprId> },
    Break,
    Continue,
    Assign { lhs: ExprId, rhs: ExprId },
    Expr { expr: ExprId },
    Decl { decl: DeclId },
}

#[derive(Clone, Debug)]
pub struct ForStmt {
    /// Loop binding, a `VarLet` declaration.
    pub binding: DeclId,
    pub range: ExprId,
    /// Always a `Compound` statement.
    pub body: StmtId,
    pub iteration: ForIteration,
}

/// How a for loop iterates its range.
#[derive(Clone, Debug)]
pub enum ForIteration {
    /// Range is a static array; lowered to inline pointer iteration.
    Array,
    /// Generic iterator protocol; the callees are `Ref` expressions
    /// resolved by sema.
    Iterator {
        begin_fn: ExprId,
        end_fn: ExprId,
        equality_fn: ExprId,
        deref_fn: ExprId,
        next_fn: ExprId,
    },
}

/// An expression node.
#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    /// Mutable type slot, filled by the solver.
    pub ty: Option<TyId>,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Literal(LiteralValue),
    Ref {
        ident: NamespacedIdent,
        /// Resolved target, set by the solver.
        target: Option<RefTarget>,
    },
    Call { callee: ExprId, args: Vec<ExprId> },
    /// The operator is itself a `Ref` expression so user overloads take part
    /// in resolution.
    Binary { op: ExprId, lhs: ExprId, rhs: ExprId },
    Unary { op: ExprId, operand: ExprId },
    Ternary {
        cond: ExprId,
        then_value: ExprId,
        else_value: ExprId,
    },
    Cast { value: ExprId, target: TyId },
    /// Aggregate initializer; fields in declaration order, trailing fields
    /// may be omitted when defaults exist.
    StructInit { fields: Vec<ExprId> },
    StructMember {
        base: ExprId,
        member: Symbol,
        /// Resolved field index, set by the solver.
        field_index: Option<usize>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum LiteralValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(Symbol),
    Null,
}

/// What a `Ref` expression resolved to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefTarget {
    Function(DeclId),
    Variable(DeclId),
    /// A case of the named enum declaration; the case name is the
    /// reference's identifier.
    EnumCase(DeclId),
}

/// The AST arenas for one compilation.
#[derive(Default)]
pub struct Ast {
    pub decls: IndexVec<DeclId, Decl>,
    pub stmts: IndexVec<StmtId, Stmt>,
    pub exprs: IndexVec<ExprId, Expr>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_decl(&mut self, kind: DeclKind, span: Span) -> DeclId {
        self.decls.push(Decl { kind, span })
    }

    pub fn add_stmt(&mut self, kind: StmtKind, span: Span) -> StmtId {
        self.stmts.push(Stmt { kind, span })
    }

    pub fn add_expr(&mut self, kind: ExprKind, span: Span) -> ExprId {
        self.exprs.push(Expr {
            kind,
            span,
            ty: None,
        })
    }

    /// Shorthand for an unqualified `Ref` expression.
    pub fn ref_named(&mut self, name: &str, span: Span) -> ExprId {
        self.add_expr(
            ExprKind::Ref {
                ident: NamespacedIdent::plain(Symbol::intern(name)),
                target: None,
            },
            span,
        )
    }

    pub fn expr_ty(&self, id: ExprId) -> Option<TyId> {
        self.exprs[id].ty
    }

    pub fn set_expr_ty(&mut self, id: ExprId, ty: TyId) {
        self.exprs[id].ty = Some(ty);
    }

    /// The function declaration behind a decl id, if it is one.
    pub fn as_function(&self, id: DeclId) -> Option<&FunctionDecl> {
        match &self.decls[id].kind {
            DeclKind::Function(f) => Some(f),
            _ => None,
        }
    }

    /// The var/let declaration behind a decl id, if it is one.
    pub fn as_var_let(&self, id: DeclId) -> Option<&VarLetDecl> {
        match &self.decls[id].kind {
            DeclKind::VarLet(v) => Some(v),
            _ => None,
        }
    }

    /// The struct declaration behind a decl id, if it is one.
    pub fn as_struct(&self, id: DeclId) -> Option<&StructDecl> {
        match &self.decls[id].kind {
            DeclKind::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// The field declaration behind a decl id, if it is one.
    pub fn as_field(&self, id: DeclId) -> Option<&FieldDecl> {
        match &self.decls[id].kind {
            DeclKind::Field(f) => Some(f),
            _ => None,
        }
    }

    /// The param declaration behind a decl id, if it is one.
    pub fn as_param(&self, id: DeclId) -> Option<&ParamDecl> {
        match &self.decls[id].kind {
            DeclKind::Param(p) => Some(p),
            _ => None,
        }
    }

    /// Index of a named field within a struct declaration.
    pub fn struct_field_index(&self, decl: DeclId, name: Symbol) -> Option<usize> {
        let s = self.as_struct(decl)?;
        s.fields
            .iter()
            .position(|&f| self.as_field(f).map(|fd| fd.name) == Some(name))
    }
}

/// Human-readable rendering of a type for diagnostics.
pub fn display_type(arena: &TypeArena, ast: &Ast, ty: TyId) -> String {
    match arena.get(ty) {
        Type::Int {
            signedness,
            bit_width,
        } => match signedness {
            crate::types::Signedness::Signed => format!("Int{bit_width}"),
            crate::types::Signedness::Unsigned => format!("UInt{bit_width}"),
        },
        Type::Float { width } => format!("Float{}", width.bit_width()),
        Type::Bool => "Bool".to_string(),
        Type::Char => "Char".to_string(),
        Type::Void => "Void".to_string(),
        Type::Null => "Null".to_string(),
        Type::Pointer { pointee, kind } => {
            let inner = display_type(arena, ast, *pointee);
            match kind {
                crate::types::PointerKind::Raw => format!("*{inner}"),
                crate::types::PointerKind::Unique => format!("*unique {inner}"),
                crate::types::PointerKind::Shared => format!("*shared {inner}"),
            }
        }
        Type::StaticArray { elem, size } => {
            format!("[{}; {size}]", display_type(arena, ast, *elem))
        }
        Type::DynamicArray { elem } => format!("[{}]", display_type(arena, ast, *elem)),
        Type::Function {
            params,
            ret,
            c_variadic,
        } => {
            let mut parts: Vec<String> = params
                .iter()
                .map(|&p| display_type(arena, ast, p))
                .collect();
            if *c_variadic {
                parts.push("...".to_string());
            }
            format!(
                "({}) -> {}",
                parts.join(", "),
                display_type(arena, ast, *ret)
            )
        }
        Type::Struct { decl, .. } => match ast.as_struct(*decl) {
            Some(s) => s.name.to_string(),
            None => "<struct>".to_string(),
        },
        Type::Enum { name, .. } => name.to_string(),
        Type::TypeAlias { name, .. } => name.to_string(),
        Type::UnresolvedName { ident } => format!("{ident}"),
        Type::TypeVar { id } => format!("${id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expr_type_slot_starts_empty() {
        let mut ast = Ast::new();
        let e = ast.add_expr(ExprKind::Literal(LiteralValue::Int(42)), Span::DUMMY);
        assert_eq!(ast.expr_ty(e), None);
    }

    #[test]
    fn test_set_expr_ty() {
        let mut ast = Ast::new();
        let mut arena = TypeArena::new();
        let e = ast.add_expr(ExprKind::Literal(LiteralValue::Int(1)), Span::DUMMY);
        let i32 = arena.int32();
        ast.set_expr_ty(e, i32);
        assert_eq!(ast.expr_ty(e), Some(i32));
    }

    #[test]
    fn test_struct_field_index() {
        let mut ast = Ast::new();
        let mut arena = TypeArena::new();
        let i32 = arena.int32();
        let x = ast.add_decl(
            DeclKind::Field(FieldDecl {
                name: Symbol::intern("x"),
                ty: i32,
                default: None,
            }),
            Span::DUMMY,
        );
        let y = ast.add_decl(
            DeclKind::Field(FieldDecl {
                name: Symbol::intern("y"),
                ty: i32,
                default: None,
            }),
            Span::DUMMY,
        );
        let s = ast.add_decl(
            DeclKind::Struct(StructDecl {
                name: Symbol::intern("Point"),
                visibility: Visibility::Public,
                fields: vec![x, y],
                copy_fn: None,
                drop_fn: None,
            }),
            Span::DUMMY,
        );
        assert_eq!(ast.struct_field_index(s, Symbol::intern("y")), Some(1));
        assert_eq!(ast.struct_field_index(s, Symbol::intern("z")), None);
    }

    #[test]
    fn test_namespaced_ident_display() {
        let ident = NamespacedIdent {
            components: vec![Symbol::intern("std"), Symbol::intern("io")],
            name: Symbol::intern("print"),
        };
        assert_eq!(format!("{ident}"), "std::io::print");
    }

    #[test]
    fn test_display_type() {
        let ast = Ast::new();
        let mut arena = TypeArena::new();
        let i32 = arena.int32();
        let u64 = arena.uint64();
        let ptr = arena.raw_pointer(i32);
        let f = arena.function(vec![i32, u64], ptr);
        assert_eq!(display_type(&arena, &ast, f), "(Int32, UInt64) -> *Int32");
    }
}
