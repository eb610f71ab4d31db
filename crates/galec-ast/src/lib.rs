//! galec-ast - Types and AST for the Gale compiler
//!
//! The type universe and the abstract syntax tree the parser hands to
//! semantic analysis. Both live in slab arenas addressed by typed indices;
//! expression type slots are the only part of the tree sema mutates.

pub mod ast;
pub mod types;

pub use ast::*;
pub use types::{EnumCase, FloatWidth, PointerKind, Signedness, TyId, Type, TypeArena};
