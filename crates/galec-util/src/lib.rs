//! galec-util - Core utilities and foundation types
//!
//! This crate provides the infrastructure shared by every phase of the Gale
//! compiler: typed index vectors, source spans and the source map, interned
//! symbols, and the diagnostic engine.

pub mod diagnostic;
pub mod error;
pub mod index_vec;
pub mod span;
pub mod symbol;

pub use diagnostic::{Diagnostic, DiagnosticHandler, Level};
pub use error::{SourceMapError, SourceMapResult};
pub use index_vec::{Idx, IndexVec};
pub use span::{FileId, SourceFile, SourceMap, Span};
pub use symbol::Symbol;

// Re-export commonly used hash collections
pub use rustc_hash::FxHashMap;
pub use rustc_hash::FxHashSet;
