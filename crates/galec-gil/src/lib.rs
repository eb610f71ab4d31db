//! galec-gil - GIL generation and the pass pipeline
//!
//! GIL (Gale Intermediate Language) is the compiler's SSA-form mid-level
//! IR: block arguments instead of PHI nodes, and explicit ownership
//! operations (copy / take / drop) that later passes analyze and lower to
//! concrete calls. This crate holds the IR itself, the AST-to-GIL
//! generator, the pass manager with the default pipeline, and the textual
//! printer.

pub mod builder;
pub mod gil;
pub mod gilgen;
pub mod passes;
pub mod printer;

pub use builder::GilBuilder;
pub use gil::{
    BasicBlock, BlockId, Callee, DebugBinding, Function, FunctionId, GilModule, Global, GlobalId,
    Inst, InstId, InstKind, LoadOwnership, Member, StoreOwnership, Value,
};
pub use gilgen::{generate_function, generate_module};
pub use passes::{PassConfig, PassManager, PassPipelineConfig};
pub use printer::print_module;
