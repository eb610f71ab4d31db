//! galec-lir - The low-level IR and the GIL lowering into it
//!
//! LIR is the target-independent IR handed to the code generator: basic
//! blocks with PHI nodes, virtual registers, entry-block allocas, and a
//! flat instruction set mapped one-to-one from the GIL operations the pass
//! pipeline leaves behind.

pub mod lir;
pub mod lower;

pub use lir::{
    CastKind, LirBlock, LirFunction, LirInst, LirModule, LirTerminator, LirValue, Phi, Reg,
};
pub use lower::{lower_module, LowerError};
