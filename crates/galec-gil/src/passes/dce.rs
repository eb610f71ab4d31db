//! `dead-code-elimination`: removes basic blocks unreachable from the
//! entry block.
//!
//! Unreachable blocks that contain user code (instructions with a valid
//! source location other than compiler-synthetic branches, drops, loads,
//! and returns) produce one "code is unreachable" warning per distinct
//! location before removal.

use galec_util::{DiagnosticHandler, FxHashSet, Span};

use crate::gil::{BlockId, Function, GilModule, InstKind};

pub fn run(module: &mut GilModule, handler: &DiagnosticHandler) {
    for id in module.functions.indices().collect::<Vec<_>>() {
        if !module.functions[id].is_declaration() {
            run_on_function(&mut module.functions[id], handler);
        }
    }
}

/// Compute the blocks reachable from the entry by DFS over terminator
/// successors.
pub fn reachable_blocks(function: &Function) -> FxHashSet<BlockId> {
    let mut reachable = FxHashSet::default();
    let Some(entry) = function.entry_block() else {
        return reachable;
    };
    let mut worklist = vec![entry];
    reachable.insert(entry);
    while let Some(block) = worklist.pop() {
        for succ in function.successors(block) {
            if reachable.insert(succ) {
                worklist.push(succ);
            }
        }
    }
    reachable
}

fn run_on_function(function: &mut Function, handler: &DiagnosticHandler) {
    let reachable = reachable_blocks(function);
    let mut warned: Vec<Span> = Vec::new();
    let mut to_remove: Vec<BlockId> = Vec::new();

    for &block in &function.block_order {
        if reachable.contains(&block) {
            continue;
        }

        // Warn only about user code: the generator synthesizes branches,
        // drops, loads, and returns along scope-exit edges.
        for &inst in &function.blocks[block].insts {
            if matches!(
                function.insts[inst].kind,
                InstKind::Br { .. }
                    | InstKind::Unreachable
                    | InstKind::Ret { .. }
                    | InstKind::Drop { .. }
                    | InstKind::Load { .. }
            ) {
                continue;
            }
            let span = function.insts[inst].span;
            if span.is_valid() {
                if !warned.contains(&span) {
                    handler.warning(span, "code is unreachable");
                    warned.push(span);
                }
                break;
            }
        }

        to_remove.push(block);
    }

    for block in to_remove {
        function.remove_block(block);
    }
}
