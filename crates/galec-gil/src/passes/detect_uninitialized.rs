//! `detect-uninitialized`: forward data-flow analysis over the
//! per-allocation lattice `Uninitialized < MaybeInitialized < Initialized`.
//!
//! The pass computes a fixed point of per-block end states, then walks each
//! block once more to tag every store as `Init` (first write) or `Set`
//! (overwrite), warn on stores over maybe-initialized locations, and error
//! on loads and drops that can reach memory not initialized on every
//! predecessor path.

use galec_util::{DiagnosticHandler, FxHashMap};

use crate::gil::{
    BlockId, Function, GilModule, InstKind, LoadOwnership, StoreOwnership, Value,
};

/// Iteration cap; the lattice height is three per value, so real functions
/// converge long before this.
const MAX_ITERATIONS: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MemoryState {
    Uninitialized,
    MaybeInitialized,
    Initialized,
}

fn merge(lhs: MemoryState, rhs: MemoryState) -> MemoryState {
    if lhs == rhs {
        lhs
    } else {
        MemoryState::MaybeInitialized
    }
}

type StateMap = FxHashMap<Value, MemoryState>;

pub fn run(module: &mut GilModule, handler: &DiagnosticHandler) {
    for id in module.functions.indices().collect::<Vec<_>>() {
        if !module.functions[id].is_declaration() {
            run_on_function(&mut module.functions[id], handler);
        }
    }
}

fn predecessors(function: &Function) -> FxHashMap<BlockId, Vec<BlockId>> {
    let mut preds: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
    for &block in &function.block_order {
        for succ in function.successors(block) {
            preds.entry(succ).or_default().push(block);
        }
    }
    preds
}

fn merged_entry_state(
    block: BlockId,
    preds: &FxHashMap<BlockId, Vec<BlockId>>,
    end_states: &FxHashMap<BlockId, StateMap>,
) -> StateMap {
    let Some(preds) = preds.get(&block) else {
        return StateMap::default();
    };

    // Collect every value any predecessor tracks, then merge; a value
    // unknown to some predecessor merges as uninitialized.
    let mut all_values: Vec<Value> = Vec::new();
    for pred in preds {
        if let Some(state) = end_states.get(pred) {
            for &value in state.keys() {
                if !all_values.contains(&value) {
                    all_values.push(value);
                }
            }
        }
    }

    let mut merged = StateMap::default();
    for value in all_values {
        let mut current: Option<MemoryState> = None;
        for pred in preds {
            let state = end_states
                .get(pred)
                .and_then(|s| s.get(&value).copied())
                .unwrap_or(MemoryState::Uninitialized);
            current = Some(match current {
                None => state,
                Some(existing) => merge(existing, state),
            });
        }
        merged.insert(value, current.unwrap_or(MemoryState::Uninitialized));
    }
    merged
}

/// Transfer function of a single instruction, without diagnostics.
fn transfer(function: &Function, inst: crate::gil::InstId, state: &mut StateMap) {
    match &function.insts[inst].kind {
        InstKind::Alloca { .. } => {
            state.insert(Value::result(inst), MemoryState::Uninitialized);
        }
        InstKind::Store { ptr, .. } => {
            state.insert(*ptr, MemoryState::Initialized);
        }
        InstKind::Load { ptr, ownership } => {
            if *ownership == LoadOwnership::Take {
                state.insert(*ptr, MemoryState::Uninitialized);
            }
        }
        InstKind::Drop { value } => {
            if state.contains_key(value) {
                state.insert(*value, MemoryState::Uninitialized);
            }
        }
        InstKind::PtrOffset { base, .. } => {
            let base_state = state
                .get(base)
                .copied()
                .unwrap_or(MemoryState::Uninitialized);
            state.insert(Value::result(inst), base_state);
        }
        InstKind::StructFieldPtr { ptr, .. } => {
            let base_state = state
                .get(ptr)
                .copied()
                .unwrap_or(MemoryState::Uninitialized);
            state.insert(Value::result(inst), base_state);
        }
        InstKind::Bitcast { value } => {
            // Pointer-to-pointer casts alias the source location.
            if let Some(&base_state) = state.get(value) {
                state.insert(Value::result(inst), base_state);
            }
        }
        InstKind::StructExtract { .. } => {
            state.insert(Value::result(inst), MemoryState::Initialized);
        }
        _ => {}
    }
}

fn run_on_function(function: &mut Function, handler: &DiagnosticHandler) {
    let preds = predecessors(function);
    let mut end_states: FxHashMap<BlockId, StateMap> = FxHashMap::default();

    // Fixed-point iteration over per-block end states.
    let mut iteration = 0;
    loop {
        let mut changed = false;
        for &block in &function.block_order {
            let mut state = merged_entry_state(block, &preds, &end_states);
            for &inst in &function.blocks[block].insts {
                transfer(function, inst, &mut state);
            }
            if end_states.get(&block) != Some(&state) {
                end_states.insert(block, state);
                changed = true;
            }
        }
        iteration += 1;
        if !changed || iteration >= MAX_ITERATIONS {
            break;
        }
    }

    // Final walk: tag stores and diagnose bad loads and drops.
    for &block in &function.block_order.clone() {
        let mut state = merged_entry_state(block, &preds, &end_states);
        for inst in function.blocks[block].insts.clone() {
            let span = function.insts[inst].span;
            match function.insts[inst].kind.clone() {
                InstKind::Store { ptr, .. } => {
                    let previous = state
                        .get(&ptr)
                        .copied()
                        .unwrap_or(MemoryState::Uninitialized);
                    let ownership = match previous {
                        MemoryState::Uninitialized => StoreOwnership::Init,
                        MemoryState::Initialized => StoreOwnership::Set,
                        MemoryState::MaybeInitialized => {
                            handler.warning(span, "store to possibly uninitialized location");
                            StoreOwnership::Set
                        }
                    };
                    if let InstKind::Store {
                        ownership: slot, ..
                    } = &mut function.insts[inst].kind
                    {
                        *slot = ownership;
                    }
                }
                InstKind::Load { ptr, .. } => {
                    // Untracked pointers (parameters, globals) are assumed
                    // initialized; only allocation-rooted locations are
                    // checked.
                    if let Some(&ptr_state) = state.get(&ptr) {
                        if ptr_state != MemoryState::Initialized {
                            handler.error(span, "load from uninitialized memory location");
                        }
                    }
                }
                InstKind::Drop { value } => {
                    if let Some(&value_state) = state.get(&value) {
                        if value_state != MemoryState::Initialized {
                            handler.error(span, "drop of uninitialized memory location");
                        }
                    }
                }
                _ => {}
            }
            transfer(function, inst, &mut state);
        }
    }
}
