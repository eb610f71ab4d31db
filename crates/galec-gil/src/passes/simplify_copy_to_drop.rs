//! `simplify-copy-to-drop`: turns a copy-then-move-then-drop of the same
//! location into a single move.
//!
//! The pattern `%1 = load [copy] p; %2 = load [take] p; drop %2` (with `%2`
//! used only by the drop) copies a value and immediately destroys the
//! original; taking ownership in the first load does the same work without
//! the copy.

use crate::gil::{GilModule, InstId, InstKind, LoadOwnership};

pub fn run(module: &mut GilModule) {
    for id in module.functions.indices().collect::<Vec<_>>() {
        if module.functions[id].is_declaration() {
            continue;
        }

        let mut to_erase: Vec<InstId> = Vec::new();
        let mut to_retag: Vec<InstId> = Vec::new();
        {
            let function = &module.functions[id];
            for &block in &function.block_order {
                for &inst in &function.blocks[block].insts {
                    let InstKind::Drop { value } = &function.insts[inst].kind else {
                        continue;
                    };
                    let Some(take_load) = value.defining_inst() else {
                        continue;
                    };
                    let InstKind::Load { ptr, ownership } = &function.insts[take_load].kind
                    else {
                        continue;
                    };
                    if *ownership != LoadOwnership::Take {
                        continue;
                    }
                    if !function.used_only_by(*value, inst) {
                        continue;
                    }
                    let address = *ptr;

                    // The latest load [copy] of the same address before the
                    // load [take], within this block.
                    let mut copy_load: Option<InstId> = None;
                    for &candidate in &function.blocks[block].insts {
                        if candidate == take_load {
                            break;
                        }
                        if let InstKind::Load { ptr, ownership } = &function.insts[candidate].kind
                        {
                            if *ptr == address && *ownership == LoadOwnership::Copy {
                                copy_load = Some(candidate);
                            }
                        }
                    }
                    let Some(copy_load) = copy_load else {
                        continue;
                    };
                    if to_retag.contains(&copy_load) || to_erase.contains(&take_load) {
                        continue;
                    }

                    to_retag.push(copy_load);
                    to_erase.push(take_load);
                    to_erase.push(inst);
                }
            }
        }

        let function = &mut module.functions[id];
        for inst in to_retag {
            if let InstKind::Load { ownership, .. } = &mut function.insts[inst].kind {
                *ownership = LoadOwnership::Take;
            }
        }
        for inst in to_erase {
            function.erase_inst(inst);
        }
    }
}
