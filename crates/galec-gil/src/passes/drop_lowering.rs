//! `drop-lowering`: rewrites `drop` markers into concrete destruction.
//!
//! Dropping a struct with a user-overloaded drop function spills the value
//! into a temporary slot and calls the drop function with its pointer;
//! trivial values need no destruction. Either way the `drop` instruction is
//! removed, so running the pass again is a no-op.

use galec_ast::{Ast, Type, TypeArena};

use crate::builder::GilBuilder;
use crate::gil::{GilModule, InstId, InstKind};

pub fn run(module: &mut GilModule, types: &mut TypeArena, ast: &Ast) {
    for id in module.functions.indices().collect::<Vec<_>>() {
        if module.functions[id].is_declaration() {
            continue;
        }

        let mut drops: Vec<(crate::gil::BlockId, InstId)> = Vec::new();
        {
            let function = &module.functions[id];
            for &block in &function.block_order {
                for &inst in &function.blocks[block].insts {
                    if matches!(function.insts[inst].kind, InstKind::Drop { .. }) {
                        drops.push((block, inst));
                    }
                }
            }
        }

        for (block, drop_inst) in drops {
            let value = match &module.functions[id].insts[drop_inst].kind {
                InstKind::Drop { value } => *value,
                _ => continue,
            };
            let value_ty = module.functions[id]
                .value_ty(value)
                .map(|ty| types.resolve_alias(ty));
            let drop_fn = value_ty
                .and_then(|ty| match types.get(ty) {
                    Type::Struct { decl, .. } => ast.as_struct(*decl),
                    _ => None,
                })
                .and_then(|s| s.drop_fn);

            if let (Some(drop_fn), Some(value_ty)) = (drop_fn, value_ty) {
                let Some(function_decl) = ast.as_function(drop_fn) else {
                    continue;
                };
                let name = function_decl.name.to_string();
                let fn_ty = function_decl.ty;
                let span = module.functions[id].insts[drop_inst].span;

                let mut builder = GilBuilder::new(module, types, id);
                builder.set_span(span);
                builder.position_before(block, drop_inst);
                let slot = builder.build_alloca(value_ty);
                builder.build_store_init(value, slot);
                builder.build_call(drop_fn, &name, fn_ty, vec![slot]);
            }

            module.functions[id].erase_inst(drop_inst);
        }
    }
}
