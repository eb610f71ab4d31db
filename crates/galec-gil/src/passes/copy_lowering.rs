//! `copy-lowering`: rewrites the remaining `load [copy]` instructions.
//!
//! A copy of a struct with a user-overloaded copy function becomes a direct
//! call to that function, receiving the source pointer. Every other copy
//! downgrades to `load [None]`: the value is trivially copyable. To avoid
//! infinite recursion, loads of a struct inside that struct's own copy
//! function stay trivial.

use galec_ast::{Ast, Type, TypeArena};

use crate::builder::GilBuilder;
use crate::gil::{GilModule, InstId, InstKind, LoadOwnership, Value};

pub fn run(module: &mut GilModule, types: &mut TypeArena, ast: &Ast) {
    for id in module.functions.indices().collect::<Vec<_>>() {
        if module.functions[id].is_declaration() {
            continue;
        }
        let current_decl = module.functions[id].decl;

        let mut copy_loads: Vec<(crate::gil::BlockId, InstId)> = Vec::new();
        {
            let function = &module.functions[id];
            for &block in &function.block_order {
                for &inst in &function.blocks[block].insts {
                    if matches!(
                        function.insts[inst].kind,
                        InstKind::Load {
                            ownership: LoadOwnership::Copy,
                            ..
                        }
                    ) {
                        copy_loads.push((block, inst));
                    }
                }
            }
        }

        for (block, load) in copy_loads {
            let result_ty = module.functions[id].insts[load].result_ty;
            let copy_fn = result_ty
                .map(|ty| types.resolve_alias(ty))
                .and_then(|ty| match types.get(ty) {
                    Type::Struct { decl, .. } => ast.as_struct(*decl),
                    _ => None,
                })
                .and_then(|s| s.copy_fn);

            // Inside the struct's own copy function the load stays trivial.
            let copy_fn = match copy_fn {
                Some(f) if Some(f) != current_decl => Some(f),
                _ => None,
            };

            let Some(copy_fn) = copy_fn else {
                if let InstKind::Load { ownership, .. } =
                    &mut module.functions[id].insts[load].kind
                {
                    *ownership = LoadOwnership::None;
                }
                continue;
            };

            let Some(function_decl) = ast.as_function(copy_fn) else {
                continue;
            };
            let name = function_decl.name.to_string();
            let fn_ty = function_decl.ty;
            let ptr = match &module.functions[id].insts[load].kind {
                InstKind::Load { ptr, .. } => *ptr,
                _ => continue,
            };
            let span = module.functions[id].insts[load].span;

            let mut builder = GilBuilder::new(module, types, id);
            builder.set_span(span);
            builder.position_before(block, load);
            let call = builder.build_call(copy_fn, &name, fn_ty, vec![ptr]);

            let function = &mut module.functions[id];
            function.replace_all_uses(Value::result(load), Value::result(call));
            function.erase_inst(load);
        }
    }
}
