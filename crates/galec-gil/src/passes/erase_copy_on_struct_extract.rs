//! `erase-copy-on-struct-extract`: rewrites `struct_extract(load [copy] p)`
//! into `load [copy] (struct_field_ptr p)`, so only the field is copied
//! instead of the whole struct. The original load is erased when the
//! extract was its only user.

use galec_ast::TypeArena;

use crate::builder::GilBuilder;
use crate::gil::{GilModule, InstId, InstKind, LoadOwnership, Value};

pub fn run(module: &mut GilModule, types: &mut TypeArena) {
    for id in module.functions.indices().collect::<Vec<_>>() {
        if module.functions[id].is_declaration() {
            continue;
        }

        // Collect the rewrite sites first; mutation happens afterwards.
        let mut sites: Vec<(crate::gil::BlockId, InstId, InstId, Value)> = Vec::new();
        {
            let function = &module.functions[id];
            for &block in &function.block_order {
                for &inst in &function.blocks[block].insts {
                    let InstKind::StructExtract { value, .. } = &function.insts[inst].kind else {
                        continue;
                    };
                    let Some(load) = value.defining_inst() else {
                        continue;
                    };
                    let InstKind::Load { ptr, ownership } = &function.insts[load].kind else {
                        continue;
                    };
                    if *ownership != LoadOwnership::Copy {
                        continue;
                    }
                    sites.push((block, inst, load, *ptr));
                }
            }
        }

        for (block, extract, load, struct_ptr) in sites {
            let member = match &module.functions[id].insts[extract].kind {
                InstKind::StructExtract { member, .. } => member.clone(),
                _ => continue,
            };
            let span = module.functions[id].insts[extract].span;
            let load_value = Value::result(load);
            let only_use = module.functions[id].used_only_by(load_value, extract);

            let mut builder = GilBuilder::new(module, types, id);
            builder.set_span(span);
            builder.position_before(block, extract);
            let field_ptr = builder.build_struct_field_ptr(struct_ptr, member);
            let field_load = builder.build_load_copy(field_ptr);

            let function = &mut module.functions[id];
            function.replace_all_uses(Value::result(extract), field_load);
            function.erase_inst(extract);
            if only_use {
                function.erase_inst(load);
            }
        }
    }
}
