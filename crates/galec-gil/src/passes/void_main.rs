//! `void-main`: rewrites a `main` returning `Void` into one returning a
//! signed 32-bit integer, turning every `ret void` into `ret 0`.

use galec_ast::{Ast, Type, TypeArena};

use crate::builder::GilBuilder;
use crate::gil::{GilModule, InstKind};

pub fn run(module: &mut GilModule, types: &mut TypeArena, _ast: &Ast) {
    let Some(main_id) = module
        .functions
        .indices()
        .find(|&id| module.functions[id].name == "main")
    else {
        return;
    };

    let fn_ty = module.functions[main_id].ty;
    let (params, c_variadic) = match types.get(types.resolve_alias(fn_ty)) {
        Type::Function {
            params,
            ret,
            c_variadic,
        } => {
            let ret = *ret;
            if !matches!(types.get(types.resolve_alias(ret)), Type::Void) {
                return;
            }
            (params.clone(), *c_variadic)
        }
        _ => return,
    };

    let int32 = types.int32();
    let new_ty = types.intern(Type::Function {
        params,
        ret: int32,
        c_variadic,
    });
    module.functions[main_id].ty = new_ty;

    // Rewrite every `ret void` into `ret (int_literal 0)`.
    let mut void_rets = Vec::new();
    for block in module.functions[main_id].block_order.clone() {
        for &inst in &module.functions[main_id].blocks[block].insts {
            if matches!(
                module.functions[main_id].insts[inst].kind,
                InstKind::Ret { value: None }
            ) {
                void_rets.push((block, inst));
            }
        }
    }

    for (block, ret) in void_rets {
        let mut builder = GilBuilder::new(module, types, main_id);
        builder.position_before(block, ret);
        let int32 = builder.types.int32();
        let zero = builder.build_int_literal(int32, 0);
        builder.func_mut().insts[ret].kind = InstKind::Ret { value: Some(zero) };
    }
}
