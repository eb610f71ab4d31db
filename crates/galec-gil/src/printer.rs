//! Textual GIL printer.
//!
//! Renders a module for debugging and pass `--print-before/after` dumps.
//! The format is stable enough to read but is not meant to be parsed back.
//! Printing never mutates the module.

use std::fmt::Write;

use galec_ast::{display_type, Ast, TypeArena};
use galec_util::FxHashMap;

use crate::gil::{
    Callee, Function, GilModule, InstId, InstKind, LoadOwnership, StoreOwnership, Value,
};

pub fn print_module(module: &GilModule, types: &TypeArena, ast: &Ast) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "gil_module \"{}\"", module.name);
    for global in module.globals.iter() {
        let _ = writeln!(
            out,
            "global @{} : ${}",
            global.name,
            display_type(types, ast, global.ty)
        );
    }
    for function in module.functions.iter() {
        out.push('\n');
        print_function(&mut out, module, function, types, ast);
    }
    out
}

fn print_function(
    out: &mut String,
    module: &GilModule,
    function: &Function,
    types: &TypeArena,
    ast: &Ast,
) {
    let _ = write!(
        out,
        "gil @{} : ${}",
        function.name,
        display_type(types, ast, function.ty)
    );
    if function.is_declaration() {
        out.push_str("\n");
        return;
    }
    out.push_str(" {\n");

    // Stable result numbering in layout order.
    let mut numbers: FxHashMap<InstId, usize> = FxHashMap::default();
    let mut next = 0usize;
    for &block in &function.block_order {
        for &inst in &function.blocks[block].insts {
            if function.insts[inst].result_ty.is_some() {
                numbers.insert(inst, next);
                next += 1;
            }
        }
    }

    let value_name = |value: Value| -> String {
        match value {
            Value::BlockArg { block, index } => {
                format!("%{}.{}", function.blocks[block].label, index)
            }
            Value::InstResult { inst, .. } => match numbers.get(&inst) {
                Some(n) => format!("%{n}"),
                None => "%?".to_string(),
            },
        }
    };

    for &block in &function.block_order {
        let b = &function.blocks[block];
        if b.args.is_empty() {
            let _ = writeln!(out, "{}:", b.label);
        } else {
            let args: Vec<String> = b
                .args
                .iter()
                .enumerate()
                .map(|(i, &ty)| format!("%{}.{} : ${}", b.label, i, display_type(types, ast, ty)))
                .collect();
            let _ = writeln!(out, "{}({}):", b.label, args.join(", "));
        }
        for &inst in &b.insts {
            let text = print_inst(module, function, inst, types, ast, &value_name);
            let _ = writeln!(out, "  {text}");
        }
    }
    out.push_str("}\n");
}

fn print_inst(
    module: &GilModule,
    function: &Function,
    inst: InstId,
    types: &TypeArena,
    ast: &Ast,
    value_name: &dyn Fn(Value) -> String,
) -> String {
    let data = &function.insts[inst];
    let prefix = match data.result_ty {
        Some(_) => format!("{} = ", value_name(Value::result(inst))),
        None => String::new(),
    };
    let ty = |id| display_type(types, ast, id);
    let list = |values: &[Value]| -> String {
        values
            .iter()
            .map(|&v| value_name(v))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let body = match &data.kind {
        InstKind::IntLiteral { value } => {
            format!("int_literal ${}, {value}", data.result_ty.map(ty).unwrap_or_default())
        }
        InstKind::FloatLiteral { value } => {
            format!("float_literal ${}, {value}", data.result_ty.map(ty).unwrap_or_default())
        }
        InstKind::BoolLiteral { value } => format!("bool_literal {value}"),
        InstKind::StringLiteral { value } => format!("string_literal \"{value}\""),
        InstKind::Alloca { ty: alloc_ty } => format!("alloca ${}", ty(*alloc_ty)),
        InstKind::Load { ptr, ownership } => {
            let tag = match ownership {
                LoadOwnership::None => "",
                LoadOwnership::Copy => " [copy]",
                LoadOwnership::Take => " [take]",
            };
            format!("load{tag} {}", value_name(*ptr))
        }
        InstKind::Store {
            value,
            ptr,
            ownership,
        } => {
            let tag = match ownership {
                StoreOwnership::Unknown => "",
                StoreOwnership::Init => " [init]",
                StoreOwnership::Set => " [set]",
            };
            format!("store{tag} {} to {}", value_name(*value), value_name(*ptr))
        }
        InstKind::StructCreate { fields } => format!("struct_create ({})", list(fields)),
        InstKind::ArrayCreate { elems } => format!("array_create ({})", list(elems)),
        InstKind::StructExtract { value, member } => {
            format!("struct_extract {}, #{}", value_name(*value), member.name)
        }
        InstKind::StructFieldPtr { ptr, member } => {
            format!("struct_field_ptr {}, #{}", value_name(*ptr), member.name)
        }
        InstKind::PtrOffset { base, offset } => {
            format!("ptr_offset {}, {}", value_name(*base), value_name(*offset))
        }
        InstKind::Bitcast { value } => cast_text("bitcast", *value, data.result_ty, types, ast, value_name),
        InstKind::IntTrunc { value } => cast_text("int_trunc", *value, data.result_ty, types, ast, value_name),
        InstKind::IntZext { value } => cast_text("int_zext", *value, data.result_ty, types, ast, value_name),
        InstKind::IntSext { value } => cast_text("int_sext", *value, data.result_ty, types, ast, value_name),
        InstKind::FloatTrunc { value } => cast_text("float_trunc", *value, data.result_ty, types, ast, value_name),
        InstKind::FloatExt { value } => cast_text("float_ext", *value, data.result_ty, types, ast, value_name),
        InstKind::FloatToInt { value } => cast_text("float_to_int", *value, data.result_ty, types, ast, value_name),
        InstKind::IntToFloat { value } => cast_text("int_to_float", *value, data.result_ty, types, ast, value_name),
        InstKind::CastIntToPtr { value } => cast_text("cast_int_to_ptr", *value, data.result_ty, types, ast, value_name),
        InstKind::CastPtrToInt { value } => cast_text("cast_ptr_to_int", *value, data.result_ty, types, ast, value_name),
        InstKind::Call { callee, args } => match callee {
            Callee::Direct(target) => format!(
                "call @{}({})",
                module.functions[*target].name,
                list(args)
            ),
            Callee::Indirect(value) => format!("call {}({})", value_name(*value), list(args)),
        },
        InstKind::FunctionPtr { function: target } => {
            format!("function_ptr @{}", module.functions[*target].name)
        }
        InstKind::GlobalPtr { global } => format!("global_ptr @{}", module.globals[*global].name),
        InstKind::EnumVariant { case } => format!("enum_variant #{case}"),
        InstKind::Br { dest, args } => {
            if args.is_empty() {
                format!("br {}", function.blocks[*dest].label)
            } else {
                format!("br {}({})", function.blocks[*dest].label, list(args))
            }
        }
        InstKind::CondBr {
            cond,
            then_dest,
            then_args,
            else_dest,
            else_args,
        } => {
            let edge = |dest: &crate::gil::BlockId, args: &[Value]| {
                if args.is_empty() {
                    function.blocks[*dest].label.clone()
                } else {
                    format!("{}({})", function.blocks[*dest].label, list(args))
                }
            };
            format!(
                "cond_br {}, {}, {}",
                value_name(*cond),
                edge(then_dest, then_args),
                edge(else_dest, else_args)
            )
        }
        InstKind::Ret { value } => match value {
            Some(value) => format!("ret {}", value_name(*value)),
            None => "ret void".to_string(),
        },
        InstKind::Unreachable => "unreachable".to_string(),
        InstKind::Drop { value } => format!("drop {}", value_name(*value)),
        InstKind::Debug {
            name,
            value,
            binding,
        } => {
            let kind = match binding {
                crate::gil::DebugBinding::Var => "var",
                crate::gil::DebugBinding::Let => "let",
                crate::gil::DebugBinding::Arg => "arg",
            };
            format!("debug {kind} \"{name}\" = {}", value_name(*value))
        }
    };
    format!("{prefix}{body}")
}

fn cast_text(
    name: &str,
    value: Value,
    result_ty: Option<galec_ast::TyId>,
    types: &TypeArena,
    ast: &Ast,
    value_name: &dyn Fn(Value) -> String,
) -> String {
    match result_ty {
        Some(ty) => format!(
            "{name} {} to ${}",
            value_name(value),
            display_type(types, ast, ty)
        ),
        None => format!("{name} {}", value_name(value)),
    }
}
