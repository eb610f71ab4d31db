//! GIL to LIR lowering.
//!
//! The translation is one-to-one on the operation set: block arguments
//! become PHI nodes in the destination block (incoming edges gathered from
//! branch argument lists), allocas are hoisted to the entry block, literal
//! results become immediates, and debug markers vanish. Ownership
//! operations must already be lowered: a surviving `drop` is an internal
//! error, not a code-generation concern.

use galec_ast::{TyId, Type, TypeArena};
use galec_util::FxHashMap;
use thiserror::Error;

use galec_gil::{
    BlockId, Callee, Function, GilModule, InstKind, Value,
};

use crate::lir::{
    CastKind, LirBlock, LirFunction, LirInst, LirModule, LirTerminator, LirValue, Phi, Reg,
};

/// Errors raised when a module is not in lowerable form.
#[derive(Debug, Error)]
pub enum LowerError {
    /// A `drop` reached lowering; the drop-lowering pass must run first.
    #[error("function '{function}' still contains a drop instruction")]
    DropSurvived { function: String },

    /// An operand was used without a visible definition.
    #[error("function '{function}' uses an undefined value")]
    UndefinedValue { function: String },
}

/// Lower a whole GIL module.
pub fn lower_module(module: &GilModule, types: &TypeArena) -> Result<LirModule, LowerError> {
    let mut lir = LirModule {
        name: module.name.clone(),
        globals: Vec::new(),
        functions: Vec::new(),
    };
    for global in module.globals.iter() {
        lir.globals.push((global.name.clone(), global.ty));
    }
    for function in module.functions.iter() {
        lir.functions.push(lower_function(module, function, types)?);
    }
    Ok(lir)
}

fn function_signature(types: &TypeArena, ty: TyId) -> (Vec<TyId>, Option<TyId>) {
    match types.get(types.resolve_alias(ty)) {
        Type::Function { params, ret, .. } => {
            let ret = *ret;
            let ret = match types.get(types.resolve_alias(ret)) {
                Type::Void => None,
                _ => Some(ret),
            };
            (params.clone(), ret)
        }
        _ => (Vec::new(), None),
    }
}

struct Lowering<'a> {
    function: &'a Function,
    values: FxHashMap<Value, LirValue>,
    next_reg: u32,
    /// Block position in the output, by GIL block id.
    block_index: FxHashMap<BlockId, usize>,
}

impl<'a> Lowering<'a> {
    fn fresh_reg(&mut self) -> Reg {
        let reg = Reg(self.next_reg);
        self.next_reg += 1;
        reg
    }

    fn label(&self, block: BlockId) -> String {
        // GIL labels repeat across sibling constructs; suffix the block id
        // so LIR labels are unique within the function.
        let base = &self.function.blocks[block].label;
        if Some(block) == self.function.entry_block() {
            base.clone()
        } else {
            format!("{}.{}", base, block.0)
        }
    }

    fn operand(&self, value: Value) -> Result<LirValue, LowerError> {
        self.values
            .get(&value)
            .cloned()
            .ok_or_else(|| LowerError::UndefinedValue {
                function: self.function.name.clone(),
            })
    }
}

fn lower_function(
    module: &GilModule,
    function: &Function,
    types: &TypeArena,
) -> Result<LirFunction, LowerError> {
    let (params, ret) = function_signature(types, function.ty);
    let mut lowering = Lowering {
        function,
        values: FxHashMap::default(),
        next_reg: 0,
        block_index: FxHashMap::default(),
    };

    if function.is_declaration() {
        return Ok(LirFunction {
            name: function.name.clone(),
            params,
            ret,
            blocks: Vec::new(),
        });
    }

    let entry = function.entry_block().expect("non-declaration has entry");

    // Pass 1: registers for parameters, block arguments, and instruction
    // results; literal results become immediates instead.
    for (index, _) in function.blocks[entry].args.iter().enumerate() {
        let reg = lowering.fresh_reg();
        lowering
            .values
            .insert(Value::BlockArg { block: entry, index }, LirValue::Reg(reg));
    }
    let mut block_phis: FxHashMap<BlockId, Vec<Phi>> = FxHashMap::default();
    for (position, &block) in function.block_order.iter().enumerate() {
        lowering.block_index.insert(block, position);
        if block != entry {
            let mut phis = Vec::new();
            for (index, &ty) in function.blocks[block].args.iter().enumerate() {
                let reg = lowering.fresh_reg();
                lowering
                    .values
                    .insert(Value::BlockArg { block, index }, LirValue::Reg(reg));
                phis.push(Phi {
                    dest: reg,
                    ty,
                    incoming: Vec::new(),
                });
            }
            block_phis.insert(block, phis);
        }
    }
    for &block in &function.block_order {
        for &inst in &function.blocks[block].insts {
            let data = &function.insts[inst];
            if data.result_ty.is_none() {
                continue;
            }
            let value = Value::result(inst);
            let mapped = match &data.kind {
                InstKind::IntLiteral { value } => LirValue::IntConst(*value),
                InstKind::FloatLiteral { value } => LirValue::FloatConst(*value),
                InstKind::BoolLiteral { value } => LirValue::BoolConst(*value),
                InstKind::StringLiteral { value } => LirValue::StringConst(*value),
                InstKind::FunctionPtr { function: target } => {
                    LirValue::Function(module.functions[*target].name.clone())
                }
                InstKind::GlobalPtr { global } => {
                    LirValue::Global(module.globals[*global].name.clone())
                }
                InstKind::EnumVariant { case } => {
                    let case_value = data
                        .result_ty
                        .map(|ty| types.resolve_alias(ty))
                        .and_then(|ty| match types.get(ty) {
                            Type::Enum { cases, .. } => cases
                                .iter()
                                .find(|c| c.name == *case)
                                .map(|c| c.value),
                            _ => None,
                        })
                        .unwrap_or(0);
                    LirValue::IntConst(case_value)
                }
                _ => LirValue::Reg(lowering.fresh_reg()),
            };
            lowering.values.insert(value, mapped);
        }
    }

    // Pass 2: emit blocks; allocas land at the entry block's head.
    let mut hoisted_allocas: Vec<LirInst> = Vec::new();
    let mut blocks: Vec<LirBlock> = Vec::new();
    for &block in &function.block_order {
        let mut insts: Vec<LirInst> = Vec::new();
        let mut terminator = LirTerminator::Unreachable;

        for &inst in &function.blocks[block].insts {
            let data = &function.insts[inst];
            let dest = || match lowering.values.get(&Value::result(inst)) {
                Some(LirValue::Reg(reg)) => Some(*reg),
                _ => None,
            };
            match &data.kind {
                // Literal-like results were folded to immediates in pass 1.
                InstKind::IntLiteral { .. }
                | InstKind::FloatLiteral { .. }
                | InstKind::BoolLiteral { .. }
                | InstKind::StringLiteral { .. }
                | InstKind::FunctionPtr { .. }
                | InstKind::GlobalPtr { .. }
                | InstKind::EnumVariant { .. } => {}
                InstKind::Debug { .. } => {}
                InstKind::Drop { .. } => {
                    return Err(LowerError::DropSurvived {
                        function: function.name.clone(),
                    });
                }
                InstKind::Alloca { ty } => {
                    if let Some(dest) = dest() {
                        hoisted_allocas.push(LirInst::Alloca { dest, ty: *ty });
                    }
                }
                InstKind::Load { ptr, .. } => {
                    if let Some(dest) = dest() {
                        insts.push(LirInst::Load {
                            dest,
                            ptr: lowering.operand(*ptr)?,
                        });
                    }
                }
                InstKind::Store { value, ptr, .. } => {
                    insts.push(LirInst::Store {
                        value: lowering.operand(*value)?,
                        ptr: lowering.operand(*ptr)?,
                    });
                }
                InstKind::StructCreate { fields } => {
                    if let Some(dest) = dest() {
                        let fields = fields
                            .iter()
                            .map(|&v| lowering.operand(v))
                            .collect::<Result<Vec<_>, _>>()?;
                        insts.push(LirInst::Aggregate { dest, fields });
                    }
                }
                InstKind::ArrayCreate { elems } => {
                    if let Some(dest) = dest() {
                        let fields = elems
                            .iter()
                            .map(|&v| lowering.operand(v))
                            .collect::<Result<Vec<_>, _>>()?;
                        insts.push(LirInst::Aggregate { dest, fields });
                    }
                }
                InstKind::StructExtract { value, member } => {
                    if let Some(dest) = dest() {
                        insts.push(LirInst::ExtractValue {
                            dest,
                            base: lowering.operand(*value)?,
                            index: member.index,
                        });
                    }
                }
                InstKind::StructFieldPtr { ptr, member } => {
                    if let Some(dest) = dest() {
                        insts.push(LirInst::FieldPtr {
                            dest,
                            base: lowering.operand(*ptr)?,
                            index: member.index,
                        });
                    }
                }
                InstKind::PtrOffset { base, offset } => {
                    if let Some(dest) = dest() {
                        insts.push(LirInst::ElementPtr {
                            dest,
                            base: lowering.operand(*base)?,
                            offset: lowering.operand(*offset)?,
                        });
                    }
                }
                InstKind::Bitcast { value } => {
                    lower_cast(&mut insts, &lowering, inst, CastKind::Bitcast, *value, dest())?;
                }
                InstKind::IntTrunc { value } => {
                    lower_cast(&mut insts, &lowering, inst, CastKind::Trunc, *value, dest())?;
                }
                InstKind::IntZext { value } => {
                    lower_cast(&mut insts, &lowering, inst, CastKind::Zext, *value, dest())?;
                }
                InstKind::IntSext { value } => {
                    lower_cast(&mut insts, &lowering, inst, CastKind::Sext, *value, dest())?;
                }
                InstKind::FloatTrunc { value } => {
                    lower_cast(&mut insts, &lowering, inst, CastKind::FpTrunc, *value, dest())?;
                }
                InstKind::FloatExt { value } => {
                    lower_cast(&mut insts, &lowering, inst, CastKind::FpExt, *value, dest())?;
                }
                InstKind::FloatToInt { value } => {
                    lower_cast(&mut insts, &lowering, inst, CastKind::FpToInt, *value, dest())?;
                }
                InstKind::IntToFloat { value } => {
                    lower_cast(&mut insts, &lowering, inst, CastKind::IntToFp, *value, dest())?;
                }
                InstKind::CastIntToPtr { value } => {
                    lower_cast(&mut insts, &lowering, inst, CastKind::IntToPtr, *value, dest())?;
                }
                InstKind::CastPtrToInt { value } => {
                    lower_cast(&mut insts, &lowering, inst, CastKind::PtrToInt, *value, dest())?;
                }
                InstKind::Call { callee, args } => {
                    let callee = match callee {
                        Callee::Direct(target) => {
                            LirValue::Function(module.functions[*target].name.clone())
                        }
                        Callee::Indirect(value) => lowering.operand(*value)?,
                    };
                    let args = args
                        .iter()
                        .map(|&v| lowering.operand(v))
                        .collect::<Result<Vec<_>, _>>()?;
                    insts.push(LirInst::Call {
                        dest: dest(),
                        callee,
                        args,
                    });
                }
                InstKind::Br { dest: target, args } => {
                    record_phi_incoming(&lowering, &mut block_phis, block, *target, args)?;
                    terminator = LirTerminator::Br {
                        dest: lowering.label(*target),
                    };
                }
                InstKind::CondBr {
                    cond,
                    then_dest,
                    then_args,
                    else_dest,
                    else_args,
                } => {
                    record_phi_incoming(&lowering, &mut block_phis, block, *then_dest, then_args)?;
                    record_phi_incoming(&lowering, &mut block_phis, block, *else_dest, else_args)?;
                    terminator = LirTerminator::CondBr {
                        cond: lowering.operand(*cond)?,
                        then_dest: lowering.label(*then_dest),
                        else_dest: lowering.label(*else_dest),
                    };
                }
                InstKind::Ret { value } => {
                    let value = match value {
                        Some(value) => Some(lowering.operand(*value)?),
                        None => None,
                    };
                    terminator = LirTerminator::Ret { value };
                }
                InstKind::Unreachable => {
                    terminator = LirTerminator::Unreachable;
                }
            }
        }

        blocks.push(LirBlock {
            label: lowering.label(block),
            phis: Vec::new(),
            insts,
            terminator,
        });
    }

    // Attach the gathered PHIs and hoist the allocas.
    for (&block, phis) in &block_phis {
        let position = lowering.block_index[&block];
        blocks[position].phis = phis.clone();
    }
    if let Some(entry_block) = blocks.first_mut() {
        hoisted_allocas.append(&mut entry_block.insts);
        entry_block.insts = hoisted_allocas;
    }

    Ok(LirFunction {
        name: function.name.clone(),
        params,
        ret,
        blocks,
    })
}

fn lower_cast(
    insts: &mut Vec<LirInst>,
    lowering: &Lowering<'_>,
    inst: galec_gil::InstId,
    kind: CastKind,
    value: Value,
    dest: Option<Reg>,
) -> Result<(), LowerError> {
    let Some(dest) = dest else {
        return Ok(());
    };
    let ty = lowering.function.insts[inst]
        .result_ty
        .expect("cast has a result type");
    insts.push(LirInst::Cast {
        dest,
        kind,
        value: lowering.operand(value)?,
        ty,
    });
    Ok(())
}

/// Record one branch edge's arguments as PHI incoming values in the
/// destination block.
fn record_phi_incoming(
    lowering: &Lowering<'_>,
    block_phis: &mut FxHashMap<BlockId, Vec<Phi>>,
    from: BlockId,
    to: BlockId,
    args: &[Value],
) -> Result<(), LowerError> {
    if args.is_empty() {
        return Ok(());
    }
    let from_label = lowering.label(from);
    if let Some(phis) = block_phis.get_mut(&to) {
        for (phi, &arg) in phis.iter_mut().zip(args.iter()) {
            let value = lowering.operand(arg)?;
            phi.incoming.push((from_label.clone(), value));
        }
    }
    Ok(())
}
