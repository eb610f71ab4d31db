//! The GIL data model.
//!
//! A module owns functions and globals; a function owns arenas of basic
//! blocks and instructions plus an explicit block order. Blocks carry typed
//! arguments in place of PHI nodes; every block ends in exactly one
//! terminator, and branches supply an argument list matching their
//! destination's parameters. A [`Value`] names either a block argument or
//! an instruction result.

use galec_ast::{DeclId, TyId};
use galec_util::{define_idx, FxHashMap, IndexVec, Span, Symbol};

define_idx! {
    /// Handle to a function within a [`GilModule`].
    pub struct FunctionId;
}

define_idx! {
    /// Handle to a basic block within a function.
    pub struct BlockId;
}

define_idx! {
    /// Handle to an instruction within a function.
    pub struct InstId;
}

define_idx! {
    /// Handle to a global within a [`GilModule`].
    pub struct GlobalId;
}

/// Ownership semantics of a load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOwnership {
    /// Plain read, no ownership transfer.
    None,
    /// Reading duplicates the value.
    Copy,
    /// Reading moves the value out, leaving the source uninitialized.
    Take,
}

/// Ownership semantics of a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOwnership {
    /// Not yet decided; resolved by the uninitialized-detection pass.
    Unknown,
    /// First write to the location.
    Init,
    /// Overwrite of a previously live value.
    Set,
}

/// What kind of binding a debug marker names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebugBinding {
    Var,
    Let,
    Arg,
}

/// A GIL value: a block argument or an instruction result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    BlockArg { block: BlockId, index: usize },
    InstResult { inst: InstId, index: usize },
}

impl Value {
    pub fn result(inst: InstId) -> Self {
        Value::InstResult { inst, index: 0 }
    }

    /// The instruction defining this value, if it is a result.
    pub fn defining_inst(self) -> Option<InstId> {
        match self {
            Value::InstResult { inst, .. } => Some(inst),
            Value::BlockArg { .. } => None,
        }
    }
}

/// A struct member reference: name, field type, and the struct it belongs
/// to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub name: Symbol,
    pub field_ty: TyId,
    pub parent: TyId,
    pub index: usize,
}

/// Call target: a module function or a function-pointer value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Callee {
    Direct(FunctionId),
    Indirect(Value),
}

/// Instruction kinds.
#[derive(Clone, Debug)]
pub enum InstKind {
    IntLiteral { value: i64 },
    FloatLiteral { value: f64 },
    BoolLiteral { value: bool },
    StringLiteral { value: Symbol },
    /// Stack slot; the result is a pointer to the allocated type.
    Alloca { ty: TyId },
    Load { ptr: Value, ownership: LoadOwnership },
    Store {
        value: Value,
        ptr: Value,
        ownership: StoreOwnership,
    },
    StructCreate { fields: Vec<Value> },
    ArrayCreate { elems: Vec<Value> },
    StructExtract { value: Value, member: Member },
    StructFieldPtr { ptr: Value, member: Member },
    PtrOffset { base: Value, offset: Value },
    Bitcast { value: Value },
    IntTrunc { value: Value },
    IntZext { value: Value },
    IntSext { value: Value },
    FloatTrunc { value: Value },
    FloatExt { value: Value },
    FloatToInt { value: Value },
    IntToFloat { value: Value },
    CastIntToPtr { value: Value },
    CastPtrToInt { value: Value },
    Call { callee: Callee, args: Vec<Value> },
    FunctionPtr { function: FunctionId },
    GlobalPtr { global: GlobalId },
    EnumVariant { case: Symbol },
    Br { dest: BlockId, args: Vec<Value> },
    CondBr {
        cond: Value,
        then_dest: BlockId,
        then_args: Vec<Value>,
        else_dest: BlockId,
        else_args: Vec<Value>,
    },
    Ret { value: Option<Value> },
    Unreachable,
    /// Ownership marker: the value's lifetime ends here.
    Drop { value: Value },
    /// Name binding marker for debug info.
    Debug {
        name: Symbol,
        value: Value,
        binding: DebugBinding,
    },
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Br { .. }
                | InstKind::CondBr { .. }
                | InstKind::Ret { .. }
                | InstKind::Unreachable
        )
    }

    /// The values this instruction reads.
    pub fn operands(&self) -> Vec<Value> {
        match self {
            InstKind::Load { ptr, .. } => vec![*ptr],
            InstKind::Store { value, ptr, .. } => vec![*value, *ptr],
            InstKind::StructCreate { fields } => fields.clone(),
            InstKind::ArrayCreate { elems } => elems.clone(),
            InstKind::StructExtract { value, .. } => vec![*value],
            InstKind::StructFieldPtr { ptr, .. } => vec![*ptr],
            InstKind::PtrOffset { base, offset } => vec![*base, *offset],
            InstKind::Bitcast { value }
            | InstKind::IntTrunc { value }
            | InstKind::IntZext { value }
            | InstKind::IntSext { value }
            | InstKind::FloatTrunc { value }
            | InstKind::FloatExt { value }
            | InstKind::FloatToInt { value }
            | InstKind::IntToFloat { value }
            | InstKind::CastIntToPtr { value }
            | InstKind::CastPtrToInt { value } => vec![*value],
            InstKind::Call { callee, args } => {
                let mut operands = Vec::with_capacity(args.len() + 1);
                if let Callee::Indirect(value) = callee {
                    operands.push(*value);
                }
                operands.extend(args.iter().copied());
                operands
            }
            InstKind::Br { args, .. } => args.clone(),
            InstKind::CondBr {
                cond,
                then_args,
                else_args,
                ..
            } => {
                let mut operands = vec![*cond];
                operands.extend(then_args.iter().copied());
                operands.extend(else_args.iter().copied());
                operands
            }
            InstKind::Ret { value } => value.iter().copied().collect(),
            InstKind::Drop { value } => vec![*value],
            InstKind::Debug { value, .. } => vec![*value],
            _ => Vec::new(),
        }
    }

    /// Rewrite every operand equal to `old` into `new`.
    pub fn replace_operand(&mut self, old: Value, new: Value) {
        let replace = |v: &mut Value| {
            if *v == old {
                *v = new;
            }
        };
        match self {
            InstKind::Load { ptr, .. } => replace(ptr),
            InstKind::Store { value, ptr, .. } => {
                replace(value);
                replace(ptr);
            }
            InstKind::StructCreate { fields } => fields.iter_mut().for_each(replace),
            InstKind::ArrayCreate { elems } => elems.iter_mut().for_each(replace),
            InstKind::StructExtract { value, .. } => replace(value),
            InstKind::StructFieldPtr { ptr, .. } => replace(ptr),
            InstKind::PtrOffset { base, offset } => {
                replace(base);
                replace(offset);
            }
            InstKind::Bitcast { value }
            | InstKind::IntTrunc { value }
            | InstKind::IntZext { value }
            | InstKind::IntSext { value }
            | InstKind::FloatTrunc { value }
            | InstKind::FloatExt { value }
            | InstKind::FloatToInt { value }
            | InstKind::IntToFloat { value }
            | InstKind::CastIntToPtr { value }
            | InstKind::CastPtrToInt { value } => replace(value),
            InstKind::Call { callee, args } => {
                if let Callee::Indirect(value) = callee {
                    replace(value);
                }
                args.iter_mut().for_each(replace);
            }
            InstKind::Br { args, .. } => args.iter_mut().for_each(replace),
            InstKind::CondBr {
                cond,
                then_args,
                else_args,
                ..
            } => {
                replace(cond);
                then_args.iter_mut().for_each(replace);
                else_args.iter_mut().for_each(replace);
            }
            InstKind::Ret { value } => {
                if let Some(value) = value {
                    replace(value);
                }
            }
            InstKind::Drop { value } => replace(value),
            InstKind::Debug { value, .. } => replace(value),
            _ => {}
        }
    }
}

/// An instruction: kind, optional result type, and source span.
#[derive(Clone, Debug)]
pub struct Inst {
    pub kind: InstKind,
    /// The result's type; `None` for instructions without results.
    pub result_ty: Option<TyId>,
    pub span: Span,
}

/// A basic block.
#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub label: String,
    /// Typed block arguments, the PHI replacement.
    pub args: Vec<TyId>,
    /// Instructions in execution order; the last one is the terminator.
    pub insts: Vec<InstId>,
}

/// A GIL function.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    /// The function type, always `Type::Function`.
    pub ty: TyId,
    /// Originating declaration, absent for synthetic functions.
    pub decl: Option<DeclId>,
    pub blocks: IndexVec<BlockId, BasicBlock>,
    pub insts: IndexVec<InstId, Inst>,
    /// Live blocks in layout order; the first is the entry block. Removed
    /// blocks leave the arena in place but drop out of this list.
    pub block_order: Vec<BlockId>,
}

impl Function {
    pub fn new(name: impl Into<String>, ty: TyId, decl: Option<DeclId>) -> Self {
        Self {
            name: name.into(),
            ty,
            decl,
            blocks: IndexVec::new(),
            insts: IndexVec::new(),
            block_order: Vec::new(),
        }
    }

    /// True for declarations without bodies (externs).
    pub fn is_declaration(&self) -> bool {
        self.block_order.is_empty()
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        self.block_order.first().copied()
    }

    pub fn add_block(&mut self, label: impl Into<String>, args: Vec<TyId>) -> BlockId {
        let block = self.blocks.push(BasicBlock {
            label: label.into(),
            args,
            insts: Vec::new(),
        });
        self.block_order.push(block);
        block
    }

    /// Remove a block from the layout. Its instructions stay in the arena
    /// but are no longer reachable through the block order.
    pub fn remove_block(&mut self, block: BlockId) {
        self.block_order.retain(|&b| b != block);
    }

    /// The block's terminator, if its last instruction is one.
    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        let &last = self.blocks[block].insts.last()?;
        self.insts[last].kind.is_terminator().then_some(last)
    }

    /// Successor blocks reached from a block's terminator.
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        match self.terminator(block).map(|t| &self.insts[t].kind) {
            Some(InstKind::Br { dest, .. }) => vec![*dest],
            Some(InstKind::CondBr {
                then_dest,
                else_dest,
                ..
            }) => vec![*then_dest, *else_dest],
            _ => Vec::new(),
        }
    }

    /// The type of a value, if known.
    pub fn value_ty(&self, value: Value) -> Option<TyId> {
        match value {
            Value::BlockArg { block, index } => self.blocks[block].args.get(index).copied(),
            Value::InstResult { inst, .. } => self.insts[inst].result_ty,
        }
    }

    /// Instructions (in layout order) that read `value`.
    pub fn uses_of(&self, value: Value) -> Vec<InstId> {
        let mut uses = Vec::new();
        for &block in &self.block_order {
            for &inst in &self.blocks[block].insts {
                if self.insts[inst].kind.operands().contains(&value) {
                    uses.push(inst);
                }
            }
        }
        uses
    }

    /// True if `value` is read only by `user`.
    pub fn used_only_by(&self, value: Value, user: InstId) -> bool {
        self.uses_of(value).iter().all(|&u| u == user)
    }

    /// Replace every use of `old` with `new` across the function.
    pub fn replace_all_uses(&mut self, old: Value, new: Value) {
        for block in self.block_order.clone() {
            for inst in self.blocks[block].insts.clone() {
                self.insts[inst].kind.replace_operand(old, new);
            }
        }
    }

    /// Remove an instruction from its block. The arena slot remains but the
    /// instruction no longer executes.
    pub fn erase_inst(&mut self, inst: InstId) {
        for &block in &self.block_order {
            let insts = &mut self.blocks[block].insts;
            if let Some(pos) = insts.iter().position(|&i| i == inst) {
                insts.remove(pos);
                return;
            }
        }
    }

    /// The block currently containing an instruction.
    pub fn block_of(&self, inst: InstId) -> Option<BlockId> {
        self.block_order
            .iter()
            .copied()
            .find(|&b| self.blocks[b].insts.contains(&inst))
    }

    /// Check the structural invariants: every live block ends with exactly
    /// one terminator, terminators never appear mid-block, and branch
    /// argument lists match their destination's parameters.
    pub fn verify(&self) -> Result<(), String> {
        for &block in &self.block_order {
            let insts = &self.blocks[block].insts;
            let Some(&last) = insts.last() else {
                return Err(format!("block '{}' is empty", self.blocks[block].label));
            };
            if !self.insts[last].kind.is_terminator() {
                return Err(format!(
                    "block '{}' does not end with a terminator",
                    self.blocks[block].label
                ));
            }
            for &inst in &insts[..insts.len() - 1] {
                if self.insts[inst].kind.is_terminator() {
                    return Err(format!(
                        "terminator in the middle of block '{}'",
                        self.blocks[block].label
                    ));
                }
            }
            let mut check_edge = |dest: BlockId, args: &[Value]| -> Result<(), String> {
                if self.blocks[dest].args.len() != args.len() {
                    return Err(format!(
                        "branch to '{}' passes {} arguments, block takes {}",
                        self.blocks[dest].label,
                        args.len(),
                        self.blocks[dest].args.len()
                    ));
                }
                Ok(())
            };
            match &self.insts[last].kind {
                InstKind::Br { dest, args } => check_edge(*dest, args)?,
                InstKind::CondBr {
                    then_dest,
                    then_args,
                    else_dest,
                    else_args,
                    ..
                } => {
                    check_edge(*then_dest, then_args)?;
                    check_edge(*else_dest, else_args)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// A module-level global variable.
#[derive(Debug)]
pub struct Global {
    pub name: String,
    pub ty: TyId,
    pub decl: DeclId,
}

/// A GIL module: functions plus globals.
#[derive(Debug, Default)]
pub struct GilModule {
    pub name: String,
    pub functions: IndexVec<FunctionId, Function>,
    pub globals: IndexVec<GlobalId, Global>,
    fn_by_decl: FxHashMap<DeclId, FunctionId>,
    global_by_decl: FxHashMap<DeclId, GlobalId>,
}

impl GilModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_function(&mut self, function: Function) -> FunctionId {
        let decl = function.decl;
        let id = self.functions.push(function);
        if let Some(decl) = decl {
            self.fn_by_decl.insert(decl, id);
        }
        id
    }

    pub fn function_for_decl(&self, decl: DeclId) -> Option<FunctionId> {
        self.fn_by_decl.get(&decl).copied()
    }

    /// The function generated for a declaration, declaring a bodyless stub
    /// on first reference (externs and builtins).
    pub fn get_or_declare_function(
        &mut self,
        decl: DeclId,
        name: impl Into<String>,
        ty: TyId,
    ) -> FunctionId {
        if let Some(id) = self.fn_by_decl.get(&decl) {
            return *id;
        }
        self.add_function(Function::new(name, ty, Some(decl)))
    }

    pub fn get_or_create_global(
        &mut self,
        decl: DeclId,
        name: impl Into<String>,
        ty: TyId,
    ) -> GlobalId {
        if let Some(id) = self.global_by_decl.get(&decl) {
            return *id;
        }
        let id = self.globals.push(Global {
            name: name.into(),
            ty,
            decl,
        });
        self.global_by_decl.insert(decl, id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galec_ast::TypeArena;

    fn test_fn(types: &mut TypeArena) -> Function {
        let void = types.void();
        let ty = types.function(vec![], void);
        Function::new("f", ty, None)
    }

    #[test]
    fn test_single_terminator_verifies() {
        let mut types = TypeArena::new();
        let mut f = test_fn(&mut types);
        let entry = f.add_block("entry", vec![]);
        let ret = f.insts.push(Inst {
            kind: InstKind::Ret { value: None },
            result_ty: None,
            span: Span::DUMMY,
        });
        f.blocks[entry].insts.push(ret);
        assert!(f.verify().is_ok());
    }

    #[test]
    fn test_missing_terminator_fails_verify() {
        let mut types = TypeArena::new();
        let mut f = test_fn(&mut types);
        let entry = f.add_block("entry", vec![]);
        let i32 = types.int32();
        let lit = f.insts.push(Inst {
            kind: InstKind::IntLiteral { value: 0 },
            result_ty: Some(i32),
            span: Span::DUMMY,
        });
        f.blocks[entry].insts.push(lit);
        assert!(f.verify().is_err());
    }

    #[test]
    fn test_branch_arity_mismatch_fails_verify() {
        let mut types = TypeArena::new();
        let mut f = test_fn(&mut types);
        let i32 = types.int32();
        let entry = f.add_block("entry", vec![]);
        let target = f.add_block("target", vec![i32]);
        let br = f.insts.push(Inst {
            kind: InstKind::Br {
                dest: target,
                args: vec![],
            },
            result_ty: None,
            span: Span::DUMMY,
        });
        f.blocks[entry].insts.push(br);
        let ret = f.insts.push(Inst {
            kind: InstKind::Ret { value: None },
            result_ty: None,
            span: Span::DUMMY,
        });
        f.blocks[target].insts.push(ret);
        assert!(f.verify().is_err());
    }

    #[test]
    fn test_successors() {
        let mut types = TypeArena::new();
        let mut f = test_fn(&mut types);
        let bool_ty = types.bool_ty();
        let entry = f.add_block("entry", vec![]);
        let then_b = f.add_block("then", vec![]);
        let else_b = f.add_block("else", vec![]);
        let cond = f.insts.push(Inst {
            kind: InstKind::BoolLiteral { value: true },
            result_ty: Some(bool_ty),
            span: Span::DUMMY,
        });
        f.blocks[entry].insts.push(cond);
        let br = f.insts.push(Inst {
            kind: InstKind::CondBr {
                cond: Value::result(cond),
                then_dest: then_b,
                then_args: vec![],
                else_dest: else_b,
                else_args: vec![],
            },
            result_ty: None,
            span: Span::DUMMY,
        });
        f.blocks[entry].insts.push(br);
        assert_eq!(f.successors(entry), vec![then_b, else_b]);
    }

    #[test]
    fn test_replace_all_uses() {
        let mut types = TypeArena::new();
        let mut f = test_fn(&mut types);
        let i32 = types.int32();
        let entry = f.add_block("entry", vec![]);
        let a = f.insts.push(Inst {
            kind: InstKind::IntLiteral { value: 1 },
            result_ty: Some(i32),
            span: Span::DUMMY,
        });
        let b = f.insts.push(Inst {
            kind: InstKind::IntLiteral { value: 2 },
            result_ty: Some(i32),
            span: Span::DUMMY,
        });
        let ret = f.insts.push(Inst {
            kind: InstKind::Ret {
                value: Some(Value::result(a)),
            },
            result_ty: None,
            span: Span::DUMMY,
        });
        f.blocks[entry].insts.extend([a, b, ret]);

        f.replace_all_uses(Value::result(a), Value::result(b));
        match &f.insts[ret].kind {
            InstKind::Ret { value } => assert_eq!(*value, Some(Value::result(b))),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_uses_of_and_used_only_by() {
        let mut types = TypeArena::new();
        let mut f = test_fn(&mut types);
        let i32 = types.int32();
        let entry = f.add_block("entry", vec![]);
        let a = f.insts.push(Inst {
            kind: InstKind::IntLiteral { value: 1 },
            result_ty: Some(i32),
            span: Span::DUMMY,
        });
        let drop_inst = f.insts.push(Inst {
            kind: InstKind::Drop {
                value: Value::result(a),
            },
            result_ty: None,
            span: Span::DUMMY,
        });
        let ret = f.insts.push(Inst {
            kind: InstKind::Ret { value: None },
            result_ty: None,
            span: Span::DUMMY,
        });
        f.blocks[entry].insts.extend([a, drop_inst, ret]);

        assert_eq!(f.uses_of(Value::result(a)), vec![drop_inst]);
        assert!(f.used_only_by(Value::result(a), drop_inst));
    }
}
