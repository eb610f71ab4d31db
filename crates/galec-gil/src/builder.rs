//! Instruction builder.
//!
//! A [`GilBuilder`] wraps a module and one of its functions with an
//! insertion point. GIL generation appends at the end of the current block;
//! passes position the builder before an existing instruction to splice
//! replacement sequences in place.

use galec_ast::{DeclId, PointerKind, TyId, Type, TypeArena};
use galec_util::{Span, Symbol};

use crate::gil::{
    BlockId, Callee, DebugBinding, Function, FunctionId, GilModule, GlobalId, Inst, InstId,
    InstKind, LoadOwnership, StoreOwnership, Value,
};

/// Where the builder inserts the next instruction.
#[derive(Clone, Copy)]
enum InsertPoint {
    /// Append at the end of the block.
    End(BlockId),
    /// Insert before the instruction at this position of the block.
    Before(BlockId, InstId),
}

pub struct GilBuilder<'a> {
    pub module: &'a mut GilModule,
    pub types: &'a mut TypeArena,
    function: FunctionId,
    point: Option<InsertPoint>,
    /// Span stamped onto built instructions.
    span: Span,
}

impl<'a> GilBuilder<'a> {
    pub fn new(
        module: &'a mut GilModule,
        types: &'a mut TypeArena,
        function: FunctionId,
    ) -> Self {
        Self {
            module,
            types,
            function,
            point: None,
            span: Span::DUMMY,
        }
    }

    pub fn function_id(&self) -> FunctionId {
        self.function
    }

    pub fn func(&self) -> &Function {
        &self.module.functions[self.function]
    }

    pub fn func_mut(&mut self) -> &mut Function {
        &mut self.module.functions[self.function]
    }

    pub fn set_span(&mut self, span: Span) {
        self.span = span;
    }

    pub fn span(&self) -> Span {
        self.span
    }

    /// Position at the end of a block.
    pub fn position_at_end(&mut self, block: BlockId) {
        self.point = Some(InsertPoint::End(block));
    }

    /// Position just before an existing instruction.
    pub fn position_before(&mut self, block: BlockId, inst: InstId) {
        self.point = Some(InsertPoint::Before(block, inst));
    }

    /// The block instructions are currently inserted into.
    pub fn current_block(&self) -> Option<BlockId> {
        match self.point? {
            InsertPoint::End(block) | InsertPoint::Before(block, _) => Some(block),
        }
    }

    /// Create a new block in the current function.
    pub fn add_block(&mut self, label: &str, args: Vec<TyId>) -> BlockId {
        self.func_mut().add_block(label, args)
    }

    /// Fresh insertion target for code following a diverging statement.
    /// Nothing branches to it; trailing dead code or the function epilogue
    /// terminates it, and dead-code elimination removes it.
    pub fn add_dead_block(&mut self) -> BlockId {
        self.add_block("unreachable", vec![])
    }

    fn insert(&mut self, kind: InstKind, result_ty: Option<TyId>) -> InstId {
        let span = self.span;
        let inst = self.func_mut().insts.push(Inst {
            kind,
            result_ty,
            span,
        });
        match self.point.expect("builder has no insertion point") {
            InsertPoint::End(block) => self.func_mut().blocks[block].insts.push(inst),
            InsertPoint::Before(block, before) => {
                let insts = &mut self.func_mut().blocks[block].insts;
                let pos = insts
                    .iter()
                    .position(|&i| i == before)
                    .expect("insertion anchor not in block");
                insts.insert(pos, inst);
            }
        }
        inst
    }

    // Literals

    pub fn build_int_literal(&mut self, ty: TyId, value: i64) -> Value {
        Value::result(self.insert(InstKind::IntLiteral { value }, Some(ty)))
    }

    pub fn build_float_literal(&mut self, ty: TyId, value: f64) -> Value {
        Value::result(self.insert(InstKind::FloatLiteral { value }, Some(ty)))
    }

    pub fn build_bool_literal(&mut self, value: bool) -> Value {
        let ty = self.types.bool_ty();
        Value::result(self.insert(InstKind::BoolLiteral { value }, Some(ty)))
    }

    pub fn build_string_literal(&mut self, ty: TyId, value: Symbol) -> Value {
        Value::result(self.insert(InstKind::StringLiteral { value }, Some(ty)))
    }

    // Memory

    pub fn build_alloca(&mut self, ty: TyId) -> Value {
        let ptr_ty = self.types.pointer(ty, PointerKind::Raw);
        Value::result(self.insert(InstKind::Alloca { ty }, Some(ptr_ty)))
    }

    pub fn build_load(&mut self, ptr: Value, ownership: LoadOwnership) -> Value {
        let pointee = self.pointee_ty(ptr);
        Value::result(self.insert(InstKind::Load { ptr, ownership }, pointee))
    }

    pub fn build_load_copy(&mut self, ptr: Value) -> Value {
        self.build_load(ptr, LoadOwnership::Copy)
    }

    pub fn build_load_take(&mut self, ptr: Value) -> Value {
        self.build_load(ptr, LoadOwnership::Take)
    }

    /// Store with undecided ownership; the detect-uninitialized pass fills
    /// it in.
    pub fn build_store(&mut self, value: Value, ptr: Value) -> InstId {
        self.insert(
            InstKind::Store {
                value,
                ptr,
                ownership: StoreOwnership::Unknown,
            },
            None,
        )
    }

    pub fn build_store_init(&mut self, value: Value, ptr: Value) -> InstId {
        self.insert(
            InstKind::Store {
                value,
                ptr,
                ownership: StoreOwnership::Init,
            },
            None,
        )
    }

    // Aggregates

    pub fn build_struct_create(&mut self, ty: TyId, fields: Vec<Value>) -> Value {
        Value::result(self.insert(InstKind::StructCreate { fields }, Some(ty)))
    }

    pub fn build_array_create(&mut self, ty: TyId, elems: Vec<Value>) -> Value {
        Value::result(self.insert(InstKind::ArrayCreate { elems }, Some(ty)))
    }

    pub fn build_struct_extract(&mut self, value: Value, member: crate::gil::Member) -> Value {
        let field_ty = member.field_ty;
        Value::result(self.insert(InstKind::StructExtract { value, member }, Some(field_ty)))
    }

    pub fn build_struct_field_ptr(&mut self, ptr: Value, member: crate::gil::Member) -> Value {
        let field_ptr_ty = self.types.pointer(member.field_ty, PointerKind::Raw);
        Value::result(self.insert(InstKind::StructFieldPtr { ptr, member }, Some(field_ptr_ty)))
    }

    pub fn build_ptr_offset(&mut self, base: Value, offset: Value) -> Value {
        let ty = self.func().value_ty(base);
        Value::result(self.insert(InstKind::PtrOffset { base, offset }, ty))
    }

    // Casts

    pub fn build_bitcast(&mut self, ty: TyId, value: Value) -> Value {
        Value::result(self.insert(InstKind::Bitcast { value }, Some(ty)))
    }

    pub fn build_int_trunc(&mut self, ty: TyId, value: Value) -> Value {
        Value::result(self.insert(InstKind::IntTrunc { value }, Some(ty)))
    }

    pub fn build_int_zext(&mut self, ty: TyId, value: Value) -> Value {
        Value::result(self.insert(InstKind::IntZext { value }, Some(ty)))
    }

    pub fn build_int_sext(&mut self, ty: TyId, value: Value) -> Value {
        Value::result(self.insert(InstKind::IntSext { value }, Some(ty)))
    }

    pub fn build_float_trunc(&mut self, ty: TyId, value: Value) -> Value {
        Value::result(self.insert(InstKind::FloatTrunc { value }, Some(ty)))
    }

    pub fn build_float_ext(&mut self, ty: TyId, value: Value) -> Value {
        Value::result(self.insert(InstKind::FloatExt { value }, Some(ty)))
    }

    pub fn build_float_to_int(&mut self, ty: TyId, value: Value) -> Value {
        Value::result(self.insert(InstKind::FloatToInt { value }, Some(ty)))
    }

    pub fn build_int_to_float(&mut self, ty: TyId, value: Value) -> Value {
        Value::result(self.insert(InstKind::IntToFloat { value }, Some(ty)))
    }

    pub fn build_cast_int_to_ptr(&mut self, ty: TyId, value: Value) -> Value {
        Value::result(self.insert(InstKind::CastIntToPtr { value }, Some(ty)))
    }

    pub fn build_cast_ptr_to_int(&mut self, ty: TyId, value: Value) -> Value {
        Value::result(self.insert(InstKind::CastPtrToInt { value }, Some(ty)))
    }

    // Calls and references

    /// Direct call to a declared function.
    pub fn build_call(&mut self, decl: DeclId, name: &str, fn_ty: TyId, args: Vec<Value>) -> InstId {
        let target = self.module.get_or_declare_function(decl, name, fn_ty);
        let result_ty = self.call_result_ty(fn_ty);
        self.insert(
            InstKind::Call {
                callee: Callee::Direct(target),
                args,
            },
            result_ty,
        )
    }

    /// Indirect call through a function pointer value.
    pub fn build_call_indirect(&mut self, callee: Value, args: Vec<Value>) -> InstId {
        let result_ty = self
            .func()
            .value_ty(callee)
            .and_then(|ty| self.call_result_ty(ty));
        self.insert(
            InstKind::Call {
                callee: Callee::Indirect(callee),
                args,
            },
            result_ty,
        )
    }

    pub fn build_function_ptr(&mut self, ty: TyId, function: FunctionId) -> Value {
        Value::result(self.insert(InstKind::FunctionPtr { function }, Some(ty)))
    }

    pub fn build_global_ptr(&mut self, ty: TyId, global: GlobalId) -> Value {
        Value::result(self.insert(InstKind::GlobalPtr { global }, Some(ty)))
    }

    pub fn build_enum_variant(&mut self, ty: TyId, case: Symbol) -> Value {
        Value::result(self.insert(InstKind::EnumVariant { case }, Some(ty)))
    }

    // Terminators and markers

    pub fn build_br(&mut self, dest: BlockId) -> InstId {
        self.insert(
            InstKind::Br {
                dest,
                args: Vec::new(),
            },
            None,
        )
    }

    pub fn build_br_args(&mut self, dest: BlockId, args: Vec<Value>) -> InstId {
        self.insert(InstKind::Br { dest, args }, None)
    }

    pub fn build_cond_br(&mut self, cond: Value, then_dest: BlockId, else_dest: BlockId) -> InstId {
        self.build_cond_br_args(cond, then_dest, Vec::new(), else_dest, Vec::new())
    }

    pub fn build_cond_br_args(
        &mut self,
        cond: Value,
        then_dest: BlockId,
        then_args: Vec<Value>,
        else_dest: BlockId,
        else_args: Vec<Value>,
    ) -> InstId {
        self.insert(
            InstKind::CondBr {
                cond,
                then_dest,
                then_args,
                else_dest,
                else_args,
            },
            None,
        )
    }

    pub fn build_ret(&mut self, value: Value) -> InstId {
        self.insert(InstKind::Ret { value: Some(value) }, None)
    }

    pub fn build_ret_void(&mut self) -> InstId {
        self.insert(InstKind::Ret { value: None }, None)
    }

    pub fn build_unreachable(&mut self) -> InstId {
        self.insert(InstKind::Unreachable, None)
    }

    pub fn build_drop(&mut self, value: Value) -> InstId {
        self.insert(InstKind::Drop { value }, None)
    }

    /// Drop the value stored behind a slot pointer: the value is taken out
    /// of the slot and its lifetime ends.
    pub fn build_drop_ptr(&mut self, ptr: Value) -> InstId {
        let value = self.build_load_take(ptr);
        self.build_drop(value)
    }

    pub fn build_debug(&mut self, name: Symbol, value: Value, binding: DebugBinding) -> InstId {
        self.insert(
            InstKind::Debug {
                name,
                value,
                binding,
            },
            None,
        )
    }

    // Helpers

    fn pointee_ty(&self, ptr: Value) -> Option<TyId> {
        let ty = self.func().value_ty(ptr)?;
        match self.types.get(self.types.resolve_alias(ty)) {
            Type::Pointer { pointee, .. } => Some(*pointee),
            _ => None,
        }
    }

    fn call_result_ty(&self, fn_ty: TyId) -> Option<TyId> {
        match self.types.get(self.types.resolve_alias(fn_ty)) {
            Type::Function { ret, .. } => {
                let ret = *ret;
                match self.types.get(self.types.resolve_alias(ret)) {
                    Type::Void => None,
                    _ => Some(ret),
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_appends_in_order() {
        let mut types = TypeArena::new();
        let mut module = GilModule::new("test");
        let void = types.void();
        let fn_ty = types.function(vec![], void);
        let f = module.add_function(Function::new("f", fn_ty, None));

        let mut builder = GilBuilder::new(&mut module, &mut types, f);
        let entry = builder.add_block("entry", vec![]);
        builder.position_at_end(entry);
        let i32 = builder.types.int32();
        builder.build_int_literal(i32, 1);
        builder.build_ret_void();

        let func = &module.functions[f];
        assert_eq!(func.blocks[entry].insts.len(), 2);
        assert!(func.verify().is_ok());
    }

    #[test]
    fn test_position_before_splices() {
        let mut types = TypeArena::new();
        let mut module = GilModule::new("test");
        let void = types.void();
        let fn_ty = types.function(vec![], void);
        let f = module.add_function(Function::new("f", fn_ty, None));

        let mut builder = GilBuilder::new(&mut module, &mut types, f);
        let entry = builder.add_block("entry", vec![]);
        builder.position_at_end(entry);
        let ret = builder.build_ret_void();

        builder.position_before(entry, ret);
        let i32 = builder.types.int32();
        builder.build_int_literal(i32, 7);

        let func = &module.functions[f];
        let insts = &func.blocks[entry].insts;
        assert_eq!(insts.len(), 2);
        assert!(matches!(
            func.insts[insts[0]].kind,
            InstKind::IntLiteral { value: 7 }
        ));
        assert_eq!(insts[1], ret);
    }

    #[test]
    fn test_alloca_result_is_pointer() {
        let mut types = TypeArena::new();
        let mut module = GilModule::new("test");
        let void = types.void();
        let fn_ty = types.function(vec![], void);
        let f = module.add_function(Function::new("f", fn_ty, None));

        let mut builder = GilBuilder::new(&mut module, &mut types, f);
        let entry = builder.add_block("entry", vec![]);
        builder.position_at_end(entry);
        let i32 = builder.types.int32();
        let slot = builder.build_alloca(i32);

        let expected = builder.types.raw_pointer(i32);
        assert_eq!(builder.func().value_ty(slot), Some(expected));
    }

    #[test]
    fn test_drop_ptr_emits_take_then_drop() {
        let mut types = TypeArena::new();
        let mut module = GilModule::new("test");
        let void = types.void();
        let fn_ty = types.function(vec![], void);
        let f = module.add_function(Function::new("f", fn_ty, None));

        let mut builder = GilBuilder::new(&mut module, &mut types, f);
        let entry = builder.add_block("entry", vec![]);
        builder.position_at_end(entry);
        let i32 = builder.types.int32();
        let slot = builder.build_alloca(i32);
        builder.build_drop_ptr(slot);

        let func = &module.functions[f];
        let insts = &func.blocks[entry].insts;
        assert!(matches!(
            func.insts[insts[1]].kind,
            InstKind::Load {
                ownership: LoadOwnership::Take,
                ..
            }
        ));
        assert!(matches!(func.insts[insts[2]].kind, InstKind::Drop { .. }));
    }
}
