//! AST to GIL lowering.
//!
//! Each function with a body lowers to a GIL function whose entry block
//! takes the declared parameters. Local bindings live in stack slots; the
//! generator's own scope stack (distinct from sema's) maps declarations to
//! slot pointers and tracks which allocations each scope must drop on exit.
//! Control flow lowers to explicit blocks, short-circuit operators to a
//! one-argument result block, and scope exits emit drops in reverse
//! allocation order.

use galec_ast::{
    Ast, DeclId, DeclKind, ExprId, ExprKind, ForIteration, ForStmt, LiteralValue, RefTarget,
    Signedness, StmtId, StmtKind, TyId, Type, TypeArena,
};
use galec_sema::{builtins, ScopeTree};
use galec_util::{FxHashMap, Symbol};

use crate::builder::GilBuilder;
use crate::gil::{DebugBinding, Function, FunctionId, GilModule, Member, Value};

/// One lexical scope of the generator: variable slots and the allocations
/// to drop when the scope exits.
struct GenScope {
    vars: FxHashMap<DeclId, Value>,
    allocations: Vec<Value>,
    /// Break/continue destinations when this scope is a loop body.
    loop_dests: Option<(crate::gil::BlockId, crate::gil::BlockId)>,
}

impl GenScope {
    fn new() -> Self {
        Self {
            vars: FxHashMap::default(),
            allocations: Vec::new(),
            loop_dests: None,
        }
    }
}

pub struct GilGen<'a> {
    builder: GilBuilder<'a>,
    ast: &'a Ast,
    scopes: &'a ScopeTree,
    scope_stack: Vec<GenScope>,
}

/// Lower every function and global of a module into a fresh GIL module.
pub fn generate_module(
    module: &mut GilModule,
    types: &mut TypeArena,
    ast: &Ast,
    scopes: &ScopeTree,
    module_decl: DeclId,
) {
    let DeclKind::Module(m) = &ast.decls[module_decl].kind else {
        return;
    };
    generate_decls(module, types, ast, scopes, &m.decls.clone());
}

fn generate_decls(
    module: &mut GilModule,
    types: &mut TypeArena,
    ast: &Ast,
    scopes: &ScopeTree,
    decls: &[DeclId],
) {
    for &decl in decls {
        match &ast.decls[decl].kind {
            DeclKind::Function(f) if f.body.is_some() => {
                generate_function(module, types, ast, scopes, decl);
            }
            DeclKind::VarLet(v) if v.global => {
                generate_global(module, types, ast, scopes, decl, v.clone());
            }
            DeclKind::Namespace(n) => {
                let children = n.decls.clone();
                generate_decls(module, types, ast, scopes, &children);
            }
            _ => {}
        }
    }
}

/// Lower one function declaration with a body.
pub fn generate_function(
    module: &mut GilModule,
    types: &mut TypeArena,
    ast: &Ast,
    scopes: &ScopeTree,
    decl: DeclId,
) -> Option<FunctionId> {
    let function = ast.as_function(decl)?;
    let body = function.body?;
    let fn_ty = function.ty;
    let params = function.params.clone();
    let name = function.name.to_string();

    let param_tys = match types.get(types.resolve_alias(fn_ty)) {
        Type::Function { params, .. } => params.clone(),
        _ => return None,
    };
    let ret_ty = match types.get(types.resolve_alias(fn_ty)) {
        Type::Function { ret, .. } => *ret,
        _ => return None,
    };

    let id = module.get_or_declare_function(decl, &name, fn_ty);
    let mut builder = GilBuilder::new(module, types, id);
    builder.set_span(ast.decls[decl].span);
    let entry = builder.add_block("entry", param_tys.clone());
    builder.position_at_end(entry);

    let mut gen = GilGen {
        builder,
        ast,
        scopes,
        scope_stack: vec![GenScope::new()],
    };

    // Spill parameters into stack slots so they are addressable and
    // droppable like any other binding.
    for (i, &param) in params.iter().enumerate() {
        let Some(p) = ast.as_param(param) else {
            continue;
        };
        let slot = gen.builder.build_alloca(p.ty);
        let arg = Value::BlockArg {
            block: entry,
            index: i,
        };
        gen.builder.build_store_init(arg, slot);
        gen.builder.build_debug(p.name, slot, DebugBinding::Arg);
        let scope = gen.scope_stack.last_mut().expect("function scope");
        scope.vars.insert(param, slot);
        scope.allocations.push(slot);
    }

    gen.visit_compound_no_scope(body);

    // Fall-through exit: drop everything still in scope, then return.
    gen.drop_all_scopes();
    let ret_is_void = matches!(
        gen.builder.types.get(gen.builder.types.resolve_alias(ret_ty)),
        Type::Void
    );
    if ret_is_void {
        gen.builder.build_ret_void();
    } else {
        // A reachable unreachable here means a missing return; the checker
        // pass reports it.
        gen.builder.build_unreachable();
    }

    Some(id)
}

/// Lower a module-level binding: the global itself, its `.init` function
/// returning the initial value, and its `.dtor` function dropping it.
fn generate_global(
    module: &mut GilModule,
    types: &mut TypeArena,
    ast: &Ast,
    scopes: &ScopeTree,
    decl: DeclId,
    var: galec_ast::VarLetDecl,
) {
    let Some(ty) = var.ty else {
        return;
    };
    let global = module.get_or_create_global(decl, &var.name.to_string(), ty);

    if let Some(value) = var.value {
        let init_ty = types.function(vec![], ty);
        let init_fn = module.add_function(Function::new(
            format!("{}.init", var.name),
            init_ty,
            None,
        ));
        let mut builder = GilBuilder::new(module, types, init_fn);
        builder.set_span(ast.decls[decl].span);
        let entry = builder.add_block("entry", vec![]);
        builder.position_at_end(entry);
        let mut gen = GilGen {
            builder,
            ast,
            scopes,
            scope_stack: vec![GenScope::new()],
        };
        match gen.expr(value) {
            Some(result) => {
                gen.builder.build_ret(result);
            }
            None => {
                gen.builder.build_ret_void();
            }
        }
    }

    // Destructor: drop through the global's pointer.
    let void = types.void();
    let dtor_ty = types.function(vec![], void);
    let dtor_fn = module.add_function(Function::new(
        format!("{}.dtor", var.name),
        dtor_ty,
        None,
    ));
    let mut builder = GilBuilder::new(module, types, dtor_fn);
    let entry = builder.add_block("entry", vec![]);
    builder.position_at_end(entry);
    let ptr_ty = builder.types.raw_pointer(ty);
    let ptr = builder.build_global_ptr(ptr_ty, global);
    builder.build_drop_ptr(ptr);
    builder.build_ret_void();
}

impl<'a> GilGen<'a> {
    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    fn push_scope(&mut self) {
        self.scope_stack.push(GenScope::new());
    }

    fn pop_scope(&mut self) {
        let scope = self.scope_stack.pop().expect("scope underflow");
        self.drop_allocations(&scope.allocations);
    }

    fn drop_allocations(&mut self, allocations: &[Value]) {
        for &slot in allocations.iter().rev() {
            self.builder.build_drop_ptr(slot);
        }
    }

    /// Emit drops for every scope out to the enclosing loop scope and return
    /// its break/continue destinations. Scopes stay on the stack; this only
    /// releases their allocations along the exiting edge.
    fn drop_to_loop(&mut self) -> Option<(crate::gil::BlockId, crate::gil::BlockId)> {
        for i in (0..self.scope_stack.len()).rev() {
            let allocations = self.scope_stack[i].allocations.clone();
            self.drop_allocations(&allocations);
            if let Some(dests) = self.scope_stack[i].loop_dests {
                return Some(dests);
            }
        }
        None
    }

    /// Emit drops for every scope of the function along a return edge.
    fn drop_all_scopes(&mut self) {
        for i in (0..self.scope_stack.len()).rev() {
            let allocations = self.scope_stack[i].allocations.clone();
            self.drop_allocations(&allocations);
        }
    }

    fn lookup_var(&self, decl: DeclId) -> Option<Value> {
        self.scope_stack
            .iter()
            .rev()
            .find_map(|scope| scope.vars.get(&decl).copied())
    }

    fn bind_var(&mut self, decl: DeclId, slot: Value) {
        let scope = self.scope_stack.last_mut().expect("no current scope");
        scope.vars.insert(decl, slot);
        scope.allocations.push(slot);
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn visit_stmt(&mut self, stmt: StmtId) {
        self.builder.set_span(self.ast.stmts[stmt].span);
        match self.ast.stmts[stmt].kind.clone() {
            StmtKind::Compound { .. } => {
                self.push_scope();
                self.visit_compound_no_scope(stmt);
                self.pop_scope();
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => self.visit_if(cond, then_body, else_body),
            StmtKind::While { cond, body } => self.visit_while(cond, body),
            StmtKind::For(for_stmt) => self.visit_for(&for_stmt),
            StmtKind::Return { value } => self.visit_return(value),
            StmtKind::Break => self.visit_break_continue(true),
            StmtKind::Continue => self.visit_break_continue(false),
            StmtKind::Assign { lhs, rhs } => {
                let value = self.expr(rhs);
                let place = self.lvalue(lhs);
                if let (Some(value), Some(place)) = (value, place) {
                    // Ownership is decided by the uninitialized-detection
                    // pass.
                    self.builder.build_store(value, place);
                }
            }
            StmtKind::Expr { expr } => {
                if let Some(value) = self.expr(expr) {
                    self.builder.build_drop(value);
                }
            }
            StmtKind::Decl { decl } => self.visit_decl_stmt(decl),
        }
    }

    fn visit_compound_no_scope(&mut self, stmt: StmtId) {
        let StmtKind::Compound { stmts } = self.ast.stmts[stmt].kind.clone() else {
            return;
        };
        for child in stmts {
            self.visit_stmt(child);
        }
    }

    fn visit_if(&mut self, cond: ExprId, then_body: StmtId, else_body: Option<StmtId>) {
        let Some(cond_value) = self.expr(cond) else {
            return;
        };
        let then_block = self.builder.add_block("then", vec![]);
        let else_block = else_body.map(|_| self.builder.add_block("else", vec![]));
        let end_block = self.builder.add_block("end", vec![]);

        self.builder
            .build_cond_br(cond_value, then_block, else_block.unwrap_or(end_block));

        self.builder.position_at_end(then_block);
        self.visit_stmt(then_body);
        self.builder.build_br(end_block);

        if let (Some(else_block), Some(else_body)) = (else_block, else_body) {
            self.builder.position_at_end(else_block);
            self.visit_stmt(else_body);
            self.builder.build_br(end_block);
        }

        self.builder.position_at_end(end_block);
    }

    fn visit_while(&mut self, cond: ExprId, body: StmtId) {
        let cond_block = self.builder.add_block("cond", vec![]);
        let body_block = self.builder.add_block("body", vec![]);
        let end_block = self.builder.add_block("end", vec![]);

        self.builder.build_br(cond_block);

        self.builder.position_at_end(cond_block);
        if let Some(cond_value) = self.expr(cond) {
            self.builder.build_cond_br(cond_value, body_block, end_block);
        } else {
            self.builder.build_br(end_block);
        }

        self.builder.position_at_end(body_block);
        self.push_scope();
        self.scope_stack
            .last_mut()
            .expect("loop scope")
            .loop_dests = Some((end_block, cond_block));
        self.visit_compound_no_scope(body);
        self.pop_scope();
        self.builder.build_br(cond_block);

        self.builder.position_at_end(end_block);
    }

    fn visit_return(&mut self, value: Option<ExprId>) {
        match value {
            Some(value) => {
                let result = self.expr(value);
                self.drop_all_scopes();
                match result {
                    Some(result) => self.builder.build_ret(result),
                    None => self.builder.build_ret_void(),
                };
            }
            None => {
                self.drop_all_scopes();
                self.builder.build_ret_void();
            }
        }
        let dead = self.builder.add_dead_block();
        self.builder.position_at_end(dead);
    }

    fn visit_break_continue(&mut self, is_break: bool) {
        let Some((break_dest, continue_dest)) = self.drop_to_loop() else {
            // Sema already diagnosed break/continue outside a loop.
            return;
        };
        let dest = if is_break { break_dest } else { continue_dest };
        self.builder.build_br(dest);
        let dead = self.builder.add_dead_block();
        self.builder.position_at_end(dead);
    }

    fn visit_decl_stmt(&mut self, decl: DeclId) {
        let Some(var) = self.ast.as_var_let(decl) else {
            return;
        };
        let Some(ty) = var.ty else {
            return;
        };
        let name = var.name;
        let value = var.value;
        let binding = match var.keyword {
            galec_ast::BindingKeyword::Var => DebugBinding::Var,
            galec_ast::BindingKeyword::Let => DebugBinding::Let,
        };

        let slot = self.builder.build_alloca(ty);
        self.builder.build_debug(name, slot, binding);
        if let Some(value) = value {
            if let Some(result) = self.expr(value) {
                self.builder.build_store_init(result, slot);
            }
        }
        self.bind_var(decl, slot);
    }

    // ------------------------------------------------------------------
    // For loops
    // ------------------------------------------------------------------

    fn visit_for(&mut self, for_stmt: &ForStmt) {
        match &for_stmt.iteration {
            ForIteration::Array => self.visit_for_array(for_stmt),
            ForIteration::Iterator { .. } => self.visit_for_iterator(for_stmt),
        }
    }

    /// Static-array iteration expands inline to pointer arithmetic:
    /// `begin = bitcast(array)`, `end = begin + size`, and the condition
    /// compares the two pointers as unsigned 64-bit integers through the
    /// `builtin_eq` builtin.
    fn visit_for_array(&mut self, for_stmt: &ForStmt) {
        let Some(array_ptr) = self.lvalue(for_stmt.range) else {
            return;
        };
        let range_ty = self
            .ast
            .expr_ty(for_stmt.range)
            .map(|ty| self.builder.types.resolve_alias(ty));
        let Some(range_ty) = range_ty else {
            return;
        };
        let Type::StaticArray { elem, size } = self.builder.types.get(range_ty).clone() else {
            return;
        };

        let elem_ptr_ty = self.builder.types.raw_pointer(elem);
        let u64_ty = self.builder.types.uint64();

        let begin = self.builder.build_bitcast(elem_ptr_ty, array_ptr);
        let size_value = self.builder.build_int_literal(u64_ty, size as i64);
        let end = self.builder.build_ptr_offset(begin, size_value);

        let iter_slot = self.builder.build_alloca(elem_ptr_ty);
        self.builder.build_store_init(begin, iter_slot);
        let end_slot = self.builder.build_alloca(elem_ptr_ty);
        self.builder.build_store_init(end, end_slot);

        // Container scope holding the iteration slots for the whole loop.
        self.push_scope();
        {
            let scope = self.scope_stack.last_mut().expect("container scope");
            scope.allocations.push(iter_slot);
            scope.allocations.push(end_slot);
        }

        let cond_block = self.builder.add_block("for.cond", vec![]);
        let body_block = self.builder.add_block("for.body", vec![]);
        let step_block = self.builder.add_block("for.step", vec![]);
        let end_block = self.builder.add_block("for.end", vec![]);

        self.builder.build_br(cond_block);

        // Condition: iter == end, compared as unsigned 64-bit integers.
        self.builder.position_at_end(cond_block);
        let iter_value = self.builder.build_load_copy(iter_slot);
        let end_value = self.builder.build_load_copy(end_slot);
        let iter_int = self.builder.build_cast_ptr_to_int(u64_ty, iter_value);
        let end_int = self.builder.build_cast_ptr_to_int(u64_ty, end_value);
        let equals = self.call_builtin_eq(iter_int, end_int);
        match equals {
            Some(equals) => {
                self.builder.build_cond_br(equals, end_block, body_block);
            }
            None => {
                self.builder.build_br(end_block);
            }
        }

        // Body.
        self.builder.position_at_end(body_block);
        self.push_scope();
        self.scope_stack
            .last_mut()
            .expect("loop scope")
            .loop_dests = Some((end_block, step_block));

        if let Some(binding) = self.ast.as_var_let(for_stmt.binding) {
            if let Some(binding_ty) = binding.ty {
                let slot = self.builder.build_alloca(binding_ty);
                self.builder
                    .build_debug(binding.name, slot, DebugBinding::Let);
                let current = self.builder.build_load_copy(iter_slot);
                let value = self.builder.build_load_copy(current);
                self.builder.build_store_init(value, slot);
                self.bind_var(for_stmt.binding, slot);
            }
        }

        self.visit_compound_no_scope(for_stmt.body);
        self.pop_scope();
        self.builder.build_br(step_block);

        // Step: iter = iter + 1.
        self.builder.position_at_end(step_block);
        let iter_value = self.builder.build_load_copy(iter_slot);
        let one = self.builder.build_int_literal(u64_ty, 1);
        let next = self.builder.build_ptr_offset(iter_value, one);
        self.builder.build_store(next, iter_slot);
        self.builder.build_br(cond_block);

        self.builder.position_at_end(end_block);
        self.pop_scope();
    }

    /// Iterator-protocol loops call the begin/end/equality/deref/next
    /// callees sema resolved onto the statement.
    fn visit_for_iterator(&mut self, for_stmt: &ForStmt) {
        let ForIteration::Iterator {
            begin_fn,
            end_fn,
            equality_fn,
            deref_fn,
            next_fn,
        } = for_stmt.iteration
        else {
            return;
        };

        let Some(range_value) = self.expr(for_stmt.range) else {
            return;
        };
        let Some(range_ty) = self.builder.func().value_ty(range_value) else {
            return;
        };
        let range_slot = self.builder.build_alloca(range_ty);
        self.builder.build_store_init(range_value, range_slot);

        let range_arg = self.builder.build_load_copy(range_slot);
        let Some(begin_value) = self.emit_ref_call(begin_fn, vec![range_arg]) else {
            return;
        };
        let Some(iter_ty) = self.builder.func().value_ty(begin_value) else {
            return;
        };
        let iter_slot = self.builder.build_alloca(iter_ty);
        self.builder.build_store_init(begin_value, iter_slot);

        let range_arg = self.builder.build_load_copy(range_slot);
        let Some(end_value) = self.emit_ref_call(end_fn, vec![range_arg]) else {
            return;
        };
        let end_slot = self.builder.build_alloca(iter_ty);
        self.builder.build_store_init(end_value, end_slot);

        // Container scope: the range and iterator slots live for the whole
        // loop, not per iteration.
        self.push_scope();
        {
            let scope = self.scope_stack.last_mut().expect("container scope");
            scope.allocations.push(range_slot);
            scope.allocations.push(iter_slot);
            scope.allocations.push(end_slot);
        }

        let cond_block = self.builder.add_block("for.cond", vec![]);
        let body_block = self.builder.add_block("for.body", vec![]);
        let step_block = self.builder.add_block("for.step", vec![]);
        let end_block = self.builder.add_block("for.end", vec![]);

        self.builder.build_br(cond_block);

        self.builder.position_at_end(cond_block);
        let iter_value = self.builder.build_load_copy(iter_slot);
        let end_value = self.builder.build_load_copy(end_slot);
        match self.emit_ref_call(equality_fn, vec![iter_value, end_value]) {
            Some(equals) => {
                self.builder.build_cond_br(equals, end_block, body_block);
            }
            None => {
                self.builder.build_br(end_block);
            }
        }

        self.builder.position_at_end(body_block);
        self.push_scope();
        self.scope_stack
            .last_mut()
            .expect("loop scope")
            .loop_dests = Some((end_block, step_block));

        if let Some(binding) = self.ast.as_var_let(for_stmt.binding) {
            if let Some(binding_ty) = binding.ty {
                let slot = self.builder.build_alloca(binding_ty);
                self.builder
                    .build_debug(binding.name, slot, DebugBinding::Let);
                let iter_value = self.builder.build_load_copy(iter_slot);
                if let Some(value) = self.emit_ref_call(deref_fn, vec![iter_value]) {
                    self.builder.build_store_init(value, slot);
                }
                self.bind_var(for_stmt.binding, slot);
            }
        }

        self.visit_compound_no_scope(for_stmt.body);
        self.pop_scope();
        self.builder.build_br(step_block);

        self.builder.position_at_end(step_block);
        let iter_value = self.builder.build_load_copy(iter_slot);
        if let Some(next) = self.emit_ref_call(next_fn, vec![iter_value]) {
            self.builder.build_store(next, iter_slot);
        }
        self.builder.build_br(cond_block);

        self.builder.position_at_end(end_block);
        self.pop_scope();
    }

    fn call_builtin_eq(&mut self, lhs: Value, rhs: Value) -> Option<Value> {
        let u64_ty = self.builder.types.uint64();
        let decl = builtins::lookup_builtin(
            self.scopes,
            self.ast,
            self.builder.types,
            "builtin_eq",
            &[u64_ty, u64_ty],
        )?;
        let function = self.ast.as_function(decl)?;
        let fn_ty = function.ty;
        let call = self
            .builder
            .build_call(decl, "builtin_eq", fn_ty, vec![lhs, rhs]);
        Some(Value::result(call))
    }

    /// Call through a reference resolved by sema: directly when it names a
    /// function, indirectly through its value otherwise.
    fn emit_ref_call(&mut self, callee: ExprId, args: Vec<Value>) -> Option<Value> {
        let ExprKind::Ref { target, .. } = &self.ast.exprs[callee].kind else {
            let value = self.expr(callee)?;
            let call = self.builder.build_call_indirect(value, args);
            return Some(Value::result(call));
        };
        match target {
            Some(RefTarget::Function(decl)) => {
                let function = self.ast.as_function(*decl)?;
                let name = function.name.to_string();
                let fn_ty = function.ty;
                let call = self.builder.build_call(*decl, &name, fn_ty, args);
                if self.builder.func().insts[call].result_ty.is_some() {
                    Some(Value::result(call))
                } else {
                    None
                }
            }
            _ => {
                let value = self.expr(callee)?;
                let call = self.builder.build_call_indirect(value, args);
                Some(Value::result(call))
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Evaluate an expression; `None` means an empty (void) result.
    fn expr(&mut self, expr: ExprId) -> Option<Value> {
        self.builder.set_span(self.ast.exprs[expr].span);
        let result = match self.ast.exprs[expr].kind.clone() {
            ExprKind::Literal(value) => self.expr_literal(expr, &value),
            ExprKind::Ref { target, ident } => self.expr_ref(expr, target, ident.name),
            ExprKind::Call { callee, args } => self.expr_call(callee, &args),
            ExprKind::Binary { op, lhs, rhs } => self.expr_binary(op, lhs, rhs),
            ExprKind::Unary { op, operand } => self.expr_unary(op, operand),
            ExprKind::Ternary {
                cond,
                then_value,
                else_value,
            } => self.expr_ternary(expr, cond, then_value, else_value),
            ExprKind::Cast { value, target } => self.expr_cast(value, target),
            ExprKind::StructInit { fields } => self.expr_struct_init(expr, &fields),
            ExprKind::StructMember {
                base,
                member,
                field_index,
            } => self.expr_struct_member(expr, base, member, field_index),
        };
        self.builder.set_span(self.ast.exprs[expr].span);
        result
    }

    fn expr_literal(&mut self, expr: ExprId, value: &LiteralValue) -> Option<Value> {
        let ty = self.ast.expr_ty(expr)?;
        match value {
            LiteralValue::Int(v) => Some(self.builder.build_int_literal(ty, *v)),
            LiteralValue::Float(v) => Some(self.builder.build_float_literal(ty, *v)),
            LiteralValue::Bool(v) => Some(self.builder.build_bool_literal(*v)),
            LiteralValue::String(v) => Some(self.builder.build_string_literal(ty, *v)),
            LiteralValue::Null => {
                // Null lowers to a zero pointer.
                let u64_ty = self.builder.types.uint64();
                let zero = self.builder.build_int_literal(u64_ty, 0);
                let resolved = self.builder.types.resolve_alias(ty);
                if matches!(self.builder.types.get(resolved), Type::Pointer { .. }) {
                    Some(self.builder.build_cast_int_to_ptr(ty, zero))
                } else {
                    Some(zero)
                }
            }
        }
    }

    fn expr_ref(
        &mut self,
        expr: ExprId,
        target: Option<RefTarget>,
        name: Symbol,
    ) -> Option<Value> {
        match target? {
            RefTarget::Function(decl) => {
                let function = self.ast.as_function(decl)?;
                let fn_ty = function.ty;
                let fn_name = function.name.to_string();
                let id = self
                    .builder
                    .module
                    .get_or_declare_function(decl, &fn_name, fn_ty);
                Some(self.builder.build_function_ptr(fn_ty, id))
            }
            RefTarget::EnumCase(_) => {
                let ty = self.ast.expr_ty(expr)?;
                Some(self.builder.build_enum_variant(ty, name))
            }
            RefTarget::Variable(decl) => {
                if let Some(var) = self.ast.as_var_let(decl) {
                    if var.global {
                        let ty = var.ty?;
                        let global = self.builder.module.get_or_create_global(
                            decl,
                            &var.name.to_string(),
                            ty,
                        );
                        let ptr_ty = self.builder.types.raw_pointer(ty);
                        let ptr = self.builder.build_global_ptr(ptr_ty, global);
                        return Some(self.builder.build_load_copy(ptr));
                    }
                }
                let slot = self.lookup_var(decl)?;
                Some(self.builder.build_load_copy(slot))
            }
        }
    }

    fn expr_call(&mut self, callee: ExprId, args: &[ExprId]) -> Option<Value> {
        let mut arg_values: Vec<Value> = Vec::with_capacity(args.len());
        for &arg in args {
            arg_values.push(self.expr(arg)?);
        }

        if let ExprKind::Ref {
            target: Some(RefTarget::Function(decl)),
            ..
        } = self.ast.exprs[callee].kind
        {
            let function = self.ast.as_function(decl)?;
            let params = function.params.clone();
            let name = function.name.to_string();
            let fn_ty = function.ty;

            // Fill defaulted trailing arguments from parameter defaults.
            while arg_values.len() < params.len() {
                let param = self.ast.as_param(params[arg_values.len()])?;
                let default = param.default?;
                arg_values.push(self.expr(default)?);
            }

            let call = self.builder.build_call(decl, &name, fn_ty, arg_values);
            return if self.builder.func().insts[call].result_ty.is_some() {
                Some(Value::result(call))
            } else {
                None
            };
        }

        let callee_value = self.expr(callee)?;
        let call = self.builder.build_call_indirect(callee_value, arg_values);
        if self.builder.func().insts[call].result_ty.is_some() {
            Some(Value::result(call))
        } else {
            None
        }
    }

    fn expr_binary(&mut self, op: ExprId, lhs: ExprId, rhs: ExprId) -> Option<Value> {
        let (op_name, op_target) = match &self.ast.exprs[op].kind {
            ExprKind::Ref { ident, target } => (ident.name, *target),
            _ => return None,
        };

        // Short-circuit logical operators build a three-block pattern with a
        // one-argument result block.
        let name = op_name.as_str();
        if name == "&&" || name == "||" {
            let lhs_value = self.expr(lhs)?;
            let result_ty = self.builder.func().value_ty(lhs_value)?;
            let result_block = self.builder.add_block("logical.result", vec![result_ty]);
            let rhs_block = self
                .builder
                .add_block(if name == "&&" { "and.right" } else { "or.right" }, vec![]);

            if name == "&&" {
                self.builder.build_cond_br_args(
                    lhs_value,
                    rhs_block,
                    vec![],
                    result_block,
                    vec![lhs_value],
                );
            } else {
                self.builder.build_cond_br_args(
                    lhs_value,
                    result_block,
                    vec![lhs_value],
                    rhs_block,
                    vec![],
                );
            }

            self.builder.position_at_end(rhs_block);
            let rhs_value = self.expr(rhs)?;
            self.builder.build_br_args(result_block, vec![rhs_value]);

            self.builder.position_at_end(result_block);
            return Some(Value::BlockArg {
                block: result_block,
                index: 0,
            });
        }

        // Pointer subscript without a user overload.
        if name == "[]" && !matches!(op_target, Some(RefTarget::Function(_))) {
            let ptr = self.expr(lhs)?;
            let offset = self.expr(rhs)?;
            let element_ptr = self.builder.build_ptr_offset(ptr, offset);
            return Some(self.builder.build_load_copy(element_ptr));
        }

        let lhs_value = self.expr(lhs)?;
        let rhs_value = self.expr(rhs)?;
        self.emit_ref_call(op, vec![lhs_value, rhs_value])
    }

    fn expr_unary(&mut self, op: ExprId, operand: ExprId) -> Option<Value> {
        let (op_name, op_target) = match &self.ast.exprs[op].kind {
            ExprKind::Ref { ident, target } => (ident.name, *target),
            _ => return None,
        };
        let name = op_name.as_str();
        let is_builtin = !matches!(op_target, Some(RefTarget::Function(_)));

        if name == ".*" && is_builtin {
            let pointer = self.expr(operand)?;
            return Some(self.builder.build_load_copy(pointer));
        }
        if name == "&" && is_builtin {
            return self.lvalue(operand);
        }

        let operand_value = self.expr(operand)?;
        self.emit_ref_call(op, vec![operand_value])
    }

    fn expr_ternary(
        &mut self,
        expr: ExprId,
        cond: ExprId,
        then_value: ExprId,
        else_value: ExprId,
    ) -> Option<Value> {
        let result_ty = self.ast.expr_ty(expr)?;
        let cond_value = self.expr(cond)?;

        let then_block = self.builder.add_block("ternary.then", vec![]);
        let else_block = self.builder.add_block("ternary.else", vec![]);
        let merge_block = self.builder.add_block("ternary.result", vec![result_ty]);

        self.builder.build_cond_br(cond_value, then_block, else_block);

        self.builder.position_at_end(then_block);
        let true_value = self.expr(then_value)?;
        self.builder.build_br_args(merge_block, vec![true_value]);

        self.builder.position_at_end(else_block);
        let false_value = self.expr(else_value)?;
        self.builder.build_br_args(merge_block, vec![false_value]);

        self.builder.position_at_end(merge_block);
        Some(Value::BlockArg {
            block: merge_block,
            index: 0,
        })
    }

    fn expr_struct_init(&mut self, expr: ExprId, fields: &[ExprId]) -> Option<Value> {
        let ty = self.ast.expr_ty(expr)?;
        let resolved = self.builder.types.resolve_alias(ty);
        match self.builder.types.get(resolved).clone() {
            Type::Struct { decl, .. } => {
                let declared = self.ast.as_struct(decl)?.fields.clone();
                let mut values = Vec::with_capacity(declared.len());
                for (i, &field_decl) in declared.iter().enumerate() {
                    if let Some(&provided) = fields.get(i) {
                        values.push(self.expr(provided)?);
                    } else {
                        // Omitted fields take their declared defaults.
                        let default = self.ast.as_field(field_decl)?.default?;
                        values.push(self.expr(default)?);
                    }
                }
                Some(self.builder.build_struct_create(ty, values))
            }
            Type::StaticArray { .. } => {
                let mut values = Vec::with_capacity(fields.len());
                for &field in fields {
                    values.push(self.expr(field)?);
                }
                Some(self.builder.build_array_create(ty, values))
            }
            _ => None,
        }
    }

    fn expr_struct_member(
        &mut self,
        expr: ExprId,
        base: ExprId,
        member: Symbol,
        field_index: Option<usize>,
    ) -> Option<Value> {
        let base_value = self.expr(base)?;
        let member_info = self.member_info(expr, base, member, field_index)?;
        Some(self.builder.build_struct_extract(base_value, member_info))
    }

    fn member_info(
        &mut self,
        expr: ExprId,
        base: ExprId,
        member: Symbol,
        field_index: Option<usize>,
    ) -> Option<Member> {
        let field_ty = self.ast.expr_ty(expr)?;
        let parent = self.ast.expr_ty(base)?;
        let index = field_index?;
        Some(Member {
            name: member,
            field_ty,
            parent,
            index,
        })
    }

    // ------------------------------------------------------------------
    // Casts
    // ------------------------------------------------------------------

    fn expr_cast(&mut self, value: ExprId, target: TyId) -> Option<Value> {
        let source_ty = self.ast.expr_ty(value)?;
        let source = self.builder.types.resolve_alias(source_ty);
        let dest = self.builder.types.resolve_alias(target);
        let source_kind = self.builder.types.get(source).clone();
        let dest_kind = self.builder.types.get(dest).clone();

        // Array decay works on the array's address, not its value.
        if matches!(source_kind, Type::StaticArray { .. })
            && matches!(dest_kind, Type::Pointer { .. })
        {
            let place = self.lvalue(value)?;
            return Some(self.builder.build_bitcast(target, place));
        }

        let source_value = self.expr(value)?;

        match (&source_kind, &dest_kind) {
            (
                Type::Int {
                    bit_width: from_width,
                    signedness,
                },
                Type::Int {
                    bit_width: to_width,
                    ..
                },
            ) => {
                if to_width < from_width {
                    Some(self.builder.build_int_trunc(target, source_value))
                } else if to_width > from_width {
                    match signedness {
                        Signedness::Signed => {
                            Some(self.builder.build_int_sext(target, source_value))
                        }
                        Signedness::Unsigned => {
                            Some(self.builder.build_int_zext(target, source_value))
                        }
                    }
                } else if source != dest {
                    // Same width, different signedness.
                    Some(self.builder.build_bitcast(target, source_value))
                } else {
                    Some(source_value)
                }
            }
            (Type::Float { width: from }, Type::Float { width: to }) => {
                if to.bit_width() < from.bit_width() {
                    Some(self.builder.build_float_trunc(target, source_value))
                } else if to.bit_width() > from.bit_width() {
                    Some(self.builder.build_float_ext(target, source_value))
                } else {
                    Some(source_value)
                }
            }
            (Type::Float { .. }, Type::Int { .. }) => {
                Some(self.builder.build_float_to_int(target, source_value))
            }
            (Type::Int { .. }, Type::Float { .. }) => {
                Some(self.builder.build_int_to_float(target, source_value))
            }
            (Type::Int { .. }, Type::Pointer { .. }) | (Type::Null, Type::Pointer { .. }) => {
                Some(self.builder.build_cast_int_to_ptr(target, source_value))
            }
            (Type::Pointer { .. }, Type::Int { .. }) => {
                Some(self.builder.build_cast_ptr_to_int(target, source_value))
            }
            (Type::Int { bit_width, .. }, Type::Char) => {
                if *bit_width > 8 {
                    Some(self.builder.build_int_trunc(target, source_value))
                } else {
                    Some(self.builder.build_bitcast(target, source_value))
                }
            }
            (Type::Char, Type::Int { bit_width, .. }) => {
                if *bit_width > 8 {
                    Some(self.builder.build_int_sext(target, source_value))
                } else {
                    Some(self.builder.build_bitcast(target, source_value))
                }
            }
            // Enum casts are representation changes.
            (Type::Enum { .. }, _) | (_, Type::Enum { .. }) => {
                Some(self.builder.build_bitcast(target, source_value))
            }
            _ => Some(self.builder.build_bitcast(target, source_value)),
        }
    }

    // ------------------------------------------------------------------
    // L-values
    // ------------------------------------------------------------------

    /// Evaluate an expression as a place, producing a pointer.
    fn lvalue(&mut self, expr: ExprId) -> Option<Value> {
        self.builder.set_span(self.ast.exprs[expr].span);
        match self.ast.exprs[expr].kind.clone() {
            ExprKind::Ref { target, .. } => match target? {
                RefTarget::Variable(decl) => {
                    if let Some(var) = self.ast.as_var_let(decl) {
                        if var.global {
                            let ty = var.ty?;
                            let global = self.builder.module.get_or_create_global(
                                decl,
                                &var.name.to_string(),
                                ty,
                            );
                            let ptr_ty = self.builder.types.raw_pointer(ty);
                            return Some(self.builder.build_global_ptr(ptr_ty, global));
                        }
                    }
                    self.lookup_var(decl)
                }
                _ => None,
            },
            ExprKind::StructMember {
                base,
                member,
                field_index,
            } => {
                let place = self.lvalue(base)?;
                let member_info = self.member_info(expr, base, member, field_index)?;
                Some(self.builder.build_struct_field_ptr(place, member_info))
            }
            ExprKind::Unary { op, operand } => {
                // `p.*` as a place is the pointer value itself.
                let ExprKind::Ref { ident, target } = &self.ast.exprs[op].kind else {
                    return None;
                };
                if ident.name.as_str() == ".*"
                    && !matches!(target, Some(RefTarget::Function(_)))
                {
                    self.expr(operand)
                } else {
                    None
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                // `p[i]` as a place is the offset pointer.
                let ExprKind::Ref { ident, target } = &self.ast.exprs[op].kind else {
                    return None;
                };
                if ident.name.as_str() == "[]"
                    && !matches!(target, Some(RefTarget::Function(_)))
                {
                    let ptr = self.expr(lhs)?;
                    let offset = self.expr(rhs)?;
                    Some(self.builder.build_ptr_offset(ptr, offset))
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}
