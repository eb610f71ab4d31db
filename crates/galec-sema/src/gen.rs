//! Constraint generation.
//!
//! Solving is driven per top-level statement or declaration initializer so
//! failures stay local and scores never mix independent problems. For each
//! unit, a recursive expression walk gives every expression a fresh type
//! variable pre-visit and emits constraints post-visit; the statement driver
//! below decides what counts as one unit and adds the statement-level
//! constraints (condition-to-Bool, return conversions, and so on).

use galec_ast::{
    Ast, DeclId, DeclKind, ExprId, ExprKind, ForIteration, LiteralValue, NamespacedIdent,
    RefTarget, StmtId, StmtKind, TyId, Type, TypeArena,
};
use galec_util::{DiagnosticHandler, Symbol};

use crate::constraint::{Constraint, ConstraintKind};
use crate::resolve;
use crate::scope::{ScopeId, ScopeKind, ScopeTree};
use crate::solver::ConstraintSystem;

/// Operator position a reference expression appears in, enabling the
/// builtin disjuncts that coexist with user overloads.
enum OperatorContext {
    Binary { result_ty: TyId },
    Unary { operand_ty: TyId, result_ty: TyId },
}

impl<'a> ConstraintSystem<'a> {
    /// Generate constraints for a root expression of this system.
    pub fn generate_root(&mut self, expr: ExprId) -> TyId {
        self.roots.push(expr);
        self.generate_expr(expr)
    }

    /// Ensure the expression has a type: a fresh registered type variable,
    /// or its parser-assigned type with unresolved names mapped.
    fn ensure_expr_ty(&mut self, expr: ExprId) -> TyId {
        match self.ast.exprs[expr].ty {
            Some(ty) => {
                if matches!(self.types.get(ty), Type::UnresolvedName { .. }) {
                    let span = self.ast.exprs[expr].span;
                    let resolved = resolve::resolve_type(
                        self.types,
                        self.scopes,
                        self.scope,
                        ty,
                        span,
                        self.handler,
                    );
                    self.ast.exprs[expr].ty = Some(resolved);
                    resolved
                } else {
                    ty
                }
            }
            None => {
                let var = self.types.fresh_type_var();
                self.register_type_var(var);
                self.ast.exprs[expr].ty = Some(var);
                var
            }
        }
    }

    fn generate_expr(&mut self, expr: ExprId) -> TyId {
        let ty = self.ensure_expr_ty(expr);
        let kind = self.ast.exprs[expr].kind.clone();
        match kind {
            ExprKind::Literal(value) => self.generate_literal(expr, ty, &value),
            ExprKind::Ref { .. } => {
                self.generate_ref(expr, None);
            }
            ExprKind::Call { callee, args } => {
                let arg_tys: Vec<TyId> = args.iter().map(|&a| self.generate_expr(a)).collect();
                let callee_ty = self.generate_expr(callee);
                let fn_ty = self.types.function(arg_tys, ty);
                self.add_constraint(Constraint::new(
                    ConstraintKind::Conversion {
                        first: callee_ty,
                        second: fn_ty,
                    },
                    callee,
                ));
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs_ty = self.generate_expr(lhs);
                let rhs_ty = self.generate_expr(rhs);
                let op_ty = self.ensure_expr_ty(op);
                self.generate_ref(op, Some(OperatorContext::Binary { result_ty: ty }));
                let fn_ty = self.types.function(vec![lhs_ty, rhs_ty], ty);
                self.add_constraint(Constraint::new(
                    ConstraintKind::Conversion {
                        first: op_ty,
                        second: fn_ty,
                    },
                    op,
                ));
            }
            ExprKind::Unary { op, operand } => {
                let operand_ty = self.generate_expr(operand);
                let op_ty = self.ensure_expr_ty(op);
                self.generate_ref(
                    op,
                    Some(OperatorContext::Unary {
                        operand_ty,
                        result_ty: ty,
                    }),
                );
                let fn_ty = self.types.function(vec![operand_ty], ty);
                self.add_constraint(Constraint::new(
                    ConstraintKind::Conversion {
                        first: op_ty,
                        second: fn_ty,
                    },
                    op,
                ));
            }
            ExprKind::Ternary {
                cond,
                then_value,
                else_value,
            } => {
                let cond_ty = self.generate_expr(cond);
                let then_ty = self.generate_expr(then_value);
                let else_ty = self.generate_expr(else_value);
                let bool_ty = self.types.bool_ty();
                self.add_constraint(Constraint::new(
                    ConstraintKind::Conversion {
                        first: cond_ty,
                        second: bool_ty,
                    },
                    cond,
                ));
                self.add_constraint(Constraint::new(
                    ConstraintKind::Equal {
                        first: then_ty,
                        second: ty,
                    },
                    expr,
                ));
                self.add_constraint(Constraint::new(
                    ConstraintKind::Equal {
                        first: else_ty,
                        second: ty,
                    },
                    expr,
                ));
            }
            ExprKind::Cast { value, target } => {
                let value_ty = self.generate_expr(value);
                let span = self.ast.exprs[expr].span;
                let resolved = resolve::resolve_type(
                    self.types,
                    self.scopes,
                    self.scope,
                    target,
                    span,
                    self.handler,
                );
                if resolved != target {
                    self.ast.exprs[expr].kind = ExprKind::Cast {
                        value,
                        target: resolved,
                    };
                }
                self.add_constraint(Constraint::new(
                    ConstraintKind::CheckedCast {
                        first: value_ty,
                        second: resolved,
                    },
                    expr,
                ));
                self.add_constraint(Constraint::new(
                    ConstraintKind::Defaultable {
                        first: value_ty,
                        second: resolved,
                    },
                    expr,
                ));
                self.add_constraint(Constraint::new(
                    ConstraintKind::Bind {
                        first: resolved,
                        second: ty,
                    },
                    expr,
                ));
            }
            ExprKind::StructInit { fields } => {
                for &field in &fields {
                    self.generate_expr(field);
                }
                self.add_constraint(Constraint::new(
                    ConstraintKind::StructInitializer { ty, expr },
                    expr,
                ));
            }
            ExprKind::StructMember { base, .. } => {
                let base_ty = self.generate_expr(base);
                self.add_constraint(Constraint::new(
                    ConstraintKind::ValueMember {
                        base: base_ty,
                        member: ty,
                        member_expr: expr,
                    },
                    expr,
                ));
            }
        }
        ty
    }

    fn generate_literal(&mut self, expr: ExprId, ty: TyId, value: &LiteralValue) {
        match value {
            LiteralValue::Int(_) => {
                let default = self.types.int32();
                self.add_constraint(Constraint::new(
                    ConstraintKind::ExpressibleByIntLiteral { ty },
                    expr,
                ));
                self.add_constraint(Constraint::new(
                    ConstraintKind::Defaultable {
                        first: ty,
                        second: default,
                    },
                    expr,
                ));
            }
            LiteralValue::Float(_) => {
                let default = self.types.float64();
                self.add_constraint(Constraint::new(
                    ConstraintKind::ExpressibleByFloatLiteral { ty },
                    expr,
                ));
                self.add_constraint(Constraint::new(
                    ConstraintKind::Defaultable {
                        first: ty,
                        second: default,
                    },
                    expr,
                ));
            }
            LiteralValue::Bool(_) => {
                let default = self.types.bool_ty();
                self.add_constraint(Constraint::new(
                    ConstraintKind::ExpressibleByBoolLiteral { ty },
                    expr,
                ));
                self.add_constraint(Constraint::new(
                    ConstraintKind::Defaultable {
                        first: ty,
                        second: default,
                    },
                    expr,
                ));
            }
            LiteralValue::String(_) => {
                let default = self.string_type();
                self.add_constraint(Constraint::new(
                    ConstraintKind::ExpressibleByStringLiteral { ty },
                    expr,
                ));
                self.add_constraint(Constraint::new(
                    ConstraintKind::Defaultable {
                        first: ty,
                        second: default,
                    },
                    expr,
                ));
            }
            LiteralValue::Null => {
                let null = self.types.null();
                self.add_constraint(Constraint::new(
                    ConstraintKind::Bind {
                        first: ty,
                        second: null,
                    },
                    expr,
                ));
            }
        }
    }

    /// The `String` type from the scope chain, falling back to `*Char`.
    fn string_type(&mut self) -> TyId {
        if let Some(ty) = self
            .scopes
            .lookup_type_local(self.scope, Symbol::intern("String"))
        {
            return ty;
        }
        let char_ty = self.types.char_ty();
        self.types.raw_pointer(char_ty)
    }

    /// Build the candidate disjunction for a reference expression.
    ///
    /// Operators that are overloadable but carry built-in meanings (`.*`,
    /// `&`, `&&`, `||`, `[]`) contribute extra disjuncts; the pointer ones
    /// are conjunctions so the operator's own type still gets bound.
    fn generate_ref(&mut self, expr: ExprId, op_ctx: Option<OperatorContext>) {
        let ty = self.ensure_expr_ty(expr);
        let ExprKind::Ref { ident, .. } = self.ast.exprs[expr].kind.clone() else {
            return;
        };

        let mut branches: Vec<Constraint> = Vec::new();
        let candidates: Vec<DeclId> = self
            .scopes
            .lookup_item(self.scope, &ident)
            .map(|decls| decls.iter().map(|d| d.item).collect())
            .unwrap_or_default();

        for decl in candidates {
            let declared_ty = match &self.ast.decls[decl].kind {
                DeclKind::Function(_) => {
                    branches.push(Constraint::new(
                        ConstraintKind::BindOverload { ty, choice: decl },
                        expr,
                    ));
                    continue;
                }
                DeclKind::VarLet(v) => v.ty,
                DeclKind::Param(p) => Some(p.ty),
                _ => continue,
            };
            let var_ty = match declared_ty {
                Some(t) => t,
                None => {
                    let var = self.types.fresh_type_var();
                    self.register_type_var(var);
                    if let DeclKind::VarLet(v) = &mut self.ast.decls[decl].kind {
                        v.ty = Some(var);
                    }
                    var
                }
            };
            branches.push(Constraint::new(
                ConstraintKind::Bind {
                    first: var_ty,
                    second: ty,
                },
                expr,
            ));
            if let ExprKind::Ref { target, .. } = &mut self.ast.exprs[expr].kind {
                *target = Some(RefTarget::Variable(decl));
            }
        }

        self.add_enum_case_branch(expr, ty, &ident, &mut branches);
        if let Some(ctx) = op_ctx {
            self.add_operator_builtins(expr, ty, &ident, ctx, &mut branches);
        }

        if branches.is_empty() {
            let span = self.ast.exprs[expr].span;
            self.handler
                .error(span, format!("no overloads found for '{ident}'"));
            self.reported_lookup_failure = true;
        } else {
            self.add_constraint(Constraint::new(
                ConstraintKind::Disjunction {
                    children: branches,
                    remember_choice: false,
                },
                expr,
            ));
        }
    }

    /// `Color::Red` style references: the components name an enum type and
    /// the final name one of its cases.
    fn add_enum_case_branch(
        &mut self,
        expr: ExprId,
        ty: TyId,
        ident: &NamespacedIdent,
        branches: &mut Vec<Constraint>,
    ) {
        let Some((&enum_name, namespace)) = ident.components.split_last() else {
            return;
        };
        let enum_ident = NamespacedIdent {
            components: namespace.to_vec(),
            name: enum_name,
        };
        let Some(enum_ty) = self.scopes.lookup_type(self.scope, &enum_ident) else {
            return;
        };
        let resolved = self.types.resolve_alias(enum_ty);
        let Type::Enum { cases, decl, .. } = self.types.get(resolved).clone() else {
            return;
        };
        if !cases.iter().any(|c| c.name == ident.name) {
            return;
        }
        branches.push(Constraint::new(
            ConstraintKind::Bind {
                first: ty,
                second: resolved,
            },
            expr,
        ));
        if let ExprKind::Ref { target, .. } = &mut self.ast.exprs[expr].kind {
            *target = Some(RefTarget::EnumCase(decl));
        }
    }

    fn add_operator_builtins(
        &mut self,
        expr: ExprId,
        ty: TyId,
        ident: &NamespacedIdent,
        ctx: OperatorContext,
        branches: &mut Vec<Constraint>,
    ) {
        if !ident.components.is_empty() {
            return;
        }
        let name = ident.name.as_str();
        match ctx {
            OperatorContext::Binary { result_ty } => {
                if name == "&&" || name == "||" {
                    let bool_ty = self.types.bool_ty();
                    let fn_ty = self.types.function(vec![bool_ty, bool_ty], bool_ty);
                    branches.push(Constraint::new(
                        ConstraintKind::Bind {
                            first: ty,
                            second: fn_ty,
                        },
                        expr,
                    ));
                } else if name == "[]" {
                    let u64 = self.types.uint64();
                    let ptr = self.types.raw_pointer(result_ty);
                    let fn_ty = self.types.function(vec![ptr, u64], result_ty);
                    branches.push(Constraint::new(
                        ConstraintKind::Bind {
                            first: ty,
                            second: fn_ty,
                        },
                        expr,
                    ));
                }
            }
            OperatorContext::Unary {
                operand_ty,
                result_ty,
            } => {
                let pointer_binding = if name == ".*" {
                    // Dereference: the operand is a pointer to the result.
                    Some(ConstraintKind::BindToPointerType {
                        first: result_ty,
                        second: operand_ty,
                    })
                } else if name == "&" {
                    // Address-of: the result is a pointer to the operand.
                    Some(ConstraintKind::BindToPointerType {
                        first: operand_ty,
                        second: result_ty,
                    })
                } else {
                    None
                };
                if let Some(binding) = pointer_binding {
                    let fn_ty = self.types.function(vec![operand_ty], result_ty);
                    branches.push(Constraint::new(
                        ConstraintKind::Conjunction {
                            children: vec![
                                Constraint::new(binding, expr),
                                Constraint::new(
                                    ConstraintKind::Bind {
                                        first: ty,
                                        second: fn_ty,
                                    },
                                    expr,
                                ),
                            ],
                        },
                        expr,
                    ));
                }
            }
        }
    }
}

/// Checks the statements of one function body.
pub struct BodyChecker<'a> {
    pub types: &'a mut TypeArena,
    pub ast: &'a mut Ast,
    pub scopes: &'a mut ScopeTree,
    pub handler: &'a DiagnosticHandler,
    /// Declared return type of the enclosing function.
    pub return_ty: TyId,
}

impl<'a> BodyChecker<'a> {
    /// Type check one function: parameter scope, then the body statements.
    pub fn check_function(
        types: &'a mut TypeArena,
        ast: &'a mut Ast,
        scopes: &'a mut ScopeTree,
        handler: &'a DiagnosticHandler,
        module_scope: ScopeId,
        fn_decl: DeclId,
    ) {
        let Some(function) = ast.as_function(fn_decl) else {
            return;
        };
        let Some(body) = function.body else {
            return;
        };
        let params = function.params.clone();
        let fn_ty = function.ty;
        let return_ty = match types.get(fn_ty) {
            Type::Function { ret, .. } => *ret,
            _ => types.void(),
        };

        let fn_scope = scopes.new_scope(module_scope, ScopeKind::Function(fn_decl));
        for &param in &params {
            if let Some(p) = ast.as_param(param) {
                let name = p.name;
                scopes.insert_item(fn_scope, name, param, galec_ast::Visibility::Private);
            }
        }

        let mut checker = BodyChecker {
            types,
            ast,
            scopes,
            handler,
            return_ty,
        };
        checker.check_stmt(fn_scope, body, false);
    }

    /// Type check one global variable initializer.
    pub fn check_global(
        types: &'a mut TypeArena,
        ast: &'a mut Ast,
        scopes: &'a mut ScopeTree,
        handler: &'a DiagnosticHandler,
        module_scope: ScopeId,
        decl: DeclId,
    ) {
        let void = types.void();
        let mut checker = BodyChecker {
            types,
            ast,
            scopes,
            handler,
            return_ty: void,
        };
        // Globals are already in the module scope; only solve the
        // initializer.
        checker.check_var_let(module_scope, decl, false);
    }

    fn check_stmt(&mut self, scope: ScopeId, stmt: StmtId, in_loop: bool) {
        let kind = self.ast.stmts[stmt].kind.clone();
        match kind {
            StmtKind::Compound { stmts } => {
                let inner = self.scopes.new_scope(scope, ScopeKind::Block);
                for s in stmts {
                    self.check_stmt(inner, s, in_loop);
                }
            }
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.solve_condition(scope, cond);
                self.check_stmt(scope, then_body, in_loop);
                if let Some(else_body) = else_body {
                    self.check_stmt(scope, else_body, in_loop);
                }
            }
            StmtKind::While { cond, body } => {
                self.solve_condition(scope, cond);
                self.check_stmt(scope, body, true);
            }
            StmtKind::For(for_stmt) => self.check_for(scope, &for_stmt),
            StmtKind::Return { value } => {
                let span = self.ast.stmts[stmt].span;
                let ret = self.types.resolve_alias(self.return_ty);
                let ret_is_void = matches!(self.types.get(ret), Type::Void);
                match value {
                    Some(value) if ret_is_void => {
                        self.handler
                            .error(span, "function declared as void cannot return a value");
                        // Keep analyzing the expression itself.
                        let mut system = self.system(scope);
                        system.generate_root(value);
                        system.solve();
                    }
                    Some(value) => {
                        let return_ty = self.return_ty;
                        let mut system = self.system(scope);
                        let value_ty = system.generate_root(value);
                        system.add_constraint(Constraint::new(
                            ConstraintKind::Conversion {
                                first: value_ty,
                                second: return_ty,
                            },
                            value,
                        ));
                        system.solve();
                    }
                    None => {
                        if !ret_is_void {
                            self.handler
                                .error(span, "non-void function must return a value");
                        }
                    }
                }
            }
            StmtKind::Break | StmtKind::Continue => {
                if !in_loop {
                    let span = self.ast.stmts[stmt].span;
                    let what = if matches!(kind, StmtKind::Break) {
                        "break"
                    } else {
                        "continue"
                    };
                    self.handler
                        .error(span, format!("'{what}' outside of a loop"));
                }
            }
            StmtKind::Assign { lhs, rhs } => {
                let mut system = self.system(scope);
                let rhs_ty = system.generate_root(rhs);
                let lhs_ty = system.generate_root(lhs);
                system.add_constraint(Constraint::new(
                    ConstraintKind::Conversion {
                        first: rhs_ty,
                        second: lhs_ty,
                    },
                    rhs,
                ));
                system.solve();
            }
            StmtKind::Expr { expr } => {
                let mut system = self.system(scope);
                system.generate_root(expr);
                system.solve();
            }
            StmtKind::Decl { decl } => self.check_var_let(scope, decl, true),
        }
    }

    fn check_var_let(&mut self, scope: ScopeId, decl: DeclId, insert: bool) {
        let Some(var) = self.ast.as_var_let(decl) else {
            return;
        };
        let name = var.name;
        let value = var.value;
        let declared = var.ty;
        let span = self.ast.decls[decl].span;

        // Resolve a declared type's names up front.
        let declared = declared.map(|ty| {
            resolve::resolve_type(self.types, self.scopes, scope, ty, span, self.handler)
        });

        let mut system = self.system(scope);
        let decl_ty = match declared {
            Some(ty) => ty,
            None => {
                let var_ty = system.types.fresh_type_var();
                system.register_type_var(var_ty);
                var_ty
            }
        };
        system.bind_decl_type(decl, decl_ty);
        if let Some(value) = value {
            let value_ty = system.generate_root(value);
            system.add_constraint(Constraint::new(
                ConstraintKind::Conversion {
                    first: value_ty,
                    second: decl_ty,
                },
                value,
            ));
        }
        system.solve();

        if insert {
            // The binding is visible only after its own initializer.
            self.scopes
                .insert_item(scope, name, decl, galec_ast::Visibility::Private);
        }
    }

    fn check_for(&mut self, scope: ScopeId, for_stmt: &galec_ast::ForStmt) {
        match &for_stmt.iteration {
            ForIteration::Array => {
                let mut system = self.system(scope);
                system.generate_root(for_stmt.range);
                system.solve();

                let range_ty = self.ast.expr_ty(for_stmt.range);
                let elem = range_ty.and_then(|ty| {
                    match self.types.get(self.types.resolve_alias(ty)) {
                        Type::StaticArray { elem, .. } => Some(*elem),
                        _ => None,
                    }
                });
                match elem {
                    Some(elem) => {
                        if let DeclKind::VarLet(v) = &mut self.ast.decls[for_stmt.binding].kind {
                            v.ty = Some(elem);
                        }
                    }
                    None => {
                        let span = self.ast.exprs[for_stmt.range].span;
                        self.handler
                            .error(span, "for loop range is not a static array");
                    }
                }
            }
            ForIteration::Iterator {
                begin_fn,
                end_fn,
                equality_fn,
                deref_fn,
                next_fn,
            } => {
                let mut system = self.system(scope);
                let range_ty = system.generate_root(for_stmt.range);

                let iter_ty = system.types.fresh_type_var();
                system.register_type_var(iter_ty);
                let binding_ty = system.types.fresh_type_var();
                system.register_type_var(binding_ty);
                system.bind_decl_type(for_stmt.binding, binding_ty);

                let bool_ty = system.types.bool_ty();
                let begin_sig = system.types.function(vec![range_ty], iter_ty);
                let end_sig = begin_sig;
                let eq_sig = system.types.function(vec![iter_ty, iter_ty], bool_ty);
                let deref_sig = system.types.function(vec![iter_ty], binding_ty);
                let next_sig = system.types.function(vec![iter_ty], iter_ty);

                for (callee, sig) in [
                    (*begin_fn, begin_sig),
                    (*end_fn, end_sig),
                    (*equality_fn, eq_sig),
                    (*deref_fn, deref_sig),
                    (*next_fn, next_sig),
                ] {
                    let callee_ty = system.generate_root(callee);
                    system.add_constraint(Constraint::new(
                        ConstraintKind::Conversion {
                            first: callee_ty,
                            second: sig,
                        },
                        callee,
                    ));
                }
                system.solve();
            }
        }

        // Body scope with the loop binding in it.
        let body_scope = self.scopes.new_scope(scope, ScopeKind::Block);
        let binding_name = self
            .ast
            .as_var_let(for_stmt.binding)
            .map(|v| v.name)
            .unwrap_or_else(|| Symbol::intern("_"));
        self.scopes.insert_item(
            body_scope,
            binding_name,
            for_stmt.binding,
            galec_ast::Visibility::Private,
        );
        self.check_stmt(body_scope, for_stmt.body, true);
    }

    fn solve_condition(&mut self, scope: ScopeId, cond: ExprId) {
        let mut system = self.system(scope);
        let cond_ty = system.generate_root(cond);
        let bool_ty = system.types.bool_ty();
        system.add_constraint(Constraint::new(
            ConstraintKind::Conversion {
                first: cond_ty,
                second: bool_ty,
            },
            cond,
        ));
        system.solve();
    }

    fn system(&mut self, scope: ScopeId) -> ConstraintSystem<'_> {
        ConstraintSystem::new(self.types, self.ast, self.scopes, scope, self.handler)
    }
}
