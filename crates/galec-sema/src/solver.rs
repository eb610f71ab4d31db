//! The constraint solver.
//!
//! The solver explores a LIFO worklist of [`SystemState`]s. Each state holds
//! the type-variable substitution, the overload chosen per reference
//! expression, the implicit conversions to splice in, and a score counting
//! those conversions. Disjunctions fork cloned states; fully resolved states
//! become candidate solutions, and the minimum-score set survives. Nothing
//! touches the AST until a single best solution is committed, so a failed
//! search leaves the tree untouched.

use galec_ast::{
    display_type, Ast, DeclId, ExprId, ExprKind, RefTarget, TyId, Type, TypeArena,
};
use galec_util::{DiagnosticHandler, FxHashMap, FxHashSet};

use crate::constraint::{Constraint, ConstraintKind};
use crate::resolve;
use crate::scope::{ScopeId, ScopeTree};

/// Result of applying one constraint to a state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintResult {
    /// Already holds under the current bindings.
    Satisfied,
    /// Newly holds; the state was extended.
    Applied,
    /// Cannot hold; the state is dead.
    Failed,
}

/// A snapshot of the solver's search state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SystemState {
    /// Type-variable substitution, var → type.
    pub bindings: FxHashMap<TyId, TyId>,
    /// Chosen function overload per reference expression.
    pub overload_choices: FxHashMap<ExprId, DeclId>,
    /// Implicit conversions to splice, expression → target type.
    pub conversions: FxHashMap<ExprId, TyId>,
    /// Defaultable constraints whose variable bound away from the default,
    /// keyed by (locator, constrained type) so re-runs stay idempotent.
    pub non_default_bindings: FxHashSet<(ExprId, TyId)>,
    /// Implicit conversions plus non-default literal bindings; lower is
    /// better.
    pub score: u32,
}

/// The constraint system for one top-level statement or initializer.
pub struct ConstraintSystem<'a> {
    pub types: &'a mut TypeArena,
    pub ast: &'a mut Ast,
    pub scopes: &'a ScopeTree,
    /// Lexical scope reference expressions resolve in.
    pub scope: ScopeId,
    pub handler: &'a DiagnosticHandler,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) type_vars: Vec<TyId>,
    pub(crate) roots: Vec<ExprId>,
    /// Declaration type slots to fill from the solution.
    pub(crate) pending_decl_tys: Vec<(DeclId, TyId)>,
    /// True once an unresolved identifier was already diagnosed; suppresses
    /// the redundant no-solution trace.
    pub(crate) reported_lookup_failure: bool,
}

struct Failure {
    locator: ExprId,
    message: String,
}

#[derive(Default)]
struct SolutionResult {
    best: Vec<SystemState>,
    best_score: u32,
}

impl SolutionResult {
    fn try_add_solution(&mut self, state: SystemState) {
        if self.best.is_empty() || state.score < self.best_score {
            self.best_score = state.score;
            self.best.clear();
            self.best.push(state);
        } else if state.score == self.best_score && !self.best.contains(&state) {
            self.best.push(state);
        }
    }
}

impl<'a> ConstraintSystem<'a> {
    pub fn new(
        types: &'a mut TypeArena,
        ast: &'a mut Ast,
        scopes: &'a ScopeTree,
        scope: ScopeId,
        handler: &'a DiagnosticHandler,
    ) -> Self {
        Self {
            types,
            ast,
            scopes,
            scope,
            handler,
            constraints: Vec::new(),
            type_vars: Vec::new(),
            roots: Vec::new(),
            pending_decl_tys: Vec::new(),
            reported_lookup_failure: false,
        }
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn register_type_var(&mut self, var: TyId) {
        self.type_vars.push(var);
    }

    /// Request that `decl`'s var/let type slot be filled with the solved form
    /// of `ty` when a solution commits.
    pub fn bind_decl_type(&mut self, decl: DeclId, ty: TyId) {
        self.pending_decl_tys.push((decl, ty));
    }

    /// Run the search and commit the best solution. Returns false if no
    /// solution exists or the result is ambiguous; diagnostics are emitted
    /// either way.
    pub fn solve(&mut self) -> bool {
        let mut worklist: Vec<SystemState> = vec![SystemState::default()];
        let mut solutions = SolutionResult::default();
        let mut last_failure: Option<Failure> = None;

        while let Some(mut state) = worklist.pop() {
            let mut failed = false;

            let constraints = self.constraints.clone();
            for constraint in constraints.iter().filter(|c| !c.disabled) {
                if constraint.is_defaultable()
                    || is_struct_init(constraint)
                    || is_literal_property(constraint)
                {
                    continue;
                }
                let result = self.apply(constraint, &mut state, &mut worklist, &mut last_failure);
                if result == ConstraintResult::Failed {
                    failed = true;
                    break;
                }
            }
            if failed {
                continue;
            }

            // Aggregate initializers check against their target type, which
            // only becomes known as conversions and outer initializers bind
            // it; iterate them to a fixed point.
            let mut pending: Vec<&Constraint> = constraints
                .iter()
                .filter(|c| !c.disabled && is_struct_init(c))
                .collect();
            while !pending.is_empty() {
                let mut still_pending = Vec::new();
                let mut progressed = false;
                for constraint in pending {
                    let ConstraintKind::StructInitializer { ty, .. } = constraint.kind else {
                        continue;
                    };
                    let current = self.substitute(ty, &state.bindings);
                    if matches!(self.types.get(current), Type::TypeVar { .. }) {
                        still_pending.push(constraint);
                        continue;
                    }
                    let result =
                        self.apply(constraint, &mut state, &mut worklist, &mut last_failure);
                    if result == ConstraintResult::Failed {
                        failed = true;
                        break;
                    }
                    progressed = true;
                }
                if failed || !progressed {
                    // An aggregate whose type never resolves cannot be
                    // checked.
                    failed = failed || !still_pending.is_empty();
                    break;
                }
                pending = still_pending;
            }
            if failed {
                continue;
            }

            // Defaulting is last-resort: it runs only after every other
            // constraint held on this state.
            for constraint in constraints.iter().filter(|c| !c.disabled) {
                if !constraint.is_defaultable() {
                    continue;
                }
                let result = self.apply(constraint, &mut state, &mut worklist, &mut last_failure);
                if result == ConstraintResult::Failed {
                    failed = true;
                    break;
                }
            }
            if failed {
                continue;
            }

            // Literal expressibility is validated once the variables are
            // bound (by concrete unifiers or by defaulting); a literal whose
            // type resolved to the wrong class kills the state here.
            for constraint in constraints.iter().filter(|c| !c.disabled) {
                if !is_literal_property(constraint) {
                    continue;
                }
                let result = self.apply(constraint, &mut state, &mut worklist, &mut last_failure);
                if result == ConstraintResult::Failed {
                    failed = true;
                    break;
                }
            }
            if failed {
                continue;
            }

            if self.is_fully_resolved(&state) {
                solutions.try_add_solution(state);
            }
        }

        match solutions.best.len() {
            0 => {
                if !self.reported_lookup_failure {
                    match last_failure {
                        Some(failure) => {
                            let span = self.ast.exprs[failure.locator].span;
                            self.handler.error(span, failure.message);
                        }
                        None => {
                            if let Some(&root) = self.roots.first() {
                                let span = self.ast.exprs[root].span;
                                self.handler.error(span, "type checking failed");
                            }
                        }
                    }
                }
                false
            }
            1 => match solutions.best.pop() {
                Some(solution) => {
                    self.commit(&solution);
                    true
                }
                None => false,
            },
            _ => {
                self.report_ambiguity(&solutions.best);
                false
            }
        }
    }

    fn is_fully_resolved(&mut self, state: &SystemState) -> bool {
        let vars = self.type_vars.clone();
        for var in vars {
            let ty = self.substitute(var, &state.bindings);
            if self.types.contains_type_vars(ty) {
                return false;
            }
        }

        // No pending disjunctions: some branch of every disjunction must
        // hold outright under this state's bindings. A branch that would
        // still extend the state means the choice was never committed here.
        let constraints = self.constraints.clone();
        for constraint in constraints.iter().filter(|c| !c.disabled) {
            let ConstraintKind::Disjunction { children, .. } = &constraint.kind else {
                continue;
            };
            let mut resolved = false;
            for child in children.iter().filter(|c| !c.disabled) {
                let mut probe = state.clone();
                let mut scratch = Vec::new();
                let mut ignored = None;
                if self.apply(child, &mut probe, &mut scratch, &mut ignored)
                    == ConstraintResult::Satisfied
                {
                    resolved = true;
                    break;
                }
            }
            if !resolved {
                return false;
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Substitution and unification
    // ------------------------------------------------------------------

    /// Deeply apply a state's bindings to a type, unwrapping aliases and
    /// rebuilding composite types through the arena.
    pub fn substitute(&mut self, ty: TyId, bindings: &FxHashMap<TyId, TyId>) -> TyId {
        let ty = self.types.resolve_alias(ty);
        match self.types.get(ty).clone() {
            Type::TypeVar { .. } => match bindings.get(&ty) {
                Some(&bound) => self.substitute(bound, bindings),
                None => ty,
            },
            Type::Pointer { pointee, kind } => {
                let new = self.substitute(pointee, bindings);
                if new == pointee {
                    ty
                } else {
                    self.types.pointer(new, kind)
                }
            }
            Type::StaticArray { elem, size } => {
                let new = self.substitute(elem, bindings);
                if new == elem {
                    ty
                } else {
                    self.types.static_array(new, size)
                }
            }
            Type::DynamicArray { elem } => {
                let new = self.substitute(elem, bindings);
                if new == elem {
                    ty
                } else {
                    self.types.intern(Type::DynamicArray { elem: new })
                }
            }
            Type::Function {
                params,
                ret,
                c_variadic,
            } => {
                let new_params: Vec<TyId> = params
                    .iter()
                    .map(|&p| self.substitute(p, bindings))
                    .collect();
                let new_ret = self.substitute(ret, bindings);
                if new_params == params && new_ret == ret {
                    ty
                } else {
                    self.types.intern(Type::Function {
                        params: new_params,
                        ret: new_ret,
                        c_variadic,
                    })
                }
            }
            Type::Struct {
                decl,
                template_args,
            } => {
                let new_args: Vec<TyId> = template_args
                    .iter()
                    .map(|&a| self.substitute(a, bindings))
                    .collect();
                if new_args == template_args {
                    ty
                } else {
                    self.types.intern(Type::Struct {
                        decl,
                        template_args: new_args,
                    })
                }
            }
            _ => ty,
        }
    }

    /// Occurs check: does `var` appear anywhere inside `ty`?
    fn occurs_in(&self, var: TyId, ty: TyId) -> bool {
        if ty == var {
            return true;
        }
        match self.types.get(ty) {
            Type::TypeAlias { aliased, .. } => self.occurs_in(var, *aliased),
            Type::Pointer { pointee, .. } => self.occurs_in(var, *pointee),
            Type::StaticArray { elem, .. } | Type::DynamicArray { elem } => {
                self.occurs_in(var, *elem)
            }
            Type::Function { params, ret, .. } => {
                params.iter().any(|&p| self.occurs_in(var, p)) || self.occurs_in(var, *ret)
            }
            Type::Struct { template_args, .. } => {
                template_args.iter().any(|&a| self.occurs_in(var, a))
            }
            _ => false,
        }
    }

    /// Structural unification extending the state's bindings.
    pub fn unify(&mut self, first: TyId, second: TyId, state: &mut SystemState) -> bool {
        let first = self.substitute(first, &state.bindings);
        let second = self.substitute(second, &state.bindings);
        if first == second {
            return true;
        }

        if matches!(self.types.get(first), Type::TypeVar { .. }) {
            if self.occurs_in(first, second) {
                return false;
            }
            state.bindings.insert(first, second);
            return true;
        }
        if matches!(self.types.get(second), Type::TypeVar { .. }) {
            if self.occurs_in(second, first) {
                return false;
            }
            state.bindings.insert(second, first);
            return true;
        }

        let a = self.types.get(first).clone();
        let b = self.types.get(second).clone();
        match (a, b) {
            (
                Type::Pointer {
                    pointee: p1,
                    kind: k1,
                },
                Type::Pointer {
                    pointee: p2,
                    kind: k2,
                },
            ) => k1 == k2 && self.unify(p1, p2, state),
            (
                Type::Function {
                    params: params1,
                    ret: ret1,
                    c_variadic: v1,
                },
                Type::Function {
                    params: params2,
                    ret: ret2,
                    c_variadic: v2,
                },
            ) => {
                if params1.len() != params2.len() || v1 != v2 {
                    return false;
                }
                if !self.unify(ret1, ret2, state) {
                    return false;
                }
                params1
                    .iter()
                    .zip(params2.iter())
                    .all(|(&p1, &p2)| self.unify(p1, p2, state))
            }
            (
                Type::StaticArray { elem: e1, size: s1 },
                Type::StaticArray { elem: e2, size: s2 },
            ) => s1 == s2 && self.unify(e1, e2, state),
            (Type::DynamicArray { elem: e1 }, Type::DynamicArray { elem: e2 }) => {
                self.unify(e1, e2, state)
            }
            (
                Type::Struct {
                    decl: d1,
                    template_args: a1,
                },
                Type::Struct {
                    decl: d2,
                    template_args: a2,
                },
            ) => {
                d1 == d2
                    && a1.len() == a2.len()
                    && a1
                        .iter()
                        .zip(a2.iter())
                        .all(|(&x, &y)| self.unify(x, y, state))
            }
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Conversion checking
    // ------------------------------------------------------------------

    /// Whether `from` converts to `to`. Both must be concrete (substituted,
    /// alias-free). `explicit` widens the rules to those of a checked cast.
    pub fn check_conversion(&mut self, from: TyId, to: TyId, explicit: bool) -> bool {
        if from == to {
            return true;
        }
        let a = self.types.get(from).clone();
        let b = self.types.get(to).clone();
        match (a, b) {
            (Type::Int { bit_width: fw, .. }, Type::Int { bit_width: tw, .. }) => {
                // Widening is implicit; a sign change at equal width is a
                // bitcast and allowed both ways; narrowing needs a cast.
                fw <= tw || explicit
            }
            (Type::Float { width: fw }, Type::Float { width: tw }) => {
                fw.bit_width() <= tw.bit_width() || explicit
            }
            (Type::StaticArray { elem, .. }, Type::Pointer { pointee, .. }) => elem == pointee,
            (Type::Pointer { pointee: p1, .. }, Type::Pointer { pointee: p2, .. }) => {
                p1 == p2 || explicit
            }
            (Type::Int { .. }, Type::Pointer { .. }) => explicit,
            (Type::Pointer { .. }, Type::Int { .. }) => explicit,
            (Type::Enum { .. }, Type::Int { .. }) => explicit,
            (Type::Int { .. }, Type::Enum { .. }) => explicit,
            (Type::Int { .. }, Type::Char) => explicit,
            (Type::Char, Type::Int { .. }) => explicit,
            // The null literal is usable as any pointer.
            (Type::Null, Type::Pointer { .. }) => true,
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Constraint application
    // ------------------------------------------------------------------

    fn apply(
        &mut self,
        constraint: &Constraint,
        state: &mut SystemState,
        worklist: &mut Vec<SystemState>,
        failure: &mut Option<Failure>,
    ) -> ConstraintResult {
        let result = match &constraint.kind {
            ConstraintKind::Bind { first, second }
            | ConstraintKind::Equal { first, second }
            | ConstraintKind::LValueObject { first, second } => {
                self.apply_bind(*first, *second, state)
            }
            ConstraintKind::BindToPointerType { first, second } => {
                self.apply_bind_to_pointer(*first, *second, state)
            }
            ConstraintKind::Conversion { first, second }
            | ConstraintKind::ArgumentConversion { first, second }
            | ConstraintKind::OperatorArgumentConversion { first, second } => {
                self.apply_conversion(*first, *second, constraint.locator, state)
            }
            ConstraintKind::CheckedCast { first, second } => {
                self.apply_checked_cast(*first, *second, state)
            }
            ConstraintKind::Defaultable { first, second } => {
                self.apply_defaultable(*first, *second, constraint.locator, state)
            }
            ConstraintKind::BindOverload { ty, choice } => {
                self.apply_bind_overload(*ty, *choice, constraint.locator, state)
            }
            ConstraintKind::ValueMember {
                base,
                member,
                member_expr,
            }
            | ConstraintKind::UnresolvedValueMember {
                base,
                member,
                member_expr,
            } => self.apply_value_member(*base, *member, *member_expr, state),
            ConstraintKind::Disjunction {
                children,
                remember_choice: _,
            } => self.apply_disjunction(children, state, worklist, failure),
            ConstraintKind::Conjunction { children } => {
                self.apply_conjunction(children, state, worklist, failure)
            }
            ConstraintKind::ExpressibleByIntLiteral { ty } => {
                self.apply_expressible(*ty, LiteralClass::Int, state)
            }
            ConstraintKind::ExpressibleByFloatLiteral { ty } => {
                self.apply_expressible(*ty, LiteralClass::Float, state)
            }
            ConstraintKind::ExpressibleByBoolLiteral { ty } => {
                self.apply_expressible(*ty, LiteralClass::Bool, state)
            }
            ConstraintKind::ExpressibleByStringLiteral { ty } => {
                self.apply_expressible(*ty, LiteralClass::String, state)
            }
            ConstraintKind::StructInitializer { ty, expr } => {
                self.apply_struct_initializer(*ty, *expr, state)
            }
        };

        if result == ConstraintResult::Failed {
            *failure = Some(self.describe_failure(constraint, state));
        }
        result
    }

    fn apply_bind(&mut self, first: TyId, second: TyId, state: &mut SystemState) -> ConstraintResult {
        let a = self.substitute(first, &state.bindings);
        let b = self.substitute(second, &state.bindings);
        if a == b {
            return ConstraintResult::Satisfied;
        }
        if self.unify(first, second, state) {
            ConstraintResult::Applied
        } else {
            ConstraintResult::Failed
        }
    }

    fn apply_bind_to_pointer(
        &mut self,
        first: TyId,
        second: TyId,
        state: &mut SystemState,
    ) -> ConstraintResult {
        let pointee_side = self.substitute(first, &state.bindings);
        let pointer_side = self.substitute(second, &state.bindings);

        if let Type::Pointer { pointee, .. } = self.types.get(pointer_side).clone() {
            if pointee_side == pointee {
                return ConstraintResult::Satisfied;
            }
            return if self.unify(first, pointee, state) {
                ConstraintResult::Applied
            } else {
                ConstraintResult::Failed
            };
        }

        if matches!(self.types.get(pointer_side), Type::TypeVar { .. }) {
            let pointer_ty = self.types.raw_pointer(pointee_side);
            return if self.unify(second, pointer_ty, state) {
                ConstraintResult::Applied
            } else {
                ConstraintResult::Failed
            };
        }

        ConstraintResult::Failed
    }

    fn apply_conversion(
        &mut self,
        first: TyId,
        second: TyId,
        locator: ExprId,
        state: &mut SystemState,
    ) -> ConstraintResult {
        let from = self.substitute(first, &state.bindings);
        let to = self.substitute(second, &state.bindings);
        if from == to {
            return ConstraintResult::Satisfied;
        }

        // With a type variable involved on either side, succeed by
        // unifying; this is what resolves the function types built for
        // calls and operator applications.
        if self.types.contains_type_vars(from) || self.types.contains_type_vars(to) {
            return if self.unify(from, to, state) {
                ConstraintResult::Applied
            } else {
                ConstraintResult::Failed
            };
        }

        if self.check_conversion(from, to, false) {
            // Record the implicit conversion so a cast is spliced at commit.
            if state.conversions.insert(locator, to).is_none() {
                state.score += 1;
            }
            ConstraintResult::Applied
        } else {
            ConstraintResult::Failed
        }
    }

    fn apply_checked_cast(
        &mut self,
        first: TyId,
        second: TyId,
        state: &mut SystemState,
    ) -> ConstraintResult {
        let from = self.substitute(first, &state.bindings);
        let to = self.substitute(second, &state.bindings);
        if from == to {
            return ConstraintResult::Satisfied;
        }
        if matches!(self.types.get(from), Type::TypeVar { .. })
            || matches!(self.types.get(to), Type::TypeVar { .. })
        {
            // Leave the variable free; the paired defaultable constraint
            // binds it to the cast target if nothing else does.
            return ConstraintResult::Satisfied;
        }
        if self.check_conversion(from, to, true) {
            ConstraintResult::Applied
        } else {
            ConstraintResult::Failed
        }
    }

    fn apply_defaultable(
        &mut self,
        first: TyId,
        second: TyId,
        locator: ExprId,
        state: &mut SystemState,
    ) -> ConstraintResult {
        let current = self.substitute(first, &state.bindings);
        if !matches!(self.types.get(current), Type::TypeVar { .. }) {
            // A concrete binding was found earlier; the default never
            // overrides it. Binding away from the default costs a score
            // point so states that honor the default win ties between
            // otherwise-equal overload choices.
            let default = self.substitute(second, &state.bindings);
            if current != default && state.non_default_bindings.insert((locator, first)) {
                state.score += 1;
            }
            return ConstraintResult::Satisfied;
        }
        if self.unify(first, second, state) {
            ConstraintResult::Applied
        } else {
            ConstraintResult::Failed
        }
    }

    fn apply_bind_overload(
        &mut self,
        ty: TyId,
        choice: DeclId,
        locator: ExprId,
        state: &mut SystemState,
    ) -> ConstraintResult {
        let Some(function) = self.ast.as_function(choice) else {
            return ConstraintResult::Failed;
        };
        let fn_ty = function.ty;

        // A state committed to a different overload for this reference is
        // dead on this branch.
        if let Some(&existing) = state.overload_choices.get(&locator) {
            if existing != choice {
                return ConstraintResult::Failed;
            }
        }

        let current = self.substitute(ty, &state.bindings);
        let target = self.substitute(fn_ty, &state.bindings);
        if current == target {
            state.overload_choices.insert(locator, choice);
            return ConstraintResult::Satisfied;
        }
        if self.unify(ty, fn_ty, state) {
            state.overload_choices.insert(locator, choice);
            ConstraintResult::Applied
        } else {
            ConstraintResult::Failed
        }
    }

    fn apply_value_member(
        &mut self,
        base: TyId,
        member: TyId,
        member_expr: ExprId,
        state: &mut SystemState,
    ) -> ConstraintResult {
        let base = self.substitute(base, &state.bindings);
        let Type::Struct { decl, .. } = self.types.get(base).clone() else {
            return ConstraintResult::Failed;
        };

        let ExprKind::StructMember { member: name, .. } = self.ast.exprs[member_expr].kind else {
            return ConstraintResult::Failed;
        };
        let Some(index) = self.ast.struct_field_index(decl, name) else {
            return ConstraintResult::Failed;
        };
        let Some(field_ty) = self
            .ast
            .as_struct(decl)
            .and_then(|s| s.fields.get(index).copied())
            .and_then(|f| self.ast.as_field(f))
            .map(|f| f.ty)
        else {
            return ConstraintResult::Failed;
        };

        let member = self.substitute(member, &state.bindings);
        if member == self.substitute(field_ty, &state.bindings) {
            return ConstraintResult::Satisfied;
        }
        if self.unify(member, field_ty, state) {
            ConstraintResult::Applied
        } else {
            ConstraintResult::Failed
        }
    }

    fn apply_disjunction(
        &mut self,
        children: &[Constraint],
        state: &mut SystemState,
        worklist: &mut Vec<SystemState>,
        failure: &mut Option<Failure>,
    ) -> ConstraintResult {
        let mut any_satisfied = false;
        let mut any_applied = false;

        for child in children.iter().filter(|c| !c.disabled) {
            // Each branch explores a cloned state.
            let mut branch = state.clone();
            match self.apply(child, &mut branch, worklist, failure) {
                ConstraintResult::Satisfied => {
                    any_satisfied = true;
                    *state = branch;
                }
                ConstraintResult::Applied => {
                    worklist.push(branch);
                    any_applied = true;
                }
                ConstraintResult::Failed => {}
            }
        }

        if any_satisfied {
            ConstraintResult::Satisfied
        } else if any_applied {
            ConstraintResult::Applied
        } else {
            ConstraintResult::Failed
        }
    }

    fn apply_conjunction(
        &mut self,
        children: &[Constraint],
        state: &mut SystemState,
        worklist: &mut Vec<SystemState>,
        failure: &mut Option<Failure>,
    ) -> ConstraintResult {
        let mut any_applied = false;
        for child in children.iter().filter(|c| !c.disabled) {
            match self.apply(child, state, worklist, failure) {
                ConstraintResult::Satisfied => {}
                ConstraintResult::Applied => any_applied = true,
                ConstraintResult::Failed => return ConstraintResult::Failed,
            }
        }
        if any_applied {
            ConstraintResult::Applied
        } else {
            ConstraintResult::Satisfied
        }
    }

    fn apply_expressible(
        &mut self,
        ty: TyId,
        class: LiteralClass,
        state: &mut SystemState,
    ) -> ConstraintResult {
        let ty = self.substitute(ty, &state.bindings);
        if matches!(self.types.get(ty), Type::TypeVar { .. }) {
            // Not yet determined; defaulting decides later.
            return ConstraintResult::Satisfied;
        }
        let ok = match class {
            LiteralClass::Int => matches!(self.types.get(ty), Type::Int { .. }),
            LiteralClass::Float => matches!(self.types.get(ty), Type::Float { .. }),
            LiteralClass::Bool => matches!(self.types.get(ty), Type::Bool),
            LiteralClass::String => match self.types.get(ty) {
                Type::Pointer { pointee, .. } => {
                    matches!(self.types.get(self.types.resolve_alias(*pointee)), Type::Char)
                }
                _ => false,
            },
        };
        if ok {
            ConstraintResult::Satisfied
        } else {
            ConstraintResult::Failed
        }
    }

    fn apply_struct_initializer(
        &mut self,
        ty: TyId,
        expr: ExprId,
        state: &mut SystemState,
    ) -> ConstraintResult {
        let ty = self.substitute(ty, &state.bindings);
        let ExprKind::StructInit { fields: provided } = self.ast.exprs[expr].kind.clone() else {
            return ConstraintResult::Failed;
        };

        match self.types.get(ty).clone() {
            Type::Struct { decl, .. } => {
                let Some(declared) = self.ast.as_struct(decl).map(|s| s.fields.clone()) else {
                    return ConstraintResult::Failed;
                };
                if provided.len() > declared.len() {
                    return ConstraintResult::Failed;
                }
                for (i, &field_decl) in declared.iter().enumerate() {
                    let Some(field) = self.ast.as_field(field_decl) else {
                        return ConstraintResult::Failed;
                    };
                    let field_ty = field.ty;
                    let has_default = field.default.is_some();
                    if let Some(&value) = provided.get(i) {
                        let Some(value_ty) = self.ast.exprs[value].ty else {
                            return ConstraintResult::Failed;
                        };
                        if !self.unify(value_ty, field_ty, state) {
                            return ConstraintResult::Failed;
                        }
                    } else if !has_default {
                        // Missing required field.
                        return ConstraintResult::Failed;
                    }
                }
                ConstraintResult::Applied
            }
            Type::StaticArray { elem, size } => {
                if provided.len() as u64 != size {
                    return ConstraintResult::Failed;
                }
                for &value in &provided {
                    let Some(value_ty) = self.ast.exprs[value].ty else {
                        return ConstraintResult::Failed;
                    };
                    if !self.unify(value_ty, elem, state) {
                        return ConstraintResult::Failed;
                    }
                }
                ConstraintResult::Applied
            }
            _ => ConstraintResult::Failed,
        }
    }

    // ------------------------------------------------------------------
    // Reporting and commit
    // ------------------------------------------------------------------

    fn describe_failure(&mut self, constraint: &Constraint, state: &SystemState) -> Failure {
        let message = match (&constraint.kind, constraint.relation()) {
            (ConstraintKind::Conversion { .. }, Some((first, second)))
            | (ConstraintKind::ArgumentConversion { .. }, Some((first, second)))
            | (ConstraintKind::OperatorArgumentConversion { .. }, Some((first, second))) => {
                let from = self.substitute(first, &state.bindings);
                let to = self.substitute(second, &state.bindings);
                format!(
                    "invalid implicit conversion: {} -> {}",
                    display_type(self.types, self.ast, from),
                    display_type(self.types, self.ast, to)
                )
            }
            (ConstraintKind::CheckedCast { .. }, Some((first, second))) => {
                let from = self.substitute(first, &state.bindings);
                let to = self.substitute(second, &state.bindings);
                format!(
                    "invalid cast: {} -> {}",
                    display_type(self.types, self.ast, from),
                    display_type(self.types, self.ast, to)
                )
            }
            (
                ConstraintKind::ValueMember { base, member_expr, .. }
                | ConstraintKind::UnresolvedValueMember { base, member_expr, .. },
                _,
            ) => {
                let base = self.substitute(*base, &state.bindings);
                let name = match self.ast.exprs[*member_expr].kind {
                    ExprKind::StructMember { member, .. } => member.to_string(),
                    _ => "<member>".to_string(),
                };
                format!(
                    "type {} has no member '{}'",
                    display_type(self.types, self.ast, base),
                    name
                )
            }
            (_, Some((first, second))) => {
                let a = self.substitute(first, &state.bindings);
                let b = self.substitute(second, &state.bindings);
                format!(
                    "{} constraint failed: {} vs {}",
                    constraint.kind_name(),
                    display_type(self.types, self.ast, a),
                    display_type(self.types, self.ast, b)
                )
            }
            _ => format!("{} constraint failed", constraint.kind_name()),
        };
        Failure {
            locator: constraint.locator,
            message,
        }
    }

    fn report_ambiguity(&mut self, solutions: &[SystemState]) {
        // Point at a reference whose chosen overload differs between tied
        // solutions, listing the candidates.
        let first = &solutions[0];
        let mut locator = self.roots.first().copied();
        let mut candidates: Vec<DeclId> = Vec::new();
        for (&expr, &choice) in &first.overload_choices {
            let mut choices: Vec<DeclId> = vec![choice];
            for other in &solutions[1..] {
                if let Some(&other_choice) = other.overload_choices.get(&expr) {
                    if !choices.contains(&other_choice) {
                        choices.push(other_choice);
                    }
                }
            }
            if choices.len() > 1 {
                locator = Some(expr);
                candidates = choices;
                break;
            }
        }

        let span = locator
            .map(|e| self.ast.exprs[e].span)
            .unwrap_or(galec_util::Span::DUMMY);
        let mut diagnostic = galec_util::Diagnostic::error(
            format!("ambiguous use; {} solutions tie", solutions.len()),
            span,
        );
        for decl in candidates {
            if let Some(f) = self.ast.as_function(decl) {
                diagnostic = diagnostic.with_note(format!(
                    "candidate: {} : {}",
                    f.name,
                    display_type(self.types, self.ast, f.ty)
                ));
            }
        }
        self.handler.emit(diagnostic);
    }

    /// Collect every expression in the subtrees of the system's roots.
    fn collect_exprs(&self) -> Vec<ExprId> {
        let mut stack: Vec<ExprId> = self.roots.clone();
        let mut out = Vec::new();
        while let Some(expr) = stack.pop() {
            out.push(expr);
            match &self.ast.exprs[expr].kind {
                ExprKind::Call { callee, args } => {
                    stack.push(*callee);
                    stack.extend(args.iter().copied());
                }
                ExprKind::Binary { op, lhs, rhs } => {
                    stack.push(*op);
                    stack.push(*lhs);
                    stack.push(*rhs);
                }
                ExprKind::Unary { op, operand } => {
                    stack.push(*op);
                    stack.push(*operand);
                }
                ExprKind::Ternary {
                    cond,
                    then_value,
                    else_value,
                } => {
                    stack.push(*cond);
                    stack.push(*then_value);
                    stack.push(*else_value);
                }
                ExprKind::Cast { value, .. } => stack.push(*value),
                ExprKind::StructInit { fields } => stack.extend(fields.iter().copied()),
                ExprKind::StructMember { base, .. } => stack.push(*base),
                ExprKind::Literal(_) | ExprKind::Ref { .. } => {}
            }
        }
        out
    }

    /// Commit the best solution onto the AST.
    fn commit(&mut self, solution: &SystemState) {
        let exprs = self.collect_exprs();

        // 1. Substitute every expression type; any leftover variable is an
        //    unresolved type, and leftover names resolve through the scope.
        for &expr in &exprs {
            if let Some(ty) = self.ast.exprs[expr].ty {
                let span = self.ast.exprs[expr].span;
                let mut solved = self.substitute(ty, &solution.bindings);
                solved = resolve::resolve_type(
                    self.types,
                    self.scopes,
                    self.scope,
                    solved,
                    span,
                    self.handler,
                );
                if self.types.contains_type_vars(solved) {
                    self.handler.error(span, "unresolved type");
                }
                self.ast.exprs[expr].ty = Some(solved);
            }
        }

        // Fill the declaration type slots solved alongside.
        let pending = self.pending_decl_tys.clone();
        for (decl, ty) in pending {
            let solved = self.substitute(ty, &solution.bindings);
            if let galec_ast::DeclKind::VarLet(v) = &mut self.ast.decls[decl].kind {
                v.ty = Some(solved);
            }
        }

        // 2. Record resolved field indices on member expressions.
        for &expr in &exprs {
            let ExprKind::StructMember { base, member, .. } = self.ast.exprs[expr].kind else {
                continue;
            };
            let Some(base_ty) = self.ast.exprs[base].ty else {
                continue;
            };
            let base_ty = self.types.resolve_alias(base_ty);
            if let Type::Struct { decl, .. } = self.types.get(base_ty) {
                let index = self.ast.struct_field_index(*decl, member);
                if let ExprKind::StructMember { field_index, .. } =
                    &mut self.ast.exprs[expr].kind
                {
                    *field_index = index;
                }
            }
        }

        // 3. Set chosen overloads on reference expressions.
        let mut choices: Vec<(ExprId, DeclId)> = solution
            .overload_choices
            .iter()
            .map(|(&e, &d)| (e, d))
            .collect();
        choices.sort_by_key(|(e, _)| *e);
        for (expr, decl) in choices {
            if let ExprKind::Ref { target, .. } = &mut self.ast.exprs[expr].kind {
                *target = Some(RefTarget::Function(decl));
            }
        }

        // 4. Splice a synthetic cast above each implicitly converted
        //    expression. The original node moves to a fresh id and the old id
        //    becomes the cast, so parent links stay valid.
        let mut conversions: Vec<(ExprId, TyId)> =
            solution.conversions.iter().map(|(&e, &t)| (e, t)).collect();
        conversions.sort_by_key(|(e, _)| *e);
        for (expr, target) in conversions {
            let current_ty = self.ast.exprs[expr].ty;
            if current_ty == Some(target) {
                continue;
            }
            let span = self.ast.exprs[expr].span;
            let original = self.ast.exprs[expr].clone();
            let moved = self.ast.exprs.push(original);
            self.ast.exprs[expr] = galec_ast::Expr {
                kind: ExprKind::Cast {
                    value: moved,
                    target,
                },
                span,
                ty: Some(target),
            };
        }
    }
}

#[derive(Clone, Copy)]
enum LiteralClass {
    Int,
    Float,
    Bool,
    String,
}

fn is_struct_init(constraint: &Constraint) -> bool {
    matches!(constraint.kind, ConstraintKind::StructInitializer { .. })
}

fn is_literal_property(constraint: &Constraint) -> bool {
    matches!(
        constraint.kind,
        ConstraintKind::ExpressibleByIntLiteral { .. }
            | ConstraintKind::ExpressibleByFloatLiteral { .. }
            | ConstraintKind::ExpressibleByBoolLiteral { .. }
            | ConstraintKind::ExpressibleByStringLiteral { .. }
    )
}
