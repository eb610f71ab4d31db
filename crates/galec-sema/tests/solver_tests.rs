//! End-to-end solver scenarios: literal defaulting, overload selection,
//! conversion rules, ambiguity, and member access.

mod common;

use common::{span, sym, TestModule};
use galec_ast::*;
use galec_sema::ConstraintSystem;
use galec_util::DiagnosticHandler;

#[test]
fn literal_defaulting_picks_int32() {
    // let x = 42;  =>  x : Int32, no conversions, no diagnostics
    let mut t = TestModule::new();
    let lit = t
        .ast
        .add_expr(ExprKind::Literal(LiteralValue::Int(42)), span(2, 9));
    let (decl, stmt) = t.let_stmt("x", None, lit);
    let module = t.module_with_fn("main", vec![stmt], vec![]);

    t.analyze(module).unwrap();

    assert!(!t.handler.has_errors(), "{:?}", t.handler.diagnostics());
    let expected = t.types.int32();
    assert_eq!(t.ast.expr_ty(lit), Some(expected));
    assert_eq!(t.ast.as_var_let(decl).unwrap().ty, Some(expected));
    // No cast was spliced above the literal.
    assert!(matches!(t.ast.exprs[lit].kind, ExprKind::Literal(_)));
}

#[test]
fn defaulting_is_last_resort() {
    // let x: Int64 = 42;  =>  the literal takes Int64, never the default
    let mut t = TestModule::new();
    let i64 = t.types.int64();
    let lit = t
        .ast
        .add_expr(ExprKind::Literal(LiteralValue::Int(42)), span(2, 16));
    let (decl, stmt) = t.let_stmt("x", Some(i64), lit);
    let module = t.module_with_fn("main", vec![stmt], vec![]);

    t.analyze(module).unwrap();

    assert!(!t.handler.has_errors(), "{:?}", t.handler.diagnostics());
    assert_eq!(t.ast.expr_ty(lit), Some(i64));
    assert_eq!(t.ast.as_var_let(decl).unwrap().ty, Some(i64));
}

#[test]
fn overload_selection_prefers_matching_type() {
    // func f(Int32); func f(Float64); f(1.5) => the Float64 overload
    let mut t = TestModule::new();
    let i32 = t.types.int32();
    let f64 = t.types.float64();
    let void = t.types.void();
    let f_int = t.extern_fn("f", &[i32], void);
    let f_float = t.extern_fn("f", &[f64], void);

    let arg = t
        .ast
        .add_expr(ExprKind::Literal(LiteralValue::Float(1.5)), span(2, 3));
    let callee = t.ast.ref_named("f", span(2, 1));
    let call = t.ast.add_expr(
        ExprKind::Call {
            callee,
            args: vec![arg],
        },
        span(2, 1),
    );
    let stmt = t.ast.add_stmt(StmtKind::Expr { expr: call }, span(2, 1));
    let module = t.module_with_fn("main", vec![stmt], vec![f_int, f_float]);

    t.analyze(module).unwrap();

    assert!(!t.handler.has_errors(), "{:?}", t.handler.diagnostics());
    let ExprKind::Ref { target, .. } = &t.ast.exprs[callee].kind else {
        panic!("callee is not a ref");
    };
    assert_eq!(*target, Some(RefTarget::Function(f_float)));
    assert_eq!(t.ast.expr_ty(arg), Some(f64));
}

#[test]
fn narrowing_is_rejected_implicitly() {
    // var wide: Int64; let x: Int32 = wide;  =>  error
    let mut t = TestModule::new();
    let i64 = t.types.int64();
    let i32 = t.types.int32();
    let wide = t.global_var("wide", i64);

    let value = t.ast.ref_named("wide", span(3, 16));
    let (_, stmt) = t.let_stmt("x", Some(i32), value);
    let module = t.module_with_fn("main", vec![stmt], vec![wide]);

    t.analyze(module).unwrap();

    assert!(t.handler.has_errors());
    let messages: Vec<String> = t
        .handler
        .diagnostics()
        .iter()
        .map(|d| d.message.clone())
        .collect();
    assert!(
        messages
            .iter()
            .any(|m| m.contains("invalid implicit conversion") && m.contains("Int64")),
        "unexpected diagnostics: {messages:?}"
    );
}

#[test]
fn narrowing_is_accepted_with_explicit_cast() {
    // let x: Int32 = wide as Int32;
    let mut t = TestModule::new();
    let i64 = t.types.int64();
    let i32 = t.types.int32();
    let wide = t.global_var("wide", i64);

    let value = t.ast.ref_named("wide", span(3, 16));
    let cast = t.ast.add_expr(
        ExprKind::Cast {
            value,
            target: i32,
        },
        span(3, 16),
    );
    let (decl, stmt) = t.let_stmt("x", Some(i32), cast);
    let module = t.module_with_fn("main", vec![stmt], vec![wide]);

    t.analyze(module).unwrap();

    assert!(!t.handler.has_errors(), "{:?}", t.handler.diagnostics());
    assert_eq!(t.ast.expr_ty(cast), Some(i32));
    assert_eq!(t.ast.as_var_let(decl).unwrap().ty, Some(i32));
}

#[test]
fn implicit_widening_splices_a_cast() {
    // var narrow: Int32; let x: Int64 = narrow;  =>  cast inserted
    let mut t = TestModule::new();
    let i32 = t.types.int32();
    let i64 = t.types.int64();
    let narrow = t.global_var("narrow", i32);

    let value = t.ast.ref_named("narrow", span(3, 16));
    let (_, stmt) = t.let_stmt("x", Some(i64), value);
    let module = t.module_with_fn("main", vec![stmt], vec![narrow]);

    t.analyze(module).unwrap();

    assert!(!t.handler.has_errors(), "{:?}", t.handler.diagnostics());
    // The initializer expression node became a synthetic cast to Int64.
    match &t.ast.exprs[value].kind {
        ExprKind::Cast { target, .. } => assert_eq!(*target, i64),
        other => panic!("expected spliced cast, found {other:?}"),
    }
    assert_eq!(t.ast.expr_ty(value), Some(i64));
}

#[test]
fn tied_overloads_are_ambiguous() {
    // Two identical f(Int32) overloads; f(1) cannot choose.
    let mut t = TestModule::new();
    let i32 = t.types.int32();
    let void = t.types.void();
    let f1 = t.extern_fn("f", &[i32], void);
    let f2 = t.extern_fn("f", &[i32], void);

    let arg = t
        .ast
        .add_expr(ExprKind::Literal(LiteralValue::Int(1)), span(2, 3));
    let callee = t.ast.ref_named("f", span(2, 1));
    let call = t.ast.add_expr(
        ExprKind::Call {
            callee,
            args: vec![arg],
        },
        span(2, 1),
    );
    let stmt = t.ast.add_stmt(StmtKind::Expr { expr: call }, span(2, 1));
    let module = t.module_with_fn("main", vec![stmt], vec![f1, f2]);

    t.analyze(module).unwrap();

    assert!(t.handler.has_errors());
    let messages: Vec<String> = t
        .handler
        .diagnostics()
        .iter()
        .map(|d| d.message.clone())
        .collect();
    assert!(
        messages.iter().any(|m| m.contains("ambiguous")),
        "unexpected diagnostics: {messages:?}"
    );
}

#[test]
fn unresolved_identifier_reports_once() {
    let mut t = TestModule::new();
    let missing = t.ast.ref_named("nope", span(2, 1));
    let stmt = t
        .ast
        .add_stmt(StmtKind::Expr { expr: missing }, span(2, 1));
    let module = t.module_with_fn("main", vec![stmt], vec![]);

    t.analyze(module).unwrap();

    let errors: Vec<String> = t
        .handler
        .diagnostics()
        .iter()
        .filter(|d| d.level >= galec_util::Level::Error)
        .map(|d| d.message.clone())
        .collect();
    assert_eq!(errors.len(), 1, "expected one error, got {errors:?}");
    assert!(errors[0].contains("nope"));
}

#[test]
fn member_access_resolves_field_index() {
    // struct Point { x: Int32, y: Int32 }; var p: Point; let a = p.y;
    let mut t = TestModule::new();
    let i32 = t.types.int32();
    let (_point_decl, point_ty) = t.struct_decl("Point", &[("x", i32), ("y", i32)]);
    let p = t.global_var("p", point_ty);

    let base = t.ast.ref_named("p", span(3, 9));
    let member = t.ast.add_expr(
        ExprKind::StructMember {
            base,
            member: sym("y"),
            field_index: None,
        },
        span(3, 9),
    );
    let (decl, stmt) = t.let_stmt("a", None, member);
    let module = t.module_with_fn("main", vec![stmt], vec![p]);

    t.analyze(module).unwrap();

    assert!(!t.handler.has_errors(), "{:?}", t.handler.diagnostics());
    assert_eq!(t.ast.expr_ty(member), Some(i32));
    assert_eq!(t.ast.as_var_let(decl).unwrap().ty, Some(i32));
    match &t.ast.exprs[member].kind {
        ExprKind::StructMember { field_index, .. } => assert_eq!(*field_index, Some(1)),
        other => panic!("unexpected kind {other:?}"),
    }
}

#[test]
fn struct_initializer_checks_fields() {
    // let p: Point = { 1, 2 };
    let mut t = TestModule::new();
    let i32 = t.types.int32();
    let (_point_decl, point_ty) = t.struct_decl("Point", &[("x", i32), ("y", i32)]);

    let f0 = t
        .ast
        .add_expr(ExprKind::Literal(LiteralValue::Int(1)), span(2, 17));
    let f1 = t
        .ast
        .add_expr(ExprKind::Literal(LiteralValue::Int(2)), span(2, 20));
    let init = t.ast.add_expr(
        ExprKind::StructInit {
            fields: vec![f0, f1],
        },
        span(2, 16),
    );
    let (_, stmt) = t.let_stmt("p", Some(point_ty), init);
    let module = t.module_with_fn("main", vec![stmt], vec![]);

    t.analyze(module).unwrap();

    assert!(!t.handler.has_errors(), "{:?}", t.handler.diagnostics());
    assert_eq!(t.ast.expr_ty(init), Some(point_ty));
    assert_eq!(t.ast.expr_ty(f0), Some(i32));
    assert_eq!(t.ast.expr_ty(f1), Some(i32));
}

#[test]
fn struct_initializer_missing_required_field_fails() {
    // Point has no defaults; providing one field is an error.
    let mut t = TestModule::new();
    let i32 = t.types.int32();
    let (_point_decl, point_ty) = t.struct_decl("Point", &[("x", i32), ("y", i32)]);

    let f0 = t
        .ast
        .add_expr(ExprKind::Literal(LiteralValue::Int(1)), span(2, 17));
    let init = t
        .ast
        .add_expr(ExprKind::StructInit { fields: vec![f0] }, span(2, 16));
    let (_, stmt) = t.let_stmt("p", Some(point_ty), init);
    let module = t.module_with_fn("main", vec![stmt], vec![]);

    t.analyze(module).unwrap();
    assert!(t.handler.has_errors());
}

#[test]
fn condition_must_convert_to_bool() {
    // if 42 { }  =>  error
    let mut t = TestModule::new();
    let cond = t
        .ast
        .add_expr(ExprKind::Literal(LiteralValue::Int(42)), span(2, 4));
    let then_body = t
        .ast
        .add_stmt(StmtKind::Compound { stmts: vec![] }, span(2, 8));
    let if_stmt = t.ast.add_stmt(
        StmtKind::If {
            cond,
            then_body,
            else_body: None,
        },
        span(2, 1),
    );
    let module = t.module_with_fn("main", vec![if_stmt], vec![]);

    t.analyze(module).unwrap();
    assert!(t.handler.has_errors());
}

#[test]
fn binary_operator_resolves_builtin_overload() {
    // let x = 1 + 2;  =>  Int32 via the builtin + overload
    let mut t = TestModule::new();
    let lhs = t
        .ast
        .add_expr(ExprKind::Literal(LiteralValue::Int(1)), span(2, 9));
    let rhs = t
        .ast
        .add_expr(ExprKind::Literal(LiteralValue::Int(2)), span(2, 13));
    let op = t.ast.ref_named("+", span(2, 11));
    let add = t
        .ast
        .add_expr(ExprKind::Binary { op, lhs, rhs }, span(2, 9));
    let (decl, stmt) = t.let_stmt("x", None, add);
    let module = t.module_with_fn("main", vec![stmt], vec![]);

    t.analyze(module).unwrap();

    assert!(!t.handler.has_errors(), "{:?}", t.handler.diagnostics());
    let i32 = t.types.int32();
    assert_eq!(t.ast.expr_ty(add), Some(i32));
    assert_eq!(t.ast.as_var_let(decl).unwrap().ty, Some(i32));
    let ExprKind::Ref { target, .. } = &t.ast.exprs[op].kind else {
        panic!("operator is not a ref");
    };
    assert!(matches!(target, Some(RefTarget::Function(_))));
}

#[test]
fn occurs_check_rejects_infinite_type() {
    let mut t = TestModule::new();
    let handler = DiagnosticHandler::new();
    let scope = t.scopes.builtins();

    let var = t.types.fresh_type_var();
    let ptr = t.types.raw_pointer(var);

    let mut system =
        ConstraintSystem::new(&mut t.types, &mut t.ast, &t.scopes, scope, &handler);
    let mut state = galec_sema::SystemState::default();
    assert!(!system.unify(var, ptr, &mut state));
    // The same variable against itself is fine.
    assert!(system.unify(var, var, &mut state));
}

#[test]
fn return_type_mismatch_is_reported() {
    // A float literal returned from an Int32 function cannot type check.
    let mut t = TestModule::new();
    let value = t
        .ast
        .add_expr(ExprKind::Literal(LiteralValue::Float(2.5)), span(2, 10));
    let ret = t.ast.add_stmt(
        StmtKind::Return {
            value: Some(value),
        },
        span(2, 3),
    );
    let body = t
        .ast
        .add_stmt(StmtKind::Compound { stmts: vec![ret] }, span(1, 20));
    let i32 = t.types.int32();
    let fn_ty = t.types.function(vec![], i32);
    let function = t.ast.add_decl(
        DeclKind::Function(FunctionDecl {
            name: sym("f"),
            visibility: Visibility::Public,
            ty: fn_ty,
            params: vec![],
            body: Some(body),
        }),
        span(1, 1),
    );
    let module = t.ast.add_decl(
        DeclKind::Module(ModuleDecl {
            name: sym("test"),
            file: galec_util::FileId::DUMMY,
            decls: vec![function],
        }),
        span(1, 1),
    );

    t.analyze(module).unwrap();
    assert!(t.handler.has_errors());
}

#[test]
fn void_function_cannot_return_value() {
    let mut t = TestModule::new();
    let value = t
        .ast
        .add_expr(ExprKind::Literal(LiteralValue::Int(1)), span(2, 10));
    let ret = t.ast.add_stmt(
        StmtKind::Return {
            value: Some(value),
        },
        span(2, 3),
    );
    let module = t.module_with_fn("main", vec![ret], vec![]);

    t.analyze(module).unwrap();

    assert!(t.handler.has_errors());
    let messages: Vec<String> = t
        .handler
        .diagnostics()
        .iter()
        .map(|d| d.message.clone())
        .collect();
    assert!(messages.iter().any(|m| m.contains("void")));
}

#[test]
fn break_outside_loop_is_reported() {
    let mut t = TestModule::new();
    let brk = t.ast.add_stmt(StmtKind::Break, span(2, 3));
    let module = t.module_with_fn("main", vec![brk], vec![]);

    t.analyze(module).unwrap();
    assert!(t.handler.has_errors());
}
