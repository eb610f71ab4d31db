//! `unreachable-checker`: after dead-code elimination, any `unreachable`
//! instruction left in a reachable block means the function can fall off
//! the end without returning.

use galec_ast::Ast;
use galec_util::{DiagnosticHandler, Span};

use crate::gil::{GilModule, InstKind};
use crate::passes::dce::reachable_blocks;

pub fn run(module: &mut GilModule, ast: &Ast, handler: &DiagnosticHandler) {
    for function in module.functions.iter() {
        if function.is_declaration() {
            continue;
        }
        let reachable = reachable_blocks(function);
        for &block in &function.block_order {
            if !reachable.contains(&block) {
                continue;
            }
            let has_unreachable = function.blocks[block]
                .insts
                .iter()
                .any(|&inst| matches!(function.insts[inst].kind, InstKind::Unreachable));
            if !has_unreachable {
                continue;
            }
            let span = function
                .decl
                .map(|decl| ast.decls[decl].span)
                .unwrap_or(Span::DUMMY);
            handler.error(
                span,
                format!(
                    "function '{}' does not end with a return statement",
                    function.name
                ),
            );
        }
    }
}
