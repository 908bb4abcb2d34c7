//! Dead-code elimination.
//!
//! Two rewrites, both excising statements from the tree:
//! - statements following `return`, `break` or `continue` in the same
//!   statement list are unreachable;
//! - assignments to a name that is never read, and expression statements,
//!   are dropped when evaluating them can neither fail nor print.
//!
//! Liveness is flow-insensitive and computed per unit: each function body,
//! and the top-level statements. Units cannot see each other's variables.

use rustc_hash::FxHashSet;

use crate::lang::ast::{Expr, FunctionDecl, Item, Program, Stmt};
use crate::lang::visit::{Visitor, VisitorMut, walk_block_mut, walk_expr};

pub(crate) fn eliminate(program: &mut Program) -> usize {
    let mut removed = 0;

    for item in &mut program.items {
        if let Item::Function(func) = item {
            removed += eliminate_in_function(func);
        }
    }
    removed += eliminate_top_level(program);

    removed
}

fn eliminate_in_function(func: &mut FunctionDecl) -> usize {
    let mut removed = 0;
    loop {
        let mut pass = DeadStores {
            read: read_names(&func.body),
            bound: func.params.iter().cloned().collect(),
            removed: 0,
        };
        pass.visit_block_mut(&mut func.body);
        if pass.removed == 0 {
            return removed;
        }
        removed += pass.removed;
    }
}

/// Top-level statements are interleaved with function items, so they are
/// filtered in place rather than treated as one block.
fn eliminate_top_level(program: &mut Program) -> usize {
    let mut removed = 0;

    // Anything after a top-level diverging statement never runs.
    if let Some(cut) = program
        .items
        .iter()
        .position(|item| matches!(item, Item::Stmt(s) if s.diverges()))
    {
        let before = program.items.len();
        let mut index = 0;
        program.items.retain(|item| {
            let keep = index <= cut || matches!(item, Item::Function(_));
            index += 1;
            keep
        });
        removed += before - program.items.len();
    }

    loop {
        let top: Vec<Stmt> = program.statements().cloned().collect();
        let mut pass = DeadStores {
            read: read_names(&top),
            bound: FxHashSet::default(),
            removed: 0,
        };

        // A name is known to be declared once an earlier top-level
        // assignment has been compiled.
        let mut dropped = 0;
        for item in std::mem::take(&mut program.items) {
            match item {
                Item::Stmt(mut stmt) => {
                    let dead = pass.is_dead(&stmt);
                    if !dead {
                        pass.visit_stmt_mut(&mut stmt);
                    }
                    if let Stmt::Assign { name, .. } = &stmt {
                        pass.bound.insert(name.clone());
                    }
                    if dead {
                        dropped += 1;
                    } else {
                        program.items.push(Item::Stmt(stmt));
                    }
                }
                function => program.items.push(function),
            }
        }

        let total = dropped + pass.removed;
        if total == 0 {
            return removed;
        }
        removed += total;
    }
}

/// Every identifier read anywhere in the statements.
fn read_names(block: &[Stmt]) -> FxHashSet<String> {
    struct Reads(FxHashSet<String>);

    impl Visitor for Reads {
        fn visit_expr(&mut self, expr: &Expr) {
            if let Expr::Ident(name) = expr {
                self.0.insert(name.clone());
            }
            walk_expr(self, expr);
        }
    }

    let mut reads = Reads(FxHashSet::default());
    for stmt in block {
        reads.visit_stmt(stmt);
    }
    reads.0
}

struct DeadStores {
    read: FxHashSet<String>,
    /// Names certainly declared wherever this pass looks.
    bound: FxHashSet<String>,
    removed: usize,
}

impl DeadStores {
    /// Only statements that cannot fail are dropped, so removing them never
    /// hides an error the unoptimized program would raise.
    fn is_dead(&self, stmt: &Stmt) -> bool {
        let infallible = |value: &Expr| {
            value
                .infallible_shape(&|name: &str| self.bound.contains(name))
                .is_some()
        };
        match stmt {
            Stmt::Assign { name, value } => !self.read.contains(name) && infallible(value),
            Stmt::Expr(value) => infallible(value),
            _ => false,
        }
    }
}

impl VisitorMut for DeadStores {
    fn visit_block_mut(&mut self, block: &mut Vec<Stmt>) {
        if let Some(cut) = block.iter().position(Stmt::diverges) {
            self.removed += block.len() - (cut + 1);
            block.truncate(cut + 1);
        }

        let before = block.len();
        block.retain(|stmt| !self.is_dead(stmt));
        self.removed += before - block.len();

        walk_block_mut(self, block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;

    fn eliminate_src(source: &str) -> (Program, usize) {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let mut program = Parser::new(tokens).parse_program().unwrap();
        let removed = eliminate(&mut program);
        (program, removed)
    }

    fn function_body(program: &Program) -> &[Stmt] {
        &program.functions().next().unwrap().body
    }

    #[test]
    fn test_code_after_return_removed() {
        let (program, removed) =
            eliminate_src("fn f(x) { return x; print(1); print(2); }");
        assert_eq!(removed, 2);
        assert_eq!(function_body(&program).len(), 1);
    }

    #[test]
    fn test_code_after_break_in_loop_removed() {
        let (program, removed) =
            eliminate_src("while (1) { print(1); break; print(2); }");
        assert_eq!(removed, 1);
        let Item::Stmt(Stmt::While { body, .. }) = &program.items[0] else {
            panic!("expected while");
        };
        assert_eq!(body.len(), 2);
    }

    #[test]
    fn test_unused_pure_assignment_removed() {
        let (program, removed) = eliminate_src("let unused = 1 + 2; let x = 3; print(x);");
        assert_eq!(removed, 1);
        assert_eq!(program.items.len(), 2);
    }

    #[test]
    fn test_dead_chain_removed_to_fixpoint() {
        let (program, removed) = eliminate_src("let a = 1; let b = a; print(7);");
        assert_eq!(removed, 2);
        assert_eq!(program.items.len(), 1);
    }

    #[test]
    fn test_fallible_stores_kept() {
        // Type mismatches, undeclared names and names declared later all
        // fail at run or compile time.
        let (program, removed) = eliminate_src(
            "let s = \"a\" - 1; let u = nope; let e = later; let later = 1; print(2);",
        );
        assert_eq!(removed, 0);
        assert_eq!(program.items.len(), 5);
    }

    #[test]
    fn test_params_count_as_declared() {
        let (program, removed) =
            eliminate_src("fn f(a) { let copy = a; a == \"x\"; let sum = a + 1; return 0; }");
        assert_eq!(removed, 2);
        // `a + 1` fails when `a` is not an int.
        assert_eq!(function_body(&program).len(), 2);
    }

    #[test]
    fn test_impure_assignment_kept() {
        let (program, removed) =
            eliminate_src("fn f() { print(1); return 1; } let unused = f(); let z = 1 / 0;");
        assert_eq!(removed, 0);
        assert_eq!(program.items.len(), 3);
    }

    #[test]
    fn test_read_variable_kept_in_nested_block() {
        let (_, removed) =
            eliminate_src("let i = 0; while (i < 3) { let t = i; i = t + 1; }");
        assert_eq!(removed, 0);
    }

    #[test]
    fn test_top_level_return_cuts_statements_but_keeps_functions() {
        let (program, removed) = eliminate_src("print(1); return; print(2); fn g() { }");
        assert_eq!(removed, 1);
        assert_eq!(program.items.len(), 3);
        assert_eq!(program.functions().count(), 1);
    }

    #[test]
    fn test_function_units_are_independent() {
        // `x` is read in main but the store inside `f` is to f's own local.
        let (program, removed) = eliminate_src("fn f() { let x = 5; return 0; } let x = 1; print(x);");
        assert_eq!(removed, 1);
        assert_eq!(function_body(&program).len(), 1);
    }
}
