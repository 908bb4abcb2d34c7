//! Tree-level optimizer.
//!
//! Passes always run as fold, dead code, inline, fold: the second fold picks
//! up constant arguments substituted by inlining.

mod dce;
mod fold;
mod inline;

pub use inline::{MAX_INLINE_NODES, MAX_INLINE_PARAMS};

use serde::Serialize;

use crate::lang::ast::Program;
use crate::lang::visit::VisitorMut;

/// Counters accumulated across passes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OptStats {
    pub constants_folded: usize,
    pub dead_code_removed: usize,
    /// Functions eligible for inlining.
    pub inline_candidates: usize,
    /// Call sites actually replaced by a function body.
    pub calls_inlined: usize,
}

#[derive(Debug, Default)]
pub struct Optimizer {
    stats: OptStats,
}

impl Optimizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every pass over the program, rewriting it in place.
    pub fn run(&mut self, program: &mut Program) {
        self.run_constant_folding(program);
        self.run_dead_code_elimination(program);
        self.run_function_inlining(program);
        self.run_constant_folding(program);
        log::debug!("optimizer: {:?}", self.stats);
    }

    pub fn run_constant_folding(&mut self, program: &mut Program) {
        let mut folder = fold::ConstantFolder::default();
        folder.visit_program_mut(program);
        self.stats.constants_folded += folder.folded;
    }

    pub fn run_dead_code_elimination(&mut self, program: &mut Program) {
        self.stats.dead_code_removed += dce::eliminate(program);
    }

    pub fn run_function_inlining(&mut self, program: &mut Program) {
        let outcome = inline::inline_functions(program);
        self.stats.inline_candidates += outcome.candidates;
        self.stats.calls_inlined += outcome.inlined;
    }

    pub fn stats(&self) -> &OptStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = OptStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;
    use crate::lang::ast::{Expr, Item, Stmt};

    fn optimize(source: &str) -> (Program, OptStats) {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let mut program = Parser::new(tokens).parse_program().unwrap();
        let mut optimizer = Optimizer::new();
        optimizer.run(&mut program);
        (program, *optimizer.stats())
    }

    #[test]
    fn test_inlined_constants_fold_on_second_pass() {
        let (program, stats) = optimize("fn sq(x) { return x * x; } print(sq(3));");
        assert_eq!(
            program.items[1],
            Item::Stmt(Stmt::Print(Expr::Number(9)))
        );
        assert_eq!(stats.calls_inlined, 1);
        assert_eq!(stats.inline_candidates, 1);
        assert_eq!(stats.constants_folded, 1);
    }

    #[test]
    fn test_all_counters() {
        let (_, stats) = optimize(
            "fn f(a) { return a + 1; print(0); } let dead = 2 * 3; print(f(4));",
        );
        // 2 * 3, then 4 + 1 after inlining
        assert_eq!(stats.constants_folded, 2);
        // print(0) after return, and the unused `dead`
        assert_eq!(stats.dead_code_removed, 2);
        assert_eq!(stats.inline_candidates, 1);
        assert_eq!(stats.calls_inlined, 1);
    }

    #[test]
    fn test_reset_stats() {
        let tokens = Lexer::new("print(1 + 1);").tokenize().unwrap();
        let mut program = Parser::new(tokens).parse_program().unwrap();
        let mut optimizer = Optimizer::new();
        optimizer.run(&mut program);
        assert_eq!(optimizer.stats().constants_folded, 1);
        optimizer.reset_stats();
        assert_eq!(*optimizer.stats(), OptStats::default());
    }

    #[test]
    fn test_stats_serialize() {
        let stats = OptStats {
            constants_folded: 3,
            ..OptStats::default()
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"constants_folded\":3"));
    }
}
