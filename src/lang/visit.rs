//! Tree traversal for analysis and rewrite passes.
//!
//! A pass implements [`Visitor`] (read-only) or [`VisitorMut`] (in-place
//! rewrite) and overrides only the hooks it cares about. Every default hook
//! recurses through the matching `walk_*` function, so overriding a hook and
//! calling `walk_*` from it keeps the traversal going. The walkers match
//! exhaustively, so a new node variant must be handled here before any pass
//! compiles again.

use super::ast::{Expr, FunctionDecl, Item, Program, Stmt};

pub trait Visitor {
    fn visit_program(&mut self, program: &Program) {
        walk_program(self, program);
    }

    fn visit_function(&mut self, func: &FunctionDecl) {
        walk_block(self, &func.body);
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }
}

pub fn walk_program<V: Visitor + ?Sized>(v: &mut V, program: &Program) {
    for item in &program.items {
        match item {
            Item::Function(func) => v.visit_function(func),
            Item::Stmt(stmt) => v.visit_stmt(stmt),
        }
    }
}

pub fn walk_block<V: Visitor + ?Sized>(v: &mut V, block: &[Stmt]) {
    for stmt in block {
        v.visit_stmt(stmt);
    }
}

pub fn walk_stmt<V: Visitor + ?Sized>(v: &mut V, stmt: &Stmt) {
    match stmt {
        Stmt::Assign { value, .. } => v.visit_expr(value),
        Stmt::ArrayAssign {
            array,
            index,
            value,
        } => {
            v.visit_expr(array);
            v.visit_expr(index);
            v.visit_expr(value);
        }
        Stmt::Print(expr) | Stmt::Expr(expr) => v.visit_expr(expr),
        Stmt::If { cond, body } | Stmt::While { cond, body } => {
            v.visit_expr(cond);
            walk_block(v, body);
        }
        Stmt::For {
            init,
            cond,
            step,
            body,
        } => {
            if let Some(init) = init {
                v.visit_stmt(init);
            }
            if let Some(cond) = cond {
                v.visit_expr(cond);
            }
            if let Some(step) = step {
                v.visit_stmt(step);
            }
            walk_block(v, body);
        }
        Stmt::Return(value) => {
            if let Some(value) = value {
                v.visit_expr(value);
            }
        }
        Stmt::Block(body) => walk_block(v, body),
        Stmt::Break | Stmt::Continue => {}
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(v: &mut V, expr: &Expr) {
    match expr {
        Expr::Number(_) | Expr::Str(_) | Expr::Ident(_) => {}
        Expr::Binary { left, right, .. } => {
            v.visit_expr(left);
            v.visit_expr(right);
        }
        Expr::Unary { operand, .. } => v.visit_expr(operand),
        Expr::Call { args, .. } => {
            for arg in args {
                v.visit_expr(arg);
            }
        }
        Expr::Array(items) => {
            for item in items {
                v.visit_expr(item);
            }
        }
        Expr::Index { array, index } => {
            v.visit_expr(array);
            v.visit_expr(index);
        }
    }
}

pub trait VisitorMut {
    fn visit_program_mut(&mut self, program: &mut Program) {
        walk_program_mut(self, program);
    }

    fn visit_function_mut(&mut self, func: &mut FunctionDecl) {
        self.visit_block_mut(&mut func.body);
    }

    /// Called for every statement list: function bodies, loop and `if`
    /// bodies, bare blocks. Top-level statements are not a block.
    fn visit_block_mut(&mut self, block: &mut Vec<Stmt>) {
        walk_block_mut(self, block);
    }

    fn visit_stmt_mut(&mut self, stmt: &mut Stmt) {
        walk_stmt_mut(self, stmt);
    }

    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        walk_expr_mut(self, expr);
    }
}

pub fn walk_program_mut<V: VisitorMut + ?Sized>(v: &mut V, program: &mut Program) {
    for item in &mut program.items {
        match item {
            Item::Function(func) => v.visit_function_mut(func),
            Item::Stmt(stmt) => v.visit_stmt_mut(stmt),
        }
    }
}

pub fn walk_block_mut<V: VisitorMut + ?Sized>(v: &mut V, block: &mut Vec<Stmt>) {
    for stmt in block.iter_mut() {
        v.visit_stmt_mut(stmt);
    }
}

pub fn walk_stmt_mut<V: VisitorMut + ?Sized>(v: &mut V, stmt: &mut Stmt) {
    match stmt {
        Stmt::Assign { value, .. } => v.visit_expr_mut(value),
        Stmt::ArrayAssign {
            array,
            index,
            value,
        } => {
            v.visit_expr_mut(array);
            v.visit_expr_mut(index);
            v.visit_expr_mut(value);
        }
        Stmt::Print(expr) | Stmt::Expr(expr) => v.visit_expr_mut(expr),
        Stmt::If { cond, body } | Stmt::While { cond, body } => {
            v.visit_expr_mut(cond);
            v.visit_block_mut(body);
        }
        Stmt::For {
            init,
            cond,
            step,
            body,
        } => {
            if let Some(init) = init {
                v.visit_stmt_mut(init);
            }
            if let Some(cond) = cond {
                v.visit_expr_mut(cond);
            }
            if let Some(step) = step {
                v.visit_stmt_mut(step);
            }
            v.visit_block_mut(body);
        }
        Stmt::Return(value) => {
            if let Some(value) = value {
                v.visit_expr_mut(value);
            }
        }
        Stmt::Block(body) => v.visit_block_mut(body),
        Stmt::Break | Stmt::Continue => {}
    }
}

pub fn walk_expr_mut<V: VisitorMut + ?Sized>(v: &mut V, expr: &mut Expr) {
    match expr {
        Expr::Number(_) | Expr::Str(_) | Expr::Ident(_) => {}
        Expr::Binary { left, right, .. } => {
            v.visit_expr_mut(left);
            v.visit_expr_mut(right);
        }
        Expr::Unary { operand, .. } => v.visit_expr_mut(operand),
        Expr::Call { args, .. } => {
            for arg in args {
                v.visit_expr_mut(arg);
            }
        }
        Expr::Array(items) => {
            for item in items {
                v.visit_expr_mut(item);
            }
        }
        Expr::Index { array, index } => {
            v.visit_expr_mut(array);
            v.visit_expr_mut(index);
        }
    }
}

/// Counts every statement and expression node under a function body.
pub fn node_count(func: &FunctionDecl) -> usize {
    struct Counter(usize);

    impl Visitor for Counter {
        fn visit_stmt(&mut self, stmt: &Stmt) {
            self.0 += 1;
            walk_stmt(self, stmt);
        }

        fn visit_expr(&mut self, expr: &Expr) {
            self.0 += 1;
            walk_expr(self, expr);
        }
    }

    let mut counter = Counter(0);
    counter.visit_function(func);
    counter.0
}
