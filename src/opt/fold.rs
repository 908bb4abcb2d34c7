//! Constant folding over integer literals.
//!
//! Results follow the VM's arithmetic exactly: 32-bit wrapping, comparisons
//! yield `1`/`0`, `&&` multiplies and `||` adds. Division and modulo by a
//! literal zero are left in place so the fault still happens at run time.

use crate::lang::ast::{BinaryOp, Expr, UnaryOp};
use crate::lang::visit::{VisitorMut, walk_expr_mut};

#[derive(Default)]
pub(crate) struct ConstantFolder {
    pub folded: usize,
}

impl VisitorMut for ConstantFolder {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        // Children first so nested constants collapse bottom-up.
        walk_expr_mut(self, expr);

        let folded = match expr {
            Expr::Binary { op, left, right } => match (left.as_ref(), right.as_ref()) {
                (Expr::Number(a), Expr::Number(b)) => fold_binary(*op, *a, *b),
                _ => None,
            },
            Expr::Unary { op, operand } => match operand.as_ref() {
                Expr::Number(a) => Some(fold_unary(*op, *a)),
                _ => None,
            },
            _ => None,
        };

        if let Some(value) = folded {
            log::trace!("folded {} => {}", expr, value);
            *expr = Expr::Number(value);
            self.folded += 1;
        }
    }
}

pub(crate) fn fold_binary(op: BinaryOp, a: i32, b: i32) -> Option<i32> {
    let value = match op {
        BinaryOp::Add | BinaryOp::Or => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul | BinaryOp::And => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return None;
            }
            a.wrapping_div(b)
        }
        BinaryOp::Mod => {
            if b == 0 {
                return None;
            }
            a.wrapping_rem(b)
        }
        BinaryOp::Eq => (a == b) as i32,
        BinaryOp::NotEq => (a != b) as i32,
        BinaryOp::Lt => (a < b) as i32,
        BinaryOp::LtEq => (a <= b) as i32,
        BinaryOp::Gt => (a > b) as i32,
        BinaryOp::GtEq => (a >= b) as i32,
    };
    Some(value)
}

pub(crate) fn fold_unary(op: UnaryOp, a: i32) -> i32 {
    match op {
        UnaryOp::Neg => 0i32.wrapping_sub(a),
        UnaryOp::Not => (a == 0) as i32,
    }
}
