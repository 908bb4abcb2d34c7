//! Syntax tree produced by the parser and consumed by the optimizer and
//! the code generator.
//!
//! The tree is strictly owned: every node owns its children and nothing is
//! shared. Passes either inspect it through [`crate::lang::visit`] or match
//! on the enums directly; the optimizer rewrites by replacing whole subtrees.

use std::fmt;

/// Binary operators, grouped by precedence level in the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// Logical `&&`. Both operands are always evaluated.
    And,
    /// Logical `||`. Both operands are always evaluated.
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(i32),
    Str(String),
    Ident(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    Array(Vec<Expr>),
    /// `array[index]`, chainable for nested arrays.
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },
}

impl Expr {
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn index(array: Expr, index: Expr) -> Expr {
        Expr::Index {
            array: Box::new(array),
            index: Box::new(index),
        }
    }

    /// Static shape of the expression's value when evaluating it can
    /// neither fail nor have side effects, `None` otherwise.
    ///
    /// `bound` says which identifiers are certainly declared at this point;
    /// their values are of unknown shape. Calls, indexing, division and any
    /// operator whose operands are not statically of the right type are
    /// treated as fallible.
    pub fn infallible_shape<F>(&self, bound: &F) -> Option<Shape>
    where
        F: Fn(&str) -> bool,
    {
        match self {
            Expr::Number(_) => Some(Shape::Int),
            Expr::Str(_) => Some(Shape::Str),
            Expr::Ident(name) => bound(name.as_str()).then_some(Shape::Any),
            Expr::Unary { op, operand } => {
                let inner = operand.infallible_shape(bound)?;
                match op {
                    UnaryOp::Neg => (inner == Shape::Int).then_some(Shape::Int),
                    // Lowered to `== 0`, which accepts any value.
                    UnaryOp::Not => Some(Shape::Int),
                }
            }
            Expr::Binary { op, left, right } => {
                let l = left.infallible_shape(bound)?;
                let r = right.infallible_shape(bound)?;
                match op {
                    BinaryOp::Div | BinaryOp::Mod => None,
                    BinaryOp::Eq | BinaryOp::NotEq => Some(Shape::Int),
                    BinaryOp::Add if l == Shape::Str && r == Shape::Str => Some(Shape::Str),
                    _ => (l == Shape::Int && r == Shape::Int).then_some(Shape::Int),
                }
            }
            Expr::Array(items) => {
                for item in items {
                    item.infallible_shape(bound)?;
                }
                Some(Shape::Array)
            }
            Expr::Call { .. } | Expr::Index { .. } => None,
        }
    }

    /// Cannot fail and reads no variables.
    pub fn is_pure(&self) -> bool {
        self.infallible_shape(&|_: &str| false).is_some()
    }
}

/// What is statically known about a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Int,
    Str,
    Array,
    /// A variable's value: any type.
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `let name = value;` or `name = value;`
    Assign { name: String, value: Expr },
    /// `array[index] = value;`
    ArrayAssign {
        array: Expr,
        index: Expr,
        value: Expr,
    },
    Print(Expr),
    /// Expression evaluated for its effect; the value is discarded.
    Expr(Expr),
    If { cond: Expr, body: Vec<Stmt> },
    While { cond: Expr, body: Vec<Stmt> },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Box<Stmt>>,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Block(Vec<Stmt>),
}

impl Stmt {
    /// Statements after which nothing in the same block can run.
    pub fn diverges(&self) -> bool {
        matches!(self, Stmt::Return(_) | Stmt::Break | Stmt::Continue)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Function(FunctionDecl),
    Stmt(Stmt),
}

/// A parsed source unit. Items keep their source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub items: Vec<Item>,
}

impl Program {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(f) => Some(f),
            Item::Stmt(_) => None,
        })
    }

    pub fn statements(&self) -> impl Iterator<Item = &Stmt> {
        self.items.iter().filter_map(|item| match item {
            Item::Stmt(s) => Some(s),
            Item::Function(_) => None,
        })
    }
}

impl fmt::Display for Expr {
    /// Renders the expression in surface syntax, fully parenthesized.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Str(s) => write!(f, "{:?}", s),
            Expr::Ident(name) => write!(f, "{}", name),
            Expr::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expr::Unary { op, operand } => write!(f, "{}{}", op.symbol(), operand),
            Expr::Call { callee, args } => {
                write!(f, "{}(", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Expr::Index { array, index } => write!(f, "{}[{}]", array, index),
        }
    }
}
