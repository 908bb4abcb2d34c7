/// Faults raised while executing bytecode. Any of these aborts the current
/// `execute` call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// Operand stack, call-frame stack or locals array outgrew its limit.
    #[error("Runtime error: stack overflow ({0} limit exceeded)")]
    StackOverflow(&'static str),

    #[error("Runtime error: stack underflow")]
    StackUnderflow,

    #[error("Runtime error: division by zero")]
    DivisionByZero,

    #[error("Runtime error: modulo by zero")]
    ModuloByZero,

    #[error("Runtime error: index out of bounds (index {index}, length {len})")]
    IndexOutOfBounds { index: i32, len: usize },

    #[error("Runtime error: type mismatch: {op} cannot take {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("Runtime error: cannot index into {0}")]
    NotAnArray(&'static str),

    #[error("Runtime error: array index must be int, got {0}")]
    NonIntegerIndex(&'static str),

    #[error("Runtime error: invalid constant index {0}")]
    InvalidConstant(usize),

    #[error("Runtime error: invalid local slot {0}")]
    InvalidLocal(usize),

    #[error("Runtime error: invalid function index {0}")]
    InvalidFunction(usize),

    /// The program failed the pre-execution bytecode check.
    #[error("Runtime error: invalid bytecode: {0}")]
    InvalidBytecode(String),

    /// The print sink refused a write.
    #[error("Runtime error: output failed: {0}")]
    Output(String),
}
