/// Errors raised while lowering the syntax tree to bytecode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodegenError {
    #[error("Codegen error: Undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("Codegen error: Undefined function: {0}")]
    UndefinedFunction(String),

    #[error("Codegen error: Function '{name}' expects {expected} arguments but got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Codegen error: Function '{0}' is declared more than once")]
    DuplicateFunction(String),

    #[error("Codegen error: Break statement outside of loop")]
    BreakOutsideLoop,

    #[error("Codegen error: Continue statement outside of loop")]
    ContinueOutsideLoop,

    /// A table or operand outgrew its 16-bit encoding.
    #[error("Codegen error: too many {0} (limit is 65536)")]
    Limit(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_has_stage_prefix() {
        let err = CodegenError::UndefinedVariable("x".into());
        assert_eq!(err.to_string(), "Codegen error: Undefined variable: x");
        assert!(
            CodegenError::BreakOutsideLoop
                .to_string()
                .contains("outside of loop")
        );
    }

    #[test]
    fn test_arity_mismatch_display() {
        let err = CodegenError::ArityMismatch {
            name: "f".into(),
            expected: 2,
            found: 1,
        };
        assert!(err.to_string().contains("expects 2 arguments but got 1"));
    }
}
