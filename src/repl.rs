//! Line-at-a-time evaluation against retained compiler and VM state.

use std::io::{self, BufRead, Write};

use crate::bytecode::compile::CodeGenerator;
use crate::lang::value::Value;
use crate::pipeline::{self, Error};
use crate::runtime::vm::Vm;

/// State that outlives a single REPL line: the code generator's top-level
/// scope and functions, and the VM's locals.
///
/// Lines are not optimized; dead-store elimination would drop assignments a
/// later line still reads.
pub struct Session {
    codegen: CodeGenerator,
    vm: Vm,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_vm(Vm::new())
    }

    pub fn with_vm(vm: Vm) -> Self {
        Session {
            codegen: CodeGenerator::new(),
            vm,
        }
    }

    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    /// Compiles and runs one chunk. A trailing bare expression yields its
    /// value; anything else yields void.
    ///
    /// A chunk that fails declares nothing: names and functions it
    /// introduced are forgotten even when the failure happens at run time.
    /// Stores it made to existing variables before failing, and anything
    /// it printed, remain.
    pub fn eval(&mut self, source: &str) -> Result<Value, Error> {
        let program = pipeline::parse(source)?;
        let saved = self.codegen.checkpoint();
        let bytecode = self.codegen.generate(&program, true)?;
        self.vm.execute(&bytecode, true).map_err(|err| {
            self.codegen.rollback(saved);
            err.into()
        })
    }
}

/// How a result is echoed: strings quoted, arrays in full, void not at all.
pub fn echo(value: &Value) -> Option<String> {
    match value {
        Value::Void => None,
        other => Some(other.repr()),
    }
}

/// Reads lines until EOF or a line equal to `exit`. Errors are reported to
/// `err` and the loop carries on.
pub fn run_repl<R, W, E>(
    session: &mut Session,
    input: R,
    out: &mut W,
    err: &mut E,
) -> io::Result<()>
where
    R: BufRead,
    W: Write,
    E: Write,
{
    writeln!(out, "cinder REPL v{}", env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "Type 'exit' to quit.")?;

    let mut lines = input.lines();
    loop {
        write!(out, "> ")?;
        out.flush()?;

        let Some(line) = lines.next().transpose()? else {
            break;
        };
        let line = line.trim_end();
        if line == "exit" {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        match session.eval(line) {
            Ok(value) => {
                if let Some(text) = echo(&value) {
                    writeln!(out, "{}", text)?;
                }
            }
            Err(e) => writeln!(err, "{}", e)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::runtime_error::RuntimeError;

    fn session() -> Session {
        Session::with_vm(Vm::new().with_output(Box::new(io::sink())))
    }

    #[test]
    fn test_variables_persist() {
        let mut s = session();
        assert_eq!(s.eval("let x = 5;").unwrap(), Value::Void);
        assert_eq!(s.eval("let y = x * 2;").unwrap(), Value::Void);
        assert_eq!(s.eval("x + y;").unwrap(), Value::Int(15));
    }

    #[test]
    fn test_functions_persist() {
        let mut s = session();
        s.eval("fn double(n) { return n * 2; }").unwrap();
        assert_eq!(s.eval("double(21);").unwrap(), Value::Int(42));
        s.eval("fn triple(n) { return n * 3; }").unwrap();
        assert_eq!(s.eval("double(triple(2));").unwrap(), Value::Int(12));
    }

    #[test]
    fn test_recovers_after_errors() {
        let mut s = session();
        s.eval("let a = [1, 2];").unwrap();
        assert!(matches!(
            s.eval("print(a[5]);"),
            Err(Error::Runtime(RuntimeError::IndexOutOfBounds { .. }))
        ));
        assert!(matches!(s.eval("print(nope);"), Err(Error::Codegen(_))));
        assert!(matches!(s.eval("let = ;"), Err(Error::Parse(_))));
        assert_eq!(s.eval("a[1];").unwrap(), Value::Int(2));
    }

    #[test]
    fn test_runtime_failure_declares_nothing() {
        let mut s = session();
        s.eval("let y = 1;").unwrap();
        assert!(matches!(
            s.eval("let z = 1 / 0;"),
            Err(Error::Runtime(RuntimeError::DivisionByZero))
        ));
        assert!(matches!(s.eval("z;"), Err(Error::Codegen(_))));

        assert!(s.eval("fn f() { return 1; } y = 5; let w = [1][3];").is_err());
        assert!(matches!(s.eval("f();"), Err(Error::Codegen(_))));
        assert_eq!(s.eval("y;").unwrap(), Value::Int(5));
    }

    #[test]
    fn test_print_is_not_echoed() {
        let mut s = session();
        assert_eq!(s.eval("print(3);").unwrap(), Value::Void);
        assert_eq!(s.vm().output(), &[Value::Int(3)]);
    }

    #[test]
    fn test_echo_forms() {
        assert_eq!(echo(&Value::Void), None);
        assert_eq!(echo(&Value::Int(7)).as_deref(), Some("7"));
        assert_eq!(echo(&Value::Str("hi".into())).as_deref(), Some("\"hi\""));
        assert_eq!(
            echo(&Value::array(vec![Value::Int(1), Value::Str("a".into())])).as_deref(),
            Some("[1, a]")
        );
    }

    #[test]
    fn test_repl_loop() {
        let mut s = session();
        let input = "let x = 40;\n\nx + 2;\nprint(1 / 0);\n\"s\";\nexit\nx;\n";
        let mut out = Vec::new();
        let mut err = Vec::new();
        run_repl(&mut s, input.as_bytes(), &mut out, &mut err).unwrap();

        let out = String::from_utf8(out).unwrap();
        let err = String::from_utf8(err).unwrap();
        assert!(out.contains("> 42\n"));
        assert!(out.contains("> \"s\"\n"));
        assert_eq!(err, "Runtime error: division by zero\n");
    }
}
