use crate::bytecode::ir::BytecodeProgram;
use crate::bytecode::op::{Instruction, Opcode};
use crate::bytecode::verify::check_program;
use crate::lang::value::Value;
use crate::runtime::profiler::Profiler;
use crate::runtime::runtime_error::RuntimeError;
use std::io::{self, Write};

#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Operand stack capacity.
    pub max_stack_size: usize,
    pub max_call_depth: usize,
    /// Upper bound on the locals array across all live frames.
    pub max_locals: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_stack_size: 1024,
            max_call_depth: 1000,
            max_locals: 65_536,
        }
    }
}

/// Saved caller state for one active call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFrame {
    pub return_ip: usize,
    pub caller_bp: usize,
    pub func_index: usize,
}

pub struct Vm {
    config: VmConfig,
    stack: Vec<Value>,
    locals: Vec<Value>,
    frames: Vec<CallFrame>,
    bp: usize,
    printed: Vec<Value>,
    sink: Box<dyn Write>,
    profiler: Option<Profiler>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            config,
            stack: Vec::new(),
            locals: Vec::new(),
            frames: Vec::new(),
            bp: 0,
            printed: Vec::new(),
            sink: Box::new(io::stdout()),
            profiler: None,
        }
    }

    /// Redirects `print` output. Defaults to stdout.
    pub fn with_output(mut self, sink: Box<dyn Write>) -> Self {
        self.sink = sink;
        self
    }

    /// Values printed during the most recent `execute`, in order.
    pub fn output(&self) -> &[Value] {
        &self.printed
    }

    pub fn enable_profiling(&mut self) {
        self.profiler = Some(Profiler::new());
    }

    pub fn profiler(&self) -> Option<&Profiler> {
        self.profiler.as_ref()
    }

    pub fn take_profiler(&mut self) -> Option<Profiler> {
        self.profiler.take()
    }

    /// Runs `program` from its main entry.
    ///
    /// With `keep_state` the locals of earlier runs survive (REPL chunks);
    /// otherwise every table is reset first. The operand stack and call
    /// frames are always cleared. Returns the value of the outermost
    /// `RETURN`, or the top of the stack (or void) when execution runs off
    /// the end of the code.
    pub fn execute(
        &mut self,
        program: &BytecodeProgram,
        keep_state: bool,
    ) -> Result<Value, RuntimeError> {
        check_program(program).map_err(|e| RuntimeError::InvalidBytecode(e.to_string()))?;

        self.stack.clear();
        self.frames.clear();
        self.printed.clear();
        self.bp = 0;
        if !keep_state {
            self.locals.clear();
        }
        self.reserve_locals(program.main_locals)?;

        if let Some(profiler) = &mut self.profiler {
            profiler.start();
        }
        let result = self.run(program);
        if let Some(profiler) = &mut self.profiler {
            profiler.stop();
        }
        // Leave the sink consistent even when the run failed.
        let flushed = self.sink.flush();

        let value = result?;
        flushed.map_err(|e| RuntimeError::Output(e.to_string()))?;
        Ok(value)
    }

    fn run(&mut self, program: &BytecodeProgram) -> Result<Value, RuntimeError> {
        let mut ip = program.main_entry;

        loop {
            let Some(&Instruction { opcode, operand }) = program.code.get(ip) else {
                return Ok(self.stack.pop().unwrap_or_default());
            };
            ip += 1;

            if let Some(profiler) = &mut self.profiler {
                profiler.record(opcode);
            }

            let operand = operand as usize;
            match opcode {
                Opcode::Const => {
                    let value = program
                        .constants
                        .get(operand)
                        .cloned()
                        .ok_or(RuntimeError::InvalidConstant(operand))?;
                    self.push(value)?;
                }
                Opcode::Load => {
                    let slot = self.bp + operand;
                    let value = self
                        .locals
                        .get(slot)
                        .cloned()
                        .ok_or(RuntimeError::InvalidLocal(slot))?;
                    self.push(value)?;
                }
                Opcode::Store => {
                    let value = self.pop()?;
                    let slot = self.bp + operand;
                    let target = self
                        .locals
                        .get_mut(slot)
                        .ok_or(RuntimeError::InvalidLocal(slot))?;
                    *target = value;
                }

                Opcode::Add => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let result = match (a, b) {
                        (Value::Int(x), Value::Int(y)) => Value::Int(x.wrapping_add(y)),
                        (Value::Str(x), Value::Str(y)) => Value::Str(x + &y),
                        (a, b) => return Err(mismatch(opcode, &a, &b)),
                    };
                    self.push(result)?;
                }
                Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => {
                    let (x, y) = self.pop_ints(opcode)?;
                    let result = match opcode {
                        Opcode::Sub => x.wrapping_sub(y),
                        Opcode::Mul => x.wrapping_mul(y),
                        Opcode::Div if y == 0 => return Err(RuntimeError::DivisionByZero),
                        Opcode::Div => x.wrapping_div(y),
                        Opcode::Mod if y == 0 => return Err(RuntimeError::ModuloByZero),
                        _ => x.wrapping_rem(y),
                    };
                    self.push(Value::Int(result))?;
                }

                Opcode::Eq | Opcode::Neq => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let equal = a == b;
                    let truth = if opcode == Opcode::Eq { equal } else { !equal };
                    self.push(Value::Int(truth as i32))?;
                }
                Opcode::Lt | Opcode::Lte | Opcode::Gt | Opcode::Gte => {
                    let (x, y) = self.pop_ints(opcode)?;
                    let truth = match opcode {
                        Opcode::Lt => x < y,
                        Opcode::Lte => x <= y,
                        Opcode::Gt => x > y,
                        _ => x >= y,
                    };
                    self.push(Value::Int(truth as i32))?;
                }

                Opcode::Jump => ip = operand,
                Opcode::JumpIfZero => {
                    if self.pop()? == Value::Int(0) {
                        ip = operand;
                    }
                }
                Opcode::Call => {
                    ip = self.call(program, operand, ip)?;
                }
                Opcode::Return => {
                    let value = self.pop()?;
                    match self.frames.pop() {
                        None => return Ok(value),
                        Some(frame) => {
                            log::trace!("return from fn #{} -> {}", frame.func_index, frame.return_ip);
                            ip = frame.return_ip;
                            self.bp = frame.caller_bp;
                            self.push(value)?;
                        }
                    }
                }

                Opcode::Print => {
                    let value = self.pop()?;
                    writeln!(self.sink, "{}", value)
                        .map_err(|e| RuntimeError::Output(e.to_string()))?;
                    self.printed.push(value);
                }
                Opcode::Pop => {
                    self.pop()?;
                }

                Opcode::BuildArray => {
                    let items = self.pop_n(operand)?;
                    self.push(Value::array(items))?;
                }
                Opcode::ArrayLoad => {
                    let index = self.pop()?;
                    let array = self.pop()?;
                    let (items, i) = array_slot(&array, &index)?;
                    let value = items.borrow()[i].clone();
                    self.push(value)?;
                }
                Opcode::ArrayStore => {
                    let value = self.pop()?;
                    let index = self.pop()?;
                    let array = self.pop()?;
                    let (items, i) = array_slot(&array, &index)?;
                    items.borrow_mut()[i] = value;
                }
            }
        }
    }

    /// Sets up a frame for `functions[index]` and returns its entry point.
    fn call(
        &mut self,
        program: &BytecodeProgram,
        index: usize,
        return_ip: usize,
    ) -> Result<usize, RuntimeError> {
        let func = program
            .functions
            .get(index)
            .ok_or(RuntimeError::InvalidFunction(index))?;

        if self.frames.len() >= self.config.max_call_depth {
            return Err(RuntimeError::StackOverflow("call depth"));
        }

        let args = self.pop_n(func.arity)?;

        // The callee's frame starts just past the caller's.
        let caller_extent = match self.frames.last() {
            Some(frame) => frame_size(program, frame.func_index),
            None => program.main_locals,
        };
        let new_bp = self.bp + caller_extent;
        let extent = func.local_count.max(func.arity);
        self.reserve_locals(new_bp + extent)?;

        let frame_locals = &mut self.locals[new_bp..new_bp + extent];
        frame_locals.fill(Value::Void);
        for (slot, arg) in frame_locals.iter_mut().zip(args) {
            *slot = arg;
        }

        self.frames.push(CallFrame {
            return_ip,
            caller_bp: self.bp,
            func_index: index,
        });
        self.bp = new_bp;
        log::trace!("call {} (depth {}, bp {})", func.name, self.frames.len(), new_bp);
        Ok(func.entry)
    }

    fn reserve_locals(&mut self, len: usize) -> Result<(), RuntimeError> {
        if len > self.config.max_locals {
            return Err(RuntimeError::StackOverflow("locals"));
        }
        if self.locals.len() < len {
            self.locals.resize(len, Value::Void);
        }
        Ok(())
    }

    // Stack helpers

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.config.max_stack_size {
            return Err(RuntimeError::StackOverflow("operand stack"));
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    /// Pops `n` values, returned in push order.
    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, RuntimeError> {
        let len = self.stack.len();
        if n > len {
            return Err(RuntimeError::StackUnderflow);
        }
        Ok(self.stack.split_off(len - n))
    }

    fn pop_ints(&mut self, opcode: Opcode) -> Result<(i32, i32), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => Ok((*x, *y)),
            _ => Err(mismatch(opcode, &a, &b)),
        }
    }
}

fn frame_size(program: &BytecodeProgram, func_index: usize) -> usize {
    program
        .functions
        .get(func_index)
        .map(|f| f.local_count.max(f.arity))
        .unwrap_or(0)
}

fn mismatch(opcode: Opcode, a: &Value, b: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        op: opcode.name(),
        left: a.type_name(),
        right: b.type_name(),
    }
}

/// Validates an `array[index]` access and returns the storage and the
/// element position.
fn array_slot<'a>(
    array: &'a Value,
    index: &Value,
) -> Result<(&'a crate::lang::value::ArrayRef, usize), RuntimeError> {
    let Value::Array(items) = array else {
        return Err(RuntimeError::NotAnArray(array.type_name()));
    };
    let Value::Int(i) = *index else {
        return Err(RuntimeError::NonIntegerIndex(index.type_name()));
    };
    let len = items.borrow().len();
    match usize::try_from(i) {
        Ok(pos) if pos < len => Ok((items, pos)),
        _ => Err(RuntimeError::IndexOutOfBounds { index: i, len }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compile::{CodeGenerator, compile_program};
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;
    use crate::lang::ast::Program;

    fn parse(src: &str) -> Program {
        let tokens = Lexer::new(src).tokenize().unwrap();
        Parser::new(tokens).parse_program().unwrap()
    }

    fn quiet_vm() -> Vm {
        Vm::new().with_output(Box::new(io::sink()))
    }

    /// Runs `src` and returns the printed values rendered with `Display`.
    fn run(src: &str) -> Vec<String> {
        let bc = compile_program(&parse(src)).unwrap();
        let mut vm = quiet_vm();
        vm.execute(&bc, false).unwrap();
        vm.output().iter().map(|v| v.to_string()).collect()
    }

    fn run_err(src: &str) -> RuntimeError {
        let bc = compile_program(&parse(src)).unwrap();
        quiet_vm().execute(&bc, false).unwrap_err()
    }

    #[test]
    fn test_precedence_runs() {
        assert_eq!(run("print(3 + 5 * 2);"), vec!["13"]);
    }

    #[test]
    fn test_wrapping_and_truncation() {
        assert_eq!(run("print(2147483647 + 1);"), vec!["-2147483648"]);
        assert_eq!(run("print(-7 / 2); print(-7 % 2);"), vec!["-3", "-1"]);
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(run("print(\"ab\" + \"cd\");"), vec!["abcd"]);
    }

    #[test]
    fn test_mixed_add_is_type_mismatch() {
        assert!(matches!(
            run_err("print(1 + \"a\");"),
            RuntimeError::TypeMismatch { op: "ADD", left: "int", right: "string" }
        ));
    }

    #[test]
    fn test_string_comparison_rejected() {
        assert!(matches!(
            run_err("print(\"a\" < \"b\");"),
            RuntimeError::TypeMismatch { op: "LT", .. }
        ));
    }

    #[test]
    fn test_equality_any_values() {
        assert_eq!(
            run("print(\"a\" == \"a\"); print(1 == \"1\"); let a = [1]; let b = a; print(a == b); print(a == [1]);"),
            vec!["1", "0", "1", "0"]
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(run_err("print(1 / 0);"), RuntimeError::DivisionByZero);
        assert_eq!(run_err("let z = 0; print(5 % z);"), RuntimeError::ModuloByZero);
    }

    #[test]
    fn test_array_errors() {
        assert_eq!(
            run_err("let a = [1, 2]; print(a[5]);"),
            RuntimeError::IndexOutOfBounds { index: 5, len: 2 }
        );
        assert!(matches!(
            run_err("let a = [1]; print(a[-1]);"),
            RuntimeError::IndexOutOfBounds { index: -1, .. }
        ));
        assert_eq!(run_err("let n = 3; print(n[0]);"), RuntimeError::NotAnArray("int"));
        assert_eq!(
            run_err("let a = [1]; print(a[\"x\"]);"),
            RuntimeError::NonIntegerIndex("string")
        );
    }

    #[test]
    fn test_arrays_alias() {
        assert_eq!(
            run("let a = [1, 2, 3]; let b = a; b[0] = 9; print(a[0]); print(a);"),
            vec!["9", "[9, 2, 3]"]
        );
    }

    #[test]
    fn test_nested_arrays_print() {
        assert_eq!(run("print([1, [2, \"x\"]]);"), vec!["[1, [2, x]]"]);
    }

    #[test]
    fn test_recursion() {
        let src = "fn fib(n) { if (n <= 1) { return n; } return fib(n - 1) + fib(n - 2); } print(fib(10));";
        assert_eq!(run(src), vec!["55"]);
    }

    #[test]
    fn test_frames_do_not_clobber_caller() {
        let src = "fn add(a, b) { let t = a + b; return t; } \
                   let x = 1; let y = add(x, 2); print(x); print(y);";
        assert_eq!(run(src), vec!["1", "3"]);
    }

    #[test]
    fn test_unbounded_recursion_overflows() {
        let err = run_err("fn f(n) { return f(n + 1); } print(f(0));");
        assert_eq!(err, RuntimeError::StackOverflow("call depth"));
    }

    #[test]
    fn test_operand_stack_limit() {
        let bc = compile_program(&parse("print([1, 2, 3, 4, 5]);")).unwrap();
        let config = VmConfig {
            max_stack_size: 3,
            ..VmConfig::default()
        };
        let mut vm = Vm::with_config(config).with_output(Box::new(io::sink()));
        assert_eq!(
            vm.execute(&bc, false).unwrap_err(),
            RuntimeError::StackOverflow("operand stack")
        );
    }

    #[test]
    fn test_result_of_program() {
        let bc = compile_program(&parse("let x = 1;")).unwrap();
        assert_eq!(quiet_vm().execute(&bc, false).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_incremental_keeps_locals() {
        let mut codegen = CodeGenerator::new();
        let mut vm = quiet_vm();

        let first = codegen.generate(&parse("let x = 40;"), true).unwrap();
        assert_eq!(vm.execute(&first, true).unwrap(), Value::Void);

        let second = codegen.generate(&parse("x + 2;"), true).unwrap();
        assert_eq!(vm.execute(&second, true).unwrap(), Value::Int(42));
    }

    #[test]
    fn test_invalid_bytecode_rejected() {
        let mut bc = BytecodeProgram::new();
        bc.emit(Opcode::Const, 3);
        assert!(matches!(
            quiet_vm().execute(&bc, false),
            Err(RuntimeError::InvalidBytecode(_))
        ));
    }

    #[test]
    fn test_profiler_counts() {
        let bc = compile_program(&parse("print(1 + 2);")).unwrap();
        let mut vm = quiet_vm();
        vm.enable_profiling();
        vm.execute(&bc, false).unwrap();

        let profiler = vm.profiler().unwrap();
        assert_eq!(profiler.count(Opcode::Add), 1);
        assert_eq!(profiler.count(Opcode::Print), 1);
        assert_eq!(profiler.total_instructions(), bc.code.len() as u64);
    }

    #[test]
    fn test_print_self_containing_array() {
        assert_eq!(
            run("let a = [0]; a[0] = a; print(a); let b = [a, 1]; print(b);"),
            vec!["[[...]]", "[[[...]], 1]"]
        );
    }
}
