use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    bytecode::{
        compile_error::CodegenError,
        ir::{BytecodeProgram, FunctionInfo},
        op::Opcode,
    },
    lang::{
        ast::{BinaryOp, Expr, FunctionDecl, Program, Stmt, UnaryOp},
        value::Value,
    },
};

/// Jump sites of one enclosing loop, waiting to be patched.
struct LoopContext {
    /// Known up front for `while`; for `for` it is only known after the body.
    continue_target: Option<usize>,
    break_jumps: Vec<usize>,
    continue_jumps: Vec<usize>,
}

/// Names and functions an incremental [`CodeGenerator`] carries between
/// chunks.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    scopes: Vec<FxHashMap<String, u16>>,
    retained: Vec<FunctionDecl>,
}

/// Lowers a [`Program`] to a [`BytecodeProgram`].
///
/// Slots are allocated from a stack of name to slot maps. A name already
/// visible in any active scope keeps its slot; a new name gets the next slot
/// after every active scope, so sibling scopes that are never live together
/// share slots. Only `for` opens a scope.
///
/// In incremental mode the top-level scopes and earlier function
/// declarations survive between calls, which is what lets a REPL session
/// keep its variables and functions.
pub struct CodeGenerator {
    /// Output being built by the current `generate` call
    program: BytecodeProgram,

    scopes: Vec<FxHashMap<String, u16>>,

    loops: Vec<LoopContext>,

    /// Function name to function-table index
    function_map: FxHashMap<String, usize>,

    /// Highest slot count reached in the unit being compiled
    peak_slots: usize,

    /// Functions declared by earlier incremental chunks
    retained: Vec<FunctionDecl>,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self {
            program: BytecodeProgram::new(),
            scopes: vec![FxHashMap::default()],
            loops: Vec::new(),
            function_map: FxHashMap::default(),
            peak_slots: 0,
            retained: Vec::new(),
        }
    }

    /// Compiles a whole program.
    ///
    /// Non-incremental calls start from empty scopes and end top-level code
    /// with `return 0`. Incremental calls keep the scopes and functions of
    /// earlier calls, leave a trailing bare expression's value on the stack
    /// and emit no final return. A failed incremental call leaves the
    /// generator as it was before the call.
    pub fn generate(
        &mut self,
        program: &Program,
        incremental: bool,
    ) -> Result<BytecodeProgram, CodegenError> {
        if !incremental {
            self.scopes = vec![FxHashMap::default()];
            self.retained.clear();
        }

        let saved = self.checkpoint();
        match self.generate_inner(program, incremental) {
            Ok(bytecode) => {
                if incremental {
                    self.retain_functions(program);
                }
                Ok(bytecode)
            }
            Err(err) => {
                self.rollback(saved);
                Err(err)
            }
        }
    }

    /// Snapshot of the state that survives between incremental chunks.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            scopes: self.scopes.clone(),
            retained: self.retained.clone(),
        }
    }

    /// Forgets every name and function declared since `checkpoint` was
    /// taken.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.scopes = checkpoint.scopes;
        self.retained = checkpoint.retained;
        self.loops.clear();
    }

    fn generate_inner(
        &mut self,
        program: &Program,
        incremental: bool,
    ) -> Result<BytecodeProgram, CodegenError> {
        self.program = BytecodeProgram::new();
        self.loops.clear();
        self.function_map.clear();

        // Pass 1: register every function so forward calls resolve.
        let functions = self.collect_functions(program)?;
        for func in &functions {
            self.function_map
                .insert(func.name.clone(), self.program.functions.len());
            self.program.functions.push(FunctionInfo {
                name: func.name.clone(),
                entry: 0,
                arity: func.params.len(),
                local_count: 0,
            });
        }

        // Pass 2: function bodies, then top-level code in source order.
        for (index, func) in functions.iter().enumerate() {
            self.compile_function(index, func)?;
        }

        self.program.main_entry = self.program.code.len();
        self.peak_slots = self.active_slots();

        let statements: Vec<&Stmt> = program.statements().collect();
        for (i, stmt) in statements.iter().enumerate() {
            let trailing = incremental && i + 1 == statements.len();
            match stmt {
                // Left on the stack so the VM reports it.
                Stmt::Expr(expr) if trailing => self.compile_expr(expr)?,
                _ => self.compile_stmt(stmt)?,
            }
        }

        if !incremental {
            self.emit_const(Value::Int(0))?;
            self.emit(Opcode::Return, 0);
        }
        self.program.main_locals = self.peak_slots;

        log::debug!(
            "generated {} instructions, {} constants, {} functions",
            self.program.code.len(),
            self.program.constants.len(),
            self.program.functions.len()
        );
        Ok(std::mem::take(&mut self.program))
    }

    /// Retained declarations first, minus any redefined in this program,
    /// then this program's declarations in source order.
    fn collect_functions(&self, program: &Program) -> Result<Vec<FunctionDecl>, CodegenError> {
        let mut seen = FxHashSet::default();
        let mut fresh = Vec::new();
        for func in program.functions() {
            if !seen.insert(func.name.as_str()) {
                return Err(CodegenError::DuplicateFunction(func.name.clone()));
            }
            fresh.push(func.clone());
        }

        let mut functions: Vec<FunctionDecl> = self
            .retained
            .iter()
            .filter(|f| !seen.contains(f.name.as_str()))
            .cloned()
            .collect();
        functions.extend(fresh);

        if functions.len() > u16::MAX as usize + 1 {
            return Err(CodegenError::Limit("functions"));
        }
        Ok(functions)
    }

    fn retain_functions(&mut self, program: &Program) {
        for func in program.functions() {
            match self.retained.iter_mut().find(|f| f.name == func.name) {
                Some(existing) => *existing = func.clone(),
                None => self.retained.push(func.clone()),
            }
        }
    }

    fn compile_function(&mut self, index: usize, func: &FunctionDecl) -> Result<(), CodegenError> {
        let entry = self.program.code.len();

        let mut params = FxHashMap::default();
        for (slot, name) in func.params.iter().enumerate() {
            params.insert(name.clone(), to_operand(slot, "parameters")?);
        }

        // Functions do not see top-level variables.
        let outer_scopes = std::mem::replace(&mut self.scopes, vec![params]);
        let outer_peak = self.peak_slots;
        self.peak_slots = self.active_slots();

        let result = self.compile_block(&func.body).and_then(|()| {
            self.emit_const(Value::Int(0))?;
            self.emit(Opcode::Return, 0);
            Ok(())
        });
        let local_count = self.peak_slots;

        self.scopes = outer_scopes;
        self.peak_slots = outer_peak;
        result?;

        let info = &mut self.program.functions[index];
        info.entry = entry;
        info.local_count = local_count;
        log::trace!(
            "function '{}' at {} ({} locals)",
            func.name,
            entry,
            local_count
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Scopes
    // -------------------------------------------------------------------------

    fn active_slots(&self) -> usize {
        self.scopes.iter().map(|s| s.len()).sum()
    }

    fn lookup(&self, name: &str) -> Option<u16> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    /// Slot for an assignment target: the visible slot, or a fresh one in the
    /// innermost scope.
    fn declare(&mut self, name: &str) -> Result<u16, CodegenError> {
        if let Some(slot) = self.lookup(name) {
            return Ok(slot);
        }

        let next = self.active_slots();
        let slot = to_operand(next, "local variables")?;
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), slot);
        }
        self.peak_slots = self.peak_slots.max(next + 1);
        Ok(slot)
    }

    // -------------------------------------------------------------------------
    // Emission helpers
    // -------------------------------------------------------------------------

    fn emit(&mut self, opcode: Opcode, operand: u16) -> usize {
        self.program.emit(opcode, operand)
    }

    /// Emits a jump with a placeholder target.
    fn emit_jump(&mut self, opcode: Opcode) -> usize {
        self.emit(opcode, 0)
    }

    fn patch(&mut self, at: usize, target: usize) -> Result<(), CodegenError> {
        self.program.code[at].operand = to_operand(target, "instructions")?;
        log::trace!("patched jump at {} -> {}", at, target);
        Ok(())
    }

    fn here(&self) -> usize {
        self.program.code.len()
    }

    fn emit_const(&mut self, value: Value) -> Result<(), CodegenError> {
        let index = match self.program.constants.iter().position(|c| *c == value) {
            Some(index) => index,
            None => {
                self.program.constants.push(value);
                self.program.constants.len() - 1
            }
        };
        let operand = to_operand(index, "constants")?;
        self.emit(Opcode::Const, operand);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    fn compile_block(&mut self, block: &[Stmt]) -> Result<(), CodegenError> {
        for stmt in block {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CodegenError> {
        match stmt {
            Stmt::Assign { name, value } => {
                self.compile_expr(value)?;
                let slot = self.declare(name)?;
                self.emit(Opcode::Store, slot);
            }
            Stmt::ArrayAssign {
                array,
                index,
                value,
            } => {
                self.compile_expr(array)?;
                self.compile_expr(index)?;
                self.compile_expr(value)?;
                self.emit(Opcode::ArrayStore, 0);
            }
            Stmt::Print(expr) => {
                self.compile_expr(expr)?;
                self.emit(Opcode::Print, 0);
            }
            Stmt::Expr(expr) => {
                self.compile_expr(expr)?;
                self.emit(Opcode::Pop, 0);
            }
            Stmt::If { cond, body } => {
                self.compile_expr(cond)?;
                let skip = self.emit_jump(Opcode::JumpIfZero);
                self.compile_block(body)?;
                self.patch(skip, self.here())?;
            }
            Stmt::While { cond, body } => self.compile_while(cond, body)?,
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                self.scopes.push(FxHashMap::default());
                let result = self.compile_for(init.as_deref(), cond.as_ref(), step.as_deref(), body);
                self.scopes.pop();
                result?;
            }
            Stmt::Break => {
                let jump = self.emit_jump(Opcode::Jump);
                let ctx = self.loops.last_mut().ok_or(CodegenError::BreakOutsideLoop)?;
                ctx.break_jumps.push(jump);
            }
            Stmt::Continue => {
                let continue_target = self
                    .loops
                    .last()
                    .ok_or(CodegenError::ContinueOutsideLoop)?
                    .continue_target;
                match continue_target {
                    Some(target) => {
                        let target = to_operand(target, "instructions")?;
                        self.emit(Opcode::Jump, target);
                    }
                    None => {
                        let jump = self.emit_jump(Opcode::Jump);
                        if let Some(ctx) = self.loops.last_mut() {
                            ctx.continue_jumps.push(jump);
                        }
                    }
                }
            }
            Stmt::Return(value) => {
                match value {
                    Some(expr) => self.compile_expr(expr)?,
                    None => self.emit_const(Value::Int(0))?,
                }
                self.emit(Opcode::Return, 0);
            }
            Stmt::Block(body) => self.compile_block(body)?,
        }
        Ok(())
    }

    fn compile_while(&mut self, cond: &Expr, body: &[Stmt]) -> Result<(), CodegenError> {
        let start = self.here();
        self.compile_expr(cond)?;
        let exit = self.emit_jump(Opcode::JumpIfZero);

        self.loops.push(LoopContext {
            continue_target: Some(start),
            break_jumps: Vec::new(),
            continue_jumps: Vec::new(),
        });
        let result = self.compile_block(body);
        let ctx = self.loops.pop();
        result?;

        self.emit(Opcode::Jump, to_operand(start, "instructions")?);
        let end = self.here();
        self.patch(exit, end)?;
        if let Some(ctx) = ctx {
            for jump in ctx.break_jumps {
                self.patch(jump, end)?;
            }
        }
        Ok(())
    }

    fn compile_for(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        step: Option<&Stmt>,
        body: &[Stmt],
    ) -> Result<(), CodegenError> {
        if let Some(init) = init {
            self.compile_stmt(init)?;
        }

        let start = self.here();
        let exit = match cond {
            Some(cond) => {
                self.compile_expr(cond)?;
                Some(self.emit_jump(Opcode::JumpIfZero))
            }
            None => None,
        };

        self.loops.push(LoopContext {
            continue_target: None,
            break_jumps: Vec::new(),
            continue_jumps: Vec::new(),
        });
        let result = self.compile_block(body);
        let ctx = self.loops.pop();
        result?;

        let step_start = self.here();
        if let Some(step) = step {
            self.compile_stmt(step)?;
        }
        self.emit(Opcode::Jump, to_operand(start, "instructions")?);

        let end = self.here();
        if let Some(exit) = exit {
            self.patch(exit, end)?;
        }
        if let Some(ctx) = ctx {
            for jump in ctx.continue_jumps {
                self.patch(jump, step_start)?;
            }
            for jump in ctx.break_jumps {
                self.patch(jump, end)?;
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CodegenError> {
        match expr {
            Expr::Number(n) => self.emit_const(Value::Int(*n))?,
            Expr::Str(s) => self.emit_const(Value::Str(s.clone()))?,
            Expr::Ident(name) => {
                let slot = self
                    .lookup(name)
                    .ok_or_else(|| CodegenError::UndefinedVariable(name.clone()))?;
                self.emit(Opcode::Load, slot);
            }
            Expr::Binary { op, left, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit(binary_opcode(*op), 0);
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::Neg => {
                    self.emit_const(Value::Int(0))?;
                    self.compile_expr(operand)?;
                    self.emit(Opcode::Sub, 0);
                }
                UnaryOp::Not => {
                    self.compile_expr(operand)?;
                    self.emit_const(Value::Int(0))?;
                    self.emit(Opcode::Eq, 0);
                }
            },
            Expr::Call { callee, args } => {
                let index = *self
                    .function_map
                    .get(callee)
                    .ok_or_else(|| CodegenError::UndefinedFunction(callee.clone()))?;
                let arity = self.program.functions[index].arity;
                if arity != args.len() {
                    return Err(CodegenError::ArityMismatch {
                        name: callee.clone(),
                        expected: arity,
                        found: args.len(),
                    });
                }
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.emit(Opcode::Call, to_operand(index, "functions")?);
            }
            Expr::Array(items) => {
                for item in items {
                    self.compile_expr(item)?;
                }
                self.emit(Opcode::BuildArray, to_operand(items.len(), "array elements")?);
            }
            Expr::Index { array, index } => {
                self.compile_expr(array)?;
                self.compile_expr(index)?;
                self.emit(Opcode::ArrayLoad, 0);
            }
        }
        Ok(())
    }
}

/// `&&` and `||` have no opcode of their own: they multiply and add their
/// fully evaluated operands.
fn binary_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add | BinaryOp::Or => Opcode::Add,
        BinaryOp::Sub => Opcode::Sub,
        BinaryOp::Mul | BinaryOp::And => Opcode::Mul,
        BinaryOp::Div => Opcode::Div,
        BinaryOp::Mod => Opcode::Mod,
        BinaryOp::Eq => Opcode::Eq,
        BinaryOp::NotEq => Opcode::Neq,
        BinaryOp::Lt => Opcode::Lt,
        BinaryOp::LtEq => Opcode::Lte,
        BinaryOp::Gt => Opcode::Gt,
        BinaryOp::GtEq => Opcode::Gte,
    }
}

fn to_operand(value: usize, what: &'static str) -> Result<u16, CodegenError> {
    u16::try_from(value).map_err(|_| CodegenError::Limit(what))
}

/// Shorthand for a one-off, non-incremental compile.
pub fn compile_program(program: &Program) -> Result<BytecodeProgram, CodegenError> {
    CodeGenerator::new().generate(program, false)
}
