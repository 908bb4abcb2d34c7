use serde::Serialize;

use crate::bytecode::op::{Instruction, Opcode};
use crate::lang::value::Value;

/// Entry in the function table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionInfo {
    pub name: String,
    /// Index of the first instruction of the body.
    pub entry: usize,
    pub arity: usize,
    /// Peak number of local slots, parameters included.
    pub local_count: usize,
}

/// A compiled program: one flat instruction stream shared by all functions.
#[derive(Debug, Clone, Default)]
pub struct BytecodeProgram {
    pub code: Vec<Instruction>,
    /// Deduplicated literal values referenced by `CONST`.
    pub constants: Vec<Value>,
    pub functions: Vec<FunctionInfo>,
    /// Index where top-level code starts.
    pub main_entry: usize,
    /// Peak number of local slots used by top-level code.
    pub main_locals: usize,
}

impl BytecodeProgram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an instruction and returns its index.
    pub fn emit(&mut self, opcode: Opcode, operand: u16) -> usize {
        self.code.push(Instruction::new(opcode, operand));
        self.code.len() - 1
    }

    pub fn function_index(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.name == name)
    }
}
