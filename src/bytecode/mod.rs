pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod ir;
pub mod op;
pub mod verify;

pub use compile::{CodeGenerator, compile_program};
pub use compile_error::CodegenError;
pub use ir::{BytecodeProgram, FunctionInfo};
pub use op::{Instruction, Opcode};
