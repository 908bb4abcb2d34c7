use serde::Serialize;
use std::fmt;

// =============================================================================
// OPCODE - one byte per instruction
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Opcode {
    /// Push `constants[operand]`.
    Const = 0x00,
    /// Push `locals[bp + operand]`.
    Load = 0x01,
    /// Pop into `locals[bp + operand]`.
    Store = 0x02,

    // arithmetic
    Add = 0x03,
    Sub = 0x04,
    Mul = 0x05,
    Div = 0x06,
    Mod = 0x07,

    // control flow; operands are absolute instruction indices
    Jump = 0x08,
    /// Pop; jump when the value is integer zero.
    JumpIfZero = 0x09,
    /// Call `functions[operand]`.
    Call = 0x0A,
    Return = 0x0B,

    Print = 0x0C,

    // comparison
    Eq = 0x0D,
    Neq = 0x0E,
    Lt = 0x0F,
    Lte = 0x10,
    Gt = 0x11,
    Gte = 0x12,

    // arrays
    /// Pop `operand` values into a new array.
    BuildArray = 0x13,
    /// `( array index -- value )`
    ArrayLoad = 0x14,
    /// `( array index value -- )`
    ArrayStore = 0x15,

    Pop = 0x16,
}

impl Opcode {
    pub const ALL: [Opcode; 23] = [
        Opcode::Const,
        Opcode::Load,
        Opcode::Store,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Jump,
        Opcode::JumpIfZero,
        Opcode::Call,
        Opcode::Return,
        Opcode::Print,
        Opcode::Eq,
        Opcode::Neq,
        Opcode::Lt,
        Opcode::Lte,
        Opcode::Gt,
        Opcode::Gte,
        Opcode::BuildArray,
        Opcode::ArrayLoad,
        Opcode::ArrayStore,
        Opcode::Pop,
    ];

    pub fn from_byte(byte: u8) -> Option<Opcode> {
        Self::ALL.get(byte as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Const => "CONST",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Jump => "JUMP",
            Opcode::JumpIfZero => "JUMP_IF_ZERO",
            Opcode::Call => "CALL",
            Opcode::Return => "RETURN",
            Opcode::Print => "PRINT",
            Opcode::Eq => "EQ",
            Opcode::Neq => "NEQ",
            Opcode::Lt => "LT",
            Opcode::Lte => "LTE",
            Opcode::Gt => "GT",
            Opcode::Gte => "GTE",
            Opcode::BuildArray => "BUILD_ARRAY",
            Opcode::ArrayLoad => "ARRAY_LOAD",
            Opcode::ArrayStore => "ARRAY_STORE",
            Opcode::Pop => "POP",
        }
    }

    /// Whether the operand field means anything for this opcode.
    pub fn has_operand(self) -> bool {
        matches!(
            self,
            Opcode::Const
                | Opcode::Load
                | Opcode::Store
                | Opcode::Jump
                | Opcode::JumpIfZero
                | Opcode::Call
                | Opcode::BuildArray
        )
    }

    pub fn is_jump(self) -> bool {
        matches!(self, Opcode::Jump | Opcode::JumpIfZero)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One opcode byte plus a 16-bit operand (zero when unused).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: u16,
}

impl Instruction {
    pub fn new(opcode: Opcode, operand: u16) -> Self {
        Instruction { opcode, operand }
    }

    pub fn simple(opcode: Opcode) -> Self {
        Instruction { opcode, operand: 0 }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.opcode.has_operand() {
            write!(f, "{:<13}{}", self.opcode.name(), self.operand)
        } else {
            f.write_str(self.opcode.name())
        }
    }
}
