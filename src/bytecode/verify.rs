use crate::bytecode::ir::BytecodeProgram;
use crate::bytecode::op::Opcode;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("bytecode check failed at {ip}: {message}")]
pub struct VerifyError {
    pub ip: usize,
    pub message: String,
}

impl VerifyError {
    fn new(ip: usize, message: impl Into<String>) -> Self {
        Self {
            ip,
            message: message.into(),
        }
    }
}

/// Static checks run before execution: every operand that indexes
/// something must be in range for the program it belongs to.
///
/// Jump targets may equal `code.len()`, which ends execution. `LOAD`/`STORE`
/// slots are checked against the frame size of the function (or top-level
/// code) that owns the instruction.
pub fn check_program(program: &BytecodeProgram) -> Result<(), VerifyError> {
    let len = program.code.len();

    if program.main_entry > len {
        return Err(VerifyError::new(
            program.main_entry,
            format!("main entry {} past end of code ({})", program.main_entry, len),
        ));
    }
    for func in &program.functions {
        if func.entry >= len {
            return Err(VerifyError::new(
                func.entry,
                format!("function '{}' entry {} past end of code", func.name, func.entry),
            ));
        }
    }

    let regions = frame_regions(program);

    for (ip, instr) in program.code.iter().enumerate() {
        let operand = instr.operand as usize;
        match instr.opcode {
            Opcode::Const if operand >= program.constants.len() => {
                return Err(VerifyError::new(
                    ip,
                    format!("constant index {} out of range", operand),
                ));
            }
            Opcode::Jump | Opcode::JumpIfZero if operand > len => {
                return Err(VerifyError::new(
                    ip,
                    format!("jump target {} out of range", operand),
                ));
            }
            Opcode::Call if operand >= program.functions.len() => {
                return Err(VerifyError::new(
                    ip,
                    format!("function index {} out of range", operand),
                ));
            }
            Opcode::Load | Opcode::Store => {
                let frame = frame_size(&regions, ip);
                if operand >= frame {
                    return Err(VerifyError::new(
                        ip,
                        format!("local slot {} outside frame of {} slots", operand, frame),
                    ));
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// `(start, frame size)` for each function and for top-level code, sorted by
/// start. An instruction belongs to the last region starting at or before it.
fn frame_regions(program: &BytecodeProgram) -> Vec<(usize, usize)> {
    let mut regions: Vec<(usize, usize)> = program
        .functions
        .iter()
        .map(|f| (f.entry, f.local_count.max(f.arity)))
        .collect();
    regions.push((program.main_entry, program.main_locals));
    regions.sort();
    regions
}

fn frame_size(regions: &[(usize, usize)], ip: usize) -> usize {
    regions
        .iter()
        .rev()
        .find(|(start, _)| *start <= ip)
        .map(|(_, size)| *size)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::ir::FunctionInfo;
    use crate::bytecode::op::Instruction;
    use crate::lang::value::Value;

    fn program(code: Vec<Instruction>) -> BytecodeProgram {
        BytecodeProgram {
            code,
            constants: vec![Value::Int(1)],
            functions: Vec::new(),
            main_entry: 0,
            main_locals: 1,
        }
    }

    fn assert_error(program: &BytecodeProgram, needle: &str) {
        let err = check_program(program).unwrap_err();
        assert!(
            err.message.contains(needle),
            "expected '{}' in '{}'",
            needle,
            err.message
        );
    }

    #[test]
    fn test_valid_program_passes() {
        let p = program(vec![
            Instruction::new(Opcode::Const, 0),
            Instruction::new(Opcode::Store, 0),
            Instruction::new(Opcode::Jump, 3),
        ]);
        assert!(check_program(&p).is_ok());
    }

    #[test]
    fn test_bad_constant() {
        assert_error(&program(vec![Instruction::new(Opcode::Const, 4)]), "constant index");
    }

    #[test]
    fn test_bad_jump() {
        assert_error(&program(vec![Instruction::new(Opcode::JumpIfZero, 9)]), "jump target");
    }

    #[test]
    fn test_bad_call() {
        assert_error(&program(vec![Instruction::new(Opcode::Call, 0)]), "function index");
    }

    #[test]
    fn test_slot_outside_frame() {
        assert_error(&program(vec![Instruction::new(Opcode::Load, 1)]), "local slot 1");
    }

    #[test]
    fn test_slots_checked_per_function() {
        let mut p = program(vec![
            // f: two slots
            Instruction::new(Opcode::Load, 1),
            Instruction::simple(Opcode::Return),
            // main: one slot
            Instruction::new(Opcode::Load, 0),
        ]);
        p.functions.push(FunctionInfo {
            name: "f".into(),
            entry: 0,
            arity: 2,
            local_count: 2,
        });
        p.main_entry = 2;
        assert!(check_program(&p).is_ok());

        p.code[2] = Instruction::new(Opcode::Load, 1);
        assert_error(&p, "outside frame of 1");
    }

    #[test]
    fn test_entry_out_of_range() {
        let mut p = program(vec![]);
        p.main_entry = 3;
        assert_error(&p, "main entry");
    }
}
