use crate::bytecode::ir::{BytecodeProgram, FunctionInfo};
use crate::bytecode::op::{Instruction, Opcode};
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::fmt::Write;

const RULE: &str = "════════════════════════════════════════";

/// Print disassembly of a bytecode program
pub fn print_bc(program: &BytecodeProgram) {
    print!("{}", disassemble(program));
}

/// Render constants, the function table and the annotated instruction stream.
pub fn disassemble(program: &BytecodeProgram) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_program(&mut out, program);
    out
}

fn write_program(out: &mut String, program: &BytecodeProgram) -> std::fmt::Result {
    writeln!(out, "=== BYTECODE PROGRAM ===")?;
    writeln!(out)?;

    writeln!(out, "{}", RULE)?;
    writeln!(out, " constants ({})", program.constants.len())?;
    writeln!(out, "{}", RULE)?;
    for (i, value) in program.constants.iter().enumerate() {
        writeln!(out, "  [{}] {}", i, value.repr())?;
    }
    writeln!(out)?;

    writeln!(out, "{}", RULE)?;
    writeln!(out, " functions ({})", program.functions.len())?;
    writeln!(out, "{}", RULE)?;
    for (i, func) in program.functions.iter().enumerate() {
        writeln!(
            out,
            "  [{}] {:<12} entry={:04} arity={} locals={}",
            i, func.name, func.entry, func.arity, func.local_count
        )?;
    }
    writeln!(out)?;

    writeln!(out, "{}", RULE)?;
    writeln!(out, " code: {} instructions", program.code.len())?;
    writeln!(
        out,
        " main entry={:04} locals={}",
        program.main_entry, program.main_locals
    )?;
    writeln!(out, "{}", RULE)?;
    write_code(out, program)
}

fn write_code(out: &mut String, program: &BytecodeProgram) -> std::fmt::Result {
    let jump_targets = collect_jump_targets(&program.code);

    for (ip, instr) in program.code.iter().enumerate() {
        if let Some(name) = label_at(program, ip) {
            writeln!(out, "{}:", name)?;
        }
        if jump_targets.contains(&ip) {
            writeln!(out, "      ┌──────────────────────────────────")?;
        }

        let marker = if jump_targets.contains(&ip) { "► " } else { "  " };
        write!(out, "{:04} {}{}", ip, marker, instr)?;
        if let Some(note) = annotate(program, instr) {
            write!(out, "  ; {}", note)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn label_at(program: &BytecodeProgram, ip: usize) -> Option<&str> {
    if let Some(func) = program.functions.iter().find(|f| f.entry == ip) {
        return Some(func.name.as_str());
    }
    (program.main_entry == ip).then_some("<main>")
}

fn annotate(program: &BytecodeProgram, instr: &Instruction) -> Option<String> {
    let operand = instr.operand as usize;
    match instr.opcode {
        Opcode::Const => program.constants.get(operand).map(|v| v.repr()),
        Opcode::Call => program
            .functions
            .get(operand)
            .map(|f| format!("{}/{}", f.name, f.arity)),
        _ => None,
    }
}

fn collect_jump_targets(code: &[Instruction]) -> FxHashSet<usize> {
    code.iter()
        .filter(|instr| instr.opcode.is_jump())
        .map(|instr| instr.operand as usize)
        .collect()
}

/// Serializable view of a program for `--dump --json`.
#[derive(Serialize)]
struct ProgramView<'a> {
    constants: Vec<String>,
    functions: &'a [FunctionInfo],
    main_entry: usize,
    main_locals: usize,
    code: &'a [Instruction],
}

pub fn to_json(program: &BytecodeProgram) -> serde_json::Result<String> {
    let view = ProgramView {
        constants: program.constants.iter().map(|v| v.repr()).collect(),
        functions: &program.functions,
        main_entry: program.main_entry,
        main_locals: program.main_locals,
        code: &program.code,
    };
    serde_json::to_string_pretty(&view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compile::compile_program;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;

    fn compile(src: &str) -> BytecodeProgram {
        let tokens = Lexer::new(src).tokenize().unwrap();
        compile_program(&Parser::new(tokens).parse_program().unwrap()).unwrap()
    }

    #[test]
    fn test_disassemble_lists_tables() {
        let text = disassemble(&compile("fn f(a) { return a; } print(f(\"hi\"));"));
        assert!(text.contains("[1] \"hi\""));
        assert!(text.contains("f            entry=0000 arity=1 locals=1"));
        assert!(text.contains("<main>:"));
        assert!(text.contains("CALL         0  ; f/1"));
    }

    #[test]
    fn test_jump_targets_marked() {
        let text = disassemble(&compile("let i = 0; while (i < 3) { i = i + 1; }"));
        assert!(text.contains("► "));
        assert!(text.contains("JUMP_IF_ZERO"));
    }

    #[test]
    fn test_json_dump() {
        let json = to_json(&compile("print(1);")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["constants"][0], "1");
        assert_eq!(parsed["code"][1]["opcode"], "PRINT");
    }
}
