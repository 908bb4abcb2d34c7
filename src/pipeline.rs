//! One-shot drivers chaining lexer, parser, optimizer, code generator and VM.

use std::io;
use std::path::PathBuf;

use crate::bytecode::compile::CodeGenerator;
use crate::bytecode::compile_error::CodegenError;
use crate::bytecode::ir::BytecodeProgram;
use crate::frontend::lexer::{Lexer, LexerError};
use crate::frontend::parser::Parser;
use crate::frontend::parser_error::ParserError;
use crate::frontend::token::Token;
use crate::lang::ast::Program;
use crate::lang::value::Value;
use crate::opt::{OptStats, Optimizer};
use crate::runtime::runtime_error::RuntimeError;
use crate::runtime::vm::Vm;

/// Failure of any pipeline stage. `Display` carries the stage prefix.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] LexerError),

    #[error(transparent)]
    Parse(#[from] ParserError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("Error: cannot read '{}': {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("Error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, Error> {
    let tokens = Lexer::new(source).tokenize()?;
    log::debug!("lexer: {} tokens", tokens.len());
    Ok(tokens)
}

pub fn parse(source: &str) -> Result<Program, Error> {
    let program = Parser::new(tokenize(source)?).parse_program()?;
    log::debug!("parser: {} top-level items", program.items.len());
    Ok(program)
}

/// Compiles a whole source unit. Optimizer statistics are returned when the
/// optimizer ran.
pub fn compile_source(
    source: &str,
    optimize: bool,
) -> Result<(BytecodeProgram, Option<OptStats>), Error> {
    let mut program = parse(source)?;

    let stats = optimize.then(|| {
        let mut optimizer = Optimizer::new();
        optimizer.run(&mut program);
        *optimizer.stats()
    });

    let bytecode = CodeGenerator::new().generate(&program, false)?;
    Ok((bytecode, stats))
}

/// Compiles and runs `source` on `vm`, returning the program's result.
pub fn execute_source(source: &str, optimize: bool, vm: &mut Vm) -> Result<Value, Error> {
    let (bytecode, _) = compile_source(source, optimize)?;
    Ok(vm.execute(&bytecode, false)?)
}

/// Runs `source` with printing discarded and returns the printed values.
pub fn run_source(source: &str, optimize: bool) -> Result<Vec<Value>, Error> {
    let mut vm = Vm::new().with_output(Box::new(io::sink()));
    execute_source(source, optimize, &mut vm)?;
    Ok(vm.output().to_vec())
}
