use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::{env, fs};

use cinder::Error;
use cinder::bytecode::compile::CodeGenerator;
use cinder::bytecode::disasm::{print_bc, to_json};
use cinder::frontend::parser::Parser;
use cinder::frontend::token_dumper::TokenDumper;
use cinder::opt::Optimizer;
use cinder::pipeline;
use cinder::repl::{Session, run_repl};
use cinder::runtime::vm::Vm;

#[derive(Debug, Default)]
struct Options {
    file: Option<PathBuf>,
    no_opt: bool,
    profile: bool,
    verbose: bool,
    dump: bool,
    tokens: bool,
    json: bool,
    no_color: bool,
    help: bool,
}

impl Options {
    fn parse(args: impl Iterator<Item = String>) -> Result<Options, String> {
        let mut options = Options::default();
        for arg in args {
            match arg.as_str() {
                "--no-opt" => options.no_opt = true,
                "--profile" => options.profile = true,
                "--verbose" | "-v" => options.verbose = true,
                "--dump" => options.dump = true,
                "--tokens" => options.tokens = true,
                "--json" => options.json = true,
                "--no-color" => options.no_color = true,
                "--help" | "-h" => options.help = true,
                flag if flag.starts_with('-') => {
                    return Err(format!("unknown option '{}'", flag));
                }
                _ if options.file.is_some() => {
                    return Err(format!("unexpected argument '{}'", arg));
                }
                _ => options.file = Some(PathBuf::from(&arg)),
            }
        }
        Ok(options)
    }
}

/// Writes log records to stderr.
struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!(
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: bool) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(if verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        });
    }
}

fn main() {
    let options = match Options::parse(env::args().skip(1)) {
        Ok(options) => options,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            print_usage();
            std::process::exit(1);
        }
    };

    if options.help {
        print_usage();
        return;
    }

    init_logging(options.verbose);

    let outcome = match &options.file {
        Some(path) => run_file(path, &options),
        None => start_repl(),
    };

    if let Err(e) = outcome {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("cinder - bytecode compiler and VM");
    println!();
    println!("Usage:");
    println!("  cinder                    Start the REPL");
    println!("  cinder <file>             Compile and run a program");
    println!();
    println!("Options:");
    println!("  --no-opt                  Skip the optimizer");
    println!("  --profile                 Print execution statistics");
    println!("  --verbose, -v             Print pipeline progress");
    println!("  --dump                    Print bytecode before running");
    println!("  --tokens                  Print the token stream only");
    println!("  --json                    JSON output for --dump and --profile");
    println!("  --no-color                Plain --tokens output");
    println!("  --help, -h                Show this help");
}

fn start_repl() -> Result<(), Error> {
    let mut session = Session::new();
    let stdin = io::stdin();
    run_repl(
        &mut session,
        stdin.lock(),
        &mut io::stdout(),
        &mut io::stderr(),
    )
    .map_err(|source| Error::Io {
        path: PathBuf::from("<stdin>"),
        source,
    })
}

fn run_file(path: &Path, options: &Options) -> Result<(), Error> {
    let verbose = options.verbose;
    let progress = |line: &str| {
        if verbose {
            println!("{}", line);
        }
    };

    progress("[1/5] Reading source file...");
    let source = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if options.tokens {
        let tokens = pipeline::tokenize(&source)?;
        let dumper = if options.no_color {
            TokenDumper::new().no_color()
        } else {
            TokenDumper::new()
        };
        dumper.dump(&tokens);
        return Ok(());
    }

    progress("[2/5] Lexical analysis...");
    let tokens = pipeline::tokenize(&source)?;
    progress(&format!("      Generated {} tokens", tokens.len()));

    progress("[3/5] Parsing...");
    let mut program = Parser::new(tokens).parse_program()?;
    progress(&format!("      AST with {} top-level items", program.items.len()));

    if options.no_opt {
        progress("[4/5] Skipping optimization");
    } else {
        progress("[4/5] Optimizing...");
        let mut optimizer = Optimizer::new();
        optimizer.run(&mut program);
        let stats = optimizer.stats();
        progress(&format!("      Constants folded: {}", stats.constants_folded));
        progress(&format!("      Dead code removed: {}", stats.dead_code_removed));
        progress(&format!("      Functions inlinable: {}", stats.inline_candidates));
        progress(&format!("      Calls inlined: {}", stats.calls_inlined));
    }

    progress("[5/5] Generating bytecode...");
    let bytecode = CodeGenerator::new().generate(&program, false)?;
    progress(&format!("      Generated {} instructions", bytecode.code.len()));
    progress(&format!("      Constants: {}", bytecode.constants.len()));
    progress(&format!("      Functions: {}", bytecode.functions.len()));

    if options.dump {
        println!();
        if options.json {
            println!("{}", to_json(&bytecode)?);
        } else {
            print_bc(&bytecode);
        }
        println!();
    }

    progress("\n--- Execution ---");
    let mut vm = Vm::new();
    if options.profile {
        vm.enable_profiling();
    }
    let result = vm.execute(&bytecode, false)?;
    progress(&format!("\n--- Result: {} ---", result.repr()));

    if let Some(profiler) = vm.take_profiler() {
        let report = profiler.report();
        println!();
        if options.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print!("{}", report);
        }
    }

    Ok(())
}
