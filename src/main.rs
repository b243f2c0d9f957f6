//! Marmot CLI: execute files, evaluate snippets, or run the REPL.

use std::env;
use std::path::Path;
use std::process;
use std::time::Instant;

use marmot::repl::Repl;
use marmot::{run_file, run_with_options, ExecutionMode};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The fixed benchmark program, exercising deep recursion through the
/// call/return and closure machinery.
const BENCH_SOURCE: &str = "
let fibonacci = fn(x) {
    if (x == 0) {
        0
    } else {
        if (x == 1) {
            return 1;
        } else {
            fibonacci(x - 1) + fibonacci(x - 2);
        }
    }
};
fibonacci(35);
";

/// CLI command to execute.
enum Command {
    /// Run a script file
    Run { file: String },
    /// Evaluate a string and print the result
    Eval { code: String },
    /// Start the REPL
    Repl,
    /// Run the fixed fibonacci benchmark and report elapsed time
    Bench,
}

/// CLI options parsed from arguments.
struct Options {
    command: Command,
    mode: ExecutionMode,
    disassemble: bool,
}

fn print_usage() {
    eprintln!("Marmot {} - a small scripting language", VERSION);
    eprintln!();
    eprintln!("Usage: marmot [options] [script.mt]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -e <code>        Evaluate code and print the result");
    eprintln!("  --engine ENGINE  Execution engine: vm (default) or eval");
    eprintln!("  --disassemble    Print the bytecode listing before running");
    eprintln!("  --bench          Run the fixed fibonacci benchmark");
    eprintln!("  --help, -h       Show this help message");
    eprintln!();
    eprintln!("With no script, an interactive REPL is started.");
}

fn parse_args() -> Result<Options, String> {
    let mut command = None;
    let mut mode = ExecutionMode::default();
    let mut disassemble = false;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            "-e" => {
                let code = args.next().ok_or("-e requires an argument")?;
                command = Some(Command::Eval { code });
            }
            "--engine" => {
                let engine = args.next().ok_or("--engine requires an argument")?;
                mode = match engine.as_str() {
                    "vm" => ExecutionMode::Bytecode,
                    "eval" => ExecutionMode::TreeWalk,
                    other => return Err(format!("unknown engine '{}'", other)),
                };
            }
            "--disassemble" => disassemble = true,
            "--bench" => command = Some(Command::Bench),
            other if other.starts_with('-') => {
                return Err(format!("unknown option '{}'", other));
            }
            file => command = Some(Command::Run {
                file: file.to_string(),
            }),
        }
    }

    Ok(Options {
        command: command.unwrap_or(Command::Repl),
        mode,
        disassemble,
    })
}

fn main() {
    let options = match parse_args() {
        Ok(options) => options,
        Err(message) => {
            eprintln!("error: {}", message);
            eprintln!();
            print_usage();
            process::exit(64);
        }
    };

    match options.command {
        Command::Repl => Repl::new().run(),

        Command::Run { file } => {
            let path = Path::new(&file);
            if let Err(err) = run_file(path, options.mode, options.disassemble) {
                eprintln!("{}", err);
                process::exit(70);
            }
        }

        Command::Eval { code } => {
            match run_with_options(&code, options.mode, options.disassemble) {
                Ok(value) => println!("{}", value),
                Err(err) => {
                    eprintln!("{}", err);
                    process::exit(70);
                }
            }
        }

        Command::Bench => {
            let engine = match options.mode {
                ExecutionMode::Bytecode => "vm",
                ExecutionMode::TreeWalk => "eval",
            };
            let start = Instant::now();
            match run_with_options(BENCH_SOURCE, options.mode, false) {
                Ok(result) => {
                    let duration = start.elapsed();
                    println!(
                        "engine={}, result={}, duration={:?}",
                        engine, result, duration
                    );
                }
                Err(err) => {
                    eprintln!("{}", err);
                    process::exit(70);
                }
            }
        }
    }
}
