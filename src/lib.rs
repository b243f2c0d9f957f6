//! Marmot: a small dynamically-typed scripting language.
//!
//! Source code is scanned, parsed into an AST, and then executed by one of
//! two engines:
//!
//! - **Bytecode VM** (default): a single-pass compiler emits instructions
//!   against a constant pool, executed by a stack machine.
//! - **Tree-walk interpreter**: direct AST evaluation, kept as the reference
//!   engine for benchmarks and cross-checking.

pub mod ast;
pub mod bytecode;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod value;

use error::MarmotError;
use value::Value;

/// Execution engine for running Marmot programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Bytecode virtual machine (faster)
    #[default]
    Bytecode,
    /// Tree-walking interpreter
    TreeWalk,
}

/// Parse source code into an AST without executing.
pub fn parse(source: &str) -> Result<ast::Program, MarmotError> {
    let tokens = lexer::Scanner::new(source).scan_tokens()?;
    let program = parser::Parser::new(tokens).parse()?;
    Ok(program)
}

/// Compile source code to bytecode without executing.
pub fn compile(source: &str) -> Result<bytecode::Bytecode, MarmotError> {
    let program = parse(source)?;
    let mut compiler = bytecode::Compiler::new();
    compiler.compile(&program)?;
    Ok(compiler.bytecode())
}

/// Run a Marmot program with the default engine and return the program's
/// final value.
pub fn run(source: &str) -> Result<Value, MarmotError> {
    run_with_options(source, ExecutionMode::default(), false)
}

/// Run a Marmot program from a file path.
pub fn run_file(
    path: &std::path::Path,
    mode: ExecutionMode,
    disassemble: bool,
) -> Result<Value, MarmotError> {
    let source = std::fs::read_to_string(path)?;
    run_with_options(&source, mode, disassemble)
}

/// Run a Marmot program with full control over execution options.
pub fn run_with_options(
    source: &str,
    mode: ExecutionMode,
    disassemble: bool,
) -> Result<Value, MarmotError> {
    let program = parse(source)?;

    match mode {
        ExecutionMode::TreeWalk => {
            let mut interpreter = interpreter::Interpreter::new();
            Ok(interpreter.interpret(&program)?)
        }
        ExecutionMode::Bytecode => {
            let mut compiler = bytecode::Compiler::new();
            compiler.compile(&program)?;
            let code = compiler.bytecode();

            if disassemble {
                bytecode::print_disassembly(&code);
                println!("---");
            }

            let mut vm = bytecode::Vm::new(code);
            vm.run()?;
            Ok(vm.last_popped_stack_element())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    /// Both engines must agree on the value of an expression.
    #[test]
    fn test_engines_agree() {
        let sources = [
            "1 + 2",
            "if (1 > 2) { 10 } else { 20 }",
            "let one = 1; let two = one + one; one + two",
            r#""mon" + "key""#,
            "let a = fn(x) { x }; a(4)",
            "let fib = fn(x) { if (x == 0) { 0 } else { if (x == 1) { 1 } else { fib(x - 1) + fib(x - 2) } } }; fib(10)",
            "[1, 2 * 2][1]",
            "{1: 2, 2: 3}[1]",
            "{}[0]",
            "!(if (false) { 5; })",
            "let newAdder = fn(a) { fn(b) { a + b } }; newAdder(1)(2)",
            "len([1, 2, 3])",
            "rest([1, 2, 3])",
        ];

        for source in sources {
            let vm_result = run_with_options(source, ExecutionMode::Bytecode, false)
                .unwrap_or_else(|err| panic!("vm failed on {:?}: {}", source, err));
            let eval_result = run_with_options(source, ExecutionMode::TreeWalk, false)
                .unwrap_or_else(|err| panic!("interpreter failed on {:?}: {}", source, err));
            assert_eq!(vm_result, eval_result, "engines disagree on {}", source);
        }
    }

    #[test]
    fn test_end_to_end_scenarios() {
        assert_eq!(run("1 + 2").unwrap(), Value::Integer(3));
        assert_eq!(
            run("if (1 > 2) { 10 } else { 20 }").unwrap(),
            Value::Integer(20)
        );
        assert_eq!(
            run(r#""mon" + "key""#).unwrap().inspect(),
            "monkey"
        );
        assert_eq!(
            run("len([1, 2, 3])").unwrap(),
            Value::Integer(3)
        );
    }

    #[test]
    fn test_compile_surface() {
        let bytecode = compile("1 + 2").unwrap();
        assert_eq!(bytecode.constants.len(), 2);
        assert!(!bytecode.instructions.is_empty());
    }

    #[test]
    fn test_parse_error_surfaces_before_compilation() {
        assert!(run("let = 5;").is_err());
    }
}
