//! Interactive REPL with persistent session state.
//!
//! The symbol table, constant pool, and globals array survive across input
//! lines, so definitions from earlier lines stay visible.

use std::cell::RefCell;
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;

use colored::Colorize;

use crate::bytecode::symbol_table::SymbolTable;
use crate::bytecode::vm::new_globals;
use crate::bytecode::{Compiler, Vm};
use crate::lexer::Scanner;
use crate::parser::Parser;
use crate::value::builtins::BUILTINS;
use crate::value::Value;

const PROMPT: &str = ">> ";
const HISTORY_FILE: &str = ".marmot_history";

/// The interactive shell.
pub struct Repl {
    symbol_table: Rc<RefCell<SymbolTable>>,
    constants: Vec<Value>,
    globals: Rc<RefCell<Vec<Value>>>,
    history: Vec<String>,
    history_file: PathBuf,
}

impl Repl {
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }

        let mut repl = Self {
            symbol_table: Rc::new(RefCell::new(symbol_table)),
            constants: Vec::new(),
            globals: new_globals(),
            history: Vec::new(),
            history_file: history_path(),
        };
        repl.load_history();
        repl
    }

    pub fn run(&mut self) {
        println!("Marmot {}", env!("CARGO_PKG_VERSION"));
        println!("Type exit to leave.\n");

        let stdin = io::stdin();

        loop {
            print!("{}", PROMPT);
            let _ = io::stdout().flush();

            let mut line = String::new();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == "exit" || line == "quit" {
                break;
            }

            self.history.push(line.to_string());
            self.eval_line(line);
        }

        self.save_history();
        println!("Goodbye!");
    }

    fn eval_line(&mut self, line: &str) {
        let tokens = match Scanner::new(line).scan_tokens() {
            Ok(tokens) => tokens,
            Err(err) => {
                eprintln!("{} {}", "lexer error:".red(), err);
                return;
            }
        };

        let program = match Parser::new(tokens).parse() {
            Ok(program) => program,
            Err(err) => {
                eprintln!("{} {}", "parser error:".red(), err);
                return;
            }
        };

        let mut compiler = Compiler::new_with_state(
            Rc::clone(&self.symbol_table),
            std::mem::take(&mut self.constants),
        );

        if let Err(err) = compiler.compile(&program) {
            // Keep whatever was appended to the pool; indices stay stable.
            self.constants = compiler.bytecode().constants;
            eprintln!("{} {}", "compile error:".red(), err);
            return;
        }

        let bytecode = compiler.bytecode();
        self.constants = bytecode.constants.clone();

        let mut vm = Vm::new_with_global_store(bytecode, Rc::clone(&self.globals));
        if let Err(err) = vm.run() {
            eprintln!("{} {}", "runtime error:".red(), err);
            return;
        }

        println!("{}", vm.last_popped_stack_element());
    }

    fn load_history(&mut self) {
        if let Ok(content) = std::fs::read_to_string(&self.history_file) {
            for line in content.lines() {
                if !line.trim().is_empty() {
                    self.history.push(line.to_string());
                }
            }
        }
    }

    fn save_history(&self) {
        let _ = std::fs::write(&self.history_file, self.history.join("\n"));
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}

fn history_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(HISTORY_FILE),
        None => PathBuf::from(HISTORY_FILE),
    }
}
