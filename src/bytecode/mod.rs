//! Bytecode module for the Marmot VM.
//!
//! This module turns a parsed program into a linear instruction stream plus
//! a constant pool, and executes it on a stack machine:
//!
//! - `instruction`: opcode definitions and the binary operand encoding
//! - `symbol_table`: lexical name resolution with closure capture
//! - `compiler`: transforms AST into bytecode
//! - `vm`: stack-based virtual machine
//! - `disassembler`: debug output for bytecode inspection

pub mod compiler;
pub mod disassembler;
pub mod instruction;
pub mod symbol_table;
pub mod vm;

pub use compiler::{Bytecode, Compiler};
pub use disassembler::{disassemble, disassemble_bytecode, print_disassembly};
pub use instruction::{Instructions, OpCode};
pub use symbol_table::{Symbol, SymbolScope, SymbolTable};
pub use vm::{new_globals, Vm, GLOBALS_SIZE, MAX_FRAMES, STACK_SIZE};
