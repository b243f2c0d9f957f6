//! Bytecode compiler: transforms AST into instructions and a constant pool.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{BlockStatement, Expr, FunctionLiteral, InfixOp, PrefixOp, Program, Stmt};
use crate::bytecode::instruction::{make, Instructions, OpCode};
use crate::bytecode::symbol_table::{Symbol, SymbolScope, SymbolTable};
use crate::error::CompileError;
use crate::value::builtins::BUILTINS;
use crate::value::{CompiledFunction, Value};

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Placeholder operand for jumps that are back-patched once the target
/// position is known.
const PLACEHOLDER_TARGET: usize = 9999;

/// The compiler's output: the main instruction stream plus the constant pool.
/// Constant-pool indices are stable; the VM sees exactly these indices.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

/// The opcode and starting offset of an emitted instruction.
#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: OpCode,
    position: usize,
}

/// Per-function compilation state. The compiler keeps a stack of these;
/// index 0 is the main program.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

/// The bytecode compiler.
pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: Rc<RefCell<SymbolTable>>,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    /// Create a compiler with one (main) scope and a global symbol table
    /// populated with the built-in registry.
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }

        Self {
            constants: Vec::new(),
            symbol_table: Rc::new(RefCell::new(symbol_table)),
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Resume an existing global state (for REPLs).
    pub fn new_with_state(symbol_table: Rc<RefCell<SymbolTable>>, constants: Vec<Value>) -> Self {
        let mut compiler = Self::new();
        compiler.symbol_table = symbol_table;
        compiler.constants = constants;
        compiler
    }

    /// Compile a program into the current scope.
    pub fn compile(&mut self, program: &Program) -> CompileResult<()> {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    /// The current scope's instructions and the constant pool.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.current_scope().instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    fn compile_statement(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(OpCode::Pop, &[]);
            }

            Stmt::Let { name, value } => {
                // Define before compiling the value, so a function literal
                // being bound can resolve its own name.
                let symbol = self.symbol_table.borrow_mut().define(name);
                self.compile_expression(value)?;

                if symbol.scope == SymbolScope::Global {
                    self.emit(OpCode::SetGlobal, &[symbol.index]);
                } else {
                    self.emit(OpCode::SetLocal, &[symbol.index]);
                }
            }

            Stmt::Return(value) => {
                self.compile_expression(value)?;
                self.emit(OpCode::ReturnValue, &[]);
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &BlockStatement) -> CompileResult<()> {
        for stmt in &block.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_expression(&mut self, expr: &Expr) -> CompileResult<()> {
        match expr {
            Expr::IntegerLiteral(value) => {
                let index = self.add_constant(Value::Integer(*value));
                self.emit(OpCode::Constant, &[index]);
            }

            Expr::StringLiteral(value) => {
                let index = self.add_constant(Value::String(Rc::new(value.clone())));
                self.emit(OpCode::Constant, &[index]);
            }

            Expr::Boolean(true) => {
                self.emit(OpCode::True, &[]);
            }
            Expr::Boolean(false) => {
                self.emit(OpCode::False, &[]);
            }

            Expr::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator {
                    PrefixOp::Minus => self.emit(OpCode::Minus, &[]),
                    PrefixOp::Bang => self.emit(OpCode::Bang, &[]),
                };
            }

            Expr::Infix {
                operator,
                left,
                right,
            } => {
                // `<` compiles right-then-left so one comparison opcode
                // suffices.
                if *operator == InfixOp::Less {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(OpCode::GreaterThan, &[]);
                    return Ok(());
                }

                self.compile_expression(left)?;
                self.compile_expression(right)?;
                match operator {
                    InfixOp::Add => self.emit(OpCode::Add, &[]),
                    InfixOp::Sub => self.emit(OpCode::Sub, &[]),
                    InfixOp::Mul => self.emit(OpCode::Mul, &[]),
                    InfixOp::Div => self.emit(OpCode::Div, &[]),
                    InfixOp::Greater => self.emit(OpCode::GreaterThan, &[]),
                    InfixOp::Equal => self.emit(OpCode::Equal, &[]),
                    InfixOp::NotEqual => self.emit(OpCode::NotEqual, &[]),
                    InfixOp::Less => unreachable!("handled above"),
                };
            }

            Expr::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expression(condition)?;

                let jump_not_truthy_pos =
                    self.emit(OpCode::JumpNotTruthy, &[PLACEHOLDER_TARGET]);

                self.compile_block(consequence)?;
                if self.last_instruction_is(OpCode::Pop) {
                    self.remove_last_pop();
                }

                let jump_pos = self.emit(OpCode::Jump, &[PLACEHOLDER_TARGET]);

                let after_consequence = self.current_scope().instructions.len();
                self.change_operand(jump_not_truthy_pos, after_consequence);

                match alternative {
                    None => {
                        self.emit(OpCode::Null, &[]);
                    }
                    Some(alt) => {
                        self.compile_block(alt)?;
                        if self.last_instruction_is(OpCode::Pop) {
                            self.remove_last_pop();
                        }
                    }
                }

                let after_alternative = self.current_scope().instructions.len();
                self.change_operand(jump_pos, after_alternative);
            }

            Expr::Identifier(name) => {
                let resolved = self.symbol_table.borrow_mut().resolve(name);
                let symbol =
                    resolved.ok_or_else(|| CompileError::UndefinedVariable(name.clone()))?;
                self.load_symbol(&symbol);
            }

            Expr::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(OpCode::Array, &[elements.len()]);
            }

            Expr::Hash(pairs) => {
                // Sort keys by their textual form so emission order is
                // deterministic.
                let mut sorted: Vec<&(Expr, Expr)> = pairs.iter().collect();
                sorted.sort_by_key(|(key, _)| key.to_string());

                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(OpCode::Hash, &[pairs.len() * 2]);
            }

            Expr::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(OpCode::Index, &[]);
            }

            Expr::Function(func) => {
                self.compile_function_literal(func)?;
            }

            Expr::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(OpCode::Call, &[arguments.len()]);
            }
        }
        Ok(())
    }

    fn compile_function_literal(&mut self, func: &FunctionLiteral) -> CompileResult<()> {
        self.enter_scope();

        if !func.name.is_empty() {
            self.symbol_table.borrow_mut().define_function_name(&func.name);
        }
        for parameter in &func.parameters {
            self.symbol_table.borrow_mut().define(parameter);
        }

        self.compile_block(&func.body)?;

        // The body's value-producing tail becomes the return value; a body
        // that ends without one returns Null.
        if self.last_instruction_is(OpCode::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(OpCode::ReturnValue) {
            self.emit(OpCode::Return, &[]);
        }

        // Snapshot before leaving: the frees and local count belong to the
        // scope being closed.
        let (free_symbols, num_locals) = {
            let table = self.symbol_table.borrow();
            (table.free_symbols.clone(), table.num_definitions)
        };
        let instructions = self.leave_scope();

        // Load each captured value in the enclosing scope, using the
        // original symbol so the correct load opcode is emitted.
        for symbol in &free_symbols {
            self.load_symbol(symbol);
        }

        let function = Value::CompiledFunction(Rc::new(CompiledFunction {
            instructions,
            num_locals,
            num_parameters: func.parameters.len(),
        }));
        let const_index = self.add_constant(function);
        self.emit(OpCode::Closure, &[const_index, free_symbols.len()]);
        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(OpCode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(OpCode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(OpCode::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(OpCode::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(OpCode::CurrentClosure, &[]),
        };
    }

    // ===== Emission plumbing =====

    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    fn emit(&mut self, op: OpCode, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let position = self.add_instruction(&instruction);
        self.set_last_instruction(op, position);
        position
    }

    fn add_instruction(&mut self, instruction: &[u8]) -> usize {
        let scope = self.current_scope_mut();
        let position = scope.instructions.len();
        scope.instructions.extend_from_slice(instruction);
        position
    }

    fn set_last_instruction(&mut self, opcode: OpCode, position: usize) {
        let scope = self.current_scope_mut();
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode, position });
    }

    fn last_instruction_is(&self, op: OpCode) -> bool {
        self.current_scope()
            .last_instruction
            .map(|instruction| instruction.opcode)
            == Some(op)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.current_scope_mut();
        if let Some(last) = scope.last_instruction {
            scope.instructions.truncate(last.position);
            scope.last_instruction = scope.previous_instruction;
        }
    }

    /// Overwrite bytes in place starting at `position`.
    fn replace_instruction(&mut self, position: usize, new_instruction: &[u8]) {
        let instructions = &mut self.current_scope_mut().instructions;
        instructions[position..position + new_instruction.len()]
            .copy_from_slice(new_instruction);
    }

    /// Re-encode the instruction at `position` with a new operand. Used for
    /// back-patching jump targets.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let op = OpCode::from_u8(self.current_scope().instructions[position])
            .expect("patch position holds an opcode");
        let new_instruction = make(op, &[operand]);
        self.replace_instruction(position, &new_instruction);
    }

    fn replace_last_pop_with_return(&mut self) {
        if let Some(last) = self.current_scope().last_instruction {
            self.replace_instruction(last.position, &make(OpCode::ReturnValue, &[]));
            self.current_scope_mut().last_instruction = Some(EmittedInstruction {
                opcode: OpCode::ReturnValue,
                position: last.position,
            });
        }
    }

    // ===== Scope management =====

    fn current_scope(&self) -> &CompilationScope {
        self.scopes.last().expect("scope stack is never empty")
    }

    fn current_scope_mut(&mut self) -> &mut CompilationScope {
        self.scopes.last_mut().expect("scope stack is never empty")
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let outer = Rc::clone(&self.symbol_table);
        self.symbol_table = Rc::new(RefCell::new(SymbolTable::new_enclosed(outer)));
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("scope stack is never empty");
        let outer = self
            .symbol_table
            .borrow()
            .outer()
            .expect("function scopes always have an enclosing table");
        self.symbol_table = outer;
        scope.instructions
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
