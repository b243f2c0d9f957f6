//! Stack-based virtual machine for executing bytecode.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::compiler::Bytecode;
use crate::bytecode::instruction::{read_u16, Instructions, OpCode};
use crate::error::RuntimeError;
use crate::value::builtins::{BuiltinDef, BUILTINS};
use crate::value::{singleton_eq, Closure, CompiledFunction, HashPair, Value, FALSE, NULL, TRUE};

/// Maximum operand stack depth.
pub const STACK_SIZE: usize = 2048;
/// Number of globals slots.
pub const GLOBALS_SIZE: usize = 65536;
/// Maximum call-frame depth.
pub const MAX_FRAMES: usize = 1024;

/// Result type for VM operations.
pub type VmResult<T> = Result<T, RuntimeError>;

/// A fresh globals array, for sharing across VM instances (REPL sessions).
pub fn new_globals() -> Rc<RefCell<Vec<Value>>> {
    Rc::new(RefCell::new(vec![NULL; GLOBALS_SIZE]))
}

/// An activation record: the executing closure, its instruction cursor, and
/// the operand-stack offset where its locals begin.
#[derive(Debug)]
struct Frame {
    closure: Rc<Closure>,
    ip: usize,
    base_pointer: usize,
}

impl Frame {
    fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Self {
            closure,
            ip: 0,
            base_pointer,
        }
    }

    fn instructions(&self) -> &Instructions {
        &self.closure.function.instructions
    }
}

/// The virtual machine: a fetch-decode-dispatch loop over an operand stack,
/// a globals array, and a call-frame stack.
pub struct Vm {
    constants: Vec<Value>,
    /// Pre-allocated; slots above `sp` are stale but deliberately not erased
    /// so `last_popped_stack_element` can inspect them.
    stack: Vec<Value>,
    /// Points at the next free slot; top of stack is `sp - 1`.
    sp: usize,
    globals: Rc<RefCell<Vec<Value>>>,
    frames: Vec<Frame>,
}

impl Vm {
    /// Wrap bytecode for execution: the top-level instructions become a
    /// synthetic main closure installed as frame 0.
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_globals(bytecode, new_globals())
    }

    /// Like [`Vm::new`] but reusing an externally owned globals array, so a
    /// REPL can persist globals across compile/run cycles.
    pub fn new_with_global_store(bytecode: Bytecode, globals: Rc<RefCell<Vec<Value>>>) -> Self {
        Self::with_globals(bytecode, globals)
    }

    fn with_globals(bytecode: Bytecode, globals: Rc<RefCell<Vec<Value>>>) -> Self {
        let main_function = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let main_closure = Rc::new(Closure {
            function: main_function,
            free: Vec::new(),
        });

        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(main_closure, 0));

        Self {
            constants: bytecode.constants,
            stack: vec![NULL; STACK_SIZE],
            sp: 0,
            globals,
            frames,
        }
    }

    /// The slot one above the stack pointer: the value most recently popped.
    /// The REPL and tests use this to observe the final expression's value.
    pub fn last_popped_stack_element(&self) -> Value {
        self.stack[self.sp].clone()
    }

    /// Execute to completion or error.
    pub fn run(&mut self) -> VmResult<()> {
        while self.current_frame().ip < self.current_frame().instructions().len() {
            let byte = self.read_u8();
            let op = OpCode::from_u8(byte).ok_or(RuntimeError::UnknownOpcode(byte))?;

            match op {
                OpCode::Constant => {
                    let index = self.read_u16() as usize;
                    let constant = self.constants[index].clone();
                    self.push(constant)?;
                }

                OpCode::Pop => {
                    self.pop();
                }

                OpCode::Null => self.push(NULL)?,
                OpCode::True => self.push(TRUE)?,
                OpCode::False => self.push(FALSE)?,

                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => {
                    self.execute_binary_operation(op)?;
                }

                OpCode::Equal | OpCode::NotEqual | OpCode::GreaterThan => {
                    self.execute_comparison(op)?;
                }

                OpCode::Bang => self.execute_bang_operator()?,
                OpCode::Minus => self.execute_minus_operator()?,

                OpCode::Jump => {
                    let target = self.read_u16() as usize;
                    self.current_frame_mut().ip = target;
                }

                OpCode::JumpNotTruthy => {
                    let target = self.read_u16() as usize;
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target;
                    }
                }

                OpCode::SetGlobal => {
                    let index = self.read_u16() as usize;
                    let value = self.pop();
                    self.globals.borrow_mut()[index] = value;
                }

                OpCode::GetGlobal => {
                    let index = self.read_u16() as usize;
                    let value = self.globals.borrow()[index].clone();
                    self.push(value)?;
                }

                OpCode::SetLocal => {
                    let slot = self.read_u8() as usize;
                    let base = self.current_frame().base_pointer;
                    let value = self.pop();
                    self.stack[base + slot] = value;
                }

                OpCode::GetLocal => {
                    let slot = self.read_u8() as usize;
                    let base = self.current_frame().base_pointer;
                    let value = self.stack[base + slot].clone();
                    self.push(value)?;
                }

                OpCode::GetBuiltin => {
                    let index = self.read_u8() as usize;
                    self.push(Value::Builtin(&BUILTINS[index]))?;
                }

                OpCode::GetFree => {
                    let index = self.read_u8() as usize;
                    let value = self.current_frame().closure.free[index].clone();
                    self.push(value)?;
                }

                OpCode::CurrentClosure => {
                    let closure = Rc::clone(&self.current_frame().closure);
                    self.push(Value::Closure(closure))?;
                }

                OpCode::Array => {
                    let count = self.read_u16() as usize;
                    let elements = self.stack[self.sp - count..self.sp].to_vec();
                    self.sp -= count;
                    self.push(Value::Array(Rc::new(elements)))?;
                }

                OpCode::Hash => {
                    let count = self.read_u16() as usize;
                    let hash = self.build_hash(self.sp - count, self.sp)?;
                    self.sp -= count;
                    self.push(hash)?;
                }

                OpCode::Index => {
                    let index = self.pop();
                    let left = self.pop();
                    self.execute_index_expression(left, index)?;
                }

                OpCode::Call => {
                    let argc = self.read_u8() as usize;
                    self.execute_call(argc)?;
                }

                OpCode::ReturnValue => {
                    let return_value = self.pop();
                    if self.return_from_frame(return_value)? {
                        return Ok(());
                    }
                }

                OpCode::Return => {
                    if self.return_from_frame(NULL)? {
                        return Ok(());
                    }
                }

                OpCode::Closure => {
                    let const_index = self.read_u16() as usize;
                    let free_count = self.read_u8() as usize;
                    self.push_closure(const_index, free_count)?;
                }
            }
        }

        Ok(())
    }

    /// Pop the current frame, restore the caller's stack pointer (discarding
    /// the callee slot), and push the return value. Returns true when the
    /// popped frame was the main frame (a top-level `return`), which ends
    /// execution with the value still visible to the last-popped peek.
    fn return_from_frame(&mut self, return_value: Value) -> VmResult<bool> {
        let frame = self.pop_frame();

        if self.frames.is_empty() {
            self.stack[frame.base_pointer] = return_value;
            self.sp = frame.base_pointer;
            return Ok(true);
        }

        self.sp = frame.base_pointer - 1;
        self.push(return_value)?;
        Ok(false)
    }

    // ===== Operators =====

    fn execute_binary_operation(&mut self, op: OpCode) -> VmResult<()> {
        let right = self.pop();
        let left = self.pop();

        match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => {
                self.execute_binary_integer_operation(op, *l, *r)
            }
            (Value::String(l), Value::String(r)) if op == OpCode::Add => {
                let mut result = String::with_capacity(l.len() + r.len());
                result.push_str(l);
                result.push_str(r);
                self.push(Value::String(Rc::new(result)))
            }
            _ => Err(RuntimeError::UnsupportedBinaryTypes(
                left.type_tag(),
                right.type_tag(),
            )),
        }
    }

    fn execute_binary_integer_operation(
        &mut self,
        op: OpCode,
        left: i64,
        right: i64,
    ) -> VmResult<()> {
        let result = match op {
            OpCode::Add => left + right,
            OpCode::Sub => left - right,
            OpCode::Mul => left * right,
            _ => {
                if right == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                left / right
            }
        };
        self.push(Value::Integer(result))
    }

    fn execute_comparison(&mut self, op: OpCode) -> VmResult<()> {
        let right = self.pop();
        let left = self.pop();

        if let (Value::Integer(l), Value::Integer(r)) = (&left, &right) {
            let result = match op {
                OpCode::Equal => l == r,
                OpCode::NotEqual => l != r,
                _ => l > r,
            };
            return self.push(native_bool_to_boolean(result));
        }

        match op {
            OpCode::Equal => self.push(native_bool_to_boolean(singleton_eq(&left, &right))),
            OpCode::NotEqual => self.push(native_bool_to_boolean(!singleton_eq(&left, &right))),
            _ => Err(RuntimeError::UnsupportedBinaryTypes(
                left.type_tag(),
                right.type_tag(),
            )),
        }
    }

    fn execute_bang_operator(&mut self) -> VmResult<()> {
        let operand = self.pop();
        let result = match operand {
            Value::Boolean(b) => native_bool_to_boolean(!b),
            Value::Null => TRUE,
            _ => FALSE,
        };
        self.push(result)
    }

    fn execute_minus_operator(&mut self) -> VmResult<()> {
        let operand = self.pop();
        match operand {
            Value::Integer(n) => self.push(Value::Integer(-n)),
            other => Err(RuntimeError::UnsupportedNegation(other.type_tag())),
        }
    }

    // ===== Collections =====

    fn build_hash(&self, start: usize, end: usize) -> VmResult<Value> {
        let mut pairs = IndexMap::new();

        let mut i = start;
        while i < end {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();

            let hash_key = key
                .hash_key()
                .ok_or_else(|| RuntimeError::UnusableHashKey(key.type_tag()))?;
            pairs.insert(hash_key, HashPair { key, value });
            i += 2;
        }

        Ok(Value::Hash(Rc::new(pairs)))
    }

    fn execute_index_expression(&mut self, left: Value, index: Value) -> VmResult<()> {
        match (&left, &index) {
            (Value::Array(elements), Value::Integer(i)) => {
                let value = if *i < 0 || *i as usize >= elements.len() {
                    NULL
                } else {
                    elements[*i as usize].clone()
                };
                self.push(value)
            }
            (Value::Hash(pairs), _) => {
                let key = index
                    .hash_key()
                    .ok_or_else(|| RuntimeError::UnusableHashKey(index.type_tag()))?;
                let value = pairs
                    .get(&key)
                    .map(|pair| pair.value.clone())
                    .unwrap_or(NULL);
                self.push(value)
            }
            _ => Err(RuntimeError::IndexNotSupported(left.type_tag())),
        }
    }

    // ===== Calls =====

    fn execute_call(&mut self, argc: usize) -> VmResult<()> {
        let callee = self.stack[self.sp - 1 - argc].clone();
        match callee {
            Value::Closure(closure) => self.call_closure(closure, argc),
            Value::Builtin(builtin) => self.call_builtin(builtin, argc),
            _ => Err(RuntimeError::CallingNonFunction),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, argc: usize) -> VmResult<()> {
        if argc != closure.function.num_parameters {
            return Err(RuntimeError::WrongArity {
                want: closure.function.num_parameters,
                got: argc,
            });
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError::StackOverflow);
        }

        // The arguments already sit above the callee; locals get the slots
        // above them.
        let base_pointer = self.sp - argc;
        let new_sp = base_pointer + closure.function.num_locals;
        if new_sp > STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }

        self.frames.push(Frame::new(closure, base_pointer));
        self.sp = new_sp;
        Ok(())
    }

    fn call_builtin(&mut self, builtin: &'static BuiltinDef, argc: usize) -> VmResult<()> {
        let args = self.stack[self.sp - argc..self.sp].to_vec();
        let result = (builtin.func)(&args);

        self.sp -= argc + 1;
        self.push(result.unwrap_or(NULL))
    }

    fn push_closure(&mut self, const_index: usize, free_count: usize) -> VmResult<()> {
        let Value::CompiledFunction(function) = self.constants[const_index].clone() else {
            return Err(RuntimeError::CallingNonFunction);
        };

        let free = self.stack[self.sp - free_count..self.sp].to_vec();
        self.sp -= free_count;

        self.push(Value::Closure(Rc::new(Closure { function, free })))
    }

    // ===== Stack & frame plumbing =====

    fn push(&mut self, value: Value) -> VmResult<()> {
        if self.sp >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    /// The popped slot is left intact; see `last_popped_stack_element`.
    fn pop(&mut self) -> Value {
        self.sp -= 1;
        self.stack[self.sp].clone()
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack is never empty")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack is never empty")
    }

    fn pop_frame(&mut self) -> Frame {
        self.frames.pop().expect("frame stack is never empty")
    }

    fn read_u8(&mut self) -> u8 {
        let frame = self.current_frame_mut();
        let byte = frame.closure.function.instructions[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let frame = self.current_frame_mut();
        let value = read_u16(&frame.closure.function.instructions[frame.ip..]);
        frame.ip += 2;
        value
    }
}

fn native_bool_to_boolean(value: bool) -> Value {
    if value {
        TRUE
    } else {
        FALSE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compiler::Compiler;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn run_vm(source: &str) -> Result<Vm, RuntimeError> {
        let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
        let program = Parser::new(tokens).parse().expect("parser error");
        let mut compiler = Compiler::new();
        compiler.compile(&program).expect("compile error");

        let mut vm = Vm::new(compiler.bytecode());
        vm.run()?;
        Ok(vm)
    }

    fn run_source(source: &str) -> Result<Value, RuntimeError> {
        Ok(run_vm(source)?.last_popped_stack_element())
    }

    fn assert_runs(source: &str, expected: Value) {
        let result = run_source(source)
            .unwrap_or_else(|err| panic!("runtime error for {:?}: {}", source, err));
        assert_eq!(result, expected, "source: {}", source);
    }

    fn assert_error(source: &str, expected_message: &str) {
        let err = run_source(source)
            .expect_err(&format!("expected runtime error for {:?}", source));
        assert_eq!(err.to_string(), expected_message, "source: {}", source);
    }

    fn int(n: i64) -> Value {
        Value::Integer(n)
    }

    fn string(s: &str) -> Value {
        Value::String(Rc::new(s.to_string()))
    }

    fn array(elements: Vec<Value>) -> Value {
        Value::Array(Rc::new(elements))
    }

    fn hash(pairs: Vec<(Value, Value)>) -> Value {
        let mut map = IndexMap::new();
        for (key, value) in pairs {
            let hash_key = key.hash_key().expect("hashable key");
            map.insert(hash_key, HashPair { key, value });
        }
        Value::Hash(Rc::new(map))
    }

    #[test]
    fn test_integer_arithmetic() {
        let cases = [
            ("1", 1),
            ("2", 2),
            ("1 + 2", 3),
            ("1 - 2", -1),
            ("1 * 2", 2),
            ("4 / 2", 2),
            ("50 / 2 * 2 + 10 - 5", 55),
            ("5 * (2 + 10)", 60),
            ("-5", -5),
            ("-50 + 100 + -50", 0),
            ("(5 + 10 * 2 + 15 / 3) * 2 + -10", 50),
        ];
        for (source, expected) in cases {
            assert_runs(source, int(expected));
        }
    }

    #[test]
    fn test_boolean_expressions() {
        let cases = [
            ("true", true),
            ("false", false),
            ("1 < 2", true),
            ("1 > 2", false),
            ("1 == 1", true),
            ("1 != 1", false),
            ("true == true", true),
            ("false == false", true),
            ("true != false", true),
            ("(1 < 2) == true", true),
            ("(1 > 2) == false", true),
            ("!true", false),
            ("!5", false),
            ("!!true", true),
            ("!!5", true),
            ("!(if (false) { 5; })", true),
        ];
        for (source, expected) in cases {
            assert_runs(source, Value::Boolean(expected));
        }
    }

    #[test]
    fn test_conditionals() {
        assert_runs("if (true) { 10 }", int(10));
        assert_runs("if (true) { 10 } else { 20 }", int(10));
        assert_runs("if (false) { 10 } else { 20 }", int(20));
        // Integer zero is truthy; only false and null are falsy.
        assert_runs("if (1) { 10 }", int(10));
        assert_runs("if (0) { 10 } else { 20 }", int(10));
        assert_runs("if (1 > 2) { 10 } else { 20 }", int(20));
        assert_runs("if (1 > 2) { 10 }", NULL);
        assert_runs("if (false) { 10 }", NULL);
        assert_runs("if ((if (false) { 10 })) { 10 } else { 20 }", int(20));
    }

    #[test]
    fn test_global_let_statements() {
        assert_runs("let one = 1; one", int(1));
        assert_runs("let one = 1; let two = 2; one + two", int(3));
        assert_runs("let one = 1; let two = one + one; one + two", int(3));
    }

    #[test]
    fn test_string_expressions() {
        assert_runs(r#""monkey""#, string("monkey"));
        assert_runs(r#""mon" + "key""#, string("monkey"));
        assert_runs(r#""mon" + "key" + "banana""#, string("monkeybanana"));
    }

    #[test]
    fn test_array_literals() {
        assert_runs("[]", array(vec![]));
        assert_runs("[1, 2, 3]", array(vec![int(1), int(2), int(3)]));
        assert_runs(
            "[1 + 2, 3 * 4, 5 + 6]",
            array(vec![int(3), int(12), int(11)]),
        );
    }

    #[test]
    fn test_hash_literals() {
        assert_runs("{}", hash(vec![]));
        assert_runs(
            "{1: 2, 2: 3}",
            hash(vec![(int(1), int(2)), (int(2), int(3))]),
        );
        assert_runs(
            "{1 + 1: 2 * 2, 3 + 3: 4 * 4}",
            hash(vec![(int(2), int(4)), (int(6), int(16))]),
        );
    }

    #[test]
    fn test_index_expressions() {
        assert_runs("[1, 2, 3][1]", int(2));
        assert_runs("[1, 2, 3][0 + 2]", int(3));
        assert_runs("[[1, 1, 1]][0][0]", int(1));
        assert_runs("[][0]", NULL);
        assert_runs("[1, 2, 3][99]", NULL);
        assert_runs("[1][-1]", NULL);
        assert_runs("{1: 1, 2: 2}[1]", int(1));
        assert_runs("{1: 1, 2: 2}[2]", int(2));
        assert_runs("{1: 1}[0]", NULL);
        assert_runs("{}[0]", NULL);
        assert_runs(r#"{"one": 1, "two": 2}["two"]"#, int(2));
        assert_runs("{true: 5}[true]", int(5));
    }

    #[test]
    fn test_calling_functions_without_arguments() {
        assert_runs("let fivePlusTen = fn() { 5 + 10; }; fivePlusTen();", int(15));
        assert_runs(
            "let one = fn() { 1; }; let two = fn() { 2; }; one() + two()",
            int(3),
        );
        assert_runs(
            "let a = fn() { 1 }; let b = fn() { a() + 1 }; let c = fn() { b() + 1 }; c();",
            int(3),
        );
    }

    #[test]
    fn test_functions_with_return_statements() {
        assert_runs("let earlyExit = fn() { return 99; 100; }; earlyExit();", int(99));
        assert_runs("let earlyExit = fn() { return 99; return 100; }; earlyExit();", int(99));
    }

    #[test]
    fn test_functions_without_return_value() {
        assert_runs("let noReturn = fn() { }; noReturn();", NULL);
        assert_runs(
            "let noReturn = fn() { }; let noReturnTwo = fn() { noReturn(); }; noReturn(); noReturnTwo();",
            NULL,
        );
    }

    #[test]
    fn test_first_class_functions() {
        assert_runs(
            "let returnsOne = fn() { 1; }; let returnsOneReturner = fn() { returnsOne; }; returnsOneReturner()();",
            int(1),
        );
    }

    #[test]
    fn test_calling_functions_with_bindings() {
        assert_runs("let one = fn() { let one = 1; one }; one();", int(1));
        assert_runs(
            "let oneAndTwo = fn() { let one = 1; let two = 2; one + two; }; oneAndTwo();",
            int(3),
        );
        assert_runs(
            "let oneAndTwo = fn() { let one = 1; let two = 2; one + two; };
             let threeAndFour = fn() { let three = 3; let four = 4; three + four; };
             oneAndTwo() + threeAndFour();",
            int(10),
        );
        assert_runs(
            "let firstFoobar = fn() { let foobar = 50; foobar; };
             let secondFoobar = fn() { let foobar = 100; foobar; };
             firstFoobar() + secondFoobar();",
            int(150),
        );
        assert_runs(
            "let globalSeed = 50;
             let minusOne = fn() { let num = 1; globalSeed - num; };
             let minusTwo = fn() { let num = 2; globalSeed - num; };
             minusOne() + minusTwo();",
            int(97),
        );
    }

    #[test]
    fn test_calling_functions_with_arguments() {
        assert_runs("let identity = fn(a) { a; }; identity(4);", int(4));
        assert_runs("let sum = fn(a, b) { a + b; }; sum(1, 2);", int(3));
        assert_runs(
            "let sum = fn(a, b) { let c = a + b; c; }; sum(1, 2) + sum(3, 4);",
            int(10),
        );
        assert_runs(
            "let sum = fn(a, b) { let c = a + b; c; }; let outer = fn() { sum(1, 2) + sum(3, 4); }; outer();",
            int(10),
        );
        assert_runs(
            "let globalNum = 10;
             let sum = fn(a, b) { let c = a + b; c + globalNum; };
             let outer = fn() { sum(1, 2) + sum(3, 4) + globalNum; };
             outer() + globalNum;",
            int(50),
        );
    }

    #[test]
    fn test_calling_functions_with_wrong_arguments() {
        assert_error("fn() { 1; }(1);", "wrong number of arguments: want=0, got=1");
        assert_error("fn(a) { a; }();", "wrong number of arguments: want=1, got=0");
        assert_error(
            "fn(a, b) { a + b; }(1);",
            "wrong number of arguments: want=2, got=1",
        );
    }

    #[test]
    fn test_builtin_functions() {
        assert_runs(r#"len("")"#, int(0));
        assert_runs(r#"len("four")"#, int(4));
        assert_runs(r#"len("hello world")"#, int(11));
        assert_runs("len([1, 2, 3])", int(3));
        assert_runs("len([])", int(0));
        assert_runs(r#"puts("hello", "world!")"#, NULL);
        assert_runs("first([1, 2, 3])", int(1));
        assert_runs("first([])", NULL);
        assert_runs("last([1, 2, 3])", int(3));
        assert_runs("last([])", NULL);
        assert_runs("rest([1, 2, 3])", array(vec![int(2), int(3)]));
        assert_runs("rest([])", NULL);
        assert_runs("push([], 1)", array(vec![int(1)]));

        // Errors from built-ins are values, not control flow.
        assert_runs(
            "len(1)",
            Value::Error("argument to len not supported, got INTEGER".to_string()),
        );
        assert_runs(
            r#"len("one", "two")"#,
            Value::Error("wrong number of arguments. got=2, want=1".to_string()),
        );
        assert_runs(
            "first(1)",
            Value::Error("argument to first must be an ARRAY, got INTEGER".to_string()),
        );
        assert_runs(
            "push(1, 1)",
            Value::Error("argument to push must be an ARRAY, got INTEGER".to_string()),
        );
    }

    #[test]
    fn test_closures() {
        assert_runs(
            "let newClosure = fn(a) { fn() { a; }; }; let closure = newClosure(99); closure();",
            int(99),
        );
        assert_runs(
            "let newAdder = fn(a, b) { fn(c) { a + b + c }; }; let adder = newAdder(1, 2); adder(8);",
            int(11),
        );
        assert_runs(
            "let newAdder = fn(a, b) { let c = a + b; fn(d) { c + d }; }; let adder = newAdder(1, 2); adder(8);",
            int(11),
        );
        assert_runs(
            "let newAdderOuter = fn(a, b) {
                 let c = a + b;
                 fn(d) { let e = d + c; fn(f) { e + f; }; };
             };
             let newAdderInner = newAdderOuter(1, 2);
             let adder = newAdderInner(3);
             adder(8);",
            int(14),
        );
        assert_runs(
            "let a = 1;
             let newAdderOuter = fn(b) { fn(c) { fn(d) { a + b + c + d }; }; };
             let newAdderInner = newAdderOuter(2);
             let adder = newAdderInner(3);
             adder(8);",
            int(14),
        );
        assert_runs(
            "let newClosure = fn(a, b) {
                 let one = fn() { a; };
                 let two = fn() { b; };
                 fn() { one() + two(); };
             };
             let closure = newClosure(9, 90);
             closure();",
            int(99),
        );
    }

    #[test]
    fn test_recursive_functions() {
        assert_runs(
            "let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } }; countDown(1);",
            int(0),
        );
        assert_runs(
            "let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } };
             let wrapper = fn() { countDown(1); };
             wrapper();",
            int(0),
        );
        // The recursive binding is local to the wrapper, so the closure
        // captures itself as a free value.
        assert_runs(
            "let wrapper = fn() {
                 let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } };
                 countDown(1);
             };
             wrapper();",
            int(0),
        );
    }

    #[test]
    fn test_recursive_fibonacci() {
        assert_runs(
            "let fib = fn(x) {
                 if (x == 0) { 0 } else {
                     if (x == 1) { 1 } else { fib(x - 1) + fib(x - 2) }
                 }
             };
             fib(10)",
            int(55),
        );
    }

    #[test]
    fn test_runtime_errors() {
        assert_error(
            "5 + true",
            "unsupported types for binary operation: INTEGER BOOLEAN",
        );
        assert_error(
            "5 + true; 5;",
            "unsupported types for binary operation: INTEGER BOOLEAN",
        );
        assert_error(
            "true + false",
            "unsupported types for binary operation: BOOLEAN BOOLEAN",
        );
        assert_error(
            "if (10 > 1) { true + false; }",
            "unsupported types for binary operation: BOOLEAN BOOLEAN",
        );
        assert_error("-true", "unsupported type for negation: BOOLEAN");
        assert_error("true > false", "unsupported types for binary operation: BOOLEAN BOOLEAN");
        assert_error("let x = 1; x(1);", "calling non-function");
        assert_error("5[0]", "index operator not supported: INTEGER");
        assert_error("{[1]: 1}", "unusable as hash key: ARRAY");
        assert_error("{1: 1}[[]]", "unusable as hash key: ARRAY");
        assert_error("5 / 0", "division by zero");
    }

    #[test]
    fn test_unbounded_recursion_overflows() {
        assert_error("let f = fn() { f(); }; f();", "stack overflow");
    }

    #[test]
    fn test_stack_balance_after_expression_statements() {
        let vm = run_vm("1; 2; 3;").expect("runs");
        assert_eq!(vm.sp, 0);
        assert_eq!(vm.last_popped_stack_element(), int(3));

        let vm = run_vm("let a = fn(x) { x }; a(4);").expect("runs");
        assert_eq!(vm.sp, 0);
        assert_eq!(vm.last_popped_stack_element(), int(4));
    }

    #[test]
    fn test_top_level_return_ends_execution() {
        assert_runs("return 5; 10;", int(5));
    }

    #[test]
    fn test_running_a_consumed_vm_is_a_no_op() {
        let mut vm = run_vm("1 + 2").expect("runs");
        assert_eq!(vm.last_popped_stack_element(), int(3));

        // The main frame's cursor is exhausted; a second run does nothing.
        vm.run().expect("no-op");
        assert_eq!(vm.last_popped_stack_element(), int(3));
    }

    #[test]
    fn test_globals_shared_across_vm_instances() {
        let tokens = Scanner::new("let a = 7;").scan_tokens().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let mut compiler = Compiler::new();
        compiler.compile(&program).unwrap();

        let globals = new_globals();
        let mut vm = Vm::new_with_global_store(compiler.bytecode(), Rc::clone(&globals));
        vm.run().unwrap();

        assert_eq!(globals.borrow()[0], int(7));
    }
}
