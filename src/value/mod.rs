//! Runtime values shared by the compiler, the VM, and the tree-walking
//! interpreter.

pub mod builtins;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::BlockStatement;
use crate::bytecode::instruction::Instructions;
use crate::interpreter::environment::Environment;
use crate::value::builtins::BuiltinDef;

/// Canonical singletons. Truthiness and non-integer equality are defined in
/// terms of these three values.
pub const TRUE: Value = Value::Boolean(true);
pub const FALSE: Value = Value::Boolean(false);
pub const NULL: Value = Value::Null;

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    Null,
    String(Rc<String>),
    Array(Rc<Vec<Value>>),
    Hash(Rc<IndexMap<HashKey, HashPair>>),
    /// Bytecode produced by the compiler for a function literal.
    CompiledFunction(Rc<CompiledFunction>),
    /// A compiled function together with its captured free values.
    Closure(Rc<Closure>),
    /// A host-provided primitive.
    Builtin(&'static BuiltinDef),
    /// An AST function with its captured environment. Tree-walk engine only.
    Function(Rc<Function>),
    /// Wrapper that unwinds `return` through nested blocks. Tree-walk engine
    /// only; the VM uses frame discipline instead.
    ReturnValue(Box<Value>),
    Error(String),
}

impl Value {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Boolean(_) => "BOOLEAN",
            Value::Null => "NULL",
            Value::String(_) => "STRING",
            Value::Array(_) => "ARRAY",
            Value::Hash(_) => "HASH",
            Value::CompiledFunction(_) => "COMPILED_FUNCTION",
            Value::Closure(_) => "CLOSURE",
            Value::Builtin(_) => "BUILTIN",
            Value::Function(_) => "FUNCTION",
            Value::ReturnValue(_) => "RETURN_VALUE",
            Value::Error(_) => "ERROR",
        }
    }

    /// The display form: what the REPL prints and what `puts` writes.
    pub fn inspect(&self) -> String {
        self.to_string()
    }

    /// Only Boolean false and Null are falsy; integer zero is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false) | Value::Null)
    }

    /// The key form used to index hash maps. None for unhashable variants.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Integer(n) => Some(HashKey {
                tag: self.type_tag(),
                value: *n as u64,
            }),
            Value::Boolean(b) => Some(HashKey {
                tag: self.type_tag(),
                value: u64::from(*b),
            }),
            Value::String(s) => Some(HashKey {
                tag: self.type_tag(),
                value: fnv1_64(s.as_bytes()),
            }),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Hash(a), Value::Hash(b)) => a == b,
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::ReturnValue(a), Value::ReturnValue(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
            Value::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, pair) in pairs.values().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", pair.key, pair.value)?;
                }
                write!(f, "}}")
            }
            Value::CompiledFunction(func) => {
                write!(f, "CompiledFunction[{:p}]", Rc::as_ptr(func))
            }
            Value::Closure(closure) => write!(f, "Closure[{:p}]", Rc::as_ptr(closure)),
            Value::Builtin(_) => write!(f, "builtin function"),
            Value::Function(func) => {
                write!(f, "fn({}) {{\n{}\n}}", func.parameters.join(", "), func.body)
            }
            Value::ReturnValue(value) => write!(f, "{}", value),
            Value::Error(message) => write!(f, "ERROR: {}", message),
        }
    }
}

/// The (type tag, 64-bit) pair used to index hash maps. The tag participates
/// in equality so `Integer 1` and `Boolean true` do not collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub tag: &'static str,
    pub value: u64,
}

/// A key/value entry in a hash. The original key value is kept alongside the
/// value so the hash can be displayed.
#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

/// The compiler's output for a single function literal.
#[derive(Debug)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// A `CompiledFunction` paired with the values it captured at construction.
#[derive(Debug)]
pub struct Closure {
    pub function: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

/// An AST function for the tree-walking engine.
#[derive(Debug)]
pub struct Function {
    pub parameters: Vec<String>,
    pub body: BlockStatement,
    pub env: Rc<RefCell<Environment>>,
}

/// Non-integer equality compares the canonical singletons: booleans by
/// value, null to null, everything else unequal.
pub(crate) fn singleton_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Boolean(l), Value::Boolean(r)) => l == r,
        (Value::Null, Value::Null) => true,
        _ => false,
    }
}

/// 64-bit FNV-1 over a byte string.
fn fnv1_64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for &byte in bytes {
        hash = hash.wrapping_mul(PRIME);
        hash ^= u64::from(byte);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_hash_keys_are_content_based() {
        let hello1 = Value::String(Rc::new("Hello World".to_string()));
        let hello2 = Value::String(Rc::new("Hello World".to_string()));
        let diff = Value::String(Rc::new("My name is johnny".to_string()));

        assert_eq!(hello1.hash_key(), hello2.hash_key());
        assert_ne!(hello1.hash_key(), diff.hash_key());
    }

    #[test]
    fn test_hash_key_tag_participates_in_equality() {
        let one = Value::Integer(1).hash_key().unwrap();
        let yes = Value::Boolean(true).hash_key().unwrap();

        assert_eq!(one.value, yes.value);
        assert_ne!(one, yes);
    }

    #[test]
    fn test_unhashable_variants() {
        assert!(Value::Array(Rc::new(vec![])).hash_key().is_none());
        assert!(Value::Null.hash_key().is_none());
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::Integer(0).is_truthy());
        assert!(Value::String(Rc::new(String::new())).is_truthy());
        assert!(TRUE.is_truthy());
        assert!(!FALSE.is_truthy());
        assert!(!NULL.is_truthy());
    }

    #[test]
    fn test_inspect_forms() {
        assert_eq!(Value::Integer(5).inspect(), "5");
        assert_eq!(TRUE.inspect(), "true");
        assert_eq!(NULL.inspect(), "null");
        assert_eq!(
            Value::String(Rc::new("monkey".to_string())).inspect(),
            "monkey"
        );
        assert_eq!(
            Value::Array(Rc::new(vec![Value::Integer(1), Value::Integer(2)])).inspect(),
            "[1, 2]"
        );
        assert_eq!(
            Value::Error("something failed".to_string()).inspect(),
            "ERROR: something failed"
        );
    }
}
