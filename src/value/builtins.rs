//! Built-in functions exposed to Marmot programs.
//!
//! The registry order is part of the bytecode contract: `GetBuiltin` operands
//! are indices into [`BUILTINS`].

use std::rc::Rc;

use crate::value::Value;

/// A built-in returns a Value, an Error value for bad arguments, or nothing
/// (surfaced to the program as Null).
pub type BuiltinFn = fn(&[Value]) -> Option<Value>;

/// A named entry in the built-in registry.
#[derive(Debug)]
pub struct BuiltinDef {
    pub name: &'static str,
    pub func: BuiltinFn,
}

/// All built-ins, in registry order.
pub static BUILTINS: &[BuiltinDef] = &[
    BuiltinDef {
        name: "len",
        func: builtin_len,
    },
    BuiltinDef {
        name: "puts",
        func: builtin_puts,
    },
    BuiltinDef {
        name: "first",
        func: builtin_first,
    },
    BuiltinDef {
        name: "last",
        func: builtin_last,
    },
    BuiltinDef {
        name: "rest",
        func: builtin_rest,
    },
    BuiltinDef {
        name: "push",
        func: builtin_push,
    },
];

/// Look up a built-in by name (used by the tree-walking engine).
pub fn get_builtin_by_name(name: &str) -> Option<&'static BuiltinDef> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

fn new_error(message: String) -> Option<Value> {
    Some(Value::Error(message))
}

fn builtin_len(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return new_error(format!(
            "wrong number of arguments. got={}, want=1",
            args.len()
        ));
    }

    match &args[0] {
        Value::String(s) => Some(Value::Integer(s.len() as i64)),
        Value::Array(elements) => Some(Value::Integer(elements.len() as i64)),
        other => new_error(format!(
            "argument to len not supported, got {}",
            other.type_tag()
        )),
    }
}

fn builtin_puts(args: &[Value]) -> Option<Value> {
    for arg in args {
        println!("{}", arg);
    }
    None
}

fn builtin_first(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return new_error(format!(
            "wrong number of arguments. got={}, want=1",
            args.len()
        ));
    }

    match &args[0] {
        Value::Array(elements) => elements.first().cloned(),
        other => new_error(format!(
            "argument to first must be an ARRAY, got {}",
            other.type_tag()
        )),
    }
}

fn builtin_last(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return new_error(format!(
            "wrong number of arguments. got={}, want=1",
            args.len()
        ));
    }

    match &args[0] {
        Value::Array(elements) => elements.last().cloned(),
        other => new_error(format!(
            "argument to last must be an ARRAY, got {}",
            other.type_tag()
        )),
    }
}

fn builtin_rest(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return new_error(format!(
            "wrong number of arguments. got={}, want=1",
            args.len()
        ));
    }

    match &args[0] {
        Value::Array(elements) => {
            if elements.is_empty() {
                None
            } else {
                Some(Value::Array(Rc::new(elements[1..].to_vec())))
            }
        }
        other => new_error(format!(
            "argument to rest must be an ARRAY, got {}",
            other.type_tag()
        )),
    }
}

fn builtin_push(args: &[Value]) -> Option<Value> {
    if args.len() != 2 {
        return new_error(format!(
            "wrong number of arguments. got={}, want=2",
            args.len()
        ));
    }

    match &args[0] {
        Value::Array(elements) => {
            let mut new_elements = elements.as_ref().clone();
            new_elements.push(args[1].clone());
            Some(Value::Array(Rc::new(new_elements)))
        }
        other => new_error(format!(
            "argument to push must be an ARRAY, got {}",
            other.type_tag()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_order_is_stable() {
        let names: Vec<&str> = BUILTINS.iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["len", "puts", "first", "last", "rest", "push"]);
    }

    #[test]
    fn test_len() {
        let s = Value::String(Rc::new("hello world".to_string()));
        assert_eq!((builtin_len)(&[s]), Some(Value::Integer(11)));

        let arr = Value::Array(Rc::new(vec![Value::Integer(1), Value::Integer(2)]));
        assert_eq!((builtin_len)(&[arr]), Some(Value::Integer(2)));

        assert_eq!(
            (builtin_len)(&[Value::Integer(1)]),
            Some(Value::Error(
                "argument to len not supported, got INTEGER".to_string()
            ))
        );
        assert_eq!(
            (builtin_len)(&[]),
            Some(Value::Error(
                "wrong number of arguments. got=0, want=1".to_string()
            ))
        );
    }

    #[test]
    fn test_first_last_rest_on_empty_array() {
        let empty = Value::Array(Rc::new(vec![]));
        assert_eq!((builtin_first)(&[empty.clone()]), None);
        assert_eq!((builtin_last)(&[empty.clone()]), None);
        assert_eq!((builtin_rest)(&[empty]), None);
    }

    #[test]
    fn test_rest_and_push_return_new_arrays() {
        let arr = Value::Array(Rc::new(vec![Value::Integer(1), Value::Integer(2)]));

        let rest = (builtin_rest)(&[arr.clone()]).unwrap();
        assert_eq!(rest, Value::Array(Rc::new(vec![Value::Integer(2)])));

        let pushed = (builtin_push)(&[arr.clone(), Value::Integer(3)]).unwrap();
        assert_eq!(
            pushed,
            Value::Array(Rc::new(vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(3),
            ]))
        );
        // The receiver is untouched.
        assert_eq!(
            arr,
            Value::Array(Rc::new(vec![Value::Integer(1), Value::Integer(2)]))
        );
    }
}
