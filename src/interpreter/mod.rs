//! Tree-walking interpreter: the reference engine the VM is benchmarked and
//! cross-checked against.
//!
//! `return` unwinds through nested blocks via the `ReturnValue` wrapper and
//! is unwrapped at function (and program) boundaries.

pub mod environment;

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{BlockStatement, Expr, FunctionLiteral, InfixOp, PrefixOp, Program, Stmt};
use crate::error::RuntimeError;
use crate::interpreter::environment::Environment;
use crate::value::builtins::get_builtin_by_name;
use crate::value::{singleton_eq, Function, HashPair, Value, FALSE, NULL, TRUE};

/// Result type for evaluation.
pub type EvalResult<T> = Result<T, RuntimeError>;

/// The tree-walking interpreter.
pub struct Interpreter {
    env: Rc<RefCell<Environment>>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            env: Rc::new(RefCell::new(Environment::new())),
        }
    }

    /// Evaluate a program; the result is the value of its last statement.
    pub fn interpret(&mut self, program: &Program) -> EvalResult<Value> {
        let env = Rc::clone(&self.env);
        let mut result = NULL;

        for stmt in &program.statements {
            result = self.eval_statement(stmt, &env)?;
            if let Value::ReturnValue(value) = result {
                return Ok(*value);
            }
        }

        Ok(result)
    }

    fn eval_statement(
        &self,
        stmt: &Stmt,
        env: &Rc<RefCell<Environment>>,
    ) -> EvalResult<Value> {
        match stmt {
            Stmt::Expression(expr) => self.eval_expression(expr, env),
            Stmt::Let { name, value } => {
                let value = self.eval_expression(value, env)?;
                env.borrow_mut().define(name.clone(), value);
                Ok(NULL)
            }
            Stmt::Return(value) => {
                let value = self.eval_expression(value, env)?;
                Ok(Value::ReturnValue(Box::new(value)))
            }
        }
    }

    /// Evaluate a block. A ReturnValue is passed through unexpanded so it
    /// keeps unwinding until a function boundary.
    fn eval_block(
        &self,
        block: &BlockStatement,
        env: &Rc<RefCell<Environment>>,
    ) -> EvalResult<Value> {
        let mut result = NULL;

        for stmt in &block.statements {
            result = self.eval_statement(stmt, env)?;
            if matches!(result, Value::ReturnValue(_)) {
                return Ok(result);
            }
        }

        Ok(result)
    }

    fn eval_expression(
        &self,
        expr: &Expr,
        env: &Rc<RefCell<Environment>>,
    ) -> EvalResult<Value> {
        match expr {
            Expr::IntegerLiteral(value) => Ok(Value::Integer(*value)),
            Expr::StringLiteral(value) => Ok(Value::String(Rc::new(value.clone()))),
            Expr::Boolean(value) => Ok(if *value { TRUE } else { FALSE }),

            Expr::Prefix { operator, right } => {
                let right = self.eval_expression(right, env)?;
                self.eval_prefix_expression(*operator, right)
            }

            Expr::Infix {
                operator,
                left,
                right,
            } => {
                let left = self.eval_expression(left, env)?;
                let right = self.eval_expression(right, env)?;
                self.eval_infix_expression(*operator, left, right)
            }

            Expr::If {
                condition,
                consequence,
                alternative,
            } => {
                let condition = self.eval_expression(condition, env)?;
                if condition.is_truthy() {
                    self.eval_block(consequence, env)
                } else if let Some(alt) = alternative {
                    self.eval_block(alt, env)
                } else {
                    Ok(NULL)
                }
            }

            Expr::Identifier(name) => {
                if let Some(value) = env.borrow().get(name) {
                    return Ok(value);
                }
                if let Some(builtin) = get_builtin_by_name(name) {
                    return Ok(Value::Builtin(builtin));
                }
                Err(RuntimeError::UndefinedVariable(name.clone()))
            }

            Expr::Function(FunctionLiteral {
                parameters, body, ..
            }) => Ok(Value::Function(Rc::new(Function {
                parameters: parameters.clone(),
                body: body.clone(),
                env: Rc::clone(env),
            }))),

            Expr::Call {
                function,
                arguments,
            } => {
                let function = self.eval_expression(function, env)?;
                let mut args = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    args.push(self.eval_expression(argument, env)?);
                }
                self.apply_function(function, args)
            }

            Expr::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval_expression(element, env)?);
                }
                Ok(Value::Array(Rc::new(values)))
            }

            Expr::Hash(pairs) => {
                let mut map = IndexMap::new();
                for (key_expr, value_expr) in pairs {
                    let key = self.eval_expression(key_expr, env)?;
                    let value = self.eval_expression(value_expr, env)?;

                    let hash_key = key
                        .hash_key()
                        .ok_or_else(|| RuntimeError::UnusableHashKey(key.type_tag()))?;
                    map.insert(hash_key, HashPair { key, value });
                }
                Ok(Value::Hash(Rc::new(map)))
            }

            Expr::Index { left, index } => {
                let left = self.eval_expression(left, env)?;
                let index = self.eval_expression(index, env)?;
                self.eval_index_expression(left, index)
            }
        }
    }

    fn eval_prefix_expression(&self, operator: PrefixOp, right: Value) -> EvalResult<Value> {
        match operator {
            PrefixOp::Bang => Ok(match right {
                Value::Boolean(b) => {
                    if b {
                        FALSE
                    } else {
                        TRUE
                    }
                }
                Value::Null => TRUE,
                _ => FALSE,
            }),
            PrefixOp::Minus => match right {
                Value::Integer(n) => Ok(Value::Integer(-n)),
                other => Err(RuntimeError::UnsupportedNegation(other.type_tag())),
            },
        }
    }

    fn eval_infix_expression(
        &self,
        operator: InfixOp,
        left: Value,
        right: Value,
    ) -> EvalResult<Value> {
        match (&left, &right) {
            (Value::Integer(l), Value::Integer(r)) => {
                self.eval_integer_infix_expression(operator, *l, *r)
            }
            (Value::String(l), Value::String(r)) if operator == InfixOp::Add => {
                let mut result = String::with_capacity(l.len() + r.len());
                result.push_str(l);
                result.push_str(r);
                Ok(Value::String(Rc::new(result)))
            }
            _ => match operator {
                InfixOp::Equal => Ok(bool_value(singleton_eq(&left, &right))),
                InfixOp::NotEqual => Ok(bool_value(!singleton_eq(&left, &right))),
                _ => Err(RuntimeError::UnsupportedBinaryTypes(
                    left.type_tag(),
                    right.type_tag(),
                )),
            },
        }
    }

    fn eval_integer_infix_expression(
        &self,
        operator: InfixOp,
        left: i64,
        right: i64,
    ) -> EvalResult<Value> {
        let value = match operator {
            InfixOp::Add => Value::Integer(left + right),
            InfixOp::Sub => Value::Integer(left - right),
            InfixOp::Mul => Value::Integer(left * right),
            InfixOp::Div => {
                if right == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                Value::Integer(left / right)
            }
            InfixOp::Less => bool_value(left < right),
            InfixOp::Greater => bool_value(left > right),
            InfixOp::Equal => bool_value(left == right),
            InfixOp::NotEqual => bool_value(left != right),
        };
        Ok(value)
    }

    fn eval_index_expression(&self, left: Value, index: Value) -> EvalResult<Value> {
        match (&left, &index) {
            (Value::Array(elements), Value::Integer(i)) => {
                if *i < 0 || *i as usize >= elements.len() {
                    Ok(NULL)
                } else {
                    Ok(elements[*i as usize].clone())
                }
            }
            (Value::Hash(pairs), _) => {
                let key = index
                    .hash_key()
                    .ok_or_else(|| RuntimeError::UnusableHashKey(index.type_tag()))?;
                Ok(pairs
                    .get(&key)
                    .map(|pair| pair.value.clone())
                    .unwrap_or(NULL))
            }
            _ => Err(RuntimeError::IndexNotSupported(left.type_tag())),
        }
    }

    fn apply_function(&self, function: Value, args: Vec<Value>) -> EvalResult<Value> {
        match function {
            Value::Function(func) => {
                if args.len() != func.parameters.len() {
                    return Err(RuntimeError::WrongArity {
                        want: func.parameters.len(),
                        got: args.len(),
                    });
                }

                let mut call_env = Environment::with_enclosing(Rc::clone(&func.env));
                for (parameter, arg) in func.parameters.iter().zip(args) {
                    call_env.define(parameter.clone(), arg);
                }

                let call_env = Rc::new(RefCell::new(call_env));
                let result = self.eval_block(&func.body, &call_env)?;

                // Unwrap at the function boundary so `return` does not
                // unwind past the call.
                match result {
                    Value::ReturnValue(value) => Ok(*value),
                    other => Ok(other),
                }
            }
            Value::Builtin(builtin) => Ok((builtin.func)(&args).unwrap_or(NULL)),
            _ => Err(RuntimeError::CallingNonFunction),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn bool_value(value: bool) -> Value {
    if value {
        TRUE
    } else {
        FALSE
    }
}
