//! Stack interpreter.
//!
//! One frame per interpreter instance: an evaluation stack, a locals
//! array pre-sized to 256 zeroed slots, and a program counter over a
//! borrowed instruction stream. Calls instantiate fresh interpreters,
//! so recursion rides the host stack.
//!
//! Numeric promotion: if either operand is double the result is double,
//! else float if either is float, else int. `%` is integer-only. `+` on
//! two strings concatenates through the shared pool.

use super::bytecode::{Instruction, OpCode};
use super::codegen::MAX_LOCALS;
use super::error::RuntimeError;
use super::runtime::Runtime;
use super::value::Value;
use std::sync::Arc;
use tracing::trace;

/// Promotion rank of a numeric operand pair.
#[derive(PartialEq, PartialOrd)]
enum Rank {
    Int,
    Float,
    Double,
}

fn rank(v: &Value) -> Option<Rank> {
    match v {
        Value::Int(_) => Some(Rank::Int),
        Value::Float(_) => Some(Rank::Float),
        Value::Double(_) => Some(Rank::Double),
        _ => None,
    }
}

pub struct Interpreter {
    runtime: Arc<Runtime>,
    stack: Vec<Value>,
    locals: Vec<Value>,
}

impl Interpreter {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            stack: Vec::with_capacity(64),
            locals: Vec::new(),
        }
    }

    /// Execute a stream with zeroed locals (main and process bodies).
    pub fn execute(&mut self, code: &[Instruction]) -> Result<Value, RuntimeError> {
        self.reset(Vec::new());
        self.run(code)
    }

    /// Execute a function body with arguments preloaded into slots
    /// `0..n`.
    pub fn execute_function(
        &mut self,
        code: &[Instruction],
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        self.reset(args);
        self.run(code)
    }

    fn reset(&mut self, args: Vec<Value>) {
        self.stack.clear();
        self.locals.clear();
        self.locals.reserve(MAX_LOCALS);
        self.locals.extend(args.into_iter().take(MAX_LOCALS));
        while self.locals.len() < MAX_LOCALS {
            self.locals.push(Value::Int(0));
        }
    }

    fn run(&mut self, code: &[Instruction]) -> Result<Value, RuntimeError> {
        let mut pc = 0usize;

        while pc < code.len() {
            let Instruction { op, operand } = code[pc];
            trace!(target: "tick::vm", pc, inst = %code[pc], depth = self.stack.len());

            match op {
                OpCode::LoadConst => {
                    let value = self
                        .runtime
                        .constants()
                        .get(operand as usize)
                        .cloned()
                        .ok_or(RuntimeError::BadConstant(operand))?;
                    self.push(value);
                }
                OpCode::LoadLocal => {
                    let value = self
                        .locals
                        .get(operand as usize)
                        .cloned()
                        .unwrap_or(Value::Int(0));
                    self.push(value);
                }
                OpCode::StoreLocal => {
                    let value = self.pop();
                    let slot = operand as usize;
                    if slot < self.locals.len() {
                        self.locals[slot] = value;
                    }
                }
                OpCode::LoadGlobal => {
                    let value = self.runtime.get_global(operand as u32);
                    self.push(value);
                }
                OpCode::StoreGlobal => {
                    let value = self.pop();
                    self.runtime.set_global(operand as u32, value);
                }

                OpCode::Add => {
                    let (a, b) = self.pop_two();
                    let result = self.add_values(a, b)?;
                    self.push(result);
                }
                OpCode::Sub => {
                    let (a, b) = self.pop_two();
                    let result = self.arith(a, b, "-")?;
                    self.push(result);
                }
                OpCode::Mul => {
                    let (a, b) = self.pop_two();
                    let result = self.arith(a, b, "*")?;
                    self.push(result);
                }
                OpCode::Div => {
                    let (a, b) = self.pop_two();
                    let result = self.arith(a, b, "/")?;
                    self.push(result);
                }
                OpCode::Mod => {
                    let (a, b) = self.pop_two();
                    match (a, b) {
                        (Value::Int(_), Value::Int(0)) => {
                            return Err(RuntimeError::DivisionByZero)
                        }
                        (Value::Int(x), Value::Int(y)) => self.push(Value::Int(x.wrapping_rem(y))),
                        _ => return Err(RuntimeError::TypeMismatch { op: "%" }),
                    }
                }
                OpCode::Concat => {
                    let (a, b) = self.pop_two();
                    let result = self.concat(a, b)?;
                    self.push(result);
                }

                OpCode::Eq => {
                    let (a, b) = self.pop_two();
                    let result = self.values_equal(a, b)?;
                    self.push(Value::Bool(result));
                }
                OpCode::Ne => {
                    let (a, b) = self.pop_two();
                    let result = self.values_equal(a, b)?;
                    self.push(Value::Bool(!result));
                }
                OpCode::Lt | OpCode::Gt | OpCode::Le | OpCode::Ge => {
                    let (a, b) = self.pop_two();
                    let (x, y) = match (a.as_f64(), b.as_f64()) {
                        (Some(x), Some(y)) => (x, y),
                        _ => return Err(RuntimeError::TypeMismatch { op: op.name() }),
                    };
                    let result = match op {
                        OpCode::Lt => x < y,
                        OpCode::Gt => x > y,
                        OpCode::Le => x <= y,
                        _ => x >= y,
                    };
                    self.push(Value::Bool(result));
                }

                OpCode::And => {
                    let (a, b) = self.pop_two();
                    match (a.as_bool(), b.as_bool()) {
                        (Some(x), Some(y)) => self.push(Value::Bool(x && y)),
                        _ => return Err(RuntimeError::TypeMismatch { op: "&&" }),
                    }
                }
                OpCode::Or => {
                    let (a, b) = self.pop_two();
                    match (a.as_bool(), b.as_bool()) {
                        (Some(x), Some(y)) => self.push(Value::Bool(x || y)),
                        _ => return Err(RuntimeError::TypeMismatch { op: "||" }),
                    }
                }
                OpCode::Not => {
                    let a = self.pop();
                    match a.as_bool() {
                        Some(b) => self.push(Value::Bool(!b)),
                        None => return Err(RuntimeError::TypeMismatch { op: "!" }),
                    }
                }
                OpCode::Neg => {
                    let a = self.pop();
                    let result = match a {
                        Value::Int(n) => Value::Int(n.wrapping_neg()),
                        Value::Float(f) => Value::Float(-f),
                        Value::Double(d) => Value::Double(-d),
                        _ => return Err(RuntimeError::TypeMismatch { op: "-" }),
                    };
                    self.push(result);
                }

                OpCode::Jump => {
                    pc = operand as usize;
                    continue;
                }
                OpCode::JumpIfFalse => {
                    let cond = self.pop();
                    if !Self::is_truthy(&cond) {
                        pc = operand as usize;
                        continue;
                    }
                }
                OpCode::JumpIfTrue => {
                    let cond = self.pop();
                    if Self::is_truthy(&cond) {
                        pc = operand as usize;
                        continue;
                    }
                }

                OpCode::Call => {
                    let argc = self.pop().as_int().unwrap_or(0).max(0) as usize;
                    let mut args = vec![Value::None; argc];
                    for slot in args.iter_mut().rev() {
                        *slot = self.pop();
                    }
                    let name = self.runtime.strings().resolve(operand as u32);
                    let result = self.runtime.clone().call_function(&name, args)?;
                    self.push(result);
                }
                OpCode::Return => {
                    return Ok(self.pop());
                }

                OpCode::SignalEmit => {
                    let name = self.runtime.strings().resolve(operand as u32);
                    let value = self.pop();
                    let queue = self
                        .runtime
                        .signal(&name)
                        .ok_or_else(|| RuntimeError::UnknownSignal(name.to_string()))?;
                    queue.emit(value);
                }
                OpCode::SignalRecv => {
                    let name = self.runtime.strings().resolve(operand as u32);
                    let queue = self
                        .runtime
                        .signal(&name)
                        .ok_or_else(|| RuntimeError::UnknownSignal(name.to_string()))?
                        .clone();
                    let value = queue.recv();
                    self.push(value);
                }
                OpCode::EventExecute => {
                    let name = self.runtime.strings().resolve(operand as u32);
                    self.runtime.clone().execute_event(&name)?;
                }

                OpCode::Pop => {
                    self.pop();
                }
                OpCode::Dup => {
                    let top = self.peek();
                    self.push(top);
                }

                OpCode::BuildArray => {
                    let count = operand.max(0) as usize;
                    let mut elements = vec![Value::None; count];
                    for slot in elements.iter_mut().rev() {
                        *slot = self.pop();
                    }
                    self.push(Value::array(elements));
                }
                OpCode::ArrayIndex => {
                    let index = self.pop();
                    let array = self.pop();
                    let value = self.array_get(array, index)?;
                    self.push(value);
                }
                OpCode::ArrayStore => {
                    let value = self.pop();
                    let index = self.pop();
                    let array = self.pop();
                    self.array_set(array, index, value)?;
                }

                OpCode::NewObject => {
                    self.push(Value::object(operand as u32));
                }
                OpCode::GetField => {
                    let object = self.pop();
                    let Value::Object(obj) = object else {
                        return Err(RuntimeError::NotAnObject);
                    };
                    let value = obj
                        .lock()
                        .unwrap()
                        .fields
                        .get(&(operand as u32))
                        .cloned()
                        .unwrap_or(Value::Int(0));
                    self.push(value);
                }
                OpCode::SetField => {
                    let value = self.pop();
                    let object = self.pop();
                    let Value::Object(obj) = object else {
                        return Err(RuntimeError::NotAnObject);
                    };
                    obj.lock().unwrap().fields.insert(operand as u32, value);
                }

                OpCode::Halt => {
                    return Ok(Value::Int(0));
                }
            }

            pc += 1;
        }

        Ok(Value::Int(0))
    }

    // ==================== value operations ====================

    /// `+`: string–string concatenates; otherwise numeric with
    /// promotion.
    fn add_values(&self, a: Value, b: Value) -> Result<Value, RuntimeError> {
        if let (Value::Str(_), Value::Str(_)) = (&a, &b) {
            return self.concat(a, b);
        }
        self.arith(a, b, "+")
    }

    fn concat(&self, a: Value, b: Value) -> Result<Value, RuntimeError> {
        let (Value::Str(x), Value::Str(y)) = (a, b) else {
            return Err(RuntimeError::TypeMismatch { op: "+" });
        };
        let pool = self.runtime.strings();
        let joined = format!("{}{}", pool.resolve(x), pool.resolve(y));
        Ok(Value::Str(pool.intern(&joined)))
    }

    fn arith(&self, a: Value, b: Value, op: &'static str) -> Result<Value, RuntimeError> {
        let (ra, rb) = match (rank(&a), rank(&b)) {
            (Some(ra), Some(rb)) => (ra, rb),
            _ => return Err(RuntimeError::TypeMismatch { op }),
        };

        if ra == Rank::Int && rb == Rank::Int {
            let (Some(x), Some(y)) = (a.as_int(), b.as_int()) else {
                unreachable!("rank said int");
            };
            let result = match op {
                "+" => x.wrapping_add(y),
                "-" => x.wrapping_sub(y),
                "*" => x.wrapping_mul(y),
                "/" => {
                    if y == 0 {
                        return Err(RuntimeError::DivisionByZero);
                    }
                    x.wrapping_div(y)
                }
                _ => unreachable!("arith op"),
            };
            return Ok(Value::Int(result));
        }

        let x = a.as_f64().expect("numeric by rank");
        let y = b.as_f64().expect("numeric by rank");
        if op == "/" && y == 0.0 {
            return Err(RuntimeError::DivisionByZero);
        }
        let result = match op {
            "+" => x + y,
            "-" => x - y,
            "*" => x * y,
            "/" => x / y,
            _ => unreachable!("arith op"),
        };

        if ra == Rank::Double || rb == Rank::Double {
            Ok(Value::Double(result))
        } else {
            Ok(Value::Float(result as f32))
        }
    }

    fn values_equal(&self, a: Value, b: Value) -> Result<bool, RuntimeError> {
        match (&a, &b) {
            (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
            (Value::Str(x), Value::Str(y)) => Ok(x == y),
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(x == y),
                _ => Err(RuntimeError::TypeMismatch { op: "==" }),
            },
        }
    }

    fn is_truthy(value: &Value) -> bool {
        !matches!(value, Value::Bool(false) | Value::Int(0))
    }

    fn array_get(&self, array: Value, index: Value) -> Result<Value, RuntimeError> {
        let Value::Array(handle) = array else {
            return Err(RuntimeError::NotAnArray);
        };
        let index = index
            .as_int()
            .ok_or(RuntimeError::TypeMismatch { op: "[]" })?;
        let elements = handle.lock().unwrap();
        if index < 0 || index as usize >= elements.len() {
            return Err(RuntimeError::IndexOutOfBounds {
                index,
                len: elements.len(),
            });
        }
        Ok(elements[index as usize].clone())
    }

    fn array_set(&self, array: Value, index: Value, value: Value) -> Result<(), RuntimeError> {
        let Value::Array(handle) = array else {
            return Err(RuntimeError::NotAnArray);
        };
        let index = index
            .as_int()
            .ok_or(RuntimeError::TypeMismatch { op: "[]" })?;
        let mut elements = handle.lock().unwrap();
        if index < 0 || index as usize >= elements.len() {
            return Err(RuntimeError::IndexOutOfBounds {
                index,
                len: elements.len(),
            });
        }
        elements[index as usize] = value;
        Ok(())
    }

    // ==================== stack helpers ====================

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Underflow defensively yields integer zero.
    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::Int(0))
    }

    fn pop_two(&mut self) -> (Value, Value) {
        let b = self.pop();
        let a = self.pop();
        (a, b)
    }

    fn peek(&self) -> Value {
        self.stack.last().cloned().unwrap_or(Value::Int(0))
    }
}
