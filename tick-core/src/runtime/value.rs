//! Runtime value model.
//!
//! A tagged union over the primitive variants plus shared handles for
//! arrays and objects. Values travel between worker threads through
//! signal queues, so the heap handles are `Arc<Mutex<..>>` rather than
//! raw pointers; the arithmetic promotion lattice is int ⊂ float ⊂ double.

use super::strings::{StrId, StringPool};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Object payload: interned class name plus a field map keyed by
/// interned field name. Fields absent from the map read as `Int(0)`
/// (zero-initialized).
#[derive(Debug, Default)]
pub struct Object {
    pub class: StrId,
    pub fields: HashMap<StrId, Value>,
}

#[derive(Debug, Clone, Default)]
pub enum Value {
    Int(i32),
    Float(f32),
    Double(f64),
    Bool(bool),
    Str(StrId),
    Array(Arc<Mutex<Vec<Value>>>),
    Object(Arc<Mutex<Object>>),
    #[default]
    None,
}

/// Structural equality for scalars, identity for heap handles. The
/// VM's `==` operator has its own promotion-aware comparison; this impl
/// serves containers and tests.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::None, Value::None) => true,
            _ => false,
        }
    }
}

impl Value {
    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Arc::new(Mutex::new(elements)))
    }

    pub fn object(class: StrId) -> Self {
        Value::Object(Arc::new(Mutex::new(Object {
            class,
            fields: HashMap::new(),
        })))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_) | Value::Double(_))
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str_id(&self) -> Option<StrId> {
        match self {
            Value::Str(id) => Some(*id),
            _ => None,
        }
    }

    /// Human-readable rendering; string handles resolve through `pool`.
    pub fn display(&self, pool: &StringPool) -> String {
        match self {
            Value::Int(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Double(d) => d.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Str(id) => pool.resolve(*id).to_string(),
            Value::Array(arr) => {
                let elements = arr.lock().unwrap();
                let rendered: Vec<String> =
                    elements.iter().map(|v| v.display(pool)).collect();
                format!("[{}]", rendered.join(", "))
            }
            Value::Object(obj) => {
                let obj = obj.lock().unwrap();
                format!("<{}>", pool.resolve(obj.class))
            }
            Value::None => "none".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_widening() {
        assert_eq!(Value::Int(7).as_f64(), Some(7.0));
        assert_eq!(Value::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(Value::Double(2.25).as_f64(), Some(2.25));
        assert_eq!(Value::Bool(true).as_f64(), None);
    }

    #[test]
    fn test_array_handle_is_shared() {
        let a = Value::array(vec![Value::Int(1)]);
        let b = a.clone();
        if let Value::Array(handle) = &a {
            handle.lock().unwrap().push(Value::Int(2));
        }
        if let Value::Array(handle) = &b {
            assert_eq!(handle.lock().unwrap().len(), 2);
        } else {
            panic!("expected array");
        }
    }

    #[test]
    fn test_display_scalars() {
        let pool = StringPool::new();
        let id = pool.intern("hi");
        assert_eq!(Value::Int(3).display(&pool), "3");
        assert_eq!(Value::Bool(false).display(&pool), "false");
        assert_eq!(Value::Str(id).display(&pool), "hi");
        assert_eq!(Value::None.display(&pool), "none");
    }
}
