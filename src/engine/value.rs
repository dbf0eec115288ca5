//! Runtime values for the nodus dialect
//!
//! Values are cheap to clone: containers share their backing store through
//! `Rc`, which is also what lets a partially-executed module's namespace be
//! observed by a cyclic `require`.

use crate::error::ExecError;
use crate::ext::Extension;
use crate::module::Module;
use crate::require::Require;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// The backing store shared by `Value::Object` and module namespaces.
pub type ObjectRef = Rc<RefCell<IndexMap<String, Value>>>;

/// A native function exposed to dialect code.
pub struct Builtin {
    pub name: String,
    pub func: Box<dyn Fn(&[Value]) -> Result<Value, ExecError>>,
}

impl Builtin {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> Result<Value, ExecError> + 'static,
    ) -> Value {
        Value::Builtin(Rc::new(Builtin {
            name: name.into(),
            func: Box::new(func),
        }))
    }
}

/// A dialect value.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    List(Rc<RefCell<Vec<Value>>>),
    Object(ObjectRef),
    Builtin(Rc<Builtin>),
    /// The per-module `require` capability.
    Require(Rc<Require>),
    /// A module handle (`require(..., exports=false)` result, `module`).
    Module(Rc<Module>),
    /// A native extension handle, as exported by extension bindings.
    Extension(Rc<dyn Extension>),
}

impl Value {
    pub fn object(pairs: impl IntoIterator<Item = (String, Value)>) -> Value {
        Value::Object(Rc::new(RefCell::new(pairs.into_iter().collect())))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Object(_) => "object",
            Value::Builtin(_) => "builtin",
            Value::Require(_) => "require",
            Value::Module(_) => "module",
            Value::Extension(_) => "extension",
        }
    }

    /// Attribute lookup on object values.
    pub fn get_attr(&self, name: &str) -> Option<Value> {
        match self {
            Value::Object(obj) => obj.borrow().get(name).cloned(),
            _ => None,
        }
    }

    pub fn set_attr(&self, name: &str, value: Value) -> bool {
        match self {
            Value::Object(obj) => {
                obj.borrow_mut().insert(name.to_string(), value);
                true
            }
            _ => false,
        }
    }

    /// Convert parsed JSON into a dialect value.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::list(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v))),
            ),
        }
    }

    /// Convert back to JSON; handles to runtime objects have no JSON form.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            Value::Null => Some(serde_json::Value::Null),
            Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Value::Number(n) => serde_json::Number::from_f64(*n).map(serde_json::Value::Number),
            Value::Str(s) => Some(serde_json::Value::String(s.clone())),
            Value::List(items) => items
                .borrow()
                .iter()
                .map(|v| v.to_json())
                .collect::<Option<Vec<_>>>()
                .map(serde_json::Value::Array),
            Value::Object(obj) => obj
                .borrow()
                .iter()
                .map(|(k, v)| v.to_json().map(|j| (k.clone(), j)))
                .collect::<Option<serde_json::Map<_, _>>>()
                .map(serde_json::Value::Object),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Value::Object(a), Value::Object(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Value::Builtin(a), Value::Builtin(b)) => Rc::ptr_eq(a, b),
            (Value::Require(a), Value::Require(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::Extension(a), Value::Extension(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Object(obj) => {
                write!(f, "{{")?;
                for (i, (k, v)) in obj.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name),
            Value::Require(_) => write!(f, "<require>"),
            Value::Module(m) => write!(f, "<module '{}'>", m.filename()),
            Value::Extension(e) => write!(f, "<extension '{}'>", e.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(!Value::Number(0.0).truthy());
        assert!(!Value::str("").truthy());
        assert!(Value::str("x").truthy());
        assert!(Value::object([]).truthy());
    }

    #[test]
    fn test_json_roundtrip() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"x": 1, "items": [true, null, "s"]}"#).unwrap();
        let value = Value::from_json(&json);
        assert_eq!(value.get_attr("x"), Some(Value::Number(1.0)));
        assert_eq!(value.to_json().unwrap(), json);
    }

    #[test]
    fn test_object_sharing() {
        let a = Value::object([("x".to_string(), Value::Number(1.0))]);
        let b = a.clone();
        b.set_attr("y", Value::Number(2.0));
        assert_eq!(a.get_attr("y"), Some(Value::Number(2.0)));
        assert_eq!(a, b);
    }

    #[test]
    fn test_display() {
        let v = Value::object([
            ("x".to_string(), Value::Number(1.0)),
            ("s".to_string(), Value::str("hi")),
        ]);
        assert_eq!(v.to_string(), "{x: 1, s: hi}");
    }
}
