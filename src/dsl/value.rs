//! Runtime values.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

/// A script object: an instance of a declared class.
pub struct Object {
    pub class: usize,
    pub class_name: Rc<str>,
    pub fields: IndexMap<String, Value>,
}

// Field values are not followed: objects may reference themselves.
impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.class_name)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub type ObjectRef = Rc<RefCell<Object>>;

/// A dynamically typed ModScript value.
///
/// Strings and objects are reference counted, so values are cheap to clone
/// but not `Send`.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Object(ObjectRef),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view: ints widen to float.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    #[allow(clippy::float_cmp, clippy::cast_precision_loss)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => {
                if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            Value::Str(s) => write!(f, "{s}"),
            Value::Object(obj) => match obj.try_borrow() {
                Ok(obj) => write!(f, "{}", obj.class_name),
                Err(_) => write!(f, "<object>"),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::str(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(Rc::from(v))
    }
}

/// Failed conversion out of a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected}, got {found}")]
pub struct ValueTypeError {
    pub expected: &'static str,
    pub found: &'static str,
}

macro_rules! try_from_value {
    ($ty:ty, $expected:literal, $($pat:pat => $out:expr),+ $(,)?) => {
        impl TryFrom<Value> for $ty {
            type Error = ValueTypeError;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                match value {
                    $($pat => Ok($out),)+
                    other => Err(ValueTypeError {
                        expected: $expected,
                        found: other.type_name(),
                    }),
                }
            }
        }
    };
}

try_from_value!(bool, "bool", Value::Bool(b) => b);
try_from_value!(i64, "int", Value::Int(v) => v);
try_from_value!(f64, "float", Value::Float(v) => v, Value::Int(v) => v as f64);
try_from_value!(String, "string", Value::Str(s) => s.to_string());

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        assert_eq!(Value::Int(3).to_string(), "3");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
        assert_eq!(Value::str("hi").to_string(), "hi");
        assert_eq!(Value::Null.to_string(), "null");
    }

    #[test]
    fn int_float_equality() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::str("2"));
    }

    #[test]
    fn try_from_conversions() {
        assert_eq!(i64::try_from(Value::Int(7)).unwrap(), 7);
        assert!((f64::try_from(Value::Int(7)).unwrap() - 7.0).abs() < f64::EPSILON);
        let err = i64::try_from(Value::str("x")).unwrap_err();
        assert_eq!(err.to_string(), "expected int, got string");
    }

    #[test]
    fn objects_compare_by_identity() {
        let make = || {
            Value::Object(Rc::new(RefCell::new(Object {
                class: 0,
                class_name: Rc::from("script.Main"),
                fields: IndexMap::new(),
            })))
        };
        let a = make();
        assert_eq!(a, a.clone());
        assert_ne!(a, make());
        assert_eq!(a.to_string(), "script.Main");
    }

    #[test]
    fn self_referencing_object_displays_by_class() {
        let obj = Rc::new(RefCell::new(Object {
            class: 0,
            class_name: Rc::from("script.Node"),
            fields: IndexMap::new(),
        }));
        let value = Value::Object(Rc::clone(&obj));
        obj.borrow_mut().fields.insert("me".into(), value.clone());
        assert_eq!(value.to_string(), "script.Node");
        assert_eq!(value, value.clone());
        assert!(format!("{value:?}").contains("\"me\""));
        // Break the cycle so the test does not leak.
        obj.borrow_mut().fields.clear();
    }
}
