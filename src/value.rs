//! Dynamic values stored in a runtime's value table.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::tensor::Tensor;

pub type ListRef = Arc<Mutex<Vec<Value>>>;
pub type DictRef = Arc<Mutex<BTreeMap<DictKey, Value>>>;

/// A tagged value. Lists and dicts are shared mutable containers, so cloning
/// one clones the handle; tuples are immutable.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Tensor(Tensor),
    List(ListRef),
    Tuple(Arc<[Value]>),
    Dict(DictRef),
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DictKey {
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
}

impl DictKey {
    pub fn to_value(&self) -> Value {
        match self {
            DictKey::Bool(value) => Value::Bool(*value),
            DictKey::Int(value) => Value::Int(*value),
            DictKey::Str(value) => Value::Str(Arc::clone(value)),
        }
    }
}

impl fmt::Display for DictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DictKey::Bool(value) => write!(f, "{value}"),
            DictKey::Int(value) => write!(f, "{value}"),
            DictKey::Str(value) => write!(f, "{value:?}"),
        }
    }
}

impl Value {
    pub fn str(value: &str) -> Self {
        Value::Str(Arc::from(value))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(Mutex::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Arc::from(items))
    }

    pub fn dict(entries: impl IntoIterator<Item = (DictKey, Value)>) -> Self {
        Value::Dict(Arc::new(Mutex::new(entries.into_iter().collect())))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Tensor(_) => "Tensor",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Value::Tensor(tensor) => Some(tensor),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::Bool(value) => Some(i64::from(*value)),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_dict_key(&self) -> Option<DictKey> {
        match self {
            Value::Bool(value) => Some(DictKey::Bool(*value)),
            Value::Int(value) => Some(DictKey::Int(*value)),
            Value::Str(value) => Some(DictKey::Str(Arc::clone(value))),
            _ => None,
        }
    }

    /// Compares two values structurally, tensors elementwise under `tolerance`.
    pub fn approx_eq(&self, other: &Value, tolerance: Tolerance) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => tolerance.close(*a, *b),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tensor(a), Value::Tensor(b)) => tensors_close(a, b, tolerance),
            (Value::Tuple(a), Value::Tuple(b)) => sequences_close(a, b, tolerance),
            (Value::List(a), Value::List(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.lock().clone(), b.lock().clone());
                sequences_close(&a, &b, tolerance)
            }
            (Value::Dict(a), Value::Dict(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.lock().clone(), b.lock().clone());
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|((ka, va), (kb, vb))| {
                        ka == kb && va.approx_eq(vb, tolerance)
                    })
            }
            _ => false,
        }
    }
}

impl From<Tensor> for Value {
    fn from(tensor: Tensor) -> Self {
        Value::Tensor(tensor)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

fn sequences_close(a: &[Value], b: &[Value], tolerance: Tolerance) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(left, right)| left.approx_eq(right, tolerance))
}

fn tensors_close(a: &Tensor, b: &Tensor, tolerance: Tolerance) -> bool {
    if a.dtype() != b.dtype() || a.shape() != b.shape() {
        return false;
    }
    let (Ok(left), Ok(right)) = (a.to_f32_vec(), b.to_f32_vec()) else {
        return false;
    };
    left.iter()
        .zip(right.iter())
        .all(|(l, r)| tolerance.close(f64::from(*l), f64::from(*r)))
}

/// `allclose`-style comparison policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub rtol: f64,
    pub atol: f64,
    pub equal_nan: bool,
}

impl Tolerance {
    pub const EXACT: Tolerance = Tolerance {
        rtol: 0.0,
        atol: 0.0,
        equal_nan: true,
    };

    pub fn close(&self, actual: f64, expected: f64) -> bool {
        if actual.is_nan() || expected.is_nan() {
            return self.equal_nan && actual.is_nan() && expected.is_nan();
        }
        if actual == expected {
            return true;
        }
        (actual - expected).abs() <= self.atol + self.rtol * expected.abs()
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            rtol: 1e-5,
            atol: 1e-8,
            equal_nan: true,
        }
    }
}
