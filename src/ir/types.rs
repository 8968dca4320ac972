use std::fmt;

use crate::value::Value;

/// Static type of a graph value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Tensor,
    Int,
    Float,
    Bool,
    Str,
    None,
    List(Box<ValueType>),
    Tuple(Vec<ValueType>),
    Dict(Box<ValueType>, Box<ValueType>),
    Optional(Box<ValueType>),
    Any,
}

impl ValueType {
    pub fn list(element: ValueType) -> Self {
        ValueType::List(Box::new(element))
    }

    pub fn dict(key: ValueType, value: ValueType) -> Self {
        ValueType::Dict(Box::new(key), Box::new(value))
    }

    pub fn optional(inner: ValueType) -> Self {
        ValueType::Optional(Box::new(inner))
    }

    /// True for types whose values may carry tensor storage.
    pub fn may_contain_tensor(&self) -> bool {
        match self {
            ValueType::Tensor | ValueType::Any => true,
            ValueType::List(inner) | ValueType::Optional(inner) => inner.may_contain_tensor(),
            ValueType::Dict(_, value) => value.may_contain_tensor(),
            ValueType::Tuple(items) => items.iter().any(ValueType::may_contain_tensor),
            ValueType::Int
            | ValueType::Float
            | ValueType::Bool
            | ValueType::Str
            | ValueType::None => false,
        }
    }

    /// True for types whose values may be a list or dict, which callers can
    /// share between several arguments.
    pub fn may_be_mutable_container(&self) -> bool {
        match self {
            ValueType::List(_) | ValueType::Dict(_, _) | ValueType::Any => true,
            ValueType::Optional(inner) => inner.may_be_mutable_container(),
            ValueType::Tuple(items) => items.iter().any(ValueType::may_be_mutable_container),
            ValueType::Tensor
            | ValueType::Int
            | ValueType::Float
            | ValueType::Bool
            | ValueType::Str
            | ValueType::None => false,
        }
    }

    /// Shallow check that `value` can be bound to a value of this type.
    /// Container element types are not inspected.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ValueType::Any, _) | (ValueType::Optional(_), Value::None) => true,
            (ValueType::Optional(inner), value) => inner.accepts(value),
            (ValueType::Float, Value::Float(_) | Value::Int(_)) => true,
            (ValueType::Tensor, Value::Tensor(_))
            | (ValueType::Int, Value::Int(_))
            | (ValueType::Bool, Value::Bool(_))
            | (ValueType::Str, Value::Str(_))
            | (ValueType::None, Value::None)
            | (ValueType::List(_), Value::List(_))
            | (ValueType::Dict(_, _), Value::Dict(_)) => true,
            (ValueType::Tuple(items), Value::Tuple(values)) => items.len() == values.len(),
            _ => false,
        }
    }

    /// Best-effort type of a concrete value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::None => ValueType::None,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::Str,
            Value::Tensor(_) => ValueType::Tensor,
            Value::List(_) => ValueType::list(ValueType::Any),
            Value::Tuple(items) => ValueType::Tuple(items.iter().map(ValueType::of).collect()),
            Value::Dict(_) => ValueType::dict(ValueType::Any, ValueType::Any),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Tensor => write!(f, "Tensor"),
            ValueType::Int => write!(f, "int"),
            ValueType::Float => write!(f, "float"),
            ValueType::Bool => write!(f, "bool"),
            ValueType::Str => write!(f, "str"),
            ValueType::None => write!(f, "NoneType"),
            ValueType::List(inner) => write!(f, "{inner}[]"),
            ValueType::Tuple(items) => {
                let items = items
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "({items})")
            }
            ValueType::Dict(key, value) => write!(f, "Dict({key}, {value})"),
            ValueType::Optional(inner) => write!(f, "{inner}?"),
            ValueType::Any => write!(f, "Any"),
        }
    }
}
