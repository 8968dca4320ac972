//! Operator registry and the builtin operator library.
//!
//! Every kernel has the signature `Fn(&[Value], &mut [Value])`. Out variants
//! receive whatever the output slots held before the call and reuse tensor
//! storage found there; native entries always start from empty outputs.

pub mod containers;
pub mod elementwise;
pub mod join;
pub mod reduction;
pub mod registry;
pub mod shape;

use thiserror::Error;

use crate::tensor::{Element, Tensor, TensorError};
use crate::value::{DictRef, ListRef, Value};

pub use registry::{
    AliasBehavior, KernelFn, OperatorEntry, OperatorRegistry, OperatorSchema, builtin_registry,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OpError {
    #[error("expected {expected} inputs, got {actual}")]
    Arity { expected: usize, actual: usize },
    #[error("expected {expected} outputs, got {actual}")]
    OutputArity { expected: usize, actual: usize },
    #[error("input {index}: expected {expected}, got {actual}")]
    InputType {
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("key {0} not found")]
    MissingKey(String),
    #[error("index {index} is out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("{0}")]
    Invalid(String),
    /// Raised deliberately by an operator implementation.
    #[error("{0}")]
    Raised(String),
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

pub(crate) fn expect_arity(inputs: &[Value], expected: usize) -> Result<(), OpError> {
    if inputs.len() == expected {
        Ok(())
    } else {
        Err(OpError::Arity {
            expected,
            actual: inputs.len(),
        })
    }
}

pub(crate) fn expect_outputs(outputs: &[Value], expected: usize) -> Result<(), OpError> {
    if outputs.len() == expected {
        Ok(())
    } else {
        Err(OpError::OutputArity {
            expected,
            actual: outputs.len(),
        })
    }
}

fn input(inputs: &[Value], index: usize) -> Result<&Value, OpError> {
    inputs.get(index).ok_or(OpError::Arity {
        expected: index + 1,
        actual: inputs.len(),
    })
}

fn type_error(index: usize, expected: &'static str, actual: &Value) -> OpError {
    OpError::InputType {
        index,
        expected,
        actual: actual.type_name(),
    }
}

pub(crate) fn tensor_arg(inputs: &[Value], index: usize) -> Result<&Tensor, OpError> {
    let value = input(inputs, index)?;
    value
        .as_tensor()
        .ok_or_else(|| type_error(index, "Tensor", value))
}

pub(crate) fn int_arg(inputs: &[Value], index: usize) -> Result<i64, OpError> {
    let value = input(inputs, index)?;
    value.as_int().ok_or_else(|| type_error(index, "int", value))
}

pub(crate) fn bool_arg(inputs: &[Value], index: usize) -> Result<bool, OpError> {
    let value = input(inputs, index)?;
    value.as_bool().ok_or_else(|| type_error(index, "bool", value))
}

/// An `int[]` argument given as a list or tuple of ints.
pub(crate) fn int_list_arg(inputs: &[Value], index: usize) -> Result<Vec<i64>, OpError> {
    let value = input(inputs, index)?;
    let items = match value {
        Value::List(list) => list.lock().clone(),
        Value::Tuple(items) => items.to_vec(),
        _ => return Err(type_error(index, "int[]", value)),
    };
    items
        .iter()
        .map(|item| item.as_int().ok_or_else(|| type_error(index, "int[]", value)))
        .collect()
}

pub(crate) fn list_arg(inputs: &[Value], index: usize) -> Result<&ListRef, OpError> {
    match input(inputs, index)? {
        Value::List(list) => Ok(list),
        other => Err(type_error(index, "list", other)),
    }
}

pub(crate) fn dict_arg(inputs: &[Value], index: usize) -> Result<&DictRef, OpError> {
    match input(inputs, index)? {
        Value::Dict(dict) => Ok(dict),
        other => Err(type_error(index, "dict", other)),
    }
}

/// Tensors held by a `Tensor[]` argument.
pub(crate) fn tensor_list_arg(inputs: &[Value], index: usize) -> Result<Vec<Tensor>, OpError> {
    let list = list_arg(inputs, index)?;
    let items = list.lock();
    items
        .iter()
        .map(|item| {
            item.as_tensor()
                .cloned()
                .ok_or_else(|| type_error(index, "Tensor[]", item))
        })
        .collect()
}

/// Resizes the tensor in `slot` to `shape` and lets `fill` write every element
/// in place. The existing tensor is reused when it has the right dtype and
/// nothing else holds its storage; otherwise the slot gets a fresh tensor.
/// `fill` sees stale contents on reuse and must overwrite all of them.
pub(crate) fn emit<T: Element>(
    slot: &mut Value,
    shape: Vec<usize>,
    fill: impl FnOnce(&mut [T]),
) -> Result<(), OpError> {
    if let Value::Tensor(tensor) = slot
        && tensor.dtype() == T::DTYPE
        && tensor.storage().handle_count() == 1
    {
        tensor.resize_(&shape)?;
        return tensor.write_with::<T, OpError>(|dst| {
            fill(dst);
            Ok(())
        });
    }
    let tensor = Tensor::zeros(T::DTYPE, shape)?;
    tensor.write_with::<T, OpError>(|dst| {
        fill(dst);
        Ok(())
    })?;
    *slot = Value::Tensor(tensor);
    Ok(())
}
