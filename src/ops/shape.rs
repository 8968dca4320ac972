use crate::ir::OpKind;
use crate::ops::elementwise::copy_into;
use crate::ops::{
    OpError, OperatorRegistry, OperatorSchema, bool_arg, expect_outputs, int_arg, int_list_arg,
    tensor_arg,
};
use crate::tensor::{DType, Tensor, element_count, normalize_dim};
use crate::value::Value;

pub(crate) fn register(registry: &mut OperatorRegistry) {
    registry.register_native(OpKind::RESHAPE, OperatorSchema::ALIASING, reshape);
    registry.register_native(OpKind::FLATTEN, OperatorSchema::ALIASING, flatten);
    registry.register_native(OpKind::TRANSPOSE, OperatorSchema::ALIASING, transpose);
    registry.register_native(OpKind::TO, OperatorSchema::ALIASING, to);
    registry.register_native(OpKind::SIZE, OperatorSchema::FRESH, size);

    registry.register_out_variant(OpKind::RESHAPE_COPY, OperatorSchema::FRESH, reshape_copy);
    registry.register_out_variant(OpKind::FLATTEN_COPY, OperatorSchema::FRESH, flatten_copy);
    registry.register_out_variant(OpKind::TO_COPY, OperatorSchema::FRESH, to_copy);
}

/// Resolves a requested shape that may contain a single `-1`.
fn infer_shape(requested: &[i64], numel: usize) -> Result<Vec<usize>, OpError> {
    let mut inferred = None;
    let mut known = 1usize;
    for (axis, dim) in requested.iter().enumerate() {
        match *dim {
            -1 if inferred.is_none() => inferred = Some(axis),
            dim if dim >= 0 => known *= dim as usize,
            _ => {
                return Err(OpError::Invalid(format!(
                    "invalid shape {requested:?}"
                )));
            }
        }
    }
    let mut shape = requested
        .iter()
        .map(|dim| (*dim).max(0) as usize)
        .collect::<Vec<_>>();
    match inferred {
        Some(axis) => {
            if known == 0 || numel % known != 0 {
                return Err(OpError::Invalid(format!(
                    "shape {requested:?} is invalid for {numel} elements"
                )));
            }
            shape[axis] = numel / known;
        }
        None if known != numel => {
            return Err(OpError::Invalid(format!(
                "shape {requested:?} is invalid for {numel} elements"
            )));
        }
        None => {}
    }
    Ok(shape)
}

fn flattened_shape(inputs: &[Value], input: &Tensor) -> Result<Vec<usize>, OpError> {
    if input.rank() == 0 {
        return Ok(vec![1]);
    }
    let start = match inputs.get(1) {
        Some(_) => normalize_dim(int_arg(inputs, 1)?, input.rank())?,
        None => 0,
    };
    let end = match inputs.get(2) {
        Some(_) => normalize_dim(int_arg(inputs, 2)?, input.rank())?,
        None => input.rank() - 1,
    };
    if start > end {
        return Err(OpError::Invalid(format!(
            "flatten: start_dim {start} is after end_dim {end}"
        )));
    }
    let shape = input.shape();
    let mut out = shape[..start].to_vec();
    out.push(element_count(&shape[start..=end])?);
    out.extend_from_slice(&shape[end + 1..]);
    Ok(out)
}

/// A view when the layout allows it, otherwise a contiguous copy.
fn view_or_copy(input: &Tensor, shape: Vec<usize>) -> Result<Tensor, OpError> {
    if input.is_contiguous() {
        Ok(input.view(shape)?)
    } else {
        Ok(input.deep_clone()?.view(shape)?)
    }
}

fn reshape(inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    expect_outputs(outputs, 1)?;
    let input = tensor_arg(inputs, 0)?;
    let shape = infer_shape(&int_list_arg(inputs, 1)?, input.numel())?;
    outputs[0] = Value::Tensor(view_or_copy(input, shape)?);
    Ok(())
}

fn reshape_copy(inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    expect_outputs(outputs, 1)?;
    let input = tensor_arg(inputs, 0)?;
    let shape = infer_shape(&int_list_arg(inputs, 1)?, input.numel())?;
    copy_into(input, shape, input.dtype(), &mut outputs[0])
}

fn flatten(inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    expect_outputs(outputs, 1)?;
    let input = tensor_arg(inputs, 0)?;
    let shape = flattened_shape(inputs, input)?;
    outputs[0] = Value::Tensor(view_or_copy(input, shape)?);
    Ok(())
}

fn flatten_copy(inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    expect_outputs(outputs, 1)?;
    let input = tensor_arg(inputs, 0)?;
    let shape = flattened_shape(inputs, input)?;
    copy_into(input, shape, input.dtype(), &mut outputs[0])
}

fn transpose(inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    expect_outputs(outputs, 1)?;
    let input = tensor_arg(inputs, 0)?;
    let rank = input.rank();
    let dim0 = normalize_dim(int_arg(inputs, 1)?, rank)?;
    let dim1 = normalize_dim(int_arg(inputs, 2)?, rank)?;
    outputs[0] = Value::Tensor(input.transpose(dim0, dim1)?);
    Ok(())
}

/// `(self, dtype: int?, copy: bool = False)`. `dtype` uses [`DType::code`].
fn target_dtype(inputs: &[Value], input: &Tensor) -> Result<(DType, bool), OpError> {
    let dtype = match inputs.get(1) {
        None | Some(Value::None) => input.dtype(),
        Some(_) => {
            let code = int_arg(inputs, 1)?;
            DType::from_code(code)
                .ok_or_else(|| OpError::Invalid(format!("unknown dtype code {code}")))?
        }
    };
    let copy = match inputs.get(2) {
        Some(_) => bool_arg(inputs, 2)?,
        None => false,
    };
    Ok((dtype, copy))
}

fn to(inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    expect_outputs(outputs, 1)?;
    let input = tensor_arg(inputs, 0)?;
    let (dtype, copy) = target_dtype(inputs, input)?;
    outputs[0] = if dtype == input.dtype() && !copy {
        Value::Tensor(input.clone())
    } else {
        Value::Tensor(input.cast(dtype)?)
    };
    Ok(())
}

fn to_copy(inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    expect_outputs(outputs, 1)?;
    let input = tensor_arg(inputs, 0)?;
    let (dtype, _) = target_dtype(inputs, input)?;
    copy_into(input, input.shape().to_vec(), dtype, &mut outputs[0])
}

/// `aten::size(self)` returns an int list, `aten::size(self, dim)` an int.
fn size(inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    expect_outputs(outputs, 1)?;
    let input = tensor_arg(inputs, 0)?;
    outputs[0] = match inputs.get(1) {
        Some(_) => {
            let dim = normalize_dim(int_arg(inputs, 1)?, input.rank())?;
            Value::Int(input.shape()[dim] as i64)
        }
        None => Value::list(
            input
                .shape()
                .iter()
                .map(|dim| Value::Int(*dim as i64))
                .collect(),
        ),
    };
    Ok(())
}
