use crate::ir::OpKind;
use crate::ops::elementwise::promote;
use crate::ops::{
    OpError, OperatorRegistry, OperatorSchema, emit, expect_outputs, int_arg, tensor_arg,
    tensor_list_arg,
};
use crate::tensor::{DType, Element, Tensor, normalize_dim};
use crate::value::Value;

pub(crate) fn register(registry: &mut OperatorRegistry) {
    registry.register_out_variant(OpKind::CAT, OperatorSchema::FRESH, |inputs, outputs| {
        let tensors = tensor_list_arg(inputs, 0)?;
        let dim = optional_dim(inputs, 1)?;
        cat(&tensors, dim, outputs)
    });
    registry.register_out_variant(OpKind::STACK, OperatorSchema::FRESH, |inputs, outputs| {
        let tensors = tensor_list_arg(inputs, 0)?;
        let dim = optional_dim(inputs, 1)?;
        stack(&tensors, dim, outputs)
    });
    registry.register_out_variant(OpKind::VAR_CAT, OperatorSchema::FRESH, |inputs, outputs| {
        let (tensors, dim) = variadic_args(inputs)?;
        cat(&tensors, dim, outputs)
    });
    registry.register_out_variant(OpKind::VAR_STACK, OperatorSchema::FRESH, |inputs, outputs| {
        let (tensors, dim) = variadic_args(inputs)?;
        stack(&tensors, dim, outputs)
    });
    registry.register_out_variant(OpKind::MATMUL, OperatorSchema::FRESH, matmul);
}

fn optional_dim(inputs: &[Value], index: usize) -> Result<i64, OpError> {
    match inputs.get(index) {
        None => Ok(0),
        Some(_) => int_arg(inputs, index),
    }
}

/// `(t0, t1, ..., dim)`: every input but the last is a tensor.
fn variadic_args(inputs: &[Value]) -> Result<(Vec<Tensor>, i64), OpError> {
    let Some((last, tensors)) = inputs.split_last() else {
        return Err(OpError::Arity {
            expected: 1,
            actual: 0,
        });
    };
    let dim = last.as_int().ok_or(OpError::InputType {
        index: inputs.len() - 1,
        expected: "int",
        actual: last.type_name(),
    })?;
    let tensors = (0..tensors.len())
        .map(|index| tensor_arg(inputs, index).cloned())
        .collect::<Result<Vec<_>, _>>()?;
    Ok((tensors, dim))
}

fn cat(tensors: &[Tensor], dim: i64, outputs: &mut [Value]) -> Result<(), OpError> {
    expect_outputs(outputs, 1)?;
    let Some(first) = tensors.first() else {
        return Err(OpError::Invalid("cat expects a non-empty tensor list".to_string()));
    };
    let rank = first.rank();
    let dim = normalize_dim(dim, rank)?;
    let mut out_shape = first.shape().to_vec();
    out_shape[dim] = 0;
    let mut dtype = first.dtype();
    for tensor in tensors {
        let compatible = tensor.rank() == rank
            && tensor
                .shape()
                .iter()
                .zip(first.shape())
                .enumerate()
                .all(|(axis, (a, b))| axis == dim || a == b);
        if !compatible {
            return Err(OpError::Invalid(format!(
                "cat: shape {:?} does not match {:?} outside dim {dim}",
                tensor.shape(),
                first.shape()
            )));
        }
        out_shape[dim] += tensor.shape()[dim];
        dtype = promote(dtype, tensor.dtype());
    }

    let outer = first.shape()[..dim].iter().product::<usize>();
    let inner = first.shape()[dim + 1..].iter().product::<usize>();
    match dtype {
        DType::F32 => {
            let parts = tensors
                .iter()
                .map(Tensor::to_f32_vec)
                .collect::<Result<Vec<_>, _>>()?;
            emit(&mut outputs[0], out_shape, |dst: &mut [f32]| {
                interleave(dst, tensors, &parts, dim, outer, inner);
            })
        }
        DType::I64 => {
            let parts = tensors
                .iter()
                .map(Tensor::to_i64_vec)
                .collect::<Result<Vec<_>, _>>()?;
            emit(&mut outputs[0], out_shape, |dst: &mut [i64]| {
                interleave(dst, tensors, &parts, dim, outer, inner);
            })
        }
    }
}

fn interleave<T: Element>(
    out: &mut [T],
    tensors: &[Tensor],
    parts: &[Vec<T>],
    dim: usize,
    outer: usize,
    inner: usize,
) {
    let mut cursor = 0;
    for o in 0..outer {
        for (tensor, part) in tensors.iter().zip(parts) {
            let chunk = tensor.shape()[dim] * inner;
            out[cursor..cursor + chunk].copy_from_slice(&part[o * chunk..(o + 1) * chunk]);
            cursor += chunk;
        }
    }
}

fn stack(tensors: &[Tensor], dim: i64, outputs: &mut [Value]) -> Result<(), OpError> {
    let Some(first) = tensors.first() else {
        return Err(OpError::Invalid("stack expects a non-empty tensor list".to_string()));
    };
    let dim = normalize_dim(dim, first.rank() + 1)?;
    let expanded = tensors
        .iter()
        .map(|tensor| {
            if tensor.shape() != first.shape() {
                return Err(OpError::Invalid(format!(
                    "stack: shape {:?} does not match {:?}",
                    tensor.shape(),
                    first.shape()
                )));
            }
            let mut shape = tensor.shape().to_vec();
            shape.insert(dim, 1);
            // Views need contiguous sources; strided inputs are gathered first.
            if tensor.is_contiguous() {
                Ok(tensor.view(shape)?)
            } else {
                Ok(tensor.deep_clone()?.view(shape)?)
            }
        })
        .collect::<Result<Vec<_>, OpError>>()?;
    cat(&expanded, dim as i64, outputs)
}

/// `aten::matmul` for 2-D operands and batched 3-D operands. A 2-D right
/// operand is broadcast across the batch.
fn matmul(inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    expect_outputs(outputs, 1)?;
    let left = tensor_arg(inputs, 0)?;
    let right = tensor_arg(inputs, 1)?;
    let (batch, m, k, right_batched) = match (left.shape(), right.shape()) {
        ([m, k], [_, _]) => (1, *m, *k, false),
        ([b, m, k], [_, _]) => (*b, *m, *k, false),
        ([b, m, k], [rb, _, _]) if rb == b => (*b, *m, *k, true),
        _ => {
            return Err(OpError::Invalid(format!(
                "matmul: unsupported shapes {:?} and {:?}",
                left.shape(),
                right.shape()
            )));
        }
    };
    let right_rank = right.rank();
    let (rk, n) = (right.shape()[right_rank - 2], right.shape()[right_rank - 1]);
    if rk != k {
        return Err(OpError::Invalid(format!(
            "matmul: inner dimensions differ ({k} vs {rk})"
        )));
    }
    let mut out_shape = vec![m, n];
    if left.rank() == 3 {
        out_shape.insert(0, batch);
    }

    match promote(left.dtype(), right.dtype()) {
        DType::F32 => {
            let (lhs, rhs) = (left.to_f32_vec()?, right.to_f32_vec()?);
            emit(&mut outputs[0], out_shape, |dst: &mut [f32]| {
                gemm(dst, &lhs, &rhs, batch, m, k, n, right_batched);
            })
        }
        DType::I64 => {
            let (lhs, rhs) = (left.to_i64_vec()?, right.to_i64_vec()?);
            emit(&mut outputs[0], out_shape, |dst: &mut [i64]| {
                gemm(dst, &lhs, &rhs, batch, m, k, n, right_batched);
            })
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn gemm<T: Element>(
    out: &mut [T],
    left: &[T],
    right: &[T],
    batch: usize,
    m: usize,
    k: usize,
    n: usize,
    right_batched: bool,
) {
    out.fill(T::default());
    for b in 0..batch {
        let lhs = &left[b * m * k..(b + 1) * m * k];
        let rhs = if right_batched {
            &right[b * k * n..(b + 1) * k * n]
        } else {
            &right[..k * n]
        };
        let dst = &mut out[b * m * n..(b + 1) * m * n];
        for row in 0..m {
            for inner in 0..k {
                let scale = lhs[row * k + inner];
                for col in 0..n {
                    dst[row * n + col] = dst[row * n + col] + scale * rhs[inner * n + col];
                }
            }
        }
    }
}
