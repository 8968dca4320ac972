use crate::ir::OpKind;
use crate::ops::{
    OpError, OperatorRegistry, OperatorSchema, bool_arg, emit, expect_outputs, int_list_arg,
    tensor_arg,
};
use crate::tensor::{DType, Element, contiguous_strides, normalize_dim};
use crate::value::Value;

pub(crate) fn register(registry: &mut OperatorRegistry) {
    registry.register_out_variant(OpKind::SUM, OperatorSchema::FRESH, sum);
    registry.register_out_variant(OpKind::SOFTMAX, OperatorSchema::FRESH, softmax);
}

/// `aten::sum(self)` or `aten::sum(self, dim, keepdim=False)` where `dim` is
/// an int or an int list.
fn sum(inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    expect_outputs(outputs, 1)?;
    let input = tensor_arg(inputs, 0)?;
    let rank = input.rank();
    let dims = match inputs.get(1) {
        None | Some(Value::None) => (0..rank).collect::<Vec<_>>(),
        Some(Value::Int(dim)) => vec![normalize_dim(*dim, rank)?],
        Some(_) => int_list_arg(inputs, 1)?
            .into_iter()
            .map(|dim| normalize_dim(dim, rank))
            .collect::<Result<Vec<_>, _>>()?,
    };
    let keepdim = match inputs.get(2) {
        None | Some(Value::None) => false,
        Some(_) => bool_arg(inputs, 2)?,
    };

    let mut reduced = vec![false; rank];
    for dim in &dims {
        reduced[*dim] = true;
    }
    let out_shape = input
        .shape()
        .iter()
        .zip(&reduced)
        .filter_map(|(size, is_reduced)| match (*is_reduced, keepdim) {
            (false, _) => Some(*size),
            (true, true) => Some(1),
            (true, false) => None,
        })
        .collect::<Vec<_>>();

    match input.dtype() {
        DType::F32 => {
            let data = input.to_vec::<f32>()?;
            emit(&mut outputs[0], out_shape, |dst: &mut [f32]| {
                reduce_sum(dst, input.shape(), &data, &reduced);
            })
        }
        DType::I64 => {
            let data = input.to_vec::<i64>()?;
            emit(&mut outputs[0], out_shape, |dst: &mut [i64]| {
                reduce_sum(dst, input.shape(), &data, &reduced);
            })
        }
    }
}

/// Accumulates `data` (laid out as `shape`) into `out`, collapsing the
/// `reduced` axes.
fn reduce_sum<T: Element>(out: &mut [T], shape: &[usize], data: &[T], reduced: &[bool]) {
    let kept = shape
        .iter()
        .zip(reduced)
        .map(|(size, is_reduced)| if *is_reduced { 1 } else { *size })
        .collect::<Vec<_>>();
    let kept_strides = contiguous_strides(&kept);
    out.fill(T::default());
    let mut index = vec![0usize; shape.len()];
    for value in data {
        let target = index
            .iter()
            .zip(&kept_strides)
            .zip(reduced)
            .map(|((i, stride), is_reduced)| if *is_reduced { 0 } else { i * stride })
            .sum::<usize>();
        out[target] = out[target] + *value;
        for axis in (0..shape.len()).rev() {
            index[axis] += 1;
            if index[axis] < shape[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
}

/// `aten::softmax(self, dim, dtype=None)`. Always produces f32.
fn softmax(inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    expect_outputs(outputs, 1)?;
    let input = tensor_arg(inputs, 0)?;
    let dim = normalize_dim(
        inputs.get(1).and_then(Value::as_int).unwrap_or(-1),
        input.rank().max(1),
    )?;
    let data = input.to_f32_vec()?;
    let shape = input.shape();
    let extent = shape.get(dim).copied().unwrap_or(1);
    let inner = shape.get(dim + 1..).map_or(1, |rest| rest.iter().product());
    let outer = shape.get(..dim).map_or(1, |head| head.iter().product());

    emit(&mut outputs[0], shape.to_vec(), |dst: &mut [f32]| {
        dst.copy_from_slice(&data);
        for o in 0..outer {
            for i in 0..inner {
                let base = o * extent * inner + i;
                let lane = (0..extent).map(|k| base + k * inner);
                let max = lane
                    .clone()
                    .map(|index| dst[index])
                    .fold(f32::NEG_INFINITY, f32::max);
                let mut total = 0.0f32;
                for index in lane.clone() {
                    dst[index] = (dst[index] - max).exp();
                    total += dst[index];
                }
                for index in lane {
                    dst[index] /= total;
                }
            }
        }
    })
}
