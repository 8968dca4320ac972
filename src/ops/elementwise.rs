use crate::ir::OpKind;
use crate::ops::{
    OpError, OperatorRegistry, OperatorSchema, emit, expect_outputs, tensor_arg,
};
use crate::tensor::{DType, Tensor, broadcast_shapes, contiguous_strides};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Remainder,
}

impl BinaryOp {
    fn apply_f32(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Remainder => a - b * (a / b).floor(),
        }
    }

    fn apply_i64(self, a: i64, b: i64) -> i64 {
        match self {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
            // Integer division always promotes to f32 before reaching here.
            BinaryOp::Div if b == 0 => 0,
            BinaryOp::Div => a.wrapping_div(b),
            BinaryOp::Remainder => {
                let rem = a.wrapping_rem(b);
                if rem != 0 && (rem < 0) != (b < 0) {
                    rem + b
                } else {
                    rem
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnaryOp {
    Relu,
    Tanh,
    Sigmoid,
    Abs,
    Neg,
    Exp,
    Log,
}

impl UnaryOp {
    /// Ops that keep integer inputs integral.
    fn preserves_dtype(self) -> bool {
        matches!(self, UnaryOp::Relu | UnaryOp::Abs | UnaryOp::Neg)
    }

    fn apply_f32(self, x: f32) -> f32 {
        match self {
            UnaryOp::Relu => x.max(0.0),
            UnaryOp::Tanh => x.tanh(),
            UnaryOp::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            UnaryOp::Abs => x.abs(),
            UnaryOp::Neg => -x,
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => x.ln(),
        }
    }

    fn apply_i64(self, x: i64) -> i64 {
        match self {
            UnaryOp::Relu => x.max(0),
            UnaryOp::Abs => x.wrapping_abs(),
            UnaryOp::Neg => x.wrapping_neg(),
            _ => x,
        }
    }
}

pub(crate) fn register(registry: &mut OperatorRegistry) {
    for (kind, op) in [
        (OpKind::ADD, BinaryOp::Add),
        (OpKind::SUB, BinaryOp::Sub),
        (OpKind::MUL, BinaryOp::Mul),
        (OpKind::DIV, BinaryOp::Div),
        (OpKind::REMAINDER, BinaryOp::Remainder),
    ] {
        registry.register_out_variant(kind, OperatorSchema::FRESH, move |inputs, outputs| {
            binary(op, inputs, outputs)
        });
    }
    for (kind, op) in [
        (OpKind::RELU, UnaryOp::Relu),
        (OpKind::TANH, UnaryOp::Tanh),
        (OpKind::SIGMOID, UnaryOp::Sigmoid),
        (OpKind::ABS, UnaryOp::Abs),
        (OpKind::NEG, UnaryOp::Neg),
        (OpKind::EXP, UnaryOp::Exp),
        (OpKind::LOG, UnaryOp::Log),
    ] {
        registry.register_out_variant(kind, OperatorSchema::FRESH, move |inputs, outputs| {
            unary(op, inputs, outputs)
        });
    }
    registry.register_out_variant(OpKind::CLONE, OperatorSchema::FRESH, clone);
}

/// Promotes a scalar operand to a rank-0 tensor.
fn operand(inputs: &[Value], index: usize) -> Result<Tensor, OpError> {
    match inputs.get(index) {
        Some(Value::Int(value)) => Ok(Tensor::scalar(*value)),
        Some(Value::Float(value)) => Ok(Tensor::scalar(*value as f32)),
        Some(Value::Bool(value)) => Ok(Tensor::scalar(i64::from(*value))),
        _ => tensor_arg(inputs, index).cloned(),
    }
}

pub(crate) fn promote(left: DType, right: DType) -> DType {
    if left == DType::F32 || right == DType::F32 {
        DType::F32
    } else {
        DType::I64
    }
}

fn binary(op: BinaryOp, inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    expect_outputs(outputs, 1)?;
    if inputs.len() != 2 {
        return Err(OpError::Arity {
            expected: 2,
            actual: inputs.len(),
        });
    }
    let left = tensor_arg(inputs, 0)?;
    let right = operand(inputs, 1)?;
    let out_shape = broadcast_shapes(left.shape(), right.shape())?;
    let dtype = match op {
        BinaryOp::Div => DType::F32,
        _ => promote(left.dtype(), right.dtype()),
    };

    match dtype {
        DType::F32 => {
            let l = left.to_f32_vec()?;
            let r = right.to_f32_vec()?;
            let (l_shape, r_shape) = (left.shape(), right.shape());
            emit(&mut outputs[0], out_shape.clone(), |dst: &mut [f32]| {
                zip_broadcast(dst, &l, l_shape, &r, r_shape, &out_shape, |a, b| {
                    op.apply_f32(a, b)
                });
            })
        }
        DType::I64 => {
            let l = left.to_i64_vec()?;
            let r = right.to_i64_vec()?;
            if op == BinaryOp::Remainder && r.contains(&0) {
                return Err(OpError::Invalid(
                    "integer remainder by zero".to_string(),
                ));
            }
            let (l_shape, r_shape) = (left.shape(), right.shape());
            emit(&mut outputs[0], out_shape.clone(), |dst: &mut [i64]| {
                zip_broadcast(dst, &l, l_shape, &r, r_shape, &out_shape, |a, b| {
                    op.apply_i64(a, b)
                });
            })
        }
    }
}

fn unary(op: UnaryOp, inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    expect_outputs(outputs, 1)?;
    let input = tensor_arg(inputs, 0)?;
    let shape = input.shape().to_vec();
    if input.dtype() == DType::I64 && op.preserves_dtype() {
        let data = input.to_vec::<i64>()?;
        return emit(&mut outputs[0], shape, |dst: &mut [i64]| {
            for (out, x) in dst.iter_mut().zip(data) {
                *out = op.apply_i64(x);
            }
        });
    }
    let data = input.to_f32_vec()?;
    emit(&mut outputs[0], shape, |dst: &mut [f32]| {
        for (out, x) in dst.iter_mut().zip(data) {
            *out = op.apply_f32(x);
        }
    })
}

/// `aten::clone(self, memory_format=None)`.
fn clone(inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    expect_outputs(outputs, 1)?;
    let input = tensor_arg(inputs, 0)?;
    copy_into(input, input.shape().to_vec(), input.dtype(), &mut outputs[0])
}

/// Copies `input` (converted to `dtype`) into `slot` with the given shape.
pub(crate) fn copy_into(
    input: &Tensor,
    shape: Vec<usize>,
    dtype: DType,
    slot: &mut Value,
) -> Result<(), OpError> {
    // The source is gathered before the output is locked; both may live in
    // the same arena.
    match dtype {
        DType::F32 => {
            let data = input.to_f32_vec()?;
            emit(slot, shape, |dst: &mut [f32]| dst.copy_from_slice(&data))
        }
        DType::I64 => {
            let data = input.to_i64_vec()?;
            emit(slot, shape, |dst: &mut [i64]| dst.copy_from_slice(&data))
        }
    }
}

/// Strides that read `shape` as if it were broadcast to `out_shape`.
fn broadcast_strides(shape: &[usize], out_shape: &[usize]) -> Vec<usize> {
    let strides = contiguous_strides(shape);
    let lead = out_shape.len() - shape.len();
    (0..out_shape.len())
        .map(|axis| match axis.checked_sub(lead) {
            Some(index) if shape[index] != 1 => strides[index],
            _ => 0,
        })
        .collect()
}

/// Writes `f(left, right)` for every element of `out_shape` into `out`.
fn zip_broadcast<T: Copy, U>(
    out: &mut [U],
    left: &[T],
    left_shape: &[usize],
    right: &[T],
    right_shape: &[usize],
    out_shape: &[usize],
    f: impl Fn(T, T) -> U,
) {
    if left_shape == out_shape && right_shape == out_shape {
        for ((dst, a), b) in out.iter_mut().zip(left).zip(right) {
            *dst = f(*a, *b);
        }
        return;
    }
    let left_strides = broadcast_strides(left_shape, out_shape);
    let right_strides = broadcast_strides(right_shape, out_shape);
    let rank = out_shape.len();
    let mut index = vec![0usize; rank];
    for dst in out.iter_mut() {
        let mut l = 0;
        let mut r = 0;
        for axis in 0..rank {
            l += index[axis] * left_strides[axis];
            r += index[axis] * right_strides[axis];
        }
        *dst = f(left[l], right[r]);
        for axis in (0..rank).rev() {
            index[axis] += 1;
            if index[axis] < out_shape[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
}
