use crate::ir::OpKind;
use crate::ops::{
    OpError, OperatorRegistry, OperatorSchema, dict_arg, expect_arity, expect_outputs, list_arg,
};
use crate::value::{DictKey, Value};

pub(crate) fn register(registry: &mut OperatorRegistry) {
    registry.register_native(OpKind::LIST_CONSTRUCT, OperatorSchema::ALIASING, |inputs, outputs| {
        expect_outputs(outputs, 1)?;
        outputs[0] = Value::list(inputs.to_vec());
        Ok(())
    });
    registry.register_native(OpKind::TUPLE_CONSTRUCT, OperatorSchema::ALIASING, |inputs, outputs| {
        expect_outputs(outputs, 1)?;
        outputs[0] = Value::tuple(inputs.to_vec());
        Ok(())
    });
    registry.register_native(OpKind::DICT_CONSTRUCT, OperatorSchema::ALIASING, dict_construct);
    registry.register_native(OpKind::TUPLE_UNPACK, OperatorSchema::ALIASING, tuple_unpack);
    registry.register_native(OpKind::VAR_TUPLE_UNPACK, OperatorSchema::ALIASING, var_tuple_unpack);
    registry.register_native(OpKind::GETITEM, OperatorSchema::ALIASING, getitem);
    registry.register_native(OpKind::DICT_UNPACK, OperatorSchema::ALIASING, dict_unpack);
    registry.register_native(OpKind::SET_ITEM, OperatorSchema::MUTATING, set_item);
    registry.register_native(OpKind::APPEND, OperatorSchema::MUTATING, append);
}

fn key_of(value: &Value, index: usize) -> Result<DictKey, OpError> {
    value.as_dict_key().ok_or(OpError::InputType {
        index,
        expected: "int, str or bool key",
        actual: value.type_name(),
    })
}

/// `(k0, v0, k1, v1, ...)`.
fn dict_construct(inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    expect_outputs(outputs, 1)?;
    if inputs.len() % 2 != 0 {
        return Err(OpError::Invalid(
            "DictConstruct expects key/value pairs".to_string(),
        ));
    }
    let entries = inputs
        .chunks(2)
        .enumerate()
        .map(|(pair, chunk)| Ok((key_of(&chunk[0], pair * 2)?, chunk[1].clone())))
        .collect::<Result<Vec<_>, OpError>>()?;
    outputs[0] = Value::dict(entries);
    Ok(())
}

fn tuple_items(value: &Value, index: usize) -> Result<Vec<Value>, OpError> {
    match value {
        Value::Tuple(items) => Ok(items.to_vec()),
        other => Err(OpError::InputType {
            index,
            expected: "tuple",
            actual: other.type_name(),
        }),
    }
}

fn tuple_unpack(inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    expect_arity(inputs, 1)?;
    let items = tuple_items(&inputs[0], 0)?;
    expect_outputs(outputs, items.len())?;
    for (output, item) in outputs.iter_mut().zip(items) {
        *output = item;
    }
    Ok(())
}

/// Unpacks every input tuple in order into one flat output list.
fn var_tuple_unpack(inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    let mut flat = Vec::with_capacity(outputs.len());
    for (index, input) in inputs.iter().enumerate() {
        flat.extend(tuple_items(input, index)?);
    }
    expect_outputs(outputs, flat.len())?;
    for (output, item) in outputs.iter_mut().zip(flat) {
        *output = item;
    }
    Ok(())
}

fn resolve_index(index: i64, len: usize) -> Result<usize, OpError> {
    let resolved = if index < 0 { index + len as i64 } else { index };
    if (0..len as i64).contains(&resolved) {
        Ok(resolved as usize)
    } else {
        Err(OpError::IndexOutOfRange { index, len })
    }
}

fn lookup(dict: &Value, key: &Value, key_index: usize) -> Result<Value, OpError> {
    let Value::Dict(dict) = dict else {
        return Err(OpError::InputType {
            index: 0,
            expected: "dict",
            actual: dict.type_name(),
        });
    };
    let key = key_of(key, key_index)?;
    dict.lock()
        .get(&key)
        .cloned()
        .ok_or_else(|| OpError::MissingKey(key.to_string()))
}

/// `aten::__getitem__` on lists, tuples and dicts.
fn getitem(inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    expect_arity(inputs, 2)?;
    expect_outputs(outputs, 1)?;
    outputs[0] = match &inputs[0] {
        Value::List(list) => {
            let items = list.lock();
            let index = inputs[1].as_int().ok_or(OpError::InputType {
                index: 1,
                expected: "int",
                actual: inputs[1].type_name(),
            })?;
            items[resolve_index(index, items.len())?].clone()
        }
        Value::Tuple(items) => {
            let index = inputs[1].as_int().ok_or(OpError::InputType {
                index: 1,
                expected: "int",
                actual: inputs[1].type_name(),
            })?;
            items[resolve_index(index, items.len())?].clone()
        }
        dict => lookup(dict, &inputs[1], 1)?,
    };
    Ok(())
}

/// `(dict, k0, k1, ...)` produces one output per key.
fn dict_unpack(inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    let Some((dict, keys)) = inputs.split_first() else {
        return Err(OpError::Arity {
            expected: 1,
            actual: 0,
        });
    };
    expect_outputs(outputs, keys.len())?;
    for (position, (output, key)) in outputs.iter_mut().zip(keys).enumerate() {
        *output = lookup(dict, key, position + 1)?;
    }
    Ok(())
}

/// `aten::_set_item(dict, key, value)`. Mutates the dict, no outputs.
fn set_item(inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    expect_arity(inputs, 3)?;
    expect_outputs(outputs, 0)?;
    let dict = dict_arg(inputs, 0)?;
    let key = key_of(&inputs[1], 1)?;
    dict.lock().insert(key, inputs[2].clone());
    Ok(())
}

/// `aten::append(list, item)` returns the same list.
fn append(inputs: &[Value], outputs: &mut [Value]) -> Result<(), OpError> {
    expect_arity(inputs, 2)?;
    expect_outputs(outputs, 1)?;
    let list = list_arg(inputs, 0)?;
    list.lock().push(inputs[1].clone());
    outputs[0] = inputs[0].clone();
    Ok(())
}
