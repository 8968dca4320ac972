//! Static runtime against the generic interpreter, across every option set.

mod common;

use common::{
    assert_outputs_close, copy_args, floats, ints, randn, registry_with_test_ops,
    test_static_runtime,
};
use stasis::ir::{Graph, OpKind, ValueType, execute_graph};
use stasis::runtime::{Kwargs, StaticModule, StaticModuleOptions};
use stasis::tensor::DType;
use stasis::value::{DictKey, Value};

fn int_list(values: &[i64]) -> Value {
    Value::list(values.iter().copied().map(Value::Int).collect())
}

fn op(graph: &mut Graph, kind: OpKind, inputs: &[stasis::ir::ValueId]) -> stasis::ir::ValueId {
    graph
        .add_op(kind, inputs, ValueType::Tensor)
        .expect("add op should succeed")
}

#[test]
fn elementwise_sum_adapts_to_new_shapes() {
    let mut graph = Graph::new();
    let a = graph.add_input("a", ValueType::Tensor);
    let b = graph.add_input("b", ValueType::Tensor);
    let sum = op(&mut graph, OpKind::ADD, &[a, b]);
    graph.add_output(sum).expect("add output should succeed");

    let args = [randn(&[2, 3], 1), randn(&[2, 3], 2)];
    let args2 = [randn(&[4, 3, 2], 3), randn(&[4, 3, 2], 4)];
    test_static_runtime(&graph, &args, Some(&args2));
}

#[test]
fn elementwise_chain_with_internal_temporaries() {
    let mut graph = Graph::new();
    let a = graph.add_input("a", ValueType::Tensor);
    let b = graph.add_input("b", ValueType::Tensor);
    let sum = op(&mut graph, OpKind::ADD, &[a, b]);
    let relu = op(&mut graph, OpKind::RELU, &[sum]);
    let product = op(&mut graph, OpKind::MUL, &[relu, a]);
    let tanh = op(&mut graph, OpKind::TANH, &[product]);
    let half = graph.add_constant(0.5f64);
    let scaled = op(&mut graph, OpKind::SUB, &[tanh, half]);
    let sigmoid = op(&mut graph, OpKind::SIGMOID, &[scaled]);
    graph.add_output(sigmoid).expect("add output should succeed");

    let args = [randn(&[3, 4], 5), randn(&[3, 4], 6)];
    let args2 = [randn(&[8, 5], 7), randn(&[8, 5], 8)];
    test_static_runtime(&graph, &args, Some(&args2));
}

#[test]
fn returned_outputs_survive_later_calls() {
    let mut graph = Graph::new();
    let a = graph.add_input("a", ValueType::Tensor);
    let b = graph.add_input("b", ValueType::Tensor);
    let sum = op(&mut graph, OpKind::ADD, &[a, b]);
    let relu = op(&mut graph, OpKind::RELU, &[sum]);
    let tanh = op(&mut graph, OpKind::TANH, &[sum]);
    let product = op(&mut graph, OpKind::MUL, &[relu, tanh]);
    let out = op(&mut graph, OpKind::NEG, &[product]);
    graph.add_output(out).expect("add output should succeed");
    graph.add_output(relu).expect("add output should succeed");

    let registry = registry_with_test_ops();
    let options = StaticModuleOptions {
        optimize_memory: true,
        ..StaticModuleOptions::default()
    };
    let module = StaticModule::new(&graph, &registry, options).expect("compile should succeed");
    let mut runtime = module.runtime();
    let calls = [
        vec![randn(&[2, 3], 11), randn(&[2, 3], 12)],
        vec![randn(&[5, 4], 13), randn(&[5, 4], 14)],
        vec![randn(&[2, 3], 15), randn(&[2, 3], 16)],
        vec![randn(&[1, 2], 17), randn(&[1, 2], 18)],
    ];

    let mut kept = Vec::new();
    for args in &calls {
        let expected = execute_graph(&graph, &registry, copy_args(args))
            .expect("baseline execution should succeed");
        let actual = runtime
            .run(copy_args(args), Kwargs::new())
            .expect("static run should succeed");
        let planner = runtime.memory_planner().expect("planner after success");
        for value in &actual {
            let tensor = value.as_tensor().expect("tensor output");
            assert!(!planner.owns(tensor.storage()));
        }
        kept.push((expected, actual));
    }
    let planner = runtime.memory_planner().expect("planner after success");
    assert!(planner.num_managed_tensors() > 0);

    for (call, (expected, actual)) in kept.iter().enumerate() {
        assert_outputs_close(expected, actual, &format!("outputs of call {call}"));
    }
}

#[test]
fn reshape_and_flatten_views() {
    let mut graph = Graph::new();
    let a = graph.add_input("a", ValueType::Tensor);
    let b = graph.add_input("b", ValueType::Tensor);
    let sum = op(&mut graph, OpKind::ADD, &[a, b]);
    let flat_shape = graph.add_constant(int_list(&[-1]));
    let reshaped = op(&mut graph, OpKind::RESHAPE, &[sum, flat_shape]);
    let relu = op(&mut graph, OpKind::RELU, &[reshaped]);
    let flattened = op(&mut graph, OpKind::FLATTEN, &[a]);
    let out = op(&mut graph, OpKind::ADD, &[relu, flattened]);
    // Returning a view of an input must keep aliasing the caller's tensor.
    let input_view = op(&mut graph, OpKind::RESHAPE, &[a, flat_shape]);
    graph.add_output(out).expect("add output should succeed");
    graph.add_output(input_view).expect("add output should succeed");

    let args = [randn(&[2, 3], 9), randn(&[2, 3], 10)];
    let args2 = [randn(&[4, 3, 2], 11), randn(&[4, 3, 2], 12)];
    test_static_runtime(&graph, &args, Some(&args2));
}

#[test]
fn transpose_then_reshape_copies_strided_data() {
    let mut graph = Graph::new();
    let a = graph.add_input("a", ValueType::Tensor);
    let zero = graph.add_constant(0i64);
    let one = graph.add_constant(1i64);
    let transposed = op(&mut graph, OpKind::TRANSPOSE, &[a, zero, one]);
    let flat_shape = graph.add_constant(int_list(&[-1]));
    let reshaped = op(&mut graph, OpKind::RESHAPE, &[transposed, flat_shape]);
    let out = op(&mut graph, OpKind::NEG, &[reshaped]);
    graph.add_output(out).expect("add output should succeed");

    let args = [randn(&[2, 3], 13)];
    let args2 = [randn(&[5, 4], 14)];
    test_static_runtime(&graph, &args, Some(&args2));
}

#[test]
fn dtype_conversion_between_storage_classes() {
    let mut graph = Graph::new();
    let a = graph.add_input("a", ValueType::Tensor);
    let code = graph.add_constant(DType::I64.code());
    let converted = op(&mut graph, OpKind::TO, &[a, code]);
    let three = graph.add_constant(3i64);
    let rem = op(&mut graph, OpKind::REMAINDER, &[converted, three]);
    let doubled = op(&mut graph, OpKind::ADD, &[rem, rem]);
    graph.add_output(doubled).expect("add output should succeed");

    let args = [floats(&[2, 2], vec![-4.0, 5.5, 7.0, 10.0])];
    let args2 = [floats(&[6], vec![1.0, 2.0, 3.0, -1.0, -2.0, -3.0])];
    test_static_runtime(&graph, &args, Some(&args2));
}

#[test]
fn managed_slot_survives_dtype_change_between_calls() {
    let mut graph = Graph::new();
    let a = graph.add_input("a", ValueType::Tensor);
    let abs = op(&mut graph, OpKind::ABS, &[a]);
    let out = op(&mut graph, OpKind::ADD, &[abs, abs]);
    graph.add_output(out).expect("add output should succeed");

    let args = [randn(&[2, 3], 15)];
    let args2 = [ints(&[3, 3], vec![-1, 2, -3, 4, -5, 6, -7, 8, -9])];
    test_static_runtime(&graph, &args, Some(&args2));
}

#[test]
fn cat_and_stack_over_constructed_lists() {
    let mut graph = Graph::new();
    let a = graph.add_input("a", ValueType::Tensor);
    let b = graph.add_input("b", ValueType::Tensor);
    let list = graph
        .add_op(OpKind::LIST_CONSTRUCT, &[a, b], ValueType::list(ValueType::Tensor))
        .expect("add op should succeed");
    let zero = graph.add_constant(0i64);
    let cat = op(&mut graph, OpKind::CAT, &[list, zero]);
    let relu = op(&mut graph, OpKind::RELU, &[cat]);

    let pair = graph
        .add_op(OpKind::LIST_CONSTRUCT, &[b, a], ValueType::list(ValueType::Tensor))
        .expect("add op should succeed");
    let one = graph.add_constant(1i64);
    let stacked = op(&mut graph, OpKind::STACK, &[pair, one]);
    let summed = graph
        .add_op(OpKind::SUM, &[stacked], ValueType::Tensor)
        .expect("add op should succeed");
    graph.add_output(relu).expect("add output should succeed");
    graph.add_output(summed).expect("add output should succeed");

    let args = [randn(&[2, 3], 16), randn(&[2, 3], 17)];
    let args2 = [randn(&[5, 2], 18), randn(&[5, 2], 19)];
    test_static_runtime(&graph, &args, Some(&args2));
}

#[test]
fn matmul_softmax_and_reductions() {
    let mut graph = Graph::new();
    let x = graph.add_input("x", ValueType::Tensor);
    let w = graph.add_input("w", ValueType::Tensor);
    let product = op(&mut graph, OpKind::MATMUL, &[x, w]);
    let last = graph.add_constant(-1i64);
    let probabilities = op(&mut graph, OpKind::SOFTMAX, &[product, last]);
    let keepdim = graph.add_constant(true);
    let row_sums = op(&mut graph, OpKind::SUM, &[probabilities, last, keepdim]);
    let logits = op(&mut graph, OpKind::EXP, &[product]);
    let total = op(&mut graph, OpKind::SUM, &[logits]);
    graph.add_output(row_sums).expect("add output should succeed");
    graph.add_output(total).expect("add output should succeed");

    let args = [randn(&[3, 4], 20), randn(&[4, 5], 21)];
    let args2 = [randn(&[2, 6, 4], 22), randn(&[4, 3], 23)];
    test_static_runtime(&graph, &args, Some(&args2));
}

#[test]
fn tuple_inputs_are_unpacked() {
    let mut graph = Graph::new();
    let pair = ValueType::Tuple(vec![ValueType::Tensor, ValueType::Tensor]);
    let first = graph.add_input("first", pair.clone());
    let second = graph.add_input("second", pair);
    let left = graph
        .add_multi_op(OpKind::TUPLE_UNPACK, &[first], vec![ValueType::Tensor; 2])
        .expect("add op should succeed");
    let right = graph
        .add_multi_op(OpKind::TUPLE_UNPACK, &[second], vec![ValueType::Tensor; 2])
        .expect("add op should succeed");
    let sum = op(&mut graph, OpKind::ADD, &[left[0], right[0]]);
    let product = op(&mut graph, OpKind::MUL, &[left[1], right[1]]);
    let out = op(&mut graph, OpKind::SUB, &[sum, product]);
    graph.add_output(out).expect("add output should succeed");

    let args = [
        Value::tuple(vec![randn(&[2, 2], 24), randn(&[2, 2], 25)]),
        Value::tuple(vec![randn(&[2, 2], 26), randn(&[2, 2], 27)]),
    ];
    let args2 = [
        Value::tuple(vec![randn(&[3, 1], 28), randn(&[3, 4], 29)]),
        Value::tuple(vec![randn(&[1, 4], 30), randn(&[3, 4], 31)]),
    ];
    test_static_runtime(&graph, &args, Some(&args2));
}

fn tensor_dict(entries: &[(&str, Value)]) -> Value {
    Value::dict(
        entries
            .iter()
            .map(|(key, value)| (DictKey::Str((*key).into()), value.clone())),
    )
}

#[test]
fn immutable_dict_lookups() {
    let mut graph = Graph::new();
    let dict = graph.add_input("d", ValueType::dict(ValueType::Str, ValueType::Tensor));
    let key_a = graph.add_constant(Value::str("a"));
    let key_b = graph.add_constant(Value::str("b"));
    let a = op(&mut graph, OpKind::GETITEM, &[dict, key_a]);
    let b = op(&mut graph, OpKind::GETITEM, &[dict, key_b]);
    let out = op(&mut graph, OpKind::MUL, &[a, b]);
    graph.add_output(out).expect("add output should succeed");

    let args = [tensor_dict(&[("a", randn(&[2, 3], 32)), ("b", randn(&[2, 3], 33))])];
    let args2 = [tensor_dict(&[("a", randn(&[4, 1], 34)), ("b", randn(&[1, 3], 35))])];
    test_static_runtime(&graph, &args, Some(&args2));
}

#[test]
fn mutated_dict_lookups() {
    let mut graph = Graph::new();
    let dict = graph.add_input("d", ValueType::dict(ValueType::Str, ValueType::Tensor));
    let key_a = graph.add_constant(Value::str("a"));
    let key_b = graph.add_constant(Value::str("b"));
    let a = op(&mut graph, OpKind::GETITEM, &[dict, key_a]);
    let doubled = op(&mut graph, OpKind::ADD, &[a, a]);
    graph
        .add_multi_op(OpKind::SET_ITEM, &[dict, key_b, doubled], Vec::new())
        .expect("add op should succeed");
    let b = op(&mut graph, OpKind::GETITEM, &[dict, key_b]);
    let out = op(&mut graph, OpKind::MUL, &[a, b]);
    graph.add_output(out).expect("add output should succeed");

    let args = [tensor_dict(&[("a", randn(&[2, 3], 36)), ("b", randn(&[2, 3], 37))])];
    test_static_runtime(&graph, &args, None);
}

#[test]
fn list_building_and_size_queries() {
    let mut graph = Graph::new();
    let a = graph.add_input("a", ValueType::Tensor);
    let b = graph.add_input("b", ValueType::Tensor);
    let list = graph
        .add_op(OpKind::LIST_CONSTRUCT, &[a], ValueType::list(ValueType::Tensor))
        .expect("add op should succeed");
    let relu = op(&mut graph, OpKind::RELU, &[b]);
    let appended = graph
        .add_op(OpKind::APPEND, &[list, relu], ValueType::list(ValueType::Tensor))
        .expect("add op should succeed");
    let zero = graph.add_constant(0i64);
    let cat = op(&mut graph, OpKind::CAT, &[appended, zero]);
    let rows = graph
        .add_op(OpKind::SIZE, &[cat, zero], ValueType::Int)
        .expect("add op should succeed");
    let scaled = op(&mut graph, OpKind::MUL, &[cat, rows]);
    let sizes = graph
        .add_op(OpKind::SIZE, &[scaled], ValueType::list(ValueType::Int))
        .expect("add op should succeed");
    let minus_one = graph.add_constant(-1i64);
    let last_dim = graph
        .add_op(OpKind::GETITEM, &[sizes, minus_one], ValueType::Int)
        .expect("add op should succeed");
    graph.add_output(scaled).expect("add output should succeed");
    graph.add_output(last_dim).expect("add output should succeed");

    let args = [randn(&[2, 3], 38), randn(&[1, 3], 39)];
    let args2 = [randn(&[4, 2], 40), randn(&[3, 2], 41)];
    test_static_runtime(&graph, &args, Some(&args2));
}

#[test]
fn repeated_and_input_outputs() {
    let mut graph = Graph::new();
    let a = graph.add_input("a", ValueType::Tensor);
    let clone = op(&mut graph, OpKind::CLONE, &[a]);
    let exp = op(&mut graph, OpKind::EXP, &[clone]);
    graph.add_output(exp).expect("add output should succeed");
    graph.add_output(exp).expect("add output should succeed");
    graph.add_output(a).expect("add output should succeed");

    let args = [randn(&[3], 42)];
    let args2 = [randn(&[2, 2, 2], 43)];
    test_static_runtime(&graph, &args, Some(&args2));
}

#[test]
fn integer_arithmetic_with_broadcasting() {
    let mut graph = Graph::new();
    let a = graph.add_input("a", ValueType::Tensor);
    let b = graph.add_input("b", ValueType::Tensor);
    let product = op(&mut graph, OpKind::MUL, &[a, b]);
    let difference = op(&mut graph, OpKind::SUB, &[product, a]);
    let quotient = op(&mut graph, OpKind::DIV, &[difference, b]);
    graph.add_output(difference).expect("add output should succeed");
    graph.add_output(quotient).expect("add output should succeed");

    let args = [ints(&[2, 1], vec![3, -4]), ints(&[3], vec![1, 2, 5])];
    let args2 = [ints(&[1, 2, 1], vec![7, 8]), ints(&[2], vec![-1, 3])];
    test_static_runtime(&graph, &args, Some(&args2));
}
