//! Graph rewrites applied while compiling a static module, checked through
//! the compiled node list and through execution.

mod common;

use common::{assert_outputs_close, floats, option_sets, test_static_runtime};
use stasis::ir::{Graph, OpKind, ValueType, execute_graph};
use stasis::ops::OperatorRegistry;
use stasis::runtime::{CompileError, Kwargs, StaticModule, StaticModuleOptions};
use stasis::value::{DictKey, Value};

fn compile(graph: &Graph, options: StaticModuleOptions) -> StaticModule {
    StaticModule::new(graph, &OperatorRegistry::with_builtins(), options)
        .expect("compile should succeed")
}

fn rewrites_of(module: &StaticModule, pass: &str) -> usize {
    module
        .rewrites()
        .iter()
        .find(|count| count.pass == pass)
        .map_or(0, |count| count.rewrites)
}

fn dict_graph(mutate: bool) -> Graph {
    let mut graph = Graph::new();
    let dict = graph.add_input("d", ValueType::dict(ValueType::Str, ValueType::Tensor));
    let extra = graph.add_input("extra", ValueType::Tensor);
    let key_a = graph.add_constant(Value::str("a"));
    let key_b = graph.add_constant(Value::str("b"));
    let first = graph
        .add_op(OpKind::GETITEM, &[dict, key_a], ValueType::Tensor)
        .expect("add op should succeed");
    if mutate {
        graph
            .add_multi_op(OpKind::SET_ITEM, &[dict, key_b, extra], Vec::new())
            .expect("add op should succeed");
    }
    let second = graph
        .add_op(OpKind::GETITEM, &[dict, key_b], ValueType::Tensor)
        .expect("add op should succeed");
    let out = graph
        .add_op(OpKind::MUL, &[first, second], ValueType::Tensor)
        .expect("add op should succeed");
    graph.add_output(out).expect("add output should succeed");
    graph
}

fn dict_args() -> Vec<Value> {
    vec![
        Value::dict([
            (DictKey::Str("a".into()), floats(&[3], vec![1.0, 2.0, 3.0])),
            (DictKey::Str("b".into()), floats(&[3], vec![4.0, 5.0, 6.0])),
        ]),
        floats(&[3], vec![-1.0, 0.5, 2.0]),
    ]
}

#[test]
fn immutable_dict_lookups_become_one_unpack() {
    let module = compile(&dict_graph(false), StaticModuleOptions::default());
    assert_eq!(module.nodes_with_kind(OpKind::DICT_UNPACK), 1);
    assert_eq!(module.nodes_with_kind(OpKind::GETITEM), 0);
    assert_eq!(rewrites_of(&module, "remove_immutable_dict_lookups"), 1);
    test_static_runtime(&dict_graph(false), &dict_args(), None);
}

#[test]
fn mutated_dict_keeps_its_lookups() {
    let module = compile(&dict_graph(true), StaticModuleOptions::default());
    assert!(!module.has_node_with_kind(OpKind::DICT_UNPACK));
    assert_eq!(module.nodes_with_kind(OpKind::GETITEM), 2);
    test_static_runtime(&dict_graph(true), &dict_args(), None);
}

/// `d1["a"]` is read on both sides of a write through `d2`.
fn aliased_dict_graph() -> Graph {
    let ty = ValueType::dict(ValueType::Str, ValueType::Tensor);
    let mut graph = Graph::new();
    let first = graph.add_input("d1", ty.clone());
    let second = graph.add_input("d2", ty);
    let replacement = graph.add_input("t", ValueType::Tensor);
    let key = graph.add_constant(Value::str("a"));
    let before = graph
        .add_op(OpKind::GETITEM, &[first, key], ValueType::Tensor)
        .expect("add op should succeed");
    graph
        .add_multi_op(OpKind::SET_ITEM, &[second, key, replacement], Vec::new())
        .expect("add op should succeed");
    let after = graph
        .add_op(OpKind::GETITEM, &[first, key], ValueType::Tensor)
        .expect("add op should succeed");
    let out = graph
        .add_op(OpKind::ADD, &[before, after], ValueType::Tensor)
        .expect("add op should succeed");
    graph.add_output(out).expect("add output should succeed");
    graph
}

/// The same dict bound to both dict inputs.
fn shared_dict_args() -> Vec<Value> {
    let dict = Value::dict([(DictKey::Str("a".into()), floats(&[1], vec![1.0]))]);
    vec![dict.clone(), dict, floats(&[1], vec![10.0])]
}

#[test]
fn aliased_dict_inputs_keep_their_lookups() {
    let graph = aliased_dict_graph();
    let module = compile(&graph, StaticModuleOptions::default());
    assert!(!module.has_node_with_kind(OpKind::DICT_UNPACK));
    assert_eq!(module.nodes_with_kind(OpKind::GETITEM), 2);

    let registry = OperatorRegistry::with_builtins();
    let expected = execute_graph(&graph, &registry, shared_dict_args())
        .expect("baseline execution should succeed");
    assert_outputs_close(&[floats(&[1], vec![11.0])], &expected, "interpreter");

    for (label, options) in option_sets() {
        let module = StaticModule::new(&graph, &registry, options).expect("compile should succeed");
        let mut runtime = module.runtime();
        for round in 0..2 {
            let actual = runtime
                .run(shared_dict_args(), Kwargs::new())
                .expect("static run should succeed");
            assert_outputs_close(&expected, &actual, &format!("{label} run {round}"));
        }
    }
}

fn unpack_graph(intervening: bool) -> Graph {
    let pair = ValueType::Tuple(vec![ValueType::Tensor, ValueType::Tensor]);
    let mut graph = Graph::new();
    let first = graph.add_input("first", pair.clone());
    let second = graph.add_input("second", pair);
    let a = graph
        .add_multi_op(
            OpKind::TUPLE_UNPACK,
            &[first],
            vec![ValueType::Tensor, ValueType::Tensor],
        )
        .expect("add op should succeed");
    let mut left = a[0];
    if intervening {
        left = graph
            .add_op(OpKind::TANH, &[a[0]], ValueType::Tensor)
            .expect("add op should succeed");
    }
    let b = graph
        .add_multi_op(
            OpKind::TUPLE_UNPACK,
            &[second],
            vec![ValueType::Tensor, ValueType::Tensor],
        )
        .expect("add op should succeed");
    let x = graph
        .add_op(OpKind::ADD, &[left, b[0]], ValueType::Tensor)
        .expect("add op should succeed");
    let y = graph
        .add_op(OpKind::MUL, &[a[1], b[1]], ValueType::Tensor)
        .expect("add op should succeed");
    let out = graph
        .add_op(OpKind::SUB, &[x, y], ValueType::Tensor)
        .expect("add op should succeed");
    graph.add_output(out).expect("add output should succeed");
    graph
}

fn pair_args() -> Vec<Value> {
    vec![
        Value::tuple(vec![
            floats(&[2], vec![1.0, 2.0]),
            floats(&[2], vec![3.0, 4.0]),
        ]),
        Value::tuple(vec![
            floats(&[2], vec![0.5, -0.5]),
            floats(&[2], vec![2.0, -2.0]),
        ]),
    ]
}

#[test]
fn adjacent_tuple_unpacks_fuse() {
    let module = compile(&unpack_graph(false), StaticModuleOptions::default());
    assert_eq!(module.nodes_with_kind(OpKind::VAR_TUPLE_UNPACK), 1);
    assert_eq!(module.nodes_with_kind(OpKind::TUPLE_UNPACK), 0);
    test_static_runtime(&unpack_graph(false), &pair_args(), None);
}

#[test]
fn computation_between_unpacks_blocks_fusion() {
    let module = compile(&unpack_graph(true), StaticModuleOptions::default());
    assert_eq!(module.nodes_with_kind(OpKind::VAR_TUPLE_UNPACK), 0);
    assert_eq!(module.nodes_with_kind(OpKind::TUPLE_UNPACK), 2);
    test_static_runtime(&unpack_graph(true), &pair_args(), None);
}

fn join_graph(kind: OpKind) -> Graph {
    let mut graph = Graph::new();
    let a = graph.add_input("a", ValueType::Tensor);
    let b = graph.add_input("b", ValueType::Tensor);
    let relu = graph
        .add_op(OpKind::RELU, &[a], ValueType::Tensor)
        .expect("add op should succeed");
    let list = graph
        .add_op(
            OpKind::LIST_CONSTRUCT,
            &[relu, b],
            ValueType::List(Box::new(ValueType::Tensor)),
        )
        .expect("add op should succeed");
    let dim = graph.add_constant(1i64);
    let joined = graph
        .add_op(kind, &[list, dim], ValueType::Tensor)
        .expect("add op should succeed");
    graph.add_output(joined).expect("add output should succeed");
    graph
}

#[test]
fn cat_and_stack_over_fresh_lists_become_variadic() {
    let args = vec![
        floats(&[2, 2], vec![1.0, -2.0, 3.0, -4.0]),
        floats(&[2, 2], vec![5.0, 6.0, 7.0, 8.0]),
    ];
    for (kind, variadic) in [
        (OpKind::CAT, OpKind::VAR_CAT),
        (OpKind::STACK, OpKind::VAR_STACK),
    ] {
        let graph = join_graph(kind.clone());
        let module = compile(&graph, StaticModuleOptions::default());
        assert_eq!(module.nodes_with_kind(&variadic), 1, "{kind}");
        assert!(!module.has_node_with_kind(&kind), "{kind}");
        assert!(!module.has_node_with_kind(OpKind::LIST_CONSTRUCT), "{kind}");

        let untouched = compile(&graph, StaticModuleOptions::disabled());
        assert_eq!(untouched.nodes_with_kind(&kind), 1, "{kind}");
        test_static_runtime(&graph, &args, None);
    }
}

fn reshape_graph(reshape_is_output: bool) -> Graph {
    let mut graph = Graph::new();
    let a = graph.add_input("a", ValueType::Tensor);
    let relu = graph
        .add_op(OpKind::RELU, &[a], ValueType::Tensor)
        .expect("add op should succeed");
    let shape = graph.add_constant(Value::list(vec![Value::Int(-1)]));
    let reshaped = graph
        .add_op(OpKind::RESHAPE, &[relu, shape], ValueType::Tensor)
        .expect("add op should succeed");
    let out = graph
        .add_op(OpKind::SIGMOID, &[reshaped], ValueType::Tensor)
        .expect("add op should succeed");
    graph.add_output(out).expect("add output should succeed");
    if reshape_is_output {
        graph.add_output(reshaped).expect("add output should succeed");
    }
    graph
}

#[test]
fn internal_reshape_is_replaced_with_copy() {
    let module = compile(&reshape_graph(false), StaticModuleOptions::default());
    assert_eq!(module.nodes_with_kind(OpKind::RESHAPE_COPY), 1);
    assert_eq!(module.nodes_with_kind(OpKind::RESHAPE), 0);
    assert_eq!(rewrites_of(&module, "replace_with_copy"), 1);

    let reshaped_slot = module
        .nodes()
        .iter()
        .find(|node| node.kind() == &OpKind::RESHAPE_COPY)
        .map(|node| node.outputs()[0])
        .expect("reshape_copy node");
    assert!(
        module
            .managed_slots()
            .iter()
            .any(|managed| managed.slot == reshaped_slot)
    );

    let args = vec![floats(&[2, 3], vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0])];
    let args2 = vec![floats(&[4, 2], vec![0.5; 8])];
    test_static_runtime(&reshape_graph(false), &args, Some(&args2));
}

#[test]
fn reshape_returned_from_graph_stays_a_view() {
    let module = compile(&reshape_graph(true), StaticModuleOptions::default());
    assert_eq!(module.nodes_with_kind(OpKind::RESHAPE), 1);
    assert_eq!(module.nodes_with_kind(OpKind::RESHAPE_COPY), 0);

    let args = vec![floats(&[3, 2], vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0])];
    test_static_runtime(&reshape_graph(true), &args, None);
}

#[test]
fn compiled_graph_prints_rewritten_nodes() {
    let module = compile(&reshape_graph(false), StaticModuleOptions::default());
    let printed = module.print_graph();
    assert!(printed.contains(OpKind::RESHAPE_COPY.as_str()), "{printed}");
}

#[test]
fn too_many_values_is_rejected() {
    let mut graph = Graph::new();
    let first = graph.add_input("x0", ValueType::Tensor);
    for index in 1..=usize::from(u16::MAX) {
        graph.add_input(&format!("x{index}"), ValueType::Tensor);
    }
    graph.add_output(first).expect("add output should succeed");

    let err = StaticModule::new(
        &graph,
        &OperatorRegistry::with_builtins(),
        StaticModuleOptions::default(),
    )
    .expect_err("65536 values should not fit u16 slots");
    assert_eq!(
        err,
        CompileError::TooManyValues {
            count: usize::from(u16::MAX) + 1
        }
    );
}

#[test]
fn inputs_bind_by_keyword() {
    let module = compile(&reshape_graph(false), StaticModuleOptions::default());
    let mut runtime = module.runtime();
    let mut kwargs = Kwargs::new();
    kwargs.insert("a".to_string(), floats(&[2], vec![1.0, 2.0]));
    let outputs = runtime
        .run(Vec::new(), kwargs)
        .expect("keyword binding should succeed");
    assert_eq!(outputs.len(), 1);
}
