//! Helpers shared by the integration tests.
#![allow(dead_code)]

use stasis::ir::{Graph, execute_graph};
use stasis::ops::{OpError, OperatorRegistry, OperatorSchema};
use stasis::runtime::{Kwargs, StaticModule, StaticModuleOptions};
use stasis::tensor::Tensor;
use stasis::value::{Tolerance, Value};

pub const MAYBE_THROW: &str = "tests::maybe_throw";

pub fn floats(shape: &[usize], data: Vec<f32>) -> Value {
    Value::Tensor(Tensor::from_vec(shape.to_vec(), data).expect("tensor shape should match data"))
}

pub fn ints(shape: &[usize], data: Vec<i64>) -> Value {
    Value::Tensor(Tensor::from_vec(shape.to_vec(), data).expect("tensor shape should match data"))
}

/// Deterministic pseudo-random floats in `[-1, 1)`.
pub fn randn(shape: &[usize], seed: u64) -> Value {
    let len = shape.iter().product::<usize>();
    let mut state = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
    let data = (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            ((state >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
        })
        .collect();
    floats(shape, data)
}

/// Copies tensors and containers so two executions never share mutable
/// state through their arguments.
pub fn deep_copy(value: &Value) -> Value {
    match value {
        Value::Tensor(tensor) => {
            Value::Tensor(tensor.deep_clone().expect("tensor copy should succeed"))
        }
        Value::List(items) => Value::list(items.lock().iter().map(deep_copy).collect()),
        Value::Tuple(items) => Value::tuple(items.iter().map(deep_copy).collect()),
        Value::Dict(entries) => {
            let entries = entries
                .lock()
                .iter()
                .map(|(key, value)| (key.clone(), deep_copy(value)))
                .collect::<Vec<_>>();
            Value::dict(entries)
        }
        other => other.clone(),
    }
}

pub fn copy_args(args: &[Value]) -> Vec<Value> {
    args.iter().map(deep_copy).collect()
}

pub fn assert_outputs_close(expected: &[Value], actual: &[Value], label: &str) {
    assert_eq!(expected.len(), actual.len(), "[{label}] output count differs");
    for (index, (expected, actual)) in expected.iter().zip(actual).enumerate() {
        assert!(
            expected.approx_eq(actual, Tolerance::default()),
            "[{label}] output {index} differs: expected {expected:?}, got {actual:?}"
        );
    }
}

/// Builtins plus `tests::maybe_throw(x, should_throw)`, which returns a copy
/// of `x` or raises when `should_throw` is true.
pub fn registry_with_test_ops() -> OperatorRegistry {
    let mut registry = OperatorRegistry::with_builtins();
    registry.register_native(MAYBE_THROW, OperatorSchema::FRESH, |inputs, outputs| {
        if inputs.get(1).and_then(Value::as_bool) == Some(true) {
            return Err(OpError::Raised("maybe_throw was asked to throw".to_string()));
        }
        let input = inputs.first().and_then(Value::as_tensor).ok_or(OpError::InputType {
            index: 0,
            expected: "Tensor",
            actual: "other",
        })?;
        outputs[0] = Value::Tensor(input.deep_clone()?);
        Ok(())
    });
    registry
}

pub fn option_sets() -> Vec<(&'static str, StaticModuleOptions)> {
    vec![
        ("disabled", StaticModuleOptions::disabled()),
        ("default", StaticModuleOptions::default()),
        (
            "optimize_memory",
            StaticModuleOptions {
                optimize_memory: true,
                ..StaticModuleOptions::default()
            },
        ),
    ]
}

/// Checks a graph under every option set: the static runtime must match the
/// generic interpreter on `args`, again on a second call, on `args2` when
/// given, and on `args` once more after that. The leak check runs after
/// every call. Outputs from every call are kept and checked again at the
/// end, so later calls must not write into tensors already returned.
pub fn test_static_runtime(graph: &Graph, args: &[Value], args2: Option<&[Value]>) {
    let registry = registry_with_test_ops();
    let expected = execute_graph(graph, &registry, copy_args(args))
        .expect("baseline execution should succeed");
    let expected2 = args2.map(|args2| {
        execute_graph(graph, &registry, copy_args(args2))
            .expect("baseline execution should succeed")
    });

    for (label, options) in option_sets() {
        let module =
            StaticModule::new(graph, &registry, options).expect("compile should succeed");
        let mut runtime = module.runtime();
        let mut kept = Vec::new();

        for round in 0..2 {
            let actual = runtime
                .run(copy_args(args), Kwargs::new())
                .expect("static run should succeed");
            assert_outputs_close(&expected, &actual, &format!("{label} run {round}"));
            runtime
                .check_for_memory_leak()
                .expect("no leak after run");
            kept.push((format!("{label} run {round}"), &expected, actual));
        }
        assert!(runtime.memory_planner().is_some(), "[{label}] planner after success");

        if let (Some(args2), Some(expected2)) = (args2, &expected2) {
            let actual = runtime
                .run(copy_args(args2), Kwargs::new())
                .expect("static run should succeed");
            assert_outputs_close(expected2, &actual, &format!("{label} second shapes"));
            runtime
                .check_for_memory_leak()
                .expect("no leak after resized run");
            kept.push((format!("{label} second shapes"), expected2, actual));

            let actual = runtime
                .run(copy_args(args), Kwargs::new())
                .expect("static run should succeed");
            assert_outputs_close(&expected, &actual, &format!("{label} back to first shapes"));
            runtime
                .check_for_memory_leak()
                .expect("no leak after run");
        }

        for (run, expected, actual) in &kept {
            assert_outputs_close(expected, actual, &format!("{run}, checked again"));
        }
    }
}
