//! Generic, unoptimized graph execution.
//!
//! Every node runs its native kernel on freshly allocated outputs, in graph
//! order, with no rewrites and no memory planning. This is the baseline the
//! static runtime must agree with.

use thiserror::Error;

use crate::ir::{Graph, GraphError, OpKind, ValueId, verify_graph};
use crate::ops::{OpError, OperatorRegistry};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpreterError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("graph takes {expected} inputs, got {actual}")]
    ArgumentCount { expected: usize, actual: usize },
    #[error("node {node}: no operator registered for {kind}")]
    UnknownOperator { node: usize, kind: OpKind },
    #[error("node {node} ({kind}): {source}")]
    Operator {
        node: usize,
        kind: OpKind,
        #[source]
        source: OpError,
    },
    #[error("value %{value} was read before it was produced")]
    MissingValue { value: usize },
}

pub fn execute_graph(
    graph: &Graph,
    registry: &OperatorRegistry,
    args: Vec<Value>,
) -> Result<Vec<Value>, InterpreterError> {
    verify_graph(graph)?;
    if args.len() != graph.inputs.len() {
        return Err(InterpreterError::ArgumentCount {
            expected: graph.inputs.len(),
            actual: args.len(),
        });
    }

    let mut values: Vec<Option<Value>> = vec![None; graph.value_count()];
    for (input, arg) in graph.inputs.iter().zip(args) {
        values[input.0] = Some(arg);
    }

    for (index, node) in graph.nodes.iter().enumerate() {
        if let Some(constant) = &node.attr {
            values[node.outputs[0].0] = Some(constant.clone());
            continue;
        }
        let entry = registry
            .get(&node.kind)
            .ok_or_else(|| InterpreterError::UnknownOperator {
                node: index,
                kind: node.kind.clone(),
            })?;
        let inputs = node
            .inputs
            .iter()
            .map(|input| read_value(&values, *input))
            .collect::<Result<Vec<_>, _>>()?;
        let mut outputs = vec![Value::None; node.outputs.len()];
        (entry.native)(&inputs, &mut outputs).map_err(|source| InterpreterError::Operator {
            node: index,
            kind: node.kind.clone(),
            source,
        })?;
        for (output, value) in node.outputs.iter().zip(outputs) {
            values[output.0] = Some(value);
        }
    }

    graph
        .outputs
        .iter()
        .map(|output| read_value(&values, *output))
        .collect()
}

fn read_value(values: &[Option<Value>], value: ValueId) -> Result<Value, InterpreterError> {
    values
        .get(value.0)
        .and_then(Option::clone)
        .ok_or(InterpreterError::MissingValue { value: value.0 })
}
