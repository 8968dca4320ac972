use tracing::debug;

use crate::ir::{Graph, Node, OpKind};
use crate::ops::OperatorRegistry;
use crate::passes::{Pass, run_with_verifier_guard};

/// Fuses back-to-back `prim::TupleUnpack` nodes into one
/// `static_runtime::VarTupleUnpack`.
///
/// Only constant nodes may sit between two unpacks of a run, and a later
/// unpack may not consume an output of an earlier one.
#[derive(Default)]
pub struct VarTupleUnpackPass;

impl VarTupleUnpackPass {
    pub fn new() -> Self {
        Self
    }
}

impl Pass for VarTupleUnpackPass {
    fn name(&self) -> &'static str {
        "var_tuple_unpack"
    }

    fn run(&mut self, graph: &mut Graph, _registry: &OperatorRegistry) -> usize {
        run_with_verifier_guard(graph, |graph| {
            let runs = find_runs(graph);
            for run in runs.iter().rev() {
                debug!(unpacks = run.len(), at = run[0], "fusing tuple unpacks");
                fuse_run(graph, run);
            }
            runs.len()
        })
    }
}

fn find_runs(graph: &Graph) -> Vec<Vec<usize>> {
    let mut runs = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    for (index, node) in graph.nodes.iter().enumerate() {
        if node.is_constant() {
            continue;
        }
        let is_unpack = node.kind == OpKind::TUPLE_UNPACK && node.inputs.len() == 1;
        let depends_on_run = current.iter().any(|earlier| {
            graph.nodes[*earlier]
                .outputs
                .iter()
                .any(|output| node.inputs.contains(output))
        });
        if is_unpack && !depends_on_run {
            current.push(index);
            continue;
        }
        if current.len() >= 2 {
            runs.push(std::mem::take(&mut current));
        }
        current.clear();
        if is_unpack {
            current.push(index);
        }
    }
    if current.len() >= 2 {
        runs.push(current);
    }
    runs
}

/// Replaces the last unpack of `run` with the fused node and drops the rest.
fn fuse_run(graph: &mut Graph, run: &[usize]) {
    let mut inputs = Vec::with_capacity(run.len());
    let mut outputs = Vec::new();
    for index in run {
        let node = &graph.nodes[*index];
        inputs.extend_from_slice(&node.inputs);
        outputs.extend_from_slice(&node.outputs);
    }
    let Some(last) = run.last().copied() else {
        return;
    };
    graph.nodes[last] = Node::new(OpKind::VAR_TUPLE_UNPACK, inputs, outputs);
    let mut index = 0;
    graph.nodes.retain(|_| {
        let keep = index == last || !run.contains(&index);
        index += 1;
        keep
    });
}
