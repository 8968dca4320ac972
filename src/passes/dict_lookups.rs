use tracing::debug;

use crate::ir::{Graph, Node, OpKind, ValueId, ValueType};
use crate::ops::OperatorRegistry;
use crate::passes::{AliasAnalysis, Pass, run_with_verifier_guard};

/// Collapses constant-key lookups into an immutable dict graph input into a
/// single `static_runtime::dict_unpack`.
///
/// Applies per dict input when every use of it is an `aten::__getitem__` with
/// a constant key and nothing may mutate it. Constant nodes must already be
/// hoisted ahead of other nodes.
#[derive(Default)]
pub struct RemoveImmutableDictLookupsPass;

impl RemoveImmutableDictLookupsPass {
    pub fn new() -> Self {
        Self
    }
}

impl Pass for RemoveImmutableDictLookupsPass {
    fn name(&self) -> &'static str {
        "remove_immutable_dict_lookups"
    }

    fn run(&mut self, graph: &mut Graph, registry: &OperatorRegistry) -> usize {
        run_with_verifier_guard(graph, |graph| {
            let analysis = AliasAnalysis::new(graph, registry);
            let dicts = graph
                .inputs
                .iter()
                .copied()
                .filter(|input| matches!(graph.value_type(*input), Some(ValueType::Dict(..))))
                .collect::<Vec<_>>();
            let mut rewritten = 0;
            for dict in dicts {
                if analysis.is_mutated(dict) || graph.is_graph_output(dict) {
                    continue;
                }
                let Some(lookups) = constant_key_lookups(graph, dict) else {
                    continue;
                };
                if lookups.is_empty() {
                    continue;
                }
                debug!(dict = dict.0, lookups = lookups.len(), "fusing dict lookups");
                fuse_lookups(graph, dict, &lookups);
                rewritten += 1;
            }
            rewritten
        })
    }
}

/// Node indices of every use of `dict`, or `None` if any use is not a
/// constant-key `__getitem__`.
fn constant_key_lookups(graph: &Graph, dict: ValueId) -> Option<Vec<usize>> {
    let mut lookups = Vec::new();
    for (index, position) in graph.uses(dict) {
        let node = &graph.nodes[index];
        let is_lookup = node.kind == OpKind::GETITEM
            && position == 0
            && node.inputs.len() == 2
            && node.inputs[1] != dict
            && graph.constant_value(node.inputs[1]).is_some();
        if !is_lookup {
            return None;
        }
        if lookups.last() != Some(&index) {
            lookups.push(index);
        }
    }
    Some(lookups)
}

fn fuse_lookups(graph: &mut Graph, dict: ValueId, lookups: &[usize]) {
    let mut inputs = vec![dict];
    let mut outputs = Vec::with_capacity(lookups.len());
    for index in lookups {
        let node = &graph.nodes[*index];
        inputs.push(node.inputs[1]);
        outputs.push(node.outputs[0]);
    }
    let first = lookups[0];
    graph.nodes[first] = Node::new(OpKind::DICT_UNPACK, inputs, outputs);
    let mut index = 0;
    graph.nodes.retain(|_| {
        let keep = index == first || !lookups.contains(&index);
        index += 1;
        keep
    });
}
