use tracing::debug;

use crate::ir::{Graph, Node, OpKind};
use crate::ops::OperatorRegistry;
use crate::passes::{AliasAnalysis, Pass, run_with_verifier_guard};

/// Rewrites `cat`/`stack` over a freshly built list into `var_cat`/`var_stack`
/// taking the tensors directly. The list must be used only by that node and
/// must not be a graph output or mutated.
#[derive(Default)]
pub struct VariadicOpsPass;

impl VariadicOpsPass {
    pub fn new() -> Self {
        Self
    }
}

fn variadic_kind(kind: &OpKind) -> Option<OpKind> {
    if *kind == OpKind::CAT {
        Some(OpKind::VAR_CAT)
    } else if *kind == OpKind::STACK {
        Some(OpKind::VAR_STACK)
    } else {
        None
    }
}

impl Pass for VariadicOpsPass {
    fn name(&self) -> &'static str {
        "variadic_ops"
    }

    fn run(&mut self, graph: &mut Graph, registry: &OperatorRegistry) -> usize {
        run_with_verifier_guard(graph, |graph| {
            let candidates = fusable_nodes(graph, registry);
            if candidates.is_empty() {
                return 0;
            }

            let mut shift = 0;
            let mut default_dim = None;
            if candidates
                .iter()
                .any(|index| graph.nodes[*index].inputs.len() < 2)
            {
                let zero = graph.add_constant(0i64);
                if let Some(constant) = graph.nodes.pop() {
                    graph.nodes.insert(0, constant);
                }
                shift = 1;
                default_dim = Some(zero);
            }

            let producers = graph.producers();
            let mut rewritten = 0;
            for index in candidates {
                let index = index + shift;
                let node = &graph.nodes[index];
                let (Some(kind), Some(producer)) =
                    (variadic_kind(&node.kind), producers[node.inputs[0].0])
                else {
                    continue;
                };
                let Some(dim) = node.inputs.get(1).copied().or(default_dim) else {
                    continue;
                };
                let outputs = node.outputs.clone();
                let mut inputs = graph.nodes[producer].inputs.clone();
                inputs.push(dim);
                debug!(
                    node = index,
                    kind = %kind,
                    tensors = inputs.len() - 1,
                    "using variadic op"
                );
                graph.nodes[index] = Node::new(kind, inputs, outputs);
                rewritten += 1;
            }
            rewritten
        })
    }
}

/// `cat`/`stack` nodes whose list input is a single-use, non-escaping,
/// unmutated `prim::ListConstruct`.
fn fusable_nodes(graph: &Graph, registry: &OperatorRegistry) -> Vec<usize> {
    let analysis = AliasAnalysis::new(graph, registry);
    let producers = graph.producers();
    let mut candidates = Vec::new();
    for (index, node) in graph.nodes.iter().enumerate() {
        if variadic_kind(&node.kind).is_none() {
            continue;
        }
        let Some(list) = node.inputs.first().copied() else {
            continue;
        };
        let Some(list_node) = producers[list.0].map(|producer| &graph.nodes[producer]) else {
            continue;
        };
        let fresh_list = list_node.kind == OpKind::LIST_CONSTRUCT
            && !list_node.inputs.is_empty()
            && graph.uses(list).len() == 1
            && !graph.is_graph_output(list)
            && !analysis.is_mutated(list);
        if fresh_list {
            candidates.push(index);
        }
    }
    candidates
}
