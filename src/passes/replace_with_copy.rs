use tracing::debug;

use crate::ir::{Graph, OpKind};
use crate::ops::{AliasBehavior, OperatorRegistry};
use crate::passes::{AliasAnalysis, Pass, run_with_verifier_guard};

static COPY_VARIANTS: [(OpKind, OpKind); 3] = [
    (OpKind::RESHAPE, OpKind::RESHAPE_COPY),
    (OpKind::FLATTEN, OpKind::FLATTEN_COPY),
    (OpKind::TO, OpKind::TO_COPY),
];

/// Turns view-producing `reshape`/`flatten`/`to` nodes into copy variants
/// whose outputs can be planner managed.
///
/// A node is rewritten only when its result is not a graph output, nothing in
/// its alias class is mutated, and no later node aliases, retains or mutates
/// the result. Anything else keeps the view.
#[derive(Default)]
pub struct ReplaceWithCopyPass;

impl ReplaceWithCopyPass {
    pub fn new() -> Self {
        Self
    }
}

impl Pass for ReplaceWithCopyPass {
    fn name(&self) -> &'static str {
        "replace_with_copy"
    }

    fn run(&mut self, graph: &mut Graph, registry: &OperatorRegistry) -> usize {
        run_with_verifier_guard(graph, |graph| {
            let analysis = AliasAnalysis::new(graph, registry);
            let mut rewrites = Vec::new();
            for (index, node) in graph.nodes.iter().enumerate() {
                let Some(copy_kind) = copy_variant(&node.kind) else {
                    continue;
                };
                let [output] = node.outputs.as_slice() else {
                    continue;
                };
                if graph.is_graph_output(*output) || analysis.is_mutated(*output) {
                    continue;
                }
                let aliased_later = graph.uses(*output).iter().any(|(user, _)| {
                    registry.get(&graph.nodes[*user].kind).is_none_or(|entry| {
                        entry.schema.alias == AliasBehavior::MayAliasInputs
                            || entry.schema.mutates_input
                    })
                });
                if aliased_later {
                    continue;
                }
                rewrites.push((index, copy_kind.clone()));
            }
            for (index, kind) in &rewrites {
                debug!(
                    node = index,
                    from = %graph.nodes[*index].kind,
                    to = %kind,
                    "replacing view with copy"
                );
                graph.nodes[*index].kind = kind.clone();
            }
            rewrites.len()
        })
    }
}

fn copy_variant(kind: &OpKind) -> Option<&'static OpKind> {
    COPY_VARIANTS
        .iter()
        .find(|(view, _)| view == kind)
        .map(|(_, copy)| copy)
}
