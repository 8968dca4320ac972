//! Compile-time graph rewrites applied before a graph is turned into
//! processed nodes. Each pass returns how many rewrites it applied.

pub mod alias_analysis;
pub mod dce;
pub mod dict_lookups;
pub mod replace_with_copy;
pub mod tuple_unpack;
pub mod variadic;

use crate::ir::{Graph, verify_graph};
use crate::ops::OperatorRegistry;

pub use alias_analysis::AliasAnalysis;
pub use dce::DcePass;
pub use dict_lookups::RemoveImmutableDictLookupsPass;
pub use replace_with_copy::ReplaceWithCopyPass;
pub use tuple_unpack::VarTupleUnpackPass;
pub use variadic::VariadicOpsPass;

pub trait Pass {
    fn name(&self) -> &'static str;
    fn run(&mut self, graph: &mut Graph, registry: &OperatorRegistry) -> usize;
}

pub fn run_with_verifier_guard(
    graph: &mut Graph,
    run: impl FnOnce(&mut Graph) -> usize,
) -> usize {
    debug_assert!(verify_graph(graph).is_ok());
    let rewrites = run(graph);
    debug_assert!(verify_graph(graph).is_ok());
    rewrites
}

/// Moves every constant node ahead of all other nodes, keeping relative
/// order. Constants have no inputs, so this never breaks def-before-use.
pub fn hoist_constants(graph: &mut Graph) {
    let (mut constants, rest): (Vec<_>, Vec<_>) =
        graph.nodes.drain(..).partition(|node| node.is_constant());
    constants.extend(rest);
    graph.nodes = constants;
}

/// True when an operator may write through or retain its inputs.
pub(crate) fn has_side_effects(kind: &crate::ir::OpKind, registry: &OperatorRegistry) -> bool {
    registry
        .get(kind)
        .is_none_or(|entry| entry.schema.mutates_input)
}
