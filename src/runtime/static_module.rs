//! Compilation of a [`Graph`] into an immutable, shareable module.
//!
//! ```text
//! Graph -> verify -> hoist constants -> rewrites -> DCE
//!       -> slot assignment -> kernel resolution -> managed-slot liveness
//! ```
//!
//! The compiled state is reference counted. Any number of
//! [`StaticRuntime`]s, each with its own value table and memory planner, can
//! execute the same module concurrently.

use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;

use crate::ir::{Graph, ValueId, ValueType, print_graph, verify_graph};
use crate::ops::OperatorRegistry;
use crate::passes::{
    AliasAnalysis, DcePass, Pass, RemoveImmutableDictLookupsPass, ReplaceWithCopyPass,
    VarTupleUnpackPass, VariadicOpsPass, hoist_constants,
};
use crate::runtime::{
    CompileError, ManagedSlot, ProcessedFunction, ProcessedNode, ProcessedNodeInputs,
    StaticModuleOptions, StaticRuntime,
};
use crate::value::Value;

/// A graph input as seen by callers binding arguments.
#[derive(Debug, Clone)]
pub struct InputSpec {
    pub name: Option<String>,
    pub ty: ValueType,
    pub slot: u16,
}

/// How many rewrites one compile pass applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteCount {
    pub pass: &'static str,
    pub rewrites: usize,
}

#[derive(Debug)]
pub(crate) struct CompiledModule {
    pub(crate) options: StaticModuleOptions,
    pub(crate) graph: Graph,
    pub(crate) nodes: Vec<ProcessedNode>,
    pub(crate) num_slots: usize,
    pub(crate) inputs: Vec<InputSpec>,
    pub(crate) outputs: Vec<u16>,
    pub(crate) constants: Vec<(u16, Value)>,
    pub(crate) managed: Vec<ManagedSlot>,
    pub(crate) rewrites: Vec<RewriteCount>,
}

/// A graph compiled for repeated execution.
#[derive(Debug, Clone)]
pub struct StaticModule {
    inner: Arc<CompiledModule>,
}

impl StaticModule {
    pub fn new(
        graph: &Graph,
        registry: &OperatorRegistry,
        options: StaticModuleOptions,
    ) -> Result<Self, CompileError> {
        verify_graph(graph)?;
        let mut graph = graph.clone();
        hoist_constants(&mut graph);
        let rewrites = optimize(&mut graph, registry, options);
        hoist_constants(&mut graph);
        verify_graph(&graph)?;

        let slots = assign_slots(&graph)?;
        let slot = |value: &ValueId| slots[value.0].unwrap_or_default();

        let inputs = graph
            .inputs
            .iter()
            .map(|input| InputSpec {
                name: graph.value_name(*input).map(str::to_string),
                ty: graph.values[input.0].ty.clone(),
                slot: slot(input),
            })
            .collect();
        let outputs = graph.outputs.iter().map(slot).collect();

        let analysis = AliasAnalysis::new(&graph, registry);
        let mut constants = Vec::new();
        let mut nodes = Vec::with_capacity(graph.nodes.len());
        let mut managed = Vec::new();
        for (index, node) in graph.nodes.iter().enumerate() {
            if let Some(value) = &node.attr {
                constants.push((slot(&node.outputs[0]), value.clone()));
                continue;
            }
            let entry = registry
                .get(&node.kind)
                .ok_or_else(|| CompileError::UnresolvedOperator {
                    kind: node.kind.clone(),
                })?;
            let function = match &entry.out_variant {
                Some(kernel) if options.enable_out_variant => {
                    ProcessedFunction::OutVariant(Arc::clone(kernel))
                }
                _ => ProcessedFunction::Native(Arc::clone(&entry.native)),
            };
            if matches!(function, ProcessedFunction::OutVariant(_)) {
                managed.extend(
                    node.outputs
                        .iter()
                        .filter(|output| {
                            graph.values[output.0].ty == ValueType::Tensor
                                && !analysis.escapes(**output)
                        })
                        .map(|output| ManagedSlot {
                            slot: slot(output),
                            start: index,
                            end: analysis.last_use(*output),
                        }),
                );
            }
            nodes.push(ProcessedNode::new(
                node.kind.clone(),
                function,
                node.inputs.iter().map(slot).collect::<ProcessedNodeInputs>(),
                node.outputs.iter().map(slot).collect::<SmallVec<[u16; 2]>>(),
            ));
        }

        let num_slots = slots.iter().flatten().count();
        debug!(
            nodes = nodes.len(),
            slots = num_slots,
            constants = constants.len(),
            managed = managed.len(),
            "static module compiled"
        );

        Ok(Self {
            inner: Arc::new(CompiledModule {
                options,
                graph,
                nodes,
                num_slots,
                inputs,
                outputs,
                constants,
                managed,
                rewrites,
            }),
        })
    }

    /// A fresh runtime with its own value table.
    pub fn runtime(&self) -> StaticRuntime {
        StaticRuntime::new(Arc::clone(&self.inner))
    }

    pub fn options(&self) -> &StaticModuleOptions {
        &self.inner.options
    }

    /// The graph after every compile-time rewrite.
    pub fn graph(&self) -> &Graph {
        &self.inner.graph
    }

    pub fn print_graph(&self) -> String {
        print_graph(&self.inner.graph)
    }

    pub fn nodes(&self) -> &[ProcessedNode] {
        &self.inner.nodes
    }

    pub fn num_nodes(&self) -> usize {
        self.inner.nodes.len()
    }

    /// Size of each runtime's value table.
    pub fn num_values(&self) -> usize {
        self.inner.num_slots
    }

    pub fn num_inputs(&self) -> usize {
        self.inner.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.inner.outputs.len()
    }

    pub fn inputs(&self) -> &[InputSpec] {
        &self.inner.inputs
    }

    pub fn has_node_with_kind(&self, kind: impl AsRef<str>) -> bool {
        self.nodes_with_kind(kind) > 0
    }

    pub fn nodes_with_kind(&self, kind: impl AsRef<str>) -> usize {
        let kind = kind.as_ref();
        self.inner
            .nodes
            .iter()
            .filter(|node| node.kind().as_str() == kind)
            .count()
    }

    /// Slots whose tensors are candidates for planner-managed storage.
    pub fn managed_slots(&self) -> &[ManagedSlot] {
        &self.inner.managed
    }

    pub fn rewrites(&self) -> &[RewriteCount] {
        &self.inner.rewrites
    }
}

fn optimize(
    graph: &mut Graph,
    registry: &OperatorRegistry,
    options: StaticModuleOptions,
) -> Vec<RewriteCount> {
    let mut passes: Vec<Box<dyn Pass>> = Vec::new();
    if options.remove_immutable_dict_lookups {
        passes.push(Box::new(RemoveImmutableDictLookupsPass::new()));
    }
    if options.use_var_tuple_unpack {
        passes.push(Box::new(VarTupleUnpackPass::new()));
    }
    if options.use_variadic_ops {
        passes.push(Box::new(VariadicOpsPass::new()));
    }
    if options.replace_with_copy {
        passes.push(Box::new(ReplaceWithCopyPass::new()));
    }
    passes.push(Box::new(DcePass::new()));

    passes
        .iter_mut()
        .map(|pass| {
            let rewrites = pass.run(graph, registry);
            debug!(pass = pass.name(), rewrites, "compile pass finished");
            RewriteCount {
                pass: pass.name(),
                rewrites,
            }
        })
        .collect()
}

/// Inputs take the first slots, then constants, then every other node
/// output in node order. Constants are hoisted, so node order already puts
/// them first.
fn assign_slots(graph: &Graph) -> Result<Vec<Option<u16>>, CompileError> {
    let defined = graph
        .inputs
        .iter()
        .chain(graph.nodes.iter().flat_map(|node| &node.outputs))
        .collect::<Vec<_>>();
    if defined.len() > usize::from(u16::MAX) {
        return Err(CompileError::TooManyValues {
            count: defined.len(),
        });
    }

    let mut slots = vec![None; graph.value_count()];
    for (slot, value) in defined.into_iter().enumerate() {
        slots[value.0] = Some(slot as u16);
    }
    Ok(slots)
}
