//! Conservative may-alias analysis over graph values.
//!
//! Values are grouped into classes with union-find. An operator whose schema
//! says its outputs may alias its inputs merges all of its inputs and outputs
//! into one class; unknown operators are treated the same way and are also
//! assumed to mutate. Constants and values whose type cannot hold a tensor
//! never join a class. Graph inputs that may be lists or dicts share one class,
//! since a caller can pass the same container for several of them. A class
//! escapes when it contains a graph input or a graph output: storage in an
//! escaping class is visible to the caller.

use crate::ir::{Graph, ValueId};
use crate::ops::{AliasBehavior, OperatorRegistry};

#[derive(Debug, Clone)]
pub struct AliasAnalysis {
    class: Vec<usize>,
    escapes: Vec<bool>,
    mutated: Vec<bool>,
    last_use: Vec<Option<usize>>,
    node_count: usize,
}

impl AliasAnalysis {
    pub fn new(graph: &Graph, registry: &OperatorRegistry) -> Self {
        let count = graph.value_count();
        let mut sets = UnionFind::new(count);
        let mut mutated_values = Vec::new();
        let mut participates = graph
            .values
            .iter()
            .map(|info| info.ty.may_contain_tensor())
            .collect::<Vec<_>>();
        for node in graph.nodes.iter().filter(|node| node.is_constant()) {
            for output in &node.outputs {
                participates[output.0] = false;
            }
        }

        for node in &graph.nodes {
            if node.is_constant() {
                continue;
            }
            let (aliasing, mutates) = match registry.get(&node.kind) {
                Some(entry) => (
                    entry.schema.alias == AliasBehavior::MayAliasInputs,
                    entry.schema.mutates_input,
                ),
                None => (true, true),
            };
            if aliasing {
                let mut members = node
                    .inputs
                    .iter()
                    .chain(&node.outputs)
                    .filter(|value| participates[value.0]);
                if let Some(first) = members.next() {
                    for other in members {
                        sets.union(first.0, other.0);
                    }
                }
            }
            if mutates && let Some(target) = node.inputs.first() {
                mutated_values.push(*target);
            }
        }

        let mut containers = graph
            .inputs
            .iter()
            .filter(|input| graph.values[input.0].ty.may_be_mutable_container());
        if let Some(first) = containers.next() {
            for other in containers {
                sets.union(first.0, other.0);
            }
        }

        let class = (0..count).map(|value| sets.find(value)).collect::<Vec<_>>();
        let mut escapes = vec![false; count];
        for value in graph.inputs.iter().chain(&graph.outputs) {
            escapes[class[value.0]] = true;
        }
        let mut mutated = vec![false; count];
        for value in mutated_values {
            mutated[class[value.0]] = true;
        }

        let node_count = graph.nodes.len();
        let mut last_use = vec![None; count];
        for (index, node) in graph.nodes.iter().enumerate() {
            for value in node.inputs.iter().chain(&node.outputs) {
                let slot = &mut last_use[class[value.0]];
                *slot = Some(slot.map_or(index, |last: usize| last.max(index)));
            }
        }
        for output in &graph.outputs {
            last_use[class[output.0]] = Some(node_count);
        }

        Self {
            class,
            escapes,
            mutated,
            last_use,
            node_count,
        }
    }

    pub fn class_of(&self, value: ValueId) -> usize {
        self.class[value.0]
    }

    pub fn may_alias(&self, a: ValueId, b: ValueId) -> bool {
        self.class_of(a) == self.class_of(b)
    }

    /// The value's storage may be visible outside the graph.
    pub fn escapes(&self, value: ValueId) -> bool {
        self.escapes[self.class_of(value)]
    }

    /// Some operator may mutate a value in the same class.
    pub fn is_mutated(&self, value: ValueId) -> bool {
        self.mutated[self.class_of(value)]
    }

    /// Index of the last node that touches any value in the class, or the
    /// node count when the class reaches a graph output.
    pub fn last_use(&self, value: ValueId) -> usize {
        self.last_use[self.class_of(value)].unwrap_or(self.node_count)
    }
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(count: usize) -> Self {
        Self {
            parent: (0..count).collect(),
        }
    }

    fn find(&mut self, value: usize) -> usize {
        let mut root = value;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = value;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a != b {
            self.parent[a.max(b)] = a.min(b);
        }
    }
}
