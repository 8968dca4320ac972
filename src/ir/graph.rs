use thiserror::Error;

use crate::ir::{Node, OpKind, ValueId, ValueType};
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct ValueInfo {
    pub ty: ValueType,
    pub name: Option<String>,
}

/// A straight-line SSA computation graph.
///
/// Values are numbered densely. Graph inputs are defined before any node;
/// every other value is defined by exactly one node.
#[derive(Debug, Default, Clone)]
pub struct Graph {
    pub values: Vec<ValueInfo>,
    pub inputs: Vec<ValueId>,
    pub outputs: Vec<ValueId>,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("value %{value} does not exist")]
    UnknownValue { value: usize },
    #[error("value %{value} is used by node {node} before it is defined")]
    UseBeforeDef { value: usize, node: usize },
    #[error("value %{value} is defined more than once")]
    DuplicateDefinition { value: usize },
    #[error("constant node {node} must have no inputs, one output and a payload")]
    MalformedConstant { node: usize },
    #[error("graph has no outputs")]
    NoOutputs,
    #[error("graph output %{value} is never defined")]
    UndefinedOutput { value: usize },
}

impl Graph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh value id without attaching it to a node.
    pub fn new_value(&mut self, ty: ValueType) -> ValueId {
        let id = ValueId(self.values.len());
        self.values.push(ValueInfo { ty, name: None });
        id
    }

    pub fn add_input(&mut self, name: &str, ty: ValueType) -> ValueId {
        let id = self.new_value(ty);
        self.values[id.0].name = Some(name.to_string());
        self.inputs.push(id);
        id
    }

    pub fn add_constant(&mut self, value: impl Into<Value>) -> ValueId {
        let value = value.into();
        let output = self.new_value(ValueType::of(&value));
        self.nodes.push(Node::constant(output, value));
        output
    }

    pub fn add_op(
        &mut self,
        kind: impl Into<OpKind>,
        inputs: &[ValueId],
        output_ty: ValueType,
    ) -> Result<ValueId, GraphError> {
        let outputs = self.add_multi_op(kind, inputs, vec![output_ty])?;
        Ok(outputs[0])
    }

    pub fn add_multi_op(
        &mut self,
        kind: impl Into<OpKind>,
        inputs: &[ValueId],
        output_tys: Vec<ValueType>,
    ) -> Result<Vec<ValueId>, GraphError> {
        for input in inputs {
            self.check_value(*input)?;
        }
        let outputs = output_tys
            .into_iter()
            .map(|ty| self.new_value(ty))
            .collect::<Vec<_>>();
        self.nodes
            .push(Node::new(kind.into(), inputs.to_vec(), outputs.clone()));
        Ok(outputs)
    }

    pub fn add_output(&mut self, value: ValueId) -> Result<(), GraphError> {
        self.check_value(value)?;
        self.outputs.push(value);
        Ok(())
    }

    fn check_value(&self, value: ValueId) -> Result<(), GraphError> {
        if value.0 < self.values.len() {
            Ok(())
        } else {
            Err(GraphError::UnknownValue { value: value.0 })
        }
    }

    #[must_use]
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn value_type(&self, value: ValueId) -> Option<&ValueType> {
        self.values.get(value.0).map(|info| &info.ty)
    }

    pub fn value_name(&self, value: ValueId) -> Option<&str> {
        self.values.get(value.0).and_then(|info| info.name.as_deref())
    }

    /// Node index defining each value, `None` for graph inputs.
    pub fn producers(&self) -> Vec<Option<usize>> {
        let mut table = vec![None; self.values.len()];
        for (index, node) in self.nodes.iter().enumerate() {
            for output in &node.outputs {
                if let Some(slot) = table.get_mut(output.0) {
                    *slot = Some(index);
                }
            }
        }
        table
    }

    /// `(node index, input position)` for every use of `value`.
    pub fn uses(&self, value: ValueId) -> Vec<(usize, usize)> {
        let mut uses = Vec::new();
        for (index, node) in self.nodes.iter().enumerate() {
            for (position, input) in node.inputs.iter().enumerate() {
                if *input == value {
                    uses.push((index, position));
                }
            }
        }
        uses
    }

    pub fn is_graph_output(&self, value: ValueId) -> bool {
        self.outputs.contains(&value)
    }

    pub fn constant_value(&self, value: ValueId) -> Option<&Value> {
        self.nodes
            .iter()
            .find(|node| node.is_constant() && node.outputs.first() == Some(&value))
            .and_then(|node| node.attr.as_ref())
    }

    pub fn replace_all_uses(&mut self, from: ValueId, to: ValueId) {
        for node in &mut self.nodes {
            for input in &mut node.inputs {
                if *input == from {
                    *input = to;
                }
            }
        }
        for output in &mut self.outputs {
            if *output == from {
                *output = to;
            }
        }
    }
}
