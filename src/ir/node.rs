use crate::ir::OpKind;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub usize);

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: OpKind,
    pub inputs: Vec<ValueId>,
    pub outputs: Vec<ValueId>,
    /// Payload of `prim::Constant` nodes.
    pub attr: Option<Value>,
}

impl Node {
    pub fn new(kind: OpKind, inputs: Vec<ValueId>, outputs: Vec<ValueId>) -> Self {
        Self {
            kind,
            inputs,
            outputs,
            attr: None,
        }
    }

    pub fn constant(output: ValueId, value: Value) -> Self {
        Self {
            kind: OpKind::CONSTANT,
            inputs: Vec::new(),
            outputs: vec![output],
            attr: Some(value),
        }
    }

    pub fn is_constant(&self) -> bool {
        self.kind == OpKind::CONSTANT
    }
}
