use std::fmt;
use std::mem;

use smallvec::SmallVec;

use crate::ir::OpKind;
use crate::ops::{KernelFn, OpError};
use crate::runtime::ProcessedNodeInputs;
use crate::value::Value;

/// Kernel bound to a processed node at compile time.
#[derive(Clone)]
pub enum ProcessedFunction {
    /// Allocates fresh outputs on every call.
    Native(KernelFn),
    /// Writes into whatever the output slots already hold.
    OutVariant(KernelFn),
}

/// One executable step: a kernel plus the value-table slots it reads and
/// writes.
#[derive(Clone)]
pub struct ProcessedNode {
    kind: OpKind,
    function: ProcessedFunction,
    inputs: ProcessedNodeInputs,
    outputs: SmallVec<[u16; 2]>,
}

impl ProcessedNode {
    pub fn new(
        kind: OpKind,
        function: ProcessedFunction,
        inputs: ProcessedNodeInputs,
        outputs: SmallVec<[u16; 2]>,
    ) -> Self {
        Self {
            kind,
            function,
            inputs,
            outputs,
        }
    }

    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    pub fn inputs(&self) -> &ProcessedNodeInputs {
        &self.inputs
    }

    pub fn outputs(&self) -> &[u16] {
        &self.outputs
    }

    pub fn has_out_variant(&self) -> bool {
        matches!(self.function, ProcessedFunction::OutVariant(_))
    }

    /// Runs the kernel against `values`. Output slots are handed to the
    /// kernel and written back whether or not it succeeds.
    pub fn run(&self, values: &mut [Value]) -> Result<(), OpError> {
        let args = self
            .inputs
            .iter()
            .map(|slot| values[usize::from(*slot)].clone())
            .collect::<SmallVec<[Value; 6]>>();
        let mut outputs = self
            .outputs
            .iter()
            .map(|slot| mem::take(&mut values[usize::from(*slot)]))
            .collect::<SmallVec<[Value; 2]>>();

        let result = match &self.function {
            ProcessedFunction::Native(kernel) | ProcessedFunction::OutVariant(kernel) => {
                kernel(&args, &mut outputs)
            }
        };
        drop(args);

        for (slot, value) in self.outputs.iter().zip(outputs) {
            values[usize::from(*slot)] = value;
        }
        result
    }
}

impl fmt::Debug for ProcessedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessedNode")
            .field("kind", &self.kind)
            .field("out_variant", &self.has_out_variant())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish()
    }
}
