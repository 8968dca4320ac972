use thiserror::Error;

use crate::ir::{GraphError, OpKind};
use crate::ops::OpError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("no implementation registered for operator {kind}")]
    UnresolvedOperator { kind: OpKind },
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("graph needs {count} value slots, more than a u16 index can address")]
    TooManyValues { count: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// An operator failed. The operator's own error is passed through as is.
    #[error(transparent)]
    Operator(#[from] OpError),
    #[error("expected {expected} positional arguments, got {actual}")]
    ArgumentCount { expected: usize, actual: usize },
    #[error("missing value for input {name:?}")]
    MissingArgument { name: String },
    #[error("unexpected keyword argument {name:?}")]
    UnexpectedKeyword { name: String },
    #[error("input {name:?} expects {expected}, got {actual}")]
    ArgumentType {
        name: String,
        expected: String,
        actual: &'static str,
    },
    #[error("slot {slot} leaked: {detail}")]
    MemoryLeak { slot: usize, detail: String },
}
