pub mod dtype;
pub mod storage;
#[allow(clippy::module_inception)]
pub mod tensor;

use thiserror::Error;

pub use dtype::{DType, Element, StorageClass};
pub use storage::{ArenaBuffer, STORAGE_ALIGNMENT, Storage, align_up};
pub use tensor::{Tensor, broadcast_shapes, contiguous_strides, element_count, normalize_dim};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TensorError {
    #[error("tensor shape {shape:?} implies {expected} elements, got {actual}")]
    ElementCount {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    #[error("element count overflows for shape {0:?}")]
    Overflow(Vec<usize>),
    #[error("dtype mismatch: expected {expected}, got {actual}")]
    DTypeMismatch { expected: DType, actual: DType },
    #[error("shapes {left:?} and {right:?} are not broadcastable")]
    Broadcast { left: Vec<usize>, right: Vec<usize> },
    #[error("dimension {dim} is out of range for a rank {rank} tensor")]
    DimOutOfRange { dim: i64, rank: usize },
    #[error("invalid view: {0}")]
    InvalidView(String),
    #[error("storage holds {available} elements, view needs {required}")]
    StorageTooSmall { available: usize, required: usize },
    #[error("storage cannot be viewed as tensor elements: {0}")]
    StorageView(String),
}
