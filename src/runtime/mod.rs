//! Compiled execution of static graphs.
//!
//! [`StaticModule`] compiles a graph once; each [`StaticRuntime`] created
//! from it executes that plan against its own value table, with tensor
//! storage for internal values served by a [`MemoryPlanner`].

pub mod error;
pub mod liveness;
pub mod memory_planner;
pub mod node_inputs;
pub mod options;
pub mod processed_node;
pub mod static_module;
pub mod static_runtime;

pub use error::{CompileError, RuntimeError};
pub use liveness::{ManagedSlot, SlotUsage, assign_groups};
pub use memory_planner::MemoryPlanner;
pub use node_inputs::{INLINE_CAPACITY, ProcessedNodeInputs};
pub use options::StaticModuleOptions;
pub use processed_node::{ProcessedFunction, ProcessedNode};
pub use static_module::{InputSpec, RewriteCount, StaticModule};
pub use static_runtime::{
    Kwargs, NodeProfile, ProfileReport, RunState, RuntimeStats, StaticRuntime,
};
