//! # Stasis
//!
//! An ahead-of-time planned execution runtime for static tensor graphs.
//! A graph is compiled once into a flat list of processed nodes over a
//! dense value table; each call then runs those nodes in order, serving
//! the storage of internal tensors from a per-runtime arena.
//!
//! ## Pipeline
//!
//! ```text
//! ir::Graph
//!    │
//!    ▼  ir::verify_graph
//! Verified graph
//!    │
//!    ▼  passes::{dict lookups, var tuple unpack, variadic ops, replace with copy, DCE}
//! Optimized graph
//!    │
//!    ▼  runtime::StaticModule::new
//! Processed nodes + slot layout + managed-slot lifetimes
//!    │
//!    ▼  runtime::StaticRuntime::run
//! Outputs (managed storage planned after the first call)
//! ```
//!
//! ## Quick start
//!
//! ```rust
//! use stasis::ir::{Graph, OpKind, ValueType};
//! use stasis::ops::OperatorRegistry;
//! use stasis::runtime::{Kwargs, StaticModule, StaticModuleOptions};
//! use stasis::tensor::Tensor;
//! use stasis::value::Value;
//!
//! let mut graph = Graph::new();
//! let a = graph.add_input("a", ValueType::Tensor);
//! let b = graph.add_input("b", ValueType::Tensor);
//! let sum = graph.add_op(OpKind::ADD, &[a, b], ValueType::Tensor)?;
//! let out = graph.add_op(OpKind::RELU, &[sum], ValueType::Tensor)?;
//! graph.add_output(out)?;
//!
//! let module = StaticModule::new(
//!     &graph,
//!     &OperatorRegistry::with_builtins(),
//!     StaticModuleOptions::default(),
//! )?;
//! let mut runtime = module.runtime();
//! let a = Tensor::from_vec(vec![2], vec![1.0f32, -4.0])?;
//! let b = Tensor::from_vec(vec![2], vec![1.0f32, 2.0])?;
//! let out = runtime.invoke(vec![Value::Tensor(a), Value::Tensor(b)], Kwargs::new())?;
//! assert_eq!(out.as_tensor().map(|t| t.to_vec::<f32>()).transpose()?, Some(vec![2.0, 0.0]));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::uninlined_format_args,
    clippy::too_many_lines,
    clippy::match_same_arms,
    clippy::needless_pass_by_value,
    clippy::implicit_hasher,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::missing_panics_doc,
    clippy::doc_markdown,
    clippy::struct_excessive_bools,
    clippy::items_after_statements
)]

pub mod ir;
pub mod logging;
pub mod ops;
pub mod passes;
pub mod runtime;
pub mod tensor;
pub mod value;

pub use ir::{Graph, OpKind, ValueType};
pub use ops::{OpError, OperatorRegistry, builtin_registry};
pub use runtime::{
    CompileError, Kwargs, RuntimeError, StaticModule, StaticModuleOptions, StaticRuntime,
};
pub use tensor::{DType, Tensor};
pub use value::Value;
