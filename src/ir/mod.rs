pub mod graph;
pub mod interpreter;
pub mod node;
pub mod op_kind;
pub mod printer;
pub mod types;
pub mod verifier;

pub use graph::{Graph, GraphError, ValueInfo};
pub use interpreter::{InterpreterError, execute_graph};
pub use node::{Node, NodeId, ValueId};
pub use op_kind::OpKind;
pub use printer::print_graph;
pub use types::ValueType;
pub use verifier::verify_graph;
