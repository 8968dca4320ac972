use crate::ir::Graph;
use crate::ops::OperatorRegistry;
use crate::passes::{Pass, has_side_effects, run_with_verifier_guard};

/// Drops nodes whose outputs are never used, keeping side-effecting nodes.
#[derive(Default)]
pub struct DcePass;

impl DcePass {
    pub fn new() -> Self {
        Self
    }
}

impl Pass for DcePass {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn run(&mut self, graph: &mut Graph, registry: &OperatorRegistry) -> usize {
        run_with_verifier_guard(graph, |graph| {
            let mut live_values = vec![false; graph.value_count()];
            for output in &graph.outputs {
                live_values[output.0] = true;
            }

            let mut live_nodes = vec![false; graph.nodes.len()];
            for (index, node) in graph.nodes.iter().enumerate().rev() {
                let live = (!node.is_constant() && has_side_effects(&node.kind, registry))
                    || node.outputs.iter().any(|output| live_values[output.0]);
                if live {
                    live_nodes[index] = true;
                    for input in &node.inputs {
                        live_values[input.0] = true;
                    }
                }
            }

            let before = graph.nodes.len();
            let mut index = 0;
            graph.nodes.retain(|_| {
                let keep = live_nodes[index];
                index += 1;
                keep
            });
            before - graph.nodes.len()
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{Graph, OpKind, ValueType};
    use crate::ops::OperatorRegistry;
    use crate::passes::{DcePass, Pass};
    use crate::value::Value;

    #[test]
    fn removes_unused_chain() {
        let mut graph = Graph::new();
        let a = graph.add_input("a", ValueType::Tensor);
        let unused = graph
            .add_op(OpKind::RELU, &[a], ValueType::Tensor)
            .expect("add op should succeed");
        graph
            .add_op(OpKind::NEG, &[unused], ValueType::Tensor)
            .expect("add op should succeed");
        graph.add_constant(999i64);
        let out = graph
            .add_op(OpKind::TANH, &[a], ValueType::Tensor)
            .expect("add op should succeed");
        graph.add_output(out).expect("add output should succeed");

        let removed = DcePass::new().run(&mut graph, &OperatorRegistry::with_builtins());
        assert_eq!(removed, 3);
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].kind, OpKind::TANH);
    }

    #[test]
    fn keeps_mutations_of_live_containers() {
        let mut graph = Graph::new();
        let dict = graph.add_input("d", ValueType::dict(ValueType::Int, ValueType::Tensor));
        let a = graph.add_input("a", ValueType::Tensor);
        let key = graph.add_constant(Value::Int(0));
        graph
            .add_multi_op(OpKind::SET_ITEM, &[dict, key, a], Vec::new())
            .expect("add op should succeed");
        let out = graph
            .add_op(OpKind::RELU, &[a], ValueType::Tensor)
            .expect("add op should succeed");
        graph.add_output(out).expect("add output should succeed");

        let removed = DcePass::new().run(&mut graph, &OperatorRegistry::with_builtins());
        assert_eq!(removed, 0);
    }
}
