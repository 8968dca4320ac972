use crate::ir::{Graph, Node, ValueId};
use crate::value::Value;

pub fn print_graph(graph: &Graph) -> String {
    let inputs = graph
        .inputs
        .iter()
        .map(|id| format!("{} : {}", fmt_value(graph, *id), graph.values[id.0].ty))
        .collect::<Vec<_>>()
        .join(", ");
    let mut lines = vec![format!("graph({inputs}):")];
    for node in &graph.nodes {
        lines.push(format!("  {}", format_node(graph, node)));
    }
    let outputs = graph
        .outputs
        .iter()
        .map(|id| fmt_value(graph, *id))
        .collect::<Vec<_>>()
        .join(", ");
    lines.push(format!("  return ({outputs})"));
    lines.join("\n")
}

fn format_node(graph: &Graph, node: &Node) -> String {
    let outputs = node
        .outputs
        .iter()
        .map(|id| format!("{} : {}", fmt_value(graph, *id), graph.values[id.0].ty))
        .collect::<Vec<_>>()
        .join(", ");
    if let Some(value) = &node.attr {
        return format!("{outputs} = {}[value={}]()", node.kind, fmt_constant(value));
    }
    let inputs = node
        .inputs
        .iter()
        .map(|id| fmt_value(graph, *id))
        .collect::<Vec<_>>()
        .join(", ");
    if outputs.is_empty() {
        format!("= {}({inputs})", node.kind)
    } else {
        format!("{outputs} = {}({inputs})", node.kind)
    }
}

fn fmt_constant(value: &Value) -> String {
    match value {
        Value::None => "None".to_string(),
        Value::Bool(value) => value.to_string(),
        Value::Int(value) => value.to_string(),
        Value::Float(value) => format!("{value:?}"),
        Value::Str(value) => format!("{value:?}"),
        Value::Tensor(tensor) => format!("<Tensor {:?}>", tensor.shape()),
        Value::Tuple(items) => {
            let items = items.iter().map(fmt_constant).collect::<Vec<_>>();
            format!("({})", items.join(", "))
        }
        other => format!("<{}>", other.type_name()),
    }
}

fn fmt_value(graph: &Graph, value: ValueId) -> String {
    match graph.value_name(value) {
        Some(name) => format!("%{name}"),
        None => format!("%{}", value.0),
    }
}
