use crate::ir::{Graph, GraphError};

pub fn verify_graph(graph: &Graph) -> Result<(), GraphError> {
    let mut defined = vec![false; graph.values.len()];

    for input in &graph.inputs {
        define(&mut defined, input.0)?;
    }

    for (index, node) in graph.nodes.iter().enumerate() {
        if node.is_constant()
            && (!node.inputs.is_empty() || node.outputs.len() != 1 || node.attr.is_none())
        {
            return Err(GraphError::MalformedConstant { node: index });
        }
        for input in &node.inputs {
            match defined.get(input.0) {
                None => return Err(GraphError::UnknownValue { value: input.0 }),
                Some(false) => {
                    return Err(GraphError::UseBeforeDef {
                        value: input.0,
                        node: index,
                    });
                }
                Some(true) => {}
            }
        }
        for output in &node.outputs {
            define(&mut defined, output.0)?;
        }
    }

    if graph.outputs.is_empty() {
        return Err(GraphError::NoOutputs);
    }
    for output in &graph.outputs {
        if !defined.get(output.0).copied().unwrap_or(false) {
            return Err(GraphError::UndefinedOutput { value: output.0 });
        }
    }
    Ok(())
}

fn define(defined: &mut [bool], value: usize) -> Result<(), GraphError> {
    let Some(slot) = defined.get_mut(value) else {
        return Err(GraphError::UnknownValue { value });
    };
    if *slot {
        return Err(GraphError::DuplicateDefinition { value });
    }
    *slot = true;
    Ok(())
}
