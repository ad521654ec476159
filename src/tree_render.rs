//! ASCII tree rendering for component hierarchies.

use crate::models::{ComponentStatus, ComponentTreeNode};

const ACTIVE: char = '●';
const DECOMMISSIONED: char = '✗';

fn status_symbol(status: ComponentStatus) -> char {
    match status {
        ComponentStatus::Active => ACTIVE,
        ComponentStatus::Decommissioned => DECOMMISSIONED,
    }
}

/// Render a component tree as ASCII art with status symbols.
///
/// Example output:
/// ```text
/// Server (hardware)
/// ├── ● Disk (hardware)
/// │   └── ● Controller (firmware)
/// └── ✗ Old PSU (power)
/// ```
pub fn render_tree(nodes: &[ComponentTreeNode]) -> String {
    let mut output = String::new();
    for (i, node) in nodes.iter().enumerate() {
        let is_last = i == nodes.len() - 1;
        render_node(&mut output, node, "", is_last, true);
    }
    output
}

fn render_node(
    output: &mut String,
    node: &ComponentTreeNode,
    prefix: &str,
    is_last: bool,
    is_root: bool,
) {
    let label = format!("{} ({})", node.component.name, node.component.kind);

    if is_root {
        output.push_str(&label);
    } else {
        let branch = if is_last { "└── " } else { "├── " };
        output.push_str(prefix);
        output.push_str(branch);
        output.push(status_symbol(node.component.status));
        output.push(' ');
        output.push_str(&label);
    }
    output.push('\n');

    let child_prefix = if is_root {
        String::new()
    } else {
        let continuation = if is_last { "    " } else { "│   " };
        format!("{}{}", prefix, continuation)
    };

    for (i, child) in node.children.iter().enumerate() {
        let child_is_last = i == node.children.len() - 1;
        render_node(output, child, &child_prefix, child_is_last, false);
    }
}
