//! Flattening of the aggregated process tree into reportable processes.

use crate::process::record::ProcessRecord;
use crate::process::rules::ProcessRules;
use crate::process::tree::{ProcessTree, Usage};

/// Walks the tree top-down and returns the processes worth reporting.
///
/// Per node, in order:
/// 1. the agent itself is dropped together with its subtree;
/// 2. a leaf is emitted;
/// 3. init is skipped and its children are flattened;
/// 4. a high-order process (shell, multiplexer, sudo) is skipped and its
///    children are flattened;
/// 5. anything else is emitted with its aggregated usage and its subtree is
///    not visited.
///
/// The own usage of a skipped init or high-order process is handed down to its
/// first child, so the emitted processes account for every non-excluded byte.
pub fn flatten(tree: &ProcessTree, rules: &ProcessRules) -> Vec<ProcessRecord> {
    let mut out = Vec::new();
    let mut stack: Vec<(usize, Usage)> = tree
        .roots()
        .iter()
        .rev()
        .map(|&idx| (idx, Usage::default()))
        .collect();

    while let Some((idx, carried)) = stack.pop() {
        let node = tree.node(idx);
        let rec = &node.record;

        if rules.is_self(&rec.executable) {
            continue;
        }
        let collapsible = rules.is_init(&rec.command) || rules.is_high_order(&rec.executable);
        if node.children.is_empty() || !collapsible {
            let mut emitted = rec.clone();
            carried.apply_to(&mut emitted);
            out.push(emitted);
            continue;
        }

        let mut handed_down = carried;
        handed_down.add(node.own);
        for (pos, &child) in node.children.iter().enumerate().rev() {
            let carry = if pos == 0 {
                handed_down
            } else {
                Usage::default()
            };
            stack.push((child, carry));
        }
    }

    out
}
