//! Hierarchy-preserving task ordering.
//!
//! Local inserts respect the parent foreign key constraint, so a child
//! arriving before its parent would be rejected. Remote task sets are
//! therefore reordered so every task precedes all of its descendants before
//! they are applied.

use std::collections::HashMap;

use crate::backend::Task;

/// Sorts tasks so parents come before their children.
///
/// Roots (tasks without a parent) are visited depth-first in input order;
/// anything left unvisited afterwards (cycles, or parents not present in the
/// input) is appended in input order. Deterministic for any fixed input.
pub fn sort_by_hierarchy(tasks: Vec<Task>) -> Vec<Task> {
    let mut children: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut roots: Vec<usize> = Vec::new();

    for (index, task) in tasks.iter().enumerate() {
        match task.parent_uid.as_deref() {
            Some(parent) if !parent.is_empty() => {
                children.entry(parent).or_default().push(index);
            }
            _ => roots.push(index),
        }
    }

    let mut order: Vec<usize> = Vec::with_capacity(tasks.len());
    let mut visited = vec![false; tasks.len()];
    let mut stack: Vec<usize> = Vec::new();

    for &root in &roots {
        stack.push(root);
        while let Some(index) = stack.pop() {
            if visited[index] {
                continue;
            }
            visited[index] = true;
            order.push(index);

            if let Some(kids) = children.get(tasks[index].uid.as_str()) {
                // Reversed so children pop in input order.
                for &child in kids.iter().rev() {
                    stack.push(child);
                }
            }
        }
    }

    // Cycles and orphans, in input order. The visited set guards against
    // unbounded traversal on cyclic parent pointers.
    for index in 0..tasks.len() {
        if !visited[index] {
            order.push(index);
        }
    }

    let mut slots: Vec<Option<Task>> = tasks.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}
