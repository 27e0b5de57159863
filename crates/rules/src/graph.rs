//! Dependency order over `for_each` edges between discovery steps.

use std::collections::{HashMap, VecDeque};

use crate::schema::ServiceDocument;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("step '{step}' iterates unknown step '{target}'")]
    UnknownStep { step: String, target: String },

    #[error("cycle detected among discovery steps: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

/// Topological order of discovery step indices (Kahn's algorithm).
///
/// Ties are broken by document order, so the result is stable and equals
/// document order whenever the document only references earlier steps.
pub fn discovery_order(doc: &ServiceDocument) -> Result<Vec<usize>, GraphError> {
    let steps = &doc.discovery;
    let index: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; steps.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];

    for (i, step) in steps.iter().enumerate() {
        if let Some(parent) = &step.for_each {
            let &p = index.get(parent.as_str()).ok_or_else(|| GraphError::UnknownStep {
                step: step.id.clone(),
                target: parent.clone(),
            })?;
            dependents[p].push(i);
            in_degree[i] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..steps.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted = Vec::with_capacity(steps.len());

    while let Some(node) = queue.pop_front() {
        sorted.push(node);
        for &dep in &dependents[node] {
            in_degree[dep] -= 1;
            if in_degree[dep] == 0 {
                queue.push_back(dep);
            }
        }
    }

    if sorted.len() != steps.len() {
        let in_cycle = (0..steps.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| steps[i].id.clone())
            .collect();
        return Err(GraphError::Cycle(in_cycle));
    }

    Ok(sorted)
}
