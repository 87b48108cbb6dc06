//! Task dependency graph.
//!
//! Vertices are submitted tasks; an edge from B to A means A must complete
//! before B may start. Edges only ever point at tasks that appeared earlier
//! in submission order, so the graph is acyclic by construction.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::AgentTask;

/// A vertex in the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    /// The task id this node represents.
    pub id: Uuid,
    /// The task itself.
    pub task: AgentTask,
    /// Ids of tasks that must complete before this one starts.
    pub dependencies: HashSet<Uuid>,
    /// Reverse edges, maintained for traversal convenience only.
    pub dependents: HashSet<Uuid>,
}

impl TaskNode {
    pub fn new(task: AgentTask) -> Self {
        Self {
            id: task.id,
            task,
            dependencies: HashSet::new(),
            dependents: HashSet::new(),
        }
    }

    /// A node with no dependencies is a root.
    pub fn is_root(&self) -> bool {
        self.dependencies.is_empty()
    }
}

/// Dependency graph over a batch of tasks, preserving submission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskGraph {
    nodes: HashMap<Uuid, TaskNode>,
    /// Submission order of the node ids.
    order: Vec<Uuid>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node. Later inserts may depend on earlier ones.
    pub fn insert(&mut self, node: TaskNode) {
        self.order.push(node.id);
        self.nodes.insert(node.id, node);
    }

    /// Add a dependency edge: `from` depends on `to`. Also records the
    /// reverse edge. A duplicate edge is a no-op (sets).
    pub fn add_dependency(&mut self, from: Uuid, to: Uuid) {
        if from == to {
            return;
        }
        if let Some(node) = self.nodes.get_mut(&from) {
            node.dependencies.insert(to);
        }
        if let Some(node) = self.nodes.get_mut(&to) {
            node.dependents.insert(from);
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&TaskNode> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Nodes in submission order.
    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Node ids in submission order.
    pub fn ids(&self) -> &[Uuid] {
        &self.order
    }

    /// Ids of nodes with no dependencies, in submission order.
    pub fn roots(&self) -> Vec<Uuid> {
        self.nodes().filter(|n| n.is_root()).map(|n| n.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::task::TaskType;

    #[test]
    fn test_insert_and_roots() {
        let mut graph = TaskGraph::new();
        let a = AgentTask::new(TaskType::CodeGeneration, "a");
        let b = AgentTask::new(TaskType::TestGeneration, "b");
        let (a_id, b_id) = (a.id, b.id);

        graph.insert(TaskNode::new(a));
        graph.insert(TaskNode::new(b));
        graph.add_dependency(b_id, a_id);

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.roots(), vec![a_id]);
        assert!(graph.get(b_id).unwrap().dependencies.contains(&a_id));
        assert!(graph.get(a_id).unwrap().dependents.contains(&b_id));
    }

    #[test]
    fn test_duplicate_edge_is_single() {
        let mut graph = TaskGraph::new();
        let a = AgentTask::new(TaskType::CodeGeneration, "a");
        let b = AgentTask::new(TaskType::TestGeneration, "b");
        let (a_id, b_id) = (a.id, b.id);
        graph.insert(TaskNode::new(a));
        graph.insert(TaskNode::new(b));

        graph.add_dependency(b_id, a_id);
        graph.add_dependency(b_id, a_id);
        assert_eq!(graph.get(b_id).unwrap().dependencies.len(), 1);
    }

    #[test]
    fn test_self_edge_ignored() {
        let mut graph = TaskGraph::new();
        let a = AgentTask::new(TaskType::Custom, "a");
        let a_id = a.id;
        graph.insert(TaskNode::new(a));
        graph.add_dependency(a_id, a_id);
        assert!(graph.get(a_id).unwrap().is_root());
    }
}
