//! Execution planner.
//!
//! Converts a dependency graph into an ordered sequence of layers via
//! breadth-first topological layering (a batched form of Kahn's algorithm).
//! Each layer holds tasks with no dependency on one another, ready to run in
//! parallel once all earlier layers finish. The layer count is the critical
//! path length.

use std::collections::HashSet;
use std::time::Duration;

use tracing::instrument;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::graph::TaskGraph;

/// Assumed per-task cost used for the advisory duration estimates.
const ASSUMED_TASK_COST: Duration = Duration::from_secs(30);

/// An ordered sequence of layers over a task graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// Layers in execution order; each layer lists task ids that may run
    /// concurrently.
    pub layers: Vec<Vec<Uuid>>,
}

impl ExecutionPlan {
    /// Total number of planned tasks.
    pub fn task_count(&self) -> usize {
        self.layers.iter().map(Vec::len).sum()
    }

    /// Task ids flattened in layer order.
    pub fn flatten(&self) -> Vec<Uuid> {
        self.layers.iter().flatten().copied().collect()
    }

    /// Advisory statistics for logs and telemetry. Never used to make
    /// scheduling decisions.
    pub fn stats(&self) -> PlanStats {
        let total_tasks = self.task_count();
        let parallelizable = self
            .layers
            .iter()
            .filter(|layer| layer.len() > 1)
            .map(Vec::len)
            .sum();
        let serial = ASSUMED_TASK_COST * u32::try_from(total_tasks).unwrap_or(u32::MAX);
        let parallel = ASSUMED_TASK_COST * u32::try_from(self.layers.len()).unwrap_or(u32::MAX);
        let speedup = if parallel.is_zero() {
            1.0
        } else {
            serial.as_secs_f64() / parallel.as_secs_f64()
        };
        PlanStats {
            total_tasks,
            parallelizable,
            estimated_serial: serial,
            estimated_parallel: parallel,
            speedup,
        }
    }
}

/// Advisory numbers derived from a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStats {
    /// Tasks in the plan.
    pub total_tasks: usize,
    /// Tasks sitting in a layer with parallelism greater than one.
    pub parallelizable: usize,
    /// Estimated duration if every task ran one after another.
    pub estimated_serial: Duration,
    /// Estimated duration running layer by layer.
    pub estimated_parallel: Duration,
    /// Ratio of the two.
    pub speedup: f64,
}

/// Service turning dependency graphs into layered execution plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionPlanner;

impl ExecutionPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Layer the graph: layer 0 is the roots; layer k+1 is every unplaced
    /// node whose entire dependency set lies in layers 0..k.
    ///
    /// A node that can never be placed indicates a defect in graph
    /// construction (the earlier-only edge rule makes it impossible); it is
    /// surfaced as [`DomainError::UnplannedTasks`], never silently dropped.
    #[instrument(skip_all, fields(node_count = graph.len()))]
    pub fn plan(&self, graph: &TaskGraph) -> DomainResult<ExecutionPlan> {
        let mut layers: Vec<Vec<Uuid>> = Vec::new();
        let mut placed: HashSet<Uuid> = HashSet::new();

        while placed.len() < graph.len() {
            let layer: Vec<Uuid> = graph
                .nodes()
                .filter(|node| !placed.contains(&node.id))
                .filter(|node| node.dependencies.iter().all(|dep| placed.contains(dep)))
                .map(|node| node.id)
                .collect();

            if layer.is_empty() {
                let unplanned: Vec<Uuid> = graph
                    .ids()
                    .iter()
                    .filter(|id| !placed.contains(id))
                    .copied()
                    .collect();
                debug_assert!(
                    unplanned.is_empty(),
                    "unplaceable tasks in an acyclic graph: {unplanned:?}"
                );
                return Err(DomainError::UnplannedTasks(unplanned));
            }

            placed.extend(layer.iter().copied());
            layers.push(layer);
        }

        Ok(ExecutionPlan { layers })
    }

    /// Human-readable layer-by-layer rendering with per-task icon and the
    /// speedup estimate. Intended for logs and CLIs, not for parsing.
    pub fn render(&self, plan: &ExecutionPlan, graph: &TaskGraph) -> String {
        let mut out = String::new();
        out.push_str("Execution plan\n");
        for (i, layer) in plan.layers.iter().enumerate() {
            out.push_str(&format!("  Layer {} ({} task(s)):\n", i, layer.len()));
            for id in layer {
                if let Some(node) = graph.get(*id) {
                    out.push_str(&format!(
                        "    {} [{}] {}\n",
                        node.task.task_type.icon(),
                        node.task.task_type.as_str(),
                        node.task.description
                    ));
                }
            }
        }
        let stats = plan.stats();
        out.push_str(&format!(
            "  {} task(s) over {} layer(s), estimated speedup {:.1}x\n",
            stats.total_tasks,
            plan.layers.len(),
            stats.speedup
        ));
        out
    }
}
