//! Agent pool.
//!
//! A bounded, elastic collection of worker identities. `acquire` is the
//! sole synchronization point between the schedulers that compete for
//! agents: an agent it returns is reserved under the pool lock and cannot
//! be handed to a second caller until released.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::domain::models::agent::{Agent, AgentRole, AgentState};

/// Starter roles assigned to the eagerly created agents, in order.
const STARTER_ROLES: [AgentRole; 5] = [
    AgentRole::Architect,
    AgentRole::Backend,
    AgentRole::Test,
    AgentRole::Frontend,
    AgentRole::Doc,
];

/// Pool sizing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PoolConfig {
    /// Hard ceiling on pool size.
    pub max_agents: usize,
    /// Floor the pool never shrinks below.
    pub min_agents: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_agents: 5,
            min_agents: 3,
        }
    }
}

/// Aggregate pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub total: usize,
    pub idle: usize,
    pub busy: usize,
    pub error: usize,
    pub total_tasks_completed: u64,
}

struct PoolState {
    agents: HashMap<Uuid, Agent>,
    created: usize,
}

/// Bounded, elastic agent pool.
pub struct AgentPool {
    state: Mutex<PoolState>,
    released: Notify,
    config: PoolConfig,
}

impl AgentPool {
    /// Create a pool, eagerly seeding `min_agents` agents with the fixed
    /// starter role assignment.
    pub fn new(config: PoolConfig) -> Self {
        let mut agents = HashMap::new();
        for i in 0..config.min_agents {
            let role = STARTER_ROLES[i % STARTER_ROLES.len()];
            let agent = Agent::new(format!("agent-{i}"), role);
            agents.insert(agent.id, agent);
        }
        let created = config.min_agents;
        Self {
            state: Mutex::new(PoolState { agents, created }),
            released: Notify::new(),
            config,
        }
    }

    /// Hand out an idle agent, preferring `preferred_role`.
    ///
    /// Falls back to any idle agent, then to creating a new one while the
    /// pool is below `max_agents`. Returns `None` when the pool is
    /// exhausted; callers wait on [`AgentPool::wait_released`] and retry.
    /// The returned agent is already reserved (test-and-set under the pool
    /// lock).
    #[instrument(skip(self))]
    pub async fn acquire(&self, preferred_role: Option<AgentRole>) -> Option<Agent> {
        let mut state = self.state.lock().await;

        let pick = preferred_role
            .and_then(|role| {
                state
                    .agents
                    .values()
                    .find(|a| a.is_available() && a.role == role)
                    .map(|a| a.id)
            })
            .or_else(|| {
                state
                    .agents
                    .values()
                    .find(|a| a.is_available())
                    .map(|a| a.id)
            });

        if let Some(id) = pick {
            let agent = state.agents.get_mut(&id)?;
            agent.reserve();
            debug!(agent = %agent.name, role = %agent.role, "agent acquired");
            return Some(agent.clone());
        }

        if state.agents.len() < self.config.max_agents {
            let role = preferred_role.unwrap_or(AgentRole::Backend);
            let mut agent = Agent::new(format!("agent-{}", state.created), role);
            state.created += 1;
            agent.reserve();
            debug!(agent = %agent.name, role = %agent.role, "agent created");
            state.agents.insert(agent.id, agent.clone());
            return Some(agent);
        }

        None
    }

    /// Record the task an acquired agent is working on. Logs and ignores
    /// an unknown agent id (an expected race, not an error).
    pub async fn assign(&self, agent_id: Uuid, task_id: Uuid) {
        let mut state = self.state.lock().await;
        match state.agents.get_mut(&agent_id) {
            Some(agent) => agent.assign(task_id),
            None => warn!(%agent_id, %task_id, "assign on unknown agent"),
        }
    }

    /// Return an agent to the idle state, clear its task, count the
    /// completion, and wake the earliest waiter. No-op if unknown.
    pub async fn release(&self, agent_id: Uuid) {
        {
            let mut state = self.state.lock().await;
            match state.agents.get_mut(&agent_id) {
                Some(agent) => agent.release(),
                None => {
                    warn!(%agent_id, "release on unknown agent");
                    return;
                }
            }
        }
        self.released.notify_one();
    }

    /// Put an agent into the error state. It is never returned by acquire
    /// until explicitly reset. No-op if unknown.
    pub async fn mark_error(&self, agent_id: Uuid) {
        let mut state = self.state.lock().await;
        match state.agents.get_mut(&agent_id) {
            Some(agent) => {
                warn!(agent = %agent.name, "agent marked errored");
                agent.mark_error();
            }
            None => warn!(%agent_id, "mark_error on unknown agent"),
        }
    }

    /// Reset an errored agent back to idle and wake a waiter. Returns
    /// false if the agent is unknown or not errored.
    pub async fn reset_agent(&self, agent_id: Uuid) -> bool {
        let reset = {
            let mut state = self.state.lock().await;
            match state.agents.get_mut(&agent_id) {
                Some(agent) if agent.state == AgentState::Error => {
                    agent.reset();
                    true
                }
                _ => false,
            }
        };
        if reset {
            self.released.notify_one();
        }
        reset
    }

    /// Delete idle agents beyond `min_agents`. Returns how many were
    /// removed.
    pub async fn shrink(&self) -> usize {
        let mut state = self.state.lock().await;
        let excess = state.agents.len().saturating_sub(self.config.min_agents);
        if excess == 0 {
            return 0;
        }
        let victims: Vec<Uuid> = state
            .agents
            .values()
            .filter(|a| a.is_available())
            .map(|a| a.id)
            .take(excess)
            .collect();
        for id in &victims {
            state.agents.remove(id);
        }
        debug!(removed = victims.len(), "pool shrunk");
        victims.len()
    }

    /// Aggregate counters.
    pub async fn stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        let mut stats = PoolStats {
            total: state.agents.len(),
            ..PoolStats::default()
        };
        for agent in state.agents.values() {
            match agent.state {
                AgentState::Idle => stats.idle += 1,
                AgentState::Busy => stats.busy += 1,
                AgentState::Error => stats.error += 1,
            }
            stats.total_tasks_completed += agent.tasks_completed;
        }
        stats
    }

    /// Snapshot of every agent.
    pub async fn all_agents(&self) -> Vec<Agent> {
        let state = self.state.lock().await;
        let mut agents: Vec<Agent> = state.agents.values().cloned().collect();
        agents.sort_by_key(|a| a.created_at);
        agents
    }

    /// Wait until some agent is released or reset. Wakes one waiter per
    /// release so the earliest-queued waiting task gets the agent.
    pub async fn wait_released(&self) {
        self.released.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_seeds_min_agents() {
        let pool = AgentPool::new(PoolConfig::default());
        let stats = pool.stats().await;
        assert_eq!(stats.total, 3);
        assert_eq!(stats.idle, 3);
    }

    #[tokio::test]
    async fn test_acquire_prefers_role() {
        let pool = AgentPool::new(PoolConfig::default());
        let agent = pool.acquire(Some(AgentRole::Test)).await.unwrap();
        assert_eq!(agent.role, AgentRole::Test);
    }

    #[tokio::test]
    async fn test_acquire_falls_back_to_any_idle() {
        let pool = AgentPool::new(PoolConfig {
            max_agents: 3,
            min_agents: 3,
        });
        // Doc is not among the first three starter roles; at the cap the
        // pool hands out whatever is idle.
        let agent = pool.acquire(Some(AgentRole::Doc)).await.unwrap();
        assert_ne!(agent.role, AgentRole::Doc);
    }

    #[tokio::test]
    async fn test_acquire_grows_up_to_max_then_exhausts() {
        let pool = AgentPool::new(PoolConfig::default());
        let mut held = Vec::new();
        for _ in 0..5 {
            held.push(pool.acquire(None).await.unwrap());
        }
        assert!(pool.acquire(None).await.is_none());
        assert_eq!(pool.stats().await.total, 5);
    }

    #[tokio::test]
    async fn test_acquire_is_exclusive_until_release() {
        let pool = AgentPool::new(PoolConfig {
            max_agents: 1,
            min_agents: 1,
        });
        let agent = pool.acquire(None).await.unwrap();
        assert!(pool.acquire(None).await.is_none());

        pool.release(agent.id).await;
        let again = pool.acquire(None).await.unwrap();
        assert_eq!(again.id, agent.id);
    }

    #[tokio::test]
    async fn test_release_counts_completions() {
        let pool = AgentPool::new(PoolConfig::default());
        let agent = pool.acquire(None).await.unwrap();
        pool.assign(agent.id, Uuid::new_v4()).await;
        pool.release(agent.id).await;
        assert_eq!(pool.stats().await.total_tasks_completed, 1);
    }

    #[tokio::test]
    async fn test_errored_agent_is_never_acquired() {
        let pool = AgentPool::new(PoolConfig {
            max_agents: 1,
            min_agents: 1,
        });
        let agent = pool.acquire(None).await.unwrap();
        pool.mark_error(agent.id).await;
        assert!(pool.acquire(None).await.is_none());

        assert!(pool.reset_agent(agent.id).await);
        assert!(pool.acquire(None).await.is_some());
    }

    #[tokio::test]
    async fn test_unknown_ids_are_no_ops() {
        let pool = AgentPool::new(PoolConfig::default());
        pool.assign(Uuid::new_v4(), Uuid::new_v4()).await;
        pool.release(Uuid::new_v4()).await;
        pool.mark_error(Uuid::new_v4()).await;
        assert!(!pool.reset_agent(Uuid::new_v4()).await);
        assert_eq!(pool.stats().await.total, 3);
    }

    #[tokio::test]
    async fn test_shrink_respects_floor() {
        let pool = AgentPool::new(PoolConfig::default());
        let mut held = Vec::new();
        for _ in 0..5 {
            held.push(pool.acquire(None).await.unwrap());
        }
        for agent in &held {
            pool.release(agent.id).await;
        }
        assert_eq!(pool.stats().await.total, 5);

        let removed = pool.shrink().await;
        assert_eq!(removed, 2);
        assert_eq!(pool.stats().await.total, 3);

        // Shrinking again is a no-op at the floor.
        assert_eq!(pool.shrink().await, 0);
    }

    #[tokio::test]
    async fn test_wait_released_wakes_on_release() {
        use std::sync::Arc;
        let pool = Arc::new(AgentPool::new(PoolConfig {
            max_agents: 1,
            min_agents: 1,
        }));
        let agent = pool.acquire(None).await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.wait_released().await;
                pool.acquire(None).await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        pool.release(agent.id).await;

        let acquired = waiter.await.unwrap();
        assert!(acquired.is_some());
    }
}
