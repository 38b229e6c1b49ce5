//! Dependency graph and eligibility resolution.
//!
//! `DependencyGraph` keeps the dependency edges between tasks as a directed
//! acyclic graph. Edges point from a dependency to its dependent, so a
//! task's dependencies are its incoming neighbours. Eligibility and
//! blocking are computed against a snapshot of the task records and never
//! mutate them.

use crate::core::task::{TaskId, TaskRecord, TaskStatus};
use crate::error::{Error, Result};
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use std::collections::{BTreeMap, HashMap, HashSet};

/// The task dependency graph.
///
/// Uses a `StableDiGraph` so that removing a rejected node never
/// invalidates the indices of the tasks already admitted.
pub struct DependencyGraph {
    /// The underlying directed graph.
    graph: StableDiGraph<TaskId, ()>,
    /// Index mapping from TaskId to NodeIndex for fast lookups.
    task_index: HashMap<TaskId, NodeIndex>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            graph: StableDiGraph::new(),
            task_index: HashMap::new(),
        }
    }

    /// Add a task node without dependencies.
    ///
    /// If the task already exists, returns the existing NodeIndex.
    pub fn add_task(&mut self, id: TaskId) -> NodeIndex {
        if let Some(&index) = self.task_index.get(&id) {
            return index;
        }

        let index = self.graph.add_node(id);
        self.task_index.insert(id, index);
        index
    }

    /// Add a dependency edge: `dependent` may only start after `dependency`.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Either task is not in the graph
    /// - Adding the edge would create a cycle
    pub fn add_dependency(&mut self, dependency: &TaskId, dependent: &TaskId) -> Result<()> {
        let from_index = *self
            .task_index
            .get(dependency)
            .ok_or_else(|| Error::UnknownDependency(dependency.to_string()))?;

        let to_index = *self
            .task_index
            .get(dependent)
            .ok_or_else(|| Error::UnknownDependency(dependent.to_string()))?;

        // Temporarily add the edge to check for cycles
        let edge = self.graph.add_edge(from_index, to_index, ());

        if is_cyclic_directed(&self.graph) {
            self.graph.remove_edge(edge);
            return Err(Error::DependencyCycle {
                task: dependent.to_string(),
                dependency: dependency.to_string(),
            });
        }

        Ok(())
    }

    /// Admit a new task together with its dependencies.
    ///
    /// Every dependency must already be in the graph. Nothing is changed
    /// when admission fails.
    pub fn admit(&mut self, id: TaskId, dependencies: &[TaskId]) -> Result<()> {
        for dep in dependencies {
            if *dep == id {
                return Err(Error::DependencyCycle {
                    task: id.to_string(),
                    dependency: dep.to_string(),
                });
            }
            if !self.contains_task(dep) {
                return Err(Error::UnknownDependency(dep.to_string()));
            }
        }

        let existed = self.contains_task(&id);
        let index = self.add_task(id);

        for dep in dependencies {
            if let Err(e) = self.add_dependency(dep, &id) {
                if !existed {
                    self.graph.remove_node(index);
                    self.task_index.remove(&id);
                }
                return Err(e);
            }
        }

        Ok(())
    }

    /// Check if the graph contains a task.
    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.task_index.contains_key(id)
    }

    /// Get the number of tasks in the graph.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of dependency edges in the graph.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Tasks the given task depends on.
    pub fn dependencies_of(&self, id: &TaskId) -> Vec<TaskId> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: &TaskId, direction: Direction) -> Vec<TaskId> {
        let Some(&index) = self.task_index.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<TaskId> = self
            .graph
            .neighbors_directed(index, direction)
            .filter_map(|n| self.graph.node_weight(n).copied())
            .collect();
        ids.sort();
        ids
    }

    // ========== Resolution ==========

    /// Pending tasks whose dependencies have all completed, in launch order.
    ///
    /// Launch order is highest priority first, then earliest spawn first.
    pub fn ready_tasks(&self, records: &BTreeMap<TaskId, TaskRecord>) -> Vec<TaskId> {
        let mut ready: Vec<&TaskRecord> = records
            .values()
            .filter(|task| task.status == TaskStatus::Pending)
            .filter(|task| {
                self.dependencies_of(&task.id).iter().all(|dep| {
                    records
                        .get(dep)
                        .map(|d| d.status == TaskStatus::Completed)
                        .unwrap_or(false)
                })
            })
            .collect();

        ready.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        ready.into_iter().map(|task| task.id).collect()
    }

    /// Pending tasks that can never run, each paired with the dependency
    /// that blocks it.
    ///
    /// Blocking is transitive: a pending task whose dependency is reported
    /// here is reported as well, after that dependency.
    pub fn blocked_tasks(&self, records: &BTreeMap<TaskId, TaskRecord>) -> Vec<(TaskId, TaskId)> {
        let mut blocked = Vec::new();
        let mut blocked_ids: HashSet<TaskId> = HashSet::new();

        loop {
            let candidates: Vec<TaskId> = records
                .values()
                .filter(|task| task.status == TaskStatus::Pending)
                .filter(|task| !blocked_ids.contains(&task.id))
                .map(|task| task.id)
                .collect();

            let mut changed = false;
            for id in candidates {
                let cause = self.dependencies_of(&id).into_iter().find(|dep| {
                    blocked_ids.contains(dep)
                        || records
                            .get(dep)
                            .is_some_and(|d| d.status.blocks_dependents())
                });
                if let Some(cause) = cause {
                    blocked_ids.insert(id);
                    blocked.push((id, cause));
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }

        blocked
    }

    /// Get tasks in topological order (each task after its dependencies).
    ///
    /// Ties are not broken by priority; this order is for admission, not
    /// for launching.
    pub fn topological_order(&self) -> Result<Vec<TaskId>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            let task = self
                .graph
                .node_weight(cycle.node_id())
                .map(|id| id.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            Error::Validation(format!("Cycle detected at task: {}", task))
        })?;

        Ok(sorted
            .into_iter()
            .filter_map(|index| self.graph.node_weight(index).copied())
            .collect())
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
