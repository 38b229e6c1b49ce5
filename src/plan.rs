//! Task plans.
//!
//! A plan describes a batch of tasks in TOML, naming dependencies by key
//! instead of by pool id:
//!
//! ```toml
//! [[tasks]]
//! key = "scan"
//! description = "Scan open ports on 10.0.0.5"
//! priority = 5
//!
//! [[tasks]]
//! key = "report"
//! description = "Summarize exposed services"
//! depends_on = ["scan"]
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::dag::DependencyGraph;
use crate::core::task::TaskId;
use crate::error::{Error, Result};
use crate::orchestration::pool::WorkerPool;

fn default_priority() -> i32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTask {
    /// Name used by `depends_on` entries of other tasks.
    pub key: String,
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub tasks: Vec<PlanTask>,
}

impl Plan {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading plan");
        Self::from_toml(&fs::read_to_string(path)?)
    }

    /// Check the plan and return its tasks in an order where every task
    /// follows its dependencies.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for empty or duplicate keys, empty
    /// descriptions, unknown dependency keys and dependency cycles.
    pub fn validate(&self) -> Result<Vec<&PlanTask>> {
        let mut ids: HashMap<&str, TaskId> = HashMap::new();
        let mut graph = DependencyGraph::new();

        for (index, task) in self.tasks.iter().enumerate() {
            if task.key.trim().is_empty() {
                return Err(Error::Validation(format!("task #{} has no key", index + 1)));
            }
            if task.description.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "task '{}' has no description",
                    task.key
                )));
            }
            let id = TaskId::from_seq(index as u64);
            if ids.insert(task.key.as_str(), id).is_some() {
                return Err(Error::Validation(format!("duplicate task key '{}'", task.key)));
            }
            graph.add_task(id);
        }

        for task in &self.tasks {
            let dependent = ids[task.key.as_str()];
            for dep in &task.depends_on {
                let dependency = *ids.get(dep.as_str()).ok_or_else(|| {
                    Error::Validation(format!(
                        "task '{}' depends on unknown task '{}'",
                        task.key, dep
                    ))
                })?;

                graph.add_dependency(&dependency, &dependent).map_err(|e| match e {
                    Error::DependencyCycle { .. } => Error::Validation(format!(
                        "dependency of '{}' on '{}' would create a cycle",
                        task.key, dep
                    )),
                    other => other,
                })?;
            }
        }

        let order = graph
            .topological_order()?
            .into_iter()
            .filter_map(|id| self.tasks.get(id.seq() as usize))
            .collect();
        Ok(order)
    }

    /// Spawn every task into `pool`, returning the pool id of each key.
    pub fn spawn_into(&self, pool: &WorkerPool) -> Result<BTreeMap<String, TaskId>> {
        let order = self.validate()?;
        let mut spawned: BTreeMap<String, TaskId> = BTreeMap::new();

        for task in order {
            let deps = task
                .depends_on
                .iter()
                .map(|key| {
                    spawned
                        .get(key)
                        .copied()
                        .ok_or_else(|| Error::UnknownDependency(key.clone()))
                })
                .collect::<Result<Vec<_>>>()?;
            let id = pool.spawn(&task.description, task.priority, &deps)?;
            spawned.insert(task.key.clone(), id);
        }

        info!(tasks = spawned.len(), "plan spawned");
        Ok(spawned)
    }
}
