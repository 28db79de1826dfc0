//! Identity-aware view of a task tree.
//!
//! Unlike the plain [`walk`](crate::walk), which follows every edge, the
//! graph has exactly one node per [`TaskId`]. That makes it suitable for
//! cycle detection and for rendering the tree as a diagram.

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::GraphError;
use crate::task::{Task, TaskId};

/// Task runs as nodes; an edge points from a dependency to the task that
/// requires it.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    graph: DiGraph<TaskId, ()>,
    root: NodeIndex,
}

impl TaskGraph {
    /// Discovers every distinct run reachable from `root`.
    ///
    /// Each run's dependencies are requested once, so this terminates even
    /// when the dependency relation has cycles.
    pub fn from_root(root: Arc<dyn Task>) -> Result<Self, GraphError> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        let root_id = identify(&*root)?;
        let root_index = graph.add_node(root_id.clone());
        index.insert(root_id, root_index);

        let mut stack = vec![(root, root_index)];

        while let Some((task, parent)) = stack.pop() {
            for dependency in task.dependencies() {
                let id = identify(&*dependency)?;

                let node = match index.get(&id) {
                    Some(&node) => node,
                    None => {
                        let node = graph.add_node(id.clone());
                        index.insert(id, node);
                        stack.push((dependency, node));
                        node
                    }
                };

                graph.update_edge(node, parent, ());
            }
        }

        tracing::debug!(
            tasks = graph.node_count(),
            edges = graph.edge_count(),
            "discovered task graph"
        );

        Ok(Self {
            graph,
            root: root_index,
        })
    }

    pub fn root(&self) -> &TaskId {
        &self.graph[self.root]
    }

    /// Number of distinct runs.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskId> {
        self.graph.node_weights()
    }

    /// Direct dependencies of a run, or `None` when it is not in the graph.
    pub fn dependencies_of(&self, id: &TaskId) -> Option<Vec<&TaskId>> {
        let node = self.graph.node_indices().find(|&i| &self.graph[i] == id)?;

        Some(
            self.graph
                .neighbors_directed(node, petgraph::Direction::Incoming)
                .map(|i| &self.graph[i])
                .collect(),
        )
    }

    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }

    /// Fails with the first run found on a cycle.
    pub fn check_acyclic(&self) -> Result<(), GraphError> {
        toposort(&self.graph, None)
            .map(|_| ())
            .map_err(|cycle| GraphError::Cycle(self.graph[cycle.node_id()].to_string()))
    }
}

fn identify(task: &dyn Task) -> Result<TaskId, GraphError> {
    TaskId::of(task).map_err(|source| GraphError::Param {
        family: task.family().into_owned(),
        source,
    })
}

/// Renders the graph as a Mermaid flowchart.
impl std::fmt::Display for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "graph LR")?;

        for index in self.graph.node_indices() {
            let label = self.graph[index].to_string().replace('"', "#quot;");
            writeln!(f, "    {}[\"{}\"]", index.index(), label)?;
        }

        for edge in self.graph.edge_indices() {
            let Some((source, target)) = self.graph.edge_endpoints(edge) else {
                continue;
            };
            writeln!(f, "    {} --> {}", source.index(), target.index())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;
    use crate::error::ParamError;
    use crate::param::Parameter;

    struct Step {
        family: &'static str,
        run: u32,
        deps: Vec<Arc<dyn Task>>,
    }

    impl Task for Step {
        fn family(&self) -> Cow<'_, str> {
            self.family.into()
        }

        fn parameters(&self) -> Result<Vec<Parameter>, ParamError> {
            Ok(vec![Parameter::new("run", self.run)?])
        }

        fn dependencies(&self) -> Vec<Arc<dyn Task>> {
            self.deps.clone()
        }
    }

    fn step(family: &'static str, run: u32, deps: Vec<Arc<dyn Task>>) -> Arc<dyn Task> {
        Arc::new(Step { family, run, deps })
    }

    #[test]
    fn test_identical_runs_collapse() {
        // two separately constructed but identical runs
        let root = step(
            "Merge",
            0,
            vec![
                step("Sim", 1, vec![]),
                step("Sim", 1, vec![]),
                step("Sim", 2, vec![]),
            ],
        );

        let graph = TaskGraph::from_root(root).unwrap();
        assert_eq!(graph.len(), 3);
        assert!(graph.is_acyclic());
        assert!(graph.check_acyclic().is_ok());
        assert_eq!(graph.root().to_string(), "Merge(run=0)");

        let deps = graph.dependencies_of(graph.root()).unwrap();
        assert_eq!(deps.len(), 2);
    }

    #[test]
    fn test_mermaid() {
        let root = step("Merge", 0, vec![step("Sim", 1, vec![])]);
        let text = TaskGraph::from_root(root).unwrap().to_string();

        assert_eq!(
            text,
            "graph LR\n    0[\"Merge(run=0)\"]\n    1[\"Sim(run=1)\"]\n    1 --> 0\n"
        );
    }
}
