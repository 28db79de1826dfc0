//! Depth-first traversal of a task tree.
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::GraphError;
use crate::graph::TaskGraph;
use crate::task::{Task, TaskId};

/// Walks the task tree below `root` in depth-first pre-order.
///
/// The root comes first, followed by the walk of each dependency in the order
/// it was declared. A task reachable along several paths is yielded once per
/// path. Dependencies are only requested when the walk reaches them.
///
/// The dependency relation must be acyclic, otherwise the walk never ends.
/// Use [`walk_checked`] when that is not guaranteed.
pub fn walk(root: Arc<dyn Task>) -> Walk {
    Walk { stack: vec![root] }
}

/// Same as [`walk`], but verifies up front that the tree has no cycles.
pub fn walk_checked(root: Arc<dyn Task>) -> Result<Walk, GraphError> {
    TaskGraph::from_root(root.clone())?.check_acyclic()?;
    Ok(walk(root))
}

/// Lazy pre-order iterator returned by [`walk`].
pub struct Walk {
    stack: Vec<Arc<dyn Task>>,
}

impl Walk {
    /// Yields every distinct run once, skipping the subtrees of runs that
    /// were already visited.
    ///
    /// This changes the multiplicity of the walk for trees with shared
    /// dependencies, and it also terminates on cyclic graphs.
    pub fn unique(self) -> Unique {
        Unique {
            stack: self.stack,
            seen: HashSet::new(),
        }
    }
}

impl Iterator for Walk {
    type Item = Arc<dyn Task>;

    fn next(&mut self) -> Option<Self::Item> {
        let task = self.stack.pop()?;
        self.stack.extend(task.dependencies().into_iter().rev());
        Some(task)
    }
}

/// Deduplicating iterator returned by [`Walk::unique`].
pub struct Unique {
    stack: Vec<Arc<dyn Task>>,
    seen: HashSet<TaskId>,
}

impl Iterator for Unique {
    type Item = Result<Arc<dyn Task>, GraphError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(task) = self.stack.pop() {
            let id = match TaskId::of(&*task) {
                Ok(id) => id,
                Err(source) => {
                    return Some(Err(GraphError::Param {
                        family: task.family().into_owned(),
                        source,
                    }));
                }
            };

            if !self.seen.insert(id) {
                continue;
            }

            self.stack.extend(task.dependencies().into_iter().rev());
            return Some(Ok(task));
        }

        None
    }
}
