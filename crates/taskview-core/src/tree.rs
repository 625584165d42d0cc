//! Walks over task hierarchies.
//!
//! All helpers take the tree by reference (or by value when rebuilding it) and
//! never modify a tree someone else holds.

use std::collections::HashSet;

use crate::error::ModelError;
use crate::model::{TaskId, TaskRecord};

/// Deepest nesting accepted when loading or filtering a tree.
pub const MAX_DEPTH: usize = 32;

/// Pre-order list of every task in the forest, parents before children.
pub fn flatten(tasks: &[TaskRecord]) -> Vec<&TaskRecord> {
    let mut out = Vec::new();
    let mut stack: Vec<&TaskRecord> = tasks.iter().rev().collect();
    while let Some(task) = stack.pop() {
        out.push(task);
        stack.extend(task.subtasks.iter().rev());
    }
    out
}

/// Resolve a task by identity.
///
/// Ids without a separator are looked up among top-level tasks only; dotted ids
/// only among descendants, so the two namespaces never shadow each other.
pub fn find<'a>(tasks: &'a [TaskRecord], id: &TaskId) -> Option<&'a TaskRecord> {
    if id.is_top_level() {
        tasks.iter().find(|task| task.id == *id)
    } else {
        tasks
            .iter()
            .find_map(|top| flatten(&top.subtasks).into_iter().find(|task| task.id == *id))
    }
}

/// Every id present anywhere in the forest.
pub fn collect_ids(tasks: &[TaskRecord]) -> HashSet<TaskId> {
    flatten(tasks).into_iter().map(|task| task.id.clone()).collect()
}

/// Qualify bare subtask ids and reject id schemes lookups cannot rely on.
///
/// - top-level ids must not contain the separator
/// - a nested id is either bare (qualified as `<parent>.<id>`) or already
///   carries its top-level ancestor as prefix
/// - ids are unique within the tag
pub(crate) fn normalize(tag: &str, tasks: Vec<TaskRecord>) -> Result<Vec<TaskRecord>, ModelError> {
    let mut seen = HashSet::new();
    tasks
        .into_iter()
        .map(|task| {
            if !task.id.is_top_level() {
                return Err(ModelError::DottedTopLevel(task.id));
            }
            let root = task.id.clone();
            normalize_node(task, None, &root, 0, tag, &mut seen)
        })
        .collect()
}

fn normalize_node(
    mut task: TaskRecord,
    parent: Option<&TaskId>,
    root: &TaskId,
    depth: usize,
    tag: &str,
    seen: &mut HashSet<TaskId>,
) -> Result<TaskRecord, ModelError> {
    if depth > MAX_DEPTH {
        return Err(ModelError::TooDeep(task.id));
    }

    if let Some(parent) = parent {
        if task.id.is_top_level() {
            task.id = task.id.qualified_under(parent);
        } else if task.id.root() != root.as_str() {
            return Err(ModelError::ForeignPrefix {
                id: task.id,
                ancestor: root.clone(),
            });
        }
    }

    if !seen.insert(task.id.clone()) {
        return Err(ModelError::DuplicateId {
            tag: tag.to_string(),
            id: task.id,
        });
    }

    let id = task.id.clone();
    task.subtasks = std::mem::take(&mut task.subtasks)
        .into_iter()
        .map(|child| normalize_node(child, Some(&id), root, depth + 1, tag, seen))
        .collect::<Result<_, _>>()?;
    Ok(task)
}
