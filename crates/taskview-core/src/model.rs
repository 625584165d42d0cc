//! Task records and the two on-disk shapes of `tasks.json`.
//!
//! The legacy shape is `{ "tasks": [...] }` and maps to a single implicit tag
//! named `master`. The tagged shape is `{ "<tag>": { "tasks": [...] }, ... }`.
//! Both are normalized on load: ids become strings, bare subtask ids are
//! qualified with their parent's id, and id collisions are rejected.

use std::borrow::Borrow;
use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ModelError;
use crate::tree;

/// Dotted-path task identity (`"3"`, `"3.1"`, `"3.1.2"`).
///
/// JSON ids may be numbers or strings; both deserialize to the same string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub const SEPARATOR: char = '.';

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id names a top-level task (no separator).
    pub fn is_top_level(&self) -> bool {
        !self.0.contains(Self::SEPARATOR)
    }

    /// The top-level ancestor's id: everything before the first separator.
    pub fn root(&self) -> &str {
        self.0
            .split_once(Self::SEPARATOR)
            .map(|(root, _)| root)
            .unwrap_or(&self.0)
    }

    /// Qualify a bare local id with its parent's id (`1` under `3` is `3.1`).
    pub(crate) fn qualified_under(&self, parent: &TaskId) -> TaskId {
        TaskId(format!("{}{}{}", parent.0, Self::SEPARATOR, self.0))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(id) => TaskId(id),
            RawId::Number(id) => TaskId(id.to_string()),
        })
    }
}

/// A task and its ordered subtasks.
///
/// Fields the viewer does not interpret are kept in `extra` and passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: TaskId,

    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_strategy: Option<String>,

    #[serde(default)]
    pub dependencies: Vec<TaskId>,

    #[serde(default)]
    pub subtasks: Vec<TaskRecord>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskRecord {
    /// Copy this record's own fields with a replacement list of subtasks.
    pub(crate) fn with_subtasks(&self, subtasks: Vec<TaskRecord>) -> TaskRecord {
        TaskRecord {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            status: self.status.clone(),
            priority: self.priority.clone(),
            details: self.details.clone(),
            test_strategy: self.test_strategy.clone(),
            dependencies: self.dependencies.clone(),
            subtasks,
            extra: self.extra.clone(),
        }
    }
}

/// One tag's entry in the tagged shape.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TagGroup {
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,

    /// Tag metadata (created/updated timestamps, description, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Tag groups in file order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaggedTasks(pub Vec<(String, TagGroup)>);

impl TaggedTasks {
    pub fn get(&self, tag: &str) -> Option<&TagGroup> {
        self.0
            .iter()
            .find(|(name, _)| name == tag)
            .map(|(_, group)| group)
    }

    pub fn tags(&self) -> Vec<String> {
        self.0.iter().map(|(name, _)| name.clone()).collect()
    }
}

impl Serialize for TaggedTasks {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (tag, group) in &self.0 {
            map.serialize_entry(tag, group)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TaggedTasks {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Map::<String, Value>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(tag, group)| {
                serde_json::from_value(group)
                    .map(|group| (tag, group))
                    .map_err(de::Error::custom)
            })
            .collect::<Result<Vec<_>, _>>()
            .map(TaggedTasks)
    }
}

/// A parsed and validated `tasks.json`.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskFile {
    Legacy(Vec<TaskRecord>),
    Tagged(TaggedTasks),
}

impl TaskFile {
    /// The implicit tag of the legacy shape.
    pub const DEFAULT_TAG: &'static str = "master";

    pub fn parse(json: &str) -> Result<Self, ModelError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ModelError> {
        let root = match value {
            Value::Object(root) => root,
            other => {
                return Err(ModelError::Shape(format!(
                    "expected a JSON object at the top level, found {}",
                    json_kind(&other)
                )));
            }
        };

        // Legacy shape: a `tasks` array at the top level
        if let Some(tasks @ Value::Array(_)) = root.get("tasks") {
            let tasks = Vec::<TaskRecord>::deserialize(tasks)?;
            let tasks = tree::normalize(Self::DEFAULT_TAG, tasks)?;
            return Ok(TaskFile::Legacy(tasks));
        }

        let mut groups = Vec::with_capacity(root.len());
        for (tag, group) in root {
            let mut group: TagGroup = serde_json::from_value(group)?;
            group.tasks = tree::normalize(&tag, std::mem::take(&mut group.tasks))?;
            groups.push((tag, group));
        }
        Ok(TaskFile::Tagged(TaggedTasks(groups)))
    }

    pub fn format(&self) -> TaskFormat {
        match self {
            TaskFile::Legacy(_) => TaskFormat::Legacy,
            TaskFile::Tagged(_) => TaskFormat::Tagged,
        }
    }

    pub fn tags(&self) -> Vec<String> {
        match self {
            TaskFile::Legacy(_) => vec![Self::DEFAULT_TAG.to_string()],
            TaskFile::Tagged(tagged) => tagged.tags(),
        }
    }

    /// Every tag with its top-level tasks, in file order.
    pub fn groups(&self) -> Vec<(&str, &[TaskRecord])> {
        match self {
            TaskFile::Legacy(tasks) => vec![(Self::DEFAULT_TAG, tasks.as_slice())],
            TaskFile::Tagged(tagged) => tagged
                .0
                .iter()
                .map(|(tag, group)| (tag.as_str(), group.tasks.as_slice()))
                .collect(),
        }
    }

    /// Top-level tasks of one tag. The legacy shape only knows `master`.
    pub fn tasks_for_tag(&self, tag: &str) -> &[TaskRecord] {
        match self {
            TaskFile::Legacy(tasks) if tag == Self::DEFAULT_TAG => tasks.as_slice(),
            TaskFile::Legacy(_) => &[],
            TaskFile::Tagged(tagged) => tagged
                .get(tag)
                .map(|group| group.tasks.as_slice())
                .unwrap_or(&[]),
        }
    }

    pub fn into_response(self) -> TasksResponse {
        let format = self.format();
        let tags = self.tags();
        let tasks = match self {
            TaskFile::Legacy(tasks) => TasksPayload::List(tasks),
            TaskFile::Tagged(tagged) => TasksPayload::Tagged(tagged),
        };
        TasksResponse {
            tasks,
            format,
            tags,
        }
    }
}

/// Which shape the tasks file had, or `None` when it does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskFormat {
    Legacy,
    Tagged,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TasksPayload {
    List(Vec<TaskRecord>),
    Tagged(TaggedTasks),
}

/// Body of `GET /api/tasks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TasksResponse {
    pub tasks: TasksPayload,
    pub format: TaskFormat,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TasksResponse {
    /// Response for a project without a tasks file.
    pub fn empty() -> Self {
        Self {
            tasks: TasksPayload::List(Vec::new()),
            format: TaskFormat::None,
            tags: Vec::new(),
        }
    }

    /// Top-level tasks to display for `tag`. A flat list only backs `master`.
    pub fn tasks_for_tag(&self, tag: &str) -> &[TaskRecord] {
        match &self.tasks {
            TasksPayload::List(tasks) if tag == TaskFile::DEFAULT_TAG => tasks.as_slice(),
            TasksPayload::List(_) => &[],
            TasksPayload::Tagged(tagged) => tagged
                .get(tag)
                .map(|group| group.tasks.as_slice())
                .unwrap_or(&[]),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
