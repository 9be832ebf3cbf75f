use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Identifier of a task node, unique within its flow.
///
/// Ids are chosen by the client in the submitted tree and are referenced by
/// `#id#` placeholders in later actions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TaskId(pub String);

/// Identifier of a submitted flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct FlowId(pub String);

impl FlowId {
    /// Generates a new random UUID v4-based FlowId.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for FlowId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A leaf assignment as tracked in a node's pending-task set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TaskRef {
    pub id: TaskId,
    pub flow_id: FlowId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListMode {
    /// Children run one after another, strictly head-of-line.
    Sequential,
    /// All children are dispatched at once.
    Concurrent,
}

/// Opaque unit of work carried by a leaf: which action module to run, with what input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    pub module: String,
    #[serde(default)]
    pub payload: Value,
}

/// Task tree as submitted by a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "element", rename_all = "lowercase")]
pub enum TaskSpec {
    List {
        id: TaskId,
        #[serde(rename = "type")]
        mode: ListMode,
        #[serde(default)]
        tasks: Vec<TaskSpec>,
    },
    Task {
        id: TaskId,
        action: Action,
    },
}

impl TaskSpec {
    pub fn id(&self) -> &TaskId {
        match self {
            TaskSpec::List { id, .. } | TaskSpec::Task { id, .. } => id,
        }
    }
}

/// A node of the flattened task graph. Parent and children are ids into the
/// owning [`Flow`]'s arena.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TaskNode {
    Leaf {
        id: TaskId,
        parent_id: Option<TaskId>,
        flow_id: FlowId,
        action: Action,
    },
    List {
        id: TaskId,
        parent_id: Option<TaskId>,
        flow_id: FlowId,
        mode: ListMode,
        children: Vec<TaskId>,
        #[serde(default)]
        completed: bool,
    },
}

impl TaskNode {
    pub fn id(&self) -> &TaskId {
        match self {
            TaskNode::Leaf { id, .. } | TaskNode::List { id, .. } => id,
        }
    }

    pub fn parent_id(&self) -> Option<&TaskId> {
        match self {
            TaskNode::Leaf { parent_id, .. } | TaskNode::List { parent_id, .. } => {
                parent_id.as_ref()
            }
        }
    }
}

/// What a worker receives: one leaf, detached from its tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeafTask {
    pub id: TaskId,
    pub flow_id: FlowId,
    pub action: Action,
}

impl LeafTask {
    pub fn task_ref(&self) -> TaskRef {
        TaskRef {
            id: self.id.clone(),
            flow_id: self.flow_id.clone(),
        }
    }
}

/// Result slot of a leaf. A missing entry in [`Flow::results`] means unassigned.
///
/// On the wire `Assigned` is the string `"assigned"` and a value is the raw JSON
/// result, so a leaf whose genuine result is the string `"assigned"` cannot be
/// told apart from one still in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Assigned,
    Value(Value),
}

const ASSIGNED_MARKER: &str = "assigned";

impl TaskStatus {
    pub fn is_assigned(&self) -> bool {
        matches!(self, TaskStatus::Assigned)
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            TaskStatus::Assigned => None,
            TaskStatus::Value(value) => Some(value),
        }
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TaskStatus::Assigned => serializer.serialize_str(ASSIGNED_MARKER),
            TaskStatus::Value(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(ref s) if s == ASSIGNED_MARKER => TaskStatus::Assigned,
            other => TaskStatus::Value(other),
        })
    }
}

pub type ResultsMap = BTreeMap<TaskId, TaskStatus>;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GraphError {
    #[error("task id '{0}' appears more than once in the flow")]
    DuplicateId(TaskId),
}

/// One submitted task graph plus its in-progress results.
///
/// The flow owns every node of its tree in a flat arena; `root` is the entry point
/// of every walk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flow {
    pub id: FlowId,
    pub root: TaskId,
    pub nodes: HashMap<TaskId, TaskNode>,
    #[serde(default)]
    pub results: ResultsMap,
}

impl Flow {
    /// Flattens a client tree, stamping every node with its parent and flow ids.
    pub fn from_spec(id: FlowId, spec: &TaskSpec) -> Result<Self, GraphError> {
        let mut nodes = HashMap::new();
        flatten(&id, spec, None, &mut nodes)?;

        Ok(Self {
            root: spec.id().clone(),
            id,
            nodes,
            results: ResultsMap::new(),
        })
    }

    pub fn node(&self, id: &TaskId) -> Option<&TaskNode> {
        self.nodes.get(id)
    }

    pub fn status(&self, id: &TaskId) -> Option<&TaskStatus> {
        self.results.get(id)
    }

    /// A leaf holding a value, or a list marked completed.
    pub fn is_terminal(&self, id: &TaskId) -> bool {
        match self.nodes.get(id) {
            Some(TaskNode::Leaf { .. }) => {
                matches!(self.results.get(id), Some(TaskStatus::Value(_)))
            }
            Some(TaskNode::List { completed, .. }) => *completed,
            None => false,
        }
    }

    pub fn is_assigned(&self, id: &TaskId) -> bool {
        self.results
            .get(id)
            .map(TaskStatus::is_assigned)
            .unwrap_or(false)
    }

    pub fn is_completed(&self) -> bool {
        self.is_terminal(&self.root)
    }

    pub fn mark_assigned(&mut self, id: &TaskId) {
        self.results.insert(id.clone(), TaskStatus::Assigned);
    }

    /// Sets the list's `completed` flag. Returns false when it was already set or
    /// `id` is not a list.
    pub fn mark_completed(&mut self, id: &TaskId) -> bool {
        match self.nodes.get_mut(id) {
            Some(TaskNode::List { completed, .. }) if !*completed => {
                *completed = true;
                true
            }
            _ => false,
        }
    }

    /// Records a leaf's result. A value, once set, is never replaced; results for
    /// ids that are not leaves of this flow are refused too.
    pub fn set_value(&mut self, id: &TaskId, value: Value) -> bool {
        if !matches!(self.nodes.get(id), Some(TaskNode::Leaf { .. })) {
            return false;
        }
        if matches!(self.results.get(id), Some(TaskStatus::Value(_))) {
            return false;
        }
        self.results.insert(id.clone(), TaskStatus::Value(value));
        true
    }

    pub fn leaf_task(&self, id: &TaskId) -> Option<LeafTask> {
        match self.nodes.get(id)? {
            TaskNode::Leaf {
                id,
                flow_id,
                action,
                ..
            } => Some(LeafTask {
                id: id.clone(),
                flow_id: flow_id.clone(),
                action: action.clone(),
            }),
            TaskNode::List { .. } => None,
        }
    }
}

fn flatten(
    flow_id: &FlowId,
    spec: &TaskSpec,
    parent_id: Option<&TaskId>,
    nodes: &mut HashMap<TaskId, TaskNode>,
) -> Result<(), GraphError> {
    let id = spec.id();
    if nodes.contains_key(id) {
        return Err(GraphError::DuplicateId(id.clone()));
    }

    let node = match spec {
        TaskSpec::Task { action, .. } => TaskNode::Leaf {
            id: id.clone(),
            parent_id: parent_id.cloned(),
            flow_id: flow_id.clone(),
            action: action.clone(),
        },
        TaskSpec::List { mode, tasks, .. } => TaskNode::List {
            id: id.clone(),
            parent_id: parent_id.cloned(),
            flow_id: flow_id.clone(),
            mode: *mode,
            children: tasks.iter().map(|child| child.id().clone()).collect(),
            completed: false,
        },
    };
    nodes.insert(id.clone(), node);

    if let TaskSpec::List { tasks, .. } = spec {
        for child in tasks {
            flatten(flow_id, child, Some(id), nodes)?;
        }
    }

    Ok(())
}
