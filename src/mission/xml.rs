//! Mission XML reader.
//!
//! Turns a schema-valid mission document into a [`BehaviorNode`] tree:
//!
//! ```text
//! <TaskTemplate xmlns="https://robotics.ucmerced.edu/task" ...>
//!   <AtomicTasks>
//!     <AtomicTask>
//!       <TaskID>T1</TaskID>
//!       <Action>
//!         <ActionType>moveToLocation</ActionType>
//!         <moveToLocation><Latitude>37.3</Latitude><Longitude>-120.4</Longitude></moveToLocation>
//!       </Action>
//!     </AtomicTask>
//!   </AtomicTasks>
//!   <ActionSequence>
//!     <Sequence>
//!       <TaskID>T1</TaskID>
//!       <Fallback>
//!         <ConditionalActions>
//!           <Conditional>
//!             <ReturnStatus>temp</ReturnStatus>
//!             <Comparator>gt</Comparator>
//!             <HardValue>30</HardValue>
//!           </Conditional>
//!           <TaskID>T2</TaskID>
//!         </ConditionalActions>
//!         <TaskID>T3</TaskID>
//!       </Fallback>
//!     </Sequence>
//!   </ActionSequence>
//! </TaskTemplate>
//! ```
//!
//! Elements are matched by local name so the default namespace does not matter.

use std::collections::HashMap;

use roxmltree::{Document, Node};
use thiserror::Error;

use super::tree::{BehaviorNode, Comparator, TaskNode, THRESHOLD_RANGE};

const SCHEMA_LOCATION: &str = "schemaLocation";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

#[derive(Debug, Error)]
pub enum MissionParseError {
    #[error("mission is not well-formed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("mission has no <{0}> element")]
    MissingElement(&'static str),

    #[error("unsupported behavior tree node <{0}>")]
    UnknownNode(String),

    #[error("task {0} is sequenced but never declared as an AtomicTask")]
    UnknownTask(String),

    #[error("task {0} is declared twice")]
    DuplicateTask(String),

    #[error("invalid condition: {0}")]
    InvalidCondition(String),
}

impl MissionParseError {
    /// Structural errors describe a tree shape the compiler cannot lower.
    /// Anything else is a malformed document and can be regenerated.
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::Xml(_))
    }
}

/// Read the schema path hinted by `xsi:schemaLocation` (`"<namespace> <path>"`).
pub fn schema_location(document: &str) -> Option<String> {
    let doc = Document::parse(document).ok()?;
    let root = doc.root_element();
    let raw = root
        .attribute((XSI_NAMESPACE, SCHEMA_LOCATION))
        .or_else(|| {
            root.attributes()
                .find(|a| a.name() == SCHEMA_LOCATION)
                .map(|a| a.value())
        })?;
    raw.split_whitespace().nth(1).map(str::to_string)
}

/// Parse a mission document into its behavior tree.
pub fn parse_mission(document: &str) -> Result<BehaviorNode, MissionParseError> {
    let doc = Document::parse(document)?;
    let root = doc.root_element();

    let tasks = read_atomic_tasks(root)?;
    let sequence =
        child_named(root, "ActionSequence").ok_or(MissionParseError::MissingElement("ActionSequence"))?;

    let mut nodes = element_children(sequence)
        .map(|n| read_node(n, &tasks))
        .collect::<Result<Vec<_>, _>>()?;

    match nodes.len() {
        0 => Err(MissionParseError::MissingElement("Sequence")),
        1 => Ok(nodes.remove(0)),
        _ => Ok(BehaviorNode::sequence(nodes)),
    }
}

fn read_atomic_tasks(root: Node) -> Result<HashMap<String, TaskNode>, MissionParseError> {
    let container =
        child_named(root, "AtomicTasks").ok_or(MissionParseError::MissingElement("AtomicTasks"))?;
    let mut tasks = HashMap::new();

    for atomic in element_children(container).filter(|n| n.tag_name().name() == "AtomicTask") {
        let id = child_text(atomic, "TaskID").ok_or(MissionParseError::MissingElement("TaskID"))?;
        let action = child_named(atomic, "Action").ok_or(MissionParseError::MissingElement("Action"))?;
        let action_type =
            child_text(action, "ActionType").ok_or(MissionParseError::MissingElement("ActionType"))?;

        let mut task = TaskNode::new(id.clone(), action_type);
        for detail in element_children(action).filter(|n| n.tag_name().name() != "ActionType") {
            for param in element_children(detail) {
                if let Some(value) = param.text() {
                    task = task.with_parameter(param.tag_name().name(), value.trim());
                }
            }
        }

        if tasks.insert(id.clone(), task).is_some() {
            return Err(MissionParseError::DuplicateTask(id));
        }
    }

    Ok(tasks)
}

fn read_node(node: Node, tasks: &HashMap<String, TaskNode>) -> Result<BehaviorNode, MissionParseError> {
    match node.tag_name().name() {
        "Sequence" => Ok(BehaviorNode::sequence(read_children(node, tasks)?)),
        "Fallback" => Ok(BehaviorNode::fallback(read_children(node, tasks)?)),
        "Parallel" => Ok(BehaviorNode::Parallel {
            children: read_children(node, tasks)?,
        }),
        "TaskID" => {
            let id = node.text().map(str::trim).unwrap_or_default();
            tasks
                .get(id)
                .cloned()
                .map(BehaviorNode::Leaf)
                .ok_or_else(|| MissionParseError::UnknownTask(id.to_string()))
        }
        "Conditional" => read_condition(node),
        // A conditional block is a gate followed by the actions it guards.
        "ConditionalActions" => Ok(BehaviorNode::sequence(read_children(node, tasks)?)),
        other => Err(MissionParseError::UnknownNode(other.to_string())),
    }
}

fn read_children(
    node: Node,
    tasks: &HashMap<String, TaskNode>,
) -> Result<Vec<BehaviorNode>, MissionParseError> {
    element_children(node)
        .map(|c| read_node(c, tasks))
        .collect()
}

fn read_condition(node: Node) -> Result<BehaviorNode, MissionParseError> {
    let variable = child_text(node, "ReturnStatus")
        .ok_or_else(|| MissionParseError::InvalidCondition("missing ReturnStatus".to_string()))?;

    if let Some(raw_cmp) = child_text(node, "Comparator") {
        let comparator = Comparator::parse(&raw_cmp).ok_or_else(|| {
            MissionParseError::InvalidCondition(format!("unknown comparator '{}'", raw_cmp))
        })?;
        let raw_value = child_text(node, "HardValue").ok_or_else(|| {
            MissionParseError::InvalidCondition(format!("{} has no HardValue", variable))
        })?;
        let value = raw_value.parse::<f64>().map_err(|_| {
            MissionParseError::InvalidCondition(format!(
                "{} threshold '{}' is not numeric",
                variable, raw_value
            ))
        })?;
        // Promela has no floats.
        let rounded = value.round();
        let in_range = rounded.is_finite()
            && rounded >= *THRESHOLD_RANGE.start() as f64
            && rounded <= *THRESHOLD_RANGE.end() as f64;
        if !in_range {
            return Err(MissionParseError::InvalidCondition(format!(
                "{} threshold '{}' does not fit a Promela int",
                variable, raw_value
            )));
        }
        let threshold = rounded as i64;
        return Ok(BehaviorNode::value_condition(variable, comparator, threshold));
    }

    let raw_expected = child_text(node, "ExpectedValue").ok_or_else(|| {
        MissionParseError::InvalidCondition(format!(
            "{} needs either Comparator/HardValue or ExpectedValue",
            variable
        ))
    })?;
    let expected = match raw_expected.to_ascii_lowercase().as_str() {
        "true" | "1" => true,
        "false" | "0" => false,
        other => {
            return Err(MissionParseError::InvalidCondition(format!(
                "{} expects '{}', not a boolean",
                variable, other
            )))
        }
    };
    Ok(BehaviorNode::bool_condition(variable, expected))
}

fn element_children<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn child_named<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    element_children(node).find(|n| n.tag_name().name() == name)
}

fn child_text(node: Node, name: &str) -> Option<String> {
    child_named(node, name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
