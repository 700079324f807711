//! Behavior tree model for a mission plan.
//!
//! # Invariants
//! - Task identifiers are unique within a mission
//! - A condition node never stands alone: it gates the next sibling
//! - `Parallel` is carried through parsing but not lowered by the compiler

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Thresholds a `ValueCondition` may carry.
///
/// Promela `int` is 32 bits and the sensor helper reads one below and one above the
/// threshold, so both neighbours must fit.
pub const THRESHOLD_RANGE: RangeInclusive<i64> = (i32::MIN as i64 + 1)..=(i32::MAX as i64 - 1);

/// A single robot action referenced from the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNode {
    /// Mission-unique task identifier (e.g. `MoveToTree1`)
    pub id: String,

    /// Action type, one of the symbols declared by the Promela template
    pub action_type: String,

    /// Action-specific parameters, already stringified
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl TaskNode {
    pub fn new(id: impl Into<String>, action_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action_type: action_type.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// Comparison used by a value condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
}

impl Comparator {
    /// Parse the mission document spelling (`lt`, `lte`, `gt`, `gte`, `eq`, `neq`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "eq" => Some(Self::Eq),
            "neq" => Some(Self::Neq),
            _ => None,
        }
    }

    /// Promela operator for this comparator.
    pub fn operator(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Eq => "==",
            Self::Neq => "!=",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operator())
    }
}

/// A node of the mission behavior tree.
///
/// # Exhaustive Matching
/// All variants must be handled explicitly by consumers - no catch-all allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BehaviorNode {
    /// Children run in order
    Sequence { children: Vec<BehaviorNode> },

    /// Children are mutually exclusive branches, the last ungated one is the default
    Fallback { children: Vec<BehaviorNode> },

    /// Concurrent children (not modeled)
    Parallel { children: Vec<BehaviorNode> },

    /// A robot action
    Leaf(TaskNode),

    /// Sensor returns a boolean; gates the next sibling on `expected`
    BoolCondition { variable: String, expected: bool },

    /// Sensor returns an integer; gates the next sibling on `variable <cmp> threshold`
    ValueCondition {
        variable: String,
        comparator: Comparator,
        threshold: i64,
    },
}

impl BehaviorNode {
    pub fn sequence(children: Vec<BehaviorNode>) -> Self {
        Self::Sequence { children }
    }

    pub fn fallback(children: Vec<BehaviorNode>) -> Self {
        Self::Fallback { children }
    }

    pub fn leaf(id: impl Into<String>, action_type: impl Into<String>) -> Self {
        Self::Leaf(TaskNode::new(id, action_type))
    }

    pub fn bool_condition(variable: impl Into<String>, expected: bool) -> Self {
        Self::BoolCondition {
            variable: variable.into(),
            expected,
        }
    }

    pub fn value_condition(
        variable: impl Into<String>,
        comparator: Comparator,
        threshold: i64,
    ) -> Self {
        Self::ValueCondition {
            variable: variable.into(),
            comparator,
            threshold,
        }
    }

    /// Whether this node is a gate rather than an executable step.
    pub fn is_condition(&self) -> bool {
        matches!(self, Self::BoolCondition { .. } | Self::ValueCondition { .. })
    }

    /// Number of tasks as counted against the temporal property:
    /// every leaf plus every condition gate that ends up in the model.
    /// `Parallel` blocks are not modeled and count for nothing.
    pub fn task_count(&self) -> usize {
        match self {
            Self::Sequence { children } | Self::Fallback { children } => {
                children.iter().map(|c| c.task_count()).sum()
            }
            Self::Parallel { .. } => 0,
            Self::Leaf(_) | Self::BoolCondition { .. } | Self::ValueCondition { .. } => 1,
        }
    }

    /// All leaves in depth-first order.
    pub fn leaves(&self) -> Vec<&TaskNode> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a TaskNode>) {
        match self {
            Self::Sequence { children }
            | Self::Fallback { children }
            | Self::Parallel { children } => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
            Self::Leaf(task) => out.push(task),
            Self::BoolCondition { .. } | Self::ValueCondition { .. } => {}
        }
    }
}
