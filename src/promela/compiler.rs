//! Behavior tree to Promela lowering.
//!
//! # Encoding
//! - `Sequence` → statements in order
//! - `Fallback` → `if ... fi`, one `::` branch per child, ungated later branch → `:: else ->`,
//!   no ungated branch at all → `:: else -> skip;`
//! - `Leaf` → `Task <id>;` declaration + `<id>.action.actionType = <type>;`
//! - conditions → a `select(...)` helper called right before the choice they gate,
//!   plus a guard on the branch head
//!
//! Each recursive call returns a [`Fragment`] which the caller merges; nothing is
//! accumulated across calls, so compiling the same tree twice gives identical text.

use thiserror::Error;

use super::program::CompiledProgram;
use crate::mission::{BehaviorNode, TaskNode, THRESHOLD_RANGE};

const INDENT: &str = "    ";
/// `init {` and `atomic {` take the first two levels.
const BODY_INDENT: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("condition on '{0}' has no following step to gate")]
    DanglingCondition(String),

    #[error("fallback has no children")]
    EmptyFallback,

    #[error("task {id} is bound to both {first} and {second}")]
    ConflictingTask {
        id: String,
        first: String,
        second: String,
    },

    #[error("'{0}' is not a valid Promela identifier")]
    InvalidIdentifier(String),

    #[error("threshold {threshold} on '{variable}' does not fit a Promela int")]
    ThresholdOutOfRange { variable: String, threshold: i64 },
}

/// Compiles mission trees against a fixed Promela template.
#[derive(Debug, Clone)]
pub struct ModelCompiler {
    preamble: String,
}

impl ModelCompiler {
    /// Create a compiler that prefixes every program with `preamble`.
    pub fn new(preamble: impl Into<String>) -> Self {
        Self {
            preamble: preamble.into(),
        }
    }

    /// Lower a behavior tree into a Promela program.
    ///
    /// # Errors
    /// Structural problems only: dangling conditions, empty fallbacks, task ids reused
    /// for different actions, and names Spin would not accept.
    pub fn compile(&self, root: &BehaviorNode) -> Result<CompiledProgram, CompileError> {
        let fragment = lower(root, BODY_INDENT)?;

        let mut task_declarations = Vec::new();
        let mut seen_tasks: Vec<(&str, &str)> = Vec::new();
        for task in &fragment.tasks {
            match seen_tasks.iter().find(|(id, _)| *id == task.id) {
                Some((_, action)) if *action != task.action_type => {
                    return Err(CompileError::ConflictingTask {
                        id: task.id.clone(),
                        first: action.to_string(),
                        second: task.action_type.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    seen_tasks.push((&task.id, &task.action_type));
                    task_declarations.push(format!("Task {};", task.id));
                }
            }
        }

        let sensors = merge_sensors(&fragment.sensors);
        let global_declarations = sensors.iter().map(|s| format!("int {};", s.variable)).collect();
        let sensor_selectors = sensors.iter().map(Sensor::helper).collect();

        let mut init_block = String::from("init {\n");
        init_block.push_str(INDENT);
        init_block.push_str("atomic {\n");
        for line in &fragment.lines {
            init_block.push_str(line);
            init_block.push('\n');
        }
        init_block.push_str(INDENT);
        init_block.push_str("}\n}\n");

        Ok(CompiledProgram {
            preamble: self.preamble.clone(),
            task_declarations,
            global_declarations,
            sensor_selectors,
            init_block,
        })
    }
}

/// A nondeterministically sampled sensor reading.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Sensor {
    variable: String,
    low: i64,
    high: i64,
}

impl Sensor {
    fn helper_name(variable: &str) -> String {
        format!("select_{}", variable)
    }

    fn helper(&self) -> String {
        format!(
            "inline {}() {{\n{}select({} : {} .. {});\n}}",
            Self::helper_name(&self.variable),
            INDENT,
            self.variable,
            self.low,
            self.high
        )
    }
}

/// A condition node reduced to the pieces the enclosing choice needs.
struct Gate {
    sensor: Sensor,
    guard: String,
}

impl Gate {
    fn from_node(node: &BehaviorNode) -> Result<Option<Gate>, CompileError> {
        let gate = match node {
            BehaviorNode::BoolCondition { variable, expected } => Gate {
                sensor: Sensor {
                    variable: identifier(variable)?,
                    low: 0,
                    high: 1,
                },
                guard: format!("{} == {}", variable, u8::from(*expected)),
            },
            BehaviorNode::ValueCondition {
                variable,
                comparator,
                threshold,
            } => {
                if !THRESHOLD_RANGE.contains(threshold) {
                    return Err(CompileError::ThresholdOutOfRange {
                        variable: variable.clone(),
                        threshold: *threshold,
                    });
                }
                Gate {
                    sensor: Sensor {
                        variable: identifier(variable)?,
                        low: threshold - 1,
                        high: threshold + 1,
                    },
                    guard: format!("{} {} {}", variable, comparator.operator(), threshold),
                }
            }
            BehaviorNode::Sequence { .. }
            | BehaviorNode::Fallback { .. }
            | BehaviorNode::Parallel { .. }
            | BehaviorNode::Leaf(_) => return Ok(None),
        };
        Ok(Some(gate))
    }
}

/// Output of lowering one subtree.
#[derive(Default)]
struct Fragment {
    lines: Vec<String>,
    tasks: Vec<TaskNode>,
    sensors: Vec<Sensor>,
}

impl Fragment {
    fn append(&mut self, other: Fragment) {
        self.lines.extend(other.lines);
        self.tasks.extend(other.tasks);
        self.sensors.extend(other.sensors);
    }

    fn line(&mut self, indent: usize, text: impl AsRef<str>) {
        self.lines.push(format!("{}{}", INDENT.repeat(indent), text.as_ref()));
    }
}

/// One arm of a choice: the gates on its head and the steps it runs.
struct Branch<'a> {
    gates: Vec<Gate>,
    body: Vec<&'a BehaviorNode>,
}

fn lower(node: &BehaviorNode, indent: usize) -> Result<Fragment, CompileError> {
    match node {
        BehaviorNode::Sequence { children } => lower_sequence(children, indent),
        BehaviorNode::Fallback { children } => lower_fallback(children, indent),
        BehaviorNode::Parallel { children } => {
            tracing::warn!(
                "Parallel node with {} children is not modeled; skipping it in the Promela program",
                children.len()
            );
            Ok(Fragment::default())
        }
        BehaviorNode::Leaf(task) => {
            identifier(&task.id)?;
            identifier(&task.action_type)?;
            let mut fragment = Fragment::default();
            fragment.line(
                indent,
                format!("{}.action.actionType = {};", task.id, task.action_type),
            );
            fragment.tasks.push(task.clone());
            Ok(fragment)
        }
        BehaviorNode::BoolCondition { variable, .. } | BehaviorNode::ValueCondition { variable, .. } => {
            Err(CompileError::DanglingCondition(variable.clone()))
        }
    }
}

/// Steps run in order; a condition gates the step right after it.
fn lower_sequence(children: &[BehaviorNode], indent: usize) -> Result<Fragment, CompileError> {
    let mut fragment = Fragment::default();
    let mut pending: Vec<Gate> = Vec::new();

    for child in children {
        if let Some(gate) = Gate::from_node(child)? {
            pending.push(gate);
            continue;
        }

        if pending.is_empty() {
            fragment.append(lower(child, indent)?);
            continue;
        }

        let branch = Branch {
            gates: std::mem::take(&mut pending),
            body: vec![child],
        };
        fragment.append(lower_choice(vec![branch], indent)?);
    }

    match pending.first() {
        Some(gate) => Err(CompileError::DanglingCondition(gate.sensor.variable.clone())),
        None => Ok(fragment),
    }
}

/// Fallback children become mutually exclusive branches of one `if`.
fn lower_fallback(children: &[BehaviorNode], indent: usize) -> Result<Fragment, CompileError> {
    if children.is_empty() {
        return Err(CompileError::EmptyFallback);
    }

    let mut branches = Vec::new();
    let mut pending: Vec<Gate> = Vec::new();

    for child in children {
        if let Some(gate) = Gate::from_node(child)? {
            pending.push(gate);
            continue;
        }

        let mut gates = std::mem::take(&mut pending);
        let mut body = vec![child];

        // A gated sequence (e.g. a ConditionalActions block) lends its leading
        // conditions to the branch head.
        if let BehaviorNode::Sequence { children: inner } = child {
            let lead = inner.iter().take_while(|c| c.is_condition()).count();
            if lead > 0 {
                for cond in &inner[..lead] {
                    gates.extend(Gate::from_node(cond)?);
                }
                body = inner[lead..].iter().collect();
                if body.is_empty() {
                    return Err(CompileError::DanglingCondition(
                        gates[gates.len() - 1].sensor.variable.clone(),
                    ));
                }
            }
        }

        branches.push(Branch { gates, body });
    }

    if let Some(gate) = pending.first() {
        return Err(CompileError::DanglingCondition(gate.sensor.variable.clone()));
    }

    lower_choice(branches, indent)
}

/// Emit the sensor reads, then `if`, one arm per branch, and `fi;`.
///
/// Without an ungated branch the choice gets `:: else -> skip;`, so that it does not
/// block when no guard holds.
fn lower_choice(branches: Vec<Branch>, indent: usize) -> Result<Fragment, CompileError> {
    let mut fragment = Fragment::default();

    let mut calls: Vec<&str> = Vec::new();
    for gate in branches.iter().flat_map(|b| b.gates.iter()) {
        if !calls.contains(&gate.sensor.variable.as_str()) {
            calls.push(&gate.sensor.variable);
        }
    }
    for variable in &calls {
        fragment.line(indent, format!("{}();", Sensor::helper_name(variable)));
    }

    fragment.line(indent, "if");
    let mut has_else = false;
    let mut has_default = false;

    for (position, branch) in branches.iter().enumerate() {
        let head = if !branch.gates.is_empty() {
            let guards: Vec<&str> = branch.gates.iter().map(|g| g.guard.as_str()).collect();
            format!(":: {} ->", guards.join(" && "))
        } else if position == 0 {
            has_default = true;
            "::".to_string()
        } else if !has_else {
            has_else = true;
            has_default = true;
            ":: else ->".to_string()
        } else {
            tracing::warn!(
                "Fallback branch {} is unreachable after the default branch; dropping it",
                position
            );
            continue;
        };

        fragment.line(indent, head);
        for node in &branch.body {
            fragment.append(lower(node, indent + 1)?);
        }
    }

    if !has_default {
        fragment.line(indent, ":: else -> skip;");
    }
    fragment.line(indent, "fi;");

    for branch in branches {
        fragment.sensors.extend(branch.gates.into_iter().map(|g| g.sensor));
    }
    Ok(fragment)
}

/// Deduplicate sensors by variable, widening the range when a variable is read
/// by several conditions. First-seen order is kept.
fn merge_sensors(sensors: &[Sensor]) -> Vec<Sensor> {
    let mut merged: Vec<Sensor> = Vec::new();
    for sensor in sensors {
        match merged.iter_mut().find(|s| s.variable == sensor.variable) {
            Some(existing) => {
                existing.low = existing.low.min(sensor.low);
                existing.high = existing.high.max(sensor.high);
            }
            None => merged.push(sensor.clone()),
        }
    }
    merged
}

fn identifier(name: &str) -> Result<String, CompileError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name.to_string())
    } else {
        Err(CompileError::InvalidIdentifier(name.to_string()))
    }
}
