//! Compiled Promela program.

use serde::{Deserialize, Serialize};

/// A Promela program lowered from a mission behavior tree.
///
/// # Invariants
/// - Every global referenced in `init_block` appears exactly once in `global_declarations`
/// - Every sensor helper appears exactly once in `sensor_selectors`
/// - Task declarations keep first-seen order
///
/// Section order in [`CompiledProgram::render`] is fixed: Spin's parser needs the
/// typedefs from the preamble before the declarations, and the helpers before `init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledProgram {
    /// Template header with the `Task` typedef and action symbols
    pub preamble: String,

    /// `Task <id>;` lines
    pub task_declarations: Vec<String>,

    /// `int <name>;` lines
    pub global_declarations: Vec<String>,

    /// `inline select_<name>() { ... }` blocks
    pub sensor_selectors: Vec<String>,

    /// `init { atomic { ... } }`
    pub init_block: String,
}

impl CompiledProgram {
    /// Full program text handed to the model checker.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.preamble);
        if !self.preamble.is_empty() && !self.preamble.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');

        for decl in &self.task_declarations {
            out.push_str(decl);
            out.push('\n');
        }
        out.push('\n');

        if !self.global_declarations.is_empty() {
            for decl in &self.global_declarations {
                out.push_str(decl);
                out.push('\n');
            }
            out.push('\n');
        }

        for selector in &self.sensor_selectors {
            out.push_str(selector);
            out.push_str("\n\n");
        }

        out.push_str(&self.init_block);
        out
    }

    /// Declared task identifiers, in declaration order.
    pub fn task_names(&self) -> Vec<&str> {
        self.task_declarations
            .iter()
            .filter_map(|d| d.strip_prefix("Task ")?.strip_suffix(';'))
            .collect()
    }

    /// Declared sensor globals, in declaration order.
    pub fn global_names(&self) -> Vec<&str> {
        self.global_declarations
            .iter()
            .filter_map(|d| d.strip_prefix("int ")?.strip_suffix(';'))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> CompiledProgram {
        CompiledProgram {
            preamble: "typedef Task { mtype actionType }".to_string(),
            task_declarations: vec!["Task T1;".to_string(), "Task T2;".to_string()],
            global_declarations: vec!["int temp;".to_string()],
            sensor_selectors: vec![
                "inline select_temp() {\n    select(temp : 29 .. 31);\n}".to_string(),
            ],
            init_block: "init {\n    atomic {\n    }\n}\n".to_string(),
        }
    }

    #[test]
    fn test_render_section_order() {
        let text = program().render();
        let preamble = text.find("typedef Task").unwrap();
        let task = text.find("Task T1;").unwrap();
        let global = text.find("int temp;").unwrap();
        let selector = text.find("inline select_temp").unwrap();
        let init = text.find("init {").unwrap();
        assert!(preamble < task && task < global && global < selector && selector < init);
    }

    #[test]
    fn test_declared_names() {
        let p = program();
        assert_eq!(p.task_names(), vec!["T1", "T2"]);
        assert_eq!(p.global_names(), vec!["temp"]);
    }
}
