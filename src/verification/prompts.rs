//! Prompt text for the generator roles.

use crate::automaton::AcceptingRun;
use crate::promela::CompiledProgram;

pub const MISSION_FRAMING: &str = "You are a mission planner for field robots. \
When asked for a mission, answer with one ```xml fenced block holding a mission plan that \
validates against the provided schema, including the xsi:schemaLocation attribute on the \
root element. Use the context files to ground locations and actions. If the mission cannot \
be achieved with the information given, say so and do not provide XML.";

pub const PROPERTY_FRAMING: &str = "You write linear temporal logic properties for the Spin \
model checker. Answer with one ```ltl fenced block of the form `ltl <name> { <formula> }` \
using only the Promela names you are given.";

pub fn schema_context(schema: &str) -> String {
    format!(
        "This is the schema mission plans must validate against:\n{}",
        schema
    )
}

pub fn context_file(content: &str) -> String {
    format!(
        "Use this additional file as context when generating mission plans:\n{}",
        content
    )
}

pub fn promela_context(template: &str) -> String {
    format!(
        "Missions are modeled in Promela on top of this template:\n{}",
        template
    )
}

pub fn mission_retry(diagnostic: &str) -> String {
    format!(
        "Validation of the mission plan failed with this error. Fix it and return the full XML mission plan:\n{}",
        diagnostic
    )
}

pub fn mission_violation(trail: &str) -> String {
    format!(
        "The model checker found an execution of the mission plan that violates the requested behavior. \
         Fix the mission and return the full XML mission plan. Counterexample:\n{}",
        trail
    )
}

pub fn property_request(request: &str) -> String {
    format!("Generate a Spin LTL property for this mission request: {}", request)
}

pub fn property_retry(diagnostic: &str) -> String {
    format!(
        "The LTL property failed verification. Generate a new LTL property:\n{}",
        diagnostic
    )
}

/// Names the property must use, taken from the compiled mission.
pub fn property_seed(program: &CompiledProgram) -> String {
    format!(
        "Use exactly these Promela names in the LTL, any other name will not parse.\nTasks:\n{}\nSensor readings:\n{}",
        program.task_names().join("\n"),
        program.global_names().join("\n")
    )
}

pub fn arbiter_question(request: &str, runs: &[AcceptingRun]) -> String {
    format!(
        "Answer with one word, \"Yes\" or \"No\". Below is a mission request and example executions \
         of the plan made for it. Are ALL of these executions faithful to the request?\n\
         Mission request:\n{}\nExample runs:\n{}",
        request,
        render_runs(runs)
    )
}

pub fn render_runs(runs: &[AcceptingRun]) -> String {
    runs.iter()
        .map(|run| run.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
