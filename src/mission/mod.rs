//! Mission module - behavior tree model, mission XML reader and schema validation.
//!
//! This module is designed with formal verification in mind:
//! - The tree is a closed enum with exhaustive matching
//! - Parsing is pure; only schema validation touches the outside world

pub mod schema;
pub mod tree;
pub mod xml;

pub use schema::{select_schema, SchemaValidator, SchemaVerdict, XmllintValidator};
pub use tree::{BehaviorNode, Comparator, TaskNode, THRESHOLD_RANGE};
pub use xml::{parse_mission, schema_location, MissionParseError};
