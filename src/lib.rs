//! # Mission Planner
//!
//! Turns natural-language mission requests into robot mission plans that have been
//! checked against a temporal property before they are handed out.
//!
//! ## Flow
//!
//! ```text
//!   request ─▶ mission XML ─▶ behavior tree ─▶ Promela model ─┐
//!                                                             ├─▶ Spin ─▶ arbiter ─▶ artifact
//!   request ─▶ LTL property ─▶ Büchi automaton ─▶ sampled runs ┘
//! ```
//!
//! Every stage failure is fed back to the generator that can fix it, under one retry
//! budget per request.
//!
//! ## Modules
//! - `mission`: behavior-tree model, XML parsing and schema validation
//! - `promela`: behavior tree to Promela compiler
//! - `property`: LTL extraction, rewriting and task-count reconciliation
//! - `automaton`: HOA parsing, `ltl2tgba` adapter and accepting-run sampling
//! - `checker`: Spin adapter
//! - `llm`: chat-completions client and per-role conversations
//! - `verification`: the retry loop tying the stages together

pub mod automaton;
pub mod checker;
pub mod config;
pub mod llm;
pub mod mission;
pub mod promela;
pub mod property;
pub mod util;
pub mod verification;

pub use config::Config;
pub use verification::{MissionOutcome, Orchestrator};
