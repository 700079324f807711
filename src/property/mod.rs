//! Temporal property handling: extraction, syntax rewriting and reconciliation.

pub mod reconcile;
pub mod text;

pub use reconcile::{reconcile, DriftDirection, DriftError};
pub use text::{extract_property, strip_property_wrapper, to_translator_syntax, translator_formula};
