//! Error types for template resolution
//!
//! Every failure surfaced by the resolver is a [`TemplateError`]. Errors raised
//! inside a pipeline stage carry the stage and the offending snippet so a
//! failure can be diagnosed without re-running with verbose tracing.

mod constructors;
mod types;

pub use types::{Stage, TemplateError, TemplateResult};
