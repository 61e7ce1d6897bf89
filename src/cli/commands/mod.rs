//! CLI command implementations

pub mod baseline;
pub mod diff;
pub mod incident;
pub mod rules;
pub mod validate;
