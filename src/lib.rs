//! chemrec: baseline reconciliation and deviation detection
//!
//! Derives a per-product attribute baseline from supplier submissions,
//! reconciles chemical composition records, and validates new submissions
//! against the baseline, opening incidents for deviations that need action.

pub mod cli;
pub mod core;
pub mod entities;
pub mod yaml;
