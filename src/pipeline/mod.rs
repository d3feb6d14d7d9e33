//! # Message Pipeline
//!
//! The ordered chain one chat turn flows through, its value types, and
//! the prompts used for rewriting and generation.

pub mod model;
pub mod orchestrator;
pub mod prompt;
