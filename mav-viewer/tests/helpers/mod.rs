//! Test Helper Utilities
//!
//! Shared utilities for testing mav-viewer

#![allow(dead_code)]

pub mod fixtures;
pub mod scripted_source;

pub use fixtures::{bundle_json, objective_question, objective_set, topic_route};
pub use scripted_source::ScriptedSource;
