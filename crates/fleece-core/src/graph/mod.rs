//! Relationship queries across a project's issues.
//!
//! - [`hierarchy`]: parent/child DAG, cycle prevention and parent changes.

pub mod hierarchy;

pub use hierarchy::{IssueGraph, ParentChange, plan_parent_change};
