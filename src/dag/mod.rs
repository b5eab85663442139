// src/dag/mod.rs

//! Task dependency graph.
//!
//! [`graph`] validates task names and edges, detects cycles, and answers
//! read-only adjacency queries for the scheduler. All per-run state lives in
//! [`crate::engine`]; the graph itself never changes after it is built.

pub mod graph;

pub use graph::DependencyGraph;
