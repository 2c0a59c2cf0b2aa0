//! Dagflow core - dependency graph and key-value store
//!
//! This crate holds the data structures the workflow engine is built on:
//!
//! - [`graph`]: generic directed acyclic graph with incremental cycle
//!   detection and a stable topological order
//! - [`store`]: insertion-ordered key-value store used for workflow input,
//!   plus a concurrency-safe variant for data shared between tasks
//! - [`error`]: error types for the crate
//!
//! # Quick Start
//!
//! ```
//! use dagflow_core::{Dag, Store};
//!
//! let mut dag = Dag::new();
//! dag.add_edge("extract", "load").unwrap();
//! assert_eq!(dag.zero_incoming(), vec!["extract"]);
//!
//! let input = Store::from_json(r#"{"region": "eu", "batch": 50}"#).unwrap();
//! assert_eq!(input.get_i64("batch"), 50);
//! ```

pub mod error;
pub mod graph;
pub mod store;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use graph::{CycleError, Dag};
pub use store::{SharedStore, Store};
