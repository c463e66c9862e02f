//! Random forest inference engine
//!
//! - Flat-vector regression trees (`tree`)
//! - Mean-of-trees ensemble with structural validation (`model`)
//!
//! Training lives in the `aircast-trainer` crate; this module only has to load
//! and evaluate what the trainer produced.

pub mod model;
pub mod tree;

pub use model::{Forest, ForestError, FOREST_FORMAT_VERSION};
pub use tree::{Node, Tree};
