//! Graph execution engine.
//!
//! A graph is a fixed set of [`Node`]s, one per [`StepId`], each with exactly
//! one outgoing [`Edge`]. The [`GraphExecutor`] walks it from the entry node,
//! invoking every step through the shared middleware [`Pipeline`] and letting
//! edges pick the next node from the updated context.
//!
//! [`Pipeline`]: crate::middleware::Pipeline

pub mod builder;
pub mod edge;
pub mod executor;
pub mod node;

pub use builder::{build_graph, Graph, GraphBuilder, ReviewMode};
pub use edge::{Edge, Predicate, Route};
pub use executor::GraphExecutor;
pub use node::{Node, StepId};
