pub mod coordinator;
pub mod graph;
pub mod middleware;
pub mod resume;
pub mod run_log;
pub mod slots;
pub mod steps;

pub use coordinator::{MemoryPauseStore, PauseStore, RunCoordinator};
pub use graph::{build_graph, Edge, Graph, GraphBuilder, GraphExecutor, ReviewMode, Route, StepId};
pub use middleware::{CallLimit, Middleware, Next, Pipeline, Redact, Retry};
pub use resume::{after_pause, apply_review, resolve_alternative, PauseOutcome, Stage};
pub use run_log::RunLogger;
pub use slots::{check_availability, extract_requested_timeslot, Availability};
pub use steps::{FnStep, HumanReview, PauseForReview, ReviewDecision, Reviewer, Step};
