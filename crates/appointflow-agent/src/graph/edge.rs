use std::fmt;
use std::sync::Arc;

use appointflow_core::types::RunContext;

use super::node::StepId;

/// Where a run goes after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    To(StepId),
    End,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::To(id) => f.write_str(id.as_str()),
            Self::End => f.write_str("end"),
        }
    }
}

impl From<StepId> for Route {
    fn from(id: StepId) -> Self {
        Self::To(id)
    }
}

/// A routing test reading the context after the source step ran.
pub type Predicate = Arc<dyn Fn(&RunContext) -> bool + Send + Sync>;

/// The single outgoing edge of a node.
///
/// A branch only chooses between its two declared routes, so every route an
/// edge can produce is known when the graph is built.
#[derive(Clone)]
pub enum Edge {
    /// Unconditional transition.
    Always(Route),
    /// `then` when the predicate holds, `otherwise` when it does not.
    Branch {
        when: Predicate,
        then: Route,
        otherwise: Route,
    },
}

impl Edge {
    pub fn to(id: StepId) -> Self {
        Self::Always(Route::To(id))
    }

    pub fn end() -> Self {
        Self::Always(Route::End)
    }

    pub fn branch<F>(when: F, then: impl Into<Route>, otherwise: impl Into<Route>) -> Self
    where
        F: Fn(&RunContext) -> bool + Send + Sync + 'static,
    {
        Self::Branch {
            when: Arc::new(when),
            then: then.into(),
            otherwise: otherwise.into(),
        }
    }

    /// Every route this edge may produce.
    pub fn targets(&self) -> Vec<Route> {
        match self {
            Self::Always(route) => vec![*route],
            Self::Branch {
                then, otherwise, ..
            } => vec![*then, *otherwise],
        }
    }

    /// Pick the next route.
    pub fn resolve(&self, ctx: &RunContext) -> Route {
        match self {
            Self::Always(route) => *route,
            Self::Branch {
                when,
                then,
                otherwise,
            } => {
                if when(ctx) {
                    *then
                } else {
                    *otherwise
                }
            }
        }
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always(route) => f.debug_tuple("Always").field(route).finish(),
            Self::Branch {
                then, otherwise, ..
            } => f
                .debug_struct("Branch")
                .field("then", then)
                .field("otherwise", otherwise)
                .finish_non_exhaustive(),
        }
    }
}
