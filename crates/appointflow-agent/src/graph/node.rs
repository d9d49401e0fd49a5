use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use appointflow_core::error::AppointflowError;

use crate::steps::Step;

/// The closed set of steps a graph can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StepId {
    #[serde(rename = "classify_intent")]
    Classify,
    #[serde(rename = "safety_check")]
    SafetyCheck,
    #[serde(rename = "info_check")]
    InfoCheck,
    #[serde(rename = "handle_intent")]
    HandleIntent,
    #[serde(rename = "draft")]
    Draft,
    #[serde(rename = "human_review")]
    HumanReview,
    #[serde(rename = "finalize")]
    Finalize,
}

impl StepId {
    pub const ALL: [StepId; 7] = [
        Self::Classify,
        Self::SafetyCheck,
        Self::InfoCheck,
        Self::HandleIntent,
        Self::Draft,
        Self::HumanReview,
        Self::Finalize,
    ];

    /// Name used in route traces and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classify => "classify_intent",
            Self::SafetyCheck => "safety_check",
            Self::InfoCheck => "info_check",
            Self::HandleIntent => "handle_intent",
            Self::Draft => "draft",
            Self::HumanReview => "human_review",
            Self::Finalize => "finalize",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepId {
    type Err = AppointflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| AppointflowError::Graph(format!("unknown step '{s}'")))
    }
}

/// A registered step. The node's id is the step's own id.
#[derive(Clone)]
pub struct Node {
    id: StepId,
    step: Arc<dyn Step>,
}

impl Node {
    pub fn new(step: Arc<dyn Step>) -> Self {
        Self {
            id: step.id(),
            step,
        }
    }

    pub fn id(&self) -> StepId {
        self.id
    }

    pub fn step(&self) -> &dyn Step {
        self.step.as_ref()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node").field("id", &self.id).finish()
    }
}
