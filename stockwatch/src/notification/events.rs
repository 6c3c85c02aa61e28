//! Edge events produced by the change detector.

use serde::{Deserialize, Serialize};

use crate::domain::{Facet, Observation, TrackedKey};

/// Direction of a boolean change for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    BecameTrue,
    BecameFalse,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BecameTrue => "became_true",
            Self::BecameFalse => "became_false",
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected transition, with the observation that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeEvent {
    pub key: TrackedKey,
    pub transition: Transition,
    pub observation: Observation,
}

impl EdgeEvent {
    pub fn new(key: TrackedKey, transition: Transition, observation: Observation) -> Self {
        Self {
            key,
            transition,
            observation,
        }
    }

    pub fn facet(&self) -> Facet {
        self.key.facet
    }

    /// Quantity for the event's facet. Display only.
    pub fn quantity(&self) -> Option<u32> {
        self.observation.quantity(self.key.facet)
    }

    pub fn became_true(&self) -> bool {
        self.transition == Transition::BecameTrue
    }
}
