//! Observation, change detection and the poll loop.

pub mod detector;
pub mod service;
pub mod source;

pub use detector::{ChangeDetector, CycleDiff, FacetToggles};
pub use service::{CycleOutcome, PollCycleOrchestrator};
pub use source::{ObservationSource, PageObservationSource, parse_product_page};
