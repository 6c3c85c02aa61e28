//! Domain types: tracked keys, observations, and value objects.

pub mod observation;
pub mod tracked_key;
pub mod value_objects;

pub use observation::Observation;
pub use tracked_key::{Facet, KEY_SEPARATOR, TrackedKey};
pub use value_objects::RetryPolicy;
