//! Persisted state documents.
//!
//! Every document is a JSON object written through a temp sibling and renamed
//! into place.

pub mod alert_registry;
pub mod alert_store;
pub mod message_record;

pub use alert_registry::AlertMessageRegistry;
pub use alert_store::{AlertState, AlertStateStore};
pub use message_record::{HeartbeatRecord, MessageHandleRecord, RecordFile};
