//! Value objects shared by configuration and services.

mod retry_policy;

pub use retry_policy::RetryPolicy;
