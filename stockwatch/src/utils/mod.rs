pub mod fs;
pub mod http_client;
pub mod time;
pub mod url;

pub use http_client::{HttpResponse, RetryingHttpClient, install_rustls_provider};
