pub mod http_client;
pub mod http_handler;
pub mod middleware;

/// Re-export commonly used types from adapters
pub use http_client::HttpClientAdapter;
pub use http_handler::{HttpHandler, STATUS_PATH, Upstream};
pub use middleware::{request_id_middleware, waf_middleware};
