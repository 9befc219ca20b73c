//! HTTP surface: router, handlers, auth extraction and the error envelope.

mod admin_routes;
mod auth_routes;
mod error;
mod library_routes;
mod playlist_routes;
mod requests_logging;
mod server;
mod session;
mod state;
mod stats_routes;
mod stream_routes;
mod user_routes;

pub use error::{ApiError, ApiResult};
pub use requests_logging::{log_requests, RequestsLoggingLevel};
pub use server::{build_router, run_server};
pub use session::Session;
pub use state::{ServerConfig, ServerState};
