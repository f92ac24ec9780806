//! HTTP/JSON API surface (spec.md §6).

pub mod error;
pub mod handlers;
pub mod http;
pub mod state;

pub use error::ApiError;
pub use http::create_router;
pub use state::AppState;
