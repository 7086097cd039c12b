//! HTTP surface: admission API plus the inbound peer fabric.

mod handlers;
mod routes;
mod types;

pub use handlers::AppState;
pub use routes::create_router;
pub use types::*;
