pub mod error;
pub mod handlers;
pub mod helpers;
mod router;
pub mod types;

pub use error::ApiError;
pub use router::build_router;
pub use types::{AppState, Limiters, SharedState};
