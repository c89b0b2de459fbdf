// src/api/mod.rs
pub mod handlers;
pub mod response;

pub use handlers::{AppState, create_api_routes};
pub use response::ApiResult;
