// src/lib.rs
pub mod activity;
pub mod api;
pub mod cluster;
pub mod config;
pub mod control;
pub mod error;

pub use activity::{ActivityEntry, ActivityLog};
pub use config::ControlConfig;
pub use error::{ControlError, ControlResult};
