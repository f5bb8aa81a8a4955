//! Data models for the gifting application.
//!
//! Field names serialize as camelCase to match the frontend.

mod campaign;
mod gift;
mod report;
mod user;

pub use campaign::*;
pub use gift::*;
pub use report::*;
pub use user::*;
