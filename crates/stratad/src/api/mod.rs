//! Remote procedure front-end.

pub mod server;

pub use server::{ApiError, app};
