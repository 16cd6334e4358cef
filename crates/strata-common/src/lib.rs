//! # strata-common
//!
//! Shared utilities and types for the Strata graph-driver proxy.
//!
//! This crate provides common functionality used across all Strata crates:
//! - Common error types
//! - Driver option parsing
//! - Standard filesystem paths

#![warn(missing_docs)]

pub mod error;
pub mod options;
pub mod paths;

pub use error::{StrataError, StrataResult};
pub use options::DriverOptions;
pub use paths::StrataPaths;
