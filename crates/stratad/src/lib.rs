//! # stratad
//!
//! Daemon exposing a [`strata::ProxyService`] over HTTP/JSON, on a Unix
//! socket or a TCP port.

#![warn(missing_docs)]

pub mod api;
pub mod cli;
pub mod client;
pub mod listen;

pub use client::ProxyClient;
pub use listen::{ListenAddr, serve};
