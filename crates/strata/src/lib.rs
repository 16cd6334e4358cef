//! # Strata graph-driver proxy
//!
//! Strata lets an unprivileged container runtime drive a copy-on-write layer
//! driver that runs in a privileged process. The runtime calls the proxy,
//! the proxy calls the driver, and mounts handed out by the driver are
//! bridged into the runtime's container through namespace helpers.
//!
//! ## Usage
//!
//! ```no_run
//! use strata::{ProxyConfig, ProxyService};
//!
//! # fn example() -> strata_common::StrataResult<()> {
//! let config = ProxyConfig::new("ctA").with_root("/data");
//! let proxy = ProxyService::new(&config);
//!
//! proxy.init("local", "/layers", &[])?;
//! proxy.create("L1", "")?;
//!
//! // Mounted at /data/layers/L1/merged, bridged into ctA.
//! let dir = proxy.get("L1", "")?;
//! assert_eq!(dir, "/layers/L1/merged");
//!
//! proxy.put("L1")?;
//! proxy.remove("L1")?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod api;
pub mod bridge;
pub mod config;
pub mod driver;
pub mod proxy;

pub use bridge::{HelperBridge, NamespaceBridge};
pub use config::ProxyConfig;
pub use driver::{DriverRegistry, GraphDriver};
pub use proxy::ProxyService;
