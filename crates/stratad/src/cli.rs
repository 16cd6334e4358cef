//! Command-line configuration for the daemon.

use std::path::PathBuf;

use clap::Parser;
use strata::ProxyConfig;
use strata::bridge::{MOUNT_HELPER, UMOUNT_HELPER};
use strata_common::{StrataPaths, StrataResult};

use crate::listen::ListenAddr;

/// stratad - privileged graph-driver proxy
#[derive(Parser, Debug)]
#[command(name = "stratad")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Root directory every driver mount must live under
    #[arg(long, env = "STRATA_ROOT", default_value = "/var/lib/strata")]
    pub root: PathBuf,

    /// Daemon label (key=value); `ctname=<container>` selects the target container
    #[arg(long = "label", env = "STRATA_LABELS", value_delimiter = ',')]
    pub labels: Vec<String>,

    /// Target container, overrides the ctname label
    #[arg(long)]
    pub container: Option<String>,

    /// Listen protocol
    #[arg(long, default_value = "unix", value_parser = ["tcp", "tcp4", "tcp6", "unix"])]
    pub proto: String,

    /// Listen address: socket path for unix, host:port for tcp
    #[arg(long)]
    pub addr: Option<String>,

    /// Namespace mount helper
    #[arg(long, default_value = MOUNT_HELPER)]
    pub mount_helper: String,

    /// Namespace unmount helper
    #[arg(long, default_value = UMOUNT_HELPER)]
    pub umount_helper: String,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    /// Proxy configuration described by these arguments.
    ///
    /// # Errors
    ///
    /// Fails when no container is named by `--container` or a `ctname=` label.
    pub fn proxy_config(&self) -> StrataResult<ProxyConfig> {
        let config = match &self.container {
            Some(name) => ProxyConfig::new(name.clone()),
            None => ProxyConfig::from_labels(&self.labels)?,
        };

        Ok(config
            .with_root(&self.root)
            .with_helpers(&self.mount_helper, &self.umount_helper))
    }

    /// Listen address described by these arguments.
    ///
    /// Unix sockets default to `strata.sock` in the runtime directory.
    ///
    /// # Errors
    ///
    /// Fails for TCP without `--addr`.
    pub fn listen_addr(&self) -> StrataResult<ListenAddr> {
        match (&self.addr, self.proto.as_str()) {
            (Some(addr), proto) => ListenAddr::parse(proto, addr),
            (None, "unix") => Ok(ListenAddr::Unix(StrataPaths::new().socket())),
            (None, proto) => ListenAddr::parse(proto, ""),
        }
    }

    /// Default log filter when `RUST_LOG` is unset.
    #[must_use]
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "stratad=debug,strata=debug,tower_http=debug"
        } else {
            "info"
        }
    }
}
