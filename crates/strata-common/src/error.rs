//! Common error types for the Strata proxy.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`StrataError`].
pub type StrataResult<T> = Result<T, StrataError>;

/// Errors surfaced by the proxy service, its drivers and its transport.
#[derive(Error, Diagnostic, Debug)]
pub enum StrataError {
    /// An operation other than `Init` reached the proxy before a driver was set up.
    #[error("driver not initialized")]
    #[diagnostic(
        code(strata::proxy::not_initialized),
        help("Call Init with a registered driver name before any other operation")
    )]
    NotInitialized,

    /// Opaque failure reported by a storage driver.
    #[error("{message}")]
    #[diagnostic(code(strata::driver))]
    Driver {
        /// The backend's own message.
        message: String,
    },

    /// The driver handed back a mount path outside the proxy root.
    #[error("Get({id}) returned path={path} without prefix={root}")]
    #[diagnostic(
        code(strata::proxy::contract_violation),
        help("The storage driver must keep every mount point under the proxy root")
    )]
    ContractViolation {
        /// Layer the mount was requested for.
        id: String,
        /// Path returned by the driver.
        path: String,
        /// The proxy root it should have been under.
        root: String,
    },

    /// A namespace helper could not be started or exited non-zero.
    #[error("{operation} failed: {message}")]
    #[diagnostic(code(strata::bridge))]
    Bridge {
        /// Helper program that failed.
        operation: String,
        /// Exit status or spawn error.
        message: String,
    },

    /// `Put` was called for a layer that has no tracked mount.
    #[error("no such mount: {id}")]
    #[diagnostic(
        code(strata::proxy::unbalanced_put),
        help("Every Put must be preceded by a successful Get for the same layer")
    )]
    UnbalancedPut {
        /// The layer ID.
        id: String,
    },

    /// `Get` for a layer that is already bridged into the container.
    #[error("layer already mounted: {id}")]
    #[diagnostic(
        code(strata::proxy::already_mounted),
        help("Put the layer before requesting it again")
    )]
    AlreadyMounted {
        /// The layer ID.
        id: String,
    },

    /// `Init` named a driver that is not registered.
    #[error("unknown driver: {name}")]
    #[diagnostic(code(strata::driver::unknown))]
    UnknownDriver {
        /// The requested driver name.
        name: String,
    },

    /// Layer already exists.
    #[error("layer already exists: {id}")]
    #[diagnostic(code(strata::layer::exists))]
    LayerExists {
        /// The layer ID.
        id: String,
    },

    /// Layer not found.
    #[error("layer not found: {id}")]
    #[diagnostic(code(strata::layer::not_found))]
    LayerNotFound {
        /// The layer ID.
        id: String,
    },

    /// Layer still holds mount references.
    #[error("layer in use: {id} ({refs} active references)")]
    #[diagnostic(code(strata::layer::in_use), help("Put every Get before removing a layer"))]
    LayerInUse {
        /// The layer ID.
        id: String,
        /// Outstanding mount references.
        refs: usize,
    },

    /// Layer ID that cannot be used as a directory name.
    #[error("invalid layer ID: {id:?}")]
    #[diagnostic(
        code(strata::layer::invalid_id),
        help("Layer IDs must be non-empty and must not contain '/' or be '.' or '..'")
    )]
    InvalidLayerId {
        /// The invalid layer ID.
        id: String,
    },

    /// Malformed driver option.
    #[error("invalid driver option: {option}")]
    #[diagnostic(code(strata::driver::invalid_option), help("Driver options use the form key=value"))]
    InvalidOption {
        /// The offending option string.
        option: String,
    },

    /// Error reported by a remote proxy whose kind has no local variant.
    #[error("{message}")]
    #[diagnostic(code(strata::remote))]
    Remote {
        /// Wire kind string.
        kind: String,
        /// Remote error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(strata::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(strata::serialization))]
    Serialization(String),

    /// Feature not supported on this platform.
    #[error("Feature not supported: {feature}")]
    #[diagnostic(code(strata::unsupported), help("This driver requires Linux"))]
    Unsupported {
        /// The unsupported feature.
        feature: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(strata::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(strata::internal),
        help("This is a bug, please report it at https://github.com/strata-containers/strata/issues")
    )]
    Internal {
        /// The error message.
        message: String,
    },
}

impl StrataError {
    /// Stable, machine-readable name of the error kind.
    ///
    /// This is what the transport puts on the wire next to the message.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::Driver { .. } => "driver",
            Self::ContractViolation { .. } => "contract_violation",
            Self::Bridge { .. } => "bridge",
            Self::UnbalancedPut { .. } => "unbalanced_put",
            Self::AlreadyMounted { .. } => "already_mounted",
            Self::UnknownDriver { .. } => "unknown_driver",
            Self::LayerExists { .. } => "layer_exists",
            Self::LayerNotFound { .. } => "layer_not_found",
            Self::LayerInUse { .. } => "layer_in_use",
            Self::InvalidLayerId { .. } => "invalid_layer_id",
            Self::InvalidOption { .. } => "invalid_option",
            Self::Remote { kind, .. } => kind.as_str(),
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Unsupported { .. } => "unsupported",
            Self::Config { .. } => "config",
            Self::Internal { .. } => "internal",
        }
    }

    /// Wrap any backend failure as an opaque driver error.
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Rebuild an error received from a remote proxy.
    ///
    /// Kinds that carry no fields are restored to their variant, everything
    /// else keeps the remote message verbatim.
    #[must_use]
    pub fn from_wire(kind: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            "not_initialized" => Self::NotInitialized,
            "driver" => Self::Driver { message },
            _ => Self::Remote {
                kind: kind.to_string(),
                message,
            },
        }
    }
}

impl From<serde_json::Error> for StrataError {
    fn from(err: serde_json::Error) -> Self {
        StrataError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StrataError::UnbalancedPut {
            id: "abc123".to_string(),
        };
        assert_eq!(err.to_string(), "no such mount: abc123");

        let err = StrataError::ContractViolation {
            id: "L1".to_string(),
            path: "/elsewhere/L1".to_string(),
            root: "/data".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Get(L1) returned path=/elsewhere/L1 without prefix=/data"
        );
    }

    #[test]
    fn driver_message_is_verbatim() {
        let err = StrataError::driver("overlay: lowerdir missing");
        assert_eq!(err.to_string(), "overlay: lowerdir missing");
        assert_eq!(err.kind(), "driver");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StrataError = io_err.into();
        assert!(matches!(err, StrataError::Io(_)));
    }

    #[test]
    fn wire_kinds_survive_a_round_trip() {
        let err = StrataError::from_wire("not_initialized", "driver not initialized");
        assert!(matches!(err, StrataError::NotInitialized));

        let original = StrataError::UnbalancedPut { id: "L9".into() };
        let rebuilt = StrataError::from_wire(original.kind(), original.to_string());
        assert_eq!(rebuilt.kind(), "unbalanced_put");
        assert_eq!(rebuilt.to_string(), "no such mount: L9");
    }
}
