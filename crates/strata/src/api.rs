//! Wire types for the proxy procedures.
//!
//! Field names are PascalCase on the wire so replies stay readable by the
//! runtime's existing proxy-driver client.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strata_common::StrataError;

/// Service name prefixed to every procedure.
pub const SERVICE_NAME: &str = "ProxyAPI";

/// Remote-callable procedures, one per driver lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Procedure {
    /// Start a driver.
    Init,
    /// Driver diagnostics.
    Status,
    /// Create a layer.
    Create,
    /// Remove a layer.
    Remove,
    /// Mount and bridge a layer.
    Get,
    /// Unbridge and release a layer.
    Put,
    /// Layer existence check.
    Exists,
    /// Driver-wide teardown.
    Cleanup,
    /// Layer metadata.
    GetMetadata,
}

impl Procedure {
    /// Every procedure, in registration order.
    pub const ALL: [Self; 9] = [
        Self::Init,
        Self::Status,
        Self::Create,
        Self::Remove,
        Self::Get,
        Self::Put,
        Self::Exists,
        Self::Cleanup,
        Self::GetMetadata,
    ];

    /// Method name without the service prefix.
    #[must_use]
    pub const fn method(self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::Status => "Status",
            Self::Create => "Create",
            Self::Remove => "Remove",
            Self::Get => "Get",
            Self::Put => "Put",
            Self::Exists => "Exists",
            Self::Cleanup => "Cleanup",
            Self::GetMetadata => "GetMetadata",
        }
    }

    /// HTTP route for the procedure, e.g. `/ProxyAPI.Get`.
    #[must_use]
    pub fn path(self) -> String {
        format!("/{self}")
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", SERVICE_NAME, self.method())
    }
}

/// `Init` arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InitArgs {
    /// Registered driver name.
    pub driver_name: String,
    /// Home directory suffix, appended to the proxy root.
    #[serde(default)]
    pub home: String,
    /// Driver options (`key=value`).
    #[serde(default)]
    pub options: Vec<String>,
}

/// Arguments-less request body (`Status`, `Cleanup`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyArgs {}

/// Reply without payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyReply {}

/// `Status` reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusReply {
    /// Ordered key/value pairs.
    pub status: Vec<(String, String)>,
}

/// `Create` arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateArgs {
    /// New layer ID.
    pub id: String,
    /// Parent layer ID, empty for a base layer.
    #[serde(default)]
    pub parent: String,
}

/// Arguments naming a single layer (`Remove`, `Put`, `Exists`, `GetMetadata`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IdArgs {
    /// Layer ID.
    pub id: String,
}

/// `Get` arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetArgs {
    /// Layer ID.
    pub id: String,
    /// Security label for the mount.
    #[serde(default)]
    pub mount_label: String,
}

/// `Get` reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetReply {
    /// Mount path relative to the proxy root.
    pub dir: String,
}

/// `Exists` reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExistsReply {
    /// Whether the layer exists.
    pub exists: bool,
}

/// `GetMetadata` reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetMetadataReply {
    /// Driver-specific metadata.
    #[serde(rename = "MInfo")]
    pub metadata: HashMap<String, String>,
}

/// Error body returned for a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorReply {
    /// Machine-readable kind, see [`StrataError::kind`].
    pub kind: String,
    /// Human-readable message.
    pub error: String,
}

impl From<&StrataError> for ErrorReply {
    fn from(err: &StrataError) -> Self {
        Self {
            kind: err.kind().to_string(),
            error: err.to_string(),
        }
    }
}

impl From<ErrorReply> for StrataError {
    fn from(reply: ErrorReply) -> Self {
        StrataError::from_wire(&reply.kind, reply.error)
    }
}
