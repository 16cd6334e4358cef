//! Async client for a proxy listening on TCP.

use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use strata::api::{
    CreateArgs, EmptyArgs, EmptyReply, ErrorReply, ExistsReply, GetArgs, GetMetadataReply,
    GetReply, IdArgs, InitArgs, Procedure, StatusReply,
};
use strata_common::{StrataError, StrataResult};

/// Client mirroring the proxy service handlers over HTTP.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    http: reqwest::Client,
    base_url: String,
}

impl ProxyClient {
    /// Client for a proxy at `addr` (`host:port`).
    #[must_use]
    pub fn new(addr: impl std::fmt::Display) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("http://{addr}"),
        }
    }

    async fn call<A, R>(&self, procedure: Procedure, args: &A) -> StrataResult<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, procedure.path());
        tracing::debug!(%procedure, url = %url, "Calling proxy");

        let response = self
            .http
            .post(&url)
            .json(args)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() {
            return response.json::<R>().await.map_err(transport_error);
        }

        let status = response.status();
        let reply = response.json::<ErrorReply>().await.map_err(|e| {
            StrataError::Io(std::io::Error::other(format!(
                "{procedure} failed with {status} and an unreadable body: {e}"
            )))
        })?;
        Err(reply.into())
    }

    /// Start driver `driver_name` in `root + home`.
    pub async fn init(&self, driver_name: &str, home: &str, options: &[String]) -> StrataResult<()> {
        let args = InitArgs {
            driver_name: driver_name.to_string(),
            home: home.to_string(),
            options: options.to_vec(),
        };
        let _: EmptyReply = self.call(Procedure::Init, &args).await?;
        Ok(())
    }

    /// Driver diagnostics.
    pub async fn status(&self) -> StrataResult<Vec<(String, String)>> {
        let reply: StatusReply = self.call(Procedure::Status, &EmptyArgs {}).await?;
        Ok(reply.status)
    }

    /// Create layer `id` on top of `parent`.
    pub async fn create(&self, id: &str, parent: &str) -> StrataResult<()> {
        let args = CreateArgs {
            id: id.to_string(),
            parent: parent.to_string(),
        };
        let _: EmptyReply = self.call(Procedure::Create, &args).await?;
        Ok(())
    }

    /// Remove layer `id`.
    pub async fn remove(&self, id: &str) -> StrataResult<()> {
        let _: EmptyReply = self.call(Procedure::Remove, &id_args(id)).await?;
        Ok(())
    }

    /// Mount layer `id`; returns the path relative to the proxy root.
    pub async fn get(&self, id: &str, mount_label: &str) -> StrataResult<String> {
        let args = GetArgs {
            id: id.to_string(),
            mount_label: mount_label.to_string(),
        };
        let reply: GetReply = self.call(Procedure::Get, &args).await?;
        Ok(reply.dir)
    }

    /// Release layer `id`.
    pub async fn put(&self, id: &str) -> StrataResult<()> {
        let _: EmptyReply = self.call(Procedure::Put, &id_args(id)).await?;
        Ok(())
    }

    /// Whether layer `id` exists.
    pub async fn exists(&self, id: &str) -> StrataResult<bool> {
        let reply: ExistsReply = self.call(Procedure::Exists, &id_args(id)).await?;
        Ok(reply.exists)
    }

    /// Driver-wide cleanup.
    pub async fn cleanup(&self) -> StrataResult<()> {
        let _: EmptyReply = self.call(Procedure::Cleanup, &EmptyArgs {}).await?;
        Ok(())
    }

    /// Metadata for layer `id`.
    pub async fn get_metadata(&self, id: &str) -> StrataResult<HashMap<String, String>> {
        let reply: GetMetadataReply = self.call(Procedure::GetMetadata, &id_args(id)).await?;
        Ok(reply.metadata)
    }
}

fn id_args(id: &str) -> IdArgs {
    IdArgs { id: id.to_string() }
}

fn transport_error(err: reqwest::Error) -> StrataError {
    StrataError::Io(std::io::Error::other(err))
}
