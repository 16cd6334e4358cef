//! HTTP/JSON front-end for the proxy service.
//!
//! Each procedure is a `POST /ProxyAPI.<Method>` route taking the JSON
//! arguments and answering with the JSON reply, or an [`ErrorReply`] body
//! with a non-2xx status.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use strata::ProxyService;
use strata::api::{
    CreateArgs, EmptyReply, ErrorReply, ExistsReply, GetArgs, GetMetadataReply, GetReply, IdArgs,
    InitArgs, Procedure, StatusReply,
};
use strata_common::{StrataError, StrataResult};
use tower_http::trace::TraceLayer;

type Proxy = State<Arc<ProxyService>>;

/// Build the router for a proxy service.
pub fn app(service: Arc<ProxyService>) -> Router {
    Router::new()
        .route("/version", get(version))
        .route(&Procedure::Init.path(), post(init))
        .route(&Procedure::Status.path(), post(status))
        .route(&Procedure::Create.path(), post(create))
        .route(&Procedure::Remove.path(), post(remove))
        .route(&Procedure::Get.path(), post(get_layer))
        .route(&Procedure::Put.path(), post(put_layer))
        .route(&Procedure::Exists.path(), post(exists))
        .route(&Procedure::Cleanup.path(), post(cleanup))
        .route(&Procedure::GetMetadata.path(), post(get_metadata))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// A failed call, rendered as an [`ErrorReply`].
#[derive(Debug)]
pub struct ApiError(pub StrataError);

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            StrataError::NotInitialized
            | StrataError::UnbalancedPut { .. }
            | StrataError::AlreadyMounted { .. }
            | StrataError::LayerExists { .. }
            | StrataError::LayerInUse { .. } => StatusCode::CONFLICT,
            StrataError::LayerNotFound { .. } => StatusCode::NOT_FOUND,
            StrataError::UnknownDriver { .. }
            | StrataError::Serialization(_)
            | StrataError::InvalidOption { .. }
            | StrataError::InvalidLayerId { .. } => StatusCode::BAD_REQUEST,
            StrataError::ContractViolation { .. } | StrataError::Bridge { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(ErrorReply::from(&self.0))).into_response()
    }
}

impl From<StrataError> for ApiError {
    fn from(err: StrataError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(StrataError::Serialization(rejection.body_text()))
    }
}

/// JSON call arguments; a body that does not decode is answered with an
/// [`ErrorReply`] like any other failure.
pub struct CallArgs<T>(pub T);

impl<S, T> FromRequest<S> for CallArgs<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(args) = Json::<T>::from_request(req, state).await?;
        Ok(Self(args))
    }
}

/// Run a service handler on the blocking pool.
async fn call<T, F>(proxy: Arc<ProxyService>, procedure: Procedure, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&ProxyService) -> StrataResult<T> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || f(&proxy))
        .await
        .map_err(|e| StrataError::Internal {
            message: format!("{procedure} handler aborted: {e}"),
        })?;

    if let Err(e) = &result {
        tracing::debug!(%procedure, kind = e.kind(), error = %e, "Call failed");
    }
    Ok(result?)
}

async fn version() -> Json<Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

async fn init(
    State(proxy): Proxy,
    CallArgs(args): CallArgs<InitArgs>,
) -> Result<Json<EmptyReply>, ApiError> {
    call(proxy, Procedure::Init, move |p| {
        p.init(&args.driver_name, &args.home, &args.options)
    })
    .await?;
    Ok(Json(EmptyReply {}))
}

async fn status(State(proxy): Proxy) -> Result<Json<StatusReply>, ApiError> {
    let status = call(proxy, Procedure::Status, ProxyService::status).await?;
    Ok(Json(StatusReply { status }))
}

async fn create(
    State(proxy): Proxy,
    CallArgs(args): CallArgs<CreateArgs>,
) -> Result<Json<EmptyReply>, ApiError> {
    call(proxy, Procedure::Create, move |p| p.create(&args.id, &args.parent)).await?;
    Ok(Json(EmptyReply {}))
}

async fn remove(
    State(proxy): Proxy,
    CallArgs(args): CallArgs<IdArgs>,
) -> Result<Json<EmptyReply>, ApiError> {
    call(proxy, Procedure::Remove, move |p| p.remove(&args.id)).await?;
    Ok(Json(EmptyReply {}))
}

async fn get_layer(
    State(proxy): Proxy,
    CallArgs(args): CallArgs<GetArgs>,
) -> Result<Json<GetReply>, ApiError> {
    let dir = call(proxy, Procedure::Get, move |p| p.get(&args.id, &args.mount_label)).await?;
    Ok(Json(GetReply { dir }))
}

async fn put_layer(
    State(proxy): Proxy,
    CallArgs(args): CallArgs<IdArgs>,
) -> Result<Json<EmptyReply>, ApiError> {
    call(proxy, Procedure::Put, move |p| p.put(&args.id)).await?;
    Ok(Json(EmptyReply {}))
}

async fn exists(
    State(proxy): Proxy,
    CallArgs(args): CallArgs<IdArgs>,
) -> Result<Json<ExistsReply>, ApiError> {
    let exists = call(proxy, Procedure::Exists, move |p| p.exists(&args.id)).await?;
    Ok(Json(ExistsReply { exists }))
}

async fn cleanup(State(proxy): Proxy) -> Result<Json<EmptyReply>, ApiError> {
    call(proxy, Procedure::Cleanup, ProxyService::cleanup).await?;
    Ok(Json(EmptyReply {}))
}

async fn get_metadata(
    State(proxy): Proxy,
    CallArgs(args): CallArgs<IdArgs>,
) -> Result<Json<GetMetadataReply>, ApiError> {
    let metadata = call(proxy, Procedure::GetMetadata, move |p| p.get_metadata(&args.id)).await?;
    Ok(Json(GetMetadataReply { metadata }))
}
