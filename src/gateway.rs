use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tonic::transport::Endpoint;
use tonic::Status;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::grpc::pb;
use crate::grpc::pb::user_service_client::UserServiceClient;
use crate::health::HealthChecker;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub type GrpcClient = UserServiceClient<tonic::transport::Channel>;

/// Client for the transcoding routes. The channel is lazy, so the gateway
/// can be built before the gRPC listener is up.
pub fn connect_lazy(grpc_port: u16) -> anyhow::Result<GrpcClient> {
    let endpoint = Endpoint::from_shared(format!("http://127.0.0.1:{grpc_port}"))?;
    Ok(UserServiceClient::new(endpoint.connect_lazy()))
}

#[derive(Clone)]
pub struct GatewayState {
    pub client: GrpcClient,
    pub health: HealthChecker,
}

/// Builds the HTTP front-end: health endpoints plus the JSON transcoding of
/// the RPC surface under `/v1`.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readiness", get(readiness))
        .route("/liveness", get(liveness))
        .route("/v1/users", axum::routing::post(create_user).get(list_users))
        .route(
            "/v1/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .with_state(state)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: i32,
    message: String,
}

type GatewayError = (StatusCode, Json<ErrorBody>);

/// Every error coming out of the transcode path is a 400. Coarse, but it is
/// the contract downstream tooling already relies on.
fn translate_error(status: Status) -> GatewayError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            code: status.code() as i32,
            message: status.message().to_owned(),
        }),
    )
}

fn format_timestamp(ts: Option<prost_types::Timestamp>) -> String {
    ts.and_then(|t| {
        OffsetDateTime::from_unix_timestamp_nanos(
            i128::from(t.seconds) * 1_000_000_000 + i128::from(t.nanos),
        )
        .ok()
    })
    .and_then(|t| t.format(&Rfc3339).ok())
    .unwrap_or_default()
}

#[derive(Debug, Serialize)]
struct UserIdBody {
    id: String,
}

#[derive(Debug, Serialize)]
struct UserBody {
    id: String,
    first_name: String,
    last_name: String,
    nick_name: String,
    email: String,
    country_iso_code: String,
    created_at: String,
    updated_at: String,
}

impl From<pb::ReadableUserFields> for UserBody {
    fn from(user: pb::ReadableUserFields) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            nick_name: user.nick_name,
            email: user.email,
            country_iso_code: user.country_iso_code,
            created_at: format_timestamp(user.created_at),
            updated_at: format_timestamp(user.updated_at),
        }
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn readiness() -> Json<Value> {
    Json(json!({"status": "ready"}))
}

async fn liveness(State(state): State<GatewayState>) -> (StatusCode, Json<Value>) {
    if state.health.check().await {
        (StatusCode::OK, Json(json!({"status": "healthy"})))
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": "unhealthy"})),
        )
    }
}

#[derive(Debug, Deserialize)]
struct CreateUserBody {
    first_name: String,
    last_name: String,
    nick_name: String,
    email: String,
    password: String,
    country_iso_code: String,
}

#[tracing::instrument(skip(state, body))]
async fn create_user(
    State(state): State<GatewayState>,
    Json(body): Json<CreateUserBody>,
) -> Result<Json<UserIdBody>, GatewayError> {
    let mut client = state.client.clone();
    let resp = client
        .create_user(pb::CreateUserRequest {
            first_name: body.first_name,
            last_name: body.last_name,
            nick_name: body.nick_name,
            email: body.email,
            password: body.password,
            country_iso_code: body.country_iso_code,
        })
        .await
        .map_err(translate_error)?;
    Ok(Json(UserIdBody {
        id: resp.into_inner().id,
    }))
}

#[derive(Debug, Deserialize)]
struct UpdateUserBody {
    first_name: String,
    last_name: String,
    nick_name: String,
    email: String,
    country_iso_code: String,
}

#[tracing::instrument(skip(state, body), fields(user_id = %id))]
async fn update_user(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateUserBody>,
) -> Result<Json<UserIdBody>, GatewayError> {
    let mut client = state.client.clone();
    let resp = client
        .update_user(pb::UpdateUserRequest {
            id,
            user: Some(pb::UpdatableUserFields {
                first_name: body.first_name,
                last_name: body.last_name,
                nick_name: body.nick_name,
                email: body.email,
                country_iso_code: body.country_iso_code,
            }),
        })
        .await
        .map_err(translate_error)?;
    Ok(Json(UserIdBody {
        id: resp.into_inner().id,
    }))
}

#[tracing::instrument(skip(state), fields(user_id = %id))]
async fn delete_user(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<UserIdBody>, GatewayError> {
    let mut client = state.client.clone();
    let resp = client
        .delete_user(pb::UserId { id })
        .await
        .map_err(translate_error)?;
    Ok(Json(UserIdBody {
        id: resp.into_inner().id,
    }))
}

#[tracing::instrument(skip(state), fields(user_id = %id))]
async fn get_user(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<UserBody>, GatewayError> {
    let mut client = state.client.clone();
    let resp = client
        .get_user(pb::UserId { id })
        .await
        .map_err(translate_error)?;
    let user = resp
        .into_inner()
        .user
        .ok_or_else(|| translate_error(Status::internal("user missing from response")))?;
    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize)]
struct ListUsersParams {
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    limit: i32,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    nick_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    country_iso_code: Option<String>,
}

#[derive(Debug, Serialize)]
struct ListUsersBody {
    users: Vec<UserBody>,
    next_cursor: String,
}

#[tracing::instrument(skip(state, params))]
async fn list_users(
    State(state): State<GatewayState>,
    Query(params): Query<ListUsersParams>,
) -> Result<Json<ListUsersBody>, GatewayError> {
    let mut client = state.client.clone();
    let resp = client
        .list_users(pb::ListUsersRequest {
            cursor: params.cursor.unwrap_or_default(),
            limit: params.limit,
            first_name: params.first_name,
            last_name: params.last_name,
            nick_name: params.nick_name,
            email: params.email,
            country_iso_code: params.country_iso_code,
        })
        .await
        .map_err(translate_error)?;

    let resp = resp.into_inner();
    Ok(Json(ListUsersBody {
        users: resp.users.into_iter().map(Into::into).collect(),
        next_cursor: resp.next_cursor,
    }))
}
