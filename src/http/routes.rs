//! HTTP route definitions

use axum::{
    extract::{Extension, Path, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::info;

use crate::app::AppState;
use crate::error::{ErrorKind, ServiceError};
use crate::game::CatalogEntry;
use crate::http::middleware::{issue_jwt, require_auth, AuthenticatedUser};
use crate::room::{RoomError, RoomId, RoomSnapshot};
use crate::store::User;
use crate::util::time::uptime_secs;
use crate::ws::connection::deliver;
use crate::ws::handler::{matchmaking_ws_handler, room_ws_handler};

/// Upper bound for plain REST requests; websocket sessions are not affected
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origins()
        .iter()
        .filter_map(|s| s.parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    // Public routes (no auth required); websockets authenticate via ?token=
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/games", get(games_handler))
        .route("/users", post(register_handler))
        .route("/rooms/:room_id/ws", get(room_ws_handler))
        .route("/matchmaking/ws", get(matchmaking_ws_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/users/me", get(me_handler))
        .route("/rooms", post(create_room_handler))
        .route("/rooms/:room_id", get(room_handler))
        .route("/rooms/:room_id/start", post(start_game_handler))
        .route("/rooms/:room_id/leave", post(leave_room_handler))
        .route("/matchmaking/leave", post(matchmaking_leave_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health and catalog
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_rooms: usize,
    queue_size: usize,
    registered_users: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_rooms: state.rooms.len(),
        queue_size: state.matchmaking.queue_size(),
        registered_users: state.users.len(),
    })
}

async fn games_handler(State(state): State<AppState>) -> Json<Vec<CatalogEntry>> {
    Json(state.games.catalog())
}

// ============================================================================
// Users
// ============================================================================

#[derive(Deserialize)]
struct RegisterRequest {
    name: String,
}

#[derive(Serialize)]
struct RegisterResponse {
    user: User,
    token: String,
}

async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let user = state
        .users
        .register(&req.name)
        .map_err(ServiceError::from)?;

    let token = issue_jwt(&user, &state.config.jwt_secret, state.config.token_ttl)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user, token })))
}

#[derive(Serialize)]
struct MeResponse {
    #[serde(flatten)]
    user: User,
    /// Expiry of the token used for this request (Unix timestamp)
    token_expires_at: u64,
}

async fn me_handler(Extension(auth): Extension<AuthenticatedUser>) -> Json<MeResponse> {
    Json(MeResponse {
        user: auth.user,
        token_expires_at: auth.claims.exp,
    })
}

// ============================================================================
// Rooms
// ============================================================================

async fn create_room_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> (StatusCode, Json<RoomSnapshot>) {
    let room = state.rooms.create_room();
    info!(room_id = %room.id, user_id = %auth.user.id, "Room created over HTTP");
    (StatusCode::CREATED, Json(room))
}

/// Room members only; everyone else sees the room as missing
fn require_member(state: &AppState, room_id: &str, auth: &AuthenticatedUser) -> Result<(), AppError> {
    if !state.rooms.is_member(room_id, &auth.user.id).map_err(ServiceError::from)? {
        return Err(ServiceError::from(RoomError::NotAMember {
            player_id: auth.user.id.clone(),
        })
        .into());
    }
    Ok(())
}

async fn room_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<RoomSnapshot>, AppError> {
    require_member(&state, &room_id, &auth)?;
    let room = state.rooms.snapshot(&room_id).map_err(ServiceError::from)?;
    Ok(Json(room))
}

async fn start_game_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<RoomSnapshot>, AppError> {
    require_member(&state, &room_id, &auth)?;
    let deliveries = state.rooms.start_game(&room_id).map_err(ServiceError::from)?;
    deliver(deliveries);

    let room = state.rooms.snapshot(&room_id).map_err(ServiceError::from)?;
    Ok(Json(room))
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

async fn leave_room_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<StatusResponse>, AppError> {
    let deliveries = state
        .rooms
        .leave(&room_id, &auth.user.id)
        .map_err(ServiceError::from)?;
    deliver(deliveries);

    Ok(Json(StatusResponse { status: "left" }))
}

// ============================================================================
// Matchmaking
// ============================================================================

async fn matchmaking_leave_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Json<StatusResponse> {
    let status = if state.matchmaking.leave(&auth.user.id) {
        "left"
    } else {
        "not_queued"
    };
    Json(StatusResponse { status })
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Service(e) => match e.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::StateConflict => StatusCode::CONFLICT,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Transport | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({
            "type": "error",
            "message": self.to_string(),
        });

        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::util::time::unix_secs;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> (AppState, Router) {
        let state = AppState::new(Config::for_tests());
        (state.clone(), build_router(state))
    }

    async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn register(router: &Router, name: &str) -> (String, String) {
        let (status, body) = call(router, post("/users", None, json!({"name": name}))).await;
        assert_eq!(status, StatusCode::CREATED);
        (
            body["user"]["id"].as_str().unwrap().to_string(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn test_health_and_catalog() {
        let (_state, router) = app();

        let (status, body) = call(&router, get("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_rooms"], 0);

        let (status, body) = call(&router, get("/games", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([{"name": "tictactoe", "display_name": "Tic Tac Toe"}]));
    }

    #[tokio::test]
    async fn test_register_and_me() {
        let (_state, router) = app();
        let (id, token) = register(&router, "alice").await;

        let (status, body) = call(&router, get("/users/me", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], json!(id));
        assert_eq!(body["name"], "alice");
        assert!(body["token_expires_at"].as_u64().unwrap() > unix_secs());

        let (status, body) = call(&router, post("/users", None, json!({"name": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["type"], "error");
    }

    #[tokio::test]
    async fn test_auth_required() {
        let (_state, router) = app();

        let (status, body) = call(&router, get("/users/me", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Missing authorization header");

        let (status, _) = call(&router, get("/users/me", Some("not.a.token"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_room_visible_to_members_only() {
        let (state, router) = app();
        let (_id, token) = register(&router, "alice").await;
        let (_other, outsider) = register(&router, "mallory").await;

        let (status, room) = call(&router, post("/rooms", Some(&token), json!({}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(room["status"], "waiting_for_player");
        let room_id = room["id"].as_str().unwrap().to_string();
        assert_eq!(state.rooms.len(), 1);

        let uri = format!("/rooms/{}", room_id);
        let (status, _) = call(&router, get(&uri, Some(&outsider))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&router, get("/rooms/missing", Some(&token))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_start_and_leave_conflicts() {
        let (state, router) = app();
        let (alice_id, alice) = register(&router, "alice").await;

        let room = state.rooms.create_room();
        let (connection, _rx) = crate::ws::connection::ConnectionHandle::new(alice_id.clone());
        let user = state.users.get(&alice_id).unwrap();
        state
            .rooms
            .join_room(&room.id, crate::room::Player::new(user.info(), connection))
            .unwrap();

        let (status, body) = call(
            &router,
            post(&format!("/rooms/{}/start", room.id), Some(&alice), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "Cannot start the game while room is waiting_for_player");

        let (status, body) = call(
            &router,
            post(&format!("/rooms/{}/leave", room.id), Some(&alice), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "left");
        assert_eq!(state.rooms.len(), 0);

        let (status, body) = call(&router, post("/matchmaking/leave", Some(&alice), json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "not_queued");
    }
}
