//! REST API for IdeaVault
//!
//! Founders register ideas, investors browse and shortlist them, and both
//! sides exchange messages per idea. Every `/api` route except sign-up, login,
//! platform stats and the health probe requires a bearer token.

use axum::{
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, Query, Request, State},
    http::{self, request::Parts, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::auth::{self, AuthError, AuthUser, JwtKeys};
use crate::content_store::ContentStore;
use crate::crypto;
use crate::error::VaultError;
use crate::ledger::Ledger;
use crate::models::{now_timestamp, Message, NewUser, Participant, Role};
use crate::persistence::Persistence;
use crate::query::{self, ListQuery};
use crate::registry::{Attachment, IdeaRegistry, IdeaSubmission, RegistrationError};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
/// Room for the text fields and multipart framing around the pitch deck.
const MULTIPART_OVERHEAD_BYTES: usize = 2 * 1024 * 1024;
const SERVICE_NAME: &str = "IdeaVault API";

/// Shared handles for every request handler.
pub struct AppState {
    pub persistence: Arc<dyn Persistence>,
    pub content_store: Arc<dyn ContentStore>,
    pub ledger: Arc<dyn Ledger>,
    pub registry: IdeaRegistry,
    pub jwt: JwtKeys,
    pub network: String,
    pub frontend_url: Option<String>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        persistence: Arc<dyn Persistence>,
        content_store: Arc<dyn ContentStore>,
        ledger: Arc<dyn Ledger>,
        registry: IdeaRegistry,
        jwt: JwtKeys,
    ) -> Self {
        AppState {
            persistence,
            content_store,
            ledger,
            registry,
            jwt,
            network: "testnet".to_string(),
            frontend_url: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    pub fn with_frontend_url(mut self, frontend_url: Option<String>) -> Self {
        self.frontend_url = frontend_url.filter(|url| !url.trim().is_empty());
        self
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    InvalidInput(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    /// Same idea content already registered. `existing_txn_id` is null when
    /// only the ledger knew about it.
    DuplicateIdea { existing_txn_id: Option<String> },
    RateLimited(String),
    /// Logged with `detail`; the caller only sees `message`.
    Internal { message: &'static str, detail: String },
}

impl ApiError {
    fn internal(message: &'static str, detail: impl ToString) -> Self {
        ApiError::Internal {
            message,
            detail: detail.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::DuplicateIdea { existing_txn_id } => {
                return (
                    StatusCode::CONFLICT,
                    Json(json!({
                        "error": "An idea with identical content is already registered",
                        "existingTxnId": existing_txn_id,
                    })),
                )
                    .into_response();
            }
            ApiError::RateLimited(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            ApiError::Internal { message, detail } => {
                tracing::error!(error = %detail, "{}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::Validation(msg) => ApiError::InvalidInput(msg),
            VaultError::NotFound(msg) => ApiError::NotFound(msg),
            VaultError::Forbidden(msg) => ApiError::Forbidden(msg),
            VaultError::Duplicate(msg) => ApiError::Conflict(msg),
            VaultError::AuthenticationError(msg) => ApiError::Unauthorized(msg),
            other => ApiError::internal("Internal server error", other),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken | AuthError::InvalidToken(_) => {
                ApiError::Unauthorized("Authentication required".to_string())
            }
            AuthError::InvalidCredentials => ApiError::Unauthorized(err.to_string()),
            AuthError::Forbidden(_) => ApiError::Forbidden(err.to_string()),
            AuthError::Config(_) | AuthError::Hashing(_) => {
                ApiError::internal("Authentication failed", err)
            }
        }
    }
}

impl From<RegistrationError> for ApiError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::Validation(msg) => ApiError::InvalidInput(msg),
            RegistrationError::Duplicate { existing_txn_id } => {
                ApiError::DuplicateIdea { existing_txn_id }
            }
            RegistrationError::AlreadyOnChain(_) => ApiError::DuplicateIdea {
                existing_txn_id: None,
            },
            RegistrationError::RateLimited(msg) => ApiError::RateLimited(msg),
            other => ApiError::internal("Failed to register idea", other),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Authentication
// ============================================================================

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let token = auth::bearer_token(header)?;
        let claims = state.jwt.validate(token)?;

        let user = state
            .persistence
            .find_user_by_id(&claims.sub)?
            .ok_or_else(|| ApiError::Unauthorized("User no longer exists".to_string()))?;

        Ok(AuthUser {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            wallet_address: user.wallet_address,
        })
    }
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRequest {
    pub wallet_address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShortlistRequest {
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub receiver_id: Option<String>,
    pub idea_id: Option<String>,
    pub content: Option<String>,
}

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::InvalidInput(format!("{} is required", name)))
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============================================================================
// Middleware
// ============================================================================

/// Logs method, path, status and duration of every request.
async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "api.request"
    );

    response
}

fn cors_layer(frontend_url: Option<&str>) -> CorsLayer {
    let origin = match frontend_url.map(HeaderValue::from_str) {
        Some(Ok(origin)) => AllowOrigin::exact(origin),
        Some(Err(e)) => {
            tracing::warn!("Ignoring invalid frontend URL for CORS: {}", e);
            AllowOrigin::mirror_request()
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::PATCH,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .allow_credentials(true)
}

// ============================================================================
// API Server
// ============================================================================

/// Build the router with all endpoints. Used by the server and by tests.
pub fn build_api_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(state.frontend_url.as_deref());
    let body_limit = state.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    let api_routes = Router::new()
        // Idea endpoints
        .route("/ideas", post(create_idea).get(list_ideas))
        .route("/ideas/stats", get(get_stats))
        .route("/ideas/:id", get(get_idea))
        .route("/ideas/:id/verify", post(verify_idea))
        .route("/ideas/:id/shortlist", post(shortlist_idea))
        .route("/shortlist", get(get_shortlist))
        // Auth endpoints
        .route("/auth/register", post(register_user))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/auth/wallet", patch(update_wallet))
        // Messaging endpoints
        .route("/messages", post(send_message).get(get_inbox))
        .route("/messages/:idea_id", get(get_conversation))
        // System endpoints
        .route("/health/check", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
        .layer(cors)
}

pub async fn run_api_server(
    state: Arc<AppState>,
    listen: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_api_router(state.clone());
    let listener = tokio::net::TcpListener::bind(listen).await?;

    tracing::info!(
        listen = %listen,
        network = %state.network,
        app_id = state.ledger.app_id(),
        "IdeaVault API listening"
    );

    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Idea Handlers
// ============================================================================

async fn create_idea(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    user.require_role(Role::Founder)?;

    let mut submission = IdeaSubmission::default();
    let mut attachment = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidInput(format!("Malformed form data: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "pitchDeck" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::InvalidInput(format!("Failed to read pitch deck: {}", e)))?;
            if bytes.len() > state.max_upload_bytes {
                return Err(ApiError::InvalidInput(format!(
                    "Pitch deck exceeds the {} byte upload limit",
                    state.max_upload_bytes
                )));
            }
            if !bytes.is_empty() {
                attachment = Some(Attachment {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::InvalidInput(format!("Malformed field {}: {}", name, e)))?;
        match name.as_str() {
            "title" => submission.title = Some(value),
            "description" => submission.description = Some(value),
            "category" => submission.category = Some(value),
            "stage" => submission.stage = Some(value),
            "location" => submission.location = Some(value),
            "fundingGoal" => submission.funding_goal = Some(value),
            "teamSize" => submission.team_size = Some(value),
            "visibility" => submission.visibility = Some(value),
            _ => {}
        }
    }

    let registration = state.registry.register(&user.id, submission, attachment).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "idea": registration.idea,
            "blockchainProof": registration.proof,
        })),
    ))
}

async fn list_ideas(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = query::list_ideas(state.persistence.as_ref(), &user, &params)?;
    Ok(Json(page))
}

async fn get_idea(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let idea = query::fetch_idea(state.persistence.as_ref(), &user, &id)?;
    Ok(Json(json!({ "idea": idea })))
}

async fn verify_idea(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let report = query::reverify(
        state.persistence.as_ref(),
        state.ledger.as_ref(),
        state.registry.links(),
        &user,
        &id,
    )
    .await?;
    Ok(Json(report))
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let stats = query::platform_stats(state.persistence.as_ref(), state.ledger.as_ref()).await?;
    Ok(Json(stats))
}

async fn shortlist_idea(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Option<Json<ShortlistRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    user.require_role(Role::Investor)?;
    let idea = query::fetch_idea(state.persistence.as_ref(), &user, &id)?;

    let note = body.and_then(|Json(req)| optional(req.note));
    let entry = state
        .persistence
        .upsert_shortlist(&user.id, &idea.id, note.as_deref())?;

    Ok(Json(json!({ "success": true, "shortlist": entry })))
}

async fn get_shortlist(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    user.require_role(Role::Investor)?;
    let shortlist = state.persistence.list_shortlist(&user.id)?;
    Ok(Json(json!({ "shortlist": shortlist })))
}

// ============================================================================
// Auth Handlers
// ============================================================================

async fn register_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = required(req.name, "name")?;
    let email = required(req.email, "email")?.to_lowercase();
    let password = required(req.password, "password")?;
    let role: Role = required(req.role, "role")?
        .parse()
        .map_err(|_| ApiError::InvalidInput("role must be FOUNDER or INVESTOR".to_string()))?;

    if state.persistence.find_user_by_email(&email)?.is_some() {
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }

    let password_hash = auth::hash_password_blocking(password).await?;
    let user = state
        .persistence
        .create_user(NewUser {
            name,
            email,
            password_hash,
            role,
            company: optional(req.company),
            location: optional(req.location),
        })
        .map_err(|e| match e {
            VaultError::Duplicate(_) => ApiError::Conflict("Email already registered".to_string()),
            other => other.into(),
        })?;
    let token = state.jwt.issue(&user.id, user.role)?;

    tracing::info!(user_id = %user.id, role = %user.role, "auth.register");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "user": user, "token": token })),
    ))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = required(req.email, "email")?.to_lowercase();
    let password = required(req.password, "password")?;

    let user = state
        .persistence
        .find_user_by_email(&email)?
        .ok_or(AuthError::InvalidCredentials)?;
    if !auth::verify_password_blocking(password, user.password_hash.clone()).await? {
        return Err(AuthError::InvalidCredentials.into());
    }

    let token = state.jwt.issue(&user.id, user.role)?;
    Ok(Json(json!({ "user": user, "token": token })))
}

async fn me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .persistence
        .find_user_by_id(&user.id)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(json!({ "user": user })))
}

async fn update_wallet(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<WalletRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let address = required(req.wallet_address, "walletAddress")?;
    if !crypto::is_valid_address(&address) {
        return Err(ApiError::InvalidInput("Invalid Algorand address".to_string()));
    }

    state.persistence.update_wallet(&user.id, &address)?;
    Ok(Json(json!({ "success": true, "walletAddress": address })))
}

// ============================================================================
// Messaging Handlers
// ============================================================================

async fn send_message(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receiver_id = required(req.receiver_id, "receiverId")?;
    let idea_id = required(req.idea_id, "ideaId")?;
    let content = required(req.content, "content")?;

    let idea = query::fetch_idea(state.persistence.as_ref(), &user, &idea_id)?;
    let receiver = state
        .persistence
        .find_user_by_id(&receiver_id)?
        .ok_or_else(|| ApiError::NotFound("Receiver not found".to_string()))?;

    let message = Message {
        id: uuid::Uuid::new_v4().to_string(),
        sender_id: user.id.clone(),
        receiver_id: receiver.id,
        idea_id: idea.id,
        content,
        created_at: now_timestamp(),
        sender: Some(Participant {
            name: user.name,
            role: user.role,
        }),
        receiver: Some(Participant {
            name: receiver.name,
            role: receiver.role,
        }),
        idea_title: Some(idea.title),
    };
    state.persistence.insert_message(&message)?;

    Ok((StatusCode::CREATED, Json(json!({ "message": message }))))
}

async fn get_conversation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(idea_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state.persistence.conversation(&idea_id, &user.id)?;
    Ok(Json(json!({ "messages": messages })))
}

async fn get_inbox(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state.persistence.inbox(&user.id)?;
    Ok(Json(json!({ "messages": messages })))
}

// ============================================================================
// System Handlers
// ============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "algorandNetwork": state.network,
        "appId": state.ledger.app_id().to_string(),
        "timestamp": now_timestamp(),
    }))
}

/// Probes both upstreams. 503 when either is unusable.
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let start = Instant::now();

    let content_store_ok = state.content_store.is_configured();
    let content_store = if content_store_ok {
        json!({ "status": "healthy" })
    } else {
        json!({ "status": "unhealthy", "error": "Content store credentials not configured" })
    };

    let ledger_result = state.ledger.health().await;
    let ledger_ok = ledger_result.is_ok();
    let ledger = match ledger_result {
        Ok(()) => json!({
            "status": "healthy",
            "appId": state.ledger.app_id().to_string(),
            "network": state.network,
        }),
        Err(e) => {
            tracing::warn!("Ledger health probe failed: {}", e);
            json!({
                "status": "unhealthy",
                "error": e.to_string(),
                "appId": state.ledger.app_id().to_string(),
                "network": state.network,
            })
        }
    };

    let healthy = content_store_ok && ledger_ok;
    let (status, label) = if healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        status,
        Json(json!({
            "status": label,
            "timestamp": now_timestamp(),
            "durationMs": start.elapsed().as_millis() as u64,
            "services": {
                "contentStore": content_store,
                "algorand": ledger,
            },
        })),
    )
}
