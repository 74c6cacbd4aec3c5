//! api-server — Local development HTTP API for the profile publishing workspace.
//!
//! Provides account, portfolio, and public profile endpoints and supports
//! local dev with:
//! - Auth: debug mode via the X-Debug-User header (optionally restricted to
//!   ALLOWED_DOMAIN).
//! - Storage: In-memory (data lost on restart) or SQLite (file) when the
//!   `sqlite` feature is enabled.
//! - CORS: Configurable via CORS_ALLOW_ORIGIN (origin string) for the signup
//!   frontend.
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! cargo run -p api-server
//!
//! # in-memory storage, JSON logs
//! STORAGE_PROVIDER=memory LOG_FORMAT=json cargo run -p api-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.
//!

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use domain::adapters::memory_repo::InMemoryAccountRepo;
use domain::service::{AccountService, ProfilePatch};
use domain::validate::UsernameIssue;
use domain::{
    Account, AccountRepository, AccountRole, Clock, CoreError, Email, NewAccount, PortfolioItem,
    ReservedUsernames,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Local repo abstraction supporting memory or sqlite (feature-gated).
enum RepoKind {
    Memory(InMemoryAccountRepo),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite_adapter::SqliteAccountRepo),
}

#[derive(Clone)]
struct AnyRepo {
    kind: Arc<RepoKind>,
}

impl AnyRepo {
    fn memory() -> Self {
        Self {
            kind: Arc::new(RepoKind::Memory(InMemoryAccountRepo::new())),
        }
    }

    #[cfg(feature = "sqlite")]
    fn sqlite_from_env() -> Result<Self, CoreError> {
        Ok(Self {
            kind: Arc::new(RepoKind::Sqlite(
                sqlite_adapter::SqliteAccountRepo::from_env()?,
            )),
        })
    }
}

impl AccountRepository for AnyRepo {
    fn find_by_id(&self, id: &str) -> Result<Option<Account>, CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.find_by_id(id),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.find_by_id(id),
        }
    }

    fn find_by_username(&self, username: &str) -> Result<Option<Account>, CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.find_by_username(username),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.find_by_username(username),
        }
    }

    fn find_by_email(&self, email: &Email) -> Result<Option<Account>, CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.find_by_email(email),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.find_by_email(email),
        }
    }

    fn insert(&self, account: Account) -> Result<(), CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.insert(account),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.insert(account),
        }
    }

    fn update(&self, account: &Account) -> Result<(), CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.update(account),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.update(account),
        }
    }

    fn soft_delete(&self, id: &str, deleted_at: std::time::SystemTime) -> Result<(), CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.soft_delete(id, deleted_at),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.soft_delete(id, deleted_at),
        }
    }

    fn list(&self, limit: usize) -> Result<Vec<Account>, CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.list(limit),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.list(limit),
        }
    }

    fn add_item(&self, item: PortfolioItem) -> Result<(), CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.add_item(item),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.add_item(item),
        }
    }

    fn list_items(&self, account_id: &str) -> Result<Vec<PortfolioItem>, CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.list_items(account_id),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.list_items(account_id),
        }
    }

    fn remove_item(&self, account_id: &str, item_id: &str) -> Result<(), CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.remove_item(account_id, item_id),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.remove_item(account_id, item_id),
        }
    }
}

#[derive(Clone)]
struct StdClock;
impl Clock for StdClock {
    fn now(&self) -> std::time::SystemTime {
        std::time::SystemTime::now()
    }
}

#[derive(Clone)]
struct AppState {
    svc: Arc<AccountService<AnyRepo, StdClock>>,
    allowed_domain: Option<String>,
    profile_domain: Option<String>,
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    cfg.warn_if_insecure();

    let repo = build_repo_from_env(&cfg);
    let reserved = if cfg.reserved_usernames.is_empty() {
        ReservedUsernames::builtin()
    } else {
        ReservedUsernames::with_extra(cfg.reserved_usernames.iter())
    };
    let state = AppState {
        svc: Arc::new(AccountService::new(repo, reserved, StdClock)),
        allowed_domain: cfg.allowed_domain.clone(),
        profile_domain: cfg.profile_domain.clone(),
    };

    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    let mut app = Router::new()
        .route("/:username", get(get_profile))
        .route(
            "/api/check-username",
            get(check_username).options(preflight),
        )
        .route(
            "/api/accounts",
            post(create_account).get(list_accounts).options(preflight),
        )
        .route(
            "/api/accounts/me",
            axum::routing::patch(update_account)
                .delete(delete_account)
                .options(preflight),
        )
        .route(
            "/api/portfolio",
            post(add_portfolio_item)
                .get(list_portfolio)
                .options(preflight),
        )
        .route(
            "/api/portfolio/:id",
            axum::routing::delete(delete_portfolio_item).options(preflight),
        )
        .route("/api/me", get(get_me).options(preflight))
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .with_state(state);

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PATCH,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
                axum::http::HeaderName::from_static("x-debug-user"),
            ])
    };
    app = app.layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    info!(%addr, "api-server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind port");
    axum::serve(listener, app).await.expect("server error");
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

// Construct a repository instance based on config and feature flags.
fn build_repo_from_env(cfg: &config::Config) -> AnyRepo {
    match cfg.storage_provider {
        #[cfg(feature = "sqlite")]
        config::StorageProvider::Sqlite => match AnyRepo::sqlite_from_env() {
            Ok(r) => r,
            Err(e) => {
                eprintln!("failed to init SqliteAccountRepo from env: {e}");
                AnyRepo::memory()
            }
        },
        _ => AnyRepo::memory(),
    }
}

enum AuthHttp {
    Unauthorized,
    Forbidden,
}

/// Debug authentication via the X-Debug-User header, with optional domain
/// enforcement. Returns the verified email.
fn verify_request_user(
    headers: &HeaderMap,
    allowed_domain: &Option<String>,
) -> Result<Email, AuthHttp> {
    let email = headers
        .get("X-Debug-User")
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthHttp::Unauthorized)?;
    if let Some(dom) = allowed_domain {
        if !email
            .rsplit_once('@')
            .map(|(_, d)| d.eq_ignore_ascii_case(dom))
            .unwrap_or(false)
        {
            return Err(AuthHttp::Forbidden);
        }
    }
    Email::new(email).map_err(|_| AuthHttp::Unauthorized)
}

fn auth_error_response(err: AuthHttp) -> axum::response::Response {
    match err {
        AuthHttp::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            Json(http_common::json_error_with_message(
                "unauthorized",
                "missing or invalid credentials",
            )),
        )
            .into_response(),
        AuthHttp::Forbidden => (
            StatusCode::FORBIDDEN,
            Json(http_common::json_error_with_message(
                "forbidden",
                "domain not allowed",
            )),
        )
            .into_response(),
    }
}

fn core_error_response(e: CoreError) -> axum::response::Response {
    match e {
        CoreError::InvalidUsername(issue) => {
            let status = if matches!(issue, UsernameIssue::Taken) {
                StatusCode::CONFLICT
            } else {
                StatusCode::BAD_REQUEST
            };
            (
                status,
                Json(http_common::json_error_with_message(
                    issue.code(),
                    issue.message(),
                )),
            )
                .into_response()
        }
        CoreError::InvalidEmail => (
            StatusCode::BAD_REQUEST,
            Json(http_common::json_error_with_message(
                "invalid_request",
                "invalid email",
            )),
        )
            .into_response(),
        CoreError::AlreadyExists => (
            StatusCode::CONFLICT,
            Json(http_common::json_error_with_message(
                "conflict",
                "account already exists",
            )),
        )
            .into_response(),
        CoreError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(http_common::json_err("not_found")),
        )
            .into_response(),
        CoreError::Repository(msg) => {
            error!(err = %msg, "repository error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(http_common::json_error_with_message(
                    "internal",
                    "server error",
                )),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
struct CreateAccountReq {
    username: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
}

/// Plain `Option<Option<T>>` cannot distinguish a missing field from an
/// explicit `null` (serde maps both to the outer `None`); this keeps the
/// outer `Some` whenever the key is present so `null` means "clear".
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
struct UpdateAccountReq {
    #[serde(default)]
    username: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    full_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    tagline: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    bio: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    video_url: Option<Option<String>>,
}

#[derive(Deserialize)]
struct AddItemReq {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    link_url: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    position: Option<u32>,
}

#[derive(Serialize)]
struct AccountOut {
    id: String,
    username: String,
    email: String,
    role: String,
    profile_url: String,
    created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tagline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_url: Option<String>,
}

#[derive(Serialize)]
struct ItemOut {
    id: String,
    title: String,
    position: u32,
    created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    link_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_id: Option<domain::video::VideoId>,
}

#[derive(Serialize)]
struct ProfileOut {
    username: String,
    role: String,
    profile_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tagline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_id: Option<domain::video::VideoId>,
    items: Vec<ItemOut>,
}

#[derive(Serialize)]
struct CheckUsernameOut {
    available: bool,
    message: &'static str,
    is_current: bool,
}

fn account_to_out(
    account: Account,
    headers: &HeaderMap,
    profile_domain: &Option<String>,
) -> AccountOut {
    let profile_url = build_profile_url(headers, account.username.as_str(), profile_domain);
    AccountOut {
        id: account.id,
        username: account.username.as_str().to_string(),
        email: account.email.as_str().to_string(),
        role: account.role.as_str().to_string(),
        profile_url,
        created_at: http_common::system_time_to_rfc3339(account.created_at),
        updated_at: account.updated_at.map(http_common::system_time_to_rfc3339),
        phone: account.phone,
        full_name: account.full_name,
        tagline: account.tagline,
        bio: account.bio,
        video_url: account.video_url,
    }
}

fn item_to_out(item: PortfolioItem) -> ItemOut {
    let video_id = item.video_id();
    ItemOut {
        id: item.id,
        title: item.title,
        position: item.position,
        created_at: http_common::system_time_to_rfc3339(item.created_at),
        description: item.description,
        link_url: item.link_url,
        video_url: item.video_url,
        video_id,
    }
}

async fn preflight() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
struct CheckUsernameQuery {
    username: Option<String>,
}

/// Availability probe for the signup and rename forms. When the caller is
/// authenticated and the candidate normalizes to their own username, it
/// reports available with `is_current` set so the form can skip the rename.
async fn check_username(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<CheckUsernameQuery>,
) -> impl IntoResponse {
    let raw = q.username.unwrap_or_default();

    // Auth is optional here: signup checks run before an account exists.
    if let Ok(email) = verify_request_user(&headers, &state.allowed_domain) {
        if let Ok(me) = state.svc.account_by_email(&email) {
            if domain::slug::normalize(&raw) == me.username.as_str() {
                return (
                    StatusCode::OK,
                    Json(CheckUsernameOut {
                        available: true,
                        message: "This is your current username",
                        is_current: true,
                    }),
                )
                    .into_response();
            }
        }
    }

    match state.svc.check_username(&raw) {
        Ok(_) => (
            StatusCode::OK,
            Json(CheckUsernameOut {
                available: true,
                message: "Username is available",
                is_current: false,
            }),
        )
            .into_response(),
        Err(CoreError::InvalidUsername(issue)) => (
            StatusCode::OK,
            Json(CheckUsernameOut {
                available: false,
                message: issue.message(),
                is_current: false,
            }),
        )
            .into_response(),
        Err(e) => core_error_response(e),
    }
}

async fn create_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateAccountReq>,
) -> impl IntoResponse {
    let email = match verify_request_user(&headers, &state.allowed_domain) {
        Ok(v) => v,
        Err(e) => return auth_error_response(e),
    };

    if state.svc.account_by_email(&email).is_ok() {
        return (
            StatusCode::CONFLICT,
            Json(http_common::json_error_with_message(
                "conflict",
                "account already exists",
            )),
        )
            .into_response();
    }

    let role = match body.role.as_deref() {
        None => AccountRole::Individual,
        Some(raw) => match AccountRole::parse(raw) {
            Some(r) => r,
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(http_common::json_error_with_message(
                        "invalid_request",
                        "role must be 'individual' or 'business'",
                    )),
                )
                    .into_response()
            }
        },
    };

    let input = NewAccount {
        id: uuid::Uuid::new_v4().to_string(),
        email,
        username: body.username,
        role,
        phone: body.phone,
        full_name: body.full_name,
    };

    match state.svc.register(input) {
        Ok(account) => {
            info!(username = %account.username.as_str(), "account created");
            (
                StatusCode::CREATED,
                Json(account_to_out(account, &headers, &state.profile_domain)),
            )
                .into_response()
        }
        Err(e) => core_error_response(e),
    }
}

#[derive(Deserialize)]
struct ListAccountsQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct AccountListOut {
    accounts: Vec<AccountOut>,
    total: usize,
}

/// Authenticated directory of active accounts.
async fn list_accounts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<ListAccountsQuery>,
) -> impl IntoResponse {
    if let Err(e) = verify_request_user(&headers, &state.allowed_domain) {
        return auth_error_response(e);
    }

    let limit = match q.limit {
        Some(n) if (1..=500).contains(&n) => n,
        Some(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(http_common::json_error_with_message(
                    "invalid_request",
                    "limit must be between 1 and 500",
                )),
            )
                .into_response()
        }
        None => 50, // default
    };

    match state.svc.list(limit) {
        Ok(accounts) => {
            let accounts: Vec<AccountOut> = accounts
                .into_iter()
                .map(|a| account_to_out(a, &headers, &state.profile_domain))
                .collect();
            let total = accounts.len();
            (StatusCode::OK, Json(AccountListOut { accounts, total })).into_response()
        }
        Err(e) => core_error_response(e),
    }
}

async fn get_me(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let email = match verify_request_user(&headers, &state.allowed_domain) {
        Ok(v) => v,
        Err(e) => return auth_error_response(e),
    };
    match state.svc.account_by_email(&email) {
        Ok(account) => (
            StatusCode::OK,
            Json(account_to_out(account, &headers, &state.profile_domain)),
        )
            .into_response(),
        Err(e) => core_error_response(e),
    }
}

async fn update_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UpdateAccountReq>,
) -> impl IntoResponse {
    let email = match verify_request_user(&headers, &state.allowed_domain) {
        Ok(v) => v,
        Err(e) => return auth_error_response(e),
    };
    let me = match state.svc.account_by_email(&email) {
        Ok(a) => a,
        Err(e) => return core_error_response(e),
    };

    // Rename first so a policy failure leaves the profile untouched.
    if let Some(raw) = &body.username {
        if let Err(e) = state.svc.rename(&me.id, raw) {
            return core_error_response(e);
        }
    }

    let patch = ProfilePatch {
        full_name: body.full_name,
        phone: body.phone,
        tagline: body.tagline,
        bio: body.bio,
        video_url: body.video_url,
    };
    match state.svc.update_profile(&me.id, patch) {
        Ok(account) => {
            info!(username = %account.username.as_str(), "account updated");
            (
                StatusCode::OK,
                Json(account_to_out(account, &headers, &state.profile_domain)),
            )
                .into_response()
        }
        Err(e) => core_error_response(e),
    }
}

async fn delete_account(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let email = match verify_request_user(&headers, &state.allowed_domain) {
        Ok(v) => v,
        Err(e) => return auth_error_response(e),
    };
    let me = match state.svc.account_by_email(&email) {
        Ok(a) => a,
        Err(e) => return core_error_response(e),
    };
    match state.svc.deactivate(&me.id) {
        Ok(()) => {
            info!(username = %me.username.as_str(), "account deactivated");
            (StatusCode::NO_CONTENT, ()).into_response()
        }
        Err(e) => core_error_response(e),
    }
}

async fn add_portfolio_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AddItemReq>,
) -> impl IntoResponse {
    let email = match verify_request_user(&headers, &state.allowed_domain) {
        Ok(v) => v,
        Err(e) => return auth_error_response(e),
    };
    let me = match state.svc.account_by_email(&email) {
        Ok(a) => a,
        Err(e) => return core_error_response(e),
    };

    if body.title.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(http_common::json_error_with_message(
                "invalid_request",
                "title is required",
            )),
        )
            .into_response();
    }

    let item = PortfolioItem {
        id: uuid::Uuid::new_v4().to_string(),
        account_id: me.id.clone(),
        title: body.title,
        description: body.description,
        link_url: body.link_url,
        video_url: body.video_url,
        position: body.position.unwrap_or(0),
        created_at: std::time::SystemTime::now(),
    };
    let out = item_to_out(item.clone());
    match state.svc.add_portfolio_item(item) {
        Ok(()) => (StatusCode::CREATED, Json(out)).into_response(),
        Err(e) => core_error_response(e),
    }
}

async fn list_portfolio(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let email = match verify_request_user(&headers, &state.allowed_domain) {
        Ok(v) => v,
        Err(e) => return auth_error_response(e),
    };
    let me = match state.svc.account_by_email(&email) {
        Ok(a) => a,
        Err(e) => return core_error_response(e),
    };
    match state.svc.portfolio(&me.id) {
        Ok(items) => {
            let items: Vec<ItemOut> = items.into_iter().map(item_to_out).collect();
            (StatusCode::OK, Json(items)).into_response()
        }
        Err(e) => core_error_response(e),
    }
}

async fn delete_portfolio_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(item_id): Path<String>,
) -> impl IntoResponse {
    let email = match verify_request_user(&headers, &state.allowed_domain) {
        Ok(v) => v,
        Err(e) => return auth_error_response(e),
    };
    let me = match state.svc.account_by_email(&email) {
        Ok(a) => a,
        Err(e) => return core_error_response(e),
    };
    match state.svc.remove_portfolio_item(&me.id, &item_id) {
        Ok(()) => (StatusCode::NO_CONTENT, ()).into_response(),
        Err(e) => core_error_response(e),
    }
}

/// Public profile page data. Soft-deleted accounts 404 even inside the
/// username reuse grace period.
async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> impl IntoResponse {
    let account = match state.svc.profile(&username) {
        Ok(a) => a,
        Err(CoreError::NotFound) => {
            warn!(username = %username, "profile 404");
            return (
                StatusCode::NOT_FOUND,
                Json(http_common::json_err("not_found")),
            )
                .into_response();
        }
        Err(e) => return core_error_response(e),
    };

    let items = match state.svc.portfolio(&account.id) {
        Ok(items) => items.into_iter().map(item_to_out).collect(),
        Err(e) => return core_error_response(e),
    };

    let video_id = account
        .video_url
        .as_deref()
        .and_then(domain::video::VideoId::from_url);
    let out = ProfileOut {
        username: account.username.as_str().to_string(),
        role: account.role.as_str().to_string(),
        profile_url: build_profile_url(&headers, account.username.as_str(), &state.profile_domain),
        full_name: account.full_name,
        tagline: account.tagline,
        bio: account.bio,
        video_id,
        items,
    };
    (StatusCode::OK, Json(out)).into_response()
}

/// Build the public profile URL from config, or the Host header as fallback.
fn build_profile_url(
    headers: &HeaderMap,
    username: &str,
    profile_domain: &Option<String>,
) -> String {
    let host = profile_domain
        .as_deref()
        .or_else(|| headers.get("host").and_then(|v| v.to_str().ok()))
        .unwrap_or("");
    http_common::build_profile_url_from_host(host, username)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    fn app() -> Router {
        let state = AppState {
            svc: Arc::new(AccountService::new(
                AnyRepo::memory(),
                ReservedUsernames::builtin(),
                StdClock,
            )),
            allowed_domain: None,
            profile_domain: None,
        };
        Router::new()
            .route("/:username", get(get_profile))
            .route("/api/check-username", get(check_username))
            .route("/api/accounts", post(create_account).get(list_accounts))
            .route(
                "/api/accounts/me",
                axum::routing::patch(update_account).delete(delete_account),
            )
            .route(
                "/api/portfolio",
                post(add_portfolio_item).get(list_portfolio),
            )
            .route(
                "/api/portfolio/:id",
                axum::routing::delete(delete_portfolio_item),
            )
            .route("/api/me", get(get_me))
            .with_state(state)
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn signup(email: &str, username: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/accounts")
            .header("content-type", "application/json")
            .header("X-Debug-User", email)
            .body(Body::from(format!("{{\"username\":\"{username}\"}}")))
            .unwrap()
    }

    #[tokio::test]
    async fn signup_and_public_profile_flow() {
        let router = app();

        let resp = router
            .clone()
            .oneshot(signup("alice@example.com", "  Alice Doe "))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let v = body_json(resp).await;
        assert_eq!(v["username"], "alice-doe");
        assert!(v["profile_url"].as_str().unwrap().ends_with("/alice-doe"));

        // Public page serves under the normalized name.
        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/alice-doe")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["username"], "alice-doe");

        // Unknown profile is a 404.
        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/nobody-here")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn check_username_reports_policy_reasons() {
        let router = app();
        let resp = router
            .clone()
            .oneshot(signup("alice@example.com", "alice"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        // Taken, without auth.
        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/check-username?username=ALICE")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["available"], false);
        assert_eq!(v["message"], "Username is already taken");

        // Own current username is fine.
        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/check-username?username=Alice")
                    .header("X-Debug-User", "alice@example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let v = body_json(resp).await;
        assert_eq!(v["available"], true);
        assert_eq!(v["is_current"], true);

        // Reserved.
        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/check-username?username=admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let v = body_json(resp).await;
        assert_eq!(v["available"], false);
        assert_eq!(v["message"], "This username is reserved");

        // Free.
        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/check-username?username=bob")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let v = body_json(resp).await;
        assert_eq!(v["available"], true);
        assert_eq!(v["is_current"], false);
    }

    #[tokio::test]
    async fn duplicate_signups_conflict() {
        let router = app();
        let resp = router
            .clone()
            .oneshot(signup("alice@example.com", "alice"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        // Same username, other email.
        let resp = router
            .clone()
            .oneshot(signup("bob@example.com", "Alice"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        // Same email again.
        let resp = router
            .clone()
            .oneshot(signup("alice@example.com", "other-name"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn rename_and_profile_patch() {
        let router = app();
        router
            .clone()
            .oneshot(signup("alice@example.com", "alice"))
            .await
            .unwrap();

        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri("/api/accounts/me")
                    .header("content-type", "application/json")
                    .header("X-Debug-User", "alice@example.com")
                    .body(Body::from(
                        "{\"username\":\"Alicia!\",\"tagline\":\"maker\",\"video_url\":\"https://youtu.be/dQw4w9WgXcQ\"}",
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["username"], "alicia");
        assert_eq!(v["tagline"], "maker");

        // Old name is gone; public page carries the extracted video id.
        let resp = router
            .clone()
            .oneshot(Request::builder().uri("/alice").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/alicia")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let v = body_json(resp).await;
        assert_eq!(v["video_id"], "dQw4w9WgXcQ");

        // Clearing a field with null.
        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri("/api/accounts/me")
                    .header("content-type", "application/json")
                    .header("X-Debug-User", "alice@example.com")
                    .body(Body::from("{\"tagline\":null}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        let v = body_json(resp).await;
        assert!(v.get("tagline").is_none());
    }

    #[tokio::test]
    async fn deactivate_hides_profile_and_blocks_name() {
        let router = app();
        router
            .clone()
            .oneshot(signup("alice@example.com", "alice"))
            .await
            .unwrap();

        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/accounts/me")
                    .header("X-Debug-User", "alice@example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        // Public page is gone immediately.
        let resp = router
            .clone()
            .oneshot(Request::builder().uri("/alice").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        // The name is still held for the grace period.
        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/check-username?username=alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let v = body_json(resp).await;
        assert_eq!(v["available"], false);

        // And the authenticated surface no longer knows the account.
        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/me")
                    .header("X-Debug-User", "alice@example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn portfolio_crud() {
        let router = app();
        router
            .clone()
            .oneshot(signup("alice@example.com", "alice"))
            .await
            .unwrap();

        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/portfolio")
                    .header("content-type", "application/json")
                    .header("X-Debug-User", "alice@example.com")
                    .body(Body::from(
                        "{\"title\":\"Demo reel\",\"video_url\":\"https://www.youtube.com/watch?v=dQw4w9WgXcQ\"}",
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created = body_json(resp).await;
        assert_eq!(created["video_id"], "dQw4w9WgXcQ");
        let item_id = created["id"].as_str().unwrap().to_string();

        // Empty title rejected.
        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/portfolio")
                    .header("content-type", "application/json")
                    .header("X-Debug-User", "alice@example.com")
                    .body(Body::from("{\"title\":\"  \"}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/portfolio")
                    .header("X-Debug-User", "alice@example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let v = body_json(resp).await;
        assert_eq!(v.as_array().unwrap().len(), 1);

        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/portfolio/{item_id}"))
                    .header("X-Debug-User", "alice@example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn directory_lists_active_accounts_only() {
        let router = app();
        router
            .clone()
            .oneshot(signup("alice@example.com", "alice"))
            .await
            .unwrap();
        router
            .clone()
            .oneshot(signup("bob@example.com", "bob"))
            .await
            .unwrap();
        router
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/accounts/me")
                    .header("X-Debug-User", "bob@example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/accounts")
                    .header("X-Debug-User", "alice@example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["total"], 1);
        assert_eq!(v["accounts"][0]["username"], "alice");

        // Out-of-range limit is rejected.
        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/accounts?limit=0")
                    .header("X-Debug-User", "alice@example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn auth_required_on_account_surface() {
        let router = app();
        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
