//! Taskgate API Module
//! REST endpoints for users, todos, roles, rights and tokens with OpenAPI documentation
//!
//! Every protected handler resolves the caller's token, asks the enforcer,
//! and only then touches the store. Store and hashing work runs on the
//! blocking pool.

use axum::{
    extract::{FromRequest, FromRequestParts, Path, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};

use crate::engine::config::AuthConfig;
use crate::engine::database::Database;
use crate::engine::error::{AuthError, AuthResult};
use crate::engine::identity::{IdentityStore, User};
use crate::engine::rbac::{Action, Decision, Enforcer, Model, NewRight, Right, RightId, RightsRegistry, Role, RoleId, UserId};
use crate::engine::session::{Session, Token, TokenId, TokenSessionManager};
use crate::engine::todos::{NewTodo, Todo, TodoId, TodoPatch, TodoStore};

const TOKEN_HEADER: &str = "x-token";

#[derive(Clone)]
pub struct ApiState {
    pub identity: IdentityStore,
    pub sessions: TokenSessionManager,
    pub registry: RightsRegistry,
    pub todos: TodoStore,
}

impl ApiState {
    pub fn new(db: Database, auth: &AuthConfig) -> Self {
        Self {
            identity: IdentityStore::new(db.clone()).with_default_role(auth.default_role.clone()),
            sessions: TokenSessionManager::new(db.clone(), auth.token_ttl()),
            registry: RightsRegistry::new(db.clone()),
            todos: TodoStore::new(db),
        }
    }

    pub fn enforcer(&self) -> Enforcer<'_> {
        Enforcer::new(&self.registry)
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        register,
        login,
        logout,
        get_user,
        change_password,
        delete_user,
        assign_role,
        unassign_role,
        list_own_todos,
        list_user_todos,
        create_todo,
        get_todo,
        update_todo,
        delete_todo,
        list_roles,
        create_role,
        get_role,
        delete_role,
        add_role_right,
        list_rights,
        create_right,
        delete_right,
        list_tokens,
        delete_token,
    ),
    modifiers(&TokenAuth),
    tags(
        (name = "auth", description = "Registration and sessions"),
        (name = "users", description = "User accounts and role membership"),
        (name = "todos", description = "Todo items"),
        (name = "rbac", description = "Roles and rights"),
    )
)]
pub struct ApiDoc;

struct TokenAuth;

impl Modify for TokenAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "token",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

pub fn create_router(state: ApiState, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .route("/user", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/user/{id}", get(get_user).patch(change_password).delete(delete_user))
        .route("/user/{id}/todos", get(list_user_todos))
        .route("/user/{id}/roles/{role_id}", post(assign_role).delete(unassign_role))
        .route("/todo", get(list_own_todos).post(create_todo))
        .route("/todo/{id}", get(get_todo).patch(update_todo).delete(delete_todo))
        .route("/role", get(list_roles).post(create_role))
        .route("/role/{id}", get(get_role).delete(delete_role))
        .route("/role/{id}/rights", post(add_role_right))
        .route("/right", get(list_rights).post(create_right))
        .route("/right/{id}", delete(delete_right))
        .route("/token", get(list_tokens))
        .route("/token/{id}", delete(delete_token))
        .layer(timeout_layer(request_timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn timeout_layer(request_timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout)
}

// ---------------------------------------------------------------------------
// Plumbing
// ---------------------------------------------------------------------------

#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::InvalidCredentials | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::DuplicateName(_) => StatusCode::CONFLICT,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::Store(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorBody { error: self.kind(), message })).into_response()
    }
}

/// Runs store or hashing work off the async workers.
async fn blocking<T, F>(f: F) -> AuthResult<T>
where
    F: FnOnce() -> AuthResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AuthError::Internal(format!("blocking task failed: {}", e)))?
}

fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_once(' '))
        .and_then(|(scheme, token)| scheme.eq_ignore_ascii_case("bearer").then_some(token));
    let raw = bearer.or_else(|| headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()))?;
    let raw = raw.trim();
    (!raw.is_empty()).then(|| raw.to_string())
}

/// The caller's session, resolved from `Authorization: Bearer` or `x-token`.
pub struct Authenticated(pub Session);

impl FromRequestParts<ApiState> for Authenticated {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        let value = token_from_headers(&parts.headers).ok_or(AuthError::InvalidToken)?;
        let sessions = state.sessions.clone();
        let session = blocking(move || sessions.resolve_session(&value, Utc::now())).await?;
        Ok(Authenticated(session))
    }
}

/// JSON body whose rejections are reported as validation errors.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(AuthError::Validation(rejection.body_text())),
        }
    }
}

fn ensure(decision: Decision) -> AuthResult<()> {
    match decision {
        Decision::Allow { .. } => Ok(()),
        Decision::Deny => Err(AuthError::Forbidden),
    }
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

#[derive(Deserialize, ToSchema)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserView {
    pub id: UserId,
    pub username: String,
    pub registration_time: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.name,
            registration_time: user.registration_time,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: UserId,
    pub creation_time: DateTime<Utc>,
}

/// Token metadata; the secret value is only returned at login.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenView {
    pub id: TokenId,
    pub user_id: UserId,
    pub creation_time: DateTime<Utc>,
}

impl From<Token> for TokenView {
    fn from(token: Token) -> Self {
        Self {
            id: token.id,
            user_id: token.user_id,
            creation_time: token.creation_time,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct PasswordChange {
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct NewRole {
    pub name: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// Public
// ---------------------------------------------------------------------------

#[utoipa::path(get, path = "/health", responses((status = 200, body = HealthResponse)))]
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[utoipa::path(
    post,
    path = "/user",
    request_body = Credentials,
    responses(
        (status = 201, description = "User registered", body = UserView),
        (status = 409, description = "Name already taken", body = ErrorBody)
    ),
    tag = "auth"
)]
async fn register(
    State(state): State<ApiState>,
    JsonBody(body): JsonBody<Credentials>,
) -> AuthResult<(StatusCode, Json<UserView>)> {
    let user = blocking(move || state.identity.create_user(&body.username, &body.password)).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = Credentials,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 401, description = "Bad credentials", body = ErrorBody)
    ),
    tag = "auth"
)]
async fn login(
    State(state): State<ApiState>,
    JsonBody(body): JsonBody<Credentials>,
) -> AuthResult<Json<LoginResponse>> {
    let token = blocking(move || {
        let user = state.identity.authenticate(&body.username, &body.password)?;
        state.sessions.issue(&user)
    })
    .await?;
    Ok(Json(LoginResponse {
        token: token.value,
        user_id: token.user_id,
        creation_time: token.creation_time,
    }))
}

#[utoipa::path(
    post,
    path = "/logout",
    responses((status = 204, description = "Presented token revoked")),
    security(("token" = [])),
    tag = "auth"
)]
async fn logout(State(state): State<ApiState>, Authenticated(session): Authenticated) -> AuthResult<StatusCode> {
    blocking(move || state.sessions.revoke(&session.token.value)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/user/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses((status = 200, body = UserView), (status = 403, body = ErrorBody)),
    security(("token" = [])),
    tag = "users"
)]
async fn get_user(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
    Path(id): Path<UserId>,
) -> AuthResult<Json<UserView>> {
    let user = blocking(move || {
        state.enforcer().require(&session.user, Model::User, Some(id), Action::Read)?;
        state.identity.get_user(id)
    })
    .await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    patch,
    path = "/user/{id}",
    params(("id" = i64, Path, description = "User id")),
    request_body = PasswordChange,
    responses((status = 204, description = "Password changed"), (status = 403, body = ErrorBody)),
    security(("token" = [])),
    tag = "users"
)]
async fn change_password(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
    Path(id): Path<UserId>,
    JsonBody(body): JsonBody<PasswordChange>,
) -> AuthResult<StatusCode> {
    blocking(move || {
        state.enforcer().require(&session.user, Model::User, Some(id), Action::Write)?;
        state.identity.change_password(id, &body.password)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/user/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses((status = 204, description = "User and owned data removed"), (status = 403, body = ErrorBody)),
    security(("token" = [])),
    tag = "users"
)]
async fn delete_user(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
    Path(id): Path<UserId>,
) -> AuthResult<StatusCode> {
    blocking(move || {
        state.enforcer().require(&session.user, Model::User, Some(id), Action::Write)?;
        state.identity.delete_user(id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/user/{id}/roles/{role_id}",
    params(("id" = i64, Path, description = "User id"), ("role_id" = i64, Path, description = "Role id")),
    responses((status = 204, description = "Role assigned"), (status = 403, body = ErrorBody)),
    security(("token" = [])),
    tag = "users"
)]
async fn assign_role(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
    Path((id, role_id)): Path<(UserId, RoleId)>,
) -> AuthResult<StatusCode> {
    blocking(move || {
        state.enforcer().require(&session.user, Model::Role, None, Action::Write)?;
        state.identity.assign_role(id, role_id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/user/{id}/roles/{role_id}",
    params(("id" = i64, Path, description = "User id"), ("role_id" = i64, Path, description = "Role id")),
    responses((status = 204, description = "Role removed"), (status = 404, body = ErrorBody)),
    security(("token" = [])),
    tag = "users"
)]
async fn unassign_role(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
    Path((id, role_id)): Path<(UserId, RoleId)>,
) -> AuthResult<StatusCode> {
    blocking(move || {
        state.enforcer().require(&session.user, Model::Role, None, Action::Write)?;
        if state.identity.remove_role(id, role_id)? {
            Ok(())
        } else {
            Err(AuthError::NotFound(format!("role {} on user {}", role_id, id)))
        }
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Todos
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/todo",
    responses((status = 200, body = Vec<Todo>)),
    security(("token" = [])),
    tag = "todos"
)]
async fn list_own_todos(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
) -> AuthResult<Json<Vec<Todo>>> {
    let todos = blocking(move || {
        let caller = session.user.id;
        state.enforcer().require(&session.user, Model::Todo, Some(caller), Action::Read)?;
        state.todos.list_by_owner(caller)
    })
    .await?;
    Ok(Json(todos))
}

#[utoipa::path(
    get,
    path = "/user/{id}/todos",
    params(("id" = i64, Path, description = "Owner id")),
    responses((status = 200, body = Vec<Todo>), (status = 403, body = ErrorBody)),
    security(("token" = [])),
    tag = "todos"
)]
async fn list_user_todos(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
    Path(id): Path<UserId>,
) -> AuthResult<Json<Vec<Todo>>> {
    let todos = blocking(move || {
        state.enforcer().require(&session.user, Model::Todo, Some(id), Action::Read)?;
        state.identity.get_user(id)?;
        state.todos.list_by_owner(id)
    })
    .await?;
    Ok(Json(todos))
}

#[utoipa::path(
    post,
    path = "/todo",
    request_body = NewTodo,
    responses((status = 201, body = Todo), (status = 403, body = ErrorBody)),
    security(("token" = [])),
    tag = "todos"
)]
async fn create_todo(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
    JsonBody(body): JsonBody<NewTodo>,
) -> AuthResult<(StatusCode, Json<Todo>)> {
    let todo = blocking(move || {
        let caller = session.user.id;
        state.enforcer().require(&session.user, Model::Todo, Some(caller), Action::Write)?;
        state.todos.create(caller, &body)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(todo)))
}

#[utoipa::path(
    get,
    path = "/todo/{id}",
    params(("id" = i64, Path, description = "Todo id")),
    responses((status = 200, body = Todo), (status = 403, body = ErrorBody), (status = 404, body = ErrorBody)),
    security(("token" = [])),
    tag = "todos"
)]
async fn get_todo(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
    Path(id): Path<TodoId>,
) -> AuthResult<Json<Todo>> {
    let todo = blocking(move || {
        let todo = state.todos.get(id)?;
        state.enforcer().require(&session.user, Model::Todo, Some(todo.user_id), Action::Read)?;
        Ok(todo)
    })
    .await?;
    Ok(Json(todo))
}

#[utoipa::path(
    patch,
    path = "/todo/{id}",
    params(("id" = i64, Path, description = "Todo id")),
    request_body = TodoPatch,
    responses((status = 200, body = Todo), (status = 403, body = ErrorBody), (status = 404, body = ErrorBody)),
    security(("token" = [])),
    tag = "todos"
)]
async fn update_todo(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
    Path(id): Path<TodoId>,
    JsonBody(patch): JsonBody<TodoPatch>,
) -> AuthResult<Json<Todo>> {
    let todo = blocking(move || {
        let owner = state.todos.get(id)?.user_id;
        state.enforcer().require(&session.user, Model::Todo, Some(owner), Action::Write)?;
        state.todos.update(id, &patch)
    })
    .await?;
    Ok(Json(todo))
}

#[utoipa::path(
    delete,
    path = "/todo/{id}",
    params(("id" = i64, Path, description = "Todo id")),
    responses((status = 204, description = "Todo deleted"), (status = 403, body = ErrorBody), (status = 404, body = ErrorBody)),
    security(("token" = [])),
    tag = "todos"
)]
async fn delete_todo(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
    Path(id): Path<TodoId>,
) -> AuthResult<StatusCode> {
    blocking(move || {
        let owner = state.todos.get(id)?.user_id;
        state.enforcer().require(&session.user, Model::Todo, Some(owner), Action::Write)?;
        state.todos.delete(id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Roles and rights
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/role",
    responses((status = 200, body = Vec<Role>), (status = 403, body = ErrorBody)),
    security(("token" = [])),
    tag = "rbac"
)]
async fn list_roles(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
) -> AuthResult<Json<Vec<Role>>> {
    let roles = blocking(move || {
        state.enforcer().require(&session.user, Model::Role, None, Action::Read)?;
        state.registry.list_roles()
    })
    .await?;
    Ok(Json(roles))
}

#[utoipa::path(
    post,
    path = "/role",
    request_body = NewRole,
    responses((status = 201, body = Role), (status = 409, body = ErrorBody)),
    security(("token" = [])),
    tag = "rbac"
)]
async fn create_role(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
    JsonBody(body): JsonBody<NewRole>,
) -> AuthResult<(StatusCode, Json<Role>)> {
    let role = blocking(move || {
        state.enforcer().require(&session.user, Model::Role, None, Action::Write)?;
        state.registry.create_role(&body.name)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    get,
    path = "/role/{id}",
    params(("id" = i64, Path, description = "Role id")),
    responses((status = 200, body = Role), (status = 404, body = ErrorBody)),
    security(("token" = [])),
    tag = "rbac"
)]
async fn get_role(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
    Path(id): Path<RoleId>,
) -> AuthResult<Json<Role>> {
    let role = blocking(move || {
        state.enforcer().require(&session.user, Model::Role, None, Action::Read)?;
        state.registry.get_role(id)
    })
    .await?;
    Ok(Json(role))
}

#[utoipa::path(
    delete,
    path = "/role/{id}",
    params(("id" = i64, Path, description = "Role id")),
    responses((status = 204, description = "Role deleted"), (status = 404, body = ErrorBody)),
    security(("token" = [])),
    tag = "rbac"
)]
async fn delete_role(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
    Path(id): Path<RoleId>,
) -> AuthResult<StatusCode> {
    blocking(move || {
        state.enforcer().require(&session.user, Model::Role, None, Action::Write)?;
        state.registry.delete_role(id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/role/{id}/rights",
    params(("id" = i64, Path, description = "Role id")),
    request_body = NewRight,
    responses((status = 201, body = Right), (status = 400, body = ErrorBody), (status = 403, body = ErrorBody)),
    security(("token" = [])),
    tag = "rbac"
)]
async fn add_role_right(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
    Path(id): Path<RoleId>,
    JsonBody(body): JsonBody<NewRight>,
) -> AuthResult<(StatusCode, Json<Right>)> {
    let right = blocking(move || {
        let context = state.enforcer().context_for(&session.user)?;
        ensure(context.authorize(Model::Right, None, Action::Write))?;
        ensure(context.authorize(Model::Role, None, Action::Write))?;
        state.registry.create_right_for_role(id, &body)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(right)))
}

#[utoipa::path(
    get,
    path = "/right",
    responses((status = 200, body = Vec<Right>), (status = 403, body = ErrorBody)),
    security(("token" = [])),
    tag = "rbac"
)]
async fn list_rights(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
) -> AuthResult<Json<Vec<Right>>> {
    let rights = blocking(move || {
        state.enforcer().require(&session.user, Model::Right, None, Action::Read)?;
        state.registry.list_rights()
    })
    .await?;
    Ok(Json(rights))
}

#[utoipa::path(
    post,
    path = "/right",
    request_body = NewRight,
    responses((status = 201, body = Right), (status = 400, body = ErrorBody), (status = 403, body = ErrorBody)),
    security(("token" = [])),
    tag = "rbac"
)]
async fn create_right(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
    JsonBody(body): JsonBody<NewRight>,
) -> AuthResult<(StatusCode, Json<Right>)> {
    let right = blocking(move || {
        state.enforcer().require(&session.user, Model::Right, None, Action::Write)?;
        state.registry.create_right(&body)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(right)))
}

#[utoipa::path(
    delete,
    path = "/right/{id}",
    params(("id" = i64, Path, description = "Right id")),
    responses((status = 204, description = "Right deleted"), (status = 404, body = ErrorBody)),
    security(("token" = [])),
    tag = "rbac"
)]
async fn delete_right(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
    Path(id): Path<RightId>,
) -> AuthResult<StatusCode> {
    blocking(move || {
        state.enforcer().require(&session.user, Model::Right, None, Action::Write)?;
        state.registry.delete_right(id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/token",
    responses((status = 200, body = Vec<TokenView>), (status = 403, body = ErrorBody)),
    security(("token" = [])),
    tag = "auth"
)]
async fn list_tokens(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
) -> AuthResult<Json<Vec<TokenView>>> {
    let tokens = blocking(move || {
        let caller = session.user.id;
        state.enforcer().require(&session.user, Model::Token, Some(caller), Action::Read)?;
        state.sessions.list_for_user(caller)
    })
    .await?;
    Ok(Json(tokens.into_iter().map(TokenView::from).collect()))
}

#[utoipa::path(
    delete,
    path = "/token/{id}",
    params(("id" = i64, Path, description = "Token id")),
    responses((status = 204, description = "Token revoked"), (status = 403, body = ErrorBody), (status = 404, body = ErrorBody)),
    security(("token" = [])),
    tag = "auth"
)]
async fn delete_token(
    State(state): State<ApiState>,
    Authenticated(session): Authenticated,
    Path(id): Path<TokenId>,
) -> AuthResult<StatusCode> {
    blocking(move || {
        let owner = state.sessions.get(id)?.user_id;
        state.enforcer().require(&session.user, Model::Token, Some(owner), Action::Write)?;
        state.sessions.revoke_by_id(id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
