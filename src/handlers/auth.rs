use crate::auth::{self, CurrentUser};
use crate::schemas::{ApiResponse, AppState, ErrorResponse};
use axum::{extract::State, http::StatusCode, response::Json};
use model::entities::user;
use sea_orm::{ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, trace, warn};
use utoipa::ToSchema;

/// Request body for registering a new user
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct RegisterRequest {
    /// Username (must be unique)
    pub username: String,
    /// Plaintext password; only its argon2 hash is stored
    pub password: String,
    /// Whether the new user is an admin (default: false)
    pub is_admin: Option<bool>,
}

/// Request body for logging in
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// User response model
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: i32,
    pub username: String,
    pub is_admin: bool,
}

impl From<user::Model> for UserResponse {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            is_admin: model.is_admin,
        }
    }
}

/// Login response carrying the session token
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    /// Bearer token for subsequent requests
    pub token: String,
    pub user: UserResponse,
}

fn invalid_credentials() -> (StatusCode, Json<ErrorResponse>) {
    // One body for unknown-user and wrong-password; the difference must not
    // be observable to the client.
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "Invalid username or password".to_string(),
            code: "INVALID_CREDENTIALS".to_string(),
            success: false,
        }),
    )
}

/// Register a new user
#[utoipa::path(
    post,
    path = "/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully", body = ApiResponse<UserResponse>),
        (status = 409, description = "Username already taken", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state, request))]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserResponse>>), (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering register function");
    debug!("Registering user with username: {}", request.username);

    let password_hash = auth::hash_password(&request.password).map_err(|e| {
        error!("Failed to hash password for '{}': {}", request.username, e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Internal server error while registering user".to_string(),
                code: "PASSWORD_HASH_ERROR".to_string(),
                success: false,
            }),
        )
    })?;

    let new_user = user::ActiveModel {
        username: Set(request.username.clone()),
        password_hash: Set(password_hash),
        is_admin: Set(request.is_admin.unwrap_or(false)),
        ..Default::default()
    };

    trace!("Attempting to insert new user into database");
    match new_user.insert(&state.db).await {
        Ok(user_model) => {
            info!(
                "User registered successfully with ID: {}, username: {}",
                user_model.id, user_model.username
            );
            let response = ApiResponse {
                data: UserResponse::from(user_model),
                message: "User registered successfully".to_string(),
                success: true,
            };
            Ok((StatusCode::CREATED, Json(response)))
        }
        Err(db_error) => {
            error!("Failed to register user '{}': {}", request.username, db_error);

            // Handle specific database errors
            let error_msg = db_error.to_string().to_lowercase();
            if matches!(db_error, DbErr::Exec(_) | DbErr::Query(_))
                && (error_msg.contains("unique") || error_msg.contains("constraint"))
            {
                Err((
                    StatusCode::CONFLICT,
                    Json(ErrorResponse {
                        error: "This username is already taken".to_string(),
                        code: "DUPLICATE_USERNAME".to_string(),
                        success: false,
                    }),
                ))
            } else {
                Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "Internal server error while registering user".to_string(),
                        code: "DATABASE_ERROR".to_string(),
                        success: false,
                    }),
                ))
            }
        }
    }
}

/// Authenticate a user and issue a session token
#[utoipa::path(
    post,
    path = "/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = ApiResponse<LoginResponse>),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state, request))]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering login function");
    debug!("Login attempt for username: {}", request.username);

    let user_model = user::Entity::find()
        .filter(user::Column::Username.eq(request.username.clone()))
        .one(&state.db)
        .await
        .map_err(|db_error| {
            error!("Failed to look up user '{}': {}", request.username, db_error);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Internal server error during login".to_string(),
                    code: "DATABASE_ERROR".to_string(),
                    success: false,
                }),
            )
        })?;

    let user_model = match user_model {
        Some(u) => u,
        None => {
            warn!("Login failed for '{}': user not found", request.username);
            return Err(invalid_credentials());
        }
    };

    let password_valid =
        auth::verify_password(&request.password, &user_model.password_hash).unwrap_or(false);
    if !password_valid {
        warn!("Login failed for '{}': invalid password", request.username);
        return Err(invalid_credentials());
    }

    let token = state.sessions.issue(&user_model).map_err(|e| {
        error!("Failed to issue session token for '{}': {}", request.username, e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Internal server error during login".to_string(),
                code: "TOKEN_ERROR".to_string(),
                success: false,
            }),
        )
    })?;

    info!("User '{}' logged in successfully", user_model.username);
    let response = ApiResponse {
        data: LoginResponse {
            token,
            user: UserResponse::from(user_model),
        },
        message: "Login successful".to_string(),
        success: true,
    };
    Ok(Json(response))
}

/// End the current session
#[utoipa::path(
    get,
    path = "/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Session ended", body = ApiResponse<String>),
        (status = 401, description = "Not logged in", body = ErrorResponse)
    ),
)]
#[instrument(skip(state))]
pub async fn logout(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Json<ApiResponse<String>> {
    // The token id goes on the revocation list until it would have expired
    state.revoked_sessions.insert(user.jti.clone(), ()).await;
    info!("User '{}' logged out", user.username);

    Json(ApiResponse {
        data: format!("User {} logged out", user.username),
        message: "Session ended".to_string(),
        success: true,
    })
}
