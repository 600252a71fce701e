// src/api/auth.rs

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::Error;
use actix_web::{post, web, HttpMessage, HttpResponse, Responder};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use std::rc::Rc;
use std::task::{Context, Poll};
use utoipa::ToSchema;

use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i32,
    role: String,
    exp: usize,
}

/// The authenticated caller, as placed in request extensions by
/// `JwtMiddleware`. Handlers receive it via `web::ReqData<AuthedUser>`.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub id: i32,
    pub is_admin: bool,
}

/// The one admin predicate; every admin-gated handler goes through this.
pub fn is_admin(user: &AuthedUser) -> bool {
    user.is_admin
}

/// Uniform 403 for authenticated non-admin callers.
pub fn forbid_non_admin(user: &AuthedUser) -> Option<HttpResponse> {
    if is_admin(user) {
        None
    } else {
        Some(HttpResponse::Forbidden().json(serde_json::json!({
            "error": "admin access required"
        })))
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: i32,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, body = AuthResponse),
        (status = 400, description = "email taken or invalid data")
    ),
    tag = "auth"
)]
#[post("/auth/register")]
pub async fn register(
    state: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> impl Responder {
    if !crate::affiliates::email_looks_valid(&payload.email) {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "invalid email"
        }));
    }

    let password_hash = match hash(&payload.password, DEFAULT_COST) {
        Ok(h) => h,
        Err(e) => {
            log::error!("bcrypt hash error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let row = match sqlx::query(
        r#"INSERT INTO users (username, email, password_hash, role)
           VALUES ($1, $2, $3, 'user')
           RETURNING id"#,
    )
    .bind(payload.username.as_deref())
    .bind(payload.email.trim().to_lowercase())
    .bind(password_hash)
    .fetch_one(&state.pool)
    .await
    {
        Ok(r) => r,
        Err(e) => {
            log::warn!("register db error: {e}");
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "user already exists or invalid data"
            }));
        }
    };

    let user_id: i32 = row.get("id");

    let token = match generate_jwt(user_id, "user") {
        Ok(t) => t,
        Err(e) => {
            log::error!("jwt encode error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    HttpResponse::Ok().json(AuthResponse { token, user_id })
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, body = AuthResponse),
        (status = 401, description = "invalid credentials"),
        (status = 403, description = "account deactivated")
    ),
    tag = "auth"
)]
#[post("/auth/login")]
pub async fn login(state: web::Data<AppState>, payload: web::Json<LoginRequest>) -> impl Responder {
    let row = match sqlx::query(
        r#"SELECT id, password_hash, role, deactivated FROM users WHERE email = $1"#,
    )
    .bind(payload.email.trim().to_lowercase())
    .fetch_optional(&state.pool)
    .await
    {
        Ok(r) => r,
        Err(e) => {
            log::error!("login db error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let Some(row) = row else {
        return HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "invalid credentials"
        }));
    };

    let user_id: i32 = row.get("id");
    let password_hash: String = row.get("password_hash");
    let role: String = row.get("role");
    let deactivated: bool = row.get("deactivated");

    match verify(&payload.password, &password_hash) {
        Ok(true) => {}
        Ok(false) => {
            return HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "invalid credentials"
            }));
        }
        Err(e) => {
            log::error!("bcrypt verify error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if deactivated {
        return HttpResponse::Forbidden().json(serde_json::json!({
            "error": "account deactivated"
        }));
    }

    let token = match generate_jwt(user_id, &role) {
        Ok(t) => t,
        Err(e) => {
            log::error!("jwt encode error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    HttpResponse::Ok().json(AuthResponse { token, user_id })
}

fn generate_jwt(user_id: i32, role: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let secret = std::env::var("JWT_SECRET").expect("JWT_SECRET required");

    let expiration = Utc::now()
        .checked_add_signed(Duration::days(30))
        .expect("valid timestamp")
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id,
        role: role.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
}

/// Middleware that:
/// - takes `Authorization: Bearer <jwt>`
/// - validates the JWT
/// - rejects deactivated accounts (tokens outlive deactivation by up to 30 days)
/// - puts an `AuthedUser` into `req.extensions_mut()`
pub struct JwtMiddleware;

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = JwtMiddlewareInner<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtMiddlewareInner {
            service: Rc::new(service),
        }))
    }
}

pub struct JwtMiddlewareInner<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareInner<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            let secret = std::env::var("JWT_SECRET").map_err(|_| {
                actix_web::error::ErrorInternalServerError("JWT secret not set")
            })?;

            let auth_header = req
                .headers()
                .get(actix_web::http::header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .unwrap_or("")
                .to_owned();

            let Some(token) = auth_header.strip_prefix("Bearer ") else {
                return Err(actix_web::error::ErrorUnauthorized(
                    "Missing or invalid Authorization header",
                ));
            };

            let token_data = decode::<Claims>(
                token,
                &DecodingKey::from_secret(secret.as_ref()),
                &Validation::default(),
            )
            .map_err(|_| actix_web::error::ErrorUnauthorized("Invalid token"))?;

            // A valid 30-day token outlives deactivation; the flag is the
            // source of truth, not the claims.
            let state = req
                .app_data::<web::Data<AppState>>()
                .cloned()
                .ok_or_else(|| {
                    actix_web::error::ErrorInternalServerError("app state missing")
                })?;

            let deactivated: Option<bool> =
                sqlx::query_scalar("SELECT deactivated FROM users WHERE id = $1")
                    .bind(token_data.claims.sub)
                    .fetch_optional(&state.pool)
                    .await
                    .map_err(|e| {
                        log::error!("auth lookup db error: {e}");
                        actix_web::error::ErrorInternalServerError("auth lookup failed")
                    })?;

            match deactivated {
                None => return Err(actix_web::error::ErrorUnauthorized("Invalid token")),
                Some(true) => {
                    return Err(actix_web::error::ErrorForbidden("account deactivated"))
                }
                Some(false) => {}
            }

            req.extensions_mut().insert(AuthedUser {
                id: token_data.claims.sub,
                is_admin: token_data.claims.role == "admin",
            });

            service.call(req).await
        })
    }
}
