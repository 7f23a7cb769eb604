use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use sqlx::PgConnection;
use tracing::warn;
use uuid::Uuid;

use super::{
    claims::{Claims, TokenKind},
    jwt::JwtKeys,
};
use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Caller identified by a valid access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub is_admin: bool,
}

/// Caller with a valid access token whose account is still enabled.
#[derive(Debug, Clone)]
pub struct ActiveUser {
    pub id: Uuid,
}

/// Caller whose access token claims admin and whose row still says so.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Uuid);

fn access_claims(parts: &Parts, keys: &JwtKeys) -> Result<Claims, ApiError> {
    let auth_header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?;

    // Expect "Bearer <token>"
    let token = auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header".into()))?;

    let claims = keys.verify(token).map_err(|e| {
        warn!(error = %e, "invalid or expired token");
        ApiError::Unauthorized("Invalid or expired token".into())
    })?;

    if claims.kind != TokenKind::Access {
        return Err(ApiError::Unauthorized("Access token required".into()));
    }
    Ok(claims)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let claims = access_claims(parts, &keys)?;
        Ok(AuthUser {
            id: claims.sub,
            is_admin: claims.is_admin,
        })
    }
}

/// Maps the `is_active` column of the caller's row to an access decision.
pub fn account_status(user_id: Uuid, is_active: Option<bool>) -> ApiResult<()> {
    match is_active {
        Some(true) => Ok(()),
        Some(false) => {
            warn!(%user_id, "disabled account rejected");
            Err(ApiError::Forbidden("Account disabled".into()))
        }
        None => Err(ApiError::Unauthorized("User not found".into())),
    }
}

/// Tokens outlive a deactivation, so mutating paths recheck the row.
pub async fn ensure_active(conn: &mut PgConnection, user_id: Uuid) -> ApiResult<()> {
    let is_active: Option<bool> = sqlx::query_scalar(r#"SELECT is_active FROM users WHERE id = $1"#)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    account_status(user_id, is_active)
}

#[async_trait]
impl FromRequestParts<AppState> for ActiveUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let claims = access_claims(parts, &keys)?;
        let mut conn = state.db.acquire().await?;
        ensure_active(&mut conn, claims.sub).await?;
        Ok(ActiveUser { id: claims.sub })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let claims = access_claims(parts, &keys)?;
        if !claims.is_admin {
            return Err(ApiError::Forbidden("Administrator privileges required".into()));
        }

        // Claims may outlive a demotion; the row is authoritative.
        let still_admin: Option<bool> =
            sqlx::query_scalar(r#"SELECT is_admin AND is_active FROM users WHERE id = $1"#)
                .bind(claims.sub)
                .fetch_optional(&state.db)
                .await?;
        match still_admin {
            Some(true) => Ok(AdminUser(claims.sub)),
            Some(false) => {
                warn!(user_id = %claims.sub, "stale admin claim rejected");
                Err(ApiError::Forbidden("Administrator privileges required".into()))
            }
            None => Err(ApiError::Unauthorized("User not found".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::User;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
        Router,
    };
    use time::OffsetDateTime;
    use tower::ServiceExt;

    async fn whoami(user: AuthUser) -> String {
        format!("{}:{}", user.id, user.is_admin)
    }

    async fn admin_only(AdminUser(id): AdminUser) -> String {
        id.to_string()
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .route("/admin", get(admin_only))
            .with_state(state)
    }

    async fn send(state: AppState, uri: &str, auth: Option<String>) -> (StatusCode, String) {
        let mut req = Request::builder().uri(uri);
        if let Some(auth) = auth {
            req = req.header("Authorization", auth);
        }
        let res = app(state)
            .oneshot(req.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn user(is_admin: bool) -> User {
        User::new_unsaved("bob", "bob@ctf.local", "hash", OffsetDateTime::now_utc()).with_admin(is_admin)
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized_envelope() {
        let (status, body) = send(AppState::fake(), "/whoami", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["code"], 401);
        assert_eq!(json["message"], "Missing Authorization header");
    }

    #[tokio::test]
    async fn wrong_scheme_is_rejected() {
        let (status, _) = send(AppState::fake(), "/whoami", Some("Basic Ym9iOmJvYg==".into())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_token_cannot_be_used_for_access() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let token = keys.sign_refresh(uuid::Uuid::new_v4()).unwrap();
        let (status, body) = send(state, "/whoami", Some(format!("Bearer {token}"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Access token required"));
    }

    #[tokio::test]
    async fn valid_access_token_is_accepted() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let u = user(false);
        let token = keys.sign_access(&u).unwrap();
        let (status, body) = send(state, "/whoami", Some(format!("Bearer {token}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, format!("{}:false", u.id));
    }

    #[test]
    fn disabled_account_is_forbidden() {
        let id = uuid::Uuid::new_v4();
        assert!(account_status(id, Some(true)).is_ok());

        let err = account_status(id, Some(false)).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "Account disabled");

        let err = account_status(id, None).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn active_user_checks_token_before_db() {
        async fn mutate(user: ActiveUser) -> String {
            user.id.to_string()
        }
        let app = Router::new().route("/mutate", get(mutate)).with_state(AppState::fake());
        let res = app
            .oneshot(Request::builder().uri("/mutate").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_admin_claim_is_forbidden_before_db() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let token = keys.sign_access(&user(false)).unwrap();
        let (status, _) = send(state, "/admin", Some(format!("Bearer {token}"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
