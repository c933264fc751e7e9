use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AppError, AppResult};
use crate::models::organization::{Membership, Role};
use crate::AppState;

/// Session token claims issued by the auth provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: Option<String>,
    pub aud: Option<String>,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
}

struct SessionInner {
    user: AuthUser,
    memberships: OnceCell<Vec<Membership>>,
}

/// Per-request session. Memberships are loaded at most once per request
/// and dropped with it.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

impl SessionContext {
    pub fn new(user: AuthUser) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                user,
                memberships: OnceCell::new(),
            }),
        }
    }

    #[cfg(test)]
    pub fn with_memberships(user: AuthUser, memberships: Vec<Membership>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                user,
                memberships: OnceCell::new_with(Some(memberships)),
            }),
        }
    }

    pub fn user(&self) -> &AuthUser {
        &self.inner.user
    }

    pub async fn memberships(&self, db: &PgPool) -> AppResult<&[Membership]> {
        let user_id = self.inner.user.id;
        let rows = self
            .inner
            .memberships
            .get_or_try_init(|| async move {
                sqlx::query_as::<_, Membership>(
                    r#"SELECT r.organization_id, o.name AS organization_name, o.subdomain, r.role
                    FROM organization_roles r
                    JOIN organizations o ON o.id = r.organization_id
                    WHERE r.user_id = $1
                    ORDER BY o.name"#,
                )
                .bind(user_id)
                .fetch_all(db)
                .await
            })
            .await?;
        Ok(rows.as_slice())
    }

    pub async fn role_in(&self, db: &PgPool, organization_id: Uuid) -> AppResult<Option<Role>> {
        Ok(self
            .memberships(db)
            .await?
            .iter()
            .find(|m| m.organization_id == organization_id)
            .and_then(|m| Role::parse(&m.role)))
    }
}

pub fn verify_token(token: &str, config: &AuthConfig) -> AppResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[config.audience.as_str()]);
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn user_from_claims(claims: Claims) -> AppResult<AuthUser> {
    let id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid token subject".into()))?;
    Ok(AuthUser {
        id,
        email: claims.email,
    })
}

/// Caller id when the request carries a valid session token.
pub fn user_id_from_headers(headers: &HeaderMap, config: &AuthConfig) -> Option<Uuid> {
    let token = extract_bearer(headers)?;
    let claims = verify_token(token, config).ok()?;
    Uuid::parse_str(&claims.sub).ok()
}

/// Middleware: requires a valid session token. Sets `SessionContext` in extensions.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer(req.headers())
        .ok_or_else(|| AppError::Unauthorized("No token provided".into()))?;

    let claims = verify_token(token, &state.config.auth)?;
    let user = user_from_claims(claims)?;

    req.extensions_mut().insert(SessionContext::new(user));
    Ok(next.run(req).await)
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    pub fn token_for(user_id: Uuid, config: &AuthConfig) -> String {
        let claims = Claims {
            sub: user_id.to_string(),
            email: Some("coach@example.com".into()),
            aud: Some(config.audience.clone()),
            exp: chrono::Utc::now().timestamp() + 3600,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".into(),
            audience: "authenticated".into(),
        }
    }

    #[test]
    fn verifies_provider_tokens() {
        let id = Uuid::new_v4();
        let token = testing::token_for(id, &config());
        let claims = verify_token(&token, &config()).unwrap();
        assert_eq!(claims.sub, id.to_string());

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
        assert_eq!(user_id_from_headers(&headers, &config()), Some(id));
    }

    #[test]
    fn rejects_wrong_secret_or_audience() {
        let token = testing::token_for(Uuid::new_v4(), &config());
        let other_secret = AuthConfig {
            jwt_secret: "other".into(),
            ..config()
        };
        assert!(verify_token(&token, &other_secret).is_err());

        let other_audience = AuthConfig {
            audience: "service_role".into(),
            ..config()
        };
        assert!(verify_token(&token, &other_audience).is_err());
    }

    #[tokio::test]
    async fn preloaded_memberships_answer_role_lookups() {
        let org = Uuid::new_v4();
        let session = SessionContext::with_memberships(
            AuthUser {
                id: Uuid::new_v4(),
                email: None,
            },
            vec![Membership {
                organization_id: org,
                organization_name: "Eagles".into(),
                subdomain: "eagles".into(),
                role: "coach".into(),
            }],
        );
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://unused@localhost/unused")
            .unwrap();
        assert_eq!(session.role_in(&pool, org).await.unwrap(), Some(Role::Coach));
        assert_eq!(session.role_in(&pool, Uuid::new_v4()).await.unwrap(), None);
    }
}
