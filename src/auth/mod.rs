pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::Serialize;
use uuid::Uuid;

use crate::{domain::workflow::Role, error::AppError, state::AppState};

#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
    #[serde(serialize_with = "serialize_role")]
    pub role: Role,
}

fn serialize_role<S: serde::Serializer>(role: &Role, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(role.as_str())
}

impl AuthenticatedUser {
    pub fn require_admin_or_safety(&self) -> Result<(), AppError> {
        if self.role.is_admin_or_safety() {
            Ok(())
        } else {
            Err(AppError::forbidden("admin or safety role required"))
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::forbidden("admin role required"))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        let claims = state
            .jwt
            .verify_token(bearer.token())
            .map_err(|_| AppError::unauthorized())?;

        let role = Role::parse(&claims.role).ok_or_else(AppError::unauthorized)?;

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            username: claims.username,
            role,
        })
    }
}
