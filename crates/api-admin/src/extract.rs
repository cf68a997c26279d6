//! Request extractors for authenticated routes.

use crate::AdminState;
use api_shared::{auth, ApiError};
use axum::{extract::FromRequestParts, http::request::Parts};
use consent_core::PublicUser;

/// The logged-in staff member. Rejects with 401 without a live session.
pub struct CurrentUser {
    pub session_id: String,
    pub user: PublicUser,
}

#[axum::async_trait]
impl FromRequestParts<AdminState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AdminState,
    ) -> Result<Self, Self::Rejection> {
        let session_id = auth::session_id(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorised("not logged in".into()))?;
        let session = state
            .sessions
            .get(&session_id)
            .ok_or_else(|| ApiError::Unauthorised("session expired".into()))?;

        Ok(Self {
            session_id,
            user: session.user,
        })
    }
}

/// A logged-in admin. Staff sessions get 403.
pub struct AdminUser(pub PublicUser);

#[axum::async_trait]
impl FromRequestParts<AdminState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AdminState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser { user, .. } = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            tracing::warn!("{} attempted an admin-only action", user.username);
            return Err(ApiError::Forbidden("admin role required".into()));
        }
        Ok(Self(user))
    }
}
