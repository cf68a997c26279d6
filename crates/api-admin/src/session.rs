//! Login, logout and the current-user endpoint.

use crate::extract::CurrentUser;
use crate::AdminState;
use api_shared::{auth, ApiError, ApiResult, LoginReq, LoginRes, SuccessRes, UserRes};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Json, Response},
};

#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginReq,
    responses(
        (status = 200, description = "Logged in; session cookie set", body = LoginRes),
        (status = 401, description = "Invalid username or password", body = api_shared::ErrorRes)
    )
)]
/// Log a staff member in
///
/// Checks the credentials and, on success, opens a server-side session and
/// sets its cookie. A failed login sets no cookie.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AdminState>,
    payload: Result<Json<LoginReq>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(req) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;

    let (session_id, user) = {
        let credentials = state.credentials.read().await;
        state
            .sessions
            .login(&credentials, &req.username, &req.password)?
    };

    let cookie = auth::session_cookie(&session_id, state.session_ttl_secs, state.secure_cookies)?;
    let body = LoginRes {
        success: true,
        user: UserRes::from(user),
    };
    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

#[utoipa::path(
    post,
    path = "/api/logout",
    responses(
        (status = 200, description = "Session destroyed and cookie cleared", body = SuccessRes)
    )
)]
/// Log out, destroying the session if there is one
#[axum::debug_handler]
pub async fn logout(State(state): State<AdminState>, headers: HeaderMap) -> Response {
    if let Some(session_id) = auth::session_id(&headers) {
        state.sessions.logout(&session_id);
    }
    (
        [(header::SET_COOKIE, auth::clear_session_cookie(state.secure_cookies))],
        Json(SuccessRes { success: true }),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "The logged-in user", body = UserRes),
        (status = 401, description = "Not logged in", body = api_shared::ErrorRes)
    )
)]
/// The logged-in user
pub async fn me(current: CurrentUser) -> Json<UserRes> {
    Json(UserRes::from(current.user))
}
