use std::sync::Arc;

use axum::{
    Json, extract,
    extract::{
        Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{
    auth::{Caller, TOKEN_COOKIE, login, register},
    claims::claim_points,
    error::AppError,
    history::get_claim_history,
    models::{Account, AddUserRequest, ClaimQuery, LoginRequest, RegisterRequest},
    registry::{add_tracked_entity, list_tracked_entities},
    state::State,
    utils::{Envelope, clear_cookie, session_cookie},
};

type AppState = extract::State<Arc<State>>;

#[derive(Serialize)]
struct SessionResponse {
    success: bool,
    message: &'static str,
    data: Account,
    token: String,
}

fn payload<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|e| AppError::BadRequest(format!("Malformed payload: {}", e.body_text())))
}

fn start_session(
    state: &State,
    account: Account,
    message: &'static str,
) -> Result<Response, AppError> {
    let token = state
        .sessions
        .issue(account.id)
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    let cookie = session_cookie(
        TOKEN_COOKIE,
        &token,
        state.sessions.ttl_secs(),
        state.config.secure_cookies,
    );

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, cookie)],
        Json(SessionResponse {
            success: true,
            message,
            data: account,
            token,
        }),
    )
        .into_response())
}

pub async fn register_handler(
    extract::State(state): AppState,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let account = register(state.store.as_ref(), state.config.bcrypt_cost, payload(body)?).await?;

    start_session(&state, account, "User registered successfully")
}

pub async fn login_handler(
    extract::State(state): AppState,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let account = login(state.store.as_ref(), payload(body)?).await?;

    start_session(&state, account, "User logged in successfully")
}

pub async fn logout_handler(extract::State(state): AppState, _caller: Caller) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(SET_COOKIE, clear_cookie(TOKEN_COOKIE, state.config.secure_cookies))],
        Json(Envelope::<()>::message("User logged out successfully")),
    )
}

pub async fn add_user_handler(
    extract::State(state): AppState,
    caller: Caller,
    body: Result<Json<AddUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let entity = add_tracked_entity(state.store.as_ref(), caller, payload(body)?).await?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_message(entity, "User added successfully")),
    ))
}

pub async fn all_users_handler(
    extract::State(state): AppState,
    caller: Caller,
) -> Result<impl IntoResponse, AppError> {
    let entities = list_tracked_entities(state.store.as_ref(), caller).await?;

    Ok((StatusCode::OK, Json(Envelope::data(entities))))
}

pub async fn history_handler(
    extract::State(state): AppState,
    caller: Caller,
) -> Result<impl IntoResponse, AppError> {
    let rows = get_claim_history(state.store.as_ref(), caller).await?;

    Ok((StatusCode::OK, Json(Envelope::data(rows))))
}

pub async fn claim_points_handler(
    extract::State(state): AppState,
    caller: Caller,
    query: Result<Query<ClaimQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let claim = claim_points(
        state.store.as_ref(),
        state.award.as_ref(),
        caller,
        query.to.as_deref(),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_message(claim, "Points claimed successfully")),
    ))
}
