use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use validator::Validate;

use crate::{
    dto::lobby::{
        CastVoteRequest, CreateLobbyRequest, CreateLobbyResponse, FinaleRequest, FinaleResponse,
        JoinLobbyRequest, LobbyView, RevealRequest, RevealResponse, UpdateSettingsRequest,
    },
    error::AppError,
    routes::{
        body::JsonBody,
        identity::{CallerIdentity, ViewerIdentity},
    },
    services::lobby_service,
    state::SharedState,
};

/// Lobby commands and the lobby projection.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/lobbies", post(create_lobby))
        .route("/lobbies/{code}", get(get_lobby))
        .route("/lobbies/{code}/join", post(join_lobby))
        .route("/lobbies/{code}/start", post(start_game))
        .route("/lobbies/{code}/settings", put(update_settings))
        .route("/lobbies/{code}/votes", post(cast_vote))
        .route("/lobbies/{code}/reveal", post(trigger_reveal))
        .route("/lobbies/{code}/finale", post(submit_final_result))
}

/// Open a new lobby hosted by the caller.
#[utoipa::path(
    post,
    path = "/lobbies",
    tag = "lobbies",
    params(("X-Player-Id" = String, Header, description = "Caller identity")),
    request_body = CreateLobbyRequest,
    responses(
        (status = 201, description = "Lobby created", body = CreateLobbyResponse),
        (status = 401, description = "Missing or malformed identity"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn create_lobby(
    State(state): State<SharedState>,
    CallerIdentity(caller): CallerIdentity,
    JsonBody(payload): JsonBody<CreateLobbyRequest>,
) -> Result<(StatusCode, Json<CreateLobbyResponse>), AppError> {
    payload.validate()?;
    let (code, lobby) =
        lobby_service::create_lobby(&state, &caller, payload.name.as_deref()).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateLobbyResponse {
            code: code.to_string(),
            lobby,
        }),
    ))
}

/// Lobby as seen by the (optional) viewer.
#[utoipa::path(
    get,
    path = "/lobbies/{code}",
    tag = "lobbies",
    params(
        ("code" = String, Path, description = "Lobby code"),
        ("X-Player-Id" = Option<String>, Header, description = "Viewer identity"),
        ("player_id" = Option<String>, Query, description = "Viewer identity when no header can be set")
    ),
    responses(
        (status = 200, description = "Current lobby view", body = LobbyView),
        (status = 404, description = "Unknown lobby")
    )
)]
pub async fn get_lobby(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    ViewerIdentity(viewer): ViewerIdentity,
) -> Result<Json<LobbyView>, AppError> {
    Ok(Json(
        lobby_service::lobby_view(&state, &code, viewer.as_deref()).await?,
    ))
}

/// Join a lobby, or refresh the caller's display name.
#[utoipa::path(
    post,
    path = "/lobbies/{code}/join",
    tag = "lobbies",
    params(
        ("code" = String, Path, description = "Lobby code"),
        ("X-Player-Id" = String, Header, description = "Caller identity")
    ),
    request_body = JoinLobbyRequest,
    responses(
        (status = 200, description = "Joined", body = LobbyView),
        (status = 404, description = "Unknown lobby")
    )
)]
pub async fn join_lobby(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    CallerIdentity(caller): CallerIdentity,
    JsonBody(payload): JsonBody<JoinLobbyRequest>,
) -> Result<Json<LobbyView>, AppError> {
    payload.validate()?;
    Ok(Json(
        lobby_service::join_lobby(&state, &code, &caller, payload.name.as_deref()).await?,
    ))
}

/// Host-only: start round 1.
#[utoipa::path(
    post,
    path = "/lobbies/{code}/start",
    tag = "lobbies",
    params(
        ("code" = String, Path, description = "Lobby code"),
        ("X-Player-Id" = String, Header, description = "Caller identity")
    ),
    responses(
        (status = 200, description = "Game started", body = LobbyView),
        (status = 403, description = "Caller is not the host"),
        (status = 409, description = "Lobby already started")
    )
)]
pub async fn start_game(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    CallerIdentity(caller): CallerIdentity,
) -> Result<Json<LobbyView>, AppError> {
    Ok(Json(lobby_service::start_game(&state, &code, &caller).await?))
}

/// Host-only: change the round length. Out of range values are clamped.
#[utoipa::path(
    put,
    path = "/lobbies/{code}/settings",
    tag = "lobbies",
    params(
        ("code" = String, Path, description = "Lobby code"),
        ("X-Player-Id" = String, Header, description = "Caller identity")
    ),
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Settings updated", body = LobbyView),
        (status = 403, description = "Caller is not the host")
    )
)]
pub async fn update_settings(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    CallerIdentity(caller): CallerIdentity,
    JsonBody(payload): JsonBody<UpdateSettingsRequest>,
) -> Result<Json<LobbyView>, AppError> {
    Ok(Json(
        lobby_service::update_settings(&state, &code, &caller, payload.round_seconds).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/lobbies/{code}/votes",
    tag = "lobbies",
    params(
        ("code" = String, Path, description = "Lobby code"),
        ("X-Player-Id" = String, Header, description = "Caller identity")
    ),
    request_body = CastVoteRequest,
    responses(
        (status = 200, description = "Vote recorded", body = LobbyView),
        (status = 400, description = "Target is eliminated"),
        (status = 404, description = "Caller or target not in the lobby"),
        (status = 409, description = "Voting is closed")
    )
)]
pub async fn cast_vote(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    CallerIdentity(caller): CallerIdentity,
    JsonBody(payload): JsonBody<CastVoteRequest>,
) -> Result<Json<LobbyView>, AppError> {
    payload.validate()?;
    Ok(Json(
        lobby_service::cast_vote(&state, &code, &caller, &payload.target_id).await?,
    ))
}

/// Host-only: resolve the round from the votes or an explicit loser, or break a tied finale.
#[utoipa::path(
    post,
    path = "/lobbies/{code}/reveal",
    tag = "lobbies",
    params(
        ("code" = String, Path, description = "Lobby code"),
        ("X-Player-Id" = String, Header, description = "Caller identity")
    ),
    request_body = RevealRequest,
    responses(
        (status = 200, description = "Round revealed", body = RevealResponse),
        (status = 403, description = "Caller is not the host"),
        (status = 409, description = "Nothing to reveal")
    )
)]
pub async fn trigger_reveal(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    CallerIdentity(caller): CallerIdentity,
    JsonBody(payload): JsonBody<RevealRequest>,
) -> Result<Json<RevealResponse>, AppError> {
    payload.validate()?;
    let (outcome, lobby) =
        lobby_service::trigger_reveal(&state, &code, &caller, payload.loser_id.as_deref())
            .await?;
    Ok(Json(RevealResponse {
        outcome: outcome.into(),
        lobby,
    }))
}

/// Host-only: submit the wrong answer counts of the two finalists.
#[utoipa::path(
    post,
    path = "/lobbies/{code}/finale",
    tag = "lobbies",
    params(
        ("code" = String, Path, description = "Lobby code"),
        ("X-Player-Id" = String, Header, description = "Caller identity")
    ),
    request_body = FinaleRequest,
    responses(
        (status = 200, description = "Finale result applied", body = FinaleResponse),
        (status = 400, description = "Counts outside [0, 15]"),
        (status = 403, description = "Caller is not the host"),
        (status = 409, description = "No finale running")
    )
)]
pub async fn submit_final_result(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    CallerIdentity(caller): CallerIdentity,
    JsonBody(payload): JsonBody<FinaleRequest>,
) -> Result<Json<FinaleResponse>, AppError> {
    payload.validate()?;
    let (outcome, lobby) = lobby_service::submit_final_result(
        &state,
        &code,
        &caller,
        payload.p1_wrong,
        payload.p2_wrong,
    )
    .await?;
    Ok(Json(FinaleResponse {
        outcome: outcome.into(),
        lobby,
    }))
}
