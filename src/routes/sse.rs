use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{
    error::AppError, routes::identity::ViewerIdentity, services::sse_service, state::SharedState,
};

#[utoipa::path(
    get,
    path = "/lobbies/{code}/events",
    tag = "sse",
    params(
        ("code" = String, Path, description = "Lobby code"),
        ("X-Player-Id" = Option<String>, Header, description = "Viewer identity"),
        ("player_id" = Option<String>, Query, description = "Viewer identity for EventSource clients")
    ),
    responses(
        (status = 200, description = "`lobby.state` events carrying the viewer's lobby view", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown lobby")
    )
)]
/// Stream the lobby state to one viewer, starting with the current state.
pub async fn lobby_stream(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    ViewerIdentity(viewer): ViewerIdentity,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    info!(code = %code, viewer = ?viewer, "new lobby SSE connection");
    Ok(sse_service::subscribe(&state, &code, viewer).await?)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/lobbies/{code}/events", get(lobby_stream))
}
