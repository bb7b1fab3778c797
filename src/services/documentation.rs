use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the elimination lobby backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::lobby::create_lobby,
        crate::routes::lobby::get_lobby,
        crate::routes::lobby::join_lobby,
        crate::routes::lobby::start_game,
        crate::routes::lobby::update_settings,
        crate::routes::lobby::cast_vote,
        crate::routes::lobby::trigger_reveal,
        crate::routes::lobby::submit_final_result,
        crate::routes::sse::lobby_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::phase::VisibleLobbyPhase,
            crate::dto::lobby::CreateLobbyRequest,
            crate::dto::lobby::JoinLobbyRequest,
            crate::dto::lobby::UpdateSettingsRequest,
            crate::dto::lobby::CastVoteRequest,
            crate::dto::lobby::RevealRequest,
            crate::dto::lobby::FinaleRequest,
            crate::dto::lobby::PlayerView,
            crate::dto::lobby::LobbyView,
            crate::dto::lobby::CreateLobbyResponse,
            crate::dto::lobby::RevealOutcomeDto,
            crate::dto::lobby::RevealResponse,
            crate::dto::lobby::FinaleOutcomeDto,
            crate::dto::lobby::FinaleResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "lobbies", description = "Lobby commands and projections"),
        (name = "sse", description = "Server-sent lobby state streams"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_lobby_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/lobbies",
            "/lobbies/{code}",
            "/lobbies/{code}/reveal",
            "/lobbies/{code}/events",
            "/healthcheck",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
