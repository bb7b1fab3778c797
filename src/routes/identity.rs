use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use serde::Deserialize;

use crate::{dto::validation::validate_player_id, error::AppError};

/// Header carrying the identity handed out by the identity provider.
pub const PLAYER_ID_HEADER: &str = "x-player-id";

/// Authenticated caller of a lobby command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub String);

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match header_identity(parts)? {
            Some(id) => Ok(Self(id)),
            None => Err(AppError::Unauthenticated(
                "missing player identity header `X-Player-Id`".into(),
            )),
        }
    }
}

/// Optional viewer of a read. Browsers cannot set headers on an
/// `EventSource`, so the `player_id` query parameter is accepted as well.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewerIdentity(pub Option<String>);

#[derive(Deserialize)]
struct ViewerQuery {
    player_id: Option<String>,
}

impl<S> FromRequestParts<S> for ViewerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = header_identity(parts)? {
            return Ok(Self(Some(id)));
        }

        let viewer = Query::<ViewerQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(query)| query.player_id);
        match viewer {
            Some(id) => {
                checked(&id)?;
                Ok(Self(Some(id)))
            }
            None => Ok(Self(None)),
        }
    }
}

fn header_identity(parts: &Parts) -> Result<Option<String>, AppError> {
    let Some(value) = parts.headers.get(PLAYER_ID_HEADER) else {
        return Ok(None);
    };
    let id = value
        .to_str()
        .map_err(|_| AppError::Unauthenticated("player identity is not valid text".into()))?
        .trim()
        .to_string();
    checked(&id)?;
    Ok(Some(id))
}

fn checked(id: &str) -> Result<(), AppError> {
    validate_player_id(id)
        .map_err(|_| AppError::Unauthenticated(format!("malformed player identity `{id}`")))
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(uri: &str, header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = header {
            builder = builder.header(PLAYER_ID_HEADER, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn caller_requires_a_well_formed_header() {
        let mut ok = parts("/lobbies", Some("player-1"));
        let caller = CallerIdentity::from_request_parts(&mut ok, &()).await.unwrap();
        assert_eq!(caller.0, "player-1");

        let mut missing = parts("/lobbies", None);
        assert!(matches!(
            CallerIdentity::from_request_parts(&mut missing, &()).await,
            Err(AppError::Unauthenticated(_))
        ));

        let mut malformed = parts("/lobbies", Some("not ok!"));
        assert!(matches!(
            CallerIdentity::from_request_parts(&mut malformed, &()).await,
            Err(AppError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn viewer_falls_back_to_the_query() {
        let mut anonymous = parts("/lobbies/ABC123/events", None);
        let viewer = ViewerIdentity::from_request_parts(&mut anonymous, &()).await.unwrap();
        assert_eq!(viewer.0, None);

        let mut query = parts("/lobbies/ABC123/events?player_id=p2", None);
        let viewer = ViewerIdentity::from_request_parts(&mut query, &()).await.unwrap();
        assert_eq!(viewer.0.as_deref(), Some("p2"));

        let mut both = parts("/lobbies/ABC123?player_id=p2", Some("p1"));
        let viewer = ViewerIdentity::from_request_parts(&mut both, &()).await.unwrap();
        assert_eq!(viewer.0.as_deref(), Some("p1"));
    }
}
