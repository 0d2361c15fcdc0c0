use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::AppError;

pub const ACTOR_HEADER: &str = "x-actor-id";

/// Authenticated caller, as asserted by the upstream gateway in `X-Actor-Id`.
/// Recorded as `performedBy` on every ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ACTOR_HEADER)
            .ok_or_else(|| AppError::Unauthorized("missing X-Actor-Id header".to_string()))?;

        raw.to_str()
            .ok()
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .map(Actor)
            .ok_or_else(|| AppError::Unauthorized("X-Actor-Id must be a UUID".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<Actor, AppError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(ACTOR_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Actor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_actor_from_header() {
        let id = Uuid::new_v4();
        let actor = extract(Some(&id.to_string())).await.unwrap();
        assert_eq!(actor, Actor(id));
    }

    #[tokio::test]
    async fn rejects_missing_or_malformed_actor() {
        assert!(matches!(extract(None).await, Err(AppError::Unauthorized(_))));
        assert!(matches!(
            extract(Some("admin")).await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
