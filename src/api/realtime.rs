//! Realtime SSE controller (spec §6 Realtime row, §4.8).

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::authz;
use crate::error::AppError;
use crate::realtime::{RealtimeEvent, SubscriberIdentity};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub token: Option<String>,
}

fn event_to_sse(event: RealtimeEvent) -> Event {
    match event {
        RealtimeEvent::Ready => Event::default().event("READY").data("{}"),
        RealtimeEvent::Overflow => Event::default().event("OVERFLOW").data("{}"),
        RealtimeEvent::Domain { ts, name, payload, .. } => {
            let body = serde_json::json!({ "ts": ts, "payload": payload });
            Event::default()
                .event(name)
                .data(serde_json::to_string(&body).unwrap_or_else(|_| "{}".into()))
        }
    }
}

/// `GET /api/realtime/stream?token=...` — bearer token arrives as a
/// query param since `EventSource` cannot set headers (spec §4.8).
pub async fn stream(
    State(state): State<AppState>,
    Query(q): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let token = q.token.ok_or(AppError::Unauthenticated)?;
    let claims = state
        .jwt
        .validate_access_token(&token)
        .map_err(|_| AppError::Unauthenticated)?;
    let user_id = claims.user_id().ok_or(AppError::Unauthenticated)?;

    let pool = state.pool.clone();
    let requester = tokio::task::spawn_blocking(move || -> Result<_, AppError> {
        let conn = pool.get()?;
        authz::get_requester(&conn, user_id)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    let identity = SubscriberIdentity {
        user_id: Some(requester.user_id),
        role: Some(requester.user.role),
        agency_code: if requester.user.role == crate::domain::user::Role::Agency {
            requester.user.mediator_code.clone()
        } else {
            None
        },
        mediator_code: if requester.user.role == crate::domain::user::Role::Mediator {
            requester.user.mediator_code.clone()
        } else {
            None
        },
        brand_code: requester.user.brand_code.clone(),
        parent_code: requester.user.parent_code.clone(),
    };

    let subscription = state.hub.subscribe(identity).ok_or(AppError::TooManySubscribers)?;

    let events = stream::unfold(subscription, |mut sub| async move {
        sub.receiver.recv().await.map(|event| (Ok(event_to_sse(event)), sub))
    })
    .boxed();

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
