//! Server-Sent Events (SSE) handler.
//!
//! Subscribes to the [`mf_core::events::EventBus`] for the caller's own
//! events only. Missed events are not replayed; a subscriber that falls
//! behind skips ahead. Keep-alive comments go out every 15 seconds.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Extension;

use crate::context::AppContext;
use crate::middleware::auth::Identity;

/// GET /api/events -- SSE stream of the caller's job events.
pub async fn events_handler(
    State(ctx): State<AppContext>,
    Extension(identity): Extension<Identity>,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    let mut subscription = ctx.event_bus.subscribe_owner(identity.owner_id);

    let stream = async_stream::stream! {
        while let Some(event) = subscription.recv().await {
            if let Ok(data) = serde_json::to_string(&event) {
                yield Ok(Event::default().event(event.kind().as_str()).data(data));
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
