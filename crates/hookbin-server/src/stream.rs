//! Server-Sent Events streams for the session and token channels.
//!
//! Each stream registers a [`Subscriber`] whose deliver function pushes into
//! a bounded channel with `try_send`, so publishing never waits on a slow
//! client. The [`Subscription`] lives inside the response stream: when the
//! client goes away axum drops the stream and the subscriber is removed.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, KeepAliveStream, Sse};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use hookbin_core::{ChannelKind, DeliveryError, Subscriber, Subscription};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::session::SessionId;
use crate::state::AppState;

/// Interval between keep-alive comments.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Serialized events for one connection, holding its subscription.
struct SubscriptionStream {
    events: ReceiverStream<String>,
    subscription: Subscription,
}

impl Stream for SubscriptionStream {
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().events).poll_next(cx)
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        debug!(
            channel = self.subscription.kind().as_str(),
            key = %self.subscription.key(),
            subscriber = %self.subscription.subscriber_id(),
            "SSE client disconnected"
        );
    }
}

type EventStream =
    Sse<KeepAliveStream<BoxStream<'static, std::result::Result<SseEvent, Infallible>>>>;

fn open_stream(state: &AppState, kind: ChannelKind, key: String) -> EventStream {
    let (tx, rx) = mpsc::channel::<String>(state.config.sse_buffer.max(1));
    let subscriber_id = Uuid::new_v4().to_string();

    info!(channel = kind.as_str(), key = %key, subscriber = %subscriber_id, "SSE client connected");

    let subscription = state.fanout.subscribe(
        kind,
        key,
        Subscriber::new(subscriber_id, move |message: &str| {
            tx.try_send(message.to_string()).map_err(|e| match e {
                TrySendError::Full(_) => DeliveryError::Lagging,
                TrySendError::Closed(_) => DeliveryError::Disconnected,
            })
        }),
    );

    let events = SubscriptionStream {
        events: ReceiverStream::new(rx),
        subscription,
    };

    let connected = stream::once(async { Ok(SseEvent::default().comment("connected")) });
    let body = connected
        .chain(events.map(|data| Ok(SseEvent::default().data(data))))
        .boxed();

    Sse::new(body).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

/// GET /api/stream - Every event of the calling session.
pub async fn session_stream(
    State(state): State<AppState>,
    SessionId(session): SessionId,
) -> EventStream {
    open_stream(&state, ChannelKind::Session, session)
}

/// GET /api/tokens/{token}/stream - Request events of one token.
pub async fn token_stream(
    State(state): State<AppState>,
    SessionId(session): SessionId,
    Path(token_id): Path<String>,
) -> Result<EventStream> {
    let token = state
        .db
        .get_token(&token_id)?
        .filter(|t| t.session_id == session)
        .ok_or_else(|| ApiError::NotFound(format!("token {}", token_id)))?;

    Ok(open_stream(&state, ChannelKind::Token, token.id))
}
