//! Reconnecting WebSocket subscription for a viewer.
//!
//! Events may be missed while disconnected, so the subscription treats every
//! (re)connect as a reason to refresh everything: the `on_connect` callback
//! fires before any frames are delivered, and the caller re-fetches the
//! conversation list (and the open conversation's detail) there.

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

use super::backoff::Backoff;

/// Subscription to one of the server's event streams.
pub struct EventSubscription {
    url: String,
    backoff: Backoff,
}

impl EventSubscription {
    /// Create a subscription for a `ws://` or `wss://` stream URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            backoff: Backoff::new(),
        }
    }

    /// Run the subscription until the surrounding task is cancelled.
    ///
    /// `on_connect` fires on every successful (re)connect; `on_event` fires
    /// once per received text frame with the raw JSON payload.
    pub async fn run<C, E>(&mut self, mut on_connect: C, mut on_event: E)
    where
        C: FnMut() + Send,
        E: FnMut(String) + Send,
    {
        loop {
            match self.connect_and_stream(&mut on_connect, &mut on_event).await {
                Ok(()) => {
                    debug!(url = %self.url, "Event stream closed by server");
                }
                Err(e) => {
                    warn!(url = %self.url, "Event stream failed: {e}");
                }
            }

            let delay = self.backoff.next_delay();
            debug!(url = %self.url, "Reconnecting in {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }

    async fn connect_and_stream<C, E>(
        &mut self,
        on_connect: &mut C,
        on_event: &mut E,
    ) -> Result<(), tokio_tungstenite::tungstenite::Error>
    where
        C: FnMut() + Send,
        E: FnMut(String) + Send,
    {
        let (stream, _) = connect_async(self.url.as_str()).await?;
        self.backoff.reset();
        on_connect();

        let (mut sink, mut source) = stream.split();
        while let Some(frame) = source.next().await {
            match frame? {
                WsMessage::Text(text) => on_event(text.to_string()),
                WsMessage::Ping(payload) => {
                    sink.send(WsMessage::Pong(payload)).await?;
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_refresh_fires_before_frames_on_every_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Two sessions: each delivers one frame, then the server hangs up.
        let server = tokio::spawn(async move {
            for n in 0..2 {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                ws.send(WsMessage::Text(
                    format!("{{\"conversationId\":\"c{n}\"}}").into(),
                ))
                .await
                .unwrap();
                ws.close(None).await.unwrap();
            }
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let frame_tx = tx.clone();
        let mut subscription = EventSubscription::new(format!("ws://{addr}"));
        let client = tokio::spawn(async move {
            subscription
                .run(
                    move || {
                        tx.send("refresh".to_string()).unwrap();
                    },
                    move |frame| {
                        frame_tx.send(frame).unwrap();
                    },
                )
                .await;
        });

        let mut seen = Vec::new();
        while seen.len() < 4 {
            let item = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            seen.push(item);
        }
        client.abort();
        server.await.unwrap();

        assert_eq!(seen[0], "refresh");
        assert!(seen[1].contains("c0"));
        assert_eq!(seen[2], "refresh");
        assert!(seen[3].contains("c1"));
    }
}
