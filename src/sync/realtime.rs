//! Supabase realtime listener.
//!
//! Speaks just enough of the Phoenix channel protocol to join a
//! `postgres_changes` subscription on the `sessions` table and forward
//! change notifications. The connection is re-established with exponential
//! backoff until the subscription is dropped or the user signs out.
//!
//! The access token is read from the live session on every connect, and a
//! refreshed token is pushed to the open channel so row-level security keeps
//! accepting the subscription after the original JWT expires.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::{ChangeSubscription, RemoteChange, SyncError, SyncResult};
use crate::auth::AuthHandle;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const BACKOFF_BASE_MS: u64 = 1_000;
const BACKOFF_MAX_MS: u64 = 60_000;

/// Spawns a listener for changes to `user_id`'s rows.
pub(super) fn spawn_listener(url: String, auth: AuthHandle, user_id: String) -> ChangeSubscription {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        run(&url, auth, &user_id, &tx).await;
    });
    ChangeSubscription::new(rx, Some(task))
}

/// Whether the listener should reconnect after a connection ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Reconnect,
    Stop,
}

async fn run(
    url: &str,
    mut auth: AuthHandle,
    user_id: &str,
    tx: &mpsc::UnboundedSender<RemoteChange>,
) {
    let mut attempt: u32 = 0;
    loop {
        if auth.user_id().as_deref() != Some(user_id) {
            debug!("Realtime listener stopped: account changed");
            return;
        }
        match listen(url, &mut auth, user_id, tx).await {
            Ok(Next::Stop) => return,
            Ok(Next::Reconnect) if tx.is_closed() => return,
            Ok(Next::Reconnect) => {
                debug!("Realtime connection closed");
                attempt = 0;
            }
            Err(e) => warn!(error = %e, attempt, "Realtime connection failed"),
        }
        attempt = attempt.saturating_add(1);
        let delay = backoff_delay(attempt);
        tokio::select! {
            _ = sleep(delay) => {}
            _ = tx.closed() => return,
        }
    }
}

/// `attempt` starts at 1.
fn backoff_delay(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    let ms = BACKOFF_BASE_MS.saturating_mul(1 << shift).min(BACKOFF_MAX_MS);
    Duration::from_millis(ms)
}

async fn listen(
    url: &str,
    auth: &mut AuthHandle,
    user_id: &str,
    tx: &mpsc::UnboundedSender<RemoteChange>,
) -> SyncResult<Next> {
    let (ws_stream, _) = timeout(CONNECT_TIMEOUT, connect_async(url))
        .await
        .map_err(|_| SyncError::Http("realtime connect timed out".to_string()))?
        .map_err(|e| SyncError::Http(e.to_string()))?;
    let (mut write, mut read) = ws_stream.split();

    let topic = channel_topic(user_id);
    let mut sent_token = auth.access_token();
    write
        .send(Message::Text(
            join_message(&topic, user_id, sent_token.as_deref()).to_string(),
        ))
        .await
        .map_err(|e| SyncError::Http(e.to_string()))?;
    info!(topic = %topic, "Realtime channel joining");

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;
    let mut message_ref: u64 = 1;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                message_ref += 1;
                let beat = json!({
                    "topic": "phoenix",
                    "event": "heartbeat",
                    "payload": {},
                    "ref": message_ref.to_string(),
                });
                write
                    .send(Message::Text(beat.to_string()))
                    .await
                    .map_err(|e| SyncError::Http(e.to_string()))?;
            }
            message = read.next() => match message {
                None | Some(Ok(Message::Close(_))) => return Ok(Next::Reconnect),
                Some(Err(e)) => return Err(SyncError::Http(e.to_string())),
                Some(Ok(Message::Text(text))) => {
                    if let Some(change) = parse_message(&text) {
                        if tx.send(change).is_err() {
                            return Ok(Next::Stop);
                        }
                    }
                }
                Some(Ok(_)) => {}
            },
            alive = auth.changed() => {
                let current = auth.access_token();
                if !alive || auth.user_id().as_deref() != Some(user_id) {
                    return Ok(Next::Stop);
                }
                if current != sent_token {
                    message_ref += 1;
                    if let Some(update) = token_message(&topic, current.as_deref(), message_ref) {
                        write
                            .send(Message::Text(update.to_string()))
                            .await
                            .map_err(|e| SyncError::Http(e.to_string()))?;
                        debug!("Realtime access token updated");
                    }
                    sent_token = current;
                }
            }
            _ = tx.closed() => return Ok(Next::Stop),
        }
    }
}

fn channel_topic(user_id: &str) -> String {
    format!("realtime:sessions:{user_id}")
}

fn join_message(topic: &str, user_id: &str, access_token: Option<&str>) -> Value {
    let mut payload = json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": [{
                "event": "*",
                "schema": "public",
                "table": "sessions",
                "filter": format!("user_id=eq.{user_id}"),
            }],
        },
    });
    if let Some(token) = access_token {
        payload["access_token"] = Value::String(token.to_string());
    }
    json!({
        "topic": topic,
        "event": "phx_join",
        "payload": payload,
        "ref": "1",
        "join_ref": "1",
    })
}

/// Phoenix `access_token` frame carrying a refreshed JWT. `None` without a
/// token.
fn token_message(topic: &str, access_token: Option<&str>, message_ref: u64) -> Option<Value> {
    let token = access_token?;
    Some(json!({
        "topic": topic,
        "event": "access_token",
        "payload": { "access_token": token },
        "ref": message_ref.to_string(),
        "join_ref": "1",
    }))
}

/// Extracts a change from a server frame. Replies and system frames yield
/// `None`.
fn parse_message(text: &str) -> Option<RemoteChange> {
    let frame: Value = serde_json::from_str(text).ok()?;
    match frame.get("event").and_then(Value::as_str)? {
        "postgres_changes" => {
            let data = frame.pointer("/payload/data")?;
            let row = data
                .get("record")
                .filter(|r| r.as_object().is_some_and(|o| !o.is_empty()))
                .or_else(|| data.get("old_record"));
            let session_date = row
                .and_then(|r| r.get("session_date"))
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(RemoteChange { session_date })
        }
        "phx_reply" => {
            if frame.pointer("/payload/status").and_then(Value::as_str) == Some("error") {
                warn!(payload = %frame["payload"], "Realtime join rejected");
            }
            None
        }
        "system" | "phx_error" => {
            debug!(payload = %frame["payload"], "Realtime system message");
            None
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(4), Duration::from_secs(8));
        assert_eq!(backoff_delay(30), Duration::from_secs(60));
    }

    #[test]
    fn test_join_message() {
        let join = join_message("realtime:sessions:u1", "u1", Some("jwt"));
        assert_eq!(join["event"], "phx_join");
        assert_eq!(join["payload"]["access_token"], "jwt");
        let change = &join["payload"]["config"]["postgres_changes"][0];
        assert_eq!(change["table"], "sessions");
        assert_eq!(change["filter"], "user_id=eq.u1");
    }

    #[test]
    fn test_token_message() {
        let update = token_message("realtime:sessions:u1", Some("jwt-2"), 7).unwrap();
        assert_eq!(update["event"], "access_token");
        assert_eq!(update["topic"], "realtime:sessions:u1");
        assert_eq!(update["payload"]["access_token"], "jwt-2");
        assert_eq!(update["ref"], "7");
        assert!(token_message("realtime:sessions:u1", None, 8).is_none());
    }

    #[tokio::test]
    async fn test_listener_stops_when_signed_out() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        // Never connects: the handle has no session for the user.
        run("ws://127.0.0.1:9/unused", AuthHandle::signed_out(), "u1", &tx).await;
        drop(tx);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_parse_update() {
        let text = r#"{"event":"postgres_changes","topic":"realtime:sessions:u1","ref":null,
            "payload":{"data":{"type":"UPDATE","table":"sessions","schema":"public",
            "record":{"session_date":"2024-06-01","session_count":3},"old_record":{"id":"x"}}}}"#;
        assert_eq!(
            parse_message(text),
            Some(RemoteChange {
                session_date: Some("2024-06-01".into())
            })
        );
    }

    #[test]
    fn test_parse_delete_uses_old_record() {
        let text = r#"{"event":"postgres_changes","payload":{"data":{"type":"DELETE",
            "record":{},"old_record":{"session_date":"2024-05-31"}}}}"#;
        assert_eq!(
            parse_message(text).and_then(|c| c.session_date).as_deref(),
            Some("2024-05-31")
        );
    }

    #[test]
    fn test_parse_ignores_replies() {
        let text = r#"{"event":"phx_reply","payload":{"status":"ok","response":{}},"ref":"1"}"#;
        assert_eq!(parse_message(text), None);
        assert_eq!(parse_message("not json"), None);
    }
}
