//! Insert change-feeds over the backend's realtime WebSocket.
//!
//! Each subscription owns one socket and one Phoenix channel. The channel task
//! sends heartbeats, forwards `INSERT` records to the handler and leaves the
//! channel when its cancellation token fires. Handles are tracked: when the
//! task exits for any reason the handle reports the subscription as ended.

use async_trait::async_trait;
use campus_core::config::{BackendConfig, RealtimeConfig};
use campus_core::gateway::{
    ChangeFeed, Filter, InsertHandler, SubscriptionGuard, SubscriptionHandle, render_value,
};
use campus_core::{CampusError, Result};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use super::SupabaseGateway;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const JOIN_REF: &str = "1";

/// One frame of the Phoenix channel protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PhoenixMessage {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

impl PhoenixMessage {
    fn new(topic: &str, event: &str, payload: Value, reference: impl ToString) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference: Some(reference.to_string()),
        }
    }

    fn heartbeat(reference: u64) -> Self {
        Self::new("phoenix", "heartbeat", json!({}), reference)
    }

    fn to_frame(&self) -> Result<Message> {
        Ok(Message::Text(serde_json::to_string(self)?))
    }

    /// The inserted record, when this frame is an insert event.
    fn inserted_record(&self) -> Option<Value> {
        match self.event.as_str() {
            "postgres_changes" => {
                let data = self.payload.get("data")?;
                if data.get("type").and_then(Value::as_str) != Some("INSERT") {
                    return None;
                }
                data.get("record").cloned()
            }
            "INSERT" => self.payload.get("record").cloned(),
            _ => None,
        }
    }
}

/// Payload of `phx_join` asking for insert events on `table`.
///
/// The server accepts a single `col=eq.value` filter; further clauses are
/// checked client-side before dispatch.
fn join_payload(table: &str, filter: &Filter, access_token: &str) -> Value {
    let mut change = json!({
        "event": "INSERT",
        "schema": "public",
        "table": table,
    });
    if let Some((column, value)) = filter.clauses().first() {
        change["filter"] = json!(format!("{}=eq.{}", column, render_value(value)));
    }

    json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": [change],
        },
        "access_token": access_token,
    })
}

struct ChannelTask {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Opens and tracks realtime channel subscriptions.
pub struct RealtimeClient {
    socket_url: String,
    heartbeat: Duration,
    join_timeout: Duration,
    next_id: AtomicU64,
    channels: Mutex<HashMap<u64, ChannelTask>>,
}

impl RealtimeClient {
    pub fn new(backend: &BackendConfig, realtime: &RealtimeConfig) -> Self {
        Self {
            socket_url: format!(
                "{}?apikey={}&vsn=1.0.0",
                backend.realtime_url(),
                backend.anon_key
            ),
            heartbeat: Duration::from_secs(realtime.heartbeat_secs.max(1)),
            join_timeout: Duration::from_secs(realtime.join_timeout_secs.max(1)),
            next_id: AtomicU64::new(1),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Joins `realtime:{channel}` and starts forwarding inserts to `on_event`.
    ///
    /// Returns only once the server acknowledged the join, or fails with a
    /// `Connectivity` error when the socket cannot be opened or the join is
    /// rejected or times out.
    pub async fn subscribe(
        &self,
        channel: &str,
        table: &str,
        filter: Filter,
        on_event: InsertHandler,
        access_token: &str,
    ) -> Result<SubscriptionHandle> {
        let (mut socket, _) = connect_async(self.socket_url.as_str())
            .await
            .map_err(|e| CampusError::connectivity(format!("realtime connect failed: {}", e)))?;

        let topic = format!("realtime:{}", channel);
        let join = PhoenixMessage::new(
            &topic,
            "phx_join",
            join_payload(table, &filter, access_token),
            JOIN_REF,
        );
        socket
            .send(join.to_frame()?)
            .await
            .map_err(|e| CampusError::connectivity(e.to_string()))?;

        timeout(self.join_timeout, await_join_reply(&mut socket))
            .await
            .map_err(|_| CampusError::connectivity(format!("joining {} timed out", topic)))??;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (handle, alive) = SubscriptionHandle::tracked(id, channel);
        let cancel = CancellationToken::new();
        let join = tokio::spawn(run_channel(
            socket,
            topic,
            filter,
            on_event,
            cancel.clone(),
            self.heartbeat,
            alive,
        ));
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, ChannelTask { cancel, join });

        tracing::info!("[Realtime] Subscribed to {} (#{})", channel, id);
        Ok(handle)
    }

    /// Leaves the channel and waits for its task to stop, so no event is
    /// dispatched after this returns. Unknown handles are ignored.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let task = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.id());
        let Some(task) = task else {
            return;
        };

        task.cancel.cancel();
        if let Err(e) = task.join.await {
            tracing::warn!("[Realtime] Channel task for {} ended abnormally: {}", handle.channel(), e);
        }
        tracing::info!("[Realtime] Unsubscribed from {}", handle.channel());
    }

    pub fn open_channels(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        let channels = self.channels.get_mut().unwrap_or_else(PoisonError::into_inner);
        for task in channels.values() {
            task.cancel.cancel();
        }
    }
}

async fn await_join_reply(socket: &mut Socket) -> Result<()> {
    while let Some(frame) = socket.next().await {
        let frame = frame.map_err(|e| CampusError::connectivity(e.to_string()))?;
        let Message::Text(text) = frame else {
            continue;
        };
        let Ok(message) = serde_json::from_str::<PhoenixMessage>(&text) else {
            continue;
        };
        if message.event != "phx_reply" || message.reference.as_deref() != Some(JOIN_REF) {
            continue;
        }

        return match message.payload.get("status").and_then(Value::as_str) {
            Some("ok") => Ok(()),
            _ => Err(CampusError::connectivity(format!(
                "channel join rejected: {}",
                message.payload.get("response").unwrap_or(&Value::Null)
            ))),
        };
    }
    Err(CampusError::connectivity("socket closed before join reply"))
}

async fn run_channel(
    socket: Socket,
    topic: String,
    filter: Filter,
    on_event: InsertHandler,
    cancel: CancellationToken,
    heartbeat: Duration,
    _alive: SubscriptionGuard,
) {
    let (mut sink, mut stream) = socket.split();
    let mut ticker = interval(heartbeat);
    ticker.tick().await;
    let mut next_ref: u64 = 2;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                let leave = PhoenixMessage::new(&topic, "phx_leave", json!({}), next_ref);
                if let Ok(frame) = leave.to_frame() {
                    let _ = sink.send(frame).await;
                }
                let _ = sink.close().await;
                break;
            }
            _ = ticker.tick() => {
                let Ok(frame) = PhoenixMessage::heartbeat(next_ref).to_frame() else {
                    continue;
                };
                next_ref += 1;
                if let Err(e) = sink.send(frame).await {
                    tracing::warn!("[Realtime] Heartbeat on {} failed: {}", topic, e);
                    break;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => dispatch(&text, &topic, &filter, &on_event),
                Some(Ok(Message::Close(_))) | None => {
                    tracing::warn!("[Realtime] Socket for {} closed by server", topic);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("[Realtime] Socket for {} failed: {}", topic, e);
                    break;
                }
            },
        }
    }
}

fn dispatch(text: &str, topic: &str, filter: &Filter, on_event: &InsertHandler) {
    let message: PhoenixMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!("[Realtime] Skipping unparsable frame: {}", e);
            return;
        }
    };
    if message.topic != topic {
        return;
    }
    if message.event == "system"
        && message.payload.get("status").and_then(Value::as_str) == Some("error")
    {
        tracing::warn!("[Realtime] {} reported: {}", topic, message.payload);
        return;
    }

    if let Some(record) = message.inserted_record() {
        if filter.matches(&record) {
            on_event(record);
        }
    }
}

#[async_trait]
impl ChangeFeed for SupabaseGateway {
    async fn subscribe_inserts(
        &self,
        channel: &str,
        table: &str,
        filter: Filter,
        on_event: InsertHandler,
    ) -> Result<SubscriptionHandle> {
        let token = self.bearer_token().await;
        self.realtime
            .subscribe(channel, table, filter, on_event, &token)
            .await
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        self.realtime.unsubscribe(&handle).await;
        Ok(())
    }
}
