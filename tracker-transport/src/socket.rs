use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, bail};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use tracker_logic::{ConnectionInfo, ConnectionStatus, LiveMessage, LiveTransport, prelude::*};

use crate::packets::{EnginePacket, SocketPacket};

pub const INITIAL_DATA_EVENT: &str = "initial-data";
pub const LOCATION_UPDATE_EVENT: &str = "location-update";
pub const CLIENT_COUNT_EVENT: &str = "client-count";

const RECONNECT_DELAY_MIN: Duration = Duration::from_secs(1);
const RECONNECT_DELAY_MAX: Duration = Duration::from_secs(5);
/// How long shutdown waits for room in the queue before giving up on the close message
const CLOSE_QUEUE_TIMEOUT: Duration = Duration::from_secs(5);

type QueuePair<T> = (mpsc::Sender<T>, Mutex<mpsc::Receiver<T>>);

/// Live connection to the tracking service over Socket.IO. Connects in the background and
/// keeps reconnecting until [LiveTransport::disconnect] is called.
pub struct SocketIoTransport {
    incoming: QueuePair<LiveMessage>,
    info: watch::Sender<ConnectionInfo>,
    cancel_token: CancellationToken,
}

enum SessionEnd {
    /// Server closed the session
    Closed,
    /// We were asked to stop
    Cancelled,
}

impl SocketIoTransport {
    /// Start connecting to the websocket at `url`, this should be a full Socket.IO URL
    pub fn new(url: String) -> Arc<Self> {
        let (itx, irx) = mpsc::channel(30);
        let (info, _) = watch::channel(ConnectionInfo::default());

        let transport = Arc::new(Self {
            incoming: (itx, Mutex::new(irx)),
            info,
            cancel_token: CancellationToken::new(),
        });

        tokio::spawn({
            let transport = transport.clone();
            async move {
                transport.main_loop(url).await;
            }
        });

        transport
    }

    /// Watch the connection state as it changes
    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionInfo> {
        self.info.subscribe()
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    async fn push_incoming(&self, msg: LiveMessage) {
        tokio::select! {
            biased;

            _ = self.cancel_token.cancelled() => {}

            res = self.incoming.0.send(msg) => {
                if res.is_err() {
                    warn!("Incoming queue is closed, dropping live event");
                }
            }
        }
    }

    fn set_status(&self, status: ConnectionStatus, error: Option<String>) {
        self.info.send_modify(|info| {
            info.status = status;
            info.is_connected = status == ConnectionStatus::Connected;
            if error.is_some() || status == ConnectionStatus::Connected {
                info.error = error;
            }
        });
    }

    async fn main_loop(&self, url: String) {
        let mut delay = RECONNECT_DELAY_MIN;

        loop {
            self.set_status(ConnectionStatus::Connecting, None);
            info!("Connecting to live server at {url}");

            let res = self.run_session(&url).await;
            let was_connected = self.info.borrow().is_connected;

            match res {
                Ok(SessionEnd::Cancelled) => break,
                Ok(SessionEnd::Closed) => {
                    info!("Live server closed the connection");
                    self.set_status(ConnectionStatus::Disconnected, None);
                }
                Err(why) => {
                    let msg = format!("{why:#}");
                    warn!("Live connection failed: {msg}");
                    self.set_status(ConnectionStatus::Error, Some(msg.clone()));
                    self.push_incoming(LiveMessage::ConnectionError(msg)).await;
                }
            }

            if was_connected {
                self.push_incoming(LiveMessage::Disconnected).await;
                delay = RECONNECT_DELAY_MIN;
            }

            let jitter = rand::random_range(0..=delay.as_millis() as u64 / 2);
            let wait = delay + Duration::from_millis(jitter);
            debug!("Reconnecting in {wait:?}");

            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => break,

                _ = tokio::time::sleep(wait) => {}
            }

            delay = (delay * 2).min(RECONNECT_DELAY_MAX);
        }

        self.finish().await;
    }

    /// Mark the connection closed and tell the consumer. Unlike [Self::push_incoming] this
    /// runs after cancellation, so it waits for queue room instead of bailing on the token.
    async fn finish(&self) {
        info!("Live connection shut down");
        self.set_status(ConnectionStatus::Closed, None);
        match tokio::time::timeout(
            CLOSE_QUEUE_TIMEOUT,
            self.incoming.0.send(LiveMessage::Closed),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(_)) => debug!("Incoming queue is closed, dropping close message"),
            Err(_) => warn!("Nobody drained the incoming queue, dropping close message"),
        }
    }

    async fn run_session(&self, url: &str) -> Result<SessionEnd> {
        let connect = tokio::select! {
            biased;

            _ = self.cancel_token.cancelled() => return Ok(SessionEnd::Cancelled),

            res = connect_async(url) => res,
        };

        let (socket, _) = connect.context("Failed to connect to the live server")?;
        let (mut sink, mut stream) = socket.split();
        let mut deadline = None;

        loop {
            let next = tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    let bye = EnginePacket::Close.encode();
                    sink.send(Message::Text(bye)).await.ok();
                    sink.close().await.ok();
                    return Ok(SessionEnd::Cancelled);
                }

                next = Self::next_frame(&mut stream, deadline) => next?,
            };

            let Some(frame) = next else {
                return Ok(SessionEnd::Closed);
            };

            let text = match frame.context("Error reading from the live connection")? {
                Message::Text(text) => text,
                Message::Close(_) => return Ok(SessionEnd::Closed),
                _ => continue,
            };

            let packet = match EnginePacket::decode(&text) {
                Ok(packet) => packet,
                Err(why) => {
                    warn!("Ignoring malformed packet from live server: {why:#}");
                    continue;
                }
            };

            match packet {
                EnginePacket::Open(open) => {
                    debug!("Engine session {} opened", open.sid);
                    deadline = open.ping_deadline();
                    let connect = EnginePacket::from(SocketPacket::Connect(None)).encode();
                    sink.send(Message::Text(connect))
                        .await
                        .context("Failed to join namespace")?;
                }
                EnginePacket::Ping(data) => {
                    sink.send(Message::Text(EnginePacket::Pong(data).encode()))
                        .await
                        .context("Failed to answer ping")?;
                }
                EnginePacket::Close => return Ok(SessionEnd::Closed),
                EnginePacket::Message(msg) => {
                    if !self.handle_socket_packet(msg).await? {
                        return Ok(SessionEnd::Closed);
                    }
                }
                EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
            }
        }
    }

    async fn next_frame<S>(stream: &mut S, deadline: Option<Duration>) -> Result<Option<S::Item>>
    where
        S: futures::Stream + Unpin,
    {
        match deadline {
            Some(deadline) => tokio::time::timeout(deadline, stream.next())
                .await
                .map_err(|_| anyhow!("Live server stopped responding")),
            None => Ok(stream.next().await),
        }
    }

    /// Returns whether the session should continue
    async fn handle_socket_packet(&self, packet: SocketPacket) -> Result<bool> {
        match packet {
            SocketPacket::Connect(_) => {
                info!("Connected to live server");
                self.set_status(ConnectionStatus::Connected, None);
                self.push_incoming(LiveMessage::Connected).await;
            }
            SocketPacket::Disconnect => {
                return Ok(false);
            }
            SocketPacket::ConnectError(why) => {
                bail!("Server refused the connection: {why}");
            }
            SocketPacket::Event { name, data } => match decode_event(&name, data) {
                Ok(Some(msg)) => {
                    if let LiveMessage::ClientCount(count) = msg {
                        self.info.send_modify(|info| info.client_count = count);
                    }
                    self.push_incoming(msg).await;
                }
                Ok(None) => {
                    debug!("Ignoring unknown event {name:?}");
                }
                Err(why) => {
                    warn!("Couldn't decode {name:?} event: {why:#}");
                }
            },
            SocketPacket::Ack => {}
        }
        Ok(true)
    }

    pub async fn recv_live_messages(&self) -> Vec<LiveMessage> {
        let mut incoming_rx = self.incoming.1.lock().await;
        let mut buffer = Vec::with_capacity(30);
        incoming_rx.recv_many(&mut buffer, 30).await;
        buffer
    }
}

fn decode_event(name: &str, data: Value) -> Result<Option<LiveMessage>> {
    let msg = match name {
        INITIAL_DATA_EVENT => LiveMessage::InitialData(
            serde_json::from_value(data).context("Invalid initial data payload")?,
        ),
        LOCATION_UPDATE_EVENT => LiveMessage::LocationUpdate(
            serde_json::from_value(data).context("Invalid location update payload")?,
        ),
        CLIENT_COUNT_EVENT => LiveMessage::ClientCount(parse_client_count(&data)?),
        _ => return Ok(None),
    };
    Ok(Some(msg))
}

fn parse_client_count(data: &Value) -> Result<u32> {
    let count = match data {
        Value::Object(obj) => obj.get("count").and_then(Value::as_u64),
        other => other.as_u64(),
    };
    count
        .and_then(|c| u32::try_from(c).ok())
        .ok_or_else(|| anyhow!("Expected a client count, got {data}"))
}

impl LiveTransport for SocketIoTransport {
    async fn receive_messages(&self) -> impl Iterator<Item = LiveMessage> + Send {
        self.recv_live_messages().await.into_iter()
    }

    fn connection(&self) -> ConnectionInfo {
        self.info.borrow().clone()
    }

    async fn disconnect(&self) {
        self.cancel();
    }
}
