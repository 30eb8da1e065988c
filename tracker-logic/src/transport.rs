use serde::{Deserialize, Serialize};

use crate::{
    payloads::{InitialDataPayload, LatestResponse, LocationUpdatePayload},
    prelude::*,
};

#[derive(Debug, Clone)]
pub enum LiveMessage {
    /// The live connection is up (again), listeners should be (re-)registered
    Connected,
    /// The live connection dropped, the transport may reconnect later
    Disconnected,
    /// Event sent when the transport is shut down for good, used to help consumers know when
    /// to stop consuming messages.
    Closed,
    /// The `initial-data` event
    InitialData(InitialDataPayload),
    /// The `location-update` event
    LocationUpdate(LocationUpdatePayload),
    /// Server reported how many clients are watching
    ClientCount(u32),
    /// The connection itself failed
    ConnectionError(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Connected,
    Disconnected,
    Error,
    Closed,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::Closed => "closed",
        }
    }
}

/// Snapshot of the live connection, owned by the transport
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConnectionInfo {
    pub status: ConnectionStatus,
    pub is_connected: bool,
    pub client_count: u32,
    pub error: Option<String>,
}

pub trait LiveTransport: Send + Sync {
    /// Receive a batch of events, waits until at least one is available
    fn receive_messages(
        &self,
    ) -> impl Future<Output = impl Iterator<Item = LiveMessage> + Send> + Send;
    /// Current state of the connection
    fn connection(&self) -> ConnectionInfo;
    /// Disconnect from the transport
    fn disconnect(&self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

pub trait LatestFetcher: Send + Sync {
    /// Fetch the latest location from the HTTP API
    fn fetch_latest(&self) -> impl Future<Output = Result<LatestResponse>> + Send;
}
