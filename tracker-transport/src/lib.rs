mod packets;
mod server;
mod socket;

pub use packets::{EnginePacket, OpenInfo, SocketPacket};
pub use server::{
    DEFAULT_API_BASE_URL, DEFAULT_APP_NAME, DEFAULT_APP_VERSION, DEFAULT_LATEST_URL,
    DEFAULT_SOCKET_URL, HttpFetcher, ServerConfig,
};
pub use socket::{
    CLIENT_COUNT_EVENT, INITIAL_DATA_EVENT, LOCATION_UPDATE_EVENT, SocketIoTransport,
};
