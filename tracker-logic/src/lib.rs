mod location;
mod payloads;
mod settings;
mod tracker;
mod transport;

pub use location::{INVALID_DATE, LocationRecord, format_timestamp, normalize};
pub use payloads::{InitialDataPayload, LatestResponse, LocationUpdatePayload, RawLocation};
pub use settings::TrackerSettings;
pub use tracker::{
    LocationTracker, StateUpdateSender, TrackerPhase, TrackerState, TrackerStats, UtcDT,
};
pub use transport::{ConnectionInfo, ConnectionStatus, LatestFetcher, LiveMessage, LiveTransport};

pub mod prelude {
    use anyhow::Error as AnyhowError;
    use std::result::Result as StdResult;
    pub type Result<T = (), E = AnyhowError> = StdResult<T, E>;
    pub use anyhow::Context;
}
