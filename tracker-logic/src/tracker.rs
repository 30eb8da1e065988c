use std::{collections::HashSet, sync::Arc};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream::FuturesUnordered};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;

use crate::{
    location::{LocationRecord, normalize},
    payloads::{InitialDataPayload, LatestResponse, LocationUpdatePayload},
    prelude::*,
    settings::TrackerSettings,
    transport::{ConnectionInfo, LatestFetcher, LiveMessage, LiveTransport},
};

/// Convenience alias for UTC DT
pub type UtcDT = DateTime<Utc>;

pub trait StateUpdateSender: Send + Sync {
    fn send_update(&self);
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TrackerPhase {
    /// Tracker hasn't been opened yet
    #[default]
    Init,
    /// Waiting on the first answer from either the HTTP API or the live connection
    Loading,
    Ready,
    /// Something failed and nothing has succeeded since
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrackerStats {
    /// Number of readings accepted so far
    pub total_received: u64,
    /// Wall clock time the last reading was accepted at
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_update_time: Option<UtcDT>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerState {
    /// Most recently accepted reading, by arrival order
    pub latest_location: Option<LocationRecord>,
    /// Readings seen this session, most recent first
    pub all_locations: Vec<LocationRecord>,
    pub loading: bool,
    pub error: Option<String>,
    pub stats: TrackerStats,
    pub phase: TrackerPhase,
}

impl Default for TrackerState {
    fn default() -> Self {
        Self {
            latest_location: None,
            all_locations: Vec::new(),
            loading: true,
            error: None,
            stats: TrackerStats::default(),
            phase: TrackerPhase::Init,
        }
    }
}

impl TrackerState {
    pub fn has_data(&self) -> bool {
        self.latest_location.is_some()
    }

    fn update_phase(&mut self) {
        self.phase = if self.loading {
            TrackerPhase::Loading
        } else if self.error.is_some() {
            TrackerPhase::Error
        } else {
            TrackerPhase::Ready
        };
    }

    fn begin_loading(&mut self) {
        self.loading = true;
        self.update_phase();
    }

    fn finish_loading(&mut self) {
        self.loading = false;
        self.update_phase();
    }

    /// Result of a fetch to the HTTP API, replaces everything on success
    fn apply_latest(&mut self, res: Result<LatestResponse>, now: UtcDT) {
        let res = res.and_then(|resp| {
            if resp.success {
                Ok(resp.data)
            } else {
                Err(anyhow!(
                    resp.error
                        .unwrap_or_else(|| "Server reported a failure".to_string())
                ))
            }
        });

        match res {
            Ok(Some(raw)) => {
                let location = normalize(&raw);
                self.all_locations = vec![location.clone()];
                self.latest_location = Some(location);
                self.stats.total_received = 1;
                self.stats.last_update_time = Some(now);
                self.error = None;
            }
            Ok(None) => {
                debug!("Server has no location yet");
            }
            Err(why) => {
                let msg = format!("Failed to fetch latest location: {why:#}");
                error!("{msg}");
                self.error = Some(msg);
            }
        }

        self.finish_loading();
    }

    fn apply_initial_data(
        &mut self,
        payload: InitialDataPayload,
        now: UtcDT,
        settings: &TrackerSettings,
    ) {
        if !payload.success {
            self.error = Some(
                payload
                    .error
                    .unwrap_or_else(|| "Failed to load initial data".to_string()),
            );
        } else {
            let raw = payload.data.unwrap_or_default();
            if !raw.is_empty() {
                let mut seen = HashSet::with_capacity(raw.len());
                let mut locations = raw
                    .iter()
                    .map(normalize)
                    .filter(|loc| seen.insert(loc.id.clone()))
                    .collect::<Vec<_>>();
                settings.truncate(&mut locations);

                self.latest_location = locations.first().cloned();
                self.all_locations = locations;
                self.stats.total_received = raw.len() as u64;
                self.stats.last_update_time = Some(now);
                self.error = None;
            }
        }

        self.finish_loading();
    }

    fn apply_update(
        &mut self,
        payload: LocationUpdatePayload,
        now: UtcDT,
        settings: &TrackerSettings,
    ) {
        let location = normalize(&payload.data);

        self.all_locations.retain(|loc| loc.id != location.id);
        self.all_locations.insert(0, location.clone());
        settings.truncate(&mut self.all_locations);

        self.latest_location = Some(location);
        self.stats.total_received += 1;
        self.stats.last_update_time = Some(now);
        self.error = None;

        self.finish_loading();
    }

    /// Connection errors never replace a more specific error
    fn apply_connection_error(&mut self, why: String) {
        if self.error.is_none() {
            self.error = Some(format!("Connection error: {why}"));
            self.update_phase();
        }
    }
}

type RefreshQueue = (mpsc::UnboundedSender<()>, Mutex<mpsc::UnboundedReceiver<()>>);

/// Keeps track of the latest location reported by the server. Pulls the latest reading with
/// [LatestFetcher] and listens for pushed readings with [LiveTransport], merging both into
/// one [TrackerState].
pub struct LocationTracker<F: LatestFetcher, T: LiveTransport, S: StateUpdateSender> {
    state: RwLock<TrackerState>,
    fetcher: F,
    transport: Arc<T>,
    state_update_sender: S,
    settings: TrackerSettings,
    refresh: RefreshQueue,
    cancel: CancellationToken,
}

impl<F: LatestFetcher, T: LiveTransport, S: StateUpdateSender> LocationTracker<F, T, S> {
    pub fn new(
        settings: TrackerSettings,
        fetcher: F,
        transport: Arc<T>,
        state_update_sender: S,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            state: RwLock::new(TrackerState::default()),
            fetcher,
            transport,
            state_update_sender,
            settings,
            refresh: (tx, Mutex::new(rx)),
            cancel: CancellationToken::new(),
        }
    }

    pub async fn clone_state(&self) -> TrackerState {
        self.state.read().await.clone()
    }

    pub async fn latest_location(&self) -> Option<LocationRecord> {
        self.state.read().await.latest_location.clone()
    }

    pub async fn all_locations(&self) -> Vec<LocationRecord> {
        self.state.read().await.all_locations.clone()
    }

    pub async fn loading(&self) -> bool {
        self.state.read().await.loading
    }

    pub async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    pub async fn stats(&self) -> TrackerStats {
        self.state.read().await.stats.clone()
    }

    /// Straight from the transport, the tracker doesn't own this
    pub fn connection(&self) -> ConnectionInfo {
        self.transport.connection()
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    /// Request a new fetch of the latest location, on success it replaces the current state
    pub fn refresh(&self) {
        if self.refresh.0.send(()).is_err() {
            debug!("Refresh requested after the tracker was dropped");
        }
    }

    /// Stop a running [LocationTracker::open]
    pub fn close(&self) {
        self.cancel.cancel();
    }

    fn consume_message(
        &self,
        state: &mut TrackerState,
        subscribed: &mut bool,
        msg: LiveMessage,
    ) -> bool {
        match msg {
            LiveMessage::Connected => {
                if !*subscribed {
                    debug!("Live connection up, listening for location events");
                }
                *subscribed = true;
            }
            LiveMessage::Disconnected => {
                if *subscribed {
                    debug!("Live connection down, no longer listening for location events");
                }
                *subscribed = false;
            }
            LiveMessage::Closed => {
                return true;
            }
            LiveMessage::InitialData(payload) if *subscribed => {
                state.apply_initial_data(payload, Utc::now(), &self.settings);
            }
            LiveMessage::LocationUpdate(payload) if *subscribed => {
                state.apply_update(payload, Utc::now(), &self.settings);
            }
            LiveMessage::InitialData(_) | LiveMessage::LocationUpdate(_) => {
                debug!("Dropping location event received while not listening");
            }
            LiveMessage::ConnectionError(why) => {
                state.apply_connection_error(why);
            }
            LiveMessage::ClientCount(_) => {}
        }
        false
    }

    /// Main loop of the tracker. Fetches the latest location, then merges fetch results and
    /// live events into the state until [LocationTracker::close] is called or the transport
    /// closes. Disconnects the transport before returning.
    pub async fn open(&self) {
        let mut subscribed = self.transport.connection().is_connected;
        let mut refresh_rx = self.refresh.1.lock().await;

        self.state.write().await.begin_loading();
        self.state_update_sender.send_update();

        let mut fetches = FuturesUnordered::new();
        fetches.push(self.fetcher.fetch_latest());

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    break;
                }

                Some(res) = fetches.next(), if !fetches.is_empty() => {
                    self.state.write().await.apply_latest(res, Utc::now());
                    self.state_update_sender.send_update();
                }

                Some(()) = refresh_rx.recv() => {
                    info!("Refreshing latest location");
                    self.state.write().await.begin_loading();
                    fetches.push(self.fetcher.fetch_latest());
                    self.state_update_sender.send_update();
                }

                messages = self.transport.receive_messages() => {
                    let mut state = self.state.write().await;
                    let mut closed = false;
                    for msg in messages {
                        if self.consume_message(&mut state, &mut subscribed, msg) {
                            closed = true;
                            break;
                        }
                    }
                    drop(state);
                    self.state_update_sender.send_update();
                    if closed {
                        info!("Live connection closed");
                        break;
                    }
                }
            }
        }

        self.transport.disconnect().await;
    }
}
