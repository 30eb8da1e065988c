use chrono::Local;
use tracker_logic::{ConnectionInfo, LocationRecord, TrackerState};

/// What the main part of the screen shows
#[derive(Debug, PartialEq)]
pub enum Panel<'a> {
    Loading,
    Error(&'a str),
    NoData,
    Location(&'a LocationRecord),
}

impl<'a> Panel<'a> {
    pub fn for_state(state: &'a TrackerState) -> Self {
        if state.loading {
            Self::Loading
        } else if let Some(err) = state.error.as_deref() {
            Self::Error(err)
        } else if let Some(loc) = state.latest_location.as_ref() {
            Self::Location(loc)
        } else {
            Self::NoData
        }
    }
}

fn coord(c: f64) -> String {
    if c.is_finite() {
        format!("{c:.6}")
    } else {
        "invalid".to_string()
    }
}

pub struct DashboardView {
    pub title: String,
    pub version: String,
    /// How many readings of history to list
    pub show: usize,
}

impl DashboardView {
    pub fn render(&self, state: &TrackerState, connection: &ConnectionInfo) -> String {
        let mut lines = vec![
            format!("{} v{}", self.title, self.version),
            format!(
                "Live: {} | {} client(s) watching",
                connection.status.as_str(),
                connection.client_count
            ),
            String::new(),
        ];

        match Panel::for_state(state) {
            Panel::Loading => {
                lines.push("Loading location data...".to_string());
            }
            Panel::Error(err) => {
                lines.push("Error".to_string());
                lines.push(format!("  {err}"));
                lines.push("  Press r to try again".to_string());
            }
            Panel::NoData => {
                lines.push("No location data yet".to_string());
                lines.push("  Waiting for the tracker to report in".to_string());
            }
            Panel::Location(loc) => {
                lines.push("Latest location".to_string());
                lines.push(format!("  Latitude:   {}", coord(loc.latitude)));
                lines.push(format!("  Longitude:  {}", coord(loc.longitude)));
                lines.push(format!("  Recorded:   {}", loc.formatted_date));
                lines.push(format!("  ID:         {}", loc.id));
                lines.push(format!("  Created at: {}", loc.created_at));
                lines.push(String::new());

                let last_update = state
                    .stats
                    .last_update_time
                    .map(|t| t.with_timezone(&Local).format("%X").to_string())
                    .unwrap_or_else(|| "never".to_string());
                lines.push(format!(
                    "Received {} reading(s), last update at {last_update}",
                    state.stats.total_received
                ));

                if self.show != 0 && state.all_locations.len() > 1 {
                    lines.push(String::new());
                    lines.push("Recent".to_string());
                    lines.extend(state.all_locations.iter().take(self.show).enumerate().map(
                        |(i, loc)| {
                            format!(
                                "  {:>2}. {}, {}  {}",
                                i + 1,
                                coord(loc.latitude),
                                coord(loc.longitude),
                                loc.formatted_date
                            )
                        },
                    ));
                }
            }
        }

        lines.push(String::new());
        lines.push("[r] refresh  [q] quit".to_string());
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use tracker_logic::{ConnectionStatus, format_timestamp};

    use super::*;

    fn record(id: &str, latitude: f64) -> LocationRecord {
        LocationRecord {
            id: id.to_string(),
            latitude,
            longitude: -74.006,
            timestamp: Some(1_700_000_000_000),
            created_at: "2023-11-14T00:00:00Z".to_string(),
            formatted_date: format_timestamp(Some(1_700_000_000_000)),
        }
    }

    fn view() -> DashboardView {
        DashboardView {
            title: "Tracker".to_string(),
            version: "1.0.0".to_string(),
            show: 5,
        }
    }

    fn ready() -> TrackerState {
        TrackerState {
            loading: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_panels() {
        let state = TrackerState::default();
        assert_eq!(Panel::for_state(&state), Panel::Loading);

        let state = TrackerState {
            error: Some("boom".to_string()),
            ..ready()
        };
        assert_eq!(Panel::for_state(&state), Panel::Error("boom"));

        let state = ready();
        assert_eq!(Panel::for_state(&state), Panel::NoData);

        let loc = record("a1", 40.7128);
        let state = TrackerState {
            latest_location: Some(loc.clone()),
            all_locations: vec![loc.clone()],
            ..ready()
        };
        assert_eq!(Panel::for_state(&state), Panel::Location(&loc));
    }

    #[test]
    fn test_render_location() {
        let latest = record("a2", 40.7128);
        let state = TrackerState {
            latest_location: Some(latest.clone()),
            all_locations: vec![latest, record("a1", f64::NAN)],
            ..ready()
        };
        let connection = ConnectionInfo {
            status: ConnectionStatus::Connected,
            is_connected: true,
            client_count: 3,
            error: None,
        };

        let out = view().render(&state, &connection);

        assert!(out.starts_with("Tracker v1.0.0"));
        assert!(out.contains("Live: connected | 3 client(s) watching"));
        assert!(out.contains("Latitude:   40.712800"));
        assert!(out.contains("Longitude:  -74.006000"));
        assert!(out.contains("ID:         a2"));
        assert!(out.contains("last update at never"));
        assert!(out.contains(" 2. invalid, -74.006000"));
    }

    #[test]
    fn test_render_error() {
        let state = TrackerState {
            error: Some("Failed to fetch latest location: timed out".to_string()),
            ..ready()
        };
        let out = view().render(&state, &ConnectionInfo::default());

        assert!(out.contains("Live: connecting | 0 client(s) watching"));
        assert!(out.contains("Failed to fetch latest location: timed out"));
        assert!(out.contains("Press r to try again"));
    }
}
