use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A location record exactly as the server sends it, every field is optional and untyped
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawLocation {
    pub id: Option<Value>,
    pub latitude: Option<Value>,
    pub longitude: Option<Value>,
    pub timestamp_value: Option<Value>,
    pub created_at: Option<Value>,
}

/// Body of `GET /api/locations/latest`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LatestResponse {
    pub success: bool,
    pub data: Option<RawLocation>,
    pub error: Option<String>,
}

/// Payload of the `initial-data` live event, sent once the live connection is set up
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialDataPayload {
    pub success: bool,
    /// Most recent first
    pub data: Option<Vec<RawLocation>>,
    pub error: Option<String>,
}

/// Payload of the `location-update` live event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationUpdatePayload {
    pub data: RawLocation,
}
