use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed cluster message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Identity of a render peer, typically the name of the wall it drives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        PeerId(id.into())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Messages the master broadcasts to render peers. One JSON object per
/// message on the wire, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Opens the barrier for one simulation tick. Peers adopt `time` as
    /// their clock and render this instant into an offscreen target.
    #[serde(rename_all = "camelCase")]
    StartFrame {
        frame: u64,
        time: f64,
        delta_time: f64,
        tracking_data: TrackingData,
    },
    /// Closes the barrier: every registered peer acknowledged `frame` (or
    /// was evicted). The only event that permits presenting.
    DisplayFrame { frame: u64 },
}

/// Messages a render peer sends to the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// The peer finished rendering `frame` offscreen.
    FrameReady { frame: u64 },
}

/// Tracking snapshot attached to a `StartFrame`.
///
/// Values are already boundary-converted: positions in meters, rotations
/// column-major in room space. Peers consume them as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingData {
    #[serde(default)]
    pub bodies: Vec<TrackingBody>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingBody {
    pub id: String,
    pub is_tracked: bool,
    pub position: [f32; 3],
    pub orientation: [f32; 9],
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(payload: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(payload)?)
    }
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(payload: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(payload)?)
    }
}
