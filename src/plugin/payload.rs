//! Result shapes handed back to the plugin's caller.

use crate::location::{LocationError, Position};
use serde::{Deserialize, Serialize};

/// Success payload. Field names are part of the caller contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PositionPayload {
    pub latitude: f64,
    pub longitude: f64,
    /// 0 when the provider reported none.
    pub altitude: f64,
    pub accuracy: f64,
    pub speed: f64,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl TryFrom<&Position> for PositionPayload {
    type Error = LocationError;

    fn try_from(p: &Position) -> Result<Self, Self::Error> {
        let altitude = p.altitude.unwrap_or(0.0);
        let fields = [
            ("Latitude", p.latitude),
            ("Longitude", p.longitude),
            ("Altitude", altitude),
            ("Accuracy", p.accuracy),
            ("Speed", p.speed),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(LocationError::Serialization(format!("{} is not a finite number", name)));
        }
        Ok(Self {
            latitude: p.latitude,
            longitude: p.longitude,
            altitude,
            accuracy: p.accuracy,
            speed: p.speed,
            timestamp: p.timestamp,
        })
    }
}

impl PositionPayload {
    pub fn to_json(&self) -> Result<serde_json::Value, LocationError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// What the plugin sends back for one command.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginResult {
    /// Command acknowledged with no data (permission checks).
    Ok,
    Position(PositionPayload),
    Error(String),
    /// The user denied a location permission.
    IllegalAccess,
}

/// Reply channel to the caller of a plugin command.
pub trait CallbackContext: Send {
    fn send(&mut self, result: PluginResult);
}

impl CallbackContext for tokio::sync::mpsc::UnboundedSender<PluginResult> {
    fn send(&mut self, result: PluginResult) {
        let _ = tokio::sync::mpsc::UnboundedSender::send(self, result);
    }
}
