//! Core types for the location subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A single fix reported by a provider. Never mutated after a source creates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above the ellipsoid, if the provider reports one.
    #[serde(default)]
    pub altitude: Option<f64>,
    /// Radius of 68% confidence in meters. Larger is less precise.
    pub accuracy: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub bearing: Option<f64>,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub provider: String,
}

impl Position {
    pub fn new(provider: &str, latitude: f64, longitude: f64, accuracy: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            accuracy: accuracy.max(0.0),
            speed: 0.0,
            bearing: None,
            timestamp,
            provider: provider.to_string(),
        }
    }

    pub fn with_altitude(self, altitude: f64) -> Self {
        Self { altitude: Some(altitude), ..self }
    }

    pub fn with_speed(self, speed: f64) -> Self {
        Self { speed: speed.max(0.0), ..self }
    }

    pub fn with_bearing(self, bearing: f64) -> Self {
        Self { bearing: Some(bearing), ..self }
    }
}

/// Which provider(s) a session listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    /// Satellite provider only.
    Fine,
    /// Network provider only.
    Coarse,
    /// Query both and arbitrate.
    Both,
}

impl Default for ProviderMode {
    fn default() -> Self { Self::Coarse }
}

impl fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fine => write!(f, "fine"),
            Self::Coarse => write!(f, "coarse"),
            Self::Both => write!(f, "both"),
        }
    }
}

impl FromStr for ProviderMode {
    type Err = String;

    /// Accepts mode names and the legacy integer codes (1 = fine, 2 = coarse, 3 = both).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fine" | "gps" | "1" => Ok(Self::Fine),
            "coarse" | "network" | "2" => Ok(Self::Coarse),
            "both" | "3" => Ok(Self::Both),
            other => Err(format!("Unknown mode '{}'. Use 'fine', 'coarse' or 'both'.", other)),
        }
    }
}

/// Provider status as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    OutOfService,
    TemporarilyUnavailable,
    Available,
    /// Any status code the platform reports that we do not recognize.
    Unknown,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfService => write!(f, "OUT_OF_SERVICE"),
            Self::TemporarilyUnavailable => write!(f, "TEMPORARILY_UNAVAILABLE"),
            Self::Available => write!(f, "AVAILABLE"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Last known enabled state of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Availability {
    Enabled,
    Disabled,
    #[default]
    Unknown,
}

/// Events a provider subscription delivers.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    PositionUpdated(Position),
    ProviderEnabled(String),
    ProviderDisabled(String),
    ProviderStatusChanged(String, ProviderStatus),
}

/// Why the arbiter told its listener no fix can be produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    #[error("All required location providers are unavailable")]
    AllProvidersUnavailable,

    #[error("Provider '{provider}' reported {status}")]
    ProviderFault { provider: String, status: ProviderStatus },
}

/// Location errors.
#[derive(Error, Debug)]
pub enum LocationError {
    #[error("Provider '{0}' is disabled")]
    ProviderDisabled(String),

    #[error(transparent)]
    Unavailable(#[from] FailureReason),

    #[error("Subscription to '{0}' refused")]
    Subscription(String),

    #[error("Payload error: {0}")]
    Serialization(String),

    #[error("Location client already released")]
    Released,

    #[error("Invalid scenario: {0}")]
    Scenario(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse_names_and_codes() {
        assert_eq!("Fine".parse::<ProviderMode>().unwrap(), ProviderMode::Fine);
        assert_eq!("2".parse::<ProviderMode>().unwrap(), ProviderMode::Coarse);
        assert_eq!(" both ".parse::<ProviderMode>().unwrap(), ProviderMode::Both);
        assert!("passive".parse::<ProviderMode>().is_err());
    }

    #[test]
    fn test_default_mode_is_coarse() {
        assert_eq!(ProviderMode::default(), ProviderMode::Coarse);
    }

    #[test]
    fn test_position_clamps_negative_accuracy_and_speed() {
        let p = Position::new("gps", 1.0, 2.0, -3.0, 10).with_speed(-1.0);
        assert_eq!(p.accuracy, 0.0);
        assert_eq!(p.speed, 0.0);
        assert!(p.altitude.is_none());
    }

    #[test]
    fn test_position_deserialize_minimal() {
        let p: Position = serde_json::from_str(
            r#"{"latitude": 59.3, "longitude": 18.0, "accuracy": 12.5, "timestamp": 1000, "provider": "network"}"#,
        ).unwrap();
        assert_eq!(p.provider, "network");
        assert!(p.bearing.is_none());
        assert_eq!(p.speed, 0.0);
    }

    #[test]
    fn test_status_serde_names() {
        let s: ProviderStatus = serde_json::from_str("\"temporarily_unavailable\"").unwrap();
        assert_eq!(s, ProviderStatus::TemporarilyUnavailable);
    }

    #[test]
    fn test_error_messages() {
        let reason = FailureReason::ProviderFault { provider: "gps".into(), status: ProviderStatus::OutOfService };
        assert_eq!(reason.to_string(), "Provider 'gps' reported OUT_OF_SERVICE");
        let e: LocationError = FailureReason::AllProvidersUnavailable.into();
        assert_eq!(e.to_string(), "All required location providers are unavailable");
    }
}
