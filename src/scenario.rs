//! Scenario files: provider state plus a queue of events to replay.
//!
//! ```json
//! {
//!   "providers": [
//!     { "id": "gps", "enabled": true, "last_known": { "latitude": 59.33, ... } },
//!     { "id": "network", "enabled": false }
//!   ],
//!   "events": [
//!     { "kind": "fix", "position": { "provider": "gps", ... } },
//!     { "kind": "status", "provider": "gps", "status": "out_of_service" }
//!   ]
//! }
//! ```

use crate::location::{FeedSource, LocationError, Position, ProviderStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSetup {
    pub id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub last_known: Option<Position>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioEvent {
    Fix { position: Position },
    Enabled { provider: String },
    Disabled { provider: String },
    Status { provider: String, status: ProviderStatus },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub providers: Vec<ProviderSetup>,
    #[serde(default)]
    pub events: Vec<ScenarioEvent>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, LocationError> {
        let data = fs::read_to_string(path)?;
        Self::parse(&data)
    }

    pub fn parse(data: &str) -> Result<Self, LocationError> {
        let scenario: Scenario = serde_json::from_str(data)?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<(), LocationError> {
        let mut ids = HashSet::new();
        for p in &self.providers {
            if p.id.trim().is_empty() {
                return Err(LocationError::Scenario("provider id must not be empty".into()));
            }
            if !ids.insert(p.id.as_str()) {
                return Err(LocationError::Scenario(format!("provider '{}' listed twice", p.id)));
            }
            if let Some(cached) = &p.last_known {
                if cached.provider != p.id {
                    return Err(LocationError::Scenario(format!(
                        "last_known of '{}' is tagged '{}'",
                        p.id, cached.provider
                    )));
                }
                check_reading(cached)?;
            }
        }
        if ids.len() > 2 {
            return Err(LocationError::Scenario("at most two providers are supported".into()));
        }

        for event in &self.events {
            let provider = match event {
                ScenarioEvent::Fix { position } => {
                    check_reading(position)?;
                    &position.provider
                }
                ScenarioEvent::Enabled { provider }
                | ScenarioEvent::Disabled { provider }
                | ScenarioEvent::Status { provider, .. } => provider,
            };
            if !ids.contains(provider.as_str()) {
                return Err(LocationError::Scenario(format!("event for unknown provider '{}'", provider)));
            }
        }
        Ok(())
    }

    /// Register the providers and their cached readings on `feed`.
    pub fn apply(&self, feed: &FeedSource) {
        for p in &self.providers {
            feed.set_enabled(&p.id, p.enabled);
            if let Some(cached) = &p.last_known {
                feed.set_last_known(cached.clone());
            }
        }
    }

    /// Push every queued event into `feed`, in file order.
    pub fn replay(&self, feed: &FeedSource) {
        for event in &self.events {
            match event {
                ScenarioEvent::Fix { position } => {
                    feed.publish(position.clone());
                }
                ScenarioEvent::Enabled { provider } => feed.set_enabled(provider, true),
                ScenarioEvent::Disabled { provider } => feed.set_enabled(provider, false),
                ScenarioEvent::Status { provider, status } => {
                    feed.set_status(provider, *status);
                }
            }
        }
    }
}

/// Deserialized readings bypass the clamping in `Position::new`.
fn check_reading(p: &Position) -> Result<(), LocationError> {
    if !(-90.0..=90.0).contains(&p.latitude) || !(-180.0..=180.0).contains(&p.longitude) {
        return Err(LocationError::Scenario(format!(
            "{} reading at {} has invalid coordinates {}, {}",
            p.provider, p.timestamp, p.latitude, p.longitude
        )));
    }
    if !(p.accuracy.is_finite() && p.accuracy >= 0.0) {
        return Err(LocationError::Scenario(format!(
            "{} reading at {} has invalid accuracy {}",
            p.provider, p.timestamp, p.accuracy
        )));
    }
    if !(p.speed.is_finite() && p.speed >= 0.0) {
        return Err(LocationError::Scenario(format!(
            "{} reading at {} has invalid speed {}",
            p.provider, p.timestamp, p.speed
        )));
    }
    Ok(())
}
