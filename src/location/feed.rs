//! In-memory provider source fed by pushes.
//!
//! Fixes and provider state arrive from outside (HTTP, scenario files, tests)
//! and are fanned out to live subscriptions, honouring each subscription's
//! minimum interval and distance the way a platform location service does.

use super::source::{EventSink, ProviderSource, SubscriptionHandle, GPS_PROVIDER, NETWORK_PROVIDER};
use super::types::{LocationError, Position, ProviderEvent, ProviderStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

const EARTH_RADIUS_M: f64 = 6_371_008.8;

struct ProviderFeed {
    enabled: bool,
    last_known: Option<Position>,
    status: ProviderStatus,
}

struct Subscription {
    provider: String,
    min_interval_ms: u64,
    min_distance_m: f64,
    sink: EventSink,
    last_delivered: Option<Position>,
}

impl Subscription {
    fn accepts(&self, fix: &Position) -> bool {
        let prev = match &self.last_delivered {
            Some(p) => p,
            None => return true,
        };
        let elapsed = fix.timestamp.saturating_sub(prev.timestamp);
        elapsed >= self.min_interval_ms as i64 && distance_m(prev, fix) >= self.min_distance_m
    }
}

#[derive(Default)]
struct FeedState {
    providers: HashMap<String, ProviderFeed>,
    subscriptions: HashMap<SubscriptionHandle, Subscription>,
    next_handle: u64,
}

impl FeedState {
    /// Send an event to every live subscription of `provider`, pruning dead sinks.
    fn broadcast(&mut self, provider: &str, event: &ProviderEvent) -> usize {
        let mut delivered = 0;
        self.subscriptions.retain(|_, sub| {
            if sub.provider != provider {
                return true;
            }
            if sub.sink.deliver(event.clone()) {
                delivered += 1;
                true
            } else {
                false
            }
        });
        delivered
    }
}

/// Shared, cloneable provider registry. Clones observe the same state.
#[derive(Clone, Default)]
pub struct FeedSource {
    inner: Arc<Mutex<FeedState>>,
}

impl FeedSource {
    /// A source with no providers registered. Unknown providers read as disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// A source with both standard providers registered and enabled.
    pub fn standard() -> Self {
        let feed = Self::new();
        feed.set_enabled(GPS_PROVIDER, true);
        feed.set_enabled(NETWORK_PROVIDER, true);
        feed
    }

    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enable or disable a provider, registering it if needed.
    /// Live subscriptions are told when the state actually changes.
    pub fn set_enabled(&self, provider: &str, enabled: bool) {
        let mut state = self.state();
        let feed = state.providers.entry(provider.to_string()).or_insert(ProviderFeed {
            enabled: !enabled,
            last_known: None,
            status: ProviderStatus::Available,
        });
        if feed.enabled == enabled {
            return;
        }
        feed.enabled = enabled;
        debug!(provider, enabled, "provider state changed");
        let event = if enabled {
            ProviderEvent::ProviderEnabled(provider.to_string())
        } else {
            ProviderEvent::ProviderDisabled(provider.to_string())
        };
        state.broadcast(provider, &event);
    }

    /// Seed the cached reading without notifying anyone.
    pub fn set_last_known(&self, position: Position) {
        let mut state = self.state();
        if let Some(feed) = state.providers.get_mut(&position.provider) {
            feed.last_known = Some(position);
        }
    }

    /// Record a new fix and deliver it to matching subscriptions.
    /// Returns the number of subscriptions it reached. Fixes for disabled or
    /// unknown providers are dropped.
    pub fn publish(&self, position: Position) -> usize {
        let mut state = self.state();
        match state.providers.get_mut(&position.provider) {
            Some(feed) if feed.enabled => feed.last_known = Some(position.clone()),
            _ => {
                debug!(provider = %position.provider, "dropping fix from inactive provider");
                return 0;
            }
        }

        let mut delivered = 0;
        state.subscriptions.retain(|_, sub| {
            if sub.provider != position.provider || !sub.accepts(&position) {
                return true;
            }
            if sub.sink.deliver(ProviderEvent::PositionUpdated(position.clone())) {
                sub.last_delivered = Some(position.clone());
                delivered += 1;
                true
            } else {
                false
            }
        });
        delivered
    }

    /// Change a provider's status and notify its subscriptions.
    pub fn set_status(&self, provider: &str, status: ProviderStatus) -> usize {
        let mut state = self.state();
        match state.providers.get_mut(provider) {
            Some(feed) => feed.status = status,
            None => return 0,
        }
        state.broadcast(provider, &ProviderEvent::ProviderStatusChanged(provider.to_string(), status))
    }

    pub fn status(&self, provider: &str) -> Option<ProviderStatus> {
        self.state().providers.get(provider).map(|f| f.status)
    }

    /// Number of live subscriptions for a provider.
    pub fn live_subscriptions(&self, provider: &str) -> usize {
        self.state()
            .subscriptions
            .values()
            .filter(|s| s.provider == provider && !s.sink.is_closed())
            .count()
    }
}

impl ProviderSource for FeedSource {
    fn is_provider_enabled(&self, provider: &str) -> bool {
        self.state().providers.get(provider).map_or(false, |f| f.enabled)
    }

    fn last_known_position(&self, provider: &str) -> Option<Position> {
        self.state().providers.get(provider).and_then(|f| f.last_known.clone())
    }

    fn subscribe(
        &mut self,
        provider: &str,
        min_interval_ms: u64,
        min_distance_m: f64,
        sink: EventSink,
    ) -> Result<SubscriptionHandle, LocationError> {
        let mut state = self.state();
        if !state.providers.contains_key(provider) {
            return Err(LocationError::Subscription(provider.to_string()));
        }
        state.next_handle += 1;
        let handle = SubscriptionHandle::new(state.next_handle);
        state.subscriptions.insert(handle, Subscription {
            provider: provider.to_string(),
            min_interval_ms,
            min_distance_m,
            sink,
            last_delivered: None,
        });
        Ok(handle)
    }

    fn unsubscribe(&mut self, handle: SubscriptionHandle) {
        self.state().subscriptions.remove(&handle);
    }
}

/// Great-circle distance between two fixes in meters.
pub fn distance_m(a: &Position, b: &Position) -> f64 {
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}
