//! Location arbiter: owns provider subscriptions and the session state.
//!
//! Fine:   gps only, seeded from the gps cached reading
//! Coarse: network only, no seeding
//! Both:   gps + network, cached readings reconciled with `pick_better`
//!
//! Events reach the arbiter through [`EventSink`]s and are consumed on the
//! owner's control flow via [`LocationArbiter::pump`] or
//! [`LocationArbiter::next_event`]. Events tagged with an older subscription
//! generation, or arriving after `release`, are dropped.

use super::listener::FixListener;
use super::policy::pick_better;
use super::source::{Envelope, EventSink, ProviderSource, SubscriptionHandle, GPS_PROVIDER, NETWORK_PROVIDER};
use super::types::{Availability, FailureReason, LocationError, Position, ProviderEvent, ProviderMode, ProviderStatus};
use std::collections::HashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Minimum time between updates unless the host sets one.
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// One optional slot per provider.
#[derive(Debug)]
struct ProviderSlots<T> {
    gps: Option<T>,
    network: Option<T>,
}

impl<T> Default for ProviderSlots<T> {
    fn default() -> Self {
        Self { gps: None, network: None }
    }
}

impl<T> ProviderSlots<T> {
    fn slot(&mut self, provider: &str) -> Option<&mut Option<T>> {
        match provider {
            GPS_PROVIDER => Some(&mut self.gps),
            NETWORK_PROVIDER => Some(&mut self.network),
            _ => None,
        }
    }

    fn set(&mut self, provider: &str, value: T) {
        if let Some(slot) = self.slot(provider) {
            *slot = Some(value);
        }
    }

    fn is_empty(&self) -> bool {
        self.gps.is_none() && self.network.is_none()
    }

    fn take_all(&mut self) -> impl Iterator<Item = T> {
        self.gps.take().into_iter().chain(self.network.take())
    }
}

/// The location session state machine.
pub struct LocationArbiter<S: ProviderSource> {
    /// `None` once released.
    source: Option<S>,
    mode: ProviderMode,
    interval_ms: u64,
    min_distance_m: f64,
    current_best: Option<Position>,
    availability: HashMap<String, Availability>,
    listener: Option<Box<dyn FixListener>>,
    subscriptions: ProviderSlots<SubscriptionHandle>,
    generation: u64,
    events_tx: UnboundedSender<Envelope>,
    events_rx: UnboundedReceiver<Envelope>,
}

impl<S: ProviderSource> LocationArbiter<S> {
    pub fn new(source: S) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            source: Some(source),
            mode: ProviderMode::default(),
            interval_ms: DEFAULT_INTERVAL_MS,
            min_distance_m: 0.0,
            current_best: None,
            availability: HashMap::new(),
            listener: None,
            subscriptions: ProviderSlots::default(),
            generation: 0,
            events_tx,
            events_rx,
        }
    }

    // ── Configuration ────────────────────────────────────────────

    /// Takes effect on the next `start`.
    pub fn set_locate_mode(&mut self, mode: ProviderMode) {
        self.mode = mode;
    }

    pub fn locate_mode(&self) -> ProviderMode {
        self.mode
    }

    /// Minimum milliseconds between updates. Negative values clamp to 0.
    pub fn set_time_interval(&mut self, interval_ms: i64) {
        self.interval_ms = interval_ms.max(0) as u64;
    }

    pub fn time_interval(&self) -> u64 {
        self.interval_ms
    }

    /// Minimum meters between updates. Negative (or NaN) values clamp to 0.
    pub fn set_min_distance(&mut self, meters: f64) {
        self.min_distance_m = if meters > 0.0 { meters } else { 0.0 };
    }

    pub fn min_distance(&self) -> f64 {
        self.min_distance_m
    }

    // ── Listener ─────────────────────────────────────────────────

    /// Register the listener. The first registration wins: while one is held,
    /// further registrations are ignored and `false` is returned. Callers that
    /// want to swap listeners must `clear_listener` first.
    pub fn register_listener(&mut self, listener: impl FixListener + 'static) -> bool {
        if self.is_released() {
            warn!("listener registered after release; ignoring");
            return false;
        }
        if self.listener.is_some() {
            // Silently dropping the second listener mirrors the legacy client.
            warn!("a location listener is already registered; ignoring the new one");
            return false;
        }
        self.listener = Some(Box::new(listener));
        true
    }

    pub fn clear_listener(&mut self) {
        self.listener = None;
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Start (or restart) location updates for the configured mode.
    ///
    /// Returns `false` when the required provider is disabled. In `Both` mode
    /// the listener is also told when neither provider could be subscribed.
    pub fn start(&mut self) -> bool {
        match self.try_start() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "location updates not started");
                false
            }
        }
    }

    /// Like [`start`](Self::start), but says why nothing was started.
    pub fn try_start(&mut self) -> Result<(), LocationError> {
        self.stop();
        if self.is_released() {
            return Err(LocationError::Released);
        }

        info!(mode = %self.mode, interval_ms = self.interval_ms, min_distance_m = self.min_distance_m, "starting location updates");
        match self.mode {
            ProviderMode::Fine => self.request_single(GPS_PROVIDER, true),
            ProviderMode::Coarse => self.request_single(NETWORK_PROVIDER, false),
            ProviderMode::Both => self.request_both(),
        }
    }

    /// Cancel all subscriptions and forget the current best fix. Never fails.
    pub fn stop(&mut self) {
        let handles: Vec<SubscriptionHandle> = self.subscriptions.take_all().collect();
        if let Some(source) = self.source.as_mut() {
            for handle in &handles {
                source.unsubscribe(*handle);
            }
        }
        if !handles.is_empty() {
            info!(cancelled = handles.len(), "stopped location updates");
        }
        // Anything still queued from the cancelled subscriptions is now stale.
        self.generation += 1;
        self.current_best = None;
    }

    /// Stop and drop the listener, source, and cached state. Terminal.
    pub fn release(&mut self) {
        self.stop();
        if self.source.is_none() {
            return;
        }
        self.source = None;
        self.listener = None;
        self.availability.clear();
        self.events_rx.close();
        while self.events_rx.try_recv().is_ok() {}
        info!("location client released");
    }

    pub fn is_released(&self) -> bool {
        self.source.is_none()
    }

    pub fn is_active(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    pub fn current_cached_position(&self) -> Option<&Position> {
        self.current_best.as_ref()
    }

    pub fn availability(&self, provider: &str) -> Availability {
        self.availability.get(provider).copied().unwrap_or_default()
    }

    // ── Event intake ─────────────────────────────────────────────

    /// Process every queued event. Returns how many were handled (stale ones excluded).
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(envelope) = self.events_rx.try_recv() {
            if self.dispatch(envelope) {
                handled += 1;
            }
        }
        handled
    }

    /// Wait for the next queued event and process it. Returns `false` if it
    /// was stale or the arbiter has been released.
    pub async fn next_event(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(envelope) => self.dispatch(envelope),
            None => false,
        }
    }

    fn dispatch(&mut self, envelope: Envelope) -> bool {
        if self.is_released() || envelope.generation != self.generation {
            debug!(generation = envelope.generation, current = self.generation, "dropping stale provider event");
            return false;
        }
        self.handle_event(envelope.event);
        true
    }

    /// Apply one provider event. No-op after release.
    pub fn handle_event(&mut self, event: ProviderEvent) {
        if self.is_released() {
            return;
        }
        match event {
            ProviderEvent::PositionUpdated(position) => {
                debug!(provider = %position.provider, accuracy = position.accuracy, "location updated");
                if let Some(listener) = self.listener.as_mut() {
                    listener.on_success(&position);
                }
            }
            ProviderEvent::ProviderEnabled(provider) => {
                debug!(%provider, "provider enabled");
                self.availability.insert(provider, Availability::Enabled);
            }
            ProviderEvent::ProviderDisabled(provider) => {
                warn!(%provider, "provider disabled");
                self.availability.insert(provider, Availability::Disabled);
                let all_down = self
                    .required_providers()
                    .iter()
                    .all(|p| self.availability(p) == Availability::Disabled);
                if all_down {
                    self.notify_failure(FailureReason::AllProvidersUnavailable);
                }
            }
            ProviderEvent::ProviderStatusChanged(provider, status) => {
                debug!(%provider, %status, "provider status changed");
                if status != ProviderStatus::Available {
                    self.notify_failure(FailureReason::ProviderFault { provider, status });
                }
            }
        }
    }

    // ── Internals ────────────────────────────────────────────────

    fn required_providers(&self) -> &'static [&'static str] {
        match self.mode {
            ProviderMode::Fine => &[GPS_PROVIDER],
            ProviderMode::Coarse => &[NETWORK_PROVIDER],
            ProviderMode::Both => &[GPS_PROVIDER, NETWORK_PROVIDER],
        }
    }

    fn notify_failure(&mut self, reason: FailureReason) {
        warn!(%reason, "location failure");
        if let Some(listener) = self.listener.as_mut() {
            listener.on_failure(&reason);
        }
    }

    /// Subscribe to one provider if it is enabled. Records its availability.
    fn subscribe(&mut self, provider: &str) -> Result<(), LocationError> {
        let source = self.source.as_mut().ok_or(LocationError::Released)?;

        let enabled = source.is_provider_enabled(provider);
        let state = if enabled { Availability::Enabled } else { Availability::Disabled };
        self.availability.insert(provider.to_string(), state);
        if !enabled {
            return Err(LocationError::ProviderDisabled(provider.to_string()));
        }

        let sink = EventSink::new(self.events_tx.clone(), self.generation);
        let handle = source.subscribe(provider, self.interval_ms, self.min_distance_m, sink)?;
        self.subscriptions.set(provider, handle);
        Ok(())
    }

    fn last_known(&self, provider: &str) -> Option<Position> {
        self.source.as_ref().and_then(|s| s.last_known_position(provider))
    }

    fn request_single(&mut self, provider: &str, seed_from_cache: bool) -> Result<(), LocationError> {
        self.subscribe(provider)?;
        if seed_from_cache {
            if let Some(cached) = self.last_known(provider) {
                self.current_best = Some(pick_better(&cached, self.current_best.as_ref()).clone());
            }
        }
        Ok(())
    }

    fn request_both(&mut self) -> Result<(), LocationError> {
        let mut readings: ProviderSlots<Position> = ProviderSlots::default();
        for provider in [GPS_PROVIDER, NETWORK_PROVIDER] {
            match self.subscribe(provider) {
                Ok(()) => {
                    if let Some(cached) = self.last_known(provider) {
                        readings.set(provider, cached);
                    }
                }
                Err(e) => warn!(provider, error = %e, "skipping provider"),
            }
        }

        if self.subscriptions.is_empty() {
            let reason = FailureReason::AllProvidersUnavailable;
            self.notify_failure(reason.clone());
            return Err(reason.into());
        }

        self.current_best = match (readings.gps, readings.network) {
            (Some(gps), Some(network)) => Some(pick_better(&gps, Some(&network)).clone()),
            (Some(only), None) | (None, Some(only)) => Some(only),
            (None, None) => None,
        };
        Ok(())
    }
}

impl<S: ProviderSource> Drop for LocationArbiter<S> {
    fn drop(&mut self) {
        self.release();
    }
}
