//! Host plugin: turns caller commands into single-shot location sessions.
//!
//! `getPermission`        → acknowledge, or prompt for location permissions
//! `getCurrentPosition2`  → locate (prompting first if needed), reply once

pub mod payload;
pub mod permissions;

pub use payload::{CallbackContext, PluginResult, PositionPayload};
pub use permissions::{Permission, PermissionGate, StaticPermissions, LOCATION_PERMISSIONS};

use crate::location::{
    ChannelListener, FixOutcome, LocationArbiter, Position, ProviderMode, ProviderSource,
};
use permissions::{LOCATE_REQUEST, PERMISSION_REQUEST};
use std::fmt;
use std::str::FromStr;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

/// Update interval the plugin asks for.
pub const PLUGIN_INTERVAL_MS: i64 = 5000;

pub const LOCATE_FAILED_MESSAGE: &str = "cannot get location";
pub const PAYLOAD_FAILED_MESSAGE: &str = "parse failed";

/// Commands the plugin understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    GetPermission,
    GetCurrentPosition,
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "getPermission" => Ok(Self::GetPermission),
            "getCurrentPosition2" => Ok(Self::GetCurrentPosition),
            other => Err(format!("Unknown action '{}'", other)),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetPermission => write!(f, "getPermission"),
            Self::GetCurrentPosition => write!(f, "getCurrentPosition2"),
        }
    }
}

/// Session parameters applied on every locate.
#[derive(Debug, Clone, Copy)]
pub struct PluginConfig {
    pub mode: ProviderMode,
    pub interval_ms: i64,
    pub min_distance_m: f64,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            mode: ProviderMode::default(),
            interval_ms: PLUGIN_INTERVAL_MS,
            min_distance_m: 0.0,
        }
    }
}

/// The plugin. Replies at most once per command; a successful fix stops the session.
pub struct GeolocationPlugin<S: ProviderSource + Clone, G: PermissionGate> {
    source: S,
    gate: G,
    config: PluginConfig,
    arbiter: Option<LocationArbiter<S>>,
    outcomes: Option<UnboundedReceiver<FixOutcome>>,
    context: Option<Box<dyn CallbackContext>>,
}

impl<S: ProviderSource + Clone, G: PermissionGate> GeolocationPlugin<S, G> {
    pub fn new(source: S, gate: G) -> Self {
        Self::with_config(source, gate, PluginConfig::default())
    }

    pub fn with_config(source: S, gate: G, config: PluginConfig) -> Self {
        Self {
            source,
            gate,
            config,
            arbiter: None,
            outcomes: None,
            context: None,
        }
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn gate(&self) -> &G {
        &self.gate
    }

    pub fn arbiter(&self) -> Option<&LocationArbiter<S>> {
        self.arbiter.as_ref()
    }

    /// True while a command is waiting for its reply.
    pub fn is_pending(&self) -> bool {
        self.context.is_some()
    }

    /// Run a command. Returns `false` for unknown actions.
    pub fn execute(&mut self, action: &str, context: impl CallbackContext + 'static) -> bool {
        debug!(action, "execute");
        let action = match action.parse::<Action>() {
            Ok(a) => a,
            Err(e) => {
                warn!("{}", e);
                return false;
            }
        };
        self.context = Some(Box::new(context));

        match action {
            Action::GetPermission => {
                if self.gate.has_all(&LOCATION_PERMISSIONS) {
                    self.reply(PluginResult::Ok);
                } else {
                    self.gate.request(PERMISSION_REQUEST, &LOCATION_PERMISSIONS);
                }
            }
            Action::GetCurrentPosition => {
                if self.gate.has_all(&LOCATION_PERMISSIONS) {
                    self.locate();
                } else {
                    self.gate.request(LOCATE_REQUEST, &LOCATION_PERMISSIONS);
                }
            }
        }
        true
    }

    /// Answer to a permission prompt. `grants[i]` is whether the i-th requested permission was granted.
    pub fn on_permission_result(&mut self, request_code: i32, grants: &[bool]) {
        if self.context.is_none() {
            return;
        }
        if grants.iter().any(|granted| !granted) {
            debug!("permission denied");
            self.reply(PluginResult::IllegalAccess);
            return;
        }
        if request_code == PERMISSION_REQUEST {
            self.reply(PluginResult::Ok);
        } else {
            self.locate();
        }
    }

    /// Process queued provider events and reply if a result is ready.
    /// Returns true when a reply was sent.
    pub fn poll(&mut self) -> bool {
        if let Some(arbiter) = self.arbiter.as_mut() {
            arbiter.pump();
        }
        self.drain_outcomes()
    }

    /// Wait until the pending command has been answered. Callers bound this
    /// with a timeout; a session with no incoming events never settles.
    pub async fn settle(&mut self) {
        self.poll();
        while self.context.is_some() {
            let arbiter = match self.arbiter.as_mut() {
                Some(a) if a.is_active() => a,
                _ => break,
            };
            arbiter.next_event().await;
            self.drain_outcomes();
        }
    }

    /// Tear down the session for good.
    pub fn destroy(&mut self) {
        if let Some(arbiter) = self.arbiter.as_mut() {
            arbiter.release();
        }
        self.outcomes = None;
        self.context = None;
    }

    fn locate(&mut self) {
        let config = self.config;
        let source = &self.source;
        let arbiter = self.arbiter.get_or_insert_with(|| {
            let mut arbiter = LocationArbiter::new(source.clone());
            arbiter.set_locate_mode(config.mode);
            arbiter.set_min_distance(config.min_distance_m);
            arbiter
        });

        // The listener is dropped after every answered command; put a fresh one in place.
        if !arbiter.has_listener() {
            let (listener, rx) = ChannelListener::new();
            arbiter.register_listener(listener);
            self.outcomes = Some(rx);
        }

        arbiter.set_time_interval(config.interval_ms);
        let started = arbiter.start();
        self.drain_outcomes();

        if !started && self.context.is_some() {
            warn!(mode = %config.mode, "no location provider could be started");
            self.finish(PluginResult::Error(LOCATE_FAILED_MESSAGE.to_string()));
        }
    }

    fn drain_outcomes(&mut self) -> bool {
        let outcome = match self.outcomes.as_mut().map(|rx| rx.try_recv()) {
            Some(Ok(outcome)) => outcome,
            _ => return false,
        };

        let result = match outcome {
            FixOutcome::Fixed(position) => success_result(&position),
            FixOutcome::Failed(reason) => {
                warn!(%reason, "location request failed");
                PluginResult::Error(LOCATE_FAILED_MESSAGE.to_string())
            }
        };
        self.finish(result);
        true
    }

    /// End the session: drop the listener, stop updates, send the reply.
    fn finish(&mut self, result: PluginResult) {
        if let Some(arbiter) = self.arbiter.as_mut() {
            arbiter.clear_listener();
            arbiter.stop();
        }
        self.outcomes = None;
        self.reply(result);
    }

    fn reply(&mut self, result: PluginResult) {
        if let Some(mut context) = self.context.take() {
            context.send(result);
        }
    }
}

fn success_result(position: &Position) -> PluginResult {
    match PositionPayload::try_from(position) {
        Ok(payload) => PluginResult::Position(payload),
        Err(e) => {
            warn!(error = %e, "could not build position payload");
            PluginResult::Error(PAYLOAD_FAILED_MESSAGE.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{FeedSource, ProviderStatus, GPS_PROVIDER, NETWORK_PROVIDER};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Replies(Arc<Mutex<Vec<PluginResult>>>);

    impl Replies {
        fn all(&self) -> Vec<PluginResult> {
            self.0.lock().unwrap().clone()
        }
    }

    impl CallbackContext for Replies {
        fn send(&mut self, result: PluginResult) {
            self.0.lock().unwrap().push(result);
        }
    }

    fn plugin(mode: ProviderMode, gate: StaticPermissions) -> (GeolocationPlugin<FeedSource, StaticPermissions>, FeedSource) {
        let feed = FeedSource::standard();
        let config = PluginConfig { mode, interval_ms: 0, min_distance_m: 0.0 };
        (GeolocationPlugin::with_config(feed.clone(), gate, config), feed)
    }

    fn error(msg: &str) -> PluginResult {
        PluginResult::Error(msg.to_string())
    }

    #[test]
    fn test_action_parse() {
        assert_eq!("getCurrentPosition2".parse::<Action>().unwrap(), Action::GetCurrentPosition);
        assert!("getCurrentPosition".parse::<Action>().is_err());
        assert_eq!(Action::GetPermission.to_string(), "getPermission");
    }

    #[test]
    fn test_default_config() {
        let config = PluginConfig::default();
        assert_eq!(config.interval_ms, PLUGIN_INTERVAL_MS);
        assert_eq!(config.mode, ProviderMode::Coarse);
    }

    #[test]
    fn test_unknown_action_returns_false() {
        let (mut plugin, _feed) = plugin(ProviderMode::Coarse, StaticPermissions::all());
        let replies = Replies::default();
        assert!(!plugin.execute("watchPosition", replies.clone()));
        assert!(replies.all().is_empty());
    }

    #[test]
    fn test_unknown_action_leaves_no_pending_reply() {
        let (mut plugin, _feed) = plugin(ProviderMode::Coarse, StaticPermissions::none());
        let stray = Replies::default();
        assert!(!plugin.execute("watchPosition", stray.clone()));
        assert!(!plugin.is_pending());

        plugin.on_permission_result(PERMISSION_REQUEST, &[true, true]);
        assert!(stray.all().is_empty());
    }

    #[test]
    fn test_get_permission_granted() {
        let (mut plugin, _feed) = plugin(ProviderMode::Coarse, StaticPermissions::all());
        let replies = Replies::default();
        assert!(plugin.execute("getPermission", replies.clone()));
        assert_eq!(replies.all(), vec![PluginResult::Ok]);
    }

    #[test]
    fn test_get_permission_prompts_then_acknowledges() {
        let (mut plugin, _feed) = plugin(ProviderMode::Coarse, StaticPermissions::none());
        let replies = Replies::default();
        assert!(plugin.execute("getPermission", replies.clone()));
        assert_eq!(plugin.gate().requests(), &[PERMISSION_REQUEST]);
        assert!(replies.all().is_empty());

        plugin.on_permission_result(PERMISSION_REQUEST, &[true, true]);
        assert_eq!(replies.all(), vec![PluginResult::Ok]);
    }

    #[test]
    fn test_permission_denied() {
        let (mut plugin, feed) = plugin(ProviderMode::Coarse, StaticPermissions::none());
        let replies = Replies::default();
        plugin.execute("getCurrentPosition2", replies.clone());
        plugin.on_permission_result(LOCATE_REQUEST, &[true, false]);

        assert_eq!(replies.all(), vec![PluginResult::IllegalAccess]);
        assert_eq!(feed.live_subscriptions(NETWORK_PROVIDER), 0);
    }

    #[test]
    fn test_permission_result_without_command_ignored() {
        let (mut plugin, _feed) = plugin(ProviderMode::Coarse, StaticPermissions::none());
        plugin.on_permission_result(LOCATE_REQUEST, &[true, true]);
        assert!(plugin.arbiter().is_none());
    }

    #[test]
    fn test_permission_granted_then_locates() {
        let (mut plugin, feed) = plugin(ProviderMode::Coarse, StaticPermissions::none());
        let replies = Replies::default();
        plugin.execute("getCurrentPosition2", replies.clone());
        assert_eq!(plugin.gate().requests(), &[LOCATE_REQUEST]);

        plugin.on_permission_result(LOCATE_REQUEST, &[true, true]);
        assert_eq!(feed.live_subscriptions(NETWORK_PROVIDER), 1);
        assert!(plugin.is_pending());
    }

    #[test]
    fn test_single_shot_reply_and_stop() {
        let (mut plugin, feed) = plugin(ProviderMode::Coarse, StaticPermissions::all());
        let replies = Replies::default();
        plugin.execute("getCurrentPosition2", replies.clone());
        assert!(!plugin.poll());

        feed.publish(Position::new(NETWORK_PROVIDER, 59.33, 18.07, 35.0, 1000).with_altitude(12.0));
        feed.publish(Position::new(NETWORK_PROVIDER, 59.34, 18.08, 20.0, 9000));
        assert!(plugin.poll());
        assert!(!plugin.poll());

        let all = replies.all();
        assert_eq!(all.len(), 1);
        match &all[0] {
            PluginResult::Position(p) => {
                assert_eq!(p.timestamp, 1000);
                assert_eq!(p.altitude, 12.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(feed.live_subscriptions(NETWORK_PROVIDER), 0);
        assert!(!plugin.arbiter().unwrap().has_listener());
    }

    #[test]
    fn test_second_request_gets_its_own_reply() {
        let (mut plugin, feed) = plugin(ProviderMode::Fine, StaticPermissions::all());
        let first = Replies::default();
        plugin.execute("getCurrentPosition2", first.clone());
        feed.publish(Position::new(GPS_PROVIDER, 1.0, 1.0, 5.0, 1000));
        plugin.poll();

        let second = Replies::default();
        plugin.execute("getCurrentPosition2", second.clone());
        feed.publish(Position::new(GPS_PROVIDER, 2.0, 2.0, 5.0, 2000));
        plugin.poll();

        assert_eq!(first.all().len(), 1);
        assert_eq!(second.all().len(), 1);
    }

    #[test]
    fn test_fine_provider_disabled_replies_error() {
        let (mut plugin, feed) = plugin(ProviderMode::Fine, StaticPermissions::all());
        feed.set_enabled(GPS_PROVIDER, false);
        let replies = Replies::default();
        plugin.execute("getCurrentPosition2", replies.clone());
        assert_eq!(replies.all(), vec![error(LOCATE_FAILED_MESSAGE)]);
        assert!(!plugin.is_pending());
    }

    #[test]
    fn test_both_disabled_replies_one_error() {
        let (mut plugin, feed) = plugin(ProviderMode::Both, StaticPermissions::all());
        feed.set_enabled(GPS_PROVIDER, false);
        feed.set_enabled(NETWORK_PROVIDER, false);
        let replies = Replies::default();
        plugin.execute("getCurrentPosition2", replies.clone());
        plugin.poll();
        assert_eq!(replies.all(), vec![error(LOCATE_FAILED_MESSAGE)]);
    }

    #[test]
    fn test_provider_fault_replies_error_and_stops() {
        let (mut plugin, feed) = plugin(ProviderMode::Both, StaticPermissions::all());
        let replies = Replies::default();
        plugin.execute("getCurrentPosition2", replies.clone());
        feed.set_status(GPS_PROVIDER, ProviderStatus::TemporarilyUnavailable);
        feed.publish(Position::new(NETWORK_PROVIDER, 1.0, 1.0, 30.0, 1000));
        plugin.poll();

        assert_eq!(replies.all(), vec![error(LOCATE_FAILED_MESSAGE)]);
        assert!(!plugin.arbiter().unwrap().is_active());
    }

    #[test]
    fn test_unserializable_fix_replies_parse_failed() {
        let (mut plugin, feed) = plugin(ProviderMode::Coarse, StaticPermissions::all());
        let replies = Replies::default();
        plugin.execute("getCurrentPosition2", replies.clone());
        feed.publish(Position::new(NETWORK_PROVIDER, 1.0, f64::INFINITY, 30.0, 1000));
        plugin.poll();
        assert_eq!(replies.all(), vec![error(PAYLOAD_FAILED_MESSAGE)]);
    }

    #[test]
    fn test_destroy_releases_arbiter() {
        let (mut plugin, feed) = plugin(ProviderMode::Both, StaticPermissions::all());
        let replies = Replies::default();
        plugin.execute("getCurrentPosition2", replies.clone());
        plugin.destroy();

        assert!(plugin.arbiter().unwrap().is_released());
        assert_eq!(feed.live_subscriptions(GPS_PROVIDER), 0);
        feed.publish(Position::new(GPS_PROVIDER, 1.0, 1.0, 5.0, 1000));
        assert!(!plugin.poll());
        assert!(replies.all().is_empty());
    }

    #[tokio::test]
    async fn test_settle_waits_for_fix() {
        let (mut plugin, feed) = plugin(ProviderMode::Both, StaticPermissions::all());
        let replies = Replies::default();
        plugin.execute("getCurrentPosition2", replies.clone());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            feed.publish(Position::new(GPS_PROVIDER, 21.4225, 39.8262, 3.0, 1000));
        });

        tokio::time::timeout(Duration::from_secs(5), plugin.settle()).await.unwrap();
        assert!(matches!(replies.all().as_slice(), [PluginResult::Position(_)]));
    }
}
