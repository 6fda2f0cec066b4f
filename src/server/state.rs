use crate::location::FeedSource;
use crate::plugin::PluginConfig;
use std::time::Duration;

pub struct AppState {
    /// Providers push into this; every position request subscribes to it.
    pub feed: FeedSource,
    pub config: PluginConfig,
    pub default_timeout: Duration,
}
