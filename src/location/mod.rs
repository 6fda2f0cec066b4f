//! Location acquisition subsystem.
//!
//! Subscribes to satellite and network providers, reconciles their cached
//! readings, tracks provider availability, and reports fixes or failures to a
//! single listener.

pub mod arbiter;
pub mod feed;
pub mod listener;
pub mod policy;
pub mod source;
pub mod types;

pub use arbiter::{LocationArbiter, DEFAULT_INTERVAL_MS};
pub use feed::FeedSource;
pub use listener::{ChannelListener, FixListener, FixOutcome};
pub use policy::{is_better, pick_better};
pub use source::{EventSink, ProviderSource, SubscriptionHandle, GPS_PROVIDER, NETWORK_PROVIDER};
pub use types::{
    Availability, FailureReason, LocationError, Position, ProviderEvent, ProviderMode, ProviderStatus,
};
