//! Provider source abstraction: the platform side of the arbiter.

use super::types::{LocationError, Position, ProviderEvent};
use tokio::sync::mpsc::UnboundedSender;

/// Satellite-based provider.
pub const GPS_PROVIDER: &str = "gps";
/// Network (cell / Wi-Fi) provider.
pub const NETWORK_PROVIDER: &str = "network";

/// Opaque token returned by [`ProviderSource::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// An event tagged with the subscription generation it was delivered for.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub generation: u64,
    pub event: ProviderEvent,
}

/// Where a subscription sends its events. Cheap to clone; safe to use from any thread.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: UnboundedSender<Envelope>,
    generation: u64,
}

impl EventSink {
    pub(crate) fn new(tx: UnboundedSender<Envelope>, generation: u64) -> Self {
        Self { tx, generation }
    }

    /// Queue an event for the arbiter. Returns false once the arbiter is gone.
    pub fn deliver(&self, event: ProviderEvent) -> bool {
        self.tx
            .send(Envelope { generation: self.generation, event })
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Platform location service.
///
/// Implementations deliver updates asynchronously through the sink handed to
/// `subscribe`. They may keep delivering briefly after `unsubscribe`; the
/// arbiter drops such events.
pub trait ProviderSource: Send {
    fn is_provider_enabled(&self, provider: &str) -> bool;

    /// The most recent fix the provider has cached, if any.
    fn last_known_position(&self, provider: &str) -> Option<Position>;

    fn subscribe(
        &mut self,
        provider: &str,
        min_interval_ms: u64,
        min_distance_m: f64,
        sink: EventSink,
    ) -> Result<SubscriptionHandle, LocationError>;

    fn unsubscribe(&mut self, handle: SubscriptionHandle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_sink_tags_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx, 7);
        assert!(sink.deliver(ProviderEvent::ProviderEnabled(GPS_PROVIDER.into())));

        let env = rx.try_recv().unwrap();
        assert_eq!(env.generation, 7);
        assert_eq!(env.event, ProviderEvent::ProviderEnabled("gps".into()));
    }

    #[test]
    fn test_sink_reports_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx, 0);
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.deliver(ProviderEvent::ProviderDisabled(NETWORK_PROVIDER.into())));
    }
}
