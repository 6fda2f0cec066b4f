//! Listener contract between the arbiter and its host.

use super::types::{FailureReason, Position};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Receives the arbiter's signals. How many signals a host accepts per
/// activation is the host's decision; the arbiter only reports.
pub trait FixListener: Send {
    /// A usable reading is available.
    fn on_success(&mut self, position: &Position);

    /// No usable reading can be produced.
    fn on_failure(&mut self, reason: &FailureReason);
}

/// What a [`ChannelListener`] forwards.
#[derive(Debug)]
pub enum FixOutcome {
    Fixed(Position),
    Failed(FailureReason),
}

/// Listener that forwards signals over a channel, so the host can react
/// (e.g. stop the arbiter) outside the callback.
pub struct ChannelListener {
    tx: UnboundedSender<FixOutcome>,
}

impl ChannelListener {
    pub fn new() -> (Self, UnboundedReceiver<FixOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl FixListener for ChannelListener {
    fn on_success(&mut self, position: &Position) {
        let _ = self.tx.send(FixOutcome::Fixed(position.clone()));
    }

    fn on_failure(&mut self, reason: &FailureReason) {
        let _ = self.tx.send(FixOutcome::Failed(reason.clone()));
    }
}
