//! Fan-out presentation sink backed by a tokio broadcast channel

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{PresentationEvent, PresentationSink};
use crate::Result;

/// Publishes presentation events to every subscribed UI client
///
/// Having no subscribers is not an error: the gateway keeps running with
/// no browser attached.
#[derive(Debug, Clone)]
pub struct BroadcastPresenter {
    tx: broadcast::Sender<PresentationEvent>,
}

impl BroadcastPresenter {
    /// Create a presenter buffering up to `capacity` events per slow client
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe a new client
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PresentationEvent> {
        self.tx.subscribe()
    }

    /// Number of connected clients
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl PresentationSink for BroadcastPresenter {
    async fn present(&self, event: PresentationEvent) -> Result<()> {
        if let Err(broadcast::error::SendError(event)) = self.tx.send(event) {
            tracing::trace!(?event, "no presentation clients connected");
        }
        Ok(())
    }
}
