use crate::network::{Chain, LedgerError};
use log::info;
use std::sync::Arc;

/// Peer registration plus an open event hub connection. The event hub is
/// disconnected when the session is dropped, on every exit path.
pub struct ChainSession {
    chain: Arc<dyn Chain>,
    event_hub: String,
}

impl ChainSession {
    pub fn open(
        chain: Arc<dyn Chain>,
        peers: &[String],
        event_hub: &str,
    ) -> Result<Self, LedgerError> {
        for peer in peers {
            chain.add_peer(peer);
        }
        info!("Setting eventHubAddr address to: {}", event_hub);
        chain.event_hub_connect(event_hub)?;

        Ok(Self {
            chain,
            event_hub: event_hub.to_string(),
        })
    }
}

impl Drop for ChainSession {
    fn drop(&mut self) {
        info!("Exiting and disconnecting eventHub channel {}.", self.event_hub);
        self.chain.event_hub_disconnect();
    }
}
