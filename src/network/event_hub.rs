use crate::network::{ChainEvent, LedgerError};
use log::{debug, info};
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

const EVENT_BUFFER: usize = 256;

/// Fan-out of committed chain events to subscribers while connected.
pub struct EventHub {
    channel: Mutex<Option<(String, broadcast::Sender<ChainEvent>)>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            channel: Mutex::new(None),
        }
    }

    pub fn connect(&self, address: &str) -> Result<(), LedgerError> {
        let mut channel = self.channel.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((current, _)) = channel.as_ref() {
            debug!("eventHub already connected to {}", current);
            return Ok(());
        }
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        *channel = Some((address.to_string(), tx));
        info!("eventHub connected to {}", address);
        Ok(())
    }

    /// Drops the sender so every subscriber observes the stream closing.
    pub fn disconnect(&self) {
        let previous = self
            .channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((address, _)) = previous {
            info!("eventHub disconnected from {}", address);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn subscribe(&self) -> Result<broadcast::Receiver<ChainEvent>, LedgerError> {
        self.channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(_, tx)| tx.subscribe())
            .ok_or(LedgerError::EventHubNotConnected)
    }

    /// Publishes to current subscribers; returns how many received it.
    pub fn publish(&self, event: ChainEvent) -> usize {
        let channel = self.channel.lock().unwrap_or_else(PoisonError::into_inner);
        let Some((_, tx)) = channel.as_ref() else {
            return 0;
        };
        tx.send(event).unwrap_or(0)
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
