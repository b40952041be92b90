//! Channel-backed live connections
//!
//! Transport adapters (WebSocket, SSE) hold a [`Connection`] and forward what
//! it receives. The hub side is a [`ChannelListener`] whose liveness is the
//! state of the channel: once the receiver is gone the listener is dead.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use uuid::Uuid;

use crate::domain::events::ContextEvent;

use super::hub::{DeliveryError, Listener, Subscription};

/// Hub-side end of a connection
#[derive(Debug)]
pub struct ChannelListener {
    tx: mpsc::Sender<ContextEvent>,
}

impl ChannelListener {
    pub fn new(tx: mpsc::Sender<ContextEvent>) -> Self {
        Self { tx }
    }
}

impl Listener for ChannelListener {
    fn deliver(&self, event: &ContextEvent) -> Result<(), DeliveryError> {
        match self.tx.try_send(event.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DeliveryError::Full),
            Err(TrySendError::Closed(_)) => Err(DeliveryError::Closed),
        }
    }

    fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Transport-side end of a connection
#[derive(Debug)]
pub struct Connection {
    id: String,
    project_id: String,
    rx: mpsc::Receiver<ContextEvent>,
    subscription: Subscription,
}

impl Connection {
    pub(crate) fn new(
        project_id: &str,
        rx: mpsc::Receiver<ContextEvent>,
        subscription: Subscription,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            rx,
            subscription,
        }
    }

    /// Unique connection id
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Wait for the next event; `None` once the connection is closed
    pub async fn recv(&mut self) -> Option<ContextEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is queued
    pub fn try_recv(&mut self) -> Option<ContextEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Drain everything queued right now
    pub fn drain(&mut self) -> Vec<ContextEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }

    /// Deregister from the hub and close the channel
    pub fn close(mut self) {
        self.subscription.unsubscribe();
        self.rx.close();
    }
}
