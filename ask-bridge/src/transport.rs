//! Outbound delivery of surfaces and cancel notices.
//!
//! If any UI connection is attached to this process the message is broadcast
//! directly; otherwise it is POSTed once to the UI-hosting peer process.
//! Forwarding is fire-and-forget: failures are logged, never returned.

use crate::error::{AppError, AppResult};
use shared_types::{CancelNotice, OutboundMessage, SurfaceMessage};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// UI connections attached to this process
pub trait UiConnections: Send + Sync {
    fn connected_clients(&self) -> usize;
    fn broadcast(&self, message: OutboundMessage);
    fn send_to(&self, client_id: &str, message: OutboundMessage);
}

/// Best-effort one-shot delivery to the UI-hosting process
pub trait SurfaceForwarder: Send + Sync {
    fn forward(&self, message: OutboundMessage);
}

/// Which path an outbound message took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Broadcast,
    Forwarded,
    /// No local UI and no peer configured; the message only lives in the replay buffer
    Dropped,
}

pub struct TransportBridge {
    connections: Arc<dyn UiConnections>,
    forwarder: Option<Arc<dyn SurfaceForwarder>>,
    recent: VecDeque<SurfaceMessage>,
    capacity: usize,
}

impl TransportBridge {
    pub fn new(
        connections: Arc<dyn UiConnections>,
        forwarder: Option<Arc<dyn SurfaceForwarder>>,
        capacity: usize,
    ) -> Self {
        Self {
            connections,
            forwarder,
            recent: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn has_local_connections(&self) -> bool {
        self.connections.connected_clients() > 0
    }

    /// Deliver a surface over whichever path is available right now
    pub fn deliver_surface(&mut self, surface: SurfaceMessage) -> Route {
        if self.has_local_connections() {
            self.broadcast_surface(surface);
            return Route::Broadcast;
        }

        self.remember(surface.clone());
        self.route_remote(OutboundMessage::Surface(surface))
    }

    /// Broadcast to every local connection, without considering the peer
    pub fn broadcast_surface(&mut self, surface: SurfaceMessage) {
        tracing::debug!(
            surface_id = %surface.surface_id,
            clients = self.connections.connected_clients(),
            "Broadcasting surface"
        );
        self.remember(surface.clone());
        self.connections.broadcast(OutboundMessage::Surface(surface));
    }

    pub fn send_surface_to(&self, client_id: &str, surface: SurfaceMessage) {
        self.connections
            .send_to(client_id, OutboundMessage::Surface(surface));
    }

    /// Send buffered surfaces that are still open to a newly attached client
    pub fn replay_buffered_surfaces<F>(&self, client_id: &str, is_open: F) -> usize
    where
        F: Fn(&SurfaceMessage) -> bool,
    {
        let mut replayed = 0;
        for surface in self.recent.iter().filter(|surface| is_open(surface)) {
            self.send_surface_to(client_id, surface.clone());
            replayed += 1;
        }
        if replayed > 0 {
            tracing::info!(client_id, replayed, "Replayed buffered surfaces");
        }
        replayed
    }

    pub fn deliver_cancel(&mut self, notice: CancelNotice) -> Route {
        self.forget_surface(&notice.surface_id);
        if self.has_local_connections() {
            self.connections.broadcast(OutboundMessage::Cancel(notice));
            return Route::Broadcast;
        }
        self.route_remote(OutboundMessage::Cancel(notice))
    }

    /// Rebroadcast a cancel locally, without considering the peer
    pub fn broadcast_cancel(&mut self, notice: CancelNotice) {
        self.forget_surface(&notice.surface_id);
        self.connections.broadcast(OutboundMessage::Cancel(notice));
    }

    pub fn forget_surface(&mut self, surface_id: &str) {
        self.recent.retain(|surface| surface.surface_id != surface_id);
    }

    pub fn buffered(&self) -> usize {
        self.recent.len()
    }

    fn remember(&mut self, surface: SurfaceMessage) {
        if self.capacity == 0 {
            return;
        }
        self.recent
            .retain(|buffered| buffered.surface_id != surface.surface_id);
        while self.recent.len() >= self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(surface);
    }

    fn route_remote(&self, message: OutboundMessage) -> Route {
        match &self.forwarder {
            Some(forwarder) => {
                forwarder.forward(message);
                Route::Forwarded
            }
            None => {
                tracing::warn!("No UI connection attached and no peer configured; holding message for replay");
                Route::Dropped
            }
        }
    }
}

/// Forwards messages to the peer's `/api/bridge/messages` endpoint over HTTP
pub struct HttpForwarder {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpForwarder {
    pub fn new(peer_url: &str, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/bridge/messages", peer_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl SurfaceForwarder for HttpForwarder {
    fn forward(&self, message: OutboundMessage) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!("Cannot forward message outside a runtime: {e}");
                return;
            }
        };

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        runtime.spawn(async move {
            match client.post(&endpoint).json(&message).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(endpoint = %endpoint, "Forwarded message to peer");
                }
                Ok(response) => {
                    tracing::warn!(
                        endpoint = %endpoint,
                        status = %response.status(),
                        "Peer rejected forwarded message"
                    );
                }
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint, error = %e, "Failed to forward message to peer");
                }
            }
        });
    }
}
