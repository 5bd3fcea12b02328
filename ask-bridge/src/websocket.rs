use crate::handlers::AppState;
use crate::hub::{ClientAttached, ClientReady, InboundAction, QuestionHub};
use crate::transport::UiConnections;
use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use shared_types::{InboundMessage, OutboundMessage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Outbound message addressed to one connection
#[derive(Message)]
#[rtype(result = "()")]
pub struct ClientMessage(pub OutboundMessage);

/// WebSocket connection actor for one UI client
pub struct WebSocketConnection {
    client_id: String,
    /// Last heartbeat time
    hb: Instant,
    server: Addr<WebSocketServer>,
    hub: Addr<QuestionHub>,
}

impl WebSocketConnection {
    pub fn new(server: Addr<WebSocketServer>, hub: Addr<QuestionHub>) -> Self {
        Self {
            client_id: Uuid::new_v4().to_string(),
            hb: Instant::now(),
            server,
            hub,
        }
    }

    fn hb(&self, ctx: &mut <Self as Actor>::Context) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(
                    client_id = %act.client_id,
                    "WebSocket client failed heartbeat, disconnecting"
                );
                ctx.stop();
                return;
            }

            ctx.ping(b"");
        });
    }

    fn send_json(ctx: &mut <Self as Actor>::Context, message: &OutboundMessage) {
        match serde_json::to_string(message) {
            Ok(json) => ctx.text(json),
            Err(e) => tracing::error!("Failed to serialize outbound message: {e}"),
        }
    }

    fn handle_inbound(&self, message: InboundMessage, ctx: &mut <Self as Actor>::Context) {
        match message {
            InboundMessage::Ping => Self::send_json(ctx, &OutboundMessage::Pong),
            InboundMessage::Ready => {
                tracing::debug!(client_id = %self.client_id, "UI client ready");
                self.hub.do_send(ClientReady {
                    client_id: self.client_id.clone(),
                });
            }
            InboundMessage::Action(action) => {
                tracing::debug!(
                    client_id = %self.client_id,
                    action = ?action.action_id,
                    surface_id = %action.surface_id,
                    "UI action received"
                );
                self.hub.do_send(InboundAction(action));
            }
        }
    }
}

impl Actor for WebSocketConnection {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(client_id = %self.client_id, "WebSocket connection started");

        self.hb(ctx);

        self.server.do_send(Connect {
            client_id: self.client_id.clone(),
            addr: ctx.address(),
        });

        Self::send_json(
            ctx,
            &OutboundMessage::Connected {
                client_id: self.client_id.clone(),
            },
        );

        self.hub.do_send(ClientAttached {
            client_id: self.client_id.clone(),
        });
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        tracing::info!(client_id = %self.client_id, "WebSocket connection stopping");

        self.server.do_send(Disconnect {
            client_id: self.client_id.clone(),
        });

        Running::Stop
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WebSocketConnection {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                match serde_json::from_str::<InboundMessage>(&text) {
                    Ok(message) => self.handle_inbound(message, ctx),
                    Err(e) => {
                        tracing::warn!(client_id = %self.client_id, "Failed to parse WebSocket message: {e}");
                        Self::send_json(
                            ctx,
                            &OutboundMessage::Error {
                                message: format!("Invalid message format: {e}"),
                            },
                        );
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::debug!("Binary message received (ignored)");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(client_id = %self.client_id, "WebSocket connection closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            _ => {
                ctx.stop();
            }
        }
    }
}

impl Handler<ClientMessage> for WebSocketConnection {
    type Result = ();

    fn handle(&mut self, msg: ClientMessage, ctx: &mut Self::Context) {
        Self::send_json(ctx, &msg.0);
    }
}

/// Tracks every attached UI connection
#[derive(Debug, Default)]
pub struct WebSocketServer {
    connections: HashMap<String, Addr<WebSocketConnection>>,
    /// Shared with `WebSocketBroadcaster` so the hub can check for attached UIs synchronously
    clients: Arc<AtomicUsize>,
}

impl WebSocketServer {
    pub fn client_counter(&self) -> Arc<AtomicUsize> {
        self.clients.clone()
    }

    fn update_count(&self) {
        self.clients.store(self.connections.len(), Ordering::SeqCst);
    }
}

impl Actor for WebSocketServer {
    type Context = Context<Self>;
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub client_id: String,
    pub addr: Addr<WebSocketConnection>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub client_id: String,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Broadcast {
    pub message: OutboundMessage,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct SendToClient {
    pub client_id: String,
    pub message: OutboundMessage,
}

impl Handler<Connect> for WebSocketServer {
    type Result = ();

    fn handle(&mut self, msg: Connect, _: &mut Self::Context) {
        tracing::info!(client_id = %msg.client_id, "WebSocket client connected");
        self.connections.insert(msg.client_id, msg.addr);
        self.update_count();
    }
}

impl Handler<Disconnect> for WebSocketServer {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Self::Context) {
        tracing::info!(client_id = %msg.client_id, "WebSocket client disconnected");
        self.connections.remove(&msg.client_id);
        self.update_count();
    }
}

impl Handler<Broadcast> for WebSocketServer {
    type Result = ();

    fn handle(&mut self, msg: Broadcast, _: &mut Self::Context) {
        tracing::debug!("Broadcasting message to {} clients", self.connections.len());

        let mut to_remove = Vec::new();
        for (client_id, addr) in &self.connections {
            if addr.try_send(ClientMessage(msg.message.clone())).is_err() {
                tracing::warn!(client_id = %client_id, "Failed to send message to client");
                to_remove.push(client_id.clone());
            }
        }

        for client_id in to_remove {
            self.connections.remove(&client_id);
        }
        self.update_count();
    }
}

impl Handler<SendToClient> for WebSocketServer {
    type Result = ();

    fn handle(&mut self, msg: SendToClient, _: &mut Self::Context) {
        if let Some(addr) = self.connections.get(&msg.client_id) {
            if addr.try_send(ClientMessage(msg.message)).is_err() {
                tracing::warn!(client_id = %msg.client_id, "Failed to send message to client");
                self.connections.remove(&msg.client_id);
                self.update_count();
            }
        } else {
            tracing::warn!(client_id = %msg.client_id, "Client not found for direct message");
        }
    }
}

/// `UiConnections` backed by the WebSocket server actor
#[derive(Clone)]
pub struct WebSocketBroadcaster {
    server: Addr<WebSocketServer>,
    clients: Arc<AtomicUsize>,
}

impl WebSocketBroadcaster {
    pub fn new(server: Addr<WebSocketServer>, clients: Arc<AtomicUsize>) -> Self {
        Self { server, clients }
    }
}

impl UiConnections for WebSocketBroadcaster {
    fn connected_clients(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }

    fn broadcast(&self, message: OutboundMessage) {
        self.server.do_send(Broadcast { message });
    }

    fn send_to(&self, client_id: &str, message: OutboundMessage) {
        self.server.do_send(SendToClient {
            client_id: client_id.to_string(),
            message,
        });
    }
}

/// WebSocket endpoint handler
pub async fn websocket_handler(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    tracing::debug!("WebSocket connection request received");

    ws::start(
        WebSocketConnection::new(data.ws_server.clone(), data.hub.clone()),
        &req,
        stream,
    )
}
