use crate::config::WsConfig;
use crate::state::AppState;
use crate::websocket::{ClientEvent, RealtimeHub, ServerEvent, SessionHandle, SessionId};
use actix::{Actor, ActorContext, AsyncContext, StreamHandler, WrapFuture};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

// WebSocket Actor
struct WsSession {
    user_id: Uuid,
    session_id: SessionId,
    hub: Arc<RealtimeHub>,
    // Handed to the registry once the actor starts
    handle: Option<SessionHandle>,
    outbound: Option<UnboundedReceiver<ServerEvent>>,
    hb: Instant,
    ws: WsConfig,
}

impl WsSession {
    fn new(user_id: Uuid, hub: Arc<RealtimeHub>, ws: WsConfig) -> Self {
        let (tx, rx) = unbounded_channel();
        let session_id = SessionId::new();
        Self {
            user_id,
            session_id,
            hub,
            handle: Some(SessionHandle::new(session_id, tx)),
            outbound: Some(rx),
            hb: Instant::now(),
            ws,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.ws.client_timeout;
        ctx.run_interval(self.ws.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                tracing::warn!(
                    user_id = %act.user_id,
                    session_id = %act.session_id,
                    "WebSocket heartbeat failed, disconnecting"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);

        if let Some(rx) = self.outbound.take() {
            ctx.add_stream(UnboundedReceiverStream::new(rx));
        }

        // Registration finishes before any client frame is handled
        if let Some(handle) = self.handle.take() {
            let hub = self.hub.clone();
            let user_id = self.user_id;
            ctx.wait(async move { hub.connect(user_id, handle).await }.into_actor(self));
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let hub = self.hub.clone();
        let user_id = self.user_id;
        let session_id = self.session_id;
        actix::spawn(async move {
            hub.disconnect(user_id, session_id).await;
        });
    }
}

/// Server events queued for this session
impl StreamHandler<ServerEvent> for WsSession {
    fn handle(&mut self, event: ServerEvent, ctx: &mut Self::Context) {
        match serde_json::to_string(&event) {
            Ok(text) => ctx.text(text),
            Err(e) => tracing::error!(
                user_id = %self.user_id,
                event = event.name(),
                error = %e,
                "failed to encode server event"
            ),
        }
    }

    // A replaced session stays open but is no longer reachable
    fn finished(&mut self, _ctx: &mut Self::Context) {
        tracing::debug!(
            user_id = %self.user_id,
            session_id = %self.session_id,
            "outbound channel closed"
        );
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(bytes)) => {
                self.hb = Instant::now();
                ctx.pong(&bytes);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        let hub = self.hub.clone();
                        let user_id = self.user_id;
                        ctx.wait(
                            async move {
                                hub.handle_client_event(user_id, event).await;
                            }
                            .into_actor(self),
                        );
                    }
                    Err(e) => {
                        tracing::debug!(
                            user_id = %self.user_id,
                            error = %e,
                            "ignoring unparseable frame"
                        );
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::debug!(user_id = %self.user_id, "ignoring binary frame");
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                ctx.stop();
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// Upgrade to WebSocket; the credential is checked before the handshake
#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let user_id = state.authenticator.authenticate_upgrade(&req)?;

    let session = WsSession::new(user_id, state.hub.clone(), state.config.ws);
    tracing::info!(
        user_id = %user_id,
        session_id = %session.session_id,
        "WebSocket connection accepted"
    );

    ws::start(session, &req, stream)
}
