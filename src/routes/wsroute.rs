use crate::middleware::auth::{bearer_token, SharedVerifier};
use crate::state::AppState;
use crate::websocket::handlers::handle_text;
use crate::websocket::ConnectionId;
use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

// Frame pushed to the client: room events and direct replies
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct BroadcastMessage(String);

// WebSocket Actor
struct WsSession {
    conn: ConnectionId,
    user_id: Uuid,
    state: AppState,
    hb: Instant,
}

impl WsSession {
    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let interval = Duration::from_secs(self.state.ws.heartbeat_interval_secs);
        let timeout = Duration::from_secs(self.state.ws.client_timeout_secs);
        ctx.run_interval(interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                tracing::warn!(connection = %act.conn, user_id = %act.user_id, "websocket heartbeat failed, disconnecting");
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
        tracing::info!(connection = %self.conn, user_id = %self.user_id, "websocket session started");
        self.hb(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(connection = %self.conn, user_id = %self.user_id, "websocket session stopped");

        // Leaving every room is the only state change on disconnect
        let registry = self.state.registry.clone();
        let conn = self.conn;
        actix::spawn(async move {
            registry.disconnect(conn).await;
        });
    }
}

impl Handler<BroadcastMessage> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: BroadcastMessage, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
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
                let state = self.state.clone();
                let conn = self.conn;
                let user_id = self.user_id;
                let text = text.to_string();
                let addr = ctx.address();
                actix::spawn(async move {
                    if let Some(reply) = handle_text(&state, conn, user_id, &text).await {
                        addr.do_send(BroadcastMessage(reply));
                    }
                });
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!(connection = %self.conn, "binary websocket frames not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(connection = %self.conn, ?reason, "websocket close received");
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                tracing::warn!(connection = %self.conn, error = %e, "websocket protocol error");
                ctx.stop();
            }
            _ => {}
        }
    }
}

/// Resolve the handshake credential: `?token=` first, then the bearer header.
fn authenticate(
    params: &WsParams,
    req: &HttpRequest,
    verifier: &SharedVerifier,
) -> Result<Uuid, actix_web::http::StatusCode> {
    let token = params
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(req));

    match token {
        None => {
            tracing::warn!("websocket connection rejected: no token provided");
            Err(actix_web::http::StatusCode::UNAUTHORIZED)
        }
        Some(t) => verifier.verify(t).map_err(|e| {
            tracing::warn!(error = %e, "websocket connection rejected: invalid token");
            actix_web::http::StatusCode::UNAUTHORIZED
        }),
    }
}

#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    verifier: web::Data<SharedVerifier>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let user_id = match authenticate(&query, &req, &verifier) {
        Ok(id) => id,
        Err(status) => return Ok(HttpResponse::build(status).finish()),
    };

    let (conn, mut rx) = state.registry.register(user_id).await;
    let session = WsSession {
        conn,
        user_id,
        state: state.get_ref().clone(),
        hb: Instant::now(),
    };

    let (addr, resp) = match ws::WsResponseBuilder::new(session, &req, stream).start_with_addr() {
        Ok(started) => started,
        Err(e) => {
            state.registry.disconnect(conn).await;
            return Err(e);
        }
    };

    // Bridge the registry's receiver into the actor's mailbox
    actix::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if !addr.connected() {
                break;
            }
            addr.do_send(BroadcastMessage(payload));
        }
    });

    Ok(resp)
}
