use actix::{Actor, ActorContext, Addr, AsyncContext, Handler, StreamHandler};
use actix_web::{HttpRequest, HttpResponse, web, Error};
use actix_web_actors::ws;

use super::server::{Broadcaster, Push, Subscribe, Unsubscribe};

pub async fn ws_route(
    req: HttpRequest,
    stream: web::Payload,
    srv: web::Data<Addr<Broadcaster>>,
) -> Result<HttpResponse, Error> {
    ws::start(WsSession { server: srv.get_ref().clone() }, &req, stream)
}

/// One connected viewer. The push channel is one-way: the session joins
/// the broadcaster on connect, relays payloads out, and ignores client
/// text frames (state changes go through the HTTP routes).
pub struct WsSession {
    pub server: Addr<Broadcaster>,
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.server.do_send(Subscribe { addr: ctx.address().recipient() });
    }

    fn stopped(&mut self, ctx: &mut Self::Context) {
        self.server.do_send(Unsubscribe { addr: ctx.address().recipient() });
    }
}

impl Handler<Push> for WsSession {
    type Result = ();
    fn handle(&mut self, msg: Push, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(bytes)) => ctx.pong(&bytes),
            Ok(ws::Message::Close(_)) => ctx.stop(),
            _ => {}
        }
    }
}
