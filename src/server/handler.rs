// src/server/handler.rs
use futures::future::BoxFuture;
use hyper::{Body, Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::Service;

use crate::server::Server;

/// Per-connection service handed to hyper. Remembers the client address so
/// the server can apply its forwarding header policy.
#[derive(Clone)]
pub struct RequestHandler {
    server: Arc<Server>,
    peer: SocketAddr,
}

impl RequestHandler {
    pub fn new(server: Arc<Server>, peer: SocketAddr) -> Self {
        Self { server, peer }
    }
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let server = self.server.clone();
        let peer = self.peer;
        // Errors are already rendered as responses by the server.
        Box::pin(async move { Ok(server.serve(req, peer).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerBuilder;
    use tower::ServiceExt;

    #[tokio::test]
    async fn unconfigured_server_answers_through_service() {
        let server = Arc::new(ServerBuilder::new("127.0.0.1:0".parse().unwrap()).build());
        let handler = RequestHandler::new(server, "127.0.0.1:40000".parse().unwrap());

        let response = handler
            .oneshot(Request::get("/svc/x").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 503);
    }
}
