//! Callback server builder
//!
//! Collects the crypt service, the outbound sender and the handlers, then
//! serves the callback endpoints. Handlers can only be registered before
//! [`CallbackServer::run`], the registry is read-only once serving.

use super::{
    PayloadFormat,
    client::{OutboundSender, WebhookClient},
    crypt::Crypt,
    dispatcher::{CallbackHandler, Dispatcher, HandlerRegistry},
    routes::{self, CallbackState},
    schemas::MsgType,
    verifier::CallbackVerifier,
};
use anyhow::Context;
use ntex::web;
use std::{net::ToSocketAddrs, sync::Arc};
use tracing::info;

pub struct CallbackServer {
    crypt: Arc<dyn Crypt>,
    format: PayloadFormat,
    sender: Arc<dyn OutboundSender>,
    registry: HandlerRegistry,
}

impl CallbackServer {
    /// Creates a server replying through a default [`WebhookClient`]
    pub fn new(crypt: Arc<dyn Crypt>, format: PayloadFormat) -> Self {
        Self {
            crypt,
            format,
            sender: Arc::new(WebhookClient::new()),
            registry: HandlerRegistry::new(),
        }
    }

    pub fn with_sender(mut self, sender: Arc<dyn OutboundSender>) -> Self {
        self.sender = sender;
        self
    }

    /// Registers `handler` for messages of `msg_type`
    pub fn on(mut self, msg_type: MsgType, handler: impl CallbackHandler + 'static) -> Self {
        self.registry.on(msg_type, handler);
        self
    }

    /// Registers `handler` for every message type
    pub fn on_all(mut self, handler: impl CallbackHandler + 'static) -> Self {
        self.registry.on_all(handler);
        self
    }

    /// Freezes the registry and builds the state shared by the endpoints
    pub fn state(self) -> CallbackState {
        CallbackState {
            verifier: CallbackVerifier::new(self.crypt),
            format: self.format,
            dispatcher: Arc::new(Dispatcher::new(self.registry, self.sender)),
        }
    }

    /// Serves the callback endpoints on `path` until the server stops
    pub async fn run(self, addr: impl ToSocketAddrs, path: &str) -> anyhow::Result<()> {
        let handlers = self.registry.len();
        let state = self.state();
        let path = path.to_string();

        info!(path = %path, handlers, "starting callback server");

        web::server(move || {
            let path = path.clone();
            web::App::new()
                .wrap(web::middleware::Logger::default())
                .state(state.clone())
                .configure(move |cfg| routes::configure(cfg, &path))
        })
        .bind(addr)
        .context("failed to bind callback server")?
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::{
        client::MockOutboundSender,
        crypt::MockCrypt,
        dispatcher::{CallbackContext, handler_fn},
    };
    use ntex::{http::StatusCode, web::test};

    fn noop() -> impl CallbackHandler + 'static {
        handler_fn(|_ctx: CallbackContext| async move { Ok(()) })
    }

    #[test]
    fn test_builder_collects_handlers() {
        let state = CallbackServer::new(Arc::new(MockCrypt::new()), PayloadFormat::Json)
            .with_sender(Arc::new(MockOutboundSender::new()))
            .on(MsgType::Text, noop())
            .on(MsgType::Event, noop())
            .on_all(noop())
            .state();

        assert_eq!(state.format, PayloadFormat::Json);
        assert_eq!(state.dispatcher.registry().len(), 3);
    }

    #[ntex::test]
    async fn test_state_serves_configured_path() {
        let mut crypt = MockCrypt::new();
        crypt
            .expect_verify_url()
            .returning(|_, _, _, _| Ok(b"echo".to_vec()));

        let state = CallbackServer::new(Arc::new(crypt), PayloadFormat::Xml)
            .with_sender(Arc::new(MockOutboundSender::new()))
            .state();
        let app = test::init_service(
            web::App::new()
                .state(state)
                .configure(|cfg| routes::configure(cfg, "/robot/callback")),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/robot/callback?msg_signature=s&timestamp=t&nonce=n&echostr=e")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/other").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
