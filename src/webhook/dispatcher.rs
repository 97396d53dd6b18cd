//! # Callback Dispatcher
//!
//! Routes validated callback messages to the handlers registered for their type.
//!
//! Each inbound message goes through:
//! 1. **Received**: a [`RawCallbackMessage`] straight from the parser
//! 2. **TypeValidated**: the payload named by `MsgType` is present, otherwise the
//!    message is rejected with [`CallbackError::MalformedEnvelope`] and no handler runs
//! 3. **Dispatching**: wildcard handlers run first, then handlers of the message
//!    type, each group in registration order
//! 4. **Completed**: every matching handler ran; failures are collected in the
//!    [`DispatchReport`] and never stop the next handler
//!
//! A message type nobody subscribed to is not an error, it is dropped.

use super::{
    client::{OutboundSender, WebhookResponse},
    outgoing_schemas::OutgoingMessage,
    reply::ReplyOption,
    schemas::{CallbackMessage, MsgType, Payload, RawCallbackMessage},
};
use crate::errors::CallbackError;
use async_trait::async_trait;
use futures::FutureExt;
use std::{collections::HashMap, future::Future, panic::AssertUnwindSafe, sync::Arc};
use tracing::{debug, error, info};

/// Everything a handler gets for one message
#[derive(Clone)]
pub struct CallbackContext {
    pub message: Arc<CallbackMessage>,
    pub sender: Arc<dyn OutboundSender>,
}

impl CallbackContext {
    /// Sends `message` to the webhook URL of the incoming message, in its chat and thread.
    ///
    /// Options are applied after the chat target, so they can override it.
    pub async fn reply(
        &self,
        mut message: OutgoingMessage,
        options: Vec<ReplyOption>,
    ) -> anyhow::Result<WebhookResponse> {
        if self.message.webhook_url.is_empty() {
            anyhow::bail!("msg {} has no webhook url to reply to", self.message.msg_id);
        }

        message.apply(ReplyOption::reply_to_chat(&self.message));
        message.apply_all(options);

        self.sender.send(&self.message.webhook_url, &message).await
    }

    pub async fn reply_text(&self, content: impl Into<String>) -> anyhow::Result<WebhookResponse> {
        self.reply(OutgoingMessage::text(content), Vec::new()).await
    }

    pub async fn reply_markdown(
        &self,
        content: impl Into<String>,
    ) -> anyhow::Result<WebhookResponse> {
        self.reply(OutgoingMessage::markdown(content), Vec::new()).await
    }
}

/// Application logic invoked for a callback message
#[async_trait]
pub trait CallbackHandler: Send + Sync {
    async fn handle(&self, ctx: CallbackContext) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into a [`CallbackHandler`]
pub struct HandlerFn<F>(F);

/// Wraps `f` so it can be registered as a handler.
///
/// ```no_run
/// use webhook_bot::webhook::dispatcher::{CallbackContext, handler_fn};
///
/// let pong = handler_fn(|ctx: CallbackContext| async move {
///     ctx.reply_text("pong").await?;
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(CallbackContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> CallbackHandler for HandlerFn<F>
where
    F: Fn(CallbackContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, ctx: CallbackContext) -> anyhow::Result<()> {
        (self.0)(ctx).await
    }
}

struct RegisteredHandler {
    label: String,
    handler: Arc<dyn CallbackHandler>,
}

/// Handlers by message type, plus wildcard handlers that see every message.
///
/// Filled before the server starts; the dispatcher only reads it afterwards.
#[derive(Default)]
pub struct HandlerRegistry {
    wildcard: Vec<RegisteredHandler>,
    by_type: HashMap<MsgType, Vec<RegisteredHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for messages of `msg_type`, after the ones already registered
    pub fn on(&mut self, msg_type: MsgType, handler: impl CallbackHandler + 'static) -> &mut Self {
        let handlers = self.by_type.entry(msg_type.clone()).or_default();
        handlers.push(RegisteredHandler {
            label: format!("{msg_type}[{}]", handlers.len()),
            handler: Arc::new(handler),
        });
        self
    }

    /// Registers `handler` for every message type
    pub fn on_all(&mut self, handler: impl CallbackHandler + 'static) -> &mut Self {
        self.wildcard.push(RegisteredHandler {
            label: format!("*[{}]", self.wildcard.len()),
            handler: Arc::new(handler),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.wildcard.len() + self.by_type.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matching<'a>(&'a self, msg_type: &MsgType) -> impl Iterator<Item = &'a RegisteredHandler> {
        self.wildcard
            .iter()
            .chain(self.by_type.get(msg_type).into_iter().flatten())
    }

    fn has_type(&self, msg_type: &MsgType) -> bool {
        self.by_type.contains_key(msg_type)
    }
}

/// A handler that returned an error or panicked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub label: String,
    pub error: String,
}

/// Outcome of dispatching one message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub msg_id: String,
    /// Labels of the invoked handlers, in invocation order
    pub invoked: Vec<String>,
    pub failures: Vec<HandlerFailure>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Dispatcher {
    registry: HandlerRegistry,
    sender: Arc<dyn OutboundSender>,
}

impl Dispatcher {
    pub fn new(registry: HandlerRegistry, sender: Arc<dyn OutboundSender>) -> Self {
        Self { registry, sender }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Checks that the payload required by `MsgType` is present and builds the typed message.
    ///
    /// # Errors
    ///
    /// [`CallbackError::MalformedEnvelope`] when `MsgType` is empty or its payload is absent.
    pub fn validate(raw: RawCallbackMessage) -> Result<CallbackMessage, CallbackError> {
        let RawCallbackMessage {
            webhook_url,
            callback_id,
            chat_id,
            post_id,
            chat_type,
            get_chat_info_url,
            msg_id,
            msg_type,
            from,
            app_version,
            text,
            image,
            event,
            attachment,
            interaction,
            modal_submit,
            mixed_message,
        } = raw;

        let msg_type = msg_type.trim();
        if msg_type.is_empty() {
            return Err(CallbackError::MalformedEnvelope {
                msg_id,
                reason: "missing MsgType".to_string(),
            });
        }

        let missing = |element: &str| CallbackError::MalformedEnvelope {
            msg_id: msg_id.clone(),
            reason: format!("msg type {msg_type:?} without {element} payload"),
        };

        let payload = match MsgType::from(msg_type) {
            MsgType::Text => Payload::Text(text.ok_or_else(|| missing("Text"))?),
            MsgType::Image => Payload::Image(image.ok_or_else(|| missing("Image"))?),
            MsgType::Event => Payload::Event(event.ok_or_else(|| missing("Event"))?),
            MsgType::Attachment => {
                Payload::Attachment(attachment.ok_or_else(|| missing("Attachment"))?)
            }
            MsgType::Interaction => {
                Payload::Interaction(interaction.ok_or_else(|| missing("Interaction"))?)
            }
            MsgType::ModalSubmit => {
                Payload::ModalSubmit(modal_submit.ok_or_else(|| missing("ModalSubmit"))?)
            }
            MsgType::Mixed => Payload::Mixed(mixed_message.ok_or_else(|| missing("MixedMessage"))?),
            MsgType::Other(name) => Payload::Other(name),
        };

        Ok(CallbackMessage {
            webhook_url,
            callback_id,
            chat_id,
            post_id,
            chat_type,
            get_chat_info_url,
            msg_id,
            from,
            app_version,
            payload,
        })
    }

    /// Invokes every handler matching the message, one after the other.
    ///
    /// Never fails: handler errors and panics are logged and reported.
    pub async fn dispatch(&self, message: Arc<CallbackMessage>) -> DispatchReport {
        let msg_type = message.msg_type();
        let mut report = DispatchReport {
            msg_id: message.msg_id.clone(),
            ..Default::default()
        };

        if !self.registry.has_type(&msg_type) {
            debug!(
                msg_id = %message.msg_id,
                "ignore msg type {msg_type:?} which is not registered"
            );
        }

        for entry in self.registry.matching(&msg_type) {
            let ctx = CallbackContext {
                message: message.clone(),
                sender: self.sender.clone(),
            };
            report.invoked.push(entry.label.clone());

            let outcome = AssertUnwindSafe(entry.handler.handle(ctx))
                .catch_unwind()
                .await;

            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{e:#}"),
                Err(panic) => format!("handler panicked: {}", panic_message(panic.as_ref())),
            };

            error!(
                msg_id = %message.msg_id,
                handler = %entry.label,
                "failed to handle msg: {error}"
            );
            report.failures.push(HandlerFailure {
                label: entry.label.clone(),
                error,
            });
        }

        if !report.invoked.is_empty() {
            info!(
                msg_id = %report.msg_id,
                msg_type = %msg_type,
                invoked = report.invoked.len(),
                failed = report.failures.len(),
                "callback dispatched"
            );
        }

        report
    }

    /// Validates a raw message and dispatches it.
    pub async fn process(&self, raw: RawCallbackMessage) -> Result<DispatchReport, CallbackError> {
        let message = Self::validate(raw)?;
        Ok(self.dispatch(Arc::new(message)).await)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = panic.downcast_ref::<String>() {
        return msg.clone();
    }
    "unknown panic".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::{
        client::MockOutboundSender,
        schemas::{Attachment, Event, Interaction, Text},
    };
    use std::sync::Mutex;

    type CallLog = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &CallLog, name: &'static str) -> impl CallbackHandler + 'static {
        let log = log.clone();
        handler_fn(move |ctx: CallbackContext| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(format!("{name}:{}", ctx.message.msg_id));
                Ok(())
            }
        })
    }

    fn failing(log: &CallLog, name: &'static str) -> impl CallbackHandler + 'static {
        let log = log.clone();
        handler_fn(move |_ctx: CallbackContext| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(name.to_string());
                anyhow::bail!("{name} exploded")
            }
        })
    }

    fn explode() -> anyhow::Result<()> {
        panic!("boom")
    }

    fn dispatcher(registry: HandlerRegistry) -> Dispatcher {
        Dispatcher::new(registry, Arc::new(MockOutboundSender::new()))
    }

    fn raw(msg_type: &str) -> RawCallbackMessage {
        RawCallbackMessage {
            webhook_url: "http://example.com/cgi-bin/webhook/send?key=k".into(),
            chat_id: "c1".into(),
            post_id: "p1".into(),
            msg_id: "m1".into(),
            msg_type: msg_type.into(),
            ..Default::default()
        }
    }

    fn event_message() -> Arc<CallbackMessage> {
        let mut raw = raw("event");
        raw.event = Some(Event {
            event_type: "add_to_chat".into(),
        });
        Arc::new(Dispatcher::validate(raw).unwrap())
    }

    #[test]
    fn test_validate_builds_payload() {
        let mut raw = raw("text");
        raw.text = Some(Text {
            content: "hello".into(),
        });

        let msg = Dispatcher::validate(raw).unwrap();
        assert_eq!(msg.msg_type(), MsgType::Text);
        assert_eq!(msg.text().unwrap().content, "hello");
        assert_eq!(msg.chat_id, "c1");
        assert_eq!(msg.post_id, "p1");
    }

    #[test]
    fn test_validate_rejects_missing_payload() {
        for msg_type in [
            "text",
            "image",
            "event",
            "attachment",
            "interaction",
            "modal_submit",
            "mixed",
        ] {
            let err = Dispatcher::validate(raw(msg_type)).unwrap_err();
            assert!(
                matches!(err, CallbackError::MalformedEnvelope { ref msg_id, .. } if msg_id == "m1"),
                "{msg_type} should be malformed without payload"
            );
        }
    }

    #[test]
    fn test_validate_rejects_missing_msg_type() {
        let err = Dispatcher::validate(raw("  ")).unwrap_err();
        assert!(matches!(err, CallbackError::MalformedEnvelope { .. }));
    }

    #[test]
    fn test_validate_keeps_unknown_types() {
        let msg = Dispatcher::validate(raw("template_card_event")).unwrap();
        assert_eq!(msg.msg_type(), MsgType::Other("template_card_event".into()));
    }

    #[test]
    fn test_registry_labels() {
        let log = CallLog::default();
        let mut registry = HandlerRegistry::new();
        registry
            .on(MsgType::Text, recorder(&log, "a"))
            .on(MsgType::Text, recorder(&log, "b"))
            .on_all(recorder(&log, "w"));

        assert_eq!(registry.len(), 3);
        let labels = registry
            .matching(&MsgType::Text)
            .map(|h| h.label.clone())
            .collect::<Vec<_>>();
        assert_eq!(labels, vec!["*[0]", "text[0]", "text[1]"]);
    }

    #[ntex::test]
    async fn test_wildcard_runs_before_typed_in_registration_order() {
        let log = CallLog::default();
        let mut registry = HandlerRegistry::new();
        registry
            .on(MsgType::Event, recorder(&log, "event-1"))
            .on_all(recorder(&log, "all-1"))
            .on(MsgType::Event, recorder(&log, "event-2"))
            .on(MsgType::Text, recorder(&log, "text-1"))
            .on_all(recorder(&log, "all-2"));

        let report = dispatcher(registry).dispatch(event_message()).await;

        assert!(report.is_success());
        assert_eq!(report.invoked, vec!["*[0]", "*[1]", "event[0]", "event[1]"]);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["all-1:m1", "all-2:m1", "event-1:m1", "event-2:m1"]
        );
    }

    #[ntex::test]
    async fn test_failed_handler_does_not_stop_siblings() {
        let log = CallLog::default();
        let mut registry = HandlerRegistry::new();
        registry
            .on(MsgType::Event, failing(&log, "first"))
            .on(MsgType::Event, recorder(&log, "second"));

        let report = dispatcher(registry).dispatch(event_message()).await;

        assert_eq!(*log.lock().unwrap(), vec!["first", "second:m1"]);
        assert_eq!(
            report.failures,
            vec![HandlerFailure {
                label: "event[0]".into(),
                error: "first exploded".into(),
            }]
        );
        assert_eq!(report.invoked.len(), 2);
    }

    #[ntex::test]
    async fn test_panicking_handler_is_isolated() {
        let log = CallLog::default();
        let mut registry = HandlerRegistry::new();
        registry
            .on_all(handler_fn(|_ctx: CallbackContext| async move { explode() }))
            .on(MsgType::Event, recorder(&log, "after"));

        let report = dispatcher(registry).dispatch(event_message()).await;

        assert_eq!(*log.lock().unwrap(), vec!["after:m1"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].label, "*[0]");
        assert_eq!(report.failures[0].error, "handler panicked: boom");
    }

    #[ntex::test]
    async fn test_unregistered_type_is_dropped() {
        let log = CallLog::default();
        let mut registry = HandlerRegistry::new();
        registry.on(MsgType::Text, recorder(&log, "text"));

        let mut raw = raw("interaction");
        raw.interaction = Some(Interaction::default());
        let report = dispatcher(registry).process(raw).await.unwrap();

        assert!(report.invoked.is_empty());
        assert!(report.is_success());
        assert!(log.lock().unwrap().is_empty());
    }

    #[ntex::test]
    async fn test_missing_payload_rejected_before_any_handler() {
        let log = CallLog::default();
        let mut registry = HandlerRegistry::new();
        registry
            .on_all(recorder(&log, "all"))
            .on(MsgType::Attachment, recorder(&log, "attachment"));

        let result = dispatcher(registry).process(raw("attachment")).await;

        assert!(matches!(result, Err(CallbackError::MalformedEnvelope { .. })));
        assert!(log.lock().unwrap().is_empty());
    }

    #[ntex::test]
    async fn test_dispatch_is_repeatable() {
        let log = CallLog::default();
        let mut registry = HandlerRegistry::new();
        registry
            .on_all(recorder(&log, "all"))
            .on(MsgType::Attachment, recorder(&log, "attachment"))
            .on(MsgType::Attachment, failing(&log, "broken"));
        let dispatcher = dispatcher(registry);

        let mut raw = raw("attachment");
        raw.attachment = Some(Attachment::default());
        let message = Arc::new(Dispatcher::validate(raw).unwrap());

        let first = dispatcher.dispatch(message.clone()).await;
        let second = dispatcher.dispatch(message).await;

        assert_eq!(first, second);
        assert_eq!(first.invoked, vec!["*[0]", "attachment[0]", "attachment[1]"]);
    }

    #[ntex::test]
    async fn test_reply_text_targets_chat_and_post() {
        let mut sender = MockOutboundSender::new();
        sender
            .expect_send()
            .withf(|url, message| {
                url == "http://example.com/cgi-bin/webhook/send?key=k"
                    && message.chatid.as_deref() == Some("c1")
                    && message.post_id.as_deref() == Some("p1")
            })
            .times(1)
            .returning(|_, _| Ok(WebhookResponse::default()));

        let mut registry = HandlerRegistry::new();
        registry.on(
            MsgType::Event,
            handler_fn(|ctx: CallbackContext| async move {
                ctx.reply_text("welcome").await?;
                Ok(())
            }),
        );

        let report = Dispatcher::new(registry, Arc::new(sender))
            .dispatch(event_message())
            .await;
        assert!(report.is_success(), "{:?}", report.failures);
    }
}
