//! # Webhook Bot
//!
//! Main entry point of the chat robot callback server.
//! Reads the configuration, sets up logging and serves the callback path.

use envconfig::Envconfig;
use std::sync::Arc;
use tracing::info;
use webhook_bot::{
    config::AppConfig,
    logger,
    webhook::{
        crypt::MsgCrypt,
        dispatcher::{CallbackContext, handler_fn},
        schemas::MsgType,
        server::CallbackServer,
    },
};

#[ntex::main]
async fn main() -> anyhow::Result<()> {
    let app_config = AppConfig::init_from_env()?;

    // Logfire when a token is configured, stdout otherwise
    let shutdown_handler = match &app_config.logfire_token {
        Some(token) => Some(
            logfire::configure()
                .install_panic_handler()
                .send_to_logfire(logfire::config::SendToLogfire::Yes)
                .with_token(token)
                .finish()?,
        ),
        None => {
            logger::setup_simple_logger(app_config.log_level)?;
            None
        }
    };

    let crypt = MsgCrypt::new(
        app_config.callback_token.clone(),
        &app_config.callback_encoding_aes_key,
        app_config.callback_receive_id.clone(),
        app_config.callback_payload_format,
    )?;

    let robot_name = app_config.robot_name().to_string();
    let server = CallbackServer::new(Arc::new(crypt), app_config.callback_payload_format)
        .on_all(handler_fn(|ctx: CallbackContext| async move {
            info!(
                msg_id = %ctx.message.msg_id,
                msg_type = %ctx.message.msg_type(),
                chat_id = %ctx.message.chat_id,
                from = %ctx.message.from.user_id,
                "received msg"
            );
            Ok(())
        }))
        .on(
            MsgType::Text,
            handler_fn(move |ctx: CallbackContext| {
                let robot_name = robot_name.clone();
                async move {
                    let content = ctx
                        .message
                        .content_without_mention(&robot_name)
                        .unwrap_or_default();
                    if content.is_empty() {
                        return Ok(());
                    }

                    let reply = if content.eq_ignore_ascii_case("ping") {
                        "pong".to_string()
                    } else {
                        content
                    };
                    ctx.reply_text(reply).await?;
                    Ok(())
                }
            }),
        );

    server
        .run(app_config.server_addr(), &app_config.callback_path)
        .await?;

    if let Some(shutdown_handler) = shutdown_handler {
        shutdown_handler.shutdown()?;
    }

    Ok(())
}
