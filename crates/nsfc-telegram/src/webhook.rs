//! Webhook lifecycle and command-menu sync.

use std::convert::Infallible;

use teloxide::{
    prelude::*,
    types::BotCommand,
    update_listeners::{webhooks, UpdateListener},
};
use tracing::{info, warn};

use nsfc_core::{config::Config, router::BotCommandSpec};

/// Register the webhook with Telegram and start the axum listener.
pub async fn listener(
    bot: Bot,
    cfg: &Config,
) -> anyhow::Result<impl UpdateListener<Err = Infallible>> {
    let Some(endpoint) = cfg.webhook_endpoint() else {
        anyhow::bail!("webhook listener requested without WEBHOOK_URL");
    };
    let url = url::Url::parse(&endpoint)
        .map_err(|e| anyhow::anyhow!("WEBHOOK_URL is not a valid url: {e}"))?;

    let options = webhooks::Options::new(cfg.webhook_listen_addr, url)
        .max_connections(cfg.webhook_max_connections);

    let listener = webhooks::axum(bot.clone(), options).await?;
    info!(
        addr = %cfg.webhook_listen_addr,
        max_connections = cfg.webhook_max_connections,
        "webhook registered"
    );
    log_webhook_info(&bot).await;
    Ok(listener)
}

/// Log whatever Telegram last reported about webhook delivery.
pub async fn log_webhook_info(bot: &Bot) {
    match bot.get_webhook_info().await {
        Ok(info) => {
            if info.last_error_date.is_some() {
                warn!(
                    last_error = info.last_error_message.as_deref().unwrap_or(""),
                    pending = info.pending_update_count,
                    "telegram reports webhook delivery errors"
                );
            } else {
                info!(pending = info.pending_update_count, "webhook healthy");
            }
        }
        Err(e) => warn!(error = %e, "failed to fetch webhook info"),
    }
}

/// Clear any webhook left from a previous run so long polling receives updates.
pub async fn delete_webhook(bot: &Bot) {
    if let Err(e) = bot.delete_webhook().await {
        warn!(error = %e, "failed to delete webhook");
    }
}

/// Push the command menu to Telegram when it differs from what is registered.
pub async fn sync_commands(bot: &Bot, specs: &[BotCommandSpec]) {
    let wanted: Vec<BotCommand> = specs
        .iter()
        .map(|s| BotCommand::new(s.command.clone(), s.description.clone()))
        .collect();

    let current = bot.get_my_commands().await;
    if let Err(e) = &current {
        warn!(error = %e, "failed to read bot commands, leaving menu as is");
    }
    if !needs_push(&current, &wanted) {
        return;
    }

    match bot.set_my_commands(wanted).await {
        Ok(_) => info!(count = specs.len(), "bot commands updated"),
        Err(e) => warn!(error = %e, "failed to set bot commands"),
    }
}

/// Push only when the registered menu was read and differs.
fn needs_push<E>(current: &Result<Vec<BotCommand>, E>, wanted: &[BotCommand]) -> bool {
    match current {
        Ok(current) => menu_differs(current, wanted),
        Err(_) => false,
    }
}

fn menu_differs(current: &[BotCommand], wanted: &[BotCommand]) -> bool {
    current.len() != wanted.len()
        || current
            .iter()
            .zip(wanted)
            .any(|(a, b)| a.command != b.command || a.description != b.description)
}
