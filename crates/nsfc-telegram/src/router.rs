use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, error_handlers::LoggingErrorHandler, prelude::*};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use nsfc_core::{
    config::Config,
    edit_cache::EditCache,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
        timeout::TimeoutMessenger,
    },
    pipeline::{Pipeline, PipelineParts},
    registry::SentMessageRegistry,
    router::Router,
    store::Store,
    worker::{spawn_periodic_sweep, update_queue, UpdateSender, WorkerPool},
};

use crate::{convert, webhook, TelegramMessenger};

/// Run the bot until Ctrl-C, then drain the worker pool.
///
/// Receives updates over the webhook when `WEBHOOK_URL` is set, long polling
/// otherwise.
pub async fn run(cfg: Arc<Config>, router: Arc<Router>, store: Arc<dyn Store>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "nsfc started"),
        Err(e) => warn!(error = %e, "get_me failed"),
    }
    webhook::sync_commands(&bot, &router.bot_commands()).await;

    // Retry-on-429 lives in the adapter; pacing and the deadline wrap it.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let throttled: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));
    let messenger: Arc<dyn MessagingPort> =
        Arc::new(TimeoutMessenger::new(throttled, cfg.outbound_timeout));

    let pipeline = Arc::new(Pipeline::new(
        PipelineParts {
            router,
            store,
            messenger,
            registry: Arc::new(SentMessageRegistry::new(cfg.reply_retention)),
            cache: Arc::new(EditCache::new(cfg.edit_cache_capacity)),
        },
        cfg.pipeline_settings(),
    ));

    let cancel = CancellationToken::new();
    let (tx, rx) = update_queue(cfg.update_queue_capacity);
    let pool = WorkerPool::spawn(pipeline.clone(), rx, cfg.worker_count, cancel.clone());
    info!(workers = pool.len(), queue = cfg.update_queue_capacity, "worker pool ready");

    let sweeper = cfg
        .sweep_interval
        .map(|every| spawn_periodic_sweep(pipeline.clone(), every, cancel.clone()));

    let handler = dptree::entry().endpoint(forward_update);
    let mut dispatcher = Dispatcher::builder(bot.clone(), handler)
        .dependencies(dptree::deps![tx.clone()])
        .enable_ctrlc_handler()
        .build();

    if cfg.webhook_url.is_some() {
        let listener = webhook::listener(bot.clone(), &cfg).await?;
        dispatcher
            .dispatch_with_listener(
                listener,
                LoggingErrorHandler::with_custom_text("webhook listener error"),
            )
            .await;
    } else {
        webhook::delete_webhook(&bot).await;
        info!("long polling");
        dispatcher.dispatch().await;
    }

    info!("shutting down, draining queued updates");
    drop(dispatcher);
    drop(tx);
    pool.join().await;
    pipeline.flush_background().await;
    cancel.cancel();
    if let Some(handle) = sweeper {
        if let Err(e) = handle.await {
            warn!(error = %e, "reply sweeper ended abnormally");
        }
    }
    Ok(())
}

/// Convert and enqueue; the worker pool does the rest.
async fn forward_update(upd: Update, tx: UpdateSender) -> ResponseResult<()> {
    let id = upd.id;
    if tx.send(convert::inbound_update(upd)).await.is_err() {
        warn!(update_id = id, "update queue closed, dropping update");
    }
    Ok(())
}
