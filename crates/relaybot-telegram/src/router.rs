use std::{sync::Arc, time::Duration};

use anyhow::Context;
use chrono::Utc;
use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use relaybot_core::{
    address_book::{AddressBook, JsonFileStore},
    config::Config,
    engine::RelayEngine,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
};

use crate::handlers;
use crate::TelegramMessenger;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RelayEngine>,
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!(bot = %me.username(), "relaybot started"),
        Err(e) => warn!("get_me failed: {e}"),
    }

    let book = AddressBook::open(Box::new(JsonFileStore::new(&cfg.address_book_path)))
        .with_context(|| {
            format!(
                "failed to open address book {}",
                cfg.address_book_path.display()
            )
        })?;
    info!(
        path = %cfg.address_book_path.display(),
        known = book.len().await,
        routing = cfg.routing_mode.as_str(),
        "address book loaded"
    );

    // Throttle outbound calls so broadcasts stay under Telegram's flood limits.
    // A single 429 RetryAfter retry still happens in the Telegram adapter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let engine = Arc::new(RelayEngine::new(cfg.clone(), messenger, book));
    engine.notify_startup().await;

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(run_sweeper(engine.clone(), shutdown.clone()));

    let state = Arc::new(AppState {
        engine: engine.clone(),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build();

    let dispatcher_token = dispatcher.shutdown_token();
    let watcher = {
        let engine = engine.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {e}");
                return;
            }
            info!("shutdown requested");
            engine.notify_shutdown().await;
            shutdown.cancel();
            match dispatcher_token.shutdown() {
                Ok(done) => done.await,
                Err(e) => warn!("dispatcher shutdown: {e:?}"),
            }
        })
    };

    dispatcher.dispatch().await;

    shutdown.cancel();
    watcher.abort();
    let _ = sweeper.await;
    info!("relaybot stopped");
    Ok(())
}

async fn run_sweeper(engine: Arc<RelayEngine>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => engine.sweep(Utc::now()).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sweeper_stops_on_cancel() {
        let cfg = Config::from_lookup(|k| match k {
            "TELEGRAM_BOT_TOKEN" => Some("t".to_string()),
            "OWNER_ID" => Some("1".to_string()),
            _ => None,
        })
        .unwrap();
        let book = AddressBook::open(Box::new(
            relaybot_core::address_book::MemoryStore::default(),
        ))
        .unwrap();
        let messenger: Arc<dyn MessagingPort> =
            Arc::new(TelegramMessenger::new(Bot::new("t")));
        let engine = Arc::new(RelayEngine::new(Arc::new(cfg), messenger, book));

        let token = CancellationToken::new();
        let task = tokio::spawn(run_sweeper(engine, token.clone()));
        tokio::time::sleep(SWEEP_INTERVAL * 3).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("sweeper exits")
            .expect("sweeper task");
    }
}
