mod cache;
mod config;
mod context;
mod event;
mod handler;
mod helper;
mod llm;
mod logging;
mod plugin;
mod rate_limit;
mod retry;
mod service;

use serenity::{all::GatewayIntents, Client};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = crate::config::Config::load().await?;
    let _log_guard = crate::logging::init(&cfg.logging)?;
    log_internal!(config = %cfg.summary(), "starting");

    let upstream = Arc::new(crate::llm::OpenAiClient::new(&cfg.llm)?);
    let service = crate::service::Orchestrator::new(&cfg, upstream);
    let token = cfg.discord.token.clone();
    let handler = handler::Handler::new(cfg, service);

    // Things we want discord to tell us about.
    let intents = GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    Client::builder(&token, intents)
        .event_handler(handler)
        .await?
        .start()
        .await
        .map_err(Into::into)
}
