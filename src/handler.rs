use crate::{config::Config, context::Context, event::Event, service::Orchestrator};
use serenity::all::{Message, Ready};

/// Discord event handler
pub struct Handler {
    cfg: Config,
    service: Orchestrator,
}

impl<'a> Handler {
    pub fn new(cfg: Config, service: Orchestrator) -> Self {
        Self { cfg, service }
    }

    fn ctx(&'a self, discord_ctx: &'a serenity::all::Context) -> Context<'a> {
        Context {
            cfg: &self.cfg,
            service: &self.service,
            cache: &discord_ctx.cache,
            http: &discord_ctx.http,
            cache_http: discord_ctx,
        }
    }
}

#[serenity::async_trait]
impl serenity::all::EventHandler for Handler {
    async fn ready(&self, discord_ctx: serenity::all::Context, ready: Ready) {
        Event::Ready(ready).handle(self.ctx(&discord_ctx)).await;
    }

    async fn message(&self, discord_ctx: serenity::all::Context, msg: Message) {
        Event::Message(msg).handle(self.ctx(&discord_ctx)).await;
    }
}
