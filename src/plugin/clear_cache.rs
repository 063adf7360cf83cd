use crate::{event::*, helper::MessageHelper, log_internal, plugin::*};
use anyhow::Result;

/// Drops every cached LLM response
pub struct ClearCache;

#[serenity::async_trait]
impl Plugin for ClearCache {
    fn name(&self) -> &'static str {
        "clear-cache"
    }

    fn usage(&self, ctx: &Context<'_>) -> Option<String> {
        let prefix = &ctx.cfg.general.command_prefix;
        Some(format!(
            "{}{} - forget cached answers (bot owner only)",
            prefix,
            self.name()
        ))
    }

    async fn handle(&self, ctx: &Context<'_>, event: &Event) -> Result<EventHandled> {
        let Some((msg, _)) = event.is_bot_cmd(ctx, self.name()) else {
            return Ok(EventHandled::No);
        };

        let response = if msg.is_from_owner(ctx) {
            let cleared = ctx.service.clear_cache();
            log_internal!(owner = %msg.author.name, cleared, "LLM response cache cleared");
            format!("Cleared {} cached answer(s)", cleared)
        } else {
            "Only bot owners can do that".to_owned()
        };

        msg.reply(ctx.cache_http, response).await?;
        Ok(EventHandled::Yes)
    }
}
