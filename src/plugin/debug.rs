use crate::{event::*, log_event, plugin::*};
use anyhow::Result;

/// Logs information about every event
pub struct Debug;

#[serenity::async_trait]
impl Plugin for Debug {
    fn name(&self) -> &'static str {
        "debug"
    }

    fn usage(&self, _ctx: &Context<'_>) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context<'_>, event: &Event) -> Result<EventHandled> {
        match event {
            Event::Ready(ready) => {
                log_event!(
                    guilds = ready.guilds.len(),
                    user = %ctx.cache.current_user().name,
                    "connected to Discord"
                );
            }
            Event::Message(msg) => {
                tracing::debug!(
                    target: "event",
                    guild = %msg.guild_id.map(|g| g.to_string()).unwrap_or_else(|| "<direct-message>".to_owned()),
                    channel = %msg.channel_id,
                    author = %msg.author.name,
                    content = %msg.content,
                    "message"
                );
            }
        }

        Ok(EventHandled::No)
    }
}
