use crate::{event::*, helper::MessageHelper, plugin::*, service::Request};
use anyhow::Result;
use serenity::all::Mentionable;

/// Answers messages that mention the bot
pub struct LlmReply;

#[serenity::async_trait]
impl Plugin for LlmReply {
    fn name(&self) -> &'static str {
        "llm_reply"
    }

    fn usage(&self, _ctx: &Context<'_>) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context<'_>, event: &Event) -> Result<EventHandled> {
        let Event::Message(msg) = event else {
            return Ok(EventHandled::No);
        };

        // Only respond if the message is to the bot
        if !msg.is_to_me(ctx) {
            return Ok(EventHandled::No);
        }

        let Some(request) = Request::new(
            msg.author.id.to_string(),
            msg.guild_id.map(|id| id.to_string()),
            msg.prompt(ctx),
        ) else {
            // Mentioned with nothing to ask
            if let Some(greeting) = &ctx.cfg.general.greeting {
                let greeting = greeting.replace("{{user}}", &msg.author.mention().to_string());
                msg.reply(ctx.cache_http, greeting).await?;
            }
            return Ok(EventHandled::Yes);
        };

        // The request may take some time.  Tell Discord (and thus users in the server) that
        // we're "typing" to indicate we're processing it.
        let typing = ctx
            .cfg
            .discord
            .typing_indicator
            .then(|| msg.channel_id.start_typing(ctx.http));

        let result = ctx.service.handle(&request).await;

        if let Some(typing) = typing {
            typing.stop();
        }

        let reply = result.reply_text(ctx.cfg.discord.max_message_length);
        msg.reply(ctx.cache_http, reply).await?;
        Ok(EventHandled::Yes)
    }
}
