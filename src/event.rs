//! The Serenity crate we're using for the Discord API is designed around callbacks to handle
//! events.  However, this does not mesh well with our plugin framework here.  To resolve this,
//! the handler translates the callbacks into a distinct Event enum.

use crate::context::Context;
use serenity::all::{Message, Ready};

/// A Discord event
pub enum Event {
    Ready(Ready),
    Message(Message),
}

impl Event {
    // When an event occurs, iterate over all the plugins to see if any can/should handle it.
    pub async fn handle(self, ctx: Context<'_>) {
        for plugin in crate::plugin::plugins() {
            match plugin.handle(&ctx, &self).await {
                Ok(EventHandled::Yes) => return,
                Ok(EventHandled::No) => continue,
                Err(err) => tracing::error!(plugin = plugin.name(), error = %err, "plugin failed"),
            }
        }
    }

    // Check if a message should be interpreted as a special bot command.
    //
    // These are prefixed with the configured command prefix, e. g. `;cmd foo bar baz`.  Returns
    // the message and the text following the command.
    pub fn is_bot_cmd<'e>(&'e self, ctx: &Context, cmd: &str) -> Option<(&'e Message, &'e str)> {
        let Event::Message(msg) = self else {
            return None;
        };

        parse_bot_cmd(&msg.content, &ctx.cfg.general.command_prefix, cmd).map(|args| (msg, args))
    }
}

fn parse_bot_cmd<'c>(content: &'c str, prefix: &str, cmd: &str) -> Option<&'c str> {
    let rest = content.trim_start().strip_prefix(prefix)?.strip_prefix(cmd)?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim())
}

pub enum EventHandled {
    Yes,
    No,
}
