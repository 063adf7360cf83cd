use crate::{context::Context, event::EventHandled};
use anyhow::Result;

mod clear_cache;
mod debug;
mod help;
mod ignore_bots;
mod llm_reply;

#[serenity::async_trait]
pub trait Plugin: Sync + Send {
    /// Plugin name.  Also the command name for plugins that respond to a command.
    fn name(&self) -> &'static str;
    /// Help message line.  None if no help message
    fn usage(&self, ctx: &Context<'_>) -> Option<String>;
    /// Potentially handle event.  Returns:
    /// - Ok(EventHandled::Yes) if the event has been handled and no other plugin should attempt to
    ///   handle it
    /// - Ok(EventHandled::No) if another plugin should attempt to handle the event
    /// - Err if an error occurred
    async fn handle(&self, ctx: &Context<'_>, event: &crate::event::Event) -> Result<EventHandled>;
}

/// Ordered list of available plugins
pub fn plugins() -> Vec<Box<dyn Plugin>> {
    vec![
        // Core bot operations
        Box::new(debug::Debug),
        Box::new(ignore_bots::IgnoreBots),
        Box::new(help::Help),
        // Owner commands
        Box::new(clear_cache::ClearCache),
        // LLM fallback, used if no other plugin handles the event.
        // Keep last.
        Box::new(llm_reply::LlmReply),
    ]
}
