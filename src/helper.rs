//! Miscellaneous convenience methods

use crate::context::Context;
use serenity::all::UserId;
use std::borrow::Cow;

pub trait MessageHelper {
    fn is_to_me(&self, ctx: &Context) -> bool;
    fn prompt(&self, ctx: &Context) -> String;
    fn is_from_owner(&self, ctx: &Context) -> bool;
}

impl MessageHelper for serenity::all::Message {
    /// Mentions me, the bot, directly
    fn is_to_me(&self, ctx: &Context) -> bool {
        let my_id = ctx.cache.current_user().id;
        self.mentions_user_id(my_id)
    }

    /// Message content with the bot's own mentions stripped out
    fn prompt(&self, ctx: &Context) -> String {
        let my_id = ctx.cache.current_user().id;
        extract_prompt(&self.content, my_id)
    }

    fn is_from_owner(&self, ctx: &Context) -> bool {
        ctx.cfg.general.bot_owners.contains(&self.author.name)
    }
}

/// Removes both mention formats (`<@id>` and the nickname form `<@!id>`) of `bot_id` and trims
/// what is left.  An empty result means the message carried no question.
pub fn extract_prompt(content: &str, bot_id: UserId) -> String {
    content
        .replace(&format!("<@{}>", bot_id), "")
        .replace(&format!("<@!{}>", bot_id), "")
        .trim()
        .to_owned()
}

/// Cuts `text` to at most `max_chars` characters, marking the cut with `...`.
///
/// Counts characters rather than bytes, which is what Discord's limit is measured in.
pub fn truncate(text: &str, max_chars: usize) -> Cow<'_, str> {
    const ELLIPSIS: &str = "...";

    if text.chars().count() <= max_chars {
        return Cow::Borrowed(text);
    }

    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    Cow::Owned(truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot() -> UserId {
        UserId::new(1234567890)
    }

    #[test]
    fn strips_both_mention_formats() {
        assert_eq!(
            extract_prompt("<@1234567890> what is rust?", bot()),
            "what is rust?"
        );
        assert_eq!(
            extract_prompt("hey <@!1234567890>, tell me a joke", bot()),
            "hey , tell me a joke"
        );
    }

    #[test]
    fn leaves_other_mentions_alone() {
        assert_eq!(
            extract_prompt("<@1234567890> say hi to <@42>", bot()),
            "say hi to <@42>"
        );
    }

    #[test]
    fn bare_mention_is_empty_prompt() {
        assert_eq!(extract_prompt("<@1234567890>", bot()), "");
        assert_eq!(extract_prompt("  <@!1234567890>  \n ", bot()), "");
    }

    #[test]
    fn short_text_is_untouched() {
        assert!(matches!(truncate("hello", 10), Cow::Borrowed("hello")));
        assert_eq!(truncate("exactly10!", 10), "exactly10!");
    }

    #[test]
    fn long_text_is_cut_with_ellipsis() {
        let text = "a".repeat(2500);
        let truncated = truncate(&text, 1900);
        assert_eq!(truncated.chars().count(), 1900);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn truncation_respects_multibyte_characters() {
        let text = "🤖".repeat(20);
        let truncated = truncate(&text, 10);
        assert_eq!(truncated, format!("{}...", "🤖".repeat(7)));
    }
}
