//! Client-side message filter.
//!
//! The search endpoint can narrow results by author, content, links and
//! files, but it cannot express pinned/NSFW exclusion or regular
//! expressions, and its index can drift from the live message. Every hit is
//! therefore re-checked here before it is deleted.

use crate::config::Configuration;
use crate::models::Message;

/// True when `message` satisfies every predicate configured in `config`.
///
/// Predicates run in a fixed order and stop at the first failure; unset
/// predicates always pass.
pub fn matches(message: &Message, config: &Configuration) -> bool {
    author_matches(message, config)
        && id_in_range(message, config)
        && content_matches(message, config)
        && pattern_matches(message, config)
        && link_matches(message, config)
        && file_matches(message, config)
        && pinned_allowed(message, config)
        && nsfw_allowed(message, config)
}

fn author_matches(message: &Message, config: &Configuration) -> bool {
    config
        .author_id()
        .map_or(true, |author| message.author_id == author)
}

fn id_in_range(message: &Message, config: &Configuration) -> bool {
    config.min_id().map_or(true, |min| message.id >= min)
        && config.max_id().map_or(true, |max| message.id <= max)
}

fn content_matches(message: &Message, config: &Configuration) -> bool {
    config
        .content()
        .map_or(true, |needle| message.content.contains(needle))
}

fn pattern_matches(message: &Message, config: &Configuration) -> bool {
    config
        .pattern()
        .map_or(true, |re| re.is_match(&message.content))
}

fn link_matches(message: &Message, config: &Configuration) -> bool {
    !config.has_link() || message.has_link
}

fn file_matches(message: &Message, config: &Configuration) -> bool {
    !config.has_file() || message.has_attachments
}

fn pinned_allowed(message: &Message, config: &Configuration) -> bool {
    config.include_pinned() || !message.pinned
}

fn nsfw_allowed(message: &Message, config: &Configuration) -> bool {
    config.include_nsfw() || !message.nsfw
}
