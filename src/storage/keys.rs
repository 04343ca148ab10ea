//! Key construction for the Storage Gateway (§4.1).
//!
//! Each record kind lives in its own `sled::Tree`, named with the versioned
//! prefix from [`crate::constants::storage::KEY_VERSION`] so the on-disk
//! layout can evolve without colliding with an older format. Within a tree,
//! composite keys (`<feed_id>/<episode_id>`) are what makes `scan_prefix`
//! double as both "all episodes" and "one feed's episodes".

use crate::constants::storage::KEY_VERSION;

pub fn tree_name(namespace: &str) -> String {
    format!("{KEY_VERSION}/{namespace}")
}

pub fn feed_tree_name() -> String {
    tree_name("feed")
}

pub fn episode_tree_name() -> String {
    tree_name("episode")
}

pub fn history_tree_name() -> String {
    tree_name("history")
}

pub fn history_feed_index_tree_name() -> String {
    tree_name("history_feed")
}

pub fn feed_key(feed_id: &str) -> Vec<u8> {
    feed_id.as_bytes().to_vec()
}

pub fn episode_key(feed_id: &str, episode_id: &str) -> Vec<u8> {
    format!("{feed_id}/{episode_id}").into_bytes()
}

pub fn episode_prefix(feed_id: &str) -> Vec<u8> {
    format!("{feed_id}/").into_bytes()
}

pub fn history_key(history_id: &str) -> Vec<u8> {
    history_id.as_bytes().to_vec()
}

pub fn history_feed_key(feed_id: &str, history_id: &str) -> Vec<u8> {
    format!("{feed_id}/{history_id}").into_bytes()
}

pub fn history_feed_prefix(feed_id: &str) -> Vec<u8> {
    format!("{feed_id}/").into_bytes()
}

/// Decode a `<feed_id>/<rest>` composite key's `feed_id` component, used to
/// split an episode key back into its owning feed.
pub fn split_feed_prefixed<'a>(key: &'a str) -> Option<(&'a str, &'a str)> {
    key.split_once('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn episode_prefix_is_strict_prefix_of_episode_key() {
        let prefix = episode_prefix("feed-1");
        let key = episode_key("feed-1", "ep-1");
        assert!(key.starts_with(&prefix));
        assert_ne!(prefix, key);
    }

    #[test]
    fn episode_prefix_does_not_match_sibling_feed() {
        let prefix = episode_prefix("feed-1");
        let key = episode_key("feed-10", "ep-1");
        assert!(!key.starts_with(&prefix));
    }
}
