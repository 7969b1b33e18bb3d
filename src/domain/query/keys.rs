//! Well-known query keys of the social client
//!
//! Everything post related lives under the `posts` prefix and everything
//! user related under `user`, so a bulk invalidation of either prefix
//! reaches every derived view.

use super::QueryKey;

pub const POSTS: &str = "posts";
pub const USER: &str = "user";

pub fn current_user() -> QueryKey {
    QueryKey::new(USER).with("current")
}

pub fn users() -> QueryKey {
    QueryKey::new(USER).with("list")
}

pub fn user_by_id(user_id: &str) -> QueryKey {
    QueryKey::new(USER).with("byId").with(user_id)
}

pub fn user_posts(user_id: &str) -> QueryKey {
    QueryKey::new(USER).with("posts").with(user_id)
}

pub fn recent_posts() -> QueryKey {
    QueryKey::new(POSTS).with("recent")
}

/// The generic posts list
pub fn posts() -> QueryKey {
    QueryKey::new(POSTS).with("list")
}

pub fn infinite_posts() -> QueryKey {
    QueryKey::new(POSTS).with("infinite")
}

pub fn post_by_id(post_id: &str) -> QueryKey {
    QueryKey::new(POSTS).with("byId").with(post_id)
}

pub fn search_posts(term: &str) -> QueryKey {
    QueryKey::new(POSTS).with("search").with(term)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_key;

    #[test]
    fn test_post_keys_share_prefix() {
        let prefix = QueryKey::new(POSTS);
        for key in [
            recent_posts(),
            posts(),
            infinite_posts(),
            post_by_id("42"),
            search_posts("sunset"),
        ] {
            assert!(key.starts_with(&prefix), "{} should start with {}", key, prefix);
        }
        assert!(!current_user().starts_with(&prefix));
    }

    #[test]
    fn test_key_shapes() {
        assert_eq!(post_by_id("42"), query_key!["posts", "byId", "42"]);
        assert_eq!(recent_posts(), query_key!["posts", "recent"]);
        assert_eq!(current_user(), query_key!["user", "current"]);
    }

    #[test]
    fn test_generic_list_does_not_cover_details() {
        assert!(!post_by_id("42").starts_with(&posts()));
        assert!(!infinite_posts().starts_with(&posts()));
    }
}
