use chrono::Duration;

// === Limits ===
pub const MAX_POST_LENGTH: usize = 5000;
pub const MAX_COMMENT_LENGTH: usize = 2000;
pub const MAX_GROUP_TITLE_LENGTH: usize = 200;
pub const MAX_GROUP_SLUG_LENGTH: usize = 50;
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 3;

// === Page sizes ===
pub const POSTS_PER_PAGE: usize = 10;
pub const PROFILE_POSTS_PER_PAGE: usize = 5;

/// Path segments owned by fixed routes; a user with one of these names
/// would be unreachable through `/<username>`.
pub const RESERVED_USERNAMES: &[&str] = &[
    "admin", "group", "groups", "follow", "new", "media", "users", "login", "logout",
];

// === Environment ===
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

pub fn token_expiration_hours() -> i64 {
    env_parse("YATUBE_TOKEN_EXPIRATION_HOURS", 24)
}

pub fn cache_ttl() -> Duration {
    Duration::seconds(env_parse("YATUBE_CACHE_TTL_SECONDS", 20))
}

/// Shared secret for the admin endpoints. Admin access is disabled when unset.
pub fn admin_token() -> Option<String> {
    std::env::var("YATUBE_ADMIN_TOKEN")
        .ok()
        .filter(|t| !t.is_empty())
}

pub fn bind_address() -> String {
    std::env::var("YATUBE_BIND").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
}

pub fn log_format() -> LogFormat {
    match std::env::var("YATUBE_LOG_FORMAT").as_deref() {
        Ok("json") => LogFormat::Json,
        _ => LogFormat::Compact,
    }
}

pub fn seed_enabled() -> bool {
    env_parse("YATUBE_SEED", true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

// === Storage keys ===
pub const USERS_LIST_KEY: &str = "users_list";
pub const GROUPS_LIST_KEY: &str = "groups_list";
pub const FEED_KEY: &str = "feed";
pub const TOKENS_LIST_KEY: &str = "tokens_list";
pub const FOLLOW_PREFIX: &str = "follow:";
pub const COMMENT_PREFIX: &str = "comment:";
pub const CACHE_PREFIX: &str = "cache:";
pub const BLOB_PREFIX: &str = "blob:";

pub fn user_key(user_id: &str) -> String {
    format!("user:{}", user_id)
}

pub fn username_key(username: &str) -> String {
    format!("username:{}", username)
}

pub fn token_key(token: &str) -> String {
    format!("token:{}", token)
}

pub fn group_key(slug: &str) -> String {
    format!("group:{}", slug)
}

pub fn post_key(post_id: &str) -> String {
    format!("post:{}", post_id)
}

pub fn comment_key(comment_id: &str) -> String {
    format!("{}{}", COMMENT_PREFIX, comment_id)
}

pub fn post_comments_key(post_id: &str) -> String {
    format!("comments:{}", post_id)
}

/// Composite key of a follow edge. One key per (user, author) pair.
pub fn follow_key(user_id: &str, author_id: &str) -> String {
    format!("{}{}:{}", FOLLOW_PREFIX, user_id, author_id)
}

/// Ids of the authors `user_id` follows.
pub fn followings_key(user_id: &str) -> String {
    format!("followings:{}", user_id)
}

/// Ids of the users following `author_id`.
pub fn followers_key(author_id: &str) -> String {
    format!("followers:{}", author_id)
}

pub fn blob_key(reference: &str) -> String {
    format!("{}{}", BLOB_PREFIX, reference)
}
