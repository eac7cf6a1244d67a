use regex::Regex;
use spin_sdk::http::{Request, Response};
use std::sync::OnceLock;

use crate::config::*;
use crate::core::db::KvStore;
use crate::core::errors::{ApiError, DomainError};
use crate::core::helpers::{created_json, hash_password, json_body, new_id, ok_json};
use crate::models::models::{Comment, Post, Profile, User};

/// Letters, digits and `.@+-_`. Names are stored exactly as given.
fn username_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[\w.@+-]+$").expect("Regex should compile"))
}

pub fn find_user<S: KvStore>(store: &S, user_id: &str) -> anyhow::Result<Option<User>> {
    store.get_json::<User>(&user_key(user_id))
}

pub fn find_user_by_username<S: KvStore>(store: &S, username: &str) -> anyhow::Result<Option<User>> {
    match store.get_json::<String>(&username_key(username))? {
        Some(id) => find_user(store, &id),
        None => Ok(None),
    }
}

pub fn get_user_by_username<S: KvStore>(store: &S, username: &str) -> Result<User, DomainError> {
    find_user_by_username(store, username)?.ok_or_else(|| DomainError::not_found("User"))
}

/// Username for display; deleted authors fall back to an empty name.
pub fn username_of<S: KvStore>(store: &S, user_id: &str) -> anyhow::Result<String> {
    Ok(find_user(store, user_id)?.map(|u| u.username).unwrap_or_default())
}

/// Writes a user record and its indexes. The caller checks uniqueness.
pub fn insert_user<S: KvStore>(store: &S, user: &User) -> anyhow::Result<()> {
    store.set_json(&user_key(&user.id), user)?;
    store.set_json(&username_key(&user.username), &user.id)?;

    let mut users: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    users.push(user.id.clone());
    store.set_json(USERS_LIST_KEY, &users)
}

pub fn register_user<S: KvStore>(store: &S, username: &str, password: &str) -> Result<User, DomainError> {
    let username = username.trim().to_string();

    if username.is_empty() {
        return Err(DomainError::validation("username", "Username is required"));
    }
    if username.len() < MIN_USERNAME_LENGTH || username.len() > MAX_USERNAME_LENGTH {
        return Err(DomainError::validation("username", "Username must be 3-50 characters"));
    }
    if !username_regex().is_match(&username) {
        return Err(DomainError::validation(
            "username",
            "Username may contain only letters, numbers and @/./+/-/_ characters",
        ));
    }
    if RESERVED_USERNAMES.contains(&username.to_lowercase().as_str()) {
        return Err(DomainError::validation("username", "Username is reserved"));
    }
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(DomainError::validation("password", "Password must be at least 3 characters"));
    }
    if find_user_by_username(store, &username)?.is_some() {
        return Err(DomainError::Conflict("Username exists".to_string()));
    }

    let user = User {
        id: new_id(),
        username,
        password: hash_password(password)?,
        bio: None,
    };
    insert_user(store, &user)?;
    tracing::info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user)
}

/// Deletes a user and everything that depends on them: their posts (with
/// comments), their comments elsewhere, follow edges both ways and tokens.
pub fn delete_user<S: KvStore>(store: &S, username: &str) -> Result<(), DomainError> {
    let user = get_user_by_username(store, username)?;

    let feed: Vec<String> = store.get_json(FEED_KEY)?.unwrap_or_default();
    for post_id in feed {
        if let Some(post) = store.get_json::<Post>(&post_key(&post_id))? {
            if post.author_id == user.id {
                crate::posts::delete_post(store, &post.id)?;
            }
        }
    }

    for key in store.keys_with_prefix(COMMENT_PREFIX)? {
        if let Some(comment) = store.get_json::<Comment>(&key)? {
            if comment.author_id == user.id {
                crate::comments::delete_comment(store, &comment)?;
            }
        }
    }

    crate::follow::remove_all_edges(store, &user.id)?;
    crate::auth::revoke_user_tokens(store, &user.id)?;

    let mut users: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    users.retain(|id| id != &user.id);
    store.set_json(USERS_LIST_KEY, &users)?;
    store.delete(&username_key(&user.username))?;
    store.delete(&user_key(&user.id))?;

    tracing::info!(user_id = %user.id, "user deleted");
    Ok(())
}

// === HTTP Handlers ===

pub fn create_user<S: KvStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let body = match json_body(req.body()) {
        Some(v) => v,
        None => return Ok(ApiError::BadRequest("Invalid JSON".to_string()).into()),
    };
    let username = body["username"].as_str().unwrap_or("");
    let password = body["password"].as_str().unwrap_or("");

    match register_user(store, username, password) {
        Ok(user) => created_json(&Profile::from(&user)),
        Err(err) => Ok(ApiError::from(err).into()),
    }
}

pub fn handle_delete_user<S: KvStore>(store: &S, username: &str) -> anyhow::Result<Response> {
    match delete_user(store, username) {
        Ok(()) => ok_json(&serde_json::json!({"status": "deleted"})),
        Err(err) => Ok(ApiError::from(err).into()),
    }
}
