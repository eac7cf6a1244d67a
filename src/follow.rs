use std::collections::HashSet;

use spin_sdk::http::{Request, Response};

use crate::auth::require_user;
use crate::config::*;
use crate::core::db::KvStore;
use crate::core::errors::{ApiError, DomainError};
use crate::core::helpers::{new_id, now, ok_json};
use crate::models::models::Follow;
use crate::users::get_user_by_username;

/// What a follow request did. None of these is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Created,
    AlreadyFollowing,
    SelfFollow,
}

impl FollowOutcome {
    fn status(self) -> &'static str {
        match self {
            FollowOutcome::Created => "followed",
            FollowOutcome::AlreadyFollowing => "already_following",
            FollowOutcome::SelfFollow => "self_follow_ignored",
        }
    }
}

pub fn follow_user<S: KvStore>(store: &S, user_id: &str, author_id: &str) -> anyhow::Result<FollowOutcome> {
    if user_id == author_id {
        return Ok(FollowOutcome::SelfFollow);
    }

    let key = follow_key(user_id, author_id);
    if store.exists(&key)? {
        return Ok(FollowOutcome::AlreadyFollowing);
    }

    let edge = Follow {
        id: new_id(),
        user_id: user_id.to_string(),
        author_id: author_id.to_string(),
        created_at: now(),
    };
    // A concurrent follow of the same pair loses here.
    if !store.insert_if_absent(&key, &serde_json::to_vec(&edge)?)? {
        return Ok(FollowOutcome::AlreadyFollowing);
    }

    add_to_index(store, &followings_key(user_id), author_id)?;
    add_to_index(store, &followers_key(author_id), user_id)?;

    tracing::info!(user_id, author_id, "follow edge created");
    Ok(FollowOutcome::Created)
}

/// Removes the edge if there is one. Returns whether it existed.
pub fn unfollow_user<S: KvStore>(store: &S, user_id: &str, author_id: &str) -> anyhow::Result<bool> {
    let key = follow_key(user_id, author_id);
    if !store.exists(&key)? {
        return Ok(false);
    }
    store.delete(&key)?;
    remove_from_index(store, &followings_key(user_id), author_id)?;
    remove_from_index(store, &followers_key(author_id), user_id)?;
    tracing::info!(user_id, author_id, "follow edge removed");
    Ok(true)
}

pub fn is_following<S: KvStore>(store: &S, user_id: &str, author_id: &str) -> anyhow::Result<bool> {
    store.exists(&follow_key(user_id, author_id))
}

fn read_index<S: KvStore>(store: &S, key: &str) -> anyhow::Result<Vec<String>> {
    Ok(store.get_json(key)?.unwrap_or_default())
}

fn add_to_index<S: KvStore>(store: &S, key: &str, id: &str) -> anyhow::Result<()> {
    store.update_json(key, |ids: &mut Vec<String>| {
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    })
}

fn remove_from_index<S: KvStore>(store: &S, key: &str, id: &str) -> anyhow::Result<()> {
    store.update_json(key, |ids: &mut Vec<String>| ids.retain(|existing| existing != id))
}

/// Authors `user_id` follows.
pub fn followed_authors<S: KvStore>(store: &S, user_id: &str) -> anyhow::Result<HashSet<String>> {
    Ok(read_index(store, &followings_key(user_id))?.into_iter().collect())
}

pub fn follower_count<S: KvStore>(store: &S, author_id: &str) -> anyhow::Result<usize> {
    Ok(read_index(store, &followers_key(author_id))?.len())
}

pub fn following_count<S: KvStore>(store: &S, user_id: &str) -> anyhow::Result<usize> {
    Ok(read_index(store, &followings_key(user_id))?.len())
}

/// Drops every edge touching `user_id`, in either direction.
pub fn remove_all_edges<S: KvStore>(store: &S, user_id: &str) -> anyhow::Result<()> {
    for author_id in read_index(store, &followings_key(user_id))? {
        store.delete(&follow_key(user_id, &author_id))?;
        remove_from_index(store, &followers_key(&author_id), user_id)?;
    }
    for follower_id in read_index(store, &followers_key(user_id))? {
        store.delete(&follow_key(&follower_id, user_id))?;
        remove_from_index(store, &followings_key(&follower_id), user_id)?;
    }
    store.delete(&followings_key(user_id))?;
    store.delete(&followers_key(user_id))
}

// === HTTP Handlers ===

pub fn handle_follow<S: KvStore>(store: &S, req: &Request, username: &str) -> anyhow::Result<Response> {
    let user_id = match require_user(store, req) {
        Ok(uid) => uid,
        Err(err) => return Ok(err.into()),
    };

    let author = match get_user_by_username(store, username) {
        Ok(u) => u,
        Err(err) => return Ok(ApiError::from(err).into()),
    };

    let outcome = follow_user(store, &user_id, &author.id).map_err(DomainError::from);
    match outcome {
        Ok(outcome) => ok_json(&serde_json::json!({
            "status": outcome.status(),
            "redirect": format!("/{}", author.username)
        })),
        Err(err) => Ok(ApiError::from(err).into()),
    }
}

pub fn handle_unfollow<S: KvStore>(store: &S, req: &Request, username: &str) -> anyhow::Result<Response> {
    let user_id = match require_user(store, req) {
        Ok(uid) => uid,
        Err(err) => return Ok(err.into()),
    };

    let author = match get_user_by_username(store, username) {
        Ok(u) => u,
        Err(err) => return Ok(ApiError::from(err).into()),
    };

    unfollow_user(store, &user_id, &author.id)?;

    ok_json(&serde_json::json!({
        "status": "unfollowed",
        "redirect": format!("/{}", author.username)
    }))
}
