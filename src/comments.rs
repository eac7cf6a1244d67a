use ammonia::Builder;
use spin_sdk::http::{Request, Response};

use crate::auth::require_user;
use crate::config::*;
use crate::core::db::KvStore;
use crate::core::errors::{ApiError, DomainError};
use crate::core::helpers::{created_json, json_body, new_id, now};
use crate::models::models::{Comment, CommentEntry};
use crate::posts::{authored_post, get_post};
use crate::users::username_of;

pub fn create_comment<S: KvStore>(
    store: &S,
    post_id: &str,
    author_id: &str,
    text: &str,
) -> Result<Comment, DomainError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(DomainError::validation("text", "This field is required"));
    }
    if text.chars().count() > MAX_COMMENT_LENGTH {
        return Err(DomainError::validation("text", "Comment is too long"));
    }
    let post = get_post(store, post_id)?;

    let comment = Comment {
        id: new_id(),
        post_id: post.id.clone(),
        author_id: author_id.to_string(),
        text: Builder::default().clean(text).to_string(),
        created_at: now(),
    };
    store.set_json(&comment_key(&comment.id), &comment)?;

    let index_key = post_comments_key(&post.id);
    let mut ids: Vec<String> = store.get_json(&index_key)?.unwrap_or_default();
    ids.insert(0, comment.id.clone());
    store.set_json(&index_key, &ids)?;

    tracing::info!(comment_id = %comment.id, post_id, author_id, "comment added");
    Ok(comment)
}

/// Comments on a post, newest first.
pub fn comments_for<S: KvStore>(store: &S, post_id: &str) -> anyhow::Result<Vec<Comment>> {
    let ids: Vec<String> = store.get_json(&post_comments_key(post_id))?.unwrap_or_default();
    let mut comments = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(c) = store.get_json::<Comment>(&comment_key(&id))? {
            comments.push(c);
        }
    }
    comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(comments)
}

pub fn comment_entries<S: KvStore>(store: &S, post_id: &str) -> anyhow::Result<Vec<CommentEntry>> {
    comments_for(store, post_id)?
        .into_iter()
        .map(|comment| {
            let author = username_of(store, &comment.author_id)?;
            Ok(CommentEntry { comment, author })
        })
        .collect()
}

pub fn delete_comment<S: KvStore>(store: &S, comment: &Comment) -> anyhow::Result<()> {
    let index_key = post_comments_key(&comment.post_id);
    let mut ids: Vec<String> = store.get_json(&index_key)?.unwrap_or_default();
    ids.retain(|id| id != &comment.id);
    store.set_json(&index_key, &ids)?;
    store.delete(&comment_key(&comment.id))
}

pub fn delete_comments_for<S: KvStore>(store: &S, post_id: &str) -> anyhow::Result<()> {
    let index_key = post_comments_key(post_id);
    let ids: Vec<String> = store.get_json(&index_key)?.unwrap_or_default();
    for id in ids {
        store.delete(&comment_key(&id))?;
    }
    store.delete(&index_key)
}

// === HTTP Handlers ===

pub fn handle_add_comment<S: KvStore>(
    store: &S,
    req: &Request,
    username: &str,
    post_id: &str,
) -> anyhow::Result<Response> {
    let user_id = match require_user(store, req) {
        Ok(uid) => uid,
        Err(err) => return Ok(err.into()),
    };

    let post = match authored_post(store, username, post_id) {
        Ok(p) => p,
        Err(err) => return Ok(ApiError::from(err).into()),
    };

    let value = match json_body(req.body()) {
        Some(v) => v,
        None => return Ok(ApiError::BadRequest("Invalid JSON".to_string()).into()),
    };
    let text = value["text"].as_str().unwrap_or_default();

    match create_comment(store, &post.id, &user_id, text) {
        Ok(comment) => {
            let author = username_of(store, &comment.author_id)?;
            created_json(&CommentEntry { comment, author })
        }
        Err(err) => Ok(ApiError::from(err).into()),
    }
}
