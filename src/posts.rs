use ammonia::Builder;
use html_escape::encode_double_quoted_attribute;
use regex::Regex;
use spin_sdk::http::{Request, Response};
use std::sync::OnceLock;

use crate::auth::{current_user, require_user};
use crate::config::*;
use crate::core::db::KvStore;
use crate::core::errors::{ApiError, DomainError};
use crate::core::helpers::{created_json, json_body, new_id, now, ok_json, validate_uuid};
use crate::core::query_params::{get_string, parse_query_params};
use crate::media::{store_image, BlobStore, KvBlobStore};
use crate::models::models::{Post, PostEntry, Profile};
use crate::users::{get_user_by_username, username_of};

#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub text: String,
    /// Group slug.
    pub group: Option<String>,
    /// Base64-encoded image bytes.
    pub image: Option<String>,
}

impl NewPost {
    pub fn text(text: &str) -> Self {
        NewPost {
            text: text.to_string(),
            ..Default::default()
        }
    }
}

/// Partial update; `None` leaves the field as it is.
#[derive(Debug, Clone, Default)]
pub struct PostUpdate {
    pub text: Option<String>,
    /// `Some(None)` detaches the post from its group.
    pub group: Option<Option<String>>,
    pub image: Option<String>,
}

impl PostUpdate {
    fn from_json(value: &serde_json::Value) -> Result<Self, DomainError> {
        let text = match value.get("text") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => Some(
                v.as_str()
                    .ok_or_else(|| DomainError::validation("text", "Text must be a string"))?
                    .to_string(),
            ),
        };
        let group = match value.get("group") {
            None => None,
            Some(serde_json::Value::Null) => Some(None),
            Some(v) => Some(Some(
                v.as_str()
                    .ok_or_else(|| DomainError::validation("group", "Group must be a slug"))?
                    .to_string(),
            )),
        };
        let image = value.get("image").and_then(|v| v.as_str()).map(str::to_string);
        Ok(PostUpdate { text, group, image })
    }
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(^|\s)(https?://[^\s<]+)").expect("Regex should compile"))
}

fn filter_post_content(content: &str) -> String {
    // Strip scripts and event handlers
    let clean = Builder::default()
        .link_rel(Some("noopener noreferrer"))
        .clean(content)
        .to_string();

    url_regex()
        .replace_all(&clean, |caps: &regex::Captures| {
            let url = &caps[2];
            let escaped_url = encode_double_quoted_attribute(url);
            format!(r#"{}<a href="{}" target="_blank">{}</a>"#, &caps[1], escaped_url, url)
        })
        .to_string()
}

fn clean_text(text: &str) -> Result<String, DomainError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(DomainError::validation("text", "This field is required"));
    }
    if text.chars().count() > MAX_POST_LENGTH {
        return Err(DomainError::validation("text", "Text is longer than 5000 characters"));
    }
    let filtered = filter_post_content(text);
    if filtered.trim().is_empty() {
        return Err(DomainError::validation("text", "This field is required"));
    }
    Ok(filtered)
}

fn check_group<S: KvStore>(store: &S, slug: &str) -> Result<(), DomainError> {
    crate::groups::get_group(store, slug).map(|_| ())
}

pub fn find_post<S: KvStore>(store: &S, post_id: &str) -> anyhow::Result<Option<Post>> {
    store.get_json::<Post>(&post_key(post_id))
}

pub fn get_post<S: KvStore>(store: &S, post_id: &str) -> Result<Post, DomainError> {
    find_post(store, post_id)?.ok_or_else(|| DomainError::not_found("Post"))
}

pub fn create_post<S: KvStore>(store: &S, author_id: &str, input: NewPost) -> Result<Post, DomainError> {
    let text = clean_text(&input.text)?;
    if let Some(slug) = &input.group {
        check_group(store, slug)?;
    }
    let image = match input.image.as_deref().filter(|i| !i.is_empty()) {
        Some(payload) => Some(store_image(&KvBlobStore(store), payload)?),
        None => None,
    };

    let post = Post {
        id: new_id(),
        text,
        created_at: now(),
        updated_at: None,
        author_id: author_id.to_string(),
        group: input.group,
        image,
    };

    store.set_json(&post_key(&post.id), &post)?;

    // Global feed index, newest first
    let mut feed: Vec<String> = store.get_json(FEED_KEY)?.unwrap_or_default();
    feed.insert(0, post.id.clone());
    store.set_json(FEED_KEY, &feed)?;

    tracing::info!(post_id = %post.id, author_id, "post created");
    Ok(post)
}

/// Applies `changes` if `editor_id` wrote the post. Validation happens
/// before anything is written, so a rejected update leaves the post intact.
pub fn update_post<S: KvStore>(
    store: &S,
    post_id: &str,
    editor_id: &str,
    changes: PostUpdate,
) -> Result<Post, DomainError> {
    let mut post = get_post(store, post_id)?;
    if post.author_id != editor_id {
        tracing::warn!(post_id, editor_id, "edit by non-author rejected");
        return Err(DomainError::Permission("Only the author may edit this post".to_string()));
    }

    let text = changes.text.as_deref().map(clean_text).transpose()?;
    if let Some(Some(slug)) = &changes.group {
        check_group(store, slug)?;
    }
    let blobs = KvBlobStore(store);
    let image = match changes.image.as_deref().filter(|i| !i.is_empty()) {
        Some(payload) => Some(store_image(&blobs, payload)?),
        None => None,
    };

    let mut changed = false;
    if let Some(text) = text {
        if text != post.text {
            post.text = text;
            changed = true;
        }
    }
    if let Some(group) = changes.group {
        if group != post.group {
            post.group = group;
            changed = true;
        }
    }
    if let Some(reference) = image {
        if let Some(old) = post.image.replace(reference) {
            blobs.remove(&old)?;
        }
        changed = true;
    }

    if changed {
        post.updated_at = Some(now());
        store.set_json(&post_key(&post.id), &post)?;
        tracing::info!(post_id, "post updated");
    }
    Ok(post)
}

/// Removes a post with its comments and image. Only reachable through
/// cascades from user or group deletion.
pub fn delete_post<S: KvStore>(store: &S, post_id: &str) -> Result<(), DomainError> {
    let post = get_post(store, post_id)?;

    crate::comments::delete_comments_for(store, &post.id)?;
    if let Some(reference) = &post.image {
        KvBlobStore(store).remove(reference)?;
    }
    store.delete(&post_key(&post.id))?;

    let mut feed: Vec<String> = store.get_json(FEED_KEY)?.unwrap_or_default();
    feed.retain(|id| id != &post.id);
    store.set_json(FEED_KEY, &feed)?;

    tracing::info!(post_id, "post deleted");
    Ok(())
}

/// Number of posts in the feed index.
pub fn post_count<S: KvStore>(store: &S) -> anyhow::Result<usize> {
    Ok(store.get_json::<Vec<String>>(FEED_KEY)?.map(|ids| ids.len()).unwrap_or(0))
}

/// Every post, newest first.
pub fn load_posts<S: KvStore>(store: &S) -> anyhow::Result<Vec<Post>> {
    let feed: Vec<String> = store.get_json(FEED_KEY)?.unwrap_or_default();
    let mut posts = Vec::with_capacity(feed.len());
    for id in feed {
        if let Some(p) = find_post(store, &id)? {
            posts.push(p);
        }
    }
    // Stable: equal timestamps keep index order, which is newest insert first.
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(posts)
}

/// Case-insensitive substring search over post text.
pub fn search_posts<S: KvStore>(store: &S, query: &str) -> anyhow::Result<Vec<Post>> {
    let needle = query.to_lowercase();
    Ok(load_posts(store)?
        .into_iter()
        .filter(|p| p.text.to_lowercase().contains(&needle))
        .collect())
}

pub fn to_entry<S: KvStore>(store: &S, post: Post) -> anyhow::Result<PostEntry> {
    let author = username_of(store, &post.author_id)?;
    let group_title = match &post.group {
        Some(slug) => crate::groups::find_group(store, slug)?.map(|g| g.title),
        None => None,
    };
    Ok(PostEntry {
        post,
        author,
        group_title,
    })
}

pub fn post_url(username: &str, post_id: &str) -> String {
    format!("/{}/{}", username, post_id)
}

// === HTTP Handlers ===

pub fn handle_create_post<S: KvStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let user_id = match require_user(store, req) {
        Ok(uid) => uid,
        Err(err) => return Ok(err.into()),
    };

    let value = match json_body(req.body()) {
        Some(v) => v,
        None => return Ok(ApiError::BadRequest("Invalid JSON".to_string()).into()),
    };
    let input = NewPost {
        text: value["text"].as_str().unwrap_or_default().to_string(),
        group: value["group"].as_str().filter(|s| !s.is_empty()).map(str::to_string),
        image: value["image"].as_str().map(str::to_string),
    };

    match create_post(store, &user_id, input) {
        Ok(post) => created_json(&to_entry(store, post)?),
        Err(err) => Ok(ApiError::from(err).into()),
    }
}

pub fn handle_edit_post<S: KvStore>(
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

    // Non-authors are turned away before the body is even looked at.
    if post.author_id != user_id {
        tracing::warn!(post_id, editor_id = %user_id, "edit by non-author rejected");
        return Ok(ApiError::forbidden("Only the author may edit this post")
            .with_redirect(post_url(username, post_id))
            .into());
    }

    let changes = match json_body(req.body()) {
        Some(v) => match PostUpdate::from_json(&v) {
            Ok(c) => c,
            Err(err) => return Ok(ApiError::from(err).into()),
        },
        None => return Ok(ApiError::BadRequest("Invalid JSON".to_string()).into()),
    };

    match update_post(store, &post.id, &user_id, changes) {
        Ok(post) => ok_json(&to_entry(store, post)?),
        Err(err @ DomainError::Permission(_)) => {
            Ok(ApiError::from(err).with_redirect(post_url(username, post_id)).into())
        }
        Err(err) => Ok(ApiError::from(err).into()),
    }
}

/// The post `post_id`, provided it was written by `username`.
pub fn authored_post<S: KvStore>(store: &S, username: &str, post_id: &str) -> Result<Post, DomainError> {
    if !validate_uuid(post_id) {
        return Err(DomainError::not_found("Post"));
    }
    let author = get_user_by_username(store, username)?;
    let post = get_post(store, post_id)?;
    if post.author_id != author.id {
        return Err(DomainError::not_found("Post"));
    }
    Ok(post)
}

pub fn handle_post_view<S: KvStore>(
    store: &S,
    req: &Request,
    username: &str,
    post_id: &str,
) -> anyhow::Result<Response> {
    let post = match authored_post(store, username, post_id) {
        Ok(p) => p,
        Err(err) => return Ok(ApiError::from(err).into()),
    };
    let profile = get_user_by_username(store, username)?;

    let following = match current_user(store, req) {
        Some(viewer) => crate::follow::is_following(store, &viewer, &profile.id)?,
        None => false,
    };
    let comments = crate::comments::comment_entries(store, &post.id)?;

    ok_json(&serde_json::json!({
        "profile": Profile::from(&profile),
        "post": to_entry(store, post)?,
        "comments": comments,
        "following": following,
    }))
}

pub fn handle_search_posts<S: KvStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let params = parse_query_params(&req.uri());
    let query = get_string(&params, "search", Some("")).unwrap_or_default();

    let mut entries = Vec::new();
    for post in search_posts(store, &query)? {
        entries.push(to_entry(store, post)?);
    }
    ok_json(&entries)
}
