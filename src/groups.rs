use regex::Regex;
use serde::Deserialize;
use spin_sdk::http::{Request, Response};
use std::sync::OnceLock;

use crate::config::*;
use crate::core::db::KvStore;
use crate::core::errors::{ApiError, DomainError};
use crate::core::helpers::{created_json, new_id, ok_json};
use crate::core::query_params::{get_string, parse_query_params};
use crate::models::models::{Group, OnDelete, Post};

#[derive(Debug, Deserialize)]
pub struct NewGroup {
    pub title: String,
    /// Derived from the title when absent.
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
}

fn slug_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("Regex should compile"))
}

pub fn find_group<S: KvStore>(store: &S, slug: &str) -> anyhow::Result<Option<Group>> {
    store.get_json::<Group>(&group_key(slug))
}

pub fn get_group<S: KvStore>(store: &S, slug: &str) -> Result<Group, DomainError> {
    find_group(store, slug)?.ok_or_else(|| DomainError::not_found("Group"))
}

pub fn list_groups<S: KvStore>(store: &S) -> anyhow::Result<Vec<Group>> {
    let slugs: Vec<String> = store.get_json(GROUPS_LIST_KEY)?.unwrap_or_default();
    let mut groups = Vec::with_capacity(slugs.len());
    for slug in slugs {
        if let Some(group) = find_group(store, &slug)? {
            groups.push(group);
        }
    }
    Ok(groups)
}

pub fn create_group<S: KvStore>(store: &S, input: NewGroup) -> Result<Group, DomainError> {
    let title = input.title.trim().to_string();
    if title.is_empty() || title.chars().count() > MAX_GROUP_TITLE_LENGTH {
        return Err(DomainError::validation("title", "Title must be 1-200 characters"));
    }

    let slug = match input.slug.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
        Some(slug) => slug,
        None => slug::slugify(&title),
    };
    if slug.len() > MAX_GROUP_SLUG_LENGTH || !slug_regex().is_match(&slug) {
        return Err(DomainError::validation(
            "slug",
            "Slug must be 1-50 letters, numbers, underscores or hyphens",
        ));
    }

    let group = Group {
        id: new_id(),
        title,
        slug,
        description: input.description,
    };

    // The slug key doubles as the uniqueness constraint.
    let record = serde_json::to_vec(&group).map_err(anyhow::Error::from)?;
    if !store.insert_if_absent(&group_key(&group.slug), &record)? {
        return Err(DomainError::Conflict(format!("Group '{}' already exists", group.slug)));
    }

    let mut slugs: Vec<String> = store.get_json(GROUPS_LIST_KEY)?.unwrap_or_default();
    slugs.push(group.slug.clone());
    store.set_json(GROUPS_LIST_KEY, &slugs)?;

    tracing::info!(slug = %group.slug, "group created");
    Ok(group)
}

/// Deletes a group, applying `policy` to the posts that reference it.
/// Returns how many posts were affected.
pub fn delete_group<S: KvStore>(store: &S, slug: &str, policy: OnDelete) -> Result<usize, DomainError> {
    let group = get_group(store, slug)?;

    let feed: Vec<String> = store.get_json(FEED_KEY)?.unwrap_or_default();
    let mut dependents = Vec::new();
    for post_id in feed {
        if let Some(post) = store.get_json::<Post>(&post_key(&post_id))? {
            if post.group.as_deref() == Some(group.slug.as_str()) {
                dependents.push(post);
            }
        }
    }

    if policy == OnDelete::Restrict && !dependents.is_empty() {
        return Err(DomainError::Conflict(format!(
            "Group '{}' still has {} posts",
            group.slug,
            dependents.len()
        )));
    }

    for mut post in dependents.iter().cloned() {
        match policy {
            OnDelete::Cascade => crate::posts::delete_post(store, &post.id)?,
            OnDelete::Detach => {
                post.group = None;
                store.set_json(&post_key(&post.id), &post)?;
            }
            OnDelete::Restrict => {}
        }
    }

    let mut slugs: Vec<String> = store.get_json(GROUPS_LIST_KEY)?.unwrap_or_default();
    slugs.retain(|s| s != &group.slug);
    store.set_json(GROUPS_LIST_KEY, &slugs)?;
    store.delete(&group_key(&group.slug))?;

    tracing::info!(slug = %group.slug, ?policy, affected = dependents.len(), "group deleted");
    Ok(dependents.len())
}

// === HTTP Handlers ===

pub fn handle_list_groups<S: KvStore>(store: &S) -> anyhow::Result<Response> {
    ok_json(&list_groups(store)?)
}

pub fn handle_create_group<S: KvStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let input: NewGroup = match serde_json::from_slice(req.body()) {
        Ok(v) => v,
        Err(e) => return Ok(ApiError::BadRequest(format!("Invalid group: {}", e)).into()),
    };

    match create_group(store, input) {
        Ok(group) => created_json(&group),
        Err(err) => Ok(ApiError::from(err).into()),
    }
}

pub fn handle_delete_group<S: KvStore>(store: &S, req: &Request, slug: &str) -> anyhow::Result<Response> {
    let params = parse_query_params(&req.uri());
    let policy = match get_string(&params, "policy", None) {
        Some(raw) => match raw.parse::<OnDelete>() {
            Ok(p) => p,
            Err(msg) => return Ok(ApiError::BadRequest(msg).into()),
        },
        None => OnDelete::default(),
    };

    match delete_group(store, slug, policy) {
        Ok(affected) => ok_json(&serde_json::json!({
            "status": "deleted",
            "policy": policy,
            "affected_posts": affected
        })),
        Err(err) => Ok(ApiError::from(err).into()),
    }
}
