//! Feed composition: global, group, profile and personalized follow feeds.
//!
//! Every feed is the newest-first post listing filtered for its context and
//! cut into pages by [`Paginator`].

use spin_sdk::http::{Request, Response};

use crate::auth::current_user;
use crate::cache::{FragmentKey, PageCache, INDEX_FRAGMENT};
use crate::config::{cache_ttl, POSTS_PER_PAGE, PROFILE_POSTS_PER_PAGE};
use crate::core::db::KvStore;
use crate::core::errors::{ApiError, DomainError};
use crate::core::helpers::{now, ok_json};
use crate::core::pagination::{paginate, Page, Paginator};
use crate::core::query_params::{get_page, parse_query_params};
use crate::follow::{followed_authors, follower_count, following_count, is_following};
use crate::groups::get_group;
use crate::models::models::{Group, Post, PostEntry, Profile, User};
use crate::posts::{load_posts, post_count, to_entry};
use crate::users::get_user_by_username;

pub type Feed = (Page<PostEntry>, Paginator);

fn compose<S: KvStore>(store: &S, posts: Vec<Post>, per_page: usize, raw_page: Option<&str>) -> anyhow::Result<Feed> {
    let (page, paginator) = paginate(posts, per_page, raw_page);
    let items = page
        .items
        .into_iter()
        .map(|post| to_entry(store, post))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok((
        Page {
            number: page.number,
            has_next: page.has_next,
            has_previous: page.has_previous,
            items,
        },
        paginator,
    ))
}

pub fn global_feed<S: KvStore>(store: &S, raw_page: Option<&str>) -> anyhow::Result<Feed> {
    compose(store, load_posts(store)?, POSTS_PER_PAGE, raw_page)
}

pub fn group_feed<S: KvStore>(store: &S, slug: &str, raw_page: Option<&str>) -> Result<(Group, Feed), DomainError> {
    let group = get_group(store, slug)?;
    let posts = load_posts(store)?
        .into_iter()
        .filter(|p| p.group.as_deref() == Some(group.slug.as_str()))
        .collect();
    Ok((group, compose(store, posts, POSTS_PER_PAGE, raw_page)?))
}

pub fn profile_feed<S: KvStore>(store: &S, username: &str, raw_page: Option<&str>) -> Result<(User, Feed), DomainError> {
    let author = get_user_by_username(store, username)?;
    let posts = load_posts(store)?
        .into_iter()
        .filter(|p| p.author_id == author.id)
        .collect();
    Ok((author, compose(store, posts, PROFILE_POSTS_PER_PAGE, raw_page)?))
}

/// Posts by the authors `requester` follows. Anonymous requesters and
/// requesters who follow nobody get an empty feed.
pub fn follow_feed<S: KvStore>(store: &S, requester: Option<&str>, raw_page: Option<&str>) -> anyhow::Result<Feed> {
    let authors = match requester {
        Some(user_id) => followed_authors(store, user_id)?,
        None => Default::default(),
    };
    let posts = if authors.is_empty() {
        Vec::new()
    } else {
        load_posts(store)?
            .into_iter()
            .filter(|p| authors.contains(&p.author_id))
            .collect()
    };
    compose(store, posts, POSTS_PER_PAGE, raw_page)
}

// === HTTP Handlers ===

pub fn handle_index<S: KvStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let params = parse_query_params(&req.uri());
    // Key on the clamped page so out-of-range numbers share one entry.
    let number = Paginator::new(post_count(store)?, POSTS_PER_PAGE).clamp(get_page(&params));

    let cache = PageCache::new(store, cache_ttl());
    let key = FragmentKey::new(INDEX_FRAGMENT).page(number);
    let body = cache.get_or_render(&key, now(), || {
        let (page, paginator) = global_feed(store, Some(number.to_string().as_str()))?;
        Ok(serde_json::json!({
            "page": page,
            "paginator": paginator,
        }))
    })?;
    ok_json(&body)
}

pub fn handle_group<S: KvStore>(store: &S, req: &Request, slug: &str) -> anyhow::Result<Response> {
    let params = parse_query_params(&req.uri());
    match group_feed(store, slug, get_page(&params)) {
        Ok((group, (page, paginator))) => ok_json(&serde_json::json!({
            "group": group,
            "page": page,
            "paginator": paginator,
        })),
        Err(err) => Ok(ApiError::from(err).into()),
    }
}

pub fn handle_profile<S: KvStore>(store: &S, req: &Request, username: &str) -> anyhow::Result<Response> {
    let params = parse_query_params(&req.uri());
    let (author, (page, paginator)) = match profile_feed(store, username, get_page(&params)) {
        Ok(feed) => feed,
        Err(err) => return Ok(ApiError::from(err).into()),
    };

    let following = match current_user(store, req) {
        Some(viewer) => is_following(store, &viewer, &author.id)?,
        None => false,
    };

    ok_json(&serde_json::json!({
        "profile": Profile::from(&author),
        "page": page,
        "paginator": paginator,
        "following": following,
        "follower_count": follower_count(store, &author.id)?,
        "following_count": following_count(store, &author.id)?,
    }))
}

pub fn handle_follow_index<S: KvStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let params = parse_query_params(&req.uri());
    let viewer = current_user(store, req);
    let (page, paginator) = follow_feed(store, viewer.as_deref(), get_page(&params))?;
    ok_json(&serde_json::json!({
        "page": page,
        "paginator": paginator,
    }))
}
