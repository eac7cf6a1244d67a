use spin_sdk::http::{Method, Request, Response};

pub mod auth;
pub mod cache;
pub mod comments;
pub mod config;
pub mod core;
pub mod feed;
pub mod follow;
pub mod groups;
pub mod media;
pub mod models;
pub mod posts;
pub mod users;

use crate::core::db::KvStore;
use crate::core::errors::ApiError;
use crate::core::helpers::ok_json;

/// Dispatches one request. Shared by the Spin component and the native server.
pub fn route<S: KvStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let path = req.path().trim_end_matches('/').to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (req.method(), segments.as_slice()) {
        (Method::Post, ["users"]) => users::create_user(store, req),
        (Method::Post, ["login"]) => auth::login_user(store, req),
        (Method::Post, ["logout"]) => auth::logout_user(store, req),

        (Method::Get, []) => feed::handle_index(store, req),
        (Method::Get, ["follow"]) => feed::handle_follow_index(store, req),
        (Method::Get, ["groups"]) => groups::handle_list_groups(store),
        (Method::Get, ["group", slug]) => feed::handle_group(store, req, slug),
        (Method::Post, ["new"]) => posts::handle_create_post(store, req),
        (Method::Get, ["media", ..]) => media::serve_media(store, &path),

        (_, ["admin", ..]) => route_admin(store, req, &segments[1..]),

        (Method::Get, [username]) => feed::handle_profile(store, req, username),
        (Method::Post, [username, "follow"]) => follow::handle_follow(store, req, username),
        (Method::Post, [username, "unfollow"]) => follow::handle_unfollow(store, req, username),
        (Method::Get, [username, post_id]) => posts::handle_post_view(store, req, username, post_id),
        (Method::Put | Method::Post, [username, post_id, "edit"]) => {
            posts::handle_edit_post(store, req, username, post_id)
        }
        (Method::Post, [username, post_id, "comment"]) => {
            comments::handle_add_comment(store, req, username, post_id)
        }

        _ => Ok(ApiError::NotFound("No route found".to_string()).into()),
    }
}

fn route_admin<S: KvStore>(store: &S, req: &Request, segments: &[&str]) -> anyhow::Result<Response> {
    if let Err(err) = auth::require_admin(req) {
        return Ok(err.into());
    }

    match (req.method(), segments) {
        (Method::Post, ["groups"]) => groups::handle_create_group(store, req),
        (Method::Delete, ["groups", slug]) => groups::handle_delete_group(store, req, slug),
        (Method::Delete, ["users", username]) => users::handle_delete_user(store, username),
        (Method::Get, ["posts"]) => posts::handle_search_posts(store, req),
        (Method::Post, ["cache", "clear"]) => {
            let removed = cache::PageCache::new(store, config::cache_ttl()).clear()?;
            ok_json(&serde_json::json!({"status": "cleared", "entries": removed}))
        }
        (Method::Post, ["reset"]) => {
            crate::core::db::reset_db_data(store)?;
            ok_json(&serde_json::json!({"status": "reset"}))
        }
        _ => Ok(ApiError::NotFound("No route found".to_string()).into()),
    }
}

/// Turns handler failures into a 500 response.
pub fn respond<S: KvStore>(store: &S, req: &Request) -> Response {
    match route(store, req) {
        Ok(resp) => resp,
        Err(err) => {
            tracing::error!(error = %err, path = req.path(), "request failed");
            ApiError::InternalError("Internal server error".to_string()).into()
        }
    }
}

// === Component entrypoint ===
#[cfg(target_arch = "wasm32")]
mod component {
    use spin_sdk::http::{IntoResponse, Request};
    use spin_sdk::http_component;

    use crate::core::db::{init_test_data, SpinStore};

    #[http_component]
    fn handle(req: Request) -> anyhow::Result<impl IntoResponse> {
        let store = SpinStore::open_default()?;
        if crate::config::seed_enabled() {
            if let Err(err) = init_test_data(&store) {
                tracing::warn!(error = %err, "seeding failed");
            }
        }
        Ok(crate::respond(&store, &req))
    }
}
