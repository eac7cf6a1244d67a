use spin_sdk::http::{Request, Response};

use crate::config::{admin_token, token_expiration_hours, token_key, user_key, TOKENS_LIST_KEY};
use crate::core::db::KvStore;
use crate::core::errors::ApiError;
use crate::core::helpers::{json_body, new_id, now, ok_json, verify_password};
use crate::models::models::{TokenData, User};
use crate::users::find_user_by_username;

pub fn login_user<S: KvStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let creds = match json_body(req.body()) {
        Some(v) => v,
        None => return Ok(ApiError::BadRequest("Invalid JSON".to_string()).into()),
    };
    let username = creds["username"].as_str().unwrap_or_default();
    let password = creds["password"].as_str().unwrap_or_default();

    if let Some(u) = find_user_by_username(store, username)? {
        if verify_password(password, &u.password) {
            let token = issue_token(store, &u.id)?;
            tracing::info!(user_id = %u.id, "user logged in");
            return ok_json(&serde_json::json!({
                "token": token,
                "user_id": u.id
            }));
        }
    }

    tracing::warn!(username, "rejected login");
    Ok(ApiError::Unauthorized.into())
}

pub fn logout_user<S: KvStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let token = match bearer_token(req) {
        Some(t) => t,
        None => return Ok(ApiError::Unauthorized.into()),
    };

    revoke_token(store, &token)?;

    ok_json(&serde_json::json!({
        "message": "Logged out successfully"
    }))
}

/// Stores a fresh token for `user_id` and returns it.
pub fn issue_token<S: KvStore>(store: &S, user_id: &str) -> anyhow::Result<String> {
    let token = new_id();
    let data = TokenData {
        user_id: user_id.to_string(),
        created_at: now(),
    };
    store.set_json(&token_key(&token), &data)?;

    let mut tokens: Vec<String> = store.get_json(TOKENS_LIST_KEY)?.unwrap_or_default();
    tokens.push(token.clone());
    store.set_json(TOKENS_LIST_KEY, &tokens)?;

    Ok(token)
}

pub fn revoke_token<S: KvStore>(store: &S, token: &str) -> anyhow::Result<()> {
    store.delete(&token_key(token))?;
    let mut tokens: Vec<String> = store.get_json(TOKENS_LIST_KEY)?.unwrap_or_default();
    tokens.retain(|t| t != token);
    store.set_json(TOKENS_LIST_KEY, &tokens)
}

/// Drops every token belonging to `user_id`.
pub fn revoke_user_tokens<S: KvStore>(store: &S, user_id: &str) -> anyhow::Result<()> {
    let tokens: Vec<String> = store.get_json(TOKENS_LIST_KEY)?.unwrap_or_default();
    let mut kept = Vec::with_capacity(tokens.len());
    for token in tokens {
        let key = token_key(&token);
        match store.get_json::<TokenData>(&key)? {
            Some(data) if data.user_id == user_id => store.delete(&key)?,
            Some(_) => kept.push(token),
            None => {}
        }
    }
    store.set_json(TOKENS_LIST_KEY, &kept)
}

fn bearer_token(req: &Request) -> Option<String> {
    let auth_header = req.header("Authorization")?.as_str()?;
    auth_header
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Resolves the request's bearer token to a user id, if it is valid.
pub fn validate_token<S: KvStore>(store: &S, req: &Request) -> Option<String> {
    let token = bearer_token(req)?;
    let data = store.get_json::<TokenData>(&token_key(&token)).ok()??;

    let age_hours = (now() - data.created_at).num_hours();
    if age_hours > token_expiration_hours() {
        return None;
    }

    // Tokens of deleted users are dead.
    store.get_json::<User>(&user_key(&data.user_id)).ok()??;
    Some(data.user_id)
}

/// The requesting user, or `None` for anonymous requests.
pub fn current_user<S: KvStore>(store: &S, req: &Request) -> Option<String> {
    validate_token(store, req)
}

/// Guard for endpoints that need an authenticated user.
pub fn require_user<S: KvStore>(store: &S, req: &Request) -> Result<String, ApiError> {
    current_user(store, req).ok_or(ApiError::Unauthorized)
}

/// Guard for administrative endpoints: `X-Admin-Token` must match the
/// configured admin token.
pub fn require_admin(req: &Request) -> Result<(), ApiError> {
    let expected = admin_token().ok_or_else(|| ApiError::forbidden("Admin access is disabled"))?;
    let given = req
        .header("X-Admin-Token")
        .and_then(|h| h.as_str())
        .unwrap_or_default();
    if given == expected {
        Ok(())
    } else {
        tracing::warn!("rejected admin request");
        Err(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::MemoryStore;
    use crate::users::insert_user;
    use spin_sdk::http::Method;

    fn request_with_token(token: &str) -> Request {
        Request::builder()
            .method(Method::Get)
            .uri("/follow")
            .header("Authorization", &format!("Bearer {}", token))
            .build()
    }

    fn user(store: &MemoryStore, name: &str) -> User {
        let user = User {
            id: new_id(),
            username: name.to_string(),
            password: String::new(),
            bio: None,
        };
        insert_user(store, &user).unwrap();
        user
    }

    #[test]
    fn issued_token_identifies_user() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice");
        let token = issue_token(&store, &alice.id).unwrap();
        assert_eq!(validate_token(&store, &request_with_token(&token)), Some(alice.id));
    }

    #[test]
    fn unknown_or_revoked_tokens_are_anonymous() {
        let store = MemoryStore::new();
        let alice = user(&store, "alice");
        assert!(validate_token(&store, &request_with_token("nope")).is_none());

        let token = issue_token(&store, &alice.id).unwrap();
        revoke_user_tokens(&store, &alice.id).unwrap();
        assert!(validate_token(&store, &request_with_token(&token)).is_none());
    }

    #[test]
    fn require_user_rejects_anonymous() {
        let store = MemoryStore::new();
        let req = Request::builder().method(Method::Post).uri("/new").build();
        assert!(matches!(require_user(&store, &req), Err(ApiError::Unauthorized)));
    }
}
