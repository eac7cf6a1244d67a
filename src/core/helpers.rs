use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use http::StatusCode;
use rand::rngs::OsRng;
use serde::Serialize;
use spin_sdk::http::Response;
use uuid::Uuid;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    let bytes = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status.as_u16())
        .header("Content-Type", "application/json")
        .body(bytes)
        .build()
}

pub fn ok_json<T: Serialize>(body: &T) -> anyhow::Result<Response> {
    Ok(json_response(StatusCode::OK, body))
}

pub fn created_json<T: Serialize>(body: &T) -> anyhow::Result<Response> {
    Ok(json_response(StatusCode::CREATED, body))
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::PasswordHash;

    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn validate_uuid(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

/// Parses a JSON request body; malformed bodies become `None`.
pub fn json_body(body: &[u8]) -> Option<serde_json::Value> {
    if body.is_empty() {
        return Some(serde_json::Value::Object(Default::default()));
    }
    serde_json::from_slice(body).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies_only_the_original() {
        let hash = hash_password("secret").unwrap();
        assert!(verify_password("secret", &hash));
        assert!(!verify_password("other", &hash));
        assert!(!verify_password("secret", "not-a-hash"));
    }

    #[test]
    fn empty_body_is_an_empty_object() {
        assert_eq!(json_body(b"").unwrap(), serde_json::json!({}));
        assert!(json_body(b"{not json").is_none());
    }
}
