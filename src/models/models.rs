use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password: String,
    pub bio: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Group {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub description: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Post {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub author_id: String,
    /// Slug of the group, `None` once detached.
    pub group: Option<String>,
    /// Blob reference such as `posts/<uuid>.png`.
    pub image: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Directed edge: `user_id` receives posts of `author_id` in their follow feed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Follow {
    pub id: String,
    pub user_id: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
pub struct TokenData {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// What happens to posts when the group they belong to is deleted.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    Cascade,
    #[default]
    Detach,
    Restrict,
}

impl std::str::FromStr for OnDelete {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cascade" => Ok(OnDelete::Cascade),
            "detach" => Ok(OnDelete::Detach),
            "restrict" => Ok(OnDelete::Restrict),
            other => Err(format!("unknown on-delete policy: {}", other)),
        }
    }
}

/// Public view of a user, without credentials.
#[derive(Serialize, Clone, Debug)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub bio: Option<String>,
}

impl From<&User> for Profile {
    fn from(user: &User) -> Self {
        Profile {
            id: user.id.clone(),
            username: user.username.clone(),
            bio: user.bio.clone(),
        }
    }
}

/// A post as listed in feeds: the record plus what a page needs to render it.
#[derive(Serialize, Clone, Debug)]
pub struct PostEntry {
    #[serde(flatten)]
    pub post: Post,
    pub author: String,
    pub group_title: Option<String>,
}

#[derive(Serialize, Clone, Debug)]
pub struct CommentEntry {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: String,
}
