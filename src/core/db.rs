use std::collections::HashMap;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::*;
use crate::core::helpers::hash_password;
use crate::models::models::{Post, User};

/// Key-value backend every service writes through.
///
/// Values are opaque bytes; records are stored as JSON through the
/// `get_json`/`set_json` helpers.
pub trait KvStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;
    fn delete(&self, key: &str) -> anyhow::Result<()>;
    fn get_keys(&self) -> anyhow::Result<Vec<String>>;

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Writes `value` only if `key` is absent. Returns whether it wrote.
    fn insert_if_absent(&self, key: &str, value: &[u8]) -> anyhow::Result<bool> {
        if self.exists(key)? {
            return Ok(false);
        }
        self.set(key, value)?;
        Ok(true)
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        self.set(key, &serde_json::to_vec(value)?)
    }

    /// Read-modify-write of a JSON value; an absent key starts from `T::default()`.
    fn update_json<T, F>(&self, key: &str, f: F) -> anyhow::Result<()>
    where
        T: DeserializeOwned + Serialize + Default,
        F: FnOnce(&mut T),
    {
        let mut value: T = self.get_json(key)?.unwrap_or_default();
        f(&mut value);
        self.set_json(key, &value)
    }

    fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .get_keys()?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}

/// Spin key-value store, used when running as a Spin component.
pub struct SpinStore(spin_sdk::key_value::Store);

impl SpinStore {
    pub fn open_default() -> anyhow::Result<Self> {
        Ok(SpinStore(spin_sdk::key_value::Store::open_default()?))
    }
}

impl KvStore for SpinStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.0.get(key)?)
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        Ok(self.0.set(key, value)?)
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        Ok(self.0.delete(key)?)
    }

    fn get_keys(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.0.get_keys()?)
    }

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.0.exists(key)?)
    }
}

/// Process-local store for the native server and tests.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_data<R>(&self, f: impl FnOnce(&mut HashMap<String, Vec<u8>>) -> R) -> anyhow::Result<R> {
        let mut guard = self
            .data
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(f(&mut guard))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        self.with_data(|data| data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.with_data(|data| {
            data.insert(key.to_string(), value.to_vec());
        })
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.with_data(|data| {
            data.remove(key);
        })
    }

    fn get_keys(&self) -> anyhow::Result<Vec<String>> {
        self.with_data(|data| data.keys().cloned().collect())
    }

    // Check and write happen under one lock.
    fn insert_if_absent(&self, key: &str, value: &[u8]) -> anyhow::Result<bool> {
        self.with_data(|data| {
            if data.contains_key(key) {
                false
            } else {
                data.insert(key.to_string(), value.to_vec());
                true
            }
        })
    }

    fn update_json<T, F>(&self, key: &str, f: F) -> anyhow::Result<()>
    where
        T: DeserializeOwned + Serialize + Default,
        F: FnOnce(&mut T),
    {
        self.with_data(|data| -> anyhow::Result<()> {
            let mut value: T = match data.get(key) {
                Some(bytes) => serde_json::from_slice(bytes)?,
                None => T::default(),
            };
            f(&mut value);
            data.insert(key.to_string(), serde_json::to_vec(&value)?);
            Ok(())
        })?
    }
}

pub fn init_test_data<S: KvStore>(store: &S) -> anyhow::Result<()> {
    let users: Vec<String> = store.get_json(USERS_LIST_KEY)?.unwrap_or_default();
    let mut test_user_id = None;
    let mut bob_user_id = None;
    let mut has_alice = false;

    for id in &users {
        if let Some(u) = store.get_json::<User>(&user_key(id))? {
            match u.username.as_str() {
                "test" => test_user_id = Some(u.id),
                "alice" => has_alice = true,
                "bob" => bob_user_id = Some(u.id),
                _ => {}
            }
        }
    }

    if test_user_id.is_some() && has_alice && bob_user_id.is_some() {
        return Ok(());
    }

    if crate::groups::find_group(store, "cats")?.is_none() {
        crate::groups::create_group(
            store,
            crate::groups::NewGroup {
                title: "Cats".to_string(),
                slug: Some("cats".to_string()),
                description: "Everything about cats".to_string(),
            },
        )?;
    }

    if test_user_id.is_none() {
        let user = seed_user(store, "test", "Test user bio")?;
        seed_post(store, &user, "This is my first post on Yatube!", None)?;
        test_user_id = Some(user.id);
    }

    if !has_alice {
        let user = seed_user(store, "alice", "Hello, I'm Alice!")?;
        seed_post(store, &user, "Welcome to my blog! Excited to share thoughts here.", None)?;
        seed_post(store, &user, "My cat learned to open the fridge.", Some("cats"))?;
    }

    if bob_user_id.is_none() {
        let user = seed_user(store, "bob", "Bob's corner of the internet")?;
        seed_post(store, &user, "Hey everyone! Just joined, looking forward to connecting with you all.", None)?;
        bob_user_id = Some(user.id);
    }

    if let (Some(test_id), Some(bob_id)) = (test_user_id, bob_user_id) {
        crate::follow::follow_user(store, &test_id, &bob_id)?;
    }

    tracing::info!("seed data initialized");
    Ok(())
}

fn seed_user<S: KvStore>(store: &S, username: &str, bio: &str) -> anyhow::Result<User> {
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        username: username.to_string(),
        password: hash_password(username)?,
        bio: Some(bio.to_string()),
    };
    crate::users::insert_user(store, &user)?;
    Ok(user)
}

fn seed_post<S: KvStore>(store: &S, author: &User, text: &str, group: Option<&str>) -> anyhow::Result<Post> {
    let post = crate::posts::create_post(
        store,
        &author.id,
        crate::posts::NewPost {
            text: text.to_string(),
            group: group.map(str::to_string),
            image: None,
        },
    )?;
    Ok(post)
}

/// Removes every key the application owns, cache and blobs included.
pub fn reset_db_data<S: KvStore>(store: &S) -> anyhow::Result<()> {
    for key in store.get_keys()? {
        store.delete(&key)?;
    }
    tracing::info!("all data removed");
    Ok(())
}
