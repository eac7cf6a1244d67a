use serde_json::{json, Value};
use spin_sdk::http::{Method, Request, Response};
use yatube::core::db::MemoryStore;

const ADMIN_TOKEN: &str = "integration-admin";

const SMALL_PNG_BASE64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAIAAACQd1PeAAAADElEQVR4nGP4z8AAAAMBAQDJ/pLvAAAAAElFTkSuQmCC";
const TRUNCATED_PNG_BASE64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAIAAACQd1PeZ2FyYmFnZS13aXRob3V0LXBpeGVsLWRhdGE=";

fn send(store: &MemoryStore, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Response {
    let mut builder = Request::builder();
    builder.method(method).uri(uri);
    if let Some(token) = token {
        builder.header("Authorization", &format!("Bearer {}", token));
    }
    if let Some(body) = body {
        builder
            .header("Content-Type", "application/json")
            .body(serde_json::to_vec(&body).unwrap());
    }
    yatube::respond(store, &builder.build())
}

fn admin(store: &MemoryStore, method: Method, uri: &str, body: Option<Value>) -> Response {
    std::env::set_var("YATUBE_ADMIN_TOKEN", ADMIN_TOKEN);
    let mut builder = Request::builder();
    builder.method(method).uri(uri).header("X-Admin-Token", ADMIN_TOKEN);
    if let Some(body) = body {
        builder.body(serde_json::to_vec(&body).unwrap());
    }
    yatube::respond(store, &builder.build())
}

fn json_of(resp: &Response) -> Value {
    serde_json::from_slice(resp.body()).unwrap()
}

/// Registers and logs in a user, returning `(user_id, token)`.
fn sign_up(store: &MemoryStore, username: &str) -> (String, String) {
    let resp = send(
        store,
        Method::Post,
        "/users",
        None,
        Some(json!({"username": username, "password": "secret"})),
    );
    assert_eq!(*resp.status(), 201, "register failed: {:?}", json_of(&resp));

    let resp = send(
        store,
        Method::Post,
        "/login",
        None,
        Some(json!({"username": username, "password": "secret"})),
    );
    assert_eq!(*resp.status(), 200);
    let data = json_of(&resp);
    (
        data["user_id"].as_str().unwrap().to_string(),
        data["token"].as_str().unwrap().to_string(),
    )
}

fn publish(store: &MemoryStore, token: &str, body: Value) -> Value {
    let resp = send(store, Method::Post, "/new", Some(token), Some(body));
    assert_eq!(*resp.status(), 201, "publish failed: {:?}", json_of(&resp));
    json_of(&resp)
}

#[test]
fn test_full_user_flow() {
    let store = MemoryStore::new();
    let (user_id, token) = sign_up(&store, "leo");

    let post = publish(&store, &token, json!({"text": "Test post from integration test!"}));
    assert_eq!(post["text"], "Test post from integration test!");
    assert_eq!(post["author_id"], user_id);
    assert_eq!(post["author"], "leo");
    let post_id = post["id"].as_str().unwrap().to_string();

    let resp = send(
        &store,
        Method::Put,
        &format!("/leo/{}/edit", post_id),
        Some(&token),
        Some(json!({"text": "Updated content"})),
    );
    assert_eq!(*resp.status(), 200);
    let edited = json_of(&resp);
    assert_eq!(edited["text"], "Updated content");
    assert!(edited["updated_at"].is_string(), "updated_at should be set after edit");

    let resp = send(
        &store,
        Method::Post,
        &format!("/leo/{}/comment", post_id),
        Some(&token),
        Some(json!({"text": "First!"})),
    );
    assert_eq!(*resp.status(), 201);

    let resp = send(&store, Method::Get, &format!("/leo/{}", post_id), None, None);
    assert_eq!(*resp.status(), 200);
    let view = json_of(&resp);
    assert_eq!(view["post"]["text"], "Updated content");
    assert_eq!(view["comments"][0]["text"], "First!");
    assert_eq!(view["comments"][0]["author"], "leo");
    assert_eq!(view["following"], false);

    let resp = send(&store, Method::Get, "/leo", None, None);
    let profile = json_of(&resp);
    assert_eq!(profile["profile"]["username"], "leo");
    assert_eq!(profile["paginator"]["per_page"], 5);
    assert_eq!(profile["page"]["items"][0]["id"], post_id);

    let resp = send(&store, Method::Post, "/logout", Some(&token), None);
    assert_eq!(*resp.status(), 200);
    let resp = send(&store, Method::Post, "/new", Some(&token), Some(json!({"text": "after logout"})));
    assert_eq!(*resp.status(), 401);
}

#[test]
fn test_post_validation() {
    let store = MemoryStore::new();
    let (_, token) = sign_up(&store, "vera");

    let resp = send(&store, Method::Post, "/new", Some(&token), Some(json!({"text": ""})));
    assert_eq!(*resp.status(), 400);
    assert_eq!(json_of(&resp)["field"], "text");

    let resp = send(
        &store,
        Method::Post,
        "/new",
        Some(&token),
        Some(json!({"text": "a".repeat(5001)})),
    );
    assert_eq!(*resp.status(), 400);

    let resp = send(
        &store,
        Method::Post,
        "/new",
        Some(&token),
        Some(json!({"text": "broken picture", "image": "bm90IGFuIGltYWdl"})),
    );
    assert_eq!(*resp.status(), 400);
    assert_eq!(json_of(&resp)["field"], "image");

    let resp = send(
        &store,
        Method::Post,
        "/new",
        Some(&token),
        Some(json!({"text": "half a picture", "image": TRUNCATED_PNG_BASE64})),
    );
    assert_eq!(*resp.status(), 400);
    assert_eq!(json_of(&resp)["field"], "image");
    let listing = json_of(&send(&store, Method::Get, "/vera", None, None));
    assert_eq!(listing["paginator"]["count"], 0);

    let post = publish(&store, &token, json!({"text": "picture", "image": SMALL_PNG_BASE64}));
    let reference = post["image"].as_str().unwrap();
    let resp = send(&store, Method::Get, &format!("/media/{}", reference), None, None);
    assert_eq!(*resp.status(), 200);
    assert_eq!(resp.header("content-type").and_then(|v| v.as_str()), Some("image/png"));
}

#[test]
fn test_create_post_requires_auth() {
    let store = MemoryStore::new();
    let resp = send(&store, Method::Post, "/new", None, Some(json!({"text": "anonymous"})));
    assert_eq!(*resp.status(), 401);

    let resp = send(&store, Method::Post, "/login", None, Some(json!({"username": "ghost", "password": "nope"})));
    assert_eq!(*resp.status(), 401);
}

#[test]
fn test_registered_username_can_log_in() {
    let store = MemoryStore::new();
    let resp = send(
        &store,
        Method::Post,
        "/users",
        None,
        Some(json!({"username": "tom&jerry", "password": "secret"})),
    );
    assert_eq!(*resp.status(), 400);
    assert_eq!(json_of(&resp)["field"], "username");

    let (user_id, _) = sign_up(&store, "tom.jerry@home");
    let profile = json_of(&send(&store, Method::Get, "/tom.jerry@home", None, None));
    assert_eq!(profile["profile"]["id"], user_id);
    assert_eq!(profile["profile"]["username"], "tom.jerry@home");
}

#[test]
fn test_non_author_edit_is_denied() {
    let store = MemoryStore::new();
    let (_, x_token) = sign_up(&store, "xavier");
    let (_, y_token) = sign_up(&store, "yvonne");

    let post = publish(&store, &x_token, json!({"text": "mine"}));
    let post_id = post["id"].as_str().unwrap();

    let resp = send(
        &store,
        Method::Post,
        &format!("/xavier/{}/edit", post_id),
        Some(&y_token),
        Some(json!({"text": "not yours"})),
    );
    assert_eq!(*resp.status(), 403);
    assert_eq!(json_of(&resp)["redirect"], format!("/xavier/{}", post_id));

    // A malformed body from a non-author is still a denial, not a bad request.
    let resp = send(
        &store,
        Method::Put,
        &format!("/xavier/{}/edit", post_id),
        Some(&y_token),
        Some(json!({"text": 5})),
    );
    assert_eq!(*resp.status(), 403);
    let mut builder = Request::builder();
    builder
        .method(Method::Put)
        .uri(&format!("/xavier/{}/edit", post_id))
        .header("Authorization", &format!("Bearer {}", y_token))
        .body(b"{not json".to_vec());
    let resp = yatube::respond(&store, &builder.build());
    assert_eq!(*resp.status(), 403);
    assert_eq!(json_of(&resp)["redirect"], format!("/xavier/{}", post_id));

    let view = json_of(&send(&store, Method::Get, &format!("/xavier/{}", post_id), None, None));
    assert_eq!(view["post"]["text"], "mine");

    // The post is only reachable under its author's name.
    let resp = send(&store, Method::Get, &format!("/yvonne/{}", post_id), None, None);
    assert_eq!(*resp.status(), 404);
}

#[test]
fn test_follow_flow() {
    let store = MemoryStore::new();
    let (_, reader) = sign_up(&store, "reader");
    let (_, author) = sign_up(&store, "author");

    let post = publish(&store, &author, json!({"text": "Post for follow"}));

    let feed = json_of(&send(&store, Method::Get, "/follow", Some(&reader), None));
    assert_eq!(feed["page"]["items"].as_array().unwrap().len(), 0);

    for _ in 0..2 {
        let resp = send(&store, Method::Post, "/author/follow", Some(&reader), None);
        assert_eq!(*resp.status(), 200);
    }
    let profile = json_of(&send(&store, Method::Get, "/author", Some(&reader), None));
    assert_eq!(profile["following"], true);
    assert_eq!(profile["follower_count"], 1);

    let feed = json_of(&send(&store, Method::Get, "/follow", Some(&reader), None));
    assert_eq!(feed["page"]["items"][0]["id"], post["id"]);
    assert_eq!(feed["page"]["items"][0]["author"], "author");

    let resp = send(&store, Method::Post, "/reader/follow", Some(&reader), None);
    assert_eq!(json_of(&resp)["status"], "self_follow_ignored");
    let own = json_of(&send(&store, Method::Get, "/reader", None, None));
    assert_eq!(own["follower_count"], 0);

    send(&store, Method::Post, "/author/unfollow", Some(&reader), None);
    let resp = send(&store, Method::Post, "/author/unfollow", Some(&reader), None);
    assert_eq!(*resp.status(), 200);
    let feed = json_of(&send(&store, Method::Get, "/follow", Some(&reader), None));
    assert_eq!(feed["page"]["items"].as_array().unwrap().len(), 0);

    let anonymous = send(&store, Method::Get, "/follow", None, None);
    assert_eq!(*anonymous.status(), 200);

    let resp = send(&store, Method::Post, "/nobody/follow", Some(&reader), None);
    assert_eq!(*resp.status(), 404);
}

#[test]
fn test_index_is_cached_until_cleared() {
    let store = MemoryStore::new();
    let (_, token) = sign_up(&store, "cacher");

    publish(&store, &token, json!({"text": "before cache"}));
    let first = json_of(&send(&store, Method::Get, "/", None, None));
    assert_eq!(first["paginator"]["count"], 1);

    publish(&store, &token, json!({"text": "Post to check cache"}));
    let cached = json_of(&send(&store, Method::Get, "/", None, None));
    assert_eq!(cached, first);

    let resp = admin(&store, Method::Post, "/admin/cache/clear", None);
    assert_eq!(*resp.status(), 200);

    let fresh = json_of(&send(&store, Method::Get, "/", None, None));
    assert_eq!(fresh["paginator"]["count"], 2);
    assert_eq!(fresh["page"]["items"][0]["text"], "Post to check cache");
}

#[test]
fn test_groups_and_admin() {
    let store = MemoryStore::new();
    let (_, token) = sign_up(&store, "gina");
    std::env::set_var("YATUBE_ADMIN_TOKEN", ADMIN_TOKEN);

    let resp = send(&store, Method::Post, "/admin/groups", None, Some(json!({"title": "Cats"})));
    assert_eq!(*resp.status(), 401);

    let resp = admin(
        &store,
        Method::Post,
        "/admin/groups",
        Some(json!({"title": "Cats", "slug": "cats", "description": "meow"})),
    );
    assert_eq!(*resp.status(), 201);

    let post = publish(&store, &token, json!({"text": "in cats", "group": "cats"}));
    assert_eq!(post["group"], "cats");
    assert_eq!(post["group_title"], "Cats");

    let group_feed = json_of(&send(&store, Method::Get, "/group/cats?page=7", None, None));
    assert_eq!(group_feed["group"]["slug"], "cats");
    assert_eq!(group_feed["page"]["number"], 1);
    assert_eq!(group_feed["page"]["items"][0]["id"], post["id"]);

    let found = json_of(&admin(&store, Method::Get, "/admin/posts?search=CATS", None));
    assert_eq!(found.as_array().unwrap().len(), 1);

    let resp = admin(&store, Method::Delete, "/admin/groups/cats?policy=restrict", None);
    assert_eq!(*resp.status(), 409);

    let resp = admin(&store, Method::Delete, "/admin/groups/cats", None);
    assert_eq!(*resp.status(), 200);
    assert_eq!(json_of(&resp)["policy"], "detach");

    let view = json_of(&send(
        &store,
        Method::Get,
        &format!("/gina/{}", post["id"].as_str().unwrap()),
        None,
        None,
    ));
    assert!(view["post"]["group"].is_null());

    let resp = send(&store, Method::Get, "/group/cats", None, None);
    assert_eq!(*resp.status(), 404);

    let resp = admin(&store, Method::Delete, "/admin/users/gina", None);
    assert_eq!(*resp.status(), 200);
    let resp = send(&store, Method::Get, "/gina", None, None);
    assert_eq!(*resp.status(), 404);
    let index = json_of(&send(&store, Method::Get, "/?page=2", None, None));
    assert_eq!(index["paginator"]["count"], 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_follow_creates_one_edge() {
    let store = std::sync::Arc::new(MemoryStore::new());
    let (_, reader) = sign_up(&store, "racer");
    sign_up(&store, "target");

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let reader = reader.clone();
            tokio::task::spawn_blocking(move || {
                *send(&store, Method::Post, "/target/follow", Some(&reader), None).status()
            })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), 200);
    }

    let profile = json_of(&send(&store, Method::Get, "/target", None, None));
    assert_eq!(profile["follower_count"], 1);
}
