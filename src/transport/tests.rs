use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::acl::model::{Topic, UserDraft};
use crate::auth::{PasswordHasher, password};
use crate::persistence::{CachedStore, JsonFileBackend, UserStore};
use crate::transport::handler::Handler;
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::transport::websocket::serve;

struct Fixture {
    _tmp: TempDir,
    store: Arc<dyn UserStore>,
    handler: Handler,
}

/// A store holding `root` (admin, password `rootpw`) and `bob` (password `bobpw`).
async fn fixture() -> Fixture {
    let tmp = TempDir::new().expect("create tempdir");
    let store: Arc<dyn UserStore> = Arc::new(CachedStore::new(
        JsonFileBackend::new(tmp.path().join("users.json")),
        PasswordHasher::new(password::MIN_COST),
    ));
    store
        .add_user(UserDraft::new("root", "rootpw", true))
        .await
        .expect("add root");
    store
        .add_user(UserDraft::new("bob", "bobpw", false))
        .await
        .expect("add bob");
    store
        .add_topic_to_user("bob", Topic::new("bob/#", true, true))
        .await
        .expect("add grant");

    let handler = Handler::new(Arc::clone(&store));
    Fixture {
        _tmp: tmp,
        store,
        handler,
    }
}

async fn token_for(handler: &Handler, username: &str, password: &str) -> String {
    let reply = handler
        .handle(ClientMessage::Login {
            username: username.into(),
            password: password.into(),
        })
        .await;
    match reply {
        ServerMessage::Ok {
            token: Some(token), ..
        } => token,
        other => panic!("Expected a token, got {:?}", other),
    }
}

fn error_kind(reply: &ServerMessage) -> &str {
    match reply {
        ServerMessage::Error { kind, .. } => kind,
        other => panic!("Expected an error, got {:?}", other),
    }
}

fn data(reply: ServerMessage) -> Value {
    match reply {
        ServerMessage::Ok {
            data: Some(data), ..
        } => data,
        other => panic!("Expected data, got {:?}", other),
    }
}

#[tokio::test]
async fn test_login_issues_token() {
    let fx = fixture().await;

    let token = token_for(&fx.handler, "bob", "bobpw").await;
    assert_eq!(token.len(), 32);
    let holder = fx.store.get_user_by_token(&token).await.expect("token stored");
    assert_eq!(holder.username, "bob");

    let wrong = fx
        .handler
        .handle_text(r#"{"type":"login","username":"bob","password":"nope"}"#)
        .await;
    assert_eq!(error_kind(&wrong), "invalid_credentials");

    let unknown = fx
        .handler
        .handle_text(r#"{"type":"login","username":"ghost","password":"x"}"#)
        .await;
    assert_eq!(error_kind(&unknown), "invalid_credentials");

    let missing = fx.handler.handle_text(r#"{"type":"login","username":"bob"}"#).await;
    assert_eq!(error_kind(&missing), "bad_request");
}

#[tokio::test]
async fn test_malformed_requests() {
    let fx = fixture().await;
    assert_eq!(error_kind(&fx.handler.handle_text("not json").await), "bad_request");
    assert_eq!(
        error_kind(&fx.handler.handle_text(r#"{"type":"reboot"}"#).await),
        "bad_request"
    );
}

#[tokio::test]
async fn test_token_is_required() {
    let fx = fixture().await;

    let none = fx.handler.handle_text(r#"{"type":"list_users"}"#).await;
    assert_eq!(
        none,
        ServerMessage::error("unauthorized", "No token provided")
    );

    let bogus = fx
        .handler
        .handle_text(r#"{"type":"list_users","token":"deadbeef"}"#)
        .await;
    assert_eq!(bogus, ServerMessage::error("unauthorized", "Invalid token"));
}

#[tokio::test]
async fn test_admin_user_management() {
    let fx = fixture().await;
    let root = token_for(&fx.handler, "root", "rootpw").await;

    let added = fx
        .handler
        .handle(ClientMessage::AddUser {
            token: root.clone(),
            username: "carol".into(),
            password: "carolpw".into(),
            admin: false,
        })
        .await;
    assert!(added.is_ok(), "{:?}", added);

    let dup = fx
        .handler
        .handle(ClientMessage::AddUser {
            token: root.clone(),
            username: "carol".into(),
            password: "x".into(),
            admin: false,
        })
        .await;
    assert_eq!(error_kind(&dup), "already_exists");

    let edited = fx
        .handler
        .handle(ClientMessage::EditUser {
            token: root.clone(),
            username: "carol".into(),
            password: String::new(),
            admin: true,
        })
        .await;
    assert!(edited.is_ok());
    let carol = fx.store.get_user_by_username("carol").await.expect("carol");
    assert!(carol.is_admin);
    token_for(&fx.handler, "carol", "carolpw").await;

    let listing = data(
        fx.handler
            .handle(ClientMessage::ListUsers {
                token: root.clone(),
                user: None,
            })
            .await,
    );
    let names: Vec<&str> = listing
        .as_array()
        .expect("array")
        .iter()
        .map(|u| u["username"].as_str().expect("username"))
        .collect();
    assert_eq!(names, ["root", "bob", "carol"]);
    assert!(listing[0].get("password").is_none());

    let self_delete = fx
        .handler
        .handle(ClientMessage::DeleteUser {
            token: root.clone(),
            username: "root".into(),
        })
        .await;
    assert_eq!(
        self_delete,
        ServerMessage::error("bad_request", "You cannot delete yourself")
    );

    let deleted = fx
        .handler
        .handle(ClientMessage::DeleteUser {
            token: root.clone(),
            username: "carol".into(),
        })
        .await;
    assert!(deleted.is_ok());
    assert!(fx.store.get_user_by_username("carol").await.is_err());
}

#[tokio::test]
async fn test_non_admin_is_limited_to_itself() {
    let fx = fixture().await;
    let bob = token_for(&fx.handler, "bob", "bobpw").await;

    let add = fx
        .handler
        .handle(ClientMessage::AddUser {
            token: bob.clone(),
            username: "mallory".into(),
            password: "pw".into(),
            admin: true,
        })
        .await;
    assert_eq!(error_kind(&add), "forbidden");

    let add_topic = fx
        .handler
        .handle(ClientMessage::AddTopic {
            token: bob.clone(),
            username: "bob".into(),
            topic: Topic::new("#", true, true),
        })
        .await;
    assert_eq!(error_kind(&add_topic), "forbidden");

    let everyone = fx
        .handler
        .handle(ClientMessage::ListUsers {
            token: bob.clone(),
            user: None,
        })
        .await;
    assert_eq!(error_kind(&everyone), "forbidden");

    let only_me = data(
        fx.handler
            .handle(ClientMessage::ListUsers {
                token: bob.clone(),
                user: Some("bob".into()),
            })
            .await,
    );
    assert_eq!(only_me, json!([{ "username": "bob", "admin": false }]));

    let me = fx
        .handler
        .handle(ClientMessage::GetUser {
            token: bob.clone(),
            username: "bob".into(),
        })
        .await;
    assert_eq!(data(me), json!({ "username": "bob", "admin": false }));

    let other = fx
        .handler
        .handle(ClientMessage::GetUser {
            token: bob.clone(),
            username: "root".into(),
        })
        .await;
    assert_eq!(error_kind(&other), "forbidden");
}

#[tokio::test]
async fn test_topic_requests() {
    let fx = fixture().await;
    let root = token_for(&fx.handler, "root", "rootpw").await;
    let bob = token_for(&fx.handler, "bob", "bobpw").await;

    let add = fx
        .handler
        .handle_text(
            &json!({
                "type": "add_topic",
                "token": root,
                "username": "bob",
                "topic": { "topicstring": "shared/+", "pub": false, "sub": true }
            })
            .to_string(),
        )
        .await;
    assert!(add.is_ok(), "{:?}", add);

    let invalid = fx
        .handler
        .handle(ClientMessage::AddTopic {
            token: root.clone(),
            username: "bob".into(),
            topic: Topic::new("trailing/", true, true),
        })
        .await;
    assert_eq!(error_kind(&invalid), "validation");

    let edit = fx
        .handler
        .handle(ClientMessage::EditTopic {
            token: root.clone(),
            username: "bob".into(),
            topic: Topic::new("shared/+", true, true),
        })
        .await;
    assert!(edit.is_ok());

    let all = data(
        fx.handler
            .handle(ClientMessage::UserTopics {
                token: bob.clone(),
                username: "bob".into(),
                topic: None,
            })
            .await,
    );
    assert_eq!(all["username"], "bob");
    assert_eq!(all["topics"].as_array().expect("topics").len(), 2);

    let one = data(
        fx.handler
            .handle(ClientMessage::UserTopics {
                token: bob.clone(),
                username: "bob".into(),
                topic: Some("shared/+".into()),
            })
            .await,
    );
    assert_eq!(
        one["topic"],
        json!({ "topicstring": "shared/+", "pub": true, "sub": true })
    );

    let absent = fx
        .handler
        .handle(ClientMessage::UserTopics {
            token: bob.clone(),
            username: "bob".into(),
            topic: Some("nope".into()),
        })
        .await;
    assert_eq!(error_kind(&absent), "not_found");

    let deleted = fx
        .handler
        .handle(ClientMessage::DeleteTopic {
            token: root.clone(),
            username: "bob".into(),
            topic: "shared/+".into(),
        })
        .await;
    assert!(deleted.is_ok());

    let gone = fx
        .handler
        .handle(ClientMessage::DeleteTopic {
            token: root.clone(),
            username: "bob".into(),
            topic: "shared/+".into(),
        })
        .await;
    assert_eq!(error_kind(&gone), "not_found");

    // Grant edits never break the password.
    token_for(&fx.handler, "bob", "bobpw").await;
}

#[tokio::test]
async fn test_check_topic_auth() {
    let fx = fixture().await;
    let bob = token_for(&fx.handler, "bob", "bobpw").await;

    let check = |topic: &str, access: &str| ClientMessage::CheckTopicAuth {
        token: bob.clone(),
        username: "bob".into(),
        topic: topic.into(),
        access: access.into(),
    };

    assert_eq!(data(fx.handler.handle(check("bob/inbox", "pub")).await), json!(true));
    assert_eq!(data(fx.handler.handle(check("bob/inbox", "sub")).await), json!(true));
    assert_eq!(
        error_kind(&fx.handler.handle(check("alice/inbox", "sub")).await),
        "not_found"
    );
    assert_eq!(
        error_kind(&fx.handler.handle(check("bob/inbox", "admin")).await),
        "validation"
    );
    assert_eq!(
        error_kind(&fx.handler.handle(check("", "sub")).await),
        "bad_request"
    );
}

#[tokio::test]
async fn test_broker_queries() {
    let fx = fixture().await;

    let ok = fx
        .handler
        .handle_text(r#"{"type":"authenticate","username":"bob","password":"bobpw"}"#)
        .await;
    assert_eq!(ok, ServerMessage::ok("Authenticated"));

    let bad = fx
        .handler
        .handle_text(r#"{"type":"authenticate","username":"bob","password":"x"}"#)
        .await;
    assert_eq!(bad, ServerMessage::error("unauthorized", "Invalid login"));

    let authorize = |topic: &str, access: &str| {
        json!({ "type": "authorize", "username": "bob", "topic": topic, "access": access })
            .to_string()
    };

    let publish = fx.handler.handle_text(&authorize("bob/out", "2")).await;
    assert_eq!(data(publish), json!({ "allowed": true }));

    let wildcard = fx.handler.handle_text(&authorize("bob/+", "2")).await;
    assert_eq!(data(wildcard), json!({ "allowed": false }));

    let subscribe = fx.handler.handle_text(&authorize("bob/+", "1")).await;
    assert_eq!(data(subscribe), json!({ "allowed": true }));

    let unmatched = fx.handler.handle_text(&authorize("other", "1")).await;
    assert_eq!(error_kind(&unmatched), "not_found");
}

#[tokio::test]
async fn test_websocket_round_trip() {
    let fx = fixture().await;
    let handler = Arc::new(fx.handler);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(serve(listener, Arc::clone(&handler)));

    let (mut ws_stream, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("WebSocket handshake failed");

    let login = json!({ "type": "login", "username": "root", "password": "rootpw" });
    ws_stream
        .send(WsMessage::Text(login.to_string().into()))
        .await
        .expect("Failed to send login message");

    let response = ws_stream
        .next()
        .await
        .expect("Did not receive response")
        .expect("read frame");
    let reply: ServerMessage =
        serde_json::from_slice(&response.into_data()).expect("decode reply");
    let token = match reply {
        ServerMessage::Ok {
            token: Some(token), ..
        } => token,
        other => panic!("Expected login success, got {:?}", other),
    };

    let list = json!({ "type": "list_users", "token": token });
    ws_stream
        .send(WsMessage::Text(list.to_string().into()))
        .await
        .expect("Failed to send list message");
    let response = ws_stream
        .next()
        .await
        .expect("Did not receive response")
        .expect("read frame");
    let raw: Value = serde_json::from_slice(&response.into_data()).expect("decode reply");
    assert_eq!(raw["type"], "ok");
    assert_eq!(raw["token"], json!(token));
    assert_eq!(raw["data"].as_array().expect("users").len(), 2);

    ws_stream
        .send(WsMessage::Binary(vec![1, 2, 3].into()))
        .await
        .expect("Failed to send binary frame");
    let response = ws_stream
        .next()
        .await
        .expect("Did not receive response")
        .expect("read frame");
    let raw: Value = serde_json::from_slice(&response.into_data()).expect("decode reply");
    assert_eq!(raw["type"], "error");
    assert_eq!(raw["kind"], "bad_request");
}
